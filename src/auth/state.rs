//! Authentication state trait and macro.

use crate::jwt::TokenCodec;

/// Trait for state types that can verify access tokens.
pub trait HasAuthBackend {
    fn codec(&self) -> &TokenCodec;
}

/// Implement `HasAuthBackend` for a state struct with a
/// `codec: Arc<TokenCodec>` field.
///
/// # Example
/// ```ignore
/// #[derive(Clone)]
/// pub struct MyState {
///     pub codec: Arc<TokenCodec>,
/// }
///
/// impl_has_auth_backend!(MyState);
/// ```
#[macro_export]
macro_rules! impl_has_auth_backend {
    ($state_type:ty) => {
        impl $crate::auth::HasAuthBackend for $state_type {
            fn codec(&self) -> &$crate::jwt::TokenCodec {
                &self.codec
            }
        }
    };
}
