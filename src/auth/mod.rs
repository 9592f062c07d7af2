//! Session transport.
//!
//! The refresh token travels in an HttpOnly cookie scoped to `/auth`; the
//! access token travels in the response body and comes back as a bearer
//! header.

mod cookie;
mod errors;
mod extractors;
mod state;

pub use cookie::{CookieSettings, REFRESH_COOKIE_NAME, get_cookie};
pub use errors::ApiAuthError;
pub use extractors::{Auth, bearer_token};
pub use state::HasAuthBackend;
