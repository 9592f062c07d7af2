//! Signup, login, refresh and logout.
//!
//! Validates request payloads, talks to the user store and password hasher,
//! and hands every credential decision to the rotation engine.

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::db::{Database, NewUser};
use crate::password::Passwords;
use crate::rotation::{
    IssuedSession, LogoutOutcome, RotationEngine, RotationError, UnauthenticatedReason,
};

/// Name of the account every new user starts with.
pub const DEFAULT_ACCOUNT_NAME: &str = "Main Account";

const NAME_MAX_LEN: usize = 30;
const PASSWORD_MIN_LEN: usize = 8;
const PASSWORD_MAX_LEN: usize = 30;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SignupRequest {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub user_id: i64,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified: Option<bool>,
}

/// Response body for every endpoint that establishes a session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionBody {
    pub access_token: String,
    pub user: SessionUser,
}

/// A session to hand back to the client: the body, plus the refresh token
/// for the cookie.
#[derive(Debug, Clone)]
pub struct SessionGrant {
    pub body: SessionBody,
    pub refresh_token: String,
    /// Cookie lifetime in seconds
    pub refresh_max_age: u64,
}

impl SessionGrant {
    fn new(session: IssuedSession, full_user: bool) -> Self {
        let IssuedSession {
            access,
            refresh,
            user,
            ..
        } = session;

        Self {
            body: SessionBody {
                access_token: access.token,
                user: SessionUser {
                    user_id: user.user_id,
                    email: user.email,
                    started: full_user.then_some(user.started),
                    verified: full_user.then_some(user.verified),
                },
            },
            refresh_token: refresh.token,
            refresh_max_age: refresh.duration,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("validation failed: {0:?}")]
    Validation(Vec<String>),
    #[error("email address is already registered")]
    DuplicateEmail,
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error(transparent)]
    Session(#[from] RotationError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Clone)]
pub struct AuthService {
    db: Database,
    engine: RotationEngine,
    passwords: Passwords,
}

impl AuthService {
    pub fn new(db: Database, engine: RotationEngine, passwords: Passwords) -> Self {
        Self {
            db,
            engine,
            passwords,
        }
    }

    pub async fn signup(&self, request: SignupRequest) -> Result<SessionGrant, ServiceError> {
        let signup = validate_signup(request).map_err(ServiceError::Validation)?;

        if self.db.users().email_exists(&signup.email).await? {
            return Err(ServiceError::DuplicateEmail);
        }

        let password_hash = self.hash_password(signup.password).await?;

        let user_id = self
            .db
            .users()
            .create(&NewUser {
                email: &signup.email,
                first_name: &signup.first_name,
                last_name: &signup.last_name,
                password_hash: &password_hash,
            })
            .await
            .map_err(|e| {
                let duplicate = e
                    .as_database_error()
                    .is_some_and(|db| db.is_unique_violation());
                if duplicate {
                    ServiceError::DuplicateEmail
                } else {
                    ServiceError::Database(e)
                }
            })?;

        if let Err(e) = self
            .db
            .accounts()
            .create(user_id, DEFAULT_ACCOUNT_NAME)
            .await
        {
            error!(user_id, error = %e, "Failed to create default account");
        }

        let user = self
            .db
            .users()
            .get_by_id(user_id)
            .await?
            .ok_or_else(|| ServiceError::Internal("created user disappeared".into()))?;

        let session = self.engine.issue_initial_family(user.identity()).await?;
        info!(user_id, "User signed up");
        Ok(SessionGrant::new(session, false))
    }

    pub async fn login(&self, request: LoginRequest) -> Result<SessionGrant, ServiceError> {
        let login = validate_login(request).map_err(ServiceError::Validation)?;

        let Some(credentials) = self.db.users().get_credentials(&login.email).await? else {
            return Err(ServiceError::InvalidCredentials);
        };

        let passwords = self.passwords.clone();
        let hash = credentials.password_hash;
        let matches =
            tokio::task::spawn_blocking(move || passwords.verify(&login.password, &hash))
                .await
                .map_err(|e| ServiceError::Internal(e.to_string()))?
                .map_err(|e| ServiceError::Internal(e.to_string()))?;
        if !matches {
            return Err(ServiceError::InvalidCredentials);
        }

        let user = self
            .db
            .users()
            .get_by_id(credentials.id)
            .await?
            .ok_or(ServiceError::InvalidCredentials)?;

        let session = self.engine.issue_initial_family(user.identity()).await?;
        Ok(SessionGrant::new(session, true))
    }

    pub async fn refresh(&self, presented: Option<&str>) -> Result<SessionGrant, ServiceError> {
        let presented = presented.ok_or(RotationError::Unauthenticated(
            UnauthenticatedReason::MissingToken,
        ))?;
        let session = self.engine.refresh(presented).await?;
        Ok(SessionGrant::new(session, true))
    }

    /// End the presented session. Failures are logged; the caller clears
    /// the cookie whatever happens here.
    pub async fn logout(&self, presented: Option<&str>) {
        let Some(presented) = presented else {
            return;
        };

        match self.engine.logout(presented).await {
            Ok(LogoutOutcome::Ended { family_id, records }) => {
                info!(family_id = %family_id, records, "Logged out");
            }
            Ok(LogoutOutcome::Ignored) => {}
            Err(e) => warn!(error = %e, "Failed to end session on logout"),
        }
    }

    async fn hash_password(&self, password: String) -> Result<String, ServiceError> {
        let passwords = self.passwords.clone();
        tokio::task::spawn_blocking(move || passwords.hash(&password))
            .await
            .map_err(|e| ServiceError::Internal(e.to_string()))?
            .map_err(|e| ServiceError::Internal(e.to_string()))
    }
}

#[derive(Debug)]
struct ValidSignup {
    email: String,
    first_name: String,
    last_name: String,
    password: String,
}

#[derive(Debug)]
struct ValidLogin {
    email: String,
    password: String,
}

fn validate_signup(request: SignupRequest) -> Result<ValidSignup, Vec<String>> {
    let mut errors = Vec::new();

    let email = normalize_email(&request.email);
    if !is_valid_email(&email) {
        errors.push("Please enter a valid email address".to_string());
    }

    let first_name = request.first_name.trim().to_string();
    let last_name = request.last_name.trim().to_string();
    for (value, label) in [(&first_name, "first"), (&last_name, "last")] {
        if value.is_empty() {
            errors.push(format!("Your {} name is missing", label));
        } else if value.chars().count() > NAME_MAX_LEN {
            errors.push(format!(
                "Your {} name should not be more than {} characters",
                label, NAME_MAX_LEN
            ));
        }
    }

    let password = request.password;
    let len = password.chars().count();
    if !(PASSWORD_MIN_LEN..=PASSWORD_MAX_LEN).contains(&len) {
        errors.push(format!(
            "Password must be between {} and {} characters",
            PASSWORD_MIN_LEN, PASSWORD_MAX_LEN
        ));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        errors.push("Password must contain a number".to_string());
    }
    if !password.chars().any(|c| c.is_uppercase()) {
        errors.push("Password must contain an uppercase letter".to_string());
    }

    if errors.is_empty() {
        Ok(ValidSignup {
            email,
            first_name,
            last_name,
            password,
        })
    } else {
        Err(errors)
    }
}

fn validate_login(request: LoginRequest) -> Result<ValidLogin, Vec<String>> {
    let mut errors = Vec::new();

    let email = normalize_email(&request.email);
    if !is_valid_email(&email) {
        errors.push("Must be an email address".to_string());
    }

    let len = request.password.chars().count();
    if !(PASSWORD_MIN_LEN..=PASSWORD_MAX_LEN).contains(&len) {
        errors.push(format!(
            "Password must be at least {} characters",
            PASSWORD_MIN_LEN
        ));
    }

    if errors.is_empty() {
        Ok(ValidLogin {
            email,
            password: request.password,
        })
    } else {
        Err(errors)
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// `local@domain.tld` with no whitespace and exactly one `@`.
fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && !tld.is_empty(),
        None => false,
    }
}
