use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AuthError;
use crate::identity::{canonicalize, CanonicalId};
use crate::models::Participant;

/// Minimum password length accepted at sign-up.
pub const MIN_PASSWORD_LEN: usize = 6;

/// Session token for an authenticated user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSession {
    pub email: String,
    pub token: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl UserSession {
    pub fn new(email: impl Into<String>, lifetime: Duration) -> Self {
        let now = Utc::now();
        Self {
            email: email.into(),
            token: Uuid::new_v4().to_string(),
            created_at: now,
            expires_at: now + lifetime,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// The signed-in user, passed explicitly into every directory call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    email: String,
    id: CanonicalId,
    display_name: String,
}

impl SessionContext {
    pub fn new(email: impl Into<String>, display_name: impl Into<String>) -> Self {
        let email = email.into();
        Self {
            id: canonicalize(&email),
            email,
            display_name: display_name.into(),
        }
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn id(&self) -> &CanonicalId {
        &self.id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn participant(&self) -> Participant {
        Participant::new(self.id.clone(), self.display_name.clone())
    }
}

/// Sign-up checks shared by the auth service implementations.
pub fn validate_credentials(email: &str, password: &str) -> Result<(), AuthError> {
    let email = email.trim();
    let well_formed = email
        .split_once('@')
        .map(|(local, domain)| !local.is_empty() && !domain.is_empty())
        .unwrap_or(false);
    if !well_formed {
        return Err(AuthError::InvalidInput(format!("not an email address: {:?}", email)));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::InvalidInput(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}
