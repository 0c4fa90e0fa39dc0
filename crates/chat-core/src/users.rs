//! User directory: profile rows, sign-up and the user search.

use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{AuthError, DirectoryError, Result};
use crate::identity::{canonicalize, CanonicalId};
use crate::layout;
use crate::models::UserProfile;
use crate::session::SessionContext;
use crate::store::{AuthService, DocumentStore};

pub struct UserDirectory {
    store: Arc<dyn DocumentStore>,
}

impl UserDirectory {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Write the profile row for `profile.email`.
    ///
    /// Fields are written one by one so the user's conversation index, which
    /// lives under the same node, is left alone.
    pub async fn insert_user(&self, profile: &UserProfile) -> Result<()> {
        let id = canonicalize(&profile.email);
        for (field, value) in [("name", &profile.name), ("email", &profile.email)] {
            let path = layout::profile_field_path(&id, field);
            self.store
                .write(&path, json!(value))
                .await
                .map_err(|e| DirectoryError::write(&path, e))?;
        }
        info!("[Users] Inserted profile {}", id);
        Ok(())
    }

    pub async fn user_exists(&self, email: &str) -> Result<bool> {
        match self.profile(&canonicalize(email)).await {
            Ok(_) => Ok(true),
            Err(DirectoryError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn profile(&self, id: &CanonicalId) -> Result<UserProfile> {
        self.store
            .read(&layout::profile_path(id))
            .await?
            .and_then(parse_profile)
            .ok_or_else(|| DirectoryError::NotFound(format!("user {}", id)))
    }

    /// Users whose name starts with `term`, ignoring case. The caller is
    /// never included and an empty term matches nobody.
    pub async fn search_users(&self, ctx: &SessionContext, term: &str) -> Result<Vec<UserProfile>> {
        let term = term.trim().to_lowercase();
        if term.is_empty() {
            return Ok(Vec::new());
        }

        let root = self.store.read(layout::ROOT).await?;
        let Some(Value::Object(rows)) = root else {
            return Ok(Vec::new());
        };

        let hits: Vec<UserProfile> = rows
            .into_iter()
            .filter(|(key, _)| key != ctx.id().as_str())
            .filter_map(|(key, row)| profile_row(&key, row))
            .filter(|profile| canonicalize(&profile.email) != *ctx.id())
            .filter(|profile| profile.name.to_lowercase().starts_with(&term))
            .collect();

        debug!("[Users] Search {:?} matched {} users", term, hits.len());
        Ok(hits)
    }

    /// Create an account and its profile row, returning the new user's context.
    pub async fn register(
        &self,
        auth: &dyn AuthService,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<SessionContext> {
        let email = email.trim();
        if self.user_exists(email).await? {
            return Err(AuthError::EmailTaken(email.to_lowercase()).into());
        }

        let session = auth.sign_up(email, password).await?;
        self.insert_user(&UserProfile::new(name, session.email.clone()))
            .await?;
        Ok(SessionContext::new(session.email, name))
    }

    pub async fn sign_in(
        &self,
        auth: &dyn AuthService,
        email: &str,
        password: &str,
    ) -> Result<SessionContext> {
        let session = auth.sign_in(email, password).await?;
        self.context_for(session.email).await
    }

    /// Context of whoever is signed in with `auth`.
    pub async fn session_for(&self, auth: &dyn AuthService) -> Result<SessionContext> {
        let email = auth
            .current_user_email()
            .await
            .ok_or(DirectoryError::NotSignedIn)?;
        self.context_for(email).await
    }

    async fn context_for(&self, email: String) -> Result<SessionContext> {
        let name = match self.profile(&canonicalize(&email)).await {
            Ok(profile) => profile.name,
            Err(DirectoryError::NotFound(_)) => email.clone(),
            Err(e) => return Err(e),
        };
        Ok(SessionContext::new(email, name))
    }
}

fn parse_profile(row: Value) -> Option<UserProfile> {
    serde_json::from_value(row).ok()
}

/// A root row is a profile when it carries a name and an email that
/// canonicalizes to its own key. Conversation logs never do.
fn profile_row(key: &str, row: Value) -> Option<UserProfile> {
    parse_profile(row).filter(|profile| canonicalize(&profile.email).as_str() == key)
}
