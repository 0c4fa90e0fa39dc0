//! Local authentication
//!
//! Accounts live in a JSON file with bcrypt password hashes. The file is
//! re-read on every call so several processes can share it. Sessions are
//! held in memory only.

use async_trait::async_trait;
use bcrypt::{hash, verify};
use chat_core::session::{validate_credentials, UserSession};
use chat_core::store::AuthService;
use chat_core::AuthError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::fs;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::StoreConfig;

/// Account record stored in the users file
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredUser {
    id: String,
    email: String,
    password_hash: String,
    created_at: DateTime<Utc>,
    last_login: Option<DateTime<Utc>>,
}

pub struct LocalAuthService {
    users_file: PathBuf,
    bcrypt_cost: u32,
    session_lifetime: Duration,
    /// Sessions by token
    sessions: RwLock<HashMap<String, UserSession>>,
    /// Token of the signed-in user
    current: RwLock<Option<String>>,
    /// Serializes read-modify-write of the users file
    write_lock: Mutex<()>,
}

impl LocalAuthService {
    pub async fn open(config: &StoreConfig) -> anyhow::Result<Self> {
        config.ensure_dirs().await?;
        let service = Self {
            users_file: config.users_file.clone(),
            bcrypt_cost: config.bcrypt_cost,
            session_lifetime: config.session_lifetime,
            sessions: RwLock::new(HashMap::new()),
            current: RwLock::new(None),
            write_lock: Mutex::new(()),
        };
        info!("[Auth] Initialized at {:?}", service.users_file);
        Ok(service)
    }

    /// Look up a live session by token
    pub async fn validate_session(&self, token: &str) -> Result<UserSession, AuthError> {
        let sessions = self.sessions.read().await;
        let session = sessions.get(token).ok_or(AuthError::InvalidCredentials)?;
        if session.is_expired() {
            return Err(AuthError::SessionExpired);
        }
        Ok(session.clone())
    }

    async fn load_users(&self) -> Result<HashMap<String, StoredUser>, AuthError> {
        match fs::read_to_string(&self.users_file).await {
            Ok(content) => serde_json::from_str(&content)
                .map_err(|e| AuthError::Backend(format!("corrupt users file: {}", e))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(AuthError::Backend(e.to_string())),
        }
    }

    async fn save_users(&self, users: &HashMap<String, StoredUser>) -> Result<(), AuthError> {
        let temp_path = self.users_file.with_extension("tmp");
        let json = serde_json::to_string_pretty(users).map_err(|e| AuthError::Backend(e.to_string()))?;
        fs::write(&temp_path, json)
            .await
            .map_err(|e| AuthError::Backend(e.to_string()))?;
        fs::rename(&temp_path, &self.users_file)
            .await
            .map_err(|e| AuthError::Backend(e.to_string()))
    }

    async fn create_session(&self, email: &str) -> UserSession {
        let session = UserSession::new(email, self.session_lifetime);
        self.sessions
            .write()
            .await
            .insert(session.token.clone(), session.clone());
        *self.current.write().await = Some(session.token.clone());
        session
    }
}

#[async_trait]
impl AuthService for LocalAuthService {
    async fn sign_in(&self, email: &str, password: &str) -> Result<UserSession, AuthError> {
        let key = email.trim().to_lowercase();
        let _guard = self.write_lock.lock().await;
        let mut users = self.load_users().await?;

        let user = users.get_mut(&key).ok_or(AuthError::InvalidCredentials)?;
        let valid = verify(password, &user.password_hash)
            .map_err(|e| AuthError::Backend(format!("Failed to verify password: {}", e)))?;
        if !valid {
            warn!("[Auth] Failed login attempt for {}", key);
            return Err(AuthError::InvalidCredentials);
        }

        user.last_login = Some(Utc::now());
        self.save_users(&users).await?;

        info!("[Auth] User logged in: {}", key);
        Ok(self.create_session(&key).await)
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<UserSession, AuthError> {
        validate_credentials(email, password)?;
        let key = email.trim().to_lowercase();

        let _guard = self.write_lock.lock().await;
        let mut users = self.load_users().await?;
        if users.contains_key(&key) {
            return Err(AuthError::EmailTaken(key));
        }

        let password_hash = hash(password, self.bcrypt_cost)
            .map_err(|e| AuthError::Backend(format!("Failed to hash password: {}", e)))?;
        users.insert(
            key.clone(),
            StoredUser {
                id: Uuid::new_v4().to_string(),
                email: key.clone(),
                password_hash,
                created_at: Utc::now(),
                last_login: None,
            },
        );
        self.save_users(&users).await?;

        info!("[Auth] User registered: {}", key);
        Ok(self.create_session(&key).await)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        if let Some(token) = self.current.write().await.take() {
            if let Some(session) = self.sessions.write().await.remove(&token) {
                info!("[Auth] User logged out: {}", session.email);
            }
        }
        Ok(())
    }

    async fn current_user_email(&self) -> Option<String> {
        let token = self.current.read().await.clone()?;
        match self.validate_session(&token).await {
            Ok(session) => Some(session.email),
            Err(e) => {
                debug!("[Auth] No current user: {}", e);
                None
            }
        }
    }
}
