//! Identity provider backed by the document store.
//!
//! Accounts live in `accounts/{id}`. Emails are claimed through
//! `accountEmails/{email}` documents, whose atomic creation keeps emails
//! unique without a transaction.

use std::sync::Arc;

use argon2::password_hash::SaltString;
use argon2::{Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use uuid::Uuid;

use moodboard_db::{DocumentStore, FieldUpdate, StoreError};
use moodboard_types::timestamp;

use crate::token::{create_token, decode_token};
use crate::{AuthError, IdentityStore, MIN_SECRET_LEN, Principal, Session, SessionEvent, normalize_email};

const ACCOUNTS: &str = "accounts";
const ACCOUNT_EMAILS: &str = "accountEmails";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Account {
    id: String,
    email: String,
    password_hash: String,
    session_epoch: i64,
    #[serde(with = "timestamp")]
    created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EmailClaim {
    account_id: String,
}

pub struct LocalIdentity {
    store: Arc<dyn DocumentStore>,
    jwt_secret: String,
    token_ttl: chrono::Duration,
    params: Params,
    events: broadcast::Sender<SessionEvent>,
}

impl LocalIdentity {
    pub fn new(store: Arc<dyn DocumentStore>, jwt_secret: impl Into<String>) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            store,
            jwt_secret: jwt_secret.into(),
            token_ttl: chrono::Duration::days(30),
            params: Params::default(),
            events,
        }
    }

    pub fn with_token_ttl(mut self, ttl: chrono::Duration) -> Self {
        self.token_ttl = ttl;
        self
    }

    /// Override the Argon2 cost parameters (tests use cheap ones).
    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    fn issue(&self, account: &Account) -> Result<Session, AuthError> {
        let token = create_token(
            &self.jwt_secret,
            &account.id,
            &account.email,
            account.session_epoch,
            self.token_ttl,
        )?;
        Ok(Session {
            principal: Principal {
                id: account.id.clone(),
                email: account.email.clone(),
            },
            token,
        })
    }

    async fn load_account(&self, id: &str) -> Result<Option<Account>, AuthError> {
        match self.store.get(ACCOUNTS, id).await? {
            Some(doc) => Ok(Some(doc.decode()?)),
            None => Ok(None),
        }
    }

    /// Undo an email claim after a failed sign-up so a retry can succeed.
    async fn release_email(&self, email: &str) {
        if let Err(cleanup) = self.store.delete(ACCOUNT_EMAILS, email).await {
            warn!("Failed to release email claim for {}: {}", email, cleanup);
        }
    }

    async fn hash_secret(&self, secret: &str) -> Result<String, AuthError> {
        let params = self.params.clone();
        let secret = secret.to_string();
        tokio::task::spawn_blocking(move || {
            let salt = SaltString::generate(&mut OsRng);
            Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
                .hash_password(secret.as_bytes(), &salt)
                .map(|hash| hash.to_string())
                .map_err(|e| AuthError::Internal(format!("password hashing failed: {e}")))
        })
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            AuthError::Internal("password hashing task failed".into())
        })?
    }

    async fn verify_secret(&self, secret: &str, hash: &str) -> Result<bool, AuthError> {
        let secret = secret.to_string();
        let hash = hash.to_string();
        tokio::task::spawn_blocking(move || {
            let parsed = PasswordHash::new(&hash)
                .map_err(|e| AuthError::Internal(format!("stored hash is unreadable: {e}")))?;
            // Parameters are read back from the encoded hash
            Ok(Argon2::default()
                .verify_password(secret.as_bytes(), &parsed)
                .is_ok())
        })
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            AuthError::Internal("password verification task failed".into())
        })?
    }
}

#[async_trait]
impl IdentityStore for LocalIdentity {
    async fn sign_up(&self, email: &str, secret: &str) -> Result<Session, AuthError> {
        let email = normalize_email(email)?;
        if secret.chars().count() < MIN_SECRET_LEN {
            return Err(AuthError::WeakPassword);
        }

        let id = Uuid::new_v4().to_string();
        let claim = serde_json::to_value(EmailClaim {
            account_id: id.clone(),
        })
        .map_err(StoreError::from)?;

        match self.store.create(ACCOUNT_EMAILS, &email, claim).await {
            Ok(()) => {}
            Err(StoreError::AlreadyExists { .. }) => return Err(AuthError::EmailTaken),
            Err(e) => return Err(e.into()),
        }

        let account = match self.hash_secret(secret).await {
            Ok(password_hash) => Account {
                id: id.clone(),
                email: email.clone(),
                password_hash,
                session_epoch: 0,
                created_at: self.store.server_time(),
            },
            Err(e) => {
                self.release_email(&email).await;
                return Err(e);
            }
        };

        let body = serde_json::to_value(&account).map_err(StoreError::from)?;
        if let Err(e) = self.store.create(ACCOUNTS, &id, body).await {
            self.release_email(&email).await;
            return Err(e.into());
        }

        info!("Account created: {}", id);
        let session = self.issue(&account)?;
        let _ = self.events.send(SessionEvent::SignedIn(session.principal.clone()));
        Ok(session)
    }

    async fn sign_in(&self, identifier: &str, secret: &str) -> Result<Session, AuthError> {
        let email = normalize_email(identifier).map_err(|_| AuthError::InvalidCredentials)?;

        let claim: EmailClaim = match self.store.get(ACCOUNT_EMAILS, &email).await? {
            Some(doc) => doc.decode()?,
            None => return Err(AuthError::InvalidCredentials),
        };
        let account = self
            .load_account(&claim.account_id)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !self.verify_secret(secret, &account.password_hash).await? {
            return Err(AuthError::InvalidCredentials);
        }

        let session = self.issue(&account)?;
        let _ = self.events.send(SessionEvent::SignedIn(session.principal.clone()));
        Ok(session)
    }

    async fn sign_out(&self, principal_id: &str) -> Result<(), AuthError> {
        match self
            .store
            .update(ACCOUNTS, principal_id, vec![FieldUpdate::increment("sessionEpoch", 1)])
            .await
        {
            Ok(_) => {}
            Err(StoreError::NotFound { .. }) => return Err(AuthError::UnknownUser),
            Err(e) => return Err(e.into()),
        }

        info!("Signed out: {}", principal_id);
        let _ = self.events.send(SessionEvent::SignedOut {
            principal_id: principal_id.to_string(),
        });
        Ok(())
    }

    async fn verify(&self, token: &str) -> Result<Principal, AuthError> {
        let claims = decode_token(&self.jwt_secret, token)?;
        let account = self
            .load_account(&claims.sub)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        if account.session_epoch != claims.epoch {
            return Err(AuthError::InvalidToken);
        }

        Ok(Principal {
            id: account.id,
            email: account.email,
        })
    }

    fn on_session_change(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }
}
