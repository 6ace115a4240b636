//! Accounts, handles and profile edits.
//!
//! Handles are claimed through `handles/{lowercased handle}` documents so two
//! users can never hold the same handle, whatever its case.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use moodboard_auth::{AuthError, Principal, Session};
use moodboard_db::{Direction, FieldUpdate, FilterOp, Query, StoreError};
use moodboard_types::api::{ProfileView, UserSummary};
use moodboard_types::models::User;

use crate::MoodBoard;
use crate::collections::{HANDLES, USERS, decode_all, encode, summary};
use crate::error::{Error, Result, require};

pub const HANDLE_MIN: usize = 3;
pub const HANDLE_MAX: usize = 32;
pub const BIO_MAX_CHARS: usize = 280;
pub const AVATAR_MAX_BYTES: usize = 2 * 1024 * 1024;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HandleClaim {
    user_id: String,
}

#[derive(Debug, Clone)]
pub struct AvatarUpload {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Partial profile edit; `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub handle: Option<String>,
    /// An empty bio clears it.
    pub bio: Option<String>,
    pub avatar: Option<AvatarUpload>,
}

pub fn validate_handle(handle: &str) -> Result<String> {
    let handle = handle.trim();
    let len = handle.chars().count();
    if !(HANDLE_MIN..=HANDLE_MAX).contains(&len) {
        return Err(Error::Validation(format!(
            "handle must be {HANDLE_MIN} to {HANDLE_MAX} characters"
        )));
    }
    if !handle.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(Error::Validation(
            "handle may only contain letters, digits and underscores".into(),
        ));
    }
    Ok(handle.to_string())
}

fn avatar_extension(content_type: &str) -> Result<&'static str> {
    match content_type {
        "image/png" => Ok("png"),
        "image/jpeg" => Ok("jpg"),
        "image/gif" => Ok("gif"),
        "image/webp" => Ok("webp"),
        other => Err(Error::Validation(format!("unsupported avatar type: {other}"))),
    }
}

fn handle_key(handle: &str) -> String {
    handle.to_lowercase()
}

fn profile_view(user: User) -> ProfileView {
    ProfileView {
        friend_count: user.friends.len(),
        id: user.id,
        handle: user.handle,
        avatar_url: user.avatar_url,
        bio: user.bio,
    }
}

impl MoodBoard {
    async fn claim_handle(&self, handle: &str, user_id: &str) -> Result<()> {
        let claim = encode(&HandleClaim {
            user_id: user_id.to_string(),
        })?;
        match self.store.create(HANDLES, &handle_key(handle), claim).await {
            Ok(()) => Ok(()),
            Err(StoreError::AlreadyExists { .. }) => Err(AuthError::HandleTaken.into()),
            Err(e) => Err(e.into()),
        }
    }

    /// Create an identity and its profile document.
    ///
    /// The handle is claimed before the account exists, with no owner yet,
    /// so losing a race for it leaves no orphaned account behind.
    pub async fn register(&self, email: &str, handle: &str, password: &str) -> Result<(Session, User)> {
        let handle = validate_handle(handle)?;
        self.claim_handle(&handle, "").await?;

        let session = match self.identity.sign_up(email, password).await {
            Ok(session) => session,
            Err(e) => {
                if let Err(cleanup) = self.store.delete(HANDLES, &handle_key(&handle)).await {
                    warn!("Failed to release handle claim {}: {}", handle, cleanup);
                }
                return Err(e.into());
            }
        };
        let user_id = session.principal.id.clone();
        self.store
            .update(
                HANDLES,
                &handle_key(&handle),
                vec![FieldUpdate::set("userId", user_id.as_str())],
            )
            .await?;

        let user = User {
            id: user_id,
            handle,
            email: session.principal.email.clone(),
            avatar_url: None,
            bio: None,
            friends: Vec::new(),
            created_at: self.store.server_time(),
        };
        self.store.create(USERS, &user.id, encode(&user)?).await?;
        info!("Registered {} as {}", user.id, user.handle);
        Ok((session, user))
    }

    /// Sign in by handle. The handle is resolved to the account email first.
    pub async fn sign_in(&self, handle: &str, password: &str) -> Result<(Session, User)> {
        let handle = handle.trim();
        if handle.is_empty() || password.is_empty() {
            return Err(AuthError::InvalidCredentials.into());
        }
        let claim: HandleClaim = self
            .fetch(HANDLES, &handle_key(handle))
            .await?
            .ok_or(AuthError::UnknownUser)?;
        if claim.user_id.is_empty() {
            // Registration still in flight
            return Err(AuthError::UnknownUser.into());
        }
        let user: User = self
            .fetch(USERS, &claim.user_id)
            .await?
            .ok_or(AuthError::UnknownUser)?;

        let session = self.identity.sign_in(&user.email, password).await?;
        Ok((session, user))
    }

    pub async fn sign_out(&self, user_id: &str) -> Result<()> {
        require(user_id, "user id")?;
        self.identity.sign_out(user_id).await?;
        Ok(())
    }

    /// Resolve a session token to its principal.
    pub async fn authenticate(&self, token: &str) -> Result<Principal> {
        Ok(self.identity.verify(token).await?)
    }

    pub async fn get_user(&self, user_id: &str) -> Result<User> {
        require(user_id, "user id")?;
        self.fetch_required(USERS, user_id, "user").await
    }

    pub async fn get_profile(&self, user_id: &str) -> Result<ProfileView> {
        Ok(profile_view(self.get_user(user_id).await?))
    }

    /// Apply a profile edit. A new avatar is uploaded before the profile
    /// document is written so the stored URL always resolves.
    pub async fn update_profile(&self, user_id: &str, update: ProfileUpdate) -> Result<ProfileView> {
        require(user_id, "user id")?;
        let handle = update.handle.as_deref().map(validate_handle).transpose()?;
        let bio = update.bio.as_deref().map(str::trim);
        if let Some(bio) = bio {
            if bio.chars().count() > BIO_MAX_CHARS {
                return Err(Error::Validation(format!(
                    "bio is longer than {BIO_MAX_CHARS} characters"
                )));
            }
        }
        let avatar = match &update.avatar {
            Some(avatar) => {
                let ext = avatar_extension(&avatar.content_type)?;
                if avatar.bytes.is_empty() {
                    return Err(Error::Validation("avatar image is empty".into()));
                }
                if avatar.bytes.len() > AVATAR_MAX_BYTES {
                    return Err(Error::Validation("avatar image is larger than 2 MiB".into()));
                }
                Some((avatar, ext))
            }
            None => None,
        };

        let user = self.get_user(user_id).await?;
        let mut updates = Vec::new();

        if let Some((avatar, ext)) = avatar {
            let path = format!("avatars/{user_id}.{ext}");
            let blob = self.blobs.upload(&path, avatar.bytes.clone()).await?;
            updates.push(FieldUpdate::set("avatarUrl", self.blobs.url(&blob)));
        }

        let mut released_handle = None;
        if let Some(handle) = handle {
            if handle_key(&handle) != handle_key(&user.handle) {
                self.claim_handle(&handle, user_id).await?;
                released_handle = Some(handle_key(&user.handle));
            }
            if handle != user.handle {
                updates.push(FieldUpdate::set("handle", handle));
            }
        }

        match bio {
            Some("") => updates.push(FieldUpdate::Remove("bio".into())),
            Some(bio) => updates.push(FieldUpdate::set("bio", bio)),
            None => {}
        }

        if updates.is_empty() {
            return Ok(profile_view(user));
        }
        let updated: User = self.store.update(USERS, user_id, updates).await?.decode()?;

        if let Some(old) = released_handle {
            if let Err(e) = self.store.delete(HANDLES, &old).await {
                warn!("Failed to release handle {}: {}", old, e);
            }
        }
        info!("Profile {} updated", user_id);
        Ok(profile_view(updated))
    }

    /// Everyone who lists `user_id` as a friend, by handle.
    pub async fn list_friends(&self, user_id: &str) -> Result<Vec<UserSummary>> {
        require(user_id, "user id")?;
        let docs = self
            .store
            .query(
                USERS,
                Query::new()
                    .filter("friends", FilterOp::ArrayContains, user_id)
                    .order_by("handle", Direction::Asc),
            )
            .await?;
        let users: Vec<User> = decode_all(docs)?;
        Ok(users.iter().map(summary).collect())
    }
}
