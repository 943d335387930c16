//! Profile setup, edits, avatar upload and contact search.

use std::sync::Arc;

use rand::seq::SliceRandom;
use tracing::{info, warn};

use causerie_media::AssetUploader;
use causerie_shared::constants::{
    AVATAR_EMOJIS, COLLECTION_USERNAMES, COLLECTION_USERS, DEFAULT_ABOUT, PREFIX_CEILING,
    SEARCH_MIN_CHARS, SEARCH_RESULT_LIMIT,
};
use causerie_shared::validation::{
    normalize_username, search_keywords, validate_phone, validate_username,
};
use causerie_shared::{UserId, UserProfile};
use causerie_store::{
    Direction, DocumentPath, DocumentStore, Patch, Query, WriteBatch,
};

use crate::error::{ClientError, Result};
use crate::events::EventBus;
use crate::session::AuthUser;

pub struct ProfileService {
    store: Arc<dyn DocumentStore>,
    uploader: Arc<dyn AssetUploader>,
    events: EventBus,
}

impl ProfileService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        uploader: Arc<dyn AssetUploader>,
        events: EventBus,
    ) -> Self {
        Self {
            store,
            uploader,
            events,
        }
    }

    /// First-run setup: claim a username and write the profile document.
    ///
    /// The username reservation and the profile land in one atomic batch so a
    /// crash cannot leave a claimed name without a profile. Validation errors
    /// are returned for inline display; everything the user cannot fix in the
    /// form also raises a toast.
    pub async fn setup_profile(
        &self,
        user: &AuthUser,
        username_raw: &str,
        phone: &str,
    ) -> Result<UserProfile> {
        let username = normalize_username(username_raw);
        validate_username(&username)?;
        validate_phone(phone)?;

        let reservation = DocumentPath::new(COLLECTION_USERNAMES, username.as_str());
        if self.store.get(&reservation).await?.is_some() {
            self.events.toast_error("Username already exists");
            return Err(ClientError::UsernameTaken);
        }

        let display_name = user
            .display_name
            .clone()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| "User".to_string());
        let emoji = AVATAR_EMOJIS
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(AVATAR_EMOJIS[0]);

        let profile = UserProfile {
            uid: user.uid.clone(),
            display_name,
            email: user.email.clone(),
            photo_url: user.photo_url.clone(),
            phone_number: phone.trim().to_string(),
            username: username.clone(),
            about: DEFAULT_ABOUT.to_string(),
            search_keywords: search_keywords(&username),
            emoji: emoji.to_string(),
            created_at: None,
            last_seen: None,
        };

        let profile_patch = Patch::from_value(serde_json::to_value(&profile)?)
            .server_timestamp("createdAt");
        let mut batch = WriteBatch::new();
        batch
            .set(
                DocumentPath::new(COLLECTION_USERS, user.uid.as_str()),
                profile_patch,
            )
            .set(reservation, Patch::new().set("uid", user.uid.as_str()));

        match self.store.commit(batch).await {
            Ok(()) => {
                info!(uid = user.uid.short(), username = %username, "Profile created");
                self.events.toast_success("Profile created successfully!");
                Ok(profile)
            }
            Err(e) => {
                warn!(error = %e, "Profile setup failed");
                self.events.toast_error("Setup failed.");
                Err(e.into())
            }
        }
    }

    /// Edit the mutable profile fields. The username is not among them.
    pub async fn update_profile(
        &self,
        uid: &UserId,
        display_name: &str,
        about: &str,
        phone: &str,
    ) -> Result<()> {
        validate_phone(phone)?;

        let patch = Patch::new()
            .set("displayName", display_name.trim())
            .set("about", about.trim())
            .set("phoneNumber", phone.trim());
        match self
            .store
            .update(&DocumentPath::new(COLLECTION_USERS, uid.as_str()), patch)
            .await
        {
            Ok(()) => {
                self.events.toast_success("Profile updated!");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Profile update failed");
                self.events.toast_error("Failed to update profile");
                Err(e.into())
            }
        }
    }

    /// Upload a new avatar and point the profile at it. Returns the delivery
    /// URL on success.
    pub async fn update_avatar(
        &self,
        uid: &UserId,
        bytes: Vec<u8>,
        file_name: &str,
        mime_type: &str,
    ) -> Result<String> {
        let result = self.upload_and_link(uid, bytes, file_name, mime_type).await;
        match result {
            Ok(url) => {
                self.events.toast_success("Profile photo updated!");
                Ok(url)
            }
            Err(e) => {
                warn!(error = %e, "Avatar upload failed");
                self.events.toast_error("Failed to upload photo");
                Err(e)
            }
        }
    }

    async fn upload_and_link(
        &self,
        uid: &UserId,
        bytes: Vec<u8>,
        file_name: &str,
        mime_type: &str,
    ) -> Result<String> {
        let asset = self.uploader.upload(bytes, file_name, mime_type).await?;
        self.store
            .update(
                &DocumentPath::new(COLLECTION_USERS, uid.as_str()),
                Patch::new().set("photoURL", asset.secure_url.as_str()),
            )
            .await?;
        Ok(asset.secure_url)
    }

    /// Prefix search over usernames. Short terms return nothing rather than
    /// scanning the world; the caller's own profile is filtered out.
    pub async fn search_users(&self, me: &UserId, term: &str) -> Result<Vec<UserProfile>> {
        let term = term.trim().to_lowercase();
        if term.chars().count() < SEARCH_MIN_CHARS {
            return Ok(Vec::new());
        }

        let query = Query::new(COLLECTION_USERS)
            .where_gte("username", term.as_str())
            .where_lte("username", format!("{term}{PREFIX_CEILING}"))
            .order_by("username", Direction::Ascending)
            .limit(SEARCH_RESULT_LIMIT);

        let snapshot = self.store.query(&query).await?;
        let results = snapshot
            .into_iter()
            .filter_map(|doc| match doc.decode::<UserProfile>() {
                Ok(profile) => Some(profile),
                Err(e) => {
                    warn!(error = %e, id = doc.id, "Skipping malformed user document");
                    None
                }
            })
            .filter(|profile| profile.uid != *me)
            .collect();
        Ok(results)
    }
}
