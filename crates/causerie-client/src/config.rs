//! Client configuration loaded from environment variables.
//!
//! All settings have defaults so the client can start with zero configuration
//! for local development. Calls stay disabled until a call app id is set.

use causerie_media::{CallConfig, UploadConfig};

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the asset upload API, without a trailing slash.
    /// Env: `CAUSERIE_ASSET_HOST`
    /// Default: `https://assets.causerie.app`
    pub asset_host: String,

    /// Unsigned upload preset name passed along with every upload.
    /// Env: `CAUSERIE_UPLOAD_PRESET`
    /// Default: `causerie_unsigned`
    pub upload_preset: String,

    /// App id registered with the call room service.
    /// Env: `CAUSERIE_CALL_APP_ID`
    /// Default: empty (calls disabled, development only).
    pub call_app_id: String,

    /// Shared secret used to mint room tokens.
    /// Env: `CAUSERIE_CALL_SECRET`
    /// Default: empty (development only).
    pub call_secret: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            asset_host: "https://assets.causerie.app".to_string(),
            upload_preset: "causerie_unsigned".to_string(),
            call_app_id: String::new(),
            call_secret: String::new(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(host) = std::env::var("CAUSERIE_ASSET_HOST") {
            let host = host.trim_end_matches('/').to_string();
            if host.is_empty() {
                tracing::warn!("Empty CAUSERIE_ASSET_HOST, using default");
            } else {
                config.asset_host = host;
            }
        }

        if let Ok(preset) = std::env::var("CAUSERIE_UPLOAD_PRESET") {
            if !preset.is_empty() {
                config.upload_preset = preset;
            }
        }

        if let Ok(app_id) = std::env::var("CAUSERIE_CALL_APP_ID") {
            config.call_app_id = app_id;
        }

        if let Ok(secret) = std::env::var("CAUSERIE_CALL_SECRET") {
            config.call_secret = secret;
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }

    /// Upload settings for the media crate.
    pub fn upload(&self) -> UploadConfig {
        UploadConfig {
            endpoint: self.asset_host.clone(),
            preset: self.upload_preset.clone(),
        }
    }

    /// Call room settings for the media crate.
    pub fn call(&self) -> CallConfig {
        CallConfig {
            app_id: self.call_app_id.clone(),
            secret: self.call_secret.clone(),
        }
    }

    /// Calls stay hidden from the UI until an app id is configured.
    pub fn calls_enabled(&self) -> bool {
        !self.call_app_id.is_empty()
    }
}
