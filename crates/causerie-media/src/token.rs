//! Room access tokens for the call service.
//!
//! The SDK accepts any opaque token minted from the app credential pair, so
//! tokens are a keyed BLAKE3 MAC over the joining identity plus a nonce and
//! an expiry.  Verification recomputes the MAC; `Hash` equality is constant
//! time.

use chrono::{DateTime, Duration, Utc};

use causerie_shared::constants::ROOM_TOKEN_TTL_SECS;
use causerie_shared::{RoomId, UserId};

/// Credentials of the call service project.
#[derive(Debug, Clone)]
pub struct CallConfig {
    pub app_id: String,
    pub secret: String,
}

/// A minted token plus its expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomToken {
    /// `v1.{nonce}.{expiry}.{mac}`, all printable.
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

const KEY_CONTEXT: &str = "causerie 2024-05-12 room token mac";

/// Mint a token allowing `uid` into `room` for the standard TTL.
pub fn mint_room_token(config: &CallConfig, room: &RoomId, uid: &UserId) -> RoomToken {
    let nonce: [u8; 16] = rand::random();
    let expires_at = Utc::now() + Duration::seconds(ROOM_TOKEN_TTL_SECS);
    mint_room_token_at(config, room, uid, nonce, expires_at)
}

/// Deterministic variant backing [`mint_room_token`].
pub fn mint_room_token_at(
    config: &CallConfig,
    room: &RoomId,
    uid: &UserId,
    nonce: [u8; 16],
    expires_at: DateTime<Utc>,
) -> RoomToken {
    let nonce_hex = hex::encode(nonce);
    let expiry = expires_at.timestamp();
    let mac = sign(config, room, uid, &nonce_hex, expiry);
    RoomToken {
        token: format!("v1.{nonce_hex}.{expiry}.{}", mac.to_hex()),
        expires_at,
    }
}

/// Check a presented token against the same credentials.
pub fn verify_room_token(config: &CallConfig, room: &RoomId, uid: &UserId, token: &str) -> bool {
    verify_room_token_at(config, room, uid, token, Utc::now())
}

pub fn verify_room_token_at(
    config: &CallConfig,
    room: &RoomId,
    uid: &UserId,
    token: &str,
    now: DateTime<Utc>,
) -> bool {
    let mut parts = token.split('.');
    let (Some("v1"), Some(nonce_hex), Some(expiry), Some(mac), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return false;
    };

    let Ok(expiry) = expiry.parse::<i64>() else {
        return false;
    };
    if now.timestamp() > expiry {
        return false;
    }
    match hex::decode(nonce_hex) {
        Ok(bytes) if bytes.len() == 16 => {}
        _ => return false,
    }

    let Ok(presented) = blake3::Hash::from_hex(mac) else {
        return false;
    };
    sign(config, room, uid, nonce_hex, expiry) == presented
}

fn sign(
    config: &CallConfig,
    room: &RoomId,
    uid: &UserId,
    nonce_hex: &str,
    expiry: i64,
) -> blake3::Hash {
    let key = blake3::derive_key(KEY_CONTEXT, config.secret.as_bytes());
    // payload = app_id.room.uid.nonce.expiry
    let payload = format!("{}.{}.{}.{}.{}", config.app_id, room, uid, nonce_hex, expiry);
    blake3::keyed_hash(&key, payload.as_bytes())
}
