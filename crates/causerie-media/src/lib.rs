//! # causerie-media
//!
//! Device and network media for Causerie: microphone capture for voice
//! messages, synthesized notification cues, asset uploads to the hosted
//! media service, and the boundary to the embedded video-call SDK.

pub mod cues;
pub mod recorder;
pub mod token;
pub mod transport;
pub mod upload;

mod error;

pub use cues::{Cue, CuePlayer, ToneCuePlayer};
pub use error::{MediaError, Result};
pub use recorder::{VoiceCapture, VoiceRecorder};
pub use token::{mint_room_token, verify_room_token, CallConfig, RoomToken};
pub use transport::{CallTransport, LeaveCallback};
pub use upload::{AssetUploader, MediaUploader, UploadConfig, UploadedAsset};
