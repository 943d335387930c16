/// Application name
pub const APP_NAME: &str = "Causerie";

/// Collection of user profile documents, keyed by uid
pub const COLLECTION_USERS: &str = "users";

/// Collection of username reservations, keyed by the username itself
pub const COLLECTION_USERNAMES: &str = "usernames";

/// Collection of conversation metadata documents
pub const COLLECTION_CHATS: &str = "chats";

/// Message subcollection name under each conversation document
pub const SUBCOLLECTION_MESSAGES: &str = "messages";

/// Collection of call intent documents
pub const COLLECTION_CALLS: &str = "calls";

/// Sender id recorded on synthetic system previews
pub const SYSTEM_SENDER: &str = "system";

/// Preview text written when a conversation is first created
pub const CHAT_CREATED_PREVIEW: &str = "✨ Chat created";

/// Message body announcing a started video call
pub const CALL_STARTED_TEXT: &str = "📞 Started a video call";

/// Default bio stamped on new profiles
pub const DEFAULT_ABOUT: &str = "Hey there! I am using Causerie";

/// Fallback avatar emojis, one picked at random at profile creation
pub const AVATAR_EMOJIS: [&str; 11] = [
    "🐶", "🐱", "🐼", "🐨", "🐸", "🦄", "🐙", "🦋", "🐞", "🦖", "🌟",
];

/// Minimum username length accepted at profile setup
pub const USERNAME_MIN_CHARS: usize = 3;

/// Minimum phone number length accepted at profile setup
pub const PHONE_MIN_CHARS: usize = 6;

/// Minimum search term length before a prefix search is issued
pub const SEARCH_MIN_CHARS: usize = 3;

/// Maximum results returned by a user prefix search
pub const SEARCH_RESULT_LIMIT: usize = 10;

/// Upper bound codepoint closing a prefix range query
pub const PREFIX_CEILING: char = '\u{f8ff}';

/// Typing flag debounce: inactivity before the flag is cleared
pub const TYPING_DEBOUNCE_MS: u64 = 2_000;

/// Presence heartbeat interval in seconds
pub const HEARTBEAT_INTERVAL_SECS: u64 = 60;

/// A user is presented online while their last heartbeat is younger than this
pub const PRESENCE_WINDOW_SECS: i64 = 120;

/// How long a toast stays on screen
pub const TOAST_DURATION_MS: u64 = 4_000;

/// Message alert playback volume (0.0..=1.0)
pub const MESSAGE_ALERT_VOLUME: f32 = 0.5;

/// Room access token lifetime in seconds
pub const ROOM_TOKEN_TTL_SECS: i64 = 3_600;
