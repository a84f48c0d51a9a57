//! Bit-exact limit defaults shared by identifiers, the wire validator, and the room.
//!
//! These are real runtime constants, not advisory text: board_server exposes
//! matching environment overrides (see `board_server::config`), and these
//! values are what apply when no override is set.

/// Maximum size of a single inbound text frame, in UTF-8 bytes.
pub const MAX_MESSAGE_BYTES: usize = 65536;

/// Maximum length of a `BoardId`.
pub const MAX_BOARD_ID_CHARS: usize = 128;

/// Maximum length of a `UserId` or `GuestId`.
pub const MAX_USER_ID_CHARS: usize = 128;

/// Maximum length of a `ClientOpId`.
pub const MAX_CLIENT_OP_ID_CHARS: usize = 128;

/// Maximum length of an auth token (JWT or invite token) accepted by the validator.
pub const MAX_TOKEN_CHARS: usize = 4096;

/// Maximum length of a client-supplied display name.
pub const MAX_DISPLAY_NAME_CHARS: usize = 64;

/// Maximum length of a color string (e.g. `#rrggbb`).
pub const MAX_COLOR_CHARS: usize = 32;

/// Maximum number of ids in a `selectionChanged` payload.
pub const MAX_SELECTION_IDS: usize = 200;

/// Maximum length of a text object's `text` field.
pub const MAX_TEXT_CHARS: usize = 10_000;

/// Maximum number of points in a freehand/line stroke.
pub const MAX_STROKE_POINTS: usize = 50_000;

/// Maximum number of live objects on one board.
pub const MAX_OBJECTS_PER_BOARD: usize = 5_000;

/// Minimum/maximum accepted `strokeWidth`.
pub const MIN_STROKE_WIDTH: f64 = 0.0;
pub const MAX_STROKE_WIDTH: f64 = 200.0;

/// Minimum/maximum accepted `fontSize`.
pub const MIN_FONT_SIZE: f64 = 1.0;
pub const MAX_FONT_SIZE: f64 = 512.0;

/// Minimum/maximum accepted viewport `zoom`.
pub const MIN_ZOOM: f64 = 0.01;
pub const MAX_ZOOM: f64 = 100.0;

/// How long a session has to send a valid `join` before it is closed.
pub const JOIN_TIMEOUT_SECS: u64 = 10;

/// TTL for idempotency records keyed by `clientOpId`.
pub const PROCESSED_OP_TTL_SECS: u64 = 300;

/// Snapshot cadence: persist after this many accepted ops since the last snapshot.
pub const SNAPSHOT_OP_INTERVAL: u64 = 50;

/// Snapshot cadence: persist after this many milliseconds since the last persist,
/// provided at least one op has been accepted.
pub const SNAPSHOT_TIME_MS: u64 = 10_000;

/// Floor between successive snapshot persist attempts.
pub const SNAPSHOT_MIN_RETRY_MS: u64 = 5_000;

/// Per-session op rate limit window.
pub const MAX_OPS_PER_10S_PER_CLIENT: u32 = 30;

/// Per-session presence rate limit window.
pub const MAX_PRESENCE_PER_10S_PER_CLIENT: u32 = 20;

/// Per-IP join attempt rate limit window (60s rolling).
pub const MAX_JOIN_ATTEMPTS_PER_MINUTE_PER_IP: u32 = 30;

/// The operationally-tunable subset of the limits above: rate limits, snapshot
/// cadence, join timeout, max message size, and the board object cap. These
/// are the knobs an operator plausibly needs to adjust without a rebuild, so
/// `board_server::config` allows overriding each field from the environment
/// (see SPEC_FULL.md §10.3). The wire-shape structural caps (identifier
/// lengths, stroke point counts, color/text length, zoom/strokeWidth/fontSize
/// ranges) stay compile-time constants: they are baked into `BoardId` and
/// friends' types and into the client/server schema both sides must already
/// agree on out of band, so a rebuild is the right change-control for them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Limits {
	pub max_message_bytes: usize,
	pub max_objects_per_board: usize,
	pub join_timeout_secs: u64,
	pub processed_op_ttl_secs: u64,
	pub snapshot_op_interval: u64,
	pub snapshot_time_ms: u64,
	pub snapshot_min_retry_ms: u64,
	pub max_ops_per_10s_per_client: u32,
	pub max_presence_per_10s_per_client: u32,
	pub max_join_attempts_per_minute_per_ip: u32,
}

impl Default for Limits {
	fn default() -> Self {
		Self {
			max_message_bytes: MAX_MESSAGE_BYTES,
			max_objects_per_board: MAX_OBJECTS_PER_BOARD,
			join_timeout_secs: JOIN_TIMEOUT_SECS,
			processed_op_ttl_secs: PROCESSED_OP_TTL_SECS,
			snapshot_op_interval: SNAPSHOT_OP_INTERVAL,
			snapshot_time_ms: SNAPSHOT_TIME_MS,
			snapshot_min_retry_ms: SNAPSHOT_MIN_RETRY_MS,
			max_ops_per_10s_per_client: MAX_OPS_PER_10S_PER_CLIENT,
			max_presence_per_10s_per_client: MAX_PRESENCE_PER_10S_PER_CLIENT,
			max_join_attempts_per_minute_per_ip: MAX_JOIN_ATTEMPTS_PER_MINUTE_PER_IP,
		}
	}
}
