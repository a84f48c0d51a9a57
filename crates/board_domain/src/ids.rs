use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::limits::{MAX_BOARD_ID_CHARS, MAX_CLIENT_OP_ID_CHARS, MAX_USER_ID_CHARS};

/// Errors for parsing/constructing bounded identifiers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseIdError {
	#[error("empty value")]
	Empty,
	#[error("value too long: {len} chars, max {max}")]
	TooLong { len: usize, max: usize },
	#[error("invalid format: {0}")]
	InvalidFormat(String),
}

macro_rules! bounded_id {
	($name:ident, $max:expr, $doc:expr) => {
		#[doc = $doc]
		#[derive(Debug, Clone, PartialEq, Eq, Hash)]
		pub struct $name(String);

		impl $name {
			/// Construct a bounded, non-empty identifier.
			pub fn new(id: impl Into<String>) -> Result<Self, ParseIdError> {
				let id = id.into();
				if id.trim().is_empty() {
					return Err(ParseIdError::Empty);
				}
				if id.chars().count() > $max {
					return Err(ParseIdError::TooLong { len: id.chars().count(), max: $max });
				}
				Ok(Self(id))
			}

			pub fn as_str(&self) -> &str {
				&self.0
			}

			pub fn into_string(self) -> String {
				self.0
			}
		}

		impl fmt::Display for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				f.write_str(&self.0)
			}
		}

		impl FromStr for $name {
			type Err = ParseIdError;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				$name::new(s.to_string())
			}
		}

		// Deliberately not `#[serde(transparent)]`: that would deserialize
		// straight into the inner `String` and skip `new()` entirely, so the
		// length/non-empty cap would never apply to inbound frames. Routing
		// through `new()` here is what makes the cap a real wire-format
		// validation instead of a constructor-only convenience.
		impl Serialize for $name {
			fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
			where
				S: serde::Serializer,
			{
				serializer.serialize_str(&self.0)
			}
		}

		impl<'de> Deserialize<'de> for $name {
			fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
			where
				D: serde::Deserializer<'de>,
			{
				let raw = String::deserialize(deserializer)?;
				$name::new(raw).map_err(serde::de::Error::custom)
			}
		}
	};
}

bounded_id!(BoardId, MAX_BOARD_ID_CHARS, "Opaque identifier for one board.");
bounded_id!(UserId, MAX_USER_ID_CHARS, "Identifier of an authenticated (owner/invite) user.");
bounded_id!(GuestId, MAX_USER_ID_CHARS, "Identifier of an unauthenticated guest.");
bounded_id!(ClientOpId, MAX_CLIENT_OP_ID_CHARS, "Client-chosen id for retry-safe op submission.");

/// The room's monotonic operation counter.
pub type Seq = u64;

/// A session's resolved role on a board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
	Owner,
	Editor,
	Viewer,
}

impl Role {
	pub const fn as_str(self) -> &'static str {
		match self {
			Role::Owner => "owner",
			Role::Editor => "editor",
			Role::Viewer => "viewer",
		}
	}

	/// Viewers may never mutate board state.
	pub const fn can_write(self) -> bool {
		!matches!(self, Role::Viewer)
	}
}

impl fmt::Display for Role {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for Role {
	type Err = ParseIdError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"owner" => Ok(Role::Owner),
			"editor" => Ok(Role::Editor),
			"viewer" => Ok(Role::Viewer),
			other => Err(ParseIdError::InvalidFormat(format!("unknown role: {other}"))),
		}
	}
}

/// Author key resolved for attribution: `userId` if present, else `guestId`, else `"unknown"`.
///
/// This is the identity broadcast with an op; it is not itself a trust claim
/// beyond what the `AuthResolver` already produced for the session.
pub fn author_key(user_id: Option<&UserId>, guest_id: Option<&GuestId>) -> String {
	if let Some(u) = user_id {
		u.as_str().to_string()
	} else if let Some(g) = guest_id {
		g.as_str().to_string()
	} else {
		"unknown".to_string()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn board_id_rejects_empty_and_oversize() {
		assert!(BoardId::new("").is_err());
		assert!(BoardId::new("   ").is_err());
		assert!(BoardId::new("b1").is_ok());
		let long = "x".repeat(MAX_BOARD_ID_CHARS + 1);
		assert!(matches!(BoardId::new(long), Err(ParseIdError::TooLong { .. })));
	}

	#[test]
	fn role_parse_and_display_roundtrip() {
		assert_eq!("owner".parse::<Role>().unwrap(), Role::Owner);
		assert_eq!("VIEWER".parse::<Role>().unwrap(), Role::Viewer);
		assert_eq!(Role::Editor.to_string(), "editor");
		assert!("admin".parse::<Role>().is_err());
	}

	#[test]
	fn viewers_cannot_write() {
		assert!(!Role::Viewer.can_write());
		assert!(Role::Editor.can_write());
		assert!(Role::Owner.can_write());
	}

	#[test]
	fn author_key_prefers_user_then_guest_then_unknown() {
		let u = UserId::new("u1").unwrap();
		let g = GuestId::new("g1").unwrap();
		assert_eq!(author_key(Some(&u), Some(&g)), "u1");
		assert_eq!(author_key(None, Some(&g)), "g1");
		assert_eq!(author_key(None, None), "unknown");
	}

	#[test]
	fn deserialize_enforces_the_same_caps_as_new() {
		let ok: ClientOpId = serde_json::from_str(r#""c1""#).unwrap();
		assert_eq!(ok.as_str(), "c1");

		let empty: Result<ClientOpId, _> = serde_json::from_str(r#""""#);
		assert!(empty.is_err());

		let oversize = format!(r#""{}""#, "x".repeat(MAX_CLIENT_OP_ID_CHARS + 1));
		let oversize: Result<ClientOpId, _> = serde_json::from_str(&oversize);
		assert!(oversize.is_err());
	}

	#[test]
	fn serialize_round_trips_as_a_plain_string() {
		let id = BoardId::new("b1").unwrap();
		let json = serde_json::to_string(&id).unwrap();
		assert_eq!(json, r#""b1""#);
		let back: BoardId = serde_json::from_str(&json).unwrap();
		assert_eq!(back, id);
	}
}
