//! The client↔server JSON wire schema.

use std::collections::HashMap;

use board_domain::{BoardEvent, BoardId, BoardState, ClientOpId, PresenceEntry, Role, Seq};
use serde::{Deserialize, Serialize};

/// The two supported join credentials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum AuthPayload {
	Owner { supabase_jwt: String },
	Invite { invite_token: String },
}

/// Optional client-supplied presentation for a session that has no account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
	#[serde(skip_serializing_if = "Option::is_none", default)]
	pub guest_id: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none", default)]
	pub display_name: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none", default)]
	pub color: Option<String>,
}

/// Messages a client may send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
	Join {
		board_id: BoardId,
		auth: AuthPayload,
		#[serde(skip_serializing_if = "Option::is_none", default)]
		client_known_seq: Option<Seq>,
		#[serde(skip_serializing_if = "Option::is_none", default)]
		client: Option<ClientInfo>,
	},
	Op {
		board_id: BoardId,
		client_op_id: ClientOpId,
		base_seq: u64,
		op: BoardEvent,
	},
	Presence {
		board_id: BoardId,
		presence: PresenceEntry,
	},
	Ping {
		t: i64,
	},
}

/// One entry in a roster sent with `joined`/`presence`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
	pub user_id: String,
	#[serde(skip_serializing_if = "Option::is_none", default)]
	pub display_name: Option<String>,
	pub role: Role,
	#[serde(skip_serializing_if = "Option::is_none", default)]
	pub color: Option<String>,
}

/// Error codes sent on the wire; see `board_server`'s error taxonomy for how
/// internal failures map onto these without leaking detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
	BadRequest,
	Unauthorized,
	Forbidden,
	NotFound,
	RateLimited,
	PayloadTooLarge,
	ServerError,
}

/// Messages the server may send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
	Hello {
		max_message_bytes: usize,
	},
	Joined {
		board_id: BoardId,
		role: Role,
		seq: Seq,
		#[serde(skip_serializing_if = "Option::is_none", default)]
		snapshot: Option<BoardState>,
		#[serde(skip_serializing_if = "Option::is_none", default)]
		snapshot_seq: Option<Seq>,
		#[serde(skip_serializing_if = "Option::is_none", default)]
		users: Option<Vec<RosterEntry>>,
	},
	Op {
		board_id: BoardId,
		seq: Seq,
		op: BoardEvent,
		author_id: String,
		#[serde(skip_serializing_if = "Option::is_none", default)]
		client_op_id: Option<ClientOpId>,
	},
	Presence {
		board_id: BoardId,
		users: Vec<RosterEntry>,
		#[serde(skip_serializing_if = "Option::is_none", default)]
		presence_by_user_id: Option<HashMap<String, PresenceEntry>>,
	},
	Error {
		#[serde(skip_serializing_if = "Option::is_none", default)]
		board_id: Option<BoardId>,
		code: ErrorCode,
		message: String,
		#[serde(skip_serializing_if = "Option::is_none", default)]
		fatal: Option<bool>,
	},
	Pong {
		t: i64,
	},
}

impl ServerMessage {
	/// `max_message_bytes` should reflect the deployment's configured limit
	/// (see `board_domain::limits::Limits`), not necessarily the bit-exact
	/// default, so a client can size its own frames correctly.
	pub fn hello(max_message_bytes: usize) -> Self {
		ServerMessage::Hello { max_message_bytes }
	}

	pub fn error(board_id: Option<BoardId>, code: ErrorCode, message: impl Into<String>, fatal: bool) -> Self {
		ServerMessage::Error { board_id, code, message: message.into(), fatal: if fatal { Some(true) } else { None } }
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use board_domain::{BoardEventPayload, Object, ObjectKind};

	#[test]
	fn join_message_roundtrips() {
		let msg = ClientMessage::Join {
			board_id: BoardId::new("b1").unwrap(),
			auth: AuthPayload::Invite { invite_token: "tok".into() },
			client_known_seq: Some(3),
			client: Some(ClientInfo { guest_id: Some("g1".into()), display_name: None, color: None }),
		};
		let json = serde_json::to_string(&msg).unwrap();
		let back: ClientMessage = serde_json::from_str(&json).unwrap();
		assert_eq!(msg, back);
	}

	#[test]
	fn op_message_embeds_board_event() {
		let object = Object {
			id: "o1".into(),
			kind: ObjectKind::Rectangle,
			x: 0.0,
			y: 0.0,
			width: 1.0,
			height: 1.0,
			stroke_color: None,
			fill_color: None,
			text_color: None,
			stroke_width: None,
			font_size: None,
			text: None,
			points: None,
			waypoints: None,
			from: None,
			to: None,
		};
		let msg = ClientMessage::Op {
			board_id: BoardId::new("b1").unwrap(),
			client_op_id: ClientOpId::new("c1").unwrap(),
			base_seq: 0,
			op: BoardEvent {
				id: "e1".into(),
				board_id: BoardId::new("b1").unwrap(),
				timestamp: 0,
				payload: BoardEventPayload::ObjectCreated { object },
			},
		};
		let json = serde_json::to_string(&msg).unwrap();
		assert!(json.contains("\"type\":\"op\""));
		let back: ClientMessage = serde_json::from_str(&json).unwrap();
		assert_eq!(msg, back);
	}

	#[test]
	fn error_code_uses_snake_case_on_the_wire() {
		let json = serde_json::to_string(&ErrorCode::RateLimited).unwrap();
		assert_eq!(json, "\"rate_limited\"");
	}

	#[test]
	fn server_message_hello_reports_configured_max() {
		let hello = ServerMessage::hello(16_384);
		let json = serde_json::to_value(&hello).unwrap();
		assert_eq!(json["maxMessageBytes"], 16_384);
	}
}
