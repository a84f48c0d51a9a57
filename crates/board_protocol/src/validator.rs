//! Parses and structurally validates inbound client frames before the room
//! sees them: size, UTF-8, JSON shape, and per-field length/range caps.

use board_domain::limits::{
	MAX_COLOR_CHARS, MAX_DISPLAY_NAME_CHARS, MAX_FONT_SIZE, MAX_MESSAGE_BYTES, MAX_SELECTION_IDS,
	MAX_STROKE_POINTS, MAX_STROKE_WIDTH, MAX_TEXT_CHARS, MAX_TOKEN_CHARS, MAX_USER_ID_CHARS, MAX_ZOOM,
	MIN_FONT_SIZE, MIN_STROKE_WIDTH, MIN_ZOOM,
};
use board_domain::{BoardEvent, BoardEventPayload, Object, ObjectPatch, PresenceEntry, Viewport};
use thiserror::Error;

use crate::messages::{AuthPayload, ClientMessage};

/// A rejection from the validator. Each variant maps to exactly one wire
/// `ErrorCode` (see `board_server`'s error mapping) so the caller never has
/// to guess which code to report.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
	#[error("frame too large: {len} bytes exceeds max {max}")]
	Oversize { len: usize, max: usize },

	#[error("malformed JSON: {0}")]
	MalformedJson(String),

	#[error("boardId mismatch between envelope and embedded event")]
	BoardIdMismatch,

	#[error("field out of range: {0}")]
	FieldOutOfRange(String),

	#[error("binary frames are not accepted")]
	BinaryFrame,
}

/// Stateless parser/validator for inbound client frames.
pub struct Validator;

impl Validator {
	/// Parse and validate one text frame against the bit-exact default
	/// `MAX_MESSAGE_BYTES`. Most callers should use
	/// [`Validator::parse_client_message_with_limit`] with the deployment's
	/// configured limit instead.
	pub fn parse_client_message(text: &str) -> Result<ClientMessage, ValidationError> {
		Self::parse_client_message_with_limit(text, MAX_MESSAGE_BYTES)
	}

	/// Parse and validate one text frame. `text.len()` is measured in UTF-8
	/// bytes, matching `MAX_MESSAGE_BYTES`'s definition. `max_message_bytes`
	/// lets the caller apply a runtime-configured override (see
	/// `board_domain::limits::Limits`) instead of the bit-exact default.
	pub fn parse_client_message_with_limit(
		text: &str,
		max_message_bytes: usize,
	) -> Result<ClientMessage, ValidationError> {
		if text.len() > max_message_bytes {
			return Err(ValidationError::Oversize { len: text.len(), max: max_message_bytes });
		}

		let msg: ClientMessage =
			serde_json::from_str(text).map_err(|e| ValidationError::MalformedJson(e.to_string()))?;

		Self::validate(&msg)?;
		Ok(msg)
	}

	fn validate(msg: &ClientMessage) -> Result<(), ValidationError> {
		match msg {
			ClientMessage::Join { auth, client, .. } => {
				validate_auth_payload(auth)?;
				if let Some(client) = client {
					if let Some(name) = &client.display_name {
						check_len("client.displayName", name, MAX_DISPLAY_NAME_CHARS)?;
					}
					if let Some(color) = &client.color {
						check_len("client.color", color, MAX_COLOR_CHARS)?;
					}
					if let Some(guest_id) = &client.guest_id {
						check_len("client.guestId", guest_id, MAX_USER_ID_CHARS)?;
					}
				}
				Ok(())
			}
			ClientMessage::Op { board_id, op, .. } => {
				if *board_id != op.board_id {
					return Err(ValidationError::BoardIdMismatch);
				}
				validate_board_event(op)
			}
			ClientMessage::Presence { presence, .. } => validate_presence(presence),
			ClientMessage::Ping { .. } => Ok(()),
		}
	}
}

fn validate_auth_payload(auth: &AuthPayload) -> Result<(), ValidationError> {
	match auth {
		AuthPayload::Owner { supabase_jwt } => check_len("auth.supabaseJwt", supabase_jwt, MAX_TOKEN_CHARS),
		AuthPayload::Invite { invite_token } => check_len("auth.inviteToken", invite_token, MAX_TOKEN_CHARS),
	}
}

fn validate_board_event(event: &BoardEvent) -> Result<(), ValidationError> {
	match &event.payload {
		BoardEventPayload::ObjectCreated { object } => validate_object(object),
		BoardEventPayload::ObjectUpdated { patch, .. } => validate_patch(patch),
		BoardEventPayload::ObjectDeleted { .. } => Ok(()),
		BoardEventPayload::SelectionChanged { selected_ids } => check_selection_ids(selected_ids),
		BoardEventPayload::ViewportChanged { viewport } => validate_viewport(viewport),
	}
}

fn validate_presence(presence: &PresenceEntry) -> Result<(), ValidationError> {
	if let Some(ids) = &presence.selection_ids {
		check_selection_ids(ids)?;
	}
	if let Some(viewport) = &presence.viewport {
		validate_viewport(viewport)?;
	}
	Ok(())
}

fn validate_object(object: &Object) -> Result<(), ValidationError> {
	check_range("strokeWidth", object.stroke_width, MIN_STROKE_WIDTH, MAX_STROKE_WIDTH)?;
	check_range("fontSize", object.font_size, MIN_FONT_SIZE, MAX_FONT_SIZE)?;
	if let Some(text) = &object.text {
		check_len("text", text, MAX_TEXT_CHARS)?;
	}
	if let Some(points) = &object.points {
		check_count("points", points.len(), MAX_STROKE_POINTS)?;
	}
	if let Some(waypoints) = &object.waypoints {
		check_count("waypoints", waypoints.len(), MAX_STROKE_POINTS)?;
	}
	Ok(())
}

fn validate_patch(patch: &ObjectPatch) -> Result<(), ValidationError> {
	check_range("strokeWidth", patch.stroke_width, MIN_STROKE_WIDTH, MAX_STROKE_WIDTH)?;
	check_range("fontSize", patch.font_size, MIN_FONT_SIZE, MAX_FONT_SIZE)?;
	if let Some(text) = &patch.text {
		check_len("text", text, MAX_TEXT_CHARS)?;
	}
	if let Some(points) = &patch.points {
		check_count("points", points.len(), MAX_STROKE_POINTS)?;
	}
	if let Some(waypoints) = &patch.waypoints {
		check_count("waypoints", waypoints.len(), MAX_STROKE_POINTS)?;
	}
	Ok(())
}

fn validate_viewport(viewport: &Viewport) -> Result<(), ValidationError> {
	if viewport.zoom < MIN_ZOOM || viewport.zoom > MAX_ZOOM {
		return Err(ValidationError::FieldOutOfRange(format!(
			"viewport.zoom must be within {MIN_ZOOM}..{MAX_ZOOM}, got {}",
			viewport.zoom
		)));
	}
	Ok(())
}

fn check_selection_ids(ids: &[String]) -> Result<(), ValidationError> {
	check_count("selectionIds", ids.len(), MAX_SELECTION_IDS)
}

fn check_len(field: &str, value: &str, max: usize) -> Result<(), ValidationError> {
	if value.chars().count() > max {
		return Err(ValidationError::FieldOutOfRange(format!("{field} exceeds max length {max}")));
	}
	Ok(())
}

fn check_count(field: &str, count: usize, max: usize) -> Result<(), ValidationError> {
	if count > max {
		return Err(ValidationError::FieldOutOfRange(format!("{field} exceeds max count {max}")));
	}
	Ok(())
}

fn check_range(field: &str, value: Option<f64>, min: f64, max: f64) -> Result<(), ValidationError> {
	if let Some(v) = value {
		if v < min || v > max {
			return Err(ValidationError::FieldOutOfRange(format!("{field} must be within {min}..{max}, got {v}")));
		}
	}
	Ok(())
}
