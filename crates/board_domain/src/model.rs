//! The board data model: objects, events, and the authoritative board state.
//!
//! `BoardState` is mutated only by [`crate::ids::Role::can_write`]-gated ops
//! running through a reducer (see `board_server::reducer`); this crate only
//! defines the shapes, not the mutation logic.

use serde::{Deserialize, Serialize};

use crate::ids::BoardId;

/// The kind of canvas object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ObjectKind {
	Freehand,
	Line,
	Rectangle,
	Ellipse,
	Diamond,
	RoundedRect,
	Text,
	StickyNote,
	Connector,
}

/// A board type, fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BoardType {
	Advanced,
	Freehand,
	Mindmap,
}

impl Default for BoardType {
	fn default() -> Self {
		BoardType::Advanced
	}
}

/// A 2D point, used for stroke/connector point lists and fallback anchors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
	pub x: f64,
	pub y: f64,
}

/// Which edge of a rectangle-ish object an `edgeT` attachment refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Edge {
	Top,
	Right,
	Bottom,
	Left,
}

/// How a connector endpoint attaches to its target object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Attachment {
	Port { port_id: String },
	EdgeT { edge: Edge, t: f64 },
	PerimeterAngle { angle_rad: f64 },
	Fallback { anchor: Point },
}

/// One end of a connector: an optional target object plus how it attaches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
	/// Target object id. Connectors reference other objects by id, not by
	/// ownership; a dangling reference (target deleted) is permitted and is
	/// never silently healed by the room.
	#[serde(skip_serializing_if = "Option::is_none", default)]
	pub object_id: Option<String>,
	pub attachment: Attachment,
}

/// A single canvas object. Fields not meaningful for a given `kind` are
/// simply absent on the wire and `None` here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Object {
	pub id: String,
	#[serde(rename = "type")]
	pub kind: ObjectKind,
	pub x: f64,
	pub y: f64,
	pub width: f64,
	pub height: f64,
	#[serde(skip_serializing_if = "Option::is_none", default)]
	pub stroke_color: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none", default)]
	pub fill_color: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none", default)]
	pub text_color: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none", default)]
	pub stroke_width: Option<f64>,
	#[serde(skip_serializing_if = "Option::is_none", default)]
	pub font_size: Option<f64>,
	#[serde(skip_serializing_if = "Option::is_none", default)]
	pub text: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none", default)]
	pub points: Option<Vec<Point>>,
	#[serde(skip_serializing_if = "Option::is_none", default)]
	pub waypoints: Option<Vec<Point>>,
	#[serde(skip_serializing_if = "Option::is_none", default)]
	pub from: Option<Endpoint>,
	#[serde(skip_serializing_if = "Option::is_none", default)]
	pub to: Option<Endpoint>,
}

/// A field-by-field patch applied to an existing object by `objectUpdated`.
///
/// Each `Some` field overwrites the corresponding field on the target object;
/// `None` leaves it unchanged. This does not distinguish "leave unchanged"
/// from "clear to absent" for optional fields (e.g. `text`) — a patch can set
/// a new value but not unset one back to `None`. That asymmetry is accepted
/// here; nothing in the room spec exercises unsetting an optional field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectPatch {
	#[serde(skip_serializing_if = "Option::is_none", default)]
	pub x: Option<f64>,
	#[serde(skip_serializing_if = "Option::is_none", default)]
	pub y: Option<f64>,
	#[serde(skip_serializing_if = "Option::is_none", default)]
	pub width: Option<f64>,
	#[serde(skip_serializing_if = "Option::is_none", default)]
	pub height: Option<f64>,
	#[serde(skip_serializing_if = "Option::is_none", default)]
	pub stroke_color: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none", default)]
	pub fill_color: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none", default)]
	pub text_color: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none", default)]
	pub stroke_width: Option<f64>,
	#[serde(skip_serializing_if = "Option::is_none", default)]
	pub font_size: Option<f64>,
	#[serde(skip_serializing_if = "Option::is_none", default)]
	pub text: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none", default)]
	pub points: Option<Vec<Point>>,
	#[serde(skip_serializing_if = "Option::is_none", default)]
	pub waypoints: Option<Vec<Point>>,
	#[serde(skip_serializing_if = "Option::is_none", default)]
	pub from: Option<Endpoint>,
	#[serde(skip_serializing_if = "Option::is_none", default)]
	pub to: Option<Endpoint>,
}

impl ObjectPatch {
	/// Apply this patch to `object` in place, field by field.
	pub fn apply_to(&self, object: &mut Object) {
		macro_rules! set_if_some {
			($field:ident) => {
				if let Some(v) = self.$field.clone() {
					object.$field = v;
				}
			};
		}
		if let Some(v) = self.x {
			object.x = v;
		}
		if let Some(v) = self.y {
			object.y = v;
		}
		if let Some(v) = self.width {
			object.width = v;
		}
		if let Some(v) = self.height {
			object.height = v;
		}
		set_if_some!(stroke_color);
		set_if_some!(fill_color);
		set_if_some!(text_color);
		set_if_some!(stroke_width);
		set_if_some!(font_size);
		set_if_some!(text);
		set_if_some!(points);
		set_if_some!(waypoints);
		set_if_some!(from);
		set_if_some!(to);
	}
}

/// Client viewport (pan + zoom), used by `viewportChanged` and presence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
	pub x: f64,
	pub y: f64,
	pub zoom: f64,
}

/// A cursor position broadcast via presence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CursorPos {
	pub x: f64,
	pub y: f64,
}

/// The tagged event payload applied by the reducer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum BoardEventPayload {
	ObjectCreated { object: Object },
	ObjectUpdated { object_id: String, patch: ObjectPatch },
	ObjectDeleted { object_id: String },
	SelectionChanged { selected_ids: Vec<String> },
	ViewportChanged { viewport: Viewport },
}

impl BoardEventPayload {
	/// `true` for events that only touch ephemeral (non-persisted) state.
	pub const fn is_ephemeral(&self) -> bool {
		matches!(self, BoardEventPayload::SelectionChanged { .. } | BoardEventPayload::ViewportChanged { .. })
	}
}

/// One board event, as carried inside a client `op` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardEvent {
	pub id: String,
	pub board_id: BoardId,
	pub timestamp: i64,
	#[serde(flatten)]
	pub payload: BoardEventPayload,
}

/// Board-level metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardMeta {
	pub id: BoardId,
	pub name: String,
	pub board_type: BoardType,
	pub created_at: i64,
	pub updated_at: i64,
}

/// The authoritative, single-writer state of one board.
///
/// `selected_object_ids` is ephemeral: it is carried in memory and in the
/// `joined`/`op` wire representation, but a persisted snapshot always carries
/// it empty (see `sanitize_for_snapshot`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardState {
	pub meta: BoardMeta,
	pub objects: Vec<Object>,
	#[serde(default)]
	pub selected_object_ids: Vec<String>,
}

impl BoardState {
	/// An empty board, as synthesized when no board info exists yet.
	pub fn empty(id: BoardId, name: String, board_type: BoardType, now_ms: i64) -> Self {
		Self {
			meta: BoardMeta { id, name, board_type, created_at: now_ms, updated_at: now_ms },
			objects: Vec::new(),
			selected_object_ids: Vec::new(),
		}
	}

	pub fn find_object(&self, object_id: &str) -> Option<&Object> {
		self.objects.iter().find(|o| o.id == object_id)
	}

	pub fn contains_object(&self, object_id: &str) -> bool {
		self.objects.iter().any(|o| o.id == object_id)
	}

	/// A sanitized copy suitable for snapshot persistence: no ephemeral fields.
	pub fn sanitize_for_snapshot(&self) -> Self {
		let mut copy = self.clone();
		copy.selected_object_ids.clear();
		copy
	}
}

/// Ephemeral per-user presence payload, as submitted by `presence` messages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceEntry {
	#[serde(skip_serializing_if = "Option::is_none", default)]
	pub cursor: Option<CursorPos>,
	#[serde(skip_serializing_if = "Option::is_none", default)]
	pub viewport: Option<Viewport>,
	#[serde(skip_serializing_if = "Option::is_none", default)]
	pub selection_ids: Option<Vec<String>>,
	#[serde(skip_serializing_if = "Option::is_none", default)]
	pub is_typing: Option<bool>,
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sample_object(id: &str) -> Object {
		Object {
			id: id.to_string(),
			kind: ObjectKind::Rectangle,
			x: 0.0,
			y: 0.0,
			width: 10.0,
			height: 10.0,
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
		}
	}

	#[test]
	fn object_patch_applies_field_by_field() {
		let mut obj = sample_object("o1");
		let patch = ObjectPatch { x: Some(5.0), fill_color: Some("#fff".into()), ..Default::default() };
		patch.apply_to(&mut obj);
		assert_eq!(obj.x, 5.0);
		assert_eq!(obj.y, 0.0);
		assert_eq!(obj.fill_color.as_deref(), Some("#fff"));
	}

	#[test]
	fn sanitize_for_snapshot_clears_selection() {
		let id = BoardId::new("b1").unwrap();
		let mut state = BoardState::empty(id, "Untitled".into(), BoardType::Advanced, 0);
		state.selected_object_ids.push("o1".into());
		let sanitized = state.sanitize_for_snapshot();
		assert!(sanitized.selected_object_ids.is_empty());
		assert!(!state.selected_object_ids.is_empty());
	}

	#[test]
	fn board_event_payload_ephemeral_classification() {
		let selection = BoardEventPayload::SelectionChanged { selected_ids: vec![] };
		let created = BoardEventPayload::ObjectCreated { object: sample_object("o1") };
		assert!(selection.is_ephemeral());
		assert!(!created.is_ephemeral());
	}

	#[test]
	fn board_event_serde_roundtrip() {
		let ev = BoardEvent {
			id: "e1".into(),
			board_id: BoardId::new("b1").unwrap(),
			timestamp: 123,
			payload: BoardEventPayload::ObjectDeleted { object_id: "o1".into() },
		};
		let json = serde_json::to_string(&ev).unwrap();
		let back: BoardEvent = serde_json::from_str(&json).unwrap();
		assert_eq!(ev, back);
	}
}
