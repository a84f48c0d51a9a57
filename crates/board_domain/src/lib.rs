#![forbid(unsafe_code)]

//! Core data model for the collaborative whiteboard room: bounded identifiers,
//! the canvas object/event model, and the board-level limit constants that
//! both the wire validator and the room enforce.

pub mod ids;
pub mod limits;
pub mod model;

pub use ids::{author_key, BoardId, ClientOpId, GuestId, ParseIdError, Role, Seq, UserId};
pub use limits::Limits;
pub use model::{
	Attachment, BoardEvent, BoardEventPayload, BoardMeta, BoardState, BoardType, CursorPos, Edge,
	Endpoint, Object, ObjectKind, ObjectPatch, Point, PresenceEntry, Viewport,
};
