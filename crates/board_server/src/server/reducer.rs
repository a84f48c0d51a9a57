#![forbid(unsafe_code)]

//! The pure `apply(state, event) -> state'` function. Deterministic and
//! side-effect free: the room decides "op rejected" purely from whether this
//! returns `Err`, and never mutates `state` unless it returns `Ok`.

use board_domain::{BoardEvent, BoardEventPayload, BoardState};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReducerError {
	#[error("duplicate object id: {0}")]
	DuplicateObjectId(String),
}

/// Apply one event to `state`, returning the new state. `state` is left
/// untouched on error (the caller receives a fresh value either way, since
/// this takes `state` by value and returns a new one rather than mutating
/// in place).
pub fn apply(mut state: BoardState, event: &BoardEvent) -> Result<BoardState, ReducerError> {
	match &event.payload {
		BoardEventPayload::ObjectCreated { object } => {
			if state.contains_object(&object.id) {
				return Err(ReducerError::DuplicateObjectId(object.id.clone()));
			}
			state.objects.push(object.clone());
			state.meta.updated_at = event.timestamp;
		}
		BoardEventPayload::ObjectUpdated { object_id, patch } => {
			if let Some(object) = state.objects.iter_mut().find(|o| &o.id == object_id) {
				patch.apply_to(object);
				state.meta.updated_at = event.timestamp;
			}
			// Unknown id: no-op, not an error.
		}
		BoardEventPayload::ObjectDeleted { object_id } => {
			let before = state.objects.len();
			state.objects.retain(|o| &o.id != object_id);
			if state.objects.len() != before {
				state.meta.updated_at = event.timestamp;
			}
			// Unknown id: no-op, not an error.
		}
		BoardEventPayload::SelectionChanged { selected_ids } => {
			state.selected_object_ids = selected_ids.clone();
		}
		BoardEventPayload::ViewportChanged { .. } => {
			// Viewport is per-session ephemeral and not stored on BoardState;
			// broadcasting it through the reducer path is a pure pass-through.
		}
	}
	Ok(state)
}

#[cfg(test)]
mod tests {
	use super::*;
	use board_domain::{BoardId, BoardType, Object, ObjectKind, ObjectPatch};
	use proptest::prelude::*;

	fn board() -> BoardState {
		BoardState::empty(BoardId::new("b1").unwrap(), "Untitled".into(), BoardType::Advanced, 0)
	}

	fn object(id: &str) -> Object {
		Object {
			id: id.into(),
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
		}
	}

	fn event(payload: BoardEventPayload, ts: i64) -> BoardEvent {
		BoardEvent { id: "e1".into(), board_id: BoardId::new("b1").unwrap(), timestamp: ts, payload }
	}

	#[test]
	fn object_created_appends_and_rejects_duplicate() {
		let state = board();
		let state = apply(state, &event(BoardEventPayload::ObjectCreated { object: object("o1") }, 10)).unwrap();
        assert_eq!(state.objects.len(), 1);
        assert_eq!(state.meta.updated_at, 10);

		let err = apply(state, &event(BoardEventPayload::ObjectCreated { object: object("o1") }, 20)).unwrap_err();
		assert_eq!(err, ReducerError::DuplicateObjectId("o1".into()));
	}

	#[test]
	fn object_updated_patches_existing_and_ignores_unknown() {
		let state = board();
		let state = apply(state, &event(BoardEventPayload::ObjectCreated { object: object("o1") }, 0)).unwrap();

		let patch = ObjectPatch { x: Some(5.0), ..Default::default() };
		let state =
			apply(state, &event(BoardEventPayload::ObjectUpdated { object_id: "o1".into(), patch }, 30)).unwrap();
		assert_eq!(state.find_object("o1").unwrap().x, 5.0);
		assert_eq!(state.meta.updated_at, 30);

		let before = state.clone();
		let patch = ObjectPatch { x: Some(9.0), ..Default::default() };
		let after =
			apply(state, &event(BoardEventPayload::ObjectUpdated { object_id: "missing".into(), patch }, 40))
				.unwrap();
		assert_eq!(after.objects, before.objects);
		assert_eq!(after.meta.updated_at, before.meta.updated_at);
	}

	#[test]
	fn object_deleted_removes_existing_and_ignores_unknown() {
		let state = board();
		let state = apply(state, &event(BoardEventPayload::ObjectCreated { object: object("o1") }, 0)).unwrap();
		let state =
			apply(state, &event(BoardEventPayload::ObjectDeleted { object_id: "missing".into() }, 5)).unwrap();
		assert_eq!(state.objects.len(), 1);

		let state = apply(state, &event(BoardEventPayload::ObjectDeleted { object_id: "o1".into() }, 15)).unwrap();
		assert!(state.objects.is_empty());
		assert_eq!(state.meta.updated_at, 15);
	}

	#[test]
	fn selection_changed_updates_ephemeral_field_only() {
		let state = board();
		let state = apply(
			state,
			&event(BoardEventPayload::SelectionChanged { selected_ids: vec!["o1".into()] }, 99),
		)
		.unwrap();
		assert_eq!(state.selected_object_ids, vec!["o1".to_string()]);
		// Selection changes do not touch durable metadata.
		assert_eq!(state.meta.updated_at, 0);
	}

	proptest::proptest! {
		/// §8 invariant 6, restated as a reducer-level property: applying any
		/// sequence of `objectCreated` events with distinct ids never yields a
		/// board with more objects than events applied, and never duplicates
		/// an id (the room's own `MAX_OBJECTS_PER_BOARD`/duplicate-id checks
		/// run before the reducer sees the event; this property holds at the
		/// reducer layer regardless of those outer checks).
		#[test]
		fn creating_distinct_objects_never_duplicates_or_drops(ids in proptest::collection::vec("[a-z]{1,8}", 1..20)) {
			let mut unique_ids: Vec<String> = Vec::new();
			for id in &ids {
				if !unique_ids.contains(id) {
					unique_ids.push(id.clone());
				}
			}

			let mut state = board();
			for (i, id) in unique_ids.iter().enumerate() {
				state = apply(state, &event(BoardEventPayload::ObjectCreated { object: object(id) }, i as i64)).unwrap();
			}

			prop_assert_eq!(state.objects.len(), unique_ids.len());
			let mut seen = std::collections::HashSet::new();
			for obj in &state.objects {
				prop_assert!(seen.insert(obj.id.clone()));
			}
		}

		/// Re-applying the same `objectCreated` id a second time is always
		/// rejected, whatever other distinct ids were created first.
		#[test]
		fn duplicate_object_id_is_always_rejected(ids in proptest::collection::vec("[a-z]{1,8}", 0..10), dup in "[a-z]{1,8}") {
			let mut seen_ids: Vec<String> = Vec::new();
			for id in &ids {
				if id != &dup && !seen_ids.contains(id) {
					seen_ids.push(id.clone());
				}
			}

			let mut state = board();
			for (i, id) in seen_ids.iter().enumerate() {
				state = apply(state, &event(BoardEventPayload::ObjectCreated { object: object(id) }, i as i64)).unwrap();
			}
			state = apply(state, &event(BoardEventPayload::ObjectCreated { object: object(&dup) }, 100)).unwrap();
			let err = apply(state, &event(BoardEventPayload::ObjectCreated { object: object(&dup) }, 200)).unwrap_err();
			prop_assert_eq!(err, ReducerError::DuplicateObjectId(dup));
		}
	}
}
