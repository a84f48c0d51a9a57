#![forbid(unsafe_code)]

//! Maps a `BoardId` to its (possibly newly spawned) room. Guarantees at most
//! one live room per board id (§5 invariant 1): the lock is held only for
//! the cheap synchronous work of looking up or spawning a handle, never
//! across any room I/O.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use board_domain::{BoardId, Limits};

use super::auth::AuthResolver;
use super::room::{self, RoomHandle};
use super::snapshot_store::SnapshotStore;

pub struct RoomRegistry {
	rooms: Mutex<HashMap<BoardId, RoomHandle>>,
	auth: Arc<AuthResolver>,
	store: Arc<dyn SnapshotStore>,
	limits: Limits,
}

impl RoomRegistry {
	pub fn new(auth: Arc<AuthResolver>, store: Arc<dyn SnapshotStore>, limits: Limits) -> Self {
		Self { rooms: Mutex::new(HashMap::new()), auth, store, limits }
	}

	/// Return the live room for `board_id`, spawning one if none exists yet
	/// or if the previous one has since been evicted for being idle.
	pub fn get_or_create(&self, board_id: &BoardId) -> RoomHandle {
		let mut rooms = self.rooms.lock().expect("room registry lock poisoned");
		if let Some(handle) = rooms.get(board_id) {
			if !handle.is_closed() {
				return handle.clone();
			}
		}
		let handle = room::spawn_room(board_id.clone(), self.auth.clone(), self.store.clone(), self.limits);
		rooms.insert(board_id.clone(), handle.clone());
		handle
	}

	/// Number of rooms currently tracked, live or not yet reaped. Exposed for
	/// the `/readyz` and metrics surfaces.
	pub fn tracked_room_count(&self) -> usize {
		self.rooms.lock().expect("room registry lock poisoned").len()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::server::snapshot_store::InMemorySnapshotStore;
	use sqlx::postgres::PgPoolOptions;

	fn registry() -> RoomRegistry {
		let pool = PgPoolOptions::new().connect_lazy("postgres://localhost/nonexistent").unwrap();
		let auth = Arc::new(AuthResolver::new(pool, "secret".into()));
		let store: Arc<dyn SnapshotStore> = Arc::new(InMemorySnapshotStore::new());
		RoomRegistry::new(auth, store, Limits::default())
	}

	#[test]
	fn same_board_id_returns_the_same_room() {
		let registry = registry();
		let board_id = BoardId::new("b1").unwrap();
		let a = registry.get_or_create(&board_id);
		let b = registry.get_or_create(&board_id);
		assert!(a.sender.same_channel(&b.sender));
		assert_eq!(registry.tracked_room_count(), 1);
	}

	#[test]
	fn distinct_board_ids_get_distinct_rooms() {
		let registry = registry();
		let a = registry.get_or_create(&BoardId::new("b1").unwrap());
		let b = registry.get_or_create(&BoardId::new("b2").unwrap());
		assert!(!a.sender.same_channel(&b.sender));
		assert_eq!(registry.tracked_room_count(), 2);
	}
}
