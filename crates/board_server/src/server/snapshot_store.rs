#![forbid(unsafe_code)]

//! Durable board persistence: board metadata plus append-only snapshots.
//!
//! `SnapshotStore` is a passive collaborator (§4.4): the room never blocks
//! live traffic on it, and its failures are logged and retried on the next
//! cadence tick rather than surfaced to clients (see `room::BoardRoom`).

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use board_domain::{BoardId, BoardType, Seq};
use sqlx::PgPool;

/// Board-level metadata as loaded from the `boards` table.
#[derive(Debug, Clone, PartialEq)]
pub struct BoardInfo {
	pub owner_user_id: String,
	pub title: String,
	pub board_type: BoardType,
	pub created_at: i64,
	pub updated_at: i64,
	pub snapshot_seq: Seq,
}

/// A persisted snapshot row.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotRow {
	pub seq: Seq,
	pub snapshot_json: String,
}

/// The durability contract a `BoardRoom` depends on.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
	async fn load_board_info(&self, board_id: &BoardId) -> anyhow::Result<Option<BoardInfo>>;

	async fn load_latest_snapshot(&self, board_id: &BoardId) -> anyhow::Result<Option<SnapshotRow>>;

	async fn insert_snapshot(&self, board_id: &BoardId, seq: Seq, snapshot_json: &str) -> anyhow::Result<()>;

	async fn update_board_snapshot_seq(&self, board_id: &BoardId, seq: Seq) -> anyhow::Result<()>;
}

fn board_type_str(t: BoardType) -> &'static str {
	match t {
		BoardType::Advanced => "advanced",
		BoardType::Freehand => "freehand",
		BoardType::Mindmap => "mindmap",
	}
}

fn parse_board_type(s: &str) -> BoardType {
	match s {
		"freehand" => BoardType::Freehand,
		"mindmap" => BoardType::Mindmap,
		_ => BoardType::Advanced,
	}
}

/// Postgres-backed `SnapshotStore`, the only backend used in production —
/// the service's `SUPABASE_URL` configuration is a Postgres connection
/// string by construction.
pub struct PostgresSnapshotStore {
	pool: PgPool,
}

impl PostgresSnapshotStore {
	pub fn new(pool: PgPool) -> Self {
		Self { pool }
	}
}

#[async_trait]
impl SnapshotStore for PostgresSnapshotStore {
	async fn load_board_info(&self, board_id: &BoardId) -> anyhow::Result<Option<BoardInfo>> {
		let row: Option<(String, String, String, i64, i64, i64)> = sqlx::query_as(
			"SELECT owner_user_id, title, board_type, created_at, updated_at, snapshot_seq FROM boards WHERE id = $1",
		)
		.bind(board_id.as_str())
		.fetch_optional(&self.pool)
		.await?;

		Ok(row.map(|(owner_user_id, title, board_type, created_at, updated_at, snapshot_seq)| BoardInfo {
			owner_user_id,
			title,
			board_type: parse_board_type(&board_type),
			created_at,
			updated_at,
			snapshot_seq: snapshot_seq as Seq,
		}))
	}

	async fn load_latest_snapshot(&self, board_id: &BoardId) -> anyhow::Result<Option<SnapshotRow>> {
		let row: Option<(i64, String)> = sqlx::query_as(
			"SELECT seq, snapshot_json FROM board_snapshots WHERE board_id = $1 ORDER BY seq DESC LIMIT 1",
		)
		.bind(board_id.as_str())
		.fetch_optional(&self.pool)
		.await?;

		Ok(row.map(|(seq, snapshot_json)| SnapshotRow { seq: seq as Seq, snapshot_json }))
	}

	async fn insert_snapshot(&self, board_id: &BoardId, seq: Seq, snapshot_json: &str) -> anyhow::Result<()> {
		sqlx::query("INSERT INTO board_snapshots (board_id, seq, snapshot_json) VALUES ($1, $2, $3)")
			.bind(board_id.as_str())
			.bind(seq as i64)
			.bind(snapshot_json)
			.execute(&self.pool)
			.await?;
		Ok(())
	}

	async fn update_board_snapshot_seq(&self, board_id: &BoardId, seq: Seq) -> anyhow::Result<()> {
		sqlx::query("UPDATE boards SET snapshot_seq = $1 WHERE id = $2")
			.bind(seq as i64)
			.bind(board_id.as_str())
			.execute(&self.pool)
			.await?;
		Ok(())
	}
}

/// In-memory `SnapshotStore`, used by room-level tests and local runs with
/// no configured database.
#[derive(Default)]
pub struct InMemorySnapshotStore {
	boards: Mutex<HashMap<String, BoardInfo>>,
	snapshots: Mutex<HashMap<String, Vec<SnapshotRow>>>,
}

impl InMemorySnapshotStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Seed a board's metadata, as an out-of-band "create board" step would.
	pub fn seed_board(&self, board_id: &BoardId, info: BoardInfo) {
		self.boards.lock().unwrap().insert(board_id.as_str().to_string(), info);
	}
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
	async fn load_board_info(&self, board_id: &BoardId) -> anyhow::Result<Option<BoardInfo>> {
		Ok(self.boards.lock().unwrap().get(board_id.as_str()).cloned())
	}

	async fn load_latest_snapshot(&self, board_id: &BoardId) -> anyhow::Result<Option<SnapshotRow>> {
		Ok(self.snapshots.lock().unwrap().get(board_id.as_str()).and_then(|v| v.last().cloned()))
	}

	async fn insert_snapshot(&self, board_id: &BoardId, seq: Seq, snapshot_json: &str) -> anyhow::Result<()> {
		self.snapshots
			.lock()
			.unwrap()
			.entry(board_id.as_str().to_string())
			.or_default()
			.push(SnapshotRow { seq, snapshot_json: snapshot_json.to_string() });
		Ok(())
	}

	async fn update_board_snapshot_seq(&self, board_id: &BoardId, seq: Seq) -> anyhow::Result<()> {
		if let Some(info) = self.boards.lock().unwrap().get_mut(board_id.as_str()) {
			info.snapshot_seq = seq;
		}
		Ok(())
	}
}
