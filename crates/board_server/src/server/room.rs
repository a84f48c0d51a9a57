#![forbid(unsafe_code)]

//! `BoardRoom`: the single-writer authority for one board.
//!
//! Realized as a task that owns all room state and drains one inbox; every
//! command below is handled to completion (including any `.await` it needs)
//! before the next one is taken off the inbox. That serialization is what
//! gives §5's ordering guarantees and what makes `ensure_loaded`'s "only one
//! load executes" requirement fall out for free: a second `Join` command
//! cannot be processed until the first one's load has already finished and
//! been cached in `self.state`.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use board_domain::{
	author_key, BoardEvent, BoardId, BoardState, BoardType, ClientOpId, GuestId, Limits, PresenceEntry, Role, Seq,
	UserId,
};
use board_protocol::messages::{AuthPayload, ClientInfo, ErrorCode, RosterEntry, ServerMessage};
use board_util::unix_ms_now;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::auth::{AuthError, AuthResolver};
use super::rate_limit::TokenBucket;
use super::reducer;
use super::snapshot_store::SnapshotStore;

/// How long a room with no joined sessions and no in-flight persist waits
/// before its task exits and is evicted from the registry.
const IDLE_EVICT: Duration = Duration::from_secs(10 * 60);

pub type SessionId = u64;

/// A joined session's outbound half, held by the room so it can broadcast.
#[derive(Clone)]
pub struct SessionOutbound {
	pub sender: mpsc::Sender<ServerMessage>,
}

/// Everything the room needs to send a `Join` command.
pub struct JoinRequest {
	pub ip: IpAddr,
	pub outbound: mpsc::Sender<ServerMessage>,
	pub auth: AuthPayload,
	#[allow(dead_code)]
	pub client_known_seq: Option<Seq>,
	pub client: Option<ClientInfo>,
}

/// Successful join outcome, handed back to the session task.
pub struct JoinedInfo {
	pub session_id: SessionId,
	pub role: Role,
	pub seq: Seq,
	pub snapshot: BoardState,
	pub users: Vec<RosterEntry>,
}

/// Why a join attempt failed, along with the wire shape the session should
/// report before closing.
#[derive(Debug, Clone)]
pub struct JoinError {
	pub code: ErrorCode,
	pub message: String,
}

impl JoinError {
	fn new(code: ErrorCode, message: impl Into<String>) -> Self {
		Self { code, message: message.into() }
	}
}

impl From<AuthError> for JoinError {
	fn from(err: AuthError) -> Self {
		match err {
			AuthError::InvalidOwnerToken => JoinError::new(ErrorCode::Unauthorized, "invalid owner token"),
			AuthError::NotBoardOwner => JoinError::new(ErrorCode::Forbidden, "not board owner"),
			AuthError::InvalidInviteToken => JoinError::new(ErrorCode::Unauthorized, "invalid invite token"),
			AuthError::InviteRevoked => JoinError::new(ErrorCode::Unauthorized, "invite revoked"),
			AuthError::InviteExpired => JoinError::new(ErrorCode::Unauthorized, "invite expired"),
			AuthError::BoardNotFound => JoinError::new(ErrorCode::NotFound, "board not found"),
			AuthError::Store(_) => JoinError::new(ErrorCode::ServerError, "server_error"),
		}
	}
}

/// Commands accepted by a room's inbox.
pub enum RoomCommand {
	Join { req: JoinRequest, reply: oneshot::Sender<Result<JoinedInfo, JoinError>> },
	Op { session_id: SessionId, client_op_id: ClientOpId, #[allow(dead_code)] base_seq: u64, op: BoardEvent },
	Presence { session_id: SessionId, presence: PresenceEntry },
	Ping { session_id: SessionId, t: i64 },
	Leave { session_id: SessionId },
	SnapshotPersisted { seq: Seq, ok: bool },
}

/// A clonable handle other tasks use to talk to a room.
#[derive(Clone)]
pub struct RoomHandle {
	pub sender: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
	pub fn is_closed(&self) -> bool {
		self.sender.is_closed()
	}
}

struct SessionState {
	outbound: mpsc::Sender<ServerMessage>,
	role: Role,
	user_id: Option<UserId>,
	guest_id: Option<GuestId>,
	display_name: Option<String>,
	color: Option<String>,
	op_bucket: TokenBucket,
	presence_bucket: TokenBucket,
}

impl SessionState {
	fn author_key(&self) -> String {
		author_key(self.user_id.as_ref(), self.guest_id.as_ref())
	}

	fn roster_entry(&self) -> RosterEntry {
		RosterEntry {
			user_id: self.author_key(),
			display_name: Some(self.display_name.clone().unwrap_or_else(|| "Guest".to_string())),
			role: self.role,
			color: self.color.clone(),
		}
	}
}

struct IdempotencyRecord {
	seq: Seq,
	op: BoardEvent,
	author_id: String,
	processed_at_ms: i64,
}

/// The room itself.
pub struct BoardRoom {
	board_id: BoardId,
	inbox: mpsc::Receiver<RoomCommand>,
	self_sender: mpsc::Sender<RoomCommand>,
	auth: Arc<AuthResolver>,
	store: Arc<dyn SnapshotStore>,
	limits: Limits,

	sessions: HashMap<SessionId, SessionState>,
	next_session_id: SessionId,

	state: Option<BoardState>,
	seq: Seq,

	idempotency: HashMap<ClientOpId, IdempotencyRecord>,
	presence: HashMap<String, PresenceEntry>,
	ip_join_buckets: HashMap<IpAddr, TokenBucket>,

	ops_since_snapshot: u64,
	last_snapshot_success_at: Instant,
	last_snapshot_attempt_at: Option<Instant>,
	snapshot_in_flight: bool,
}

/// Spawn a room task for `board_id` and return a handle to it.
pub fn spawn_room(board_id: BoardId, auth: Arc<AuthResolver>, store: Arc<dyn SnapshotStore>, limits: Limits) -> RoomHandle {
	let (tx, rx) = mpsc::channel(1024);
	let room = BoardRoom {
		board_id,
		inbox: rx,
		self_sender: tx.clone(),
		auth,
		store,
		limits,
		sessions: HashMap::new(),
		next_session_id: 1,
		state: None,
		seq: 0,
		idempotency: HashMap::new(),
		presence: HashMap::new(),
		ip_join_buckets: HashMap::new(),
		ops_since_snapshot: 0,
		last_snapshot_success_at: Instant::now(),
		last_snapshot_attempt_at: None,
		snapshot_in_flight: false,
	};
	tokio::spawn(room.run());
	RoomHandle { sender: tx }
}

impl BoardRoom {
	async fn run(mut self) {
		info!(board_id = %self.board_id, "board room started");
		metrics::gauge!("board_server_rooms_active").increment(1.0);
		loop {
			let next = if self.sessions.is_empty() && !self.snapshot_in_flight {
				match tokio::time::timeout(IDLE_EVICT, self.inbox.recv()).await {
					Ok(Some(cmd)) => cmd,
					Ok(None) => break,
					Err(_elapsed) => {
						info!(board_id = %self.board_id, "board room idle, evicting");
						break;
					}
				}
			} else {
				match self.inbox.recv().await {
					Some(cmd) => cmd,
					None => break,
				}
			};
			self.handle_command(next).await;
		}
		metrics::gauge!("board_server_rooms_active").decrement(1.0);
		info!(board_id = %self.board_id, "board room stopped");
	}

	async fn handle_command(&mut self, cmd: RoomCommand) {
		match cmd {
			RoomCommand::Join { req, reply } => {
				let result = self.handle_join(req).await;
				let _ = reply.send(result);
			}
			RoomCommand::Op { session_id, client_op_id, base_seq: _, op } => {
				self.handle_op(session_id, client_op_id, op).await;
			}
			RoomCommand::Presence { session_id, presence } => {
				self.handle_presence(session_id, presence);
			}
			RoomCommand::Ping { session_id, t } => {
				self.reply_to(session_id, ServerMessage::Pong { t });
			}
			RoomCommand::Leave { session_id } => {
				self.handle_leave(session_id);
			}
			RoomCommand::SnapshotPersisted { seq, ok } => {
				self.snapshot_in_flight = false;
				self.last_snapshot_attempt_at = Some(Instant::now());
				if ok {
					metrics::counter!("board_server_snapshot_successes_total").increment(1);
					self.ops_since_snapshot = 0;
					self.last_snapshot_success_at = Instant::now();
					debug!(board_id = %self.board_id, seq, "snapshot persisted");
				} else {
					metrics::counter!("board_server_snapshot_failures_total").increment(1);
					warn!(board_id = %self.board_id, seq, "snapshot persist failed, will retry next cadence tick");
				}
			}
		}
	}

	async fn handle_join(&mut self, req: JoinRequest) -> Result<JoinedInfo, JoinError> {
		let max_join_attempts = self.limits.max_join_attempts_per_minute_per_ip;
		let bucket = self.ip_join_buckets.entry(req.ip).or_insert_with(|| TokenBucket::new(max_join_attempts, 60.0));
		if !bucket.allow() {
			metrics::counter!("board_server_join_rejected_total", "reason" => "rate_limited").increment(1);
			return Err(JoinError::new(ErrorCode::RateLimited, "Too many join attempts; try again later"));
		}

		let resolved = match self.auth.resolve(&self.board_id, &req.auth).await {
			Ok(resolved) => resolved,
			Err(err) => {
				// Already consumed a token above; an invalid attempt does not
				// get it back.
				return Err(err.into());
			}
		};

		self.ensure_loaded().await;
		let state = self.state.as_ref().expect("state loaded by ensure_loaded");

		let session_id = self.next_session_id;
		self.next_session_id += 1;

		let (guest_id, display_name, color) = match req.client {
			Some(ClientInfo { guest_id, display_name, color }) => {
				let guest_id = guest_id.and_then(|g| GuestId::new(g).ok());
				(guest_id, display_name, color)
			}
			None => (None, None, None),
		};

		let session = SessionState {
			outbound: req.outbound,
			role: resolved.role,
			user_id: resolved.user_id,
			guest_id,
			display_name,
			color,
			op_bucket: TokenBucket::new(self.limits.max_ops_per_10s_per_client, 10.0),
			presence_bucket: TokenBucket::new(self.limits.max_presence_per_10s_per_client, 10.0),
		};

		let joined = JoinedInfo {
			session_id,
			role: session.role,
			seq: self.seq,
			snapshot: state.clone(),
			users: Vec::new(), // filled in below, after insertion
		};
		self.sessions.insert(session_id, session);

		// A successful join clears the IP bucket's history.
		if let Some(bucket) = self.ip_join_buckets.get_mut(&req.ip) {
			bucket.reset();
		}

		let users = self.build_roster();
		self.broadcast_presence();
		metrics::counter!("board_server_sessions_joined_total").increment(1);

		Ok(JoinedInfo { users, ..joined })
	}

	async fn ensure_loaded(&mut self) {
		if self.state.is_some() {
			return;
		}

		let now = unix_ms_now();
		let board_info = match self.store.load_board_info(&self.board_id).await {
			Ok(info) => info,
			Err(err) => {
				warn!(board_id = %self.board_id, error = %err, "failed to load board info, synthesizing defaults");
				None
			}
		};

		let (name, board_type, created_at, snapshot_seq_hint) = match &board_info {
			Some(info) => (info.title.clone(), info.board_type, info.created_at, info.snapshot_seq),
			None => ("Untitled".to_string(), BoardType::Advanced, now, 0),
		};

		let latest_snapshot = match self.store.load_latest_snapshot(&self.board_id).await {
			Ok(snapshot) => snapshot,
			Err(err) => {
				warn!(board_id = %self.board_id, error = %err, "failed to load latest snapshot");
				None
			}
		};

		match latest_snapshot {
			Some(row) => match serde_json::from_str::<BoardState>(&row.snapshot_json) {
				Ok(mut state) => {
					state.meta.id = self.board_id.clone();
					state.selected_object_ids.clear();
					if state.meta.name == "Untitled" {
						state.meta.name = name;
					}
					self.seq = row.seq;
					self.state = Some(state);
				}
				Err(err) => {
					warn!(board_id = %self.board_id, error = %err, "stored snapshot failed to parse, starting empty");
					self.seq = snapshot_seq_hint;
					self.state = Some(BoardState::empty(self.board_id.clone(), name, board_type, created_at));
				}
			},
			None => {
				self.seq = snapshot_seq_hint;
				self.state = Some(BoardState::empty(self.board_id.clone(), name, board_type, created_at));
			}
		}
	}

	async fn handle_op(&mut self, session_id: SessionId, client_op_id: ClientOpId, op: BoardEvent) {
		let now = unix_ms_now();
		self.gc_idempotency(now);

		let Some(session) = self.sessions.get(&session_id) else { return };

		if !session.role.can_write() {
			metrics::counter!("board_server_ops_rejected_total", "reason" => "forbidden").increment(1);
			self.reply_to(session_id, error_msg(Some(self.board_id.clone()), ErrorCode::Forbidden, "Viewer cannot send ops"));
			return;
		}

		self.ensure_loaded().await;

		if let Some(record) = self.idempotency.get(&client_op_id) {
			self.reply_to(
				session_id,
				ServerMessage::Op {
					board_id: self.board_id.clone(),
					seq: record.seq,
					op: record.op.clone(),
					author_id: record.author_id.clone(),
					client_op_id: Some(client_op_id),
				},
			);
			return;
		}

		if let board_domain::BoardEventPayload::ObjectCreated { object } = &op.payload {
			let state = self.state.as_ref().expect("state loaded");
			if state.objects.len() >= self.limits.max_objects_per_board {
				metrics::counter!("board_server_ops_rejected_total", "reason" => "forbidden").increment(1);
				self.reply_to(session_id, error_msg(Some(self.board_id.clone()), ErrorCode::Forbidden, "Board is too large"));
				return;
			}
			if state.contains_object(&object.id) {
				metrics::counter!("board_server_ops_rejected_total", "reason" => "forbidden").increment(1);
				self.reply_to(session_id, error_msg(Some(self.board_id.clone()), ErrorCode::Forbidden, "Duplicate object id"));
				return;
			}
		}

		let Some(session) = self.sessions.get_mut(&session_id) else { return };
		if !session.op_bucket.allow() {
			metrics::counter!("board_server_ops_rejected_total", "reason" => "rate_limited").increment(1);
			self.reply_to(session_id, error_msg(Some(self.board_id.clone()), ErrorCode::RateLimited, "rate_limited"));
			return;
		}

		let author_id = {
			let session = self.sessions.get(&session_id).expect("session present");
			session.author_key()
		};

		let state = self.state.take().expect("state loaded");
		match reducer::apply(state, &op) {
			Ok(new_state) => {
				self.state = Some(new_state);
				self.seq += 1;
				self.idempotency.insert(
					client_op_id.clone(),
					IdempotencyRecord { seq: self.seq, op: op.clone(), author_id: author_id.clone(), processed_at_ms: now },
				);

				self.broadcast(ServerMessage::Op {
					board_id: self.board_id.clone(),
					seq: self.seq,
					op,
					author_id,
					client_op_id: Some(client_op_id),
				});

				metrics::counter!("board_server_ops_processed_total").increment(1);
				self.ops_since_snapshot += 1;
				self.maybe_persist_snapshot();
			}
			Err(err) => {
				metrics::counter!("board_server_ops_rejected_total", "reason" => "reducer_rejected").increment(1);
				warn!(board_id = %self.board_id, error = %err, "op rejected by reducer");
				self.reply_to(session_id, error_msg(Some(self.board_id.clone()), ErrorCode::Forbidden, "Op rejected"));
			}
		}
	}

	fn handle_presence(&mut self, session_id: SessionId, presence: PresenceEntry) {
		let Some(session) = self.sessions.get_mut(&session_id) else { return };
		if !session.presence_bucket.allow() {
			let board_id = self.board_id.clone();
			self.reply_to(session_id, error_msg(Some(board_id), ErrorCode::RateLimited, "rate_limited"));
			return;
		}

		let key = session.author_key();
		self.presence.insert(key, presence);
		self.broadcast_presence();
	}

	fn handle_leave(&mut self, session_id: SessionId) {
		if let Some(session) = self.sessions.remove(&session_id) {
			let key = session.author_key();
			self.presence.remove(&key);
			self.broadcast_presence();
		}
	}

	fn maybe_persist_snapshot(&mut self) {
		if self.snapshot_in_flight {
			return;
		}
		if let Some(last_attempt) = self.last_snapshot_attempt_at {
			if last_attempt.elapsed() < Duration::from_millis(self.limits.snapshot_min_retry_ms) {
				return;
			}
		}

		let due_by_count = self.ops_since_snapshot >= self.limits.snapshot_op_interval;
		let due_by_time = self.ops_since_snapshot > 0
			&& self.last_snapshot_success_at.elapsed() >= Duration::from_millis(self.limits.snapshot_time_ms);

		if !due_by_count && !due_by_time {
			return;
		}

		let Some(state) = self.state.as_ref() else { return };
		let sanitized = state.sanitize_for_snapshot();
		let seq = self.seq;
		let board_id = self.board_id.clone();
		let store = self.store.clone();
		let reply = self.self_sender.clone();

		self.snapshot_in_flight = true;
		self.last_snapshot_attempt_at = Some(Instant::now());
		metrics::counter!("board_server_snapshot_attempts_total").increment(1);

		tokio::spawn(async move {
			let ok = match serde_json::to_string(&sanitized) {
				Ok(json) => {
					let inserted = store.insert_snapshot(&board_id, seq, &json).await;
					let updated = store.update_board_snapshot_seq(&board_id, seq).await;
					inserted.is_ok() && updated.is_ok()
				}
				Err(_) => false,
			};
			let _ = reply.send(RoomCommand::SnapshotPersisted { seq, ok }).await;
		});
	}

	fn gc_idempotency(&mut self, now_ms: i64) {
		let ttl_ms = (self.limits.processed_op_ttl_secs * 1000) as i64;
		self.idempotency.retain(|_, record| now_ms - record.processed_at_ms < ttl_ms);
	}

	fn build_roster(&self) -> Vec<RosterEntry> {
		self.sessions.values().map(SessionState::roster_entry).collect()
	}

	fn broadcast_presence(&self) {
		let users = self.build_roster();
		let presence_by_user_id = self.presence.clone();
		self.broadcast(ServerMessage::Presence {
			board_id: self.board_id.clone(),
			users,
			presence_by_user_id: Some(presence_by_user_id),
		});
	}

	fn broadcast(&self, msg: ServerMessage) {
		for session in self.sessions.values() {
			let _ = session.outbound.try_send(msg.clone());
		}
	}

	fn reply_to(&self, session_id: SessionId, msg: ServerMessage) {
		if let Some(session) = self.sessions.get(&session_id) {
			let _ = session.outbound.try_send(msg);
		}
	}
}

fn error_msg(board_id: Option<BoardId>, code: ErrorCode, message: impl Into<String>) -> ServerMessage {
	ServerMessage::error(board_id, code, message, false)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::server::snapshot_store::InMemorySnapshotStore;
	use proptest::prelude::*;
	use board_domain::{BoardEventPayload, Object, ObjectKind};
	use sqlx::postgres::PgPoolOptions;
	use std::net::{IpAddr, Ipv4Addr};

	async fn test_auth() -> Arc<AuthResolver> {
		// A lazy pool: fine for these tests since AuthResolver is not exercised
		// without a real connection (join tests below use invite-free helpers
		// through the room's lower-level methods instead of full `handle_join`
		// against Postgres).
		let pool = PgPoolOptions::new().connect_lazy("postgres://localhost/nonexistent").unwrap();
		Arc::new(AuthResolver::new(pool, "test-secret".to_string()))
	}

	fn sample_object(id: &str) -> Object {
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

	fn new_test_room(board_id: &str, auth: Arc<AuthResolver>) -> (BoardRoom, mpsc::Sender<RoomCommand>) {
		let store: Arc<dyn SnapshotStore> = Arc::new(InMemorySnapshotStore::new());
		let (tx, rx) = mpsc::channel(64);
		let room = BoardRoom {
			board_id: BoardId::new(board_id).unwrap(),
			inbox: rx,
			self_sender: tx.clone(),
			auth,
			store,
			limits: Limits::default(),
			sessions: HashMap::new(),
			next_session_id: 1,
			state: None,
			seq: 0,
			idempotency: HashMap::new(),
			presence: HashMap::new(),
			ip_join_buckets: HashMap::new(),
			ops_since_snapshot: 0,
			last_snapshot_success_at: Instant::now(),
			last_snapshot_attempt_at: None,
			snapshot_in_flight: false,
		};
		(room, tx)
	}

	fn inject_editor_session(room: &mut BoardRoom) -> (SessionId, mpsc::Receiver<ServerMessage>) {
		let (tx, rx) = mpsc::channel(16);
		let session_id = room.next_session_id;
		room.next_session_id += 1;
		room.sessions.insert(
			session_id,
			SessionState {
				outbound: tx,
				role: Role::Editor,
				user_id: Some(UserId::new("u1").unwrap()),
				guest_id: None,
				display_name: None,
				color: None,
				op_bucket: TokenBucket::new(Limits::default().max_ops_per_10s_per_client, 10.0),
				presence_bucket: TokenBucket::new(Limits::default().max_presence_per_10s_per_client, 10.0),
			},
		);
		(session_id, rx)
	}

	fn create_op(board_id: &str, client_op_id: &str, object_id: &str) -> (ClientOpId, BoardEvent) {
		(
			ClientOpId::new(client_op_id).unwrap(),
			BoardEvent {
				id: "e1".into(),
				board_id: BoardId::new(board_id).unwrap(),
				timestamp: 0,
				payload: BoardEventPayload::ObjectCreated { object: sample_object(object_id) },
			},
		)
	}

	#[tokio::test]
	async fn viewer_cannot_send_ops() {
		let auth = test_auth().await;
		let (mut room, _tx) = new_test_room("b1", auth);
		room.ensure_loaded().await;

		let (tx, mut rx) = mpsc::channel(16);
		let session_id = room.next_session_id;
		room.next_session_id += 1;
		room.sessions.insert(
			session_id,
			SessionState {
				outbound: tx,
				role: Role::Viewer,
				user_id: Some(UserId::new("viewer1").unwrap()),
				guest_id: None,
				display_name: None,
				color: None,
				op_bucket: TokenBucket::new(Limits::default().max_ops_per_10s_per_client, 10.0),
				presence_bucket: TokenBucket::new(Limits::default().max_presence_per_10s_per_client, 10.0),
			},
		);

		let (client_op_id, op) = create_op("b1", "c1", "o1");
		room.handle_op(session_id, client_op_id, op).await;

		let msg = rx.try_recv().expect("expected an error reply");
		match msg {
			ServerMessage::Error { code, .. } => assert_eq!(code, ErrorCode::Forbidden),
			other => panic!("unexpected message: {other:?}"),
		}
		assert_eq!(room.seq, 0);
	}

	#[tokio::test]
	async fn accepted_op_advances_seq_and_broadcasts() {
		let auth = test_auth().await;
		let (mut room, _tx) = new_test_room("b1", auth);
		room.ensure_loaded().await;
		let (session_id, mut rx) = inject_editor_session(&mut room);

		let (client_op_id, op) = create_op("b1", "c1", "o1");
		room.handle_op(session_id, client_op_id, op).await;

		assert_eq!(room.seq, 1);
		let msg = rx.try_recv().unwrap();
		match msg {
			ServerMessage::Op { seq, .. } => assert_eq!(seq, 1),
			other => panic!("unexpected message: {other:?}"),
		}
	}

	#[tokio::test]
	async fn duplicate_client_op_id_is_not_reapplied() {
		let auth = test_auth().await;
		let (mut room, _tx) = new_test_room("b1", auth);
		room.ensure_loaded().await;
		let (session_id, mut rx) = inject_editor_session(&mut room);

		let (client_op_id, op) = create_op("b1", "c42", "o7");
		room.handle_op(session_id, client_op_id.clone(), op.clone()).await;
		let _ = rx.try_recv().unwrap();

		room.handle_op(session_id, client_op_id, op).await;
		let msg = rx.try_recv().unwrap();
		match msg {
			ServerMessage::Op { seq, .. } => assert_eq!(seq, 1),
			other => panic!("unexpected message: {other:?}"),
		}

		assert_eq!(room.seq, 1);
		assert_eq!(room.state.as_ref().unwrap().objects.len(), 1);
	}

	#[tokio::test]
	async fn duplicate_object_id_is_rejected_before_reducer() {
		let auth = test_auth().await;
		let (mut room, _tx) = new_test_room("b1", auth);
		room.ensure_loaded().await;
		let (session_id, mut rx) = inject_editor_session(&mut room);

		let (op1, e1) = create_op("b1", "c1", "o1");
		room.handle_op(session_id, op1, e1).await;
		let _ = rx.try_recv().unwrap();

		let (op2, e2) = create_op("b1", "c2", "o1");
		room.handle_op(session_id, op2, e2).await;
		let msg = rx.try_recv().unwrap();
		match msg {
			ServerMessage::Error { code, message, .. } => {
				assert_eq!(code, ErrorCode::Forbidden);
				assert!(message.contains("Duplicate"));
			}
			other => panic!("unexpected message: {other:?}"),
		}
		assert_eq!(room.seq, 1);
	}

	#[tokio::test]
	async fn join_rate_limit_closes_after_threshold() {
		let auth = test_auth().await;
		let (mut room, _tx) = new_test_room("b1", auth);
		let ip: IpAddr = IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1));

		for _ in 0..Limits::default().max_join_attempts_per_minute_per_ip {
			let (out_tx, _out_rx) = mpsc::channel(4);
			let req = JoinRequest {
				ip,
				outbound: out_tx,
				auth: AuthPayload::Invite { invite_token: "bad".into() },
				client_known_seq: None,
				client: None,
			};
			let result = room.handle_join(req).await;
			assert!(result.is_err());
		}

		let (out_tx, _out_rx) = mpsc::channel(4);
		let req = JoinRequest {
			ip,
			outbound: out_tx,
			auth: AuthPayload::Invite { invite_token: "bad".into() },
			client_known_seq: None,
			client: None,
		};
		let err = room.handle_join(req).await.unwrap_err();
		assert_eq!(err.code, ErrorCode::RateLimited);
	}

	proptest::proptest! {
		/// §8 invariant 1: whatever order a batch of distinct-id ops from one
		/// session is accepted in, the room's `seq` advances by exactly one per
		/// op and the broadcast `seq` values form a contiguous run starting at 1.
		#[test]
		fn seq_advances_by_one_per_accepted_op(object_ids in proptest::collection::vec("[a-z]{1,8}", 1..15)) {
			let mut unique_ids: Vec<String> = Vec::new();
			for id in &object_ids {
				if !unique_ids.contains(id) {
					unique_ids.push(id.clone());
				}
			}

			tokio::runtime::Runtime::new().unwrap().block_on(async {
				let auth = test_auth().await;
				let (mut room, _tx) = new_test_room("b1", auth);
				room.ensure_loaded().await;
				let (session_id, mut rx) = inject_editor_session(&mut room);

				for (i, id) in unique_ids.iter().enumerate() {
					let (client_op_id, op) = create_op("b1", &format!("c{i}"), id);
					room.handle_op(session_id, client_op_id, op).await;
				}

				for expected_seq in 1..=unique_ids.len() as u64 {
					let msg = rx.try_recv().expect("expected a broadcast op");
					match msg {
						ServerMessage::Op { seq, .. } => assert_eq!(seq, expected_seq),
						other => panic!("unexpected message: {other:?}"),
					}
				}
				assert_eq!(room.seq, unique_ids.len() as u64);
			});
		}
	}
}
