#![forbid(unsafe_code)]

//! Per-connection task: owns the WebSocket, the pre-join timeout, and the
//! translation between wire messages and `RoomCommand`s.
//!
//! Everything before `Joined` is handled here without ever contacting the
//! room — a session that hasn't joined has no room-owned state to touch, so
//! there is nothing for the room to arbitrate.

use std::net::IpAddr;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use board_domain::{BoardId, Limits};
use board_protocol::messages::{ClientMessage, ErrorCode, ServerMessage};
use board_protocol::validator::{ValidationError, Validator};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::registry::RoomRegistry;
use super::room::{JoinRequest, RoomCommand, SessionId};

/// Drive one accepted WebSocket connection to completion. `path_board_id` is
/// the board id taken from the `/collab/{boardId}` upgrade path; it is the
/// room the session is bound to regardless of what the `join` message itself
/// claims (see `handle_join_message`, which rejects a mismatch).
pub async fn run_session(
	mut socket: WebSocket,
	peer_ip: IpAddr,
	path_board_id: BoardId,
	registry: std::sync::Arc<RoomRegistry>,
	limits: Limits,
) {
	if send(&mut socket, ServerMessage::hello(limits.max_message_bytes)).await.is_err() {
		return;
	}

	let Some((board_id, session_id, room_tx, mut outbound_rx)) =
		await_join(&mut socket, peer_ip, &path_board_id, registry.as_ref(), &limits).await
	else {
		return;
	};

	info!(%board_id, session_id, "session joined");

	loop {
		tokio::select! {
			incoming = socket.recv() => {
				let Some(incoming) = incoming else { break };
				let Ok(incoming) = incoming else { break };
				match incoming {
					Message::Text(text) => {
						if !handle_post_join_text(&mut socket, &text, &board_id, session_id, &room_tx, &limits).await {
							break;
						}
					}
					Message::Close(_) => break,
					Message::Binary(_) => {
						close_with(
							&mut socket,
							close_error(&board_id, ErrorCode::BadRequest, "binary frames are not accepted"),
							CLOSE_MALFORMED,
							"binary frames are not accepted",
						)
						.await;
						break;
					}
					_ => {}
				}
			}
			outgoing = outbound_rx.recv() => {
				let Some(outgoing) = outgoing else { break };
				if send(&mut socket, outgoing).await.is_err() {
					break;
				}
			}
		}
	}

	let _ = room_tx.send(RoomCommand::Leave { session_id }).await;
	info!(%board_id, session_id, "session closed");
}

/// Pre-join loop: the only message a session may send here is `join`; a
/// timeout or any other message closes the connection.
async fn await_join(
	socket: &mut WebSocket,
	peer_ip: IpAddr,
	path_board_id: &BoardId,
	registry: &RoomRegistry,
	limits: &Limits,
) -> Option<(BoardId, SessionId, mpsc::Sender<RoomCommand>, mpsc::Receiver<ServerMessage>)> {
	let join_timeout = Duration::from_secs(limits.join_timeout_secs);
	let first = match tokio::time::timeout(join_timeout, socket.recv()).await {
		Ok(Some(Ok(msg))) => msg,
		Ok(Some(Err(_))) | Ok(None) => return None,
		Err(_elapsed) => {
			close_with(
				socket,
				ServerMessage::error(None, ErrorCode::BadRequest, "join timed out", true),
				CLOSE_MALFORMED,
				"join timed out",
			)
			.await;
			return None;
		}
	};

	let text = match first {
		Message::Text(text) => text,
		Message::Close(_) => return None,
		_ => {
			close_with(
				socket,
				ServerMessage::error(None, ErrorCode::BadRequest, "Must join first", true),
				CLOSE_MALFORMED,
				"must join first",
			)
			.await;
			return None;
		}
	};

	let parsed = match Validator::parse_client_message_with_limit(&text, limits.max_message_bytes) {
		Ok(msg) => msg,
		Err(err) => {
			let close_code = validation_close_code(&err);
			close_with(socket, validation_error_message(None, &err), close_code, err.to_string()).await;
			return None;
		}
	};

	let ClientMessage::Join { board_id, auth, client_known_seq, client } = parsed else {
		close_with(
			socket,
			ServerMessage::error(None, ErrorCode::BadRequest, "Must join first", true),
			CLOSE_MALFORMED,
			"must join first",
		)
		.await;
		return None;
	};

	if &board_id != path_board_id {
		close_with(
			socket,
			ServerMessage::error(
				Some(path_board_id.clone()),
				ErrorCode::BadRequest,
				"boardId mismatch between path and join message",
				true,
			),
			CLOSE_MALFORMED,
			"boardId mismatch between path and join message",
		)
		.await;
		return None;
	}

	let handle = registry.get_or_create(path_board_id);
	let (outbound_tx, outbound_rx) = mpsc::channel(256);
	let (reply_tx, reply_rx) = oneshot::channel();

	let req = JoinRequest { ip: peer_ip, outbound: outbound_tx, auth, client_known_seq, client };
	if handle.sender.send(RoomCommand::Join { req, reply: reply_tx }).await.is_err() {
		close_with(
			socket,
			ServerMessage::error(Some(board_id), ErrorCode::ServerError, "server_error", true),
			CLOSE_SERVER_ERROR,
			"server_error",
		)
		.await;
		return None;
	}

	let joined = match reply_rx.await {
		Ok(Ok(joined)) => joined,
		Ok(Err(join_err)) => {
			let reason = join_err.message.clone();
			close_with(
				socket,
				ServerMessage::error(Some(board_id), join_err.code, join_err.message, true),
				CLOSE_MALFORMED,
				reason,
			)
			.await;
			return None;
		}
		Err(_) => {
			close_with(
				socket,
				ServerMessage::error(Some(board_id), ErrorCode::ServerError, "server_error", true),
				CLOSE_SERVER_ERROR,
				"server_error",
			)
			.await;
			return None;
		}
	};

	let ok = send(
		socket,
		ServerMessage::Joined {
			board_id: board_id.clone(),
			role: joined.role,
			seq: joined.seq,
			snapshot: Some(joined.snapshot),
			snapshot_seq: Some(joined.seq),
			users: Some(joined.users),
		},
	)
	.await;
	if ok.is_err() {
		return None;
	}

	Some((board_id, joined.session_id, handle.sender, outbound_rx))
}

/// Handle one text frame from an already-joined session. Returns `false` if
/// the connection should close. Protocol-level validation failures (bad JSON,
/// oversize, boardId mismatch, field out of range) are terminal: a final
/// `error` frame is written before the caller closes the socket.
async fn handle_post_join_text(
	socket: &mut WebSocket,
	text: &str,
	board_id: &BoardId,
	session_id: SessionId,
	room_tx: &mpsc::Sender<RoomCommand>,
	limits: &Limits,
) -> bool {
	let parsed = match Validator::parse_client_message_with_limit(text, limits.max_message_bytes) {
		Ok(msg) => msg,
		Err(err) => {
			debug!(%board_id, session_id, error = %err, "rejected malformed frame, closing session");
			let close_code = validation_close_code(&err);
			close_with(socket, validation_error_message(Some(board_id.clone()), &err), close_code, err.to_string()).await;
			return false;
		}
	};

	let cmd = match parsed {
		ClientMessage::Join { .. } => {
			warn!(%board_id, session_id, "ignoring re-join on an already-joined session");
			return true;
		}
		ClientMessage::Op { client_op_id, base_seq, op, .. } => {
			RoomCommand::Op { session_id, client_op_id, base_seq, op }
		}
		ClientMessage::Presence { presence, .. } => RoomCommand::Presence { session_id, presence },
		ClientMessage::Ping { t } => RoomCommand::Ping { session_id, t },
	};

	room_tx.send(cmd).await.is_ok()
}

async fn send(socket: &mut WebSocket, msg: ServerMessage) -> Result<(), ()> {
	let json = match serde_json::to_string(&msg) {
		Ok(json) => json,
		Err(err) => {
			warn!(error = %err, "failed to serialize outbound message");
			return Err(());
		}
	};
	socket.send(Message::Text(json.into())).await.map_err(|_| ())
}

/// §6 close codes: malformed/oversize frames use 1008/1009, every other
/// policy violation (auth failure, wrong-boardId join, re-join, binary
/// frame) uses 1008 with a human-readable reason. A genuine server-side
/// fault (room inbox gone, reply channel dropped) isn't a client policy
/// violation at all, so it gets the standard "unexpected condition" code,
/// 1011, instead.
const CLOSE_MALFORMED: u16 = 1008;
const CLOSE_OVERSIZE: u16 = 1009;
const CLOSE_SERVER_ERROR: u16 = 1011;

/// Best-effort: send an `error` frame, then the WebSocket close frame that
/// carries the documented code and reason. Either send may fail if the peer
/// is already gone; both failures are ignored since the caller is closing
/// the connection regardless.
async fn close_with(socket: &mut WebSocket, err_msg: ServerMessage, code: u16, reason: impl Into<String>) {
	let _ = send(socket, err_msg).await;
	let _ = socket
		.send(Message::Close(Some(CloseFrame { code, reason: reason.into().into() })))
		.await;
}

fn validation_error_message(board_id: Option<BoardId>, err: &ValidationError) -> ServerMessage {
	let code = match err {
		ValidationError::Oversize { .. } => ErrorCode::PayloadTooLarge,
		ValidationError::MalformedJson(_) | ValidationError::BoardIdMismatch | ValidationError::BinaryFrame => {
			ErrorCode::BadRequest
		}
		ValidationError::FieldOutOfRange(_) => ErrorCode::BadRequest,
	};
	ServerMessage::error(board_id, code, err.to_string(), true)
}

fn validation_close_code(err: &ValidationError) -> u16 {
	match err {
		ValidationError::Oversize { .. } => CLOSE_OVERSIZE,
		ValidationError::MalformedJson(_)
		| ValidationError::BoardIdMismatch
		| ValidationError::BinaryFrame
		| ValidationError::FieldOutOfRange(_) => CLOSE_MALFORMED,
	}
}

fn close_error(board_id: &BoardId, code: ErrorCode, message: impl Into<String>) -> ServerMessage {
	ServerMessage::error(Some(board_id.clone()), code, message, true)
}
