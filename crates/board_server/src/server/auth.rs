#![forbid(unsafe_code)]

//! Resolves a session's role from either an owner JWT or an invite token.
//!
//! Both paths end in the same place: a `Role` (plus, for the owner path, the
//! resolved `UserId`). Neither path trusts anything beyond what it verifies
//! here — the room still treats the resulting author id as attribution, not
//! as a broader trust claim (see `board_domain::author_key`).

use board_domain::{BoardId, Role, UserId};
use board_protocol::AuthPayload;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use thiserror::Error;

/// Claims expected in a Supabase-issued owner JWT.
#[derive(Debug, Clone, Deserialize)]
struct OwnerClaims {
	sub: String,
}

/// Every failure `AuthResolver` can produce, one per distinct wire reason.
#[derive(Debug, Error)]
pub enum AuthError {
	#[error("invalid owner token")]
	InvalidOwnerToken,
	#[error("not board owner")]
	NotBoardOwner,
	#[error("invalid invite token")]
	InvalidInviteToken,
	#[error("invite revoked")]
	InviteRevoked,
	#[error("invite expired")]
	InviteExpired,
	#[error("board not found")]
	BoardNotFound,
	#[error("auth store error: {0}")]
	Store(#[from] sqlx::Error),
}

/// The outcome of a successful auth resolution.
pub struct Resolved {
	pub role: Role,
	pub user_id: Option<UserId>,
}

/// Resolves join credentials against the `boards`/`board_invites` tables.
#[derive(Clone)]
pub struct AuthResolver {
	pool: PgPool,
	jwt_secret: String,
}

impl AuthResolver {
	pub fn new(pool: PgPool, jwt_secret: String) -> Self {
		Self { pool, jwt_secret }
	}

	/// Resolve a `join` message's auth payload into a role (and, for the
	/// owner path, a user id).
	pub async fn resolve(&self, board_id: &BoardId, auth: &AuthPayload) -> Result<Resolved, AuthError> {
		let owner_user_id = self.load_owner_user_id(board_id).await?;

		match auth {
			AuthPayload::Owner { supabase_jwt } => {
				let claims = self.verify_owner_jwt(supabase_jwt)?;
				if claims.sub != owner_user_id {
					return Err(AuthError::NotBoardOwner);
				}
				Ok(Resolved { role: Role::Owner, user_id: Some(UserId::new(claims.sub).map_err(|_| AuthError::InvalidOwnerToken)?) })
			}
			AuthPayload::Invite { invite_token } => {
				let role = self.resolve_invite(board_id, invite_token).await?;
				Ok(Resolved { role, user_id: None })
			}
		}
	}

	fn verify_owner_jwt(&self, token: &str) -> Result<OwnerClaims, AuthError> {
		let key = DecodingKey::from_secret(self.jwt_secret.as_bytes());
		let validation = Validation::new(Algorithm::HS256);
		let data = decode::<OwnerClaims>(token, &key, &validation).map_err(|_| AuthError::InvalidOwnerToken)?;
		Ok(data.claims)
	}

	async fn load_owner_user_id(&self, board_id: &BoardId) -> Result<String, AuthError> {
		let row: Option<(String,)> =
			sqlx::query_as("SELECT owner_user_id FROM boards WHERE id = $1").bind(board_id.as_str()).fetch_optional(&self.pool).await?;
		row.map(|(owner,)| owner).ok_or(AuthError::BoardNotFound)
	}

	async fn resolve_invite(&self, board_id: &BoardId, raw_token: &str) -> Result<Role, AuthError> {
		let normalized = normalize_invite_token(raw_token);
		let token_hash = sha256_hex(&normalized);

		let row: Option<(String, Option<i64>, Option<i64>)> = sqlx::query_as(
			"SELECT role, expires_at, revoked_at FROM board_invites WHERE board_id = $1 AND token_hash = $2",
		)
		.bind(board_id.as_str())
		.bind(&token_hash)
		.fetch_optional(&self.pool)
		.await?;

		let (role, expires_at, revoked_at) = row.ok_or(AuthError::InvalidInviteToken)?;

		if revoked_at.is_some() {
			return Err(AuthError::InviteRevoked);
		}
		if let Some(expires_at) = expires_at {
			let now = board_util::unix_ms_now();
			if expires_at <= now {
				return Err(AuthError::InviteExpired);
			}
		}

		role.parse::<Role>().map_err(|_| AuthError::InvalidInviteToken)
	}
}

/// Accepts a raw token, `invite=<token>`, or a URL containing `?invite=` /
/// `#invite=`, returning just the token value.
fn normalize_invite_token(raw: &str) -> String {
	let raw = raw.trim();
	for marker in ["?invite=", "#invite=", "invite="] {
		if let Some(idx) = raw.find(marker) {
			let after = &raw[idx + marker.len()..];
			let end = after.find(['&', '#']).unwrap_or(after.len());
			return after[..end].to_string();
		}
	}
	raw.to_string()
}

fn sha256_hex(value: &str) -> String {
	let mut hasher = Sha256::new();
	hasher.update(value.as_bytes());
	let digest = hasher.finalize();
	digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn normalize_accepts_raw_token() {
		assert_eq!(normalize_invite_token("abc123"), "abc123");
	}

	#[test]
	fn normalize_accepts_invite_equals_form() {
		assert_eq!(normalize_invite_token("invite=abc123"), "abc123");
	}

	#[test]
	fn normalize_accepts_query_form() {
		assert_eq!(normalize_invite_token("https://x.example/b?invite=abc123&other=1"), "abc123");
	}

	#[test]
	fn normalize_accepts_fragment_form() {
		assert_eq!(normalize_invite_token("https://x.example/b#invite=abc123"), "abc123");
	}

	#[test]
	fn sha256_hex_is_stable_and_lowercase() {
		let h1 = sha256_hex("abc123");
		let h2 = sha256_hex("abc123");
		assert_eq!(h1, h2);
		assert_eq!(h1.len(), 64);
		assert!(h1.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
	}
}
