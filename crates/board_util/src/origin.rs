//! Origin allow-list parsing for the `ALLOWED_ORIGINS` environment variable.

/// A parsed `ALLOWED_ORIGINS` allow-list. An empty list (the `ALLOWED_ORIGINS`
/// env var unset or blank) permits every origin.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AllowedOrigins {
	entries: Vec<String>,
}

impl AllowedOrigins {
	/// Parse a CSV list of origins, e.g. `https://a.example,https://b.example`.
	/// Blank entries are dropped; an entirely blank/empty input allows all origins.
	pub fn parse(csv: &str) -> Self {
		let entries = csv
			.split(',')
			.map(|s| s.trim())
			.filter(|s| !s.is_empty())
			.map(|s| s.trim_end_matches('/').to_string())
			.collect();
		Self { entries }
	}

	/// `true` if this allow-list has no entries (permit-all mode).
	pub fn allows_all(&self) -> bool {
		self.entries.is_empty()
	}

	/// Check whether `origin` (as sent in the `Origin` request header) is permitted.
	/// A request with no `Origin` header at all (e.g. a non-browser client) is
	/// permitted regardless of the allow-list, since there is nothing to check
	/// against; browsers always send `Origin` on upgrade requests.
	pub fn permits(&self, origin: Option<&str>) -> bool {
		if self.allows_all() {
			return true;
		}
		let Some(origin) = origin else {
			return true;
		};
		let origin = origin.trim_end_matches('/');
		self.entries.iter().any(|e| e == origin)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn empty_input_allows_all() {
		let allow = AllowedOrigins::parse("");
		assert!(allow.allows_all());
		assert!(allow.permits(Some("https://evil.example")));
	}

	#[test]
	fn blank_csv_entries_are_dropped() {
		let allow = AllowedOrigins::parse(" , ,https://a.example, ");
		assert!(!allow.allows_all());
		assert!(allow.permits(Some("https://a.example")));
		assert!(!allow.permits(Some("https://b.example")));
	}

	#[test]
	fn trailing_slash_is_normalized() {
		let allow = AllowedOrigins::parse("https://a.example/");
		assert!(allow.permits(Some("https://a.example")));
	}

	#[test]
	fn missing_origin_header_is_permitted() {
		let allow = AllowedOrigins::parse("https://a.example");
		assert!(allow.permits(None));
	}

	#[test]
	fn multiple_origins_are_all_checked() {
		let allow = AllowedOrigins::parse("https://a.example,https://b.example");
		assert!(allow.permits(Some("https://a.example")));
		assert!(allow.permits(Some("https://b.example")));
		assert!(!allow.permits(Some("https://c.example")));
	}
}
