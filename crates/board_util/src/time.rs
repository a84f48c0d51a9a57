use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn unix_ms_now() -> i64 {
	SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn returns_a_plausible_millisecond_timestamp() {
		let now = unix_ms_now();
		// 2020-01-01T00:00:00Z in epoch millis, as a sanity floor.
		assert!(now > 1_577_836_800_000);
	}
}
