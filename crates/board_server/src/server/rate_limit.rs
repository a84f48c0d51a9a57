#![forbid(unsafe_code)]

//! Sliding-window rate limiting via a token bucket, used for per-session op
//! and presence windows and for the per-IP join-attempt window.

use std::time::Instant;

/// A token bucket refilling continuously at `refill_per_sec`, holding at
/// most `capacity` tokens. `allow()` consumes one token if available.
#[derive(Debug, Clone)]
pub struct TokenBucket {
	capacity: f64,
	tokens: f64,
	refill_per_sec: f64,
	last: Instant,
}

impl TokenBucket {
	/// A bucket that permits `max_events` per `window_secs`, refilling
	/// continuously rather than resetting at a hard boundary.
	pub fn new(max_events: u32, window_secs: f64) -> Self {
		let capacity = f64::from(max_events.max(1));
		Self { capacity, tokens: capacity, refill_per_sec: capacity / window_secs.max(0.001), last: Instant::now() }
	}

	fn refill(&mut self, now: Instant) {
		let elapsed = now.duration_since(self.last).as_secs_f64();
		if elapsed > 0.0 {
			self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
			self.last = now;
		}
	}

	/// Consume one token if available, returning whether the event is allowed.
	pub fn allow(&mut self) -> bool {
		let now = Instant::now();
		self.refill(now);
		if self.tokens >= 1.0 {
			self.tokens -= 1.0;
			true
		} else {
			false
		}
	}

	/// Reset to a full bucket. Used when a join succeeds, clearing the IP's
	/// rate-limit history per the join procedure.
	pub fn reset(&mut self) {
		self.tokens = self.capacity;
		self.last = Instant::now();
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::thread::sleep;
	use std::time::Duration;

	#[test]
	fn allows_up_to_capacity_then_blocks() {
		let mut bucket = TokenBucket::new(3, 60.0);
		assert!(bucket.allow());
		assert!(bucket.allow());
		assert!(bucket.allow());
		assert!(!bucket.allow());
	}

	#[test]
	fn refills_over_time() {
		let mut bucket = TokenBucket::new(2, 0.05);
		assert!(bucket.allow());
		assert!(bucket.allow());
		assert!(!bucket.allow());
		sleep(Duration::from_millis(60));
		assert!(bucket.allow());
	}

	#[test]
	fn reset_clears_consumed_tokens() {
		let mut bucket = TokenBucket::new(1, 60.0);
		assert!(bucket.allow());
		assert!(!bucket.allow());
		bucket.reset();
		assert!(bucket.allow());
	}
}
