//! Monotonic time as the core sees it: an opaque millisecond tick supplied
//! by the platform, never read from the OS directly. Every scheduling field
//! in the spec (`NextScheduledQuery`, `LastAPTime`, ...) is one of these.

use core::ops::{Add, Sub};
use std::time::Duration;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
pub struct Tick(pub u64);

impl Tick {
	pub const ZERO: Tick = Tick(0);

	/// Wrap-safe "has this deadline passed" check, per §5's note that all
	/// timeout comparisons must tolerate tick-counter wraparound. `u64`
	/// ticks won't realistically wrap in this engine's lifetime, but the
	/// signed-subtraction idiom is kept so the comparison reads the same
	/// way the spec describes it.
	pub fn at_or_after(self, other: Tick) -> bool {
		(self.0.wrapping_sub(other.0) as i64) >= 0
	}

	pub fn saturating_add(self, dur: Duration) -> Tick {
		Tick(self.0.saturating_add(dur.as_millis() as u64))
	}

	pub fn saturating_sub(self, dur: Duration) -> Tick {
		Tick(self.0.saturating_sub(dur.as_millis() as u64))
	}

	pub fn duration_since(self, earlier: Tick) -> Duration {
		Duration::from_millis(self.0.saturating_sub(earlier.0))
	}
}

impl Add<Duration> for Tick {
	type Output = Tick;

	fn add(self, rhs: Duration) -> Tick {
		self.saturating_add(rhs)
	}
}

impl Sub<Duration> for Tick {
	type Output = Tick;

	fn sub(self, rhs: Duration) -> Tick {
		self.saturating_sub(rhs)
	}
}

/// The minimum of a set of optional deadlines, ignoring `None`s; `None` if
/// every input was `None`. Used to fold the per-subsystem deadlines into
/// `NextScheduledEvent` (§4.7, §8).
pub fn earliest(deadlines: impl IntoIterator<Item = Option<Tick>>) -> Option<Tick> {
	deadlines.into_iter().flatten().min()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn at_or_after_handles_equal_and_future() {
		let now = Tick(100);
		assert!(now.at_or_after(Tick(100)));
		assert!(now.at_or_after(Tick(50)));
		assert!(!now.at_or_after(Tick(150)));
	}

	#[test]
	fn earliest_picks_the_minimum_present_deadline() {
		let result = earliest([None, Some(Tick(50)), Some(Tick(10)), None]);
		assert_eq!(result, Some(Tick(10)));
	}

	#[test]
	fn earliest_of_all_none_is_none() {
		let result: Option<Tick> = earliest([None, None]);
		assert_eq!(result, None);
	}
}
