use std::time::{Instant, SystemTime};

/// Get the current system time, reconstructed from the monotonic clock the
/// reactor actually schedules against (`start`/`start_sys` are the pair
/// `rt::init` anchors once at startup).
pub fn system(start: Instant, start_sys: SystemTime) -> SystemTime {
	start_sys + start.elapsed()
}

/// Get the UNIX time in seconds.
pub fn unix(start: Instant, start_sys: SystemTime) -> u32 {
	let time = system(start, start_sys);

	let unix = time
		.duration_since(SystemTime::UNIX_EPOCH)
		.expect("The current time should be after the UNIX epoch");

	unix.as_secs().try_into().expect("32-bit UNIX time should not overflow")
}
