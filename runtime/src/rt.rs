use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant, SystemTime};

use utils::error::Result;

use crate::GLOBAL;

static EXIT: AtomicBool = AtomicBool::new(false);

/// Start the reactor's clock: a monotonic anchor for scheduling plus a
/// wall-clock anchor for `time::system`/`time::unix`. Everything the caller
/// schedules afterwards is expressed as a `Duration` since `start`.
pub fn init() -> (Instant, SystemTime) {
	(Instant::now(), SystemTime::now())
}

/// Drive the reactor until a Ctrl+C (or an unrecoverable poll failure)
/// requests an exit.
///
/// `tick` is called once up front and again every time either a socket
/// became readable/writable or a previously-returned deadline has passed; it
/// returns the next deadline (as an elapsed-since-`start` duration) it wants
/// to be woken up at, or `None` if nothing is scheduled. `exit_fn` runs once
/// when a shutdown is requested, and `tick` keeps being called afterwards so
/// it can drain any goodbye burst before the loop actually exits.
pub fn exec(start: Instant, mut tick: impl FnMut(Duration) -> Option<Duration>, mut exit_fn: impl FnMut(Duration) -> bool) -> Result {
	ctrlc::set_handler(|| EXIT.store(true, Ordering::Relaxed)).map_err(|err| log::error!("Error occurred while setting Ctrl+C handler: {err}"))?;

	GLOBAL.with(|this| {
		let mut deadline = tick(start.elapsed());
		let mut exiting = false;

		loop {
			if EXIT.load(Ordering::Relaxed) && !exiting {
				exiting = true;
			}

			if exiting && exit_fn(start.elapsed()) {
				break;
			}

			let timeout = deadline.map(|d| d.saturating_sub(start.elapsed()));

			if timeout.is_none() && !this.borrow().is_io() && !exiting {
				break;
			}

			log::trace!("exiting: {}, timeout: {:?}", exiting, timeout);

			let Ok(is_io) = this.borrow_mut().poll(timeout.or(exiting.then_some(Duration::from_millis(50)))) else {
				EXIT.store(true, Ordering::Relaxed);
				exiting = true;
				continue;
			};

			let now = start.elapsed();

			if is_io || deadline.is_some_and(|d| now >= d) {
				deadline = tick(now);
			}
		}

		Ok(())
	})
}
