//! The single conceptual lock and the iteration cursors that sit under it
//! (§5 "Concurrency & resource model", §9 "Reentrancy"). Every public
//! `Core` entry point enters through `Lock::enter`, which tracks how many
//! calls are nested so a client callback invoked from deep inside
//! `execute`/`receive` can itself call back into the core without either
//! corrupting state or deadlocking — there is no real lock to take, only a
//! counter proving the caller is still inside the same logical turn.

use collections::slab::Key;

/// `busy` counts every nested entry (including the outermost); `reentrancy`
/// counts only the nested ones. The invariant `busy == reentrancy + 1` holds
/// at every point where a callback is about to run, and is asserted in debug
/// builds at `leave()`.
#[derive(Default)]
pub struct Lock {
	busy: u32,
	reentrancy: u32,
}

/// RAII guard returned by [`Lock::enter`]. Decrements the counters on drop
/// so an early return (an error, a `?`) can't leave the lock held.
pub struct Guard<'a> {
	lock: &'a mut Lock,
}

impl Lock {
	/// Enter a new logical turn. The first call (from the platform, via
	/// `execute`/`receive`) has `reentrancy == 0`; a callback that turns
	/// around and calls a `Core` method again sees `reentrancy >= 1`.
	pub fn enter(&mut self) -> Guard<'_> {
		if self.busy > 0 {
			self.reentrancy += 1;
		}

		self.busy += 1;
		Guard { lock: self }
	}

	pub fn is_reentrant(&self) -> bool {
		self.reentrancy > 0
	}

	pub fn depth(&self) -> u32 {
		self.busy
	}
}

impl Drop for Guard<'_> {
	fn drop(&mut self) {
		debug_assert!(self.lock.busy == self.lock.reentrancy + 1, "busy/reentrancy invariant violated on leave");

		self.lock.busy -= 1;

		if self.lock.reentrancy > 0 {
			self.lock.reentrancy -= 1;
		}
	}
}

/// An iteration cursor over a keyed collection that survives the element
/// under it being removed mid-iteration (§9: a client callback fired while
/// walking the question or auth-record list may itself stop/deregister the
/// very entry the walk is sitting on). `advance_if_removed` is called by the
/// owning store immediately after a removal; if the removed key is the one
/// the cursor names, the cursor clears so the next `next()` call re-derives
/// its position from the collection instead of dereferencing a dead key.
pub struct Cursor<T> {
	current: Option<Key<T>>,
	/// Set when the entry the cursor pointed at was removed out from under
	/// it; the walk should restart from the beginning of the list rather
	/// than silently skip ahead (§4.3 `RestartQuestion`).
	restart: bool,
}

impl<T> Default for Cursor<T> {
	fn default() -> Self {
		Self { current: None, restart: false }
	}
}

impl<T> Cursor<T> {
	pub fn set(&mut self, key: Key<T>) {
		self.current = Some(key);
		self.restart = false;
	}

	pub fn clear(&mut self) {
		self.current = None;
	}

	pub fn current(&self) -> Option<Key<T>> {
		self.current
	}

	pub fn needs_restart(&self) -> bool {
		self.restart
	}

	pub fn acknowledge_restart(&mut self) {
		self.restart = false;
	}

	/// Called by the owning store right after removing `removed`. If the
	/// cursor was sitting on it, mark the walk for a restart instead of
	/// leaving a stale key behind.
	pub fn on_removed(&mut self, removed: Key<T>) {
		if self.current == Some(removed) {
			self.current = None;
			self.restart = true;
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn nested_enter_tracks_reentrancy() {
		let mut lock = Lock::default();
		let outer = lock.enter();
		assert!(!lock.is_reentrant());

		{
			let _inner = lock.enter();
			assert!(lock.is_reentrant());
			assert_eq!(lock.depth(), 2);
		}

		assert!(!lock.is_reentrant());
		drop(outer);
		assert_eq!(lock.depth(), 0);
	}

	#[test]
	fn cursor_flags_restart_when_current_entry_removed() {
		let mut store: collections::slab::Slab<u32> = collections::slab::Slab::new();
		let key = store.insert(42);
		let mut cursor: Cursor<u32> = Cursor::default();
		cursor.set(key);

		store.remove(key);
		cursor.on_removed(key);

		assert!(cursor.current().is_none());
		assert!(cursor.needs_restart());
	}
}
