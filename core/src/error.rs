use core::fmt;

/// Error kinds the core can report, per the source's `mStatus` enum. Kept
/// as a plain enum with a hand-written `Display`, matching how the
/// teacher's own `utils::error` module avoids pulling in a derive macro for
/// something this small.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Error {
	BadParam,
	AlreadyRegistered,
	BadReference,
	Invalid,
	/// No cache memory configured; the platform never answered a
	/// `GrowCache` request.
	NoCache,
	NameConflict,
	/// Callback-only: signals the client that it is now safe to free the
	/// storage behind a deregistered auth record.
	MemFree,
	/// The core is shutting down (`start_exit`/`finalize_exit` in
	/// progress); new registrations are rejected.
	ServiceNotRunning,
	NoMemory,
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let msg = match self {
			Self::BadParam => "invalid parameter",
			Self::AlreadyRegistered => "record is already registered",
			Self::BadReference => "reference does not name a live record or question",
			Self::Invalid => "operation is not valid in the current state",
			Self::NoCache => "no cache memory configured",
			Self::NameConflict => "name conflict detected on the network",
			Self::MemFree => "record storage may now be freed",
			Self::ServiceNotRunning => "core is shutting down",
			Self::NoMemory => "out of memory",
		};

		f.write_str(msg)
	}
}

impl std::error::Error for Error {}

pub type Result<T = ()> = core::result::Result<T, Error>;
