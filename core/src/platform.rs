use crate::record::InterfaceId;
use crate::{AuthKey, QuestionEvent, QuestionKey};
use wire::Message;

/// Destination of an outbound packet, as `SendDNSMessage` in §6 describes
/// it: either the mDNS multicast group on one interface, or a specific
/// unicast peer (legacy unicast reply, or a unicast query response).
#[derive(Clone, Copy, Debug)]
pub enum Destination {
	Multicast,
	Unicast(std::net::SocketAddr),
}

/// Everything the core needs from its environment: sending bytes, a source
/// of randomness for jitter, and the upcalls a client registers interest
/// in. One object plays all these roles in the example runtime, the same
/// way the teacher's `Io<T>` wraps both directions of a single socket.
pub trait Platform {
	fn send(&mut self, interface: InterfaceId, dest: Destination, message: &Message);

	/// Uniform random value in `0..bound`, used for probe/announce jitter
	/// and batching delays. `bound == 0` must not be passed.
	fn random(&mut self, bound: u32) -> u32;

	fn record_event(&mut self, key: AuthKey, outcome: RecordOutcome);

	fn question_event(&mut self, key: QuestionKey, record: &wire::Record, event: QuestionEvent);

	fn main_event(&mut self, event: MainEvent) {
		let _ = event;
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordOutcome {
	NoError,
	NameConflict,
	/// Final callback for a deregistered record; storage may now be freed.
	MemFree,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MainEvent {
	NoError,
	ConfigChanged,
	GrowCache,
}
