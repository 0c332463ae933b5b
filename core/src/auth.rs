use std::time::Duration;

use collections::slab::{Key, Slab};

use crate::platform::RecordOutcome;
use crate::record::{InterfaceId, InterfaceSelector, RecordData};
use crate::time::Tick;

pub type AuthKey = Key<AuthRecord>;

pub const PROBE_COUNT: u8 = 3;
pub const PROBE_INTERVAL: Duration = Duration::from_millis(250);
pub const MAX_PROBE_RESTARTS: u8 = 20;
pub const FAILED_PROBE_RATE_LIMIT_THRESHOLD: u32 = 15;
pub const FAILED_PROBE_RATE_LIMIT: Duration = Duration::from_secs(5);

pub const INITIAL_ANNOUNCE_COUNT: u8 = 4;
pub const INITIAL_ANNOUNCE_INTERVAL: Duration = Duration::from_millis(500);

pub const GOODBYE_COUNT: u8 = 3;
pub const RAPID_GOODBYE_COUNT: u8 = 1;

pub const UPDATE_CREDITS_MAX: u8 = 3;
pub const UPDATE_CREDIT_INTERVAL: Duration = Duration::from_secs(6);

/// §3 `RecordType`. `Unique` is "currently probing"; `Verified` is past
/// that with no conflict; `Shared` never probes and must goodbye.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordType {
	Unregistered,
	Deregistering,
	Unique,
	Verified,
	KnownUnique,
	Shared,
	Advisory,
}

impl RecordType {
	pub fn probes(self) -> bool {
		matches!(self, Self::Unique)
	}

	/// Whether a record in this state answers queries (§3 invariant: never
	/// while `Unique`, always once `Verified`).
	pub fn answers_queries(self) -> bool {
		!matches!(self, Self::Unique | Self::Unregistered | Self::Deregistering)
	}

	pub fn must_goodbye(self) -> bool {
		matches!(self, Self::Shared | Self::Advisory)
	}
}

/// Which peer a pending answer is destined for (§9 "target type
/// sentinels": `AnswerTo` replaces the source's overloaded pointer).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnswerTo {
	None,
	/// A legacy (non-mDNS-aware) unicast query: reply straight back to the
	/// requester's address using its transaction id.
	Legacy(std::net::SocketAddr),
	Unicast(std::net::SocketAddr),
	Multicast,
}

/// §3 "Dependencies: RRSet (membership token)". Two records with an equal
/// token are the same atomic set for tie-breaking and coherence purposes;
/// assigned at registration time for records composed together (e.g. the
/// SRV+TXT+PTR trio of a service).
pub type RRSetId = u64;

pub struct AuthRecord {
	pub data: RecordData,
	pub kind: RecordType,

	pub probe_count: u8,
	pub announce_count: u8,
	pub this_ap_interval: Duration,
	pub last_ap_time: Tick,
	pub last_mc_time: Tick,
	pub last_mc_interface: Option<InterfaceId>,

	pub dependent_on: Option<AuthKey>,
	pub rrset: Option<RRSetId>,
	pub additional: [Option<AuthKey>; 2],

	pub immed_answer: InterfaceSelector,
	pub immed_additional: bool,
	pub send_nsec_now: bool,
	pub answer_to: AnswerTo,
	pub answered_local_q: bool,
	pub require_goodbye: bool,
	pub acknowledged: bool,

	pub update_credits: u8,
	pub next_update_credit: Tick,
	pub update_blocked: bool,

	/// Restart cycles since this record first started probing (§4.1
	/// `MAX_PROBE_RESTARTS`).
	pub probe_restarts: u8,
	/// Globally-scoped failed-probe counter feeding the "after 15 failed
	/// probes, rate-limit conflicts to 1/5s" rule. Stored per record for
	/// simplicity; the store aggregates it when deciding whether a new
	/// conflict is allowed to restart immediately.
	pub failed_probes: u32,
	pub suppress_probes_until: Option<Tick>,

	/// Set once to delay the very first probe by a random offset (§4.1).
	probes_started: bool,
}

impl AuthRecord {
	fn new(data: RecordData, kind: RecordType, rrset: Option<RRSetId>, now: Tick) -> Self {
		Self {
			data,
			kind,
			probe_count: PROBE_COUNT,
			announce_count: INITIAL_ANNOUNCE_COUNT,
			this_ap_interval: INITIAL_ANNOUNCE_INTERVAL,
			last_ap_time: Tick::ZERO,
			last_mc_time: now,
			last_mc_interface: None,
			dependent_on: None,
			rrset,
			additional: [None, None],
			immed_answer: InterfaceSelector::Any,
			immed_additional: false,
			send_nsec_now: false,
			answer_to: AnswerTo::None,
			answered_local_q: false,
			require_goodbye: false,
			acknowledged: false,
			update_credits: UPDATE_CREDITS_MAX,
			next_update_credit: now,
			update_blocked: false,
			probe_restarts: 0,
			failed_probes: 0,
			suppress_probes_until: None,
			probes_started: false,
		}
	}

	pub fn is_probing(&self) -> bool {
		self.kind == RecordType::Unique
	}

	/// §4.1: records that form an RRSet together, or where one depends on
	/// the other, never conflict with each other even with different
	/// rdata.
	pub fn shielded_from(&self, other: &AuthRecord, self_key: AuthKey, other_key: AuthKey) -> bool {
		(self.rrset.is_some() && self.rrset == other.rrset) || self.dependent_on == Some(other_key) || other.dependent_on == Some(self_key)
	}
}

/// Outcome of comparing our proposed record against an incoming
/// authority-section record during a probe collision (§4.1, §4.6).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TieBreak {
	WeWin,
	WeLose,
}

/// Lexicographic comparison of {class, type, rdata-canonical-form}, per
/// §4.1. Canonical form of rdata is just its encoded wire bytes with an
/// empty compression table (no pointers, so the comparison is
/// deterministic regardless of packet layout).
pub fn tie_break(ours: &RecordData, theirs: &RecordData) -> TieBreak {
	use std::collections::HashMap;

	if ours.class != theirs.class {
		return if ours.class > theirs.class { TieBreak::WeWin } else { TieBreak::WeLose };
	}

	if ours.ty != theirs.ty {
		return if ours.ty.code() > theirs.ty.code() { TieBreak::WeWin } else { TieBreak::WeLose };
	}

	let mut ours_bytes = Vec::new();
	let mut theirs_bytes = Vec::new();
	ours.rdata.encode(&mut ours_bytes, &mut HashMap::new());
	theirs.rdata.encode(&mut theirs_bytes, &mut HashMap::new());

	if ours_bytes > theirs_bytes {
		TieBreak::WeWin
	} else {
		TieBreak::WeLose
	}
}

/// The hashed set of locally-owned records (§2, §3), plus the FSM driving
/// each one through probe → verify → announce → (deregister → goodbye).
#[derive(Default)]
pub struct AuthStore {
	records: Slab<AuthRecord>,
	next_rrset: RRSetId,
}

impl AuthStore {
	pub fn register(&mut self, data: RecordData, kind: RecordType, now: Tick) -> AuthKey {
		self.records.insert(AuthRecord::new(data, kind, None, now))
	}

	/// Register several records as one atomic RRSet (§6 "Register a
	/// service"): they share an `RRSet` token so they never tie-break
	/// against each other and their cache-flush emission is coherent.
	pub fn register_group(&mut self, group: Vec<(RecordData, RecordType)>, now: Tick) -> Vec<AuthKey> {
		let rrset = group.len() > 1;
		let token = rrset.then(|| {
			self.next_rrset += 1;
			self.next_rrset
		});

		group.into_iter().map(|(data, kind)| self.records.insert(AuthRecord::new(data, kind, token, now))).collect()
	}

	pub fn get(&self, key: AuthKey) -> Option<&AuthRecord> {
		self.records.get(key)
	}

	pub fn get_mut(&mut self, key: AuthKey) -> Option<&mut AuthRecord> {
		self.records.get_mut(key)
	}

	pub fn iter(&self) -> impl Iterator<Item = (AuthKey, &AuthRecord)> {
		self.records.iter()
	}

	pub fn iter_mut(&mut self) -> impl Iterator<Item = (AuthKey, &mut AuthRecord)> {
		self.records.iter_mut()
	}

	/// Begin deregistration. Shared/Advisory records that have announced
	/// at least once must goodbye first (§4.1); everything else is
	/// removed immediately and the caller should issue `MemFree` now.
	pub fn deregister(&mut self, key: AuthKey, rapid: bool) -> bool {
		let Some(record) = self.records.get_mut(key) else { return false };

		let announced = record.last_ap_time != Tick::ZERO;

		if record.kind.must_goodbye() && announced {
			record.kind = RecordType::Deregistering;
			record.require_goodbye = true;
			record.probe_count = 0;
			record.announce_count = if rapid { RAPID_GOODBYE_COUNT } else { GOODBYE_COUNT };
			record.this_ap_interval = INITIAL_ANNOUNCE_INTERVAL;
			record.last_ap_time = Tick::ZERO;
			record.probes_started = true;
			false
		} else {
			self.records.remove(key);
			true
		}
	}

	pub fn remove(&mut self, key: AuthKey) -> Option<AuthRecord> {
		self.records.remove(key)
	}

	/// Start (or restart) probing: delayed by a random `SuppressProbes`
	/// offset capped to 8s in the future (§4.1).
	pub fn start_probe(&mut self, key: AuthKey, now: Tick, jitter_ms: u32) {
		if let Some(record) = self.records.get_mut(key) {
			record.kind = RecordType::Unique;
			record.probe_count = PROBE_COUNT;
			record.announce_count = INITIAL_ANNOUNCE_COUNT;
			record.this_ap_interval = INITIAL_ANNOUNCE_INTERVAL;
			let offset = Duration::from_millis(125 + (jitter_ms % 125) as u64);
			record.last_ap_time = now.saturating_add(offset.min(Duration::from_secs(8)));
			record.last_mc_time = now;
			record.probes_started = true;
		}
	}

	/// Deadline at which this record next needs a probe or announce
	/// packet sent, or `None` if it's settled (fully announced, not
	/// deregistering).
	pub fn next_deadline(&self, key: AuthKey) -> Option<Tick> {
		let record = self.records.get(key)?;

		if let Some(until) = record.suppress_probes_until {
			return Some(until);
		}

		if record.probes_started && (record.probe_count > 0 || record.announce_count > 0) {
			Some(record.last_ap_time)
		} else {
			None
		}
	}

	/// Advance one probe or announcement send for `key` if its deadline
	/// has arrived. Returns `Some(is_probe)` if a packet should be built
	/// for it now.
	pub fn tick(&mut self, key: AuthKey, now: Tick) -> Option<bool> {
		let record = self.records.get_mut(key)?;

		if let Some(until) = record.suppress_probes_until {
			if !now.at_or_after(until) {
				return None;
			}

			record.suppress_probes_until = None;
		}

		if !record.probes_started || !now.at_or_after(record.last_ap_time) {
			return None;
		}

		if record.probe_count > 0 {
			record.probe_count -= 1;
			record.last_ap_time = now.saturating_add(PROBE_INTERVAL);
			record.last_mc_time = now;

			if record.probe_count == 0 {
				record.kind = if record.kind == RecordType::Deregistering { record.kind } else { RecordType::Verified };
				record.acknowledged = true;
				// First response after winning probing asserts an NSEC too
				// (RFC 6762 §6.1), so a querier asking for a sibling type
				// learns right away that none exists.
				record.send_nsec_now = true;
			}

			Some(true)
		} else if record.announce_count > 0 {
			record.announce_count -= 1;
			let next_interval = record.this_ap_interval * 2;
			record.this_ap_interval = next_interval;
			record.last_ap_time = now.saturating_add(record.this_ap_interval);

			if record.announce_count == 0 && record.kind == RecordType::Deregistering {
				record.probes_started = false;
			}

			Some(false)
		} else {
			None
		}
	}

	/// Apply a lost tie-break (§4.1 scenario 2): delay one second, reset
	/// probe/announce counters, bump the restart counter. Returns `false`
	/// if the record has exhausted `MAX_PROBE_RESTARTS` and must give up
	/// silently.
	pub fn lose_tie_break(&mut self, key: AuthKey, now: Tick) -> bool {
		let Some(record) = self.records.get_mut(key) else { return false };

		record.probe_restarts += 1;
		record.failed_probes += 1;

		if record.probe_restarts > MAX_PROBE_RESTARTS {
			return false;
		}

		let delay = if record.failed_probes > FAILED_PROBE_RATE_LIMIT_THRESHOLD { FAILED_PROBE_RATE_LIMIT } else { Duration::from_secs(1) };

		record.probe_count = PROBE_COUNT;
		record.announce_count = INITIAL_ANNOUNCE_COUNT;
		record.this_ap_interval = INITIAL_ANNOUNCE_INTERVAL;
		record.last_ap_time = now.saturating_add(delay);
		record.suppress_probes_until = Some(now.saturating_add(delay));
		record.kind = RecordType::Unique;

		true
	}

	/// Inbound data contradicts a Verified/KnownUnique record we hold
	/// (§4.1 "Conflict resolution on inbound response"). Returns the
	/// outcome to report to the client.
	pub fn on_conflict(&mut self, key: AuthKey, now: Tick) -> Option<RecordOutcome> {
		let record = self.records.get_mut(key)?;

		match record.kind {
			RecordType::Verified => {
				record.kind = RecordType::Unique;
				record.probe_count = PROBE_COUNT;
				record.failed_probes += 1;
				record.last_ap_time = now;
				None
			}
			RecordType::KnownUnique => {
				record.kind = RecordType::Deregistering;
				Some(RecordOutcome::NameConflict)
			}
			_ => None,
		}
	}

	/// §3's update-credit bucket: 3 credits refilling one per 6s;
	/// exhausting them multiplies the announce interval by 4 instead of
	/// rejecting the update outright.
	pub fn spend_update_credit(&mut self, key: AuthKey, now: Tick) -> bool {
		let Some(record) = self.records.get_mut(key) else { return false };

		while now.at_or_after(record.next_update_credit) && record.update_credits < UPDATE_CREDITS_MAX {
			record.update_credits += 1;
			record.next_update_credit = record.next_update_credit.saturating_add(UPDATE_CREDIT_INTERVAL);
		}

		if record.update_credits == 0 {
			record.update_blocked = true;
			record.this_ap_interval *= 4;
			false
		} else {
			record.update_credits -= 1;
			record.update_blocked = false;
			true
		}
	}
}

#[cfg(test)]
mod tests {
	use wire::{Name, RData};

	use super::*;

	fn data(name: &str, rdata: RData) -> RecordData {
		RecordData::new(Name::parse(name).unwrap(), wire::class::IN, 120, rdata, InterfaceSelector::Any)
	}

	#[test]
	fn probe_then_verify_sequence() {
		let mut store = AuthStore::default();
		let key = store.register(data("foo.local.", RData::A([192, 0, 2, 5])), RecordType::Unique, Tick(0));
		store.start_probe(key, Tick(0), 0);

		let mut now = store.next_deadline(key).unwrap();
		let mut probes = 0;

		for _ in 0..PROBE_COUNT {
			assert_eq!(store.tick(key, now), Some(true));
			probes += 1;
			now = store.next_deadline(key).unwrap_or(now);
		}

		assert_eq!(probes, PROBE_COUNT);
		assert_eq!(store.get(key).unwrap().kind, RecordType::Verified);
		assert!(store.get(key).unwrap().acknowledged);
	}

	#[test]
	fn losing_tie_break_resets_and_restarts() {
		let mut store = AuthStore::default();
		let key = store.register(data("bar.local.", RData::A([192, 0, 2, 2])), RecordType::Unique, Tick(0));
		store.start_probe(key, Tick(0), 0);
		store.tick(key, store.next_deadline(key).unwrap());

		assert!(store.lose_tie_break(key, Tick(1000)));
		let record = store.get(key).unwrap();
		assert_eq!(record.probe_count, PROBE_COUNT);
		assert_eq!(record.announce_count, INITIAL_ANNOUNCE_COUNT);
		assert_eq!(record.kind, RecordType::Unique);
	}

	#[test]
	fn gives_up_after_max_restarts() {
		let mut store = AuthStore::default();
		let key = store.register(data("baz.local.", RData::A([192, 0, 2, 3])), RecordType::Unique, Tick(0));

		for _ in 0..MAX_PROBE_RESTARTS {
			assert!(store.lose_tie_break(key, Tick(0)));
		}

		assert!(!store.lose_tie_break(key, Tick(0)));
	}

	#[test]
	fn tie_break_prefers_greater_rdata_bytes() {
		let ours = data("a.local.", RData::A([10, 0, 0, 2]));
		let theirs = data("a.local.", RData::A([10, 0, 0, 1]));
		assert_eq!(tie_break(&ours, &theirs), TieBreak::WeWin);
		assert_eq!(tie_break(&theirs, &ours), TieBreak::WeLose);
	}

	#[test]
	fn shared_record_requires_goodbye_after_announcing() {
		let mut store = AuthStore::default();
		let mut data = data("_printer._tcp.local.", RData::Ptr(Name::parse("foo._printer._tcp.local.").unwrap()));
		data.ttl = 4500;
		let key = store.register(data, RecordType::Shared, Tick(0));

		store.get_mut(key).unwrap().last_ap_time = Tick(500); // simulate "has announced"

		assert!(!store.deregister(key, false));
		assert!(store.get(key).unwrap().require_goodbye);
		assert_eq!(store.get(key).unwrap().kind, RecordType::Deregistering);
	}

	#[test]
	fn update_credits_exhaust_and_refill() {
		let mut store = AuthStore::default();
		let key = store.register(data("x.local.", RData::A([1, 1, 1, 1])), RecordType::Verified, Tick(0));

		for _ in 0..UPDATE_CREDITS_MAX {
			assert!(store.spend_update_credit(key, Tick(0)));
		}

		assert!(!store.spend_update_credit(key, Tick(0)));
		assert!(store.get(key).unwrap().update_blocked);

		assert!(store.spend_update_credit(key, Tick(0).saturating_add(UPDATE_CREDIT_INTERVAL)));
	}
}
