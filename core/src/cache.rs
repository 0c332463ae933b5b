use std::collections::HashMap;
use std::time::Duration;

use collections::slab::{Key, Slab};
use wire::{Name, RData, Type};

use crate::question::QuestionKey;
use crate::record::{InterfaceId, InterfaceSelector, RecordData};
use crate::time::Tick;

pub type CacheKey = Key<CacheRecord>;

pub const MAX_UNANSWERED_QUERIES: u8 = 4;
pub const MAX_CACHE_RECORDS: usize = 5000;
pub const MIN_CACHE_UTILIZATION: usize = 32;

/// A record learned from the network (§3 `CacheRecord`).
pub struct CacheRecord {
	pub data: RecordData,
	pub time_rcvd: Tick,
	pub rroriginalttl: u32,
	pub unanswered_queries: u8,
	pub last_unanswered_time: Option<Tick>,
	pub next_required_query: Option<Tick>,
	pub last_used: Tick,
	pub active_question: Option<QuestionKey>,
	/// Set once this record has been delivered to the client as an ADD
	/// event; a record removed before this is true never produces an RMV.
	pub delivered: bool,
	pub delay_delivery: Option<Tick>,
	/// §4.2 goodbye/flush bookkeeping: the tick this record is slated to
	/// expire at, which may be sooner than `time_rcvd + ttl` once a
	/// cache-flush or goodbye has rescheduled it.
	pub expires: Tick,
}

impl CacheRecord {
	pub fn is_goodbye(&self) -> bool {
		self.rroriginalttl == 0
	}
}

/// All cache records sharing a name (§3 `CacheGroup`), bucketed by
/// `namehash` in the store's hash table.
struct CacheGroup {
	name: Name,
	members: Vec<CacheKey>,
}

#[derive(Default)]
pub struct CacheStore {
	records: Slab<CacheRecord>,
	groups: HashMap<u32, Vec<CacheGroup>>,
	count: usize,
}

/// Grace period selection on expire, per §4.2. Longer when nothing is
/// watching the record closely, shortest for an explicit goodbye.
fn grace_period(record: &CacheRecord, now: Tick) -> Duration {
	if record.rroriginalttl == 0 {
		return Duration::ZERO;
	}

	if record.active_question.is_none() {
		return Duration::from_secs(60);
	}

	let final_queries_pending = record.unanswered_queries < MAX_UNANSWERED_QUERIES && record.next_required_query.is_some_and(|t| t.at_or_after(now));

	if final_queries_pending {
		Duration::from_millis(record.rroriginalttl as u64 * 1000 / 50)
	} else if record.rroriginalttl > 10 {
		Duration::from_secs(1)
	} else {
		Duration::from_millis(100)
	}
}

impl CacheStore {
	fn group_index(&self, namehash: u32, name: &Name) -> Option<usize> {
		self.groups.get(&namehash)?.iter().position(|g| &g.name == name)
	}

	fn group_index_mut(&mut self, namehash: u32, name: &Name) -> usize {
		let bucket = self.groups.entry(namehash).or_default();

		if let Some(idx) = bucket.iter().position(|g| &g.name == name) {
			idx
		} else {
			bucket.push(CacheGroup { name: name.clone(), members: Vec::new() });
			bucket.len() - 1
		}
	}

	pub fn len(&self) -> usize {
		self.count
	}

	pub fn is_empty(&self) -> bool {
		self.count == 0
	}

	pub fn get(&self, key: CacheKey) -> Option<&CacheRecord> {
		self.records.get(key)
	}

	pub fn get_mut(&mut self, key: CacheKey) -> Option<&mut CacheRecord> {
		self.records.get_mut(key)
	}

	/// All records sharing `data`'s name, as the question engine's
	/// known-answer pass and the cache-flush pass both need.
	pub fn by_name(&self, namehash: u32, name: &Name) -> impl Iterator<Item = CacheKey> + '_ {
		self.group_index(namehash, name).into_iter().flat_map(move |idx| self.groups[&namehash][idx].members.iter().copied())
	}

	/// §4.2 `CreateNewCacheEntry`. If any existing member of the name's
	/// group expires within 1s, the add callback is deferred so a
	/// goodbye-then-refresh doesn't produce spurious RMV-then-ADD churn.
	pub fn insert(&mut self, data: RecordData, now: Tick) -> CacheKey {
		let namehash = data.namehash;
		let idx = self.group_index_mut(namehash, &data.name);
		let existing_expiring_soon = self.groups[&namehash][idx].members.iter().any(|&key| self.records.get(key).is_some_and(|r| r.expires.duration_since(now) < Duration::from_secs(1)));

		let ttl = data.ttl;
		let expires = now.saturating_add(Duration::from_secs(ttl as u64));

		let record = CacheRecord {
			data,
			time_rcvd: now,
			rroriginalttl: ttl,
			unanswered_queries: 0,
			last_unanswered_time: None,
			next_required_query: Some(schedule_refresh(now, ttl, 0)),
			last_used: now,
			active_question: None,
			delivered: false,
			delay_delivery: existing_expiring_soon.then(|| now.saturating_add(Duration::from_secs(1))),
			expires,
		};

		let key = self.records.insert(record);
		self.groups.get_mut(&namehash).unwrap()[idx].members.push(key);
		self.count += 1;

		key
	}

	pub fn remove(&mut self, key: CacheKey) -> Option<CacheRecord> {
		let record = self.records.remove(key)?;
		let namehash = record.data.namehash;

		if let Some(bucket) = self.groups.get_mut(&namehash) {
			if let Some(idx) = bucket.iter().position(|g| g.name == record.data.name) {
				bucket[idx].members.retain(|&k| k != key);

				if bucket[idx].members.is_empty() {
					bucket.remove(idx);
				}
			}

			if bucket.is_empty() {
				self.groups.remove(&namehash);
			}
		}

		self.count -= 1;
		Some(record)
	}

	/// §4.2 cache-flush bit semantics: when a flush-bit answer for
	/// {name,type,class,interface} arrives, every *other* stored member of
	/// that RRset which isn't "recent" gets rescheduled to expire in 1s;
	/// recent members instead have their TTL harmonized. Returns the keys
	/// that were touched.
	pub fn flush_rrset(&mut self, incoming: &RecordData, now: Tick, new_ttl: u32) -> Vec<CacheKey> {
		let mut touched = Vec::new();
		let keys: Vec<CacheKey> = self.by_name(incoming.namehash, &incoming.name).collect();

		for key in keys {
			let Some(record) = self.records.get_mut(key) else { continue };

			if !record.data.same_identity(incoming) || record.data.identical(incoming) {
				continue;
			}

			let recent = now.duration_since(record.time_rcvd) < Duration::from_secs(1);

			if recent {
				record.rroriginalttl = new_ttl;
				record.expires = record.time_rcvd.saturating_add(Duration::from_secs(new_ttl as u64));
			} else if record.rroriginalttl != 0 {
				record.expires = now.saturating_add(Duration::from_secs(1));
			}

			touched.push(key);
		}

		touched
	}

	/// One tick of cache maintenance: advance refresh-query schedule,
	/// evict anything past its grace period. Returns (next deadline,
	/// evicted records to report as RMV).
	pub fn expire(&mut self, now: Tick) -> (Option<Tick>, Vec<CacheRecord>) {
		let mut expired_keys = Vec::new();
		let mut next = None;

		let keys: Vec<CacheKey> = self.records.keys().collect();

		for key in keys {
			let Some(record) = self.records.get(key) else { continue };
			let deadline = record.expires.saturating_add(grace_period(record, now));

			if now.at_or_after(deadline) {
				expired_keys.push(key);
			} else {
				next = Some(next.map_or(deadline, |n: Tick| n.min(deadline)));
			}
		}

		let expired = expired_keys.into_iter().filter_map(|key| self.remove(key)).collect();

		(next, expired)
	}

	/// §4.2 eviction policy: log rather than grow once past the size cap
	/// with low utilization (the "mostly idle" pathology). Returns whether
	/// insertion should proceed (the caller sweeps reclaimable records
	/// first if this returns `false` and still fails after the sweep).
	pub fn should_grow(&self, active_estimate: usize) -> bool {
		!(self.count >= MAX_CACHE_RECORDS && active_estimate * MIN_CACHE_UTILIZATION < self.count)
	}

	/// §4.2/§6 "Reconfirm a cache record"/`ReconfirmAntecedents`: pull every
	/// live record scoped to `interface` (or every record, if `None`)
	/// forward to needing a fresh query by `deadline` instead of waiting on
	/// its passive refresh schedule. Returns the touched keys so the
	/// caller can decide whether to actively query for them right away.
	pub fn reconfirm(&mut self, interface: Option<InterfaceId>, deadline: Tick) -> Vec<CacheKey> {
		let mut touched = Vec::new();

		for (key, record) in self.records.iter_mut() {
			let scoped = interface.is_none_or(|id| record.data.interface.matches(id));

			if scoped && !record.is_goodbye() {
				record.next_required_query = Some(deadline);
				touched.push(key);
			}
		}

		touched
	}

	/// Sweep every record with neither an active question nor flush
	/// protection, freeing them for reuse. Used when the free list runs
	/// dry and the platform's `GrowCache` either isn't available or still
	/// isn't enough (§3 "Lifetimes and ownership").
	pub fn sweep_reclaimable(&mut self) -> Vec<CacheKey> {
		let keys: Vec<CacheKey> = self.records.iter().filter(|(_, r)| r.active_question.is_none()).map(|(k, _)| k).collect();

		for &key in &keys {
			self.remove(key);
		}

		keys
	}
}

/// Next of the four refresh-query ticks at ~80/85/90/95% of TTL (§4.2),
/// with a small jitter to avoid synchronized refresh storms.
fn schedule_refresh(received: Tick, ttl: u32, queries_sent: u8) -> Tick {
	let fraction = 80 + queries_sent.min(3) as u64 * 5;
	let at = Duration::from_millis(ttl as u64 * 1000 * fraction / 100);
	received.saturating_add(at)
}

pub use wire::class::IN as DEFAULT_CLASS;

/// Sentinel RR type for a synthesized negative-cache entry (§4.3): never a
/// real wire code, never actually encoded onto the network.
pub const PACKET_NEGATIVE_TYPE: Type = Type::Other(0xFFFE);

pub fn synthesize_negative(name: Name, ttl: u32) -> RecordData {
	RecordData::new(name, DEFAULT_CLASS, ttl, RData::Raw { ty: PACKET_NEGATIVE_TYPE.code(), bytes: Vec::new() }, InterfaceSelector::Any)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::record::InterfaceSelector;

	fn record(name: &str, rdata: RData, ttl: u32) -> RecordData {
		RecordData::new(Name::parse(name).unwrap(), DEFAULT_CLASS, ttl, rdata, InterfaceSelector::Any)
	}

	#[test]
	fn insert_and_lookup_by_name() {
		let mut store = CacheStore::default();
		let data = record("foo.local.", RData::A([1, 2, 3, 4]), 120);
		let namehash = data.namehash;
		let name = data.name.clone();
		let key = store.insert(data, Tick(0));

		let found: Vec<_> = store.by_name(namehash, &name).collect();
		assert_eq!(found, vec![key]);
	}

	#[test]
	fn expire_evicts_past_grace_period() {
		let mut store = CacheStore::default();
		let data = record("foo.local.", RData::A([1, 2, 3, 4]), 1);
		store.insert(data, Tick(0));

		let (_, expired) = store.expire(Tick(1000));
		assert!(expired.is_empty(), "grace period (60s, no active question) not yet elapsed");

		let (_, expired) = store.expire(Tick(65_000));
		assert_eq!(expired.len(), 1);
		assert!(store.is_empty());
	}

	#[test]
	fn flush_rrset_reschedules_stale_conflicting_members() {
		let mut store = CacheStore::default();

		let first = record("_svc._tcp.local.", RData::Ptr(Name::parse("a._svc._tcp.local.").unwrap()), 4500);
		let second = record("_svc._tcp.local.", RData::Ptr(Name::parse("b._svc._tcp.local.").unwrap()), 4500);

		store.insert(first, Tick(0));
		let second_key = store.insert(second.clone(), Tick(0));

		let incoming = record("_svc._tcp.local.", RData::Ptr(Name::parse("a._svc._tcp.local.").unwrap()), 4500);
		let touched = store.flush_rrset(&incoming, Tick(10_000), 4500);

		assert_eq!(touched, vec![second_key]);
		let rescheduled = store.get(second_key).unwrap();
		assert_eq!(rescheduled.expires, Tick(10_000).saturating_add(Duration::from_secs(1)));
	}
}
