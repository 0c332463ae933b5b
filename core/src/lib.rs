//! The packet-driven mDNS/DNS-SD responder core: a single-threaded FSM over
//! an authoritative record set, a passive cache, and a question list, driven
//! entirely by two entry points the platform calls — `execute` on a timer
//! and `receive` for each inbound packet (§4.7 "Top-level loop"). Nothing in
//! here touches a socket, a clock, or a random number generator directly;
//! those all come in through the [`Platform`] the caller supplies.

pub mod assembler;
pub mod auth;
pub mod cache;
pub mod dispatch;
pub mod error;
pub mod interface;
pub mod platform;
pub mod question;
pub mod record;
pub mod time;

use std::net::SocketAddr;
use std::time::Duration;

use log::trace;
use wire::{Message, Opcode};

pub use auth::{AnswerTo, AuthKey, RecordType};
pub use cache::CacheKey;
pub use error::{Error, Result};
pub use interface::{Capabilities, InterfaceInfo};
pub use platform::{Destination, MainEvent, Platform, RecordOutcome};
pub use question::{QuestionEvent, QuestionKey};
pub use record::{InterfaceId, InterfaceSelector, RecordData};
pub use time::Tick;

use auth::AuthStore;
use cache::CacheStore;
use dispatch::Lock;
use interface::InterfaceSet;
use question::QuestionList;

/// The maximum time `execute` is allowed to go unscheduled even with
/// nothing pending (§4.7): a cheap backstop so a platform bug in deadline
/// bookkeeping can't wedge the responder forever.
const IDLE_POLL_INTERVAL: Duration = Duration::from_secs(60);

pub struct Core {
	auth: AuthStore,
	cache: CacheStore,
	questions: QuestionList,
	interfaces: InterfaceSet,
	lock: Lock,
	next_message_id: u16,
	shutting_down: bool,
}

impl Default for Core {
	fn default() -> Self {
		Self { auth: AuthStore::default(), cache: CacheStore::default(), questions: QuestionList::default(), interfaces: InterfaceSet::default(), lock: Lock::default(), next_message_id: 1, shutting_down: false }
	}
}

impl Core {
	pub fn new() -> Self {
		Self::default()
	}

	fn next_id(&mut self) -> u16 {
		self.next_message_id = self.next_message_id.wrapping_add(1);
		self.next_message_id
	}

	// ---- Interface lifecycle (§6 "RegisterInterface"/"DeregisterInterface") ----

	/// An interface came up — for the first time, or after a flap. Any
	/// question reaching it gets its backoff reset and one more QU query
	/// (§4.3 scenario 6: interval reset + `RequestUnicast` on up), and
	/// cache records scoped to it are reconfirmed immediately.
	pub fn register_interface(&mut self, info: InterfaceInfo, now: Tick, platform: &mut impl Platform) {
		let _guard = self.lock.enter();
		let id = info.id;
		self.interfaces.register(info);

		for (_, question) in self.questions.iter_mut() {
			if question.active && question.interface.matches(id) {
				question.this_q_interval = Some(question::INITIAL_QUESTION_INTERVAL);
				question.last_q_time = None;
				question.qu_remaining = question.qu_remaining.max(1);
			}
		}

		self.reconfirm_interface(id, now, platform);
	}

	/// Interface went away: records and questions scoped to it are left in
	/// place (they simply stop being sendable) rather than torn down,
	/// matching the source's preference for reconfirmation over eager
	/// removal when a link flaps. Questions scoped to exactly this
	/// interface go inactive; anything broader (`Any`) just waits out the
	/// gap. Cache records on it are due for reconfirmation 5s from now in
	/// case it comes back (§4.3 scenario 6).
	pub fn deregister_interface(&mut self, id: InterfaceId, now: Tick) -> bool {
		let _guard = self.lock.enter();
		let went_down = self.interfaces.deregister(id);

		if went_down {
			for (_, question) in self.questions.iter_mut() {
				if question.interface == InterfaceSelector::Specific(id) {
					question.active = false;
				}
			}

			self.cache.reconfirm(Some(id), now.saturating_add(Duration::from_secs(5)));
		}

		went_down
	}

	/// §6 "Reconfirm a cache record"/`ReconfirmAntecedents`: query the
	/// network again right now instead of waiting for the passive refresh
	/// schedule, e.g. because the client got a failure using data this
	/// record provided (a dead connection to a stale SRV target).
	pub fn reconfirm_record(&mut self, key: CacheKey, now: Tick, platform: &mut impl Platform) -> Result<()> {
		let _guard = self.lock.enter();

		let record = self.cache.get_mut(key).ok_or(Error::BadReference)?;
		record.next_required_query = Some(now);
		let wire_question = wire::Question { name: record.data.name.clone(), ty: record.data.ty, unicast_response: false };

		let message = assembler::build_query(self.next_id(), vec![wire_question], Vec::new());
		self.broadcast(&message, platform);

		Ok(())
	}

	/// Reconfirm every cache record scoped to `id`: send one query per
	/// distinct (name, type) right away rather than waiting on each
	/// record's own refresh schedule.
	fn reconfirm_interface(&mut self, id: InterfaceId, now: Tick, platform: &mut impl Platform) {
		let keys = self.cache.reconfirm(Some(id), now);
		let mut asked: Vec<(wire::Name, wire::Type)> = Vec::new();

		for key in keys {
			let Some(record) = self.cache.get(key) else { continue };
			let pair = (record.data.name.clone(), record.data.ty);

			if !asked.contains(&pair) {
				asked.push(pair);
			}
		}

		for (name, ty) in asked {
			let wire_question = wire::Question { name, ty, unicast_response: false };
			let message = assembler::build_query(self.next_id(), vec![wire_question], Vec::new());
			platform.send(id, Destination::Multicast, &message);
		}
	}

	// ---- Record registration (§6 "Register a resource record") ----

	pub fn register_record(&mut self, data: RecordData, kind: RecordType, now: Tick, platform: &mut impl Platform) -> Result<AuthKey> {
		let _guard = self.lock.enter();

		if self.shutting_down {
			return Err(Error::ServiceNotRunning);
		}

		let key = self.auth.register(data, kind, now);

		if kind.probes() {
			self.auth.start_probe(key, now, platform.random(250));
		}

		Ok(key)
	}

	/// Register several records as one coherent service (§6 "Register a
	/// service"): they share an RRSet token so they never tie-break against
	/// each other and their cache-flush emission stays coherent.
	pub fn register_service(&mut self, members: Vec<(RecordData, RecordType)>, now: Tick, platform: &mut impl Platform) -> Result<Vec<AuthKey>> {
		let _guard = self.lock.enter();

		if self.shutting_down {
			return Err(Error::ServiceNotRunning);
		}

		let kinds: Vec<RecordType> = members.iter().map(|(_, k)| *k).collect();
		let tys: Vec<wire::Type> = members.iter().map(|(data, _)| data.ty).collect();
		let keys = self.auth.register_group(members, now);

		// §4.4 Pass 2 additionals: SRV carries its own A/AAAA, PTR carries
		// its own SRV/TXT, so a query for the PTR pulls the whole service
		// description in one round trip.
		let srv_key = keys.iter().copied().zip(&tys).find(|(_, ty)| **ty == wire::Type::Srv).map(|(k, _)| k);
		let txt_key = keys.iter().copied().zip(&tys).find(|(_, ty)| **ty == wire::Type::Txt).map(|(k, _)| k);
		let a_key = keys.iter().copied().zip(&tys).find(|(_, ty)| **ty == wire::Type::A).map(|(k, _)| k);
		let aaaa_key = keys.iter().copied().zip(&tys).find(|(_, ty)| **ty == wire::Type::Aaaa).map(|(k, _)| k);

		for (key, ty) in keys.iter().copied().zip(&tys) {
			let additional = match ty {
				wire::Type::Srv => [a_key, aaaa_key],
				wire::Type::Ptr => [srv_key, txt_key],
				_ => continue,
			};

			if let Some(record) = self.auth.get_mut(key) {
				record.additional = additional;
			}
		}

		for (key, kind) in keys.iter().copied().zip(kinds) {
			if kind.probes() {
				self.auth.start_probe(key, now, platform.random(250));
			}
		}

		Ok(keys)
	}

	/// §6 "Deregister a record"/"goodbye". Shared records that already
	/// announced must send a goodbye burst first; `deregister_record`
	/// returns immediately either way, `MemFree` fires from `execute` once
	/// the goodbye burst (if any) completes.
	pub fn deregister_record(&mut self, key: AuthKey, rapid: bool, platform: &mut impl Platform) -> Result<()> {
		let _guard = self.lock.enter();

		if self.auth.deregister(key, rapid) {
			platform.record_event(key, RecordOutcome::MemFree);
		}

		Ok(())
	}

	/// §6 "Update a record"'s rate limiting: the new rdata/ttl take effect
	/// immediately, but if the record's update-credit bucket is dry, the
	/// next announce after this one runs on a 4x-lengthened schedule rather
	/// than being dropped.
	pub fn update_record(&mut self, key: AuthKey, rdata: wire::RData, ttl: u32, now: Tick) -> Result<()> {
		let _guard = self.lock.enter();

		self.auth.spend_update_credit(key, now);

		let record = self.auth.get_mut(key).ok_or(Error::BadReference)?;
		record.data.ttl = ttl;
		record.data.rdata = rdata;
		record.announce_count = auth::INITIAL_ANNOUNCE_COUNT;
		record.this_ap_interval = auth::INITIAL_ANNOUNCE_INTERVAL;
		record.last_ap_time = now;

		Ok(())
	}

	pub fn auth_record(&self, key: AuthKey) -> Option<&auth::AuthRecord> {
		self.auth.get(key)
	}

	// ---- Question lifecycle (§6 "Start a question"/"Stop a question") ----

	pub fn start_question(&mut self, qname: wire::Name, qtype: wire::Type, interface: InterfaceSelector, qu_queries: u8) -> QuestionKey {
		let _guard = self.lock.enter();
		self.questions.start(qname, qtype, wire::class::IN, interface, qu_queries)
	}

	pub fn stop_question(&mut self, key: QuestionKey) {
		let _guard = self.lock.enter();
		self.questions.stop(key);
	}

	pub fn question(&self, key: QuestionKey) -> Option<&question::Question> {
		self.questions.get(key)
	}

	// ---- Shutdown (§9 "two-phase exit") ----

	/// Begin shutdown: stop accepting new registrations and start goodbye
	/// bursts for every record that needs one. `finalize_exit` reports once
	/// every burst has gone out.
	pub fn start_exit(&mut self, platform: &mut impl Platform) {
		let _guard = self.lock.enter();
		self.shutting_down = true;

		let keys: Vec<AuthKey> = self.auth.iter().map(|(k, _)| k).collect();

		for key in keys {
			self.auth.deregister(key, true);
		}

		let _ = platform;
	}

	/// Whether every goodbye burst has finished and storage can be torn
	/// down.
	pub fn finalize_exit(&self) -> bool {
		self.auth.iter().all(|(k, _)| self.auth.next_deadline(k).is_none())
	}

	// ---- Inbound packets (§4.6 "Receive path") ----

	pub fn receive(&mut self, now: Tick, interface: InterfaceId, src: SocketAddr, buf: &[u8], platform: &mut impl Platform) {
		let _guard = self.lock.enter();

		let Ok(message) = Message::decode(buf) else { return };

		// RFC 6762 §18.3: any opcode other than a standard query is
		// silently ignored, not rejected.
		if message.header.flags.opcode() != Opcode::Query {
			return;
		}

		if message.header.flags.is_response() {
			self.handle_response(now, interface, &message, platform);
		} else {
			self.handle_query(now, interface, src, &message, platform);
		}
	}

	fn handle_response(&mut self, now: Tick, interface: InterfaceId, message: &Message, platform: &mut impl Platform) {
		for record in &message.answers {
			self.process_incoming_record(now, interface, record, platform);
		}
	}

	fn process_incoming_record(&mut self, now: Tick, interface: InterfaceId, record: &wire::Record, platform: &mut impl Platform) {
		let data = RecordData::new(record.name.clone(), wire::class::IN, record.ttl, record.rdata.clone(), InterfaceSelector::Specific(interface));

		// §4.1 "conflict resolution on inbound response": anything claiming
		// the same identity as one of our own Verified/KnownUnique records,
		// with different data, is a conflict — unless it's actually just
		// another member of our own RRSet/DependentOn group that happens to
		// be reflected back at us (`shielded_from`), in which case it's not
		// a conflict at all.
		let conflicting: Vec<AuthKey> = self
			.auth
			.iter()
			.filter(|(key, r)| {
				r.data.same_identity(&data)
					&& !r.data.identical(&data)
					&& !self.auth.iter().any(|(other_key, other)| other_key != *key && other.data.identical(&data) && r.shielded_from(other, *key, other_key))
			})
			.map(|(k, _)| k)
			.collect();

		for key in conflicting {
			if let Some(outcome) = self.auth.on_conflict(key, now) {
				platform.record_event(key, outcome);
			}
		}

		if record.ttl == 0 {
			trace!("goodbye for {:?}", record.name);

			for cache_key in self.cache.by_name(data.namehash, &data.name).collect::<Vec<_>>() {
				if let Some(cached) = self.cache.get_mut(cache_key) {
					if cached.data.identical(&data) {
						cached.rroriginalttl = 0;
						cached.expires = now;
					}
				}
			}

			return;
		}

		if record.cache_flush {
			self.cache.flush_rrset(&data, now, record.ttl);
		}

		if !self.cache.should_grow(self.questions.iter().count()) {
			self.cache.sweep_reclaimable();
			platform.main_event(MainEvent::GrowCache);
		}

		let namehash = data.namehash;
		let name = data.name.clone();
		let cache_key = self.cache.insert(data, now);

		for (question_key, question) in self.questions.iter() {
			if question.qnamehash == namehash && question.qname == name && (question.qtype == wire::Type::Any || question.qtype == record.rdata.ty()) {
				platform.question_event(question_key, record, QuestionEvent::Add);

				if let Some(cached) = self.cache.get_mut(cache_key) {
					cached.active_question = Some(question_key);
					cached.delivered = true;
				}
			}
		}

		// §4.3 CNAME chase: a question asking directly for this name (not
		// itself a CNAME/ANY lookup) follows the referral to its target
		// rather than sitting there never getting an answer.
		if let wire::RData::Cname(target) = &record.rdata {
			let chasing: Vec<QuestionKey> = self
				.questions
				.iter()
				.filter(|(_, q)| q.qnamehash == namehash && q.qname == name && q.qtype != wire::Type::Cname && q.qtype != wire::Type::Any)
				.map(|(k, _)| k)
				.collect();

			for question_key in chasing {
				self.questions.chase_cname(question_key, target.clone(), now);
			}
		}
	}

	/// RFC 6762 §8.2 simultaneous probe tie-breaking: an inbound probe
	/// carries its own proposed records in the authority section. If one
	/// names the same identity as a record we're currently probing for but
	/// with different data, compare lexicographically and, if we lose,
	/// restart our own probing (or give up if restarts are exhausted).
	fn check_probe_tie_break(&mut self, now: Tick, interface: InterfaceId, message: &Message, platform: &mut impl Platform) {
		for authority in &message.authorities {
			let theirs = RecordData::new(authority.name.clone(), wire::class::IN, authority.ttl, authority.rdata.clone(), InterfaceSelector::Specific(interface));

			let probing: Vec<AuthKey> = self.auth.iter().filter(|(_, r)| r.is_probing() && r.data.same_identity(&theirs) && !r.data.identical(&theirs)).map(|(k, _)| k).collect();

			for key in probing {
				let Some(record) = self.auth.get(key) else { continue };

				if auth::tie_break(&record.data, &theirs) == auth::TieBreak::WeLose && !self.auth.lose_tie_break(key, now) {
					self.auth.remove(key);
					platform.record_event(key, RecordOutcome::NameConflict);
				}
			}
		}
	}

	fn handle_query(&mut self, now: Tick, interface: InterfaceId, src: SocketAddr, message: &Message, platform: &mut impl Platform) {
		self.check_probe_tie_break(now, interface, message, platform);

		let is_ipv6 = src.is_ipv6();

		for question in &message.questions {
			let answer_to = if question.unicast_response { AnswerTo::Unicast(src) } else { AnswerTo::Multicast };

			let qnamehash = question.name.hash();
			let asking: Vec<QuestionKey> = self
				.questions
				.iter()
				.filter(|(_, q)| q.qnamehash == qnamehash && q.qname == question.name && (q.qtype == question.ty || question.ty == wire::Type::Any))
				.map(|(k, _)| k)
				.collect();

			for key in asking {
				if let Some(q) = self.questions.get_mut(key) {
					q.record_dup_sighting(question::DupSighting { interface, is_ipv6, at: now });
				}
			}

			let matches: Vec<AuthKey> = self
				.auth
				.iter()
				.filter(|(_, r)| r.kind.answers_queries() && r.data.name == question.name && (question.ty == wire::Type::Any || r.data.ty == question.ty) && r.data.interface.matches(interface))
				.map(|(k, _)| k)
				.collect();

			for key in matches {
				let Some(record) = self.auth.get(key) else { continue };

				// RFC 6762 §7.1 known-answer suppression: skip if the
				// querier already holds this exact answer with at least
				// half its original TTL remaining.
				let suppressed = message.answers.iter().any(|known| known.name == question.name && known.rdata == record.data.rdata && known.ttl * 2 >= record.data.ttl);

				if suppressed {
					trace!("suppressing answer for {:?}: querier already knows it", question.name);
					continue;
				}

				if let Some(record) = self.auth.get_mut(key) {
					record.answer_to = answer_to;
					record.immed_answer = InterfaceSelector::Specific(interface);
				}
			}
		}
	}

	// ---- Scheduler tick (§4.7 "Top-level loop") ----

	/// Run one scheduling pass: send any probes/announcements/responses/
	/// queries that are due, evict expired cache entries, and report the
	/// tick at which `execute` should next be called.
	pub fn execute(&mut self, now: Tick, platform: &mut impl Platform) -> Tick {
		let _guard = self.lock.enter();

		let auth_next = self.run_auth_schedule(now, platform);
		let (cache_next, expired) = self.cache.expire(now);

		for record in &expired {
			if let Some(question_key) = record.active_question {
				let wire_record = wire::Record { name: record.data.name.clone(), cache_flush: false, ttl: 0, rdata: record.data.rdata.clone() };
				platform.question_event(question_key, &wire_record, QuestionEvent::Remove);
			}
		}

		let question_next = self.run_question_schedule(now, platform);

		time::earliest([auth_next, cache_next, question_next]).unwrap_or_else(|| now.saturating_add(IDLE_POLL_INTERVAL))
	}

	fn run_auth_schedule(&mut self, now: Tick, platform: &mut impl Platform) -> Option<Tick> {
		let due: Vec<AuthKey> = self.auth.iter().filter(|(k, _)| self.auth.next_deadline(*k).is_some_and(|d| now.at_or_after(d))).map(|(k, _)| k).collect();

		let mut probing = Vec::new();
		let mut responding = Vec::new();

		for key in due {
			match self.auth.tick(key, now) {
				Some(true) => probing.push(key),
				Some(false) => responding.push(key),
				None => {}
			}
		}

		if !probing.is_empty() {
			let data: Vec<RecordData> = probing.iter().filter_map(|&k| self.auth.get(k).map(|r| r.data.clone())).collect();
			let refs: Vec<&RecordData> = data.iter().collect();
			let message = assembler::build_probe(self.next_id(), &refs);
			self.broadcast(&message, platform);
		}

		if !responding.is_empty() {
			let triples: Vec<(AnswerTo, &auth::AuthRecord, Vec<&auth::AuthRecord>)> = responding
				.iter()
				.filter_map(|&k| {
					let record = self.auth.get(k)?;
					let additional = record.additional.iter().copied().flatten().filter_map(|ak| self.auth.get(ak)).collect();
					Some((AnswerTo::Multicast, record, additional))
				})
				.collect();

			for (dest, message) in assembler::build_response(triples) {
				self.send_to(dest, &message, platform);
			}
		}

		// A goodbye burst just sent its last announcement: the record's job
		// is done, free it and let the client know.
		for key in responding {
			let finished = self.auth.get(key).is_some_and(|r| r.kind == RecordType::Deregistering && r.announce_count == 0);

			if finished {
				self.auth.remove(key);
				platform.record_event(key, RecordOutcome::MemFree);
			}
		}

		self.auth.iter().filter_map(|(k, _)| self.auth.next_deadline(k)).min()
	}

	fn run_question_schedule(&mut self, now: Tick, platform: &mut impl Platform) -> Option<Tick> {
		let due: Vec<QuestionKey> = self
			.questions
			.iter()
			.filter(|(_, q)| {
				let Some(interval) = q.this_q_interval else { return false };
				q.active && q.last_q_time.is_none_or(|last| now.duration_since(last) >= interval)
			})
			.map(|(k, _)| k)
			.collect();

		for key in &due {
			let Some(question) = self.questions.get(*key) else { continue };
			let qname = question.qname.clone();
			let qnamehash = question.qnamehash;
			let qtype = question.qtype;
			let this_q_interval = question.this_q_interval;
			let wants_unicast = question.wants_unicast_response();

			// §4.3 interface-unusable suppression: an AAAA question when no
			// interface does IPv6 (or an A question when none does IPv4)
			// will never get an answer, so stop asking instead of spinning.
			let unusable = match qtype {
				wire::Type::Aaaa => !self.interfaces.any_supports(true),
				wire::Type::A => !self.interfaces.any_supports(false),
				_ => false,
			};

			if unusable {
				let placeholder = wire::Record { name: qname.clone(), cache_flush: false, ttl: 0, rdata: wire::RData::Raw { ty: qtype.code(), bytes: Vec::new() } };
				platform.question_event(*key, &placeholder, QuestionEvent::Suppressed);

				if let Some(q) = self.questions.get_mut(*key) {
					q.active = false;
				}

				continue;
			}

			// RFC 6762 §7.3: if another host on this link already asked the
			// same question recently, piggyback on their query instead of
			// sending a redundant copy of our own.
			let suppressed = self.interfaces.iter().any(|info| {
				let Some(question) = self.questions.get(*key) else { return false };
				question.recently_seen_duplicate(info.id, false, now, question::DUP_SUPPRESS_WINDOW) || question.recently_seen_duplicate(info.id, true, now, question::DUP_SUPPRESS_WINDOW)
			});

			if suppressed {
				let placeholder = wire::Record { name: qname.clone(), cache_flush: false, ttl: 0, rdata: wire::RData::Raw { ty: qtype.code(), bytes: Vec::new() } };
				platform.question_event(*key, &placeholder, QuestionEvent::Suppressed);

				if let Some(q) = self.questions.get_mut(*key) {
					q.last_q_time = Some(now);
				}

				continue;
			}

			let cache_keys: Vec<CacheKey> = self.cache.by_name(qnamehash, &qname).collect();

			let known_answers: Vec<wire::Record> = cache_keys
				.iter()
				.filter_map(|&ck| self.cache.get(ck))
				.filter(|r| !r.is_goodbye())
				.map(|r| wire::Record { name: r.data.name.clone(), cache_flush: false, ttl: r.expires.duration_since(now).as_secs() as u32, rdata: r.data.rdata.clone() })
				.collect();

			// §4.3 negative caching: the final query in the backoff series
			// going out with nothing already cached means this name/type
			// doesn't exist; synthesize a negative entry so repeated
			// lookups don't keep re-querying the network.
			if known_answers.is_empty() && this_q_interval == Some(question::MAX_QUESTION_INTERVAL) {
				let ttl = self.questions.next_negative_ttl(*key, None, false);
				let negative = cache::synthesize_negative(qname.clone(), ttl);
				let placeholder = wire::Record { name: negative.name.clone(), cache_flush: false, ttl, rdata: negative.rdata.clone() };
				self.cache.insert(negative, now);
				platform.question_event(*key, &placeholder, QuestionEvent::NoCache);
			}

			for &ck in &cache_keys {
				if let Some(cached) = self.cache.get_mut(ck) {
					cached.unanswered_queries = cached.unanswered_queries.saturating_add(1);
					cached.last_unanswered_time = Some(now);
				}
			}

			let wire_question = wire::Question { name: qname, ty: qtype, unicast_response: wants_unicast };
			let message = assembler::build_query(self.next_id(), vec![wire_question], known_answers);
			self.broadcast(&message, platform);

			self.questions.get_mut(*key).unwrap().last_q_time = Some(now);
			self.questions.advance_interval(*key, now, Duration::from_millis(platform.random(100) as u64));
		}

		self.questions
			.iter()
			.filter(|(_, q)| q.active)
			.filter_map(|(_, q)| q.this_q_interval.map(|interval| q.last_q_time.unwrap_or(now) + interval))
			.min()
	}

	fn broadcast(&self, message: &Message, platform: &mut impl Platform) {
		for info in self.interfaces.iter() {
			platform.send(info.id, Destination::Multicast, message);
		}
	}

	fn send_to(&self, dest: AnswerTo, message: &Message, platform: &mut impl Platform) {
		let destination = match dest {
			AnswerTo::Multicast => Destination::Multicast,
			AnswerTo::Unicast(addr) | AnswerTo::Legacy(addr) => Destination::Unicast(addr),
			AnswerTo::None => return,
		};

		for info in self.interfaces.iter() {
			platform.send(info.id, destination, message);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	struct TestPlatform {
		sent: Vec<(InterfaceId, Destination)>,
		events: Vec<(AuthKey, RecordOutcome)>,
	}

	impl Platform for TestPlatform {
		fn send(&mut self, interface: InterfaceId, dest: Destination, _message: &Message) {
			self.sent.push((interface, dest));
		}

		fn random(&mut self, _bound: u32) -> u32 {
			0
		}

		fn record_event(&mut self, key: AuthKey, outcome: RecordOutcome) {
			self.events.push((key, outcome));
		}

		fn question_event(&mut self, _key: QuestionKey, _record: &wire::Record, _event: QuestionEvent) {}
	}

	#[test]
	fn registering_a_unique_record_starts_probing_on_next_execute() {
		let mut core = Core::new();
		let mut platform = TestPlatform { sent: Vec::new(), events: Vec::new() };
		core.register_interface(InterfaceInfo { id: 1, mac: [0; 6], capabilities: Capabilities { ipv4: true, ipv6: false }, first_representative: true }, Tick(0), &mut platform);

		let data = RecordData::new(wire::Name::parse("foo.local.").unwrap(), wire::class::IN, 120, wire::RData::A([10, 0, 0, 1]), InterfaceSelector::Any);
		let key = core.register_record(data, RecordType::Unique, Tick(0), &mut platform).unwrap();

		let next = core.execute(Tick(0).saturating_add(Duration::from_secs(1)), &mut platform);
		assert!(!platform.sent.is_empty(), "expected at least one probe to go out");
		assert!(next > Tick(0));
		assert!(core.auth_record(key).is_some());
	}

	#[test]
	fn shared_record_requires_goodbye_before_finalize() {
		let mut core = Core::new();
		let mut platform = TestPlatform { sent: Vec::new(), events: Vec::new() };
		let data = RecordData::new(wire::Name::parse("_svc._tcp.local.").unwrap(), wire::class::IN, 4500, wire::RData::Ptr(wire::Name::parse("a._svc._tcp.local.").unwrap()), InterfaceSelector::Any);
		let key = core.register_record(data, RecordType::Shared, Tick(0), &mut platform).unwrap();

		core.auth.get_mut(key).unwrap().last_ap_time = Tick(1000);
		core.start_exit(&mut platform);

		assert!(!core.finalize_exit());
	}

	#[test]
	fn goodbye_burst_frees_the_record_and_unblocks_finalize() {
		let mut core = Core::new();
		let mut platform = TestPlatform { sent: Vec::new(), events: Vec::new() };
		let data = RecordData::new(wire::Name::parse("_svc._tcp.local.").unwrap(), wire::class::IN, 4500, wire::RData::Ptr(wire::Name::parse("a._svc._tcp.local.").unwrap()), InterfaceSelector::Any);
		let key = core.register_record(data, RecordType::Shared, Tick(0), &mut platform).unwrap();

		core.auth.get_mut(key).unwrap().last_ap_time = Tick(1000);
		core.start_exit(&mut platform);
		assert!(!core.finalize_exit());

		core.execute(Tick(0), &mut platform);

		assert!(core.auth_record(key).is_none());
		assert_eq!(platform.events, vec![(key, RecordOutcome::MemFree)]);
		assert!(core.finalize_exit());
	}
}
