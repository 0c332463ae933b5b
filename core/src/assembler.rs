//! Packet assembly (§4.4 "Response assembler", §4.5 "Query assembler &
//! probe batching"). Pure functions from already-decided state (which
//! records need an answer, which questions need asking) to `wire::Message`s
//! bounded by link MTU; no scheduling or socket I/O lives here.

use std::collections::HashMap;

use wire::{Name, Opcode, Question as WireQuestion, RData, Record as WireRecord, Type, Writer};

use crate::auth::{AnswerTo, AuthRecord, RecordType};
use crate::record::RecordData;

/// RFC 6762 §17's conservative default: a multicast response should fit in
/// one packet on a standard Ethernet path without fragmenting.
pub const NORMAL_MAX_MSG_DATA: usize = 1440;

fn record_to_wire(data: &RecordData, cache_flush: bool) -> WireRecord {
	WireRecord { name: data.name.clone(), cache_flush, ttl: data.ttl, rdata: data.rdata.clone() }
}

/// Whether `kind` paints the cache-flush bit on its answers (§4.1: never
/// while still probing, never for a record that's explicitly `Shared`).
fn cache_flush_bit(kind: RecordType) -> bool {
	!matches!(kind, RecordType::Shared | RecordType::Advisory | RecordType::Unique)
}

/// §4.4 Pass 1/Pass 2: one response packet per destination, answering
/// every record handed in (already filtered to what's due by the
/// caller), an NSEC for any record whose `send_nsec_now` flag is set
/// (RFC 6762 §6.1, asserting no other types exist for that name), and
/// each record's resolved additionals (SRV's A/AAAA, PTR's SRV/TXT).
/// Records bound for the same `AnswerTo` share a packet; destinations
/// that ended up empty (everything overflowed the MTU into a later
/// pass) are dropped.
pub fn build_response<'a>(records: impl IntoIterator<Item = (AnswerTo, &'a AuthRecord, Vec<&'a AuthRecord>)>) -> Vec<(AnswerTo, wire::Message)> {
	let records: Vec<(AnswerTo, &'a AuthRecord, Vec<&'a AuthRecord>)> = records.into_iter().collect();

	// NSEC needs "every type this name has", which may span several
	// records being answered together in this same pass (e.g. an A and a
	// TXT due at once).
	let mut types_by_name: HashMap<Name, Vec<Type>> = HashMap::new();

	for (_, record, _) in &records {
		let types = types_by_name.entry(record.data.name.clone()).or_default();

		if !types.contains(&record.data.ty) {
			types.push(record.data.ty);
		}
	}

	let mut by_dest: Vec<(AnswerTo, Writer)> = Vec::new();

	for (dest, record, additional) in &records {
		let idx = by_dest.iter().position(|(d, _)| dest_eq(*d, *dest)).unwrap_or_else(|| {
			by_dest.push((*dest, Writer::new(NORMAL_MAX_MSG_DATA)));
			by_dest.len() - 1
		});

		let wire_record = record_to_wire(&record.data, cache_flush_bit(record.kind));
		let (_, writer) = &mut by_dest[idx];

		if !writer.push_answer(wire_record) {
			writer.set_truncated(true);
		}

		if record.send_nsec_now {
			let types = types_by_name.get(&record.data.name).cloned().unwrap_or_default();
			let nsec = WireRecord { name: record.data.name.clone(), cache_flush: cache_flush_bit(record.kind), ttl: record.data.ttl, rdata: RData::Nsec { next: record.data.name.clone(), types } };
			writer.push_additional(nsec);
		}

		for extra in additional {
			let wire_extra = record_to_wire(&extra.data, cache_flush_bit(extra.kind));
			writer.push_additional(wire_extra);
		}
	}

	by_dest
		.into_iter()
		.filter_map(|(dest, writer)| {
			if writer.is_empty() {
				None
			} else {
				let mut message = writer.finish();
				message.header.flags.set_authoritative(true);
				Some((dest, message))
			}
		})
		.collect()
}

fn dest_eq(a: AnswerTo, b: AnswerTo) -> bool {
	matches!((a, b), (AnswerTo::None, AnswerTo::None) | (AnswerTo::Multicast, AnswerTo::Multicast))
		|| matches!((a, b), (AnswerTo::Unicast(x), AnswerTo::Unicast(y)) | (AnswerTo::Legacy(x), AnswerTo::Legacy(y)) if x == y)
}

/// §4.5 probe packet: an ANY question per probed name plus the proposed
/// rrset in the authority section, so a listener performing the same
/// probe can tie-break against us (RFC 6762 §8.2).
pub fn build_probe(id: u16, probing: &[&RecordData]) -> wire::Message {
	let mut writer = Writer::new(NORMAL_MAX_MSG_DATA);

	let mut seen_names = Vec::new();

	for data in probing {
		if !seen_names.contains(&&data.name) {
			seen_names.push(&data.name);
			writer.push_question(WireQuestion { name: data.name.clone(), ty: wire::Type::Any, unicast_response: false });
		}
	}

	for data in probing {
		writer.push_authority(record_to_wire(data, false));
	}

	let mut message = writer.finish();
	message.header.id = id;
	message.header.flags.set_opcode(Opcode::Query);
	message.header.flags.set_response(false);
	message
}

/// §4.5 outgoing query: the pending questions plus every known answer the
/// cache holds for them, so a peer with nothing new to add can stay
/// silent (RFC 6762 §7.1 known-answer suppression).
pub fn build_query(id: u16, questions: Vec<WireQuestion>, known_answers: Vec<WireRecord>) -> wire::Message {
	let mut writer = Writer::new(NORMAL_MAX_MSG_DATA);

	for q in questions {
		writer.push_question(q);
	}

	for answer in known_answers {
		if !writer.push_answer(answer) {
			// Known answers didn't all fit alongside the question: mark the
			// packet truncated rather than risk a querier thinking we hold
			// fewer answers than we do and re-asking needlessly.
			writer.set_truncated(true);
			break;
		}
	}

	let mut message = writer.finish();
	message.header.id = id;
	message.header.flags.set_response(false);
	message
}

#[cfg(test)]
mod tests {
	use wire::{Name, RData, Type};

	use super::*;
	use crate::record::InterfaceSelector;

	#[test]
	fn response_groups_by_destination_and_sets_authoritative() {
		use crate::time::Tick;

		let data = RecordData::new(Name::parse("svc.local.").unwrap(), wire::class::IN, 120, RData::A([10, 0, 0, 1]), InterfaceSelector::Any);
		let mut store = crate::auth::AuthStore::default();
		let key = store.register(data, RecordType::Verified, Tick(0));

		let responses = build_response([(AnswerTo::Multicast, store.get(key).unwrap(), Vec::new())]);

		assert_eq!(responses.len(), 1);
		assert!(responses[0].1.header.flags.authoritative());
		assert_eq!(responses[0].1.answers.len(), 1);
		assert!(responses[0].1.answers[0].cache_flush);
	}

	#[test]
	fn response_emits_nsec_and_additionals_when_flagged() {
		use crate::time::Tick;

		let srv_data = RecordData::new(Name::parse("host._svc._tcp.local.").unwrap(), wire::class::IN, 120, RData::Srv { priority: 0, weight: 0, port: 8080, target: Name::parse("host.local.").unwrap() }, InterfaceSelector::Any);
		let a_data = RecordData::new(Name::parse("host.local.").unwrap(), wire::class::IN, 120, RData::A([10, 0, 0, 1]), InterfaceSelector::Any);

		let mut store = crate::auth::AuthStore::default();
		let srv_key = store.register(srv_data, RecordType::Verified, Tick(0));
		let a_key = store.register(a_data, RecordType::Verified, Tick(0));

		store.get_mut(srv_key).unwrap().send_nsec_now = true;

		let a_record = store.get(a_key).unwrap();
		let responses = build_response([(AnswerTo::Multicast, store.get(srv_key).unwrap(), vec![a_record])]);

		assert_eq!(responses.len(), 1);
		let message = &responses[0].1;
		assert_eq!(message.answers.len(), 1);
		assert_eq!(message.additionals.len(), 2);
		assert!(message.additionals.iter().any(|r| matches!(r.rdata, RData::Nsec { .. })));
		assert!(message.additionals.iter().any(|r| r.rdata == RData::A([10, 0, 0, 1])));
	}

	#[test]
	fn probe_packet_carries_any_question_and_authority() {
		let data = RecordData::new(Name::parse("probed.local.").unwrap(), wire::class::IN, 120, RData::A([10, 0, 0, 2]), InterfaceSelector::Any);
		let message = build_probe(42, &[&data]);

		assert_eq!(message.header.id, 42);
		assert_eq!(message.questions.len(), 1);
		assert_eq!(message.questions[0].ty, Type::Any);
		assert_eq!(message.authorities.len(), 1);
	}

	#[test]
	fn query_packet_includes_known_answers_until_budget_runs_out() {
		let question = WireQuestion { name: Name::parse("_svc._tcp.local.").unwrap(), ty: Type::Ptr, unicast_response: true };
		let known = WireRecord { name: Name::parse("_svc._tcp.local.").unwrap(), cache_flush: false, ttl: 4500, rdata: RData::Ptr(Name::parse("a._svc._tcp.local.").unwrap()) };

		let message = build_query(7, vec![question], vec![known]);

		assert_eq!(message.header.id, 7);
		assert_eq!(message.questions.len(), 1);
		assert_eq!(message.answers.len(), 1);
		assert!(!message.header.flags.is_response());
	}
}
