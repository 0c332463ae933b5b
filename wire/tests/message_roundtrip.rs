//! Black-box wire tests: build a message the way the engine would and
//! check what comes back out the other side of `decode`, rather than
//! poking at individual codec internals (covered by the unit tests next to
//! the code they exercise).

use mdns_wire::{Message, Name, OptOption, Opcode, Question, RData, Rcode, Record, Type, Writer};

fn service_announcement() -> Message {
	let mut writer = Writer::new(1500);

	let ptr_name = Name::parse("_http._tcp.local.").unwrap();
	let instance = ptr_name.prepend(b"My Web Server").unwrap();
	let host = Name::parse("myhost.local.").unwrap();

	writer.push_answer(Record { name: ptr_name, cache_flush: false, ttl: 4500, rdata: RData::Ptr(instance.clone()) });

	writer.push_answer(Record {
		name: instance.clone(),
		cache_flush: true,
		ttl: 120,
		rdata: RData::Srv { priority: 0, weight: 0, port: 80, target: host.clone() },
	});

	writer.push_answer(Record { name: instance, cache_flush: true, ttl: 4500, rdata: RData::Txt(vec![b"path=/".to_vec()]) });

	writer.push_additional(Record { name: host, cache_flush: true, ttl: 120, rdata: RData::A([192, 168, 1, 50]) });

	writer.finish()
}

#[test]
fn announcement_roundtrips_through_the_wire() {
	let message = service_announcement();
	let bytes = message.encode();

	let decoded = Message::decode(&bytes).unwrap();

	assert!(decoded.header.flags.is_response());
	assert_eq!(decoded.header.flags.opcode(), Opcode::Query);
	assert_eq!(decoded.header.flags.rcode(), Rcode::NoError);
	assert_eq!(decoded.answers.len(), 3);
	assert_eq!(decoded.additionals.len(), 1);

	let srv = decoded.answers.iter().find(|r| matches!(r.rdata, RData::Srv { .. })).unwrap();
	assert!(srv.cache_flush);

	let ptr = decoded.answers.iter().find(|r| matches!(r.rdata, RData::Ptr(_))).unwrap();
	assert!(!ptr.cache_flush);

	match &decoded.additionals[0].rdata {
		RData::A(addr) => assert_eq!(*addr, [192, 168, 1, 50]),
		other => panic!("expected A record, got {other:?}"),
	}
}

#[test]
fn query_with_qu_bit_roundtrips() {
	let mut writer = Writer::new(1500);
	let name = Name::parse("myhost.local.").unwrap();
	writer.push_question(Question { name, ty: Type::A, unicast_response: true });

	let bytes = writer.finish().encode();
	let decoded = Message::decode(&bytes).unwrap();

	assert_eq!(decoded.questions.len(), 1);
	assert!(decoded.questions[0].unicast_response);
	assert_eq!(decoded.questions[0].ty, Type::A);
}

#[test]
fn opt_record_with_owner_and_lease_survives_encoding() {
	let mut writer = Writer::new(1500);

	let opt = mdns_wire::rr::Opt { udp_payload_size: 1440, options: vec![OptOption::owner([0xAA; 6]), OptOption::lease(7200)] };
	let name = Name::root();

	writer.push_additional(Record { name, cache_flush: false, ttl: 0, rdata: RData::Opt(opt) });

	let bytes = writer.finish().encode();
	let decoded = Message::decode(&bytes).unwrap();

	match &decoded.additionals[0].rdata {
		RData::Opt(opt) => {
			assert_eq!(opt.udp_payload_size, 1440);
			assert_eq!(opt.options.len(), 2);
			assert_eq!(opt.options[0].code, OptOption::OWNER);
			assert_eq!(opt.options[1].code, OptOption::LEASE);
		}
		other => panic!("expected OPT, got {other:?}"),
	}
}

#[test]
fn truncated_buffer_is_rejected_cleanly() {
	let err = Message::decode(&[1, 2, 3]).unwrap_err();
	assert!(matches!(err, mdns_wire::DecodeError::Truncated(3)));
}
