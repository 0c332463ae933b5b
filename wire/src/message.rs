use std::collections::HashMap;

use crate::class;
use crate::error::{DecodeError, DecodeResult};
use crate::header::{self, Header};
use crate::name::Name;
use crate::rr::{RData, Type};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Question {
	pub name: Name,
	pub ty: Type,
	/// QU (unicast-response requested) vs QM, carried in the class top bit.
	pub unicast_response: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
	pub name: Name,
	/// Cache-flush bit in a response, meaningless (and always false) in the
	/// question/authority sections of a probe.
	pub cache_flush: bool,
	pub ttl: u32,
	pub rdata: RData,
}

#[derive(Clone, Debug, Default)]
pub struct Message {
	pub header: Header,
	pub questions: Vec<Question>,
	pub answers: Vec<Record>,
	pub authorities: Vec<Record>,
	pub additionals: Vec<Record>,
}

impl Message {
	pub fn decode(buf: &[u8]) -> DecodeResult<Self> {
		Self::decode_inner(buf).inspect_err(|err| log::trace!("dropping malformed packet ({} bytes): {err}", buf.len()))
	}

	fn decode_inner(buf: &[u8]) -> DecodeResult<Self> {
		let header = Header::decode(buf)?;
		let mut pos = header::SIZE;

		let mut questions = Vec::with_capacity(header.qdcount as usize);

		for _ in 0..header.qdcount {
			let name = Name::decode(buf, &mut pos)?;
			let (ty, class_word) = decode_type_class(buf, &mut pos)?;
			let (_, unicast_response) = class::split(class_word);
			questions.push(Question { name, ty, unicast_response });
		}

		let mut decode_records = |count: u16, pos: &mut usize| -> DecodeResult<Vec<Record>> {
			let mut records = Vec::with_capacity(count as usize);

			for _ in 0..count {
				let name = Name::decode(buf, pos)?;
				let (ty, class_word) = decode_type_class(buf, pos)?;
				let (_, cache_flush) = class::split(class_word);

				if buf.len() - *pos < 6 {
					return Err(DecodeError::UnexpectedEnd("record ttl/rdlength"));
				}

				let ttl = u32::from_be_bytes(buf[*pos..*pos + 4].try_into().unwrap());
				*pos += 4;
				let rdlength = u16::from_be_bytes([buf[*pos], buf[*pos + 1]]) as usize;
				*pos += 2;

				let mut rdata = RData::decode(ty, buf, pos, rdlength)?;

				// The OPT record's class field is repurposed as the
				// requestor's UDP payload size (RFC 6891 §6.1.2), not a
				// cache-flush flag; thread it through for the one RData
				// variant that cares.
				if let RData::Opt(opt) = &mut rdata {
					opt.udp_payload_size = class_word;
				}

				records.push(Record { name, cache_flush, ttl, rdata });
			}

			Ok(records)
		};

		let answers = decode_records(header.ancount, &mut pos)?;
		let authorities = decode_records(header.nscount, &mut pos)?;
		let additionals = decode_records(header.arcount, &mut pos)?;

		Ok(Self { header, questions, answers, authorities, additionals })
	}

	pub fn encode(&self) -> Vec<u8> {
		let mut out = Vec::new();
		let mut header = self.header;
		header.qdcount = self.questions.len() as u16;
		header.ancount = self.answers.len() as u16;
		header.nscount = self.authorities.len() as u16;
		header.arcount = self.additionals.len() as u16;
		header.encode(&mut out);

		let mut table = HashMap::new();

		for question in &self.questions {
			question.name.encode(&mut out, &mut table);
			out.extend_from_slice(&question.ty.code().to_be_bytes());
			out.extend_from_slice(&class::compose(class::IN, question.unicast_response).to_be_bytes());
		}

		for records in [&self.answers, &self.authorities, &self.additionals] {
			for record in *records {
				encode_record(&mut out, record, &mut table);
			}
		}

		out
	}
}

fn encode_record(out: &mut Vec<u8>, record: &Record, table: &mut HashMap<Vec<Box<[u8]>>, u16>) {
	record.name.encode(out, table);
	out.extend_from_slice(&record.rdata.ty().code().to_be_bytes());

	let class_word = if let RData::Opt(opt) = &record.rdata { opt.udp_payload_size } else { class::compose(class::IN, record.cache_flush) };

	out.extend_from_slice(&class_word.to_be_bytes());
	out.extend_from_slice(&record.ttl.to_be_bytes());

	let rdlength_pos = out.len();
	out.extend_from_slice(&[0, 0]);

	let rdata_start = out.len();
	record.rdata.encode(out, table);
	let rdlength = (out.len() - rdata_start) as u16;
	out[rdlength_pos..rdlength_pos + 2].copy_from_slice(&rdlength.to_be_bytes());
}

fn decode_type_class(buf: &[u8], pos: &mut usize) -> DecodeResult<(Type, u16)> {
	if buf.len() - *pos < 4 {
		return Err(DecodeError::UnexpectedEnd("type/class"));
	}

	let ty = Type::from_code(u16::from_be_bytes([buf[*pos], buf[*pos + 1]]));
	let class = u16::from_be_bytes([buf[*pos + 2], buf[*pos + 3]]);
	*pos += 4;

	Ok((ty, class))
}

/// Accumulates records into a packet while tracking the running wire size,
/// so the response assembler can stop adding records before exceeding the
/// link MTU and instead start a follow-up packet (RFC 6762 §17).
pub struct Writer {
	budget: usize,
	message: Message,
	table: HashMap<Vec<Box<[u8]>>, u16>,
	used: usize,
}

impl Writer {
	pub fn new(mtu: usize) -> Self {
		let mut writer = Self { budget: mtu, message: Message::default(), table: HashMap::new(), used: header::SIZE };
		writer.message.header.flags.set_response(true);
		writer
	}

	fn try_push<F: FnOnce(&mut Message)>(&mut self, estimate: usize, push: F) -> bool {
		if self.used + estimate > self.budget {
			return false;
		}

		let before = self.used;
		push(&mut self.message);
		// Re-encode is wasteful but simple and correct; the assembler only
		// calls this a handful of times per packet.
		let mut probe = Vec::new();
		let mut table = self.table.clone();
		encode_questions(&mut probe, &self.message.questions, &mut table);
		let questions_len = probe.len();
		probe.clear();

		for records in [&self.message.answers, &self.message.authorities, &self.message.additionals] {
			for record in records {
				encode_record(&mut probe, record, &mut table);
			}
		}

		self.used = header::SIZE + questions_len + probe.len();

		if self.used > self.budget {
			self.used = before;
			return false;
		}

		self.table = table;
		true
	}

	pub fn push_question(&mut self, question: Question) -> bool {
		let estimate = question.name.labels().iter().map(|l| l.len() + 1).sum::<usize>() + 5;
		self.try_push(estimate, |m| m.questions.push(question))
	}

	pub fn push_answer(&mut self, record: Record) -> bool {
		let estimate = estimate_record(&record);
		self.try_push(estimate, |m| m.answers.push(record))
	}

	pub fn push_authority(&mut self, record: Record) -> bool {
		let estimate = estimate_record(&record);
		self.try_push(estimate, |m| m.authorities.push(record))
	}

	pub fn push_additional(&mut self, record: Record) -> bool {
		let estimate = estimate_record(&record);
		self.try_push(estimate, |m| m.additionals.push(record))
	}

	pub fn set_truncated(&mut self, truncated: bool) {
		self.message.header.flags.set_truncated(truncated);
	}

	pub fn is_empty(&self) -> bool {
		self.message.questions.is_empty() && self.message.answers.is_empty() && self.message.authorities.is_empty() && self.message.additionals.is_empty()
	}

	pub fn finish(self) -> Message {
		self.message
	}
}

fn encode_questions(out: &mut Vec<u8>, questions: &[Question], table: &mut HashMap<Vec<Box<[u8]>>, u16>) {
	for question in questions {
		question.name.encode(out, table);
		out.extend_from_slice(&question.ty.code().to_be_bytes());
		out.extend_from_slice(&class::compose(class::IN, question.unicast_response).to_be_bytes());
	}
}

fn estimate_record(record: &Record) -> usize {
	record.name.labels().iter().map(|l| l.len() + 1).sum::<usize>() + 1 + 10 + estimate_rdata(&record.rdata)
}

fn estimate_rdata(rdata: &RData) -> usize {
	match rdata {
		RData::A(_) => 4,
		RData::Aaaa(_) => 16,
		RData::Cname(n) | RData::Ptr(n) => n.labels().iter().map(|l| l.len() + 1).sum::<usize>() + 1,
		RData::Srv { target, .. } => 6 + target.labels().iter().map(|l| l.len() + 1).sum::<usize>() + 1,
		RData::Txt(strings) => strings.iter().map(|s| s.len() + 1).sum::<usize>().max(1),
		RData::Nsec { next, types } => next.labels().iter().map(|l| l.len() + 1).sum::<usize>() + 1 + types.len() + 4,
		RData::Opt(opt) => opt.options.iter().map(|o| 4 + o.data.len()).sum(),
		RData::Raw { bytes, .. } => bytes.len(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn decode_encode_question_only_message() {
		let mut original = Message::default();
		original.header.id = 0;
		original.questions.push(Question { name: Name::parse("foo.local.").unwrap(), ty: Type::A, unicast_response: true });

		let bytes = original.encode();
		let decoded = Message::decode(&bytes).unwrap();

		assert_eq!(decoded.questions.len(), 1);
		assert_eq!(decoded.questions[0].name, Name::parse("foo.local.").unwrap());
		assert!(decoded.questions[0].unicast_response);
	}

	#[test]
	fn decode_encode_answer_with_cache_flush() {
		let mut original = Message::default();
		original.header.flags.set_response(true);
		original.answers.push(Record { name: Name::parse("foo.local.").unwrap(), cache_flush: true, ttl: 120, rdata: RData::A([10, 0, 0, 1]) });

		let bytes = original.encode();
		let decoded = Message::decode(&bytes).unwrap();

		assert_eq!(decoded.answers.len(), 1);
		assert!(decoded.answers[0].cache_flush);
		assert_eq!(decoded.answers[0].ttl, 120);
	}

	#[test]
	fn writer_rejects_pushes_past_budget() {
		let mut writer = Writer::new(header::SIZE + 20);
		let record = Record { name: Name::parse("a.local.").unwrap(), cache_flush: true, ttl: 120, rdata: RData::A([1, 2, 3, 4]) };

		assert!(writer.push_answer(record.clone()));
		assert!(!writer.push_answer(record));
	}

	#[test]
	fn rejects_truncated_message() {
		assert!(matches!(Message::decode(&[0u8; 2]), Err(DecodeError::Truncated(2))));
	}
}
