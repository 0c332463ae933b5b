use std::collections::HashMap;
use std::fmt;

use crate::error::{DecodeError, DecodeResult};

const MAX_LABEL_LEN: usize = 63;
const MAX_NAME_LEN: usize = 255;
const MAX_POINTER_HOPS: usize = 32;
/// Labels are compressed as `<2-bit tag=11><14-bit offset>`; an offset past
/// this can't be represented.
const MAX_COMPRESSION_OFFSET: usize = 0x3FFF;

/// A wire-format domain name: a sequence of length-prefixed labels
/// terminated by the zero-length root label. Comparison and hashing are
/// case-insensitive per RFC 1035 §2.3.3; the hash is computed once, at
/// construction, so every store keyed by name (the cache's hash table, the
/// auth record's `namehash`) can use it without recomputing on every probe.
#[derive(Clone)]
pub struct Name {
	labels: Vec<Box<[u8]>>,
	hash: u32,
}

impl Name {
	pub fn root() -> Self {
		Self { labels: Vec::new(), hash: fnv32(core::iter::empty()) }
	}

	/// Parse a presentation-format name such as `"foo.local."`. A trailing
	/// dot is optional and stripped either way.
	pub fn parse(s: &str) -> DecodeResult<Self> {
		let s = s.strip_suffix('.').unwrap_or(s);

		let mut labels = Vec::new();
		let mut total = 1; // root label

		if !s.is_empty() {
			for label in s.split('.') {
				let bytes = label.as_bytes();

				if bytes.len() > MAX_LABEL_LEN {
					return Err(DecodeError::LabelTooLong);
				}

				total += bytes.len() + 1;

				if total > MAX_NAME_LEN {
					return Err(DecodeError::NameTooLong);
				}

				labels.push(bytes.to_vec().into_boxed_slice());
			}
		}

		let hash = fnv32(labels.iter().map(|l| &**l));

		Ok(Self { labels, hash })
	}

	/// Decode a name starting at `pos`, following compression pointers.
	/// `pos` is advanced past the name's own encoding (not past any pointer
	/// target it jumped to).
	pub fn decode(buf: &[u8], pos: &mut usize) -> DecodeResult<Self> {
		let mut labels = Vec::new();
		let mut total = 1;
		let mut cursor = *pos;
		let mut end_of_name = None;
		let mut hops = 0;

		loop {
			let len = *buf.get(cursor).ok_or(DecodeError::UnexpectedEnd("name label length"))?;

			match len & 0xC0 {
				0x00 => {
					if len == 0 {
						cursor += 1;

						if end_of_name.is_none() {
							end_of_name = Some(cursor);
						}

						break;
					}

					let len = len as usize;
					let start = cursor + 1;
					let end = start + len;

					let label = buf.get(start..end).ok_or(DecodeError::UnexpectedEnd("name label"))?;

					total += len + 1;

					if total > MAX_NAME_LEN {
						return Err(DecodeError::NameTooLong);
					}

					labels.push(label.to_vec().into_boxed_slice());
					cursor = end;
				}
				0xC0 => {
					let lo = *buf.get(cursor + 1).ok_or(DecodeError::UnexpectedEnd("name pointer"))?;
					let offset = (((len & 0x3F) as usize) << 8) | lo as usize;

					if end_of_name.is_none() {
						end_of_name = Some(cursor + 2);
					}

					if offset >= cursor {
						return Err(DecodeError::BadPointer);
					}

					hops += 1;

					if hops > MAX_POINTER_HOPS {
						return Err(DecodeError::PointerLoop);
					}

					cursor = offset;
				}
				_ => return Err(DecodeError::BadPointer),
			}
		}

		*pos = end_of_name.expect("loop always sets this before breaking or erroring");

		let hash = fnv32(labels.iter().map(|l| &**l));

		Ok(Self { labels, hash })
	}

	/// Encode the name, compressing against any suffix already written to
	/// this message. `table` maps a (lowercased) label sequence to the
	/// offset it was first written at.
	pub fn encode(&self, out: &mut Vec<u8>, table: &mut HashMap<Vec<Box<[u8]>>, u16>) {
		for start in 0..=self.labels.len() {
			let suffix = &self.labels[start..];
			let key: Vec<Box<[u8]>> = suffix.iter().map(|l| lower(l)).collect();

			if let Some(&offset) = table.get(&key) {
				for label in &self.labels[..start] {
					out.push(label.len() as u8);
					out.extend_from_slice(label);
				}

				out.push(0xC0 | (offset >> 8) as u8);
				out.push(offset as u8);
				return;
			}

			if start == 0 {
				if let Ok(offset) = u16::try_from(out.len()) {
					if out.len() <= MAX_COMPRESSION_OFFSET {
						table.insert(key, offset);
					}
				}
			}
		}

		for label in &self.labels {
			out.push(label.len() as u8);
			out.extend_from_slice(label);
		}

		out.push(0);
	}

	#[inline]
	pub fn hash(&self) -> u32 {
		self.hash
	}

	pub fn labels(&self) -> &[Box<[u8]>] {
		&self.labels
	}

	/// Build `<label>.<self>`, used when synthesizing the owner name of a
	/// service instance (`<instance>.<service>.<domain>`) or a reverse-PTR
	/// question target.
	pub fn prepend(&self, label: &[u8]) -> DecodeResult<Self> {
		if label.len() > MAX_LABEL_LEN {
			return Err(DecodeError::LabelTooLong);
		}

		let mut labels = Vec::with_capacity(self.labels.len() + 1);
		labels.push(label.to_vec().into_boxed_slice());
		labels.extend(self.labels.iter().cloned());

		let total: usize = labels.iter().map(|l| l.len() + 1).sum::<usize>() + 1;

		if total > MAX_NAME_LEN {
			return Err(DecodeError::NameTooLong);
		}

		let hash = fnv32(labels.iter().map(|l| &**l));

		Ok(Self { labels, hash })
	}

	/// Whether `self` is `other` with exactly one extra leading label
	/// (i.e. `self` names an instance directly under `other`).
	pub fn is_direct_child_of(&self, other: &Self) -> bool {
		self.labels.len() == other.labels.len() + 1 && self.labels[1..].iter().zip(&other.labels).all(|(a, b)| eq_label(a, b))
	}
}

impl PartialEq for Name {
	fn eq(&self, other: &Self) -> bool {
		self.hash == other.hash && self.labels.len() == other.labels.len() && self.labels.iter().zip(&other.labels).all(|(a, b)| eq_label(a, b))
	}
}

impl Eq for Name {}

impl core::hash::Hash for Name {
	fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
		self.hash.hash(state);
	}
}

impl fmt::Display for Name {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.labels.is_empty() {
			return write!(f, ".");
		}

		for label in &self.labels {
			write!(f, "{}.", String::from_utf8_lossy(label))?;
		}

		Ok(())
	}
}

impl fmt::Debug for Name {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Name({self})")
	}
}

fn eq_label(a: &[u8], b: &[u8]) -> bool {
	a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.to_ascii_lowercase() == y.to_ascii_lowercase())
}

fn lower(label: &[u8]) -> Box<[u8]> {
	label.to_ascii_lowercase().into_boxed_slice()
}

/// FNV-1a, folded to 32 bits. Chosen over `ahash`/`SipHash` because the
/// spec calls for one deterministic hash value stored alongside the name,
/// not a hasher keyed per-process — two responders on the wire comparing
/// names never compare hashes across processes, but tests and fixtures that
/// assert on specific hash values need it to be stable.
fn fnv32<'a>(labels: impl Iterator<Item = &'a [u8]>) -> u32 {
	const OFFSET: u32 = 0x811C_9DC5;
	const PRIME: u32 = 0x0100_0193;

	let mut hash = OFFSET;

	for label in labels {
		for &byte in label {
			hash ^= byte.to_ascii_lowercase() as u32;
			hash = hash.wrapping_mul(PRIME);
		}

		hash ^= b'.' as u32;
		hash = hash.wrapping_mul(PRIME);
	}

	hash
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parse_and_display_roundtrip() {
		let name = Name::parse("foo.local.").unwrap();
		assert_eq!(name.to_string(), "foo.local.");
	}

	#[test]
	fn case_insensitive_equality() {
		let a = Name::parse("Foo.LOCAL").unwrap();
		let b = Name::parse("foo.local").unwrap();
		assert_eq!(a, b);
		assert_eq!(a.hash(), b.hash());
	}

	#[test]
	fn encode_decode_roundtrip_with_compression() {
		let a = Name::parse("_printer._tcp.local.").unwrap();
		let b = Name::parse("foo._printer._tcp.local.").unwrap();

		let mut buf = Vec::new();
		let mut table = HashMap::new();

		a.encode(&mut buf, &mut table);
		let a_off = buf.len();
		b.encode(&mut buf, &mut table);

		let mut pos = 0;
		let decoded_a = Name::decode(&buf, &mut pos).unwrap();
		assert_eq!(pos, a_off);
		assert_eq!(decoded_a, a);

		let mut pos = a_off;
		let decoded_b = Name::decode(&buf, &mut pos).unwrap();
		assert_eq!(decoded_b, b);

		// `b`'s encoding should be shorter than writing it out fully, since
		// it shares a suffix with `a`.
		assert!(buf.len() < a_off + 1 + b.labels().iter().map(|l| l.len() + 1).sum::<usize>() + 1);
	}

	#[test]
	fn rejects_pointer_loops() {
		// A pointer at offset 0 pointing at itself.
		let buf = [0xC0, 0x00];
		let mut pos = 0;
		assert_eq!(Name::decode(&buf, &mut pos), Err(DecodeError::BadPointer));
	}

	#[test]
	fn direct_child_detection() {
		let service = Name::parse("_printer._tcp.local.").unwrap();
		let instance = service.prepend(b"My Printer").unwrap();
		assert!(instance.is_direct_child_of(&service));
		assert!(!service.is_direct_child_of(&instance));
	}
}
