use std::collections::HashMap;

use crate::error::{DecodeError, DecodeResult};
use crate::name::Name;

/// RR TYPE values actually produced or consumed by the responder, plus a
/// fallback for anything else seen on the wire (the core stores those as
/// opaque `RData::Raw` so a query for a type it doesn't understand can
/// still be held in the passive cache and forwarded to a subscriber).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Type {
	A,
	Ns,
	Cname,
	Soa,
	Ptr,
	Mx,
	Txt,
	Aaaa,
	Srv,
	Opt,
	Nsec,
	Any,
	Other(u16),
}

impl Type {
	pub fn code(self) -> u16 {
		match self {
			Self::A => 1,
			Self::Ns => 2,
			Self::Cname => 5,
			Self::Soa => 6,
			Self::Ptr => 12,
			Self::Mx => 15,
			Self::Txt => 16,
			Self::Aaaa => 28,
			Self::Srv => 33,
			Self::Opt => 41,
			Self::Nsec => 47,
			Self::Any => 255,
			Self::Other(code) => code,
		}
	}

	pub fn from_code(code: u16) -> Self {
		match code {
			1 => Self::A,
			2 => Self::Ns,
			5 => Self::Cname,
			6 => Self::Soa,
			12 => Self::Ptr,
			15 => Self::Mx,
			16 => Self::Txt,
			28 => Self::Aaaa,
			33 => Self::Srv,
			41 => Self::Opt,
			47 => Self::Nsec,
			255 => Self::Any,
			other => Self::Other(other),
		}
	}
}

/// One OPT pseudo-RR option (RFC 6891 §6.1.2). The responder only ever
/// emits OWNER and LEASE (RFC 6762 §15.1 appendix), but preserves anything
/// else it decodes so a round-tripping proxy doesn't silently drop it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OptOption {
	pub code: u16,
	pub data: Vec<u8>,
}

impl OptOption {
	pub const OWNER: u16 = 4;
	pub const LEASE: u16 = 2;

	pub fn owner(mac: [u8; 6]) -> Self {
		let mut data = vec![0, 1]; // version 0, sequence 1 (primary interface)
		data.extend_from_slice(&mac);
		Self { code: Self::OWNER, data }
	}

	pub fn lease(seconds: u32) -> Self {
		Self { code: Self::LEASE, data: seconds.to_be_bytes().to_vec() }
	}
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Opt {
	/// Requestor's UDP payload size, carried in the OPT record's class field.
	pub udp_payload_size: u16,
	pub options: Vec<OptOption>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RData {
	A([u8; 4]),
	Aaaa([u8; 16]),
	Cname(Name),
	Ptr(Name),
	Srv { priority: u16, weight: u16, port: u16, target: Name },
	Txt(Vec<Vec<u8>>),
	/// mDNS-form NSEC (RFC 6762 §6.1): `next` is always the record's own
	/// owner name, asserting "no other types exist for this name".
	Nsec { next: Name, types: Vec<Type> },
	Opt(Opt),
	Raw { ty: u16, bytes: Vec<u8> },
}

impl RData {
	pub fn ty(&self) -> Type {
		match self {
			Self::A(_) => Type::A,
			Self::Aaaa(_) => Type::Aaaa,
			Self::Cname(_) => Type::Cname,
			Self::Ptr(_) => Type::Ptr,
			Self::Srv { .. } => Type::Srv,
			Self::Txt(_) => Type::Txt,
			Self::Nsec { .. } => Type::Nsec,
			Self::Opt(_) => Type::Opt,
			Self::Raw { ty, .. } => Type::from_code(*ty),
		}
	}

	pub fn encode(&self, out: &mut Vec<u8>, table: &mut HashMap<Vec<Box<[u8]>>, u16>) {
		match self {
			Self::A(addr) => out.extend_from_slice(addr),
			Self::Aaaa(addr) => out.extend_from_slice(addr),
			Self::Cname(name) | Self::Ptr(name) => name.encode(out, table),
			Self::Srv { priority, weight, port, target } => {
				out.extend_from_slice(&priority.to_be_bytes());
				out.extend_from_slice(&weight.to_be_bytes());
				out.extend_from_slice(&port.to_be_bytes());
				// SRV targets are not compressed (RFC 2782), matching how
				// most deployed responders encode them.
				target.encode(out, &mut HashMap::new());
			}
			Self::Txt(strings) => {
				if strings.is_empty() {
					out.push(0);
				}

				for s in strings {
					out.push(s.len() as u8);
					out.extend_from_slice(s);
				}
			}
			Self::Nsec { next, types } => {
				next.encode(out, &mut HashMap::new());
				encode_type_bitmap(out, types);
			}
			Self::Opt(opt) => {
				for option in &opt.options {
					out.extend_from_slice(&option.code.to_be_bytes());
					out.extend_from_slice(&(option.data.len() as u16).to_be_bytes());
					out.extend_from_slice(&option.data);
				}
			}
			Self::Raw { bytes, .. } => out.extend_from_slice(bytes),
		}
	}

	pub fn decode(ty: Type, buf: &[u8], pos: &mut usize, rdlength: usize) -> DecodeResult<Self> {
		let start = *pos;
		let end = start.checked_add(rdlength).filter(|&e| e <= buf.len()).ok_or(DecodeError::BadRdataLength)?;

		let rdata = match ty {
			Type::A => {
				let bytes: [u8; 4] = buf[start..end].try_into().map_err(|_| DecodeError::BadRdataLength)?;
				*pos = end;
				Self::A(bytes)
			}
			Type::Aaaa => {
				let bytes: [u8; 16] = buf[start..end].try_into().map_err(|_| DecodeError::BadRdataLength)?;
				*pos = end;
				Self::Aaaa(bytes)
			}
			Type::Cname => {
				let mut cursor = start;
				let name = Name::decode(buf, &mut cursor)?;
				*pos = end;
				Self::Cname(name)
			}
			Type::Ptr => {
				let mut cursor = start;
				let name = Name::decode(buf, &mut cursor)?;
				*pos = end;
				Self::Ptr(name)
			}
			Type::Srv => {
				if end - start < 6 {
					return Err(DecodeError::BadRdataLength);
				}

				let priority = u16::from_be_bytes([buf[start], buf[start + 1]]);
				let weight = u16::from_be_bytes([buf[start + 2], buf[start + 3]]);
				let port = u16::from_be_bytes([buf[start + 4], buf[start + 5]]);

				let mut cursor = start + 6;
				let target = Name::decode(buf, &mut cursor)?;

				*pos = end;
				Self::Srv { priority, weight, port, target }
			}
			Type::Txt => {
				let mut strings = Vec::new();
				let mut cursor = start;

				while cursor < end {
					let len = buf[cursor] as usize;
					cursor += 1;

					let seg_end = cursor + len;

					if seg_end > end {
						return Err(DecodeError::BadRdataLength);
					}

					strings.push(buf[cursor..seg_end].to_vec());
					cursor = seg_end;
				}

				*pos = end;
				Self::Txt(strings)
			}
			Type::Nsec => {
				let mut cursor = start;
				let next = Name::decode(buf, &mut cursor)?;
				let types = decode_type_bitmap(&buf[cursor..end])?;
				*pos = end;
				Self::Nsec { next, types }
			}
			Type::Opt => {
				let mut options = Vec::new();
				let mut cursor = start;

				while cursor < end {
					if end - cursor < 4 {
						return Err(DecodeError::BadOpt);
					}

					let code = u16::from_be_bytes([buf[cursor], buf[cursor + 1]]);
					let len = u16::from_be_bytes([buf[cursor + 2], buf[cursor + 3]]) as usize;
					cursor += 4;

					let data_end = cursor + len;

					if data_end > end {
						return Err(DecodeError::BadOpt);
					}

					options.push(OptOption { code, data: buf[cursor..data_end].to_vec() });
					cursor = data_end;
				}

				*pos = end;
				Self::Opt(Opt { udp_payload_size: 0, options })
			}
			Type::Ns | Type::Soa | Type::Mx | Type::Any | Type::Other(_) => {
				let bytes = buf[start..end].to_vec();
				*pos = end;
				Self::Raw { ty: ty.code(), bytes }
			}
		};

		Ok(rdata)
	}
}

/// mDNS NSEC records use a single windowed type-bitmap block covering
/// window 0, same as ordinary DNSSEC NSEC (RFC 4034 §4.1.2) but typically
/// only a handful of bits set.
fn encode_type_bitmap(out: &mut Vec<u8>, types: &[Type]) {
	let mut by_window: HashMap<u8, [u8; 32]> = HashMap::new();

	for ty in types {
		let code = ty.code();
		let window = (code >> 8) as u8;
		let bit = (code & 0xFF) as usize;
		let bitmap = by_window.entry(window).or_insert([0u8; 32]);
		bitmap[bit / 8] |= 0x80 >> (bit % 8);
	}

	let mut windows: Vec<_> = by_window.into_iter().collect();
	windows.sort_by_key(|(w, _)| *w);

	for (window, bitmap) in windows {
		let len = bitmap.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);

		if len == 0 {
			continue;
		}

		out.push(window);
		out.push(len as u8);
		out.extend_from_slice(&bitmap[..len]);
	}
}

fn decode_type_bitmap(buf: &[u8]) -> DecodeResult<Vec<Type>> {
	let mut types = Vec::new();
	let mut cursor = 0;

	while cursor < buf.len() {
		if buf.len() - cursor < 2 {
			return Err(DecodeError::BadRdataLength);
		}

		let window = buf[cursor] as u16;
		let len = buf[cursor + 1] as usize;
		cursor += 2;

		if cursor + len > buf.len() {
			return Err(DecodeError::BadRdataLength);
		}

		for (i, &byte) in buf[cursor..cursor + len].iter().enumerate() {
			for bit in 0..8 {
				if byte & (0x80 >> bit) != 0 {
					let code = (window << 8) | ((i * 8 + bit) as u16);
					types.push(Type::from_code(code));
				}
			}
		}

		cursor += len;
	}

	Ok(types)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn a_record_roundtrip() {
		let rdata = RData::A([192, 0, 2, 1]);
		let mut buf = Vec::new();
		rdata.encode(&mut buf, &mut HashMap::new());

		let mut pos = 0;
		let decoded = RData::decode(Type::A, &buf, &mut pos, buf.len()).unwrap();
		assert_eq!(decoded, rdata);
		assert_eq!(pos, buf.len());
	}

	#[test]
	fn srv_record_roundtrip() {
		let target = Name::parse("host.local.").unwrap();
		let rdata = RData::Srv { priority: 0, weight: 0, port: 8080, target };

		let mut buf = Vec::new();
		rdata.encode(&mut buf, &mut HashMap::new());

		let mut pos = 0;
		let decoded = RData::decode(Type::Srv, &buf, &mut pos, buf.len()).unwrap();
		assert_eq!(decoded, rdata);
	}

	#[test]
	fn txt_record_with_multiple_strings() {
		let rdata = RData::Txt(vec![b"key=value".to_vec(), b"flag".to_vec()]);
		let mut buf = Vec::new();
		rdata.encode(&mut buf, &mut HashMap::new());

		let mut pos = 0;
		let decoded = RData::decode(Type::Txt, &buf, &mut pos, buf.len()).unwrap();
		assert_eq!(decoded, rdata);
	}

	#[test]
	fn nsec_bitmap_roundtrip() {
		let next = Name::parse("host.local.").unwrap();
		let types = vec![Type::A, Type::Aaaa, Type::Srv];
		let rdata = RData::Nsec { next, types: types.clone() };

		let mut buf = Vec::new();
		rdata.encode(&mut buf, &mut HashMap::new());

		let mut pos = 0;
		let decoded = RData::decode(Type::Nsec, &buf, &mut pos, buf.len()).unwrap();

		match decoded {
			RData::Nsec { types: decoded_types, .. } => {
				let mut decoded_types = decoded_types;
				decoded_types.sort_by_key(|t| t.code());
				let mut expected = types;
				expected.sort_by_key(|t| t.code());
				assert_eq!(decoded_types, expected);
			}
			_ => panic!("expected Nsec"),
		}
	}

	#[test]
	fn opt_owner_option_roundtrip() {
		let opt = Opt { udp_payload_size: 1440, options: vec![OptOption::owner([1, 2, 3, 4, 5, 6]), OptOption::lease(120)] };
		let rdata = RData::Opt(opt.clone());

		let mut buf = Vec::new();
		rdata.encode(&mut buf, &mut HashMap::new());

		let mut pos = 0;
		let decoded = RData::decode(Type::Opt, &buf, &mut pos, buf.len()).unwrap();

		match decoded {
			RData::Opt(decoded_opt) => assert_eq!(decoded_opt.options, opt.options),
			_ => panic!("expected Opt"),
		}
	}
}
