use std::collections::HashMap;

use wire::{Name, RData, Type};

pub type InterfaceId = u32;

/// Where a record lives, or who's asking. §3's "interface selector" plus
/// the transient `Mark` sentinel used while an assembler pass is in
/// progress (a record tagged `Mark` is "in this packet", not "on this
/// link").
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum InterfaceSelector {
	Any,
	Specific(InterfaceId),
	LocalOnly,
	P2P,
	/// Legacy-unicast-only record: never multicast, only ever given out in
	/// direct replies.
	Unicast,
	Mark,
}

impl InterfaceSelector {
	/// Whether a record/question scoped this way is carried on `iface`.
	pub fn matches(self, iface: InterfaceId) -> bool {
		match self {
			Self::Any => true,
			Self::Specific(id) => id == iface,
			Self::LocalOnly | Self::Unicast | Self::Mark => false,
			Self::P2P => true,
		}
	}

	/// Whether two selectors could describe the same link: `Any` overlaps
	/// everything (an `Any`-scoped auth record is reachable on whichever
	/// interface a peer's `Specific` record arrived on), otherwise they
	/// must name the exact same scope.
	pub fn overlaps(self, other: Self) -> bool {
		matches!((self, other), (Self::Any, _) | (_, Self::Any)) || self == other
	}
}

/// The shape shared by an auth record and a cache record (§3). `namehash`
/// is just `name.hash()` from the wire layer; `rdatahash` is computed here
/// since the wire codec has no notion of "hash of this rdata for identity
/// comparison" (it only knows how to put bytes on the wire).
#[derive(Clone, Debug)]
pub struct RecordData {
	pub name: Name,
	pub ty: Type,
	pub class: u16,
	pub ttl: u32,
	pub rdata: RData,
	pub interface: InterfaceSelector,
	pub namehash: u32,
	pub rdatahash: u64,
}

impl RecordData {
	pub fn new(name: Name, class: u16, ttl: u32, rdata: RData, interface: InterfaceSelector) -> Self {
		let namehash = name.hash();
		let rdatahash = hash_rdata(&rdata);
		let ty = rdata.ty();

		Self { name, ty, class, ttl, rdata, interface, namehash, rdatahash }
	}

	/// Whether two records are "the same resource record" per
	/// `IdenticalSameNameRecord`: same name/type/class/interface, and —
	/// for TXT in particular — the same *set* of character-strings
	/// regardless of encoding order quirks the wire layer might produce.
	pub fn identical(&self, other: &Self) -> bool {
		self.namehash == other.namehash
			&& self.name == other.name
			&& self.ty == other.ty
			&& self.class == other.class
			&& self.interface == other.interface
			&& self.rdatahash == other.rdatahash
			&& self.rdata == other.rdata
	}

	/// Same identity (name/type/class/interface) but possibly different
	/// data — the shape a probe tie-break or an RRset-coherence flush
	/// checks for.
	pub fn same_identity(&self, other: &Self) -> bool {
		self.namehash == other.namehash && self.name == other.name && self.ty == other.ty && self.class == other.class && self.interface.overlaps(other.interface)
	}
}

/// FNV-1a/64, used only to give rdata a cheap identity fingerprint for
/// equality short-circuiting; never put on the wire.
fn hash_rdata(rdata: &RData) -> u64 {
	const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
	const PRIME: u64 = 0x0000_0100_0000_01B3;

	let mut buf = Vec::new();
	let mut table: HashMap<Vec<Box<[u8]>>, u16> = HashMap::new();
	rdata.encode(&mut buf, &mut table);

	let mut hash = OFFSET;

	for byte in buf {
		hash ^= byte as u64;
		hash = hash.wrapping_mul(PRIME);
	}

	hash
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn identical_records_compare_equal() {
		let a = RecordData::new(Name::parse("foo.local.").unwrap(), 1, 120, RData::A([1, 2, 3, 4]), InterfaceSelector::Any);
		let b = RecordData::new(Name::parse("foo.local.").unwrap(), 1, 60, RData::A([1, 2, 3, 4]), InterfaceSelector::Any);

		// TTL differs, but `identical` tracks rdata equality, not freshness.
		assert!(a.same_identity(&b));
		assert!(a.identical(&b));
	}

	#[test]
	fn differing_rdata_is_not_identical() {
		let a = RecordData::new(Name::parse("foo.local.").unwrap(), 1, 120, RData::A([1, 2, 3, 4]), InterfaceSelector::Any);
		let b = RecordData::new(Name::parse("foo.local.").unwrap(), 1, 120, RData::A([5, 6, 7, 8]), InterfaceSelector::Any);

		assert!(a.same_identity(&b));
		assert!(!a.identical(&b));
	}
}
