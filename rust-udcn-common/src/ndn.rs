//! NDN packet types and structures.
//!
//! This module provides the core data structures that represent NDN packets
//! in the µDCN implementation.

use crate::error::Error;
use crate::tlv::{self, TlvElement};
use bytes::{Buf, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

/// Maximum length of an NDN name component.
pub const MAX_NAME_COMPONENT_LENGTH: usize = 255;
/// Maximum number of components in an NDN name.
pub const MAX_NAME_COMPONENTS: usize = 16;
/// Maximum size of an NDN packet.
pub const MAX_NDN_PACKET_SIZE: usize = 8800;
/// Length in octets of an implicit digest component (SHA-256 sized, per NDN's digest TLV).
pub const IMPLICIT_DIGEST_LENGTH: usize = 32;

/// FNV-1a offset basis, also used as the hash of the empty name prefix.
pub const EMPTY_NAME_HASH: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

#[inline]
fn fold_component(prev: u64, bytes: &[u8]) -> u64 {
    let mut h = prev;
    for &b in bytes {
        h ^= b as u64;
        h = h.wrapping_mul(FNV_PRIME);
    }
    h
}

/* ---------------------------------------------------------------- *\
 * Name and NameComponent
\* ---------------------------------------------------------------- */

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NameComponent(pub Bytes);

impl NameComponent {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &Bytes {
        &self.0
    }

    pub fn to_tlv(&self) -> TlvElement {
        TlvElement::new(tlv::TLV_COMPONENT, self.0.clone())
    }

    pub fn from_tlv(element: &TlvElement) -> Result<Self, Error> {
        if element.tlv_type != tlv::TLV_COMPONENT {
            return Err(Error::NdnPacket(format!(
                "Expected name component TLV type {}, got {}",
                tlv::TLV_COMPONENT, element.tlv_type
            )));
        }
        Ok(Self(element.value.clone()))
    }
}

impl fmt::Display for NameComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let printable = self
            .0
            .iter()
            .all(|&b| (b.is_ascii_graphic() || b == b' '));
        if printable {
            write!(f, "{}", String::from_utf8_lossy(&self.0))
        } else {
            write!(f, "0x")?;
            for &b in &self.0 {
                write!(f, "{:02x}", b)?;
            }
            Ok(())
        }
    }
}

/// An NDN name: an ordered sequence of components, plus an optional implicit
/// digest trailer.
///
/// The digest participates in equality (two names differing only in digest
/// are distinct PCCT keys) but never in the per-prefix hash vector used for
/// longest-prefix-match — the FIB only ever matches on the component
/// sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Name {
    components: Vec<NameComponent>,
    digest: Option<[u8; IMPLICIT_DIGEST_LENGTH]>,
}

impl Name {
    pub fn new() -> Self {
        Self {
            components: Vec::new(),
            digest: None,
        }
    }

    pub fn from_string(s: &str) -> Self {
        let components = s
            .split('/')
            .filter(|comp| !comp.is_empty())
            .map(|comp| NameComponent::new(comp.as_bytes().to_vec()))
            .collect();
        Self {
            components,
            digest: None,
        }
    }

    pub fn push(&mut self, component: NameComponent) -> &mut Self {
        self.components.push(component);
        self
    }

    /// Attach an implicit digest trailer.
    pub fn with_digest(mut self, digest: [u8; IMPLICIT_DIGEST_LENGTH]) -> Self {
        self.digest = Some(digest);
        self
    }

    pub fn digest(&self) -> Option<&[u8; IMPLICIT_DIGEST_LENGTH]> {
        self.digest.as_ref()
    }

    pub fn has_digest(&self) -> bool {
        self.digest.is_some()
    }

    /// Drop the digest trailer, returning the plain component sequence.
    pub fn without_digest(&self) -> Self {
        Self {
            components: self.components.clone(),
            digest: None,
        }
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn components(&self) -> impl Iterator<Item = &NameComponent> {
        self.components.iter()
    }

    pub fn get(&self, index: usize) -> Option<&NameComponent> {
        self.components.get(index)
    }

    pub fn prefix(&self, len: usize) -> Self {
        Self {
            components: self.components.iter().take(len).cloned().collect(),
            digest: None,
        }
    }

    pub fn is_prefix_of(&self, other: &Self) -> bool {
        self.components.len() <= other.components.len()
            && self
                .components
                .iter()
                .zip(other.components.iter())
                .all(|(a, b)| a == b)
    }

    /// Per-prefix hash vector: `hash_vector()[k]` is the hash of the first
    /// `k` components, for `k` in `0..=len()`. The empty prefix (`k == 0`)
    /// always hashes to [`EMPTY_NAME_HASH`].
    pub fn hash_vector(&self) -> Vec<u64> {
        let mut v = Vec::with_capacity(self.components.len() + 1);
        let mut h = EMPTY_NAME_HASH;
        v.push(h);
        for c in &self.components {
            h = fold_component(h, &c.0);
            v.push(h);
        }
        v
    }

    /// Hash of the first `ncomps` components, without allocating a vector.
    pub fn prefix_hash(&self, ncomps: usize) -> u64 {
        let mut h = EMPTY_NAME_HASH;
        for c in self.components.iter().take(ncomps) {
            h = fold_component(h, &c.0);
        }
        h
    }

    pub fn to_tlv(&self) -> Result<TlvElement, Error> {
        let mut buf = BytesMut::new();
        for component in &self.components {
            component.to_tlv().encode(&mut buf);
        }
        if let Some(digest) = self.digest {
            TlvElement::new(tlv::TLV_COMPONENT, Bytes::copy_from_slice(&digest)).encode(&mut buf);
        }
        Ok(TlvElement::new(tlv::TLV_NAME, buf.freeze()))
    }

    pub fn from_tlv(element: &TlvElement) -> Result<Self, Error> {
        if element.tlv_type != tlv::TLV_NAME {
            return Err(Error::NdnPacket(format!(
                "Expected name TLV type {}, got {}",
                tlv::TLV_NAME, element.tlv_type
            )));
        }

        let mut components = Vec::new();
        let mut buf = element.value.clone();
        while buf.has_remaining() {
            let e = TlvElement::decode(&mut buf)?;
            components.push(NameComponent::from_tlv(&e)?);
        }

        // An implicit digest trailer is a component of exactly
        // IMPLICIT_DIGEST_LENGTH octets in the last position; a plain
        // decode can't tell a digest-shaped component from an ordinary
        // one, so callers that expect a digest call `split_digest`.
        Ok(Self {
            components,
            digest: None,
        })
    }

    /// If the last component is exactly [`IMPLICIT_DIGEST_LENGTH`] octets,
    /// move it into the `digest` field and return the resulting name.
    pub fn split_digest(mut self) -> Self {
        if let Some(last) = self.components.last() {
            if last.0.len() == IMPLICIT_DIGEST_LENGTH {
                let mut digest = [0u8; IMPLICIT_DIGEST_LENGTH];
                digest.copy_from_slice(&last.0);
                self.components.pop();
                self.digest = Some(digest);
            }
        }
        self
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.components.is_empty() && self.digest.is_none() {
            return write!(f, "/");
        }
        for component in &self.components {
            write!(f, "/{}", component)?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "/sha256digest=")?;
            for b in digest {
                write!(f, "{:02x}", b)?;
            }
        }
        Ok(())
    }
}

impl Default for Name {
    fn default() -> Self {
        Self::new()
    }
}

/* ---------------------------------------------------------------- *\
 * ForwardingHint
\* ---------------------------------------------------------------- */

/// A list of alternate names an Interest may be routed on, with a cursor
/// tracking which one the forwarder is currently trying.
///
/// The active index is advanced by the caller between failed FIB lookups;
/// it is never implicit state inferred from the FIB itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ForwardingHintList {
    hints: Vec<Name>,
    /// Which hint the forwarder is currently trying, if any FIB lookup
    /// against `hints[active]` has begun. Advanced explicitly by the
    /// caller between failed lookups; `None` until the first attempt.
    #[serde(skip)]
    active: Option<usize>,
}

impl ForwardingHintList {
    pub fn new(hints: Vec<Name>) -> Self {
        Self { hints, active: None }
    }

    pub fn is_empty(&self) -> bool {
        self.hints.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hints.len()
    }

    pub fn get(&self, index: usize) -> Option<&Name> {
        self.hints.get(index)
    }

    /// All hints, in order, for callers that iterate the whole list
    /// rather than stepping one `active` index at a time.
    pub fn iter(&self) -> impl Iterator<Item = &Name> {
        self.hints.iter()
    }

    /// The hint the forwarder is presently trying.
    pub fn active(&self) -> Option<&Name> {
        self.active.and_then(|i| self.hints.get(i))
    }

    pub fn active_index(&self) -> Option<usize> {
        self.active
    }

    /// Point `active` at `index`, per `PInterest_SelectActiveFh` in the
    /// source forwarder: called once per FH the forwarder tries during a
    /// single Interest's FIB lookup.
    pub fn select_active(&mut self, index: usize) {
        self.active = (index < self.hints.len()).then_some(index);
    }
}

/* ---------------------------------------------------------------- *\
 * Interest
\* ---------------------------------------------------------------- */

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interest {
    pub name: Name,
    pub nonce: u32,
    pub lifetime_ms: u32,
    pub hop_limit: Option<u8>,
    pub can_be_prefix: bool,
    pub must_be_fresh: bool,
    /// Alternate names to try, in order, when the primary name has no FIB
    /// match. Empty unless the Interest explicitly carries ForwardingHints.
    #[serde(default)]
    pub forwarding_hint: ForwardingHintList,
}

impl Interest {
    pub fn new(name: Name) -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_else(|_| Duration::from_secs(0));
        let nonce = (now.as_millis() % u32::MAX as u128) as u32;

        Self {
            name,
            nonce,
            lifetime_ms: 4000,
            hop_limit: Some(32),
            can_be_prefix: false,
            must_be_fresh: true,
            forwarding_hint: ForwardingHintList::default(),
        }
    }

    pub fn with_lifetime(mut self, lifetime_ms: u32) -> Self {
        self.lifetime_ms = lifetime_ms;
        self
    }
    pub fn with_nonce(mut self, nonce: u32) -> Self {
        self.nonce = nonce;
        self
    }
    pub fn with_can_be_prefix(mut self, can_be_prefix: bool) -> Self {
        self.can_be_prefix = can_be_prefix;
        self
    }
    pub fn with_must_be_fresh(mut self, must_be_fresh: bool) -> Self {
        self.must_be_fresh = must_be_fresh;
        self
    }
    pub fn with_forwarding_hint(mut self, hints: Vec<Name>) -> Self {
        self.forwarding_hint = ForwardingHintList::new(hints);
        self
    }

    /// The PCCT key for this Interest: same component sequence, with a
    /// digest trailer only when the Interest itself names one.
    pub fn pcc_key(&self) -> &Name {
        &self.name
    }

    pub fn wire_size(&self) -> Result<usize, Error> {
        Ok(self.name.to_tlv()?.len() + 20) // rough estimate
    }
}

/* ---------------------------------------------------------------- *\
 * Data
\* ---------------------------------------------------------------- */

/// Helper used only for deserialisation of `Data`.
#[derive(Deserialize)]
struct DataHelper {
    name: Name,
    content: Bytes,
    ttl_ms: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct Data {
    pub name: Name,
    pub content: Bytes,
    /// FreshnessPeriod, in milliseconds. `0` means the Data is stale as soon
    /// as it is produced (MustBeFresh Interests never match it).
    pub ttl_ms: u32,

    /// Creation timestamp – not serialised, regenerated on deserialisation.
    #[serde(skip_serializing)]
    pub creation_time: Instant,
}

impl<'de> Deserialize<'de> for Data {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let helper = DataHelper::deserialize(deserializer)?;
        Ok(Self {
            name: helper.name,
            content: helper.content,
            ttl_ms: helper.ttl_ms,
            creation_time: Instant::now(), // fresh timestamp
        })
    }
}

impl Data {
    pub fn new(name: Name, content: impl Into<Bytes>) -> Self {
        Self {
            name,
            content: content.into(),
            ttl_ms: 10_000,
            creation_time: Instant::now(),
        }
    }

    pub fn with_ttl(mut self, ttl_ms: u32) -> Self {
        self.ttl_ms = ttl_ms;
        self
    }

    pub fn is_expired(&self) -> bool {
        self.creation_time.elapsed() > Duration::from_millis(self.ttl_ms as u64)
    }

    /// Whether this Data can satisfy `interest`, per name/CanBePrefix/
    /// MustBeFresh matching rules. Implicit-digest equality is checked
    /// directly since both names carry their digest field inline.
    pub fn can_satisfy(&self, interest: &Interest) -> bool {
        if interest.must_be_fresh && self.is_expired() {
            return false;
        }
        if interest.name.has_digest() {
            return interest.name == self.name;
        }
        if interest.can_be_prefix {
            interest.name.is_prefix_of(&self.name)
        } else {
            interest.name == self.name
        }
    }

    pub fn wire_size(&self) -> Result<usize, Error> {
        Ok(self.name.to_tlv()?.len() + self.content.len() + 20)
    }
}

/* ---------------------------------------------------------------- *\
 * Nack
\* ---------------------------------------------------------------- */

/// Reason code carried by a Nack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NackReason {
    /// The FIB had no match, or every nexthop was filtered out (loop
    /// avoidance left zero candidates).
    NoRoute,
    /// The PCCT (and therefore the PIT) is at capacity.
    Congestion,
    /// Reserved for duplicate-nonce suppression; never emitted today.
    Duplicate,
}

impl fmt::Display for NackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NackReason::NoRoute => "no-route",
            NackReason::Congestion => "congestion",
            NackReason::Duplicate => "duplicate",
        };
        write!(f, "{s}")
    }
}

/// A Nack wraps the Interest it negatively acknowledges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Nack {
    pub interest: Interest,
    pub reason: NackReason,
}

/// Turn an Interest into a Nack, mirroring `MakeNack` in the original
/// forwarder (which rewrites the packet in place rather than allocating a
/// fresh one).
pub fn make_nack(interest: Interest, reason: NackReason) -> Nack {
    Nack { interest, reason }
}

/* ---------------------------------------------------------------- *\
 * Misc
\* ---------------------------------------------------------------- */

#[derive(Debug, Clone)]
pub enum InterestResult {
    Forwarded,
    SatisfiedByCs(Data),
    Aggregated,
    Dropped(String),
}

/// The three network-layer packet kinds the forwarder exchanges.
#[derive(Debug, Clone)]
pub enum L3Packet {
    Interest(Interest),
    Data(Data),
    Nack(Nack),
}

impl L3Packet {
    pub fn name(&self) -> &Name {
        match self {
            L3Packet::Interest(i) => &i.name,
            L3Packet::Data(d) => &d.name,
            L3Packet::Nack(n) => &n.interest.name,
        }
    }

    pub fn is_interest(&self) -> bool {
        matches!(self, L3Packet::Interest(_))
    }

    pub fn is_data(&self) -> bool {
        matches!(self, L3Packet::Data(_))
    }

    pub fn is_nack(&self) -> bool {
        matches!(self, L3Packet::Nack(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_vector_empty_prefix_is_constant_seed() {
        let name = Name::from_string("/a/b/c");
        let hv = name.hash_vector();
        assert_eq!(hv.len(), 4);
        assert_eq!(hv[0], EMPTY_NAME_HASH);
    }

    #[test]
    fn hash_vector_matches_prefix_hash() {
        let name = Name::from_string("/a/b/c/d");
        let hv = name.hash_vector();
        for k in 0..=name.len() {
            assert_eq!(hv[k], name.prefix_hash(k));
        }
    }

    #[test]
    fn different_names_share_empty_prefix_hash() {
        let a = Name::from_string("/x");
        let b = Name::from_string("/y/z");
        assert_eq!(a.prefix_hash(0), EMPTY_NAME_HASH);
        assert_eq!(b.prefix_hash(0), EMPTY_NAME_HASH);
    }

    #[test]
    fn digest_participates_in_equality_not_hash_vector() {
        let plain = Name::from_string("/a/b");
        let digest = [7u8; IMPLICIT_DIGEST_LENGTH];
        let with_digest = plain.clone().with_digest(digest);
        assert_ne!(plain, with_digest);
        assert_eq!(plain.hash_vector(), with_digest.hash_vector());
    }

    #[test]
    fn can_satisfy_respects_can_be_prefix_and_freshness() {
        let data = Data::new(Name::from_string("/a/b"), "x").with_ttl(0);
        let exact = Interest::new(Name::from_string("/a/b")).with_must_be_fresh(false);
        assert!(data.can_satisfy(&exact));

        let fresh_required = Interest::new(Name::from_string("/a/b")).with_must_be_fresh(true);
        assert!(!data.can_satisfy(&fresh_required));

        let prefix = Interest::new(Name::from_string("/a"))
            .with_can_be_prefix(true)
            .with_must_be_fresh(false);
        assert!(data.can_satisfy(&prefix));

        let not_prefix = Interest::new(Name::from_string("/a"))
            .with_can_be_prefix(false)
            .with_must_be_fresh(false);
        assert!(!data.can_satisfy(&not_prefix));
    }

    #[test]
    fn split_digest_round_trip() {
        let digest = [9u8; IMPLICIT_DIGEST_LENGTH];
        let with_digest = Name::from_string("/a/b").with_digest(digest);
        let tlv = with_digest.to_tlv().unwrap();
        let decoded = Name::from_tlv(&tlv).unwrap().split_digest();
        assert_eq!(decoded, with_digest);
    }
}
