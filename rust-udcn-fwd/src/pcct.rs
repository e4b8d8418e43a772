//! The Pending-Interest / Content-Store Coordination Table.
//!
//! A single keyed entry (`PccEntry`) fuses what would otherwise be two
//! tables: a PIT slot pair (exact-match `Pit0`, prefix-match `Pit1`) and a
//! CS slot, all addressed by the same full `Name` key. A `PccEntry` that
//! carries any PIT slot is also assigned a 48-bit token, indexed in a
//! second hash map for O(1) Data -> entry lookup by the peer-echoed PIT
//! token instead of by name.
//!
//! Storage is a fixed-capacity slab (`Vec<Option<PccEntry>>` plus a free
//! list) rather than an intrusive uthash + mempool pair, per the
//! specification's uthash-to-slab redesign note.

use rust_udcn_common::lp::PCC_TOKEN_MASK;
use rust_udcn_common::ndn::{Data, Interest, Name};
use rust_udcn_common::types::FaceId;
use smallvec::SmallVec;
use std::collections::{HashMap, VecDeque};
use std::time::Instant;

use crate::error::{FwdError, Result};
use crate::timer::TimerId;

pub const PIT_MAX_DOWNSTREAM: usize = 8;
pub const PIT_MAX_UPSTREAM: usize = 8;
/// Length of the wire PIT token this forwarder emits/accepts, per
/// `FwToken`'s `(worker_id: 16, pcc_token: 48)` packing.
pub const FW_TOKEN_LENGTH: usize = 8;

pub type SlabIndex = usize;

/// Which PIT slot of a `PccEntry` an operation refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PitSlot {
    /// Exact-match Interests (`CanBePrefix == false`).
    Pit0,
    /// Prefix-match-capable Interests (`CanBePrefix == true`).
    Pit1,
}

#[derive(Debug, Clone)]
pub struct DownstreamRecord {
    pub face: FaceId,
    pub nonce: u32,
    pub expiry: Instant,
    pub congestion_mark: u8,
    /// The token the peer itself supplied (echoed back verbatim on
    /// satisfaction), distinct from this forwarder's own PCCT token.
    pub peer_token: SmallVec<[u8; 32]>,
}

impl DownstreamRecord {
    pub fn is_live(&self, now: Instant) -> bool {
        now < self.expiry
    }
}

#[derive(Debug, Clone)]
pub struct UpstreamRecord {
    pub face: FaceId,
    pub last_tx: Instant,
    pub retx_count: u32,
    pub rto_timer: Option<TimerId>,
}

/// Embedded inside a `PccEntry` slot: tracks one outstanding Interest's
/// downstream requesters and upstream forwards.
#[derive(Debug, Clone)]
pub struct PitEntry {
    pub interest: Interest,
    pub downstream: SmallVec<[DownstreamRecord; PIT_MAX_DOWNSTREAM]>,
    pub upstream: SmallVec<[UpstreamRecord; PIT_MAX_UPSTREAM]>,
    pub expiry_timer: Option<TimerId>,
    pub fib_seq_num: u64,
}

impl PitEntry {
    fn new(interest: Interest) -> Self {
        Self {
            interest,
            downstream: SmallVec::new(),
            upstream: SmallVec::new(),
            expiry_timer: None,
            fib_seq_num: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CsEntry {
    pub data: Data,
    pub inserted_at: Instant,
}

/// One keyed entry of the PCCT: at most one `Pit0`, one `Pit1`, and one CS
/// slot, per the data-model invariant.
#[derive(Debug, Clone)]
pub struct PccEntry {
    pub key: Name,
    pub pit0: Option<PitEntry>,
    pub pit1: Option<PitEntry>,
    pub cs: Option<CsEntry>,
    pub token: Option<u64>,
}

impl PccEntry {
    fn new(key: Name) -> Self {
        Self {
            key,
            pit0: None,
            pit1: None,
            cs: None,
            token: None,
        }
    }

    fn has_any_slot(&self) -> bool {
        self.pit0.is_some() || self.pit1.is_some() || self.cs.is_some()
    }

    pub fn pit(&self, slot: PitSlot) -> Option<&PitEntry> {
        match slot {
            PitSlot::Pit0 => self.pit0.as_ref(),
            PitSlot::Pit1 => self.pit1.as_ref(),
        }
    }

    pub fn pit_mut(&mut self, slot: PitSlot) -> Option<&mut PitEntry> {
        match slot {
            PitSlot::Pit0 => self.pit0.as_mut(),
            PitSlot::Pit1 => self.pit1.as_mut(),
        }
    }
}

/// Outcome of [`Pcct::pit_insert`].
pub enum PitInsertResult {
    /// A CS slot at this key already satisfies the Interest.
    Cs(SlabIndex),
    /// The Interest was (or already is) tracked in this PIT slot.
    Pit(SlabIndex, PitSlot),
    /// The table is at capacity and has no entry for this key.
    Full,
}

/// Outcome of [`Pcct::find_by_data`].
pub enum PitFindResult {
    /// No PCCT entry is waiting on this token.
    None,
    /// The Data's name is exactly one component deeper than a matched
    /// `Pit1` entry's key and that component is digest-shaped: the caller
    /// should invoke the digest helper before proceeding.
    NeedDigest,
    /// One or both PIT slots of this entry match the Data.
    Matched(SlabIndex, SmallVec<[PitSlot; 2]>),
}

/// Fixed-capacity slab backing the PCCT, with a key index and a token
/// index layered over it.
pub struct Pcct {
    slab: Vec<Option<PccEntry>>,
    free: Vec<SlabIndex>,
    capacity: usize,
    by_key: HashMap<Name, SlabIndex>,
    by_token: HashMap<u64, SlabIndex>,
    next_token: u64,
    cs_lru: VecDeque<SlabIndex>,
    cs_capacity: usize,
}

impl Pcct {
    pub fn new(capacity: usize, cs_capacity: usize) -> Self {
        Self {
            slab: Vec::new(),
            free: Vec::new(),
            capacity,
            by_key: HashMap::new(),
            by_token: HashMap::new(),
            next_token: 1,
            cs_lru: VecDeque::new(),
            cs_capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn get(&self, idx: SlabIndex) -> Option<&PccEntry> {
        self.slab.get(idx).and_then(|e| e.as_ref())
    }

    pub fn get_mut(&mut self, idx: SlabIndex) -> Option<&mut PccEntry> {
        self.slab.get_mut(idx).and_then(|e| e.as_mut())
    }

    pub fn find_key(&self, key: &Name) -> Option<SlabIndex> {
        self.by_key.get(key).copied()
    }

    /// Find-or-create the entry for `key`. `TableFull` only when an
    /// allocation is actually needed.
    pub fn insert_or_find(&mut self, key: &Name) -> Result<(SlabIndex, bool)> {
        if let Some(&idx) = self.by_key.get(key) {
            return Ok((idx, false));
        }
        if self.by_key.len() >= self.capacity {
            return Err(FwdError::PcctFull(self.capacity));
        }
        let idx = match self.free.pop() {
            Some(idx) => {
                self.slab[idx] = Some(PccEntry::new(key.clone()));
                idx
            }
            None => {
                self.slab.push(Some(PccEntry::new(key.clone())));
                self.slab.len() - 1
            }
        };
        self.by_key.insert(key.clone(), idx);
        Ok((idx, true))
    }

    /// Remove `idx` entirely: drops its token (if any) and returns its slot
    /// to the free list.
    pub fn erase(&mut self, idx: SlabIndex) {
        if let Some(entry) = self.slab.get_mut(idx).and_then(|e| e.take()) {
            self.by_key.remove(&entry.key);
            if let Some(token) = entry.token {
                self.by_token.remove(&token);
            }
            self.cs_lru.retain(|&i| i != idx);
            self.free.push(idx);
        }
    }

    /// If `idx` now carries no PIT nor CS slot, erase it (this is the
    /// "release the token and erase from PCCT" step that follows PIT
    /// expiry and CS eviction).
    fn erase_if_empty(&mut self, idx: SlabIndex) {
        let empty = self.get(idx).is_some_and(|e| !e.has_any_slot());
        if empty {
            self.erase(idx);
        }
    }

    /// Assign a token to `idx` if it doesn't have one yet. Monotonically
    /// increments an internal counter, masking to 48 bits and skipping any
    /// value already in use — the 48-bit space strictly dominates table
    /// capacity, so this is amortized O(1).
    pub fn add_token(&mut self, idx: SlabIndex) -> Result<u64> {
        if let Some(token) = self.get(idx).and_then(|e| e.token) {
            return Ok(token);
        }
        let mut attempts: u64 = 0;
        loop {
            let candidate = self.next_token & PCC_TOKEN_MASK;
            self.next_token = self.next_token.wrapping_add(1);
            if !self.by_token.contains_key(&candidate) {
                self.by_token.insert(candidate, idx);
                if let Some(entry) = self.get_mut(idx) {
                    entry.token = Some(candidate);
                }
                return Ok(candidate);
            }
            attempts += 1;
            if attempts > PCC_TOKEN_MASK {
                return Err(FwdError::TokenExhausted(attempts as u32));
            }
        }
    }

    pub fn find_by_token(&self, token: u64) -> Option<SlabIndex> {
        self.by_token.get(&token).copied()
    }

    /* -------------------------------------------------------------- *
     * PIT (logical sub-table)
     * -------------------------------------------------------------- */

    /// `Interest -> {Cs, Pit, Full}`, per §4.F.1.
    pub fn pit_insert(&mut self, interest: &Interest) -> Result<PitInsertResult> {
        let key = interest.pcc_key().clone();
        let (idx, _is_new) = match self.insert_or_find(&key) {
            Ok(v) => v,
            Err(FwdError::PcctFull(cap)) => {
                let _ = cap;
                return Ok(PitInsertResult::Full);
            }
            Err(e) => return Err(e),
        };

        if let Some(entry) = self.get(idx) {
            if let Some(cs) = &entry.cs {
                if cs.data.can_satisfy(interest) {
                    return Ok(PitInsertResult::Cs(idx));
                }
            }
        }

        let slot = if interest.can_be_prefix {
            PitSlot::Pit1
        } else {
            PitSlot::Pit0
        };

        let already_present = self.get(idx).and_then(|e| e.pit(slot)).is_some();
        if !already_present {
            let entry = self.get_mut(idx).expect("just inserted or found");
            match slot {
                PitSlot::Pit0 => entry.pit0 = Some(PitEntry::new(interest.clone())),
                PitSlot::Pit1 => entry.pit1 = Some(PitEntry::new(interest.clone())),
            }
        }
        self.add_token(idx)?;
        Ok(PitInsertResult::Pit(idx, slot))
    }

    /// Merge an arriving Interest into the downstream record set for
    /// `(idx, slot)`. Returns the downstream index, or `None` if the
    /// downstream table is full and no expired slot could be reclaimed.
    pub fn dn_rx_interest(
        &mut self,
        idx: SlabIndex,
        slot: PitSlot,
        face: FaceId,
        nonce: u32,
        lifetime_ms: u32,
        congestion_mark: u8,
        peer_token: &[u8],
        now: Instant,
    ) -> Option<usize> {
        let pit = self.get_mut(idx)?.pit_mut(slot)?;
        let expiry = now + std::time::Duration::from_millis(lifetime_ms as u64);

        if let Some(pos) = pit.downstream.iter().position(|d| d.face == face && d.nonce == nonce) {
            let d = &mut pit.downstream[pos];
            d.expiry = expiry;
            d.congestion_mark = congestion_mark;
            d.peer_token = SmallVec::from_slice(peer_token);
            return Some(pos);
        }

        if pit.downstream.len() >= PIT_MAX_DOWNSTREAM {
            if let Some(pos) = pit.downstream.iter().position(|d| !d.is_live(now)) {
                pit.downstream.remove(pos);
            } else {
                return None;
            }
        }

        pit.downstream.push(DownstreamRecord {
            face,
            nonce,
            expiry,
            congestion_mark,
            peer_token: SmallVec::from_slice(peer_token),
        });
        Some(pit.downstream.len() - 1)
    }

    /// Merge an outgoing Interest into the upstream record set for
    /// `(idx, slot)`, keyed by face. Returns the upstream index, or `None`
    /// if the upstream table is full.
    pub fn up_tx_interest(&mut self, idx: SlabIndex, slot: PitSlot, face: FaceId, now: Instant) -> Option<usize> {
        let pit = self.get_mut(idx)?.pit_mut(slot)?;

        if let Some(pos) = pit.upstream.iter().position(|u| u.face == face) {
            let u = &mut pit.upstream[pos];
            u.last_tx = now;
            u.retx_count += 1;
            return Some(pos);
        }

        if pit.upstream.len() >= PIT_MAX_UPSTREAM {
            return None;
        }
        pit.upstream.push(UpstreamRecord {
            face,
            last_tx: now,
            retx_count: 0,
            rto_timer: None,
        });
        Some(pit.upstream.len() - 1)
    }

    /// Decode the peer-supplied token back to its PCCT entry and report
    /// which PIT slot(s) match the arriving Data.
    pub fn find_by_data(&self, data: &Data, pcc_token: u64) -> PitFindResult {
        let Some(idx) = self.find_by_token(pcc_token) else {
            return PitFindResult::None;
        };
        let Some(entry) = self.get(idx) else {
            return PitFindResult::None;
        };

        let mut matched: SmallVec<[PitSlot; 2]> = SmallVec::new();
        if let Some(pit0) = &entry.pit0 {
            if pit0.interest.name == data.name {
                matched.push(PitSlot::Pit0);
            }
        }
        if let Some(pit1) = &entry.pit1 {
            if pit1.interest.name.is_prefix_of(&data.name) {
                let extra_components = data.name.len().saturating_sub(pit1.interest.name.len());
                if extra_components > 1 {
                    // More than one extra component: not a direct child,
                    // so this Pit1 slot doesn't actually match.
                } else if extra_components == 1 && !data.name.has_digest() {
                    return PitFindResult::NeedDigest;
                } else {
                    matched.push(PitSlot::Pit1);
                }
            }
        }

        if matched.is_empty() {
            PitFindResult::None
        } else {
            PitFindResult::Matched(idx, matched)
        }
    }

    /// Drop every downstream/upstream record of `(idx, slot)` (e.g. on PIT
    /// expiry) and free the slot; erases the whole PCCT entry if nothing
    /// else is left in it.
    pub fn pit_expire(&mut self, idx: SlabIndex, slot: PitSlot) {
        if let Some(entry) = self.get_mut(idx) {
            match slot {
                PitSlot::Pit0 => entry.pit0 = None,
                PitSlot::Pit1 => entry.pit1 = None,
            }
        }
        self.erase_if_empty(idx);
    }

    /* -------------------------------------------------------------- *
     * CS (logical sub-table)
     * -------------------------------------------------------------- */

    /// Repurpose the PIT slot(s) that were satisfied by `data` into a CS
    /// slot holding it, per §4.F.2. `matched` is the slot list
    /// [`PitFindResult::Matched`] produced.
    pub fn cs_insert(&mut self, idx: SlabIndex, matched: &[PitSlot], data: Data, now: Instant) {
        let had_pit1_longer_name = matched.contains(&PitSlot::Pit1)
            && self
                .get(idx)
                .and_then(|e| e.pit1.as_ref())
                .is_some_and(|p| p.interest.name.len() < data.name.len());

        if let Some(entry) = self.get_mut(idx) {
            for &slot in matched {
                match slot {
                    PitSlot::Pit0 => entry.pit0 = None,
                    PitSlot::Pit1 => entry.pit1 = None,
                }
            }
        }

        if had_pit1_longer_name {
            // The Pit1 Interest was a prefix match; store the Data under
            // its own full name too, so a later exact-match Interest also
            // hits the CS directly.
            let exact_key = data.name.clone();
            if let Ok((exact_idx, _)) = self.insert_or_find(&exact_key) {
                self.cs_store(exact_idx, data, now);
                self.erase_if_empty(idx);
                return;
            }
        }

        self.cs_store(idx, data, now);
    }

    fn cs_store(&mut self, idx: SlabIndex, data: Data, now: Instant) {
        if self.get(idx).is_some_and(|e| e.cs.is_some()) {
            self.touch_cs(idx);
        } else {
            if self.cs_lru.len() >= self.cs_capacity {
                self.evict_cs_tail();
            }
            self.cs_lru.push_back(idx);
        }
        if let Some(entry) = self.get_mut(idx) {
            entry.cs = Some(CsEntry {
                data,
                inserted_at: now,
            });
        }
    }

    fn touch_cs(&mut self, idx: SlabIndex) {
        self.cs_lru.retain(|&i| i != idx);
        self.cs_lru.push_back(idx);
    }

    fn evict_cs_tail(&mut self) {
        if let Some(victim) = self.cs_lru.pop_front() {
            if let Some(entry) = self.get_mut(victim) {
                entry.cs = None;
            }
            self.erase_if_empty(victim);
        }
    }

    /// CS lookup honouring `CanBePrefix`/`MustBeFresh`.
    pub fn cs_find(&self, interest: &Interest) -> Option<&CsEntry> {
        let idx = self.find_key(interest.pcc_key())?;
        let cs = self.get(idx)?.cs.as_ref()?;
        if cs.data.can_satisfy(interest) {
            Some(cs)
        } else {
            None
        }
    }

    pub fn cs_len(&self) -> usize {
        self.cs_lru.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_udcn_common::ndn::Name;
    use std::time::Duration;

    fn interest(name: &str) -> Interest {
        Interest::new(Name::from_string(name))
    }

    #[test]
    fn token_bijection_holds_across_insert_and_erase() {
        let mut pcct = Pcct::new(16, 16);
        let mut tokens = Vec::new();
        for i in 0..10 {
            let key = Name::from_string(&format!("/n{i}"));
            let (idx, _) = pcct.insert_or_find(&key).unwrap();
            let token = pcct.add_token(idx).unwrap();
            tokens.push((idx, token));
        }
        for &(idx, token) in &tokens {
            assert_eq!(pcct.find_by_token(token), Some(idx));
        }
        // Erase half; tokens for the erased entries should vanish, the
        // rest should remain a clean bijection.
        for &(idx, token) in tokens.iter().step_by(2) {
            pcct.erase(idx);
            assert_eq!(pcct.find_by_token(token), None);
        }
        let remaining = tokens.iter().skip(1).step_by(2).count();
        assert_eq!(
            pcct.by_token.len(),
            remaining,
            "token index size must track live token-bearing entries"
        );
    }

    #[test]
    fn pit_insert_aggregates_two_interests_into_one_slot() {
        let mut pcct = Pcct::new(16, 16);
        let i1 = interest("/a/b");
        let i2 = interest("/a/b").with_nonce(999);

        let (idx1, slot1) = match pcct.pit_insert(&i1).unwrap() {
            PitInsertResult::Pit(idx, slot) => (idx, slot),
            _ => panic!("expected Pit result"),
        };
        let (idx2, slot2) = match pcct.pit_insert(&i2).unwrap() {
            PitInsertResult::Pit(idx, slot) => (idx, slot),
            _ => panic!("expected Pit result"),
        };
        assert_eq!(idx1, idx2);
        assert_eq!(slot1, slot2);

        let now = Instant::now();
        pcct.dn_rx_interest(idx1, slot1, FaceId(1), i1.nonce, 2000, 0, &[0x11], now);
        pcct.dn_rx_interest(idx2, slot2, FaceId(2), i2.nonce, 2000, 0, &[0x22], now);

        let entry = pcct.get(idx1).unwrap();
        assert_eq!(entry.pit(slot1).unwrap().downstream.len(), 2);
    }

    #[test]
    fn cs_hit_returned_for_matching_interest() {
        let mut pcct = Pcct::new(16, 16);
        let i = interest("/a/1").with_must_be_fresh(true);
        let data = Data::new(Name::from_string("/a/1"), "hello").with_ttl(5000);
        let (idx, _) = pcct.insert_or_find(&Name::from_string("/a/1")).unwrap();
        pcct.cs_store(idx, data, Instant::now());

        let hit = pcct.cs_find(&i);
        assert!(hit.is_some());
    }

    #[test]
    fn pit_expire_frees_slot_and_erases_empty_entry() {
        let mut pcct = Pcct::new(16, 16);
        let i = interest("/a/b");
        let (idx, slot) = match pcct.pit_insert(&i).unwrap() {
            PitInsertResult::Pit(idx, slot) => (idx, slot),
            _ => panic!(),
        };
        pcct.pit_expire(idx, slot);
        assert!(pcct.get(idx).is_none());
    }

    #[test]
    fn cs_lru_evicts_tail_under_pressure() {
        let mut pcct = Pcct::new(16, 2);
        for i in 0..3 {
            let key = Name::from_string(&format!("/n{i}"));
            let (idx, _) = pcct.insert_or_find(&key).unwrap();
            pcct.cs_store(idx, Data::new(key, "x"), Instant::now());
        }
        assert_eq!(pcct.cs_len(), 2);
    }

    #[test]
    fn table_full_reported_once_capacity_is_reached() {
        let mut pcct = Pcct::new(2, 2);
        pcct.insert_or_find(&Name::from_string("/a")).unwrap();
        pcct.insert_or_find(&Name::from_string("/b")).unwrap();
        let err = pcct.insert_or_find(&Name::from_string("/c"));
        assert!(matches!(err, Err(FwdError::PcctFull(2))));
    }

    #[test]
    fn expired_downstream_reclaimed_when_table_is_full() {
        let mut pcct = Pcct::new(16, 16);
        let i = interest("/a/b");
        let (idx, slot) = match pcct.pit_insert(&i).unwrap() {
            PitInsertResult::Pit(idx, slot) => (idx, slot),
            _ => panic!(),
        };
        let past = Instant::now();
        for n in 0..PIT_MAX_DOWNSTREAM as u32 {
            pcct.dn_rx_interest(idx, slot, FaceId(n as u16), n, 1, 0, &[], past);
        }
        std::thread::sleep(Duration::from_millis(5));
        let now = Instant::now();
        let got = pcct.dn_rx_interest(idx, slot, FaceId(99), 99, 5000, 0, &[], now);
        assert!(got.is_some(), "an expired downstream should have been reclaimed");
    }
}
