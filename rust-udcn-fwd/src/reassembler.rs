//! NDNLPv2 fragment reassembly.
//!
//! Multi-fragment packets are tracked by `seqNumBase` (the sequence number
//! of fragment 0) in a capacity-bounded table. When the table is full, the
//! least-recently-touched partial message is evicted to make room for a
//! new one, and its received fragments are counted as dropped. A message
//! whose `FragCount` changes mid-assembly, or that receives a duplicate
//! `FragIndex`, is treated as corrupt and discarded.
//!
//! Single-fragment packets never reach this table — callers should check
//! [`rust_udcn_common::lp::LpFragment::is_fragmented`] and skip the
//! reassembler entirely for the common case.

use bytes::{Bytes, BytesMut};
use rust_udcn_common::lp::LpFragment;
use std::collections::{HashMap, VecDeque};

struct PartialMessage {
    frag_count: u16,
    missing: u64,
    frags: Vec<Option<Bytes>>,
}

impl PartialMessage {
    fn new(frag_count: u16) -> Self {
        let missing = if frag_count >= 64 {
            u64::MAX
        } else {
            (1u64 << frag_count) - 1
        };
        Self {
            frag_count,
            missing,
            frags: vec![None; frag_count as usize],
        }
    }

    fn has_index(&self, index: u16) -> bool {
        self.missing & (1 << index) == 0
    }

    fn insert(&mut self, index: u16, payload: Bytes) {
        self.frags[index as usize] = Some(payload);
        self.missing &= !(1u64 << index);
    }

    fn is_complete(&self) -> bool {
        self.missing == 0
    }

    fn missing_count(&self) -> u64 {
        self.missing.count_ones() as u64
    }

    fn concat(self) -> Bytes {
        let mut out = BytesMut::new();
        for frag in self.frags.into_iter().flatten() {
            out.extend_from_slice(&frag);
        }
        out.freeze()
    }
}

/// Per-face fragment reassembly table.
pub struct Reassembler {
    capacity: usize,
    table: HashMap<u64, PartialMessage>,
    order: VecDeque<u64>,

    n_drop_fragments: u64,
    n_deliver_packets: u64,
    n_deliver_fragments: u64,
}

impl Reassembler {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            table: HashMap::new(),
            order: VecDeque::new(),
            n_drop_fragments: 0,
            n_deliver_packets: 0,
            n_deliver_fragments: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn dropped_fragments(&self) -> u64 {
        self.n_drop_fragments
    }

    pub fn delivered_packets(&self) -> u64 {
        self.n_deliver_packets
    }

    fn remove_from_order(&mut self, key: u64) {
        if let Some(pos) = self.order.iter().position(|&k| k == key) {
            self.order.remove(pos);
        }
    }

    fn touch(&mut self, key: u64) {
        self.remove_from_order(key);
        self.order.push_back(key);
    }

    fn evict_oldest(&mut self) {
        if let Some(key) = self.order.pop_front() {
            if let Some(evicted) = self.table.remove(&key) {
                self.n_drop_fragments += evicted.missing_count();
            }
        }
    }

    /// Hand a fragment to the reassembler. Returns the reassembled packet
    /// once every fragment of its message has arrived.
    pub fn accept(&mut self, seq_num_base: u64, frag: LpFragment, payload: Bytes) -> Option<Bytes> {
        debug_assert!(frag.is_fragmented());

        if let Some(pm) = self.table.get_mut(&seq_num_base) {
            if pm.frag_count != frag.frag_count {
                self.table.remove(&seq_num_base);
                self.remove_from_order(seq_num_base);
                self.n_drop_fragments += 1;
                return None;
            }
            if pm.has_index(frag.frag_index) {
                self.n_drop_fragments += 1;
                return None;
            }
            pm.insert(frag.frag_index, payload);
            if !pm.is_complete() {
                self.touch(seq_num_base);
                return None;
            }
            let pm = self.table.remove(&seq_num_base).unwrap();
            self.remove_from_order(seq_num_base);
            self.n_deliver_packets += 1;
            self.n_deliver_fragments += pm.frag_count as u64;
            return Some(pm.concat());
        }

        if self.table.len() >= self.capacity {
            self.evict_oldest();
        }
        let mut pm = PartialMessage::new(frag.frag_count);
        pm.insert(frag.frag_index, payload);
        let complete = pm.is_complete();
        if complete {
            self.n_deliver_packets += 1;
            self.n_deliver_fragments += pm.frag_count as u64;
            return Some(pm.concat());
        }
        self.table.insert(seq_num_base, pm);
        self.order.push_back(seq_num_base);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frag(index: u16, count: u16) -> LpFragment {
        LpFragment {
            seq_num_base: 100,
            frag_index: index,
            frag_count: count,
        }
    }

    #[test]
    fn reassembles_in_order_fragments() {
        let mut r = Reassembler::new(4);
        assert!(r.accept(100, frag(0, 2), Bytes::from_static(b"ab")).is_none());
        let out = r.accept(100, frag(1, 2), Bytes::from_static(b"cd")).unwrap();
        assert_eq!(&out[..], b"abcd");
        assert_eq!(r.delivered_packets(), 1);
    }

    #[test]
    fn reassembles_out_of_order_fragments() {
        let mut r = Reassembler::new(4);
        assert!(r.accept(100, frag(2, 3), Bytes::from_static(b"ef")).is_none());
        assert!(r.accept(100, frag(0, 3), Bytes::from_static(b"ab")).is_none());
        let out = r.accept(100, frag(1, 3), Bytes::from_static(b"cd")).unwrap();
        assert_eq!(&out[..], b"abcdef");
    }

    #[test]
    fn duplicate_frag_index_is_dropped() {
        let mut r = Reassembler::new(4);
        r.accept(100, frag(0, 2), Bytes::from_static(b"ab"));
        assert!(r.accept(100, frag(0, 2), Bytes::from_static(b"zz")).is_none());
        assert_eq!(r.dropped_fragments(), 1);
    }

    #[test]
    fn frag_count_mismatch_drops_partial_message() {
        let mut r = Reassembler::new(4);
        r.accept(100, frag(0, 3), Bytes::from_static(b"ab"));
        assert!(r.accept(100, frag(0, 2), Bytes::from_static(b"zz")).is_none());
        assert_eq!(r.len(), 0);
    }

    #[test]
    fn capacity_bound_evicts_oldest_partial_message() {
        let mut r = Reassembler::new(1);
        r.accept(1, LpFragment { seq_num_base: 1, frag_index: 0, frag_count: 2 }, Bytes::from_static(b"a"));
        r.accept(2, LpFragment { seq_num_base: 2, frag_index: 0, frag_count: 2 }, Bytes::from_static(b"b"));
        assert_eq!(r.len(), 1);
        assert_eq!(r.dropped_fragments(), 1);
    }
}
