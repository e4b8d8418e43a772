//! Two-stage Longest-Prefix-Match FIB.
//!
//! Real entries live at their natural depth; additionally, every name of at
//! least [`START_DEPTH`] components that has a real entry *deeper* than
//! `START_DEPTH` gets a virtual placeholder at exactly `START_DEPTH`
//! components, pointing at the deepest such real entry — even when a real
//! entry also sits exactly at `START_DEPTH` itself (that entry remains
//! reachable through the capped linear scan, at its own depth). A lookup
//! first hashes the query's first `START_DEPTH` components once: a virtual
//! hit narrows the subsequent linear scan to `min(query len, deepest real
//! len)` instead of the query's full length, and a real hit at
//! `START_DEPTH` short-circuits the scan entirely only when no deeper
//! descendant exists at all. Shallower names (and stage-1 misses) fall back
//! to a plain linear scan from the capped depth down to 1.
//!
//! The control plane is the sole writer; it builds the next [`FibTable`]
//! snapshot from the current one and swaps it in with [`ArcSwap::store`].
//! A reader's critical section is exactly the lifetime of the
//! [`arc_swap::Guard`] returned by [`Fib::load`] — entries must not be
//! referenced once the guard is dropped, which is this forwarder's
//! equivalent of an RCU read-side critical section with the old snapshot
//! reclaimed once every outstanding guard has gone away.

use arc_swap::ArcSwap;
use rust_udcn_common::ndn::Name;
use rust_udcn_common::types::{FaceId, FibEntryId};
use smallvec::SmallVec;
use std::collections::HashMap;
use std::sync::Arc;

/// Depth, in name components, at which the fast stage-1 hash lives.
pub const START_DEPTH: usize = 8;
/// Upper bound on the nexthop list carried by one FIB entry.
pub const FIB_MAX_NEXTHOPS: usize = 8;
/// Size of the per-entry, per-worker strategy scratch block.
pub const FIB_SCRATCH_SIZE: usize = 16;

pub type NexthopList = SmallVec<[FaceId; FIB_MAX_NEXTHOPS]>;

/// Identifies which strategy governs a FIB entry; strategies themselves
/// are looked up by this id in a table the control plane owns (see
/// `crate::strategy`).
pub type StrategyId = u32;

/// Per-worker dynamic counters and strategy scratch for one FIB entry.
///
/// Cache-line aligned so that worker `i`'s writes never dirty the line a
/// neighbouring worker is reading, since each worker only ever touches its
/// own slot of the `Vec<FibEntryDyn>` indexed by [`FibEntryId`].
#[derive(Debug, Clone, Copy)]
#[repr(align(64))]
pub struct FibEntryDyn {
    pub n_rx_interests: u64,
    pub n_rx_data: u64,
    pub n_rx_nacks: u64,
    pub n_tx_interests: u64,
    pub scratch: [u8; FIB_SCRATCH_SIZE],
}

impl Default for FibEntryDyn {
    fn default() -> Self {
        Self {
            n_rx_interests: 0,
            n_rx_data: 0,
            n_rx_nacks: 0,
            n_tx_interests: 0,
            scratch: [0u8; FIB_SCRATCH_SIZE],
        }
    }
}

/// A real FIB entry: a name with at least one nexthop and a governing
/// strategy.
#[derive(Debug, Clone)]
pub struct FibEntry {
    pub id: FibEntryId,
    pub name: Name,
    pub seq_num: u64,
    pub nexthops: NexthopList,
    pub strategy: StrategyId,
}

#[derive(Debug, Clone)]
enum FibNode {
    Real(FibEntry),
    /// `height` = (deepest real descendant's component count) - `START_DEPTH`.
    Virtual { height: u8, real_entry: FibEntryId },
}

/// One immutable snapshot of the FIB, published via [`ArcSwap`].
#[derive(Debug, Clone, Default)]
pub struct FibTable {
    nodes: HashMap<FibEntryId, FibNode>,
    by_name: HashMap<Name, FibEntryId>,
    /// `prefix_hash(START_DEPTH) -> node id`, for names of >= START_DEPTH
    /// components that have *some* registered entry (real-at-depth or
    /// virtual).
    stage1: HashMap<u64, FibEntryId>,
    /// `stage2[depth][prefix_hash(depth)] -> real entry id`.
    stage2: Vec<HashMap<u64, FibEntryId>>,
    next_id: FibEntryId,
}

impl FibTable {
    fn ensure_stage2_depth(&mut self, depth: usize) {
        if self.stage2.len() <= depth {
            self.stage2.resize_with(depth + 1, HashMap::new);
        }
    }

    fn real(&self, id: FibEntryId) -> Option<&FibEntry> {
        match self.nodes.get(&id) {
            Some(FibNode::Real(e)) => Some(e),
            _ => None,
        }
    }

    /// Recompute the stage-1 slot for the `START_DEPTH`-component prefix
    /// `key`, following an insert or erase that may have changed which real
    /// entry is the deepest descendant of that prefix.
    ///
    /// A real entry sitting exactly at `START_DEPTH` does NOT shadow deeper
    /// descendants sharing its prefix: `stage2_search` already walks every
    /// depth down from its cap, so the real-at-`START_DEPTH` entry is still
    /// found at its own depth whenever a query diverges after it. The one
    /// case that must take the real-at-`START_DEPTH` shortcut is when no
    /// deeper descendant exists at all, since then there is nothing for a
    /// virtual node to point past.
    fn refresh_virtual(&mut self, key: &Name) {
        let hash = key.prefix_hash(key.len());
        let real_here = self.by_name.get(key).copied().filter(|&id| self.real(id).is_some());

        let deepest_descendant = self
            .by_name
            .iter()
            .filter(|(name, _)| name.len() > START_DEPTH && key.is_prefix_of(name))
            .filter_map(|(name, &id)| self.real(id).map(|e| (name.len(), e.id)))
            .max_by_key(|(len, _)| *len);

        match deepest_descendant {
            Some((len, real_id)) => {
                let virtual_id = self.alloc_virtual_node(len as u8 - START_DEPTH as u8, real_id);
                self.stage1.insert(hash, virtual_id);
            }
            None => match real_here {
                Some(id) => {
                    self.stage1.insert(hash, id);
                }
                None => {
                    self.stage1.remove(&hash);
                }
            },
        }
    }

    /// Virtual nodes are identified by the id of the real entry they point
    /// to plus a tag bit, so refreshing one doesn't need a fresh id
    /// allocation (and the node map naturally dedups repeated refreshes).
    fn alloc_virtual_node(&mut self, height: u8, real_entry: FibEntryId) -> FibEntryId {
        let virtual_id = real_entry | (1 << 31);
        self.nodes.insert(
            virtual_id,
            FibNode::Virtual {
                height,
                real_entry,
            },
        );
        virtual_id
    }

    /// Insert or update a real entry for `name`, returning its id.
    pub fn insert(&mut self, name: Name, nexthops: NexthopList, strategy: StrategyId) -> FibEntryId {
        if let Some(&id) = self.by_name.get(&name) {
            if let Some(FibNode::Real(entry)) = self.nodes.get_mut(&id) {
                entry.nexthops = nexthops;
                entry.strategy = strategy;
                entry.seq_num += 1;
                return id;
            }
        }

        let id = self.next_id;
        self.next_id += 1;
        let depth = name.len();
        self.ensure_stage2_depth(depth);
        let hash = name.prefix_hash(depth);
        self.stage2[depth].insert(hash, id);
        self.by_name.insert(name.clone(), id);
        self.nodes.insert(
            id,
            FibNode::Real(FibEntry {
                id,
                name: name.clone(),
                seq_num: 0,
                nexthops,
                strategy,
            }),
        );

        if depth >= START_DEPTH {
            let prefix8 = name.prefix(START_DEPTH);
            self.refresh_virtual(&prefix8);
        }
        id
    }

    /// Remove the real entry for `name`, if present.
    pub fn erase(&mut self, name: &Name) -> bool {
        let Some(id) = self.by_name.remove(name) else {
            return false;
        };
        self.nodes.remove(&id);
        let depth = name.len();
        if depth < self.stage2.len() {
            self.stage2[depth].remove(&name.prefix_hash(depth));
        }
        if depth >= START_DEPTH {
            let prefix8 = name.prefix(START_DEPTH);
            self.refresh_virtual(&prefix8);
        }
        true
    }

    fn stage2_search(&self, name: &Name, cap: usize) -> Option<&FibEntry> {
        for depth in (1..=cap).rev() {
            let Some(bucket) = self.stage2.get(depth) else {
                continue;
            };
            if let Some(&id) = bucket.get(&name.prefix_hash(depth)) {
                if let Some(entry) = self.real(id) {
                    if entry.name == name.prefix(depth) {
                        return Some(entry);
                    }
                }
            }
        }
        None
    }

    /// Longest-prefix match for `name`.
    pub fn lookup(&self, name: &Name) -> Option<&FibEntry> {
        let n = name.len();
        if n < START_DEPTH {
            return self.stage2_search(name, n);
        }

        let prefix8_hash = name.prefix_hash(START_DEPTH);
        match self.stage1.get(&prefix8_hash) {
            Some(&id) => match self.nodes.get(&id) {
                Some(FibNode::Real(entry)) if entry.name == name.prefix(START_DEPTH) => {
                    Some(entry)
                }
                Some(FibNode::Virtual { real_entry, .. }) => {
                    let real = self.real(*real_entry)?;
                    let cap = n.min(real.name.len());
                    self.stage2_search(name, cap)
                }
                _ => self.stage2_search(name, START_DEPTH - 1),
            },
            None => self.stage2_search(name, START_DEPTH - 1),
        }
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

/// Copy `entry.nexthops` into a fresh list, omitting any face id present in
/// `excluded` (typically just the ingress face, for loop avoidance). Order
/// is preserved.
pub fn filter_nexthops(entry: &FibEntry, excluded: &[FaceId]) -> NexthopList {
    entry
        .nexthops
        .iter()
        .copied()
        .filter(|nh| !excluded.contains(nh))
        .collect()
}

/// Single-writer, many-reader FIB. Readers call [`Fib::load`] to obtain a
/// snapshot `Guard`; the guard borrows as long as it's alive and must not
/// outlive the caller's lookup/forward step.
#[derive(Default)]
pub struct Fib {
    inner: ArcSwap<FibTable>,
}

impl Fib {
    pub fn new() -> Self {
        Self {
            inner: ArcSwap::from_pointee(FibTable::default()),
        }
    }

    /// Enter the read-side critical section: the returned guard is a cheap
    /// `Arc` snapshot that readers must drop before crossing any
    /// suspension point or handing control elsewhere.
    pub fn load(&self) -> arc_swap::Guard<Arc<FibTable>> {
        self.inner.load()
    }

    /// Publish a new entry (or update an existing one). Builds the next
    /// table from a clone of the current snapshot — cheap at control-plane
    /// write rates — then atomically swaps it in.
    pub fn insert(&self, name: Name, nexthops: NexthopList, strategy: StrategyId) -> FibEntryId {
        let mut next = (**self.inner.load()).clone();
        let id = next.insert(name, nexthops, strategy);
        self.inner.store(Arc::new(next));
        id
    }

    pub fn erase(&self, name: &Name) -> bool {
        let mut next = (**self.inner.load()).clone();
        let erased = next.erase(name);
        if erased {
            self.inner.store(Arc::new(next));
        }
        erased
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nh(ids: &[u16]) -> NexthopList {
        ids.iter().map(|&i| FaceId(i)).collect()
    }

    #[test]
    fn exact_and_shallow_lpm() {
        let fib = Fib::new();
        fib.insert(Name::from_string("/a"), nh(&[1]), 0);
        fib.insert(Name::from_string("/a/b"), nh(&[2]), 0);

        let guard = fib.load();
        assert_eq!(guard.lookup(&Name::from_string("/a/b/c")).unwrap().nexthops[0], FaceId(2));
        assert_eq!(guard.lookup(&Name::from_string("/a/x")).unwrap().nexthops[0], FaceId(1));
        assert!(guard.lookup(&Name::from_string("/z")).is_none());
    }

    #[test]
    fn long_names_use_virtual_entry_to_cap_stage2() {
        let fib = Fib::new();
        let deep = Name::from_string("/n0/n1/n2/n3/n4/n5/n6/n7/n8/n9");
        fib.insert(deep.clone(), nh(&[9]), 0);
        fib.insert(Name::from_string("/n0/n1/n2/n3/n4/n5"), nh(&[6]), 0);

        let guard = fib.load();
        // Exactly the deep real entry's own name still matches it.
        assert_eq!(guard.lookup(&deep).unwrap().nexthops[0], FaceId(9));
        // A query diverging after 6 components should fall back to the
        // shallower real entry, not the deep one.
        let diverges = Name::from_string("/n0/n1/n2/n3/n4/n5/zz");
        assert_eq!(guard.lookup(&diverges).unwrap().nexthops[0], FaceId(6));
    }

    #[test]
    fn real_entry_at_start_depth_does_not_shadow_deeper_descendant() {
        let fib = Fib::new();
        let shallow = Name::from_string("/a/b/c/d/e/f/g/h");
        let deep = Name::from_string("/a/b/c/d/e/f/g/h/i/j");
        fib.insert(shallow.clone(), nh(&[1]), 0);
        fib.insert(deep.clone(), nh(&[2]), 0);

        let guard = fib.load();
        // The longest inserted prefix of the deep query is the deep entry
        // itself, not the real entry sitting exactly at START_DEPTH.
        assert_eq!(guard.lookup(&deep).unwrap().nexthops[0], FaceId(2));
        // A query that diverges right after START_DEPTH still falls back
        // to the real entry sitting there.
        let diverges = Name::from_string("/a/b/c/d/e/f/g/h/zz");
        assert_eq!(guard.lookup(&diverges).unwrap().nexthops[0], FaceId(1));
        assert_eq!(guard.lookup(&shallow).unwrap().nexthops[0], FaceId(1));
    }

    #[test]
    fn erase_removes_entry_and_refreshes_virtual() {
        let fib = Fib::new();
        let deep = Name::from_string("/p0/p1/p2/p3/p4/p5/p6/p7/p8");
        fib.insert(deep.clone(), nh(&[1]), 0);
        assert!(fib.load().lookup(&deep).is_some());
        fib.erase(&deep);
        assert!(fib.load().lookup(&deep).is_none());
    }

    #[test]
    fn filter_nexthops_excludes_ingress_face_and_preserves_order() {
        let entry = FibEntry {
            id: 0,
            name: Name::from_string("/a"),
            seq_num: 0,
            nexthops: nh(&[1, 2, 3]),
            strategy: 0,
        };
        let out = filter_nexthops(&entry, &[FaceId(2)]);
        assert_eq!(&out[..], &[FaceId(1), FaceId(3)]);
    }

    #[test]
    fn lpm_matches_longest_inserted_prefix_across_many_queries() {
        let fib = Fib::new();
        let prefixes = ["/a", "/a/b", "/a/b/c", "/a/b/c/d/e/f/g/h/i"];
        for (i, p) in prefixes.iter().enumerate() {
            fib.insert(Name::from_string(p), nh(&[i as u16]), 0);
        }
        let guard = fib.load();
        let queries = [
            ("/a/b/c/d/e/f/g/h/i/j", 3),
            ("/a/b/c/x", 2),
            ("/a/b/zzz", 1),
            ("/a/zzzz", 0),
            ("/q", usize::MAX),
        ];
        for (q, expect_idx) in queries {
            let hit = guard.lookup(&Name::from_string(q));
            if expect_idx == usize::MAX {
                assert!(hit.is_none(), "expected no match for {q}");
            } else {
                assert_eq!(hit.unwrap().nexthops[0], FaceId(expect_idx as u16), "query {q}");
            }
        }
    }
}
