//! The forwarder core: per-worker Interest/Data/Nack state machine tying
//! the FIB, PCCT, timer wheel and strategy ABI together.
//!
//! One [`WorkerFwd`] owns everything a single worker thread touches
//! exclusively (PCCT, timer wheel, per-entry strategy scratch) and holds a
//! shared handle to the one thing it doesn't own: the [`Fib`], whose
//! control-plane writer may be a different thread entirely. There is no
//! locking on the worker's own state because nothing else ever touches it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use smallvec::SmallVec;

use rust_udcn_common::ndn::{Data, Interest, Nack, NackReason};
use rust_udcn_common::types::{FaceId, FibEntryId};

use crate::fib::{filter_nexthops, Fib, FibEntryDyn, NexthopList, StrategyId};
use crate::pcct::{Pcct, PitFindResult, PitInsertResult, PitSlot, SlabIndex};
use crate::strategy::{MulticastStrategy, Strategy, StrategyCtx, StrategyEvent};
use crate::timer::{MinSched, TimerId};

/// One downstream face a satisfying Data (or a propagated Nack) should be
/// sent to, with the token/congestion fields the face layer needs to
/// rebuild its NDNLPv2 header.
#[derive(Debug, Clone)]
pub struct Downstream {
    pub face: FaceId,
    pub peer_token: SmallVec<[u8; 32]>,
    pub congestion_mark: u8,
}

#[derive(Debug, Clone)]
pub enum RxInterestOutcome {
    /// A Content Store entry already satisfies the Interest; send `data`
    /// back to the ingress face directly, no PIT entry involved.
    SatisfiedByCs(Data),
    /// Forward the Interest to `nexthops`, after the FIB lookup, loop-
    /// avoidance filter and strategy have all had a say.
    Forwarded(NexthopList),
    /// An identical Interest with a live out-record is already pending;
    /// this arrival was merged into the existing PIT entry.
    Aggregated,
    /// No forwardable nexthop exists (FIB miss, or the strategy/filter
    /// left nothing); a Nack should be sent downstream.
    Nacked(NackReason),
    /// The Interest was dropped outright with no Nack (PCCT/PIT at
    /// capacity, or its own downstream slot could not be reclaimed).
    Dropped(&'static str),
}

#[derive(Debug, Clone)]
pub enum RxDataOutcome {
    /// Deliver the Data to every listed downstream, deduplicated by face
    /// when more than one matched PIT slot named the same requester.
    Delivered(Vec<Downstream>),
    /// No PIT entry is waiting on this token/name; nothing to do but
    /// count it.
    Unsolicited,
}

#[derive(Debug, Clone)]
pub enum RxNackOutcome {
    /// Every upstream this Interest went to has now Nacked (or this was
    /// the only one); propagate to these downstreams and clear the entry.
    Propagated(Vec<FaceId>),
    /// A Nack for an out-record this worker has no matching PIT entry for.
    NoMatch,
    /// Either another upstream is still outstanding, or the reason code
    /// says not to propagate (`NackReason::Duplicate`).
    Suppressed,
}

/// Scheduled onto `WorkerFwd::timer`; the only event kind this forwarder's
/// wheel carries today.
#[derive(Debug, Clone, Copy)]
enum TimerEvent {
    PitExpiry(SlabIndex, PitSlot),
}

/// Per-worker forwarding state: everything exclusive to one worker thread,
/// plus a shared handle to the (single-writer, many-reader) FIB.
pub struct WorkerFwd {
    pub worker_id: u16,
    fib: Arc<Fib>,
    pcct: Pcct,
    timer: MinSched<TimerEvent>,
    strategies: HashMap<StrategyId, Arc<dyn Strategy>>,
    default_strategy: Arc<dyn Strategy>,
    fib_dyn: HashMap<FibEntryId, FibEntryDyn>,
    /// When `true` (the default), a satisfying Data matched by both the
    /// Pit0 and Pit1 slots of one PCCT entry is sent to each downstream
    /// face at most once per satisfaction pass. When `false`, the original
    /// forwarder's documented latent behavior is reproduced instead: a
    /// downstream present in both slots receives the Data twice.
    dedup_dn_satisfy: bool,
}

impl WorkerFwd {
    pub fn new(worker_id: u16, fib: Arc<Fib>, pcct_capacity: usize, cs_capacity: usize) -> Self {
        Self {
            worker_id,
            fib,
            pcct: Pcct::new(pcct_capacity, cs_capacity),
            timer: MinSched::new(12, Duration::from_millis(10)),
            strategies: HashMap::new(),
            default_strategy: Arc::new(MulticastStrategy),
            fib_dyn: HashMap::new(),
            dedup_dn_satisfy: true,
        }
    }

    /// Toggle the shared-downstream dedup behavior documented on
    /// [`WorkerFwd::dedup_dn_satisfy`].
    pub fn set_dedup_dn_satisfy(&mut self, dedup: bool) {
        self.dedup_dn_satisfy = dedup;
    }

    /// Register a strategy under `id`, consulted for FIB entries whose
    /// `strategy` field equals it. Entries whose id has no registered
    /// strategy fall back to the multicast default.
    pub fn register_strategy(&mut self, id: StrategyId, strategy: Arc<dyn Strategy>) {
        self.strategies.insert(id, strategy);
    }

    pub fn pcct(&self) -> &Pcct {
        &self.pcct
    }

    pub fn pcct_len(&self) -> usize {
        self.pcct.len()
    }

    /// Longest-prefix-match `interest.name`, or each of its forwarding
    /// hints in turn if the name itself is empty of hints, advancing
    /// `active_fh` to whichever hint produced a usable (post-filter,
    /// non-empty) nexthop set. Mirrors `FwFwd_LookupFib`'s name/FH split in
    /// the source forwarder.
    fn resolve_nexthops(
        &self,
        interest: &mut Interest,
        ingress: FaceId,
    ) -> Option<(FibEntryId, StrategyId, NexthopList)> {
        let guard = self.fib.load();

        if interest.forwarding_hint.is_empty() {
            let entry = guard.lookup(&interest.name)?;
            let nh = filter_nexthops(entry, &[ingress]);
            return (!nh.is_empty()).then_some((entry.id, entry.strategy, nh));
        }

        for i in 0..interest.forwarding_hint.len() {
            let Some(hint) = interest.forwarding_hint.get(i) else {
                continue;
            };
            if let Some(entry) = guard.lookup(hint) {
                let nh = filter_nexthops(entry, &[ingress]);
                if !nh.is_empty() {
                    interest.forwarding_hint.select_active(i);
                    return Some((entry.id, entry.strategy, nh));
                }
            }
        }
        None
    }

    /// Run the strategy governing `entry_id` against the filtered nexthop
    /// list, using (and persisting) that entry's per-worker scratch block.
    fn apply_strategy(
        &mut self,
        entry_id: FibEntryId,
        strategy_id: StrategyId,
        filtered: &NexthopList,
    ) -> NexthopList {
        let dyn_block = self.fib_dyn.entry(entry_id).or_default();
        dyn_block.n_rx_interests += 1;
        let mut ctx = StrategyCtx::new(dyn_block);
        let strategy = self
            .strategies
            .get(&strategy_id)
            .unwrap_or(&self.default_strategy);
        strategy.invoke(&StrategyEvent::RxInterest { nexthops: filtered }, &mut ctx);
        ctx.decision.nexthops
    }

    /// Cancel `timer_id` if set, and clear the slot that held it.
    fn cancel_timer(&mut self, timer_id: &mut Option<TimerId>) {
        if let Some(id) = timer_id.take() {
            self.timer.cancel(id);
        }
    }

    /// Reschedule `(idx, slot)`'s expiry to fire when its longest-lived
    /// downstream record expires, cancelling any previous timer. A PIT
    /// entry with no live downstream left is not rescheduled (it is about
    /// to be reaped by the caller instead).
    fn reschedule_expiry(&mut self, idx: SlabIndex, slot: PitSlot, now: Instant) {
        let Some(entry) = self.pcct.get_mut(idx) else {
            return;
        };
        let Some(pit) = entry.pit_mut(slot) else {
            return;
        };
        let longest = pit.downstream.iter().map(|d| d.expiry).max();
        let mut old_timer = pit.expiry_timer.take();
        self.cancel_timer(&mut old_timer);

        if let Some(expiry) = longest {
            let after = expiry.saturating_duration_since(now);
            let timer_id = self.timer.schedule_after(after, TimerEvent::PitExpiry(idx, slot));
            if let Some(entry) = self.pcct.get_mut(idx) {
                if let Some(pit) = entry.pit_mut(slot) {
                    pit.expiry_timer = timer_id;
                }
            }
        }
    }

    /// Process an arriving Interest from `ingress`. `peer_token` is the PIT
    /// token the sender itself attached (if any — absent on a local app
    /// face); `congestion_mark` is this Interest's NDNLPv2 congestion
    /// field.
    pub fn rx_interest(
        &mut self,
        ingress: FaceId,
        mut interest: Interest,
        peer_token: &[u8],
        congestion_mark: u8,
        now: Instant,
    ) -> RxInterestOutcome {
        let insert = match self.pcct.pit_insert(&interest) {
            Ok(r) => r,
            Err(_) => return RxInterestOutcome::Dropped("pcct-insert-error"),
        };

        let (idx, slot) = match insert {
            PitInsertResult::Cs(idx) => {
                let data = self
                    .pcct
                    .get(idx)
                    .and_then(|e| e.cs.as_ref())
                    .map(|cs| cs.data.clone());
                return match data {
                    Some(data) => RxInterestOutcome::SatisfiedByCs(data),
                    None => RxInterestOutcome::Dropped("cs-slot-vanished"),
                };
            }
            PitInsertResult::Full => return RxInterestOutcome::Nacked(NackReason::Congestion),
            PitInsertResult::Pit(idx, slot) => (idx, slot),
        };

        let was_new = self
            .pcct
            .get(idx)
            .and_then(|e| e.pit(slot))
            .is_some_and(|p| p.upstream.is_empty());

        let merged = self.pcct.dn_rx_interest(
            idx,
            slot,
            ingress,
            interest.nonce,
            interest.lifetime_ms,
            congestion_mark,
            peer_token,
            now,
        );
        if merged.is_none() {
            if was_new {
                self.pcct.pit_expire(idx, slot);
            }
            return RxInterestOutcome::Dropped("downstream-table-full");
        }

        if !was_new {
            self.reschedule_expiry(idx, slot, now);
            return RxInterestOutcome::Aggregated;
        }

        let Some((entry_id, strategy_id, filtered)) = self.resolve_nexthops(&mut interest, ingress)
        else {
            self.pcct.pit_expire(idx, slot);
            return RxInterestOutcome::Nacked(NackReason::NoRoute);
        };

        let chosen = self.apply_strategy(entry_id, strategy_id, &filtered);
        if chosen.is_empty() {
            self.pcct.pit_expire(idx, slot);
            return RxInterestOutcome::Nacked(NackReason::NoRoute);
        }

        for &face in &chosen {
            self.pcct.up_tx_interest(idx, slot, face, now);
        }
        self.reschedule_expiry(idx, slot, now);
        RxInterestOutcome::Forwarded(chosen)
    }

    /// Process arriving Data carrying `pcc_token` (the 48-bit value this
    /// worker's own PCCT assigned, already unpacked from the wire
    /// `FwToken` by the caller).
    pub fn rx_data(
        &mut self,
        data: Data,
        pcc_token: u64,
        congestion_mark: u8,
        now: Instant,
    ) -> RxDataOutcome {
        let (idx, matched) = match self.pcct.find_by_data(&data, pcc_token) {
            PitFindResult::None => return RxDataOutcome::Unsolicited,
            // No digest helper is wired in (out of scope); treat as
            // unverifiable rather than guess at the digest.
            PitFindResult::NeedDigest => return RxDataOutcome::Unsolicited,
            PitFindResult::Matched(idx, matched) => (idx, matched),
        };

        let mut downstreams: Vec<Downstream> = Vec::new();
        let mut seen: SmallVec<[FaceId; 8]> = SmallVec::new();

        for &slot in &matched {
            if let Some(entry) = self.pcct.get_mut(idx) {
                if let Some(pit) = entry.pit_mut(slot) {
                    let mut timer = pit.expiry_timer.take();
                    self.cancel_timer(&mut timer);
                    for d in &pit.downstream {
                        if self.dedup_dn_satisfy && seen.contains(&d.face) {
                            continue;
                        }
                        seen.push(d.face);
                        downstreams.push(Downstream {
                            face: d.face,
                            peer_token: d.peer_token.clone(),
                            congestion_mark: d.congestion_mark.max(congestion_mark),
                        });
                    }
                }
            }
        }

        self.pcct.cs_insert(idx, &matched, data, now);
        RxDataOutcome::Delivered(downstreams)
    }

    /// Process an arriving Nack from `ingress`, carrying the 48-bit token
    /// this worker assigned the Interest it is nacking.
    pub fn rx_nack(&mut self, ingress: FaceId, nack: Nack, pcc_token: u64) -> RxNackOutcome {
        let Some(idx) = self.pcct.find_by_token(pcc_token) else {
            return RxNackOutcome::NoMatch;
        };
        let Some(entry) = self.pcct.get(idx) else {
            return RxNackOutcome::NoMatch;
        };

        let slot = if entry.pit0.as_ref().is_some_and(|p| p.interest.name == nack.interest.name) {
            PitSlot::Pit0
        } else if entry.pit1.as_ref().is_some_and(|p| p.interest.name == nack.interest.name) {
            PitSlot::Pit1
        } else {
            return RxNackOutcome::NoMatch;
        };

        let Some(entry) = self.pcct.get_mut(idx) else {
            return RxNackOutcome::NoMatch;
        };
        let Some(pit) = entry.pit_mut(slot) else {
            return RxNackOutcome::NoMatch;
        };
        pit.upstream.retain(|u| u.face != ingress);

        if !pit.upstream.is_empty() {
            return RxNackOutcome::Suppressed;
        }
        if !crate::strategy::should_propagate(&nack) {
            self.pcct.pit_expire(idx, slot);
            return RxNackOutcome::Suppressed;
        }

        let downstreams: Vec<FaceId> = pit.downstream.iter().map(|d| d.face).collect();
        self.pcct.pit_expire(idx, slot);
        RxNackOutcome::Propagated(downstreams)
    }

    /// Drive expired PIT entries out of the table; call periodically (or
    /// once per poll-loop iteration) with the current time.
    pub fn poll_timers(&mut self, now: Instant) -> usize {
        let fired = self.timer.trigger(now);
        let n = fired.len();
        for (_, event) in fired {
            let TimerEvent::PitExpiry(idx, slot) = event;
            self.pcct.pit_expire(idx, slot);
        }
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fib::FIB_MAX_NEXTHOPS;
    use rust_udcn_common::ndn::Name;
    use smallvec::smallvec;

    fn fwd() -> WorkerFwd {
        WorkerFwd::new(0, Arc::new(Fib::new()), 64, 64)
    }

    fn nexthops(ids: &[u16]) -> NexthopList {
        let mut v: NexthopList = SmallVec::with_capacity(ids.len().min(FIB_MAX_NEXTHOPS));
        for &id in ids {
            v.push(FaceId(id));
        }
        v
    }

    // S1: a plain Interest with a FIB match is forwarded to the filtered
    // nexthop set.
    #[test]
    fn s1_forwards_on_fib_match() {
        let mut f = fwd();
        f.fib.insert(Name::from_string("/a"), nexthops(&[2, 3]), 0);
        let i = Interest::new(Name::from_string("/a/b"));
        let outcome = f.rx_interest(FaceId(1), i, &[], 0, Instant::now());
        match outcome {
            RxInterestOutcome::Forwarded(nh) => {
                assert_eq!(&nh[..], &[FaceId(2), FaceId(3)]);
            }
            other => panic!("expected Forwarded, got {other:?}"),
        }
    }

    // S2: a FIB miss produces a NoRoute Nack, not a silent drop.
    #[test]
    fn s2_no_route_nacks() {
        let mut f = fwd();
        let i = Interest::new(Name::from_string("/nowhere"));
        let outcome = f.rx_interest(FaceId(1), i, &[], 0, Instant::now());
        assert!(matches!(outcome, RxInterestOutcome::Nacked(NackReason::NoRoute)));
    }

    // S3: a second Interest for the same name while the first is still
    // pending aggregates instead of re-forwarding.
    #[test]
    fn s3_aggregates_duplicate_pending_interest() {
        let mut f = fwd();
        f.fib.insert(Name::from_string("/a"), nexthops(&[2]), 0);
        let now = Instant::now();
        let i1 = Interest::new(Name::from_string("/a/b")).with_nonce(1);
        let i2 = Interest::new(Name::from_string("/a/b")).with_nonce(2);

        let first = f.rx_interest(FaceId(1), i1, &[], 0, now);
        assert!(matches!(first, RxInterestOutcome::Forwarded(_)));
        let second = f.rx_interest(FaceId(10), i2, &[], 0, now);
        assert!(matches!(second, RxInterestOutcome::Aggregated));
    }

    // S4: Data satisfying a PIT entry is delivered to every distinct
    // downstream face, deduplicated when both PIT slots name the same
    // requester.
    #[test]
    fn s4_data_delivered_to_all_downstreams_deduped() {
        let mut f = fwd();
        f.fib.insert(Name::from_string("/a"), nexthops(&[9]), 0);
        let now = Instant::now();

        let i_exact = Interest::new(Name::from_string("/a/b")).with_nonce(1);
        f.rx_interest(FaceId(1), i_exact, &[0xaa], 0, now);

        let i_prefix = Interest::new(Name::from_string("/a/b"))
            .with_nonce(2)
            .with_can_be_prefix(true);
        f.rx_interest(FaceId(2), i_prefix, &[0xbb], 0, now);
        // Same requester, different slot path (Pit0 exact vs Pit1 prefix)
        // would require a distinct name; re-send of face 1 on the prefix
        // slot exercises the dedup path directly instead.
        let i_prefix_dup = Interest::new(Name::from_string("/a/b"))
            .with_nonce(3)
            .with_can_be_prefix(true);
        f.rx_interest(FaceId(1), i_prefix_dup, &[0xcc], 0, now);

        let pcc_token = f
            .pcct
            .find_key(&Name::from_string("/a/b"))
            .and_then(|idx| f.pcct.get(idx))
            .and_then(|e| e.token)
            .unwrap();

        let data = Data::new(Name::from_string("/a/b"), "payload").with_ttl(5000);
        let outcome = f.rx_data(data, pcc_token, 0, now);
        match outcome {
            RxDataOutcome::Delivered(downstreams) => {
                let faces: Vec<FaceId> = downstreams.iter().map(|d| d.face).collect();
                assert_eq!(faces.len(), 2, "face 1 must be deduplicated: {faces:?}");
                assert!(faces.contains(&FaceId(1)));
                assert!(faces.contains(&FaceId(2)));
            }
            other => panic!("expected Delivered, got {other:?}"),
        }
    }

    // With dedup_dn_satisfy turned off, a downstream present in both the
    // Pit0 and Pit1 slots of the same entry receives the Data once per
    // matched slot, reproducing the original's documented latent behavior.
    #[test]
    fn dedup_dn_satisfy_false_double_sends_shared_downstream() {
        let mut f = fwd();
        f.set_dedup_dn_satisfy(false);
        f.fib.insert(Name::from_string("/a"), nexthops(&[9]), 0);
        let now = Instant::now();

        let i_exact = Interest::new(Name::from_string("/a/b")).with_nonce(1);
        f.rx_interest(FaceId(1), i_exact, &[0xaa], 0, now);
        let i_prefix = Interest::new(Name::from_string("/a/b"))
            .with_nonce(2)
            .with_can_be_prefix(true);
        f.rx_interest(FaceId(1), i_prefix, &[0xbb], 0, now);

        let pcc_token = f
            .pcct
            .find_key(&Name::from_string("/a/b"))
            .and_then(|idx| f.pcct.get(idx))
            .and_then(|e| e.token)
            .unwrap();

        let data = Data::new(Name::from_string("/a/b"), "payload").with_ttl(5000);
        let outcome = f.rx_data(data, pcc_token, 0, now);
        match outcome {
            RxDataOutcome::Delivered(downstreams) => {
                let faces: Vec<FaceId> = downstreams.iter().map(|d| d.face).collect();
                assert_eq!(faces, vec![FaceId(1), FaceId(1)]);
            }
            other => panic!("expected Delivered, got {other:?}"),
        }
    }

    // S5: a Nack from the only outstanding upstream propagates downstream
    // and clears the PIT entry.
    #[test]
    fn s5_nack_from_sole_upstream_propagates_and_clears() {
        let mut f = fwd();
        f.fib.insert(Name::from_string("/a"), nexthops(&[9]), 0);
        let now = Instant::now();
        let i = Interest::new(Name::from_string("/a/b")).with_nonce(1);
        f.rx_interest(FaceId(1), i.clone(), &[], 0, now);

        let pcc_token = f
            .pcct
            .find_key(&Name::from_string("/a/b"))
            .and_then(|idx| f.pcct.get(idx))
            .and_then(|e| e.token)
            .unwrap();

        let nack = rust_udcn_common::ndn::make_nack(i, NackReason::NoRoute);
        let outcome = f.rx_nack(FaceId(9), nack, pcc_token);
        match outcome {
            RxNackOutcome::Propagated(downstreams) => {
                assert_eq!(downstreams, vec![FaceId(1)]);
            }
            other => panic!("expected Propagated, got {other:?}"),
        }
        assert_eq!(f.pcct.find_key(&Name::from_string("/a/b")), None);
    }

    #[test]
    fn cs_hit_short_circuits_pit() {
        let mut f = fwd();
        let now = Instant::now();
        let name = Name::from_string("/cached");
        let (idx, _) = f.pcct.insert_or_find(&name).unwrap();
        f.pcct.cs_store(idx, Data::new(name.clone(), "x").with_ttl(5000), now);

        let i = Interest::new(name);
        let outcome = f.rx_interest(FaceId(1), i, &[], 0, now);
        assert!(matches!(outcome, RxInterestOutcome::SatisfiedByCs(_)));
    }

    #[test]
    fn unsolicited_data_is_reported_as_such() {
        let mut f = fwd();
        let data = Data::new(Name::from_string("/nobody/asked"), "x");
        let outcome = f.rx_data(data, 0xdead_beef, 0, Instant::now());
        assert!(matches!(outcome, RxDataOutcome::Unsolicited));
    }

    #[test]
    fn forwarding_hint_is_tried_when_name_has_no_route() {
        let mut f = fwd();
        f.fib.insert(Name::from_string("/via/relay"), nexthops(&[7]), 0);
        let i = Interest::new(Name::from_string("/unrouted/content"))
            .with_forwarding_hint(vec![Name::from_string("/via/relay")]);
        let outcome = f.rx_interest(FaceId(1), i, &[], 0, Instant::now());
        assert!(matches!(outcome, RxInterestOutcome::Forwarded(_)));
    }

    #[test]
    fn poll_timers_expires_pit_entry_after_lifetime() {
        let mut f = fwd();
        f.fib.insert(Name::from_string("/a"), nexthops(&[9]), 0);
        let now = Instant::now();
        let i = Interest::new(Name::from_string("/a/b")).with_lifetime(10);
        f.rx_interest(FaceId(1), i, &[], 0, now);
        assert!(f.pcct.find_key(&Name::from_string("/a/b")).is_some());

        let later = now + Duration::from_millis(500);
        let expired = f.poll_timers(later);
        assert_eq!(expired, 1);
        assert!(f.pcct.find_key(&Name::from_string("/a/b")).is_none());
    }

    #[test]
    fn round_robin_strategy_is_honoured_when_registered() {
        use crate::strategy::RoundRobinStrategy;
        let mut f = fwd();
        let id = f.fib.insert(Name::from_string("/a"), nexthops(&[1, 2, 3]), 7);
        let _ = id;
        f.register_strategy(7, Arc::new(RoundRobinStrategy));

        let i1 = Interest::new(Name::from_string("/a/x")).with_nonce(1);
        let first = f.rx_interest(FaceId(9), i1, &[], 0, Instant::now());
        let RxInterestOutcome::Forwarded(nh1) = first else {
            panic!("expected Forwarded")
        };
        assert_eq!(nh1.len(), 1);
    }
}
