//! Strategy ABI: the narrow interface the forwarder core exposes to
//! pluggable forwarding strategies.
//!
//! The original forwarder dispatches to a strategy through a wide,
//! function-pointer-style context struct with a `switch` over an event
//! kind. Here that becomes a sum type, [`StrategyEvent`], matched by a
//! single trait method — the "callbacks -> tagged events" redesign the
//! specification calls for. Only the two default strategies named in the
//! specification (round-robin, multicast) are implemented; the bytecode
//! runtime that lets operators load arbitrary strategies is out of scope.

use crate::fib::{FibEntryDyn, NexthopList, FIB_SCRATCH_SIZE};
use rust_udcn_common::ndn::{Nack, NackReason};
use rust_udcn_common::types::FaceId;

/// Events a strategy may be asked to handle, carrying exactly the
/// information relevant to that event (as opposed to one wide struct with
/// most fields unused per call).
#[derive(Debug, Clone)]
pub enum StrategyEvent<'a> {
    RxInterest { nexthops: &'a NexthopList },
    RxData,
    RxNack { reason: NackReason, live_nexthop_count: usize },
    TimerExpiry,
}

/// A decision a strategy makes for `RX_INTEREST`: which of the filtered
/// nexthops to actually forward on, in what order.
#[derive(Debug, Clone, Default)]
pub struct ForwardDecision {
    pub nexthops: NexthopList,
}

/// Mutable context handed to a strategy invocation: the entry's per-worker
/// scratch block, plus an accumulator for nexthops the strategy decides to
/// forward on (only consulted for `RX_INTEREST`).
pub struct StrategyCtx<'a> {
    pub dyn_block: &'a mut FibEntryDyn,
    pub decision: ForwardDecision,
}

impl<'a> StrategyCtx<'a> {
    pub fn new(dyn_block: &'a mut FibEntryDyn) -> Self {
        Self {
            dyn_block,
            decision: ForwardDecision::default(),
        }
    }

    pub fn scratch(&self) -> &[u8; FIB_SCRATCH_SIZE] {
        &self.dyn_block.scratch
    }

    pub fn scratch_mut(&mut self) -> &mut [u8; FIB_SCRATCH_SIZE] {
        &mut self.dyn_block.scratch
    }
}

/// Non-zero status codes a strategy may return from [`Strategy::invoke`];
/// folded into traces by the caller. `Ok` is always `0`.
pub type StrategyStatus = u64;

pub trait Strategy: Send + Sync {
    fn invoke(&self, event: &StrategyEvent<'_>, ctx: &mut StrategyCtx<'_>) -> StrategyStatus;

    fn name(&self) -> &'static str;
}

/// Forwards an Interest to every filtered nexthop, unconditionally. This is
/// the specification's "default strategy" for `RX_INTEREST`.
#[derive(Debug, Default)]
pub struct MulticastStrategy;

impl Strategy for MulticastStrategy {
    fn invoke(&self, event: &StrategyEvent<'_>, ctx: &mut StrategyCtx<'_>) -> StrategyStatus {
        if let StrategyEvent::RxInterest { nexthops } = event {
            ctx.decision.nexthops = (*nexthops).clone();
        }
        0
    }

    fn name(&self) -> &'static str {
        "multicast"
    }
}

/// Forwards to exactly one nexthop per Interest, cycling through the
/// filtered set. The cursor is the entry's strategy scratch, interpreted
/// as a little-endian `u32` at offset 0 — this is what the specification
/// calls "per-FIB scratch for the next-nexthop index".
#[derive(Debug, Default)]
pub struct RoundRobinStrategy;

impl RoundRobinStrategy {
    fn read_cursor(ctx: &StrategyCtx<'_>) -> u32 {
        u32::from_le_bytes(ctx.scratch()[0..4].try_into().unwrap())
    }

    fn write_cursor(ctx: &mut StrategyCtx<'_>, value: u32) {
        ctx.scratch_mut()[0..4].copy_from_slice(&value.to_le_bytes());
    }
}

impl Strategy for RoundRobinStrategy {
    fn invoke(&self, event: &StrategyEvent<'_>, ctx: &mut StrategyCtx<'_>) -> StrategyStatus {
        if let StrategyEvent::RxInterest { nexthops } = event {
            if nexthops.is_empty() {
                return 0;
            }
            let cursor = Self::read_cursor(ctx) as usize % nexthops.len();
            ctx.decision.nexthops = NexthopList::from_elem(nexthops[cursor], 1);
            Self::write_cursor(ctx, (cursor as u32 + 1) % nexthops.len() as u32);
        }
        0
    }

    fn name(&self) -> &'static str {
        "round-robin"
    }
}

/// Turn a live Nack propagation decision into the set of faces that should
/// receive a cloned Nack; used by `forwarder::rx_nack`. Kept here, not in
/// `forwarder.rs`, since it is strategy-adjacent policy rather than core
/// state-machine plumbing.
pub fn should_propagate(nack: &Nack) -> bool {
    !matches!(nack.reason, NackReason::Duplicate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    #[test]
    fn multicast_forwards_to_every_filtered_nexthop() {
        let mut dyn_block = FibEntryDyn::default();
        let mut ctx = StrategyCtx::new(&mut dyn_block);
        let nexthops: NexthopList = smallvec![FaceId(1), FaceId(2), FaceId(3)];
        MulticastStrategy.invoke(&StrategyEvent::RxInterest { nexthops: &nexthops }, &mut ctx);
        assert_eq!(&ctx.decision.nexthops[..], &[FaceId(1), FaceId(2), FaceId(3)]);
    }

    #[test]
    fn round_robin_cycles_through_nexthops() {
        let mut dyn_block = FibEntryDyn::default();
        let nexthops: NexthopList = smallvec![FaceId(1), FaceId(2), FaceId(3)];
        let strategy = RoundRobinStrategy;

        let mut picks = Vec::new();
        for _ in 0..4 {
            let mut ctx = StrategyCtx::new(&mut dyn_block);
            strategy.invoke(&StrategyEvent::RxInterest { nexthops: &nexthops }, &mut ctx);
            picks.push(ctx.decision.nexthops[0]);
        }
        assert_eq!(picks, vec![FaceId(1), FaceId(2), FaceId(3), FaceId(1)]);
    }
}
