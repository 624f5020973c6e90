//! Per-discipline routing decisions.
//!
//! The router is pure: given the local peer's zone/neighbor view and a
//! request, it decides whether to handle locally, forward to one
//! neighbor, or fan out to several. The peer actor executes the
//! decision. Next-hop selection is a pluggable strategy whose only
//! obligation is to forward only toward zones that could still
//! intersect the key; [`GreedyNextHop`] is the shipped implementation.

use crate::message::{Discipline, HopRecord, Request, RoutingMemory};
use crate::validator::ConstraintsKey;
use quadcan_types::coords::{Coordinate, Point, DIM};
use quadcan_types::peer::{NeighborTable, PeerId};
use quadcan_types::zone::Zone;
use std::cmp::Ordering;
use std::sync::Arc;

/// What the router decided to do with a request at this peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RoutingDecision {
    /// Run the local action and respond: the terminal peer for a
    /// unicast, a satisfied (or dead-ended) anycast.
    Deliver,
    /// Forward to a single neighbor.
    Forward(PeerId),
    /// Fan out to several neighbors; empty means this peer is a leaf
    /// of the spanning flood.
    FanOut(Vec<PeerId>),
    /// No neighbor can make progress; drop the request. The caller
    /// observes this only as a timeout.
    Unroutable,
}

/// Pluggable next-hop selection.
pub trait NextHopStrategy: 'static + Send + Sync {
    /// One neighbor making progress toward a full point, or `None`.
    fn toward_point(
        &self,
        local: &Zone,
        table: &NeighborTable,
        target: &Point,
    ) -> Option<PeerId>;

    /// One unvisited neighbor for an anycast pattern, or `None` when no
    /// candidates remain.
    fn toward_pattern(
        &self,
        local: &Zone,
        table: &NeighborTable,
        pattern: &Coordinate,
        visited: &[HopRecord],
    ) -> Option<PeerId>;

    /// Every neighbor (except `exclude`) whose zone could still
    /// intersect the key, up to `limit`.
    fn spanning_targets(
        &self,
        table: &NeighborTable,
        key: &Coordinate,
        exclude: Option<&PeerId>,
        limit: usize,
    ) -> Vec<PeerId>;
}

/// Directional greedy selection over the rectilinear partition: on the
/// first dimension where the local zone misses the key, move to the
/// adjacent neighbor on the key's side. Each hop strictly narrows the
/// gap on that dimension, so unicast routing terminates.
#[derive(Debug, Default)]
pub struct GreedyNextHop;

impl GreedyNextHop {
    /// The neighbor strictly on `target`'s side of the local span on
    /// `dim`, closest to the local zone.
    fn directional<'t>(
        &self,
        local: &Zone,
        table: &'t NeighborTable,
        dim: usize,
        side: Ordering,
        skip: &dyn Fn(&PeerId) -> bool,
    ) -> Option<&'t quadcan_types::peer::Neighbor> {
        let mut best: Option<&quadcan_types::peer::Neighbor> = None;
        for n in table.activated() {
            if skip(&n.id) {
                continue;
            }
            let span = n.zone.span(dim);
            let local_span = local.span(dim);
            let (candidate, closer) = match side {
                // target is below our span: candidates sit entirely
                // below us; closest has the greatest upper bound
                Ordering::Less => (
                    span.is_below(local_span),
                    best.map_or(true, |b| span.upper() > b.zone.span(dim).upper()),
                ),
                // target is above our span: candidates sit entirely
                // above us; closest has the least lower bound
                Ordering::Greater => (
                    local_span.is_below(span),
                    best.map_or(true, |b| span.lower() < b.zone.span(dim).lower()),
                ),
                Ordering::Equal => (false, false),
            };
            if candidate && closer {
                best = Some(n);
            }
        }
        best
    }
}

impl NextHopStrategy for GreedyNextHop {
    fn toward_point(
        &self,
        local: &Zone,
        table: &NeighborTable,
        target: &Point,
    ) -> Option<PeerId> {
        // a neighbor already containing the point wins outright
        if let Some(n) = table.activated().find(|n| n.zone.contains_point(target)) {
            return Some(n.id.clone());
        }
        for dim in 0..DIM {
            let side = local.contains_on(dim, target.elem(dim));
            if side == Ordering::Equal {
                continue;
            }
            if let Some(n) = self.directional(local, table, dim, side, &|_| false) {
                return Some(n.id.clone());
            }
        }
        None
    }

    fn toward_pattern(
        &self,
        local: &Zone,
        table: &NeighborTable,
        pattern: &Coordinate,
        visited: &[HopRecord],
    ) -> Option<PeerId> {
        let seen = |id: &PeerId| visited.iter().any(|h| &h.peer == id);

        // an unvisited neighbor that already matches wins outright
        if let Some(n) = table
            .activated()
            .find(|n| !seen(&n.id) && n.zone.could_intersect(pattern))
        {
            return Some(n.id.clone());
        }
        // otherwise move toward the pattern on its first missed
        // constrained dimension
        for (dim, elem) in pattern.constrained() {
            let side = local.contains_on(dim, elem);
            if side == Ordering::Equal {
                continue;
            }
            if let Some(n) = self.directional(local, table, dim, side, &|id| seen(id)) {
                return Some(n.id.clone());
            }
        }
        // last resort: explore any unvisited neighbor
        table
            .activated()
            .find(|n| !seen(&n.id))
            .map(|n| n.id.clone())
    }

    fn spanning_targets(
        &self,
        table: &NeighborTable,
        key: &Coordinate,
        exclude: Option<&PeerId>,
        limit: usize,
    ) -> Vec<PeerId> {
        let mut targets: Vec<PeerId> = table
            .activated()
            .filter(|n| Some(&n.id) != exclude)
            .filter(|n| n.zone.could_intersect(key))
            .map(|n| n.id.clone())
            .collect();
        targets.truncate(limit);
        targets
    }
}

/// The per-peer router table: one strategy instance shared by all four
/// disciplines, built once at peer spawn and passed by reference - no
/// process-wide registry.
#[derive(Clone)]
pub struct Routers {
    strategy: Arc<dyn NextHopStrategy>,
    fan_out_limit: usize,
}

impl Routers {
    /// Build a router table around a next-hop strategy.
    pub fn new(strategy: Arc<dyn NextHopStrategy>, fan_out_limit: usize) -> Self {
        Self {
            strategy,
            fan_out_limit,
        }
    }

    /// Decide what to do with `req` at a peer owning `zone` with the
    /// given neighbor view.
    pub fn decide(
        &self,
        zone: &Zone,
        neighbors: &NeighborTable,
        req: &Request,
    ) -> RoutingDecision {
        match req.discipline {
            Discipline::Forward => {
                let target = match &req.key {
                    ConstraintsKey::Target(p) => p,
                    _ => {
                        tracing::warn!(id = %req.id, "forward request without point target");
                        return RoutingDecision::Unroutable;
                    }
                };
                if req.key.validates_zone(zone) {
                    RoutingDecision::Deliver
                } else {
                    match self.strategy.toward_point(zone, neighbors, target) {
                        Some(next) => RoutingDecision::Forward(next),
                        None => RoutingDecision::Unroutable,
                    }
                }
            }
            Discipline::Anycast => {
                if req.key.validates_zone(zone) {
                    return RoutingDecision::Deliver;
                }
                let visited: &[HopRecord] = match &req.memory {
                    RoutingMemory::Anycast { trail } => trail,
                    _ => &[],
                };
                let pattern = req.key.as_coordinate();
                match self
                    .strategy
                    .toward_pattern(zone, neighbors, &pattern, visited)
                {
                    Some(next) => RoutingDecision::Forward(next),
                    // no candidate neighbors remain: terminal, unsatisfied
                    None => RoutingDecision::Deliver,
                }
            }
            Discipline::Multicast | Discipline::Broadcast => {
                let exclude = match &req.memory {
                    RoutingMemory::Spanning { reverse_path } => {
                        reverse_path.last().map(|e| &e.parent)
                    }
                    _ => None,
                };
                let targets = self.strategy.spanning_targets(
                    neighbors,
                    &req.key.as_coordinate(),
                    exclude,
                    self.fan_out_limit,
                );
                RoutingDecision::FanOut(targets)
            }
        }
    }
}
