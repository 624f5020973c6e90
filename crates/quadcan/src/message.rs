//! Typed request/response messages and their per-discipline routing
//! memory.
//!
//! The four disciplines are tagged variants dispatched through a single
//! router, not parallel type hierarchies: a request is its constraints
//! key plus the discipline-specific memory the response phase needs -
//! a single sender coordinate for forward/unicast, a growing trail of
//! visited hops for anycast, and a reverse-path stack of fan-out entries
//! for multicast/broadcast.

use crate::payload::Payload;
use crate::validator::ConstraintsKey;
use quadcan_types::coords::{Coordinate, Point};
use quadcan_types::peer::PeerId;
use std::time::Duration;

/// Unique id correlating a request with its responses across hops.
#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    derive_more::Display,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct RequestId(u64);

impl RequestId {
    /// A fresh random id.
    pub fn random() -> Self {
        Self(rand::random())
    }
}

/// The four routing disciplines.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Discipline {
    /// Greedy unicast toward the single peer owning a point.
    Forward,
    /// Hop-by-hop single-path search for any peer matching a pattern.
    Anycast,
    /// Bounded flood to every peer whose zone could match a pattern.
    Multicast,
    /// Flood to every peer (the all-unconstrained multicast).
    Broadcast,
}

/// One visited hop of an anycast request: who, and whether their zone
/// validated the constraints.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct HopRecord {
    /// The visited peer.
    pub peer: PeerId,
    /// Did that peer's zone validate the key?
    pub validated: bool,
}

/// One fan-out hop of a multicast/broadcast request: the parent that
/// fanned out, and how many sibling responses it expects back.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ReversePathEntry {
    /// The peer that fanned out.
    pub parent: PeerId,
    /// How many children it forwarded to.
    pub expected_children: usize,
}

/// Discipline-specific routing memory carried by a request.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum RoutingMemory {
    /// Forward/unicast: the original sender's coordinate, so the
    /// reverse path is a single direct hop back.
    Forward {
        /// The originating peer.
        sender: PeerId,
    },
    /// Anycast: every hop taken so far, in order.
    Anycast {
        /// The visited hops; the response retraces this exactly.
        trail: Vec<HopRecord>,
    },
    /// Multicast/broadcast: the reverse-path stack; one entry pushed per
    /// fan-out hop, popped by the response phase.
    Spanning {
        /// The fan-out entries, innermost last.
        reverse_path: Vec<ReversePathEntry>,
    },
}

/// A routed request. Created at the originating peer, extended at each
/// hop, terminal once delivered to all target peers.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Request {
    /// Correlation id.
    pub id: RequestId,
    /// The key constraints; immutable once created.
    pub key: ConstraintsKey,
    /// Which routing discipline governs this request.
    pub discipline: Discipline,
    /// Discipline-specific routing memory.
    pub memory: RoutingMemory,
    /// Number of forward hops taken so far.
    pub outbound_hop_count: u64,
    /// Micros since epoch at which the origin dispatched this request.
    pub dispatched_at_micros: i64,
}

impl Request {
    /// A forward/unicast lookup of `target`, originating at `sender`.
    pub fn forward(sender: PeerId, target: Point) -> Self {
        Self::new(
            ConstraintsKey::Target(target),
            Discipline::Forward,
            RoutingMemory::Forward { sender },
        )
    }

    /// An anycast search for any peer matching `pattern`.
    pub fn anycast(pattern: Coordinate) -> Self {
        Self::new(
            ConstraintsKey::Pattern(pattern),
            Discipline::Anycast,
            RoutingMemory::Anycast { trail: Vec::new() },
        )
    }

    /// A multicast to every peer whose zone could match `pattern`.
    pub fn multicast(pattern: Coordinate) -> Self {
        Self::new(
            ConstraintsKey::Pattern(pattern),
            Discipline::Multicast,
            RoutingMemory::Spanning {
                reverse_path: Vec::new(),
            },
        )
    }

    /// A broadcast to every peer in the overlay.
    pub fn broadcast() -> Self {
        Self::new(
            ConstraintsKey::Any,
            Discipline::Broadcast,
            RoutingMemory::Spanning {
                reverse_path: Vec::new(),
            },
        )
    }

    fn new(key: ConstraintsKey, discipline: Discipline, memory: RoutingMemory) -> Self {
        Self {
            id: RequestId::random(),
            key,
            discipline,
            memory,
            outbound_hop_count: 0,
            dispatched_at_micros: now_micros(),
        }
    }
}

/// One peer's local contribution to an aggregated response.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PeerResult {
    /// The contributing peer.
    pub peer: PeerId,
    /// Its local action result.
    pub payload: Payload,
    /// How long its local action took.
    pub duration: Duration,
}

/// Reverse-path state carried by a response.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ResponseMemory {
    /// Forward/unicast: one direct hop back to the origin.
    Direct {
        /// The origin to reply to.
        target: PeerId,
    },
    /// Anycast: the remaining trail to retrace, origin first.
    Trail(Vec<HopRecord>),
    /// Multicast/broadcast: the remaining reverse-path stack.
    Stack(Vec<ReversePathEntry>),
}

/// A routed response. Mirrors its request's discipline; sibling
/// responses merge into one as they ascend the reverse path, and a
/// response is terminal once it reaches the origin with no further
/// synchronization points pending.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Response {
    /// The request this responds to.
    pub request_id: RequestId,
    /// The request's discipline.
    pub discipline: Discipline,
    /// Cumulative reverse hops across all merged branches.
    pub inbound_hop_count: u64,
    /// Cumulative forward hops across all merged branches.
    pub outbound_hop_count: u64,
    /// The aggregated payload.
    pub payload: Payload,
    /// Per-peer intermediate results, one per contributing peer.
    pub results: Vec<PeerResult>,
    /// Cumulative time spent in local actions across contributors.
    pub action_duration: Duration,
    /// Slowest branch latency observed so far.
    pub latency: Duration,
    /// Copied from the request, for end-to-end statistics.
    pub dispatched_at_micros: i64,
    /// Reverse-path state.
    pub memory: ResponseMemory,
}

impl Response {
    /// An empty (no-contribution) response for `req`, inheriting its
    /// routing memory and dispatch timestamp.
    pub fn empty_for(req: &Request) -> Self {
        let memory = match &req.memory {
            RoutingMemory::Forward { sender } => ResponseMemory::Direct {
                target: sender.clone(),
            },
            RoutingMemory::Anycast { trail } => ResponseMemory::Trail(trail.clone()),
            RoutingMemory::Spanning { reverse_path } => {
                ResponseMemory::Stack(reverse_path.clone())
            }
        };
        let elapsed = now_micros().saturating_sub(req.dispatched_at_micros);
        Self {
            request_id: req.id,
            discipline: req.discipline,
            inbound_hop_count: 0,
            outbound_hop_count: req.outbound_hop_count,
            payload: Payload::Unit,
            results: Vec::new(),
            action_duration: Duration::ZERO,
            latency: Duration::from_micros(elapsed.max(0) as u64),
            dispatched_at_micros: req.dispatched_at_micros,
            memory,
        }
    }

    /// Merge a sibling response into this one at a synchronization
    /// point: hop aggregates sum, latency takes the max, per-peer
    /// results concatenate and payloads merge.
    pub fn merge_from(&mut self, other: Response) {
        self.inbound_hop_count += other.inbound_hop_count;
        self.outbound_hop_count += other.outbound_hop_count;
        self.action_duration += other.action_duration;
        self.latency = self.latency.max(other.latency);
        self.payload.merge(other.payload);
        self.results.extend(other.results);
    }
}

/// Micros since the unix epoch.
pub fn now_micros() -> i64 {
    match std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH) {
        Ok(d) => d.as_micros() as i64,
        Err(_) => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn child(count: u64, inbound: u64) -> Response {
        let mut r = Response::empty_for(&Request::broadcast());
        r.payload = Payload::Count(count);
        r.inbound_hop_count = inbound;
        r
    }

    #[test]
    fn merge_sums_hops_and_payload() {
        let mut merged = child(3, 1);
        merged.merge_from(child(7, 2));
        assert_eq!(3, merged.inbound_hop_count);
        assert_eq!(Payload::Count(10), merged.payload);
    }

    proptest::proptest! {
        /// Merging the same children in any arrival order yields the
        /// same final aggregate.
        #[test]
        fn merge_is_order_independent(seed in 0u64..1000) {
            let children: Vec<Response> =
                (0..5).map(|i| child(i * i, i)).collect();

            let mut order: Vec<usize> = (0..children.len()).collect();
            // cheap deterministic shuffle
            for i in (1..order.len()).rev() {
                order.swap(i, (seed as usize).wrapping_mul(31).wrapping_add(i) % (i + 1));
            }

            let mut in_order: Option<Response> = None;
            for c in children.clone() {
                match &mut in_order {
                    None => in_order = Some(c),
                    Some(m) => m.merge_from(c),
                }
            }
            let mut shuffled: Option<Response> = None;
            for &i in &order {
                match &mut shuffled {
                    None => shuffled = Some(children[i].clone()),
                    Some(m) => m.merge_from(children[i].clone()),
                }
            }

            let a = in_order.unwrap();
            let b = shuffled.unwrap();
            assert_eq!(a.inbound_hop_count, b.inbound_hop_count);
            assert_eq!(a.payload, b.payload);
            assert_eq!(a.latency, b.latency);
        }
    }
}
