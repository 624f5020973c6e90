//! Helpers for spinning up small in-process overlays in tests.

use crate::peer::{Peer, PeerState};
use crate::storage::MemStore;
use crate::transport::MemTransport;
use quadcan_types::config::CanTuningParams;
use quadcan_types::coords::Quadruple;
use quadcan_types::element::Element;
use quadcan_types::peer::{Neighbor, PeerId};
use quadcan_types::report::LoadReportStore;
use quadcan_types::zone::Zone;
use std::sync::Arc;

/// Shorthand element constructor.
pub fn elem(s: &str) -> Element {
    s.into()
}

/// Shorthand quadruple constructor.
pub fn quad(g: &str, s: &str, p: &str, o: &str) -> Quadruple {
    Quadruple::new(g, s, p, o)
}

/// Shorthand peer id constructor.
pub fn peer_id(s: &str) -> PeerId {
    s.into()
}

/// A line overlay: the full space cut along the graph dimension at the
/// given elements, one peer per slice, each neighboring only the
/// adjacent slices. Peers are named `p0..pN` left to right.
pub struct TestOverlay {
    /// The shared in-process transport.
    pub transport: MemTransport,
    /// The spawned peers, left to right.
    pub peers: Vec<Peer>,
    /// Each peer's backing store, same order.
    pub stores: Vec<MemStore>,
}

impl TestOverlay {
    /// Build and wire up a line of `cuts.len() + 1` peers.
    pub async fn line(cuts: &[&str]) -> Self {
        let mut zones = Vec::with_capacity(cuts.len() + 1);
        let mut rest = Zone::full();
        for cut in cuts {
            let (lo, hi) = rest.split_at(0, elem(cut));
            zones.push(lo);
            rest = hi;
        }
        zones.push(rest);

        let transport = MemTransport::new();
        let tuning = CanTuningParams::default();
        let mut peers = Vec::with_capacity(zones.len());
        let mut stores = Vec::with_capacity(zones.len());
        for (i, zone) in zones.iter().enumerate() {
            let store = MemStore::new();
            let peer = Peer::spawn(
                PeerState::new(format!("p{}", i), zone.clone()),
                Arc::new(store.clone()),
                Arc::new(transport.clone()),
                LoadReportStore::new(),
                tuning.clone(),
            );
            transport.register(peer.clone()).unwrap();
            peers.push(peer);
            stores.push(store);
        }

        for (i, peer) in peers.iter().enumerate() {
            if i > 0 {
                peer.upsert_neighbor(Neighbor::new(
                    format!("p{}", i - 1),
                    zones[i - 1].clone(),
                ))
                .await
                .unwrap();
            }
            if i + 1 < peers.len() {
                peer.upsert_neighbor(Neighbor::new(
                    format!("p{}", i + 1),
                    zones[i + 1].clone(),
                ))
                .await
                .unwrap();
            }
        }

        Self {
            transport,
            peers,
            stores,
        }
    }

    /// The peer whose zone contains `q`'s point.
    pub async fn owner_of(&self, q: &Quadruple) -> Peer {
        let point = q.point();
        for peer in &self.peers {
            let state = peer.snapshot().await.unwrap();
            if state.zone.contains_point(&point) {
                return peer.clone();
            }
        }
        panic!("partition invariant violated: no owner for {:?}", point);
    }
}
