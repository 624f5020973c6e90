//! Peer identity, status and the local neighbor view.

use crate::zone::Zone;
use std::sync::Arc;

/// URL-like peer identity. Cheap to clone.
#[derive(
    Clone,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct PeerId(Arc<str>);

impl PeerId {
    /// Construct a peer id from its url form.
    pub fn new(url: impl Into<Arc<str>>) -> Self {
        Self(url.into())
    }

    /// The url form of this id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for PeerId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Peer lifecycle status.
///
/// Routing and load balancing both refuse to act while a peer's zone is
/// mid-update (anything other than `Activated`).
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
pub enum PeerStatus {
    /// Normal operation; the zone and neighbor view are consistent.
    Activated,
    /// Zone maintenance (join/leave/rebalance) in flight.
    Updating,
}

impl PeerStatus {
    /// Is this peer safe to route through?
    pub fn is_activated(&self) -> bool {
        matches!(self, PeerStatus::Activated)
    }
}

/// One entry of the local neighbor view: an adjacent peer, the zone we
/// last learned for it, and its last known status.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Neighbor {
    /// The neighbor's identity.
    pub id: PeerId,
    /// Its currently known zone.
    pub zone: Zone,
    /// Its last known status.
    pub status: PeerStatus,
}

impl Neighbor {
    /// Construct an activated neighbor entry.
    pub fn new(id: impl Into<PeerId>, zone: Zone) -> Self {
        Self {
            id: id.into(),
            zone,
            status: PeerStatus::Activated,
        }
    }
}

/// The local peer's view of the peers whose zones are adjacent to its
/// own. Keyed by id, replace-on-upsert.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct NeighborTable {
    neighbors: Vec<Neighbor>,
}

impl NeighborTable {
    /// An empty neighbor table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entry for a neighbor.
    pub fn upsert(&mut self, neighbor: Neighbor) {
        match self.neighbors.iter_mut().find(|n| n.id == neighbor.id) {
            Some(slot) => *slot = neighbor,
            None => self.neighbors.push(neighbor),
        }
    }

    /// Remove the entry for `id`, if present.
    pub fn remove(&mut self, id: &PeerId) -> Option<Neighbor> {
        let idx = self.neighbors.iter().position(|n| &n.id == id)?;
        Some(self.neighbors.remove(idx))
    }

    /// Look up a neighbor by id.
    pub fn get(&self, id: &PeerId) -> Option<&Neighbor> {
        self.neighbors.iter().find(|n| &n.id == id)
    }

    /// Iterate all known neighbors in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Neighbor> {
        self.neighbors.iter()
    }

    /// Iterate only neighbors safe to route through.
    pub fn activated(&self) -> impl Iterator<Item = &Neighbor> {
        self.neighbors.iter().filter(|n| n.status.is_activated())
    }

    /// Number of known neighbors.
    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    /// True when no neighbors are known.
    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }
}
