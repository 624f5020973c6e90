//! Load reports exchanged between peers by the gossip layer.

use crate::peer::PeerId;
use crate::share::Share;
use crate::CanResult;
use std::collections::HashMap;

/// One peer's self-measured load: its id plus one value per criterion
/// name. Pushed to a subset of peers on each gossip period.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LoadReport {
    /// The reporting peer.
    pub peer: PeerId,
    /// Measured load keyed by criterion name.
    pub values: HashMap<String, f64>,
}

impl LoadReport {
    /// An empty report for `peer`.
    pub fn new(peer: PeerId) -> Self {
        Self {
            peer,
            values: HashMap::new(),
        }
    }

    /// Record a measurement for one criterion, builder style.
    pub fn with(mut self, criterion: impl Into<String>, value: f64) -> Self {
        self.values.insert(criterion.into(), value);
        self
    }

    /// The measurement for `criterion`, if this report carries one.
    pub fn get(&self, criterion: &str) -> Option<f64> {
        self.values.get(criterion).copied()
    }
}

/// Accumulated reports received from other peers, keyed by source peer.
///
/// A new report from an already-known source replaces the old one -
/// last write wins, no merging. Mutated concurrently by gossip arrivals
/// and read by load-balancing ticks, hence the [`Share`] guard.
#[derive(Clone, Debug)]
pub struct LoadReportStore(Share<HashMap<PeerId, LoadReport>>);

impl Default for LoadReportStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadReportStore {
    /// An empty store.
    pub fn new() -> Self {
        Self(Share::new(HashMap::new()))
    }

    /// Record a report, replacing any previous report from the same peer.
    pub fn record(&self, report: LoadReport) -> CanResult<()> {
        self.0.share_mut(|reports, _| {
            tracing::debug!(peer = %report.peer, "load report recorded");
            reports.insert(report.peer.clone(), report);
            Ok(())
        })
    }

    /// Arithmetic mean of all held measurements for `criterion`, or
    /// `None` when no held report carries one.
    pub fn estimate(&self, criterion: &str) -> CanResult<Option<f64>> {
        self.0.share_ref(|reports| {
            let values: Vec<f64> = reports
                .values()
                .filter_map(|r| r.get(criterion))
                .collect();
            if values.is_empty() {
                Ok(None)
            } else {
                Ok(Some(values.iter().sum::<f64>() / values.len() as f64))
            }
        })
    }

    /// Number of distinct source peers currently held.
    pub fn len(&self) -> usize {
        self.0.share_ref(|r| Ok(r.len())).unwrap_or(0)
    }

    /// True when no reports have been received yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_write_wins_per_source() {
        let store = LoadReportStore::new();
        store
            .record(LoadReport::new("a".into()).with("quads", 10.0))
            .unwrap();
        store
            .record(LoadReport::new("a".into()).with("quads", 50.0))
            .unwrap();
        assert_eq!(1, store.len());
        assert_eq!(Some(50.0), store.estimate("quads").unwrap());
    }

    #[test]
    fn estimate_is_mean_over_sources() {
        let store = LoadReportStore::new();
        for (peer, v) in [("a", 10.0), ("b", 20.0), ("c", 30.0)] {
            store
                .record(LoadReport::new(peer.into()).with("quads", v))
                .unwrap();
        }
        assert_eq!(Some(20.0), store.estimate("quads").unwrap());
        assert_eq!(None, store.estimate("queries").unwrap());
    }
}
