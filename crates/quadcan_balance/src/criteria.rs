//! Load criteria: what to measure, when it is an emergency, and what to
//! do about an imbalance.

use futures::future::BoxFuture;
use quadcan::peer::Peer;
use quadcan::storage::MemStore;
use quadcan_types::CanResult;
use std::sync::Arc;

/// One dimension of load a peer can be balanced on.
///
/// The balancing hooks default to logging the imbalance; deployments
/// wire in hooks that split or hand off zones.
pub trait Criterion: 'static + Send + Sync {
    /// Stable name, used as the key of gossiped load reports.
    fn name(&self) -> &str;

    /// Absolute-mode threshold: the measurement at which this criterion
    /// is overloaded regardless of what neighbors report.
    fn emergency_threshold(&self) -> f64;

    /// Measure the current local load.
    fn load(&self, peer: &Peer) -> BoxFuture<'static, CanResult<f64>>;

    /// React to an overload classification.
    fn balance_overload(&self, peer: &Peer) -> BoxFuture<'static, CanResult<()>> {
        let name = self.name().to_string();
        let id = peer.id().clone();
        Box::pin(async move {
            tracing::info!(peer = %id, criterion = %name, "overloaded");
            Ok(())
        })
    }

    /// React to an underload classification.
    fn balance_underload(&self, peer: &Peer) -> BoxFuture<'static, CanResult<()>> {
        let name = self.name().to_string();
        let id = peer.id().clone();
        Box::pin(async move {
            tracing::info!(peer = %id, criterion = %name, "underloaded");
            Ok(())
        })
    }
}

/// Ref-counted dyn handle to a [`Criterion`].
pub type DynCriterion = Arc<dyn Criterion>;

/// Number of quadruples held in the local store.
pub struct QuadCountCriterion {
    store: MemStore,
    emergency_threshold: f64,
}

impl QuadCountCriterion {
    /// Measure `store`, treating `emergency_threshold` quadruples as an
    /// unconditional overload.
    pub fn new(store: MemStore, emergency_threshold: f64) -> Self {
        Self {
            store,
            emergency_threshold,
        }
    }
}

impl Criterion for QuadCountCriterion {
    fn name(&self) -> &str {
        "quad_count"
    }

    fn emergency_threshold(&self) -> f64 {
        self.emergency_threshold
    }

    fn load(&self, _peer: &Peer) -> BoxFuture<'static, CanResult<f64>> {
        let count = self.store.len() as f64;
        Box::pin(async move { Ok(count) })
    }
}

#[cfg(any(test, feature = "test_utils"))]
pub use test_criterion::TestCriterion;

#[cfg(any(test, feature = "test_utils"))]
mod test_criterion {
    use super::*;
    use quadcan_types::share::Share;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// A criterion with a settable measurement and counters on the
    /// balancing hooks.
    pub struct TestCriterion {
        name: String,
        emergency_threshold: f64,
        load: Share<f64>,
        /// How many times the overload hook ran.
        pub overloads: Arc<AtomicUsize>,
        /// How many times the underload hook ran.
        pub underloads: Arc<AtomicUsize>,
    }

    impl TestCriterion {
        /// A criterion named `name` with the given threshold and an
        /// initial measurement of zero.
        pub fn new(name: impl Into<String>, emergency_threshold: f64) -> Self {
            Self {
                name: name.into(),
                emergency_threshold,
                load: Share::new(0.0),
                overloads: Arc::new(AtomicUsize::new(0)),
                underloads: Arc::new(AtomicUsize::new(0)),
            }
        }

        /// Set the measurement returned by the next `load` calls.
        pub fn set_load(&self, value: f64) {
            self.load
                .share_mut(|l, _| {
                    *l = value;
                    Ok(())
                })
                .unwrap();
        }
    }

    impl Criterion for TestCriterion {
        fn name(&self) -> &str {
            &self.name
        }

        fn emergency_threshold(&self) -> f64 {
            self.emergency_threshold
        }

        fn load(&self, _peer: &Peer) -> BoxFuture<'static, CanResult<f64>> {
            let load = self.load.share_ref(|l| Ok(*l));
            Box::pin(async move { load })
        }

        fn balance_overload(&self, _peer: &Peer) -> BoxFuture<'static, CanResult<()>> {
            self.overloads.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move { Ok(()) })
        }

        fn balance_underload(&self, _peer: &Peer) -> BoxFuture<'static, CanResult<()>> {
            self.underloads.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move { Ok(()) })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use quadcan::test_utils::{quad, TestOverlay};

    #[tokio::test(flavor = "multi_thread")]
    async fn quad_count_measures_the_store() {
        let overlay = TestOverlay::line(&[]).await;
        overlay.stores[0].insert(quad("g", "s", "p", "o1")).unwrap();
        overlay.stores[0].insert(quad("g", "s", "p", "o2")).unwrap();
        let criterion = QuadCountCriterion::new(overlay.stores[0].clone(), 100.0);

        assert_eq!("quad_count", criterion.name());
        assert_eq!(100.0, criterion.emergency_threshold());
        let load = criterion.load(&overlay.peers[0]).await.unwrap();
        assert_eq!(2.0, load);
    }
}
