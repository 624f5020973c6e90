//! The storage action seam: the opaque local operation a validating
//! peer runs against its zone-relevant data.
//!
//! The routing core only needs "a callable producing a mergeable value
//! and a timing measurement" - find/count/delete and the persistent
//! backend behind them live outside this crate. [`MemStore`] is the
//! in-memory implementation used by the in-process overlay and tests.

use crate::payload::Payload;
use crate::validator::ConstraintsKey;
use futures::future::{BoxFuture, FutureExt};
use quadcan_types::coords::Quadruple;
use quadcan_types::share::Share;
use quadcan_types::CanResult;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A local action over the peer's zone-relevant data.
pub trait StorageAction: 'static + Send + Sync {
    /// Execute the action for `key`, returning the mergeable result and
    /// the time the datastore spent producing it.
    fn execute(&self, key: ConstraintsKey) -> BoxFuture<'static, CanResult<(Payload, Duration)>>;
}

/// Alias
pub type DynStorageAction = Arc<dyn StorageAction>;

/// An action that contributes nothing; useful for pure routing probes.
#[derive(Debug, Default)]
pub struct NullAction;

impl StorageAction for NullAction {
    fn execute(&self, _key: ConstraintsKey) -> BoxFuture<'static, CanResult<(Payload, Duration)>> {
        async move { Ok((Payload::Unit, Duration::ZERO)) }.boxed()
    }
}

/// A simple in-memory quadruple store.
#[derive(Clone, Debug)]
pub struct MemStore {
    quads: Share<Vec<Quadruple>>,
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemStore {
    /// An empty store.
    pub fn new() -> Self {
        Self {
            quads: Share::new(Vec::new()),
        }
    }

    /// Insert one quadruple.
    pub fn insert(&self, quad: Quadruple) -> CanResult<()> {
        self.quads.share_mut(|quads, _| {
            quads.push(quad);
            Ok(())
        })
    }

    /// Number of quadruples held.
    pub fn len(&self) -> usize {
        self.quads.share_ref(|q| Ok(q.len())).unwrap_or(0)
    }

    /// True when the store holds nothing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All quadruples matching `key`.
    pub fn find(&self, key: &ConstraintsKey) -> CanResult<Vec<Quadruple>> {
        let pattern = key.as_coordinate();
        self.quads.share_ref(|quads| {
            Ok(quads
                .iter()
                .filter(|q| q.matches(&pattern))
                .cloned()
                .collect())
        })
    }
}

impl StorageAction for MemStore {
    fn execute(&self, key: ConstraintsKey) -> BoxFuture<'static, CanResult<(Payload, Duration)>> {
        let this = self.clone();
        async move {
            let start = Instant::now();
            let found = this.find(&key)?;
            Ok((Payload::Quads(found), start.elapsed()))
        }
        .boxed()
    }
}

/// Wraps a [`MemStore`] to count matches instead of returning them.
#[derive(Clone, Debug)]
pub struct CountAction(pub MemStore);

impl StorageAction for CountAction {
    fn execute(&self, key: ConstraintsKey) -> BoxFuture<'static, CanResult<(Payload, Duration)>> {
        let store = self.0.clone();
        async move {
            let start = Instant::now();
            let found = store.find(&key)?;
            Ok((Payload::Count(found.len() as u64), start.elapsed()))
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quadcan_types::coords::Coordinate;

    #[tokio::test]
    async fn find_matches_pattern() {
        let store = MemStore::new();
        store.insert(Quadruple::new("g1", "s1", "p1", "o1")).unwrap();
        store.insert(Quadruple::new("g2", "s1", "p2", "o2")).unwrap();

        let key = ConstraintsKey::Pattern(Coordinate::any().with(1, Some("s1".into())));
        let (payload, _) = store.execute(key).await.unwrap();
        assert_eq!(Payload::Quads(store.find(&ConstraintsKey::Any).unwrap()), payload);

        let key = ConstraintsKey::Pattern(Coordinate::any().with(0, Some("g2".into())));
        let (payload, _) = CountAction(store).execute(key).await.unwrap();
        assert_eq!(Payload::Count(1), payload);
    }
}
