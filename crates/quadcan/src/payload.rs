//! Mergeable response payloads.

use quadcan_types::coords::Quadruple;
use quadcan_types::element::Element;
use std::collections::HashMap;

/// One SELECT-style solution: variable name to bound term.
pub type Binding = HashMap<String, Element>;

/// The mergeable value a local action produces and a response carries.
///
/// `merge` is associative and commutative: counts sum, ASK answers OR,
/// list payloads concatenate (order is irrelevant to the query semantics
/// this feeds - SELECT/CONSTRUCT/DESCRIBE results are unordered sets at
/// this layer). `Unit` is the merge identity.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Payload {
    /// No payload; the merge identity.
    Unit,
    /// A count aggregate (e.g. quadruples deleted or held).
    Count(u64),
    /// An ASK-style boolean.
    Ask(bool),
    /// Matching quadruples.
    Quads(Vec<Quadruple>),
    /// SELECT-style variable bindings.
    Bindings(Vec<Binding>),
}

impl Payload {
    /// Merge another payload into this one.
    pub fn merge(&mut self, other: Payload) {
        match (&mut *self, other) {
            (_, Payload::Unit) => {}
            (Payload::Unit, other) => *self = other,
            (Payload::Count(a), Payload::Count(b)) => *a += b,
            (Payload::Ask(a), Payload::Ask(b)) => *a |= b,
            (Payload::Quads(a), Payload::Quads(mut b)) => a.append(&mut b),
            (Payload::Bindings(a), Payload::Bindings(mut b)) => a.append(&mut b),
            (ours, theirs) => {
                // mismatched sub-results indicate a caller bug; keep ours
                tracing::warn!(?ours, ?theirs, "dropping mismatched payload in merge");
            }
        }
    }

    /// Is this the empty/identity payload?
    pub fn is_empty(&self) -> bool {
        match self {
            Payload::Unit => true,
            Payload::Count(_) | Payload::Ask(_) => false,
            Payload::Quads(q) => q.is_empty(),
            Payload::Bindings(b) => b.is_empty(),
        }
    }

    /// The ASK-style truth value of this payload: does it witness at
    /// least one solution?
    pub fn truthy(&self) -> bool {
        match self {
            Payload::Unit => false,
            Payload::Count(n) => *n > 0,
            Payload::Ask(b) => *b,
            Payload::Quads(q) => !q.is_empty(),
            Payload::Bindings(b) => !b.is_empty(),
        }
    }
}

impl Default for Payload {
    fn default() -> Self {
        Payload::Unit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_is_identity() {
        let mut p = Payload::Unit;
        p.merge(Payload::Count(3));
        assert_eq!(Payload::Count(3), p);
        p.merge(Payload::Unit);
        assert_eq!(Payload::Count(3), p);
    }

    #[test]
    fn counts_sum_asks_or() {
        let mut c = Payload::Count(2);
        c.merge(Payload::Count(5));
        assert_eq!(Payload::Count(7), c);

        let mut a = Payload::Ask(false);
        a.merge(Payload::Ask(true));
        assert_eq!(Payload::Ask(true), a);
    }

    proptest::proptest! {
        /// Merging a fixed set of counts in any order yields the same
        /// aggregate.
        #[test]
        fn count_merge_is_order_independent(mut order in proptest::collection::vec(0usize..6, 6)) {
            let counts = [1u64, 2, 3, 5, 8, 13];
            order.sort_unstable();
            order.dedup();
            let mut forward = Payload::Unit;
            let mut backward = Payload::Unit;
            for &i in &order {
                forward.merge(Payload::Count(counts[i]));
            }
            for &i in order.iter().rev() {
                backward.merge(Payload::Count(counts[i]));
            }
            assert_eq!(forward, backward);
        }
    }
}
