//! Constraint validators: the predicate deciding whether a zone or peer
//! is relevant to a request's key.
//!
//! One tagged type covers all four routing disciplines: a full point for
//! unicast lookups, a partial coordinate for anycast/multicast patterns,
//! and `Any` for broadcast (equivalent to an all-unconstrained pattern).

use quadcan_types::coords::{Coordinate, Point};
use quadcan_types::peer::PeerStatus;
use quadcan_types::zone::Zone;
use std::cmp::Ordering;

/// The key constraints a request carries. Immutable once created.
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ConstraintsKey {
    /// A full point: exactly one peer's zone validates (unicast/lookup).
    Target(Point),
    /// A partial point: every peer whose zone matches all constrained
    /// dimensions validates (anycast/multicast).
    Pattern(Coordinate),
    /// No constraints: every peer validates (broadcast).
    Any,
}

impl ConstraintsKey {
    /// Does `zone` satisfy these constraints?
    ///
    /// For patterns, an unconstrained (`None`) dimension is skipped -
    /// never compared. Skipping is required, not optional: `None` stands
    /// for a variable in the original pattern, not for "match nothing",
    /// so an all-`None` pattern matches every zone.
    pub fn validates_zone(&self, zone: &Zone) -> bool {
        match self {
            ConstraintsKey::Target(point) => zone.contains_point(point),
            ConstraintsKey::Pattern(key) => key
                .constrained()
                .all(|(d, e)| zone.contains_on(d, e) == Ordering::Equal),
            ConstraintsKey::Any => true,
        }
    }

    /// Does a peer with the given status and zone satisfy these
    /// constraints? A peer mid zone-update never validates.
    pub fn validates_peer(&self, status: PeerStatus, zone: &Zone) -> bool {
        status.is_activated() && self.validates_zone(zone)
    }

    /// View this key as a coordinate for zone-intersection pruning.
    pub fn as_coordinate(&self) -> Coordinate {
        match self {
            ConstraintsKey::Target(p) => p.clone().into(),
            ConstraintsKey::Pattern(c) => c.clone(),
            ConstraintsKey::Any => Coordinate::any(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quadcan_types::coords::Quadruple;
    use quadcan_types::element::Element;
    use quadcan_types::zone::{Span, Zone};

    fn zone(dim: usize, lower: &str, upper: &str) -> Zone {
        let mut spans = [Span::full(), Span::full(), Span::full(), Span::full()];
        spans[dim] = Span::new(Some(lower.into()), Some(upper.into()));
        Zone::new(spans)
    }

    #[test]
    fn target_validates_only_containing_zone() {
        let key = ConstraintsKey::Target(Quadruple::new("h", "s", "p", "o").point());
        assert!(key.validates_zone(&zone(0, "g", "m")));
        assert!(!key.validates_zone(&zone(0, "m", "z")));
    }

    #[test]
    fn any_validates_every_zone() {
        assert!(ConstraintsKey::Any.validates_zone(&zone(2, "a", "b")));
        assert!(ConstraintsKey::Any.validates_zone(&Zone::full()));
    }

    #[test]
    fn updating_peer_never_validates() {
        let key = ConstraintsKey::Any;
        assert!(key.validates_peer(PeerStatus::Activated, &Zone::full()));
        assert!(!key.validates_peer(PeerStatus::Updating, &Zone::full()));
    }

    proptest::proptest! {
        /// An unconstrained dimension must never influence validation:
        /// vary the zone's range on the skipped dimension freely while
        /// holding the others fixed - the outcome must be stable.
        #[test]
        fn null_dimension_is_never_compared(
            lo in "[a-m]{1,4}",
            hi in "[n-z]{1,4}",
            subject in "[a-z]{1,4}",
        ) {
            let key = ConstraintsKey::Pattern(
                Coordinate::any().with(1, Some(Element::from(subject.as_str()))),
            );
            let subject_span = Span::new(Some("a".into()), Some("zzzz".into()));
            let fixed = Zone::new([
                Span::full(),
                subject_span.clone(),
                Span::full(),
                Span::full(),
            ]);
            // same zone, but with an arbitrary range on the skipped
            // graph dimension
            let varied = Zone::new([
                Span::new(Some(lo.as_str().into()), Some(hi.as_str().into())),
                subject_span,
                Span::full(),
                Span::full(),
            ]);
            assert_eq!(key.validates_zone(&fixed), key.validates_zone(&varied));
        }
    }
}
