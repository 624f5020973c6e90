//! Zones: axis-aligned regions of the coordinate space, one per peer.

use crate::coords::{Coordinate, Point, DIM};
use crate::element::Element;
use std::cmp::Ordering;

/// A half-open interval `[lower, upper)` over elements on one dimension.
///
/// An unbounded side (`None`) is the edge of the coordinate space.
#[derive(
    Clone,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct Span {
    lower: Option<Element>,
    upper: Option<Element>,
}

impl Span {
    /// Construct a span from optional bounds.
    pub fn new(lower: Option<Element>, upper: Option<Element>) -> Self {
        Self { lower, upper }
    }

    /// The span covering the whole dimension.
    pub fn full() -> Self {
        Self::default()
    }

    /// Lower bound, if any.
    pub fn lower(&self) -> Option<&Element> {
        self.lower.as_ref()
    }

    /// Upper bound, if any.
    pub fn upper(&self) -> Option<&Element> {
        self.upper.as_ref()
    }

    /// Where does `e` sit relative to this span?
    /// `Less` = below the range, `Equal` = inside, `Greater` = at or
    /// above the (exclusive) upper bound.
    pub fn position(&self, e: &Element) -> Ordering {
        if let Some(lo) = &self.lower {
            if e < lo {
                return Ordering::Less;
            }
        }
        if let Some(hi) = &self.upper {
            if e >= hi {
                return Ordering::Greater;
            }
        }
        Ordering::Equal
    }

    /// Is `e` inside this span?
    pub fn contains(&self, e: &Element) -> bool {
        self.position(e) == Ordering::Equal
    }

    /// Is this span entirely below `other` (no shared elements)?
    pub fn is_below(&self, other: &Span) -> bool {
        match (&self.upper, &other.lower) {
            (Some(u), Some(l)) => u <= l,
            _ => false,
        }
    }

    /// Do the two spans share at least one element?
    pub fn overlaps(&self, other: &Span) -> bool {
        !self.is_below(other) && !other.is_below(self)
    }

    /// Split at `at`, yielding `[lower, at)` and `[at, upper)`.
    ///
    /// Panics if `at` is not strictly inside the span - a cut on the
    /// boundary would create an empty zone, which the partition
    /// invariant forbids.
    pub fn split_at(&self, at: Element) -> (Span, Span) {
        assert!(
            self.contains(&at) && self.lower() != Some(&at),
            "split point must be strictly inside the span"
        );
        (
            Span::new(self.lower.clone(), Some(at.clone())),
            Span::new(Some(at), self.upper.clone()),
        )
    }
}

/// An axis-aligned hyper-rectangle of the coordinate space, owned by
/// exactly one peer at any instant.
///
/// Zones partition the whole space with no gaps and no overlaps. This
/// core never mutates zone geometry itself - join/leave/rebalance do -
/// but validators and load balancing read it through the predicates
/// below, which are pure and side-effect free.
#[derive(
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct Zone {
    spans: [Span; DIM],
}

impl Zone {
    /// Construct a zone from one span per dimension.
    pub fn new(spans: [Span; DIM]) -> Self {
        Self { spans }
    }

    /// The zone covering the entire coordinate space.
    pub fn full() -> Self {
        Self::new([Span::full(), Span::full(), Span::full(), Span::full()])
    }

    /// The span on dimension `dim`.
    ///
    /// Panics if `dim >= DIM`.
    pub fn span(&self, dim: usize) -> &Span {
        &self.spans[dim]
    }

    /// Ternary containment on one dimension: `Less` = below the zone's
    /// range, `Equal` = inside, `Greater` = above.
    pub fn contains_on(&self, dim: usize, e: &Element) -> Ordering {
        self.spans[dim].position(e)
    }

    /// Is the point inside on every dimension?
    pub fn contains_point(&self, p: &Point) -> bool {
        (0..DIM).all(|d| self.spans[d].contains(p.elem(d)))
    }

    /// Could a quadruple matching `key` live in this zone?
    ///
    /// Every constrained dimension must be inside; unconstrained
    /// dimensions are skipped, never compared. Drives fan-out pruning:
    /// a multicast hop forwards only toward zones for which this holds.
    pub fn could_intersect(&self, key: &Coordinate) -> bool {
        key.constrained().all(|(d, e)| self.spans[d].contains(e))
    }

    /// Do two zones share any region of space?
    pub fn overlaps(&self, other: &Zone) -> bool {
        (0..DIM).all(|d| self.spans[d].overlaps(&other.spans[d]))
    }

    /// Split this zone on `dim` at `at`, yielding the lower and upper
    /// halves. This is the geometric effect of a peer join.
    pub fn split_at(&self, dim: usize, at: Element) -> (Zone, Zone) {
        let (lo, hi) = self.spans[dim].split_at(at);
        let mut lower = self.clone();
        let mut upper = self.clone();
        lower.spans[dim] = lo;
        upper.spans[dim] = hi;
        (lower, upper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::Quadruple;
    use pretty_assertions::assert_eq;

    fn zone_on_graph(lower: Option<&str>, upper: Option<&str>) -> Zone {
        let mut z = Zone::full();
        z.spans[0] = Span::new(lower.map(Element::from), upper.map(Element::from));
        z
    }

    #[test]
    fn ternary_containment() {
        let z = zone_on_graph(Some("g"), Some("m"));
        assert_eq!(Ordering::Less, z.contains_on(0, &"a".into()));
        assert_eq!(Ordering::Equal, z.contains_on(0, &"g".into()));
        assert_eq!(Ordering::Equal, z.contains_on(0, &"h".into()));
        // upper bound is exclusive
        assert_eq!(Ordering::Greater, z.contains_on(0, &"m".into()));
        assert_eq!(Ordering::Greater, z.contains_on(0, &"z".into()));
    }

    #[test]
    fn contains_point_all_dims() {
        let q = Quadruple::new("h", "s", "p", "o");
        assert!(zone_on_graph(Some("g"), Some("m")).contains_point(&q.point()));
        assert!(!zone_on_graph(Some("g"), Some("h")).contains_point(&q.point()));
        assert!(Zone::full().contains_point(&q.point()));
    }

    #[test]
    fn split_partitions_with_no_gap_or_overlap() {
        let (lo, hi) = Zone::full().split_at(0, "m".into());
        assert!(!lo.overlaps(&hi));
        for e in ["a", "l", "m", "z"] {
            let inside_lo = lo.span(0).contains(&e.into());
            let inside_hi = hi.span(0).contains(&e.into());
            assert!(inside_lo ^ inside_hi, "element {} must be in exactly one half", e);
        }
    }

    #[test]
    fn could_intersect_skips_unconstrained_dims() {
        let z = zone_on_graph(Some("g"), Some("m"));
        let key = Coordinate::any().with(0, Some("h".into()));
        assert!(z.could_intersect(&key));
        assert!(z.could_intersect(&Coordinate::any()));
        assert!(!z.could_intersect(&key.clone().with(0, Some("z".into()))));
    }

    proptest::proptest! {
        /// For any point, a chain of splits still yields exactly one
        /// containing zone (the partition invariant).
        #[test]
        fn partition_invariant_under_splits(term in "[a-y]{1,8}") {
            let q = Quadruple::new(term, "s", "p", "o");
            let (a, rest) = Zone::full().split_at(0, "h".into());
            let (b, c) = rest.split_at(0, "q".into());
            let zones = [a, b, c];
            let containing = zones
                .iter()
                .filter(|z| z.contains_point(&q.point()))
                .count();
            assert_eq!(1, containing);
        }
    }
}
