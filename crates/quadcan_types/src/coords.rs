//! Points and partial points locating quadruples in the coordinate space.

use crate::element::Element;

/// Number of dimensions of the coordinate space: graph, subject,
/// predicate, object.
pub const DIM: usize = 4;

/// A full point in the coordinate space - one [`Element`] per dimension.
///
/// Identifies a quadruple's location. Under the partition invariant,
/// exactly one live peer's zone contains any given point at any instant.
#[derive(
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct Point([Element; DIM]);

impl Point {
    /// Construct a point from one element per dimension.
    pub fn new(elements: [Element; DIM]) -> Self {
        Self(elements)
    }

    /// The element on dimension `dim`.
    ///
    /// Panics if `dim >= DIM`.
    pub fn elem(&self, dim: usize) -> &Element {
        &self.0[dim]
    }

    /// Iterate the elements in dimension order.
    pub fn iter(&self) -> impl Iterator<Item = &Element> {
        self.0.iter()
    }
}

/// A partial point: the key of anycast/multicast requests.
///
/// `None` on a dimension means "any value matches" - it stands for a
/// variable in the original pattern, never for "match nothing". An
/// all-`None` coordinate matches every zone (the broadcast case).
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
pub struct Coordinate([Option<Element>; DIM]);

impl Coordinate {
    /// Construct a coordinate from per-dimension optional elements.
    pub fn new(elements: [Option<Element>; DIM]) -> Self {
        Self(elements)
    }

    /// A coordinate with every dimension unconstrained.
    pub fn any() -> Self {
        Self::default()
    }

    /// The element on dimension `dim`, if constrained.
    ///
    /// Panics if `dim >= DIM`.
    pub fn elem(&self, dim: usize) -> Option<&Element> {
        self.0[dim].as_ref()
    }

    /// True if no dimension is constrained.
    pub fn is_any(&self) -> bool {
        self.0.iter().all(Option::is_none)
    }

    /// Iterate `(dim, element)` over the constrained dimensions only.
    pub fn constrained(&self) -> impl Iterator<Item = (usize, &Element)> {
        self.0
            .iter()
            .enumerate()
            .filter_map(|(d, e)| e.as_ref().map(|e| (d, e)))
    }

    /// Replace the element on one dimension, returning the new coordinate.
    pub fn with(mut self, dim: usize, elem: Option<Element>) -> Self {
        self.0[dim] = elem;
        self
    }
}

impl From<Point> for Coordinate {
    fn from(p: Point) -> Self {
        let [g, s, pr, o] = p.0;
        Self([Some(g), Some(s), Some(pr), Some(o)])
    }
}

/// An RDF-like quadruple: graph, subject, predicate, object.
#[derive(
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct Quadruple {
    /// The graph (context) term.
    pub graph: Element,
    /// The subject term.
    pub subject: Element,
    /// The predicate term.
    pub predicate: Element,
    /// The object term.
    pub object: Element,
}

impl Quadruple {
    /// Construct a quadruple from its four terms.
    pub fn new(
        graph: impl Into<Element>,
        subject: impl Into<Element>,
        predicate: impl Into<Element>,
        object: impl Into<Element>,
    ) -> Self {
        Self {
            graph: graph.into(),
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
        }
    }

    /// The point this quadruple maps onto in the coordinate space.
    pub fn point(&self) -> Point {
        Point::new([
            self.graph.clone(),
            self.subject.clone(),
            self.predicate.clone(),
            self.object.clone(),
        ])
    }

    /// Does this quadruple match a partial key? Equality on every
    /// constrained dimension; unconstrained dimensions always match.
    pub fn matches(&self, key: &Coordinate) -> bool {
        let point = self.point();
        key.constrained().all(|(d, e)| point.elem(d) == e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> Quadruple {
        Quadruple::new("g1", "s1", "p1", "o1")
    }

    #[test]
    fn point_round_trip() {
        let p = quad().point();
        assert_eq!("g1", p.elem(0).as_str());
        assert_eq!("o1", p.elem(3).as_str());
    }

    #[test]
    fn coordinate_any_matches_everything() {
        assert!(Coordinate::any().is_any());
        assert!(quad().matches(&Coordinate::any()));
    }

    #[test]
    fn pattern_matching_skips_unconstrained_dims() {
        let key = Coordinate::any()
            .with(1, Some("s1".into()))
            .with(2, Some("p1".into()));
        assert!(quad().matches(&key));
        let miss = key.with(1, Some("s2".into()));
        assert!(!quad().matches(&miss));
    }

    #[test]
    fn full_point_to_coordinate() {
        let c: Coordinate = quad().point().into();
        assert!(!c.is_any());
        assert_eq!(4, c.constrained().count());
    }
}
