//! Scalar values along one dimension of the coordinate space.

use std::sync::Arc;

/// One scalar value along one dimension of the coordinate space.
///
/// Derived deterministically from a quadruple term's textual form; the
/// ordering used by zone predicates is plain lexicographic ordering on
/// that text. Cheap to clone.
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
pub struct Element(Arc<str>);

impl Element {
    /// Construct an element from the textual form of a term.
    pub fn new(term: impl Into<Arc<str>>) -> Self {
        Self(term.into())
    }

    /// The underlying text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Is this element within `[lower, upper)`?
    ///
    /// An unbounded side (`None`) is the edge of the space.
    pub fn between(&self, lower: Option<&Element>, upper: Option<&Element>) -> bool {
        if let Some(lo) = lower {
            if self < lo {
                return false;
            }
        }
        if let Some(hi) = upper {
            if self >= hi {
                return false;
            }
        }
        true
    }
}

impl std::fmt::Display for Element {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Element {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Element {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}
