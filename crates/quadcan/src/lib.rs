//! quadcan: the routing, response-aggregation and load-balancing control
//! plane of a structured peer-to-peer overlay that indexes RDF-like
//! quadruples in a multi-dimensional coordinate space.
//!
//! Each quadruple maps onto a [`Point`](types::coords::Point); the space
//! is partitioned among peers into [`Zone`](types::zone::Zone)s; requests
//! carry a [`ConstraintsKey`](validator::ConstraintsKey) that decides, at
//! each hop, whether a peer's zone is relevant; responses retrace the
//! exact reverse path recorded during the forward phase, merging with
//! sibling responses at each synchronization point.
#![deny(missing_docs)]

pub mod aggregate;
pub mod message;
pub mod payload;
pub mod peer;
pub mod router;
pub mod storage;
pub mod sync_point;
pub mod transport;
pub mod validator;

#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

pub use quadcan_types as types;
