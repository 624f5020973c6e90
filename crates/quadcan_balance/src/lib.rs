#![deny(missing_docs)]
//! Periodic load evaluation and gossip-based balancing for the quadcan
//! overlay.
//!
//! A [`LoadBalancer`](service::LoadBalancer) owns one background loop
//! per spawned peer: on a fixed-delay tick it measures every registered
//! [`Criterion`](criteria::Criterion), classifies the peer as
//! overloaded, normal or underloaded, and invokes the criterion's
//! balancing hook. In relative mode a second loop pushes the local
//! measurements to random neighbors by gossip, and the classification
//! threshold is estimated from the reports gossiped back.

pub mod criteria;
pub mod gossip;
pub mod service;
