#![deny(missing_docs)]
//! Types subcrate for the quadcan structured overlay.

/// Re-exported dependencies.
pub mod dependencies {
    pub use ::parking_lot;
    pub use ::serde;
    pub use ::thiserror;
    pub use ::tokio;
    pub use ::tracing;
}

pub mod config;
pub mod coords;
pub mod element;
pub mod error;
pub mod peer;
pub mod report;
pub mod share;
pub mod timeout;
pub mod zone;

pub use error::{CanError, CanResult};
