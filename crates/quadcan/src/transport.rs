//! Overlay wire surface.
//!
//! The overlay exchanges exactly three message kinds between peers;
//! [`Transport`] is the seam an embedder implements to carry them. The
//! in-memory transport here backs the tests and any single-process
//! deployment.

use crate::message::{Request, Response};
use crate::peer::Peer;
use futures::future::BoxFuture;
use quadcan_types::peer::PeerId;
use quadcan_types::report::LoadReport;
use quadcan_types::share::Share;
use quadcan_types::{CanError, CanResult};
use std::collections::HashMap;
use std::sync::Arc;

/// A message travelling between two peers of the overlay.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub enum OverlayMsg {
    /// A routed request, forward path.
    Request(Request),
    /// A response walking back the reverse path.
    Response(Response),
    /// A load report disseminated by gossip.
    Gossip(LoadReport),
}

/// The sending half of the overlay network layer.
pub trait Transport: 'static + Send + Sync {
    /// Deliver one message to a peer. Best-effort: a returned error is
    /// logged by the caller, never retried.
    fn send(&self, to: PeerId, msg: OverlayMsg) -> BoxFuture<'static, CanResult<()>>;
}

/// Ref-counted dyn handle to a [`Transport`].
pub type DynTransport = Arc<dyn Transport>;

/// In-process transport: a shared registry of live peers, delivery by
/// direct mailbox hand-off.
#[derive(Clone)]
pub struct MemTransport(Share<HashMap<PeerId, Peer>>);

impl Default for MemTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MemTransport {
    /// An empty registry.
    pub fn new() -> Self {
        Self(Share::new(HashMap::new()))
    }

    /// Make a peer reachable under its id.
    pub fn register(&self, peer: Peer) -> CanResult<()> {
        self.0.share_mut(|map, _| {
            map.insert(peer.id().clone(), peer);
            Ok(())
        })
    }

    /// Drop a peer from the registry; later sends to it fail.
    pub fn unregister(&self, id: &PeerId) -> CanResult<()> {
        self.0.share_mut(|map, _| {
            map.remove(id);
            Ok(())
        })
    }
}

impl Transport for MemTransport {
    fn send(&self, to: PeerId, msg: OverlayMsg) -> BoxFuture<'static, CanResult<()>> {
        let peer = self.0.share_ref(|map| Ok(map.get(&to).cloned()));
        Box::pin(async move {
            match peer? {
                Some(peer) => peer.incoming(msg).await,
                None => Err(CanError::NoRoute(to.to_string().into_boxed_str())),
            }
        })
    }
}
