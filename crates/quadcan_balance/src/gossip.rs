//! Dissemination of local load reports to neighbors.

use futures::future::BoxFuture;
use quadcan::peer::Peer;
use quadcan::transport::{DynTransport, OverlayMsg};
use quadcan_types::report::LoadReport;
use quadcan_types::CanResult;
use rand::seq::SliceRandom;
use std::sync::Arc;

/// How a peer pushes its load report into the overlay.
pub trait GossipStrategy: 'static + Send + Sync {
    /// Push one report on behalf of `peer`. Best-effort.
    fn push(&self, peer: &Peer, report: LoadReport) -> BoxFuture<'static, CanResult<()>>;
}

/// Ref-counted dyn handle to a [`GossipStrategy`].
pub type DynGossipStrategy = Arc<dyn GossipStrategy>;

/// Push the report to a random sample of activated neighbors.
pub struct RandomNeighborGossip {
    transport: DynTransport,
    fan_out: usize,
}

impl RandomNeighborGossip {
    /// Gossip over `transport`, targeting up to `fan_out` neighbors per
    /// push.
    pub fn new(transport: DynTransport, fan_out: usize) -> Self {
        Self { transport, fan_out }
    }
}

impl GossipStrategy for RandomNeighborGossip {
    fn push(&self, peer: &Peer, report: LoadReport) -> BoxFuture<'static, CanResult<()>> {
        let peer = peer.clone();
        let transport = self.transport.clone();
        let fan_out = self.fan_out;
        Box::pin(async move {
            let state = peer.snapshot().await?;
            let candidates: Vec<_> = state.neighbors.activated().cloned().collect();
            let targets =
                candidates.choose_multiple(&mut rand::thread_rng(), fan_out);
            for n in targets {
                if let Err(err) = transport
                    .send(n.id.clone(), OverlayMsg::Gossip(report.clone()))
                    .await
                {
                    tracing::debug!(to = %n.id, ?err, "gossip push failed");
                }
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use quadcan::test_utils::TestOverlay;

    #[tokio::test(flavor = "multi_thread")]
    async fn push_reaches_a_neighbor() {
        let overlay = TestOverlay::line(&["m"]).await;
        let gossip =
            RandomNeighborGossip::new(Arc::new(overlay.transport.clone()), 3);

        let report = LoadReport::new("p0".into()).with("quad_count", 7.0);
        gossip.push(&overlay.peers[0], report).await.unwrap();

        // p1 is p0's only neighbor, so the sample always includes it
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(1, overlay.peers[1].reports().len());
        assert_eq!(
            Some(7.0),
            overlay.peers[1].reports().estimate("quad_count").unwrap(),
        );
    }
}
