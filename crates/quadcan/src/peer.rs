//! The peer actor: one tokio task owning a zone, a neighbor view and
//! the request/response state machines of all four disciplines.
//!
//! All mutation funnels through the actor's mailbox, so zone splits,
//! neighbor updates and in-flight routing never race. The only await
//! point inside the loop is the local storage action; cross-peer sends
//! are spawned so two peers posting to each other cannot deadlock on
//! full mailboxes.
//!
//! There is no synchronous failure channel on the routing paths: a
//! request that dead-ends or is dropped by a deactivated peer surfaces
//! to the caller only as a timeout. No retries are attempted.

use crate::message::{
    Discipline, HopRecord, PeerResult, Request, RequestId, Response, ResponseMemory,
    ReversePathEntry, RoutingMemory,
};
use crate::router::{GreedyNextHop, Routers, RoutingDecision};
use crate::storage::DynStorageAction;
use crate::sync_point::SyncPoints;
use crate::transport::{DynTransport, OverlayMsg};
use quadcan_types::config::CanTuningParams;
use quadcan_types::peer::{Neighbor, NeighborTable, PeerId, PeerStatus};
use quadcan_types::report::LoadReportStore;
use quadcan_types::timeout::CanTimeout;
use quadcan_types::zone::Zone;
use quadcan_types::{CanError, CanResult};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

const MAILBOX_DEPTH: usize = 1024;

/// The mutable identity of a peer: who it is, whether it is serving,
/// which zone it owns and which neighbors it knows.
#[derive(Clone, Debug)]
pub struct PeerState {
    /// This peer's id.
    pub id: PeerId,
    /// Whether this peer currently accepts requests.
    pub status: PeerStatus,
    /// The zone this peer is responsible for.
    pub zone: Zone,
    /// Known adjacent peers.
    pub neighbors: NeighborTable,
}

impl PeerState {
    /// A fresh activated peer owning `zone` with no neighbors yet.
    pub fn new(id: impl Into<PeerId>, zone: Zone) -> Self {
        Self {
            id: id.into(),
            status: PeerStatus::Activated,
            zone,
            neighbors: NeighborTable::new(),
        }
    }
}

pub(crate) enum PeerCmd {
    Submit {
        req: Request,
        reply: oneshot::Sender<Response>,
    },
    Incoming(OverlayMsg),
    SetStatus(PeerStatus),
    SetZone(Zone),
    UpsertNeighbor(Neighbor),
    RemoveNeighbor(PeerId),
    Snapshot(oneshot::Sender<PeerState>),
}

/// Cloneable handle to a spawned peer actor.
#[derive(Clone)]
pub struct Peer {
    id: PeerId,
    cmd: mpsc::Sender<PeerCmd>,
    reports: LoadReportStore,
    tuning: CanTuningParams,
}

impl std::fmt::Debug for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Peer").field("id", &self.id).finish()
    }
}

impl Peer {
    /// Spawn the actor task and return its handle.
    pub fn spawn(
        state: PeerState,
        storage: DynStorageAction,
        transport: DynTransport,
        reports: LoadReportStore,
        tuning: CanTuningParams,
    ) -> Peer {
        let (cmd_send, cmd_recv) = mpsc::channel(MAILBOX_DEPTH);
        let handle = Peer {
            id: state.id.clone(),
            cmd: cmd_send,
            reports: reports.clone(),
            tuning: tuning.clone(),
        };
        let inner = PeerInner {
            state,
            storage,
            transport,
            reports,
            routers: Routers::new(
                Arc::new(GreedyNextHop),
                tuning.routing_fan_out_limit,
            ),
            tuning,
            sync_points: SyncPoints::new(),
            waiters: HashMap::new(),
            seen: SeenRequests::new(),
        };
        tokio::spawn(inner.run(cmd_recv));
        handle
    }

    /// This peer's id.
    pub fn id(&self) -> &PeerId {
        &self.id
    }

    /// The gossip-fed store of remote load reports.
    pub fn reports(&self) -> &LoadReportStore {
        &self.reports
    }

    /// The tuning parameters this peer was spawned with.
    pub fn tuning(&self) -> &CanTuningParams {
        &self.tuning
    }

    /// Submit a request originating here and await its terminal
    /// response, bounded by the default rpc timeout.
    pub async fn submit(&self, req: Request) -> CanResult<Response> {
        self.submit_timeout(req, CanTimeout::from_millis(self.tuning.default_rpc_timeout_ms))
            .await
    }

    /// Submit a request originating here with an explicit deadline.
    pub async fn submit_timeout(
        &self,
        req: Request,
        timeout: CanTimeout,
    ) -> CanResult<Response> {
        let (reply, rx) = oneshot::channel();
        self.cmd
            .send(PeerCmd::Submit { req, reply })
            .await
            .map_err(|_| CanError::Closed)?;
        timeout
            .mix(async move { rx.await.map_err(|_| CanError::Closed) })
            .await
    }

    /// Hand an overlay message arriving from the network to the actor.
    pub async fn incoming(&self, msg: OverlayMsg) -> CanResult<()> {
        self.cmd
            .send(PeerCmd::Incoming(msg))
            .await
            .map_err(|_| CanError::Closed)
    }

    /// Change this peer's serving status.
    pub async fn set_status(&self, status: PeerStatus) -> CanResult<()> {
        self.cmd
            .send(PeerCmd::SetStatus(status))
            .await
            .map_err(|_| CanError::Closed)
    }

    /// Replace this peer's zone (takeover/split hand-off).
    pub async fn set_zone(&self, zone: Zone) -> CanResult<()> {
        self.cmd
            .send(PeerCmd::SetZone(zone))
            .await
            .map_err(|_| CanError::Closed)
    }

    /// Insert or refresh a neighbor entry.
    pub async fn upsert_neighbor(&self, neighbor: Neighbor) -> CanResult<()> {
        self.cmd
            .send(PeerCmd::UpsertNeighbor(neighbor))
            .await
            .map_err(|_| CanError::Closed)
    }

    /// Forget a neighbor.
    pub async fn remove_neighbor(&self, id: PeerId) -> CanResult<()> {
        self.cmd
            .send(PeerCmd::RemoveNeighbor(id))
            .await
            .map_err(|_| CanError::Closed)
    }

    /// A consistent copy of the peer's current state.
    pub async fn snapshot(&self) -> CanResult<PeerState> {
        let (tx, rx) = oneshot::channel();
        self.cmd
            .send(PeerCmd::Snapshot(tx))
            .await
            .map_err(|_| CanError::Closed)?;
        rx.await.map_err(|_| CanError::Closed)
    }
}

struct PeerInner {
    state: PeerState,
    storage: DynStorageAction,
    transport: DynTransport,
    reports: LoadReportStore,
    routers: Routers,
    tuning: CanTuningParams,
    sync_points: SyncPoints,
    waiters: HashMap<RequestId, oneshot::Sender<Response>>,
    seen: SeenRequests,
}

/// Bounded record of spanning request ids already handled, so duplicate
/// fan-out copies are answered without re-flooding. Oldest entries are
/// evicted beyond the cap; by then their requests have long resolved.
struct SeenRequests {
    order: std::collections::VecDeque<RequestId>,
    ids: HashSet<RequestId>,
}

impl SeenRequests {
    const CAP: usize = 4096;

    fn new() -> Self {
        Self {
            order: std::collections::VecDeque::new(),
            ids: HashSet::new(),
        }
    }

    /// True when `id` was not seen before.
    fn insert(&mut self, id: RequestId) -> bool {
        if !self.ids.insert(id) {
            return false;
        }
        self.order.push_back(id);
        if self.order.len() > Self::CAP {
            if let Some(old) = self.order.pop_front() {
                self.ids.remove(&old);
            }
        }
        true
    }
}

impl PeerInner {
    async fn run(mut self, mut cmd_recv: mpsc::Receiver<PeerCmd>) {
        while let Some(cmd) = cmd_recv.recv().await {
            match cmd {
                PeerCmd::Submit { req, reply } => {
                    if !self.state.status.is_activated() {
                        // dropping the reply sender surfaces as Closed
                        tracing::debug!(
                            peer = %self.state.id,
                            "not activated, refusing submitted request",
                        );
                        continue;
                    }
                    self.waiters.insert(req.id, reply);
                    self.handle_request(req).await;
                }
                PeerCmd::Incoming(OverlayMsg::Request(req)) => {
                    if !self.state.status.is_activated() {
                        tracing::debug!(
                            peer = %self.state.id,
                            id = %req.id,
                            "not activated, dropping request",
                        );
                        continue;
                    }
                    self.handle_request(req).await;
                }
                PeerCmd::Incoming(OverlayMsg::Response(resp)) => {
                    self.handle_response(resp);
                }
                PeerCmd::Incoming(OverlayMsg::Gossip(report)) => {
                    if let Err(err) = self.reports.record(report) {
                        tracing::warn!(?err, "failed to record gossiped load report");
                    }
                }
                PeerCmd::SetStatus(status) => self.state.status = status,
                PeerCmd::SetZone(zone) => self.state.zone = zone,
                PeerCmd::UpsertNeighbor(n) => self.state.neighbors.upsert(n),
                PeerCmd::RemoveNeighbor(id) => {
                    self.state.neighbors.remove(&id);
                }
                PeerCmd::Snapshot(tx) => {
                    let _ = tx.send(self.state.clone());
                }
            }
        }
    }

    async fn handle_request(&mut self, mut req: Request) {
        // an incomplete neighbor view can route a request in a cycle;
        // the hop budget makes it die instead of circulating until the
        // caller times out
        if req.outbound_hop_count >= self.tuning.routing_hop_limit {
            tracing::debug!(
                peer = %self.state.id,
                id = %req.id,
                hops = req.outbound_hop_count,
                "hop budget exhausted, dropping request",
            );
            return;
        }

        // a spanning request reaching us twice through different
        // branches is answered with an empty, non-contributing
        // response so the sender's child accounting still closes
        if matches!(req.memory, RoutingMemory::Spanning { .. })
            && !self.seen.insert(req.id)
        {
            tracing::debug!(peer = %self.state.id, id = %req.id, "duplicate fan-out");
            self.ascend(Response::empty_for(&req));
            return;
        }

        // anycast records every visited peer, satisfied or not
        if let RoutingMemory::Anycast { trail } = &mut req.memory {
            trail.push(HopRecord {
                peer: self.state.id.clone(),
                validated: req.key.validates_zone(&self.state.zone),
            });
        }

        match self.routers.decide(&self.state.zone, &self.state.neighbors, &req) {
            RoutingDecision::Deliver => {
                let resp = self.before_sending_back(&req).await;
                self.ascend(resp);
            }
            RoutingDecision::Forward(next) => {
                req.outbound_hop_count += 1;
                self.post(next, OverlayMsg::Request(req));
            }
            RoutingDecision::FanOut(targets) => self.fan_out(req, targets).await,
            RoutingDecision::Unroutable => {
                tracing::debug!(
                    peer = %self.state.id,
                    id = %req.id,
                    "unroutable request dropped",
                );
            }
        }
    }

    /// Fan a spanning request out to `targets`, contributing the local
    /// result through a synchronization point keyed by the request id.
    async fn fan_out(&mut self, req: Request, targets: Vec<PeerId>) {
        let local = self.before_sending_back(&req).await;
        if targets.is_empty() {
            // leaf of the spanning flood
            self.ascend(local);
            return;
        }

        // the sync point retains the request as received, so the merged
        // response ascends under the stack of *our* ancestors; the
        // child count is not recorded here - returning children carry
        // it in the entry pushed below
        if let Err(err) = self.sync_points.register(req.clone()) {
            tracing::warn!(?err, id = %req.id, "failed to register sync point");
            return;
        }
        if let Err(err) = self.sync_points.absorb_local(local) {
            tracing::warn!(?err, id = %req.id, "failed to absorb local result");
            return;
        }

        let mut child = req;
        child.outbound_hop_count += 1;
        if let RoutingMemory::Spanning { reverse_path } = &mut child.memory {
            reverse_path.push(ReversePathEntry {
                parent: self.state.id.clone(),
                expected_children: targets.len(),
            });
        }
        for target in targets {
            self.post(target, OverlayMsg::Request(child.clone()));
        }
    }

    fn handle_response(&mut self, resp: Response) {
        match resp.discipline {
            Discipline::Forward | Discipline::Anycast => self.ascend(resp),
            Discipline::Multicast | Discipline::Broadcast => {
                // the topmost entry is the one we pushed at fan-out;
                // popping it tells us how many siblings to wait for
                let mut resp = resp;
                let entry = match &mut resp.memory {
                    ResponseMemory::Stack(stack) => stack.pop(),
                    _ => None,
                };
                let entry = match entry {
                    Some(entry) => entry,
                    None => {
                        tracing::debug!(
                            peer = %self.state.id,
                            "spanning response without a reverse-path entry",
                        );
                        return;
                    }
                };
                if entry.parent != self.state.id {
                    tracing::warn!(
                        peer = %self.state.id,
                        addressed_to = %entry.parent,
                        "spanning response reverse path out of order",
                    );
                }
                match self.sync_points.absorb_child(resp, entry.expected_children) {
                    Ok(None) => {}
                    Ok(Some((merged, _req))) => self.ascend(merged),
                    Err(err) => {
                        tracing::debug!(
                            peer = %self.state.id,
                            ?err,
                            "stray spanning response",
                        );
                    }
                }
            }
        }
    }

    /// Move a response one step up its reverse path, or deliver it to
    /// the local waiter when the path is exhausted.
    fn ascend(&mut self, mut resp: Response) {
        let next = match &mut resp.memory {
            ResponseMemory::Direct { target } => {
                if target == &self.state.id {
                    None
                } else {
                    Some(target.clone())
                }
            }
            ResponseMemory::Trail(trail) => {
                // the topmost entry is ourselves; popping it exposes
                // the previous hop, which pops itself in turn
                match trail.pop() {
                    Some(hop) if hop.peer == self.state.id => {}
                    Some(hop) => tracing::warn!(
                        peer = %self.state.id,
                        top = %hop.peer,
                        "anycast trail out of order",
                    ),
                    None => {}
                }
                trail.last().map(|prev| prev.peer.clone())
            }
            // the receiving parent pops the entry, not us: it carries
            // the sibling count that parent's synchronization point
            // is waiting to learn
            ResponseMemory::Stack(stack) => stack.last().map(|entry| entry.parent.clone()),
        };
        match next {
            Some(to) => {
                resp.inbound_hop_count += 1;
                self.post(to, OverlayMsg::Response(resp));
            }
            None => self.deliver(resp),
        }
    }

    /// Attach the local contribution to an empty response if this
    /// peer's zone and status validate the key.
    async fn before_sending_back(&mut self, req: &Request) -> Response {
        let mut resp = Response::empty_for(req);
        if !req.key.validates_peer(self.state.status, &self.state.zone) {
            return resp;
        }
        match self.storage.execute(req.key.clone()).await {
            Ok((payload, duration)) => {
                resp.action_duration += duration;
                resp.results.push(PeerResult {
                    peer: self.state.id.clone(),
                    payload: payload.clone(),
                    duration,
                });
                resp.payload.merge(payload);
            }
            Err(err) => {
                tracing::warn!(
                    peer = %self.state.id,
                    id = %req.id,
                    ?err,
                    "local storage action failed",
                );
            }
        }
        resp
    }

    fn deliver(&mut self, resp: Response) {
        match self.waiters.remove(&resp.request_id) {
            Some(waiter) => {
                // a closed waiter just timed out; nothing to do
                let _ = waiter.send(resp);
            }
            None => {
                tracing::debug!(
                    peer = %self.state.id,
                    id = %resp.request_id,
                    "terminal response with no waiter",
                );
            }
        }
    }

    /// Post a message to another peer without blocking the actor loop.
    fn post(&self, to: PeerId, msg: OverlayMsg) {
        let transport = self.transport.clone();
        tokio::spawn(async move {
            if let Err(err) = transport.send(to.clone(), msg).await {
                tracing::warn!(%to, ?err, "overlay send failed");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemStore, NullAction};
    use crate::transport::MemTransport;
    use pretty_assertions::assert_eq;
    use quadcan_types::coords::Quadruple;
    use std::sync::Arc;

    fn spawn_solo(store: MemStore) -> (Peer, MemTransport) {
        let transport = MemTransport::new();
        let peer = Peer::spawn(
            PeerState::new("p1", Zone::full()),
            Arc::new(store),
            Arc::new(transport.clone()),
            LoadReportStore::new(),
            CanTuningParams::default(),
        );
        transport.register(peer.clone()).unwrap();
        (peer, transport)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn solo_forward_lookup_delivers_locally() {
        let store = MemStore::new();
        store.insert(Quadruple::new("g", "s", "p", "o")).unwrap();
        let (peer, _transport) = spawn_solo(store);

        let target = Quadruple::new("g", "s", "p", "o").point();
        let req = Request::forward(peer.id().clone(), target);
        let resp = peer.submit(req).await.unwrap();

        assert_eq!(0, resp.outbound_hop_count);
        assert_eq!(0, resp.inbound_hop_count);
        assert_eq!(1, resp.results.len());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn solo_broadcast_is_a_leaf() {
        let (peer, _transport) = spawn_solo(MemStore::new());
        let resp = peer.submit(Request::broadcast()).await.unwrap();
        assert_eq!(1, resp.results.len());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn deactivated_peer_refuses_submissions() {
        let (peer, _transport) = spawn_solo(MemStore::new());
        peer.set_status(PeerStatus::Updating).await.unwrap();

        let req = Request::broadcast();
        let err = peer
            .submit_timeout(req, CanTimeout::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, CanError::Closed));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn exhausted_hop_budget_drops_a_request() {
        let store = MemStore::new();
        store.insert(Quadruple::new("g", "s", "p", "o")).unwrap();
        let (peer, _transport) = spawn_solo(store);

        // the local zone contains the target, but a request arriving
        // with its budget spent is dropped, not delivered
        let mut req =
            Request::forward(peer.id().clone(), Quadruple::new("g", "s", "p", "o").point());
        req.outbound_hop_count = peer.tuning().routing_hop_limit;
        let err = peer
            .submit_timeout(req, CanTimeout::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, CanError::TimedOut));
    }

    #[test]
    fn duplicate_suppression_is_bounded() {
        let mut seen = SeenRequests::new();
        let first = RequestId::random();
        assert!(seen.insert(first));
        assert!(!seen.insert(first));

        let mut added = 0;
        while added < SeenRequests::CAP {
            if seen.insert(RequestId::random()) {
                added += 1;
            }
        }
        // the oldest entry has been evicted and reads as fresh again
        assert!(seen.insert(first));
        assert!(seen.ids.len() <= SeenRequests::CAP);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn gossip_feeds_the_report_store() {
        let (peer, _transport) = spawn_solo(MemStore::new());
        let report =
            quadcan_types::report::LoadReport::new("p2".into()).with("quads", 12.0);
        peer.incoming(OverlayMsg::Gossip(report)).await.unwrap();

        // the actor processes the mailbox asynchronously
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(1, peer.reports().len());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn null_action_still_answers() {
        let transport = MemTransport::new();
        let peer = Peer::spawn(
            PeerState::new("p1", Zone::full()),
            Arc::new(NullAction),
            Arc::new(transport.clone()),
            LoadReportStore::new(),
            CanTuningParams::default(),
        );
        transport.register(peer.clone()).unwrap();
        let resp = peer.submit(Request::broadcast()).await.unwrap();
        assert!(resp.payload.is_empty());
    }
}
