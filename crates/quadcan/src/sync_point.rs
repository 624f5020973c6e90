//! Synchronization points: where sibling responses of a spanning
//! (multicast/broadcast) request merge before continuing upward.
//!
//! A peer that fans a request out registers a pending entry here and
//! contributes its own local result immediately. How many children must
//! still arrive is not stored at registration: each returning child
//! carries the fan-out entry its parent pushed, and popping it tells
//! the parent how many siblings to wait for. Only once the local
//! contribution plus that many children have been absorbed does the
//! merged response leave the accumulator. The state is guarded so
//! concurrent arrivals cannot race past the "all children arrived"
//! check.

use crate::message::{Request, RequestId, Response};
use quadcan_types::share::Share;
use quadcan_types::{CanError, CanResult};
use std::collections::HashMap;

struct SyncPoint {
    // learned from the first child's popped reverse-path entry;
    // includes the local contribution
    expected: Option<usize>,
    received: usize,
    merged: Option<Response>,
    request: Request,
}

/// The per-peer table of pending synchronization points, keyed by
/// request id.
#[derive(Clone)]
pub struct SyncPoints(Share<HashMap<RequestId, SyncPoint>>);

impl Default for SyncPoints {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncPoints {
    /// An empty table.
    pub fn new() -> Self {
        Self(Share::new(HashMap::new()))
    }

    /// Register a pending synchronization point for `request`. The
    /// request is retained as received (its reverse-path stack minus
    /// this peer's own push) so the merged response can continue upward
    /// from it.
    pub fn register(&self, request: Request) -> CanResult<()> {
        self.0.share_mut(|points, _| {
            let prev = points.insert(
                request.id,
                SyncPoint {
                    expected: None,
                    received: 0,
                    merged: None,
                    request,
                },
            );
            if prev.is_some() {
                tracing::warn!("replaced an existing synchronization point");
            }
            Ok(())
        })
    }

    /// Absorb the fanning peer's own local result. Never completes the
    /// point: a point is only registered when at least one child is
    /// still out.
    pub fn absorb_local(&self, resp: Response) -> CanResult<()> {
        self.0.share_mut(|points, _| {
            let point = Self::entry(points, resp.request_id)?;
            Self::merge(point, resp);
            Ok(())
        })
    }

    /// Absorb one child response whose popped reverse-path entry said
    /// `expected_children` siblings were fanned out. Returns the merged
    /// response together with the retained request once the local
    /// contribution plus all children have arrived, `None` while still
    /// waiting.
    pub fn absorb_child(
        &self,
        resp: Response,
        expected_children: usize,
    ) -> CanResult<Option<(Response, Request)>> {
        self.0.share_mut(|points, _| {
            let id = resp.request_id;
            let point = Self::entry(points, id)?;
            // the +1 is the local contribution absorbed at fan-out
            point.expected.get_or_insert(expected_children + 1);
            Self::merge(point, resp);
            if point.expected.is_some_and(|e| point.received >= e) {
                let point = points.remove(&id).expect("entry present");
                let merged = point.merged.expect("at least one response merged");
                Ok(Some((merged, point.request)))
            } else {
                Ok(None)
            }
        })
    }

    fn entry(
        points: &mut HashMap<RequestId, SyncPoint>,
        id: RequestId,
    ) -> CanResult<&mut SyncPoint> {
        points.get_mut(&id).ok_or_else(|| {
            CanError::NoRoute(
                format!("no synchronization point pending for request {}", id).into(),
            )
        })
    }

    fn merge(point: &mut SyncPoint, resp: Response) {
        match &mut point.merged {
            None => point.merged = Some(resp),
            Some(merged) => merged.merge_from(resp),
        }
        point.received += 1;
    }

    /// Number of pending synchronization points.
    pub fn len(&self) -> usize {
        self.0.share_ref(|p| Ok(p.len())).unwrap_or(0)
    }

    /// True when nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::Payload;

    fn child(req: &Request, count: u64) -> Response {
        let mut r = Response::empty_for(req);
        r.payload = Payload::Count(count);
        r.inbound_hop_count = 1;
        r
    }

    #[test]
    fn merge_waits_for_the_local_result_and_all_children() {
        let points = SyncPoints::new();
        let req = Request::broadcast();
        points.register(req.clone()).unwrap();
        points.absorb_local(child(&req, 1)).unwrap();

        // each child reports the same fan-out width
        assert!(points.absorb_child(child(&req, 2), 2).unwrap().is_none());
        let (merged, kept) = points.absorb_child(child(&req, 4), 2).unwrap().unwrap();

        assert_eq!(Payload::Count(7), merged.payload);
        assert_eq!(3, merged.inbound_hop_count);
        assert_eq!(req.id, kept.id);
        assert!(points.is_empty());
    }

    #[test]
    fn local_result_alone_never_completes() {
        let points = SyncPoints::new();
        let req = Request::broadcast();
        points.register(req.clone()).unwrap();

        points.absorb_local(child(&req, 1)).unwrap();
        assert_eq!(1, points.len());
    }

    #[test]
    fn unknown_request_is_an_error() {
        let points = SyncPoints::new();
        let req = Request::broadcast();
        assert!(points.absorb_child(child(&req, 1), 1).is_err());
    }
}
