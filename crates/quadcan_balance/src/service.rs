//! The fixed-delay evaluation loop and its classification rules.

use crate::criteria::DynCriterion;
use crate::gossip::DynGossipStrategy;
use quadcan::peer::Peer;
use quadcan_types::report::LoadReport;
use quadcan_types::share::Share;
use quadcan_types::CanResult;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// How a measurement compares to the estimated normal load.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LoadState {
    /// `measurement >= estimate * k1`.
    Overloaded,
    /// Neither bound crossed.
    Normal,
    /// `measurement < estimate * k2`.
    Underloaded,
}

impl LoadState {
    /// Classify a measurement against an estimate. Overload wins when
    /// the factors make both bounds true.
    pub fn classify(measurement: f64, estimate: f64, k1: f64, k2: f64) -> Self {
        if measurement >= estimate * k1 {
            LoadState::Overloaded
        } else if measurement < estimate * k2 {
            LoadState::Underloaded
        } else {
            LoadState::Normal
        }
    }
}

/// The outcome of one load evaluation pass.
///
/// `criterion` names the first criterion that crossed a bound, or is
/// `None` when every criterion is normal; the numbers then describe the
/// first registered criterion.
#[derive(Clone, Debug, PartialEq)]
pub struct LoadEvaluation {
    /// The imbalanced criterion, if any.
    pub criterion: Option<Box<str>>,
    /// The classification.
    pub state: LoadState,
    /// The local measurement behind the classification.
    pub measurement: f64,
    /// The estimate it was compared against.
    pub estimate: f64,
}

impl LoadEvaluation {
    fn normal() -> Self {
        Self {
            criterion: None,
            state: LoadState::Normal,
            measurement: 0.0,
            estimate: 0.0,
        }
    }
}

struct Inner {
    peer: Peer,
    criteria: Vec<DynCriterion>,
    gossip: Option<DynGossipStrategy>,
    relative: bool,
    stopping: AtomicBool,
    notify: Notify,
    tasks: Share<Vec<JoinHandle<()>>>,
}

/// Periodic load evaluation for one peer.
///
/// Evaluation itself has no side effects; only [`tick`](Self::tick)
/// invokes the balancing hooks, and a tick that fails is logged and
/// swallowed so the loop never dies.
#[derive(Clone)]
pub struct LoadBalancer(Arc<Inner>);

impl LoadBalancer {
    /// Absolute mode: every criterion is compared against its own
    /// emergency threshold (`k1 = 1`), and nothing is ever underloaded
    /// (`k2 = 0`). No gossip runs.
    pub fn absolute(peer: Peer, criteria: Vec<DynCriterion>) -> Self {
        Self(Arc::new(Inner {
            peer,
            criteria,
            gossip: None,
            relative: false,
            stopping: AtomicBool::new(false),
            notify: Notify::new(),
            tasks: Share::new(Vec::new()),
        }))
    }

    /// Relative mode: estimates come from the mean of gossiped neighbor
    /// reports (falling back to the emergency threshold while none have
    /// arrived), compared with the configured k1/k2 factors, and a
    /// gossip loop pushes the local report out.
    pub fn relative(
        peer: Peer,
        criteria: Vec<DynCriterion>,
        gossip: DynGossipStrategy,
    ) -> Self {
        Self(Arc::new(Inner {
            peer,
            criteria,
            gossip: Some(gossip),
            relative: true,
            stopping: AtomicBool::new(false),
            notify: Notify::new(),
            tasks: Share::new(Vec::new()),
        }))
    }

    fn factors(&self) -> (f64, f64) {
        if self.0.relative {
            let tuning = self.0.peer.tuning();
            (tuning.load_balancing_k1, tuning.load_balancing_k2)
        } else {
            (1.0, 0.0)
        }
    }

    fn estimate_for(&self, criterion: &dyn crate::criteria::Criterion) -> f64 {
        if self.0.relative {
            match self.0.peer.reports().estimate(criterion.name()) {
                Ok(Some(mean)) => return mean,
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(?err, "report store unavailable, using threshold");
                }
            }
        }
        criterion.emergency_threshold()
    }

    /// Evaluate every criterion without acting on the result.
    pub async fn evaluate_load_state(&self) -> CanResult<LoadEvaluation> {
        let (k1, k2) = self.factors();
        let mut first: Option<LoadEvaluation> = None;
        for criterion in &self.0.criteria {
            let measurement = criterion.load(&self.0.peer).await?;
            let estimate = self.estimate_for(criterion.as_ref());
            let state = LoadState::classify(measurement, estimate, k1, k2);
            if state != LoadState::Normal {
                return Ok(LoadEvaluation {
                    criterion: Some(criterion.name().into()),
                    state,
                    measurement,
                    estimate,
                });
            }
            if first.is_none() {
                first = Some(LoadEvaluation {
                    criterion: None,
                    state,
                    measurement,
                    estimate,
                });
            }
        }
        Ok(first.unwrap_or_else(LoadEvaluation::normal))
    }

    /// One evaluation pass. Criteria are checked in registration order
    /// and only the first one that crossed a bound gets its balancing
    /// hook invoked; the rest wait for a later tick. Skipped entirely
    /// while the peer is not activated.
    pub async fn tick(&self) -> CanResult<()> {
        let state = self.0.peer.snapshot().await?;
        if !state.status.is_activated() {
            tracing::debug!(peer = %self.0.peer.id(), "not activated, skipping tick");
            return Ok(());
        }
        let (k1, k2) = self.factors();
        for criterion in &self.0.criteria {
            let measurement = criterion.load(&self.0.peer).await?;
            let estimate = self.estimate_for(criterion.as_ref());
            match LoadState::classify(measurement, estimate, k1, k2) {
                LoadState::Overloaded => {
                    tracing::debug!(
                        peer = %self.0.peer.id(),
                        criterion = criterion.name(),
                        measurement,
                        estimate,
                        "overloaded",
                    );
                    return criterion.balance_overload(&self.0.peer).await;
                }
                LoadState::Underloaded => {
                    tracing::debug!(
                        peer = %self.0.peer.id(),
                        criterion = criterion.name(),
                        measurement,
                        estimate,
                        "underloaded",
                    );
                    return criterion.balance_underload(&self.0.peer).await;
                }
                LoadState::Normal => {}
            }
        }
        Ok(())
    }

    /// Measure every criterion into one report and gossip it out.
    async fn push_report(&self) -> CanResult<()> {
        let gossip = match &self.0.gossip {
            Some(g) => g.clone(),
            None => return Ok(()),
        };
        let mut report = LoadReport::new(self.0.peer.id().clone());
        for criterion in &self.0.criteria {
            let measurement = criterion.load(&self.0.peer).await?;
            report = report.with(criterion.name(), measurement);
        }
        gossip.push(&self.0.peer, report).await
    }

    /// Spawn the evaluation loop (and, in relative mode, the gossip
    /// loop). Fixed delay: the period is counted from the end of one
    /// pass to the start of the next.
    pub fn start(&self) {
        let tuning = self.0.peer.tuning().clone();

        let this = self.clone();
        let period = Duration::from_millis(tuning.load_balancing_period_ms);
        self.track(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = this.0.notify.notified() => break,
                    _ = tokio::time::sleep(period) => {}
                }
                if this.0.stopping.load(Ordering::SeqCst) {
                    break;
                }
                if let Err(err) = this.tick().await {
                    tracing::warn!(?err, "load balancing tick failed");
                }
            }
        }));

        if self.0.gossip.is_some() {
            let this = self.clone();
            let period = Duration::from_millis(tuning.gossip_period_ms);
            self.track(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = this.0.notify.notified() => break,
                        _ = tokio::time::sleep(period) => {}
                    }
                    if this.0.stopping.load(Ordering::SeqCst) {
                        break;
                    }
                    if let Err(err) = this.push_report().await {
                        tracing::warn!(?err, "load report gossip failed");
                    }
                }
            }));
        }
    }

    fn track(&self, handle: JoinHandle<()>) {
        // when already stopped the task is left to observe the stop
        // flag on its own
        let _ = self.0.tasks.share_mut(move |tasks, _| {
            tasks.push(handle);
            Ok(())
        });
    }

    /// Signal the loops to stop and wait a bounded time for each; a
    /// loop still running after the wait is aborted.
    pub async fn stop(&self) {
        self.0.stopping.store(true, Ordering::SeqCst);
        self.0.notify.notify_waiters();
        let handles = self
            .0
            .tasks
            .share_mut(|tasks, close| {
                *close = true;
                Ok(std::mem::take(tasks))
            })
            .unwrap_or_default();
        let wait = Duration::from_millis(self.0.peer.tuning().shutdown_wait_ms);
        for mut handle in handles {
            if tokio::time::timeout(wait, &mut handle).await.is_err() {
                handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::TestCriterion;
    use crate::gossip::RandomNeighborGossip;
    use pretty_assertions::assert_eq;
    use quadcan::test_utils::TestOverlay;
    use quadcan_types::peer::PeerStatus;

    #[test]
    fn classification_bounds() {
        // relative factors
        assert_eq!(LoadState::Overloaded, LoadState::classify(20.0, 10.0, 2.0, 0.5));
        assert_eq!(LoadState::Normal, LoadState::classify(19.9, 10.0, 2.0, 0.5));
        assert_eq!(LoadState::Normal, LoadState::classify(5.0, 10.0, 2.0, 0.5));
        assert_eq!(LoadState::Underloaded, LoadState::classify(4.9, 10.0, 2.0, 0.5));
        // absolute factors: the threshold itself overloads, and nothing
        // is ever underloaded
        assert_eq!(LoadState::Overloaded, LoadState::classify(10.0, 10.0, 1.0, 0.0));
        assert_eq!(LoadState::Normal, LoadState::classify(0.0, 10.0, 1.0, 0.0));
        // mixed factors
        assert_eq!(LoadState::Overloaded, LoadState::classify(120.0, 100.0, 1.0, 0.5));
        assert_eq!(LoadState::Underloaded, LoadState::classify(40.0, 100.0, 1.0, 0.5));
        assert_eq!(LoadState::Normal, LoadState::classify(70.0, 100.0, 1.0, 0.5));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn evaluation_has_no_side_effects() {
        let overlay = TestOverlay::line(&[]).await;
        let criterion = Arc::new(TestCriterion::new("load", 10.0));
        criterion.set_load(50.0);
        let overloads = criterion.overloads.clone();
        let balancer =
            LoadBalancer::absolute(overlay.peers[0].clone(), vec![criterion]);

        let first = balancer.evaluate_load_state().await.unwrap();
        let second = balancer.evaluate_load_state().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(LoadState::Overloaded, first.state);
        assert_eq!(Some("load".into()), first.criterion);
        assert_eq!(0, overloads.load(Ordering::SeqCst));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn tick_invokes_the_overload_hook() {
        let overlay = TestOverlay::line(&[]).await;
        let criterion = Arc::new(TestCriterion::new("load", 10.0));
        criterion.set_load(50.0);
        let overloads = criterion.overloads.clone();
        let underloads = criterion.underloads.clone();
        let balancer =
            LoadBalancer::absolute(overlay.peers[0].clone(), vec![criterion]);

        balancer.tick().await.unwrap();

        assert_eq!(1, overloads.load(Ordering::SeqCst));
        assert_eq!(0, underloads.load(Ordering::SeqCst));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn tick_acts_on_the_first_imbalanced_criterion_only() {
        let overlay = TestOverlay::line(&[]).await;
        let first = Arc::new(TestCriterion::new("cpu", 10.0));
        first.set_load(50.0);
        let second = Arc::new(TestCriterion::new("disk", 10.0));
        second.set_load(50.0);
        let o1 = first.overloads.clone();
        let o2 = second.overloads.clone();
        let balancer =
            LoadBalancer::absolute(overlay.peers[0].clone(), vec![first, second]);

        balancer.tick().await.unwrap();

        assert_eq!(1, o1.load(Ordering::SeqCst));
        assert_eq!(0, o2.load(Ordering::SeqCst));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn tick_skips_a_non_activated_peer() {
        let overlay = TestOverlay::line(&[]).await;
        overlay.peers[0]
            .set_status(PeerStatus::Updating)
            .await
            .unwrap();
        let criterion = Arc::new(TestCriterion::new("load", 10.0));
        criterion.set_load(50.0);
        let overloads = criterion.overloads.clone();
        let balancer =
            LoadBalancer::absolute(overlay.peers[0].clone(), vec![criterion]);

        balancer.tick().await.unwrap();

        assert_eq!(0, overloads.load(Ordering::SeqCst));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn relative_estimate_is_the_report_mean() {
        let overlay = TestOverlay::line(&[]).await;
        let peer = overlay.peers[0].clone();
        for (who, value) in [("p1", 10.0), ("p2", 20.0), ("p3", 30.0)] {
            peer.reports()
                .record(LoadReport::new(who.into()).with("load", value))
                .unwrap();
        }
        let criterion = Arc::new(TestCriterion::new("load", 1000.0));
        criterion.set_load(50.0);
        let gossip = Arc::new(RandomNeighborGossip::new(
            Arc::new(overlay.transport.clone()),
            3,
        ));
        let balancer = LoadBalancer::relative(peer, vec![criterion.clone()], gossip);

        // mean is 20; defaults k1 = 2.0, so 50 >= 40 overloads
        let eval = balancer.evaluate_load_state().await.unwrap();
        assert_eq!(LoadState::Overloaded, eval.state);
        assert_eq!(20.0, eval.estimate);

        // 9 < 20 * 0.5 underloads
        criterion.set_load(9.0);
        let eval = balancer.evaluate_load_state().await.unwrap();
        assert_eq!(LoadState::Underloaded, eval.state);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn relative_mode_falls_back_to_the_threshold() {
        let overlay = TestOverlay::line(&[]).await;
        let criterion = Arc::new(TestCriterion::new("load", 100.0));
        criterion.set_load(50.0);
        let gossip = Arc::new(RandomNeighborGossip::new(
            Arc::new(overlay.transport.clone()),
            3,
        ));
        let balancer =
            LoadBalancer::relative(overlay.peers[0].clone(), vec![criterion], gossip);

        // no reports yet: the emergency threshold stands in
        let eval = balancer.evaluate_load_state().await.unwrap();
        assert_eq!(100.0, eval.estimate);
        assert_eq!(LoadState::Normal, eval.state);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stop_is_bounded() {
        let overlay = TestOverlay::line(&[]).await;
        let criterion = Arc::new(TestCriterion::new("load", 10.0));
        let balancer =
            LoadBalancer::absolute(overlay.peers[0].clone(), vec![criterion]);
        balancer.start();

        tokio::time::timeout(Duration::from_secs(10), balancer.stop())
            .await
            .expect("stop() must complete within the bounded wait");
    }
}
