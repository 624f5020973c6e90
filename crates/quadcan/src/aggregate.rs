//! SPARQL-level aggregation: combining the responses of the
//! sub-patterns a query was decomposed into.
//!
//! Query decomposition itself happens outside this core; callers hand
//! over one overlay [`Response`] per sub-pattern and receive a single
//! combined [`SparqlResponse`] with accumulated statistics.

use crate::message::{now_micros, Response};
use crate::payload::{Binding, Payload};
use quadcan_types::coords::Quadruple;
use std::collections::HashSet;
use std::time::{Duration, Instant};

/// The SPARQL query form being combined.
#[derive(Copy, Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum QueryForm {
    /// Boolean existence query.
    Ask,
    /// Variable bindings.
    Select,
    /// Graph-building query; results are a model union.
    Construct,
    /// Resource description; results are a model union.
    Describe,
}

/// The combined result of all sub-queries.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum SparqlResult {
    /// OR-combination of the sub-query ASK answers.
    Ask(bool),
    /// Concatenated SELECT solutions (unordered at this layer).
    Select(Vec<Binding>),
    /// Union of the constructed/described models, duplicates removed.
    Quads(Vec<Quadruple>),
}

/// Statistics accumulated while combining sub-query responses.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SparqlQueryStatistics {
    /// How many sub-queries were combined.
    pub nb_sub_queries: usize,
    /// Cumulative reverse-path hops across all sub-queries.
    pub inbound_hop_count: u64,
    /// Cumulative forward-path hops across all sub-queries.
    pub outbound_hop_count: u64,
    /// Cumulative wall time of the sub-queries (dispatch to combine).
    pub sub_queries_time: Duration,
    /// Cumulative time spent inside datastore actions.
    pub datastore_time: Duration,
    /// Time spent combining the sub-results.
    pub combining_time: Duration,
    /// Overall network execution time: now minus the earliest dispatch
    /// timestamp among all sub-queries.
    pub network_time: Duration,
}

/// A combined SPARQL response.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SparqlResponse {
    /// The query form that was combined.
    pub form: QueryForm,
    /// The combined result.
    pub result: SparqlResult,
    /// Accumulated statistics.
    pub stats: SparqlQueryStatistics,
}

/// Combine sub-query responses with no local filtering.
pub fn combine(form: QueryForm, subs: Vec<Response>) -> SparqlResponse {
    combine_filtered(form, subs, |_| true)
}

/// Combine sub-query responses, applying a local filter first: a
/// sub-response rejected by `filter` contributes to the statistics but
/// not to the result (the "local filtering" step of ASK combination).
pub fn combine_filtered(
    form: QueryForm,
    subs: Vec<Response>,
    filter: impl Fn(&Response) -> bool,
) -> SparqlResponse {
    let started = Instant::now();
    let now = now_micros();

    let mut stats = SparqlQueryStatistics {
        nb_sub_queries: subs.len(),
        ..Default::default()
    };
    let mut earliest_dispatch = now;

    let mut ask = false;
    let mut bindings: Vec<Binding> = Vec::new();
    let mut quads: HashSet<Quadruple> = HashSet::new();

    for sub in subs {
        stats.inbound_hop_count += sub.inbound_hop_count;
        stats.outbound_hop_count += sub.outbound_hop_count;
        stats.datastore_time += sub.action_duration;
        earliest_dispatch = earliest_dispatch.min(sub.dispatched_at_micros);
        let elapsed = now.saturating_sub(sub.dispatched_at_micros).max(0) as u64;
        stats.sub_queries_time += Duration::from_micros(elapsed);

        if !filter(&sub) {
            continue;
        }
        match form {
            QueryForm::Ask => ask |= sub.payload.truthy(),
            QueryForm::Select => match sub.payload {
                Payload::Bindings(mut b) => bindings.append(&mut b),
                Payload::Unit => {}
                other => {
                    tracing::warn!(?other, "non-binding payload in SELECT combination");
                }
            },
            QueryForm::Construct | QueryForm::Describe => match sub.payload {
                Payload::Quads(q) => quads.extend(q),
                Payload::Unit => {}
                other => {
                    tracing::warn!(?other, "non-model payload in {:?} combination", form);
                }
            },
        }
    }

    let result = match form {
        QueryForm::Ask => SparqlResult::Ask(ask),
        QueryForm::Select => SparqlResult::Select(bindings),
        QueryForm::Construct | QueryForm::Describe => {
            SparqlResult::Quads(quads.into_iter().collect())
        }
    };

    stats.network_time =
        Duration::from_micros(now.saturating_sub(earliest_dispatch).max(0) as u64);
    stats.combining_time = started.elapsed();

    SparqlResponse { form, result, stats }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Request;
    use pretty_assertions::assert_eq;

    fn sub(payload: Payload) -> Response {
        let mut r = Response::empty_for(&Request::broadcast());
        r.payload = payload;
        r.inbound_hop_count = 2;
        r.outbound_hop_count = 3;
        r
    }

    #[test]
    fn ask_is_or_combined() {
        let combined = combine(
            QueryForm::Ask,
            vec![sub(Payload::Ask(true)), sub(Payload::Ask(false))],
        );
        assert_eq!(SparqlResult::Ask(true), combined.result);
        assert_eq!(2, combined.stats.nb_sub_queries);
        assert_eq!(4, combined.stats.inbound_hop_count);
        assert_eq!(6, combined.stats.outbound_hop_count);
    }

    #[test]
    fn ask_local_filter_runs_before_or() {
        // both sub-answers are true, but filtering drops them all
        let combined = combine_filtered(
            QueryForm::Ask,
            vec![sub(Payload::Ask(true)), sub(Payload::Ask(true))],
            |_| false,
        );
        assert_eq!(SparqlResult::Ask(false), combined.result);
        // filtered subs still count toward the statistics
        assert_eq!(2, combined.stats.nb_sub_queries);
    }

    #[test]
    fn construct_unions_models() {
        let q1 = Quadruple::new("g", "s", "p", "o1");
        let q2 = Quadruple::new("g", "s", "p", "o2");
        let combined = combine(
            QueryForm::Construct,
            vec![
                sub(Payload::Quads(vec![q1.clone(), q2.clone()])),
                sub(Payload::Quads(vec![q1.clone()])),
            ],
        );
        match combined.result {
            SparqlResult::Quads(quads) => {
                assert_eq!(2, quads.len());
                assert!(quads.contains(&q1) && quads.contains(&q2));
            }
            other => panic!("expected quads, got {:?}", other),
        }
    }

    #[test]
    fn select_concatenates() {
        let b1: Binding = [("x".to_string(), "o1".into())].into_iter().collect();
        let b2: Binding = [("x".to_string(), "o2".into())].into_iter().collect();
        let combined = combine(
            QueryForm::Select,
            vec![
                sub(Payload::Bindings(vec![b1.clone()])),
                sub(Payload::Bindings(vec![b2.clone()])),
            ],
        );
        assert_eq!(SparqlResult::Select(vec![b1, b2]), combined.result);
    }
}
