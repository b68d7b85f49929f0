use crate::grouping::GroupAssignment;
use crate::retrieval::{RetrievalCandidate, Signal, rank_order};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

/// How member tool scores combine into a group score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    /// Best member score. A single strong match beats many weak ones.
    #[default]
    Max,
    Sum,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutingDecision {
    pub group_id: String,
    pub tool_id: String,
    /// Raw retrieval score of the selected tool.
    pub confidence: f64,
    pub group_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tie_break_reason: Option<String>,
    pub matched_signals: BTreeSet<Signal>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RouteError {
    #[error("no candidate tools for query: {query:?}")]
    NoCandidate { query: String },
}

struct GroupScore<'a> {
    score: f64,
    best: &'a RetrievalCandidate,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Router {
    aggregation: Aggregation,
}

impl Router {
    pub fn new(aggregation: Aggregation) -> Self {
        Self { aggregation }
    }

    /// Pick a group, then that group's best tool.
    ///
    /// Ties on score go to the lexically smaller `tool_id`; ties between
    /// groups compare their best tools the same way. The result does not
    /// depend on the order of `candidates`.
    pub fn route(
        &self,
        query: &str,
        candidates: &[RetrievalCandidate],
        groups: &GroupAssignment,
    ) -> Result<RoutingDecision, RouteError> {
        let mut ordered: Vec<&RetrievalCandidate> = candidates.iter().collect();
        ordered.sort_by(|a, b| rank_order(a, b));

        let mut by_group: BTreeMap<&str, GroupScore> = BTreeMap::new();
        for candidate in &ordered {
            let group = groups.group_of(&candidate.tool_id);
            match by_group.get_mut(group) {
                Some(entry) => {
                    entry.score = match self.aggregation {
                        Aggregation::Max => entry.score.max(candidate.score),
                        Aggregation::Sum => entry.score + candidate.score,
                    };
                }
                // `ordered` is best-first, so the first member seen is the best.
                None => {
                    by_group.insert(
                        group,
                        GroupScore {
                            score: candidate.score,
                            best: candidate,
                        },
                    );
                }
            }
        }

        let Some((group_id, winner)) = by_group
            .iter()
            .min_by(|(a_id, a), (b_id, b)| compare_groups(a_id, a, b_id, b))
        else {
            return Err(RouteError::NoCandidate {
                query: query.to_string(),
            });
        };

        let best = winner.best;
        let tied_groups: Vec<&str> = by_group
            .iter()
            .filter(|(id, entry)| *id != group_id && entry.score == winner.score)
            .map(|(id, _)| *id)
            .collect();
        let tied_tools: Vec<&str> = ordered
            .iter()
            .filter(|candidate| {
                candidate.tool_id != best.tool_id
                    && candidate.score == best.score
                    && groups.group_of(&candidate.tool_id) == *group_id
            })
            .map(|candidate| candidate.tool_id.as_str())
            .collect();

        let mut reasons = Vec::new();
        if !tied_groups.is_empty() {
            reasons.push(format!(
                "group score {} tied with {}; group holding the lexically smaller tool_id wins",
                winner.score,
                tied_groups.join(", ")
            ));
        }
        if !tied_tools.is_empty() {
            reasons.push(format!(
                "tool score {} tied with {}; lexically smaller tool_id wins",
                best.score,
                tied_tools.join(", ")
            ));
        }

        let decision = RoutingDecision {
            group_id: group_id.to_string(),
            tool_id: best.tool_id.clone(),
            confidence: best.score,
            group_score: winner.score,
            tie_break_reason: (!reasons.is_empty()).then(|| reasons.join("; ")),
            matched_signals: best.matched_signals.clone(),
        };
        tracing::debug!(
            query,
            group = %decision.group_id,
            tool_id = %decision.tool_id,
            confidence = decision.confidence,
            tie_break = decision.tie_break_reason.is_some(),
            "routed query"
        );
        Ok(decision)
    }
}

/// `Less` means `a` ranks ahead of `b`.
fn compare_groups(a_id: &str, a: &GroupScore, b_id: &str, b: &GroupScore) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.best.tool_id.cmp(&b.best.tool_id))
        .then_with(|| a_id.cmp(b_id))
}
