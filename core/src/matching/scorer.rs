use super::evaluator::{evaluate, RuleOutcome};
use crate::attributes::{AttributeRegistry, Candidate, MatchContext};
use crate::types::MatchingRule;
use log::trace;
use serde::Serialize;
use std::fmt;

/// Sum of the contributions of passing rules
pub type Score = f64;

/// A candidate excluded by a failing required rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Rejected;

impl fmt::Display for Rejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rejected")
    }
}

/// One line of a match diagnostic
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleTrace {
    pub rule: String,
    pub attribute: String,
    pub required: bool,
    pub outcome: RuleOutcome,
    pub contribution: f64,
}

/// Score of one candidate plus the per-rule trace that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub score: Result<Score, Rejected>,
    pub trace: Vec<RuleTrace>,
}

impl MatchResult {
    pub fn is_rejected(&self) -> bool {
        self.score.is_err()
    }

    /// Combines two levels of matching; rejection at either level wins
    pub fn combine(mut self, other: MatchResult) -> MatchResult {
        self.score = match (self.score, other.score) {
            (Ok(a), Ok(b)) => Ok(a + b),
            _ => Err(Rejected),
        };
        self.trace.extend(other.trace);
        self
    }
}

/// Scores a candidate against a rule set
///
/// Stops at the first failing required rule; the trace then ends there.
pub fn score_candidate(
    candidate: &Candidate<'_>,
    rules: &[MatchingRule],
    context: &MatchContext,
    registry: &AttributeRegistry,
) -> MatchResult {
    let mut total = 0.0;
    let mut trace = Vec::with_capacity(rules.len());

    for rule in rules {
        let evaluation = evaluate(rule, candidate, context, registry);
        trace.push(RuleTrace {
            rule: rule.label().to_string(),
            attribute: rule.attribute.clone(),
            required: rule.required,
            outcome: evaluation.outcome,
            contribution: evaluation.contribution,
        });

        if rule.required && evaluation.outcome == RuleOutcome::Failed {
            trace!("Candidate rejected by required rule {}", rule.label());
            return MatchResult {
                score: Err(Rejected),
                trace,
            };
        }
        total += evaluation.contribution;
    }

    MatchResult {
        score: Ok(total),
        trace,
    }
}

/// A candidate that survived ranking
#[derive(Debug, Clone, PartialEq)]
pub struct Ranked<T> {
    pub item: T,
    pub score: Score,
    pub trace: Vec<RuleTrace>,
}

/// Scores each candidate, drops rejected ones and sorts by score descending
///
/// Equal scores keep their input order.
pub fn rank_candidates<'a, T, F>(
    items: impl IntoIterator<Item = T>,
    to_candidate: F,
    rules: &[MatchingRule],
    context: &MatchContext,
    registry: &AttributeRegistry,
) -> Vec<Ranked<T>>
where
    F: Fn(&T) -> Candidate<'a>,
{
    let mut ranked: Vec<Ranked<T>> = items
        .into_iter()
        .filter_map(|item| {
            let result = score_candidate(&to_candidate(&item), rules, context, registry);
            result.score.ok().map(|score| Ranked {
                item,
                score,
                trace: result.trace,
            })
        })
        .collect();

    // sort_by is stable
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
    ranked
}
