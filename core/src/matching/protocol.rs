use super::evaluator::RuleOutcome;
use super::scorer::{score_candidate, MatchResult, Rejected, RuleTrace, Score};
use crate::attributes::{AttributeRegistry, Candidate, MatchContext};
use crate::types::{Protocol, Study};
use log::debug;
use serde::Serialize;

/// How one registered protocol scored against the loaded studies
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolDiagnostic {
    pub protocol_id: String,
    pub registration_index: usize,
    /// `None` when rejected
    pub score: Option<Score>,
    pub rejected: bool,
    pub trace: Vec<RuleTrace>,
}

/// Scores a protocol's matching rules against the whole dataset
///
/// A protocol referencing more priors than are loaded is rejected before
/// its rules are evaluated.
pub fn score_protocol(
    protocol: &Protocol,
    studies: &[Study],
    context: &MatchContext,
    registry: &AttributeRegistry,
) -> MatchResult {
    let required = protocol.required_priors();
    let available = studies.len().saturating_sub(1);
    if required > available {
        debug!(
            "Protocol {} needs {} prior(s), {} loaded",
            protocol.id, required, available
        );
        return MatchResult {
            score: Err(Rejected),
            trace: vec![RuleTrace {
                rule: "numberOfPriorsReferenced".to_string(),
                attribute: "numberOfPriors".to_string(),
                required: true,
                outcome: RuleOutcome::Failed,
                contribution: 0.0,
            }],
        };
    }

    score_candidate(
        &Candidate::Dataset(studies),
        &protocol.protocol_matching_rules,
        context,
        registry,
    )
}

/// Scores every protocol and orders them best first
///
/// Accepted protocols come first by descending score; equal scores keep
/// registration order. Rejected protocols follow in registration order.
pub fn rank_protocols<'p>(
    protocols: impl IntoIterator<Item = &'p Protocol>,
    studies: &[Study],
    context: &MatchContext,
    registry: &AttributeRegistry,
) -> Vec<ProtocolDiagnostic> {
    let mut diagnostics: Vec<ProtocolDiagnostic> = protocols
        .into_iter()
        .enumerate()
        .map(|(registration_index, protocol)| {
            let result = score_protocol(protocol, studies, context, registry);
            debug!("Protocol {} scored {:?}", protocol.id, result.score);
            ProtocolDiagnostic {
                protocol_id: protocol.id.clone(),
                registration_index,
                score: result.score.ok(),
                rejected: result.is_rejected(),
                trace: result.trace,
            }
        })
        .collect();

    diagnostics.sort_by(|a, b| match (a.score, b.score) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
    diagnostics
}

/// Returns the registration index of the best protocol, if any matched
pub fn find_best_protocol<'p>(
    protocols: impl IntoIterator<Item = &'p Protocol>,
    studies: &[Study],
    context: &MatchContext,
    registry: &AttributeRegistry,
) -> Option<usize> {
    rank_protocols(protocols, studies, context, registry)
        .into_iter()
        .find(|d| !d.rejected)
        .map(|d| d.registration_index)
}
