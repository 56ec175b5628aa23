//! Rule evaluation and ranking
//!
//! Matching runs at three levels with the same scorer: protocols against the
//! whole dataset, selectors against studies and then against display sets,
//! and stages against the resolved selectors.

mod evaluator;
mod protocol;
mod scorer;
mod selector;
mod stage;

pub use evaluator::{check, evaluate, RuleEvaluation, RuleOutcome};
pub use protocol::{find_best_protocol, rank_protocols, score_protocol, ProtocolDiagnostic};
pub use scorer::{rank_candidates, score_candidate, MatchResult, Ranked, Rejected, RuleTrace, Score};
pub use selector::{resolve_selector, DisplaySetMatch, RankedList};
pub use stage::{resolve_protocol_selectors, ResolvedSelectors, StageAssigner, StageNotApplicable};
