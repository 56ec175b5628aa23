pub mod attributes;
pub mod cli;
pub mod engine;
pub mod error;
pub mod extraction;
pub mod matching;
pub mod protocols;
pub mod registry;
pub mod types;

#[cfg(feature = "python")]
mod python;

pub use attributes::{active_study, AttributeRegistry, Candidate, ExtractorFn, MatchContext};
pub use cli::report::{ExplainReport, TextReport};
pub use engine::{ActiveProtocol, HangingEvent, HangingProtocolEngine, StageRef, SubscriptionId};
pub use error::{HangingError, Result};
pub use matching::{find_best_protocol, rank_protocols, ProtocolDiagnostic, RankedList, RuleTrace};
pub use protocols::{DEFAULT_PROTOCOL_ID, MAMMO_PROTOCOL_ID};
pub use registry::ProtocolRegistry;
pub use types::*;
