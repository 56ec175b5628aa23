//! Data model for hanging protocols and the studies they are matched against
//!
//! - [`AttributeValue`]: loosely-typed scalar or list read from metadata
//! - [`MatchingRule`] and [`Constraint`]: weighted rules with tagged constraints
//! - [`Study`] and [`Series`]: the loaded dataset
//! - [`Protocol`], [`Stage`] and [`Viewport`]: declarative layouts
//! - [`ViewportAssignment`]: the resolved viewport → display set map
//! - [`SetProtocolOptions`]: stage choice and display-set reuse when applying a protocol

mod assignment;
mod enums;
mod options;
mod protocol;
mod rule;
mod study;
mod value;

pub use assignment::{ViewportAssignment, ViewportMatch};
pub use enums::{AttributeSource, Laterality, StageStatus};
pub use options::{selector_map_key, SetProtocolOptions};
pub use protocol::{
    DisplaySetOptions, DisplaySetSelector, Protocol, SelectionCursor, Stage, StageActivation,
    StageActivationRules, Viewport, ViewportOptions, ViewportStructure, MAX_VIEWPORT_SLOTS,
};
pub use rule::{Constraint, ConstraintValue, MatchingRule, RuleConstraint};
pub use study::{link_series, CodeSequenceItem, Instance, Series, Study};
pub use value::AttributeValue;
