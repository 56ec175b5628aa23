use super::enums::AttributeSource;
use super::value::AttributeValue;
use serde::{Deserialize, Serialize};

/// Operand of a constraint, either a bare value or `{ "value": ... }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConstraintValue {
    Wrapped { value: AttributeValue },
    Raw(AttributeValue),
}

impl ConstraintValue {
    /// Returns the operand regardless of its wrapping
    pub fn value(&self) -> &AttributeValue {
        match self {
            ConstraintValue::Wrapped { value } => value,
            ConstraintValue::Raw(value) => value,
        }
    }
}

impl From<AttributeValue> for ConstraintValue {
    fn from(value: AttributeValue) -> Self {
        ConstraintValue::Wrapped { value }
    }
}

/// One comparison applied to an attribute value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Constraint {
    Equals(ConstraintValue),
    #[serde(alias = "notEquals")]
    DoesNotEqual(ConstraintValue),
    Contains(ConstraintValue),
    DoesNotContain(ConstraintValue),
    #[serde(rename = "containsI")]
    ContainsI(ConstraintValue),
    #[serde(rename = "doesNotContainI")]
    DoesNotContainI(ConstraintValue),
    GreaterThan(ConstraintValue),
    LessThan(ConstraintValue),
}

impl Constraint {
    pub fn equals(value: impl Into<AttributeValue>) -> Self {
        Constraint::Equals(ConstraintValue::from(value.into()))
    }

    pub fn does_not_equal(value: impl Into<AttributeValue>) -> Self {
        Constraint::DoesNotEqual(ConstraintValue::from(value.into()))
    }

    pub fn contains(value: impl Into<AttributeValue>) -> Self {
        Constraint::Contains(ConstraintValue::from(value.into()))
    }

    pub fn does_not_contain(value: impl Into<AttributeValue>) -> Self {
        Constraint::DoesNotContain(ConstraintValue::from(value.into()))
    }

    pub fn greater_than(value: impl Into<AttributeValue>) -> Self {
        Constraint::GreaterThan(ConstraintValue::from(value.into()))
    }

    pub fn less_than(value: impl Into<AttributeValue>) -> Self {
        Constraint::LessThan(ConstraintValue::from(value.into()))
    }

    /// Returns the JSON key naming this constraint kind
    pub fn kind(&self) -> &'static str {
        match self {
            Constraint::Equals(_) => "equals",
            Constraint::DoesNotEqual(_) => "doesNotEqual",
            Constraint::Contains(_) => "contains",
            Constraint::DoesNotContain(_) => "doesNotContain",
            Constraint::ContainsI(_) => "containsI",
            Constraint::DoesNotContainI(_) => "doesNotContainI",
            Constraint::GreaterThan(_) => "greaterThan",
            Constraint::LessThan(_) => "lessThan",
        }
    }

    /// Returns the operand of this constraint
    pub fn operand(&self) -> &AttributeValue {
        match self {
            Constraint::Equals(v)
            | Constraint::DoesNotEqual(v)
            | Constraint::Contains(v)
            | Constraint::DoesNotContain(v)
            | Constraint::ContainsI(v)
            | Constraint::DoesNotContainI(v)
            | Constraint::GreaterThan(v)
            | Constraint::LessThan(v) => v.value(),
        }
    }
}

/// A rule's constraint as loaded from a protocol definition
///
/// Unknown or malformed constraint objects are kept as `Invalid` so that one
/// bad rule does not prevent the rest of the protocol from loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleConstraint {
    Valid(Constraint),
    Invalid(serde_json::Value),
}

impl Default for RuleConstraint {
    fn default() -> Self {
        RuleConstraint::Invalid(serde_json::Value::Null)
    }
}

impl From<Constraint> for RuleConstraint {
    fn from(c: Constraint) -> Self {
        RuleConstraint::Valid(c)
    }
}

fn default_weight() -> f64 {
    1.0
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// A weighted, optionally required test of one attribute
///
/// # Examples
///
/// ```
/// use hanging_core::{Constraint, MatchingRule};
///
/// let rule = MatchingRule::new("numImageFrames", Constraint::greater_than(0))
///     .required(true);
///
/// assert_eq!(rule.weight, 1.0);
/// assert!(rule.required);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchingRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub attribute: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<AttributeSource>,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default, skip_serializing_if = "is_false")]
    pub required: bool,
    #[serde(default)]
    pub constraint: RuleConstraint,
}

impl MatchingRule {
    /// Creates an optional rule with weight 1
    pub fn new(attribute: impl Into<String>, constraint: Constraint) -> Self {
        Self {
            id: None,
            attribute: attribute.into(),
            from: None,
            weight: default_weight(),
            required: false,
            constraint: RuleConstraint::Valid(constraint),
        }
    }

    /// Sets the rule id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets the score contribution on success
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    /// Marks the rule as gating eligibility
    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    /// Reads the attribute from the match context
    pub fn from_options(mut self) -> Self {
        self.from = Some(AttributeSource::Options);
        self
    }

    /// Label used in traces: the id when present, otherwise the attribute
    pub fn label(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.attribute)
    }
}
