use crate::attributes::{AttributeRegistry, Candidate, MatchContext};
use crate::error::{HangingError, Result};
use crate::types::{AttributeValue, Constraint, MatchingRule, RuleConstraint};
use log::{trace, warn};
use serde::Serialize;

/// Outcome of evaluating one rule against one candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleOutcome {
    Passed,
    Failed,
    /// The rule's constraint could not be evaluated and was ignored
    Skipped,
}

/// Result of [`evaluate`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuleEvaluation {
    pub outcome: RuleOutcome,
    /// Score added by this rule: its weight when passed, 0 otherwise
    pub contribution: f64,
}

impl RuleEvaluation {
    pub fn passed(&self) -> bool {
        self.outcome == RuleOutcome::Passed
    }
}

/// Evaluates one rule against one candidate
///
/// A missing attribute fails the rule. A malformed constraint, or a
/// non-numeric threshold on a numeric comparison, is logged and the rule is
/// skipped: it neither contributes nor rejects.
pub fn evaluate(
    rule: &MatchingRule,
    candidate: &Candidate<'_>,
    context: &MatchContext,
    registry: &AttributeRegistry,
) -> RuleEvaluation {
    let constraint = match &rule.constraint {
        RuleConstraint::Valid(constraint) => constraint,
        RuleConstraint::Invalid(raw) => {
            warn!(
                "Skipping rule {}: unknown constraint {}",
                rule.label(),
                raw
            );
            return skipped();
        }
    };

    let value = registry.get_attribute_value(candidate, &rule.attribute, rule.from, context);
    let outcome = match value {
        None => RuleOutcome::Failed,
        Some(value) => match check(constraint, &value) {
            Ok(true) => RuleOutcome::Passed,
            Ok(false) => RuleOutcome::Failed,
            Err(e) => {
                warn!("Skipping rule {}: {}", rule.label(), e);
                return skipped();
            }
        },
    };

    trace!(
        "Rule {} ({} {}) -> {:?}",
        rule.label(),
        constraint.kind(),
        constraint.operand(),
        outcome
    );

    RuleEvaluation {
        outcome,
        contribution: if outcome == RuleOutcome::Passed {
            rule.weight
        } else {
            0.0
        },
    }
}

fn skipped() -> RuleEvaluation {
    RuleEvaluation {
        outcome: RuleOutcome::Skipped,
        contribution: 0.0,
    }
}

/// Applies a constraint to a present attribute value
pub fn check(constraint: &Constraint, value: &AttributeValue) -> Result<bool> {
    let operand = constraint.operand();

    Ok(match constraint {
        Constraint::Equals(_) => value.loosely_equals(operand),
        Constraint::DoesNotEqual(_) => !value.loosely_equals(operand),
        Constraint::Contains(_) => value.contains(operand, false),
        Constraint::DoesNotContain(_) => !value.contains(operand, false),
        Constraint::ContainsI(_) => value.contains(operand, true),
        Constraint::DoesNotContainI(_) => !value.contains(operand, true),
        Constraint::GreaterThan(_) => compare(value, operand, constraint)?.is_some_and(|o| o.is_gt()),
        Constraint::LessThan(_) => compare(value, operand, constraint)?.is_some_and(|o| o.is_lt()),
    })
}

fn compare(
    value: &AttributeValue,
    operand: &AttributeValue,
    constraint: &Constraint,
) -> Result<Option<std::cmp::Ordering>> {
    let threshold = operand.as_number().ok_or_else(|| {
        HangingError::InvalidRuleConstraint(format!(
            "{} threshold {} is not a number",
            constraint.kind(),
            operand
        ))
    })?;

    // A non-numeric attribute simply fails the comparison
    Ok(value.as_number().and_then(|v| v.partial_cmp(&threshold)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Series, Study};
    use rstest::rstest;

    #[rstest]
    #[case(Constraint::equals(true), AttributeValue::from(true), true)]
    #[case(Constraint::equals("MG"), AttributeValue::from("CT"), false)]
    #[case(Constraint::equals(vec!["P", "L"]), AttributeValue::from(vec!["L", "P"]), true)]
    #[case(Constraint::does_not_equal("MG"), AttributeValue::from("CT"), true)]
    #[case(Constraint::contains("L CC"), AttributeValue::from("Mammo L CC"), true)]
    #[case(Constraint::contains("MG"), AttributeValue::from(vec!["MG", "SR"]), true)]
    #[case(Constraint::does_not_contain("SR"), AttributeValue::from(vec!["MG", "SR"]), false)]
    #[case(Constraint::greater_than(0), AttributeValue::from(5), true)]
    #[case(Constraint::greater_than(16), AttributeValue::from(16), false)]
    #[case(Constraint::greater_than(1), AttributeValue::from("3"), true)]
    #[case(Constraint::less_than(10), AttributeValue::from(2.5), true)]
    #[case(Constraint::less_than(10), AttributeValue::from("abc"), false)]
    fn test_check(
        #[case] constraint: Constraint,
        #[case] value: AttributeValue,
        #[case] expected: bool,
    ) {
        assert_eq!(check(&constraint, &value).unwrap(), expected);
    }

    #[test]
    fn test_case_insensitive_constraints() {
        let value = AttributeValue::from("Axial T2");
        assert!(check(&Constraint::ContainsI(AttributeValue::from("t2").into()), &value).unwrap());
        assert!(!check(&Constraint::Contains(AttributeValue::from("t2").into()), &value).unwrap());
        assert!(check(&Constraint::DoesNotContainI(AttributeValue::from("t1").into()), &value).unwrap());
    }

    #[test]
    fn test_non_numeric_threshold_is_an_error() {
        let result = check(&Constraint::greater_than("many"), &AttributeValue::from(3));
        assert!(matches!(result, Err(HangingError::InvalidRuleConstraint(_))));
    }

    fn display_set_study() -> Study {
        Study::new("1").with_series(Series::new("1.1").with_frames(5).from_url(true))
    }

    #[test]
    fn test_evaluate_passed_contributes_weight() {
        let study = display_set_study();
        let candidate = Candidate::DisplaySet {
            study: &study,
            series: &study.series[0],
        };
        let rule = MatchingRule::new("isDisplaySetFromUrl", Constraint::equals(true)).with_weight(20.0);

        let result = evaluate(&rule, &candidate, &MatchContext::new(), &AttributeRegistry::new());

        assert_eq!(result.outcome, RuleOutcome::Passed);
        assert_eq!(result.contribution, 20.0);
    }

    #[test]
    fn test_evaluate_missing_attribute_fails() {
        let study = display_set_study();
        let candidate = Candidate::DisplaySet {
            study: &study,
            series: &study.series[0],
        };
        let rule = MatchingRule::new("SeriesDescription", Constraint::does_not_contain("SR"));

        let result = evaluate(&rule, &candidate, &MatchContext::new(), &AttributeRegistry::new());

        assert_eq!(result.outcome, RuleOutcome::Failed);
        assert_eq!(result.contribution, 0.0);
    }

    #[test]
    fn test_evaluate_invalid_constraint_is_skipped() {
        let study = display_set_study();
        let candidate = Candidate::Study(&study);
        let rule: MatchingRule = serde_json::from_str(
            r#"{"attribute": "Modality", "required": true, "constraint": {"regex": "M."}}"#,
        )
        .unwrap();

        let result = evaluate(&rule, &candidate, &MatchContext::new(), &AttributeRegistry::new());

        assert_eq!(result.outcome, RuleOutcome::Skipped);
        assert_eq!(result.contribution, 0.0);
    }
}
