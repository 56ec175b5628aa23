use super::rule::MatchingRule;
use crate::error::{HangingError, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Named rule sets used to pick display sets for viewports
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplaySetSelector {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_unmatched_view: Option<bool>,
    #[serde(default)]
    pub study_matching_rules: Vec<MatchingRule>,
    #[serde(default)]
    pub series_matching_rules: Vec<MatchingRule>,
}

impl DisplaySetSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_study_rule(mut self, rule: MatchingRule) -> Self {
        self.study_matching_rules.push(rule);
        self
    }

    pub fn with_series_rule(mut self, rule: MatchingRule) -> Self {
        self.series_matching_rules.push(rule);
        self
    }
}

/// Which element of a ranked list a viewport takes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelectionCursor {
    /// The top-ranked candidate, skipping ones already in display when known
    Best,
    /// The zero-based n-th ranked candidate
    Nth(usize),
}

impl SelectionCursor {
    /// Interprets a `matchedDisplaySetsIndex` value
    ///
    /// Unspecified and `-1` both select the best candidate. Other negative
    /// values are not meaningful and are treated the same way.
    pub fn from_index(index: Option<i32>) -> Self {
        match index {
            None | Some(-1) => SelectionCursor::Best,
            Some(k) if k >= 0 => SelectionCursor::Nth(k as usize),
            Some(k) => {
                warn!("matchedDisplaySetsIndex {} is negative, using best match", k);
                SelectionCursor::Best
            }
        }
    }
}

/// Binding of a viewport to a display set selector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplaySetOptions {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_display_sets_index: Option<i32>,
    #[serde(flatten)]
    pub options: BTreeMap<String, serde_json::Value>,
}

impl DisplaySetOptions {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            matched_display_sets_index: None,
            options: BTreeMap::new(),
        }
    }

    pub fn with_index(mut self, index: i32) -> Self {
        self.matched_display_sets_index = Some(index);
        self
    }

    pub fn cursor(&self) -> SelectionCursor {
        SelectionCursor::from_index(self.matched_display_sets_index)
    }
}

/// Layered viewport options
///
/// Known keys are typed; everything else (`toolGroupId`, `syncGroups`,
/// `viewportType`, ...) is carried through as JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewportOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewport_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_unmatched_view: Option<bool>,
    #[serde(flatten)]
    pub values: BTreeMap<String, serde_json::Value>,
}

impl ViewportOptions {
    /// Layers `self` over `base`; keys set on `self` win
    ///
    /// The viewport id is never inherited from the base layer.
    pub fn merged_over(&self, base: &ViewportOptions) -> ViewportOptions {
        let mut values = base.values.clone();
        for (key, value) in &self.values {
            values.insert(key.clone(), value.clone());
        }

        ViewportOptions {
            viewport_id: self.viewport_id.clone(),
            allow_unmatched_view: self.allow_unmatched_view.or(base.allow_unmatched_view),
            values,
        }
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.values.get(key)
    }
}

/// One viewport slot of a stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewport {
    #[serde(default)]
    pub viewport_options: ViewportOptions,
    #[serde(default)]
    pub display_sets: Vec<DisplaySetOptions>,
}

impl Viewport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.viewport_options.viewport_id = Some(id.into());
        self
    }

    pub fn with_display_set(mut self, display_set: DisplaySetOptions) -> Self {
        self.display_sets.push(display_set);
        self
    }

    pub fn allow_unmatched(mut self, allow: bool) -> Self {
        self.viewport_options.allow_unmatched_view = Some(allow);
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.viewport_options.values.insert(key.into(), value);
        self
    }
}

fn default_layout_type() -> String {
    "grid".to_string()
}

fn default_dimension() -> usize {
    1
}

/// Largest grid a stage may declare
pub const MAX_VIEWPORT_SLOTS: usize = 64;

/// Grid shape of a stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewportStructure {
    #[serde(default = "default_layout_type")]
    pub layout_type: String,
    #[serde(default = "default_dimension")]
    pub rows: usize,
    #[serde(default = "default_dimension")]
    pub columns: usize,
}

impl ViewportStructure {
    pub fn grid(rows: usize, columns: usize) -> Self {
        Self {
            layout_type: default_layout_type(),
            rows,
            columns,
        }
    }

    /// Number of grid cells, or `None` past [`MAX_VIEWPORT_SLOTS`]
    pub fn slots(&self) -> Option<usize> {
        self.rows
            .checked_mul(self.columns)
            .filter(|slots| *slots <= MAX_VIEWPORT_SLOTS)
    }
}

impl Default for ViewportStructure {
    fn default() -> Self {
        Self::grid(1, 1)
    }
}

/// Thresholds for one activation level of a stage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageActivation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_viewports_matched: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub display_set_selectors_matched: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageActivationRules {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<StageActivation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passive: Option<StageActivation>,
}

/// One grid layout with its selector bindings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub viewport_structure: ViewportStructure,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_viewport: Option<Viewport>,
    #[serde(default)]
    pub stage_activation: StageActivationRules,
    #[serde(default)]
    pub viewports: Vec<Viewport>,
}

impl Stage {
    pub fn grid(rows: usize, columns: usize) -> Self {
        Self {
            viewport_structure: ViewportStructure::grid(rows, columns),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_viewport(mut self, viewport: Viewport) -> Self {
        self.viewports.push(viewport);
        self
    }

    pub fn with_default_viewport(mut self, viewport: Viewport) -> Self {
        self.default_viewport = Some(viewport);
        self
    }

    pub fn with_activation(mut self, activation: StageActivationRules) -> Self {
        self.stage_activation = activation;
        self
    }

    /// Id used in reports: the stage id, then its name, then its position
    pub fn label(&self, index: usize) -> String {
        self.id
            .clone()
            .or_else(|| self.name.clone())
            .unwrap_or_else(|| index.to_string())
    }
}

/// A declarative hanging protocol
///
/// # Examples
///
/// ```
/// use hanging_core::{Constraint, DisplaySetOptions, DisplaySetSelector, MatchingRule};
/// use hanging_core::{Protocol, Stage, Viewport};
///
/// let protocol = Protocol::new("ct-single")
///     .with_rule(MatchingRule::new("ModalitiesInStudy", Constraint::contains("CT")))
///     .with_selector(
///         "ct",
///         DisplaySetSelector::new()
///             .with_series_rule(MatchingRule::new("Modality", Constraint::equals("CT"))),
///     )
///     .with_stage(Stage::grid(1, 1).with_viewport(
///         Viewport::new().with_display_set(DisplaySetOptions::new("ct")),
///     ))
///     .validated()
///     .unwrap();
///
/// assert_eq!(
///     protocol.stages[0].viewports[0].viewport_options.viewport_id.as_deref(),
///     Some("default")
/// );
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Protocol {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub protocol_matching_rules: Vec<MatchingRule>,
    #[serde(default)]
    pub display_set_selectors: BTreeMap<String, DisplaySetSelector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_viewport: Option<Viewport>,
    /// `-1` restricts selectors to the active study; `N > 0` requires N priors
    #[serde(default)]
    pub number_of_priors_referenced: i32,
    #[serde(default)]
    pub stages: Vec<Stage>,
}

impl Protocol {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_rule(mut self, rule: MatchingRule) -> Self {
        self.protocol_matching_rules.push(rule);
        self
    }

    pub fn with_selector(mut self, id: impl Into<String>, selector: DisplaySetSelector) -> Self {
        self.display_set_selectors.insert(id.into(), selector);
        self
    }

    pub fn with_default_viewport(mut self, viewport: Viewport) -> Self {
        self.default_viewport = Some(viewport);
        self
    }

    pub fn with_priors_referenced(mut self, priors: i32) -> Self {
        self.number_of_priors_referenced = priors;
        self
    }

    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    /// Returns whether selectors only consider the active study
    pub fn active_study_only(&self) -> bool {
        self.number_of_priors_referenced == -1
    }

    /// Number of prior studies required before this protocol may match
    pub fn required_priors(&self) -> usize {
        self.number_of_priors_referenced.max(0) as usize
    }

    /// Checks the protocol and fills in generated viewports and viewport ids
    ///
    /// A stage without explicit viewports gets `rows × columns` copies of its
    /// default viewport (or the protocol's). Viewports without an id are named
    /// `"default"` at index 0 and `"viewport-<index>"` elsewhere.
    pub fn validate(&mut self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(HangingError::InvalidProtocol(
                "protocol id must not be empty".to_string(),
            ));
        }
        if self.stages.is_empty() {
            return Err(HangingError::InvalidProtocol(format!(
                "protocol {} has no stages",
                self.id
            )));
        }

        for (stage_index, stage) in self.stages.iter_mut().enumerate() {
            let structure = &stage.viewport_structure;
            let slots = match structure.slots() {
                Some(slots) if slots > 0 => slots,
                _ => {
                    return Err(HangingError::InvalidProtocol(format!(
                        "stage {} of {} has an unsupported {}x{} grid",
                        stage_index, self.id, structure.rows, structure.columns
                    )))
                }
            };

            if stage.viewports.is_empty() {
                let template = stage
                    .default_viewport
                    .as_ref()
                    .or(self.default_viewport.as_ref())
                    .cloned()
                    .unwrap_or_default();
                stage.viewports = (0..slots)
                    .map(|_| {
                        let mut viewport = template.clone();
                        viewport.viewport_options.viewport_id = None;
                        viewport
                    })
                    .collect();
            }

            let mut seen = BTreeSet::new();
            for (index, viewport) in stage.viewports.iter_mut().enumerate() {
                let id = viewport
                    .viewport_options
                    .viewport_id
                    .get_or_insert_with(|| generated_viewport_id(index));
                if !seen.insert(id.clone()) {
                    return Err(HangingError::InvalidProtocol(format!(
                        "duplicate viewport id {} in stage {} of {}",
                        id, stage_index, self.id
                    )));
                }

                for display_set in &viewport.display_sets {
                    if !self.display_set_selectors.contains_key(&display_set.id) {
                        warn!(
                            "Protocol {} stage {} references unknown display set selector {}",
                            self.id, stage_index, display_set.id
                        );
                    }
                }
            }
        }

        Ok(())
    }

    /// Consuming form of [`Protocol::validate`]
    pub fn validated(mut self) -> Result<Self> {
        self.validate()?;
        Ok(self)
    }
}

fn generated_viewport_id(index: usize) -> String {
    if index == 0 {
        "default".to_string()
    } else {
        format!("viewport-{}", index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Constraint, RuleConstraint};
    use rstest::rstest;

    #[rstest]
    #[case(None, SelectionCursor::Best)]
    #[case(Some(-1), SelectionCursor::Best)]
    #[case(Some(0), SelectionCursor::Nth(0))]
    #[case(Some(3), SelectionCursor::Nth(3))]
    #[case(Some(-7), SelectionCursor::Best)]
    fn test_selection_cursor(#[case] index: Option<i32>, #[case] expected: SelectionCursor) {
        assert_eq!(SelectionCursor::from_index(index), expected);
    }

    #[test]
    fn test_merge_viewport_options() {
        let base: ViewportOptions = serde_json::from_str(
            r#"{"viewportId": "base", "toolGroupId": "default", "allowUnmatchedView": true,
                "syncGroups": ["zoom"]}"#,
        )
        .unwrap();
        let specific: ViewportOptions =
            serde_json::from_str(r#"{"toolGroupId": "mpr"}"#).unwrap();

        let merged = specific.merged_over(&base);

        assert_eq!(merged.viewport_id, None);
        assert_eq!(merged.allow_unmatched_view, Some(true));
        assert_eq!(merged.get("toolGroupId"), Some(&serde_json::json!("mpr")));
        assert_eq!(merged.get("syncGroups"), Some(&serde_json::json!(["zoom"])));
    }

    #[test]
    fn test_validate_generates_grid_viewports() {
        let mut protocol = Protocol::new("grid")
            .with_default_viewport(
                Viewport::new().with_display_set(DisplaySetOptions::new("any").with_index(-1)),
            )
            .with_stage(Stage::grid(2, 2));

        protocol.validate().unwrap();

        let ids: Vec<_> = protocol.stages[0]
            .viewports
            .iter()
            .map(|v| v.viewport_options.viewport_id.clone().unwrap())
            .collect();
        assert_eq!(ids, vec!["default", "viewport-1", "viewport-2", "viewport-3"]);
        assert!(protocol.stages[0]
            .viewports
            .iter()
            .all(|v| v.display_sets[0].id == "any"));
    }

    #[test]
    fn test_validate_is_stable() {
        let mut protocol = Protocol::new("stable").with_stage(Stage::grid(1, 2));
        protocol.validate().unwrap();
        let first = protocol.clone();
        protocol.validate().unwrap();
        assert_eq!(protocol, first);
    }

    #[test]
    fn test_validate_rejects_bad_protocols() {
        assert!(Protocol::new("").with_stage(Stage::grid(1, 1)).validate().is_err());
        assert!(Protocol::new("empty").validate().is_err());
        assert!(Protocol::new("zero").with_stage(Stage::grid(0, 1)).validate().is_err());

        let duplicate = Protocol::new("dup").with_stage(
            Stage::grid(1, 2)
                .with_viewport(Viewport::new().with_id("a"))
                .with_viewport(Viewport::new().with_id("a")),
        );
        assert!(matches!(
            duplicate.validated(),
            Err(HangingError::InvalidProtocol(_))
        ));
    }

    #[test]
    fn test_protocol_deserialization() {
        let json = r#"{
            "id": "frames",
            "numberOfPriorsReferenced": -1,
            "protocolMatchingRules": [
                {"attribute": "numberOfDisplaySetsWithImages", "constraint": {"greaterThan": 0}}
            ],
            "displaySetSelectors": {
                "multiFrame": {
                    "seriesMatchingRules": [
                        {"attribute": "numImageFrames", "required": true,
                         "constraint": {"greaterThan": {"value": 16}}}
                    ]
                }
            },
            "stages": [{
                "name": "frames",
                "viewportStructure": {"layoutType": "grid", "rows": 1, "columns": 1},
                "viewports": [{
                    "viewportOptions": {"toolGroupId": "default"},
                    "displaySets": [{"id": "multiFrame", "matchedDisplaySetsIndex": 0}]
                }]
            }]
        }"#;
        let protocol: Protocol = serde_json::from_str(json).unwrap();
        let protocol = protocol.validated().unwrap();

        assert!(protocol.active_study_only());
        assert_eq!(protocol.required_priors(), 0);
        let rule = &protocol.display_set_selectors["multiFrame"].series_matching_rules[0];
        assert!(rule.required);
        assert_eq!(
            rule.constraint,
            RuleConstraint::Valid(Constraint::greater_than(16))
        );
        let viewport = &protocol.stages[0].viewports[0];
        assert_eq!(viewport.display_sets[0].cursor(), SelectionCursor::Nth(0));
        assert_eq!(viewport.viewport_options.viewport_id.as_deref(), Some("default"));
    }
}
