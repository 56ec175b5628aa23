use super::selector::{resolve_selector, RankedList};
use crate::attributes::{active_study, AttributeRegistry, Candidate, MatchContext};
use crate::error::{HangingError, Result};
use crate::types::{
    selector_map_key, Protocol, Series, SetProtocolOptions, StageActivation, StageStatus, Study,
    ViewportAssignment, ViewportMatch, ViewportOptions,
};
use log::{debug, warn};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Ranked display sets for every selector of a protocol
pub type ResolvedSelectors<'a> = BTreeMap<String, RankedList<'a>>;

/// Resolves all display set selectors of a protocol once
pub fn resolve_protocol_selectors<'a>(
    protocol: &Protocol,
    studies: &'a [Study],
    context: &MatchContext,
    registry: &AttributeRegistry,
) -> ResolvedSelectors<'a> {
    protocol
        .display_set_selectors
        .iter()
        .map(|(id, selector)| {
            let ranked = resolve_selector(
                id,
                selector,
                studies,
                context,
                registry,
                protocol.active_study_only(),
            );
            (id.clone(), ranked)
        })
        .collect()
}

/// Why a stage cannot be shown
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageNotApplicable {
    /// No stage at this index
    UnknownStage(usize),
    /// A viewport that disallows unmatched views found no display set
    UnmatchedViewport {
        viewport_id: String,
        selector_id: String,
    },
}

impl fmt::Display for StageNotApplicable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageNotApplicable::UnknownStage(index) => write!(f, "no stage {}", index),
            StageNotApplicable::UnmatchedViewport {
                viewport_id,
                selector_id,
            } => write!(
                f,
                "viewport {} has no display set for selector {}",
                viewport_id, selector_id
            ),
        }
    }
}

fn builtin_viewport_defaults() -> ViewportOptions {
    let mut defaults = ViewportOptions::default();
    defaults
        .values
        .insert("toolGroupId".to_string(), Value::from("default"));
    defaults
        .values
        .insert("viewportType".to_string(), Value::from("stack"));
    defaults
}

/// Walks the stages of one protocol against one set of studies
///
/// Selectors are resolved once on construction, so every stage and every
/// viewport of the protocol sees the same rankings.
pub struct StageAssigner<'a> {
    protocol: &'a Protocol,
    studies: &'a [Study],
    context: &'a MatchContext,
    registry: &'a AttributeRegistry,
    selectors: ResolvedSelectors<'a>,
}

impl<'a> StageAssigner<'a> {
    pub fn new(
        protocol: &'a Protocol,
        studies: &'a [Study],
        context: &'a MatchContext,
        registry: &'a AttributeRegistry,
    ) -> Self {
        let selectors = resolve_protocol_selectors(protocol, studies, context, registry);
        Self {
            protocol,
            studies,
            context,
            registry,
            selectors,
        }
    }

    pub fn protocol(&self) -> &'a Protocol {
        self.protocol
    }

    pub fn selectors(&self) -> &ResolvedSelectors<'a> {
        &self.selectors
    }

    /// Builds the viewport assignment of one stage
    ///
    /// Viewport options are layered viewport → stage default → protocol
    /// default → built-in defaults. A viewport whose display set cannot be
    /// resolved is left empty unless `allowUnmatchedView` is explicitly
    /// `false`, in which case the whole stage is not applicable.
    pub fn assign(
        &self,
        stage_index: usize,
        options: &SetProtocolOptions,
    ) -> std::result::Result<ViewportAssignment, StageNotApplicable> {
        let stage = self
            .protocol
            .stages
            .get(stage_index)
            .ok_or(StageNotApplicable::UnknownStage(stage_index))?;

        let protocol_defaults = self
            .protocol
            .default_viewport
            .as_ref()
            .map(|v| v.viewport_options.clone())
            .unwrap_or_default()
            .merged_over(&builtin_viewport_defaults());
        let stage_defaults = stage
            .default_viewport
            .as_ref()
            .map(|v| v.viewport_options.clone())
            .unwrap_or_default()
            .merged_over(&protocol_defaults);

        let active_uid = active_study(self.studies)
            .map(|s| s.study_instance_uid.as_str())
            .unwrap_or_default();

        let mut viewports = Vec::with_capacity(stage.viewports.len());
        for (position, viewport) in stage.viewports.iter().enumerate() {
            let mut viewport_options = viewport.viewport_options.merged_over(&stage_defaults);
            let viewport_id = viewport_options
                .viewport_id
                .get_or_insert_with(|| {
                    if position == 0 {
                        "default".to_string()
                    } else {
                        format!("viewport-{}", position)
                    }
                })
                .clone();

            let mut uids: Vec<String> = Vec::new();
            for display_set in &viewport.display_sets {
                let key = selector_map_key(
                    active_uid,
                    &display_set.id,
                    display_set.matched_display_sets_index.unwrap_or(0),
                );
                if let Some(reused) = options.display_set_selector_map.get(&key) {
                    debug!("Viewport {} reuses {:?}", viewport_id, reused);
                    uids.extend(reused.iter().cloned());
                    continue;
                }

                let selected = self.selectors.get(&display_set.id).and_then(|ranked| {
                    ranked.select(display_set.cursor(), options.in_display.as_deref())
                });
                if let Some(found) = selected {
                    uids.push(found.display_set_uid().to_string());
                    continue;
                }

                let allow_unmatched = viewport_options.allow_unmatched_view.or_else(|| {
                    self.protocol
                        .display_set_selectors
                        .get(&display_set.id)
                        .and_then(|s| s.allow_unmatched_view)
                });
                match allow_unmatched {
                    Some(false) => {
                        debug!(
                            "Stage {} of {} not applicable: viewport {} unmatched",
                            stage_index, self.protocol.id, viewport_id
                        );
                        return Err(StageNotApplicable::UnmatchedViewport {
                            viewport_id,
                            selector_id: display_set.id.clone(),
                        });
                    }
                    Some(true) => {}
                    None => warn!(
                        "No display set for selector {} in viewport {}, leaving it empty",
                        display_set.id, viewport_id
                    ),
                }
            }

            let assigned = uids.first().and_then(|uid| self.find_display_set(uid));
            viewport_options.values = viewport_options
                .values
                .iter()
                .map(|(k, v)| (k.clone(), self.compute_option(v, assigned)))
                .collect();
            let display_set_options = viewport
                .display_sets
                .iter()
                .map(|ds| {
                    let mut ds = ds.clone();
                    ds.options = ds
                        .options
                        .iter()
                        .map(|(k, v)| (k.clone(), self.compute_option(v, assigned)))
                        .collect();
                    ds
                })
                .collect();

            viewports.push(ViewportMatch {
                viewport_id,
                display_set_instance_uids: uids,
                viewport_options,
                display_set_options,
            });
        }

        Ok(ViewportAssignment {
            protocol_id: self.protocol.id.clone(),
            stage_id: stage.label(stage_index),
            stage_index,
            layout: stage.viewport_structure.clone(),
            viewports,
        })
    }

    /// Activation status of one stage
    pub fn stage_status(&self, stage_index: usize, options: &SetProtocolOptions) -> StageStatus {
        let Some(stage) = self.protocol.stages.get(stage_index) else {
            return StageStatus::Disabled;
        };
        let matched = match self.assign(stage_index, options) {
            Ok(assignment) => assignment.matched_viewports(),
            Err(_) => return StageStatus::Disabled,
        };

        let activation = &stage.stage_activation;
        if self.activation_met(matched, activation.passive.as_ref(), 0) {
            if self.activation_met(matched, activation.enabled.as_ref(), 1) {
                StageStatus::Enabled
            } else {
                StageStatus::Passive
            }
        } else {
            StageStatus::Disabled
        }
    }

    pub fn stage_statuses(&self, options: &SetProtocolOptions) -> Vec<StageStatus> {
        (0..self.protocol.stages.len())
            .map(|i| self.stage_status(i, options))
            .collect()
    }

    fn activation_met(
        &self,
        matched_viewports: usize,
        activation: Option<&StageActivation>,
        default_min: usize,
    ) -> bool {
        let Some(activation) = activation else {
            return matched_viewports >= default_min;
        };

        for name in &activation.display_set_selectors_matched {
            match self.selectors.get(name) {
                Some(ranked) if !ranked.is_empty() => {}
                Some(_) => return false,
                None => {
                    warn!("No display set selector {} in {}", name, self.protocol.id);
                    return false;
                }
            }
        }

        matched_viewports >= activation.min_viewports_matched.unwrap_or(default_min)
    }

    /// Chooses the stage to open
    ///
    /// An explicit stage (by id, then by index) is used unless it is
    /// disabled. Otherwise the first enabled stage wins, then the first
    /// passive one. `Ok(None)` means no stage is usable.
    pub fn find_stage_index(
        &self,
        statuses: &[StageStatus],
        options: &SetProtocolOptions,
    ) -> Result<Option<usize>> {
        let stages = &self.protocol.stages;
        let requested = if let Some(stage_id) = &options.stage_id {
            let index = stages
                .iter()
                .position(|s| s.id.as_deref() == Some(stage_id.as_str()))
                .or_else(|| {
                    stages
                        .iter()
                        .position(|s| s.name.as_deref() == Some(stage_id.as_str()))
                })
                .ok_or_else(|| {
                    HangingError::UnknownStage(format!("{} in protocol {}", stage_id, self.protocol.id))
                })?;
            Some(index)
        } else if let Some(index) = options.stage_index {
            if index >= stages.len() {
                return Err(HangingError::UnknownStage(format!(
                    "{} in protocol {}",
                    index, self.protocol.id
                )));
            }
            Some(index)
        } else {
            None
        };

        if let Some(index) = requested {
            if statuses.get(index).is_some_and(StageStatus::is_usable) {
                return Ok(Some(index));
            }
            warn!(
                "Stage {} of {} is disabled, choosing another",
                index, self.protocol.id
            );
        }

        Ok(statuses
            .iter()
            .position(|s| *s == StageStatus::Enabled)
            .or_else(|| statuses.iter().position(StageStatus::is_usable)))
    }

    /// Finds a display set among the loaded studies
    pub fn find_display_set(&self, display_set_uid: &str) -> Option<(&'a Study, &'a Series)> {
        self.studies.iter().find_map(|study| {
            study
                .display_set(display_set_uid)
                .map(|series| (study, series))
        })
    }

    /// Replaces `{ "custom": name, "defaultValue": v }` objects with the
    /// attribute value of the viewport's first display set
    fn compute_option(&self, value: &Value, assigned: Option<(&'a Study, &'a Series)>) -> Value {
        match value {
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.compute_option(item, assigned))
                    .collect(),
            ),
            Value::Object(object) => {
                if let Some(Value::String(name)) = object.get("custom") {
                    let computed = assigned.and_then(|(study, series)| {
                        self.registry.get_attribute_value(
                            &Candidate::DisplaySet { study, series },
                            name,
                            None,
                            self.context,
                        )
                    });
                    return match computed {
                        Some(value) => value.to_json(),
                        None => object
                            .get("defaultValue")
                            .map(|d| self.compute_option(d, assigned))
                            .unwrap_or(Value::Null),
                    };
                }
                let computed: Map<String, Value> = object
                    .iter()
                    .map(|(k, v)| (k.clone(), self.compute_option(v, assigned)))
                    .collect();
                Value::Object(computed)
            }
            other => other.clone(),
        }
    }
}
