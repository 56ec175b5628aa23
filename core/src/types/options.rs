use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Options controlling how a protocol is applied
///
/// # Example
///
/// ```
/// use hanging_core::SetProtocolOptions;
///
/// let options = SetProtocolOptions::default()
///     .with_stage_id("compare-cc")
///     .with_in_display(vec!["1.2.3".to_string()]);
///
/// assert_eq!(options.stage_id.as_deref(), Some("compare-cc"));
/// assert!(!options.restore);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SetProtocolOptions {
    /// Stage to open, by id; takes precedence over `stage_index`
    pub stage_id: Option<String>,

    /// Stage to open, by position
    pub stage_index: Option<usize>,

    /// Display sets already shown; `-1` selections skip them
    pub in_display: Option<Vec<String>>,

    /// Display sets pinned to a slot, keyed `<activeStudyUID>:<selectorId>:<index>`
    pub display_set_selector_map: BTreeMap<String, Vec<String>>,

    /// The protocol is being restored rather than newly chosen
    pub restore: bool,
}

impl SetProtocolOptions {
    pub fn with_stage_id(mut self, stage_id: impl Into<String>) -> Self {
        self.stage_id = Some(stage_id.into());
        self
    }

    pub fn with_stage_index(mut self, stage_index: usize) -> Self {
        self.stage_index = Some(stage_index);
        self
    }

    pub fn with_in_display(mut self, uids: Vec<String>) -> Self {
        self.in_display = Some(uids);
        self
    }

    /// Pins display sets to the slot of a selector
    pub fn with_reused_display_sets(
        mut self,
        active_study_uid: &str,
        selector_id: &str,
        index: i32,
        uids: Vec<String>,
    ) -> Self {
        self.display_set_selector_map
            .insert(selector_map_key(active_study_uid, selector_id, index), uids);
        self
    }

    pub fn restore(mut self, restore: bool) -> Self {
        self.restore = restore;
        self
    }
}

/// Key of a `displaySetSelectorMap` entry
///
/// `index` is the slot's `matchedDisplaySetsIndex`, 0 when unspecified.
pub fn selector_map_key(active_study_uid: &str, selector_id: &str, index: i32) -> String {
    format!("{}:{}:{}", active_study_uid, selector_id, index)
}
