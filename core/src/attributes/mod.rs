//! Attribute extractor registry
//!
//! Rules name the attribute they test. The registry resolves that name to a
//! value for a given [`Candidate`]: from the caller's [`MatchContext`] when
//! the rule says `from: "options"`, from a registered extractor when one
//! exists, and from the candidate's metadata otherwise.

mod builtin;

use crate::error::Result;
use crate::types::{AttributeSource, AttributeValue, Series, Study};
use log::{trace, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Context key carrying the position of the study being evaluated
pub const STUDY_INSTANCE_UIDS_INDEX: &str = "studyInstanceUIDsIndex";

/// Something a rule can be evaluated against
#[derive(Debug, Clone, Copy)]
pub enum Candidate<'a> {
    /// The whole loaded dataset, used for protocol-level rules
    Dataset(&'a [Study]),
    /// One study, used for study-level selector rules
    Study(&'a Study),
    /// One display set within its study
    DisplaySet { study: &'a Study, series: &'a Series },
}

impl<'a> Candidate<'a> {
    /// The study this candidate belongs to; for the dataset, the current study
    pub fn study(&self) -> Option<&'a Study> {
        match *self {
            Candidate::Dataset(studies) => active_study(studies),
            Candidate::Study(study) => Some(study),
            Candidate::DisplaySet { study, .. } => Some(study),
        }
    }

    pub fn series(&self) -> Option<&'a Series> {
        match *self {
            Candidate::DisplaySet { series, .. } => Some(series),
            _ => None,
        }
    }

    /// Plain metadata lookup without any extractor
    pub fn metadata(&self, name: &str) -> Option<&'a AttributeValue> {
        match *self {
            Candidate::DisplaySet { study, series } => series
                .attribute(name)
                .or_else(|| study.attributes.get(name)),
            other => other.study().and_then(|s| s.attributes.get(name)),
        }
    }
}

/// The current study: the one indexed 0, or the first one loaded
pub fn active_study(studies: &[Study]) -> Option<&Study> {
    studies
        .iter()
        .find(|s| s.study_instance_uids_index == 0)
        .or_else(|| studies.first())
}

/// Caller-supplied values read by `from: "options"` rules
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatchContext {
    values: BTreeMap<String, AttributeValue>,
}

impl MatchContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<AttributeValue>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.values.get(name)
    }

    /// A copy of this context with the study index set
    pub fn for_study(&self, study: &Study) -> MatchContext {
        self.clone()
            .with(STUDY_INSTANCE_UIDS_INDEX, study.study_instance_uids_index)
    }
}

/// Signature of an attribute extractor
///
/// `Ok(None)` means the attribute is absent for this candidate.
pub type ExtractorFn =
    Arc<dyn Fn(&Candidate<'_>) -> Result<Option<AttributeValue>> + Send + Sync>;

#[derive(Clone)]
struct CustomAttribute {
    description: String,
    extractor: ExtractorFn,
}

/// Named attribute extractors
///
/// Failing or panicking extractors never escape: their attribute is treated
/// as absent and a warning is logged.
///
/// # Examples
///
/// ```
/// use hanging_core::{AttributeRegistry, AttributeValue, Candidate, MatchContext, Series, Study};
///
/// let mut registry = AttributeRegistry::new();
/// registry.add_custom_attribute("frameCount", "Frames in the display set", |candidate| {
///     Ok(candidate.series().map(|s| AttributeValue::from(s.num_image_frames)))
/// });
///
/// let study = Study::new("1.2").with_series(Series::new("1.2.1").with_frames(3));
/// let candidate = Candidate::DisplaySet { study: &study, series: &study.series[0] };
/// let value = registry.get_attribute_value(&candidate, "frameCount", None, &MatchContext::new());
///
/// assert_eq!(value, Some(AttributeValue::from(3)));
/// ```
#[derive(Clone)]
pub struct AttributeRegistry {
    attributes: BTreeMap<String, CustomAttribute>,
}

impl AttributeRegistry {
    /// Creates a registry with the built-in attributes
    pub fn new() -> Self {
        let mut registry = Self::empty();
        builtin::register_builtins(&mut registry);
        registry
    }

    /// Creates a registry without any extractor
    pub fn empty() -> Self {
        Self {
            attributes: BTreeMap::new(),
        }
    }

    /// Registers an extractor, replacing any previous one with the same name
    pub fn add_custom_attribute<F>(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        extractor: F,
    ) where
        F: Fn(&Candidate<'_>) -> Result<Option<AttributeValue>> + Send + Sync + 'static,
    {
        let name = name.into();
        let attribute = CustomAttribute {
            description: description.into(),
            extractor: Arc::new(extractor),
        };
        if self.attributes.insert(name.clone(), attribute).is_some() {
            warn!("Replacing extractor for attribute {}", name);
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    pub fn description(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(|a| a.description.as_str())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.attributes.keys().map(String::as_str)
    }

    /// Resolves an attribute for a candidate
    ///
    /// Returns `None` when the attribute is absent, including when its
    /// extractor fails.
    pub fn get_attribute_value(
        &self,
        candidate: &Candidate<'_>,
        name: &str,
        from: Option<AttributeSource>,
        context: &MatchContext,
    ) -> Option<AttributeValue> {
        if let Some(AttributeSource::Options) = from {
            return context.get(name).cloned();
        }

        let Some(attribute) = self.attributes.get(name) else {
            return candidate.metadata(name).cloned();
        };

        match catch_unwind(AssertUnwindSafe(|| (attribute.extractor)(candidate))) {
            Ok(Ok(value)) => {
                trace!("Attribute {} = {:?}", name, value);
                value
            }
            Ok(Err(e)) => {
                warn!("Extractor for attribute {} failed: {}", name, e);
                None
            }
            Err(_) => {
                warn!("Extractor for attribute {} panicked", name);
                None
            }
        }
    }
}

impl Default for AttributeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AttributeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeRegistry")
            .field("attributes", &self.attributes.keys().collect::<Vec<_>>())
            .finish()
    }
}
