use super::value::AttributeValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One item of a DICOM code sequence such as ViewCodeSequence
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CodeSequenceItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coding_scheme_designator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_meaning: Option<String>,
}

impl CodeSequenceItem {
    pub fn new(scheme: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            coding_scheme_designator: Some(scheme.into()),
            code_value: Some(value.into()),
            code_meaning: None,
        }
    }

    pub fn with_meaning(mut self, meaning: impl Into<String>) -> Self {
        self.code_meaning = Some(meaning.into());
        self
    }
}

/// Image-level metadata used by extractors that look at the first image
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    #[serde(rename = "SOPInstanceUID")]
    pub sop_instance_uid: String,
    #[serde(
        rename = "ViewCodeSequence",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub view_code_sequence: Vec<CodeSequenceItem>,
    #[serde(flatten)]
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl Instance {
    pub fn new(sop_instance_uid: impl Into<String>) -> Self {
        Self {
            sop_instance_uid: sop_instance_uid.into(),
            ..Default::default()
        }
    }

    pub fn with_view_code(mut self, item: CodeSequenceItem) -> Self {
        self.view_code_sequence.push(item);
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }
}

/// A series, treated as one display set
///
/// `study_instance_uid` is a back-reference by key to the owning [`Study`];
/// series never own or point at their study.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Series {
    #[serde(rename = "seriesInstanceUID")]
    pub series_instance_uid: String,
    #[serde(
        rename = "displaySetInstanceUID",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub display_set_instance_uid: Option<String>,
    #[serde(rename = "studyInstanceUID", default)]
    pub study_instance_uid: String,
    #[serde(default)]
    pub num_image_frames: u32,
    #[serde(default)]
    pub is_display_set_from_url: bool,
    #[serde(default)]
    pub is_reconstructable: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub instances: Vec<Instance>,
    #[serde(flatten)]
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl Series {
    pub fn new(series_instance_uid: impl Into<String>) -> Self {
        Self {
            series_instance_uid: series_instance_uid.into(),
            ..Default::default()
        }
    }

    pub fn with_frames(mut self, num_image_frames: u32) -> Self {
        self.num_image_frames = num_image_frames;
        self
    }

    pub fn from_url(mut self, is_display_set_from_url: bool) -> Self {
        self.is_display_set_from_url = is_display_set_from_url;
        self
    }

    pub fn reconstructable(mut self, is_reconstructable: bool) -> Self {
        self.is_reconstructable = is_reconstructable;
        self
    }

    pub fn with_instance(mut self, instance: Instance) -> Self {
        self.instances.push(instance);
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// The display set UID, falling back to the series UID
    pub fn display_set_uid(&self) -> &str {
        self.display_set_instance_uid
            .as_deref()
            .unwrap_or(&self.series_instance_uid)
    }

    /// Looks up a metadata attribute on the series, then on its first image
    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes
            .get(name)
            .or_else(|| self.instances.first().and_then(|i| i.attributes.get(name)))
    }
}

/// A study with its ordered series
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Study {
    #[serde(rename = "studyInstanceUID")]
    pub study_instance_uid: String,
    /// 0 for the current study, 1 for the first prior, and so on
    #[serde(rename = "studyInstanceUIDsIndex", default)]
    pub study_instance_uids_index: usize,
    #[serde(default)]
    pub series: Vec<Series>,
    #[serde(flatten)]
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl Study {
    pub fn new(study_instance_uid: impl Into<String>) -> Self {
        Self {
            study_instance_uid: study_instance_uid.into(),
            ..Default::default()
        }
    }

    pub fn with_index(mut self, index: usize) -> Self {
        self.study_instance_uids_index = index;
        self
    }

    /// Appends a series, filling in its study back-reference
    pub fn with_series(mut self, mut series: Series) -> Self {
        series.study_instance_uid = self.study_instance_uid.clone();
        self.series.push(series);
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Finds a series by display set UID
    pub fn display_set(&self, display_set_uid: &str) -> Option<&Series> {
        self.series
            .iter()
            .find(|s| s.display_set_uid() == display_set_uid)
    }
}

/// Fills in missing series back-references after deserialization
pub fn link_series(studies: &mut [Study]) {
    for study in studies.iter_mut() {
        for series in study.series.iter_mut() {
            if series.study_instance_uid.is_empty() {
                series.study_instance_uid = study.study_instance_uid.clone();
            }
        }
    }
}
