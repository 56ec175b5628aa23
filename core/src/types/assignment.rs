use super::protocol::{DisplaySetOptions, ViewportOptions, ViewportStructure};
use serde::{Deserialize, Serialize};

/// Resolved content of one viewport slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewportMatch {
    pub viewport_id: String,
    #[serde(rename = "displaySetInstanceUIDs")]
    pub display_set_instance_uids: Vec<String>,
    pub viewport_options: ViewportOptions,
    #[serde(default)]
    pub display_set_options: Vec<DisplaySetOptions>,
}

impl ViewportMatch {
    pub fn is_empty(&self) -> bool {
        self.display_set_instance_uids.is_empty()
    }
}

/// A complete viewport → display set assignment for one protocol stage
///
/// Viewports keep the stage's declaration order. Assignments are built fresh
/// on every match cycle and never patched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewportAssignment {
    pub protocol_id: String,
    pub stage_id: String,
    pub stage_index: usize,
    pub layout: ViewportStructure,
    pub viewports: Vec<ViewportMatch>,
}

impl ViewportAssignment {
    /// Looks up a viewport by id
    pub fn get(&self, viewport_id: &str) -> Option<&ViewportMatch> {
        self.viewports.iter().find(|v| v.viewport_id == viewport_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ViewportMatch> {
        self.viewports.iter()
    }

    /// Number of viewports with at least one display set
    pub fn matched_viewports(&self) -> usize {
        self.viewports.iter().filter(|v| !v.is_empty()).count()
    }

    /// Every display set UID in display, in viewport order
    pub fn display_set_uids(&self) -> Vec<String> {
        self.viewports
            .iter()
            .flat_map(|v| v.display_set_instance_uids.iter().cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn viewport(id: &str, uids: &[&str]) -> ViewportMatch {
        ViewportMatch {
            viewport_id: id.to_string(),
            display_set_instance_uids: uids.iter().map(|s| s.to_string()).collect(),
            viewport_options: ViewportOptions::default(),
            display_set_options: Vec::new(),
        }
    }

    #[test]
    fn test_lookup_and_counts() {
        let assignment = ViewportAssignment {
            protocol_id: "p".to_string(),
            stage_id: "s".to_string(),
            stage_index: 0,
            layout: ViewportStructure::grid(1, 2),
            viewports: vec![viewport("default", &["1.1"]), viewport("viewport-1", &[])],
        };

        assert_eq!(assignment.matched_viewports(), 1);
        assert!(assignment.get("viewport-1").unwrap().is_empty());
        assert!(assignment.get("missing").is_none());
        assert_eq!(assignment.display_set_uids(), vec!["1.1".to_string()]);
    }

    #[test]
    fn test_serialized_field_names() {
        let json = serde_json::to_value(viewport("default", &["1.1"])).unwrap();
        assert_eq!(json["viewportId"], "default");
        assert_eq!(json["displaySetInstanceUIDs"][0], "1.1");
    }
}
