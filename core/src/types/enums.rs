use serde::{Deserialize, Serialize};
use std::fmt;

/// Body-part laterality as reported by DICOM (0020,0060)/(0020,0062)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Laterality {
    Unknown,
    Left,
    Right,
    Bilateral,
}

impl Laterality {
    /// Returns whether this laterality is unknown
    pub fn is_unknown(&self) -> bool {
        matches!(self, Laterality::Unknown)
    }

    /// Returns the DICOM code string, empty when unknown
    pub fn code(&self) -> &'static str {
        match self {
            Laterality::Left => "L",
            Laterality::Right => "R",
            Laterality::Bilateral => "B",
            Laterality::Unknown => "",
        }
    }

    /// Returns simple name for display
    pub fn simple_name(&self) -> &'static str {
        match self {
            Laterality::Left => "left",
            Laterality::Right => "right",
            Laterality::Bilateral => "bilateral",
            Laterality::Unknown => "unknown",
        }
    }

    /// Parses laterality from a DICOM code or a spelled-out name
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "l" | "left" => Laterality::Left,
            "r" | "right" => Laterality::Right,
            "b" | "bilateral" => Laterality::Bilateral,
            _ => Laterality::Unknown,
        }
    }
}

impl fmt::Display for Laterality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.simple_name())
    }
}

/// Where a matching rule reads its attribute from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeSource {
    /// The caller-supplied match context instead of candidate metadata
    Options,
}

/// Activation status of a protocol stage for the loaded studies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    /// Stage meets its enabled activation criteria
    Enabled,
    /// Stage is usable but only partially matched
    Passive,
    /// Stage cannot be displayed
    Disabled,
}

impl StageStatus {
    /// Returns whether the stage may be navigated to
    pub fn is_usable(&self) -> bool {
        !matches!(self, StageStatus::Disabled)
    }

    /// Returns simple name for display
    pub fn simple_name(&self) -> &'static str {
        match self {
            StageStatus::Enabled => "enabled",
            StageStatus::Passive => "passive",
            StageStatus::Disabled => "disabled",
        }
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.simple_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_laterality_parse() {
        assert_eq!(Laterality::parse("L"), Laterality::Left);
        assert_eq!(Laterality::parse(" r "), Laterality::Right);
        assert_eq!(Laterality::parse("B"), Laterality::Bilateral);
        assert_eq!(Laterality::parse("left"), Laterality::Left);
        assert_eq!(Laterality::parse(""), Laterality::Unknown);
        assert_eq!(Laterality::parse("U"), Laterality::Unknown);
    }

    #[test]
    fn test_laterality_code() {
        assert_eq!(Laterality::Left.code(), "L");
        assert_eq!(Laterality::Right.code(), "R");
        assert_eq!(Laterality::Unknown.code(), "");
        assert_eq!(Laterality::parse(Laterality::Bilateral.code()), Laterality::Bilateral);
    }

    #[test]
    fn test_stage_status_serialization() {
        let json = serde_json::to_string(&StageStatus::Passive).unwrap();
        assert_eq!(json, "\"passive\"");
        assert!(StageStatus::Passive.is_usable());
        assert!(!StageStatus::Disabled.is_usable());
    }

    #[test]
    fn test_attribute_source_deserialization() {
        let source: AttributeSource = serde_json::from_str("\"options\"").unwrap();
        assert_eq!(source, AttributeSource::Options);
    }
}
