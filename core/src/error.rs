use thiserror::Error;

/// Result type for hanging protocol operations
pub type Result<T> = std::result::Result<T, HangingError>;

/// Error types for hanging protocol operations
///
/// Matching itself never fails on bad data: missing attributes, broken
/// constraints and unmatched selectors all degrade inside the engine. These
/// variants cover caller mistakes and the I/O surfaces around the engine.
#[derive(Error, Debug)]
pub enum HangingError {
    /// DICOM reading error
    #[error("DICOM error: {0}")]
    DicomError(String),

    /// Tag not found in DICOM file
    #[error("Tag not found: {0}")]
    TagNotFound(String),

    /// Protocol definition failed validation
    #[error("Invalid protocol: {0}")]
    InvalidProtocol(String),

    /// A protocol with this id is already registered
    #[error("Protocol already registered: {0}")]
    DuplicateProtocol(String),

    /// No protocol registered under the requested id
    #[error("Unknown protocol: {0}")]
    UnknownProtocol(String),

    /// No stage with the requested id or index
    #[error("Unknown stage: {0}")]
    UnknownStage(String),

    /// Every stage of the protocol is disabled for the loaded studies
    #[error("No applicable stage: {0}")]
    NoApplicableStage(String),

    /// A rule constraint that cannot be evaluated
    #[error("Invalid rule constraint: {0}")]
    InvalidRuleConstraint(String),

    /// A custom attribute extractor reported a failure
    #[error("Extractor error: {0}")]
    Extractor(String),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

// Helper conversions
impl From<String> for HangingError {
    fn from(s: String) -> Self {
        HangingError::Extractor(s)
    }
}

impl From<&str> for HangingError {
    fn from(s: &str) -> Self {
        HangingError::Extractor(s.to_string())
    }
}

// Convert dicom-object errors
impl From<dicom_object::ReadError> for HangingError {
    fn from(e: dicom_object::ReadError) -> Self {
        HangingError::DicomError(format!("{}", e))
    }
}
