//! Python exception types for hanging
//!
//! Each exception maps a group of [`HangingError`] variants.

// Suppress warnings from PyO3's create_exception! macro about gil-refs feature
#![allow(unexpected_cfgs)]

use crate::error::HangingError;
use pyo3::{create_exception, exceptions::PyException, exceptions::PyIOError, prelude::*};

create_exception!(
    hanging,
    PyHangingError,
    PyException,
    "Base exception for all hanging errors"
);

create_exception!(
    hanging,
    PyDicomError,
    PyHangingError,
    "DICOM reading or parsing error"
);

create_exception!(
    hanging,
    PyTagNotFoundError,
    PyHangingError,
    "Required DICOM tag not found in file"
);

create_exception!(
    hanging,
    PyProtocolError,
    PyHangingError,
    "Invalid, duplicate or unknown protocol"
);

create_exception!(
    hanging,
    PyStageError,
    PyHangingError,
    "Unknown or inapplicable protocol stage"
);

create_exception!(
    hanging,
    PyInvalidInputError,
    PyHangingError,
    "Malformed JSON input"
);

create_exception!(
    hanging,
    PyExtractionError,
    PyHangingError,
    "Custom attribute extractor error"
);

/// Convert Rust HangingError to appropriate Python exception
pub fn convert_error(err: HangingError) -> PyErr {
    let message = err.to_string();
    match err {
        HangingError::DicomError(_) => PyDicomError::new_err(message),
        HangingError::TagNotFound(_) => PyTagNotFoundError::new_err(message),
        HangingError::InvalidProtocol(_)
        | HangingError::DuplicateProtocol(_)
        | HangingError::UnknownProtocol(_)
        | HangingError::InvalidRuleConstraint(_) => PyProtocolError::new_err(message),
        HangingError::UnknownStage(_) | HangingError::NoApplicableStage(_) => {
            PyStageError::new_err(message)
        }
        HangingError::Json(_) => PyInvalidInputError::new_err(message),
        HangingError::Extractor(_) => PyExtractionError::new_err(message),
        HangingError::IoError(_) => PyIOError::new_err(message),
    }
}
