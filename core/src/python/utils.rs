//! Conversions shared by the Python wrappers

use pyo3::prelude::*;
use serde::{de::DeserializeOwned, Serialize};
use std::path::PathBuf;

use super::errors::{convert_error, PyInvalidInputError};
use crate::types::Study;

/// Converts a Python path-like object (str or pathlib.Path) to PathBuf
pub fn path_to_pathbuf(path: &Bound<'_, PyAny>) -> PyResult<PathBuf> {
    if let Ok(s) = path.extract::<String>() {
        return Ok(PathBuf::from(s));
    }

    if let Ok(s) = path.str() {
        let path_str: String = s.extract()?;
        return Ok(PathBuf::from(path_str));
    }

    Err(pyo3::exceptions::PyTypeError::new_err(
        "Path must be a string or path-like object",
    ))
}

pub fn from_json<T: DeserializeOwned>(json: &str) -> PyResult<T> {
    serde_json::from_str(json).map_err(|e| PyInvalidInputError::new_err(e.to_string()))
}

pub fn to_json<T: Serialize + ?Sized>(value: &T) -> PyResult<String> {
    serde_json::to_string(value).map_err(|e| convert_error(e.into()))
}

pub fn studies_from_json(json: &str) -> PyResult<Vec<Study>> {
    from_json(json)
}
