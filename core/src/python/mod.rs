//! Python bindings for hanging
//!
//! Exposes the protocol engine and the DICOM study loader to Python.

// Suppress false positive warnings from PyO3 macro expansion
#![allow(clippy::useless_conversion)]

use pyo3::prelude::*;

mod engine;
mod errors;
mod utils;

pub use engine::*;
pub use errors::*;

/// Python module definition
#[pymodule]
fn _hanging(py: Python, m: &Bound<'_, PyModule>) -> PyResult<()> {
    // Register exception classes
    m.add("HangingError", py.get_type_bound::<errors::PyHangingError>())?;
    m.add("DicomError", py.get_type_bound::<errors::PyDicomError>())?;
    m.add(
        "TagNotFoundError",
        py.get_type_bound::<errors::PyTagNotFoundError>(),
    )?;
    m.add("ProtocolError", py.get_type_bound::<errors::PyProtocolError>())?;
    m.add("StageError", py.get_type_bound::<errors::PyStageError>())?;
    m.add(
        "InvalidInputError",
        py.get_type_bound::<errors::PyInvalidInputError>(),
    )?;
    m.add(
        "ExtractionError",
        py.get_type_bound::<errors::PyExtractionError>(),
    )?;

    m.add_class::<PyHangingProtocolEngine>()?;
    m.add_function(wrap_pyfunction!(py_load_dicom_directory, m)?)?;

    // Add version
    m.add("__version__", env!("CARGO_PKG_VERSION"))?;

    Ok(())
}
