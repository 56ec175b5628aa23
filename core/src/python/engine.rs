//! Python wrapper for HangingProtocolEngine
//!
//! Studies, protocols and assignments cross the boundary as JSON strings
//! using the same camelCase schema as the CLI.

use pyo3::prelude::*;

use super::errors::convert_error;
use super::utils::{path_to_pathbuf, studies_from_json, to_json};
use crate::engine::{HangingProtocolEngine, StageRef};
use crate::types::SetProtocolOptions;

/// Hanging protocol engine
///
/// Example:
///     >>> from hanging import HangingProtocolEngine
///     >>> engine = HangingProtocolEngine()
///     >>> assignment = json.loads(engine.run(studies_json))
///     >>> assignment["protocolId"]
#[pyclass(name = "HangingProtocolEngine", module = "hanging")]
pub struct PyHangingProtocolEngine {
    inner: HangingProtocolEngine,
}

#[pymethods]
impl PyHangingProtocolEngine {
    /// Create an engine with the built-in protocols registered
    #[new]
    fn new() -> Self {
        Self {
            inner: HangingProtocolEngine::default(),
        }
    }

    /// Register protocols from a JSON object or array
    ///
    /// Returns:
    ///     int: Number of protocols registered
    ///
    /// Raises:
    ///     ProtocolError: If a protocol is malformed or its id is taken
    fn add_protocol(&mut self, json: &str) -> PyResult<usize> {
        self.inner.load_protocols_json(json).map_err(convert_error)
    }

    /// Use another registered protocol as the fallback
    fn set_default_protocol(&mut self, protocol_id: &str) -> PyResult<()> {
        self.inner
            .set_default_protocol(protocol_id)
            .map_err(convert_error)
    }

    /// Ids of all registered protocols, in registration order
    #[getter]
    fn protocol_ids(&self) -> Vec<String> {
        self.inner.protocols().iter().map(|p| p.id.clone()).collect()
    }

    /// Load studies and apply a protocol
    ///
    /// Args:
    ///     studies: JSON array of studies
    ///     protocol_id: Apply this protocol instead of the best match
    ///     stage: Stage id, name or index to open
    ///
    /// Returns:
    ///     str: The viewport assignment as JSON
    ///
    /// Raises:
    ///     ProtocolError: If protocol_id is not registered
    ///     StageError: If the stage is unknown or no stage is usable
    #[pyo3(signature = (studies, protocol_id=None, stage=None))]
    fn run(
        &mut self,
        studies: &str,
        protocol_id: Option<&str>,
        stage: Option<&str>,
    ) -> PyResult<String> {
        let studies = studies_from_json(studies)?;
        let options = match stage.map(StageRef::parse) {
            Some(StageRef::Index(index)) => SetProtocolOptions::default().with_stage_index(index),
            Some(StageRef::Id(id)) => SetProtocolOptions::default().with_stage_id(id),
            None => SetProtocolOptions::default(),
        };
        let assignment = self
            .inner
            .run(studies, protocol_id, options)
            .map_err(convert_error)?;
        to_json(&*assignment)
    }

    /// Replace the loaded studies, keeping the active protocol and stage
    fn update_studies(&mut self, studies: &str) -> PyResult<String> {
        let studies = studies_from_json(studies)?;
        let assignment = self.inner.update_studies(studies).map_err(convert_error)?;
        to_json(&*assignment)
    }

    /// Rank every registered protocol with per-rule traces, as JSON
    fn explain(&self, studies: &str) -> PyResult<String> {
        let studies = studies_from_json(studies)?;
        to_json(&self.inner.explain(&studies))
    }

    /// Switch the active protocol to a stage given by id, name or index
    fn set_stage(&mut self, stage: &str) -> PyResult<String> {
        let assignment = self
            .inner
            .set_stage(StageRef::parse(stage))
            .map_err(convert_error)?;
        to_json(&*assignment)
    }

    /// Move to the next usable stage; False when there is none
    fn next_stage(&mut self) -> bool {
        self.inner.next_stage()
    }

    /// Move to the previous usable stage; False when there is none
    fn previous_stage(&mut self) -> bool {
        self.inner.previous_stage()
    }

    /// The published assignment as JSON, or None before run()
    #[getter]
    fn assignment(&self) -> PyResult<Option<String>> {
        self.inner
            .assignment()
            .map(|assignment| to_json(&*assignment))
            .transpose()
    }

    /// Activation status of each stage of the active protocol
    #[getter]
    fn stage_statuses(&self) -> Vec<String> {
        self.inner
            .active()
            .map(|active| {
                active
                    .stage_statuses
                    .iter()
                    .map(|status| status.to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn __repr__(&self) -> String {
        match self.inner.active() {
            Some(active) => format!(
                "HangingProtocolEngine(protocol='{}', stage={})",
                active.protocol_id, active.stage_index
            ),
            None => format!(
                "HangingProtocolEngine(protocols={})",
                self.inner.protocols().len()
            ),
        }
    }
}

/// Read a directory of DICOM files into studies
///
/// Args:
///     path: Directory to scan recursively (str or pathlib.Path)
///
/// Returns:
///     str: JSON array of studies, newest first
///
/// Raises:
///     DicomError: If no file in the directory could be read
#[pyfunction]
#[pyo3(name = "load_dicom_directory")]
pub fn py_load_dicom_directory(path: &Bound<'_, PyAny>) -> PyResult<String> {
    let directory = path_to_pathbuf(path)?;
    let studies = crate::extraction::load_directory(&directory).map_err(convert_error)?;
    to_json(&studies)
}
