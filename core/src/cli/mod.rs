pub mod report;

use crate::engine::{HangingProtocolEngine, StageRef};
use crate::error::{HangingError, Result};
use crate::extraction::load_directory;
use crate::registry::ProtocolRegistry;
use crate::types::{SetProtocolOptions, Study};
use crate::AttributeRegistry;
use clap::{Parser, ValueEnum};
use log::info;
use report::{ExplainReport, TextReport};
use std::path::{Path, PathBuf};

/// Command-line arguments for hanging
#[derive(Parser, Debug)]
#[command(name = "hanging")]
#[command(about = "Choose a hanging protocol and lay out viewports for a set of studies")]
#[command(version)]
pub struct Cli {
    /// Directory containing DICOM files
    #[arg(value_name = "DIRECTORY", required_unless_present = "studies")]
    pub directory: Option<PathBuf>,

    /// Studies as JSON instead of a DICOM directory
    #[arg(long, value_name = "FILE", conflicts_with = "directory")]
    pub studies: Option<PathBuf>,

    /// Extra protocol definitions (JSON object or array), registered after the built-ins
    #[arg(long, value_name = "FILE")]
    pub protocols: Vec<PathBuf>,

    /// Apply this protocol instead of the best match
    #[arg(long, value_name = "ID")]
    pub protocol: Option<String>,

    /// Stage to open, by id or index
    #[arg(long, value_name = "STAGE")]
    pub stage: Option<String>,

    /// Output format
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,

    /// Also print the protocol ranking with per-rule traces
    #[arg(long)]
    pub explain: bool,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Output format options
#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text format
    Text,
    /// JSON format
    Json,
}

impl Cli {
    fn set_protocol_options(&self) -> SetProtocolOptions {
        match self.stage.as_deref().map(StageRef::parse) {
            Some(StageRef::Index(index)) => SetProtocolOptions::default().with_stage_index(index),
            Some(StageRef::Id(id)) => SetProtocolOptions::default().with_stage_id(id),
            None => SetProtocolOptions::default(),
        }
    }

    fn load_studies(&self) -> Result<Vec<Study>> {
        match (&self.studies, &self.directory) {
            (Some(path), _) => read_studies_json(path),
            (None, Some(directory)) => {
                if !directory.is_dir() {
                    return Err(HangingError::IoError(std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        format!("{} is not a directory", directory.display()),
                    )));
                }
                load_directory(directory)
            }
            (None, None) => Err(HangingError::DicomError("no studies given".to_string())),
        }
    }
}

/// Reads a JSON array of studies
pub fn read_studies_json(path: &Path) -> Result<Vec<Study>> {
    let json = std::fs::read_to_string(path)?;
    let studies: Vec<Study> = serde_json::from_str(&json)?;
    info!("Read {} study(ies) from {}", studies.len(), path.display());
    Ok(studies)
}

/// Runs the tool and renders its output
pub fn execute(cli: &Cli) -> Result<String> {
    let mut protocols = ProtocolRegistry::with_builtins();
    for path in &cli.protocols {
        protocols.load_file(path)?;
    }

    let studies = cli.load_studies()?;
    let mut engine = HangingProtocolEngine::new(protocols, AttributeRegistry::new());
    let diagnostics = cli.explain.then(|| engine.explain(&studies));
    let assignment = engine.run(studies, cli.protocol.as_deref(), cli.set_protocol_options())?;
    let statuses = engine
        .active()
        .map(|a| a.stage_statuses.clone())
        .unwrap_or_default();

    match cli.format {
        OutputFormat::Text => {
            let mut out = TextReport::new(&assignment, &statuses).to_string();
            if let Some(diagnostics) = &diagnostics {
                out.push('\n');
                out.push_str(&ExplainReport::new(diagnostics).to_string());
            }
            Ok(out)
        }
        OutputFormat::Json => {
            let value = match &diagnostics {
                Some(diagnostics) => serde_json::json!({
                    "assignment": &*assignment,
                    "stageStatuses": statuses,
                    "ranking": diagnostics,
                }),
                None => serde_json::to_value(&*assignment)?,
            };
            Ok(serde_json::to_string_pretty(&value)?)
        }
    }
}
