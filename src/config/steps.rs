//! Typed descriptors for the steps of a training pipeline definition.
//!
//! A definition file (JSON or YAML) maps step keys to step objects tagged by
//! `type`. Each step kind declares its required fields, so an incomplete
//! definition fails while it is being loaded and names the missing field.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading a pipeline definition.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("failed to read pipeline definition '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid pipeline definition: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("pipeline definition has no steps")]
    Empty,

    #[error("step '{step}': {reason}")]
    Invalid { step: String, reason: String },
}

/// Result type for step loading.
pub type Result<T> = std::result::Result<T, StepError>;

/// One command-line argument passed to a step script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StepArgument {
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for StepArgument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepArgument::Int(v) => write!(f, "{v}"),
            StepArgument::Float(v) => write!(f, "{v}"),
            StepArgument::Text(v) => f.write_str(v),
        }
    }
}

/// A data-preparation script run on a single node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PythonScriptStep {
    pub name: String,
    pub script: String,
    /// Name of the data produced for later steps
    pub output: String,
    pub input_datareference_path: String,
    pub input_datareference_name: String,
    pub input_dataset_name: String,
    pub source_directory: String,
    pub arguments: Vec<StepArgument>,
}

/// A distributed training script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MpiStep {
    pub name: String,
    pub script: String,
    pub source_directory: String,
    pub arguments: Vec<StepArgument>,

    /// Requirements file installed before the run
    #[serde(default)]
    pub requirements: Option<String>,

    #[serde(default = "default_one")]
    pub node_count: u32,

    #[serde(default = "default_one")]
    pub processes_per_node: u32,
}

fn default_one() -> u32 {
    1
}

/// A pipeline step, tagged by its `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PipelineStep {
    PythonScriptStep(PythonScriptStep),
    MpiStep(MpiStep),
}

impl PipelineStep {
    pub fn name(&self) -> &str {
        match self {
            PipelineStep::PythonScriptStep(s) => &s.name,
            PipelineStep::MpiStep(s) => &s.name,
        }
    }

    pub fn script(&self) -> &str {
        match self {
            PipelineStep::PythonScriptStep(s) => &s.script,
            PipelineStep::MpiStep(s) => &s.script,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PipelineStep::PythonScriptStep(_) => "PythonScriptStep",
            PipelineStep::MpiStep(_) => "MpiStep",
        }
    }

    fn validate(&self, key: &str) -> Result<()> {
        let invalid = |reason: &str| StepError::Invalid {
            step: key.to_string(),
            reason: reason.to_string(),
        };

        if self.name().trim().is_empty() {
            return Err(invalid("name must not be blank"));
        }
        if self.script().trim().is_empty() {
            return Err(invalid("script must not be blank"));
        }
        if let PipelineStep::MpiStep(mpi) = self {
            if mpi.node_count == 0 || mpi.processes_per_node == 0 {
                return Err(invalid("node_count and processes_per_node must be positive"));
            }
        }
        Ok(())
    }
}

/// Steps of a pipeline keyed by their identifier, in key order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipelineDefinition {
    pub steps: BTreeMap<String, PipelineStep>,
}

impl PipelineDefinition {
    /// Load and validate a JSON or YAML definition file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| StepError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parse and validate definition text; JSON is accepted as YAML.
    pub fn parse(content: &str) -> Result<Self> {
        let definition: Self = serde_yaml::from_str(content)?;
        definition.validate()?;
        Ok(definition)
    }

    pub fn validate(&self) -> Result<()> {
        if self.steps.is_empty() {
            return Err(StepError::Empty);
        }
        for (key, step) in &self.steps {
            step.validate(key)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
