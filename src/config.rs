//! Run configuration: the collaborator that supplies
//! `(c, threshold, graph)` while the master sits in Wait with no
//! graph loaded.

use std::io::Write;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::graph::{self, Graph, GraphError};

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed configuration file
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Graph resource could not be loaded
    #[error("graph error: {0}")]
    Graph(#[from] GraphError),

    /// Damping factor out of range
    #[error("damping factor {0} is outside (0, 1)")]
    InvalidDamping(f64),

    /// Convergence threshold out of range
    #[error("threshold {0} is outside (0, 1)")]
    InvalidThreshold(f64),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Validated inputs for one PageRank run.
#[derive(Debug, Clone)]
pub struct RunInput {
    pub c: f64,
    pub threshold: f64,
    pub graph: Graph,
}

impl RunInput {
    pub fn new(c: f64, threshold: f64, graph: Graph) -> ConfigResult<Self> {
        if !(0.0 < c && c < 1.0) {
            return Err(ConfigError::InvalidDamping(c));
        }
        if !(0.0 < threshold && threshold < 1.0) {
            return Err(ConfigError::InvalidThreshold(threshold));
        }
        Ok(Self { c, threshold, graph })
    }
}

/// Supplies run inputs on demand. May be interactive or file-based;
/// the phase machine retries at this boundary until it receives
/// validated values.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    async fn load(&self) -> ConfigResult<RunInput>;
}

/// `config.json` shape: damping factor, threshold and the graph
/// resource (local path or URL).
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub c: f64,
    pub threshold: f64,
    pub graph: String,
}

/// File-based configuration source.
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ConfigSource for FileSource {
    async fn load(&self) -> ConfigResult<RunInput> {
        let bytes = tokio::fs::read(&self.path).await?;
        let file: ConfigFile = serde_json::from_slice(&bytes)?;
        let graph = graph::load_graph(&file.graph).await?;
        RunInput::new(file.c, file.threshold, graph)
    }
}

/// Interactive configuration source reading from stdin.
pub struct PromptSource;

#[async_trait]
impl ConfigSource for PromptSource {
    async fn load(&self) -> ConfigResult<RunInput> {
        let (c, threshold, resource) = tokio::task::spawn_blocking(prompt_values)
            .await
            .map_err(|e| ConfigError::Io(std::io::Error::other(e)))??;
        let graph = graph::load_graph(&resource).await?;
        RunInput::new(c, threshold, graph)
    }
}

fn prompt_values() -> ConfigResult<(f64, f64, String)> {
    println!("Start new computation:");
    let c = prompt_f64("Enter c-value in range (0.0..1.0): ")?;
    let threshold = prompt_f64("Enter threshold in range (0.0..1.0): ")?;
    let resource = prompt_line("Enter graph file (local path or URL): ")?;
    Ok((c, threshold, resource))
}

fn prompt_f64(prompt: &str) -> ConfigResult<f64> {
    loop {
        let line = prompt_line(prompt)?;
        match line.parse::<f64>() {
            Ok(value) => return Ok(value),
            Err(_) => println!("Not a number, try again"),
        }
    }
}

fn prompt_line(prompt: &str) -> ConfigResult<String> {
    print!("{prompt}");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}
