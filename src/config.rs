use anyhow::Context;
use clap::{Parser, ValueEnum};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::types::LabelSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Server host to bind to
    #[arg(long, env = "HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Server port to bind to
    #[arg(long, env = "PORT", default_value = "5000")]
    pub port: u16,

    /// Path to the ONNX classifier artifact
    #[arg(long, env = "MODEL_PATH", default_value = "model/waste_classifier.onnx")]
    pub model_path: PathBuf,

    /// Labels mapping in format "0=CardBoard,1=Food Organics,..."; defaults to the built-in waste classes
    #[arg(long, env = "ID2LABEL")]
    pub id2label: Option<String>,

    /// Apply softmax to the model output (for models exported with raw logits)
    #[arg(long, env = "APPLY_SOFTMAX")]
    pub apply_softmax: bool,

    /// Number of inference worker threads
    #[arg(long, env = "WORKERS", default_value = "2")]
    pub workers: usize,

    /// Maximum number of images waiting for a free worker
    #[arg(long, env = "QUEUE_CAPACITY", default_value = "32")]
    pub queue_capacity: usize,

    /// Maximum accepted request body size in bytes
    #[arg(long, env = "MAX_UPLOAD_BYTES", default_value = "10485760")]
    pub max_upload_bytes: usize,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value = "text")]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub workers: usize,
    pub queue_capacity: usize,
}

impl From<&Config> for PoolConfig {
    fn from(config: &Config) -> Self {
        Self {
            workers: config.workers,
            queue_capacity: config.queue_capacity,
        }
    }
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.workers == 0 {
            anyhow::bail!("--workers must be at least 1");
        }
        if self.queue_capacity == 0 {
            anyhow::bail!("--queue-capacity must be at least 1");
        }
        Ok(())
    }

    /// Parses `--id2label`. Every pair must be `<id>=<label>` and each id may
    /// appear only once.
    pub fn parse_id2label(&self) -> anyhow::Result<Option<HashMap<u32, String>>> {
        let Some(labels) = self.id2label.as_ref() else {
            return Ok(None);
        };

        let mut id2label = HashMap::new();
        for pair in labels.split(',') {
            let Some((id, label)) = pair.split_once('=') else {
                anyhow::bail!("Label pair {pair:?} is not in the form <id>=<label>");
            };
            let id: u32 = id
                .trim()
                .parse()
                .with_context(|| format!("Label id {:?} is not a number", id.trim()))?;
            if id2label.insert(id, label.trim().to_string()).is_some() {
                anyhow::bail!("Label id {id} is listed more than once");
            }
        }
        Ok(Some(id2label))
    }

    /// Label table from `--id2label`, or the built-in waste classes.
    pub fn label_set(&self) -> anyhow::Result<LabelSet> {
        match self.parse_id2label()? {
            Some(id2label) => LabelSet::from_id2label(id2label),
            None => Ok(LabelSet::default()),
        }
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
