//! Prompt template loading and user-message construction.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{MeterError, Result};

/// File name of the template when no explicit path is configured.
pub const DEFAULT_PROMPT_FILE: &str = "prompt.xml";

/// Prefix of the user message sent with every rating request.
pub const EVENTS_PREFIX: &str = "Here are the recent events: ";

/// One caller-supplied item. Only a string `title` is consumed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NewsItem {
    fields: Map<String, Value>,
}

impl NewsItem {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Convenience constructor for an item carrying only a title.
    pub fn with_title(title: &str) -> Self {
        let mut fields = Map::new();
        fields.insert("title".to_string(), Value::String(title.to_string()));
        Self { fields }
    }

    /// The `title` field, if present and a string.
    pub fn title(&self) -> Option<&str> {
        self.fields.get("title").and_then(Value::as_str)
    }
}

/// Titles one per line, in input order; items without a title are skipped.
pub fn build_user_message(items: &[NewsItem]) -> String {
    let mut message = String::from(EVENTS_PREFIX);
    for title in items.iter().filter_map(NewsItem::title) {
        message.push_str(title);
        message.push('\n');
    }
    message
}

/// Where the system prompt template lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSource {
    path: PathBuf,
}

impl PromptSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `prompt.xml` in the directory of the running executable.
    pub fn beside_executable() -> Result<Self> {
        let exe = std::env::current_exe().map_err(|e| {
            MeterError::Config(format!("failed to determine executable path: {}", e))
        })?;
        let dir = exe.parent().ok_or_else(|| {
            MeterError::Config(format!("executable {} has no parent", exe.display()))
        })?;
        Ok(Self::new(dir.join(DEFAULT_PROMPT_FILE)))
    }

    /// Use `configured` when given, otherwise the default location.
    pub fn resolve(configured: Option<&Path>) -> Result<Self> {
        match configured {
            Some(path) => Ok(Self::new(path)),
            None => Self::beside_executable(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the template. Not cached: edits take effect on the next miss.
    pub async fn load(&self) -> Result<String> {
        tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            MeterError::Config(format!(
                "failed to read prompt file {}: {}",
                self.path.display(),
                e
            ))
        })
    }
}
