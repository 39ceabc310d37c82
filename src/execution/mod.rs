//! Code execution side channel
//!
//! A stateless request/response runner keyed by language id. Each request
//! gets a fresh temporary working directory that is removed when the request
//! completes. Every failure is rendered into the `error` field of the
//! response; nothing here touches the synchronization path.

pub mod runner;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ExecutionConfig;
use crate::metrics;

pub use runner::Runner;

/// Output reported when a program prints nothing
pub const NO_OUTPUT_MESSAGE: &str = "Code executed successfully (no output)";

// ============================================================================
// Request / Response
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExecuteRequest {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub language: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecuteResponse {
    pub fn output(output: impl Into<String>) -> Self {
        Self {
            output: Some(output.into()),
            error: None,
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self {
            output: None,
            error: Some(error.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

// ============================================================================
// Languages
// ============================================================================

/// Supported language ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    JavaScript,
    TypeScript,
    Python,
    Java,
    Cpp,
    Rust,
    Go,
    Html,
    Css,
    Json,
    Markdown,
    Sql,
    Yaml,
    Xml,
}

impl Language {
    pub fn from_id(id: &str) -> Option<Self> {
        let language = match id {
            "javascript" => Self::JavaScript,
            "typescript" => Self::TypeScript,
            "python" => Self::Python,
            "java" => Self::Java,
            "cpp" => Self::Cpp,
            "rust" => Self::Rust,
            "go" => Self::Go,
            "html" => Self::Html,
            "css" => Self::Css,
            "json" => Self::Json,
            "markdown" => Self::Markdown,
            "sql" => Self::Sql,
            "yaml" => Self::Yaml,
            "xml" => Self::Xml,
            _ => return None,
        };
        Some(language)
    }

    pub fn id(&self) -> &'static str {
        match self {
            Self::JavaScript => "javascript",
            Self::TypeScript => "typescript",
            Self::Python => "python",
            Self::Java => "java",
            Self::Cpp => "cpp",
            Self::Rust => "rust",
            Self::Go => "go",
            Self::Html => "html",
            Self::Css => "css",
            Self::Json => "json",
            Self::Markdown => "markdown",
            Self::Sql => "sql",
            Self::Yaml => "yaml",
            Self::Xml => "xml",
        }
    }

    /// Fixed console message for languages that are only highlighted, never run
    pub fn static_output(&self) -> Option<&'static str> {
        match self {
            Self::Html => Some("HTML preview not available in console. The code is valid HTML."),
            Self::Css => Some("CSS preview not available in console. The code is valid CSS."),
            Self::Markdown => Some(
                "Markdown rendering not available in console. The code is valid Markdown.",
            ),
            Self::Sql => Some(
                "SQL execution requires a database connection. Code syntax highlighting is available.",
            ),
            Self::Yaml => Some(
                "YAML validation not available in console. Code syntax highlighting is available.",
            ),
            Self::Xml => Some(
                "XML validation not available in console. Code syntax highlighting is available.",
            ),
            _ => None,
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Reasons a run produced no usable output
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Execution timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("{0}")]
    Failed(String),

    #[error("Failed to prepare workspace: {0}")]
    Workspace(#[from] std::io::Error),
}

// ============================================================================
// Gateway
// ============================================================================

/// Entry point used by `POST /execute`
#[derive(Debug, Clone)]
pub struct ExecutionGateway {
    runner: Runner,
}

impl ExecutionGateway {
    pub fn new(config: ExecutionConfig) -> Self {
        Self {
            runner: Runner::new(config),
        }
    }

    /// Run `code` as `language`; never fails, errors land in the response
    pub async fn execute(&self, code: &str, language: &str) -> ExecuteResponse {
        let Some(lang) = Language::from_id(language) else {
            metrics::record_execution("unsupported", "error");
            return ExecuteResponse::error(format!("Execution not supported for {language}"));
        };

        let response = match (lang, lang.static_output()) {
            (_, Some(message)) => ExecuteResponse::output(message),
            (Language::Json, None) => validate_json(code),
            _ => match self.runner.run(lang, code).await {
                Ok(output) => ExecuteResponse::output(output),
                Err(e) => {
                    tracing::debug!(language, error = %e, "Execution failed");
                    ExecuteResponse::error(e.to_string())
                }
            },
        };

        let outcome = if response.is_error() { "error" } else { "ok" };
        metrics::record_execution(lang.id(), outcome);
        response
    }
}

fn validate_json(code: &str) -> ExecuteResponse {
    match serde_json::from_str::<serde_json::Value>(code) {
        Ok(_) => ExecuteResponse::output("Valid JSON!"),
        Err(e) => ExecuteResponse::error(format!("Invalid JSON: {e}")),
    }
}
