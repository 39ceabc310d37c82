//! Subprocess runner for compiled and interpreted languages

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use tokio::process::Command;

use super::{ExecutionError, Language, NO_OUTPUT_MESSAGE};
use crate::config::ExecutionConfig;

const PROGRAM_NAME: &str = "program";

/// Runs one program per call in a throwaway directory
#[derive(Debug, Clone)]
pub struct Runner {
    config: ExecutionConfig,
}

/// One external command with its time limit
struct Step {
    program: PathBuf,
    args: Vec<String>,
    limit: Duration,
}

impl Step {
    fn new(program: impl Into<PathBuf>, args: &[&str], limit: Duration) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
            limit,
        }
    }
}

/// Source file name, source text, compile step and run step for a language
struct Plan {
    file_name: &'static str,
    source: String,
    compile: Option<Step>,
    run: Step,
}

impl Runner {
    pub fn new(config: ExecutionConfig) -> Self {
        Self { config }
    }

    /// Compile (if needed) and run `code`, returning its console output
    pub async fn run(&self, language: Language, code: &str) -> Result<String, ExecutionError> {
        let workspace = tempfile::Builder::new().prefix("logline-exec-").tempdir()?;
        let dir = workspace.path();

        let result = self.run_in(language, code, dir).await;

        // Strip the scratch path so error text reads like plain compiler output
        let result = result.map_err(|e| match e {
            ExecutionError::Failed(msg) => ExecutionError::Failed(strip_workspace(&msg, dir)),
            other => other,
        });

        if let Err(e) = workspace.close() {
            tracing::warn!(error = %e, "Failed to remove execution workspace");
        }
        result
    }

    async fn run_in(
        &self,
        language: Language,
        code: &str,
        dir: &Path,
    ) -> Result<String, ExecutionError> {
        let plan = self.plan(language, code, dir)?;
        tokio::fs::write(dir.join(plan.file_name), &plan.source).await?;

        if let Some(compile) = &plan.compile {
            run_step(compile, dir).await?;
        }

        let output = run_step(&plan.run, dir).await?;
        Ok(console_text(&output))
    }

    fn plan(&self, language: Language, code: &str, dir: &Path) -> Result<Plan, ExecutionError> {
        let cfg = &self.config;
        let binary = dir.join(PROGRAM_NAME);

        let plan = match language {
            Language::JavaScript => Plan {
                file_name: "script.js",
                source: code.to_string(),
                compile: None,
                run: Step::new("node", &["script.js"], cfg.run_timeout()),
            },
            Language::TypeScript => Plan {
                file_name: "script.ts",
                source: code.to_string(),
                compile: None,
                run: Step::new("npx", &["ts-node", "script.ts"], cfg.slow_run_timeout()),
            },
            Language::Python => Plan {
                file_name: "script.py",
                source: code.to_string(),
                compile: None,
                run: Step::new("python3", &["script.py"], cfg.run_timeout()),
            },
            Language::Java => Plan {
                file_name: "Main.java",
                source: rename_public_class(code, "Main"),
                compile: Some(Step::new("javac", &["Main.java"], cfg.compile_timeout())),
                run: Step::new("java", &["Main"], cfg.run_timeout()),
            },
            Language::Cpp => Plan {
                file_name: "script.cpp",
                source: code.to_string(),
                compile: Some(Step::new(
                    "g++",
                    &["-o", PROGRAM_NAME, "script.cpp"],
                    cfg.compile_timeout(),
                )),
                run: Step::new(binary, &[], cfg.run_timeout()),
            },
            Language::Rust => Plan {
                file_name: "script.rs",
                source: code.to_string(),
                compile: Some(Step::new(
                    "rustc",
                    &["-o", PROGRAM_NAME, "script.rs"],
                    cfg.rust_compile_timeout(),
                )),
                run: Step::new(binary, &[], cfg.run_timeout()),
            },
            Language::Go => Plan {
                file_name: "script.go",
                source: code.to_string(),
                compile: None,
                run: Step::new("go", &["run", "script.go"], cfg.slow_run_timeout()),
            },
            other => {
                return Err(ExecutionError::Failed(format!(
                    "Execution not supported for {}",
                    other.id()
                )))
            }
        };
        Ok(plan)
    }
}

async fn run_step(step: &Step, dir: &Path) -> Result<Output, ExecutionError> {
    let program = step.program.display().to_string();

    let child = Command::new(&step.program)
        .args(&step.args)
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ExecutionError::Spawn {
            program: program.clone(),
            source,
        })?;

    let output = tokio::time::timeout(step.limit, child.wait_with_output())
        .await
        .map_err(|_| ExecutionError::Timeout {
            secs: step.limit.as_secs(),
        })?
        .map_err(|e| ExecutionError::Failed(format!("Failed to wait for {program}: {e}")))?;

    if output.status.success() {
        return Ok(output);
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let message = if !stderr.trim().is_empty() {
        stderr.into_owned()
    } else if !stdout.trim().is_empty() {
        stdout.into_owned()
    } else {
        format!("{program} exited with {}", output.status)
    };
    Err(ExecutionError::Failed(message))
}

/// stdout, else stderr, else a fixed message
fn console_text(output: &Output) -> String {
    if !output.stdout.is_empty() {
        String::from_utf8_lossy(&output.stdout).into_owned()
    } else if !output.stderr.is_empty() {
        String::from_utf8_lossy(&output.stderr).into_owned()
    } else {
        NO_OUTPUT_MESSAGE.to_string()
    }
}

/// Rename the first `public class X` so it matches the file name
fn rename_public_class(code: &str, class_name: &str) -> String {
    static PUBLIC_CLASS_RE: OnceLock<Option<Regex>> = OnceLock::new();

    match PUBLIC_CLASS_RE.get_or_init(|| Regex::new(r"public\s+class\s+\w+").ok()) {
        Some(re) => re
            .replace(code, format!("public class {class_name}").as_str())
            .into_owned(),
        None => code.to_string(),
    }
}

fn strip_workspace(message: &str, dir: &Path) -> String {
    let prefix = format!("{}{}", dir.display(), std::path::MAIN_SEPARATOR);
    message.replace(&prefix, "")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn which(program: &str) -> bool {
        std::process::Command::new(program)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok()
    }

    #[test]
    fn test_rename_public_class() {
        let code = "public class HelloWorld {\n  public static void main(String[] a) {}\n}";
        let renamed = rename_public_class(code, "Main");
        assert!(renamed.starts_with("public class Main {"));

        let untouched = rename_public_class("class Foo {}", "Main");
        assert_eq!(untouched, "class Foo {}");
    }

    #[test]
    fn test_strip_workspace() {
        let dir = Path::new("/tmp/logline-exec-abc");
        let msg = "/tmp/logline-exec-abc/script.py: line 1: error";
        assert_eq!(strip_workspace(msg, dir), "script.py: line 1: error");
    }

    #[tokio::test]
    async fn test_missing_toolchain_reports_spawn_error() {
        let step = Step::new(
            "logline-definitely-not-a-real-binary",
            &[],
            Duration::from_secs(1),
        );
        let dir = tempfile::tempdir().unwrap();
        let err = run_step(&step, dir.path()).await.unwrap_err();
        assert!(matches!(err, ExecutionError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_python_prints_output() {
        if !which("python3") {
            return;
        }
        let runner = Runner::new(ExecutionConfig::default());
        let output = runner.run(Language::Python, "print(1 + 1)").await.unwrap();
        assert_eq!(output, "2\n");
    }

    #[tokio::test]
    async fn test_python_failure_hides_workspace_path() {
        if !which("python3") {
            return;
        }
        let runner = Runner::new(ExecutionConfig::default());
        let err = runner
            .run(Language::Python, "raise SystemExit('boom')")
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("boom"));
        assert!(!msg.contains("logline-exec-"));
    }

    #[tokio::test]
    async fn test_timeout() {
        if !which("python3") {
            return;
        }
        let config = ExecutionConfig {
            run_timeout_secs: 1,
            ..ExecutionConfig::default()
        };
        let runner = Runner::new(config);
        let err = runner
            .run(Language::Python, "import time\ntime.sleep(5)")
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Timeout { secs: 1 }));
    }
}
