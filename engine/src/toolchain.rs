use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use log::debug;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::{Error, Result};
use crate::progress::{Progress, Reporter, Step};

/// A program and its arguments. `{source}` and `{artifact}` in any position
/// are replaced with the solution file and the compiled binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandLine {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandLine {
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|arg| arg.to_string()).collect(),
        }
    }

    fn command(&self, source: &Path, artifact: &Path) -> Command {
        let substitute = |value: &str| {
            value
                .replace("{source}", &source.to_string_lossy())
                .replace("{artifact}", &artifact.to_string_lossy())
        };
        let mut command = Command::new(substitute(&self.program));
        command.args(self.args.iter().map(|arg| substitute(arg)));
        command
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Toolchain {
    /// Run the source file directly, e.g. with `python3`.
    Interpreted { run: CommandLine },
    /// Build an artifact first, then run it.
    Compiled { compile: CommandLine, run: CommandLine },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileOutcome {
    Built,
    NotNeeded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Toolchains keyed by file extension.
pub fn default_toolchains() -> BTreeMap<String, Toolchain> {
    BTreeMap::from([
        (
            "cpp".to_string(),
            Toolchain::Compiled {
                compile: CommandLine::new(
                    "g++",
                    &["-std=c++14", "-O2", "{source}", "-o", "{artifact}"],
                ),
                run: CommandLine::new("{artifact}", &[]),
            },
        ),
        (
            "py".to_string(),
            Toolchain::Interpreted {
                run: CommandLine::new("python3", &["{source}"]),
            },
        ),
    ])
}

impl Toolchain {
    pub fn needs_compilation(&self) -> bool {
        matches!(self, Toolchain::Compiled { .. })
    }

    pub async fn compile(
        &self,
        source: &Path,
        artifact: &Path,
        reporter: &Reporter,
    ) -> Result<CompileOutcome> {
        let Toolchain::Compiled { compile, .. } = self else {
            reporter.message("Compilation not needed");
            return Ok(CompileOutcome::NotNeeded);
        };
        if let Some(parent) = artifact.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|error| Error::io(parent, error))?;
        }
        reporter.send(Progress::StepStarted(Step::Compile));
        let result = compile
            .command(source, artifact)
            .stdin(Stdio::null())
            .output()
            .await;
        let output = match result {
            Ok(output) => output,
            Err(error) => return fail(reporter, Step::Compile, error.to_string()),
        };
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            return fail(reporter, Step::Compile, format!("{}{}", stderr, output.status));
        }
        reporter.send(Progress::StepSucceeded(Step::Compile));
        Ok(CompileOutcome::Built)
    }

    /// Run the solution with `input` on stdin. A non-zero exit or hitting
    /// `timeout` is an [`Error::ExternalTool`] carrying whatever was printed.
    pub async fn run(
        &self,
        source: &Path,
        artifact: &Path,
        input: &str,
        timeout: Duration,
        reporter: &Reporter,
    ) -> Result<RunOutput> {
        let run = match self {
            Toolchain::Interpreted { run } => run,
            Toolchain::Compiled { run, .. } => {
                if !artifact.exists() {
                    return fail(reporter, Step::Run, "not compiled yet".to_string());
                }
                run
            }
        };
        reporter.send(Progress::StepStarted(Step::Run));
        let mut command = run.command(source, artifact);
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        debug!("Running {:?}", command);
        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(error) => return fail(reporter, Step::Run, error.to_string()),
        };
        if let Some(mut stdin) = child.stdin.take() {
            // A solution may exit without reading its input.
            let _ = stdin.write_all(input.as_bytes()).await;
        }

        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(error)) => return fail(reporter, Step::Run, error.to_string()),
            Err(_) => {
                return fail(
                    reporter,
                    Step::Run,
                    format!("timed out after {}s", timeout.as_secs_f32()),
                )
            }
        };
        let result = RunOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };
        if !output.status.success() {
            return fail(
                reporter,
                Step::Run,
                format!("{}{}{}", result.stdout, result.stderr, output.status),
            );
        }
        reporter.send(Progress::StepSucceeded(Step::Run));
        Ok(result)
    }
}

fn fail<T>(reporter: &Reporter, step: Step, output: String) -> Result<T> {
    reporter.send(Progress::StepFailed {
        step,
        output: output.clone(),
    });
    Err(Error::tool(step, output))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn shell(script: &str) -> Toolchain {
        Toolchain::Interpreted {
            run: CommandLine::new("sh", &["-c", script]),
        }
    }

    #[tokio::test]
    async fn interpreted_needs_no_compilation() {
        let toolchain = shell("cat");
        let outcome = toolchain
            .compile(Path::new("a.py"), Path::new("a"), &Reporter::silent())
            .await
            .unwrap();
        assert_eq!(outcome, CompileOutcome::NotNeeded);
        assert!(!toolchain.needs_compilation());
    }

    #[tokio::test]
    async fn run_feeds_input_and_captures_output() {
        let output = shell("read a b; echo $((a + b)); echo note >&2")
            .run(
                Path::new("a.py"),
                Path::new("a"),
                "2 3\n",
                Duration::from_secs(5),
                &Reporter::silent(),
            )
            .await
            .unwrap();
        assert_eq!(output.stdout, "5\n");
        assert_eq!(output.stderr, "note\n");
    }

    #[tokio::test]
    async fn non_zero_exit_is_a_run_failure() {
        let error = shell("echo partial; exit 3")
            .run(
                Path::new("a.py"),
                Path::new("a"),
                "",
                Duration::from_secs(5),
                &Reporter::silent(),
            )
            .await
            .unwrap_err();
        assert_eq!(error.step(), Some(Step::Run));
        assert!(error.to_string().contains("partial"));
    }

    #[tokio::test]
    async fn slow_solution_times_out() {
        let error = shell("sleep 5")
            .run(
                Path::new("a.py"),
                Path::new("a"),
                "",
                Duration::from_millis(100),
                &Reporter::silent(),
            )
            .await
            .unwrap_err();
        assert!(error.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn compiled_run_requires_artifact() {
        let directory = tempfile::tempdir().unwrap();
        let toolchain = Toolchain::Compiled {
            compile: CommandLine::new("sh", &["-c", "cp {source} {artifact}"]),
            run: CommandLine::new("sh", &["{artifact}"]),
        };
        let source = directory.path().join("1A.sh");
        let artifact = directory.path().join("build").join("1A");
        std::fs::write(&source, "echo built\n").unwrap();

        let missing = toolchain
            .run(&source, &artifact, "", Duration::from_secs(5), &Reporter::silent())
            .await;
        assert!(missing.is_err());

        let outcome = toolchain
            .compile(&source, &artifact, &Reporter::silent())
            .await
            .unwrap();
        assert_eq!(outcome, CompileOutcome::Built);
        let output = toolchain
            .run(&source, &artifact, "", Duration::from_secs(5), &Reporter::silent())
            .await
            .unwrap();
        assert_eq!(output.stdout, "built\n");
    }

    #[test]
    fn toolchains_read_from_yaml() {
        let yaml = "kind: compiled\ncompile:\n  program: g++\n  args: ['{source}', -o, '{artifact}']\nrun:\n  program: '{artifact}'\n";
        let toolchain: Toolchain = serde_yaml::from_str(yaml).unwrap();
        assert!(toolchain.needs_compilation());
        assert_eq!(default_toolchains().len(), 2);
    }
}
