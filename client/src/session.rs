use std::io;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use engine::progress::Reporter;
use engine::queue::QueueStore;
use engine::scaffold;
use engine::toolchain::Toolchain;
use engine::workflow::{format_time, PushOutcome, Workflow};
use log::{error, warn};
use shared::{ProblemId, SolvedFile};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, Dirs};
use crate::prompt::Prompt;
use crate::theme::Theme;

static MENU: &str = "\t'c' compile  'r' run  'g' push  'f' flush queue  'l' list queue\n\
                     \t'x' cancel waiting pushes  'n' new problem  't' theme  'q' quit";

/// Shared state the session works with. Settings are read from `config` at
/// each command so edits to the file apply without a restart; the judge and
/// repository wiring inside `workflow` is fixed at start-up.
pub struct Context {
    pub config: Arc<RwLock<Config>>,
    pub dirs: Dirs,
    pub repository: PathBuf,
    pub workflow: Arc<Workflow>,
    pub queue: Arc<QueueStore>,
    pub reporter: Reporter,
    pub theme: Arc<RwLock<Theme>>,
    pub can_push: bool,
}

struct Current {
    file: SolvedFile,
    extension: String,
}

pub struct Session {
    context: Context,
    prompt: Prompt,
    current: Option<Current>,
    tasks: Vec<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl Session {
    pub fn new(context: Context, prompt: Prompt) -> Self {
        Self {
            context,
            prompt,
            current: None,
            tasks: Vec::new(),
            cancel: CancellationToken::new(),
        }
    }

    fn config(&self) -> Config {
        self.context
            .config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub async fn run(mut self) -> io::Result<()> {
        if self.context.can_push {
            self.flush();
        }
        if !self.new_problem().await? {
            return self.finish().await;
        }
        loop {
            println!("\n{}\n", MENU);
            let Some(option) = self.prompt.line("Option: ").await? else {
                break;
            };
            match option.to_lowercase().as_str() {
                "c" => self.compile().await,
                "r" => self.run_solution().await?,
                "g" => self.push(),
                "f" => self.flush(),
                "l" => self.list_queue(),
                "x" => self.cancel_waiting(),
                "n" => {
                    if !self.new_problem().await? {
                        break;
                    }
                }
                "t" => self.toggle_theme(),
                "q" => {
                    println!("quitting...");
                    break;
                }
                "" => {}
                other => println!("Unknown option {:?}", other),
            }
            self.tasks.retain(|task| !task.is_finished());
        }
        self.finish().await
    }

    /// `false` once stdin is closed.
    async fn new_problem(&mut self) -> io::Result<bool> {
        let Some(problem_id) = self
            .prompt
            .valid::<ProblemId>("Problem ID (e.g. 2160B): ")
            .await?
        else {
            return Ok(false);
        };
        let config = self.config();
        let extension = loop {
            let question = format!("Language ({}): ", config.languages());
            let Some(answer) = self.prompt.line(&question).await? else {
                return Ok(false);
            };
            if config.toolchains.contains_key(&answer) {
                break answer;
            }
            println!("No toolchain configured for {:?}", answer);
        };

        let template = config.template_path(&self.context.dirs, &extension);
        let file = match scaffold::scaffold(
            problem_id,
            &self.context.repository,
            &extension,
            Some(template.as_path()),
        ) {
            Ok(file) => file,
            Err(error) => {
                error!("Could not create the code file: {}", error);
                return Ok(true);
            }
        };
        scaffold::launch_editor(&config.editor, &file.file_path);
        println!("--- {} created ---", file.file_name);
        println!("Try for no more than 30 minutes, then read the tutorial.");
        if !self.context.can_push {
            println!(
                "Git has no user.name/user.email, so pushing is disabled. \
                Your solutions stay in {} and can be pushed later.",
                self.context.repository.display()
            );
        }
        self.current = Some(Current { file, extension });
        Ok(true)
    }

    fn current_toolchain(&self) -> Option<(SolvedFile, Toolchain, PathBuf)> {
        let Some(current) = &self.current else {
            println!("Create a code file first");
            return None;
        };
        let config = self.config();
        let Some(toolchain) = config.toolchains.get(&current.extension) else {
            println!("No toolchain configured for {:?}", current.extension);
            return None;
        };
        let stem = current
            .file
            .file_path
            .file_stem()
            .map(|stem| stem.to_os_string())
            .unwrap_or_else(|| current.file.file_name.clone().into());
        let artifact = self.context.dirs.build_dir().join(stem);
        Some((current.file.clone(), toolchain.clone(), artifact))
    }

    async fn compile(&self) {
        let Some((file, toolchain, artifact)) = self.current_toolchain() else {
            return;
        };
        // Failures are already on the progress channel.
        let _ = toolchain
            .compile(&file.file_path, &artifact, &self.context.reporter)
            .await;
    }

    async fn run_solution(&mut self) -> io::Result<()> {
        let Some((file, toolchain, artifact)) = self.current_toolchain() else {
            return Ok(());
        };
        println!("Paste the input, then a line containing only EOF:");
        let input = self.prompt.block("EOF").await?;
        let timeout = self.config().run_timeout();
        println!("--- Running {} ---", file.problem_id);
        if let Ok(output) = toolchain
            .run(
                &file.file_path,
                &artifact,
                &input,
                timeout,
                &self.context.reporter,
            )
            .await
        {
            if !output.stdout.trim().is_empty() {
                println!("-- Output:\n{}", output.stdout);
            }
            if !output.stderr.trim().is_empty() {
                println!("[stderr]\n{}", output.stderr);
            }
        }
        Ok(())
    }

    fn push(&mut self) {
        if !self.context.can_push {
            println!("Pushing is disabled until git user.name and user.email are set");
            return;
        }
        let Some(current) = &self.current else {
            println!("Create a code file first");
            return;
        };
        let file = current.file.clone();
        let workflow = self.context.workflow.clone();
        let reporter = self.context.reporter.clone();
        let cancel = self.cancel.child_token();
        self.tasks.push(tokio::spawn(async move {
            match workflow.push_solved(&file, &reporter, &cancel).await {
                Ok(PushOutcome::Pushed) => {
                    reporter.message(format!("Success! {} pushed", file.file_name))
                }
                Ok(PushOutcome::Deferred { .. }) => {}
                Err(engine::Error::Cancelled) => {
                    reporter.message(format!("Push of {} cancelled", file.file_name))
                }
                Err(error) => {
                    reporter.message(format!("Push of {} failed: {}", file.file_name, error))
                }
            }
        }));
    }

    fn flush(&mut self) {
        let workflow = self.context.workflow.clone();
        let reporter = self.context.reporter.clone();
        self.tasks.push(tokio::spawn(async move {
            match workflow.flush(&reporter).await {
                Ok(outcome) if outcome.pushed.is_empty() => {
                    if outcome.pending > 0 {
                        reporter.message(format!(
                            "{} contest solutions still waiting",
                            outcome.pending
                        ));
                    }
                }
                Ok(outcome) => reporter.message(format!(
                    "Pushed deferred {}, {} still waiting",
                    outcome.pushed.join(", "),
                    outcome.pending
                )),
                Err(error) => {
                    reporter.message(format!("Could not push deferred solutions: {}", error))
                }
            }
        }));
    }

    fn list_queue(&self) {
        let entries = match self.context.queue.load() {
            Ok(entries) => entries,
            Err(error) => {
                error!("{}", error);
                return;
            }
        };
        if entries.is_empty() {
            println!("No deferred solutions");
            return;
        }
        let now = chrono::Utc::now().timestamp();
        for (file_name, unlock_time) in entries {
            let state = if unlock_time <= now { "ready" } else { "waiting" };
            println!(
                "{:<16} {} ({})",
                file_name,
                format_time(unlock_time),
                state
            );
        }
    }

    /// Pushes that have not started staging yet are dropped.
    fn cancel_waiting(&mut self) {
        self.cancel.cancel();
        self.cancel = CancellationToken::new();
    }

    fn toggle_theme(&self) {
        let mut theme = self
            .context
            .theme
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *theme = theme.toggled();
        if let Err(error) = theme.save(&self.context.dirs.theme_file()) {
            warn!("Could not save theme preference: {}", error);
        }
    }

    async fn finish(self) -> io::Result<()> {
        let running = self.tasks.iter().filter(|task| !task.is_finished()).count();
        if running > 0 {
            println!("Waiting for {} background operations...", running);
        }
        for task in self.tasks {
            if let Err(error) = task.await {
                error!("Background operation failed: {}", error);
            }
        }
        Ok(())
    }
}
