use std::fmt;

use tokio::sync::mpsc::UnboundedSender;

/// One externally visible step of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    Clone,
    Stage,
    Commit,
    PullRebase,
    Push,
    Compile,
    Run,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::Clone => "clone",
            Step::Stage => "stage",
            Step::Commit => "commit",
            Step::PullRebase => "pull-rebase",
            Step::Push => "push",
            Step::Compile => "compile",
            Step::Run => "run",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    StepStarted(Step),
    StepSucceeded(Step),
    StepFailed { step: Step, output: String },
    Message(String),
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Progress::StepStarted(step) => write!(f, "{}...", step),
            Progress::StepSucceeded(step) => write!(f, "{} done", step),
            Progress::StepFailed { step, output } => write!(f, "{} failed: {}", step, output),
            Progress::Message(message) => f.write_str(message),
        }
    }
}

/// Sending half handed to operations. Silently drops events once the
/// receiver is gone.
#[derive(Debug, Clone, Default)]
pub struct Reporter {
    sender: Option<UnboundedSender<Progress>>,
}

impl Reporter {
    pub fn new(sender: UnboundedSender<Progress>) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    /// A reporter that discards everything.
    pub fn silent() -> Self {
        Self { sender: None }
    }

    pub fn send(&self, progress: Progress) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(progress);
        }
    }

    pub fn message(&self, message: impl Into<String>) {
        self.send(Progress::Message(message.into()));
    }
}
