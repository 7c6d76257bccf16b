use std::io;
use std::sync::{Arc, PoisonError, RwLock};

use engine::deferral::DeferralEngine;
use engine::flush::FlushScheduler;
use engine::history::PushHistory;
use engine::judge::JudgeClient;
use engine::progress::{Progress, Reporter};
use engine::push::{Git, PushExecutor};
use engine::queue::QueueStore;
use engine::workflow::Workflow;
use log::{debug, error, info, warn, LevelFilter};
use notify::Watcher;
use reqwest::Url;
use simple_logger::SimpleLogger;
use tokio::sync::mpsc::UnboundedReceiver;

mod config;
mod prompt;
mod session;
mod setup;
mod theme;

async fn print_progress(mut receiver: UnboundedReceiver<Progress>, theme: Arc<RwLock<theme::Theme>>) {
    while let Some(progress) = receiver.recv().await {
        let theme = *theme.read().unwrap_or_else(PoisonError::into_inner);
        println!("{}", theme.render(&progress));
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .env()
        .init()
        .unwrap();

    let Ok(dirs) = config::Dirs::new() else {
        error!("Could not determine configuration path");
        return Ok(());
    };
    let config_path = dirs.config_file();
    let mut prompt = prompt::Prompt::new();
    let config = match config::Config::load(&config_path) {
        Ok(config) => config,
        Err(config::Error::IOError(error)) if error.kind() == io::ErrorKind::NotFound => {
            match setup::first_run(&mut prompt, &config_path).await? {
                Some(config) => config,
                None => return Ok(()),
            }
        }
        Err(error) => {
            error!(
                "Could not load configuration from {}: {:?}",
                config_path.display(),
                error
            );
            return Ok(());
        }
    };
    info!("Loaded configuration");

    let theme = Arc::new(RwLock::new(theme::Theme::load(&dirs.theme_file())));
    let (sender, receiver) = tokio::sync::mpsc::unbounded_channel();
    let reporter = Reporter::new(sender);
    let printer = tokio::spawn(print_progress(receiver, theme.clone()));

    let repository = config.repository_dir(&dirs);
    if !repository.exists() {
        reporter.message(format!("Cloning repository {}", config.remote_url()));
        if let Err(error) = Git::clone_into(&config.remote_url(), &repository, &reporter).await {
            error!("Could not clone repository: {}", error);
            drop(reporter);
            printer.await?;
            return Ok(());
        }
    }

    let Ok(judge_url) = Url::parse(&config.judge_url) else {
        error!("Could not parse URL {}", &config.judge_url);
        return Ok(());
    };
    let judge = match JudgeClient::new(judge_url, config.request_timeout()) {
        Ok(judge) => Arc::new(judge),
        Err(error) => {
            error!("Could not set up the judge client: {}", error);
            return Ok(());
        }
    };

    let git = Git::new(&repository, config.remote.as_str(), config.branch.as_str());
    let can_push = git.identity_configured().await;
    if !can_push {
        warn!("git user.name or user.email is not set, pushing is disabled");
    }
    let queue = Arc::new(QueueStore::new(dirs.queue_file()));
    debug!("Deferred solutions are kept in {}", queue.path().display());
    let history = Arc::new(PushHistory::new(dirs.history_file()));
    let executor = Arc::new(PushExecutor::new(Arc::new(git)));
    let workflow = Arc::new(Workflow::new(
        config.judge_handle.clone(),
        DeferralEngine::new(judge, queue.clone(), config.deferral_policy()),
        executor.clone(),
        FlushScheduler::new(queue.clone(), executor),
        history,
    ));

    // Reload the configuration if the config file is changed.
    let config = Arc::new(RwLock::new(config));
    let w_config = config.clone();
    let w_workflow = workflow.clone();
    let mut watcher =
        notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
            Ok(event) => {
                let Some(path) = event.paths.first() else {
                    return;
                };
                if let Ok(new_config) = config::Config::load(path) {
                    w_workflow.reconfigure(
                        new_config.judge_handle.clone(),
                        new_config.deferral_policy(),
                    );
                    let mut config_write = w_config.write().unwrap_or_else(PoisonError::into_inner);
                    let restart_keys = config_write.restart_keys(&new_config);
                    if !restart_keys.is_empty() {
                        warn!(
                            "Changes to {} apply after a restart",
                            restart_keys.join(", ")
                        );
                    }
                    *config_write = new_config;
                    debug!("Reloaded configuration");
                }
            }
            Err(e) => warn!("Error monitoring configuration file: {}", e),
        })?;
    match watcher.watch(config_path.as_path(), notify::RecursiveMode::NonRecursive) {
        Ok(()) => debug!("Monitoring {} for changes", config_path.display()),
        Err(_) => warn!(
            "Can't monitor config file {} for changes",
            config_path.display()
        ),
    };

    let context = session::Context {
        config,
        dirs,
        repository,
        workflow,
        queue,
        reporter,
        theme,
        can_push,
    };
    session::Session::new(context, prompt).run().await?;
    printer.await?;
    Ok(())
}
