use std::path::Path;

use log::{error, info};
use shared::{GithubUsername, Handle, RepoName};

use crate::config::Config;
use crate::prompt::Prompt;

/// Ask for the three required settings and save them. `None` if stdin closed
/// before all answers were given or the file could not be written.
pub async fn first_run(prompt: &mut Prompt, config_path: &Path) -> std::io::Result<Option<Config>> {
    println!("Set up a GitHub repository for your solutions if you haven't yet.");
    let Some(github_username) = prompt.valid::<GithubUsername>("GitHub username: ").await? else {
        return Ok(None);
    };
    let Some(repo_name) = prompt.valid::<RepoName>("Repository name: ").await? else {
        return Ok(None);
    };
    let Some(judge_handle) = prompt.valid::<Handle>("Codeforces handle: ").await? else {
        return Ok(None);
    };

    let config = Config::new(github_username, repo_name, judge_handle);
    match config.save(config_path) {
        Ok(()) => info!("Saved configuration to {}", config_path.display()),
        Err(error) => {
            error!(
                "Could not save configuration to {}: {:?}",
                config_path.display(),
                error
            );
            return Ok(None);
        }
    }
    Ok(Some(config))
}
