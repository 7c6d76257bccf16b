use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use log::{info, warn};
use shared::{ProblemId, SolvedFile};
use tokio::process::Command;

use crate::error::{Error, Result};

/// Create `<problem>.<extension>` in `directory` unless it already exists,
/// seeded from `template` when that file is present. Returns the file with
/// its creation time read back from the filesystem.
pub fn scaffold(
    problem_id: ProblemId,
    directory: &Path,
    extension: &str,
    template: Option<&Path>,
) -> Result<SolvedFile> {
    let file = SolvedFile::new(problem_id, directory, extension);
    if file.file_path.exists() {
        info!("{} already exists, keeping it", file.file_name);
    } else {
        fs::create_dir_all(directory).map_err(|error| Error::io(directory, error))?;
        match template.filter(|template| template.is_file()) {
            Some(template) => {
                fs::copy(template, &file.file_path).map_err(|error| Error::io(template, error))?;
            }
            None => {
                fs::write(&file.file_path, "").map_err(|error| Error::io(&file.file_path, error))?;
            }
        }
        info!("Created {}", file.file_path.display());
    }
    let created_at = scaffold_time(&file.file_path);
    Ok(file.with_created_at(created_at))
}

/// Birth time only; filesystems without one give `None`.
fn scaffold_time(path: &Path) -> Option<i64> {
    let created = fs::metadata(path).ok()?.created().ok()?;
    Some(DateTime::<Utc>::from(created).timestamp())
}

/// Start `editor` on `path` without waiting for it. Failing to start is
/// logged and otherwise ignored.
pub fn launch_editor(editor: &str, path: &Path) -> bool {
    match Command::new(editor).arg(path).spawn() {
        Ok(_) => true,
        Err(error) => {
            warn!("Could not launch {} for {}: {}", editor, path.display(), error);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn problem() -> ProblemId {
        "2160B".parse().unwrap()
    }

    #[test]
    fn copies_template() {
        let directory = tempfile::tempdir().unwrap();
        let template = directory.path().join("cpp_template.txt");
        fs::write(&template, "int main() {}\n").unwrap();

        let repo = directory.path().join("repo");
        let file = scaffold(problem(), &repo, "cpp", Some(&template)).unwrap();

        assert_eq!(file.file_path, repo.join("2160B.cpp"));
        assert_eq!(fs::read_to_string(&file.file_path).unwrap(), "int main() {}\n");
    }

    #[test]
    fn scaffold_time_is_birth_time_only() {
        let directory = tempfile::tempdir().unwrap();

        let file = scaffold(problem(), directory.path(), "cpp", None).unwrap();

        let metadata = fs::metadata(&file.file_path).unwrap();
        match metadata.created() {
            Ok(created) => assert_eq!(
                file.created_at,
                Some(DateTime::<Utc>::from(created).timestamp())
            ),
            Err(_) => assert_eq!(file.created_at, None),
        }
    }

    #[test]
    fn missing_template_gives_empty_file() {
        let directory = tempfile::tempdir().unwrap();
        let template = directory.path().join("py_template.txt");

        let file = scaffold(problem(), directory.path(), "py", Some(&template)).unwrap();

        assert_eq!(fs::read_to_string(&file.file_path).unwrap(), "");
    }

    #[test]
    fn existing_file_is_kept() {
        let directory = tempfile::tempdir().unwrap();
        let existing = directory.path().join("2160B.py");
        fs::write(&existing, "print(42)\n").unwrap();

        scaffold(problem(), directory.path(), "py", None).unwrap();

        assert_eq!(fs::read_to_string(&existing).unwrap(), "print(42)\n");
    }

    #[tokio::test]
    async fn missing_editor_is_not_fatal() {
        assert!(!launch_editor("definitely-not-an-editor-cfmt", Path::new("a.cpp")));
    }
}
