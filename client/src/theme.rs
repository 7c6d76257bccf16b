use std::fs;
use std::io;
use std::path::Path;
use std::str::FromStr;

use engine::progress::Progress;
use log::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Theme {
    /// Coloured step markers.
    #[default]
    Dark,
    Plain,
}

impl FromStr for Theme {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "dark" => Ok(Theme::Dark),
            "plain" => Ok(Theme::Plain),
            _ => Err(()),
        }
    }
}

impl Theme {
    fn name(self) -> &'static str {
        match self {
            Theme::Dark => "dark",
            Theme::Plain => "plain",
        }
    }

    /// A missing or unrecognised theme file means the default theme.
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => contents.parse().unwrap_or_else(|_| {
                warn!("Unknown theme {:?} in {}", contents.trim(), path.display());
                Theme::default()
            }),
            Err(error) => {
                debug!("No theme preference at {}: {}", path.display(), error);
                Theme::default()
            }
        }
    }

    pub fn save(self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.name())
    }

    pub fn toggled(self) -> Self {
        match self {
            Theme::Dark => Theme::Plain,
            Theme::Plain => Theme::Dark,
        }
    }

    pub fn render(self, progress: &Progress) -> String {
        let (marker, colour) = match progress {
            Progress::StepStarted(_) => ("..", "\x1b[36m"),
            Progress::StepSucceeded(_) => ("ok", "\x1b[32m"),
            Progress::StepFailed { .. } => ("!!", "\x1b[31m"),
            Progress::Message(_) => ("--", "\x1b[90m"),
        };
        match self {
            Theme::Dark => format!("{}{}\x1b[0m {}", colour, marker, progress),
            Theme::Plain => format!("{} {}", marker, progress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine::progress::Step;
    use test_case::test_case;

    #[test_case("dark\n", Theme::Dark; "dark")]
    #[test_case("plain", Theme::Plain; "plain")]
    #[test_case("solarized", Theme::Dark; "unknown")]
    fn loads_theme(contents: &str, expected: Theme) {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("theme");
        fs::write(&path, contents).unwrap();
        assert_eq!(Theme::load(&path), expected);
    }

    #[test]
    fn missing_theme_is_default() {
        let directory = tempfile::tempdir().unwrap();
        assert_eq!(Theme::load(&directory.path().join("theme")), Theme::Dark);
    }

    #[test]
    fn toggle_round_trips_through_file() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("theme");
        Theme::Dark.toggled().save(&path).unwrap();
        assert_eq!(Theme::load(&path), Theme::Plain);
    }

    #[test]
    fn plain_has_no_escapes() {
        let line = Theme::Plain.render(&Progress::StepSucceeded(Step::Push));
        assert_eq!(line, "ok push done");
    }
}
