use std::fmt;
use std::fs;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("settings could not be read from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("settings could not be written to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One skipped settings line and the reason it was skipped. Issues never
/// abort parsing; later lines are still applied.
#[derive(Debug, PartialEq, Eq)]
pub enum ParseIssue {
    NotRecognized(String),
    BadValue(String),
    NoAssign(String),
}

impl fmt::Display for ParseIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotRecognized(line) => write!(f, "not recognized: {line}"),
            Self::BadValue(line) => write!(f, "bad value: {line}"),
            Self::NoAssign(line) => write!(f, "no assign: {line}"),
        }
    }
}

/// The recognized configuration surface, persisted as `name = value` lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub log_output_path: PathBuf,
    pub clog_is_enabled: bool,
    pub shaders_path: PathBuf,
    pub window_width: u32,
    pub window_height: u32,
    pub window_is_fullscreen: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_output_path: PathBuf::from("logs"),
            clog_is_enabled: true,
            shaders_path: PathBuf::from("res/shaders/spv"),
            window_width: 800,
            window_height: 600,
            window_is_fullscreen: false,
        }
    }
}

impl Settings {
    pub fn load(path: impl AsRef<Path>) -> Result<(Self, Vec<ParseIssue>), SettingsError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_owned(),
            source,
        })?;
        Ok(Self::parse(&text))
    }

    /// Applies every well-formed line over the defaults; everything else is
    /// reported individually without stopping the parse.
    pub fn parse(text: &str) -> (Self, Vec<ParseIssue>) {
        let mut settings = Self::default();
        let mut issues = Vec::new();

        for line in text.lines() {
            if let Err(issue) = settings.apply_line(line) {
                issues.push(issue);
            }
        }

        (settings, issues)
    }

    fn apply_line(&mut self, line: &str) -> Result<(), ParseIssue> {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return Ok(());
        }

        let Some((name, value)) = trimmed.split_once('=') else {
            return Err(ParseIssue::NoAssign(line.to_owned()));
        };
        let name = name.trim();
        let value = value.trim();
        if value.is_empty() {
            return Err(ParseIssue::BadValue(line.to_owned()));
        }

        let bad_value = || ParseIssue::BadValue(line.to_owned());
        match name {
            "log_output_path" => self.log_output_path = PathBuf::from(value),
            "clog_is_enabled" => self.clog_is_enabled = parse_bool(value).ok_or_else(bad_value)?,
            "shaders_path" => self.shaders_path = PathBuf::from(value),
            "window_width" => self.window_width = value.parse().map_err(|_| bad_value())?,
            "window_height" => self.window_height = value.parse().map_err(|_| bad_value())?,
            "window_is_fullscreen" => {
                self.window_is_fullscreen = parse_bool(value).ok_or_else(bad_value)?;
            }
            _ => return Err(ParseIssue::NotRecognized(line.to_owned())),
        }

        Ok(())
    }

    pub fn serialize(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "log_output_path = {}", self.log_output_path.display());
        let _ = writeln!(out, "clog_is_enabled = {}", self.clog_is_enabled);
        let _ = writeln!(out, "shaders_path = {}", self.shaders_path.display());
        let _ = writeln!(out, "window_width = {}", self.window_width);
        let _ = writeln!(out, "window_height = {}", self.window_height);
        let _ = writeln!(out, "window_is_fullscreen = {}", self.window_is_fullscreen);
        out
    }

    pub fn store(&self, path: impl AsRef<Path>) -> Result<(), SettingsError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| SettingsError::Write {
                    path: path.to_owned(),
                    source,
                })?;
            }
        }

        fs::write(path, self.serialize()).map_err(|source| SettingsError::Write {
            path: path.to_owned(),
            source,
        })
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "true" => Some(true),
        "false" => Some(false),
        _ => value.parse::<i64>().ok().map(|number| number != 0),
    }
}
