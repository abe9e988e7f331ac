//! TypeScript declaration stub describing a resolved environment.
//!
//! The stub declares `process.env` with every key typed as its exact literal
//! value. Regeneration is skipped while the env file's modification time
//! matches the one recorded in the project metadata file.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::SystemTime;

use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use serde_json::{Map, Value};

use crate::error::Error;
use crate::model::{EnvMap, EnvValue};

pub const DEFAULT_OUTPUT_NAME: &str = "strict-env.d.ts";
pub const DEFAULT_METADATA_FILE: &str = "package.json";
const METADATA_SECTION: &str = "strict-env";
const METADATA_MTIME: &str = "mod";
const TSCONFIG_FILE: &str = "tsconfig.json";

/// Render the declaration stub for `env`.
pub fn render(env: &EnvMap) -> String {
    let mut out = String::from("interface ProcessEnv {\n");
    for entry in env {
        out.push('\t');
        if is_identifier(&entry.key) {
            out.push_str(&entry.key);
        } else {
            out.push('\'');
            out.push_str(&escape_literal(&entry.key));
            out.push('\'');
        }
        out.push_str(": ");
        match &entry.value {
            EnvValue::Present(value) => {
                out.push('\'');
                out.push_str(&escape_literal(value));
                out.push('\'');
            }
            EnvValue::Absent => out.push_str("undefined"),
        }
        out.push_str(",\n");
    }
    out.push_str("}\n\ndeclare var process: {\n    env: ProcessEnv;\n};\n");
    out
}

/// ASCII subset of TypeScript identifiers; anything else is written as a
/// quoted property name.
fn is_identifier(key: &str) -> bool {
    let mut chars = key.chars();
    chars
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_' || first == '$')
        && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '$')
}

fn escape_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Whether [`DeclarationGenerator::generate`] rewrote the stub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclarationOutcome {
    Written(PathBuf),
    UpToDate(PathBuf),
}

impl DeclarationOutcome {
    pub fn path(&self) -> &Path {
        match self {
            Self::Written(path) | Self::UpToDate(path) => path,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeclarationGenerator {
    project_dir: PathBuf,
    output_name: String,
    metadata_file: String,
}

impl DeclarationGenerator {
    pub fn new(project_dir: impl AsRef<Path>) -> Self {
        Self {
            project_dir: project_dir.as_ref().to_path_buf(),
            output_name: DEFAULT_OUTPUT_NAME.to_owned(),
            metadata_file: DEFAULT_METADATA_FILE.to_owned(),
        }
    }

    pub fn output_name(mut self, name: impl Into<String>) -> Self {
        self.output_name = name.into();
        self
    }

    /// JSON file (relative to the project directory) that records the env
    /// file's modification time.
    pub fn metadata_file(mut self, name: impl Into<String>) -> Self {
        self.metadata_file = name.into();
        self
    }

    /// Where the stub is written: `rootDir` from `tsconfig.json` when set,
    /// otherwise the project directory.
    pub fn output_path(&self) -> Result<PathBuf, Error> {
        let root = self.root_dir()?;
        Ok(root.join(&self.output_name))
    }

    /// True when the stub exists and was generated from `source` as it is now.
    pub fn is_up_to_date(&self, source: &Path) -> Result<bool, Error> {
        if !self.output_path()?.is_file() {
            return Ok(false);
        }

        let current = mtime_stamp(source)?;
        let metadata = self.read_metadata()?;
        let recorded = metadata
            .get(METADATA_SECTION)
            .and_then(|section| section.get(METADATA_MTIME))
            .and_then(Value::as_str)
            .and_then(|stamp| DateTime::parse_from_rfc3339(stamp).ok());

        Ok(recorded
            .is_some_and(|stamp| stamp.timestamp_millis() == current.timestamp_millis()))
    }

    /// Write the stub for `env` unless it is already current for `source`.
    pub fn generate(&self, env: &EnvMap, source: &Path) -> Result<DeclarationOutcome, Error> {
        let output = self.output_path()?;
        if self.is_up_to_date(source)? {
            tracing::debug!(path = %output.display(), "declaration stub is up to date");
            return Ok(DeclarationOutcome::UpToDate(output));
        }

        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&output, render(env))?;
        self.record_mtime(source)?;
        tracing::info!(path = %output.display(), keys = env.len(), "wrote declaration stub");

        Ok(DeclarationOutcome::Written(output))
    }

    fn root_dir(&self) -> Result<PathBuf, Error> {
        let path = self.project_dir.join(TSCONFIG_FILE);
        if !path.is_file() {
            return Ok(self.project_dir.clone());
        }

        let raw = fs::read_to_string(&path)?;
        let stripped = line_comment_pattern().replace_all(&raw, "");
        let tsconfig: Value = serde_json::from_str(&stripped)
            .map_err(|source| Error::Metadata { path, source })?;

        let root_dir = tsconfig
            .get("compilerOptions")
            .and_then(|options| options.get("rootDir"))
            .or_else(|| tsconfig.get("rootDir"))
            .and_then(Value::as_str);

        Ok(match root_dir {
            Some(dir) => self.project_dir.join(dir),
            None => self.project_dir.clone(),
        })
    }

    fn metadata_path(&self) -> PathBuf {
        self.project_dir.join(&self.metadata_file)
    }

    fn read_metadata(&self) -> Result<Value, Error> {
        let path = self.metadata_path();
        if !path.is_file() {
            return Ok(Value::Object(Map::new()));
        }
        let raw = fs::read_to_string(&path)?;
        serde_json::from_str(&raw).map_err(|source| Error::Metadata { path, source })
    }

    fn record_mtime(&self, source: &Path) -> Result<(), Error> {
        let stamp = mtime_stamp(source)?.to_rfc3339_opts(SecondsFormat::Millis, true);
        let mut metadata = self.read_metadata()?;

        let Value::Object(root) = &mut metadata else {
            return Err(Error::MetadataNotObject {
                path: self.metadata_path(),
            });
        };
        let section = root
            .entry(METADATA_SECTION)
            .or_insert_with(|| Value::Object(Map::new()));
        if !section.is_object() {
            *section = Value::Object(Map::new());
        }
        if let Value::Object(section) = section {
            section.insert(METADATA_MTIME.to_owned(), Value::String(stamp));
        }

        let path = self.metadata_path();
        let mut text = serde_json::to_string_pretty(&metadata)
            .map_err(|source| Error::Metadata {
                path: path.clone(),
                source,
            })?;
        text.push('\n');
        fs::write(&path, text)?;
        Ok(())
    }
}

fn mtime_stamp(source: &Path) -> Result<DateTime<Utc>, Error> {
    let modified: SystemTime = fs::metadata(source)?.modified()?;
    Ok(DateTime::<Utc>::from(modified))
}

fn line_comment_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?m)^\s*//.*$").expect("comment pattern is valid"))
}
