use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::env::TargetEnv;
use crate::error::Error;
use crate::model::{Encoding, EnvMap, EnvValue, LoadReport, LoadedEnv, ResolutionMode};
use crate::parser::parse_str_with_source;
use crate::validate::Validate;

/// File names probed, in order, when no explicit path is configured.
pub const ACCEPTED_ENV_FILES: [&str; 6] = [
    ".env.local",
    ".env.production",
    ".env.staging",
    ".env.test",
    ".env.development",
    ".env",
];

/// Load the first accepted env file in the current directory into the
/// process environment.
///
/// # Safety
///
/// Mutates the process environment; see [`TargetEnv::process`].
pub unsafe fn setup() -> Result<LoadedEnv, Error> {
    // SAFETY: forwarded to the caller.
    let mut loader = EnvLoader::new().target(unsafe { TargetEnv::process() });
    loader.load()
}

/// Load a `.env` file from a specific path into the process environment.
///
/// # Safety
///
/// Mutates the process environment; see [`TargetEnv::process`].
pub unsafe fn from_path(path: impl AsRef<Path>) -> Result<LoadedEnv, Error> {
    // SAFETY: forwarded to the caller.
    let mut loader = EnvLoader::new()
        .path(path)
        .target(unsafe { TargetEnv::process() });
    loader.load()
}

/// Load multiple `.env` files into the process environment, later files
/// overriding earlier ones.
///
/// # Safety
///
/// Mutates the process environment; see [`TargetEnv::process`].
pub unsafe fn from_paths<I, P>(paths: I) -> Result<LoadedEnv, Error>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    // SAFETY: forwarded to the caller.
    let mut loader = EnvLoader::new()
        .paths(paths)
        .target(unsafe { TargetEnv::process() });
    loader.load()
}

/// Builder-style dotenv loader.
///
/// The default target is an in-memory map; nothing reaches the process
/// environment unless [`TargetEnv::process`] is passed to [`EnvLoader::target`].
#[derive(Clone)]
pub struct EnvLoader {
    paths: Vec<PathBuf>,
    dir: Option<PathBuf>,
    encoding: Encoding,
    required: bool,
    override_existing: bool,
    resolution_mode: ResolutionMode,
    validator: Option<Arc<dyn Validate + Send + Sync>>,
    target: TargetEnv,
}

impl EnvLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(mut self, path: impl AsRef<Path>) -> Self {
        self.paths.push(path.as_ref().to_path_buf());
        self
    }

    pub fn paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        self.paths
            .extend(paths.into_iter().map(|path| path.as_ref().to_path_buf()));
        self
    }

    /// Directory used to discover [`ACCEPTED_ENV_FILES`] when no path is set.
    /// Defaults to the current directory.
    pub fn dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// When false, missing files are skipped instead of failing the load.
    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn override_existing(mut self, override_existing: bool) -> Self {
        self.override_existing = override_existing;
        self
    }

    pub fn resolution_mode(mut self, resolution_mode: ResolutionMode) -> Self {
        self.resolution_mode = resolution_mode;
        self
    }

    pub fn validator(mut self, validator: impl Validate + Send + Sync + 'static) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    pub fn target(mut self, target: TargetEnv) -> Self {
        self.target = target;
        self
    }

    pub fn target_env(&self) -> &TargetEnv {
        &self.target
    }

    pub fn target_env_mut(&mut self) -> &mut TargetEnv {
        &mut self.target
    }

    pub fn into_target(self) -> TargetEnv {
        self.target
    }

    /// Read, parse and merge every effective file without touching the target.
    pub fn parse_only(&self) -> Result<EnvMap, Error> {
        let (env, _) = self.collect_entries()?;
        Ok(env)
    }

    /// Parse and validate every effective file, then apply the merged result
    /// to the target in one step. Nothing is written if any entry cannot be
    /// stored by the target.
    pub fn load(&mut self) -> Result<LoadedEnv, Error> {
        let (env, files) = self.collect_entries()?;

        if let Some(validator) = &self.validator {
            validator.validate(&env)?;
        }

        for entry in &env {
            if let EnvValue::Present(value) = &entry.value {
                self.target.check_var(&entry.key, value)?;
            }
        }

        let mut report = LoadReport {
            files_read: files.len(),
            ..LoadReport::default()
        };

        for entry in &env {
            let EnvValue::Present(value) = &entry.value else {
                report.skipped_absent += 1;
                continue;
            };

            if !self.override_existing && self.target.contains_key(&entry.key) {
                report.skipped_existing += 1;
                tracing::debug!(key = %entry.key, "skipping existing key");
                continue;
            }

            self.target.set_var(&entry.key, value);
            report.loaded += 1;
        }

        tracing::debug!(
            loaded = report.loaded,
            skipped_existing = report.skipped_existing,
            skipped_absent = report.skipped_absent,
            "applied env files"
        );

        Ok(LoadedEnv { env, report, files })
    }

    fn collect_entries(&self) -> Result<(EnvMap, Vec<PathBuf>), Error> {
        let mut merged = EnvMap::new();
        let mut files = Vec::new();

        for path in self.effective_paths()? {
            let bytes = match std::fs::read(&path) {
                Ok(bytes) => bytes,
                Err(err) if !self.required && err.kind() == std::io::ErrorKind::NotFound => {
                    tracing::debug!(path = %path.display(), "skipping missing env file");
                    continue;
                }
                Err(err) => return Err(Error::Io(err)),
            };

            let content = decode(&bytes, self.encoding)?;
            let parsed = parse_str_with_source(&content, Some(&path), self.resolution_mode)
                .map_err(|source| Error::ParseFile {
                    path: path.clone(),
                    source,
                })?;
            tracing::info!(path = %path.display(), entries = parsed.len(), "read env file");

            merged.merge(parsed);
            files.push(path);
        }

        Ok((merged, files))
    }

    fn effective_paths(&self) -> Result<Vec<PathBuf>, Error> {
        if !self.paths.is_empty() {
            return Ok(self.paths.clone());
        }

        let dir = match &self.dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()?,
        };

        if let Some(found) = find_accepted_file(&dir) {
            return Ok(vec![found]);
        }
        if !self.required {
            return Ok(Vec::new());
        }

        Err(Error::NoEnvFile {
            dir,
            tried: ACCEPTED_ENV_FILES.iter().map(|name| (*name).to_owned()).collect(),
        })
    }
}

impl Default for EnvLoader {
    fn default() -> Self {
        Self {
            paths: Vec::new(),
            dir: None,
            encoding: Encoding::Utf8,
            required: true,
            override_existing: true,
            resolution_mode: ResolutionMode::default(),
            validator: None,
            target: TargetEnv::memory(),
        }
    }
}

impl std::fmt::Debug for EnvLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvLoader")
            .field("paths", &self.paths)
            .field("dir", &self.dir)
            .field("encoding", &self.encoding)
            .field("required", &self.required)
            .field("override_existing", &self.override_existing)
            .field("resolution_mode", &self.resolution_mode)
            .field("validator", &self.validator.is_some())
            .field("target", &self.target)
            .finish()
    }
}

/// First entry of [`ACCEPTED_ENV_FILES`] that exists as a file in `dir`.
pub fn find_accepted_file(dir: &Path) -> Option<PathBuf> {
    ACCEPTED_ENV_FILES
        .iter()
        .map(|name| dir.join(name))
        .find(|candidate| candidate.is_file())
}

fn decode(bytes: &[u8], encoding: Encoding) -> Result<Cow<'_, str>, Error> {
    match encoding {
        Encoding::Utf8 => {
            let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
            Ok(Cow::Borrowed(std::str::from_utf8(bytes)?))
        }
        Encoding::Latin1 => Ok(Cow::Owned(bytes.iter().map(|byte| *byte as char).collect())),
    }
}
