//! Filesystem-backed lifecycle state.
//!
//! Layout under the project output directory:
//!
//! ```text
//! <output_dir>/
//!   .bundle-builder.lock
//!   <app>/                    bundle directory ("created")
//!     build-marker.json       written after a successful build ("built")
//! ```

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::{AppStateQuery, State};
use crate::config::AppConfig;

const BUILD_MARKER_FILENAME: &str = "build-marker.json";
const LOCK_FILENAME: &str = ".bundle-builder.lock";

/// Persisted record of the most recent build of an app.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildMarker {
    pub app: String,
    pub version: String,
    pub revision: u32,
    pub built_at_utc: String,
    #[serde(default)]
    pub state: State,
}

/// Bundle directories and build markers under one output directory.
#[derive(Debug, Clone)]
pub struct FsAppState {
    output_dir: PathBuf,
}

impl FsAppState {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn bundle_path(&self, app: &AppConfig) -> PathBuf {
        self.output_dir.join(&app.name)
    }

    pub fn marker_path(&self, app: &AppConfig) -> PathBuf {
        self.bundle_path(app).join(BUILD_MARKER_FILENAME)
    }

    /// Create the bundle directory for `app`.
    pub fn create_bundle(&self, app: &AppConfig) -> Result<PathBuf> {
        let bundle = self.bundle_path(app);
        if bundle.exists() {
            bail!("bundle for '{}' already exists: {}", app.name, bundle.display());
        }
        fs::create_dir_all(&bundle)
            .with_context(|| format!("creating bundle directory '{}'", bundle.display()))?;
        Ok(bundle)
    }

    /// Record a successful build of `app` carrying `state`.
    pub fn write_marker(&self, app: &AppConfig, state: &State) -> Result<BuildMarker> {
        let marker = BuildMarker {
            app: app.name.clone(),
            version: app.version.clone(),
            revision: app.revision,
            built_at_utc: now_utc_compact(),
            state: state.clone(),
        };
        let path = self.marker_path(app);
        write_json_atomic(&path, &marker)
            .with_context(|| format!("writing build marker '{}'", path.display()))?;
        Ok(marker)
    }

    /// The last build marker of `app`, if it has been built.
    pub fn load_marker(&self, app: &AppConfig) -> Result<Option<BuildMarker>> {
        let path = self.marker_path(app);
        if !path.is_file() {
            return Ok(None);
        }
        let bytes =
            fs::read(&path).with_context(|| format!("reading build marker '{}'", path.display()))?;
        let marker = serde_json::from_slice(&bytes)
            .with_context(|| format!("parsing build marker '{}'", path.display()))?;
        Ok(Some(marker))
    }

    /// Take the exclusive output-directory lock for the duration of a run.
    pub fn lock(&self) -> Result<OutputLock> {
        fs::create_dir_all(&self.output_dir).with_context(|| {
            format!("creating output directory '{}'", self.output_dir.display())
        })?;
        let lock_path = self.output_dir.join(LOCK_FILENAME);

        // Never unlink the lock file: a second process could then lock a fresh
        // inode at the same path while the first still holds the old one.
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .with_context(|| format!("opening lock file '{}'", lock_path.display()))?;

        if file.try_lock_exclusive().is_err() {
            return Err(anyhow!(
                "output directory is locked by another bundle-builder run: {}",
                lock_path.display()
            ));
        }

        Ok(OutputLock { file })
    }
}

impl AppStateQuery for FsAppState {
    fn bundle_exists(&self, app: &AppConfig) -> Result<bool> {
        Ok(self.bundle_path(app).is_dir())
    }

    fn build_marker_exists(&self, app: &AppConfig) -> Result<bool> {
        Ok(self.marker_path(app).is_file())
    }
}

/// Held output-directory lock; released on drop.
#[derive(Debug)]
pub struct OutputLock {
    file: File,
}

impl Drop for OutputLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

/// Current UTC time as `YYYYMMDDTHHMMSSZ`.
pub fn now_utc_compact() -> String {
    let now = OffsetDateTime::now_utc();
    format!(
        "{:04}{:02}{:02}T{:02}{:02}{:02}Z",
        now.year(),
        now.month() as u8,
        now.day(),
        now.hour(),
        now.minute(),
        now.second()
    )
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow!("path without parent '{}'", path.display()))?;
    fs::create_dir_all(parent)
        .with_context(|| format!("creating parent directory '{}'", parent.display()))?;
    let tmp = path.with_extension(format!("tmp-{}", std::process::id()));
    let payload = serde_json::to_vec_pretty(value).context("serializing build marker")?;
    fs::write(&tmp, payload).with_context(|| format!("writing temp file '{}'", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| {
        format!(
            "renaming temp file '{}' to '{}'",
            tmp.display(),
            path.display()
        )
    })?;
    Ok(())
}
