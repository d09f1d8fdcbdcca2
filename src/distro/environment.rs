//! Reading `os-release` from the host or from inside a container image.

use std::path::PathBuf;
use std::process::Command;

use anyhow::{bail, Context, Result};
use tracing::{debug, info};

use super::{parse_os_release, resolve, Distribution, OsIdentity, Registry};
use crate::error::ClassificationError;

/// Standard location of the Freedesktop identity file.
pub const ETC_OS_RELEASE: &str = "/etc/os-release";

/// Runs a command inside a container image and captures its stdout.
pub trait CommandRunner {
    fn check_output(&self, image_tag: &str, argv: &[&str]) -> Result<String>;
}

/// [`CommandRunner`] backed by `docker run --rm`.
#[derive(Debug, Clone)]
pub struct DockerRunner {
    docker: PathBuf,
}

impl DockerRunner {
    pub fn new() -> Self {
        Self {
            docker: PathBuf::from("docker"),
        }
    }
}

impl Default for DockerRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRunner for DockerRunner {
    fn check_output(&self, image_tag: &str, argv: &[&str]) -> Result<String> {
        let output = Command::new(&self.docker)
            .args(["run", "--rm", image_tag])
            .args(argv)
            .output()
            .with_context(|| {
                format!(
                    "running '{}' in image '{}' via {}",
                    argv.join(" "),
                    image_tag,
                    self.docker.display()
                )
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "command '{}' in image '{}' failed (status {}): {}",
                argv.join(" "),
                image_tag,
                output.status,
                stderr.trim()
            );
        }

        String::from_utf8(output.stdout)
            .with_context(|| {
                format!("decoding output of '{}' in '{}'", argv.join(" "), image_tag)
            })
    }
}

/// Classifies the Linux environment a build runs in.
#[derive(Debug, Clone)]
pub struct LinuxEnvironment {
    registry: Registry,
    os_release_path: PathBuf,
}

impl LinuxEnvironment {
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            os_release_path: PathBuf::from(ETC_OS_RELEASE),
        }
    }

    /// Read the host identity from `path` instead of `/etc/os-release`.
    pub fn with_os_release_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.os_release_path = path.into();
        self
    }

    /// Distribution of the local host.
    pub fn from_host(&self) -> Result<Distribution, ClassificationError> {
        let identity = self.host_identity()?;
        Ok(resolve(&self.registry, &identity))
    }

    /// Distribution of the container image `image_tag`.
    pub fn from_image_tag(
        &self,
        runner: &dyn CommandRunner,
        image_tag: &str,
    ) -> Result<Distribution, ClassificationError> {
        let identity = self.image_identity(runner, image_tag)?;
        Ok(resolve(&self.registry, &identity))
    }

    pub fn host_identity(&self) -> Result<OsIdentity, ClassificationError> {
        debug!(path = %self.os_release_path.display(), "reading host os-release");
        let content = std::fs::read_to_string(&self.os_release_path).map_err(|source| {
            ClassificationError::Host {
                path: self.os_release_path.display().to_string(),
                source,
            }
        })?;
        Ok(parse_os_release(&content)?)
    }

    pub fn image_identity(
        &self,
        runner: &dyn CommandRunner,
        image_tag: &str,
    ) -> Result<OsIdentity, ClassificationError> {
        info!(image = image_tag, "checking image os-release");
        let content = runner
            .check_output(image_tag, &["cat", ETC_OS_RELEASE])
            .map_err(|err| ClassificationError::Image {
                image: image_tag.to_string(),
                reason: format!("{err:#}"),
            })?;
        Ok(parse_os_release(&content)?)
    }
}

impl Default for LinuxEnvironment {
    fn default() -> Self {
        Self::new(Registry::builtin())
    }
}
