//! Preflight checks for host tools.
//!
//! Validates that the host has the tools a lifecycle step will shell out to,
//! before any bundle is touched.
//!
//! # Example
//!
//! ```rust
//! use bundle_builder::preflight::{check_required_tools, command_exists};
//!
//! if !command_exists("dpkg") {
//!     println!("not a Debian-family host");
//! }
//!
//! let tools = [("sh", "dash"), ("dpkg", "dpkg")];
//! if let Err(e) = check_required_tools(&tools) {
//!     eprintln!("{}", e);
//! }
//! ```

use anyhow::{bail, Result};

use crate::distro::Distribution;

/// Check if a command exists on `PATH`.
pub fn command_exists(cmd: &str) -> bool {
    which::which(cmd).is_ok()
}

/// Tools every lifecycle run needs. Each tuple is (command_name, package_name).
pub const REQUIRED_TOOLS: &[(&str, &str)] = &[("sh", "dash")];

/// Tools needed to query and install system packages on `distro`.
///
/// Unknown distributions contribute nothing.
pub fn distribution_tools(distro: &Distribution) -> Vec<(String, String)> {
    let profile = distro.profile();
    let mut tools: Vec<(String, String)> = Vec::new();
    for cmdline in [profile.verify_cmdline, profile.install_cmdline] {
        let Some(tool) = cmdline.first() else {
            continue;
        };
        if tools.iter().any(|(t, _)| t == tool) {
            continue;
        }
        tools.push((tool.to_string(), tool.to_string()));
    }
    tools
}

/// Check that specific tools are available.
///
/// Returns an error listing every missing tool with the package providing it.
pub fn check_required_tools<S: AsRef<str>>(tools: &[(S, S)]) -> Result<()> {
    let missing: Vec<(&str, &str)> = tools
        .iter()
        .map(|(tool, package)| (tool.as_ref(), package.as_ref()))
        .filter(|(tool, _)| !command_exists(tool))
        .collect();

    if !missing.is_empty() {
        let msg = missing
            .iter()
            .map(|(t, p)| format!("  {} (install: {})", t, p))
            .collect::<Vec<_>>()
            .join("\n");
        bail!("Missing required host tools:\n{}", msg);
    }

    Ok(())
}

/// Check [`REQUIRED_TOOLS`] plus the packaging tools of `distro`.
pub fn check_host_tools(distro: &Distribution) -> Result<()> {
    check_required_tools(REQUIRED_TOOLS)?;
    check_required_tools(&distribution_tools(distro))
}
