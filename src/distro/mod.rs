//! Linux distribution identification.
//!
//! - [`os_release`] - strict `os-release` parsing into [`OsIdentity`]
//! - [`profile`] - packaging profiles and the ordered [`Registry`]
//! - [`environment`] - reading `os-release` from the host or a container image
//!
//! Resolution is a two-phase match: the exact `ID` first, then the `ID_LIKE`
//! family list. An identity that matches neither resolves to the Unknown
//! sentinel; [`resolve`] never fails.

pub mod environment;
pub mod os_release;
pub mod profile;

pub use environment::{CommandRunner, DockerRunner, LinuxEnvironment};
pub use os_release::{parse_os_release, OsIdentity};
pub use profile::{DistributionProfile, FilenameGrammar, PackageFormat, PackageInfo, Registry};

use tracing::debug;

/// `VERSION_ID` published by Arch images built from an unrendered template.
pub const TEMPLATE_VERSION_ID: &str = "TEMPLATE_VERSION_ID";

/// Codename used when a distribution publishes no release version.
pub const ROLLING: &str = "rolling";

/// A profile bound to the identity it was resolved from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Distribution {
    profile: DistributionProfile,
    vendor: Option<String>,
    codename: Option<String>,
}

impl Distribution {
    pub fn new(
        profile: DistributionProfile,
        vendor: Option<String>,
        codename: Option<String>,
    ) -> Self {
        Self {
            profile,
            vendor,
            codename,
        }
    }

    /// An unresolved distribution.
    pub fn unknown() -> Self {
        Self::new(profile::UNKNOWN, None, None)
    }

    pub fn profile(&self) -> &DistributionProfile {
        &self.profile
    }

    pub fn name(&self) -> &'static str {
        self.profile.name
    }

    pub fn is_unknown(&self) -> bool {
        self.profile.is_unknown()
    }

    /// Raw `ID` the distribution was resolved from.
    pub fn vendor(&self) -> Option<&str> {
        self.vendor.as_deref()
    }

    pub fn codename(&self) -> Option<&str> {
        self.codename.as_deref()
    }

    pub fn format(&self) -> Option<PackageFormat> {
        self.profile.format
    }

    /// Packaged filename for `package`; empty when the family has no grammar.
    pub fn package_file_name(&self, package: &PackageInfo) -> String {
        self.profile.filename_grammar.render(
            package,
            self.vendor().unwrap_or_default(),
            self.codename().unwrap_or_default(),
        )
    }

    /// Command line printing the host package ABI, if the format is known.
    pub fn package_abi_cmdline(&self) -> Option<Vec<String>> {
        self.profile.format.map(|f| to_owned_argv(f.abi_cmdline()))
    }

    /// Command line checking that `package` is installed.
    pub fn verify_command(&self, package: &str) -> Option<Vec<String>> {
        if self.profile.verify_cmdline.is_empty() {
            return None;
        }
        let mut argv = to_owned_argv(self.profile.verify_cmdline);
        argv.push(package.to_string());
        Some(argv)
    }

    /// Command line installing `packages`.
    pub fn install_command<S: AsRef<str>>(&self, packages: &[S]) -> Option<Vec<String>> {
        if self.profile.install_cmdline.is_empty() {
            return None;
        }
        let mut argv = to_owned_argv(self.profile.install_cmdline);
        argv.extend(packages.iter().map(|p| p.as_ref().to_string()));
        Some(argv)
    }

    /// Python headers, base build tools, then app-specific system packages.
    pub fn build_dependencies<S: AsRef<str>>(&self, system_requires: &[S]) -> Vec<String> {
        self.profile
            .python_packages
            .iter()
            .chain(self.profile.build_packages)
            .map(|p| p.to_string())
            .chain(system_requires.iter().map(|p| p.as_ref().to_string()))
            .collect()
    }
}

fn to_owned_argv(argv: &[&str]) -> Vec<String> {
    argv.iter().map(|a| a.to_string()).collect()
}

/// Resolve `identity` against `registry`.
pub fn resolve(registry: &Registry, identity: &OsIdentity) -> Distribution {
    let id = identity.id().unwrap_or_default();
    let mut profile = registry.by_id(id);
    if profile.is_unknown() {
        profile = registry.by_id_like(&identity.id_like());
    }

    if profile.is_unknown() {
        debug!(id, "no distribution profile matched");
        return Distribution::unknown();
    }

    let codename = codename(identity);
    debug!(profile = profile.name, vendor = id, %codename, "resolved distribution");
    Distribution::new(profile.clone(), Some(id.to_string()), Some(codename))
}

/// Short release token for `identity`.
///
/// Some distributions (Fedora) publish an empty `VERSION_CODENAME`; rolling
/// releases (Manjaro) publish no `VERSION_ID` at all.
pub fn codename(identity: &OsIdentity) -> String {
    if let Some(codename) = identity.get("VERSION_CODENAME").filter(|c| !c.is_empty()) {
        return codename.to_string();
    }
    match identity.get("VERSION_ID") {
        Some(TEMPLATE_VERSION_ID) | None => ROLLING.to_string(),
        Some(version) => version.split('.').next().unwrap_or(version).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(pairs: &[(&str, &str)]) -> OsIdentity {
        OsIdentity::from_pairs(pairs.iter().copied())
    }

    #[test]
    fn exact_id_resolves_profile() {
        let distro = resolve(
            &Registry::builtin(),
            &identity(&[("ID", "debian"), ("VERSION_CODENAME", "bookworm")]),
        );
        assert_eq!(distro.name(), "Debian");
        assert_eq!(distro.vendor(), Some("debian"));
        assert_eq!(distro.codename(), Some("bookworm"));
    }

    #[test]
    fn family_fallback_keeps_observed_vendor() {
        let distro = resolve(
            &Registry::builtin(),
            &identity(&[("ID", "ubuntu"), ("ID_LIKE", "debian"), ("VERSION_ID", "22.04")]),
        );
        assert_eq!(distro.name(), "Debian");
        assert_eq!(distro.vendor(), Some("ubuntu"));
        assert_eq!(distro.codename(), Some("22"));
    }

    #[test]
    fn exact_id_beats_family_fallback() {
        // `rhel` is an exact match even though `ID_LIKE` names Debian's family.
        let distro = resolve(
            &Registry::builtin(),
            &identity(&[("ID", "rhel"), ("ID_LIKE", "debian ubuntu")]),
        );
        assert_eq!(distro.name(), "RHEL");
    }

    #[test]
    fn unmatched_identity_is_unknown() {
        let distro = resolve(&Registry::builtin(), &identity(&[("ID", "unknownos")]));
        assert!(distro.is_unknown());
        assert_eq!(distro.vendor(), None);
        assert_eq!(distro.codename(), None);
        assert_eq!(distro.format(), None);
    }

    #[test]
    fn missing_id_is_unknown() {
        let distro = resolve(&Registry::builtin(), &OsIdentity::default());
        assert!(distro.is_unknown());
    }

    #[test]
    fn codename_prefers_version_codename() {
        assert_eq!(
            codename(&identity(&[("VERSION_CODENAME", "bookworm"), ("VERSION_ID", "12")])),
            "bookworm"
        );
    }

    #[test]
    fn empty_codename_falls_back_to_major_version() {
        assert_eq!(
            codename(&identity(&[("VERSION_CODENAME", ""), ("VERSION_ID", "22.04")])),
            "22"
        );
        assert_eq!(codename(&identity(&[("VERSION_ID", "39")])), "39");
    }

    #[test]
    fn template_version_id_is_rolling() {
        assert_eq!(
            codename(&identity(&[("VERSION_ID", "TEMPLATE_VERSION_ID")])),
            "rolling"
        );
    }

    #[test]
    fn no_version_fields_is_rolling() {
        assert_eq!(codename(&identity(&[("ID", "manjaro")])), "rolling");
    }

    #[test]
    fn fedora_package_file_name() {
        let distro = resolve(
            &Registry::builtin(),
            &identity(&[
                ("ID", "fedora"),
                ("ID_LIKE", "fedora"),
                ("VERSION_ID", "39"),
                ("VERSION_CODENAME", ""),
            ]),
        );
        assert_eq!(distro.name(), "RHEL");
        let package = PackageInfo {
            name: "first-app".into(),
            version: "0.0.1".into(),
            revision: 5,
            abi: "x86_64".into(),
        };
        assert_eq!(
            distro.package_file_name(&package),
            "first-app-0.0.1-5.fc39.x86_64.rpm"
        );
    }

    #[test]
    fn fedora_without_id_like_is_unknown() {
        let distro = resolve(
            &Registry::builtin(),
            &identity(&[("ID", "fedora"), ("VERSION_ID", "39")]),
        );
        assert!(distro.is_unknown());
        assert_eq!(distro.vendor(), None);
    }

    #[test]
    fn system_commands() {
        let distro = resolve(&Registry::builtin(), &identity(&[("ID", "debian")]));
        assert_eq!(
            distro.verify_command("libgtk-3-dev"),
            Some(vec!["dpkg".to_string(), "-s".into(), "libgtk-3-dev".into()])
        );
        assert_eq!(
            distro.install_command(&["a", "b"]),
            Some(vec!["apt".to_string(), "install".into(), "a".into(), "b".into()])
        );
        assert_eq!(
            distro.build_dependencies(&["libcairo2-dev"]),
            ["python3-dev", "build-essential", "libcairo2-dev"]
        );
        assert_eq!(
            distro.package_abi_cmdline(),
            Some(vec!["dpkg".to_string(), "--print-architecture".into()])
        );

        let unknown = Distribution::unknown();
        assert_eq!(unknown.verify_command("x"), None);
        assert_eq!(unknown.install_command(&["x"]), None);
        assert_eq!(unknown.package_abi_cmdline(), None);
        assert!(unknown.build_dependencies::<&str>(&[]).is_empty());
    }
}
