//! Distribution profiles and the ordered registry they are matched from.
//!
//! A profile is plain data: identity tokens, packaging commands, base package
//! lists and a [`FilenameGrammar`]. The registry is an explicit, ordered list;
//! its declared order is the match order for family fallback.

use std::fmt;

use tracing::debug;

/// Native package format produced for a distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackageFormat {
    Deb,
    Rpm,
    Pkg,
}

impl PackageFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            PackageFormat::Deb => "deb",
            PackageFormat::Rpm => "rpm",
            PackageFormat::Pkg => "pkg",
        }
    }

    /// Command line that prints the package ABI (architecture) on the host.
    pub fn abi_cmdline(&self) -> &'static [&'static str] {
        match self {
            PackageFormat::Deb => &["dpkg", "--print-architecture"],
            PackageFormat::Rpm => &["rpm", "--eval", "%_target_cpu"],
            PackageFormat::Pkg => &["pacman-conf", "Architecture"],
        }
    }
}

impl fmt::Display for PackageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields substituted into a package filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageInfo {
    pub name: String,
    pub version: String,
    pub revision: u32,
    pub abi: String,
}

/// Per-family package filename layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilenameGrammar {
    /// No package filename (Arch, Unknown).
    None,
    /// `{name}_{version}-{revision}~{vendor}-{codename}_{abi}.deb`
    Debian,
    /// `{name}-{version}-{revision}.{fc|el}{codename}.{abi}.rpm`
    RedHat,
    /// `{name}-{version}-{revision}.{abi}.rpm`
    Suse,
}

impl FilenameGrammar {
    /// Render a filename. `vendor`/`codename` are empty strings when unknown.
    pub fn render(&self, package: &PackageInfo, vendor: &str, codename: &str) -> String {
        let PackageInfo {
            name,
            version,
            revision,
            abi,
        } = package;
        match self {
            FilenameGrammar::None => String::new(),
            FilenameGrammar::Debian => {
                format!("{name}_{version}-{revision}~{vendor}-{codename}_{abi}.deb")
            }
            FilenameGrammar::RedHat => {
                let dist = if vendor == "fedora" { "fc" } else { "el" };
                format!("{name}-{version}-{revision}.{dist}{codename}.{abi}.rpm")
            }
            FilenameGrammar::Suse => format!("{name}-{version}-{revision}.{abi}.rpm"),
        }
    }
}

/// Static description of a distribution family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionProfile {
    pub name: &'static str,
    /// Exact `ID` token; `None` only for the Unknown sentinel.
    pub id: Option<&'static str>,
    /// `ID_LIKE` tokens this profile answers to, itself included.
    pub id_like: &'static [&'static str],
    pub format: Option<PackageFormat>,
    pub install_cmdline: &'static [&'static str],
    pub verify_cmdline: &'static [&'static str],
    pub python_packages: &'static [&'static str],
    pub build_packages: &'static [&'static str],
    /// Canonical name of the profile this one derives from.
    pub base: Option<&'static str>,
    pub filename_grammar: FilenameGrammar,
}

pub const ARCH: DistributionProfile = DistributionProfile {
    name: "Arch",
    id: Some("arch"),
    id_like: &["arch"],
    format: Some(PackageFormat::Pkg),
    install_cmdline: &["pacman", "-Syu"],
    verify_cmdline: &["pacman", "-Q"],
    python_packages: &["python3"],
    build_packages: &["base-devel"],
    base: None,
    filename_grammar: FilenameGrammar::None,
};

pub const DEBIAN: DistributionProfile = DistributionProfile {
    name: "Debian",
    id: Some("debian"),
    id_like: &["ubuntu", "debian"],
    format: Some(PackageFormat::Deb),
    install_cmdline: &["apt", "install"],
    verify_cmdline: &["dpkg", "-s"],
    python_packages: &["python3-dev"],
    build_packages: &["build-essential"],
    base: None,
    filename_grammar: FilenameGrammar::Debian,
};

pub const RHEL: DistributionProfile = DistributionProfile {
    name: "RHEL",
    id: Some("rhel"),
    id_like: &["fedora", "rhel"],
    format: Some(PackageFormat::Rpm),
    install_cmdline: &["dnf", "install"],
    verify_cmdline: &["rpm", "-q"],
    python_packages: &["python3-devel"],
    build_packages: &["gcc", "make", "pkgconf-pkg-config"],
    base: None,
    filename_grammar: FilenameGrammar::RedHat,
};

pub const SUSE: DistributionProfile = DistributionProfile {
    name: "SUSE",
    id: Some("suse"),
    id_like: &["suse"],
    format: Some(PackageFormat::Rpm),
    install_cmdline: &["zypper", "install"],
    verify_cmdline: &["rpm", "-q", "--whatprovides"],
    python_packages: &["python3-devel"],
    build_packages: &["patterns-devel-base-devel_basis"],
    base: None,
    filename_grammar: FilenameGrammar::Suse,
};

/// Sentinel for identities no registered profile matches.
pub const UNKNOWN: DistributionProfile = DistributionProfile {
    name: "Unknown",
    id: None,
    id_like: &[],
    format: None,
    install_cmdline: &[],
    verify_cmdline: &[],
    python_packages: &[],
    build_packages: &[],
    base: None,
    filename_grammar: FilenameGrammar::None,
};

impl DistributionProfile {
    pub fn is_unknown(&self) -> bool {
        self.id.is_none()
    }
}

/// Ordered set of known distribution profiles.
#[derive(Debug, Clone)]
pub struct Registry {
    profiles: Vec<DistributionProfile>,
}

impl Registry {
    /// Registry with an explicit profile order.
    pub fn new(profiles: Vec<DistributionProfile>) -> Self {
        Self { profiles }
    }

    /// The built-in profiles, in match order.
    pub fn builtin() -> Self {
        Self::new(vec![ARCH, DEBIAN, RHEL, SUSE])
    }

    pub fn profiles(&self) -> &[DistributionProfile] {
        &self.profiles
    }

    /// Look a profile up by canonical name.
    pub fn by_name(&self, name: &str) -> Option<&DistributionProfile> {
        self.profiles.iter().find(|p| p.name == name)
    }

    /// First profile whose exact identity equals `id`, or [`UNKNOWN`].
    pub fn by_id(&self, id: &str) -> &DistributionProfile {
        self.profiles
            .iter()
            .find(|p| p.id == Some(id))
            .unwrap_or(&UNKNOWN)
    }

    /// First profile (in registry order) whose fallback tokens intersect
    /// `id_like`, or [`UNKNOWN`].
    pub fn by_id_like(&self, id_like: &[&str]) -> &DistributionProfile {
        let found = self
            .profiles
            .iter()
            .find(|p| p.id_like.iter().any(|token| id_like.contains(token)));
        if let Some(profile) = found {
            debug!(profile = profile.name, ?id_like, "matched distribution family");
        }
        found.unwrap_or(&UNKNOWN)
    }

    /// The profile `profile` derives from; itself when no base is declared
    /// or the declared base is not registered.
    pub fn base_distribution<'a>(
        &'a self,
        profile: &'a DistributionProfile,
    ) -> &'a DistributionProfile {
        profile
            .base
            .and_then(|base| self.by_name(base))
            .unwrap_or(profile)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::builtin()
    }
}
