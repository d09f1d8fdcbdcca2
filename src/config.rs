//! Project configuration (`bundle.toml`).
//!
//! ```toml
//! [project]
//! name = "demo"
//! output_dir = "build"
//!
//! [[app]]
//! name = "first-app"
//! version = "0.1.0"
//! revision = 2
//! system_requires = ["libgtk-3-dev"]
//!
//! [app.hooks]
//! build = "scripts/build.sh"
//! ```

use std::collections::BTreeSet;
use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::lifecycle::Action;

/// Default configuration filename, looked up in the working directory.
pub const DEFAULT_CONFIG_FILENAME: &str = "bundle.toml";

/// Environment variable overriding the configuration path.
pub const CONFIG_ENV: &str = "BUNDLE_BUILDER_CONFIG";

const DEFAULT_OUTPUT_DIR: &str = "build";

/// Per-action hook scripts, relative to the project root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppHooks {
    pub create: Option<PathBuf>,
    pub update: Option<PathBuf>,
    pub build: Option<PathBuf>,
}

impl AppHooks {
    pub fn for_action(&self, action: Action) -> Option<&Path> {
        match action {
            Action::Create => self.create.as_deref(),
            Action::Update => self.update.as_deref(),
            Action::Build => self.build.as_deref(),
        }
    }
}

/// One declared application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub name: String,
    pub version: String,
    pub revision: u32,
    pub description: Option<String>,
    pub system_requires: Vec<String>,
    pub hooks: AppHooks,
}

impl AppConfig {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            revision: 1,
            description: None,
            system_requires: Vec::new(),
            hooks: AppHooks::default(),
        }
    }
}

/// A loaded and validated project.
#[derive(Debug, Clone)]
pub struct ProjectConfig {
    pub name: String,
    /// Directory containing the configuration file.
    pub root: PathBuf,
    /// Absolute bundle output directory.
    pub output_dir: PathBuf,
    /// Apps in declaration order.
    pub apps: Vec<AppConfig>,
}

impl ProjectConfig {
    /// Select apps by name, keeping declaration order. No names selects all.
    pub fn select_apps(&self, names: &[String]) -> Result<Vec<AppConfig>> {
        if names.is_empty() {
            return Ok(self.apps.clone());
        }
        for name in names {
            if !self.apps.iter().any(|app| &app.name == name) {
                let known: Vec<&str> = self.apps.iter().map(|a| a.name.as_str()).collect();
                bail!(
                    "unknown app '{}'; expected one of: {}",
                    name,
                    known.join(", ")
                );
            }
        }
        Ok(self
            .apps
            .iter()
            .filter(|app| names.contains(&app.name))
            .cloned()
            .collect())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BundleToml {
    project: ProjectToml,
    #[serde(default, rename = "app")]
    apps: Vec<AppToml>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProjectToml {
    name: String,
    output_dir: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AppToml {
    name: String,
    version: String,
    revision: Option<u32>,
    description: Option<String>,
    system_requires: Option<Vec<String>>,
    hooks: Option<HooksToml>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct HooksToml {
    create: Option<String>,
    update: Option<String>,
    build: Option<String>,
}

/// Configuration path from `--config`, then `BUNDLE_BUILDER_CONFIG`, then
/// `bundle.toml` in `cwd`.
pub fn config_path(explicit: Option<&Path>, cwd: &Path) -> PathBuf {
    if let Some(path) = explicit {
        return cwd.join(path);
    }
    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        return cwd.join(path);
    }
    cwd.join(DEFAULT_CONFIG_FILENAME)
}

pub fn load_project(config_path: &Path) -> Result<ProjectConfig> {
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("reading project config '{}'", config_path.display()))?;
    let root = config_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    parse_project(&content, &root)
        .with_context(|| format!("parsing project config '{}'", config_path.display()))
}

/// Parse configuration text whose relative paths resolve against `root`.
pub fn parse_project(content: &str, root: &Path) -> Result<ProjectConfig> {
    let parsed: BundleToml = toml::from_str(content)?;

    let project_name = parsed.project.name.trim().to_string();
    if project_name.is_empty() {
        bail!("project.name must not be empty");
    }

    let output_dir = parsed
        .project
        .output_dir
        .as_deref()
        .unwrap_or(DEFAULT_OUTPUT_DIR);
    let output_dir = root.join(parse_relative_path(output_dir, "project.output_dir")?);

    if parsed.apps.is_empty() {
        bail!("no [[app]] tables declared");
    }

    let mut seen = BTreeSet::new();
    let mut apps = Vec::with_capacity(parsed.apps.len());
    for app in parsed.apps {
        validate_app_name(&app.name)?;
        if !seen.insert(app.name.clone()) {
            bail!("app '{}' is declared more than once", app.name);
        }
        if app.version.trim().is_empty() {
            bail!("app '{}': version must not be empty", app.name);
        }
        let revision = app.revision.unwrap_or(1);
        if revision == 0 {
            bail!("app '{}': revision must be at least 1", app.name);
        }

        let hooks = app.hooks.unwrap_or_default();
        let hook = |raw: Option<String>, field: &str| -> Result<Option<PathBuf>> {
            raw.map(|raw| {
                parse_relative_path(&raw, &format!("app '{}' hooks.{field}", app.name))
                    .map(|path| root.join(path))
            })
            .transpose()
        };
        let hooks = AppHooks {
            create: hook(hooks.create, "create")?,
            update: hook(hooks.update, "update")?,
            build: hook(hooks.build, "build")?,
        };

        apps.push(AppConfig {
            name: app.name,
            version: app.version.trim().to_string(),
            revision,
            description: app.description,
            system_requires: app.system_requires.unwrap_or_default(),
            hooks,
        });
    }

    Ok(ProjectConfig {
        name: project_name,
        root: root.to_path_buf(),
        output_dir,
        apps,
    })
}

fn validate_app_name(name: &str) -> Result<()> {
    if name.is_empty() {
        bail!("app name must not be empty");
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
    {
        bail!(
            "invalid app name '{}': use lowercase letters, digits, '-' and '_'",
            name
        );
    }
    Ok(())
}

fn parse_relative_path(raw: &str, field: &str) -> Result<PathBuf> {
    let candidate = Path::new(raw);
    if candidate.is_absolute() {
        bail!("{field} must be relative, got absolute path '{}'", raw);
    }
    for component in candidate.components() {
        if matches!(
            component,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        ) {
            bail!(
                "{field} contains invalid traversal/root component in '{}'",
                raw
            );
        }
    }
    Ok(candidate.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
[project]
name = "demo"

[[app]]
name = "first"
version = "0.0.1"

[[app]]
name = "second"
version = "1.2.0"
revision = 3
description = "The second app"
system_requires = ["libgtk-3-dev"]

[app.hooks]
build = "scripts/build-second.sh"
"#;

    #[test]
    fn parses_apps_in_declared_order() {
        let project = parse_project(SAMPLE, Path::new("/work")).unwrap();
        assert_eq!(project.name, "demo");
        assert_eq!(project.output_dir, PathBuf::from("/work/build"));
        let names: Vec<_> = project.apps.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, ["first", "second"]);

        let first = &project.apps[0];
        assert_eq!(first.revision, 1);
        assert!(first.system_requires.is_empty());
        assert_eq!(first.hooks, AppHooks::default());

        let second = &project.apps[1];
        assert_eq!(second.revision, 3);
        assert_eq!(second.description.as_deref(), Some("The second app"));
        assert_eq!(second.system_requires, ["libgtk-3-dev"]);
        assert_eq!(
            second.hooks.for_action(Action::Build),
            Some(Path::new("/work/scripts/build-second.sh"))
        );
        assert_eq!(second.hooks.for_action(Action::Create), None);
    }

    #[test]
    fn rejects_unknown_fields() {
        let err = parse_project(
            "[project]\nname = \"x\"\n[[app]]\nname = \"a\"\nversion = \"1\"\nflavour = \"y\"\n",
            Path::new("/work"),
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("flavour"));
    }

    #[test]
    fn rejects_duplicate_and_invalid_names() {
        let dup = "[project]\nname = \"x\"\n[[app]]\nname = \"a\"\nversion = \"1\"\n[[app]]\nname = \"a\"\nversion = \"2\"\n";
        assert!(parse_project(dup, Path::new("/w")).is_err());

        let upper = "[project]\nname = \"x\"\n[[app]]\nname = \"App\"\nversion = \"1\"\n";
        assert!(parse_project(upper, Path::new("/w")).is_err());
    }

    #[test]
    fn rejects_zero_revision_and_escaping_paths() {
        let zero = "[project]\nname = \"x\"\n[[app]]\nname = \"a\"\nversion = \"1\"\nrevision = 0\n";
        assert!(parse_project(zero, Path::new("/w")).is_err());

        let escape = "[project]\nname = \"x\"\noutput_dir = \"../out\"\n[[app]]\nname = \"a\"\nversion = \"1\"\n";
        assert!(parse_project(escape, Path::new("/w")).is_err());

        let hook = "[project]\nname = \"x\"\n[[app]]\nname = \"a\"\nversion = \"1\"\n[app.hooks]\nbuild = \"/bin/sh\"\n";
        assert!(parse_project(hook, Path::new("/w")).is_err());
    }

    #[test]
    fn requires_at_least_one_app() {
        assert!(parse_project("[project]\nname = \"x\"\n", Path::new("/w")).is_err());
    }

    #[test]
    fn select_apps_keeps_declared_order() {
        let project = parse_project(SAMPLE, Path::new("/work")).unwrap();
        let picked = project
            .select_apps(&["second".to_string(), "first".to_string()])
            .unwrap();
        assert_eq!(picked[0].name, "first");
        assert_eq!(picked.len(), 2);
        assert_eq!(project.select_apps(&[]).unwrap().len(), 2);
        assert!(project.select_apps(&["third".to_string()]).is_err());
    }

    #[test]
    fn load_project_resolves_against_config_dir() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bundle.toml");
        fs::write(&path, SAMPLE).unwrap();
        let project = load_project(&path).unwrap();
        assert_eq!(project.root, temp.path());
        assert_eq!(project.output_dir, temp.path().join("build"));
    }

    #[test]
    fn explicit_config_path_wins() {
        assert_eq!(
            config_path(Some(Path::new("other.toml")), Path::new("/work")),
            PathBuf::from("/work/other.toml")
        );
    }
}
