use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{bail, Context, Result};
use bundle_builder::distro::{CommandRunner, Distribution, PackageInfo};
use bundle_builder::lifecycle::{Action, ActionExecutor, FsAppState, State};
use bundle_builder::preflight;
use bundle_builder::AppConfig;
use serde_json::{json, Value};
use tracing::{debug, warn};

/// Prefix of hook stdout lines that report state entries (`state:KEY=VALUE`).
const HOOK_STATE_PREFIX: &str = "state:";

/// Where the target distribution's package tools run.
pub(crate) enum BuildTarget {
    Host,
    Image {
        runner: Box<dyn CommandRunner>,
        tag: String,
    },
}

impl BuildTarget {
    /// Run `argv` in the target and capture stdout; non-zero exit is an error.
    pub(crate) fn check_output(&self, argv: &[String]) -> Result<String> {
        match self {
            BuildTarget::Host => host_output(argv),
            BuildTarget::Image { runner, tag } => {
                let argv: Vec<&str> = argv.iter().map(String::as_str).collect();
                runner.check_output(tag, &argv)
            }
        }
    }
}

/// Executes lifecycle steps by managing bundle directories and running the
/// app's hook scripts.
pub(crate) struct HookExecutor {
    fs_state: FsAppState,
    distro: Distribution,
    target: BuildTarget,
    abi: String,
    project_root: PathBuf,
}

impl HookExecutor {
    pub(crate) fn new(
        fs_state: FsAppState,
        distro: Distribution,
        target: BuildTarget,
        abi: String,
        project_root: PathBuf,
    ) -> Self {
        Self {
            fs_state,
            distro,
            target,
            abi,
            project_root,
        }
    }

    pub(crate) fn package_file_name(&self, app: &AppConfig) -> String {
        self.distro.package_file_name(&PackageInfo {
            name: app.name.clone(),
            version: app.version.clone(),
            revision: app.revision,
            abi: self.abi.clone(),
        })
    }

    fn run_hook(&self, action: Action, app: &AppConfig) -> Result<State> {
        let Some(script) = app.hooks.for_action(action) else {
            return Ok(State::new());
        };
        if !script.is_file() {
            bail!("{} hook for '{}' not found: {}", action, app.name, script.display());
        }

        println!(
            "[bundle:{}] running {} hook {}",
            app.name,
            action,
            hook_path_display(&self.project_root, script)
        );
        let bundle = self.fs_state.bundle_path(app);
        let output = Command::new("sh")
            .arg(script)
            .current_dir(&self.project_root)
            .env("APP_NAME", &app.name)
            .env("APP_VERSION", &app.version)
            .env("APP_REVISION", app.revision.to_string())
            .env("APP_DESCRIPTION", app.description.as_deref().unwrap_or_default())
            .env("BUNDLE_PATH", &bundle)
            .env("DISTRO_NAME", self.distro.name())
            .env("DISTRO_VENDOR", self.distro.vendor().unwrap_or_default())
            .env("DISTRO_CODENAME", self.distro.codename().unwrap_or_default())
            .env("PACKAGE_ABI", &self.abi)
            .env("PACKAGE_FILENAME", self.package_file_name(app))
            .output()
            .with_context(|| format!("executing {} hook '{}'", action, script.display()))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            bail!(
                "{} hook failed (status {})\nstdout: {}\nstderr: {}",
                action,
                output.status,
                stdout.trim(),
                stderr.trim()
            );
        }

        Ok(parse_hook_state(&stdout))
    }

    fn verify_system_requirements(&self, app: &AppConfig) -> Result<()> {
        let mut missing = Vec::new();
        for package in &app.system_requires {
            let Some(argv) = self.distro.verify_command(package) else {
                continue;
            };
            if let Err(err) = self.target.check_output(&argv) {
                debug!(
                    package = %package,
                    error = %format!("{err:#}"),
                    "system package check failed"
                );
                missing.push(package.as_str());
            }
        }

        if missing.is_empty() {
            return Ok(());
        }
        let hint = self
            .distro
            .install_command(&missing)
            .map(|argv| format!("\ninstall them with: sudo {}", argv.join(" ")))
            .unwrap_or_default();
        bail!(
            "'{}' requires system packages that are not installed: {}{}",
            app.name,
            missing.join(", "),
            hint
        )
    }
}

impl ActionExecutor for HookExecutor {
    fn verify_tools(&mut self, app: &AppConfig) -> Result<()> {
        preflight::check_required_tools(preflight::REQUIRED_TOOLS)?;
        if app.system_requires.is_empty() {
            return Ok(());
        }
        if matches!(self.target, BuildTarget::Host) {
            preflight::check_host_tools(&self.distro)?;
        }
        self.verify_system_requirements(app)
    }

    fn create(&mut self, app: &AppConfig, _state: &State) -> Result<State> {
        let bundle = self.fs_state.create_bundle(app)?;
        println!("[bundle:{}] created {}", app.name, bundle.display());

        let hook_state = match self.run_hook(Action::Create, app) {
            Ok(hook_state) => hook_state,
            Err(err) => {
                // Leave no bundle behind so the next run creates it again.
                if let Err(cleanup) = fs::remove_dir_all(&bundle) {
                    warn!(bundle = %bundle.display(), error = %cleanup, "could not remove bundle");
                }
                return Err(err);
            }
        };

        let mut updates = State::new();
        updates.insert("create_state".into(), json!(app.name));
        updates.insert("bundle_path".into(), json!(bundle.display().to_string()));
        updates.extend(hook_state);
        Ok(updates)
    }

    fn update(&mut self, app: &AppConfig, _state: &State) -> Result<State> {
        let bundle = self.fs_state.bundle_path(app);
        if !bundle.is_dir() {
            bail!("bundle for '{}' is missing: {}", app.name, bundle.display());
        }
        println!("[bundle:{}] updating {}", app.name, bundle.display());

        let mut updates = State::new();
        updates.insert("update_state".into(), json!(app.name));
        updates.extend(self.run_hook(Action::Update, app)?);
        Ok(updates)
    }

    fn build(&mut self, app: &AppConfig, state: &State) -> Result<State> {
        println!("[bundle:{}] building for {}", app.name, describe(&self.distro));

        let mut updates = State::new();
        updates.insert("build_state".into(), json!(app.name));
        let file_name = self.package_file_name(app);
        if !file_name.is_empty() {
            updates.insert("package_file_name".into(), json!(file_name));
        }
        updates.extend(self.run_hook(Action::Build, app)?);

        let mut recorded = state.clone();
        recorded.extend(updates.clone());
        let marker = self.fs_state.write_marker(app, &recorded)?;
        println!(
            "[bundle:{}] built at {} ({})",
            app.name,
            marker.built_at_utc,
            self.fs_state.marker_path(app).display()
        );
        Ok(updates)
    }
}

/// `state:KEY=VALUE` lines from hook stdout.
pub(crate) fn parse_hook_state(stdout: &str) -> State {
    let mut state = State::new();
    for line in stdout.lines() {
        let Some(entry) = line.trim().strip_prefix(HOOK_STATE_PREFIX) else {
            continue;
        };
        let Some((key, value)) = entry.split_once('=') else {
            debug!(line, "ignoring malformed hook state line");
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        state.insert(key.to_string(), Value::String(value.to_string()));
    }
    state
}

pub(crate) fn describe(distro: &Distribution) -> String {
    match (distro.vendor(), distro.codename()) {
        (Some(vendor), Some(codename)) => format!("{} ({vendor} {codename})", distro.name()),
        _ => distro.name().to_string(),
    }
}

/// Package ABI of the build environment, falling back to the host arch.
pub(crate) fn detect_abi(
    distro: &Distribution,
    query: impl Fn(&[String]) -> Result<String>,
) -> String {
    let fallback = std::env::consts::ARCH.to_string();
    let Some(argv) = distro.package_abi_cmdline() else {
        return fallback;
    };
    match query(&argv) {
        Ok(abi) if !abi.trim().is_empty() => abi.trim().to_string(),
        Ok(_) => fallback,
        Err(err) => {
            debug!(error = %format!("{err:#}"), "package ABI query failed; using host arch");
            fallback
        }
    }
}

fn host_output(argv: &[String]) -> Result<String> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| anyhow::anyhow!("empty command line"))?;
    let output = Command::new(program)
        .args(args)
        .output()
        .with_context(|| format!("running '{}'", argv.join(" ")))?;
    if !output.status.success() {
        bail!("'{}' failed with status {}", argv.join(" "), output.status);
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

pub(crate) fn hook_path_display(root: &Path, script: &Path) -> String {
    script
        .strip_prefix(root)
        .unwrap_or(script)
        .display()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bundle_builder::distro::{resolve, OsIdentity, Registry};
    use bundle_builder::lifecycle::AppStateQuery;
    use std::cell::RefCell;
    use std::rc::Rc;
    use tempfile::TempDir;

    type Calls = Rc<RefCell<Vec<(String, Vec<String>)>>>;

    /// Image runner whose package database holds `installed`.
    struct RecordingRunner {
        installed: Vec<&'static str>,
        calls: Calls,
    }

    impl CommandRunner for RecordingRunner {
        fn check_output(&self, image_tag: &str, argv: &[&str]) -> Result<String> {
            self.calls.borrow_mut().push((
                image_tag.to_string(),
                argv.iter().map(|a| a.to_string()).collect(),
            ));
            match argv.last() {
                Some(package) if self.installed.iter().any(|p| p == package) => Ok(String::new()),
                _ => bail!("package is not installed"),
            }
        }
    }

    fn debian() -> Distribution {
        resolve(
            &Registry::builtin(),
            &OsIdentity::from_pairs([("ID", "debian"), ("VERSION_CODENAME", "bookworm")]),
        )
    }

    fn fedora() -> Distribution {
        resolve(
            &Registry::builtin(),
            &OsIdentity::from_pairs([
                ("ID", "fedora"),
                ("ID_LIKE", "fedora"),
                ("VERSION_ID", "39"),
            ]),
        )
    }

    fn host_executor(fs_state: FsAppState, root: &Path) -> HookExecutor {
        HookExecutor::new(
            fs_state,
            debian(),
            BuildTarget::Host,
            "amd64".into(),
            root.to_path_buf(),
        )
    }

    fn image_executor(root: &Path, installed: Vec<&'static str>) -> (HookExecutor, Calls) {
        let calls = Calls::default();
        let runner = RecordingRunner {
            installed,
            calls: Rc::clone(&calls),
        };
        let executor = HookExecutor::new(
            FsAppState::new(root.join("build")),
            fedora(),
            BuildTarget::Image {
                runner: Box::new(runner),
                tag: "fedora:39".into(),
            },
            "x86_64".into(),
            root.to_path_buf(),
        );
        (executor, calls)
    }

    #[test]
    fn hook_state_lines_are_collected() {
        let state = parse_hook_state(
            "building...\nstate:artifact=dist/a.deb\n  state:size=42 \nstate:broken\nstate:=x\n",
        );
        assert_eq!(state.len(), 2);
        assert_eq!(state["artifact"], json!("dist/a.deb"));
        assert_eq!(state["size"], json!("42"));
    }

    #[test]
    fn detect_abi_trims_and_falls_back() {
        assert_eq!(detect_abi(&debian(), |_| Ok("amd64\n".into())), "amd64");
        assert_eq!(
            detect_abi(&debian(), |_| bail!("no dpkg")),
            std::env::consts::ARCH
        );
        assert_eq!(
            detect_abi(&Distribution::unknown(), |_| Ok("ignored".into())),
            std::env::consts::ARCH
        );
    }

    #[test]
    fn create_and_build_run_hooks_and_write_marker() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().to_path_buf();
        fs::create_dir_all(root.join("scripts")).unwrap();
        fs::write(
            root.join("scripts/build.sh"),
            "echo \"state:package=$PACKAGE_FILENAME\"\n\
             echo \"state:vendor=$DISTRO_VENDOR\"\n\
             echo \"state:description=$APP_DESCRIPTION\"\n",
        )
        .unwrap();

        let mut app = AppConfig::new("first", "0.0.1");
        app.description = Some("The first app".into());
        app.hooks.build = Some(root.join("scripts/build.sh"));

        let fs_state = FsAppState::new(root.join("build"));
        let mut executor = host_executor(fs_state.clone(), &root);

        let created = executor.create(&app, &State::new()).unwrap();
        assert_eq!(created["create_state"], json!("first"));
        assert!(fs_state.bundle_exists(&app).unwrap());

        let built = executor.build(&app, &created).unwrap();
        assert_eq!(
            built["package"],
            json!("first_0.0.1-1~debian-bookworm_amd64.deb")
        );
        assert_eq!(built["vendor"], json!("debian"));
        assert_eq!(built["description"], json!("The first app"));
        assert_eq!(built["build_state"], json!("first"));

        let marker = fs_state.load_marker(&app).unwrap().unwrap();
        assert_eq!(marker.state["create_state"], json!("first"));
        assert_eq!(marker.state["build_state"], json!("first"));
    }

    #[test]
    fn failed_create_hook_removes_bundle() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().to_path_buf();
        let hook = root.join("create.sh");
        fs::write(&hook, "exit 1\n").unwrap();

        let mut app = AppConfig::new("first", "0.0.1");
        app.hooks.create = Some(hook.clone());
        let fs_state = FsAppState::new(root.join("build"));
        let mut executor = host_executor(fs_state.clone(), &root);

        assert!(executor.create(&app, &State::new()).is_err());
        assert!(!fs_state.bundle_exists(&app).unwrap());

        fs::write(&hook, "exit 0\n").unwrap();
        let created = executor.create(&app, &State::new()).unwrap();
        assert_eq!(created["create_state"], json!("first"));
        assert!(fs_state.bundle_exists(&app).unwrap());
    }

    #[test]
    fn failing_hook_reports_both_streams() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().to_path_buf();
        fs::write(root.join("update.sh"), "echo partial\necho nope >&2\nexit 3\n").unwrap();

        let mut app = AppConfig::new("first", "0.0.1");
        app.hooks.update = Some(root.join("update.sh"));
        let fs_state = FsAppState::new(root.join("build"));
        fs_state.create_bundle(&app).unwrap();

        let mut executor = host_executor(fs_state, &root);
        let message = executor.update(&app, &State::new()).unwrap_err().to_string();
        assert!(message.contains("update hook failed"));
        assert!(message.contains("\nstdout: partial\n"));
        assert!(message.ends_with("stderr: nope"));
    }

    #[test]
    fn update_requires_bundle() {
        let temp = TempDir::new().unwrap();
        let app = AppConfig::new("first", "0.0.1");
        let mut executor = host_executor(FsAppState::new(temp.path()), temp.path());
        assert!(executor.update(&app, &State::new()).is_err());
    }

    #[test]
    fn image_requirements_are_checked_inside_the_image() {
        let temp = TempDir::new().unwrap();
        let (mut executor, calls) = image_executor(temp.path(), vec!["gtk3-devel"]);

        let mut app = AppConfig::new("first", "0.0.1");
        app.system_requires = vec!["gtk3-devel".into(), "cairo-devel".into()];

        let message = format!("{:#}", executor.verify_tools(&app).unwrap_err());
        assert!(message.contains("not installed: cairo-devel"));
        assert!(message.contains("install them with: sudo dnf install cairo-devel"));
        assert_eq!(
            calls.borrow().as_slice(),
            [
                (
                    "fedora:39".to_string(),
                    vec!["rpm".to_string(), "-q".into(), "gtk3-devel".into()]
                ),
                (
                    "fedora:39".to_string(),
                    vec!["rpm".to_string(), "-q".into(), "cairo-devel".into()]
                ),
            ]
        );
    }

    #[test]
    fn installed_image_requirements_pass() {
        let temp = TempDir::new().unwrap();
        let (mut executor, calls) = image_executor(temp.path(), vec!["gtk3-devel"]);

        let mut app = AppConfig::new("first", "0.0.1");
        assert!(executor.verify_tools(&app).is_ok());
        assert!(calls.borrow().is_empty());

        app.system_requires = vec!["gtk3-devel".into()];
        assert!(executor.verify_tools(&app).is_ok());
        assert_eq!(calls.borrow().len(), 1);
    }

    #[test]
    fn image_target_runs_queries_through_runner() {
        let calls = Calls::default();
        let target = BuildTarget::Image {
            runner: Box::new(RecordingRunner {
                installed: vec!["--print-architecture"],
                calls: Rc::clone(&calls),
            }),
            tag: "debian:bookworm".into(),
        };
        let abi = detect_abi(&debian(), |argv| target.check_output(argv));
        // Runner reports empty stdout, so the host arch is used.
        assert_eq!(abi, std::env::consts::ARCH);
        assert_eq!(
            calls.borrow()[0],
            (
                "debian:bookworm".to_string(),
                vec!["dpkg".to_string(), "--print-architecture".into()]
            )
        );
    }

    #[test]
    fn hook_paths_display_relative_to_root() {
        assert_eq!(
            hook_path_display(Path::new("/work"), Path::new("/work/scripts/b.sh")),
            "scripts/b.sh"
        );
    }
}
