use std::path::PathBuf;

use anyhow::{Context, Result};
use bundle_builder::config::{self, ProjectConfig};
use bundle_builder::distro::{parse_os_release, resolve, DockerRunner};
use bundle_builder::lifecycle::{self, AppStatus, BuildRequest, FsAppState, Request, State};
use bundle_builder::{Distribution, LinuxEnvironment, Registry};
use tracing::{info, warn};

use super::executor::{describe, detect_abi, BuildTarget, HookExecutor};
use super::parse::{GlobalOptions, Invocation};

/// Environment variable overriding the host os-release path.
const OS_RELEASE_ENV: &str = "BUNDLE_BUILDER_OS_RELEASE";

pub(crate) fn run(options: &GlobalOptions, invocation: Invocation) -> Result<()> {
    match invocation {
        Invocation::DistroHost => {
            let distro = host_environment()
                .from_host()
                .context("classifying host distribution")?;
            print!("{}", render_distribution(&distro));
            Ok(())
        }
        Invocation::DistroImage(tag) => {
            let distro = host_environment()
                .from_image_tag(&DockerRunner::new(), &tag)
                .with_context(|| format!("classifying image '{}'", tag))?;
            print!("{}", render_distribution(&distro));
            Ok(())
        }
        Invocation::DistroParse(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("reading os-release file '{}'", path.display()))?;
            let identity = parse_os_release(&content)
                .with_context(|| format!("parsing '{}'", path.display()))?;
            print!(
                "{}",
                render_distribution(&resolve(&Registry::builtin(), &identity))
            );
            Ok(())
        }
        Invocation::Plan { request, apps } => {
            let project = load_project(options)?;
            for line in plan_lines(&project, request, &apps)? {
                println!("{}", line);
            }
            Ok(())
        }
        Invocation::Lifecycle { request, apps } => run_lifecycle(options, request, &apps),
    }
}

fn host_environment() -> LinuxEnvironment {
    let env = LinuxEnvironment::default();
    match std::env::var_os(OS_RELEASE_ENV) {
        Some(path) => env.with_os_release_path(PathBuf::from(path)),
        None => env,
    }
}

fn load_project(options: &GlobalOptions) -> Result<ProjectConfig> {
    let cwd = std::env::current_dir().context("resolving current directory")?;
    let path = config::config_path(options.config.as_deref(), &cwd);
    config::load_project(&path)
}

/// Distribution the bundles are built for: the `--image` target if given,
/// otherwise the host. Non-Linux hosts resolve to the unknown distribution.
fn target_distribution(options: &GlobalOptions) -> Result<(Distribution, BuildTarget)> {
    let env = host_environment();
    if let Some(tag) = options.image.as_deref() {
        let runner = DockerRunner::new();
        let distro = env
            .from_image_tag(&runner, tag)
            .with_context(|| format!("classifying image '{}'", tag))?;
        let target = BuildTarget::Image {
            runner: Box::new(runner),
            tag: tag.to_string(),
        };
        return Ok((distro, target));
    }

    if !cfg!(target_os = "linux") {
        warn!(os = std::env::consts::OS, "not a Linux host; packaging format unknown");
        return Ok((Distribution::unknown(), BuildTarget::Host));
    }

    let distro = env.from_host().context("classifying host distribution")?;
    Ok((distro, BuildTarget::Host))
}

fn run_lifecycle(options: &GlobalOptions, request: Request, names: &[String]) -> Result<()> {
    let project = load_project(options)?;
    let apps = project.select_apps(names)?;
    let (distro, target) = target_distribution(options)?;
    let abi = detect_abi(&distro, |argv| target.check_output(argv));
    info!(
        project = %project.name,
        distro = %describe(&distro),
        %abi,
        "starting lifecycle run"
    );

    let fs_state = FsAppState::new(&project.output_dir);
    let _lock = fs_state.lock()?;
    let mut executor = HookExecutor::new(
        fs_state.clone(),
        distro,
        target,
        abi,
        project.root.clone(),
    );

    let report = lifecycle::run_batch(&apps, request, &fs_state, &mut executor, State::new())?;
    for (app, chain) in &report.chains {
        println!("[bundle:{}] done: {}", app, chain);
    }
    Ok(())
}

/// One line per selected app describing what `build` would do.
pub(crate) fn plan_lines(
    project: &ProjectConfig,
    request: BuildRequest,
    names: &[String],
) -> Result<Vec<String>> {
    let fs_state = FsAppState::new(&project.output_dir);
    let mut lines = Vec::new();
    for app in project.select_apps(names)? {
        let status = AppStatus::load(&fs_state, &app)?;
        let chain = lifecycle::plan(status, request);
        lines.push(format!("[bundle:{}] {}", app.name, chain));
    }
    Ok(lines)
}

pub(crate) fn render_distribution(distro: &Distribution) -> String {
    let mut out = format!("distribution: {}\n", distro.name());
    if distro.is_unknown() {
        return out;
    }
    out.push_str(&format!("vendor: {}\n", distro.vendor().unwrap_or_default()));
    out.push_str(&format!("codename: {}\n", distro.codename().unwrap_or_default()));
    if let Some(format) = distro.format() {
        out.push_str(&format!("package format: {}\n", format.as_str()));
    }
    if let Some(argv) = distro.verify_command("<package>") {
        out.push_str(&format!("verify: {}\n", argv.join(" ")));
    }
    if let Some(argv) = distro.install_command(&["<package>"]) {
        out.push_str(&format!("install: {}\n", argv.join(" ")));
    }
    let deps = distro.build_dependencies::<&str>(&[]);
    if !deps.is_empty() {
        out.push_str(&format!("build dependencies: {}\n", deps.join(" ")));
    }
    out
}
