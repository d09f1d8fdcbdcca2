use anyhow::Result;
use tracing_subscriber::EnvFilter;

mod workflows;

const LOG_ENV: &str = "BUNDLE_BUILDER_LOG";

pub(crate) fn usage() -> &'static str {
    "Usage:\n  bundle-builder [--config <bundle.toml>] [--image <tag>] <command>\n\nCommands:\n  distro host\n  distro image <tag>\n  distro parse <os-release file>\n  create [app...]\n  update [app...]\n  build [-u|--update] [app...]\n  plan [-u|--update] [app...]"
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (options, invocation) = workflows::parse_args(&args)?;
    workflows::run(&options, invocation)
}
