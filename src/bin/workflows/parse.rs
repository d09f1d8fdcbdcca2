use std::path::PathBuf;

use anyhow::{bail, Result};
use bundle_builder::lifecycle::{BuildRequest, Request};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct GlobalOptions {
    pub(crate) config: Option<PathBuf>,
    pub(crate) image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Invocation {
    DistroHost,
    DistroImage(String),
    DistroParse(PathBuf),
    Plan {
        request: BuildRequest,
        apps: Vec<String>,
    },
    Lifecycle {
        request: Request,
        apps: Vec<String>,
    },
}

pub(crate) fn parse_args(args: &[String]) -> Result<(GlobalOptions, Invocation)> {
    let mut options = GlobalOptions {
        config: None,
        image: None,
    };
    let mut rest = args;
    loop {
        match rest {
            [flag, value, tail @ ..] if flag == "--config" => {
                options.config = Some(PathBuf::from(value));
                rest = tail;
            }
            [flag, value, tail @ ..] if flag == "--image" => {
                options.image = Some(value.clone());
                rest = tail;
            }
            [flag] if flag == "--config" || flag == "--image" => {
                bail!("option '{}' requires a value\n{}", flag, crate::usage())
            }
            _ => break,
        }
    }

    let invocation = match rest {
        [distro, host] if distro == "distro" && host == "host" => Invocation::DistroHost,
        [distro, image, tag] if distro == "distro" && image == "image" => {
            Invocation::DistroImage(tag.clone())
        }
        [distro, parse, path] if distro == "distro" && parse == "parse" => {
            Invocation::DistroParse(PathBuf::from(path))
        }
        [plan, tail @ ..] if plan == "plan" => {
            let (update, apps) = parse_update_flag(tail)?;
            Invocation::Plan {
                request: build_request(update),
                apps,
            }
        }
        [build, tail @ ..] if build == "build" => {
            let (update, apps) = parse_update_flag(tail)?;
            Invocation::Lifecycle {
                request: Request::Build(build_request(update)),
                apps,
            }
        }
        [create, tail @ ..] if create == "create" => Invocation::Lifecycle {
            request: Request::Create,
            apps: parse_app_names(tail)?,
        },
        [update, tail @ ..] if update == "update" => Invocation::Lifecycle {
            request: Request::Update,
            apps: parse_app_names(tail)?,
        },
        _ => bail!(crate::usage()),
    };

    Ok((options, invocation))
}

fn build_request(update: bool) -> BuildRequest {
    if update {
        BuildRequest::UpdateAndBuild
    } else {
        BuildRequest::Build
    }
}

fn parse_update_flag(args: &[String]) -> Result<(bool, Vec<String>)> {
    let mut update = false;
    let mut names = Vec::new();
    for arg in args {
        match arg.as_str() {
            "-u" | "--update" => update = true,
            _ => names.push(arg.clone()),
        }
    }
    Ok((update, parse_app_names(&names)?))
}

fn parse_app_names(args: &[String]) -> Result<Vec<String>> {
    let mut names: Vec<String> = Vec::with_capacity(args.len());
    for arg in args {
        if arg.starts_with('-') {
            bail!("unsupported option '{}'\n{}", arg, crate::usage());
        }
        if !names.contains(arg) {
            names.push(arg.clone());
        }
    }
    Ok(names)
}
