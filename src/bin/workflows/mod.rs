mod commands;
mod executor;
mod parse;

pub(crate) use commands::run;
pub(crate) use parse::parse_args;
