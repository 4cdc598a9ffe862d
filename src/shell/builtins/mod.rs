//! Yash builtins
//!
//! The job-control commands run inside the shell process itself, since they
//! act on the shell's own job table.

use std::io::Write;
use std::iter;

use docopt::Docopt;
use serde::de::DeserializeOwned;

use crate::core::job::JobId;
use crate::core::tokenizer::Tokens;
use crate::errors::{Error, Result};
use crate::shell::Shell;

use self::jobs::{Bg, Fg, Jobs};

mod jobs;

const BG_NAME: &str = "bg";
const FG_NAME: &str = "fg";
const JOBS_NAME: &str = "jobs";

/// Exit status of a builtin given bad arguments.
const USAGE_EXIT_STATUS: i32 = 2;

/// Represents a Yash builtin command such as fg or jobs.
pub trait BuiltinCommand {
    /// The NAME of the command.
    const NAME: &'static str;
    /// The docopt usage string, also shown to the user on bad arguments.
    const HELP: &'static str;
    /// Runs the command with the given arguments in the `shell` environment.
    fn run<T: AsRef<str>>(shell: &mut Shell, args: &[T], stdout: &mut dyn Write) -> Result<()>;
}

pub fn is_builtin<T: AsRef<str>>(program: T) -> bool {
    [BG_NAME, FG_NAME, JOBS_NAME].contains(&program.as_ref())
}

/// Runs `tokens` as a builtin if its first token names one.
/// Returns `None` when the line is not a builtin.
pub fn dispatch(shell: &mut Shell, tokens: &Tokens, stdout: &mut dyn Write) -> Option<Result<()>> {
    let program = tokens.get(0).filter(|program| is_builtin(program))?;
    let args: Vec<&str> = tokens.iter().skip(1).map(String::as_str).collect();
    debug!("running builtin {} {:?}", program, args);

    let result = match program {
        BG_NAME => Bg::run(shell, &args, stdout),
        FG_NAME => Fg::run(shell, &args, stdout),
        JOBS_NAME => Jobs::run(shell, &args, stdout),
        _ => unreachable!(),
    };
    Some(result)
}

pub fn parse_args<D, S, I>(usage: &str, program: S, args: I) -> Result<D>
where
    D: DeserializeOwned,
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let name = program.as_ref().to_owned();
    Docopt::new(usage)
        .and_then(|d| {
            d.argv(iter::once(program).chain(args))
                .help(false)
                .deserialize()
        })
        .map_err(|e| {
            debug!("{}: {}", name, e);
            Error::builtin_command(
                format!("{}: invalid arguments\nusage: {}", name, usage_line(usage)),
                USAGE_EXIT_STATUS,
            )
        })
}

/// Parses a job specification, `N` or `%N`.
pub fn parse_jobspec(name: &str, jobspec: &str) -> Result<JobId> {
    let digits = jobspec.strip_prefix('%').unwrap_or(jobspec);
    digits.parse::<u32>().map(JobId).map_err(|_| {
        Error::builtin_command(
            format!("{}: {}: invalid job specification", name, jobspec),
            USAGE_EXIT_STATUS,
        )
    })
}

fn usage_line(usage: &str) -> &str {
    usage
        .lines()
        .map(str::trim)
        .skip_while(|line| !line.to_lowercase().starts_with("usage:"))
        .nth(1)
        .unwrap_or("")
}
