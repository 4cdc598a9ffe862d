extern crate docopt;
extern crate fern;
#[macro_use]
extern crate log;
extern crate nix;
#[macro_use]
extern crate serde_derive;
extern crate yash_rs;

use docopt::Docopt;
use nix::unistd::Pid;
use std::io;
use std::path::PathBuf;
use std::process::{self, ExitStatus};
use yash_rs::errors::Error;
use yash_rs::{Editor, Shell, ShellConfig, YashExitStatusExt};

const COMMAND_HISTORY_CAPACITY: usize = 100;
const LOG_FILE_NAME: &str = ".yash_log";

/// Exit status for unrecognized command line arguments.
const ARGUMENT_ERROR_EXIT_STATUS: i32 = 2;

const USAGE: &str = "
yash.

Usage:
    yash [options]
    yash (-h | --help)
    yash --version

Options:
    -h --help       Show this screen.
    --version       Show version.
    -v --verbose    Also write diagnostic output to standard error.
    --log=<path>    File to write log to, defaults to ~/.yash_log
";

/// Docopts input arguments.
#[derive(Debug, Deserialize)]
struct Args {
    flag_version: bool,
    flag_verbose: bool,
    flag_log: Option<String>,
}

fn main() {
    let args: Args = Docopt::new(USAGE)
        .and_then(|d| d.deserialize())
        .unwrap_or_else(|e| {
            if e.fatal() {
                eprintln!("{}", e);
                process::exit(ARGUMENT_ERROR_EXIT_STATUS);
            }
            e.exit()
        });

    init_logger(&args);
    debug!("{:?}", args);

    if args.flag_version {
        println!("yash version {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    let shell_config = ShellConfig::interactive(COMMAND_HISTORY_CAPACITY);
    let mut shell = Shell::new(shell_config).unwrap_or_else(|e| display_error_and_exit(&e));
    let mut editor = Editor::with_capacity(shell_config.command_history_capacity);
    if let Err(e) = shell.run(&mut editor) {
        display_error_and_exit(&e);
    }
}

fn init_logger(args: &Args) {
    let log_path = args
        .flag_log
        .clone()
        .map(PathBuf::from)
        .or_else(default_log_path);

    let pid = Pid::this();
    let mut dispatch = fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "{} [{}] {}: {}",
                pid,
                record.level(),
                record.target(),
                message
            ))
        })
        .level(log::LevelFilter::Trace);

    match log_path.map(|path| (fern::log_file(&path), path)) {
        Some((Ok(file), _)) => dispatch = dispatch.chain(file),
        Some((Err(e), path)) => eprintln!("yash: {}: {}", path.display(), e),
        None => eprintln!("yash: unable to get home directory for the log file"),
    }

    if args.flag_verbose {
        dispatch = dispatch.chain(
            fern::Dispatch::new()
                .level(log::LevelFilter::Debug)
                .chain(io::stderr()),
        );
    }

    if let Err(e) = dispatch.apply() {
        eprintln!("yash: failed to initialize logging: {}", e);
    }
}

fn default_log_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(LOG_FILE_NAME))
}

fn display_error_and_exit(error: &Error) -> ! {
    error!("{}", error);
    eprintln!("yash: {}", error);
    process::exit(ExitStatus::from_failure().code().unwrap_or(1));
}
