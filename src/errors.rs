//! Error module. See the [error-chain](https://crates.io/crates/error-chain) crate for details.

use nix::errno::Errno;

use crate::core::parser::SyntaxError;

error_chain! {
    foreign_links {
        Io(::std::io::Error);
        Nix(::nix::Error);
        Readline(::rustyline::error::ReadlineError);
    }

    errors {
        /// Malformed operator placement in a command line
        Syntax(e: SyntaxError) {
            description("syntax error")
            display("syntax error: {}", e)
        }
        /// Every job table entry is in use
        JobTableFull(max: usize) {
            description("job table full")
            display("max number of concurrent jobs reached: {}", max)
        }
        LineTooLong(max: usize) {
            description("command line too long")
            display("command line exceeds {} characters", max)
        }
        TokenLimitExceeded(max: usize) {
            description("too many tokens")
            display("command line has more than {} tokens", max)
        }
        /// A pipe, process, or file could not be created
        Resource(what: String, errno: Errno) {
            description("resource error")
            display("{}: {}", what, errno.desc())
        }
        /// The program could not replace the child's process image
        Exec(program: String, errno: Errno) {
            description("exec error")
            display("{}: {}", program, errno.desc())
        }
        Wait(errno: Errno) {
            description("wait error")
            display("error checking job status: {}", errno.desc())
        }
        NoSuchJob(job: String) {
            description("no such job")
            display("{}: no such job", job)
        }
        BuiltinCommand(message: String, code: i32) {
            description("builtin command error")
            display("{}", message)
        }
    }
}

impl Error {
    pub(crate) fn syntax(e: SyntaxError) -> Error {
        Error::from(ErrorKind::Syntax(e))
    }

    pub(crate) fn resource<T: AsRef<str>>(what: T, errno: Errno) -> Error {
        Error::from(ErrorKind::Resource(what.as_ref().to_string(), errno))
    }

    pub(crate) fn exec<T: AsRef<str>>(program: T, errno: Errno) -> Error {
        Error::from(ErrorKind::Exec(program.as_ref().to_string(), errno))
    }

    pub(crate) fn builtin_command<T: AsRef<str>>(message: T, code: i32) -> Error {
        Error::from(ErrorKind::BuiltinCommand(message.as_ref().to_string(), code))
    }

    pub(crate) fn no_such_job<T: AsRef<str>>(job: T) -> Error {
        Error::from(ErrorKind::NoSuchJob(job.as_ref().to_string()))
    }
}
