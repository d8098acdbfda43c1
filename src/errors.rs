use thiserror::Error;

use std::time::Duration;

/// Fixed usage hint appended to every validation failure.
pub const USAGE: &str =
    "invoke accepts one or two arguments: [command <string>, arguments <list of strings>]";

/// Rejected invocation, reported before any process is spawned.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ArgumentError {
    #[error("no arguments\n{}", USAGE)]
    NoArguments,
    #[error("first argument must be a command as a string\n{}", USAGE)]
    CommandNotString,
    #[error("one or more command arguments were not strings\n{}", USAGE)]
    ArgumentsNotStrings,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Argument(#[from] ArgumentError),
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },
    #[error("`{command}` timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },
    #[error("captured output is not valid UTF-8: {0}")]
    Decode(#[from] std::str::Utf8Error),
    #[error("timeout is not supported by the process wait primitive on this platform")]
    UnsupportedOption,
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_usage_hint() {
        assert_eq!(
            ArgumentError::NoArguments.to_string(),
            format!("no arguments\n{}", USAGE)
        );
        assert_eq!(
            ArgumentError::CommandNotString.to_string(),
            format!("first argument must be a command as a string\n{}", USAGE)
        );
        assert_eq!(
            ArgumentError::ArgumentsNotStrings.to_string(),
            format!("one or more command arguments were not strings\n{}", USAGE)
        );
    }
}
