use crate::errors::ArgumentError;

use std::time::Duration;

/// How a child output stream is connected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamMode {
    /// Capture the stream into a buffer owned by the chain.
    Capture,
    /// Leave the stream attached to the parent terminal.
    Inherit,
}

/// One shell invocation: a command, its argument list, and the named options
/// controlling how the process is spawned and waited on.
#[derive(Clone, Debug)]
pub struct Invocation {
    pub(crate) command: String,
    pub(crate) args: Vec<String>,
    pub(crate) env: Vec<(String, String)>,
    pub(crate) stdout: StreamMode,
    pub(crate) stderr: StreamMode,
    pub(crate) timeout: Option<Duration>,
    pub(crate) sync: bool,
}

impl Invocation {
    pub fn new(command: impl Into<String>) -> Invocation {
        Invocation {
            command: command.into(),
            args: Vec::new(),
            env: Vec::new(),
            stdout: StreamMode::Capture,
            stderr: StreamMode::Capture,
            timeout: None,
            sync: true,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Invocation {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Invocation
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Extend the inherited environment; an existing variable is overridden.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Invocation {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn envs<I, K, V>(mut self, vars: I) -> Invocation
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn stdout(mut self, mode: StreamMode) -> Invocation {
        self.stdout = mode;
        self
    }

    pub fn stderr(mut self, mode: StreamMode) -> Invocation {
        self.stderr = mode;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Invocation {
        self.timeout = Some(timeout);
        self
    }

    /// When false, spawning returns immediately and the caller must call
    /// [`wait`](crate::CommandChain::wait) to collect the result.
    pub fn sync(mut self, sync: bool) -> Invocation {
        self.sync = sync;
        self
    }

    /// Checked in order; the first violation wins.
    pub fn validate(&self) -> Result<(), ArgumentError> {
        if self.command.is_empty() {
            return Err(ArgumentError::NoArguments);
        }
        // An interior NUL cannot be handed to the OS as a command string.
        if self.command.contains('\0') {
            return Err(ArgumentError::CommandNotString);
        }
        if self.args.iter().any(|arg| arg.contains('\0')) {
            return Err(ArgumentError::ArgumentsNotStrings);
        }
        Ok(())
    }

    /// Command and arguments joined with single spaces. No shell escaping is
    /// performed; quoting is the caller's responsibility.
    pub fn command_line(&self) -> String {
        if self.args.is_empty() {
            self.command.clone()
        } else {
            format!("{} {}", self.command, self.args.join(" "))
        }
    }

    pub(crate) fn through_xargs(mut self) -> Invocation {
        self.command = format!("xargs {}", self.command);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assembles_command_and_args() {
        let invocation = Invocation::new("grep").args(["-e", "pattern", "file.txt"]);
        assert_eq!(invocation.command_line(), "grep -e pattern file.txt");
    }

    #[test]
    fn assembles_bare_command() {
        assert_eq!(Invocation::new("ls .").command_line(), "ls .");
    }

    #[test]
    fn empty_command_is_no_arguments() {
        assert_eq!(
            Invocation::new("").validate(),
            Err(ArgumentError::NoArguments)
        );
    }

    #[test]
    fn nul_in_command_is_not_a_string() {
        assert_eq!(
            Invocation::new("ls\0-l").validate(),
            Err(ArgumentError::CommandNotString)
        );
    }

    #[test]
    fn nul_in_args_is_not_a_string() {
        assert_eq!(
            Invocation::new("grep").arg("pat\0tern").validate(),
            Err(ArgumentError::ArgumentsNotStrings)
        );
    }

    #[test]
    fn first_violation_wins() {
        // Empty command outranks the bad argument.
        assert_eq!(
            Invocation::new("").arg("pat\0tern").validate(),
            Err(ArgumentError::NoArguments)
        );
    }

    #[test]
    fn xargs_prefixes_the_command() {
        let invocation = Invocation::new("grep").arg("pattern").through_xargs();
        assert_eq!(invocation.command_line(), "xargs grep pattern");
    }

    #[test]
    fn env_accumulates() {
        let invocation = Invocation::new("env")
            .env("A", "1")
            .envs([("B", "2"), ("C", "3")]);
        assert_eq!(
            invocation.env,
            vec![
                ("A".to_string(), "1".to_string()),
                ("B".to_string(), "2".to_string()),
                ("C".to_string(), "3".to_string()),
            ]
        );
    }
}
