use crate::errors::Error;
use crate::invocation::{Invocation, StreamMode};

use std::fmt;
use std::io::{self, Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Whether the platform has a usable timeout on its process-wait primitive.
const WAIT_SUPPORTS_TIMEOUT: bool = cfg!(any(unix, windows));

const POLL_INTERVAL: Duration = Duration::from_millis(10);
#[cfg(unix)]
const KILL_GRACE: Duration = Duration::from_millis(100);

/// One shell process and its captured result.
///
/// Every invocation spawns exactly one process through `sh -c`. Chaining
/// spawns a brand-new process whose standard input is fed the captured
/// stdout of the previous link; the previous link is left untouched.
pub struct CommandChain {
    command_line: String,
    child: Option<Child>,
    input: Option<Vec<u8>>,
    stdout: Option<Vec<u8>>,
    stderr: Option<Vec<u8>>,
    code: Option<i32>,
}

impl CommandChain {
    /// Validate, spawn, and (unless `sync(false)` was set) wait.
    pub fn invoke(invocation: Invocation) -> Result<CommandChain, Error> {
        CommandChain::spawn(invocation, None)
    }

    /// Same contract as [`invoke`](CommandChain::invoke); this link's captured
    /// stdout becomes the new process's standard input.
    pub fn chain(&self, invocation: Invocation) -> Result<CommandChain, Error> {
        CommandChain::spawn(invocation, self.stdout.clone())
    }

    /// Chain through the system `xargs` utility, so the captured stdout is
    /// word-split into trailing arguments of `invocation` instead of being
    /// fed to its standard input.
    pub fn xargs(&self, invocation: Invocation) -> Result<CommandChain, Error> {
        invocation.validate()?;
        CommandChain::spawn(invocation.through_xargs(), self.stdout.clone())
    }

    fn spawn(invocation: Invocation, input: Option<Vec<u8>>) -> Result<CommandChain, Error> {
        invocation.validate()?;

        let command_line = invocation.command_line();
        debug!("spawning `{}`", command_line);

        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(&command_line)
            .stdin(Stdio::piped())
            .stdout(stdio(invocation.stdout))
            .stderr(stdio(invocation.stderr));
        command.envs(invocation.env.iter().map(|(key, value)| (key, value)));

        let child = command.spawn().map_err(|source| Error::Spawn {
            command: command_line.clone(),
            source,
        })?;

        let mut chain = CommandChain {
            command_line,
            child: Some(child),
            input,
            stdout: None,
            stderr: None,
            code: None,
        };
        if invocation.sync {
            chain.wait(invocation.timeout)?;
        }
        Ok(chain)
    }

    /// Feed the stdin payload, block until the process terminates (or the
    /// timeout elapses), and record the captured streams and exit code.
    ///
    /// On timeout the child is terminated and reaped before the error is
    /// returned. Waiting on an already-reaped chain is a no-op.
    pub fn wait(&mut self, timeout: Option<Duration>) -> Result<&mut Self, Error> {
        if timeout.is_some() && !WAIT_SUPPORTS_TIMEOUT {
            return Err(Error::UnsupportedOption);
        }
        let mut child = match self.child.take() {
            Some(child) => child,
            None => return Ok(self),
        };

        // The payload write and both capture reads each get their own thread
        // so a child filling one pipe cannot deadlock against the others.
        let writer = child.stdin.take().map(|stdin| {
            let payload = self.input.take().unwrap_or_default();
            writer_thread(stdin, payload)
        });
        let stdout_reader = child.stdout.take().map(reader_thread);
        let stderr_reader = child.stderr.take().map(reader_thread);

        let status = match timeout {
            None => child.wait()?,
            Some(limit) => match wait_deadline(&mut child, limit)? {
                Some(status) => status,
                None => {
                    terminate(&mut child, &self.command_line);
                    if let Err(e) = child.wait() {
                        debug!("failed to reap `{}` after kill: {}", self.command_line, e);
                    }
                    join_quietly(writer);
                    join_quietly(stdout_reader);
                    join_quietly(stderr_reader);
                    return Err(Error::Timeout {
                        command: self.command_line.clone(),
                        timeout: limit,
                    });
                }
            },
        };

        let stdout = join_capture(stdout_reader)?;
        let stderr = join_capture(stderr_reader)?;
        if let Some(writer) = writer {
            join_thread(writer)??;
        }

        let code = exit_code(status);
        debug!("`{}` exited with code {}", self.command_line, code);
        self.stdout = Some(stdout);
        self.stderr = Some(stderr);
        self.code = Some(code);
        Ok(self)
    }

    /// Captured stdout decoded as UTF-8, surrounding whitespace trimmed.
    /// Empty string if nothing was captured.
    pub fn text(&self) -> Result<String, Error> {
        let bytes = match &self.stdout {
            Some(bytes) => bytes.as_slice(),
            None => return Ok(String::new()),
        };
        Ok(std::str::from_utf8(bytes)?.trim().to_string())
    }

    /// The trimmed decoded text split on newlines, each line trimmed.
    pub fn lines(&self) -> Result<Vec<String>, Error> {
        let text = self.text()?;
        if text.is_empty() {
            return Ok(Vec::new());
        }
        Ok(text.lines().map(|line| line.trim().to_string()).collect())
    }

    /// True iff [`text`](CommandChain::text) is non-empty.
    pub fn as_bool(&self) -> Result<bool, Error> {
        Ok(!self.text()?.is_empty())
    }

    /// The same sequence as [`lines`](CommandChain::lines), recomputed per call.
    pub fn iter(&self) -> Result<std::vec::IntoIter<String>, Error> {
        Ok(self.lines()?.into_iter())
    }

    pub fn command_line(&self) -> &str {
        &self.command_line
    }

    /// Raw captured stdout; `None` until a wait has completed.
    pub fn stdout(&self) -> Option<&[u8]> {
        self.stdout.as_deref()
    }

    /// Raw captured stderr; `None` until a wait has completed.
    pub fn stderr(&self) -> Option<&[u8]> {
        self.stderr.as_deref()
    }

    /// Exit code; `None` until a wait has completed.
    pub fn code(&self) -> Option<i32> {
        self.code
    }

    /// OS pid, present while the process has not been reaped.
    pub fn id(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }
}

impl fmt::Display for CommandChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.stdout {
            Some(bytes) => write!(f, "{}", String::from_utf8_lossy(bytes).trim()),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for CommandChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CommandChain({:?}, code: {:?})",
            self.command_line, self.code
        )
    }
}

impl Drop for CommandChain {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            debug!("dropping unreaped `{}`, terminating", self.command_line);
            terminate(&mut child, &self.command_line);
            if let Err(e) = child.wait() {
                debug!("failed to reap `{}`: {}", self.command_line, e);
            }
        }
    }
}

fn stdio(mode: StreamMode) -> Stdio {
    match mode {
        StreamMode::Capture => Stdio::piped(),
        StreamMode::Inherit => Stdio::inherit(),
    }
}

fn writer_thread(mut stdin: std::process::ChildStdin, payload: Vec<u8>) -> JoinHandle<io::Result<()>> {
    thread::spawn(move || {
        if let Err(e) = stdin.write_all(&payload) {
            // The child may exit without draining its input.
            if e.kind() != io::ErrorKind::BrokenPipe {
                return Err(e);
            }
            debug!("child closed stdin early: {}", e);
        }
        Ok(())
    })
}

fn reader_thread<R: Read + Send + 'static>(mut stream: R) -> JoinHandle<io::Result<Vec<u8>>> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        stream.read_to_end(&mut buffer)?;
        Ok(buffer)
    })
}

fn join_thread<T>(handle: JoinHandle<io::Result<T>>) -> Result<io::Result<T>, Error> {
    handle
        .join()
        .map_err(|_| Error::Io(io::Error::new(io::ErrorKind::Other, "pipe thread panicked")))
}

fn join_capture(handle: Option<JoinHandle<io::Result<Vec<u8>>>>) -> Result<Vec<u8>, Error> {
    match handle {
        Some(handle) => Ok(join_thread(handle)??),
        None => Ok(Vec::new()),
    }
}

fn join_quietly<T>(handle: Option<JoinHandle<io::Result<T>>>) {
    if let Some(handle) = handle {
        if handle.join().is_err() {
            debug!("pipe thread panicked during teardown");
        }
    }
}

fn wait_deadline(child: &mut Child, limit: Duration) -> io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + limit;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// SIGTERM with a short grace period, then SIGKILL.
fn terminate(child: &mut Child, command_line: &str) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{self, Signal};
        use nix::unistd::Pid;

        let pid = Pid::from_raw(child.id() as i32);
        debug!("sending SIGTERM to `{}` (pid {})", command_line, pid);
        if signal::kill(pid, Signal::SIGTERM).is_ok() {
            let deadline = Instant::now() + KILL_GRACE;
            while Instant::now() < deadline {
                if matches!(child.try_wait(), Ok(Some(_))) {
                    return;
                }
                thread::sleep(POLL_INTERVAL);
            }
        }
        debug!("escalating to SIGKILL for `{}`", command_line);
    }
    if let Err(e) = child.kill() {
        debug!("failed to kill `{}`: {}", command_line, e);
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;

        if let Some(signal) = status.signal() {
            return -signal;
        }
    }
    status.code().unwrap_or(-1)
}
