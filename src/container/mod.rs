//! Sandboxed subprocesses in a throwaway root filesystem

mod builder;
mod isolation;

pub use builder::ContainerBuilder;
pub use isolation::Isolation;

use crate::{errors::SandboxError, rootfs::SandboxRoot};
use std::{borrow::Cow, fmt, io, os::unix::process::ExitStatusExt};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    process::{Child, ChildStderr, ChildStdout},
    task,
    task::JoinHandle,
};

/// Where a launch is in its lifecycle
///
/// Every launch moves forward through these in order, and every launch ends
/// at [LaunchState::Cleaned] no matter which terminal state it reached. A
/// launch that fails before its child is running goes to
/// [LaunchState::LaunchFailed] from whichever setup state it got to.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum LaunchState {
    Created,
    Staged,
    Isolated,
    Running,
    Exited(ExitStatus),
    LaunchFailed,
    Cleaned,
}

impl LaunchState {
    /// Is `next` a legal successor of this state?
    pub fn can_advance_to(&self, next: &LaunchState) -> bool {
        use LaunchState::*;
        matches!(
            (self, next),
            (Created, Staged)
                | (Staged, Isolated)
                | (Isolated, Running)
                | (Running, Exited(_))
                | (Created, LaunchFailed)
                | (Staged, LaunchFailed)
                | (Isolated, LaunchFailed)
                | (Exited(_), Cleaned)
                | (LaunchFailed, Cleaned)
                // waiting failed, so there is no status to record
                | (Running, Cleaned)
        )
    }

    pub(crate) fn advance(&mut self, next: LaunchState) {
        log::debug!("launch state {:?} -> {:?}", self, next);
        debug_assert!(
            self.can_advance_to(&next),
            "launch state {:?} can't move to {:?}",
            self,
            next
        );
        *self = next;
    }
}

/// A running container
///
/// Roughly analogous to [std::process::Child], but the sandbox root it runs
/// in belongs to this value and is removed once the child has been waited
/// for.
pub struct Container {
    pub stdout: Option<ChildStdout>,
    pub stderr: Option<ChildStderr>,
    command: String,
    child: Child,
    root: SandboxRoot,
    state: LaunchState,
}

/// Status of an exited container
///
/// Much like [std::process::ExitStatus], except there is always a code: a
/// child killed by signal `n` reports `128 + n`, the way shells do.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ExitStatus {
    code: i32,
    signal: Option<i32>,
}

impl ExitStatus {
    pub fn success(&self) -> bool {
        self.code == 0
    }

    pub fn code(&self) -> i32 {
        self.code
    }

    /// The signal that terminated the child, if it didn't exit normally
    pub fn signal(&self) -> Option<i32> {
        self.signal
    }
}

impl From<std::process::ExitStatus> for ExitStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        match (status.code(), status.signal()) {
            (Some(code), _) => ExitStatus { code, signal: None },
            (None, Some(signal)) => ExitStatus {
                code: 128 + signal,
                signal: Some(signal),
            },
            (None, None) => ExitStatus {
                code: 1,
                signal: None,
            },
        }
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.signal {
            Some(signal) => write!(f, "signal {} (code {})", signal, self.code),
            None => write!(f, "exit code {}", self.code),
        }
    }
}

/// Output from an exited container
///
/// Much like [std::process::Output]
#[derive(Clone, Eq, PartialEq)]
pub struct Output {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl Output {
    /// Convert the stdout to utf8 if possible
    ///
    /// Equivalent to `String::from_utf8_lossy(output.stdout)`
    pub fn stdout_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }

    /// Convert the stderr to utf8 if possible
    ///
    /// Equivalent to `String::from_utf8_lossy(output.stderr)`
    pub fn stderr_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stderr)
    }
}

impl fmt::Debug for Output {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Output")
            .field("status", &self.status)
            .field("stdout", &self.stdout_str())
            .field("stderr", &self.stderr_str())
            .finish()
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Container")
            .field("command", &self.command)
            .field("pid", &self.child.id())
            .field("root", &self.root.path())
            .field("state", &self.state)
            .finish()
    }
}

/// Copy one stream to another as bytes arrive, flushing after every chunk
///
/// If the destination goes away with a broken pipe, the rest of the source is
/// read and discarded so the child never blocks on a full pipe.
async fn relay<R, W>(mut from: R, mut to: W) -> io::Result<W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; 8192];
    loop {
        let len = from.read(&mut buf).await?;
        if len == 0 {
            break;
        }
        let written = match to.write_all(&buf[..len]).await {
            Ok(()) => to.flush().await,
            Err(e) => Err(e),
        };
        match written {
            Ok(()) => (),
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                log::trace!("relay destination closed, discarding the rest");
                tokio::io::copy(&mut from, &mut tokio::io::sink()).await?;
                break;
            }
            Err(e) => return Err(e),
        }
    }
    Ok(to)
}

fn relay_task<R, W>(from: Option<R>, to: W) -> JoinHandle<io::Result<W>>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    task::spawn(async move {
        match from {
            Some(from) => relay(from, to).await,
            None => Ok(to),
        }
    })
}

impl Container {
    /// Prepare to run `command` in a new sandbox
    ///
    /// A command without a `/` is looked up in `$PATH` on the host, then
    /// staged into the sandbox root at that same absolute path.
    pub fn new<S: Into<String>>(command: S) -> ContainerBuilder {
        ContainerBuilder::new(command.into())
    }

    pub(crate) fn from_parts(
        command: String,
        mut child: Child,
        root: SandboxRoot,
        state: LaunchState,
    ) -> Self {
        Container {
            stdout: child.stdout.take(),
            stderr: child.stderr.take(),
            command,
            child,
            root,
            state,
        }
    }

    /// Process ID of the child, as seen from the launcher
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn state(&self) -> &LaunchState {
        &self.state
    }

    /// Wait for the container to finish running, while relaying its output
    ///
    /// Any stdout or stderr stream which hasn't been taken from the
    /// [Container] is forwarded to the launcher's own stdout or stderr as it
    /// arrives.
    pub async fn interact(self) -> Result<ExitStatus, SandboxError> {
        log::trace!("interact starting");
        let (status, _, _) = self
            .complete(tokio::io::stdout(), tokio::io::stderr())
            .await?;
        log::trace!("interact finished, {}", status);
        Ok(status)
    }

    /// Capture the container's output and wait for it to finish
    ///
    /// This will capture stderr and stdout if they have not been
    /// taken from the [Container].
    pub async fn output(self) -> Result<Output, SandboxError> {
        log::trace!("output wait starting");
        let (status, stdout, stderr) = self.complete(Vec::new(), Vec::new()).await?;
        let result = Output {
            status,
            stdout,
            stderr,
        };
        log::trace!("output wait complete -> {:?}", result);
        Ok(result)
    }

    async fn complete<O, E>(
        self,
        stdout_to: O,
        stderr_to: E,
    ) -> Result<(ExitStatus, O, E), SandboxError>
    where
        O: AsyncWrite + Unpin + Send + 'static,
        E: AsyncWrite + Unpin + Send + 'static,
    {
        let Container {
            stdout,
            stderr,
            command,
            mut child,
            root,
            mut state,
        } = self;

        let stdout = relay_task(stdout, stdout_to);
        let stderr = relay_task(stderr, stderr_to);

        let status = child.wait().await;
        log::trace!("waiting for stdout/stderr");
        let (stdout, stderr) = tokio::join!(stdout, stderr);

        if let Ok(status) = &status {
            state.advance(LaunchState::Exited((*status).into()));
        }
        if let Err(err) = root.remove() {
            log::warn!("failed to remove sandbox root: {}", err);
        }
        state.advance(LaunchState::Cleaned);

        let status = status.map_err(|source| SandboxError::WaitFailed { command, source })?;
        let stdout = stdout?.map_err(SandboxError::RelayFailed)?;
        let stderr = stderr?.map_err(SandboxError::RelayFailed)?;
        Ok((status.into(), stdout, stderr))
    }
}
