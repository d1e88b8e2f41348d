//! Error types you might see while setting up or running a sandboxed command

use std::{io, path::PathBuf};
use thiserror::Error;

/// Errors from preparing the sandbox root or launching the command inside it
#[derive(Error, Debug)]
pub enum SandboxError {
    /// source executable is missing or unreadable
    #[error("source executable {path:?} is unavailable: {source}")]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// i/o error while copying the executable into the sandbox root
    #[error("failed to copy {from:?} to {to:?}: {source}")]
    CopyFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    /// could not create the sandbox root or a directory inside it
    #[error("failed to create directory {path:?}: {source}")]
    RootSetupFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// could not create the minimal device files
    #[error("failed to create {path:?}: {source}")]
    DeviceSetupFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// namespace or root-change syscall failed
    #[error("{operation} failed: {source}")]
    IsolationFailed {
        operation: &'static str,
        #[source]
        source: io::Error,
    },

    /// the child process could not be started
    #[error("failed to launch {command:?}: {source}")]
    LaunchFailed {
        command: String,
        #[source]
        source: io::Error,
    },

    /// waiting for the child process failed
    #[error("failed waiting for {command:?}: {source}")]
    WaitFailed {
        command: String,
        #[source]
        source: io::Error,
    },

    /// an output relay task failed
    #[error("output relay failed: {0}")]
    RelayFailed(#[source] io::Error),

    /// an output relay task did not finish
    #[error("output relay task failed: {0}")]
    RelayJoin(#[from] tokio::task::JoinError),

    /// command or argument can't be passed to the child
    #[error("invalid argument: {0:?}")]
    InvalidArgument(String),
}

impl SandboxError {
    /// Is this a permission problem that running as root would fix?
    ///
    /// Namespace creation and `chroot` both need elevated privileges, so a
    /// caller can use this to print something more useful than the errno.
    pub fn requires_privilege(&self) -> bool {
        match self {
            SandboxError::IsolationFailed { source, .. } => matches!(
                source.raw_os_error(),
                Some(libc::EPERM) | Some(libc::EACCES)
            ),
            _ => false,
        }
    }
}

/// Errors from talking to an image registry
#[derive(Error, Debug)]
pub enum RegistryError {
    /// token endpoint unreachable, refused, or sent something we can't parse
    #[error("authentication unavailable: {0}")]
    AuthUnavailable(#[source] reqwest::Error),

    /// image reference has no tag separator
    #[error("invalid image reference format: {0:?}")]
    InvalidReference(String),

    /// manifest endpoint unreachable or refused
    #[error("manifest unavailable: {0}")]
    ManifestUnavailable(#[source] reqwest::Error),

    /// manifest body is not the json we expect
    #[error("manifest parse error: {0}")]
    ManifestParseError(#[from] serde_json::Error),

    /// http client could not be constructed
    #[error("registry client setup failed: {0}")]
    ClientSetup(#[source] reqwest::Error),

    /// configured url is not usable
    #[error("invalid registry url {0:?}")]
    InvalidUrl(String),
}
