use crate::errors::SandboxError;
use std::{
    ffi::CString,
    io,
    os::unix::{ffi::OsStrExt, process::CommandExt},
    path::Path,
    process::Command,
    thread,
};
use tokio::{process::Child, runtime::Handle, sync::oneshot};

/// Which isolation primitives to apply to the child
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Isolation {
    /// Start the child as PID 1 in a new PID namespace
    pub pid_namespace: bool,
    /// Change the child's root directory to the sandbox root before exec
    pub chroot: bool,
}

impl Default for Isolation {
    fn default() -> Self {
        Isolation {
            pid_namespace: true,
            chroot: true,
        }
    }
}

/// Arrange for the child to `chroot()` into `root` between fork and exec
///
/// The launcher itself keeps its own root, so it can still clean up
/// afterwards. Path lookup for the program happens after this runs, so the
/// child only ever resolves paths inside the new root.
pub(crate) fn enter_root(cmd: &mut Command, root: &Path) -> Result<(), SandboxError> {
    let root = CString::new(root.as_os_str().as_bytes())
        .map_err(|_| SandboxError::InvalidArgument(root.to_string_lossy().into_owned()))?;
    let slash: &'static [u8] = b"/\0";
    unsafe {
        cmd.pre_exec(move || {
            if libc::chroot(root.as_ptr()) != 0 {
                return Err(io::Error::last_os_error());
            }
            if libc::chdir(slash.as_ptr() as *const libc::c_char) != 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        });
    }
    Ok(())
}

fn unshare_pid_namespace() -> Result<(), SandboxError> {
    if unsafe { libc::unshare(libc::CLONE_NEWPID) } != 0 {
        return Err(SandboxError::IsolationFailed {
            operation: "unshare(CLONE_NEWPID)",
            source: io::Error::last_os_error(),
        });
    }
    Ok(())
}

fn spawn_error(label: &str, chroot: bool, err: io::Error) -> SandboxError {
    // Errors from the pre_exec hook come back through spawn(). execve()
    // reports permission problems as EACCES, so EPERM here is the chroot.
    if chroot && err.raw_os_error() == Some(libc::EPERM) {
        SandboxError::IsolationFailed {
            operation: "chroot",
            source: err,
        }
    } else {
        SandboxError::LaunchFailed {
            command: label.to_owned(),
            source: err,
        }
    }
}

/// Spawn `cmd` with the requested isolation
///
/// `unshare(CLONE_NEWPID)` only changes the namespace that the calling
/// thread's future children are born into, so it runs on a throwaway thread
/// which forks the child and then exits. No other thread in the launcher is
/// affected, and the first child forked there becomes PID 1.
pub(crate) async fn spawn(
    cmd: Command,
    label: &str,
    isolation: &Isolation,
) -> Result<Child, SandboxError> {
    let handle = Handle::current();
    let (sender, receiver) = oneshot::channel();
    let pid_namespace = isolation.pid_namespace;
    let chroot = isolation.chroot;
    let thread_label = label.to_owned();

    thread::Builder::new()
        .name("minibox-spawn".to_string())
        .spawn(move || {
            let _runtime = handle.enter();
            let result = if pid_namespace {
                unshare_pid_namespace()
            } else {
                Ok(())
            }
            .and_then(|()| {
                let mut cmd = tokio::process::Command::from(cmd);
                cmd.kill_on_drop(true);
                cmd.spawn()
                    .map_err(|err| spawn_error(&thread_label, chroot, err))
            });
            let _ = sender.send(result);
        })
        .map_err(|source| SandboxError::LaunchFailed {
            command: label.to_owned(),
            source,
        })?;

    match receiver.await {
        Ok(result) => result,
        Err(_) => Err(SandboxError::LaunchFailed {
            command: label.to_owned(),
            source: io::Error::new(io::ErrorKind::Other, "spawn thread exited early"),
        }),
    }
}
