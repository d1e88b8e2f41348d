//! Staging a throwaway root filesystem for one command
//!
//! The root only ever holds what the command needs to start: a copy of the
//! executable at its original path, and an empty `/dev/null` for programs
//! that redirect into it.

use crate::errors::SandboxError;
use std::{
    env,
    fs,
    fs::{File, OpenOptions},
    io,
    os::unix::fs::{OpenOptionsExt, PermissionsExt},
    path::{Component, Path, PathBuf},
};

/// An ephemeral directory owned by exactly one launch
///
/// The directory is removed recursively by [SandboxRoot::remove()], or when
/// the value is dropped if that never happened. Removal failures are logged
/// and otherwise ignored, so they can't mask whatever result the launch had.
#[derive(Debug)]
pub struct SandboxRoot {
    path: PathBuf,
    removed: bool,
}

impl SandboxRoot {
    /// Create a fresh, empty directory under the system temp directory
    pub fn create() -> Result<Self, SandboxError> {
        let mut path = env::temp_dir();
        path.push(format!(
            "minibox-root-{}-{}",
            std::process::id(),
            rand::random::<u64>()
        ));
        fs::create_dir(&path).map_err(|source| SandboxError::RootSetupFailed {
            path: path.clone(),
            source,
        })?;
        log::debug!("created sandbox root {:?}", path);
        Ok(SandboxRoot {
            path,
            removed: false,
        })
    }

    /// Take ownership of an existing empty directory
    ///
    /// It will be removed along with everything inside it when this
    /// [SandboxRoot] is done. A directory that already has entries is
    /// refused and left alone.
    pub fn adopt(path: &Path) -> Result<Self, SandboxError> {
        let setup_failed = |source| SandboxError::RootSetupFailed {
            path: path.to_path_buf(),
            source,
        };
        if !path.is_dir() {
            return Err(setup_failed(io::Error::new(
                io::ErrorKind::NotFound,
                "not a directory",
            )));
        }
        if fs::read_dir(path).map_err(setup_failed)?.next().is_some() {
            return Err(setup_failed(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "directory is not empty",
            )));
        }
        log::debug!("adopted sandbox root {:?}", path);
        Ok(SandboxRoot {
            path: path.to_path_buf(),
            removed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Recursively remove the root
    ///
    /// A root that is already gone counts as removed.
    pub fn remove(mut self) -> io::Result<()> {
        self.removed = true;
        remove_tree(&self.path)
    }
}

impl Drop for SandboxRoot {
    fn drop(&mut self) {
        if !self.removed {
            if let Err(err) = remove_tree(&self.path) {
                log::warn!("failed to remove sandbox root {:?}: {}", self.path, err);
            }
        }
    }
}

fn remove_tree(path: &Path) -> io::Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => {
            log::debug!("removed sandbox root {:?}", path);
            Ok(())
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

/// Find the executable for a command, the way `execvp()` would
///
/// Commands containing a slash are used as-is. Bare names are searched for in
/// `$PATH`, and the first regular file found wins.
pub fn resolve_command(command: &str) -> PathBuf {
    if command.contains('/') {
        return PathBuf::from(command);
    }
    if let Some(paths) = env::var_os("PATH") {
        for dir in env::split_paths(&paths) {
            let candidate = dir.join(command);
            if candidate.is_file() {
                log::trace!("resolved {:?} to {:?}", command, candidate);
                return candidate;
            }
        }
    }
    PathBuf::from(command)
}

/// The path of a command relative to the sandbox root
///
/// Leading `/` and `.` components are dropped; `..` is refused since it would
/// point outside the root.
pub fn path_in_root(command: &Path) -> Result<PathBuf, SandboxError> {
    let mut relative = PathBuf::new();
    for component in command.components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::RootDir | Component::CurDir | Component::Prefix(_) => (),
            Component::ParentDir => {
                return Err(SandboxError::InvalidArgument(
                    command.to_string_lossy().into_owned(),
                ))
            }
        }
    }
    if relative.as_os_str().is_empty() {
        return Err(SandboxError::InvalidArgument(
            command.to_string_lossy().into_owned(),
        ));
    }
    Ok(relative)
}

/// Stage everything a command needs into `root`
///
/// Returns the absolute path of the staged executable as seen from inside the
/// root. Nothing here is retried; any error means the root must not be used.
pub fn prepare(command: &Path, root: &Path) -> Result<PathBuf, SandboxError> {
    let relative = stage_executable(command, root)?;
    create_device_nodes(root)?;
    Ok(Path::new("/").join(relative))
}

/// Copy an executable into `root` at the same relative path, keeping its mode
///
/// Both files are closed before this returns, on success and on failure.
pub fn stage_executable(command: &Path, root: &Path) -> Result<PathBuf, SandboxError> {
    if !root.is_dir() {
        return Err(SandboxError::RootSetupFailed {
            path: root.to_path_buf(),
            source: io::Error::new(io::ErrorKind::NotFound, "sandbox root does not exist"),
        });
    }

    let relative = path_in_root(command)?;
    let dest = root.join(&relative);
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|source| SandboxError::RootSetupFailed {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let source_unavailable = |source| SandboxError::SourceUnavailable {
        path: command.to_path_buf(),
        source,
    };
    let mut src = File::open(command).map_err(source_unavailable)?;
    let metadata = src.metadata().map_err(source_unavailable)?;
    if !metadata.is_file() {
        return Err(source_unavailable(io::Error::new(
            io::ErrorKind::InvalidInput,
            "not a regular file",
        )));
    }
    let mode = metadata.permissions().mode() & 0o7777;

    let copy_failed = |source| SandboxError::CopyFailed {
        from: command.to_path_buf(),
        to: dest.clone(),
        source,
    };
    let mut dst = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(mode)
        .open(&dest)
        .map_err(copy_failed)?;

    let bytes = io::copy(&mut src, &mut dst).map_err(copy_failed)?;

    // The umask may have stripped bits from the mode given at creation
    dst.set_permissions(fs::Permissions::from_mode(mode))
        .map_err(copy_failed)?;
    dst.sync_all().map_err(copy_failed)?;

    log::debug!(
        "staged {:?} -> {:?}, {} bytes, mode {:o}",
        command,
        dest,
        bytes,
        mode
    );
    Ok(relative)
}

/// Create `dev/` and an empty `dev/null` regular file inside `root`
///
/// An existing `dev` directory is fine.
pub fn create_device_nodes(root: &Path) -> Result<(), SandboxError> {
    let dev = root.join("dev");
    match fs::create_dir(&dev) {
        Err(err) if err.kind() != io::ErrorKind::AlreadyExists => {
            return Err(SandboxError::DeviceSetupFailed {
                path: dev,
                source: err,
            })
        }
        _ => (),
    }

    let null = dev.join("null");
    File::create(&null).map_err(|source| SandboxError::DeviceSetupFailed {
        path: null.clone(),
        source,
    })?;
    log::trace!("created {:?}", null);
    Ok(())
}
