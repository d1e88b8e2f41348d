use crate::{
    container::{isolation, isolation::Isolation, Container, LaunchState},
    errors::SandboxError,
    rootfs,
    rootfs::SandboxRoot,
};
use std::{
    os::unix::process::CommandExt,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

/// Setup for containers, starting at [Container::new()] and ending with
/// [ContainerBuilder::spawn()]
#[derive(Clone, Debug)]
pub struct ContainerBuilder {
    command: String,
    args: Vec<String>,
    root: Option<PathBuf>,
    isolation: Isolation,
    arg_error: Result<(), String>,
}

fn check_arg(arg: &str) -> Result<(), String> {
    if arg.contains('\0') {
        Err(arg.to_owned())
    } else {
        Ok(())
    }
}

impl ContainerBuilder {
    pub(crate) fn new(command: String) -> Self {
        ContainerBuilder {
            arg_error: check_arg(&command),
            command,
            args: Vec::new(),
            root: None,
            isolation: Isolation::default(),
        }
    }

    /// Append one argument, passed to the command after its own name
    pub fn arg<S: AsRef<str>>(mut self, arg: S) -> Self {
        let arg = arg.as_ref();
        if self.arg_error.is_ok() {
            self.arg_error = check_arg(arg);
        }
        self.args.push(arg.to_owned());
        self
    }

    /// Append several arguments, in order
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for arg in args {
            self = self.arg(arg);
        }
        self
    }

    /// Use an existing empty directory as the sandbox root
    ///
    /// By default a fresh directory is created under the system temp
    /// directory. Either way, the directory is removed when the container is
    /// done.
    pub fn root(mut self, path: &Path) -> Self {
        self.root = Some(path.to_path_buf());
        self
    }

    /// Start the command in its own PID namespace (default: yes)
    pub fn pid_namespace(mut self, enabled: bool) -> Self {
        self.isolation.pid_namespace = enabled;
        self
    }

    /// Change the command's root directory to the sandbox root (default: yes)
    ///
    /// Without this the staged copy is still the one that runs, but it sees
    /// the host filesystem.
    pub fn chroot(mut self, enabled: bool) -> Self {
        self.isolation.chroot = enabled;
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    /// Stage the sandbox root and start a new [Container]
    ///
    /// Any failure before the child is running removes the root again before
    /// returning the error.
    pub async fn spawn(self) -> Result<Container, SandboxError> {
        if let Err(arg) = &self.arg_error {
            return Err(SandboxError::InvalidArgument(arg.clone()));
        }

        let mut state = LaunchState::Created;
        let root = match &self.root {
            Some(path) => SandboxRoot::adopt(path)?,
            None => SandboxRoot::create()?,
        };

        let launched = self.launch(&root, &mut state).await;
        match launched {
            Ok(child) => Ok(Container::from_parts(self.command, child, root, state)),
            Err(err) => {
                state.advance(LaunchState::LaunchFailed);
                if let Err(cleanup_err) = root.remove() {
                    log::warn!("failed to remove sandbox root: {}", cleanup_err);
                }
                state.advance(LaunchState::Cleaned);
                Err(err)
            }
        }
    }

    async fn launch(
        &self,
        root: &SandboxRoot,
        state: &mut LaunchState,
    ) -> Result<tokio::process::Child, SandboxError> {
        let source = rootfs::resolve_command(&self.command);
        let staged = rootfs::prepare(&source, root.path())?;
        state.advance(LaunchState::Staged);

        let program = if self.isolation.chroot {
            staged
        } else {
            root.path().join(rootfs::path_in_root(&staged)?)
        };

        let mut cmd = Command::new(&program);
        cmd.arg0(&self.command)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if self.isolation.chroot {
            isolation::enter_root(&mut cmd, root.path())?;
        } else {
            cmd.current_dir(root.path());
        }
        state.advance(LaunchState::Isolated);

        log::debug!(
            "exec {:?} as {:?} args={:?} isolation={:?}",
            program,
            self.command,
            self.args,
            self.isolation
        );
        let child = isolation::spawn(cmd, &self.command, &self.isolation).await?;
        state.advance(LaunchState::Running);
        Ok(child)
    }
}
