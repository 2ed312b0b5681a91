use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, trace};
use tokio::process::{Child, Command as TokioCommand};
use tokio::time::timeout;

use crate::process::watch::{Watch, WatchConfig, execute_watch};
use crate::process::{ProcessError, ProcessResult};

/// How often [`ProcessHandle::wait`] checks whether the process has exited
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Command wrapper for process execution
#[derive(Debug, Clone)]
pub struct Command {
    /// Program to execute
    program: String,

    /// Arguments to pass to the program
    args: Vec<String>,

    /// Current working directory
    current_dir: Option<PathBuf>,

    /// Environment variables
    env_vars: HashMap<String, String>,
}

impl Command {
    /// Create a new command
    pub fn new<S: Into<String>>(program: S) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            env_vars: HashMap::new(),
        }
    }

    /// Add an argument
    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for arg in args {
            self.args.push(arg.into());
        }
        self
    }

    /// Set the current working directory
    pub fn current_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Add an environment variable
    pub fn env<K, V>(mut self, key: K, val: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.env_vars.insert(key.into(), val.into());
        self
    }

    /// Add multiple environment variables
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, val) in vars {
            self.env_vars.insert(key.into(), val.into());
        }
        self
    }

    /// Program name
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments passed to the program
    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    /// Build the tokio command with the configured stdio
    pub(crate) fn to_tokio(&self, stdout: Stdio, stderr: Stdio) -> TokioCommand {
        let mut cmd = TokioCommand::new(&self.program);
        cmd.args(&self.args);

        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }

        for (key, val) in &self.env_vars {
            cmd.env(key, val);
        }

        cmd.stdin(Stdio::null()).stdout(stdout).stderr(stderr);
        cmd
    }

    /// Spawn the command and stream its output to the callbacks in `config`.
    ///
    /// Must be called from within a tokio runtime. Returns as soon as the
    /// process and its watchers are running.
    pub fn watch(&self, config: WatchConfig) -> ProcessResult<Watch> {
        execute_watch(config, self)
    }

    /// Run the command to completion and return its standard output followed
    /// by its standard error as text.
    pub async fn output(&self) -> ProcessResult<String> {
        debug!("Running command to completion: {} {:?}", self.program, self.args);

        let output = self
            .to_tokio(Stdio::piped(), Stdio::piped())
            .output()
            .await
            .map_err(ProcessError::SpawnError)?;

        if !output.status.success() {
            return Err(ProcessError::NonZeroExit(output.status));
        }

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(text)
    }
}

/// Run `program` with `args` to completion and return everything it printed
pub async fn execute<I, S>(program: &str, args: I) -> ProcessResult<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Command::new(program).args(args).output().await
}

struct ProcessInner {
    /// Child process
    child: Mutex<Child>,

    /// OS process id, captured at spawn
    pid: Option<u32>,

    /// Program name
    program: String,

    /// Arguments
    args: Vec<String>,
}

/// Handle to a running process, shared between the caller and the watchers.
///
/// The child is only ever locked for non-blocking operations, so a pending
/// kill request is never held up by someone waiting for the exit status.
#[derive(Clone)]
pub struct ProcessHandle {
    inner: Arc<ProcessInner>,
}

impl std::fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("pid", &self.inner.pid)
            .field("program", &self.inner.program)
            .field("args", &self.inner.args)
            .finish()
    }
}

impl ProcessHandle {
    pub(crate) fn new(child: Child, command: &Command) -> Self {
        Self {
            inner: Arc::new(ProcessInner {
                pid: child.id(),
                child: Mutex::new(child),
                program: command.program.clone(),
                args: command.args.clone(),
            }),
        }
    }

    fn child(&self) -> ProcessResult<MutexGuard<'_, Child>> {
        self.inner
            .child
            .lock()
            .map_err(|_| ProcessError::Other("Lock poisoned".to_string()))
    }

    /// OS process id
    pub fn id(&self) -> Option<u32> {
        self.inner.pid
    }

    /// Program name
    pub fn program(&self) -> &str {
        &self.inner.program
    }

    /// Arguments the program was started with
    pub fn args(&self) -> &[String] {
        &self.inner.args
    }

    /// Send a kill signal to the process without waiting for it to exit
    pub fn kill(&self) -> ProcessResult<()> {
        trace!("Killing process {} ({:?})", self.inner.program, self.inner.pid);
        self.child()?.start_kill().map_err(|e| {
            ProcessError::ProcessKilled(format!("Failed to kill process: {}", e))
        })
    }

    /// Return the exit status if the process has already exited
    pub fn try_wait(&self) -> ProcessResult<Option<ExitStatus>> {
        self.child()?.try_wait().map_err(ProcessError::SpawnError)
    }

    /// Wait for the process to exit
    pub async fn wait(&self) -> ProcessResult<ExitStatus> {
        let mut interval = tokio::time::interval(WAIT_POLL_INTERVAL);
        loop {
            interval.tick().await;
            if let Some(status) = self.try_wait()? {
                debug!("Process {} exited with {}", self.inner.program, status);
                return Ok(status);
            }
        }
    }

    /// Wait for the process to exit with a timeout
    pub async fn wait_with_timeout(&self, timeout_duration: Duration) -> ProcessResult<ExitStatus> {
        match timeout(timeout_duration, self.wait()).await {
            Ok(result) => result,
            Err(_) => Err(ProcessError::Timeout(timeout_duration)),
        }
    }
}
