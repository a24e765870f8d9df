//! Invoking the go command
//!
//! [`Invoker::invoke`] runs `go <verb> <args...>` as a child process, waits
//! for it, and returns its stdout. It implicitly assumes the command was
//! invoked with `-json`, so stdout carries data and stderr diagnostics.
//!
//! - A non-zero exit status or a launch failure yields an [`InvokeError`]
//!   holding the argv, the whole stderr and, if it was not empty, stdout.
//! - A zero exit status yields stdout. Stderr is ignored, unless debug mode is
//!   on, in which case it is logged.

use crate::error::{Failure, InvokeError};
use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, info};

/// Program invoked when no override is configured
pub const DEFAULT_PROGRAM: &str = "go";

/// Non-empty value enables debug mode
pub const DEBUG_ENV: &str = "GOCMDDEBUG";

/// Overrides the program to invoke
pub const PROGRAM_ENV: &str = "GOCMD_GO";

/// Timeout in whole seconds for each invocation
pub const TIMEOUT_ENV: &str = "GOCMD_TIMEOUT_SECS";

/// Invoker configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokerConfig {
    /// Program to run, `go` unless overridden
    pub program: String,
    /// Log stderr of successful invocations
    pub debug: bool,
    /// Kill the child and fail if it runs longer than this
    pub timeout: Option<Duration>,
}

impl Default for InvokerConfig {
    fn default() -> Self {
        InvokerConfig {
            program: std::env::var(PROGRAM_ENV)
                .ok()
                .filter(|p| !p.is_empty())
                .unwrap_or_else(|| DEFAULT_PROGRAM.to_string()),
            debug: std::env::var_os(DEBUG_ENV).is_some_and(|v| !v.is_empty()),
            timeout: std::env::var(TIMEOUT_ENV)
                .ok()
                .and_then(|s| s.trim().parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
        }
    }
}

impl InvokerConfig {
    /// Create a new config from environment variables
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Create a config for a specific program, ignoring the environment
    pub fn new(program: &str) -> Self {
        InvokerConfig {
            program: program.to_string(),
            debug: false,
            timeout: None,
        }
    }

    /// Set debug mode
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Set the invocation timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Attributes applied to the child process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attr {
    /// Environment of the child. `None` inherits the current process
    /// environment; `Some` replaces it entirely.
    pub env: Option<BTreeMap<String, String>>,

    /// Variables set on top of the child environment, whether inherited or
    /// replaced through `env`. Names and values need not be Unicode.
    pub vars: BTreeMap<OsString, OsString>,

    /// Working directory of the child. `None` inherits the current directory.
    pub dir: Option<PathBuf>,
}

/// A single request to run the go command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    verb: String,
    args: Vec<String>,
    attr: Attr,
}

impl Invocation {
    pub fn new(verb: impl Into<String>) -> Self {
        Invocation {
            verb: verb.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Replace the child environment
    pub fn env(mut self, env: BTreeMap<String, String>) -> Self {
        self.attr.env = Some(env);
        self
    }

    /// Set a single variable on top of the child environment
    pub fn env_var(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.attr.vars.insert(key.into(), value.into());
        self
    }

    /// Run the child in `dir`
    pub fn dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.attr.dir = Some(dir.into());
        self
    }

    /// Apply every attribute set in `attr`
    pub fn attr(mut self, attr: &Attr) -> Self {
        if let Some(env) = &attr.env {
            self.attr.env = Some(env.clone());
        }
        self.attr
            .vars
            .extend(attr.vars.iter().map(|(k, v)| (k.clone(), v.clone())));
        if let Some(dir) = &attr.dir {
            self.attr.dir = Some(dir.clone());
        }
        self
    }

    pub fn verb(&self) -> &str {
        &self.verb
    }

    pub fn args_slice(&self) -> &[String] {
        &self.args
    }

    pub fn env_override(&self) -> Option<&BTreeMap<String, String>> {
        self.attr.env.as_ref()
    }

    pub fn env_vars(&self) -> impl Iterator<Item = (&OsStr, &OsStr)> {
        self.attr.vars.iter().map(|(k, v)| (k.as_os_str(), v.as_os_str()))
    }

    pub fn working_dir(&self) -> Option<&Path> {
        self.attr.dir.as_deref()
    }

    /// Full argument vector: verb followed by the arguments
    pub fn argv(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.args.len() + 1);
        argv.push(self.verb.clone());
        argv.extend(self.args.iter().cloned());
        argv
    }
}

/// Runs the go command
#[derive(Debug, Clone, Default)]
pub struct Invoker {
    config: InvokerConfig,
}

impl Invoker {
    pub fn new(config: InvokerConfig) -> Self {
        Invoker { config }
    }

    /// Create an invoker configured from environment variables
    pub fn from_env() -> Self {
        Self::new(InvokerConfig::from_env())
    }

    pub fn config(&self) -> &InvokerConfig {
        &self.config
    }

    /// Check whether the configured program can be run (`go version`)
    pub async fn available(&self) -> bool {
        Command::new(&self.config.program)
            .arg("version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Run the command described by `invocation` and return its stdout.
    pub async fn invoke(&self, invocation: &Invocation) -> Result<Vec<u8>, InvokeError> {
        let program = &self.config.program;
        let argv = invocation.argv();
        debug!(program = %program, argv = ?argv, "invoking go command");

        let mut cmd = Command::new(program);
        cmd.args(&argv)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = invocation.working_dir() {
            cmd.current_dir(dir);
        }
        if let Some(env) = invocation.env_override() {
            cmd.env_clear().envs(env);
        }
        cmd.envs(invocation.env_vars());

        let fail = |stdout: Vec<u8>, stderr: Vec<u8>, failure: Failure| {
            InvokeError::new(program.clone(), argv.clone(), stdout, stderr, failure)
        };

        let mut child = cmd
            .spawn()
            .map_err(|err| fail(Vec::new(), Vec::new(), Failure::Spawn(err)))?;

        // Output read before a timeout is kept for the error.
        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let run = async {
            tokio::try_join!(
                drain(stdout_pipe, &mut stdout),
                drain(stderr_pipe, &mut stderr),
                child.wait(),
            )
            .map(|(_, _, status)| status)
            .map_err(Failure::Wait)
        };
        let outcome = match self.config.timeout {
            Some(limit) => tokio::time::timeout(limit, run)
                .await
                .unwrap_or(Err(Failure::TimedOut(limit))),
            None => run.await,
        };

        let status = match outcome {
            Ok(status) => status,
            Err(failure) => {
                if let Err(err) = child.kill().await {
                    debug!(error = %err, "failed to kill go command");
                }
                return Err(fail(stdout, stderr, failure));
            }
        };

        debug!(
            status = %status,
            stdout_bytes = stdout.len(),
            stderr_bytes = stderr.len(),
            "go command finished"
        );

        if !status.success() {
            return Err(fail(stdout, stderr, Failure::Status(status)));
        }

        if !stderr.is_empty() && self.config.debug {
            let stderr = String::from_utf8_lossy(&stderr);
            info!(
                program = %program,
                argv = %argv.join(" "),
                stderr = %stderr.trim_end(),
                "go command stderr"
            );
        }

        Ok(stdout)
    }
}

/// Read `pipe` to the end, appending to `buf` as data arrives.
async fn drain<R: AsyncRead + Unpin>(pipe: Option<R>, buf: &mut Vec<u8>) -> io::Result<()> {
    let Some(mut pipe) = pipe else {
        return Ok(());
    };
    while pipe.read_buf(buf).await? != 0 {}
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tracing_test::traced_test;

    fn sh() -> Invoker {
        Invoker::new(InvokerConfig::new("/bin/sh"))
    }

    fn script(body: &str) -> Invocation {
        Invocation::new("-c").arg(body)
    }

    #[test]
    fn test_argv_prepends_verb() {
        let inv = Invocation::new("list").args(["-json", "flag"]);
        assert_eq!(inv.argv(), vec!["list", "-json", "flag"]);
        assert_eq!(inv.verb(), "list");
        assert_eq!(inv.args_slice(), ["-json", "flag"]);
    }

    #[test]
    fn test_attr_only_overrides_what_is_set() {
        let attr = Attr {
            dir: Some(PathBuf::from("/tmp")),
            ..Default::default()
        };
        let inv = Invocation::new("env").attr(&attr);
        assert_eq!(inv.working_dir(), Some(Path::new("/tmp")));
        assert!(inv.env_override().is_none());
    }

    #[test]
    fn test_attr_vars_are_merged() {
        let mut attr = Attr::default();
        attr.vars.insert("GOENV".into(), "/tmp/goenv".into());

        let inv = Invocation::new("env").env_var("GOFLAGS", "-mod=mod").attr(&attr);
        let vars: Vec<_> = inv.env_vars().collect();
        assert_eq!(
            vars,
            [
                (OsStr::new("GOENV"), OsStr::new("/tmp/goenv")),
                (OsStr::new("GOFLAGS"), OsStr::new("-mod=mod")),
            ]
        );
    }

    #[test]
    fn test_config_new_ignores_environment() {
        let config = InvokerConfig::new("go1.22");
        assert_eq!(config.program, "go1.22");
        assert!(!config.debug);
        assert!(config.timeout.is_none());
    }

    #[tokio::test]
    async fn test_success_with_stderr_returns_stdout() {
        let stdout = sh()
            .invoke(&script("printf '{}'; echo 'go: downloading' >&2"))
            .await
            .expect("zero exit must succeed");
        assert_eq!(stdout, b"{}");
    }

    #[tokio::test]
    async fn test_success_with_empty_stdout() {
        let stdout = sh().invoke(&script("true")).await.unwrap();
        assert!(stdout.is_empty());
    }

    #[tokio::test]
    async fn test_failure_records_argv_and_stderr() {
        let body = "echo 'malformed module path' >&2; exit 3";
        let err = sh().invoke(&script(body)).await.unwrap_err();

        assert_eq!(err.argv(), ["-c", body]);
        assert_eq!(err.stderr(), b"malformed module path\n");
        assert_eq!(err.exit_code(), Some(3));
        assert!(err.stdout().is_none());
        assert!(err.os_error().is_none());
        assert!(matches!(err.failure(), Failure::Status(_)));
    }

    #[tokio::test]
    async fn test_failure_keeps_partial_stdout() {
        let err = sh()
            .invoke(&script("printf '{\"Path\":\"a\"}'; exit 1"))
            .await
            .unwrap_err();
        assert_eq!(err.stdout(), Some(&b"{\"Path\":\"a\"}"[..]));
    }

    #[tokio::test]
    async fn test_launch_failure_unwraps_to_os_error() {
        let invoker = Invoker::new(InvokerConfig::new("gocmd-no-such-program"));
        let err = invoker.invoke(&Invocation::new("env")).await.unwrap_err();

        assert!(matches!(err.failure(), Failure::Spawn(_)));
        assert_eq!(
            err.os_error().map(|e| e.kind()),
            Some(std::io::ErrorKind::NotFound)
        );
        assert_eq!(err.argv(), ["env"]);
        assert!(!invoker.available().await);
    }

    #[tokio::test]
    async fn test_env_override_replaces_environment() {
        let mut env = BTreeMap::new();
        env.insert("GOCMD_MARKER".to_string(), "42".to_string());

        let inv = script("printf '%s|%s' \"$GOCMD_MARKER\" \"${HOME-}\"").env(env);
        let stdout = sh().invoke(&inv).await.unwrap();
        assert_eq!(stdout, b"42|");
    }

    #[tokio::test]
    async fn test_env_var_keeps_inherited_environment() {
        use std::os::unix::ffi::OsStrExt;

        std::env::set_var("GOCMD_RAW_VALUE", OsStr::from_bytes(b"a\xffb"));
        let inv = script("printf '%s|%s' \"$GOENV\" \"$GOCMD_RAW_VALUE\"")
            .env_var("GOENV", OsStr::from_bytes(b"/tmp/go\xfeenv"));
        let stdout = sh().invoke(&inv).await.unwrap();
        assert_eq!(stdout, b"/tmp/go\xfeenv|a\xffb");
    }

    #[tokio::test]
    async fn test_env_var_applies_over_replaced_environment() {
        let mut env = BTreeMap::new();
        env.insert("GOENV".to_string(), "/replaced".to_string());

        let inv = script("printf '%s' \"$GOENV\"").env(env).env_var("GOENV", "/overlay");
        let stdout = sh().invoke(&inv).await.unwrap();
        assert_eq!(stdout, b"/overlay");
    }

    #[tokio::test]
    async fn test_dir_override() {
        let dir = tempdir().unwrap();
        let stdout = sh().invoke(&script("pwd").dir(dir.path())).await.unwrap();

        let got = PathBuf::from(String::from_utf8(stdout).unwrap().trim());
        assert_eq!(
            got.canonicalize().unwrap(),
            dir.path().canonicalize().unwrap()
        );
    }

    #[tokio::test]
    async fn test_timeout_kills_child() {
        let invoker = Invoker::new(
            InvokerConfig::new("/bin/sh").with_timeout(Duration::from_millis(200)),
        );
        let err = invoker.invoke(&script("sleep 10")).await.unwrap_err();
        assert!(matches!(err.failure(), Failure::TimedOut(_)));
    }

    #[tokio::test]
    async fn test_timeout_keeps_captured_output() {
        let invoker = Invoker::new(
            InvokerConfig::new("/bin/sh").with_timeout(Duration::from_millis(500)),
        );
        let err = invoker
            .invoke(&script("printf '{}'; echo 'go: downloading x' >&2; sleep 10"))
            .await
            .unwrap_err();

        assert!(matches!(err.failure(), Failure::TimedOut(_)));
        assert_eq!(err.stderr_lossy(), "go: downloading x\n");
        assert_eq!(err.stdout(), Some(&b"{}"[..]));
    }

    #[traced_test]
    #[tokio::test]
    async fn test_debug_mode_logs_stderr_on_success() {
        let invoker = Invoker::new(InvokerConfig::new("/bin/sh").with_debug(true));
        invoker
            .invoke(&script("printf 'go: %s module\\n' finding >&2"))
            .await
            .unwrap();
        assert!(logs_contain("go command stderr"));
        assert!(logs_contain("argv=-c"));
        assert!(logs_contain("go: finding module"));
    }

    #[traced_test]
    #[tokio::test]
    async fn test_stderr_on_success_is_discarded_without_debug() {
        sh().invoke(&script("printf 'quiet %s\\n' note >&2"))
            .await
            .unwrap();
        assert!(!logs_contain("quiet note"));
    }
}
