//! Error types for gocmd

use std::borrow::Cow;
use std::fmt;
use std::io;
use std::process::ExitStatus;
use std::time::Duration;
use thiserror::Error;

/// Why a single invocation of the go command did not succeed.
#[derive(Error, Debug)]
pub enum Failure {
    /// The program could not be started (not found, permission denied, ...)
    #[error("failed to start: {0}")]
    Spawn(#[source] io::Error),

    /// Collecting the output or the exit status failed
    #[error("failed to wait: {0}")]
    Wait(#[source] io::Error),

    /// The program ran and exited with a non-zero status
    #[error("{0}")]
    Status(ExitStatus),

    /// The program did not exit before the configured timeout and was killed
    #[error("timed out after {0:?}")]
    TimedOut(Duration),
}

/// Error returned by the invoker when the go command fails.
///
/// The argv (verb first), stderr and any partial stdout are recorded as they
/// were captured at failure time.
#[derive(Debug)]
pub struct InvokeError {
    program: String,
    argv: Vec<String>,
    stderr: Vec<u8>,
    stdout: Option<Vec<u8>>,
    failure: Failure,
}

impl InvokeError {
    pub(crate) fn new(
        program: String,
        argv: Vec<String>,
        stdout: Vec<u8>,
        stderr: Vec<u8>,
        failure: Failure,
    ) -> Self {
        let stdout = if stdout.is_empty() { None } else { Some(stdout) };
        InvokeError {
            program,
            argv,
            stderr,
            stdout,
            failure,
        }
    }

    /// Name of the program that was invoked
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments passed to the program, verb first
    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    /// Entire stderr capture
    pub fn stderr(&self) -> &[u8] {
        &self.stderr
    }

    /// Stderr decoded as UTF-8, with invalid sequences replaced
    pub fn stderr_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stderr)
    }

    /// Stdout produced before the failure, if it was not empty
    pub fn stdout(&self) -> Option<&[u8]> {
        self.stdout.as_deref()
    }

    pub fn failure(&self) -> &Failure {
        &self.failure
    }

    /// Exit code of the program, when it ran to completion
    pub fn exit_code(&self) -> Option<i32> {
        match &self.failure {
            Failure::Status(status) => status.code(),
            _ => None,
        }
    }

    /// The underlying OS error, if the failure was caused by one
    pub fn os_error(&self) -> Option<&io::Error> {
        match &self.failure {
            Failure::Spawn(err) | Failure::Wait(err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for InvokeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.argv {
            write!(f, " {}", arg)?;
        }
        write!(f, ": {}", self.failure)?;

        let stderr = self.stderr_lossy();
        let stderr = stderr.trim_end();
        if !stderr.is_empty() {
            write!(f, ": {}", stderr)?;
        }

        Ok(())
    }
}

impl std::error::Error for InvokeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.failure)
    }
}

/// Stdout could not be decoded into the requested record shape.
#[derive(Error, Debug)]
#[error("JSON decode: value {index}: {source}")]
pub struct DecodeError {
    /// Zero-based position of the offending value in the stream
    pub index: usize,
    #[source]
    pub source: serde_json::Error,
}

/// Failure of one loader call, before it is tagged with the loader name.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error(transparent)]
    Invoke(#[from] InvokeError),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Environment operation that failed, used to tag [`GoCmdError::Env`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvOp {
    Read,
    Write,
    Unset(Vec<String>),
    Getenv(String),
    Setenv(String, String),
    Unsetenv(String),
}

impl fmt::Display for EnvOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvOp::Read => write!(f, "read"),
            EnvOp::Write => write!(f, "write"),
            EnvOp::Unset(vars) => write!(f, "unset {:?}", vars),
            EnvOp::Getenv(key) => write!(f, "getenv {:?}", key),
            EnvOp::Setenv(key, value) => write!(f, "setenv {:?}", format!("{key}={value}")),
            EnvOp::Unsetenv(key) => write!(f, "unsetenv {:?}", key),
        }
    }
}

/// Errors returned by the gocmd loaders
#[derive(Error, Debug)]
pub enum GoCmdError {
    /// go env failed
    #[error("env: {op}: {source}")]
    Env {
        op: EnvOp,
        #[source]
        source: LoadError,
    },

    /// go list -m failed
    #[error("modlist: load: {0}")]
    ModList(#[source] LoadError),

    /// go mod download failed
    #[error("modfetch: load: {0}")]
    ModFetch(#[source] LoadError),

    /// go list failed
    #[error("pkglist: load: {0}")]
    PkgList(#[source] LoadError),
}

impl GoCmdError {
    /// The untagged cause of this error
    pub fn load_error(&self) -> &LoadError {
        match self {
            GoCmdError::Env { source, .. } => source,
            GoCmdError::ModList(source)
            | GoCmdError::ModFetch(source)
            | GoCmdError::PkgList(source) => source,
        }
    }

    /// The invocation failure behind this error, if the go command failed
    pub fn invoke_error(&self) -> Option<&InvokeError> {
        match self.load_error() {
            LoadError::Invoke(err) => Some(err),
            LoadError::Decode(_) => None,
        }
    }

    /// The decode failure behind this error, if stdout was malformed
    pub fn decode_error(&self) -> Option<&DecodeError> {
        match self.load_error() {
            LoadError::Decode(err) => Some(err),
            LoadError::Invoke(_) => None,
        }
    }
}

/// Result type for gocmd loader operations.
pub type Result<T> = std::result::Result<T, GoCmdError>;
