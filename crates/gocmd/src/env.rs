//! Wrapper for the go env command
//!
//! [`Config`] reads, writes and removes the default settings of Go
//! environment variables. The settings live in the file named by `GOENV`;
//! [`Config::path`] selects an alternate file, which is how tests avoid
//! touching the user's configuration.

use crate::decode::decode_object;
use crate::error::{EnvOp, GoCmdError, LoadError};
use crate::invoke::{Invocation, Invoker};
use crate::Result;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::debug;

/// Environment variable naming the go env configuration file
pub const GOENV: &str = "GOENV";

const VERB: &str = "env";

/// Options for accessing the Go environment.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Configuration file to use instead of the default one
    pub path: Option<PathBuf>,
    pub invoker: Invoker,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `path` as the go env configuration file
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_invoker(mut self, invoker: Invoker) -> Self {
        self.invoker = invoker;
        self
    }

    /// Return the named variables, or the entire Go environment when `vars`
    /// is empty.
    ///
    /// A variable unknown to the go command maps to the empty string.
    pub async fn get<S: AsRef<str>>(&self, vars: &[S]) -> Result<BTreeMap<String, String>> {
        let tag = |source: LoadError| GoCmdError::Env {
            op: EnvOp::Read,
            source,
        };

        let stdout = self.invoke(read_args(vars)).await.map_err(tag)?;
        decode_object(&stdout).map_err(|e| tag(e.into()))
    }

    /// Change the default settings of the variables in `env`.
    ///
    /// Fails if the go command does not know one of the variables.
    pub async fn set(&self, env: &BTreeMap<String, String>) -> Result<()> {
        self.invoke(write_args(env))
            .await
            .map_err(|source| GoCmdError::Env {
                op: EnvOp::Write,
                source,
            })?;
        Ok(())
    }

    /// Remove the default settings of the named variables, if any were set.
    ///
    /// Fails if the go command does not know one of the variables.
    pub async fn unset<S: AsRef<str>>(&self, vars: &[S]) -> Result<()> {
        self.invoke(unset_args(vars))
            .await
            .map_err(|source| GoCmdError::Env {
                op: EnvOp::Unset(vars.iter().map(|v| v.as_ref().to_string()).collect()),
                source,
            })?;
        Ok(())
    }

    /// Return the value of a single variable, or `""` if it is unknown.
    pub async fn getenv(&self, key: &str) -> Result<String> {
        let stdout = self
            .invoke(vec![key.to_string()])
            .await
            .map_err(|source| GoCmdError::Env {
                op: EnvOp::Getenv(key.to_string()),
                source,
            })?;

        Ok(String::from_utf8_lossy(&stdout).trim().to_string())
    }

    /// Change the default setting of a single variable.
    pub async fn setenv(&self, key: &str, value: &str) -> Result<()> {
        self.invoke(vec!["-w".to_string(), format!("{key}={value}")])
            .await
            .map_err(|source| GoCmdError::Env {
                op: EnvOp::Setenv(key.to_string(), value.to_string()),
                source,
            })?;
        Ok(())
    }

    /// Remove the default setting of a single variable, if one was set.
    pub async fn unsetenv(&self, key: &str) -> Result<()> {
        self.invoke(vec!["-u".to_string(), key.to_string()])
            .await
            .map_err(|source| GoCmdError::Env {
                op: EnvOp::Unsetenv(key.to_string()),
                source,
            })?;
        Ok(())
    }

    async fn invoke(&self, args: Vec<String>) -> std::result::Result<Vec<u8>, LoadError> {
        let mut invocation = Invocation::new(VERB).args(args);
        if let Some(path) = &self.path {
            debug!(goenv = %path.display(), "using alternate go env file");
            invocation = invocation.env_var(GOENV, path);
        }

        Ok(self.invoker.invoke(&invocation).await?)
    }
}

fn read_args<S: AsRef<str>>(vars: &[S]) -> Vec<String> {
    let mut args = vec!["-json".to_string()];
    args.extend(vars.iter().map(|v| v.as_ref().to_string()));
    args
}

/// `-w` followed by `KEY=VALUE` entries sorted by key
fn write_args(env: &BTreeMap<String, String>) -> Vec<String> {
    let mut args = vec!["-w".to_string()];
    args.extend(env.iter().map(|(k, v)| format!("{k}={v}")));
    args
}

fn unset_args<S: AsRef<str>>(vars: &[S]) -> Vec<String> {
    let mut args = vec!["-u".to_string()];
    args.extend(vars.iter().map(|v| v.as_ref().to_string()));
    args
}

/// [`Config::get`] with the default configuration
pub async fn get<S: AsRef<str>>(vars: &[S]) -> Result<BTreeMap<String, String>> {
    Config::default().get(vars).await
}

/// [`Config::set`] with the default configuration
pub async fn set(env: &BTreeMap<String, String>) -> Result<()> {
    Config::default().set(env).await
}

/// [`Config::unset`] with the default configuration
pub async fn unset<S: AsRef<str>>(vars: &[S]) -> Result<()> {
    Config::default().unset(vars).await
}

/// [`Config::getenv`] with the default configuration
pub async fn getenv(key: &str) -> Result<String> {
    Config::default().getenv(key).await
}

/// [`Config::setenv`] with the default configuration
pub async fn setenv(key: &str, value: &str) -> Result<()> {
    Config::default().setenv(key, value).await
}

/// [`Config::unsetenv`] with the default configuration
pub async fn unsetenv(key: &str) -> Result<()> {
    Config::default().unsetenv(key).await
}
