//! Wrapper for the go mod download command

use crate::decode::invoke_stream;
use crate::error::GoCmdError;
use crate::invoke::{Attr, Invocation, Invoker};
use crate::modlist::ModuleError;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Record printed by `go mod download -json`.
///
/// The go command reports `Error` as a plain string, which cannot take part in
/// error wrapping; [`Module`] carries it as a [`ModuleError`] instead.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct ModuleJson {
    path: String,
    version: String,
    error: String,
    info: String,
    go_mod: String,
    zip: String,
    dir: String,
    sum: String,
    go_mod_sum: String,
}

/// A module in the module cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Module {
    /// Module path
    #[serde(skip_serializing_if = "String::is_empty")]
    pub path: String,
    /// Module version
    #[serde(skip_serializing_if = "String::is_empty")]
    pub version: String,
    /// Absolute path to the cached .info file
    #[serde(skip_serializing_if = "String::is_empty")]
    pub info: String,
    /// Absolute path to the cached .mod file
    #[serde(skip_serializing_if = "String::is_empty")]
    pub go_mod: String,
    /// Absolute path to the cached .zip file
    #[serde(skip_serializing_if = "String::is_empty")]
    pub zip: String,
    /// Absolute path to the cached source root directory
    #[serde(skip_serializing_if = "String::is_empty")]
    pub dir: String,
    /// Checksum for path, version (as in go.sum)
    #[serde(skip_serializing_if = "String::is_empty")]
    pub sum: String,
    /// Checksum for go.mod (as in go.sum)
    #[serde(skip_serializing_if = "String::is_empty")]
    pub go_mod_sum: String,
    /// Error downloading the module
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ModuleError>,
}

impl From<ModuleJson> for Module {
    fn from(m: ModuleJson) -> Self {
        let error = if m.error.is_empty() {
            None
        } else {
            Some(ModuleError::new(m.error))
        };

        Module {
            path: m.path,
            version: m.version,
            info: m.info,
            go_mod: m.go_mod,
            zip: m.zip,
            dir: m.dir,
            sum: m.sum,
            go_mod_sum: m.go_mod_sum,
            error,
        }
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)?;
        if !self.version.is_empty() {
            write!(f, "@{}", self.version)?;
        }
        Ok(())
    }
}

/// Options for downloading modules with `go mod download`.
#[derive(Debug, Clone, Default)]
pub struct Loader {
    /// Directory and environment of the go command
    pub attr: Attr,
    pub invoker: Invoker,
}

impl Loader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run go mod download in `dir` instead of the current directory
    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.attr.dir = Some(dir.into());
        self
    }

    /// Run go mod download with exactly this environment
    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.attr.env = Some(env);
        self
    }

    pub fn with_invoker(mut self, invoker: Invoker) -> Self {
        self.invoker = invoker;
        self
    }

    /// Download and return the modules named by `patterns`, as understood by
    /// go mod download.
    pub async fn load<S: AsRef<str>>(&self, patterns: &[S]) -> Result<Vec<Module>> {
        let invocation = Invocation::new("mod")
            .args(["download", "-json"])
            .args(patterns.iter().map(|p| p.as_ref().to_string()));

        let modules: Vec<ModuleJson> = invoke_stream(&self.invoker, &self.attr, invocation)
            .await
            .map_err(GoCmdError::ModFetch)?;

        Ok(modules.into_iter().map(Module::from).collect())
    }
}

/// [`Loader::load`] with the default loader
pub async fn load<S: AsRef<str>>(patterns: &[S]) -> Result<Vec<Module>> {
    Loader::default().load(patterns).await
}
