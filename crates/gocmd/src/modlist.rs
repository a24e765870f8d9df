//! Wrapper for the go list -m command

use crate::decode::invoke_stream;
use crate::error::GoCmdError;
use crate::invoke::{Attr, Invocation, Invoker};
use crate::Result;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// A module, as printed by `go list -m -json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct Module {
    /// Module path
    #[serde(skip_serializing_if = "String::is_empty")]
    pub path: String,
    /// Module version
    #[serde(skip_serializing_if = "String::is_empty")]
    pub version: String,
    /// Available module versions (with -versions)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub versions: Vec<String>,
    /// Replaced by this module
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replace: Option<Box<Module>>,
    /// Time the version was created
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<FixedOffset>>,
    /// Available update, if any (with -u)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update: Option<Box<Module>>,
    /// Is this the main module?
    #[serde(skip_serializing_if = "is_false")]
    pub main: bool,
    /// Is this module only an indirect dependency of the main module?
    #[serde(skip_serializing_if = "is_false")]
    pub indirect: bool,
    /// Directory holding the files of this module, if any
    #[serde(skip_serializing_if = "String::is_empty")]
    pub dir: String,
    /// Path to the go.mod file of this module, if any
    #[serde(skip_serializing_if = "String::is_empty")]
    pub go_mod: String,
    /// Go version used in the module
    #[serde(skip_serializing_if = "String::is_empty")]
    pub go_version: String,
    /// Retraction rationale, if this version is retracted (with -retracted)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub retracted: Vec<String>,
    /// Deprecation message, if the module is deprecated (with -u)
    #[serde(skip_serializing_if = "String::is_empty")]
    pub deprecated: String,
    /// Error loading the module
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ModuleError>,
}

pub(crate) fn is_false(b: &bool) -> bool {
    !*b
}

impl fmt::Display for Module {
    /// `path version [update] => replace-path replace-version [update]`, as
    /// printed by `go list -m -u`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)?;
        if !self.version.is_empty() {
            write!(f, " {}", self.version)?;
            if let Some(update) = &self.update {
                write!(f, " [{}]", update.version)?;
            }
        }
        if let Some(replace) = &self.replace {
            write!(f, " => {}", replace.path)?;
            if !replace.version.is_empty() {
                write!(f, " {}", replace.version)?;
                if let Some(update) = &replace.update {
                    write!(f, " [{}]", update.version)?;
                }
            }
        }
        Ok(())
    }
}

/// Error reported by the go command for a single module.
///
/// `go list -m` reports it as `{"Err": "..."}` and `go mod download` as a
/// bare string; both decode to this type.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("{err}")]
pub struct ModuleError {
    /// The error itself
    #[serde(rename = "Err")]
    pub err: String,
}

impl ModuleError {
    pub fn new(err: impl Into<String>) -> Self {
        ModuleError { err: err.into() }
    }
}

impl<'de> Deserialize<'de> for ModuleError {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Bare(String),
            Object {
                #[serde(rename = "Err", default)]
                err: String,
            },
        }

        match Repr::deserialize(deserializer)? {
            Repr::Bare(err) | Repr::Object { err } => Ok(ModuleError { err }),
        }
    }
}

/// Options for loading modules with `go list -m`.
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

    /// Run go list -m in `dir` instead of the current directory
    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.attr.dir = Some(dir.into());
        self
    }

    /// Run go list -m with exactly this environment
    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.attr.env = Some(env);
        self
    }

    pub fn with_invoker(mut self, invoker: Invoker) -> Self {
        self.invoker = invoker;
        self
    }

    /// Load the modules named by `patterns`, as understood by go list -m.
    ///
    /// On failure no modules are returned; the error gives access to the go
    /// command stderr through [`GoCmdError::invoke_error`].
    pub async fn load<S: AsRef<str>>(&self, patterns: &[S]) -> Result<Vec<Module>> {
        // No -e: a module that cannot be loaded fails the whole command.
        let invocation = Invocation::new("list")
            .args(["-m", "-json"])
            .args(patterns.iter().map(|p| p.as_ref().to_string()));

        invoke_stream(&self.invoker, &self.attr, invocation)
            .await
            .map_err(GoCmdError::ModList)
    }
}

/// [`Loader::load`] with the default loader
pub async fn load<S: AsRef<str>>(patterns: &[S]) -> Result<Vec<Module>> {
    Loader::default().load(patterns).await
}
