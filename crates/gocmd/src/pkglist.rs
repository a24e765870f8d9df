//! Wrapper for the go list command
//!
//! The go command is not consistent about paths: `Dir`, `Target`, `Root` and
//! `Export` are absolute, while most source file lists are relative to `Dir`.
//! [`Loader::load`] joins every source file list with `Dir`, so all paths in a
//! returned [`Package`] are absolute.

use crate::decode::invoke_stream;
use crate::error::GoCmdError;
use crate::invoke::{Attr, Invocation, Invoker};
use crate::modlist::{is_false, Module};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

fn path_is_empty(p: &Path) -> bool {
    p.as_os_str().is_empty()
}

/// A package, as printed by `go list -json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct Package {
    /// Directory containing the package sources
    #[serde(skip_serializing_if = "path_is_empty")]
    pub dir: PathBuf,
    /// Import path of the package in dir
    #[serde(skip_serializing_if = "String::is_empty")]
    pub import_path: String,
    /// Path in import comment on package statement
    #[serde(skip_serializing_if = "String::is_empty")]
    pub import_comment: String,
    /// Package name
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Package documentation string
    #[serde(skip_serializing_if = "String::is_empty")]
    pub doc: String,
    /// Install path
    #[serde(skip_serializing_if = "path_is_empty")]
    pub target: PathBuf,
    /// Shared library containing this package (only set when -linkshared)
    #[serde(skip_serializing_if = "path_is_empty")]
    pub shlib: PathBuf,
    /// Is this package in the Go root?
    #[serde(skip_serializing_if = "is_false")]
    pub goroot: bool,
    /// Is this package part of the standard Go library?
    #[serde(skip_serializing_if = "is_false")]
    pub standard: bool,
    /// Would `go install` do anything for this package?
    #[serde(skip_serializing_if = "is_false")]
    pub stale: bool,
    /// Explanation for stale
    #[serde(skip_serializing_if = "String::is_empty")]
    pub stale_reason: String,
    /// Go root or Go path dir containing this package
    #[serde(skip_serializing_if = "path_is_empty")]
    pub root: PathBuf,
    /// This directory shadows dir in $GOPATH
    #[serde(skip_serializing_if = "path_is_empty")]
    pub conflict_dir: PathBuf,
    /// Binary-only package (no longer supported)
    #[serde(skip_serializing_if = "is_false")]
    pub binary_only: bool,
    /// Package is only for use in the named test
    #[serde(skip_serializing_if = "String::is_empty")]
    pub for_test: String,
    /// File containing export data (with -export)
    #[serde(skip_serializing_if = "path_is_empty")]
    pub export: PathBuf,
    /// Containing module, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module: Option<Box<Module>>,
    /// Command-line patterns matching this package
    #[serde(rename = "Match", skip_serializing_if = "Vec::is_empty")]
    pub matches: Vec<String>,
    /// Package is only a dependency, not explicitly listed
    #[serde(skip_serializing_if = "is_false")]
    pub dep_only: bool,

    /// .go source files (excluding cgo_files, test_go_files, x_test_go_files)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub go_files: Vec<PathBuf>,
    /// .go source files that import "C"
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cgo_files: Vec<PathBuf>,
    /// .go files presented to the compiler (with -compiled)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub compiled_go_files: Vec<PathBuf>,
    /// .go source files ignored due to build constraints
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ignored_go_files: Vec<PathBuf>,
    /// Non-.go source files ignored due to build constraints
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ignored_other_files: Vec<PathBuf>,
    /// .c source files
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub c_files: Vec<PathBuf>,
    /// .cc, .cxx and .cpp source files
    #[serde(rename = "CXXFiles", skip_serializing_if = "Vec::is_empty")]
    pub cxx_files: Vec<PathBuf>,
    /// .m source files
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub m_files: Vec<PathBuf>,
    /// .h, .hh, .hpp and .hxx source files
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub h_files: Vec<PathBuf>,
    /// .f, .F, .for and .f90 Fortran source files
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub f_files: Vec<PathBuf>,
    /// .s source files
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub s_files: Vec<PathBuf>,
    /// .swig files
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub swig_files: Vec<PathBuf>,
    /// .swigcxx files
    #[serde(rename = "SwigCXXFiles", skip_serializing_if = "Vec::is_empty")]
    pub swig_cxx_files: Vec<PathBuf>,
    /// .syso object files to add to the archive
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub syso_files: Vec<PathBuf>,
    /// //go:embed patterns
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embed_patterns: Vec<String>,
    /// Files matched by embed_patterns
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embed_files: Vec<PathBuf>,
    /// _test.go files in the package
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub test_go_files: Vec<PathBuf>,
    /// Files matched by //go:embed in test_go_files
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub test_embed_files: Vec<PathBuf>,
    /// _test.go files outside the package
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub x_test_go_files: Vec<PathBuf>,
    /// Files matched by //go:embed in x_test_go_files
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub x_test_embed_files: Vec<PathBuf>,

    /// cgo: flags for the C compiler
    #[serde(rename = "CgoCFLAGS", skip_serializing_if = "Vec::is_empty")]
    pub cgo_cflags: Vec<String>,
    /// cgo: flags for the C preprocessor
    #[serde(rename = "CgoCPPFLAGS", skip_serializing_if = "Vec::is_empty")]
    pub cgo_cppflags: Vec<String>,
    /// cgo: flags for the C++ compiler
    #[serde(rename = "CgoCXXFLAGS", skip_serializing_if = "Vec::is_empty")]
    pub cgo_cxxflags: Vec<String>,
    /// cgo: flags for the Fortran compiler
    #[serde(rename = "CgoFFLAGS", skip_serializing_if = "Vec::is_empty")]
    pub cgo_fflags: Vec<String>,
    /// cgo: flags for the linker
    #[serde(rename = "CgoLDFLAGS", skip_serializing_if = "Vec::is_empty")]
    pub cgo_ldflags: Vec<String>,
    /// cgo: pkg-config names
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cgo_pkg_config: Vec<String>,

    /// Import paths used by this package
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub imports: Vec<String>,
    /// Map from source import to import path (identity entries omitted)
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub import_map: BTreeMap<String, String>,
    /// All (recursively) imported dependencies
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub deps: Vec<String>,
    /// Imports from test_go_files
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub test_imports: Vec<String>,
    /// Imports from x_test_go_files
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub x_test_imports: Vec<String>,

    /// This package or a dependency has an error
    #[serde(skip_serializing_if = "is_false")]
    pub incomplete: bool,
    /// Error loading the package
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<PackageError>,
    /// Errors loading dependencies
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub deps_errors: Vec<PackageError>,
}

impl Package {
    fn source_lists_mut(&mut self) -> [&mut Vec<PathBuf>; 19] {
        [
            &mut self.go_files,
            &mut self.cgo_files,
            &mut self.compiled_go_files,
            &mut self.ignored_go_files,
            &mut self.ignored_other_files,
            &mut self.c_files,
            &mut self.cxx_files,
            &mut self.m_files,
            &mut self.h_files,
            &mut self.f_files,
            &mut self.s_files,
            &mut self.swig_files,
            &mut self.swig_cxx_files,
            &mut self.syso_files,
            &mut self.embed_files,
            &mut self.test_go_files,
            &mut self.test_embed_files,
            &mut self.x_test_go_files,
            &mut self.x_test_embed_files,
        ]
    }

    /// Join every relative source file path with `dir`.
    ///
    /// Does nothing when `dir` is empty, which happens for packages that could
    /// not be found.
    pub fn resolve_source_files(&mut self) {
        if path_is_empty(&self.dir) {
            return;
        }

        let dir = self.dir.clone();
        for list in self.source_lists_mut() {
            for file in list.iter_mut() {
                if file.is_relative() {
                    *file = dir.join(&*file);
                }
            }
        }
    }
}

/// Error reported by the go command for a single package.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct PackageError {
    /// Shortest path from the package named on the command line to this one
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub import_stack: Vec<String>,
    /// Position of the error, if present (file:line:col)
    #[serde(skip_serializing_if = "String::is_empty")]
    pub pos: String,
    /// The error itself
    pub err: String,
}

impl fmt::Display for PackageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.pos.is_empty() {
            write!(f, "{}", self.err)
        } else {
            write!(f, "{}: {}", self.pos, self.err)
        }
    }
}

impl std::error::Error for PackageError {}

/// Options for loading packages with `go list`.
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

    /// Run go list in `dir` instead of the current directory
    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.attr.dir = Some(dir.into());
        self
    }

    /// Run go list with exactly this environment
    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.attr.env = Some(env);
        self
    }

    pub fn with_invoker(mut self, invoker: Invoker) -> Self {
        self.invoker = invoker;
        self
    }

    /// Load the packages named by `patterns`, as understood by go list.
    pub async fn load<S: AsRef<str>>(&self, patterns: &[S]) -> Result<Vec<Package>> {
        // No -e, as for go list -m.
        let invocation = Invocation::new("list")
            .arg("-json")
            .args(patterns.iter().map(|p| p.as_ref().to_string()));

        let mut packages: Vec<Package> = invoke_stream(&self.invoker, &self.attr, invocation)
            .await
            .map_err(GoCmdError::PkgList)?;

        for pkg in &mut packages {
            pkg.resolve_source_files();
        }

        Ok(packages)
    }
}

/// [`Loader::load`] with the default loader
pub async fn load<S: AsRef<str>>(patterns: &[S]) -> Result<Vec<Package>> {
    Loader::default().load(patterns).await
}
