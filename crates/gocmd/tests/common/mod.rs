//! Shared helpers for the gocmd integration tests.
//!
//! - [`FakeGo`]: a shell script standing in for the go command. It records
//!   its argv, working directory and `GOENV`, then replays canned stdout,
//!   stderr and exit status.
//! - [`GoenvFile`]: a throwaway `GOENV` file for tests against the real go
//!   command.
//! - [`Captured`]: an in-memory sink for relay output.

#![allow(dead_code)]

use gocmd::env::Config;
use gocmd::{Invoker, InvokerConfig};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tempfile::{NamedTempFile, TempDir};

static SERIAL: Mutex<()> = Mutex::new(());

/// Serialize tests that exec freshly written scripts or share a GOENV file.
///
/// Executing a script while another thread still holds it open for writing
/// fails with ETXTBSY.
pub fn serial() -> MutexGuard<'static, ()> {
    SERIAL.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

const SCRIPT: &str = r#"#!/bin/sh
state="$(dirname "$0")"
: > "$state/args"
for arg in "$@"; do
    printf '%s\n' "$arg" >> "$state/args"
done
printf '%s' "${GOENV-}" > "$state/goenv"
pwd > "$state/cwd"
if [ -f "$state/stdout" ]; then cat "$state/stdout"; fi
if [ -f "$state/stderr" ]; then cat "$state/stderr" >&2; fi
exit "$(cat "$state/status")"
"#;

/// A fake go command living in its own temporary directory.
pub struct FakeGo {
    dir: TempDir,
}

impl FakeGo {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create fake go dir");
        let program = dir.path().join("go");
        fs::write(&program, SCRIPT).expect("write fake go");
        fs::set_permissions(&program, fs::Permissions::from_mode(0o755))
            .expect("chmod fake go");

        let fake = FakeGo { dir };
        fake.exit_with(0);
        fake
    }

    pub fn program(&self) -> PathBuf {
        self.dir.path().join("go")
    }

    pub fn invoker(&self) -> Invoker {
        Invoker::new(InvokerConfig::new(&self.program().to_string_lossy()))
    }

    pub fn stdout(&self, data: &str) -> &Self {
        fs::write(self.dir.path().join("stdout"), data).expect("write stdout fixture");
        self
    }

    pub fn stderr(&self, data: &str) -> &Self {
        fs::write(self.dir.path().join("stderr"), data).expect("write stderr fixture");
        self
    }

    pub fn exit_with(&self, status: i32) -> &Self {
        fs::write(self.dir.path().join("status"), status.to_string())
            .expect("write status fixture");
        self
    }

    /// Arguments of the last invocation, verb first
    pub fn args(&self) -> Vec<String> {
        self.read("args").lines().map(str::to_string).collect()
    }

    /// GOENV seen by the last invocation
    pub fn goenv(&self) -> String {
        self.read("goenv")
    }

    /// GOENV seen by the last invocation, byte for byte
    pub fn goenv_bytes(&self) -> Vec<u8> {
        fs::read(self.dir.path().join("goenv")).unwrap_or_default()
    }

    /// Working directory of the last invocation
    pub fn cwd(&self) -> PathBuf {
        PathBuf::from(self.read("cwd").trim())
    }

    fn read(&self, name: &str) -> String {
        fs::read_to_string(self.dir.path().join(name)).unwrap_or_default()
    }
}

/// A GOENV file at a temporary location, removed on drop.
pub struct GoenvFile {
    file: NamedTempFile,
    pub config: Config,
}

impl GoenvFile {
    pub fn new() -> Self {
        let file = tempfile::Builder::new()
            .prefix("gocmd-")
            .suffix("env")
            .tempfile()
            .expect("create GOENV file");
        let config = Config::new().with_path(file.path());
        GoenvFile { file, config }
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Entire content of the file, trimmed
    pub fn read(&self) -> String {
        fs::read_to_string(self.file.path())
            .expect("read GOENV file")
            .trim()
            .to_string()
    }
}

/// `env` in the format written by `go env -w`: one KEY=VALUE per line, sorted
/// by key.
pub fn encode(env: &BTreeMap<String, String>) -> String {
    env.iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn env_map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Shared byte buffer usable as a relay sink
#[derive(Clone, Default)]
pub struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Whether the real go command can be run. Prints a skip note when it
/// cannot, so the caller can return early.
pub async fn go_available() -> bool {
    let available = Invoker::new(InvokerConfig::new("go")).available().await;
    if !available {
        eprintln!("skipping: go command not found in PATH");
    }
    available
}

