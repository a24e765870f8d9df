//! Diagnostic relay for debugging the go command wrappers
//!
//! A [`Relay`] multiplexes stdout, stderr and log output onto a single sink,
//! prefixing every line with its origin (`STDOUT`, `STDERR`, `STDLOG`). Before
//! emission, the absolute paths of the Go directories listed in [`ROOT_VARS`]
//! are replaced with `$NAME`, so that captured output is the same on every
//! machine.
//!
//! The relay is an ordinary value: build it once with [`Relay::init`] and hand
//! out writers with [`Relay::stdout`], [`Relay::stderr`] and [`Relay::stdlog`].
//! The path table is read-only after construction and shared by all writers.

use crate::env::Config;
use crate::Result;
use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Go environment variables holding the directories that get shortened.
///
/// `go list -json -compiled` reports paths under GOCACHE, `-export` paths
/// under GOBIN and GOCACHE, and module directories live under GOMODCACHE.
pub const ROOT_VARS: [&str; 5] = ["GOBIN", "GOCACHE", "GOMODCACHE", "GOPATH", "GOROOT"];

/// Replaces known root directories with `$NAME`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathShortener {
    // (name, root), longest root first
    entries: Vec<(String, String)>,
}

impl PathShortener {
    /// A shortener that leaves text untouched
    pub fn inert() -> Self {
        Self::default()
    }

    /// Build the table from Go environment values.
    ///
    /// GOPATH is split into its list entries. Empty values are skipped.
    pub fn from_env(env: &BTreeMap<String, String>) -> Self {
        let mut entries = Vec::new();
        for (name, value) in env {
            if name == "GOPATH" {
                for path in std::env::split_paths(value) {
                    entries.push((name.clone(), path.to_string_lossy().into_owned()));
                }
            } else {
                entries.push((name.clone(), value.clone()));
            }
        }
        entries.retain(|(_, root)| !root.is_empty());

        // A root nested in another one (GOMODCACHE inside GOPATH) must be
        // replaced first.
        entries.sort_by(|a, b| b.1.len().cmp(&a.1.len()).then_with(|| a.0.cmp(&b.0)));

        PathShortener { entries }
    }

    /// Read the root directories through `go env` and build the table.
    pub async fn load(config: &Config) -> Result<Self> {
        let env = config.get(&ROOT_VARS).await?;
        Ok(Self::from_env(&env))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replace every occurrence of each root with `$NAME`.
    ///
    /// Works on raw bytes; text that is not UTF-8 passes through unchanged.
    pub fn shorten(&self, text: &[u8]) -> Vec<u8> {
        let mut out = text.to_vec();
        for (name, root) in &self.entries {
            out = replace_all(&out, root.as_bytes(), format!("${name}").as_bytes());
        }
        out
    }
}

fn replace_all(haystack: &[u8], needle: &[u8], with: &[u8]) -> Vec<u8> {
    if needle.is_empty() {
        return haystack.to_vec();
    }
    let mut out = Vec::with_capacity(haystack.len());
    let mut rest = haystack;
    while let Some(at) = rest.windows(needle.len()).position(|w| w == needle) {
        out.extend_from_slice(&rest[..at]);
        out.extend_from_slice(with);
        rest = &rest[at + needle.len()..];
    }
    out.extend_from_slice(rest);
    out
}

/// Where a relayed line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Stdout,
    Stderr,
    Stdlog,
}

impl Origin {
    pub fn prefix(self) -> &'static str {
        match self {
            Origin::Stdout => "STDOUT ",
            Origin::Stderr => "STDERR ",
            Origin::Stdlog => "STDLOG ",
        }
    }
}

type Sink = Arc<Mutex<Box<dyn Write + Send>>>;

/// Line-prefixing multiplexer with path shortening.
#[derive(Clone)]
pub struct Relay {
    sink: Sink,
    shortener: Arc<PathShortener>,
}

impl fmt::Debug for Relay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relay")
            .field("shortener", &self.shortener)
            .finish_non_exhaustive()
    }
}

impl Relay {
    /// Relay to the process stdout
    pub fn new(shortener: PathShortener) -> Self {
        Self::with_sink(shortener, io::stdout())
    }

    /// Relay to an arbitrary sink
    pub fn with_sink<W: Write + Send + 'static>(shortener: PathShortener, sink: W) -> Self {
        Relay {
            sink: Arc::new(Mutex::new(Box::new(sink))),
            shortener: Arc::new(shortener),
        }
    }

    /// Relay to the process stdout without path shortening
    pub fn inert() -> Self {
        Self::new(PathShortener::inert())
    }

    /// Build a relay to stdout, learning the root directories from `go env`.
    ///
    /// If `go env` fails the relay still works, without path shortening.
    pub async fn init(config: &Config) -> Self {
        match PathShortener::load(config).await {
            Ok(shortener) => {
                debug!(roots = shortener.len(), "relay path shortening enabled");
                Self::new(shortener)
            }
            Err(err) => {
                warn!(error = %err, "relay path shortening disabled");
                Self::inert()
            }
        }
    }

    pub fn shortener(&self) -> &PathShortener {
        &self.shortener
    }

    pub fn writer(&self, origin: Origin) -> PrefixWriter {
        PrefixWriter {
            origin,
            relay: self.clone(),
        }
    }

    pub fn stdout(&self) -> PrefixWriter {
        self.writer(Origin::Stdout)
    }

    pub fn stderr(&self) -> PrefixWriter {
        self.writer(Origin::Stderr)
    }

    /// Writer for log output; usable as a `tracing_subscriber` writer via
    /// `move || relay.stdlog()`.
    pub fn stdlog(&self) -> PrefixWriter {
        self.writer(Origin::Stdlog)
    }

    fn emit(&self, text: &[u8]) -> io::Result<()> {
        let text = self.shortener.shorten(text);
        let mut sink = self
            .sink
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "relay sink poisoned"))?;
        sink.write_all(&text)
    }
}

/// Writer that prefixes each line with its [`Origin`].
///
/// Every `write` call is taken as a sequence of whole lines; a final newline
/// ends the last line instead of starting an empty one.
#[derive(Debug, Clone)]
pub struct PrefixWriter {
    origin: Origin,
    relay: Relay,
}

impl PrefixWriter {
    pub fn origin(&self) -> Origin {
        self.origin
    }
}

impl Write for PrefixWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let body = buf.strip_suffix(b"\n").unwrap_or(buf);
        let prefix = self.origin.prefix().as_bytes();

        let mut out = Vec::with_capacity(body.len() + prefix.len() * 2 + 1);
        for line in body.split(|&b| b == b'\n') {
            out.extend_from_slice(prefix);
            out.extend_from_slice(line);
            out.push(b'\n');
        }
        self.relay.emit(&out)?;

        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut sink = self
            .relay
            .sink
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "relay sink poisoned"))?;
        sink.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoke::{Invoker, InvokerConfig};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Captured {
        fn bytes(&self) -> Vec<u8> {
            self.0.lock().unwrap().clone()
        }

        fn text(&self) -> String {
            String::from_utf8(self.bytes()).unwrap()
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

    fn env(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_every_line_is_prefixed() {
        let out = Captured::default();
        let relay = Relay::with_sink(PathShortener::inert(), out.clone());

        relay.stdout().write_all(b"{\n\t\"Name\": \"flag\"\n}\n").unwrap();
        relay.stderr().write_all(b"exit status 1").unwrap();

        assert_eq!(
            out.text(),
            "STDOUT {\nSTDOUT \t\"Name\": \"flag\"\nSTDOUT }\nSTDERR exit status 1\n"
        );
    }

    #[test]
    fn test_write_reports_input_length() {
        let relay = Relay::with_sink(PathShortener::inert(), Captured::default());
        let n = relay.stdlog().write(b"a\nb\n").unwrap();
        assert_eq!(n, 4);
        assert_eq!(relay.stdlog().write(b"").unwrap(), 0);
    }

    #[test]
    fn test_blank_lines_are_kept() {
        let out = Captured::default();
        let relay = Relay::with_sink(PathShortener::inert(), out.clone());
        relay.stdlog().write_all(b"a\n\nb\n").unwrap();
        assert_eq!(out.text(), "STDLOG a\nSTDLOG \nSTDLOG b\n");
    }

    #[test]
    fn test_shortener_prefers_nested_roots() {
        let shortener = PathShortener::from_env(&env(&[
            ("GOPATH", "/home/gopher/go"),
            ("GOMODCACHE", "/home/gopher/go/pkg/mod"),
            ("GOROOT", "/usr/local/go"),
        ]));

        assert_eq!(
            shortener.shorten(b"/home/gopher/go/pkg/mod/golang.org/x/text@v0.1.0"),
            b"$GOMODCACHE/golang.org/x/text@v0.1.0"
        );
        assert_eq!(shortener.shorten(b"/home/gopher/go/bin/tool"), b"$GOPATH/bin/tool");
        assert_eq!(shortener.shorten(b"/usr/local/go/src/flag"), b"$GOROOT/src/flag");
    }

    #[test]
    fn test_shortener_splits_gopath() {
        let gopath = std::env::join_paths(["/a/go", "/b/go"]).unwrap();
        let shortener = PathShortener::from_env(&env(&[(
            "GOPATH",
            gopath.to_str().unwrap(),
        )]));

        assert_eq!(shortener.len(), 2);
        assert_eq!(shortener.shorten(b"/a/go/src /b/go/src"), b"$GOPATH/src $GOPATH/src");
    }

    #[test]
    fn test_shortener_skips_empty_values() {
        let shortener = PathShortener::from_env(&env(&[("GOBIN", ""), ("GOCACHE", "")]));
        assert!(shortener.is_empty());
        assert_eq!(shortener.shorten(b"unchanged"), b"unchanged");
    }

    #[test]
    fn test_relay_applies_shortener() {
        let out = Captured::default();
        let shortener = PathShortener::from_env(&env(&[("GOCACHE", "/home/gopher/.cache/go-build")]));
        let relay = Relay::with_sink(shortener, out.clone());

        relay
            .stdout()
            .write_all(b"\"Export\": \"/home/gopher/.cache/go-build/ab/abcd-d\"\n")
            .unwrap();
        assert_eq!(out.text(), "STDOUT \"Export\": \"$GOCACHE/ab/abcd-d\"\n");
    }

    #[test]
    fn test_invalid_utf8_is_relayed_verbatim() {
        let out = Captured::default();
        let relay = Relay::with_sink(PathShortener::inert(), out.clone());

        relay.stdout().write_all(b"\xff\n").unwrap();
        relay.stderr().write_all(b"\xff\xfe bin\n").unwrap();

        assert_eq!(out.bytes(), b"STDOUT \xff\nSTDERR \xff\xfe bin\n");
    }

    #[test]
    fn test_shortener_keeps_invalid_utf8_around_roots() {
        let shortener = PathShortener::from_env(&env(&[("GOROOT", "/usr/local/go")]));
        assert_eq!(
            shortener.shorten(b"\xff/usr/local/go/bin\xfe"),
            b"\xff$GOROOT/bin\xfe"
        );
    }

    #[tokio::test]
    async fn test_init_failure_yields_inert_relay() {
        let config = Config::new()
            .with_invoker(Invoker::new(InvokerConfig::new("gocmd-no-such-program")));
        let relay = Relay::init(&config).await;
        assert!(relay.shortener().is_empty());
    }
}
