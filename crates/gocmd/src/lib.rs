//! gocmd: typed wrappers around the go command
//!
//! Runs `go env`, `go list -m`, `go mod download` and `go list` with `-json`,
//! and decodes their output into Rust records.
//!
//! ## Layers
//!
//! - [`invoke`]: runs the go command and returns stdout, or an error holding
//!   the argv, stderr and exit status.
//! - [`decode`]: turns a stream of concatenated JSON objects into records.
//! - [`env`], [`modlist`], [`modfetch`], [`pkglist`]: one loader per go
//!   command.
//! - [`relay`]: line-prefixing relay used when debugging.
//!
//! Setting `GOCMDDEBUG` to a non-empty value logs the stderr of successful
//! invocations, which is otherwise discarded.

pub mod decode;
pub mod env;
pub mod error;
pub mod invoke;
pub mod modfetch;
pub mod modlist;
pub mod pkglist;
pub mod relay;
pub mod telemetry;

pub use decode::{decode_object, decode_stream};
pub use error::{DecodeError, EnvOp, Failure, GoCmdError, InvokeError, LoadError, Result};
pub use invoke::{Attr, Invocation, Invoker, InvokerConfig};
pub use modlist::ModuleError;
pub use pkglist::{Package, PackageError};
pub use relay::{Origin, PathShortener, PrefixWriter, Relay};
pub use telemetry::{init_tracing, init_tracing_with_writer};
