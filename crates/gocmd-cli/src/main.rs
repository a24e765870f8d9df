//! gocmd - run the go command and print what the wrappers decode
//!
//! A debugging front end for the `gocmd` library.
//!
//! ## Commands
//!
//! - `invoke`: run `go <verb> <args>` and print its raw stdout
//! - `env`: read, write and remove go env settings
//! - `mod`: list (`go list -m`) or download (`go mod download`) modules
//! - `pkg`: list packages (`go list`)
//!
//! With `--debug` (or `GOCMDDEBUG` set), stdout, errors and log lines are all
//! written to stdout, each line prefixed with its origin, and Go root
//! directories are shortened to `$GOROOT`, `$GOPATH`, ...

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use gocmd::env::{Config, GOENV};
use gocmd::{
    init_tracing, init_tracing_with_writer, modfetch, modlist, pkglist, Attr,
    Invocation, Invoker, InvokerConfig, PathShortener, Relay,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{debug, warn, Level};

#[derive(Parser)]
#[command(name = "gocmd")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run the go command and print the decoded records", long_about = None)]
struct Cli {
    /// Relay all output through prefixed lines and log go command stderr
    #[arg(long, global = true)]
    debug: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Run the go command in DIR
    #[arg(short = 'C', long, global = true, value_name = "DIR")]
    dir: Option<PathBuf>,

    /// Use PATH as the go env configuration file
    #[arg(long, global = true, value_name = "PATH")]
    goenv: Option<PathBuf>,

    /// Kill the go command after SECS seconds
    #[arg(
        long,
        global = true,
        value_name = "SECS",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run `go <VERB> <ARGS>...` and print its stdout
    Invoke {
        /// go command verb (env, list, mod, ...)
        verb: String,

        /// Arguments passed through to the go command
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Access the Go environment
    Env {
        #[command(subcommand)]
        action: EnvAction,
    },

    /// Inspect modules
    Mod {
        #[command(subcommand)]
        action: ModAction,
    },

    /// Inspect packages
    Pkg {
        #[command(subcommand)]
        action: PkgAction,
    },
}

#[derive(Subcommand)]
enum EnvAction {
    /// Print the named variables, or the whole environment
    Get {
        vars: Vec<String>,
    },
    /// Change the default setting of variables
    Set {
        /// KEY=VALUE entries
        #[arg(required = true, value_parser = parse_key_value)]
        entries: Vec<(String, String)>,
    },
    /// Remove the default setting of variables
    Unset {
        #[arg(required = true)]
        vars: Vec<String>,
    },
}

#[derive(Subcommand)]
enum ModAction {
    /// Print modules as reported by `go list -m -json`
    List {
        patterns: Vec<String>,
    },
    /// Download modules and print them as reported by `go mod download -json`
    Download {
        patterns: Vec<String>,
    },
}

#[derive(Subcommand)]
enum PkgAction {
    /// Print packages as reported by `go list -json`
    List {
        patterns: Vec<String>,
    },
}

fn parse_key_value(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("invalid KEY=VALUE: no `=` after a key in `{s}`")),
    }
}

/// Where records and errors go: plain stdout/stderr, or the relay.
struct Output {
    relay: Option<Relay>,
}

impl Output {
    fn raw(&self, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        let written = match &self.relay {
            Some(relay) => relay.stdout().write_all(data),
            None => {
                let mut stdout = io::stdout().lock();
                stdout.write_all(data).and_then(|_| stdout.flush())
            }
        };
        written.map_err(|e| anyhow!("Failed to write to stdout: {e}"))
    }

    fn record<T: Serialize>(&self, record: &T) -> Result<()> {
        let mut text = serde_json::to_string_pretty(record)
            .map_err(|e| anyhow!("Failed to encode record as JSON: {e}"))?;
        text.push('\n');
        self.raw(text.as_bytes())
    }

    fn records<T: Serialize>(&self, records: &[T]) -> Result<()> {
        for record in records {
            self.record(record)?;
        }
        Ok(())
    }

    /// Prints the outermost message only; every error here embeds its cause.
    fn error(&self, err: &anyhow::Error) {
        let text = format!("{err}\n");
        match &self.relay {
            Some(relay) => {
                let _ = relay.stderr().write_all(text.as_bytes());
            }
            None => {
                let _ = io::stderr().write_all(text.as_bytes());
            }
        }
    }
}

/// Settings shared by every subcommand
struct Settings {
    invoker: Invoker,
    attr: Attr,
    env: Config,
}

impl Settings {
    fn new(cli: &Cli, debug: bool) -> Self {
        let mut config = InvokerConfig::from_env().with_debug(debug);
        if let Some(secs) = cli.timeout {
            config = config.with_timeout(Duration::from_secs(secs));
        }
        let invoker = Invoker::new(config);

        let mut attr = Attr {
            dir: cli.dir.clone(),
            ..Default::default()
        };
        if let Some(path) = &cli.goenv {
            attr.vars.insert(GOENV.into(), path.into());
        }

        let mut env = Config::new().with_invoker(invoker.clone());
        if let Some(path) = &cli.goenv {
            env = env.with_path(path);
        }

        Settings { invoker, attr, env }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let debug = cli.debug || InvokerConfig::from_env().debug;
    let ctx = Settings::new(&cli, debug);

    let output = if debug {
        let (shortener, load_err) = match PathShortener::load(&ctx.env).await {
            Ok(shortener) => (shortener, None),
            Err(err) => (PathShortener::inert(), Some(err)),
        };
        let relay = Relay::new(shortener);
        let log_relay = relay.clone();
        init_tracing_with_writer(cli.json, level, move || log_relay.stdlog());
        if let Some(err) = load_err {
            warn!(error = %err, "relay path shortening disabled");
        }
        Output { relay: Some(relay) }
    } else {
        init_tracing(cli.json, level);
        Output { relay: None }
    };

    match run(cli.command, &ctx, &output).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            debug!(error = ?err, "command failed");
            output.error(&err);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands, ctx: &Settings, output: &Output) -> Result<()> {
    match command {
        Commands::Invoke { verb, args } => cmd_invoke(ctx, output, verb, args).await,
        Commands::Env { action } => match action {
            EnvAction::Get { vars } => cmd_env_get(ctx, output, &vars).await,
            EnvAction::Set { entries } => cmd_env_set(ctx, entries).await,
            EnvAction::Unset { vars } => cmd_env_unset(ctx, &vars).await,
        },
        Commands::Mod { action } => match action {
            ModAction::List { patterns } => cmd_mod_list(ctx, output, &patterns).await,
            ModAction::Download { patterns } => cmd_mod_download(ctx, output, &patterns).await,
        },
        Commands::Pkg { action } => match action {
            PkgAction::List { patterns } => cmd_pkg_list(ctx, output, &patterns).await,
        },
    }
}

/// Run the go command as is; stdout is printed even when it fails
async fn cmd_invoke(
    ctx: &Settings,
    output: &Output,
    verb: String,
    args: Vec<String>,
) -> Result<()> {
    let invocation = Invocation::new(verb).args(args).attr(&ctx.attr);

    match ctx.invoker.invoke(&invocation).await {
        Ok(stdout) => output.raw(&stdout),
        Err(err) => {
            if let Some(stdout) = err.stdout() {
                output.raw(stdout)?;
            }
            Err(err.into())
        }
    }
}

async fn cmd_env_get(ctx: &Settings, output: &Output, vars: &[String]) -> Result<()> {
    let env = ctx.env.get(vars).await?;
    output.record(&env)
}

async fn cmd_env_set(ctx: &Settings, entries: Vec<(String, String)>) -> Result<()> {
    let env: BTreeMap<String, String> = entries.into_iter().collect();
    ctx.env.set(&env).await?;
    debug!(count = env.len(), "go env settings written");
    Ok(())
}

async fn cmd_env_unset(ctx: &Settings, vars: &[String]) -> Result<()> {
    ctx.env.unset(vars).await?;
    debug!(count = vars.len(), "go env settings removed");
    Ok(())
}

async fn cmd_mod_list(ctx: &Settings, output: &Output, patterns: &[String]) -> Result<()> {
    let loader = modlist::Loader {
        attr: ctx.attr.clone(),
        invoker: ctx.invoker.clone(),
    };
    let modules = loader.load(patterns).await?;
    output.records(&modules)
}

async fn cmd_mod_download(ctx: &Settings, output: &Output, patterns: &[String]) -> Result<()> {
    let loader = modfetch::Loader {
        attr: ctx.attr.clone(),
        invoker: ctx.invoker.clone(),
    };
    let modules = loader.load(patterns).await?;

    for module in modules.iter().filter(|m| m.error.is_some()) {
        warn!(module = %module, "module download reported an error");
    }
    output.records(&modules)
}

async fn cmd_pkg_list(ctx: &Settings, output: &Output, patterns: &[String]) -> Result<()> {
    let loader = pkglist::Loader {
        attr: ctx.attr.clone(),
        invoker: ctx.invoker.clone(),
    };
    let packages = loader.load(patterns).await?;
    output.records(&packages)
}
