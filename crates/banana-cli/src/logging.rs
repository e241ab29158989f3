//! Diagnostics go to stderr; stdout belongs to the protocol.

use std::io;

use tracing::Level;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const CRATE_TARGETS: [&str; 3] = ["banana_cli", "banana_engine", "banana_contracts"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    Quiet,
    #[default]
    Normal,
    Verbose,
    Trace,
}

impl Verbosity {
    /// `-q` wins over any number of `-v`.
    pub fn from_flags(quiet: bool, verbose: u8) -> Self {
        if quiet {
            return Self::Quiet;
        }
        match verbose {
            0 => Self::Normal,
            1 => Self::Verbose,
            _ => Self::Trace,
        }
    }

    pub fn to_level(self) -> Level {
        match self {
            Self::Quiet => Level::ERROR,
            Self::Normal => Level::INFO,
            Self::Verbose => Level::DEBUG,
            Self::Trace => Level::TRACE,
        }
    }

    fn default_directives(self) -> String {
        let level = self.to_level();
        CRATE_TARGETS
            .iter()
            .map(|target| format!("{target}={level}"))
            .collect::<Vec<String>>()
            .join(",")
    }
}

/// Installs the global subscriber. `RUST_LOG` overrides the verbosity flags.
/// Fails if a subscriber is already installed.
pub fn init_logging(verbosity: Verbosity) -> Result<(), TryInitError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.default_directives()));

    let subscriber = tracing_subscriber::registry().with(env_filter).with(
        fmt::layer()
            .with_writer(io::stderr)
            .with_ansi(false)
            .with_target(true),
    );

    subscriber.try_init()
}
