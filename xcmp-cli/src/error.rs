use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("failed to load configuration from {path}: {source}")]
    Config { path: PathBuf, #[source] source: xcmp_core::XcmpError },

    #[error("transport {transport:?} is not available from this binary: {reason}")]
    UnsupportedTransport { transport: xcmp_core::config::TransportKind, reason: &'static str },

    #[error(transparent)]
    Xcmp(#[from] xcmp_core::XcmpError),
}
