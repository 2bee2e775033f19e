//! Tracing setup.
//!
//! The dashboard owns the terminal, so log output never goes to stdout.
//! Set `BULLSCOPE_LOG_FILE` to append logs to a file; otherwise they are
//! discarded. `LOG_FORMAT=json` switches to JSON lines and `RUST_LOG`
//! overrides the default `bullscope=info` filter.

use std::fs::OpenOptions;
use std::io;
use std::sync::Mutex;

use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::TuiResult;

/// Default filter directive when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "bullscope=info";

/// Where log lines are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    File(String),
    Discard,
}

impl LogTarget {
    pub fn from_env() -> Self {
        match std::env::var("BULLSCOPE_LOG_FILE") {
            Ok(path) if !path.trim().is_empty() => LogTarget::File(path),
            _ => LogTarget::Discard,
        }
    }

    fn writer(&self) -> TuiResult<BoxMakeWriter> {
        Ok(match self {
            LogTarget::File(path) => {
                let file = OpenOptions::new().create(true).append(true).open(path)?;
                BoxMakeWriter::new(Mutex::new(file))
            }
            LogTarget::Discard => BoxMakeWriter::new(io::sink),
        })
    }
}

fn use_json() -> bool {
    std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false)
}

/// Install the global subscriber. Safe to call more than once; later calls
/// leave the first subscriber in place.
pub fn init_logging() -> TuiResult<LogTarget> {
    let target = LogTarget::from_env();
    let writer = target.writer()?;
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    // try_init: a subscriber installed earlier (tests) stays in place.
    if use_json() {
        let _ = tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(writer))
            .with(env_filter)
            .try_init();
    } else {
        let _ = tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .try_init();
    }

    Ok(target)
}
