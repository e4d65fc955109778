//! Reporting side channel
//!
//! Progress messages, retry notices and degraded responses are sent to a
//! [`Reporter`] owned by the client instead of a process-wide logger. Each call
//! carries its own [`Verbosity`]; errors are always reported, informational
//! messages only for verbose calls.

use std::fmt;
use std::sync::Arc;
use tracing::{error, info};

/// How much a single call reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Errors only
    #[default]
    Quiet,
    /// Errors plus progress and retry detail
    Verbose,
}

impl Verbosity {
    /// Map a `--verbose` style flag
    pub fn from_flag(verbose: bool) -> Self {
        if verbose {
            Verbosity::Verbose
        } else {
            Verbosity::Quiet
        }
    }

    /// Whether informational messages are emitted
    pub fn is_verbose(&self) -> bool {
        matches!(self, Verbosity::Verbose)
    }
}

/// Sink for lookup diagnostics
pub trait Reporter: Send + Sync + fmt::Debug {
    /// Progress and retry detail
    fn info(&self, message: &str);

    /// Failures that must stay observable
    fn error(&self, message: &str);
}

/// Default reporter forwarding to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn info(&self, message: &str) {
        info!(target: "placekey_client::report", "{message}");
    }

    fn error(&self, message: &str) {
        error!(target: "placekey_client::report", "{message}");
    }
}

/// A reporter bound to the verbosity of one call
#[derive(Debug, Clone)]
pub struct CallReporter {
    reporter: Arc<dyn Reporter>,
    verbosity: Verbosity,
}

impl CallReporter {
    /// Bind `reporter` to `verbosity`
    pub fn new(reporter: Arc<dyn Reporter>, verbosity: Verbosity) -> Self {
        Self { reporter, verbosity }
    }

    /// Verbosity of the current call
    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    /// Report progress detail if the call is verbose
    pub fn info(&self, message: &str) {
        if self.verbosity.is_verbose() {
            self.reporter.info(message);
        }
    }

    /// Report a failure
    pub fn error(&self, message: &str) {
        self.reporter.error(message);
    }
}
