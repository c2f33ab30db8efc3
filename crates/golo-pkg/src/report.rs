//! Verbose progress output.

use std::fmt::Display;

/// Writes progress lines to stderr when verbose output is enabled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Reporter {
    verbose: bool,
}

impl Reporter {
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// A reporter that never prints.
    #[must_use]
    pub fn quiet() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Print a line if verbose.
    pub fn report(&self, message: impl Display) {
        if self.verbose {
            eprintln!("{message}");
        }
    }
}
