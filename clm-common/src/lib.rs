pub mod config;
pub mod error;
pub mod model;
pub mod tracing_setup;

pub use error::{BuildError, ErrorCategory, ErrorKind, ErrorSeverity, StructuredError};
pub use model::*;

#[cfg(test)]
test_r::enable!();

/// Implemented by every loadable config struct so it can be logged without
/// leaking secrets (db paths, worker image refs, tokens).
pub trait SafeDisplay {
    fn to_safe_string(&self) -> String;

    /// Indents every line by two spaces, for nesting inside a parent's
    /// `to_safe_string` output.
    fn to_safe_string_indented(&self) -> String {
        self.to_safe_string()
            .lines()
            .map(|line| format!("  {line}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
