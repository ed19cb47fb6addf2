//! Core engine types and utilities

pub mod types;
pub mod error;
pub mod logging;
pub mod diagnostics;

pub use types::*;
pub use error::Error;
pub use diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
