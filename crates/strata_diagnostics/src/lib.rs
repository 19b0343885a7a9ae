//! Diagnostic creation, severity management, and rendering.
//!
//! Problems found while composing layers or running an incremental build are
//! reported as structured [`Diagnostic`]s rather than returned as errors, so
//! one broken layer or one hand-edited generated file never aborts unrelated
//! work. The thread-safe [`DiagnosticSink`] accumulates them and tracks the
//! error count the host compares against its fatal-error threshold.

#![warn(missing_docs)]

pub mod code;
pub mod diagnostic;
pub mod renderer;
pub mod severity;
pub mod sink;

pub use code::{Category, DiagnosticCode};
pub use diagnostic::Diagnostic;
pub use renderer::{DiagnosticRenderer, TerminalRenderer};
pub use severity::Severity;
pub use sink::DiagnosticSink;
