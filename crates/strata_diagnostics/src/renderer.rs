//! Diagnostic rendering for terminal output.

use crate::diagnostic::Diagnostic;
use crate::severity::Severity;

/// Trait for rendering diagnostics into formatted output strings.
pub trait DiagnosticRenderer {
    /// Renders a single diagnostic into a formatted string.
    fn render(&self, diag: &Diagnostic) -> String;
}

/// Renders diagnostics in a rustc-style terminal format.
///
/// ```text
/// warning[D001]: generated file was modified after the build wrote it
///   --> build/app/src/app/Main.java
///    = layer: app
///    = note: the file is left in place
/// ```
pub struct TerminalRenderer {
    /// Whether to use ANSI color codes in output.
    pub color: bool,
}

impl TerminalRenderer {
    /// Creates a new terminal renderer.
    pub fn new(color: bool) -> Self {
        Self { color }
    }

    fn header(&self, diag: &Diagnostic) -> String {
        let label = format!("{}[{}]", diag.severity, diag.code);
        if !self.color {
            return label;
        }
        let color = match diag.severity {
            Severity::Error => "\x1b[1;31m",
            Severity::Warning => "\x1b[1;33m",
            Severity::Note => "\x1b[1;36m",
        };
        format!("{color}{label}\x1b[0m")
    }
}

impl DiagnosticRenderer for TerminalRenderer {
    fn render(&self, diag: &Diagnostic) -> String {
        let mut out = format!("{}: {}\n", self.header(diag), diag.message);
        if let Some(path) = &diag.path {
            out.push_str(&format!("  --> {}\n", path.display()));
        }
        if let Some(layer) = &diag.layer {
            out.push_str(&format!("   = layer: {layer}\n"));
        }
        for note in &diag.notes {
            out.push_str(&format!("   = note: {note}\n"));
        }
        for help in &diag.help {
            out.push_str(&format!("   = help: {help}\n"));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::{Category, DiagnosticCode};

    #[test]
    fn render_plain() {
        let diag = Diagnostic::warning(DiagnosticCode::new(Category::Drift, 1), "edited")
            .at_path("out/Main.java")
            .in_layer("app")
            .with_note("left in place");
        let text = TerminalRenderer::new(false).render(&diag);
        assert_eq!(
            text,
            "warning[D001]: edited\n  --> out/Main.java\n   = layer: app\n   = note: left in place\n"
        );
    }

    #[test]
    fn render_colored_header() {
        let diag = Diagnostic::error(DiagnosticCode::new(Category::Graph, 2), "cycle");
        let text = TerminalRenderer::new(true).render(&diag);
        assert!(text.starts_with("\x1b[1;31merror[G002]\x1b[0m: cycle"));
    }
}
