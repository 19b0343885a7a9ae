//! The contract between the build pass and the language front end.
//!
//! The pass hands each stale source to a [`FileProcessor`] and applies what
//! comes back. It never looks at declaration semantics beyond a
//! [`ProcessedFile`].

use strata_buildinfo::Fact;
use strata_config::BuildTarget;
use strata_layer::Layer;
use strata_source::SrcRecord;
use strata_typeindex::TypeIndexEntry;

use crate::runtime::RuntimeProcessor;

/// A file generated from a source, relative to the build-layer's output
/// directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFile {
    /// Path under the output directory, `/`-separated.
    pub rel_path: String,
    /// File contents.
    pub contents: Vec<u8>,
    /// Output of the outer declaration, if this is an inner-type stub.
    pub inner_of: Option<String>,
}

impl OutputFile {
    /// A generated file with the given contents.
    pub fn new(rel_path: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            rel_path: rel_path.into(),
            contents: contents.into(),
            inner_of: None,
        }
    }

    /// Marks the file as the stub of an inner declaration of `outer`.
    pub fn inner_of(mut self, outer: impl Into<String>) -> Self {
        self.inner_of = Some(outer.into());
        self
    }

    /// Extension without the dot, or an empty string.
    pub fn extension(&self) -> &str {
        self.rel_path
            .rsplit_once('.')
            .filter(|(_, ext)| !ext.contains('/'))
            .map(|(_, ext)| ext)
            .unwrap_or("")
    }
}

/// What processing one source produced.
#[derive(Debug, Clone, Default)]
pub struct ProcessedFile {
    /// Sources this one depends on, as paths relative to a source root.
    /// A change to any of them makes this file stale on the next pass.
    pub dependent_files: Vec<String>,
    /// The source has errors; its outputs are not trusted.
    pub has_errors: bool,
    /// Outputs need a native compile step after generation.
    pub needs_compile: bool,
    /// Generated files.
    pub output_files: Vec<OutputFile>,
    /// Types the source declares.
    pub declared_types: Vec<TypeIndexEntry>,
    /// Build facts the source's declarations register.
    pub facts: Vec<Fact>,
    /// Types that need dynamic handling at runtime.
    pub dynamic_types: Vec<String>,
}

impl ProcessedFile {
    /// An empty result for a file that compiles natively.
    pub fn new() -> Self {
        Self {
            needs_compile: true,
            ..Self::default()
        }
    }

    /// Adds a generated file.
    pub fn with_output(mut self, output: OutputFile) -> Self {
        self.output_files.push(output);
        self
    }

    /// Adds a declared type.
    pub fn with_type(mut self, entry: TypeIndexEntry) -> Self {
        self.declared_types.push(entry);
        self
    }

    /// Adds a build fact.
    pub fn with_fact(mut self, fact: Fact) -> Self {
        self.facts.push(fact);
        self
    }

    /// Adds a source dependency.
    pub fn depending_on(mut self, rel_path: impl Into<String>) -> Self {
        self.dependent_files.push(rel_path.into());
        self
    }

    /// Marks the file as having errors.
    pub fn with_errors(mut self) -> Self {
        self.has_errors = true;
        self
    }
}

/// A processor could not handle a file at all.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ProcessError {
    /// Description of the failure.
    pub message: String,
}

impl ProcessError {
    /// Creates an error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Everything a processor learns about where a file is being built.
#[derive(Debug, Clone, Copy)]
pub struct ProcessContext<'a> {
    /// Runtime the system builds for.
    pub runtime: RuntimeProcessor,
    /// Target of the system.
    pub target: &'a BuildTarget,
    /// Build-layer receiving the outputs.
    pub build_layer: &'a str,
    /// Layer owning the source.
    pub layer: &'a Layer,
}

/// Turns one source into generated files and declarations.
///
/// Called from several threads at once; implementations must not assume
/// any order between files.
pub trait FileProcessor: Send + Sync {
    /// Processes a single source.
    fn process(&self, record: &SrcRecord, ctx: &ProcessContext<'_>) -> Result<ProcessedFile, ProcessError>;
}

impl<F> FileProcessor for F
where
    F: Fn(&SrcRecord, &ProcessContext<'_>) -> Result<ProcessedFile, ProcessError> + Send + Sync,
{
    fn process(&self, record: &SrcRecord, ctx: &ProcessContext<'_>) -> Result<ProcessedFile, ProcessError> {
        self(record, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_extension() {
        assert_eq!(OutputFile::new("app/Main.java", "").extension(), "java");
        assert_eq!(OutputFile::new("v1.0/README", "").extension(), "");
        assert_eq!(OutputFile::new("Makefile", "").extension(), "");
    }

    #[test]
    fn new_result_compiles_natively() {
        let file = ProcessedFile::new().with_errors();
        assert!(file.needs_compile);
        assert!(file.has_errors);
        assert!(file.output_files.is_empty());
    }
}
