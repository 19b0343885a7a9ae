//! Runtime processors: the closed set of code-generation backends.

use std::path::{Path, PathBuf};

use strata_buildinfo::{BuildInfo, MainInit};
use strata_cache::BuildLayerPaths;
use strata_source::{discover_sources, SrcRecord};

use crate::error::BuildError;
use crate::processor::{FileProcessor, OutputFile, ProcessContext, ProcessError, ProcessedFile};

/// Directory under a build-layer's output holding generated launchers.
pub const LAUNCHER_DIR: &str = "bin";

/// The backend a system generates code for, selected by runtime name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuntimeProcessor {
    /// Generates Java sources compiled to class files.
    Java,
    /// Generates JavaScript run as is.
    Js,
}

/// How to start an entry point of a built system. Running it is up to the
/// host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    /// Program to execute.
    pub program: String,
    /// Arguments, in order.
    pub args: Vec<String>,
    /// Directory to run in.
    pub working_dir: PathBuf,
}

impl RuntimeProcessor {
    /// Selects the processor for a runtime name.
    pub fn from_name(name: &str) -> Result<Self, BuildError> {
        match name {
            "java" => Ok(RuntimeProcessor::Java),
            "js" | "javascript" => Ok(RuntimeProcessor::Js),
            other => Err(BuildError::UnknownRuntime(other.to_string())),
        }
    }

    /// Canonical runtime name.
    pub fn name(self) -> &'static str {
        match self {
            RuntimeProcessor::Java => "java",
            RuntimeProcessor::Js => "js",
        }
    }

    /// Extension of generated sources.
    pub fn source_extension(self) -> &'static str {
        match self {
            RuntimeProcessor::Java => "java",
            RuntimeProcessor::Js => "js",
        }
    }

    /// Extension of compiled artifacts. Equal to the source extension when
    /// nothing is compiled.
    pub fn compiled_extension(self) -> &'static str {
        match self {
            RuntimeProcessor::Java => "class",
            RuntimeProcessor::Js => "js",
        }
    }

    /// Prepares a build-layer's output directory before its pass.
    pub fn start(self, paths: &BuildLayerPaths) -> Result<(), BuildError> {
        let out = paths.output_dir();
        std::fs::create_dir_all(out).map_err(|e| BuildError::io(out, e))?;
        tracing::debug!(runtime = self.name(), output = %out.display(), "runtime started");
        Ok(())
    }

    /// Runs the front end on one source.
    pub fn process(
        self,
        processor: &dyn FileProcessor,
        record: &SrcRecord,
        ctx: &ProcessContext<'_>,
    ) -> Result<ProcessedFile, ProcessError> {
        let mut processed = processor.process(record, ctx)?;
        if self == RuntimeProcessor::Js {
            processed.needs_compile = false;
        }
        Ok(processed)
    }

    /// Files generated once per pass from the accumulated build info:
    /// one launcher per registered entry point.
    pub fn post_process(self, info: &BuildInfo) -> Vec<OutputFile> {
        info.main_inits()
            .map(|main| {
                OutputFile::new(
                    format!("{LAUNCHER_DIR}/{}", main.launcher_name),
                    self.launcher_script(main),
                )
            })
            .collect()
    }

    fn launcher_script(self, main: &MainInit) -> String {
        let invocation = match self {
            RuntimeProcessor::Java => {
                format!("exec java -cp \"$root\" {} \"$@\"", main.type_name)
            }
            RuntimeProcessor::Js => format!(
                "exec node \"$root/{}.js\" \"$@\"",
                main.type_name.replace('.', "/")
            ),
        };
        format!("#!/bin/sh\nroot=\"$(dirname \"$0\")/..\"\n{invocation}\n")
    }

    /// Compiled artifacts present under an output directory, sorted.
    pub fn compiled_files(self, output_dir: &Path) -> Result<Vec<PathBuf>, BuildError> {
        let files = discover_sources(output_dir, &[self.compiled_extension()])
            .map_err(|e| BuildError::io(output_dir, e))?;
        Ok(files.into_iter().map(|f| f.abs_path).collect())
    }

    /// Plan for running a registered entry point, or `None` if `type_name`
    /// is not one.
    pub fn run_main(self, output_dir: &Path, info: &BuildInfo, type_name: &str) -> Option<LaunchPlan> {
        let main = info.main_init(type_name)?;
        let (program, args) = match self {
            RuntimeProcessor::Java => (
                "java",
                vec![
                    "-cp".to_string(),
                    output_dir.display().to_string(),
                    main.type_name.clone(),
                ],
            ),
            RuntimeProcessor::Js => (
                "node",
                vec![output_dir
                    .join(format!("{}.js", main.type_name.replace('.', "/")))
                    .display()
                    .to_string()],
            ),
        };
        Some(LaunchPlan {
            program: program.to_string(),
            args,
            working_dir: output_dir.to_path_buf(),
        })
    }
}
