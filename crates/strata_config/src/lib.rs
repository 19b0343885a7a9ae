//! Parsing and validation of `strata.toml` and `layer.toml` files.
//!
//! The project file names the layer search path, the build and index
//! directories, the runtimes and processes being built, and named build
//! targets. Each layer directory carries a `layer.toml` describing the
//! layer's base layers, flags, and runtime/process affinity.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod resolve;
pub mod types;

pub use error::ConfigError;
pub use loader::{
    load_config, load_config_from_str, load_layer_def, load_layer_def_from_str, LAYER_FILE,
    PROJECT_FILE,
};
pub use resolve::{default_targets, resolve_target, BuildTarget};
pub use types::*;
