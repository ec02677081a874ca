// eb-core/src/lib.rs

pub mod bootstrap;
pub mod build;
pub mod check;
pub mod docs;
pub mod easyblocks;
pub mod module_gen;
pub mod modules_tool;

/// Version of the framework; easyblocks ship with it and share the version.
pub const EB_VERSION: &str = env!("CARGO_PKG_VERSION");

pub use build::{build_and_install, BuildOptions, BuildOutcome};
pub use easyblocks::{get_easyblock, EasyBlock};
pub use module_gen::{module_generator, ModuleGenerator, ModuleSpec};
pub use modules_tool::{modules_tool, ModulesTool};
