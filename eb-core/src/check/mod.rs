// eb-core/src/check/mod.rs
//! Host diagnostics: `--show-system-info` and `--check-eb-deps`.
pub mod eb_deps;
pub mod system_info;

pub use eb_deps::{check_eb_deps, ToolCheck, ToolStatus};
pub use system_info::{hostname, SystemInfo};
