// eb-aio/src/lib.rs
//! IO operations for eb (checksums, archives, processes, filesystem)

pub mod checksum;
pub mod extract;
pub mod fs;
pub mod process;

pub use checksum::{compute_sha256, verify_checksum_async, verify_checksum_sync};
pub use extract::{extract_archive, is_archive};
pub use process::{run_command_sync, run_shell, ShellCommand, ShellOutput};
