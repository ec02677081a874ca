// eb-common/src/lib.rs
pub mod config;
pub mod dependency;
pub mod easyconfig;
pub mod error;
pub mod installed;
pub mod receipt;
pub mod repository;
pub mod toolchain;
pub mod version;

// Re-export key types
pub use config::Config;
pub use easyconfig::{parse_easyconfig, EasyConfig};
pub use error::{EbError, Result};
pub use installed::InstalledModules;
pub use receipt::InstallReceipt;
pub use repository::EasyConfigRepository;
