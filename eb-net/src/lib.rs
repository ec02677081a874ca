// eb-net/src/lib.rs
pub mod http;
pub mod validation;

pub use http::{fetch_all, fetch_file, SourceRequest};
pub use validation::{local_path_for, validate_url};
