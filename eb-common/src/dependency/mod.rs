// eb-common/src/dependency/mod.rs
pub mod definition;
pub mod resolver;

pub use definition::{det_version_string, Dependency, DependencyExt, DependencyTag};
pub use resolver::{
    BuildItem, DependencyResolver, ResolutionContext, ResolutionStatus, ResolvedEasyConfig,
    ResolvedGraph,
};
