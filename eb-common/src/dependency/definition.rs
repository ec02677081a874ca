// eb-common/src/dependency/definition.rs
use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::toolchain::ToolchainSpec;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct DependencyTag: u8 {
        const RUNTIME   = 0b00000001;
        const BUILD     = 0b00000010;
        /// The dependency is the toolchain of its parent.
        const TOOLCHAIN = 0b00000100;
    }
}

impl Default for DependencyTag {
    fn default() -> Self {
        Self::RUNTIME
    }
}

impl fmt::Display for DependencyTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dependency {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub versionsuffix: String,
    pub toolchain: ToolchainSpec,
    /// Toolchain was not given explicitly and was taken from the parent easyconfig;
    /// robot lookups may then fall back to sub-toolchains.
    #[serde(default)]
    pub toolchain_inherited: bool,
    #[serde(default)]
    pub tags: DependencyTag,
}

impl Dependency {
    pub fn new_runtime(
        name: impl Into<String>,
        version: impl Into<String>,
        toolchain: ToolchainSpec,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            versionsuffix: String::new(),
            toolchain,
            toolchain_inherited: false,
            tags: DependencyTag::RUNTIME,
        }
    }

    pub fn with_tags(mut self, tags: DependencyTag) -> Self {
        self.tags = tags;
        self
    }

    pub fn version_string(&self) -> String {
        det_version_string(&self.version, &self.toolchain, &self.versionsuffix)
    }

    /// `name/versionstring`, the flat module naming scheme.
    pub fn module_name(&self) -> String {
        format!("{}/{}", self.name, self.version_string())
    }

    pub fn easyconfig_filename(&self) -> String {
        format!("{}-{}.eb", self.name, self.version_string())
    }

    /// Same dependency resolved against a different toolchain.
    pub fn with_toolchain(&self, toolchain: ToolchainSpec) -> Self {
        let mut dep = self.clone();
        dep.toolchain = toolchain;
        dep
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.module_name())
    }
}

/// `version` + toolchain infix + `versionsuffix`, e.g. `1.2.13-GCCcore-12.3.0`.
pub fn det_version_string(version: &str, toolchain: &ToolchainSpec, versionsuffix: &str) -> String {
    format!("{version}{}{versionsuffix}", toolchain.version_infix())
}

pub trait DependencyExt {
    fn filter_by_tags(&self, include: DependencyTag, exclude: DependencyTag) -> Vec<&Dependency>;
    fn runtime(&self) -> Vec<&Dependency>;
    fn build_time(&self) -> Vec<&Dependency>;
}

impl DependencyExt for Vec<Dependency> {
    fn filter_by_tags(&self, include: DependencyTag, exclude: DependencyTag) -> Vec<&Dependency> {
        self.iter()
            .filter(|dep| dep.tags.intersects(include) && !dep.tags.intersects(exclude))
            .collect()
    }

    fn runtime(&self) -> Vec<&Dependency> {
        self.iter()
            .filter(|dep| dep.tags.contains(DependencyTag::RUNTIME))
            .collect()
    }

    fn build_time(&self) -> Vec<&Dependency> {
        self.iter()
            .filter(|dep| dep.tags.intersects(DependencyTag::BUILD | DependencyTag::RUNTIME))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_and_file_names() {
        let mut dep = Dependency::new_runtime("zlib", "1.2.13", ToolchainSpec::new("GCCcore", "12.3.0"));
        assert_eq!(dep.module_name(), "zlib/1.2.13-GCCcore-12.3.0");
        assert_eq!(dep.easyconfig_filename(), "zlib-1.2.13-GCCcore-12.3.0.eb");
        dep.versionsuffix = "-static".to_string();
        assert_eq!(dep.version_string(), "1.2.13-GCCcore-12.3.0-static");
        let sys = dep.with_toolchain(ToolchainSpec::system());
        assert_eq!(sys.module_name(), "zlib/1.2.13-static");
    }

    #[test]
    fn tag_filters() {
        let tc = ToolchainSpec::system();
        let deps = vec![
            Dependency::new_runtime("a", "1", tc.clone()),
            Dependency::new_runtime("b", "1", tc.clone()).with_tags(DependencyTag::BUILD),
            Dependency::new_runtime("c", "1", tc)
                .with_tags(DependencyTag::TOOLCHAIN | DependencyTag::RUNTIME),
        ];
        assert_eq!(deps.runtime().len(), 2);
        assert_eq!(deps.build_time().len(), 3);
        assert_eq!(
            deps.filter_by_tags(DependencyTag::RUNTIME, DependencyTag::TOOLCHAIN)
                .len(),
            1
        );
    }
}
