// eb-core/src/build/steps.rs
use std::fmt;
use std::str::FromStr;

use eb_common::error::{EbError, Result};

/// The steps of a build and install, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    Fetch,
    Ready,
    Source,
    Patch,
    Prepare,
    Configure,
    Build,
    Test,
    Install,
    PostProc,
    SanityCheck,
    Cleanup,
    Module,
    Permissions,
}

impl Step {
    pub const ALL: [Step; 14] = [
        Step::Fetch,
        Step::Ready,
        Step::Source,
        Step::Patch,
        Step::Prepare,
        Step::Configure,
        Step::Build,
        Step::Test,
        Step::Install,
        Step::PostProc,
        Step::SanityCheck,
        Step::Cleanup,
        Step::Module,
        Step::Permissions,
    ];

    /// Name as used in `skipsteps`.
    pub fn name(&self) -> &'static str {
        match self {
            Step::Fetch => "fetch",
            Step::Ready => "ready",
            Step::Source => "source",
            Step::Patch => "patch",
            Step::Prepare => "prepare",
            Step::Configure => "configure",
            Step::Build => "build",
            Step::Test => "test",
            Step::Install => "install",
            Step::PostProc => "postproc",
            Step::SanityCheck => "sanitycheck",
            Step::Cleanup => "cleanup",
            Step::Module => "module",
            Step::Permissions => "permissions",
        }
    }

    /// Announced as `== <description>...`.
    pub fn description(&self) -> &'static str {
        match self {
            Step::Fetch => "fetching files",
            Step::Ready => "creating build dir, resetting environment",
            Step::Source => "unpacking",
            Step::Patch => "patching",
            Step::Prepare => "preparing",
            Step::Configure => "configuring",
            Step::Build => "building",
            Step::Test => "testing",
            Step::Install => "installing",
            Step::PostProc => "postprocessing",
            Step::SanityCheck => "sanity checking",
            Step::Cleanup => "cleaning up",
            Step::Module => "creating module",
            Step::Permissions => "permissions",
        }
    }

    /// Steps that can not be left out via `skipsteps`.
    pub fn mandatory(&self) -> bool {
        matches!(self, Step::Ready | Step::Module)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Step {
    type Err = EbError;

    fn from_str(s: &str) -> Result<Self> {
        Step::ALL
            .iter()
            .copied()
            .find(|step| step.name() == s.trim())
            .ok_or_else(|| {
                EbError::Generic(format!(
                    "Unknown step '{}' (known steps: {})",
                    s,
                    Step::ALL.map(|s| s.name()).join(", ")
                ))
            })
    }
}

/// Parses `skipsteps`, rejecting unknown and mandatory steps.
pub fn parse_skipsteps(names: &[String]) -> Result<Vec<Step>> {
    names
        .iter()
        .map(|name| {
            let step: Step = name.parse()?;
            if step.mandatory() {
                return Err(EbError::Generic(format!(
                    "Step '{step}' can not be skipped"
                )));
            }
            Ok(step)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_are_ordered_and_named() {
        assert_eq!(Step::ALL.first(), Some(&Step::Fetch));
        assert_eq!(Step::ALL.last(), Some(&Step::Permissions));
        assert_eq!("sanitycheck".parse::<Step>().unwrap(), Step::SanityCheck);
        assert_eq!(Step::Configure.description(), "configuring");
    }

    #[test]
    fn skipsteps_validation() {
        let ok = parse_skipsteps(&["test".to_string(), "sanitycheck".to_string()]).unwrap();
        assert_eq!(ok, vec![Step::Test, Step::SanityCheck]);
        assert!(parse_skipsteps(&["module".to_string()]).is_err());
        assert!(parse_skipsteps(&["compile".to_string()]).is_err());
    }
}
