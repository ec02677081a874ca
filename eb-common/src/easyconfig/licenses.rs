// eb-common/src/easyconfig/licenses.rs
//! Licenses an easyconfig can declare via `software_license`. Each one is available
//! as a constant named `License<name>`, e.g. `software_license = LicenseGPLv3`.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct License {
    pub name: &'static str,
    pub description: &'static str,
    pub version: Option<&'static [u32]>,
}

impl License {
    /// Name of the constant easyconfigs refer to this license by.
    pub fn constant_name(&self) -> String {
        format!("License{}", self.name)
    }

    pub fn version_string(&self) -> Option<String> {
        self.version.map(|parts| {
            parts
                .iter()
                .map(u32::to_string)
                .collect::<Vec<_>>()
                .join(".")
        })
    }
}

const GPL_DESCRIPTION: &str = "The GNU General Public License is a free, copyleft license for software and other kinds of works.";
const LGPL_DESCRIPTION: &str = "The GNU Lesser General Public License, a weaker copyleft than the GPL for libraries.";

const LICENSES: &[License] = &[
    License {
        name: "BSD3",
        description: "The 3-clause BSD license, a permissive license with an advertising-free attribution clause.",
        version: None,
    },
    License {
        name: "GCC",
        description: "The GNU General Public License version 3 with the GCC Runtime Library Exception.",
        version: Some(&[3]),
    },
    License {
        name: "GPLv2",
        description: GPL_DESCRIPTION,
        version: Some(&[2]),
    },
    License {
        name: "GPLv3",
        description: GPL_DESCRIPTION,
        version: Some(&[3]),
    },
    License {
        name: "LGPLv2_1",
        description: LGPL_DESCRIPTION,
        version: Some(&[2, 1]),
    },
    License {
        name: "LGPLv3",
        description: LGPL_DESCRIPTION,
        version: Some(&[3]),
    },
    License {
        name: "Libpng",
        description: "The PNG license is derived from the zlib license.",
        version: None,
    },
    License {
        name: "MIT",
        description: "The MIT license, a short permissive license.",
        version: None,
    },
    License {
        name: "Proprietary",
        description: "Proprietary license; redistribution requires permission of the author.",
        version: None,
    },
    License {
        name: "Unknown",
        description: "Unknown license, but requires full written consent by the author.",
        version: None,
    },
    License {
        name: "VeryRestrictive",
        description: "Default license should be very restrictive, so nothing to do here, just a placeholder.",
        version: None,
    },
    License {
        name: "Zlib",
        description: "The zlib license is a permissive free software license.",
        version: None,
    },
];

/// Known licenses, sorted by name.
pub fn all_licenses() -> &'static [License] {
    LICENSES
}

pub fn license_by_name(name: &str) -> Option<&'static License> {
    LICENSES.iter().find(|l| l.name == name)
}

/// Resolves a `License<name>` constant.
pub fn license_constant(constant: &str) -> Option<&'static License> {
    constant.strip_prefix("License").and_then(license_by_name)
}
