// eb-common/src/easyconfig/templates.rs
use std::collections::BTreeMap;

use super::value::Value;

/// Templates derived from the easyconfig instance.
pub const TEMPLATE_NAMES_EASYCONFIG: &[(&str, &str)] = &[
    ("nameletter", "First character of software name"),
    ("toolchain_name", "Toolchain name"),
    ("toolchain_version", "Toolchain version"),
    ("version_major", "Major version"),
    ("version_minor", "Minor version"),
    ("version_major_minor", "Major.Minor version"),
];

/// Parameters usable as templates with the value they are set to.
pub const TEMPLATE_NAMES_CONFIG: &[&str] = &["github_account", "name", "version", "versionsuffix"];

/// Templates that also get a lowercase variant, `%(<name>lower)s`.
pub const TEMPLATE_NAMES_LOWER: &[&str] = &["name", "nameletter"];

/// Known once the build has started.
pub const TEMPLATE_NAMES_EASYBLOCK_RUN_STEP: &[(&str, &str)] = &[
    ("builddir", "Build directory"),
    ("installdir", "Installation directory"),
];

/// Determined on the host running the build.
pub const TEMPLATE_NAMES_DYNAMIC: &[(&str, &str)] = &[
    ("arch", "System architecture (e.g. x86_64, aarch64, ppc64le, ...)"),
    ("parallel", "Degree of parallelism for e.g. make"),
];

/// Software whose version is exposed as `%(<prefix>ver)s`, `%(<prefix>shortver)s` and
/// `%(<prefix>majver)s` when it is the software itself or one of its (build) dependencies.
pub const TEMPLATE_SOFTWARE_VERSIONS: &[(&str, &str)] = &[
    ("CUDA", "cuda"),
    ("CUDAcore", "cuda"),
    ("Java", "java"),
    ("Perl", "perl"),
    ("Python", "py"),
    ("R", "r"),
];

/// Constants resolved at parse time, usable by name in easyconfigs: (name, value, description).
pub fn template_constants() -> Vec<(&'static str, Value, &'static str)> {
    vec![
        (
            "ARCH",
            Value::Str(std::env::consts::ARCH.to_string()),
            "CPU architecture of current system (aarch64, x86_64, ppc64le, ...)",
        ),
        (
            "EXTERNAL_MODULE",
            Value::Str("EXTERNAL_MODULE".to_string()),
            "External module marker",
        ),
        (
            "SHLIB_EXT",
            Value::Str(shared_lib_ext().to_string()),
            "extension for shared libraries",
        ),
    ]
}

pub fn shared_lib_ext() -> &'static str {
    match std::env::consts::OS {
        "macos" => "dylib",
        "windows" => "dll",
        _ => "so",
    }
}

pub type TemplateValues = BTreeMap<String, String>;

/// `%(<prefix>ver)s` and friends for the first entry of `software` listed in
/// `TEMPLATE_SOFTWARE_VERSIONS`, per prefix.
pub fn software_version_templates<'a>(
    software: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> TemplateValues {
    let mut values = TemplateValues::new();
    for (name, version) in software {
        let Some((_, prefix)) = TEMPLATE_SOFTWARE_VERSIONS.iter().find(|(n, _)| *n == name) else {
            continue;
        };
        if values.contains_key(&format!("{prefix}ver")) {
            continue;
        }
        let mut parts = version.split('.');
        let major = parts.next().unwrap_or_default();
        let short = match parts.next() {
            Some(minor) => format!("{major}.{minor}"),
            None => major.to_string(),
        };
        values.insert(format!("{prefix}majver"), major.to_string());
        values.insert(format!("{prefix}shortver"), short);
        values.insert(format!("{prefix}ver"), version.to_string());
    }
    values
}

/// Replaces every `%(key)s` whose key is known; unknown templates stay untouched.
pub fn resolve_template(input: &str, values: &TemplateValues) -> String {
    if !input.contains("%(") {
        return input.to_string();
    }
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("%(") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find(")s") {
            Some(end) if values.contains_key(&after[..end]) => {
                out.push_str(&values[&after[..end]]);
                rest = &after[end + 2..];
            }
            _ => {
                out.push_str("%(");
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Applies `resolve_template` to every string nested in `value`.
pub fn resolve_value(value: &Value, values: &TemplateValues) -> Value {
    match value {
        Value::Str(s) => Value::Str(resolve_template(s, values)),
        Value::List(items) => Value::List(items.iter().map(|v| resolve_value(v, values)).collect()),
        Value::Tuple(items) => Value::Tuple(items.iter().map(|v| resolve_value(v, values)).collect()),
        Value::Dict(items) => Value::Dict(
            items
                .iter()
                .map(|(k, v)| (k.clone(), resolve_value(v, values)))
                .collect(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values() -> TemplateValues {
        let mut v = TemplateValues::new();
        v.insert("name".into(), "bzip2".into());
        v.insert("version".into(), "1.0.8".into());
        v
    }

    #[test]
    fn known_templates_are_replaced() {
        assert_eq!(
            resolve_template("%(name)s-%(version)s.tar.gz", &values()),
            "bzip2-1.0.8.tar.gz"
        );
    }

    #[test]
    fn unknown_templates_are_kept() {
        assert_eq!(
            resolve_template("%(installdir)s/bin and %(name)s", &values()),
            "%(installdir)s/bin and bzip2"
        );
        assert_eq!(resolve_template("100% (sure)", &values()), "100% (sure)");
    }

    #[test]
    fn software_versions_from_first_match() {
        let values = software_version_templates([
            ("zlib", "1.3"),
            ("Python", "3.11.5"),
            ("Python", "2.7.18"),
            ("CUDAcore", "12"),
        ]);
        assert_eq!(values["pyver"], "3.11.5");
        assert_eq!(values["pyshortver"], "3.11");
        assert_eq!(values["pymajver"], "3");
        assert_eq!(values["cudashortver"], "12");
        assert!(!values.contains_key("perlver"));
    }

    #[test]
    fn template_constants_describe_host() {
        let constants = template_constants();
        let shlib = constants.iter().find(|(n, _, _)| *n == "SHLIB_EXT").unwrap();
        assert_eq!(shlib.1, Value::Str(shared_lib_ext().to_string()));
        assert!(constants.iter().any(|(n, v, _)| *n == "ARCH" && !v.to_plain_string().is_empty()));
    }

    #[test]
    fn nested_values_are_resolved() {
        let v = Value::List(vec![Value::Tuple(vec![Value::Str("%(name)s".into())])]);
        assert_eq!(
            resolve_value(&v, &values()),
            Value::List(vec![Value::Tuple(vec![Value::Str("bzip2".into())])])
        );
    }
}
