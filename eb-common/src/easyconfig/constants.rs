// eb-common/src/easyconfig/constants.rs
use super::licenses::license_constant;
use super::templates::template_constants;
use super::value::Value;

/// Constants available by name in easyconfig files: (name, value, description).
pub fn easyconfig_constants() -> Vec<(&'static str, Value, &'static str)> {
    let s = |v: &str| Value::Str(v.to_string());
    vec![
        (
            "SYSTEM",
            Value::Dict(vec![
                ("name".to_string(), s("system")),
                ("version".to_string(), s("system")),
            ]),
            "System toolchain",
        ),
        ("OS_TYPE", s(os_type()), "System type (e.g. 'Linux' or 'Darwin')"),
        (
            "SOURCE_TAR_GZ",
            s("%(name)s-%(version)s.tar.gz"),
            "Source .tar.gz bundle",
        ),
        (
            "SOURCELOWER_TAR_GZ",
            s("%(namelower)s-%(version)s.tar.gz"),
            "Source .tar.gz bundle with lowercase name",
        ),
        (
            "SOURCE_TGZ",
            s("%(name)s-%(version)s.tgz"),
            "Source .tgz bundle",
        ),
        (
            "SOURCE_TAR_BZ2",
            s("%(name)s-%(version)s.tar.bz2"),
            "Source .tar.bz2 bundle",
        ),
        (
            "SOURCELOWER_TAR_BZ2",
            s("%(namelower)s-%(version)s.tar.bz2"),
            "Source .tar.bz2 bundle with lowercase name",
        ),
        (
            "SOURCE_TAR_XZ",
            s("%(name)s-%(version)s.tar.xz"),
            "Source .tar.xz bundle",
        ),
        (
            "SOURCELOWER_TAR_XZ",
            s("%(namelower)s-%(version)s.tar.xz"),
            "Source .tar.xz bundle with lowercase name",
        ),
        ("SOURCE_ZIP", s("%(name)s-%(version)s.zip"), "Source .zip bundle"),
        (
            "SOURCELOWER_ZIP",
            s("%(namelower)s-%(version)s.zip"),
            "Source .zip bundle with lowercase name",
        ),
        (
            "GNU_SOURCE",
            s("https://ftpmirror.gnu.org/gnu/%(namelower)s"),
            "GNU source url",
        ),
        (
            "GITHUB_SOURCE",
            s("https://github.com/%(github_account)s/%(name)s/archive"),
            "GitHub source URL (namelower is used if github_account is not specified)",
        ),
        (
            "GITHUB_LOWER_SOURCE",
            s("https://github.com/%(github_account)s/%(namelower)s/archive"),
            "GitHub source URL with lowercase name",
        ),
        (
            "SOURCEFORGE_SOURCE",
            s("https://download.sourceforge.net/%(namelower)s"),
            "Source url for SourceForge",
        ),
        (
            "PYPI_SOURCE",
            s("https://pypi.python.org/packages/source/%(nameletter)s/%(name)s"),
            "Source url for PyPi packages",
        ),
        (
            "XORG_LIB_SOURCE",
            s("https://xorg.freedesktop.org/archive/individual/lib/"),
            "Source url for X.org libraries",
        ),
    ]
}

/// Value of a name an easyconfig may use without defining it: easyconfig constants,
/// template constants and `License*` constants.
pub fn lookup_constant(name: &str) -> Option<Value> {
    easyconfig_constants()
        .into_iter()
        .chain(template_constants())
        .find(|(n, _, _)| *n == name)
        .map(|(_, v, _)| v)
        .or_else(|| license_constant(name).map(|l| Value::Str(l.name.to_string())))
}

pub fn os_type() -> &'static str {
    match std::env::consts::OS {
        "linux" => "Linux",
        "macos" => "Darwin",
        "windows" => "Windows",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_covers_every_constant_kind() {
        assert_eq!(lookup_constant("SOURCE_ZIP"), Some(Value::Str("%(name)s-%(version)s.zip".into())));
        assert_eq!(lookup_constant("EXTERNAL_MODULE"), Some(Value::Str("EXTERNAL_MODULE".into())));
        assert_eq!(lookup_constant("LicenseMIT"), Some(Value::Str("MIT".into())));
        assert_eq!(lookup_constant("NO_SUCH_CONSTANT"), None);
    }
}
