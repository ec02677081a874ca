// eb-common/src/version.rs
//! Loose version comparison for software versions that are not semver
//! (`1.0.8`, `2023a`, `12.3.0`, `1.2.13-rc1`).
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Component {
    Num(u64),
    Alpha(String),
}

#[derive(Debug, Clone)]
pub struct LooseVersion {
    raw: String,
    components: Vec<Component>,
}

impl LooseVersion {
    pub fn parse(raw: &str) -> std::result::Result<Self, String> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err("empty version string".to_string());
        }
        let mut components = Vec::new();
        let mut current = String::new();
        let mut current_is_digit = false;

        let mut flush = |current: &mut String, is_digit: bool| {
            if current.is_empty() {
                return;
            }
            if is_digit {
                // digit runs always fit unless absurdly long; fall back to text
                match current.parse::<u64>() {
                    Ok(n) => components.push(Component::Num(n)),
                    Err(_) => components.push(Component::Alpha(current.clone())),
                }
            } else {
                components.push(Component::Alpha(current.clone()));
            }
            current.clear();
        };

        for c in raw.chars() {
            if c == '.' || c == '-' || c == '_' {
                flush(&mut current, current_is_digit);
                continue;
            }
            let is_digit = c.is_ascii_digit();
            if !current.is_empty() && is_digit != current_is_digit {
                flush(&mut current, current_is_digit);
            }
            current_is_digit = is_digit;
            current.push(c);
        }
        flush(&mut current, current_is_digit);

        Ok(Self {
            raw: raw.to_string(),
            components,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for LooseVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl PartialEq for LooseVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for LooseVersion {}

impl PartialOrd for LooseVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LooseVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        for (a, b) in self.components.iter().zip(other.components.iter()) {
            let ord = match (a, b) {
                (Component::Num(x), Component::Num(y)) => x.cmp(y),
                (Component::Alpha(x), Component::Alpha(y)) => x.cmp(y),
                // numbers sort after text, so 1.0.rc1 < 1.0.0
                (Component::Num(_), Component::Alpha(_)) => Ordering::Greater,
                (Component::Alpha(_), Component::Num(_)) => Ordering::Less,
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        self.components.len().cmp(&other.components.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> LooseVersion {
        LooseVersion::parse(s).unwrap()
    }

    #[test]
    fn numeric_components_compare_numerically() {
        assert!(v("1.10") > v("1.9"));
        assert!(v("12.3.0") > v("12.2.0"));
        assert!(v("5.0") > v("4.9.4"));
        assert_eq!(v("1.0.8"), v("1.0.8"));
    }

    #[test]
    fn longer_version_wins_on_common_prefix() {
        assert!(v("1.0.1") > v("1.0"));
    }

    #[test]
    fn toolchain_generations() {
        assert!(v("2023a") > v("2022b"));
        assert!(v("2023b") > v("2023a"));
    }

    #[test]
    fn empty_is_rejected() {
        assert!(LooseVersion::parse("  ").is_err());
    }
}
