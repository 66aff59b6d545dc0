use std::fmt;
use std::str::FromStr;

use winnow::error::{ContextError, ErrMode, StrContext};
use winnow::prelude::*;
use winnow::token::take_while;

use crate::cpn::{is_valid_package, parse_category, Cpn};
use crate::error::{Error, Result};
use crate::version::Version;

/// Category/Package/Version (Cpv)
///
/// Represents versioned package names like `dev-lang/rust-1.75.0`.
///
/// Package names may themselves contain hyphens and digits, so the split point
/// is the right-most `-<digit>` boundary where the tail is a valid version and
/// the head is a valid package name.
///
/// See [PMS 3.2](https://projects.gentoo.org/pms/9/pms.html#version-specifications).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cpv {
    pub cpn: Cpn,
    pub version: Version,
}

impl Cpv {
    pub fn new(cpn: Cpn, version: Version) -> Self {
        Cpv { cpn, version }
    }

    /// Parse from string
    pub fn parse(input: &str) -> Result<Self> {
        parse_cpv()
            .parse(input)
            .map_err(|e| Error::InvalidCpv(format!("{}: {}", input, e)))
    }

    /// Try to create from string (alias for parse)
    pub fn try_new(s: &str) -> Result<Self> {
        Self::parse(s)
    }

    pub fn category(&self) -> &str {
        &self.cpn.category
    }

    pub fn package(&self) -> &str {
        &self.cpn.package
    }
}

impl fmt::Display for Cpv {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}-{}", self.cpn, self.version)
    }
}

impl PartialOrd for Cpv {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Cpv {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        match self.cpn.cmp(&other.cpn) {
            std::cmp::Ordering::Equal => self.version.cmp(&other.version),
            other => other,
        }
    }
}

impl FromStr for Cpv {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Cpv {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for Cpv {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Cpv::parse(&text).map_err(serde::de::Error::custom)
    }
}

/// Split `pkg-ver` into a valid package name and version
pub(crate) fn split_package_version(pkg_ver: &str) -> Option<(&str, Version)> {
    let bytes = pkg_ver.as_bytes();
    (0..bytes.len().saturating_sub(1))
        .rev()
        .filter(|&i| bytes[i] == b'-' && bytes[i + 1].is_ascii_digit())
        .find_map(|i| {
            let package = &pkg_ver[..i];
            if !is_valid_package(package) {
                return None;
            }
            Version::parse(&pkg_ver[i + 1..])
                .ok()
                .map(|version| (package, version))
        })
}

pub(crate) fn is_pkg_ver_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '+' || c == '.'
}

// Winnow parsers

pub(crate) fn parse_cpv<'s>() -> impl Parser<&'s str, Cpv, ErrMode<ContextError>> {
    (parse_category(), '/', take_while(1.., is_pkg_ver_char))
        .verify_map(|(category, _, pkg_ver): (String, char, &str)| {
            let (package, version) = split_package_version(pkg_ver)?;
            Some(Cpv {
                cpn: Cpn::new(category, package),
                version,
            })
        })
        .context(StrContext::Label("cpv"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpv_parsing() {
        let cpv = Cpv::parse("dev-lang/rust-1.75.0").unwrap();
        assert_eq!(cpv.category(), "dev-lang");
        assert_eq!(cpv.package(), "rust");
        assert_eq!(cpv.version.numbers, vec!["1", "75", "0"]);
        assert_eq!(cpv.to_string(), "dev-lang/rust-1.75.0");
    }

    #[test]
    fn test_cpv_with_revision() {
        let cpv = Cpv::parse("dev-lang/rust-1.75.0-r1").unwrap();
        assert_eq!(cpv.version.revision.0, 1);
        assert_eq!(cpv.to_string(), "dev-lang/rust-1.75.0-r1");
    }

    #[test]
    fn test_cpv_hyphenated_package() {
        let cpv = Cpv::parse("dev-libs/foo-2bar-1.0").unwrap();
        assert_eq!(cpv.package(), "foo-2bar");
        assert_eq!(cpv.version.to_string(), "1.0");

        let cpv = Cpv::parse("media-fonts/font-adobe-100dpi-1.0.3").unwrap();
        assert_eq!(cpv.package(), "font-adobe-100dpi");
    }

    #[test]
    fn test_invalid_cpv() {
        assert!(Cpv::parse("dev-lang/rust").is_err());
        assert!(Cpv::parse("dev-lang/rust-1.0-5").is_err());
        assert!(Cpv::parse("dev-lang/rust-").is_err());
    }

    #[test]
    fn test_cpv_comparison() {
        let cpv1 = Cpv::parse("dev-lang/rust-1.75.0").unwrap();
        let cpv2 = Cpv::parse("dev-lang/rust-1.76.0").unwrap();
        assert!(cpv1 < cpv2);

        let cpv3 = Cpv::parse("dev-lang/rust-1.75.0-r1").unwrap();
        assert!(cpv1 < cpv3);
    }
}
