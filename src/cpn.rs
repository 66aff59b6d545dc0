use std::fmt;
use std::str::FromStr;

use winnow::combinator::cut_err;
use winnow::error::{ContextError, ErrMode, StrContext};
use winnow::prelude::*;
use winnow::token::take_while;

use crate::error::{Error, Result};
use crate::version::is_version;

/// Category/Package Name (Cpn)
///
/// Represents unversioned package atoms like `dev-lang/rust`.
///
/// See [PMS 3.1](https://projects.gentoo.org/pms/latest/pms.html#restrictions-upon-names)
/// for category and package naming rules.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cpn {
    pub category: String,
    pub package: String,
}

impl Cpn {
    pub fn new(category: impl Into<String>, package: impl Into<String>) -> Self {
        Cpn {
            category: category.into(),
            package: package.into(),
        }
    }

    /// Parse from string
    pub fn parse(input: &str) -> Result<Self> {
        parse_cpn()
            .parse(input)
            .map_err(|e| Error::InvalidCpn(format!("{}: {}", input, e)))
    }

    /// Try to create from string (alias for parse)
    pub fn try_new(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Cpn {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.category, self.package)
    }
}

impl FromStr for Cpn {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

pub(crate) fn is_name_start(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '+'
}

fn is_category_char(c: char) -> bool {
    is_name_start(c) || c == '-' || c == '.'
}

fn is_package_char(c: char) -> bool {
    is_name_start(c) || c == '-'
}

/// Category name: `[A-Za-z0-9_+][A-Za-z0-9_+.-]*`
fn is_valid_category(s: &str) -> bool {
    s.chars().next().is_some_and(is_name_start) && s.chars().all(is_category_char)
}

/// Package name: `[A-Za-z0-9_+][A-Za-z0-9_+-]*`, not ending in `-<version>`
pub(crate) fn is_valid_package(s: &str) -> bool {
    s.chars().next().is_some_and(is_name_start)
        && s.chars().all(is_package_char)
        && !ends_with_version(s)
}

/// Whether some `-<suffix>` of `s` is a complete version string
pub(crate) fn ends_with_version(s: &str) -> bool {
    s.match_indices('-').any(|(i, _)| is_version(&s[i + 1..]))
}

// Winnow parsers

pub(crate) fn parse_category<'s>() -> impl Parser<&'s str, String, ErrMode<ContextError>> {
    take_while(1.., is_category_char)
        .verify(|s: &str| is_valid_category(s))
        .map(|s: &str| s.to_string())
        .context(StrContext::Label("category"))
}

pub(crate) fn parse_package<'s>() -> impl Parser<&'s str, String, ErrMode<ContextError>> {
    take_while(1.., is_package_char)
        .verify(|s: &str| is_valid_package(s))
        .map(|s: &str| s.to_string())
        .context(StrContext::Label("package"))
}

pub(crate) fn parse_cpn<'s>() -> impl Parser<&'s str, Cpn, ErrMode<ContextError>> {
    (parse_category(), '/', cut_err(parse_package()))
        .map(|(category, _, package)| Cpn { category, package })
        .context(StrContext::Label("cpn"))
}
