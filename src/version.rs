use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use winnow::ascii::digit1;
use winnow::combinator::{alt, cut_err, opt, preceded, repeat, separated};
use winnow::error::{ContextError, ErrMode, StrContext};
use winnow::prelude::*;
use winnow::token::one_of;

use crate::error::{Error, Result};

/// Package revision (`-r1`, `-r2`, etc.)
///
/// Tracks packaging changes independently of the upstream version.
/// A revision of `0` is the implicit default and is omitted from display.
///
/// See [PMS 3.2](https://projects.gentoo.org/pms/9/pms.html#version-specifications).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Revision(pub u64);

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.0 == 0 {
            Ok(())
        } else {
            write!(f, "-r{}", self.0)
        }
    }
}

/// Version suffix kind
///
/// `Alpha`, `Beta`, `Pre`, and `Rc` sort *below* the unsuffixed version,
/// while `P` (patchlevel) sorts *above* it.
///
/// See [Algorithm 3.5](https://projects.gentoo.org/pms/9/pms.html#version-comparison).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SuffixKind {
    Alpha,
    Beta,
    Pre,
    Rc,
    P,
}

impl SuffixKind {
    fn order(&self) -> i32 {
        match self {
            SuffixKind::Alpha => -4,
            SuffixKind::Beta => -3,
            SuffixKind::Pre => -2,
            SuffixKind::Rc => -1,
            SuffixKind::P => 1,
        }
    }
}

impl fmt::Display for SuffixKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SuffixKind::Alpha => write!(f, "_alpha"),
            SuffixKind::Beta => write!(f, "_beta"),
            SuffixKind::Pre => write!(f, "_pre"),
            SuffixKind::Rc => write!(f, "_rc"),
            SuffixKind::P => write!(f, "_p"),
        }
    }
}

/// A version suffix with optional numeric qualifier (e.g. `_rc2`, `_p`)
///
/// A missing number compares equal to `0`.
#[derive(Debug, Clone)]
pub struct Suffix {
    pub kind: SuffixKind,
    pub number: Option<u64>,
}

impl fmt::Display for Suffix {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(n) = self.number {
            write!(f, "{}", n)?;
        }
        Ok(())
    }
}

impl PartialEq for Suffix {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Suffix {}

impl Hash for Suffix {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
        self.number.unwrap_or(0).hash(state);
    }
}

impl PartialOrd for Suffix {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Suffix {
    fn cmp(&self, other: &Self) -> Ordering {
        self.kind
            .order()
            .cmp(&other.kind.order())
            .then_with(|| self.number.unwrap_or(0).cmp(&other.number.unwrap_or(0)))
    }
}

/// Version comparison operator for dependency atoms
///
/// See [PMS 8.3.1](https://projects.gentoo.org/pms/9/pms.html#operators).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Operator {
    /// `<`
    Less,
    /// `<=`
    LessOrEqual,
    /// `=` exactly the specified version, revision included.
    Equal,
    /// `=pkg-1.2*` version prefix match on component boundaries.
    Glob,
    /// `~` same version, any revision.
    Approximate,
    /// `>=`
    GreaterOrEqual,
    /// `>`
    Greater,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Operator::Less => write!(f, "<"),
            Operator::LessOrEqual => write!(f, "<="),
            Operator::Equal => write!(f, "="),
            Operator::Glob => write!(f, "=*"),
            Operator::Approximate => write!(f, "~"),
            Operator::GreaterOrEqual => write!(f, ">="),
            Operator::Greater => write!(f, ">"),
        }
    }
}

/// Package version according to PMS
///
/// Represents a version string such as `1.2.3a_alpha4_beta5_pre6_rc7_p8-r9`.
/// Numeric components are kept as written so that leading zeros take part in
/// comparison and display.
///
/// Ordering implements
/// [Algorithm 3.1](https://projects.gentoo.org/pms/9/pms.html#version-comparison).
/// Equality and hashing agree with the ordering, so `1.0` and `1.00` are equal
/// while `1.01` and `1.1` are not.
#[derive(Debug, Clone)]
pub struct Version {
    /// Dot-separated numeric components, verbatim (e.g. `["1", "02", "3"]`).
    pub numbers: Vec<String>,
    /// Optional single lowercase letter after the numeric components.
    pub letter: Option<char>,
    /// Zero or more version suffixes.
    pub suffixes: Vec<Suffix>,
    /// Package revision; defaults to `0` (omitted from display).
    pub revision: Revision,
}

impl Version {
    /// Parse a bare version string
    pub fn parse(input: &str) -> Result<Self> {
        parse_version()
            .parse(input)
            .map_err(|e| Error::InvalidVersion(format!("{}: {}", input, e)))
    }

    /// Same version without the revision, as used by `~`
    pub fn base(&self) -> Self {
        Version {
            revision: Revision::default(),
            ..self.clone()
        }
    }

    fn normalized_numbers(&self) -> impl Iterator<Item = &str> {
        self.numbers.iter().enumerate().map(|(i, n)| {
            if i == 0 {
                n.trim_start_matches('0')
            } else if n.starts_with('0') {
                n.trim_end_matches('0')
            } else {
                n.as_str()
            }
        })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.numbers.join("."))?;
        if let Some(letter) = self.letter {
            write!(f, "{}", letter)?;
        }
        for suffix in &self.suffixes {
            write!(f, "{}", suffix)?;
        }
        write!(f, "{}", self.revision)
    }
}

fn cmp_integer(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn cmp_component(a: &str, b: &str) -> Ordering {
    if a.starts_with('0') || b.starts_with('0') {
        a.trim_end_matches('0').cmp(b.trim_end_matches('0'))
    } else {
        cmp_integer(a, b)
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for n in self.normalized_numbers() {
            n.hash(state);
        }
        self.numbers.len().hash(state);
        self.letter.hash(state);
        self.suffixes.hash(state);
        self.revision.hash(state);
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let mut ordering = match (self.numbers.first(), other.numbers.first()) {
            (Some(a), Some(b)) => cmp_integer(a, b),
            _ => self.numbers.len().cmp(&other.numbers.len()),
        };
        for (a, b) in self.numbers.iter().zip(&other.numbers).skip(1) {
            if ordering != Ordering::Equal {
                return ordering;
            }
            ordering = cmp_component(a, b);
        }
        if ordering != Ordering::Equal {
            return ordering;
        }
        match self.numbers.len().cmp(&other.numbers.len()) {
            Ordering::Equal => {}
            other => return other,
        }

        match self.letter.cmp(&other.letter) {
            Ordering::Equal => {}
            other => return other,
        }

        let max_suffixes = self.suffixes.len().max(other.suffixes.len());
        for i in 0..max_suffixes {
            match (self.suffixes.get(i), other.suffixes.get(i)) {
                (Some(a), Some(b)) => match a.cmp(b) {
                    Ordering::Equal => continue,
                    other => return other,
                },
                (Some(s), None) => {
                    return if s.kind == SuffixKind::P {
                        Ordering::Greater
                    } else {
                        Ordering::Less
                    };
                }
                (None, Some(s)) => {
                    return if s.kind == SuffixKind::P {
                        Ordering::Less
                    } else {
                        Ordering::Greater
                    };
                }
                (None, None) => break,
            }
        }

        self.revision.cmp(&other.revision)
    }
}

// Winnow parsers

fn parse_number<'s>() -> impl Parser<&'s str, u64, ErrMode<ContextError>> {
    digit1.try_map(|s: &str| s.parse::<u64>())
}

fn parse_component<'s>() -> impl Parser<&'s str, String, ErrMode<ContextError>> {
    digit1.map(|s: &str| s.to_string())
}

fn parse_letter<'s>() -> impl Parser<&'s str, char, ErrMode<ContextError>> {
    one_of('a'..='z')
}

fn parse_suffix_kind<'s>() -> impl Parser<&'s str, SuffixKind, ErrMode<ContextError>> {
    alt((
        "alpha".value(SuffixKind::Alpha),
        "beta".value(SuffixKind::Beta),
        "pre".value(SuffixKind::Pre),
        "rc".value(SuffixKind::Rc),
        "p".value(SuffixKind::P),
    ))
}

fn parse_suffix<'s>() -> impl Parser<&'s str, Suffix, ErrMode<ContextError>> {
    preceded('_', cut_err((parse_suffix_kind(), opt(parse_number()))))
        .map(|(kind, number)| Suffix { kind, number })
}

fn parse_revision<'s>() -> impl Parser<&'s str, Revision, ErrMode<ContextError>> {
    preceded("-r", cut_err(parse_number())).map(Revision)
}

pub(crate) fn parse_version<'s>() -> impl Parser<&'s str, Version, ErrMode<ContextError>> {
    (
        separated(1.., parse_component(), '.'),
        opt(parse_letter()),
        repeat(0.., parse_suffix()),
        opt(parse_revision()),
    )
        .map(|(numbers, letter, suffixes, revision)| Version {
            numbers,
            letter,
            suffixes,
            revision: revision.unwrap_or_default(),
        })
        .context(StrContext::Label("version"))
}

/// Parse a relational operator; `=*` is recognised by the atom grammar itself.
pub(crate) fn parse_operator<'s>() -> impl Parser<&'s str, Operator, ErrMode<ContextError>> {
    alt((
        "<=".value(Operator::LessOrEqual),
        "<".value(Operator::Less),
        ">=".value(Operator::GreaterOrEqual),
        ">".value(Operator::Greater),
        "~".value(Operator::Approximate),
        "=".value(Operator::Equal),
    ))
    .context(StrContext::Label("operator"))
}

/// Whether `s` is a complete, valid version string
pub(crate) fn is_version(s: &str) -> bool {
    parse_version().parse(s).is_ok()
}

impl FromStr for Version {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn test_version_parsing() {
        let ver = v("1.2.3");
        assert_eq!(ver.numbers, vec!["1", "2", "3"]);
        assert_eq!(ver.letter, None);
        assert!(ver.suffixes.is_empty());
        assert_eq!(ver.revision.0, 0);
    }

    #[test]
    fn test_version_with_letter_and_suffixes() {
        let ver = v("1.2.3a_alpha4_beta5");
        assert_eq!(ver.letter, Some('a'));
        assert_eq!(ver.suffixes.len(), 2);
        assert_eq!(ver.suffixes[0].kind, SuffixKind::Alpha);
        assert_eq!(ver.suffixes[0].number, Some(4));
        assert_eq!(ver.suffixes[1].kind, SuffixKind::Beta);
        assert_eq!(ver.to_string(), "1.2.3a_alpha4_beta5");
    }

    #[test]
    fn test_version_with_revision() {
        let ver = v("1.2.3-r1");
        assert_eq!(ver.revision.0, 1);
        assert_eq!(ver.base().to_string(), "1.2.3");
    }

    #[test]
    fn test_invalid_versions() {
        assert!(Version::parse("").is_err());
        assert!(Version::parse("1.").is_err());
        assert!(Version::parse("1_foo").is_err());
        assert!(Version::parse("1-r").is_err());
        assert!(Version::parse("a1").is_err());
        assert!(!is_version("1.0-5"));
        assert!(is_version("1.0-r5"));
    }

    #[test]
    fn test_version_comparison() {
        assert!(v("1.2.3") < v("1.2.4"));
        assert!(v("1.2.3") < v("1.2.3-r1"));
        assert!(v("1.2.3_rc1") < v("1.2.3"));
        assert!(v("1.2.3_p1") > v("1.2.3"));
        assert!(v("1.2") < v("1.2.0"));
        assert!(v("1.2a") > v("1.2"));
        assert!(v("10") > v("9"));
        assert!(v("1_alpha") < v("1_beta"));
    }

    #[test]
    fn test_leading_zero_components() {
        assert!(v("1.01") < v("1.1"));
        assert!(v("1.010") > v("1.01") || v("1.010") == v("1.01"));
        assert_eq!(v("1.0"), v("1.00"));
        assert_eq!(v("01.2"), v("1.2"));
        assert_ne!(v("1.01"), v("1.1"));
    }

    #[test]
    fn test_suffix_missing_number_is_zero() {
        assert_eq!(v("1_rc"), v("1_rc0"));
        assert!(v("1_rc") < v("1_rc1"));
    }

    #[test]
    fn test_equal_versions_hash_equal() {
        use std::collections::HashSet;
        let set: HashSet<Version> = [v("1.0"), v("1.00"), v("01.0"), v("1_rc0"), v("1_rc")]
            .into_iter()
            .collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_operator_display() {
        assert_eq!(Operator::Glob.to_string(), "=*");
        assert_eq!(
            parse_operator().parse_next(&mut ">=foo").unwrap(),
            Operator::GreaterOrEqual
        );
    }
}
