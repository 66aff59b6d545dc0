use std::collections::BTreeSet;
use std::fmt;

use winnow::ascii::multispace0;
use winnow::combinator::{cut_err, delimited, dispatch, fail, peek, preceded, repeat};
use winnow::error::{ContextError, ErrMode, StrContext};
use winnow::prelude::*;
use winnow::token::take_while;

use crate::error::{Error, Result};
use crate::use_dep::is_valid_use_flag;

/// Structured dependency tree entry.
///
/// Represents the forms that appear in ebuild `*DEPEND`, `LICENSE`,
/// `SRC_URI` and `REQUIRED_USE` style variables (PMS 8.2): plain tokens,
/// USE-conditional groups, all-of groups and the `||`, `^^`, `??` groups.
/// Unlike [`use_reduce`](crate::use_reduce) nothing is evaluated or
/// simplified; the tree mirrors the text.
///
/// See [PMS 8.2](https://projects.gentoo.org/pms/9/pms.html#dependency-specification-format).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DepEntry {
    /// A leaf: an atom, a license name, a URI, a flag, ...
    Token(String),
    /// `( children )`
    AllOf(Vec<DepEntry>),
    /// `|| ( a b c )`: any one of the children satisfies the dependency.
    AnyOf(Vec<DepEntry>),
    /// `^^ ( a b c )`: exactly one of the children.
    ExactlyOne(Vec<DepEntry>),
    /// `?? ( a b c )`: at most one of the children.
    AtMostOne(Vec<DepEntry>),
    /// `flag? ( children )` or `!flag? ( children )` conditional group.
    UseConditional {
        /// USE flag name.
        flag: String,
        /// `true` for `!use?` (negated conditional).
        negate: bool,
        /// Dependencies guarded by this flag.
        children: Vec<DepEntry>,
    },
}

impl DepEntry {
    /// Parse a full dependency string into a list of entries.
    ///
    /// # Examples
    ///
    /// ```
    /// use portage_depspec::DepEntry;
    ///
    /// let entries = DepEntry::parse("dev-lang/rust ssl? ( dev-libs/openssl )").unwrap();
    /// assert_eq!(entries.len(), 2);
    /// ```
    pub fn parse(input: &str) -> Result<Vec<DepEntry>> {
        parse_dep_string()
            .parse(input)
            .map_err(|e| Error::dep_string(format!("{e}")))
    }

    fn children(&self) -> &[DepEntry] {
        match self {
            DepEntry::Token(_) => &[],
            DepEntry::AllOf(children)
            | DepEntry::AnyOf(children)
            | DepEntry::ExactlyOne(children)
            | DepEntry::AtMostOne(children)
            | DepEntry::UseConditional { children, .. } => children,
        }
    }

    /// Whether `token` occurs anywhere in this entry
    pub fn contains_token(&self, token: &str) -> bool {
        match self {
            DepEntry::Token(t) => t == token,
            _ => self.children().iter().any(|c| c.contains_token(token)),
        }
    }
}

fn write_group(f: &mut fmt::Formatter, children: &[DepEntry]) -> fmt::Result {
    write!(f, "(")?;
    for child in children {
        write!(f, " {child}")?;
    }
    write!(f, " )")
}

impl fmt::Display for DepEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DepEntry::Token(token) => write!(f, "{token}"),
            DepEntry::AllOf(children) => write_group(f, children),
            DepEntry::AnyOf(children) => {
                write!(f, "|| ")?;
                write_group(f, children)
            }
            DepEntry::ExactlyOne(children) => {
                write!(f, "^^ ")?;
                write_group(f, children)
            }
            DepEntry::AtMostOne(children) => {
                write!(f, "?? ")?;
                write_group(f, children)
            }
            DepEntry::UseConditional {
                flag,
                negate,
                children,
            } => {
                if *negate {
                    write!(f, "!")?;
                }
                write!(f, "{flag}? ")?;
                write_group(f, children)
            }
        }
    }
}

/// Render a list of entries back to a dependency string
pub fn render_entries(entries: &[DepEntry]) -> String {
    entries
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

/// USE flags whose conditionals decide whether `atom` is in effect
///
/// ```
/// use portage_depspec::extract_affecting_use;
///
/// let flags = extract_affecting_use(
///     "sasl? ( dev-libs/cyrus-sasl ) !minimal? ( cxx? ( dev-libs/cyrus-sasl ) )",
///     "dev-libs/cyrus-sasl",
/// )
/// .unwrap();
/// assert_eq!(flags.into_iter().collect::<Vec<_>>(), ["cxx", "minimal", "sasl"]);
/// ```
pub fn extract_affecting_use(input: &str, atom: &str) -> Result<BTreeSet<String>> {
    let entries = DepEntry::parse(input)?;
    let mut affecting = BTreeSet::new();
    collect_affecting_use(&entries, atom, &mut affecting)?;
    Ok(affecting)
}

fn collect_affecting_use(
    entries: &[DepEntry],
    atom: &str,
    affecting: &mut BTreeSet<String>,
) -> Result<()> {
    for entry in entries {
        if !entry.contains_token(atom) {
            continue;
        }
        if let DepEntry::UseConditional { flag, negate, .. } = entry {
            if !is_valid_use_flag(flag) {
                let bang = if *negate { "!" } else { "" };
                return Err(Error::dep_string(format!(
                    "invalid use flag '{flag}' in conditional '{bang}{flag}?'"
                )));
            }
            affecting.insert(flag.clone());
        }
        collect_affecting_use(entry.children(), atom, affecting)?;
    }
    Ok(())
}

// Winnow parsers

/// Parse a complete dependency string (top-level).
fn parse_dep_string<'s>() -> impl Parser<&'s str, Vec<DepEntry>, ErrMode<ContextError>> {
    move |input: &mut &'s str| {
        let entries = parse_dep_entries(input)?;
        multispace0.parse_next(input)?;
        Ok(entries)
    }
}

/// A whitespace delimited word
fn parse_word<'s>(input: &mut &'s str) -> ModalResult<&'s str> {
    take_while(1.., |c: char| !c.is_whitespace()).parse_next(input)
}

fn keyword<'s>(expected: &'static str) -> impl Parser<&'s str, &'s str, ErrMode<ContextError>> {
    parse_word.verify(move |word: &str| word == expected)
}

/// Parse zero or more dependency entries separated by whitespace.
///
/// Stops when it encounters `)` or end-of-input.
fn parse_dep_entries(input: &mut &str) -> ModalResult<Vec<DepEntry>> {
    repeat(0.., preceded(multispace0, parse_dep_entry)).parse_next(input)
}

/// Parse a single dependency entry.
///
/// Uses `dispatch!(peek(word); ...)` to route on the whole next word:
/// - `||`, `^^`, `??` → operator group
/// - `(` → all-of group
/// - `)` → end of the enclosing group
/// - `flag?` / `!flag?` → USE conditional
/// - anything else → plain token
fn parse_dep_entry(input: &mut &str) -> ModalResult<DepEntry> {
    dispatch! {peek(parse_word);
        "||" => preceded(parse_word, parse_group_body).map(DepEntry::AnyOf),
        "^^" => preceded(parse_word, parse_group_body).map(DepEntry::ExactlyOne),
        "??" => preceded(parse_word, parse_group_body).map(DepEntry::AtMostOne),
        "(" => parse_paren_group.map(DepEntry::AllOf),
        ")" => fail,
        word if word.len() > 1 && word.ends_with('?') => parse_use_conditional,
        _ => parse_word.map(|word: &str| DepEntry::Token(word.to_string())),
    }
    .parse_next(input)
}

/// Parse `( entry* )` after an operator, committing to it.
fn parse_group_body(input: &mut &str) -> ModalResult<Vec<DepEntry>> {
    multispace0.parse_next(input)?;
    cut_err(delimited(
        keyword("("),
        parse_dep_entries,
        (multispace0, keyword(")")),
    ))
    .context(StrContext::Label("group"))
    .parse_next(input)
}

/// Parse `[!]flag? ( entry* )`.
fn parse_use_conditional(input: &mut &str) -> ModalResult<DepEntry> {
    let word = parse_word.parse_next(input)?;
    let (negate, flag) = match word.strip_prefix('!') {
        Some(flag) => (true, flag),
        None => (false, word),
    };
    let flag = flag.strip_suffix('?').unwrap_or(flag).to_string();
    let children = parse_group_body
        .context(StrContext::Label("USE conditional group"))
        .parse_next(input)?;
    Ok(DepEntry::UseConditional {
        flag,
        negate,
        children,
    })
}

/// Parse `( entry* )`, a bare parenthesized group.
///
/// After consuming `(`, uses `cut_err` for the closing `)`.
fn parse_paren_group(input: &mut &str) -> ModalResult<Vec<DepEntry>> {
    delimited(
        keyword("("),
        parse_dep_entries,
        cut_err((multispace0, keyword(")"))).context(StrContext::Label("closing ')'")),
    )
    .parse_next(input)
}
