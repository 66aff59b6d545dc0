use std::borrow::Borrow;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::Arc;

use tracing::trace;
use winnow::combinator::{eof, fail, opt, preceded};
use winnow::prelude::*;
use winnow::token::take_while;

use crate::cpn::{ends_with_version, is_name_start, parse_category, parse_cpn, Cpn};
use crate::cpv::{is_pkg_ver_char, split_package_version, Cpv};
use crate::eapi::EapiAttrs;
use crate::error::{Error, ErrorCategory, Result};
use crate::slot::{is_slot_loose_char, SlotDep, SlotOperator};
use crate::use_dep::{UseDepKind, UseDepSet};
use crate::version::{parse_operator, Operator, Version};

/// Package dependency blocker type
///
/// Blockers prevent conflicting packages from being installed simultaneously.
/// See [PMS 8.3.2](https://projects.gentoo.org/pms/9/pms.html#block-operator).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Blocker {
    /// `!` weak blocker. The blocked package may be temporarily installed
    /// during a transition, but must be uninstalled before the operation completes.
    Weak,
    /// `!!` strong blocker. The blocked package must never be installed
    /// at the same time as this package.
    Strong,
}

impl fmt::Display for Blocker {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Blocker::Weak => write!(f, "!"),
            Blocker::Strong => write!(f, "!!"),
        }
    }
}

/// Knobs for [`Atom::parse_with`]
///
/// `allow_repo` and `allow_build_id` left as `None` pick a default: both are
/// allowed when no EAPI is given; with an EAPI, repository deps follow the
/// EAPI and build ids are refused.
#[derive(Clone, Copy, Default)]
pub struct AtomOptions<'a> {
    /// Accept `*` globs in category and package names.
    pub allow_wildcard: bool,
    pub allow_repo: Option<bool>,
    pub allow_build_id: Option<bool>,
    pub eapi: Option<&'a str>,
    /// IUSE membership test for flags referenced by USE conditionals.
    pub is_valid_flag: Option<&'a dyn Fn(&str) -> bool>,
}

impl<'a> AtomOptions<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow_wildcard(mut self, allow: bool) -> Self {
        self.allow_wildcard = allow;
        self
    }

    pub fn allow_repo(mut self, allow: bool) -> Self {
        self.allow_repo = Some(allow);
        self
    }

    pub fn allow_build_id(mut self, allow: bool) -> Self {
        self.allow_build_id = Some(allow);
        self
    }

    pub fn eapi(mut self, eapi: &'a str) -> Self {
        self.eapi = Some(eapi);
        self
    }

    pub fn is_valid_flag(mut self, is_valid_flag: &'a dyn Fn(&str) -> bool) -> Self {
        self.is_valid_flag = Some(is_valid_flag);
        self
    }
}

impl fmt::Debug for AtomOptions<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("AtomOptions")
            .field("allow_wildcard", &self.allow_wildcard)
            .field("allow_repo", &self.allow_repo)
            .field("allow_build_id", &self.allow_build_id)
            .field("eapi", &self.eapi)
            .field("is_valid_flag", &self.is_valid_flag.is_some())
            .finish()
    }
}

/// Full dependency atom
///
/// Represents atoms like `>=dev-lang/rust-1.75.0:0/1.75=::gentoo[ssl,-debug]`.
/// An atom keeps the exact text it was parsed from; equality and hashing
/// are defined on that text, and every transform returns a new atom.
///
/// ```
/// use portage_depspec::{Atom, Operator};
///
/// let atom = Atom::parse(">=dev-lang/rust-1.75.0:0[ssl]").unwrap();
/// assert_eq!(atom.operator(), Some(Operator::GreaterOrEqual));
/// assert_eq!(atom.cp().to_string(), "dev-lang/rust");
/// assert_eq!(atom.slot(), Some("0"));
/// assert_eq!(atom.without_use().to_string(), ">=dev-lang/rust-1.75.0:0");
/// ```
///
/// See [PMS 8.3](https://projects.gentoo.org/pms/9/pms.html#package-dependency-specifications)
/// for the dependency specification syntax.
#[derive(Debug, Clone)]
pub struct Atom {
    text: String,
    /// Length of the blocker, operator and cp/cpv prefix of `text`.
    base_len: usize,
    blocker: Option<Blocker>,
    operator: Option<Operator>,
    cpn: Cpn,
    cpv: Option<Cpv>,
    wildcard_version: Option<String>,
    slot_dep: Option<SlotDep>,
    repo: Option<String>,
    use_deps: Option<UseDepSet>,
    build_id: Option<u64>,
    extended_syntax: bool,
    without_use: Option<Arc<Atom>>,
    unevaluated: Option<Arc<Atom>>,
}

impl Atom {
    /// Parse with default options: no wildcards, no EAPI restrictions
    pub fn parse(input: &str) -> Result<Self> {
        Self::parse_with(input, &AtomOptions::default())
    }

    /// Try to create from string (alias for parse)
    pub fn try_new(s: &str) -> Result<Self> {
        Self::parse(s)
    }

    pub fn parse_with(input: &str, options: &AtomOptions<'_>) -> Result<Self> {
        let attrs = EapiAttrs::for_eapi(options.eapi);
        let allow_repo = options
            .allow_repo
            .unwrap_or(options.eapi.is_none() || attrs.repo_deps);
        let allow_build_id = options.allow_build_id.unwrap_or(options.eapi.is_none());

        let (blocker, rest) = if let Some(rest) = input.strip_prefix("!!") {
            (Some(Blocker::Strong), rest)
        } else if let Some(rest) = input.strip_prefix('!') {
            (Some(Blocker::Weak), rest)
        } else {
            (None, input)
        };
        let blocker_len = input.len() - rest.len();

        let (body_text, use_text) = match rest.find('[') {
            Some(start) => {
                if !rest.ends_with(']') {
                    return Err(Error::atom(input, "unterminated USE dependency"));
                }
                (&rest[..start], Some(&rest[start + 1..rest.len() - 1]))
            }
            None => (rest, None),
        };

        let body = match parse_body.parse(body_text) {
            Ok(body) => body,
            Err(_) if options.allow_wildcard && use_text.is_none() => {
                trace!(atom = input, "retrying as wildcard atom");
                parse_wildcard_body
                    .parse(body_text)
                    .map_err(|_| Error::atom(input, "invalid wildcard atom"))?
            }
            Err(e) => return Err(Error::atom(input, e.to_string())),
        };
        if body.extended_syntax && (body.category.contains("**") || body.package.contains("**")) {
            return Err(Error::atom(input, "'**' is not a valid wildcard"));
        }

        let slot_dep = body
            .slot
            .map(|slot| SlotDep::parse(slot, attrs.slot_operator))
            .transpose()
            .map_err(|e| Error::atom(input, e.to_string()))?;

        if body.repo.is_some() && !allow_repo {
            let message = "repository dependencies are not allowed";
            return Err(match options.eapi {
                Some(eapi) => Error::atom_category(
                    input,
                    format!("{} in EAPI {}", message, eapi),
                    ErrorCategory::EapiIncompatible,
                ),
                None => Error::atom(input, message),
            });
        }

        let build_id = match body.build_id {
            None => None,
            Some(_) if !allow_build_id => {
                return Err(Error::atom(input, "build ids are not allowed"));
            }
            Some(digits) if digits.len() > 1 && digits.starts_with('0') => {
                return Err(Error::atom(input, "build id has leading zeros"));
            }
            Some(digits) => Some(
                digits
                    .parse::<u64>()
                    .map_err(|e| Error::atom(input, format!("build id: {}", e)))?,
            ),
        };

        let use_deps = use_text
            .map(|inner| UseDepSet::parse(inner.split(',')))
            .transpose()
            .map_err(|e| Error::atom(input, e.to_string()))?;

        let without_use = match use_text {
            Some(inner) => {
                let stripped = &input[..input.len() - inner.len() - 2];
                let options = AtomOptions::new().allow_repo(allow_repo);
                Some(Arc::new(Self::parse_with(stripped, &options)?))
            }
            None => None,
        };

        let cpn = Cpn::new(body.category, body.package);
        let cpv = body.version.map(|version| Cpv::new(cpn.clone(), version));
        let atom = Atom {
            text: input.to_string(),
            base_len: blocker_len + body.base_len,
            blocker,
            operator: body.operator,
            cpn,
            cpv,
            wildcard_version: body.wildcard_version.map(str::to_string),
            slot_dep,
            repo: body.repo.map(str::to_string),
            use_deps,
            build_id,
            extended_syntax: body.extended_syntax,
            without_use,
            unevaluated: None,
        };

        if let Some(eapi) = options.eapi {
            atom.check_eapi(eapi, &attrs)?;
        }
        if let Some(is_valid_flag) = options.is_valid_flag {
            atom.check_conditional_flags(is_valid_flag)?;
        }
        Ok(atom)
    }

    fn check_eapi(&self, eapi: &str, attrs: &EapiAttrs) -> Result<()> {
        let incompatible = |what: &str| {
            Error::atom_category(
                &self.text,
                format!("{} are not allowed in EAPI {}", what, eapi),
                ErrorCategory::EapiIncompatible,
            )
        };
        if self.slot().is_some() && !attrs.slot_deps {
            return Err(incompatible("Slot deps"));
        }
        if let Some(use_deps) = &self.use_deps {
            if !attrs.use_deps {
                return Err(incompatible("Use deps"));
            }
            if !attrs.use_dep_defaults
                && (!use_deps.missing_enabled().is_empty()
                    || !use_deps.missing_disabled().is_empty())
            {
                return Err(incompatible("Use dep defaults"));
            }
        }
        if self.blocker == Some(Blocker::Strong) && !attrs.strong_blocks {
            return Err(incompatible("Strong blocks"));
        }
        Ok(())
    }

    fn check_conditional_flags(&self, is_valid_flag: &dyn Fn(&str) -> bool) -> Result<()> {
        let Some(use_deps) = &self.use_deps else {
            return Ok(());
        };
        let invalid = use_deps.tokens().iter().find(|dep| {
            !matches!(dep.kind, UseDepKind::Enabled | UseDepKind::Disabled)
                && !is_valid_flag(&dep.flag)
        });
        match invalid {
            Some(dep) => Err(Error::atom_category(
                &self.text,
                format!(
                    "USE flag '{}' referenced in conditional '{}' in atom '{}' is not in IUSE",
                    dep.flag, dep, self.text
                ),
                ErrorCategory::IuseMissing,
            )),
            None => Ok(()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn blocker(&self) -> Option<Blocker> {
        self.blocker
    }

    /// Version operator; `=cat/pkg-1*` reports [`Operator::Glob`]
    pub fn operator(&self) -> Option<Operator> {
        self.operator
    }

    /// Category and package; may hold `*` globs for wildcard atoms
    pub fn cp(&self) -> &Cpn {
        &self.cpn
    }

    pub fn category(&self) -> &str {
        &self.cpn.category
    }

    pub fn package(&self) -> &str {
        &self.cpn.package
    }

    pub fn cpv(&self) -> Option<&Cpv> {
        self.cpv.as_ref()
    }

    pub fn version(&self) -> Option<&Version> {
        self.cpv.as_ref().map(|cpv| &cpv.version)
    }

    /// The `*fragment*` of a `=cat/pkg-*fragment*` wildcard atom
    pub fn wildcard_version(&self) -> Option<&str> {
        self.wildcard_version.as_deref()
    }

    pub fn slot_dep(&self) -> Option<&SlotDep> {
        self.slot_dep.as_ref()
    }

    pub fn slot(&self) -> Option<&str> {
        self.slot_dep.as_ref().and_then(|dep| dep.slot.as_deref())
    }

    pub fn sub_slot(&self) -> Option<&str> {
        self.slot_dep.as_ref().and_then(|dep| dep.sub_slot.as_deref())
    }

    pub fn slot_operator(&self) -> Option<SlotOperator> {
        self.slot_dep.as_ref().and_then(|dep| dep.operator)
    }

    /// `:slot/sub=` carries a recorded sub-slot, while `:slot=` and `:=`
    /// still wait for one to be filled in
    pub fn slot_operator_built(&self) -> bool {
        self.slot_operator() == Some(SlotOperator::Equal) && self.sub_slot().is_some()
    }

    pub fn repo(&self) -> Option<&str> {
        self.repo.as_deref()
    }

    pub fn use_deps(&self) -> Option<&UseDepSet> {
        self.use_deps.as_ref()
    }

    pub fn build_id(&self) -> Option<u64> {
        self.build_id
    }

    /// Whether the atom was parsed with `*` wildcards
    pub fn extended_syntax(&self) -> bool {
        self.extended_syntax
    }

    /// The atom without its `[...]` USE dependencies
    pub fn without_use(&self) -> &Atom {
        self.without_use.as_deref().unwrap_or(self)
    }

    /// The atom this one was derived from by conditional evaluation
    pub fn unevaluated_atom(&self) -> &Atom {
        self.unevaluated.as_deref().unwrap_or(self)
    }

    /// Whether the atom is a bare `category/package`
    pub fn is_just_name(&self) -> bool {
        self.blocker.is_none()
            && self.operator.is_none()
            && self.slot_dep.is_none()
            && self.repo.is_none()
            && self.use_deps.is_none()
    }

    /// Whether the atom pins a version
    pub fn is_specific(&self) -> bool {
        self.cpv.is_some()
    }

    fn base(&self) -> &str {
        &self.text[..self.base_len]
    }

    fn slot_part(&self) -> String {
        self.slot_dep
            .as_ref()
            .map(|dep| format!(":{}", dep))
            .unwrap_or_default()
    }

    fn repo_part(&self) -> String {
        self.repo
            .as_ref()
            .map(|repo| format!("::{}", repo))
            .unwrap_or_default()
    }

    fn use_part(&self) -> String {
        self.use_deps
            .as_ref()
            .map(|deps| deps.to_string())
            .unwrap_or_default()
    }

    fn reparse(text: &str) -> Result<Atom> {
        Self::parse_with(text, &AtomOptions::new().allow_wildcard(true).allow_repo(true))
    }

    pub fn without_repo(&self) -> Result<Atom> {
        if self.repo.is_none() {
            return Ok(self.clone());
        }
        Self::reparse(&format!("{}{}{}", self.base(), self.slot_part(), self.use_part()))
    }

    pub fn without_slot(&self) -> Result<Atom> {
        if self.slot_dep.is_none() {
            return Ok(self.clone());
        }
        Self::reparse(&format!("{}{}{}", self.base(), self.repo_part(), self.use_part()))
    }

    pub fn with_repo(&self, repo: &str) -> Result<Atom> {
        Self::reparse(&format!(
            "{}{}::{}{}",
            self.base(),
            self.slot_part(),
            repo,
            self.use_part()
        ))
    }

    /// Replace the slot part; `slot` is everything that follows the `:`
    pub fn with_slot(&self, slot: &str) -> Result<Atom> {
        Self::reparse(&format!(
            "{}:{}{}{}",
            self.base(),
            slot,
            self.repo_part(),
            self.use_part()
        ))
    }

    fn with_use_deps(&self, use_deps: UseDepSet) -> Atom {
        let mut atom = self.clone();
        atom.text = format!(
            "{}{}{}{}",
            self.base(),
            self.slot_part(),
            self.repo_part(),
            use_deps
        );
        atom.use_deps = (!use_deps.is_empty()).then_some(use_deps);
        atom.unevaluated = Some(Arc::new(self.clone()));
        atom
    }

    /// Resolve USE conditionals against the parent's enabled flags
    ///
    /// ```
    /// use std::collections::BTreeSet;
    /// use portage_depspec::Atom;
    ///
    /// let atom = Atom::parse("dev-libs/foo[ssl?,!debug=]").unwrap();
    /// let use_flags: BTreeSet<String> = ["ssl".to_string()].into();
    /// let evaluated = atom.evaluate_conditionals(&use_flags);
    /// assert_eq!(evaluated.to_string(), "dev-libs/foo[ssl,debug]");
    /// assert_eq!(evaluated.unevaluated_atom(), &atom);
    /// ```
    pub fn evaluate_conditionals(&self, use_flags: &BTreeSet<String>) -> Atom {
        match self.use_deps.as_ref().filter(|deps| deps.conditional().is_some()) {
            Some(use_deps) => self.with_use_deps(use_deps.evaluate_conditionals(use_flags)),
            None => self.clone(),
        }
    }

    /// Keep only the USE constraints `other_use` does not satisfy
    ///
    /// See [`UseDepSet::violated_conditionals`].
    pub fn violated_conditionals(
        &self,
        other_use: &BTreeSet<String>,
        is_valid_flag: &dyn Fn(&str) -> bool,
        parent_use: Option<&BTreeSet<String>>,
    ) -> Result<Atom> {
        match &self.use_deps {
            Some(use_deps) => Ok(self.with_use_deps(use_deps.violated_conditionals(
                other_use,
                is_valid_flag,
                parent_use,
            )?)),
            None => Ok(self.clone()),
        }
    }

    /// Expand conditionals for static checks given masked and forced flags
    pub fn eval_qa_conditionals(
        &self,
        use_mask: &BTreeSet<String>,
        use_force: &BTreeSet<String>,
    ) -> Atom {
        match self.use_deps.as_ref().filter(|deps| deps.conditional().is_some()) {
            Some(use_deps) => self.with_use_deps(use_deps.eval_qa_conditionals(use_mask, use_force)),
            None => self.clone(),
        }
    }

    /// Conservative overlap test
    ///
    /// Only atoms that agree on package and version and carry no USE deps
    /// are considered; beyond that the slots must not disagree. Many actually
    /// overlapping pairs such as `>=a/b-1` and `<a/b-2` report `false`.
    pub fn intersects(&self, other: &Atom) -> bool {
        if self.text == other.text {
            return true;
        }
        if self.cpn != other.cpn
            || self.use_deps.is_some()
            || other.use_deps.is_some()
            || self.operator != other.operator
            || self.cpv != other.cpv
        {
            return false;
        }
        match (self.slot(), other.slot()) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        }
    }
}

/// Whether `input` parses as an atom under `options`
pub fn is_valid_atom(input: &str, allow_blockers: bool, options: &AtomOptions<'_>) -> bool {
    match Atom::parse_with(input, options) {
        Ok(atom) => allow_blockers || atom.blocker.is_none(),
        Err(_) => false,
    }
}

impl PartialEq for Atom {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text
    }
}

impl Eq for Atom {}

impl Hash for Atom {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.text.hash(state);
    }
}

impl Borrow<str> for Atom {
    fn borrow(&self) -> &str {
        &self.text
    }
}

impl AsRef<str> for Atom {
    fn as_ref(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl FromStr for Atom {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Atom {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.text)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for Atom {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Atom::parse(&text).map_err(serde::de::Error::custom)
    }
}

// Winnow parsers

/// The part of an atom between the blocker and the USE dependencies
struct Body<'s> {
    operator: Option<Operator>,
    category: String,
    package: String,
    version: Option<Version>,
    build_id: Option<&'s str>,
    wildcard_version: Option<&'s str>,
    base_len: usize,
    slot: Option<&'s str>,
    repo: Option<&'s str>,
    extended_syntax: bool,
}

fn is_repo_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

fn parse_slot_part<'s>(input: &mut &'s str) -> ModalResult<Option<&'s str>> {
    opt(preceded(':', take_while(1.., is_slot_loose_char))).parse_next(input)
}

fn parse_repo_part<'s>(input: &mut &'s str) -> ModalResult<Option<&'s str>> {
    opt(preceded(
        "::",
        take_while(1.., is_repo_char).verify(|s: &str| !s.starts_with('-')),
    ))
    .parse_next(input)
}

/// Split `pkg-ver[-build_id]`; a build id is only tried when the plain split fails
fn split_versioned(pkg_ver: &str, build_id: bool) -> Option<(&str, Version, Option<&str>)> {
    if let Some((package, version)) = split_package_version(pkg_ver) {
        return Some((package, version, None));
    }
    if !build_id {
        return None;
    }
    let (head, id) = pkg_ver.rsplit_once('-')?;
    if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let (package, version) = split_package_version(head)?;
    Some((package, version, Some(id)))
}

/// `[op]cat/pkg[-ver][*][:slot][::repo]`
fn parse_body<'s>(input: &mut &'s str) -> ModalResult<Body<'s>> {
    let start = input.len();
    let operator = opt(parse_operator()).parse_next(input)?;

    let (operator, category, package, version, build_id) = match operator {
        Some(op) => {
            let (category, _, pkg_ver) =
                (parse_category(), '/', take_while(1.., is_pkg_ver_char)).parse_next(input)?;
            let glob = op == Operator::Equal && opt('*').parse_next(input)?.is_some();
            let Some((package, version, build_id)) = split_versioned(pkg_ver, !glob) else {
                return fail.parse_next(input);
            };
            let op = if glob { Operator::Glob } else { op };
            (Some(op), category, package.to_string(), Some(version), build_id)
        }
        None => {
            let cpn = parse_cpn().parse_next(input)?;
            (None, cpn.category, cpn.package, None, None)
        }
    };
    let base_len = start - input.len();

    let slot = parse_slot_part(input)?;
    let repo = parse_repo_part(input)?;
    eof.parse_next(input)?;

    Ok(Body {
        operator,
        category,
        package,
        version,
        build_id,
        wildcard_version: None,
        base_len,
        slot,
        repo,
        extended_syntax: false,
    })
}

fn is_wildcard_name_char(c: char) -> bool {
    is_name_start(c) || c == '*'
}

/// Category with globs: `[\w+*][\w+.*-]*`
fn parse_wildcard_category<'s>(input: &mut &'s str) -> ModalResult<&'s str> {
    take_while(1.., |c: char| is_wildcard_name_char(c) || c == '.' || c == '-')
        .verify(|s: &str| s.starts_with(is_wildcard_name_char))
        .parse_next(input)
}

fn parse_wildcard_package<'s>(input: &mut &'s str) -> ModalResult<&'s str> {
    take_while(1.., |c: char| is_wildcard_name_char(c) || c == '-')
        .verify(|s: &str| s.starts_with(is_wildcard_name_char))
        .parse_next(input)
}

/// `cat*/pkg*[:slot][::repo]` or `=cat*/pkg*-*fragment*[:slot][::repo]`
fn parse_wildcard_body<'s>(input: &mut &'s str) -> ModalResult<Body<'s>> {
    let start = input.len();
    let star = opt('=').parse_next(input)?.is_some();
    let category = parse_wildcard_category(input)?;
    '/'.parse_next(input)?;
    let name = parse_wildcard_package(input)?;

    let (package, wildcard_version) = if star {
        let Some((package, fragment)) = name.rsplit_once('-') else {
            return fail.parse_next(input);
        };
        let inner = fragment
            .strip_prefix('*')
            .and_then(|f| f.strip_suffix('*'))
            .unwrap_or_default();
        let valid_fragment =
            !inner.is_empty() && inner.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid_fragment || !package.starts_with(is_wildcard_name_char) {
            return fail.parse_next(input);
        }
        (package, Some(fragment))
    } else {
        if ends_with_version(name) {
            return fail.parse_next(input);
        }
        (name, None)
    };
    let base_len = start - input.len();

    let slot = parse_slot_part(input)?;
    let repo = parse_repo_part(input)?;
    eof.parse_next(input)?;

    Ok(Body {
        operator: star.then_some(Operator::Glob),
        category: category.to_string(),
        package: package.to_string(),
        version: None,
        build_id: None,
        wildcard_version,
        base_len,
        slot,
        repo,
        extended_syntax: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn atom(s: &str) -> Atom {
        Atom::parse(s).unwrap()
    }

    fn wildcard(s: &str) -> Atom {
        Atom::parse_with(s, &AtomOptions::new().allow_wildcard(true)).unwrap()
    }

    #[test]
    fn test_simple_atom() {
        let a = atom("dev-lang/rust");
        assert_eq!(a.category(), "dev-lang");
        assert_eq!(a.package(), "rust");
        assert_eq!(a.operator(), None);
        assert!(a.cpv().is_none());
        assert!(a.is_just_name());
        assert_eq!(a.to_string(), "dev-lang/rust");
    }

    #[test]
    fn test_versioned_atom() {
        let a = atom(">=dev-lang/rust-1.75.0-r1");
        assert_eq!(a.operator(), Some(Operator::GreaterOrEqual));
        assert_eq!(a.cpv().unwrap().to_string(), "dev-lang/rust-1.75.0-r1");
        assert_eq!(a.version().unwrap().revision.0, 1);
        assert!(a.is_specific());
        assert!(!a.is_just_name());
    }

    #[test]
    fn test_all_operators() {
        for (text, op) in [
            ("<cat/pkg-1", Operator::Less),
            ("<=cat/pkg-1", Operator::LessOrEqual),
            ("=cat/pkg-1", Operator::Equal),
            ("=cat/pkg-1*", Operator::Glob),
            ("~cat/pkg-1", Operator::Approximate),
            (">=cat/pkg-1", Operator::GreaterOrEqual),
            (">cat/pkg-1", Operator::Greater),
        ] {
            assert_eq!(atom(text).operator(), Some(op), "{}", text);
        }
    }

    #[test]
    fn test_operator_requires_version() {
        assert!(Atom::parse(">=cat/pkg").is_err());
        assert!(Atom::parse("cat/pkg-1.0").is_err());
        assert!(Atom::parse("cat/pkg*").is_err());
        assert!(Atom::parse(">cat/pkg-1*").is_err());
    }

    #[test]
    fn test_blockers() {
        let a = atom("!cat/pkg");
        assert_eq!(a.blocker(), Some(Blocker::Weak));
        let a = atom("!!>=cat/pkg-2");
        assert_eq!(a.blocker(), Some(Blocker::Strong));
        assert_eq!(a.operator(), Some(Operator::GreaterOrEqual));
        assert!(!is_valid_atom("!cat/pkg", false, &AtomOptions::new()));
        assert!(is_valid_atom("!cat/pkg", true, &AtomOptions::new()));
        assert!(Atom::parse("!!!cat/pkg").is_err());
    }

    #[test]
    fn test_slot_repo_use() {
        let a = atom("=dev-libs/foo-1.0:0/2.1=::gentoo[ssl,-debug]");
        assert_eq!(a.slot(), Some("0"));
        assert_eq!(a.sub_slot(), Some("2.1"));
        assert_eq!(a.slot_operator(), Some(SlotOperator::Equal));
        assert!(a.slot_operator_built());
        assert_eq!(a.repo(), Some("gentoo"));
        let use_deps = a.use_deps().unwrap();
        assert!(use_deps.enabled().contains("ssl"));
        assert!(use_deps.disabled().contains("debug"));
        assert_eq!(a.without_use().to_string(), "=dev-libs/foo-1.0:0/2.1=::gentoo");
        assert!(a.without_use().use_deps().is_none());
    }

    #[test]
    fn test_slot_operator_unbuilt() {
        assert!(!atom("cat/pkg:2=").slot_operator_built());
        assert!(!atom("cat/pkg:=").slot_operator_built());
        assert_eq!(atom("cat/pkg:*").slot_operator(), Some(SlotOperator::Star));
        assert!(Atom::parse("cat/pkg:2*").is_err());
        assert!(Atom::parse("cat/pkg:").is_err());
    }

    #[test]
    fn test_repo_grammar_order() {
        assert!(Atom::parse("cat/pkg[foo]::gentoo").is_err());
        assert!(Atom::parse("cat/pkg::gentoo:1").is_err());
        assert!(Atom::parse("cat/pkg::-bad").is_err());
        let no_repo = AtomOptions::new().allow_repo(false);
        assert!(Atom::parse_with("cat/pkg::gentoo", &no_repo).is_err());
    }

    #[test]
    fn test_invalid_use() {
        assert!(Atom::parse("cat/pkg[]").is_err());
        assert!(Atom::parse("cat/pkg[foo,]").is_err());
        assert!(Atom::parse("cat/pkg[foo").is_err());
        assert!(Atom::parse("cat/pkg[foo(+)(-)]").is_err());
        assert!(Atom::parse("cat/pkg[foo(+),foo(-)]").is_err());
        assert!(Atom::parse("cat/pkg[foo,foo(+)]").is_err());
    }

    #[test]
    fn test_build_id() {
        let a = atom("=cat/pkg-1.0-3");
        assert_eq!(a.build_id(), Some(3));
        assert_eq!(a.cpv().unwrap().to_string(), "cat/pkg-1.0");
        assert!(Atom::parse("=cat/pkg-1.0-03").is_err());
        assert!(Atom::parse("=cat/pkg-1.0-3*").is_err());
        let no_build_id = AtomOptions::new().allow_build_id(false);
        assert!(Atom::parse_with("=cat/pkg-1.0-3", &no_build_id).is_err());
        assert!(Atom::parse_with("=cat/pkg-1.0-3", &AtomOptions::new().eapi("8")).is_err());
        assert_eq!(atom("=cat/pkg-1.0-r1").build_id(), None);
    }

    #[test]
    fn test_eapi_restrictions() {
        let eapi0 = AtomOptions::new().eapi("0");
        let err = Atom::parse_with("cat/pkg:1", &eapi0).unwrap_err();
        assert_eq!(err.category(), Some(ErrorCategory::EapiIncompatible));
        let err = Atom::parse_with("cat/pkg[foo]", &AtomOptions::new().eapi("1")).unwrap_err();
        assert_eq!(err.category(), Some(ErrorCategory::EapiIncompatible));
        let err = Atom::parse_with("cat/pkg[foo(+)]", &AtomOptions::new().eapi("3")).unwrap_err();
        assert_eq!(err.category(), Some(ErrorCategory::EapiIncompatible));
        let err = Atom::parse_with("!!cat/pkg", &AtomOptions::new().eapi("1")).unwrap_err();
        assert_eq!(err.category(), Some(ErrorCategory::EapiIncompatible));
        let err = Atom::parse_with("cat/pkg::gentoo", &AtomOptions::new().eapi("8")).unwrap_err();
        assert_eq!(err.category(), Some(ErrorCategory::EapiIncompatible));
        assert!(Atom::parse_with("cat/pkg:1=", &AtomOptions::new().eapi("4")).is_err());

        let eapi8 = AtomOptions::new().eapi("8");
        assert!(Atom::parse_with("!!cat/pkg:1/2=[foo(+),bar?]", &eapi8).is_ok());
    }

    #[test]
    fn test_conditional_flags_checked_against_iuse() {
        let iuse = |flag: &str| flag == "ssl";
        let options = AtomOptions::new().is_valid_flag(&iuse);
        assert!(Atom::parse_with("cat/pkg[ssl?,other]", &options).is_ok());
        let err = Atom::parse_with("cat/pkg[debug=]", &options).unwrap_err();
        assert_eq!(err.category(), Some(ErrorCategory::IuseMissing));
        assert!(err.to_string().contains("conditional 'debug='"));
    }

    #[test]
    fn test_wildcards() {
        let a = wildcard("*/pkg");
        assert!(a.extended_syntax());
        assert_eq!(a.category(), "*");
        let a = wildcard("dev-*/*:2::gentoo");
        assert_eq!(a.slot(), Some("2"));
        assert_eq!(a.repo(), Some("gentoo"));
        let a = wildcard("=cat/pkg-*9*");
        assert_eq!(a.operator(), Some(Operator::Glob));
        assert_eq!(a.wildcard_version(), Some("*9*"));
        assert!(a.cpv().is_none());

        // Plain atoms stay non-extended even when wildcards are allowed.
        assert!(!wildcard("cat/pkg").extended_syntax());
        assert!(Atom::parse("*/pkg").is_err());
        let options = AtomOptions::new().allow_wildcard(true);
        assert!(Atom::parse_with("cat/**", &options).is_err());
        assert!(Atom::parse_with("*/pkg[foo]", &options).is_err());
        assert!(Atom::parse_with("cat/*-1.0", &options).is_err());
    }

    #[test]
    fn test_transforms() {
        let a = atom(">=cat/pkg-1:2/3::repo[foo]");
        assert_eq!(a.without_repo().unwrap().to_string(), ">=cat/pkg-1:2/3[foo]");
        assert_eq!(a.without_slot().unwrap().to_string(), ">=cat/pkg-1::repo[foo]");
        assert_eq!(a.with_repo("other").unwrap().to_string(), ">=cat/pkg-1:2/3::other[foo]");
        assert_eq!(a.with_slot("4=").unwrap().to_string(), ">=cat/pkg-1:4=::repo[foo]");
        assert!(a.with_slot("bad*").is_err());
        let plain = atom("!cat/pkg");
        assert_eq!(plain.without_slot().unwrap(), plain);
    }

    #[test]
    fn test_evaluate_conditionals() {
        let a = atom("!cat/pkg:1::repo[a?,b=,!c=,!d?,e]");
        let use_flags: BTreeSet<String> = ["a", "c"].iter().map(|s| s.to_string()).collect();
        let evaluated = a.evaluate_conditionals(&use_flags);
        assert_eq!(evaluated.to_string(), "!cat/pkg:1::repo[a,-b,-c,-d,e]");
        assert_eq!(evaluated.repo(), Some("repo"));
        assert_eq!(evaluated.unevaluated_atom(), &a);
        assert_eq!(evaluated.without_use().to_string(), "!cat/pkg:1::repo");
        assert_eq!(evaluated.evaluate_conditionals(&use_flags), evaluated);

        let none = atom("cat/pkg[a?]").evaluate_conditionals(&BTreeSet::new());
        assert_eq!(none.to_string(), "cat/pkg");
        assert!(none.use_deps().is_none());
        assert_eq!(none.unevaluated_atom().to_string(), "cat/pkg[a?]");
    }

    #[test]
    fn test_violated_conditionals() {
        let a = atom("cat/pkg[foo,-bar]");
        let other: BTreeSet<String> = ["foo".to_string(), "bar".to_string()].into();
        let valid = |_: &str| true;
        let violated = a.violated_conditionals(&other, &valid, None).unwrap();
        assert_eq!(violated.to_string(), "cat/pkg[-bar]");
        assert!(atom("cat/pkg[foo?]")
            .violated_conditionals(&other, &valid, None)
            .is_err());
    }

    #[test]
    fn test_intersects() {
        let a = atom("cat/pkg:1");
        assert!(a.intersects(&atom("cat/pkg")));
        assert!(!a.intersects(&atom("cat/pkg:2")));
        assert!(!a.intersects(&atom("cat/other")));
        assert!(!atom(">=cat/pkg-1").intersects(&atom("<cat/pkg-2")));
        assert!(!atom("cat/pkg[foo]").intersects(&atom("cat/pkg")));
    }

    #[test]
    fn test_intersects_with_use_deps() {
        let a = atom("cat/pkg[foo]");
        assert!(a.intersects(&atom("cat/pkg[foo]")));
        assert!(!a.intersects(&atom("cat/pkg:1[foo]")));
        assert!(!a.intersects(&atom("cat/pkg[foo,bar]")));
        assert!(!atom("cat/pkg:1").intersects(&a));
    }

    #[test]
    fn test_equality_is_textual() {
        assert_ne!(atom("=cat/pkg-1.0"), atom("=cat/pkg-1.00"));
        let mut set = std::collections::HashSet::new();
        set.insert(atom("cat/pkg:1"));
        assert!(set.contains("cat/pkg:1"));
        assert_eq!("cat/pkg".parse::<Atom>().unwrap(), atom("cat/pkg"));
    }
}
