use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::LazyLock;

use parking_lot::RwLock;
use regex::Regex;
use tracing::trace;

use crate::atom::Atom;
use crate::cpv::Cpv;
use crate::error::{Error, Result};
use crate::version::{Operator, Version};

/// Repository name of packages whose origin is not known; such packages
/// satisfy any `::repo` constraint.
pub const UNKNOWN_REPO: &str = "__unknown__";

/// USE state of a package: enabled flags and the flags it declares
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PackageUse {
    pub enabled: BTreeSet<String>,
    pub iuse: BTreeSet<String>,
}

impl PackageUse {
    pub fn new<E, I, S, T>(enabled: E, iuse: I) -> Self
    where
        E: IntoIterator<Item = S>,
        S: Into<String>,
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        PackageUse {
            enabled: enabled.into_iter().map(Into::into).collect(),
            iuse: iuse.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_valid_flag(&self, flag: &str) -> bool {
        self.iuse.contains(flag)
    }
}

/// What the match engine needs to know about a candidate package
///
/// Only the cpv is mandatory. A record without slot, repo or USE
/// information passes the corresponding filter.
pub trait PackageRecord {
    fn cpv(&self) -> &Cpv;

    fn slot(&self) -> Option<&str> {
        None
    }

    fn sub_slot(&self) -> Option<&str> {
        None
    }

    fn repo(&self) -> Option<&str> {
        None
    }

    fn build_id(&self) -> Option<u64> {
        None
    }

    fn use_flags(&self) -> Option<&PackageUse> {
        None
    }
}

impl PackageRecord for Cpv {
    fn cpv(&self) -> &Cpv {
        self
    }
}

/// A concrete package record
///
/// ```
/// use portage_depspec::{Atom, Package};
///
/// let pkg = Package::parse("dev-libs/openssl-3.0.13")
///     .unwrap()
///     .with_slot("0/3")
///     .with_repo("gentoo")
///     .with_use(["asm"], ["asm", "test"]);
/// assert!(Atom::parse(">=dev-libs/openssl-3:0/3::gentoo[asm,-test]").unwrap().matches(&pkg));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Package {
    pub cpv: Cpv,
    pub slot: Option<String>,
    pub sub_slot: Option<String>,
    pub repo: Option<String>,
    pub build_id: Option<u64>,
    pub use_flags: Option<PackageUse>,
}

impl Package {
    pub fn new(cpv: Cpv) -> Self {
        Package {
            cpv,
            slot: None,
            sub_slot: None,
            repo: None,
            build_id: None,
            use_flags: None,
        }
    }

    /// Parse a `category/package-version` string
    pub fn parse(cpv: &str) -> Result<Self> {
        Ok(Self::new(Cpv::parse(cpv)?))
    }

    /// Set the slot from `SLOT` syntax, `slot` or `slot/sub-slot`
    pub fn with_slot(mut self, slot: &str) -> Self {
        match slot.split_once('/') {
            Some((slot, sub_slot)) => {
                self.slot = Some(slot.to_string());
                self.sub_slot = Some(sub_slot.to_string());
            }
            None => {
                self.slot = Some(slot.to_string());
                self.sub_slot = None;
            }
        }
        self
    }

    pub fn with_repo(mut self, repo: &str) -> Self {
        self.repo = Some(repo.to_string());
        self
    }

    pub fn with_build_id(mut self, build_id: u64) -> Self {
        self.build_id = Some(build_id);
        self
    }

    pub fn with_use<E, I, S, T>(mut self, enabled: E, iuse: I) -> Self
    where
        E: IntoIterator<Item = S>,
        S: Into<String>,
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.use_flags = Some(PackageUse::new(enabled, iuse));
        self
    }
}

impl PackageRecord for Package {
    fn cpv(&self) -> &Cpv {
        &self.cpv
    }

    fn slot(&self) -> Option<&str> {
        self.slot.as_deref()
    }

    fn sub_slot(&self) -> Option<&str> {
        self.sub_slot.as_deref()
    }

    fn repo(&self) -> Option<&str> {
        self.repo.as_deref()
    }

    fn build_id(&self) -> Option<u64> {
        self.build_id
    }

    fn use_flags(&self) -> Option<&PackageUse> {
        self.use_flags.as_ref()
    }
}

static EXTENDED_CP_RE_CACHE: LazyLock<RwLock<HashMap<String, Regex>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

fn compile_extended_cp(extended_cp: &str) -> Result<Regex> {
    let pattern = format!("^{}$", regex::escape(extended_cp).replace(r"\*", "[^/]*"));
    Regex::new(&pattern).map_err(|e| Error::InvalidCpn(format!("{}: {}", extended_cp, e)))
}

/// Whether a plain `category/package` matches a `*` pattern
///
/// `*` stands for any run of characters other than `/`.
///
/// ```
/// use portage_depspec::extended_cp_match;
///
/// assert!(extended_cp_match("dev-*/foo*", "dev-libs/foobar"));
/// assert!(!extended_cp_match("dev-*/foo*", "app-misc/foo"));
/// ```
pub fn extended_cp_match(extended_cp: &str, other_cp: &str) -> bool {
    if let Some(re) = EXTENDED_CP_RE_CACHE.read().get(extended_cp) {
        return re.is_match(other_cp);
    }
    let re = match compile_extended_cp(extended_cp) {
        Ok(re) => re,
        Err(e) => {
            trace!(%e, "unusable extended cp pattern");
            return false;
        }
    };
    let matched = re.is_match(other_cp);
    EXTENDED_CP_RE_CACHE
        .write()
        .insert(extended_cp.to_string(), re);
    matched
}

/// `category/package-version` with leading zeros of the first version
/// component dropped, as compared by `=cat/pkg-ver*`
fn glob_normalized(cpv: &Cpv) -> String {
    let version = cpv.version.to_string();
    let trimmed = version.trim_start_matches('0');
    if trimmed.starts_with(|c: char| c.is_ascii_digit()) {
        format!("{}-{}", cpv.cpn, trimmed)
    } else {
        format!("{}-0{}", cpv.cpn, trimmed)
    }
}

/// `=*` matches on version component boundaries only, so `1*` does not
/// match `10`
fn glob_matches(prefix: &str, candidate: &str) -> bool {
    let Some(rest) = candidate.strip_prefix(prefix) else {
        return false;
    };
    match (rest.chars().next(), prefix.chars().last()) {
        (None, _) => true,
        (Some(next), _) if matches!(next, '.' | '_' | '-') => true,
        (Some(next), Some(last)) => last.is_ascii_digit() != next.is_ascii_digit(),
        (Some(_), None) => false,
    }
}

fn match_slot<P: PackageRecord>(atom: &Atom, pkg: &P) -> bool {
    let Some(pkg_slot) = pkg.slot() else {
        return true;
    };
    if Some(pkg_slot) != atom.slot() {
        return false;
    }
    match atom.sub_slot() {
        None => true,
        Some(sub_slot) => pkg.sub_slot() == Some(sub_slot),
    }
}

fn match_use<P: PackageRecord>(atom: &Atom, pkg: &P) -> bool {
    let Some(pkg_use) = pkg.use_flags() else {
        return true;
    };
    if let Some(unevaluated) = atom.unevaluated_atom().use_deps() {
        if !unevaluated.required().iter().all(|f| pkg_use.is_valid_flag(f)) {
            return false;
        }
    }
    let Some(deps) = atom.use_deps() else {
        return true;
    };

    let missing_enabled: BTreeSet<&str> = deps
        .missing_enabled()
        .iter()
        .filter(|f| !pkg_use.is_valid_flag(f))
        .map(String::as_str)
        .collect();
    let missing_disabled: BTreeSet<&str> = deps
        .missing_disabled()
        .iter()
        .filter(|f| !pkg_use.is_valid_flag(f))
        .map(String::as_str)
        .collect();

    if !deps.enabled().is_empty() {
        if deps
            .enabled()
            .iter()
            .any(|f| missing_disabled.contains(f.as_str()))
        {
            return false;
        }
        let unresolved = deps
            .enabled()
            .difference(&pkg_use.enabled)
            .any(|f| !missing_enabled.contains(f.as_str()));
        if unresolved {
            return false;
        }
    }
    if !deps.disabled().is_empty() {
        if deps
            .disabled()
            .iter()
            .any(|f| missing_enabled.contains(f.as_str()))
        {
            return false;
        }
        let unresolved = deps
            .disabled()
            .intersection(&pkg_use.enabled)
            .any(|f| !missing_disabled.contains(f.as_str()));
        if unresolved {
            return false;
        }
    }
    true
}

fn match_repo<P: PackageRecord>(atom: &Atom, pkg: &P) -> bool {
    match (atom.repo(), pkg.repo()) {
        (Some(wanted), Some(repo)) => repo == UNKNOWN_REPO || repo == wanted,
        _ => true,
    }
}

fn match_version<P: PackageRecord>(atom: &Atom, pkg: &P) -> bool {
    let cpv = pkg.cpv();
    let Some(atom_cpv) = atom.cpv() else {
        return cpv.cpn == *atom.cp();
    };
    let Some(operator) = atom.operator() else {
        return false;
    };
    match operator {
        Operator::Equal => {
            cpv.cpn == atom_cpv.cpn
                && cpv.version == atom_cpv.version
                && atom.build_id().map_or(true, |id| pkg.build_id() == Some(id))
        }
        Operator::Glob => glob_matches(&glob_normalized(atom_cpv), &glob_normalized(cpv)),
        Operator::Approximate => {
            cpv.cpn == atom_cpv.cpn
                && cpv.version.base().to_string() == atom_cpv.version.base().to_string()
        }
        Operator::Less | Operator::LessOrEqual | Operator::Greater | Operator::GreaterOrEqual => {
            if cpv.cpn != atom_cpv.cpn {
                return false;
            }
            let ordering = cpv.version.cmp(&atom_cpv.version);
            match operator {
                Operator::Less => ordering == Ordering::Less,
                Operator::LessOrEqual => ordering != Ordering::Greater,
                Operator::Greater => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            }
        }
    }
}

fn match_extended<P: PackageRecord>(atom: &Atom, pkg: &P) -> bool {
    let cp = pkg.cpv().cpn.to_string();
    let atom_cp = atom.cp().to_string();
    if cp != atom_cp && !extended_cp_match(&atom_cp, &cp) {
        return false;
    }
    match atom.wildcard_version() {
        Some(fragment) if atom.operator() == Some(Operator::Glob) => {
            let inner = fragment.trim_matches('*');
            pkg.cpv().version.to_string().contains(inner)
        }
        _ => true,
    }
}

/// Candidates matched by `atom`, in input order
///
/// A blocker is matched as the atom it blocks. Filters apply in order
/// (package and version, slot, USE, repository) and stop at the first one
/// that leaves nothing.
///
/// ```
/// use portage_depspec::{match_from_list, Atom, Cpv};
///
/// let candidates: Vec<Cpv> = ["a/b-1", "a/b-1.2", "a/b-10", "c/d-1"]
///     .iter()
///     .map(|s| Cpv::parse(s).unwrap())
///     .collect();
/// let atom = Atom::parse("=a/b-1*").unwrap();
/// let matched: Vec<String> = match_from_list(&atom, &candidates)
///     .iter()
///     .map(|c| c.to_string())
///     .collect();
/// assert_eq!(matched, ["a/b-1", "a/b-1.2"]);
/// ```
pub fn match_from_list<'p, P: PackageRecord>(atom: &Atom, candidates: &'p [P]) -> Vec<&'p P> {
    let mut matched: Vec<&P> = if atom.extended_syntax() {
        candidates
            .iter()
            .filter(|pkg| match_extended(atom, *pkg))
            .collect()
    } else {
        candidates
            .iter()
            .filter(|pkg| match_version(atom, *pkg))
            .collect()
    };
    if matched.is_empty() {
        trace!(atom = atom.as_str(), "no candidate for package and version");
        return matched;
    }

    if atom.slot().is_some() {
        matched.retain(|pkg| match_slot(atom, *pkg));
        if matched.is_empty() {
            trace!(atom = atom.as_str(), "no candidate left after slot filter");
            return matched;
        }
    }

    let has_use_deps = atom
        .unevaluated_atom()
        .use_deps()
        .is_some_and(|deps| !deps.is_empty());
    if has_use_deps {
        matched.retain(|pkg| match_use(atom, *pkg));
        if matched.is_empty() {
            trace!(atom = atom.as_str(), "no candidate left after USE filter");
            return matched;
        }
    }

    if atom.repo().is_some() {
        matched.retain(|pkg| match_repo(atom, *pkg));
    }
    matched
}

/// Atoms from `atoms` that match `pkg`, first occurrence of each kept
pub fn match_to_list<'a, P: PackageRecord>(pkg: &P, atoms: &'a [Atom]) -> Vec<&'a Atom> {
    let mut seen = HashSet::new();
    atoms
        .iter()
        .filter(|atom| seen.insert(atom.as_str()))
        .filter(|atom| atom.matches(pkg))
        .collect()
}

fn operator_value(operator: Option<Operator>) -> i32 {
    match operator {
        Some(Operator::Equal) => 6,
        Some(Operator::Approximate) => 5,
        Some(Operator::Glob) => 4,
        Some(
            Operator::Greater | Operator::GreaterOrEqual | Operator::Less | Operator::LessOrEqual,
        ) => 2,
        None => 1,
    }
}

/// Whether `challenger` sits closer to `version` than `best`
///
/// Undecided when `version` sorts strictly between the two.
fn closer_version(best: &Version, version: &Version, challenger: &Version) -> bool {
    let mut sorted = [(best, 0), (version, 1), (challenger, 2)];
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    (sorted[0].1 == 1 || sorted[2].1 == 1) && sorted[1].1 == 2
}

/// The most specific atom from `atoms` that matches `pkg`
///
/// Ranking, best first: `=cpv`, `~cpv`, `=cpv*`, `cp:slot`, relational
/// operators, plain `cp`, then wildcard atoms (`=*`, slotted, plain). Among
/// relational atoms the one whose version lies closest to the package wins.
///
/// ```
/// use portage_depspec::{best_match_to_list, Atom, Package};
///
/// let pkg = Package::parse("dev-libs/foo-2").unwrap().with_slot("0");
/// let atoms: Vec<Atom> = ["dev-libs/foo", ">=dev-libs/foo-1", "dev-libs/foo:0"]
///     .iter()
///     .map(|s| Atom::parse(s).unwrap())
///     .collect();
/// assert_eq!(best_match_to_list(&pkg, &atoms).unwrap().as_str(), "dev-libs/foo:0");
/// ```
pub fn best_match_to_list<'a, P: PackageRecord>(pkg: &P, atoms: &'a [Atom]) -> Option<&'a Atom> {
    let mut max_value = i32::MIN;
    let mut best: Option<&Atom> = None;

    for atom in match_to_list(pkg, atoms) {
        if atom.extended_syntax() {
            let value = if atom.operator() == Some(Operator::Glob) {
                0
            } else if atom.slot().is_some() {
                -1
            } else {
                -2
            };
            if max_value < value {
                max_value = value;
                best = Some(atom);
            }
            continue;
        }
        if atom.slot().is_some() && max_value < 3 {
            max_value = 3;
            best = Some(atom);
        }
        let value = operator_value(atom.operator());
        if value > max_value {
            max_value = value;
            best = Some(atom);
        } else if value == max_value && value == 2 {
            let (Some(current), Some(challenger)) = (best.and_then(Atom::cpv), atom.cpv()) else {
                continue;
            };
            let own = pkg.cpv();
            if current == own || current == challenger {
                continue;
            }
            if challenger == own
                || closer_version(&current.version, &own.version, &challenger.version)
            {
                best = Some(atom);
            }
        }
    }
    best
}

impl Atom {
    /// Whether `pkg` satisfies this atom
    pub fn matches<P: PackageRecord>(&self, pkg: &P) -> bool {
        !match_from_list(self, std::slice::from_ref(pkg)).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::AtomOptions;

    fn atom(s: &str) -> Atom {
        Atom::parse(s).unwrap()
    }

    fn wildcard(s: &str) -> Atom {
        Atom::parse_with(s, &AtomOptions::new().allow_wildcard(true)).unwrap()
    }

    fn pkg(s: &str) -> Package {
        Package::parse(s).unwrap()
    }

    fn matched<P: PackageRecord>(atom: &Atom, candidates: &[P]) -> Vec<String> {
        match_from_list(atom, candidates)
            .iter()
            .map(|p| p.cpv().to_string())
            .collect()
    }

    fn cpvs(list: &[&str]) -> Vec<Cpv> {
        list.iter().map(|s| Cpv::parse(s).unwrap()).collect()
    }

    #[test]
    fn glob_on_component_boundaries() {
        let candidates = cpvs(&["a/b-1", "a/b-1.2", "a/b-1_rc1", "a/b-10", "a/b-1a", "c/d-1"]);
        assert_eq!(
            matched(&atom("=a/b-1*"), &candidates),
            ["a/b-1", "a/b-1.2", "a/b-1_rc1", "a/b-1a"]
        );
        assert_eq!(matched(&atom("=a/b-1.0*"), &cpvs(&["a/b-1.01", "a/b-1.0.3"])), ["a/b-1.0.3"]);
        assert_eq!(matched(&atom("=a/b-01*"), &cpvs(&["a/b-1.2", "a/b-10"])), ["a/b-1.2"]);
        assert_eq!(matched(&atom("=a/b-1.2*"), &cpvs(&["a/b-1.2-r3"])), ["a/b-1.2-r3"]);
    }

    #[test]
    fn relational_operators() {
        let candidates = cpvs(&["a/b-1", "a/b-2", "a/b-3", "c/d-2"]);
        assert_eq!(matched(&atom(">=a/b-2"), &candidates), ["a/b-2", "a/b-3"]);
        assert_eq!(matched(&atom(">a/b-2"), &candidates), ["a/b-3"]);
        assert_eq!(matched(&atom("<a/b-2"), &candidates), ["a/b-1"]);
        assert_eq!(matched(&atom("<=a/b-2"), &candidates), ["a/b-1", "a/b-2"]);
        assert_eq!(matched(&atom("a/b"), &candidates), ["a/b-1", "a/b-2", "a/b-3"]);
        assert_eq!(matched(&atom("!a/b"), &candidates), ["a/b-1", "a/b-2", "a/b-3"]);
    }

    #[test]
    fn exact_and_approximate() {
        let candidates = cpvs(&["a/b-2", "a/b-2-r1", "a/b-2.0", "a/b-3"]);
        assert_eq!(matched(&atom("=a/b-2"), &candidates), ["a/b-2"]);
        assert_eq!(matched(&atom("~a/b-2"), &candidates), ["a/b-2", "a/b-2-r1"]);

        let built = [pkg("a/b-1").with_build_id(3), pkg("a/b-1").with_build_id(4)];
        let found = match_from_list(&atom("=a/b-1-3"), &built);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].build_id, Some(3));
        assert_eq!(match_from_list(&atom("=a/b-1"), &built).len(), 2);
    }

    #[test]
    fn slot_filter() {
        let candidates = [
            pkg("a/b-1").with_slot("1"),
            pkg("a/b-2").with_slot("2/2.1"),
            pkg("a/b-3").with_slot("2/2.2"),
        ];
        assert_eq!(matched(&atom("a/b:2"), &candidates), ["a/b-2", "a/b-3"]);
        assert_eq!(matched(&atom("a/b:2/2.2"), &candidates), ["a/b-3"]);
        assert_eq!(matched(&atom("a/b:="), &candidates).len(), 3);
        // records without slot information pass
        assert_eq!(matched(&atom("a/b:5"), &cpvs(&["a/b-1"])), ["a/b-1"]);
    }

    #[test]
    fn repo_filter() {
        let candidates = [
            pkg("a/b-1").with_repo("gentoo"),
            pkg("a/b-2").with_repo("overlay"),
            pkg("a/b-3").with_repo(UNKNOWN_REPO),
            pkg("a/b-4"),
        ];
        assert_eq!(
            matched(&atom("a/b::gentoo"), &candidates),
            ["a/b-1", "a/b-3", "a/b-4"]
        );
    }

    #[test]
    fn use_filter() {
        let with_ssl = pkg("a/b-1").with_use(["ssl"], ["ssl", "debug"]);
        let without_ssl = pkg("a/b-1").with_use(Vec::<String>::new(), ["ssl", "debug"]);
        let no_iuse = pkg("a/b-1").with_use(Vec::<String>::new(), Vec::<String>::new());

        assert!(atom("a/b[ssl]").matches(&with_ssl));
        assert!(!atom("a/b[ssl]").matches(&without_ssl));
        assert!(!atom("a/b[ssl]").matches(&no_iuse));
        assert!(atom("a/b[-ssl]").matches(&without_ssl));
        assert!(!atom("a/b[-ssl]").matches(&with_ssl));

        // defaults stand in for flags outside IUSE
        assert!(atom("a/b[ssl(+)]").matches(&no_iuse));
        assert!(!atom("a/b[ssl(-)]").matches(&no_iuse));
        assert!(atom("a/b[-ssl(-)]").matches(&no_iuse));
        assert!(!atom("a/b[-ssl(+)]").matches(&no_iuse));

        // no USE information at all
        assert!(atom("a/b[ssl]").matches(&pkg("a/b-1")));
    }

    #[test]
    fn wildcard_atoms() {
        let candidates = cpvs(&["dev-libs/foobar-1", "app-misc/foo-1", "dev-libs/foo-1.2", "dev-libs/foo-2.0"]);
        assert_eq!(matched(&wildcard("*/*"), &candidates).len(), 4);
        assert_eq!(
            matched(&wildcard("dev-*/foo*"), &candidates),
            ["dev-libs/foobar-1", "dev-libs/foo-1.2", "dev-libs/foo-2.0"]
        );
        assert_eq!(
            matched(&wildcard("=dev-libs/foo-*1*"), &candidates),
            ["dev-libs/foo-1.2"]
        );
    }

    #[test]
    fn extended_cp_patterns() {
        assert!(extended_cp_match("*/*", "a/b"));
        assert!(extended_cp_match("dev-*/*", "dev-libs/c++"));
        assert!(!extended_cp_match("dev-*", "dev-libs/foo"));
        assert!(!extended_cp_match("a.b/c", "aXb/c"));
        // cached pattern gives the same answer
        assert!(extended_cp_match("*/*", "x/y"));
    }

    #[test]
    fn match_to_list_dedupes() {
        let atoms: Vec<Atom> = ["a/b", "a/b", ">=a/b-1", "c/d", "<a/b-1"]
            .iter()
            .map(|s| atom(s))
            .collect();
        let found: Vec<&str> = match_to_list(&pkg("a/b-2"), &atoms)
            .iter()
            .map(|a| a.as_str())
            .collect();
        assert_eq!(found, ["a/b", ">=a/b-1"]);
    }

    #[test]
    fn best_match_ranking() {
        let package = pkg("a/b-2").with_slot("0");
        let atoms: Vec<Atom> = ["a/b", ">=a/b-1", "a/b:0", "~a/b-2", "=a/b-2*", "=a/b-2"]
            .iter()
            .map(|s| atom(s))
            .collect();
        assert_eq!(best_match_to_list(&package, &atoms).unwrap().as_str(), "=a/b-2");
        assert_eq!(best_match_to_list(&package, &atoms[..5]).unwrap().as_str(), "~a/b-2");
        assert_eq!(best_match_to_list(&package, &atoms[..4]).unwrap().as_str(), "~a/b-2");
        assert_eq!(best_match_to_list(&package, &atoms[..3]).unwrap().as_str(), "a/b:0");
        assert_eq!(best_match_to_list(&package, &atoms[..2]).unwrap().as_str(), ">=a/b-1");
        assert!(best_match_to_list(&package, &[atom("c/d")]).is_none());

        let atoms = vec![wildcard("*/*"), wildcard("a/*:0"), atom("a/b")];
        assert_eq!(best_match_to_list(&package, &atoms).unwrap().as_str(), "a/b");
        assert_eq!(best_match_to_list(&package, &atoms[..2]).unwrap().as_str(), "a/*:0");
    }

    #[test]
    fn best_match_prefers_closest_relational_version() {
        let package = pkg("a/b-2");
        let atoms = vec![atom(">=a/b-1"), atom(">=a/b-1.5")];
        assert_eq!(best_match_to_list(&package, &atoms).unwrap().as_str(), ">=a/b-1.5");

        let atoms = vec![atom(">=a/b-1.5"), atom(">=a/b-1")];
        assert_eq!(best_match_to_list(&package, &atoms).unwrap().as_str(), ">=a/b-1.5");

        // package version between the two: first one stays
        let atoms = vec![atom("<a/b-3"), atom(">=a/b-1")];
        assert_eq!(best_match_to_list(&package, &atoms).unwrap().as_str(), "<a/b-3");

        let atoms = vec![atom(">=a/b-1"), atom("<=a/b-2")];
        assert_eq!(best_match_to_list(&package, &atoms).unwrap().as_str(), "<=a/b-2");
    }
}
