use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, LazyLock};

use moka::sync::Cache;
use tracing::{debug, trace};

use crate::atom::{Atom, AtomOptions};
use crate::dep_entry::{render_entries, DepEntry};
use crate::eapi::EapiAttrs;
use crate::error::{Error, ErrorCategory, Result};
use crate::use_dep::is_valid_use_flag;

/// Placeholder left behind by a group that lost all of its members, for
/// EAPIs where an empty `|| ( )` is not automatically satisfied
pub const EMPTY_ANY_OF: &str = "__const__/empty-any-of";

const REDUCE_CACHE_CAPACITY: u64 = 1024;

/// Group operator of a dependency string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum GroupOperator {
    /// `||`
    AnyOf,
    /// `^^`
    ExactlyOne,
    /// `??`
    AtMostOne,
}

impl GroupOperator {
    pub(crate) fn from_token(token: &str) -> Option<Self> {
        match token {
            "||" => Some(GroupOperator::AnyOf),
            "^^" => Some(GroupOperator::ExactlyOne),
            "??" => Some(GroupOperator::AtMostOne),
            _ => None,
        }
    }
}

impl fmt::Display for GroupOperator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            GroupOperator::AnyOf => write!(f, "||"),
            GroupOperator::ExactlyOne => write!(f, "^^"),
            GroupOperator::AtMostOne => write!(f, "??"),
        }
    }
}

/// A leaf of a reduced dependency string
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DepToken {
    Atom(Atom),
    /// Anything that is not parsed as an atom: URIs, licenses, `->`, ...
    Raw(String),
}

impl DepToken {
    pub fn as_str(&self) -> &str {
        match self {
            DepToken::Atom(atom) => atom.as_str(),
            DepToken::Raw(raw) => raw,
        }
    }

    pub fn as_atom(&self) -> Option<&Atom> {
        match self {
            DepToken::Atom(atom) => Some(atom),
            DepToken::Raw(_) => None,
        }
    }
}

impl fmt::Display for DepToken {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Node of a reduced dependency tree
///
/// In [`ReduceShape::Nested`] and [`ReduceShape::Flat`] output, an operator
/// precedes its group as a separate [`DepNode::Operator`]; in
/// [`ReduceShape::OpConvert`] output it is folded into the group instead.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DepNode {
    Token(DepToken),
    Operator(GroupOperator),
    Group {
        operator: Option<GroupOperator>,
        children: Vec<DepNode>,
    },
}

impl DepNode {
    pub fn token(&self) -> Option<&DepToken> {
        match self {
            DepNode::Token(token) => Some(token),
            _ => None,
        }
    }

    fn write_to(&self, out: &mut String, unevaluated: bool) {
        match self {
            DepNode::Token(DepToken::Atom(atom)) if unevaluated => {
                out.push_str(atom.unevaluated_atom().as_str())
            }
            DepNode::Token(token) => out.push_str(token.as_str()),
            DepNode::Operator(op) => out.push_str(&op.to_string()),
            DepNode::Group { operator, children } => {
                if let Some(op) = operator {
                    out.push_str(&format!("{} ", op));
                }
                out.push('(');
                for child in children {
                    out.push(' ');
                    child.write_to(out, unevaluated);
                }
                out.push_str(" )");
            }
        }
    }
}

impl fmt::Display for DepNode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut out = String::new();
        self.write_to(&mut out, false);
        f.write_str(&out)
    }
}

/// Render a reduced tree back to a dependency string
///
/// With `unevaluated` set, atoms are written in the form they had before
/// their USE conditionals were evaluated.
///
/// ```
/// use portage_depspec::{paren_enclose, use_reduce, ReduceOptions};
///
/// let nodes = use_reduce("a/b || ( c/d e/f )", &ReduceOptions::new()).unwrap();
/// assert_eq!(paren_enclose(&nodes, false), "a/b || ( c/d e/f )");
/// ```
pub fn paren_enclose(nodes: &[DepNode], unevaluated: bool) -> String {
    let mut out = String::new();
    for (i, node) in nodes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        node.write_to(&mut out, unevaluated);
    }
    out
}

/// Output layout of [`use_reduce`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ReduceShape {
    /// Groups are nested lists, each operator precedes its group.
    #[default]
    Nested,
    /// Each operator becomes the tag of its own group.
    OpConvert,
    /// All structure is dropped; operators stay in line with the leaves.
    Flat,
}

/// How USE conditionals are decided
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConditionalMode {
    /// By membership in the enabled flag set.
    #[default]
    Use,
    /// Every conditional is active, for static checks.
    MatchAll,
    /// No conditional is active.
    MatchNone,
}

/// Options for [`use_reduce`]
///
/// ```
/// use portage_depspec::{ReduceOptions, ReduceShape};
///
/// let options = ReduceOptions::new()
///     .use_flags(["ssl"])
///     .eapi("8")
///     .atoms(true)
///     .shape(ReduceShape::Flat);
/// assert!(options.use_flags.contains("ssl"));
/// ```
#[derive(Clone, Default)]
pub struct ReduceOptions<'a> {
    /// Enabled USE flags.
    pub use_flags: BTreeSet<String>,
    /// Masked flags, always read as disabled.
    pub masked: BTreeSet<String>,
    /// Flags whose negated conditionals are always inactive.
    pub exclude_negated: BTreeSet<String>,
    pub conditionals: ConditionalMode,
    /// SRC_URI grammar: `->` arrows, no operator groups.
    pub src_uri: bool,
    pub eapi: Option<&'a str>,
    pub shape: ReduceShape,
    /// Parse leaves as [`Atom`]s.
    pub atoms: bool,
    /// Keep only what is reachable through a conditional on one of these flags.
    pub subset: Option<BTreeSet<String>>,
    /// IUSE membership test for conditional flags; disables result caching.
    pub is_valid_flag: Option<&'a dyn Fn(&str) -> bool>,
}

fn to_set<I, S>(flags: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    flags.into_iter().map(Into::into).collect()
}

impl<'a> ReduceOptions<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn use_flags<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.use_flags = to_set(flags);
        self
    }

    pub fn masked<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.masked = to_set(flags);
        self
    }

    pub fn exclude_negated<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_negated = to_set(flags);
        self
    }

    pub fn conditionals(mut self, mode: ConditionalMode) -> Self {
        self.conditionals = mode;
        self
    }

    pub fn src_uri(mut self, src_uri: bool) -> Self {
        self.src_uri = src_uri;
        self
    }

    pub fn eapi(mut self, eapi: &'a str) -> Self {
        self.eapi = Some(eapi);
        self
    }

    pub fn shape(mut self, shape: ReduceShape) -> Self {
        self.shape = shape;
        self
    }

    pub fn atoms(mut self, atoms: bool) -> Self {
        self.atoms = atoms;
        self
    }

    pub fn subset<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subset = Some(to_set(flags));
        self
    }

    pub fn is_valid_flag(mut self, is_valid_flag: &'a dyn Fn(&str) -> bool) -> Self {
        self.is_valid_flag = Some(is_valid_flag);
        self
    }

    fn cache_key(&self, input: &str) -> CacheKey {
        CacheKey {
            input: input.to_string(),
            use_flags: self.use_flags.clone(),
            masked: self.masked.clone(),
            exclude_negated: self.exclude_negated.clone(),
            conditionals: self.conditionals,
            src_uri: self.src_uri,
            eapi: self.eapi.map(str::to_string),
            shape: self.shape,
            atoms: self.atoms,
            subset: self.subset.clone(),
        }
    }
}

impl fmt::Debug for ReduceOptions<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ReduceOptions")
            .field("use_flags", &self.use_flags)
            .field("masked", &self.masked)
            .field("exclude_negated", &self.exclude_negated)
            .field("conditionals", &self.conditionals)
            .field("src_uri", &self.src_uri)
            .field("eapi", &self.eapi)
            .field("shape", &self.shape)
            .field("atoms", &self.atoms)
            .field("subset", &self.subset)
            .field("is_valid_flag", &self.is_valid_flag.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    input: String,
    use_flags: BTreeSet<String>,
    masked: BTreeSet<String>,
    exclude_negated: BTreeSet<String>,
    conditionals: ConditionalMode,
    src_uri: bool,
    eapi: Option<String>,
    shape: ReduceShape,
    atoms: bool,
    subset: Option<BTreeSet<String>>,
}

static REDUCE_CACHE: LazyLock<Cache<CacheKey, Arc<Vec<DepNode>>>> =
    LazyLock::new(|| Cache::new(REDUCE_CACHE_CAPACITY));

/// Reduce a dependency string into a tree, evaluating USE conditionals
///
/// Redundant brackets are removed, a `|| ( x )` group collapses to `x` and
/// nested any-of groups merge into their parent. `^^` and `??` groups keep
/// their members grouped as written.
///
/// ```
/// use portage_depspec::{use_reduce, DepNode, GroupOperator, ReduceOptions};
///
/// let nodes = use_reduce(
///     "ssl? ( dev-libs/openssl ) || ( a/b c/d )",
///     &ReduceOptions::new().use_flags(["ssl"]),
/// )
/// .unwrap();
/// assert_eq!(nodes.len(), 3);
/// assert_eq!(nodes[0].to_string(), "dev-libs/openssl");
/// assert_eq!(nodes[1], DepNode::Operator(GroupOperator::AnyOf));
/// ```
pub fn use_reduce(input: &str, options: &ReduceOptions<'_>) -> Result<Vec<DepNode>> {
    if options.is_valid_flag.is_some() {
        return reduce_uncached(input, options);
    }
    let key = options.cache_key(input);
    if let Some(cached) = REDUCE_CACHE.get(&key) {
        trace!(input, "use_reduce cache hit");
        return Ok(cached.as_ref().clone());
    }
    debug!(input, "use_reduce cache miss");
    let nodes = reduce_uncached(input, options)?;
    REDUCE_CACHE.insert(key, Arc::new(nodes.clone()));
    Ok(nodes)
}

fn reduce_uncached(input: &str, options: &ReduceOptions<'_>) -> Result<Vec<DepNode>> {
    let reducer = Reducer {
        options,
        attrs: EapiAttrs::for_eapi(options.eapi),
    };
    let elements = match options.subset.as_ref().filter(|subset| !subset.is_empty()) {
        Some(subset) => {
            let entries = DepEntry::parse(input)?;
            let selected = reducer.select_subset(&entries, false, false, subset)?;
            reducer.reduce(&render_entries(&selected))?
        }
        None => reducer.reduce(input)?,
    };
    Ok(elements
        .into_iter()
        .map(|element| element.into_node(options.shape))
        .collect())
}

/// Working representation while brackets are still open
#[derive(Debug)]
enum Element {
    Leaf(DepToken),
    Operator(GroupOperator),
    /// `flag?` or `!flag?` waiting for its group
    Conditional(String),
    List(Vec<Element>),
}

impl Element {
    fn into_node(self, shape: ReduceShape) -> DepNode {
        match self {
            Element::Leaf(token) => DepNode::Token(token),
            Element::Operator(op) => DepNode::Operator(op),
            Element::Conditional(raw) => DepNode::Token(DepToken::Raw(raw)),
            Element::List(elements) => {
                let mut elements = elements.into_iter().peekable();
                let operator = match elements.peek() {
                    Some(Element::Operator(op)) if shape == ReduceShape::OpConvert => {
                        let op = *op;
                        elements.next();
                        Some(op)
                    }
                    _ => None,
                };
                DepNode::Group {
                    operator,
                    children: elements.map(|e| e.into_node(shape)).collect(),
                }
            }
        }
    }
}

/// Operator the list at `level` ends in, if any
fn trailing_operator(stack: &[Vec<Element>], level: Option<usize>) -> Option<GroupOperator> {
    match level.and_then(|k| stack[k].last()) {
        Some(Element::Operator(op)) => Some(*op),
        _ => None,
    }
}

/// The operator in effect for `level`, skipping levels that are empty or
/// only wait on a conditional
fn enclosing_operator(stack: &[Vec<Element>], level: Option<usize>) -> Option<GroupOperator> {
    let mut k = level?;
    loop {
        match stack[k].last() {
            Some(Element::Operator(op)) => return Some(*op),
            Some(Element::Leaf(_)) => return None,
            Some(Element::Conditional(_)) | Some(Element::List(_)) | None => {}
        }
        k = k.checked_sub(1)?;
    }
}

fn missing_whitespace_check(token: &str, position: usize) -> Result<()> {
    for marker in [")", "(", "||"] {
        if token.starts_with(marker) || token.ends_with(marker) {
            return Err(Error::dep_string(format!(
                "missing whitespace around '{}' at '{}', token {}",
                marker, token, position
            )));
        }
    }
    Ok(())
}

struct Reducer<'o, 'a> {
    options: &'o ReduceOptions<'a>,
    attrs: EapiAttrs,
}

impl Reducer<'_, '_> {
    fn eapi_name(&self) -> &str {
        self.options.eapi.unwrap_or("None")
    }

    fn is_active(&self, conditional: &str) -> Result<bool> {
        let body = conditional.strip_suffix('?').unwrap_or(conditional);
        let (flag, negated) = match body.strip_prefix('!') {
            Some(flag) => (flag, true),
            None => (body, false),
        };

        match self.options.is_valid_flag {
            Some(is_valid_flag) if !is_valid_flag(flag) => {
                return Err(Error::dep_string_category(
                    format!(
                        "USE flag '{}' referenced in conditional '{}' is not in IUSE",
                        flag, conditional
                    ),
                    ErrorCategory::IuseMissing,
                ));
            }
            Some(_) => {}
            None if !is_valid_use_flag(flag) => {
                return Err(Error::dep_string(format!(
                    "invalid use flag '{}' in conditional '{}'",
                    flag, conditional
                )));
            }
            None => {}
        }

        if negated && self.options.exclude_negated.contains(flag) {
            return Ok(false);
        }
        if self.options.masked.contains(flag) {
            return Ok(negated);
        }
        Ok(match self.options.conditionals {
            ConditionalMode::MatchAll => true,
            ConditionalMode::MatchNone => false,
            ConditionalMode::Use => self.options.use_flags.contains(flag) != negated,
        })
    }

    /// Keep the parts reachable through a conditional on a `subset` flag
    fn select_subset(
        &self,
        entries: &[DepEntry],
        disjunction: bool,
        selected: bool,
        subset: &BTreeSet<String>,
    ) -> Result<Vec<DepEntry>> {
        let mut result = Vec::new();
        for entry in entries {
            match entry {
                DepEntry::Token(_) => {
                    if selected {
                        result.push(entry.clone());
                    }
                }
                DepEntry::AllOf(children) => {
                    let children = self.select_subset(children, false, selected, subset)?;
                    if !disjunction {
                        result.extend(children);
                    } else if !children.is_empty() {
                        result.push(DepEntry::AllOf(children));
                    }
                }
                DepEntry::UseConditional {
                    flag,
                    negate,
                    children,
                } => {
                    let bang = if *negate { "!" } else { "" };
                    if !self.is_active(&format!("{bang}{flag}?"))? {
                        continue;
                    }
                    let selected = selected || subset.contains(&format!("{bang}{flag}"));
                    let children = self.select_subset(children, false, selected, subset)?;
                    if !disjunction {
                        result.extend(children);
                    } else if !children.is_empty() {
                        result.push(DepEntry::AllOf(children));
                    }
                }
                DepEntry::AnyOf(children) => {
                    let children = self.select_subset(children, true, selected, subset)?;
                    if children.is_empty() {
                        continue;
                    }
                    if disjunction {
                        result.extend(children);
                    } else {
                        result.push(DepEntry::AnyOf(children));
                    }
                }
                DepEntry::ExactlyOne(children) | DepEntry::AtMostOne(children) => {
                    let children = self.select_subset(children, true, selected, subset)?;
                    if children.is_empty() {
                        continue;
                    }
                    result.push(match entry {
                        DepEntry::ExactlyOne(_) => DepEntry::ExactlyOne(children),
                        _ => DepEntry::AtMostOne(children),
                    });
                }
            }
        }
        Ok(result)
    }

    fn leaf(&self, token: &str, position: usize) -> Result<DepToken> {
        if self.options.src_uri {
            if !self.attrs.selective_src_uri_restriction
                && (token.starts_with("fetch+") || token.starts_with("mirror+"))
            {
                return Err(Error::dep_string_category(
                    format!(
                        "Selective fetch/mirror restriction not allowed in EAPI {}: token {}",
                        self.eapi_name(),
                        position
                    ),
                    ErrorCategory::EapiIncompatible,
                ));
            }
            return Ok(DepToken::Raw(token.to_string()));
        }
        if !self.options.atoms {
            return Ok(DepToken::Raw(token.to_string()));
        }

        let atom_options = AtomOptions {
            eapi: self.options.eapi,
            is_valid_flag: self.options.is_valid_flag,
            ..AtomOptions::default()
        };
        let atom = match Atom::parse_with(token, &atom_options) {
            Ok(atom) => atom,
            Err(e) => {
                missing_whitespace_check(token, position)?;
                let message = format!("Invalid atom ({}), token {}", e, position);
                return Err(match e.category() {
                    Some(category) => Error::dep_string_category(message, category),
                    None => Error::dep_string(message),
                });
            }
        };
        Ok(DepToken::Atom(match self.options.conditionals {
            ConditionalMode::MatchAll => atom,
            _ => atom.evaluate_conditionals(&self.options.use_flags),
        }))
    }

    fn empty_group_token(&self) -> Result<DepToken> {
        if self.options.atoms && !self.options.src_uri {
            Ok(DepToken::Atom(Atom::parse(EMPTY_ANY_OF)?))
        } else {
            Ok(DepToken::Raw(EMPTY_ANY_OF.to_string()))
        }
    }

    fn reduce(&self, input: &str) -> Result<Vec<Element>> {
        let tokens: Vec<&str> = input.split_whitespace().collect();
        let mut stack: Vec<Vec<Element>> = vec![Vec::new()];
        let mut need_bracket = false;
        let mut need_simple_token = false;

        for (pos, &token) in tokens.iter().enumerate() {
            let position = pos + 1;
            let expected_paren = || {
                Error::dep_string(format!(
                    "expected: '(', got: '{}', token {}",
                    token, position
                ))
            };
            let expected_file_name = || {
                Error::dep_string(format!(
                    "expected: file name, got: '{}', token {}",
                    token, position
                ))
            };

            if token == "(" {
                if need_simple_token {
                    return Err(expected_file_name());
                }
                if tokens.get(pos + 1) == Some(&")") {
                    return Err(Error::dep_string(format!(
                        "expected: dependency string, got: ')', token {}",
                        position
                    )));
                }
                need_bracket = false;
                stack.push(Vec::new());
            } else if token == ")" {
                if need_bracket {
                    return Err(expected_paren());
                }
                if need_simple_token {
                    return Err(expected_file_name());
                }
                let Some(group) = stack.pop().filter(|_| !stack.is_empty()) else {
                    return Err(Error::dep_string(format!(
                        "no matching '(' for ')', token {}",
                        position
                    )));
                };
                self.close_group(&mut stack, group)?;
            } else if let Some(op) = GroupOperator::from_token(token) {
                if self.options.src_uri {
                    return Err(Error::dep_string(format!(
                        "'{}' groups are not allowed in SRC_URI: token {}",
                        op, position
                    )));
                }
                if op == GroupOperator::AtMostOne && !self.attrs.required_use_at_most_one_of {
                    return Err(Error::dep_string_category(
                        format!(
                            "'??' groups are not allowed in EAPI {}: token {}",
                            self.eapi_name(),
                            position
                        ),
                        ErrorCategory::EapiIncompatible,
                    ));
                }
                if need_bracket {
                    return Err(expected_paren());
                }
                need_bracket = true;
                push(&mut stack, Element::Operator(op));
            } else if token == "->" {
                if need_simple_token {
                    return Err(expected_file_name());
                }
                if !self.options.src_uri {
                    return Err(Error::dep_string(format!(
                        "SRC_URI arrow are only allowed in SRC_URI: token {}",
                        position
                    )));
                }
                if !self.attrs.src_uri_arrows {
                    return Err(Error::dep_string_category(
                        format!(
                            "SRC_URI arrow not allowed in EAPI {}: token {}",
                            self.eapi_name(),
                            position
                        ),
                        ErrorCategory::EapiIncompatible,
                    ));
                }
                need_simple_token = true;
                push(&mut stack, Element::Leaf(DepToken::Raw(token.to_string())));
            } else {
                if need_bracket {
                    return Err(expected_paren());
                }
                if need_simple_token && token.contains('/') {
                    return Err(expected_file_name());
                }
                if token.ends_with('?') {
                    need_bracket = true;
                    push(&mut stack, Element::Conditional(token.to_string()));
                } else {
                    need_simple_token = false;
                    let leaf = self.leaf(token, position)?;
                    push(&mut stack, Element::Leaf(leaf));
                }
            }
        }

        if stack.len() != 1 {
            return Err(Error::dep_string("Missing ')' at end of string"));
        }
        if need_bracket {
            return Err(Error::dep_string("Missing '(' at end of string"));
        }
        if need_simple_token {
            return Err(Error::dep_string("Missing file name at end of string"));
        }
        Ok(stack.pop().unwrap_or_default())
    }

    /// Merge the list closed by `)` into the enclosing level
    fn close_group(&self, stack: &mut Vec<Vec<Element>>, mut group: Vec<Element>) -> Result<()> {
        let level = stack.len() - 1;
        let opconvert = self.options.shape == ReduceShape::OpConvert;

        if self.options.shape == ReduceShape::Flat {
            if let Some(Element::Conditional(conditional)) = stack[level].last() {
                let active = self.is_active(conditional)?;
                stack[level].pop();
                if active {
                    stack[level].extend(group);
                }
            } else {
                stack[level].extend(group);
            }
            return Ok(());
        }

        let mut ignore = false;
        match stack[level].last() {
            Some(Element::Operator(op)) if group.is_empty() => {
                if !self.attrs.empty_groups_always_true && *op != GroupOperator::AtMostOne {
                    group.push(Element::Leaf(self.empty_group_token()?));
                }
                stack[level].pop();
            }
            Some(Element::Conditional(conditional)) => {
                ignore = !self.is_active(conditional)?;
                stack[level].pop();
            }
            _ => {}
        }
        if group.is_empty() || ignore {
            return Ok(());
        }

        let is_single = group.len() == 1
            || (matches!(group[0], Element::Operator(GroupOperator::AnyOf))
                && (opconvert || group.len() == 2));
        let outer = trailing_operator(stack, level.checked_sub(1));
        let here = trailing_operator(stack, Some(level));
        let any_of = Some(GroupOperator::AnyOf);

        if outer.is_none() && here.is_none() {
            // ( ( ... ) ) -> ( ... )
            stack[level].extend(group);
        } else if stack[level].is_empty() {
            // an operator one level up keeps the brackets
            special_append(stack, level, group, is_single, opconvert);
        } else if let Some(op) = here.filter(|op| *op != GroupOperator::AnyOf) {
            if opconvert {
                stack[level].pop();
                group.insert(0, Element::Operator(op));
            }
            stack[level].push(Element::List(group));
        } else if is_single && here == any_of {
            // || ( A ) -> A, || ( || ( ... ) ) -> || ( ... )
            stack[level].pop();
            special_append(stack, level, group, is_single, opconvert);
        } else if here == any_of && outer == any_of {
            // || ( A || ( B C ) ) -> || ( A B C )
            stack[level].pop();
            stack[level].extend(group);
        } else if opconvert && here == any_of {
            stack[level].pop();
            group.insert(0, Element::Operator(GroupOperator::AnyOf));
            stack[level].push(Element::List(group));
        } else {
            special_append(stack, level, group, is_single, opconvert);
        }
        Ok(())
    }
}

fn push(stack: &mut [Vec<Element>], element: Element) {
    if let Some(top) = stack.last_mut() {
        top.push(element);
    }
}

/// Append `group` to `stack[level]`, dropping brackets where they carry no meaning
fn special_append(
    stack: &mut [Vec<Element>],
    level: usize,
    mut group: Vec<Element>,
    is_single: bool,
    opconvert: bool,
) {
    if !is_single {
        match stack[level].last_mut() {
            Some(last) if opconvert && matches!(last, Element::Operator(_)) => {
                let op = std::mem::replace(last, Element::List(Vec::new()));
                let mut members = vec![op];
                members.extend(group);
                *last = Element::List(members);
            }
            _ => stack[level].push(Element::List(group)),
        }
        return;
    }

    let outer_any_of = trailing_operator(stack, level.checked_sub(1)) == Some(GroupOperator::AnyOf);
    if matches!(group[0], Element::Operator(GroupOperator::AnyOf)) && outer_any_of {
        let mut members = group.into_iter().skip(1);
        if opconvert {
            stack[level].extend(members);
        } else {
            match members.next() {
                Some(Element::List(inner)) => stack[level].extend(inner),
                Some(other) => stack[level].push(other),
                None => {}
            }
        }
        return;
    }

    if group.len() == 1 && matches!(group[0], Element::List(_)) {
        if let Some(Element::List(inner)) = group.pop() {
            let tagged = opconvert && matches!(inner.first(), Some(Element::Operator(_)));
            match enclosing_operator(stack, level.checked_sub(1)) {
                None if tagged => stack[level].push(Element::List(inner)),
                None => stack[level].extend(inner),
                Some(GroupOperator::AnyOf)
                    if opconvert
                        && matches!(inner.first(), Some(Element::Operator(GroupOperator::AnyOf))) =>
                {
                    stack[level].extend(inner.into_iter().skip(1))
                }
                Some(_) => stack[level].push(Element::List(inner)),
            }
            return;
        }
    }
    stack[level].extend(group);
}
