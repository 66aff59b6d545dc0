use std::collections::BTreeSet;
use std::fmt;

use tracing::debug;

use crate::eapi::EapiAttrs;
use crate::error::{Error, ErrorCategory, Result};
use crate::reduce::GroupOperator;

/// Index of a node in a [`RequiredUseTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// Operator of a REQUIRED_USE branch
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RequiredUseOperator {
    Group(GroupOperator),
    /// `flag?` or `!flag?`, stored without the trailing `?`
    Conditional(String),
}

impl fmt::Display for RequiredUseOperator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RequiredUseOperator::Group(op) => write!(f, "{op}"),
            RequiredUseOperator::Conditional(flag) => write!(f, "{flag}?"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequiredUseNode {
    Leaf {
        token: String,
        satisfied: bool,
    },
    Branch {
        /// `None` for a plain bracket group and for the root.
        operator: Option<RequiredUseOperator>,
        children: Vec<NodeId>,
        satisfied: bool,
        parent: Option<NodeId>,
    },
}

impl RequiredUseNode {
    pub fn is_satisfied(&self) -> bool {
        match self {
            RequiredUseNode::Leaf { satisfied, .. } | RequiredUseNode::Branch { satisfied, .. } => {
                *satisfied
            }
        }
    }
}

/// Evaluated REQUIRED_USE constraint tree
///
/// Displaying the tree renders the part of the constraint that is violated.
/// Nodes live in an arena; a branch refers to its children and parent by
/// [`NodeId`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequiredUseTree {
    nodes: Vec<RequiredUseNode>,
}

const ROOT: NodeId = NodeId(0);

impl RequiredUseTree {
    fn new() -> Self {
        RequiredUseTree {
            nodes: vec![RequiredUseNode::Branch {
                operator: None,
                children: Vec::new(),
                satisfied: false,
                parent: None,
            }],
        }
    }

    /// Whether every top-level constraint holds
    pub fn is_satisfied(&self) -> bool {
        self.nodes[ROOT.0].is_satisfied()
    }

    pub fn root(&self) -> NodeId {
        ROOT
    }

    pub fn node(&self, id: NodeId) -> &RequiredUseNode {
        &self.nodes[id.0]
    }

    /// Children of a branch; empty for a leaf
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        match &self.nodes[id.0] {
            RequiredUseNode::Branch { children, .. } => children,
            RequiredUseNode::Leaf { .. } => &[],
        }
    }

    fn parent(&self, id: NodeId) -> Option<NodeId> {
        match &self.nodes[id.0] {
            RequiredUseNode::Branch { parent, .. } => *parent,
            RequiredUseNode::Leaf { .. } => None,
        }
    }

    fn operator(&self, id: NodeId) -> Option<&RequiredUseOperator> {
        match &self.nodes[id.0] {
            RequiredUseNode::Branch { operator, .. } => operator.as_ref(),
            RequiredUseNode::Leaf { .. } => None,
        }
    }

    fn is_group(&self, id: NodeId) -> bool {
        matches!(self.operator(id), Some(RequiredUseOperator::Group(_)))
    }

    fn add(&mut self, parent: NodeId, node: RequiredUseNode) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        self.push_child(parent, id);
        id
    }

    fn add_branch(&mut self, parent: NodeId, operator: Option<RequiredUseOperator>) -> NodeId {
        self.add(
            parent,
            RequiredUseNode::Branch {
                operator,
                children: Vec::new(),
                satisfied: false,
                parent: Some(parent),
            },
        )
    }

    fn push_child(&mut self, parent: NodeId, child: NodeId) {
        if let RequiredUseNode::Branch { children, .. } = &mut self.nodes[parent.0] {
            children.push(child);
        }
    }

    fn take_children(&mut self, id: NodeId) -> Vec<NodeId> {
        match &mut self.nodes[id.0] {
            RequiredUseNode::Branch { children, .. } => std::mem::take(children),
            RequiredUseNode::Leaf { .. } => Vec::new(),
        }
    }

    fn set_satisfied(&mut self, id: NodeId, value: bool) {
        match &mut self.nodes[id.0] {
            RequiredUseNode::Leaf { satisfied, .. } | RequiredUseNode::Branch { satisfied, .. } => {
                *satisfied = value
            }
        }
    }

    fn set_parent(&mut self, id: NodeId, new_parent: NodeId) {
        if let RequiredUseNode::Branch { parent, .. } = &mut self.nodes[id.0] {
            *parent = Some(new_parent);
        }
    }

    /// Drop `id`, the most recently added child of `parent`
    fn detach(&mut self, parent: NodeId, id: NodeId) {
        let last = match &mut self.nodes[parent.0] {
            RequiredUseNode::Branch { children, .. } => children.pop(),
            RequiredUseNode::Leaf { .. } => None,
        };
        debug_assert_eq!(last, Some(id), "node is not the last child of its parent");
    }

    /// Replace `id` by its children in `parent`
    fn splice(&mut self, parent: NodeId, id: NodeId) {
        self.detach(parent, id);
        for child in self.take_children(id) {
            self.set_parent(child, parent);
            self.push_child(parent, child);
        }
    }

    fn render(&self, id: NodeId, out: &mut Vec<String>) {
        let (operator, children, parent) = match &self.nodes[id.0] {
            RequiredUseNode::Leaf { token, .. } => {
                out.push(token.clone());
                return;
            }
            RequiredUseNode::Branch {
                operator,
                children,
                parent,
                ..
            } => (operator, children, parent),
        };

        if let Some(op) = operator {
            out.push(op.to_string());
        }
        if parent.is_some() {
            out.push("(".to_string());
        }
        let mut complex_nesting = false;
        let mut cursor = Some(id);
        while let Some(node) = cursor {
            if self.is_group(node) {
                complex_nesting = true;
                break;
            }
            cursor = self.parent(node);
        }
        for &child in children {
            if complex_nesting || !self.nodes[child.0].is_satisfied() {
                self.render(child, out);
            }
        }
        if parent.is_some() {
            out.push(")".to_string());
        }
    }
}

impl fmt::Display for RequiredUseTree {
    /// Inside `||`, `^^` and `??` every child is shown; elsewhere only the
    /// unsatisfied ones.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut out = Vec::new();
        self.render(ROOT, &mut out);
        f.write_str(&out.join(" "))
    }
}

/// Intermediate value on the bracket stack
enum Pending {
    Value(bool),
    Operator(RequiredUseOperator),
}

fn values(entries: &[Pending]) -> impl Iterator<Item = bool> + '_ {
    entries.iter().filter_map(|entry| match entry {
        Pending::Value(value) => Some(*value),
        Pending::Operator(_) => None,
    })
}

fn group_operator(token: &str, attrs: &EapiAttrs, eapi: Option<&str>) -> Result<Option<GroupOperator>> {
    match GroupOperator::from_token(token) {
        Some(GroupOperator::AtMostOne) if !attrs.required_use_at_most_one_of => {
            Err(Error::dep_string_category(
                format!(
                    "Operator '??' is not supported with EAPI '{}'",
                    eapi.unwrap_or("None")
                ),
                ErrorCategory::EapiIncompatible,
            ))
        }
        op => Ok(op),
    }
}

/// Check an enabled flag set against a REQUIRED_USE string
///
/// `iuse_match` tells whether a flag is in IUSE; any flag it rejects is an
/// error with category [`ErrorCategory::IuseMissing`].
///
/// ```
/// use std::collections::BTreeSet;
/// use portage_depspec::check_required_use;
///
/// let use_flags: BTreeSet<String> = ["gtk".to_string(), "qt5".to_string()].into();
/// let tree = check_required_use("^^ ( gtk qt5 )", &use_flags, |_| true, Some("8")).unwrap();
/// assert!(!tree.is_satisfied());
/// assert_eq!(tree.to_string(), "^^ ( gtk qt5 )");
/// ```
pub fn check_required_use<F>(
    required_use: &str,
    use_flags: &BTreeSet<String>,
    iuse_match: F,
    eapi: Option<&str>,
) -> Result<RequiredUseTree>
where
    F: Fn(&str) -> bool,
{
    let attrs = EapiAttrs::for_eapi(eapi);
    let malformed = || Error::dep_string(format!("malformed syntax: '{}'", required_use));
    let is_active = |token: &str| -> Result<bool> {
        let (flag, negated) = match token.strip_prefix('!') {
            Some(flag) => (flag, true),
            None => (token, false),
        };
        if flag.is_empty() || !iuse_match(flag) {
            return Err(Error::dep_string_category(
                format!("USE flag '{}' is not in IUSE", flag),
                ErrorCategory::IuseMissing,
            ));
        }
        Ok(use_flags.contains(flag) != negated)
    };
    let is_satisfied = |op: GroupOperator, values: &[bool]| -> bool {
        if values.is_empty() && attrs.empty_groups_always_true {
            return true;
        }
        let count = values.iter().filter(|v| **v).count();
        match op {
            GroupOperator::AnyOf => count >= 1,
            GroupOperator::ExactlyOne => count == 1,
            GroupOperator::AtMostOne => count <= 1,
        }
    };

    let mut tree = RequiredUseTree::new();
    let mut node = ROOT;
    let mut stack: Vec<Vec<Pending>> = vec![Vec::new()];
    let mut need_bracket = false;

    for token in required_use.split_whitespace() {
        if token == "(" {
            if !need_bracket {
                node = tree.add_branch(node, None);
            }
            need_bracket = false;
            stack.push(Vec::new());
        } else if token == ")" {
            if need_bracket || stack.len() == 1 {
                return Err(malformed());
            }
            let closed_group = stack.pop().unwrap_or_default();
            let closed: Vec<bool> = values(&closed_group).collect();
            let level = stack.len() - 1;
            let parent = tree.parent(node).ok_or_else(malformed)?;

            let op = match stack[level].last() {
                Some(Pending::Operator(_)) => match stack[level].pop() {
                    Some(Pending::Operator(op)) => Some(op),
                    _ => None,
                },
                _ => None,
            };
            match &op {
                Some(RequiredUseOperator::Group(group)) => {
                    let satisfied = is_satisfied(*group, &closed);
                    stack[level].push(Pending::Value(satisfied));
                    tree.set_satisfied(node, satisfied);
                }
                Some(RequiredUseOperator::Conditional(flag)) => {
                    if !is_active(flag.as_str())? {
                        // unreachable branch: satisfied and dropped from the tree
                        tree.set_satisfied(node, true);
                        tree.detach(parent, node);
                        node = parent;
                        continue;
                    }
                    let satisfied = closed.iter().all(|v| *v);
                    stack[level].push(Pending::Value(satisfied));
                    tree.set_satisfied(node, satisfied);
                }
                None => {}
            }

            let child_count = tree.children(node).len();
            match &op {
                None => {
                    let satisfied = closed.iter().all(|v| *v);
                    tree.set_satisfied(node, satisfied);
                    if !closed.is_empty() {
                        stack[level].push(Pending::Value(satisfied));
                    }
                    if child_count <= 1 || !tree.is_group(parent) {
                        tree.splice(parent, node);
                    }
                }
                Some(_) if child_count == 0 => tree.detach(parent, node),
                Some(RequiredUseOperator::Group(_)) if child_count == 1 => {
                    let only = tree.children(node)[0];
                    tree.detach(parent, node);
                    tree.push_child(parent, only);
                    if let RequiredUseNode::Branch { operator, .. } = tree.node(only) {
                        let plain = operator.is_none();
                        tree.set_parent(only, parent);
                        if plain && !tree.is_group(parent) {
                            tree.splice(parent, only);
                        }
                    }
                }
                Some(_) => {}
            }
            node = parent;
        } else if let Some(op) = group_operator(token, &attrs, eapi)? {
            if need_bracket {
                return Err(malformed());
            }
            need_bracket = true;
            let operator = RequiredUseOperator::Group(op);
            let level = stack.len() - 1;
            stack[level].push(Pending::Operator(operator.clone()));
            node = tree.add_branch(node, Some(operator));
        } else {
            if need_bracket {
                return Err(malformed());
            }
            let level = stack.len() - 1;
            if let Some(flag) = token.strip_suffix('?') {
                need_bracket = true;
                let operator = RequiredUseOperator::Conditional(flag.to_string());
                stack[level].push(Pending::Operator(operator.clone()));
                node = tree.add_branch(node, Some(operator));
            } else {
                let satisfied = is_active(token)?;
                stack[level].push(Pending::Value(satisfied));
                tree.add(
                    node,
                    RequiredUseNode::Leaf {
                        token: token.to_string(),
                        satisfied,
                    },
                );
            }
        }
    }

    if stack.len() != 1 || need_bracket {
        return Err(malformed());
    }
    let satisfied = values(&stack[0]).all(|v| v);
    tree.set_satisfied(ROOT, satisfied);
    debug!(required_use, satisfied, "checked REQUIRED_USE");
    Ok(tree)
}

/// Every USE flag referenced by a REQUIRED_USE string
///
/// ```
/// use portage_depspec::required_use_flags;
///
/// let flags = required_use_flags("|| ( a !b ) c? ( d )", None).unwrap();
/// assert_eq!(flags.into_iter().collect::<Vec<_>>(), ["a", "b", "c", "d"]);
/// ```
pub fn required_use_flags(required_use: &str, eapi: Option<&str>) -> Result<BTreeSet<String>> {
    let attrs = EapiAttrs::for_eapi(eapi);
    let malformed = || Error::dep_string(format!("malformed syntax: '{}'", required_use));
    let mut flags = BTreeSet::new();
    let mut depth = 0usize;
    let mut need_bracket = false;

    for token in required_use.split_whitespace() {
        match token {
            "(" => {
                need_bracket = false;
                depth += 1;
            }
            ")" => {
                if need_bracket || depth == 0 {
                    return Err(malformed());
                }
                depth -= 1;
            }
            _ if group_operator(token, &attrs, eapi)?.is_some() => {
                if need_bracket {
                    return Err(malformed());
                }
                need_bracket = true;
            }
            _ => {
                if need_bracket {
                    return Err(malformed());
                }
                let flag = match token.strip_suffix('?') {
                    Some(flag) => {
                        need_bracket = true;
                        flag
                    }
                    None => token,
                };
                flags.insert(flag.strip_prefix('!').unwrap_or(flag).to_string());
            }
        }
    }

    if depth != 0 || need_bracket {
        return Err(malformed());
    }
    Ok(flags)
}

/// Spell out the REQUIRED_USE operators for messages
///
/// ```
/// use portage_depspec::human_readable_required_use;
///
/// assert_eq!(
///     human_readable_required_use("^^ ( a b ) ?? ( c d )"),
///     "exactly-one-of ( a b ) at-most-one-of ( c d )"
/// );
/// ```
pub fn human_readable_required_use(required_use: &str) -> String {
    required_use
        .replace("^^", "exactly-one-of")
        .replace("||", "any-of")
        .replace("??", "at-most-one-of")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn check(required_use: &str, enabled: &[&str]) -> RequiredUseTree {
        check_required_use(required_use, &flags(enabled), |_| true, None).unwrap()
    }

    #[test]
    fn exactly_one_of() {
        assert!(check("^^ ( a b )", &["a"]).is_satisfied());
        assert!(!check("^^ ( a b )", &[]).is_satisfied());

        let tree = check("^^ ( a b )", &["a", "b"]);
        assert!(!tree.is_satisfied());
        assert_eq!(tree.to_string(), "^^ ( a b )");
    }

    #[test]
    fn any_of_and_at_most_one_of() {
        assert!(check("|| ( a b )", &["b"]).is_satisfied());
        assert!(!check("|| ( a b )", &[]).is_satisfied());
        assert!(check("?? ( a b )", &[]).is_satisfied());
        assert!(check("?? ( a b )", &["a"]).is_satisfied());
        assert!(!check("?? ( a b )", &["a", "b"]).is_satisfied());
    }

    #[test]
    fn empty_groups_follow_eapi() {
        let none = BTreeSet::new();
        let eapi6 = check_required_use("|| ( )", &none, |_| true, Some("6")).unwrap();
        assert!(eapi6.is_satisfied());
        let eapi7 = check_required_use("|| ( )", &none, |_| true, Some("7")).unwrap();
        assert!(!eapi7.is_satisfied());
        assert!(!check("|| ( )", &[]).is_satisfied());
    }

    #[test]
    fn conditionals() {
        let tree = check("foo? ( bar )", &["foo"]);
        assert!(!tree.is_satisfied());
        assert_eq!(tree.to_string(), "foo? ( bar )");

        let tree = check("foo? ( bar )", &[]);
        assert!(tree.is_satisfied());
        assert!(tree.children(tree.root()).is_empty());

        assert!(check("!foo? ( bar )", &["foo"]).is_satisfied());
        assert!(!check("!foo? ( bar )", &[]).is_satisfied());
        assert!(check("foo? ( !bar )", &["foo"]).is_satisfied());
    }

    #[test]
    fn explanation_shows_only_failures_in_plain_context() {
        let tree = check("a b", &["a"]);
        assert_eq!(tree.to_string(), "b");

        let tree = check("( a )", &[]);
        assert_eq!(tree.children(tree.root()).len(), 1);
        assert_eq!(tree.to_string(), "a");

        let tree = check("|| ( a )", &[]);
        assert!(!tree.is_satisfied());
        assert_eq!(tree.to_string(), "a");
    }

    #[test]
    fn nested_groups_keep_meaning_under_operators() {
        let tree = check("|| ( a ( b c ) )", &["b"]);
        assert!(!tree.is_satisfied());
        assert_eq!(tree.to_string(), "|| ( a ( b c ) )");
        assert!(check("|| ( a ( b c ) )", &["b", "c"]).is_satisfied());
    }

    #[test]
    fn tree_parents_are_indices() {
        let tree = check("foo? ( ^^ ( a b ) ) c", &["foo", "a", "b"]);
        let root = tree.root();
        let first = tree.children(root)[0];
        match tree.node(first) {
            RequiredUseNode::Branch {
                operator, parent, ..
            } => {
                assert_eq!(
                    operator,
                    &Some(RequiredUseOperator::Conditional("foo".to_string()))
                );
                assert_eq!(*parent, Some(root));
            }
            RequiredUseNode::Leaf { .. } => panic!("expected a branch"),
        }
        assert_eq!(tree.to_string(), "foo? ( ^^ ( a b ) ) c");
    }

    #[test]
    fn errors() {
        let none = BTreeSet::new();
        for input in ["|| a", "a )", "( a", "foo?", "||"] {
            let err = check_required_use(input, &none, |_| true, None).unwrap_err();
            assert!(err.to_string().contains("malformed syntax"), "{input}: {err}");
        }

        let err = check_required_use("a x", &none, |flag| flag == "a", None).unwrap_err();
        assert_eq!(err.category(), Some(ErrorCategory::IuseMissing));

        let err = check_required_use("?? ( a b )", &none, |_| true, Some("4")).unwrap_err();
        assert_eq!(err.category(), Some(ErrorCategory::EapiIncompatible));
    }

    #[test]
    fn referenced_flags() {
        let flags = required_use_flags("^^ ( a !b ( c ) ) d? ( !e? ( f ) )", Some("8")).unwrap();
        assert_eq!(
            flags.into_iter().collect::<Vec<_>>(),
            ["a", "b", "c", "d", "e", "f"]
        );
        assert!(required_use_flags("|| ( a", None).is_err());
        assert!(required_use_flags("?? ( a b )", Some("4")).is_err());
    }

    #[test]
    fn human_readable() {
        assert_eq!(
            human_readable_required_use("|| ( a b )"),
            "any-of ( a b )"
        );
    }
}
