use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use winnow::combinator::{alt, opt, preceded};
use winnow::error::{ContextError, ErrMode, StrContext};
use winnow::prelude::*;
use winnow::token::take_while;

use crate::error::{Error, Result};

/// Default value for a USE flag that is not defined by the dependency package
///
/// See [PMS 8.3.4](https://projects.gentoo.org/pms/9/pms.html#style-and-style-use-dependencies).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UseDefault {
    /// `(+)`: assume the flag is enabled if not defined by the package.
    Enabled,
    /// `(-)`: assume the flag is disabled if not defined by the package.
    Disabled,
}

impl fmt::Display for UseDefault {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            UseDefault::Enabled => write!(f, "(+)"),
            UseDefault::Disabled => write!(f, "(-)"),
        }
    }
}

/// The kind of constraint a USE dependency expresses
///
/// See [PMS 8.3.4](https://projects.gentoo.org/pms/9/pms.html#style-and-style-use-dependencies).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UseDepKind {
    /// `[flag]`: the dependency's flag must be enabled.
    Enabled,
    /// `[-flag]`: the dependency's flag must be disabled.
    Disabled,
    /// `[flag?]`: enabled if the parent's flag is enabled.
    Conditional,
    /// `[!flag?]`: disabled if the parent's flag is disabled.
    ConditionalInverse,
    /// `[flag=]`: same state as the parent's flag.
    Equal,
    /// `[!flag=]`: opposite state of the parent's flag.
    EqualInverse,
}

/// A single USE flag constraint within a dependency atom
///
/// Appears inside brackets in dependency strings, e.g. `[ssl,-debug,python?]`.
/// [`Display`](fmt::Display) reproduces the token exactly as parsed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UseDep {
    pub flag: String,
    pub kind: UseDepKind,
    pub default: Option<UseDefault>,
}

impl UseDep {
    pub fn new(flag: impl Into<String>, kind: UseDepKind) -> Self {
        UseDep {
            flag: flag.into(),
            kind,
            default: None,
        }
    }

    /// Parse single USE dependency (without brackets)
    pub fn parse(input: &str) -> Result<Self> {
        parse_use_dep_item()
            .parse(input)
            .map_err(|e| Error::InvalidUseDep(format!("{}: {}", input, e)))
    }

    fn with_kind(&self, kind: UseDepKind) -> Self {
        UseDep {
            flag: self.flag.clone(),
            kind,
            default: self.default,
        }
    }
}

impl fmt::Display for UseDep {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.kind {
            UseDepKind::Disabled => write!(f, "-")?,
            UseDepKind::ConditionalInverse | UseDepKind::EqualInverse => write!(f, "!")?,
            _ => {}
        }

        write!(f, "{}", self.flag)?;

        // PMS 8.3.4: default immediately follows the flag name, before ?/=
        if let Some(default) = self.default {
            write!(f, "{}", default)?;
        }

        match self.kind {
            UseDepKind::Conditional | UseDepKind::ConditionalInverse => write!(f, "?")?,
            UseDepKind::Equal | UseDepKind::EqualInverse => write!(f, "=")?,
            _ => {}
        }

        Ok(())
    }
}

impl FromStr for UseDep {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Conditional USE dependency buckets, keyed by the parent's flag state
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct UseConditionals {
    /// `flag?`
    pub enabled: BTreeSet<String>,
    /// `!flag?`
    pub disabled: BTreeSet<String>,
    /// `flag=`
    pub equal: BTreeSet<String>,
    /// `!flag=`
    pub not_equal: BTreeSet<String>,
}

impl UseConditionals {
    fn insert(&mut self, dep: &UseDep) {
        let bucket = match dep.kind {
            UseDepKind::Conditional => &mut self.enabled,
            UseDepKind::ConditionalInverse => &mut self.disabled,
            UseDepKind::Equal => &mut self.equal,
            UseDepKind::EqualInverse => &mut self.not_equal,
            UseDepKind::Enabled | UseDepKind::Disabled => return,
        };
        bucket.insert(dep.flag.clone());
    }

    fn is_empty(&self) -> bool {
        self.enabled.is_empty()
            && self.disabled.is_empty()
            && self.equal.is_empty()
            && self.not_equal.is_empty()
    }
}

/// The bracketed USE dependencies of an atom, partitioned by meaning
///
/// `required` holds the flags written without a `(+)`/`(-)` default; such
/// flags must exist in the target package's IUSE. A flag appears in at most
/// one of `required`, `missing_enabled` and `missing_disabled`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct UseDepSet {
    tokens: Vec<UseDep>,
    enabled: BTreeSet<String>,
    disabled: BTreeSet<String>,
    required: BTreeSet<String>,
    missing_enabled: BTreeSet<String>,
    missing_disabled: BTreeSet<String>,
    conditional: Option<UseConditionals>,
}

impl UseDepSet {
    /// Parse the comma separated tokens found between the brackets
    ///
    /// ```
    /// use portage_depspec::UseDepSet;
    ///
    /// let deps = UseDepSet::parse(["ssl", "-debug", "python?"]).unwrap();
    /// assert!(deps.enabled().contains("ssl"));
    /// assert!(deps.conditional().is_some());
    /// assert_eq!(deps.to_string(), "[ssl,-debug,python?]");
    /// ```
    pub fn parse<I, S>(tokens: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = UseDepSet::default();
        let mut conditional = UseConditionals::default();
        let mut has_conditional = false;

        for token in tokens {
            let token = token.as_ref();
            let dep = UseDep::parse(token)
                .map_err(|_| Error::InvalidUseDep(format!("Invalid use dep: '{}'", token)))?;

            match dep.kind {
                UseDepKind::Enabled => {
                    set.enabled.insert(dep.flag.clone());
                }
                UseDepKind::Disabled => {
                    set.disabled.insert(dep.flag.clone());
                }
                _ => {
                    has_conditional = true;
                    conditional.insert(&dep);
                }
            }

            let conflict = match dep.default {
                Some(UseDefault::Enabled) => {
                    set.missing_disabled.contains(&dep.flag) || set.required.contains(&dep.flag)
                }
                Some(UseDefault::Disabled) => {
                    set.missing_enabled.contains(&dep.flag) || set.required.contains(&dep.flag)
                }
                None => {
                    set.missing_enabled.contains(&dep.flag)
                        || set.missing_disabled.contains(&dep.flag)
                }
            };
            if conflict {
                return Err(Error::InvalidUseDep(format!("Invalid use dep: '{}'", token)));
            }
            match dep.default {
                Some(UseDefault::Enabled) => set.missing_enabled.insert(dep.flag.clone()),
                Some(UseDefault::Disabled) => set.missing_disabled.insert(dep.flag.clone()),
                None => set.required.insert(dep.flag.clone()),
            };

            set.tokens.push(dep);
        }

        if has_conditional {
            set.conditional = Some(conditional);
        }
        Ok(set)
    }

    pub fn tokens(&self) -> &[UseDep] {
        &self.tokens
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Flags that must be enabled
    pub fn enabled(&self) -> &BTreeSet<String> {
        &self.enabled
    }

    /// Flags that must be disabled
    pub fn disabled(&self) -> &BTreeSet<String> {
        &self.disabled
    }

    /// Flags given without a default, which must be in the target's IUSE
    pub fn required(&self) -> &BTreeSet<String> {
        &self.required
    }

    /// Flags assumed enabled when absent from the target's IUSE (`(+)`)
    pub fn missing_enabled(&self) -> &BTreeSet<String> {
        &self.missing_enabled
    }

    /// Flags assumed disabled when absent from the target's IUSE (`(-)`)
    pub fn missing_disabled(&self) -> &BTreeSet<String> {
        &self.missing_disabled
    }

    pub fn conditional(&self) -> Option<&UseConditionals> {
        self.conditional.as_ref()
    }

    fn derived(
        &self,
        tokens: Vec<UseDep>,
        enabled: BTreeSet<String>,
        disabled: BTreeSet<String>,
        conditional: Option<UseConditionals>,
    ) -> Self {
        UseDepSet {
            tokens,
            enabled,
            disabled,
            required: self.required.clone(),
            missing_enabled: self.missing_enabled.clone(),
            missing_disabled: self.missing_disabled.clone(),
            conditional,
        }
    }

    /// Resolve every conditional against the parent's enabled flags
    ///
    /// | token   | flag in `use` | flag not in `use` |
    /// |---------|---------------|-------------------|
    /// | `flag?` | `flag`        | dropped           |
    /// | `flag=` | `flag`        | `-flag`           |
    /// | `!flag=`| `-flag`       | `flag`            |
    /// | `!flag?`| dropped       | `-flag`           |
    pub fn evaluate_conditionals(&self, use_flags: &BTreeSet<String>) -> Self {
        let mut enabled = BTreeSet::new();
        let mut disabled = BTreeSet::new();
        let mut tokens = Vec::with_capacity(self.tokens.len());

        for dep in &self.tokens {
            let active = use_flags.contains(&dep.flag);
            let kind = match (dep.kind, active) {
                (UseDepKind::Enabled, _) => Some(UseDepKind::Enabled),
                (UseDepKind::Disabled, _) => Some(UseDepKind::Disabled),
                (UseDepKind::Conditional, true) => Some(UseDepKind::Enabled),
                (UseDepKind::Conditional, false) => None,
                (UseDepKind::Equal, true) => Some(UseDepKind::Enabled),
                (UseDepKind::Equal, false) => Some(UseDepKind::Disabled),
                (UseDepKind::EqualInverse, true) => Some(UseDepKind::Disabled),
                (UseDepKind::EqualInverse, false) => Some(UseDepKind::Enabled),
                (UseDepKind::ConditionalInverse, true) => None,
                (UseDepKind::ConditionalInverse, false) => Some(UseDepKind::Disabled),
            };
            match kind {
                Some(UseDepKind::Enabled) => {
                    enabled.insert(dep.flag.clone());
                    tokens.push(dep.with_kind(UseDepKind::Enabled));
                }
                Some(_) => {
                    disabled.insert(dep.flag.clone());
                    tokens.push(dep.with_kind(UseDepKind::Disabled));
                }
                None => {}
            }
        }

        self.derived(tokens, enabled, disabled, None)
    }

    /// Keep only the constraints that `other_use` does not already satisfy
    ///
    /// `is_valid_flag` tells whether a flag is in the target package's IUSE;
    /// for flags outside of it the declared defaults stand in. Conditional
    /// tokens need `parent_use`, the enabled flags of the depending package.
    pub fn violated_conditionals(
        &self,
        other_use: &BTreeSet<String>,
        is_valid_flag: &dyn Fn(&str) -> bool,
        parent_use: Option<&BTreeSet<String>>,
    ) -> Result<Self> {
        let empty = BTreeSet::new();
        let parent_use = match parent_use {
            Some(parent_use) => parent_use,
            None if self.conditional.is_some() => {
                return Err(Error::InvalidUseDep(
                    "violated_conditionals needs 'parent_use' parameter for conditional flags"
                        .to_string(),
                ))
            }
            None => &empty,
        };

        let mut enabled = BTreeSet::new();
        let mut disabled = BTreeSet::new();
        let mut conditional = UseConditionals::default();
        let mut tokens = Vec::new();

        for dep in &self.tokens {
            let flag = dep.flag.as_str();
            let valid = is_valid_flag(flag);
            let in_other = other_use.contains(flag);
            let in_parent = parent_use.contains(flag);
            let missing_enabled = self.missing_enabled.contains(flag);
            let missing_disabled = self.missing_disabled.contains(flag);

            let keep = if !valid && !missing_enabled && !missing_disabled {
                true
            } else {
                match dep.kind {
                    UseDepKind::Enabled => !in_other && (valid || missing_disabled),
                    UseDepKind::Disabled => {
                        if in_other {
                            true
                        } else {
                            !valid && missing_enabled
                        }
                    }
                    UseDepKind::Conditional => {
                        in_parent && !in_other && (valid || missing_disabled)
                    }
                    UseDepKind::Equal => {
                        if in_parent && !in_other {
                            valid || missing_disabled
                        } else if !in_parent {
                            in_other || (!valid && missing_enabled)
                        } else {
                            false
                        }
                    }
                    UseDepKind::EqualInverse => {
                        if !in_parent && !in_other {
                            valid || missing_disabled
                        } else if in_parent {
                            in_other || (!valid && missing_enabled)
                        } else {
                            false
                        }
                    }
                    UseDepKind::ConditionalInverse => {
                        !in_parent && (in_other || (!valid && missing_enabled))
                    }
                }
            };

            if !keep {
                continue;
            }
            match dep.kind {
                UseDepKind::Enabled => {
                    enabled.insert(dep.flag.clone());
                }
                UseDepKind::Disabled => {
                    disabled.insert(dep.flag.clone());
                }
                _ => conditional.insert(dep),
            }
            tokens.push(dep.clone());
        }

        let conditional = (!conditional.is_empty()).then_some(conditional);
        Ok(self.derived(tokens, enabled, disabled, conditional))
    }

    /// Expand every conditional into both of its outcomes, honouring masked
    /// and forced flags; for static analysis without a concrete USE set
    pub fn eval_qa_conditionals(
        &self,
        use_mask: &BTreeSet<String>,
        use_force: &BTreeSet<String>,
    ) -> Self {
        let mut enabled = self.enabled.clone();
        let mut disabled = self.disabled.clone();
        let mut tokens = Vec::new();

        for dep in &self.tokens {
            let masked = use_mask.contains(&dep.flag);
            let forced = use_force.contains(&dep.flag);
            let (emit_enabled, emit_disabled) = match dep.kind {
                UseDepKind::Conditional => (!masked, false),
                UseDepKind::Equal => (!masked, !forced),
                UseDepKind::EqualInverse => (!forced, !masked),
                UseDepKind::ConditionalInverse => (false, !forced),
                UseDepKind::Enabled | UseDepKind::Disabled => {
                    tokens.push(dep.clone());
                    continue;
                }
            };
            if emit_enabled {
                enabled.insert(dep.flag.clone());
                tokens.push(dep.with_kind(UseDepKind::Enabled));
            }
            if emit_disabled {
                disabled.insert(dep.flag.clone());
                tokens.push(dep.with_kind(UseDepKind::Disabled));
            }
        }

        self.derived(tokens, enabled, disabled, None)
    }
}

/// Renders as `[a,b]`, or nothing at all when there are no tokens
impl fmt::Display for UseDepSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.tokens.is_empty() {
            return Ok(());
        }
        write!(f, "[")?;
        for (i, dep) in self.tokens.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", dep)?;
        }
        write!(f, "]")
    }
}

/// Whether `flag` is a syntactically valid USE flag name
pub fn is_valid_use_flag(flag: &str) -> bool {
    parse_use_flag().parse(flag).is_ok()
}

// Winnow parsers

/// USE flag name: `[A-Za-z0-9][A-Za-z0-9+_@-]*`
fn parse_use_flag<'s>() -> impl Parser<&'s str, String, ErrMode<ContextError>> {
    take_while(1.., |c: char| {
        c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '+' || c == '@'
    })
    .verify(|s: &str| s.starts_with(|c: char| c.is_ascii_alphanumeric()))
    .map(|s: &str| s.to_string())
    .context(StrContext::Label("USE flag"))
}

fn parse_use_default<'s>() -> impl Parser<&'s str, UseDefault, ErrMode<ContextError>> {
    alt((
        "(+)".value(UseDefault::Enabled),
        "(-)".value(UseDefault::Disabled),
    ))
}

fn parse_use_dep_item<'s>() -> impl Parser<&'s str, UseDep, ErrMode<ContextError>> {
    alt((
        (
            preceded('!', parse_use_flag()),
            opt(parse_use_default()),
            '?',
        )
            .map(|(flag, default, _)| UseDep {
                flag,
                kind: UseDepKind::ConditionalInverse,
                default,
            }),
        (
            preceded('!', parse_use_flag()),
            opt(parse_use_default()),
            '=',
        )
            .map(|(flag, default, _)| UseDep {
                flag,
                kind: UseDepKind::EqualInverse,
                default,
            }),
        (preceded('-', parse_use_flag()), opt(parse_use_default())).map(|(flag, default)| UseDep {
            flag,
            kind: UseDepKind::Disabled,
            default,
        }),
        (parse_use_flag(), opt(parse_use_default()), '?').map(|(flag, default, _)| UseDep {
            flag,
            kind: UseDepKind::Conditional,
            default,
        }),
        (parse_use_flag(), opt(parse_use_default()), '=').map(|(flag, default, _)| UseDep {
            flag,
            kind: UseDepKind::Equal,
            default,
        }),
        (parse_use_flag(), opt(parse_use_default())).map(|(flag, default)| UseDep {
            flag,
            kind: UseDepKind::Enabled,
            default,
        }),
    ))
    .context(StrContext::Label("use dep"))
}
