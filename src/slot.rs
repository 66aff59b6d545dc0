use std::fmt;

use winnow::combinator::{alt, opt, preceded};
use winnow::error::{ContextError, ErrMode, StrContext};
use winnow::prelude::*;
use winnow::token::take_while;

use crate::cpn::is_name_start;
use crate::error::{Error, Result};

/// Slot operator for sub-slot rebuilds
///
/// See [PMS 8.3.3](https://projects.gentoo.org/pms/latest/pms.html#slot-dependencies).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SlotOperator {
    /// `:=`: the dependent package must be rebuilt when the dependency's
    /// slot or sub-slot changes.
    Equal,
    /// `:*`: accept any slot; no rebuild is triggered on slot changes.
    Star,
}

impl fmt::Display for SlotOperator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SlotOperator::Equal => write!(f, "="),
            SlotOperator::Star => write!(f, "*"),
        }
    }
}

/// Slot dependency: everything after the `:` of an atom
///
/// Covers `:0`, `:0/2.1`, `:0=`, `:0/2.1=`, `:=` and `:*`. A slot name is
/// never combined with `*`, and a sub-slot always follows a slot name.
///
/// See [PMS 8.3.3](https://projects.gentoo.org/pms/latest/pms.html#slot-dependencies).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SlotDep {
    pub slot: Option<String>,
    pub sub_slot: Option<String>,
    pub operator: Option<SlotOperator>,
}

impl SlotDep {
    /// Parse the text after `:`
    ///
    /// Without slot operators only a bare slot name is accepted.
    pub fn parse(input: &str, slot_operator: bool) -> Result<Self> {
        let parsed = if slot_operator {
            parse_slot_dep().parse(input)
        } else {
            parse_slot_name().parse(input).map(|slot| SlotDep {
                slot: Some(slot),
                sub_slot: None,
                operator: None,
            })
        };
        let dep = parsed.map_err(|e| Error::InvalidSlot(format!("{}: {}", input, e)))?;
        if dep.slot.is_some() && dep.operator == Some(SlotOperator::Star) {
            return Err(Error::InvalidSlot(format!(
                "{}: '*' cannot follow a slot name",
                input
            )));
        }
        Ok(dep)
    }
}

impl fmt::Display for SlotDep {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(slot) = &self.slot {
            write!(f, "{}", slot)?;
        }
        if let Some(sub_slot) = &self.sub_slot {
            write!(f, "/{}", sub_slot)?;
        }
        if let Some(op) = self.operator {
            write!(f, "{}", op)?;
        }
        Ok(())
    }
}

// Winnow parsers

/// Slot name: `[A-Za-z0-9_+][A-Za-z0-9_+.-]*`
fn parse_slot_name<'s>() -> impl Parser<&'s str, String, ErrMode<ContextError>> {
    take_while(1.., |c: char| is_name_start(c) || c == '.' || c == '-')
        .verify(|s: &str| s.starts_with(is_name_start))
        .map(|s: &str| s.to_string())
}

fn parse_slot_operator<'s>() -> impl Parser<&'s str, SlotOperator, ErrMode<ContextError>> {
    alt((
        '='.value(SlotOperator::Equal),
        '*'.value(SlotOperator::Star),
    ))
}

fn parse_slot_dep<'s>() -> impl Parser<&'s str, SlotDep, ErrMode<ContextError>> {
    alt((
        parse_slot_operator().map(|op| SlotDep {
            slot: None,
            sub_slot: None,
            operator: Some(op),
        }),
        (
            parse_slot_name(),
            opt(preceded('/', parse_slot_name())),
            opt(parse_slot_operator()),
        )
            .map(|(slot, sub_slot, operator)| SlotDep {
                slot: Some(slot),
                sub_slot,
                operator,
            }),
    ))
    .context(StrContext::Label("slot"))
}

/// Characters a `:slot` section may span before validation
pub(crate) fn is_slot_loose_char(c: char) -> bool {
    is_name_start(c) || matches!(c, '.' | '/' | '*' | '=' | '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_parsing() {
        let slot = SlotDep::parse("0", true).unwrap();
        assert_eq!(slot.slot.as_deref(), Some("0"));
        assert_eq!(slot.sub_slot, None);
        assert_eq!(slot.operator, None);
    }

    #[test]
    fn test_slot_with_subslot() {
        let slot = SlotDep::parse("0/2.1", true).unwrap();
        assert_eq!(slot.slot.as_deref(), Some("0"));
        assert_eq!(slot.sub_slot.as_deref(), Some("2.1"));
        assert_eq!(slot.to_string(), "0/2.1");
    }

    #[test]
    fn test_slot_operators() {
        let slot = SlotDep::parse("=", true).unwrap();
        assert_eq!(slot.operator, Some(SlotOperator::Equal));
        assert_eq!(slot.slot, None);

        let slot = SlotDep::parse("*", true).unwrap();
        assert_eq!(slot.operator, Some(SlotOperator::Star));

        let slot = SlotDep::parse("0/1.2=", true).unwrap();
        assert_eq!(slot.operator, Some(SlotOperator::Equal));
        assert_eq!(slot.to_string(), "0/1.2=");
    }

    #[test]
    fn test_invalid_slots() {
        assert!(SlotDep::parse("0*", true).is_err());
        assert!(SlotDep::parse("0/1*", true).is_err());
        assert!(SlotDep::parse("/1", true).is_err());
        assert!(SlotDep::parse("-0", true).is_err());
        assert!(SlotDep::parse("0=", false).is_err());
        assert!(SlotDep::parse("0/1", false).is_err());
        assert!(SlotDep::parse("=", false).is_err());
        assert!(SlotDep::parse("2.7", false).is_ok());
    }
}
