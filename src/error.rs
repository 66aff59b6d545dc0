use std::fmt;

/// Machine-readable tag attached to atom and dependency string errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Syntax is valid but not allowed by the active EAPI.
    EapiIncompatible,
    /// A USE conditional references a flag outside of IUSE.
    IuseMissing,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ErrorCategory::EapiIncompatible => write!(f, "EAPI.incompatible"),
            ErrorCategory::IuseMissing => write!(f, "IUSE.missing"),
        }
    }
}

/// Error type for portage-depspec parsing and operations
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum Error {
    #[error("invalid atom '{atom}': {message}")]
    InvalidAtom {
        atom: String,
        message: String,
        category: Option<ErrorCategory>,
    },

    #[error("invalid dep string: {message}")]
    InvalidDepString {
        message: String,
        category: Option<ErrorCategory>,
    },

    #[error("invalid version: {0}")]
    InvalidVersion(String),

    #[error("invalid cpv: {0}")]
    InvalidCpv(String),

    #[error("invalid cpn: {0}")]
    InvalidCpn(String),

    #[error("invalid slot: {0}")]
    InvalidSlot(String),

    #[error("invalid use dep: {0}")]
    InvalidUseDep(String),
}

impl Error {
    pub(crate) fn atom(atom: &str, message: impl Into<String>) -> Self {
        Error::InvalidAtom {
            atom: atom.to_string(),
            message: message.into(),
            category: None,
        }
    }

    pub(crate) fn atom_category(
        atom: &str,
        message: impl Into<String>,
        category: ErrorCategory,
    ) -> Self {
        Error::InvalidAtom {
            atom: atom.to_string(),
            message: message.into(),
            category: Some(category),
        }
    }

    pub(crate) fn dep_string(message: impl Into<String>) -> Self {
        Error::InvalidDepString {
            message: message.into(),
            category: None,
        }
    }

    pub(crate) fn dep_string_category(message: impl Into<String>, category: ErrorCategory) -> Self {
        Error::InvalidDepString {
            message: message.into(),
            category: Some(category),
        }
    }

    /// The machine-readable category, if the error carries one
    pub fn category(&self) -> Option<ErrorCategory> {
        match self {
            Error::InvalidAtom { category, .. } | Error::InvalidDepString { category, .. } => {
                *category
            }
            _ => None,
        }
    }
}

/// Result type for portage-depspec operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_display() {
        assert_eq!(ErrorCategory::EapiIncompatible.to_string(), "EAPI.incompatible");
        assert_eq!(ErrorCategory::IuseMissing.to_string(), "IUSE.missing");
    }

    #[test]
    fn category_accessor() {
        let e = Error::atom_category("!!a/b", "strong blocks", ErrorCategory::EapiIncompatible);
        assert_eq!(e.category(), Some(ErrorCategory::EapiIncompatible));
        assert_eq!(e.to_string(), "invalid atom '!!a/b': strong blocks");
        assert_eq!(Error::dep_string("Missing ')' at end of string").category(), None);
        assert_eq!(Error::InvalidVersion("x".into()).category(), None);
    }
}
