//! Portage dependency specification engine based on [PMS]
//!
//! This crate parses Gentoo/Portage package atoms and dependency strings
//! according to the [Package Manager Specification (PMS)][PMS], reduces
//! dependency strings against a USE flag assignment, checks REQUIRED_USE
//! constraints and matches atoms against package records.
//!
//! [PMS]: https://projects.gentoo.org/pms/latest/pms.html
//!
//! # Examples
//!
//! Parse an atom:
//! ```
//! use portage_depspec::{Atom, Operator};
//!
//! let atom = Atom::parse(">=dev-lang/rust-1.75.0:0/1.75=[llvm_targets_AMDGPU]").unwrap();
//! assert_eq!(atom.operator(), Some(Operator::GreaterOrEqual));
//! assert_eq!(atom.sub_slot(), Some("1.75"));
//! assert!(atom.use_deps().unwrap().enabled().contains("llvm_targets_AMDGPU"));
//! ```
//!
//! Reduce a dependency string for a USE assignment:
//! ```
//! use portage_depspec::{paren_enclose, use_reduce, ReduceOptions};
//!
//! let options = ReduceOptions::new().use_flags(["ssl"]).eapi("8").atoms(true);
//! let nodes = use_reduce(
//!     "ssl? ( dev-libs/openssl:= ) !ssl? ( net-libs/gnutls ) || ( a/b c/d )",
//!     &options,
//! )
//! .unwrap();
//! assert_eq!(paren_enclose(&nodes, false), "dev-libs/openssl:= || ( a/b c/d )");
//! ```
//!
//! Check REQUIRED_USE:
//! ```
//! use std::collections::BTreeSet;
//! use portage_depspec::check_required_use;
//!
//! let use_flags: BTreeSet<String> = ["python".to_string()].into();
//! let tree = check_required_use("python? ( || ( python_targets_3_12 ) )", &use_flags, |_| true, None)
//!     .unwrap();
//! assert!(!tree.is_satisfied());
//! ```
//!
//! Match an atom against packages:
//! ```
//! use portage_depspec::{match_from_list, Atom, Package};
//!
//! let pkgs = [
//!     Package::parse("dev-lang/python-3.11.9").unwrap().with_slot("3.11"),
//!     Package::parse("dev-lang/python-3.12.4").unwrap().with_slot("3.12"),
//! ];
//! let atom = Atom::parse("dev-lang/python:3.12").unwrap();
//! assert_eq!(match_from_list(&atom, &pkgs).len(), 1);
//! ```

mod atom;
mod atom_map;
mod cpn;
mod cpv;
mod dep_entry;
mod eapi;
mod error;
mod matching;
mod reduce;
mod required_use;
mod slot;
mod use_dep;
mod version;

// Re-export main types
pub use atom::{is_valid_atom, Atom, AtomOptions, Blocker};
pub use atom_map::{ExtendedAtomMap, Merge};
pub use cpn::Cpn;
pub use cpv::Cpv;
pub use dep_entry::{extract_affecting_use, render_entries, DepEntry};
pub use eapi::EapiAttrs;
pub use error::{Error, ErrorCategory, Result};
pub use matching::{
    best_match_to_list, extended_cp_match, match_from_list, match_to_list, Package, PackageRecord,
    PackageUse, UNKNOWN_REPO,
};
pub use reduce::{
    paren_enclose, use_reduce, ConditionalMode, DepNode, DepToken, GroupOperator, ReduceOptions,
    ReduceShape, EMPTY_ANY_OF,
};
pub use required_use::{
    check_required_use, human_readable_required_use, required_use_flags, NodeId,
    RequiredUseNode, RequiredUseOperator, RequiredUseTree,
};
pub use slot::{SlotDep, SlotOperator};
pub use use_dep::{is_valid_use_flag, UseConditionals, UseDefault, UseDep, UseDepKind, UseDepSet};
pub use version::{Operator, Revision, Suffix, SuffixKind, Version};
