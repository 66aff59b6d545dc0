//! Property tests for atom parsing, dependency reduction and matching
//!
//! Inputs are generated from small grammars so that every case is valid
//! unless a test says otherwise.

use std::collections::BTreeSet;

use portage_depspec::{
    check_required_use, match_from_list, paren_enclose, use_reduce, Atom, ConditionalMode, Cpv,
    DepEntry, ReduceOptions, Version,
};
use proptest::prelude::*;

static FLAGS: [&str; 3] = ["alpha", "beta", "gamma"];
static OPERATORS: [&str; 6] = [">=", ">", "=", "<=", "<", "~"];

fn category() -> impl Strategy<Value = String> {
    "[a-z]{1,6}-[a-z]{1,6}"
}

fn package() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9]{0,7}"
}

/// Dotted versions without leading zeros
fn version() -> impl Strategy<Value = String> {
    prop::collection::vec(1u32..200, 1..4).prop_map(|parts| {
        parts
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(".")
    })
}

fn atom() -> impl Strategy<Value = String> {
    (category(), package()).prop_map(|(c, p)| format!("{c}/{p}"))
}

fn flag() -> impl Strategy<Value = &'static str> {
    prop::sample::select(&FLAGS[..])
}

/// One top-level element of a dependency string, paired with the number of
/// atoms it contains
fn dep_item() -> impl Strategy<Value = (String, usize)> {
    prop_oneof![
        atom().prop_map(|a| (a, 1)),
        (flag(), atom(), atom())
            .prop_map(|(f, a, b)| (format!("{f}? ( {a} {b} )"), 2)),
        (flag(), atom()).prop_map(|(f, a)| (format!("!{f}? ( {a} )"), 1)),
        (atom(), atom()).prop_map(|(a, b)| (format!("|| ( {a} {b} )"), 2)),
        (flag(), atom(), atom())
            .prop_map(|(f, a, b)| (format!("|| ( {f}? ( {a} ) {b} )"), 2)),
    ]
}

fn dep_string() -> impl Strategy<Value = (String, usize)> {
    prop::collection::vec(dep_item(), 0..6).prop_map(|items| {
        let count: usize = items.iter().map(|(_, n)| n).sum();
        let text = items
            .into_iter()
            .map(|(s, _)| s)
            .collect::<Vec<_>>()
            .join(" ");
        (text, count)
    })
}

fn use_flags() -> impl Strategy<Value = Vec<&'static str>> {
    prop::sample::subsequence(FLAGS.to_vec(), 0..=FLAGS.len())
}

fn cpv(cp: &str, version: &str) -> Cpv {
    Cpv::parse(&format!("{cp}-{version}")).unwrap()
}

// Parsers either succeed or return an error, never panic
proptest! {
    #[test]
    fn atom_parser_handles_random_input(s in "\\PC*") {
        let _ = Atom::parse(&s);
    }

    #[test]
    fn reducer_handles_random_input(s in "[a-z/|?!()^ ]{0,64}") {
        let _ = use_reduce(&s, &ReduceOptions::new());
        let _ = DepEntry::parse(&s);
    }

    #[test]
    fn required_use_handles_random_input(s in "[a-z|?!()^ ]{0,64}") {
        let _ = check_required_use(&s, &BTreeSet::new(), |_| true, None);
    }
}

proptest! {
    #[test]
    fn atom_components_survive_parsing(
        cat in category(),
        pkg in package(),
        ver in version(),
        op in prop::sample::select(&OPERATORS[..]),
        slot in prop::option::of(0u32..20),
    ) {
        let slot_part = slot.map(|s| format!(":{s}")).unwrap_or_default();
        let input = format!("{op}{cat}/{pkg}-{ver}{slot_part}");
        let atom = Atom::parse(&input).unwrap();

        prop_assert_eq!(atom.to_string(), input.clone());
        prop_assert_eq!(atom.cp().to_string(), format!("{cat}/{pkg}"));
        prop_assert_eq!(atom.version().map(|v| v.to_string()), Some(ver));
        prop_assert_eq!(atom.slot().map(str::to_string), slot.map(|s| s.to_string()));

        let reparsed = Atom::parse(&atom.to_string()).unwrap();
        prop_assert_eq!(reparsed, atom.clone());

        let bare = atom.without_slot().unwrap();
        prop_assert_eq!(bare.slot(), None);
        prop_assert_eq!(bare.to_string(), format!("{op}{cat}/{pkg}-{}", atom.version().unwrap()));
    }

    #[test]
    fn reduction_is_idempotent((input, _) in dep_string(), enabled in use_flags()) {
        let options = ReduceOptions::new().use_flags(enabled);
        let once = use_reduce(&input, &options).unwrap();
        let twice = use_reduce(&paren_enclose(&once, false), &options).unwrap();
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn match_all_keeps_every_atom((input, count) in dep_string()) {
        let options = ReduceOptions::new().conditionals(ConditionalMode::MatchAll);
        let nodes = use_reduce(&input, &options).unwrap();
        let rendered = paren_enclose(&nodes, false);
        let atoms = rendered.split_whitespace().filter(|t| t.contains('/')).count();
        prop_assert_eq!(atoms, count);
    }

    #[test]
    fn enabled_flags_only_add_atoms((input, _) in dep_string(), enabled in use_flags()) {
        // Without negated conditionals every enabled flag can only pull atoms in.
        prop_assume!(!input.contains('!'));
        let none = use_reduce(&input, &ReduceOptions::new()).unwrap();
        let some = use_reduce(&input, &ReduceOptions::new().use_flags(enabled)).unwrap();
        let none: BTreeSet<String> = paren_enclose(&none, false)
            .split_whitespace()
            .filter(|t| t.contains('/'))
            .map(str::to_string)
            .collect();
        let some: BTreeSet<String> = paren_enclose(&some, false)
            .split_whitespace()
            .filter(|t| t.contains('/'))
            .map(str::to_string)
            .collect();
        prop_assert!(none.is_subset(&some));
    }

    #[test]
    fn relational_operators_follow_version_order(a in version(), b in version()) {
        let candidate = [cpv("app-misc/foo", &b)];
        let ordering = Version::parse(&b).unwrap().cmp(&Version::parse(&a).unwrap());
        for (op, expected) in [
            ("<", ordering.is_lt()),
            ("<=", ordering.is_le()),
            ("=", ordering.is_eq()),
            (">=", ordering.is_ge()),
            (">", ordering.is_gt()),
        ] {
            let atom = Atom::parse(&format!("{op}app-misc/foo-{a}")).unwrap();
            prop_assert_eq!(!match_from_list(&atom, &candidate).is_empty(), expected);
        }
    }

    #[test]
    fn glob_respects_component_boundaries(
        ver in version(),
        next in 0u32..10,
        minor in 0u32..100,
    ) {
        let atom = Atom::parse(&format!("=app-misc/foo-{ver}*")).unwrap();
        prop_assert!(atom.matches(&cpv("app-misc/foo", &ver)));
        let extended = cpv("app-misc/foo", &format!("{ver}.{minor}"));
        let longer = cpv("app-misc/foo", &format!("{ver}{next}"));
        prop_assert!(atom.matches(&extended));
        prop_assert!(!atom.matches(&longer));
        prop_assert!(!atom.matches(&cpv("app-misc/bar", &ver)));
    }

    #[test]
    fn unversioned_atom_matches_whole_package(
        versions in prop::collection::vec(version(), 1..8),
    ) {
        let candidates: Vec<Cpv> = versions.iter().map(|v| cpv("app-misc/foo", v)).collect();
        let atom = Atom::parse("app-misc/foo").unwrap();
        prop_assert_eq!(match_from_list(&atom, &candidates).len(), candidates.len());
    }
}
