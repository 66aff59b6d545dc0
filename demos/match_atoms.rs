//! Example demonstrating matching atoms against package records

use portage_depspec::{
    best_match_to_list, match_from_list, Atom, AtomOptions, ExtendedAtomMap, Package,
};

fn main() {
    let installed = [
        Package::parse("dev-lang/python-3.11.9")
            .expect("valid cpv")
            .with_slot("3.11")
            .with_repo("gentoo")
            .with_use(["sqlite", "ssl"], ["sqlite", "ssl", "tk"]),
        Package::parse("dev-lang/python-3.12.4-r1")
            .expect("valid cpv")
            .with_slot("3.12")
            .with_repo("gentoo")
            .with_use(["ssl"], ["sqlite", "ssl", "tk"]),
        Package::parse("dev-lang/python-3.13.0_rc1")
            .expect("valid cpv")
            .with_slot("3.13")
            .with_repo("python-overlay"),
    ];

    println!("1. match_from_list:");
    for input in [
        "dev-lang/python",
        ">=dev-lang/python-3.12",
        "=dev-lang/python-3.1*",
        "=dev-lang/python-3.12*",
        "~dev-lang/python-3.12.4",
        "dev-lang/python:3.11",
        "dev-lang/python[sqlite]",
        "dev-lang/python[tk(-)]",
        "dev-lang/python::gentoo",
    ] {
        let atom = Atom::parse(input).expect("Failed to parse atom");
        let matched: Vec<String> = match_from_list(&atom, &installed)
            .iter()
            .map(|pkg| pkg.cpv.to_string())
            .collect();
        println!("   {input:<28} -> {matched:?}");
    }
    println!();

    println!("2. best_match_to_list:");
    let atoms: Vec<Atom> = [
        "dev-lang/python",
        ">=dev-lang/python-3",
        ">=dev-lang/python-3.12",
        "dev-lang/python:3.12",
        "~dev-lang/python-3.12.4",
    ]
    .iter()
    .map(|s| Atom::parse(s).expect("Failed to parse atom"))
    .collect();
    if let Some(best) = best_match_to_list(&installed[1], &atoms) {
        println!("   {} is best matched by {}", installed[1].cpv, best);
    }
    println!();

    println!("3. Wildcard keyed map:");
    let wildcard = AtomOptions::new().allow_wildcard(true);
    let mut masks: ExtendedAtomMap<Vec<Atom>> = ExtendedAtomMap::new();
    for input in ["dev-lang/python", "dev-*/*", "*/*"] {
        let atom = Atom::parse_with(input, &wildcard).expect("Failed to parse atom");
        masks
            .get_or_insert_default(&atom.cp().to_string())
            .push(atom);
    }
    for cp in ["dev-lang/python", "dev-libs/openssl", "app-misc/foo"] {
        let atoms: Vec<String> = masks
            .get(cp)
            .unwrap_or_default()
            .iter()
            .map(|a| a.to_string())
            .collect();
        println!("   {cp:<18} -> {atoms:?}");
    }
}
