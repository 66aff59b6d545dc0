//! Example demonstrating parsing various Portage atoms

use std::collections::BTreeSet;

use portage_depspec::{is_valid_atom, Atom, AtomOptions, Cpv};

fn main() {
    println!("Portage Atom Parser Examples\n");

    // Simple unversioned atom
    println!("1. Simple atom:");
    let atom = Atom::parse("dev-lang/rust").expect("Failed to parse atom");
    println!("   Input: dev-lang/rust");
    println!("   Category: {}", atom.category());
    println!("   Package: {}", atom.package());
    println!("   Just a name: {}", atom.is_just_name());
    println!("   Output: {}\n", atom);

    // Versioned atom
    println!("2. Atom with version operator:");
    let atom = Atom::parse(">=dev-lang/rust-1.75.0-r1").expect("Failed to parse atom");
    println!("   Input: >=dev-lang/rust-1.75.0-r1");
    println!("   Operator: {:?}", atom.operator());
    println!("   Version: {:?}", atom.version().map(|v| v.to_string()));
    println!("   Output: {}\n", atom);

    // Slot, sub-slot and slot operator
    println!("3. Atom with slot:");
    let atom = Atom::parse("dev-libs/openssl:0/3=").expect("Failed to parse slotted atom");
    println!("   Input: dev-libs/openssl:0/3=");
    println!("   Slot: {:?}", atom.slot());
    println!("   Sub-slot: {:?}", atom.sub_slot());
    println!("   Slot operator: {:?}", atom.slot_operator());
    println!("   Without slot: {}\n", atom.without_slot().expect("valid atom"));

    // USE dependencies and conditional evaluation
    println!("4. Atom with USE dependencies:");
    let atom = Atom::parse("media-libs/mesa[vulkan?,-debug,X(+)]").expect("Failed to parse atom");
    println!("   Input: media-libs/mesa[vulkan?,-debug,X(+)]");
    if let Some(use_deps) = atom.use_deps() {
        for dep in use_deps.tokens() {
            println!("     - {}", dep);
        }
    }
    let enabled: BTreeSet<String> = ["vulkan".to_string()].into();
    println!("   With vulkan on: {}", atom.evaluate_conditionals(&enabled));
    println!("   Without USE: {}\n", atom.without_use());

    // Blocker and repository
    println!("5. Blocker with repository:");
    let atom = Atom::parse("!!dev-lang/rust::gentoo").expect("Failed to parse blocker");
    println!("   Input: !!dev-lang/rust::gentoo");
    println!("   Blocker: {:?}", atom.blocker());
    println!("   Repository: {:?}", atom.repo());
    println!("   Output: {}\n", atom);

    // Wildcards
    println!("6. Wildcard atoms:");
    let options = AtomOptions::new().allow_wildcard(true);
    for input in ["*/*", "dev-*/foo*", "=dev-libs/foo-*1*"] {
        match Atom::parse_with(input, &options) {
            Ok(atom) => println!("   {} -> extended: {}", input, atom.extended_syntax()),
            Err(e) => println!("   {} -> {}", input, e),
        }
    }
    println!();

    // EAPI restrictions
    println!("7. EAPI restrictions:");
    for eapi in ["0", "2", "5", "8"] {
        let options = AtomOptions::new().eapi(eapi);
        println!(
            "   EAPI {}: dev-libs/foo:0= valid: {}",
            eapi,
            is_valid_atom("dev-libs/foo:0=", false, &options)
        );
    }
    println!();

    // Version with suffixes
    println!("8. Version with suffixes:");
    let cpv = Cpv::parse("dev-lang/python-3.11.0_rc2_p1-r1")
        .expect("Failed to parse version with suffixes");
    println!("   Input: dev-lang/python-3.11.0_rc2_p1-r1");
    println!("   Suffixes: {} suffixes", cpv.version.suffixes.len());
    for suffix in &cpv.version.suffixes {
        println!("     - {}", suffix);
    }
    println!("   Output: {}\n", cpv);
}
