//! Example demonstrating parsing and reducing ebuild dependency strings

use std::collections::BTreeSet;

use portage_depspec::{
    check_required_use, paren_enclose, use_reduce, DepEntry, DepNode, ReduceOptions, ReduceShape,
};

/// Pretty-print a list of DepEntry with indentation.
fn print_entries(entries: &[DepEntry], indent: usize) {
    let pad = "  ".repeat(indent);
    for entry in entries {
        match entry {
            DepEntry::Token(token) => println!("{pad}{token}"),
            DepEntry::UseConditional {
                flag,
                negate,
                children,
            } => {
                let neg = if *negate { "!" } else { "" };
                println!("{pad}{neg}{flag}? (");
                print_entries(children, indent + 1);
                println!("{pad})");
            }
            DepEntry::AllOf(children)
            | DepEntry::AnyOf(children)
            | DepEntry::ExactlyOne(children)
            | DepEntry::AtMostOne(children) => {
                let op = match entry {
                    DepEntry::AnyOf(_) => "|| ",
                    DepEntry::ExactlyOne(_) => "^^ ",
                    DepEntry::AtMostOne(_) => "?? ",
                    _ => "",
                };
                println!("{pad}{op}(");
                print_entries(children, indent + 1);
                println!("{pad})");
            }
        }
    }
}

fn print_nodes(nodes: &[DepNode], indent: usize) {
    let pad = "  ".repeat(indent);
    for node in nodes {
        match node {
            DepNode::Group { operator, children } => {
                let op = operator.map(|op| format!("{op} ")).unwrap_or_default();
                println!("{pad}{op}(");
                print_nodes(children, indent + 1);
                println!("{pad})");
            }
            other => println!("{pad}{other}"),
        }
    }
}

fn main() {
    let examples = [
        // Simple atoms
        "dev-lang/rust >=dev-libs/openssl-1.1.0",
        // Any-of group
        "|| ( dev-libs/openssl dev-libs/libressl )",
        // USE conditional
        "ssl? ( dev-libs/openssl ) !ssl? ( dev-libs/libressl )",
        // Nested structures (realistic DEPEND string)
        ">=dev-lang/rust-1.75.0 || ( ssl? ( >=dev-libs/openssl-1.1.0:0= ) dev-libs/libressl:0= ) !test? ( dev-libs/bar ) dev-libs/baz:2[foo,-debug]",
    ];

    let options = ReduceOptions::new()
        .use_flags(["ssl"])
        .eapi("8")
        .atoms(true)
        .shape(ReduceShape::OpConvert);

    for (i, input) in examples.iter().enumerate() {
        println!("{}. Input:  {input}", i + 1);
        match DepEntry::parse(input) {
            Ok(entries) => {
                println!("   Parsed: {} top-level entries", entries.len());
                print_entries(&entries, 3);
            }
            Err(e) => println!("   Error: {e}"),
        }
        match use_reduce(input, &options) {
            Ok(nodes) => {
                println!("   Reduced with USE=ssl:");
                print_nodes(&nodes, 3);
                println!("   Display: {}", paren_enclose(&nodes, false));
            }
            Err(e) => println!("   Error: {e}"),
        }
        println!();
    }

    // REQUIRED_USE
    let required_use = "^^ ( gtk qt5 ) test? ( debug )";
    for enabled in [vec!["gtk"], vec!["gtk", "qt5", "test"]] {
        let use_flags: BTreeSet<String> = enabled.iter().map(|s| s.to_string()).collect();
        match check_required_use(required_use, &use_flags, |_| true, Some("8")) {
            Ok(tree) if tree.is_satisfied() => {
                println!("REQUIRED_USE=\"{required_use}\" USE={enabled:?}: satisfied")
            }
            Ok(tree) => println!("REQUIRED_USE=\"{required_use}\" USE={enabled:?}: violated: {tree}"),
            Err(e) => println!("REQUIRED_USE=\"{required_use}\": {e}"),
        }
    }
}
