#[test]
fn test_receiver_expansions_compile() {
    let t = trybuild::TestCases::new();
    t.pass("tests/ui/free_functions.rs");
    t.pass("tests/ui/methods.rs");
    t.pass("tests/ui/raw_identifiers.rs");
}
