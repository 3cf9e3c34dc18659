use relay::receiver;

#[receiver]
fn r#match(r#type: String) -> usize {
    r#type.len()
}

fn main() {
    let function = r#match();
    assert_eq!(function.name(), "match");
    assert!(function.signature().declares("type"));
}
