use relay::{Args, Outcome, ReceiverError, Value, receiver};

#[receiver]
fn plain(count: u32, label: String) -> String {
    format!("{label}:{count}")
}

#[receiver]
fn optional(limit: Option<usize>, extra: Option<Value>) -> bool {
    limit.is_some() || extra.is_some()
}

#[receiver]
fn everything(first: Value, rest: &Args) -> usize {
    let _ = first;
    rest.named_len()
}

#[receiver]
fn failing(mut attempts: u8) -> Result<(), std::io::Error> {
    attempts += 1;
    Err(std::io::Error::other(format!("gave up after {attempts}")))
}

#[receiver]
fn passthrough() -> Outcome {
    Err(ReceiverError::failed("never"))
}

#[receiver]
/// Documented receivers keep their docs on the constructor.
pub fn documented() {}

fn main() {
    let functions = [
        plain(),
        optional(),
        everything(),
        failing(),
        passthrough(),
        documented(),
    ];
    assert!(functions[2].signature().is_variadic_named());
    assert_eq!(functions[0].signature().accepted_count(), 2);
}
