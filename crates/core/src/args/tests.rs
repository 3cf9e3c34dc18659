use super::*;

#[test]
fn test_value_downcast_and_identity() {
    let value = Value::new(String::from("payload"));
    let clone = value.clone();

    assert!(value.is::<String>());
    assert!(!value.is::<u32>());
    assert_eq!(value.downcast_ref::<String>().map(String::as_str), Some("payload"));
    assert!(value.ptr_eq(&clone));
    assert!(!value.ptr_eq(&Value::new(String::from("payload"))));
    assert!(Value::unit().is::<()>());
}

#[test]
fn test_named_lookup_by_type() {
    let args = Args::new().with("count", 3_usize).with("label", "north");

    assert_eq!(args.get::<usize>("count").unwrap(), 3);
    assert_eq!(*args.get_ref::<&str>("label").unwrap(), "north");
    assert!(args.contains("count"));
    assert_eq!(args.named_len(), 2);
}

#[test]
fn test_missing_argument_is_reported_by_name() {
    let args = Args::new();
    let err = args.get::<u8>("port").unwrap_err();

    assert!(matches!(err, ReceiverError::MissingArgument { ref name } if name == "port"));
}

#[test]
fn test_wrong_type_is_reported_with_expected_type() {
    let args = Args::new().with("port", "eighty");
    let err = args.get::<u16>("port").unwrap_err();

    match err {
        ReceiverError::ArgumentType { name, expected } => {
            assert_eq!(name, "port");
            assert_eq!(expected, "u16");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_optional_argument() {
    let args = Args::new().with("retries", 2_u8);

    assert_eq!(args.get_opt::<u8>("retries").unwrap(), Some(2));
    assert_eq!(args.get_opt::<u8>("timeout").unwrap(), None);
    assert!(args.get_opt::<String>("retries").is_err());
}

#[test]
fn test_positional_keeps_order() {
    let args = Args::new().arg(1_i32).arg("two").arg_value(Value::new(3.0_f64));

    let positional = args.positional();
    assert_eq!(positional.len(), 3);
    assert_eq!(positional[0].downcast_ref::<i32>(), Some(&1));
    assert_eq!(positional[1].downcast_ref::<&str>(), Some(&"two"));
    assert_eq!(positional[2].downcast_ref::<f64>(), Some(&3.0));
    assert_eq!(args.named_len(), 0);
}

#[test]
fn test_insert_replaces_and_retain_filters() {
    let mut args = Args::new().with("a", 1_u8).with("b", 2_u8).with("c", 3_u8);

    let old = args.insert("a", Value::new(10_u8));
    assert_eq!(old.and_then(|v| v.downcast_ref::<u8>().copied()), Some(1));

    args.retain_named(|name| name != "b");
    let mut names: Vec<&str> = args.named().map(|(name, _)| name).collect();
    names.sort_unstable();
    assert_eq!(names, ["a", "c"]);
    assert_eq!(args.get::<u8>("a").unwrap(), 10);
}

#[test]
fn test_debug_lists_sorted_names() {
    let args = Args::new().arg(0_u8).with("zeta", 1_u8).with("alpha", 2_u8);
    assert_eq!(
        format!("{args:?}"),
        "Args { positional: 1, named: [\"alpha\", \"zeta\"] }"
    );
}
