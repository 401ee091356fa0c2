use crate::meta::Metadata;
use crate::pubs::{ProcessId, Publication};
use crate::value::{ValueData, ValueState, ValueType};
use crate::ProtocolError;

fn test_origin() -> ProcessId {
    ProcessId {
        node: "node-01".into(),
        process: 4242,
        rank: 0,
        program: "demo".into(),
    }
}

#[test]
fn test_new_pub_is_empty() {
    let publication = Publication::new(1, "app.metrics", test_origin());
    assert_eq!(publication.guid(), 1);
    assert_eq!(publication.title(), "app.metrics");
    assert_eq!(publication.version(), 0);
    assert_eq!(publication.element_count(), 0);
    assert!(!publication.has_pending());
    assert!(publication.created_at() > 0);
    assert_eq!(publication.last_publish_at(), 0);
}

#[test]
fn test_add_element_bumps_version() {
    let mut publication = Publication::new(1, "p", test_origin());
    let i = publication
        .add_element("x", ValueType::Double, Metadata::default())
        .unwrap();
    assert_eq!(i, 0);
    assert_eq!(publication.version(), 1);

    let j = publication
        .add_element("y", ValueType::Integer, Metadata::default())
        .unwrap();
    assert_eq!(j, 1);
    assert_eq!(publication.version(), 2);
}

#[test]
fn test_indices_are_append_only() {
    let mut publication = Publication::new(1, "p", test_origin());
    for (n, name) in ["a", "b", "c"].iter().enumerate() {
        let i = publication
            .add_element(*name, ValueType::Integer, Metadata::default())
            .unwrap();
        assert_eq!(i, n);
    }
    // prior indices unchanged after growth
    assert_eq!(publication.index_of("a"), Some(0));
    assert_eq!(publication.index_of("b"), Some(1));
    assert_eq!(publication.index_of("c"), Some(2));
}

#[test]
fn test_duplicate_element_rejected() {
    let mut publication = Publication::new(1, "p", test_origin());
    publication
        .add_element("x", ValueType::Double, Metadata::default())
        .unwrap();
    let err = publication
        .add_element("x", ValueType::Double, Metadata::default())
        .unwrap_err();
    assert!(matches!(err, ProtocolError::DuplicateElement(_)));
    // failed add must not bump the version
    assert_eq!(publication.version(), 1);
}

#[test]
fn test_write_marks_dirty_only() {
    let mut publication = Publication::new(1, "p", test_origin());
    publication
        .add_element("x", ValueType::Double, Metadata::default())
        .unwrap();
    publication
        .add_element("y", ValueType::Integer, Metadata::default())
        .unwrap();

    publication.write("x", ValueData::Double(3.25)).unwrap();

    assert_eq!(publication.element(0).unwrap().value().state(), ValueState::Dirty);
    assert_eq!(publication.element(1).unwrap().value().state(), ValueState::Empty);
    assert!(publication.has_pending());
}

#[test]
fn test_write_unknown_element() {
    let mut publication = Publication::new(1, "p", test_origin());
    let err = publication.write("nope", ValueData::Integer(1)).unwrap_err();
    assert!(matches!(err, ProtocolError::UnknownElement(_)));
}

#[test]
fn test_write_wrong_type_is_rejected() {
    let mut publication = Publication::new(1, "p", test_origin());
    publication
        .add_element("x", ValueType::Double, Metadata::default())
        .unwrap();
    // integer into a double slot: no silent cast
    let err = publication.write("x", ValueData::Integer(3)).unwrap_err();
    assert!(matches!(err, ProtocolError::TypeMismatch { index: 0, .. }));
    assert_eq!(publication.element(0).unwrap().value().state(), ValueState::Empty);
}

#[test]
fn test_get_val() {
    let mut publication = Publication::new(1, "p", test_origin());
    publication
        .add_element("x", ValueType::Text, Metadata::default())
        .unwrap();
    assert_eq!(publication.get_val("x").unwrap(), None);
    publication.write("x", ValueData::from("hello")).unwrap();
    assert_eq!(
        publication.get_val("x").unwrap(),
        Some(&ValueData::from("hello"))
    );
    assert!(publication.get_val("missing").is_err());
}

#[test]
fn test_display_pub_lists_elements() {
    let mut publication = Publication::new(0x10, "worker.stats", test_origin());
    publication
        .add_element("elapsed", ValueType::Double, Metadata::default())
        .unwrap();
    publication.write("elapsed", ValueData::Double(1.5)).unwrap();

    let shown = publication.display_pub();
    assert!(shown.contains("worker.stats"));
    assert!(shown.contains("elapsed"));
    assert!(shown.contains("dirty"));
    assert!(shown.contains("1.5"));
}

#[test]
fn test_expand_data_skips_empty() {
    let mut publication = Publication::new(1, "p", test_origin());
    publication
        .add_element("a", ValueType::Integer, Metadata::default())
        .unwrap();
    publication
        .add_element("b", ValueType::Integer, Metadata::default())
        .unwrap();
    publication.write("b", ValueData::Integer(9)).unwrap();

    let expanded = publication.expand_data();
    assert_eq!(expanded.len(), 1);
    assert_eq!(expanded[0].0, "b");
}
