//! Regular expression creation and cached reads

use otter_bridge::{Engine, RegExpFlags, ValueKind};
use otter_bridge_memory::MemoryEngine;

#[test]
fn test_regexp_pattern_and_flags() {
    let engine = Engine::new(MemoryEngine::new());
    let value = engine
        .new_regexp("fo+", RegExpFlags::GLOBAL | RegExpFlags::MULTILINE)
        .unwrap();
    assert_eq!(value.kind(), ValueKind::RegExp);
    assert!(value.is_object());

    let regexp = value.to_regexp().unwrap();
    assert_eq!(regexp.pattern(), "fo+");
    assert_eq!(regexp.flags(), RegExpFlags::GLOBAL | RegExpFlags::MULTILINE);
    assert_eq!(regexp.flags().bits(), 5);
    assert_eq!(value.to_rust_string(), "/fo+/gm");
}

#[test]
fn test_pattern_and_flags_read_once_per_view() {
    let backend = MemoryEngine::new();
    let stats = backend.stats();
    let engine = Engine::new(backend);
    let value = engine.new_regexp("a|b", RegExpFlags::IGNORE_CASE).unwrap();

    let regexp = value.to_regexp().unwrap();
    for _ in 0..3 {
        assert_eq!(regexp.pattern(), "a|b");
        assert_eq!(regexp.flags(), RegExpFlags::IGNORE_CASE);
    }
    let snapshot = stats.snapshot();
    assert_eq!(snapshot.regexp_pattern_reads, 1);
    assert_eq!(snapshot.regexp_flags_reads, 1);

    // A fresh view reads again
    let again = value.to_regexp().unwrap();
    assert_eq!(again.pattern(), "a|b");
    assert_eq!(stats.snapshot().regexp_pattern_reads, 2);
}

#[test]
fn test_invalid_pattern_is_rejected() {
    let engine = Engine::new(MemoryEngine::new());
    let err = engine.new_regexp("(unclosed", RegExpFlags::NONE).unwrap_err();
    assert_eq!(err.error_type(), "NativeError");
    assert!(err.to_string().contains("new_regexp"));
}

#[test]
fn test_regexp_is_an_object() {
    let engine = Engine::new(MemoryEngine::new());
    let regexp = engine
        .new_regexp("x", RegExpFlags::NONE)
        .unwrap()
        .to_regexp()
        .unwrap();
    assert!(regexp.set_property(
        "lastIndex",
        &engine.number(0.0).unwrap(),
        otter_bridge::PropertyAttribute::DONT_ENUM
    ));
    assert_eq!(regexp.get_property("lastIndex").unwrap().to_number(), 0.0);
    assert_eq!(regexp.as_object().to_rust_string(), "/x/");
}
