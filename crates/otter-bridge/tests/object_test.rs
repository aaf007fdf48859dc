//! Object, array and primitive operations through the bridge

use otter_bridge::{Engine, Object, PropertyAttribute, ValueKind};
use otter_bridge_memory::MemoryEngine;

fn engine() -> Engine {
    Engine::new(MemoryEngine::new())
}

fn object(engine: &Engine) -> Object {
    engine.new_object().unwrap().to_object().unwrap()
}

fn names(array: otter_bridge::Array) -> Vec<String> {
    array
        .to_vec()
        .unwrap()
        .iter()
        .map(|v| v.to_rust_string())
        .collect()
}

#[test]
fn test_property_round_trip_with_attributes() {
    let engine = engine();
    let object = object(&engine);
    let attribs = PropertyAttribute::READ_ONLY | PropertyAttribute::DONT_ENUM;

    let value = engine.string("v").unwrap();
    assert!(object.set_property("k", &value, attribs));
    let read = object.get_property("k").unwrap();
    assert!(read.strict_equals(&value));
    assert_eq!(read.raw(), value.raw());
    assert_eq!(object.get_property_attributes("k"), attribs);
    assert_eq!(object.get_property_attributes("missing"), PropertyAttribute::NONE);
    assert!(object.get_property("missing").unwrap().is_undefined());
}

#[test]
fn test_read_only_blocks_set_but_not_force_set() {
    let engine = engine();
    let object = object(&engine);
    let one = engine.number(1.0).unwrap();
    let two = engine.number(2.0).unwrap();

    assert!(object.set_property("fixed", &one, PropertyAttribute::READ_ONLY));
    assert!(!object.set_property("fixed", &two, PropertyAttribute::NONE));
    assert_eq!(object.get_property("fixed").unwrap().to_number(), 1.0);

    assert!(object.force_set_property("fixed", &two, PropertyAttribute::NONE));
    assert_eq!(object.get_property("fixed").unwrap().to_number(), 2.0);
    assert_eq!(object.get_property_attributes("fixed"), PropertyAttribute::NONE);
}

#[test]
fn test_dont_delete_blocks_delete_but_not_force_delete() {
    let engine = engine();
    let object = object(&engine);
    let value = engine.boolean(true).unwrap();

    assert!(object.set_property("pinned", &value, PropertyAttribute::DONT_DELETE));
    assert!(!object.delete_property("pinned"));
    assert!(object.has_property("pinned"));

    assert!(object.force_delete_property("pinned"));
    assert!(!object.has_property("pinned"));

    // Deleting an absent property succeeds
    assert!(object.delete_property("pinned"));
}

#[test]
fn test_enumeration_own_and_inherited() {
    let engine = engine();
    let proto = object(&engine);
    let child = object(&engine);
    let value = engine.number(0.0).unwrap();

    proto.set_property("inherited", &value, PropertyAttribute::NONE);
    proto.set_property("shadowed", &value, PropertyAttribute::NONE);
    child.set_property("own", &value, PropertyAttribute::NONE);
    child.set_property("shadowed", &value, PropertyAttribute::NONE);
    child.set_property("secret", &value, PropertyAttribute::DONT_ENUM);
    child.set_element(0, &value);
    assert!(child.set_prototype(&proto));

    assert_eq!(names(child.own_property_names().unwrap()), ["0", "own", "shadowed"]);
    assert_eq!(
        names(child.property_names().unwrap()),
        ["0", "own", "shadowed", "inherited"]
    );
    assert!(child.has_property("inherited"));
    assert!(child.has_property("secret"));
}

#[test]
fn test_prototype_get_and_set() {
    let engine = engine();
    let proto = object(&engine);
    let child = object(&engine);

    let default = child.prototype().unwrap().unwrap();
    assert!(!default.strict_equals(&proto));
    assert!(default.prototype().unwrap().is_none());

    assert!(child.set_prototype(&proto));
    let current = child.prototype().unwrap().unwrap();
    assert!(current.strict_equals(&proto));

    // Cycles are refused
    assert!(!proto.set_prototype(&child));
}

#[test]
fn test_inherited_read_only_blocks_set() {
    let engine = engine();
    let proto = object(&engine);
    let child = object(&engine);
    proto.set_property("locked", &engine.number(1.0).unwrap(), PropertyAttribute::READ_ONLY);
    child.set_prototype(&proto);

    assert!(!child.set_property("locked", &engine.number(2.0).unwrap(), PropertyAttribute::NONE));
    assert_eq!(child.get_property("locked").unwrap().to_number(), 1.0);
}

#[test]
fn test_array_elements() {
    let engine = engine();
    let array = engine.new_array(2).unwrap();
    assert_eq!(array.length(), 2);
    assert!(array.get_element(0).unwrap().is_undefined());
    assert!(!array.has_element(0));

    assert!(array.set_element(3, &engine.string("d").unwrap()));
    assert_eq!(array.length(), 4);
    assert!(array.has_element(3));
    assert_eq!(array.get_property("length").unwrap().to_number(), 4.0);
    assert!(array.has_property("length"));

    assert!(array.delete_element(3));
    assert!(!array.has_element(3));
    assert_eq!(array.to_vec().unwrap().len(), 4);
}

#[test]
fn test_array_to_string_joins_elements() {
    let engine = engine();
    let array = engine.new_array(0).unwrap();
    array.set_element(0, &engine.number(1.0).unwrap());
    array.set_element(2, &engine.string("x").unwrap());
    assert_eq!(array.to_rust_string(), "1,,x");
}

#[test]
fn test_narrowing_checks_kind() {
    let engine = engine();
    let number = engine.number(1.0).unwrap();
    let err = number.to_object().unwrap_err();
    assert_eq!(err.to_string(), "Tag mismatch: expected object, got number");

    let plain = engine.new_object().unwrap();
    assert_eq!(plain.kind(), ValueKind::Object);
    assert_eq!(plain.to_array().unwrap_err().error_type(), "TagMismatch");
    assert_eq!(plain.to_function().unwrap_err().error_type(), "TagMismatch");
    assert_eq!(plain.to_regexp().unwrap_err().error_type(), "TagMismatch");

    let array = engine.new_array(0).unwrap();
    assert!(array.is_array());
    assert!(array.to_object().is_ok());
    assert!(array.to_function().is_err());
}

#[test]
fn test_primitive_conversions() {
    let engine = engine();
    assert_eq!(engine.number(5.0).unwrap().to_rust_string(), "5");
    assert_eq!(engine.number(2.5).unwrap().to_rust_string(), "2.5");
    assert_eq!(engine.string(" 12 ").unwrap().to_number(), 12.0);
    assert!(engine.string("abc").unwrap().to_number().is_nan());
    assert!(!engine.string("").unwrap().to_boolean());
    assert!(!engine.number(0.0).unwrap().to_boolean());
    assert!(engine.boolean(true).unwrap().to_boolean());
    assert_eq!(engine.null().unwrap().to_number(), 0.0);
    assert_eq!(engine.undefined().unwrap().to_rust_string(), "undefined");
    assert_eq!(engine.null().unwrap().kind(), ValueKind::Null);
    assert_eq!(object(&engine).to_rust_string(), "[object Object]");
}

#[test]
fn test_strict_equals() {
    let engine = engine();
    let a = engine.number(3.0).unwrap();
    let b = engine.number(3.0).unwrap();
    assert!(a.strict_equals(&b));

    let nan = engine.number(f64::NAN).unwrap();
    assert!(!nan.strict_equals(&nan));

    assert!(engine.string("s").unwrap().strict_equals(&engine.string("s").unwrap()));
    assert!(!engine.string("1").unwrap().strict_equals(&a));
    assert!(engine.null().unwrap().strict_equals(&engine.null().unwrap()));
    assert!(!engine.null().unwrap().strict_equals(&engine.undefined().unwrap()));

    let other = Engine::new(MemoryEngine::new());
    assert!(!engine.undefined().unwrap().strict_equals(&other.undefined().unwrap()));
}

#[test]
fn test_values_from_another_engine_are_refused() {
    let engine = engine();
    let other = Engine::new(MemoryEngine::new());
    let object = object(&engine);
    let foreign = other.string("from-other").unwrap();
    assert!(!object.same_engine(&foreign));

    assert!(!object.set_property("k", &foreign, PropertyAttribute::NONE));
    assert!(!object.force_set_property("k", &foreign, PropertyAttribute::NONE));
    assert!(!object.has_property("k"));
    assert!(!object.set_element(0, &foreign));
    assert!(!object.has_element(0));

    let foreign_proto = other.new_object().unwrap().to_object().unwrap();
    let before = object.prototype().unwrap().unwrap();
    assert!(!object.set_prototype(&foreign_proto));
    assert!(object.prototype().unwrap().unwrap().strict_equals(&before));

    // Same-engine writes still go through
    let local = engine.string("local").unwrap();
    assert!(object.set_property("k", &local, PropertyAttribute::NONE));
    assert_eq!(object.get_property("k").unwrap().to_rust_string(), "local");
}

#[test]
fn test_large_whole_numbers_format_exactly() {
    let engine = engine();
    assert_eq!(
        engine.number(1e20).unwrap().to_rust_string(),
        "100000000000000000000"
    );
    assert_eq!(
        engine.number(-9_007_199_254_740_991.0).unwrap().to_rust_string(),
        "-9007199254740991"
    );
}
