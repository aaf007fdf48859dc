//! End-to-end dispatch from the engine into host closures

use otter_bridge::{Accessor, Engine, EngineConfig, PropertyAttribute};
use otter_bridge_memory::MemoryEngine;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

fn engine() -> Engine {
    Engine::new(MemoryEngine::new())
}

#[test]
fn test_sum_of_first_two_arguments() {
    let engine = engine();
    let template = engine
        .new_function_template(|info| {
            let a = info.get(0).map_or(f64::NAN, |v| v.to_number());
            let b = info.get(1).map_or(f64::NAN, |v| v.to_number());
            info.return_value().set_number(a + b);
        })
        .unwrap();
    let function = template.new_function().unwrap();

    let two = engine.number(2.0).unwrap();
    let three = engine.number(3.0).unwrap();
    assert_eq!(function.call(&[&two, &three]).unwrap().to_number(), 5.0);
    assert!(function.call(&[&two]).unwrap().to_number().is_nan());
}

#[test]
fn test_function_receives_arguments() {
    let engine = engine();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();

    let template = engine
        .new_function_template(move |info| {
            let mut sink = sink.lock();
            sink.push(info.length().to_string());
            sink.extend(info.args().iter().map(|v| v.to_rust_string()));
            assert!(info.get(info.length()).is_none());
            info.return_value().set_number(info.length() as f64);
        })
        .unwrap();
    let function = template.new_function().unwrap();

    let result = function
        .call(&[&engine.string("a").unwrap(), &engine.boolean(true).unwrap()])
        .unwrap();
    assert_eq!(result.to_number(), 2.0);
    assert_eq!(*seen.lock(), ["2", "a", "true"]);
}

#[test]
fn test_function_without_return_yields_undefined() {
    let engine = engine();
    let template = engine.new_function_template(|_| {}).unwrap();
    let result = template.new_function().unwrap().call(&[]).unwrap();
    assert!(result.is_undefined());
}

#[test]
fn test_last_return_write_wins() {
    let engine = engine();
    let template = engine
        .new_function_template(|info| {
            info.return_value().set_string("first");
            info.return_value().set_null();
        })
        .unwrap();
    let result = template.new_function().unwrap().call(&[]).unwrap();
    assert!(result.is_null());
}

#[test]
fn test_receiver_callee_and_holder() {
    let engine = engine();
    let checks = Arc::new(Mutex::new(Vec::new()));
    let sink = checks.clone();

    let template = engine
        .new_function_template(move |info| {
            let mut sink = sink.lock();
            match info.this() {
                Ok(this) => {
                    sink.push(this.strict_equals(&info.holder().unwrap()));
                    sink.push(this.get_property("marker").unwrap().to_boolean());
                }
                Err(err) => sink.push(err.error_type() == "TagMismatch"),
            }
            sink.push(info.callee().unwrap().is_function());
        })
        .unwrap();
    let function = template.new_function().unwrap();

    function.call(&[]).unwrap();
    assert_eq!(*checks.lock(), [true, true]);
    checks.lock().clear();

    let receiver = engine.new_object().unwrap().to_object().unwrap();
    receiver.set_property("marker", &engine.boolean(true).unwrap(), PropertyAttribute::NONE);
    function.call_with_receiver(&receiver, &[]).unwrap();
    assert_eq!(*checks.lock(), [true, true, true]);
}

#[test]
fn test_function_template_instances_share_closure() {
    let engine = engine();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let template = engine
        .new_function_template(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    let first = template.new_function().unwrap();
    let second = template.new_function().unwrap();
    assert!(!first.strict_equals(&second));

    first.call(&[]).unwrap();
    second.call(&[]).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(engine.stats().invoked, 2);
}

#[test]
fn test_disposed_function_is_refused() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let engine = engine();
    let template = engine
        .new_function_template(move |info| {
            counter.fetch_add(1, Ordering::SeqCst);
            info.return_value().set_int32(1);
        })
        .unwrap();
    let function = template.new_function().unwrap();

    template.dispose();
    let result = function.call(&[]).unwrap();
    assert!(result.is_undefined());
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let stats = engine.stats();
    assert_eq!(stats.invoked, 0);
    assert_eq!(stats.rejected, 1);
}

#[test]
fn test_panicking_closure_is_contained() {
    let engine = engine();
    let template = engine
        .new_function_template(|_| panic!("host failure"))
        .unwrap();
    let function = template.new_function().unwrap();

    let err = function.call(&[]).unwrap_err();
    assert_eq!(err.error_type(), "NativeError");
    assert_eq!(engine.stats().panicked, 1);

    // The engine stays usable
    let healthy = engine
        .new_function_template(|info| info.return_value().set_int32(3))
        .unwrap();
    let result = healthy.new_function().unwrap().call(&[]).unwrap();
    assert_eq!(result.to_number(), 3.0);
}

#[test]
fn test_closure_reenters_engine() {
    let engine = engine();
    let template = engine
        .new_function_template(|info| {
            let engine = info.engine();
            let object = engine.new_object().unwrap().to_object().unwrap();
            let first = info.get(0).unwrap();
            object.set_property("copy", &first, PropertyAttribute::NONE);
            info.return_value().set(&object).unwrap();
        })
        .unwrap();

    let result = template
        .new_function()
        .unwrap()
        .call(&[&engine.number(9.0).unwrap()])
        .unwrap();
    let object = result.to_object().unwrap();
    assert_eq!(object.get_property("copy").unwrap().to_number(), 9.0);
}

#[test]
fn test_foreign_values_are_refused_at_call_and_return() {
    let engine = engine();
    let other = crate::engine();
    let refused = Arc::new(Mutex::new(Vec::new()));
    let sink = refused.clone();
    let foreign = other.clone();

    let template = engine
        .new_function_template(move |info| {
            let value = foreign.number(1.0).unwrap();
            let err = info.return_value().set(&value).unwrap_err();
            sink.lock().push(err.error_type().to_string());
        })
        .unwrap();
    let function = template.new_function().unwrap();

    // The rejected write leaves the result undefined
    assert!(function.call(&[]).unwrap().is_undefined());
    assert_eq!(*refused.lock(), ["EngineMismatch"]);

    let arg = other.number(2.0).unwrap();
    let err = function.call(&[&arg]).unwrap_err();
    assert_eq!(err.error_type(), "EngineMismatch");

    let receiver = other.new_object().unwrap().to_object().unwrap();
    let err = function.call_with_receiver(&receiver, &[]).unwrap_err();
    assert_eq!(err.error_type(), "EngineMismatch");

    // Rejected calls never reach the closure
    assert_eq!(refused.lock().len(), 1);
    assert_eq!(engine.stats().invoked, 1);
}

#[test]
fn test_getter_receives_name_and_frame() {
    let engine = engine();
    let names = Arc::new(Mutex::new(Vec::new()));
    let sink = names.clone();

    let template = engine.new_object_template().unwrap();
    template.set_accessor(Accessor::new("größe").getter(move |name, info| {
        sink.lock().push(name.to_string());
        let same = info.this().unwrap().strict_equals(&info.holder().unwrap());
        info.return_value().set_boolean(same);
    }));
    let object = template.new_object().unwrap();

    assert!(object.get_property("größe").unwrap().to_boolean());
    assert_eq!(*names.lock(), ["größe"]);
}

#[test]
fn test_getter_through_prototype_sees_holder() {
    let engine = engine();
    let template = engine.new_object_template().unwrap();
    template.set_accessor(Accessor::new("id").getter(|_, info| {
        let this = info.this().unwrap();
        let holder = info.holder().unwrap();
        info.return_value().set_boolean(!this.strict_equals(&holder));
    }));
    let proto = template.new_object().unwrap();
    let child = engine.new_object().unwrap().to_object().unwrap();
    assert!(child.set_prototype(&proto));

    assert!(child.get_property("id").unwrap().to_boolean());
    assert!(!proto.get_property("id").unwrap().to_boolean());
}

#[test]
fn test_getter_only_accessor_rejects_direct_set() {
    let engine = engine();
    let template = engine.new_object_template().unwrap();
    template.set_accessor(Accessor::new("answer").getter(|_, info| info.return_value().set_int32(42)));
    let object = template.new_object().unwrap();

    let seven = engine.number(7.0).unwrap();
    assert!(!object.set_property("answer", &seven, PropertyAttribute::NONE));
    assert_eq!(object.get_property("answer").unwrap().to_number(), 42.0);

    assert!(object.force_set_property("answer", &seven, PropertyAttribute::NONE));
    assert_eq!(object.get_property("answer").unwrap().to_number(), 7.0);
}

#[test]
fn test_setter_receives_value() {
    let engine = engine();
    let written = Arc::new(Mutex::new(Vec::new()));
    let sink = written.clone();
    let same_frame = Arc::new(AtomicBool::new(false));
    let flag = same_frame.clone();

    let template = engine.new_object_template().unwrap();
    template.set_accessor(
        Accessor::new("size")
            .getter(|_, info| info.return_value().set_int32(-1))
            .setter(move |name, value, info| {
                sink.lock().push(format!("{}={}", name, value.to_rust_string()));
                let same = info.this().unwrap().strict_equals(&info.holder().unwrap());
                flag.store(same, Ordering::SeqCst);
            }),
    );
    let object = template.new_object().unwrap();

    assert!(object.set_property("size", &engine.number(9.0).unwrap(), PropertyAttribute::NONE));
    assert_eq!(*written.lock(), ["size=9"]);
    assert!(same_frame.load(Ordering::SeqCst));

    // The write went to the setter, not to a data property
    assert_eq!(object.get_property("size").unwrap().to_number(), -1.0);
}

#[test]
fn test_panicking_getter_raises() {
    let engine = engine();
    let template = engine.new_object_template().unwrap();
    template.set_accessor(Accessor::new("boom").getter(|_, _| panic!("getter failure")));
    let object = template.new_object().unwrap();

    let err = object.get_property("boom").unwrap_err();
    assert_eq!(err.error_type(), "NativeError");
    assert_eq!(engine.stats().panicked, 1);
}

#[test]
fn test_trace_dispatch_config() {
    let config = EngineConfig::from_json(r#"{"name": "traced", "trace_dispatch": true}"#).unwrap();
    let engine = Engine::with_config(MemoryEngine::new(), config);
    assert_eq!(engine.config().name, "traced");

    let template = engine
        .new_function_template(|info| info.return_value().set_uint32(5))
        .unwrap();
    let result = template.new_function().unwrap().call(&[]).unwrap();
    assert_eq!(result.to_number(), 5.0);
    assert_eq!(format!("{:?}", engine), "Engine(traced)");
}
