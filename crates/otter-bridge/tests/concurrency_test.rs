//! Registration and disposal racing across threads

use otter_bridge::{Accessor, Engine};
use otter_bridge_memory::MemoryEngine;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

#[test]
fn test_parallel_registration_yields_unique_ids() {
    let engine = Engine::new(MemoryEngine::new());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = engine.clone();
            thread::spawn(move || {
                (0..50)
                    .map(|_| engine.new_function_template(|_| {}).unwrap().id())
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let ids: HashSet<u64> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    assert_eq!(ids.len(), 400);
    assert!(!ids.contains(&0));
    assert_eq!(ids.iter().max(), Some(&400));
    assert_eq!(engine.function_template_count(), 400);
}

#[test]
fn test_dispose_races_instantiation() {
    let engine = Engine::new(MemoryEngine::new());
    let template = engine.new_object_template().unwrap();
    template.set_accessor(Accessor::new("x").getter(|_, info| info.return_value().set_int32(1)));

    let created = Arc::new(AtomicUsize::new(0));
    let workers: Vec<_> = (0..4)
        .map(|_| {
            let template = template.clone();
            let created = created.clone();
            thread::spawn(move || {
                for _ in 0..200 {
                    match template.new_object() {
                        Some(object) => {
                            // Instances carry the full accessor set or nothing
                            assert!(object.has_property("x"));
                            created.fetch_add(1, Ordering::SeqCst);
                        }
                        None => break,
                    }
                }
            })
        })
        .collect();

    let disposer = {
        let template = template.clone();
        thread::spawn(move || {
            thread::yield_now();
            template.dispose();
        })
    };

    disposer.join().unwrap();
    for worker in workers {
        worker.join().unwrap();
    }

    assert!(template.is_disposed());
    assert!(template.new_object().is_none());
    assert!(created.load(Ordering::SeqCst) <= 800);
    assert_eq!(engine.object_template_count(), 0);
}

#[test]
fn test_concurrent_dispose_is_safe() {
    let engine = Engine::new(MemoryEngine::new());
    let template = engine.new_function_template(|_| {}).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let template = template.clone();
            thread::spawn(move || template.dispose())
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(template.id(), 0);
    assert_eq!(engine.function_template_count(), 0);
}

#[test]
fn test_calls_from_many_threads() {
    let engine = Engine::new(MemoryEngine::new());
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let template = engine
        .new_function_template(move |info| {
            counter.fetch_add(1, Ordering::SeqCst);
            info.return_value().set_number(info.get(0).map_or(0.0, |v| v.to_number() * 2.0));
        })
        .unwrap();

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let engine = engine.clone();
            let template = template.clone();
            thread::spawn(move || {
                let function = template.new_function().unwrap();
                let arg = engine.number(f64::from(i)).unwrap();
                function.call(&[&arg]).unwrap().to_number()
            })
        })
        .collect();

    let mut results: Vec<f64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    results.sort_by(f64::total_cmp);
    assert_eq!(results, [0.0, 2.0, 4.0, 6.0]);
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(engine.stats().invoked, 4);
}
