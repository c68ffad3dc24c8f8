mod common;

use std::cell::RefCell;
use std::rc::Rc;

use common::{Log, data, graph, recorder, set, settle};
use serde_json::{Value as Json, json};
use tickflow::{CacheKey, FunctionDesc, Value};

fn pipeline() -> Json {
    json!({
        "x": {"#is": "add", "0": 1, "1": 2},
        "y": {"#is": "add", "~0": "x.#output", "1": 10}
    })
}

#[test]
fn binding_follows_sibling_output() {
    let mut g = graph();
    let f = g.add_job("f", &data(pipeline()));
    settle(&mut g);

    let y = g.query_value(f, "y").as_block().unwrap();
    let y0 = g.find_property(y, "0").unwrap();
    assert_eq!(g.value(y0), Value::from(3));
    assert_eq!(g.query_value(y, "#output"), Value::from(13));

    let x = g.query_value(f, "x").as_block().unwrap();
    let x_output = g.find_property(x, "#output").unwrap();
    assert_eq!(g.binding_target(y0), Some(x_output));

    let x0 = g.find_property(x, "0").unwrap();
    g.set_value(x0, Value::from(5));
    settle(&mut g);
    assert_eq!(g.value(y0), Value::from(7));
    assert_eq!(g.query_value(y, "#output"), Value::from(17));
}

#[test]
fn object_with_only_bindings_loads_as_a_block() {
    let mut g = graph();
    let f = g.add_job("f", &data(json!({
        "x": {"#is": "add", "0": 1, "1": 2},
        "y": {"~0": "x.#output"}
    })));
    settle(&mut g);

    let y = g.query_value(f, "y").as_block().unwrap();
    assert_eq!(g.query_value(f, "y.0"), Value::from(3));
    let y0 = g.find_property(y, "0").unwrap();
    assert_eq!(g.binding_path(y0), Some("x.#output".into()));
    assert_eq!(g.save(f)["y"], json!({"~0": "x.#output"}));

    let fx = g.find_property(f, "x").unwrap();
    g.set_value(fx, Value::Undefined);
    settle(&mut g);
    assert_eq!(g.query_value(f, "y.0"), Value::Undefined);
    assert_eq!(g.binding_target(y0), None);
}

#[test]
fn removing_the_source_block_clears_the_binding() {
    let mut g = graph();
    let f = g.add_job("f", &data(pipeline()));
    settle(&mut g);
    let x = g.query_value(f, "x").as_block().unwrap();
    let y = g.query_value(f, "y").as_block().unwrap();
    let y0 = g.find_property(y, "0").unwrap();

    let fx = g.find_property(f, "x").unwrap();
    g.set_value(fx, Value::Undefined);
    settle(&mut g);

    assert!(!g.is_alive(x));
    assert_eq!(g.value(y0), Value::Undefined);
    assert_eq!(g.binding_target(y0), None);
    assert_eq!(g.binding_path(y0), Some("x.#output".into()));
    assert_eq!(g.query_value(y, "#output"), Value::Undefined);

    // a new x with the same name is picked up by the existing binding
    let x = g.create_block(f, "x");
    set(&mut g, x, "0", 20);
    set(&mut g, x, "1", 2);
    set(&mut g, x, "#is", "add");
    settle(&mut g);
    assert_eq!(g.value(y0), Value::from(22));
}

#[test]
fn save_and_reload_reproduce_the_flow() {
    let mut g = graph();
    let f = g.add_job("f", &data(pipeline()));
    settle(&mut g);
    let saved = g.save(f);
    assert_eq!(Json::Object(saved.clone()), pipeline());

    let mut other = graph();
    let copy = other.add_job("f", &saved);
    settle(&mut other);
    let y = other.query_value(copy, "y").as_block().unwrap();
    let y0 = other.find_property(y, "0").unwrap();
    assert_eq!(other.binding_path(y0), Some("x.#output".into()));
    assert_eq!(other.query_value(y, "#output"), Value::from(13));
    assert_eq!(other.save(copy), saved);
}

#[test]
fn live_update_keeps_running_blocks() {
    let mut g = graph();
    let f = g.add_job("f", &data(pipeline()));
    settle(&mut g);
    let x = g.query_value(f, "x").as_block().unwrap();

    g.live_update(f, &data(json!({
        "x": {"#is": "add", "0": 4, "1": 2},
        "y": {"#is": "add", "~0": "x.#output", "1": 10}
    })));
    settle(&mut g);
    assert!(g.is_alive(x));
    assert_eq!(g.query_value(f, "y.#output"), Value::from(16));

    g.live_update(f, &data(json!({"x": {"#is": "add", "0": 4, "1": 2}})));
    settle(&mut g);
    assert_eq!(g.query_value(f, "y"), Value::Undefined);
    assert_eq!(g.job_names(), vec!["f".to_string()]);
}

#[test]
fn disabled_flow_defers_runs_until_enabled() {
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    let mut g = graph();
    g.register_function(recorder("rec", &log));
    let f = g.add_job("f", &data(json!({
        "x": {"#is": "add", "0": 1, "1": 1},
        "r": {"#is": "rec", "#mode": "onChange", "tag": "r"}
    })));
    settle(&mut g);
    let x = g.query_value(f, "x").as_block().unwrap();
    assert_eq!(g.query_value(x, "#output"), Value::from(2));

    set(&mut g, f, "#disabled", true);
    assert!(g.is_disabled(x));
    assert_eq!(*log.borrow(), ["cleanup:r"]);

    set(&mut g, x, "0", 9);
    assert!(!g.is_queued(x));
    settle(&mut g);
    assert_eq!(g.query_value(x, "#output"), Value::from(2));

    set(&mut g, f, "#disabled", false);
    assert!(g.is_queued(x));
    settle(&mut g);
    assert_eq!(g.query_value(x, "#output"), Value::from(10));
}

#[test]
fn nested_flow_inherits_disabled() {
    let mut g = graph();
    let f = g.add_job("f", &data(json!({
        "inner": {"#is": "flow", "x": {"#is": "add", "0": 1, "1": 1}}
    })));
    settle(&mut g);
    let inner = g.query_value(f, "inner").as_block().unwrap();
    let x = g.query_value(inner, "x").as_block().unwrap();

    set(&mut g, f, "#disabled", true);
    assert!(g.is_disabled(inner));
    assert!(g.is_disabled(x));
    set(&mut g, f, "#disabled", false);
    assert!(!g.is_disabled(x));
}

#[test]
fn history_undoes_edits_across_ticks() {
    let mut g = graph();
    let f = g.add_job("f", &data(json!({"x": {"#is": "add", "0": 1, "1": 2}})));
    settle(&mut g);
    g.watch_history(f);
    let x = g.query_value(f, "x").as_block().unwrap();

    set(&mut g, x, "0", 10);
    settle(&mut g);
    set(&mut g, x, "1", 20);
    settle(&mut g);
    assert_eq!(g.query_value(x, "#output"), Value::from(30));

    assert!(g.undo(f));
    settle(&mut g);
    assert_eq!(g.query_value(x, "#output"), Value::from(12));
    assert!(g.undo(f));
    settle(&mut g);
    assert_eq!(g.query_value(x, "#output"), Value::from(3));
    assert!(!g.can_undo(f));

    assert!(g.redo(f));
    settle(&mut g);
    assert_eq!(g.query_value(x, "#output"), Value::from(12));
}

#[test]
fn shared_block_is_leased_per_function_id() {
    let mut g = graph();
    let a = g.add_job("a", &data(json!({})));
    let b = g.add_job("b", &data(json!({})));
    let payload = data(json!({"sum": {"#is": "add", "0": 2, "1": 2}}));

    let s1 = g.lease_shared(a, Some("svc"), &payload);
    let s2 = g.lease_shared(b, Some("svc"), &payload);
    assert_eq!(s1, s2);
    settle(&mut g);
    assert_eq!(g.query_value(s1, "sum.#output"), Value::from(4));

    g.remove_job("a");
    assert!(g.is_alive(s1));
    assert_eq!(g.lessees(s1), vec![b]);
    g.remove_job("b");
    assert!(!g.is_alive(s1));
    assert_eq!(g.shared_block(&CacheKey::Function("svc".into())), None);
}

#[test]
fn persisted_shared_block_outlives_lessees_until_reregistration() {
    let mut g = graph();
    g.register_function(FunctionDesc::of::<common::Add>("svc"));
    let a = g.add_job("a", &data(json!({})));
    let shared = g.lease_shared(a, Some("svc"), &data(json!({"#cacheMode": "persist", "v": 1})));

    g.remove_job("a");
    assert!(g.is_alive(shared));
    let b = g.add_job("b", &data(json!({})));
    assert_eq!(g.lease_shared(b, Some("svc"), &data(json!({}))), shared);

    // replacing the function evicts whatever was cached under its id
    g.register_function(FunctionDesc::of::<common::Add>("svc"));
    assert!(!g.is_alive(shared));
    assert_eq!(g.shared_count(), 0);
}

#[test]
fn reregistration_reinstantiates_blocks() {
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    let mut g = graph();
    g.register_function(recorder("rec", &log));
    let f = g.add_job("f", &data(json!({"r": {"#is": "rec", "tag": "r"}})));
    settle(&mut g);
    assert_eq!(*log.borrow(), ["r"]);

    let second: Log = Rc::new(RefCell::new(Vec::new()));
    g.register_function(recorder("rec", &second));
    settle(&mut g);
    assert_eq!(*second.borrow(), ["r"]);
    assert_eq!(log.borrow().len(), 1);
    let r = g.query_value(f, "r").as_block().unwrap();
    assert!(g.has_function_instance(r));
}
