mod common;

use std::cell::RefCell;
use std::rc::Rc;

use common::{data, graph, set};
use serde_json::json;
use tickflow::{EngineConfig, Graph, PropertyEvent, Value};

#[test]
#[should_panic(expected = "has been destroyed")]
fn strict_mode_rejects_destroyed_properties() {
    let mut g = graph();
    let temp = g.temp();
    let block = g.create_block(temp, "b");
    let prop = g.property(block, "v");
    g.destroy_block(block);
    g.set_value(prop, Value::from(1));
}

#[test]
fn relaxed_mode_degrades_to_no_ops() {
    let mut g = Graph::new(EngineConfig::default());
    let temp = g.temp();
    let block = g.create_block(temp, "b");
    let prop = g.property(block, "v");
    g.destroy_block(block);

    g.set_value(prop, Value::from(1));
    assert_eq!(g.value(prop), Value::Undefined);
    let void = g.property(block, "w");
    assert_eq!(void, g.void_property());
    g.set_value(void, Value::from(2));
    assert_eq!(g.value(void), Value::Undefined);

    let orphan = g.create_block(block, "child");
    assert!(!g.is_alive(orphan));
}

#[test]
fn roots_cannot_be_destroyed() {
    let mut g = graph();
    let roots = g.roots();
    g.destroy_block(roots.temp);
    g.destroy_block(roots.root);
    assert!(g.is_alive(roots.temp));
    assert!(g.is_alive(roots.root));
}

#[test]
fn set_value_records_saved_and_update_value_does_not() {
    let mut g = graph();
    let temp = g.temp();
    let block = g.create_block(temp, "b");
    let prop = g.property(block, "v");

    g.set_value(prop, Value::from(1));
    g.update_value(prop, Value::from(2));
    assert_eq!(g.value(prop), Value::from(2));
    assert_eq!(g.saved(prop), Value::from(1));

    g.revert_update(prop);
    assert_eq!(g.value(prop), Value::from(1));
}

#[test]
fn global_names_resolve_from_any_flow() {
    let mut g = graph();
    let global = g.global();
    let theme = g.property(global, "^theme");
    g.set_value(theme, Value::from("dark"));

    let f = g.add_job("f", &data(json!({
        "~t": "^theme",
        "inner": {"#is": "add", "~0": "^theme"}
    })));
    assert_eq!(g.query_value(f, "t"), Value::from("dark"));
    assert_eq!(g.query_value(f, "inner.0"), Value::from("dark"));

    g.set_value(theme, Value::from("light"));
    assert_eq!(g.query_value(f, "t"), Value::from("light"));
    assert_eq!(g.query_value(f, "^theme"), Value::from("light"));
}

#[test]
fn global_segment_later_in_a_path_restarts_at_global() {
    let mut g = graph();
    let global = g.global();
    let theme = g.property(global, "^theme");
    g.set_value(theme, Value::from("dark"));

    let f = g.add_job("f", &data(json!({"cfg": {"a": 1}, "~t": "cfg.^theme"})));
    assert_eq!(g.query_value(f, "t"), Value::from("dark"));
    assert_eq!(g.query_value(f, "cfg.^theme"), Value::from("dark"));

    g.set_value(theme, Value::from("light"));
    assert_eq!(g.query_value(f, "t"), Value::from("light"));
}

#[test]
fn binding_into_plain_data_reads_one_field() {
    let mut g = graph();
    let f = g.add_job("f", &data(json!({
        "cfg": {"size": 5, "name": "box"},
        "~size": "cfg.size",
        "~missing": "cfg.nope"
    })));
    assert_eq!(g.query_value(f, "size"), Value::from(5));
    assert_eq!(g.query_value(f, "missing"), Value::Undefined);

    set(&mut g, f, "cfg", Value::from(3));
    assert_eq!(g.query_value(f, "size"), Value::Undefined);
}

#[test]
fn subscribers_see_structural_events() {
    let mut g = graph();
    let temp = g.temp();
    let block = g.create_flow(temp, "b");
    let a = g.property(block, "a");
    let b = g.property(block, "b");

    let seen: Rc<RefCell<Vec<PropertyEvent>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    g.subscribe(a, move |event| sink.borrow_mut().push(event.clone()));

    g.set_binding(a, Some("b"));
    g.set_binding(b, Some("a"));
    g.set_value(a, Value::from(1));
    g.destroy_block(block);

    assert_eq!(
        *seen.borrow(),
        [
            PropertyEvent::BindingChanged(Some("b".into())),
            PropertyEvent::ListenerAttached,
            PropertyEvent::BindingChanged(None),
            PropertyEvent::Destroyed,
        ]
    );
}

#[test]
fn runaway_callback_is_cut_at_dispatch_depth() {
    let config = EngineConfig { max_dispatch_depth: 16, ..EngineConfig::strict() };
    let mut g = Graph::new(config);
    let temp = g.temp();
    let block = g.create_block(temp, "b");
    let a = g.property(block, "a");
    g.watch(a, move |g, v| {
        if let Some(n) = v.as_f64() {
            g.update_value(a, Value::from(n + 1.0));
        }
    });

    g.update_value(a, Value::from(0));
    assert_eq!(g.value(a), Value::from(16));
}

#[test]
fn unwatch_stops_delivery() {
    let mut g = graph();
    let temp = g.temp();
    let block = g.create_block(temp, "b");
    let a = g.property(block, "a");
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    let id = g.watch(a, move |_, v| sink.borrow_mut().push(v.clone()));
    assert_eq!(g.listener_count(a), 1);

    g.set_value(a, Value::from(1));
    g.unwatch(a, id);
    g.set_value(a, Value::from(2));
    assert_eq!(*seen.borrow(), [Value::Undefined, Value::from(1)]);
    assert_eq!(g.listener_count(a), 0);
}
