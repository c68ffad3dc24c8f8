//! Cells and value dispatch.
//!
//! Every reactive slot (a Property or a binding link) is a [`Cell`] in the
//! graph's cell arena. A cell holds its current value and an ordered list
//! of listeners; updating the value notifies listeners synchronously in
//! registration order.
//!
//! Reentrancy rules:
//! - Dispatch iterates a snapshot of the listener list and skips entries
//!   that detached mid-dispatch.
//! - A listener attached while the cell is dispatching is not delivered to
//!   immediately; the in-flight dispatch delivers to it once it finishes
//!   the snapshot.
//! - If a nested update changes the value again, the outer dispatch stops:
//!   the nested one already delivered the newer value to everyone. A
//!   listener attached after the nested dispatch finished sees a version
//!   the outer dispatch will never deliver, so it is delivered to at once.

use std::rc::Rc;

use smallvec::SmallVec;

use crate::arena::{CellId, PropId};
use crate::binding::BindingLink;
use crate::graph::Graph;
use crate::property::{PropertyData, PropertyEvent};
use crate::value::Value;

/// Handle for a value callback registered with [`Graph::watch`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CallbackId(pub(crate) u64);

pub type Callback = Rc<dyn Fn(&mut Graph, &Value)>;

/// Receiver of a cell's value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Listener {
    /// Another cell: a bound Property or a binding link.
    Cell(CellId),
    /// A host callback.
    Callback(CallbackId),
}

pub(crate) enum CellKind {
    Property(PropertyData),
    Binding(BindingLink),
    /// The shared sentinel returned for destroyed owners.
    Void,
}

pub(crate) struct Cell {
    pub value: Value,
    pub listeners: SmallVec<[Listener; 2]>,
    /// Version being delivered by the innermost dispatch in progress.
    pub dispatching: Option<u64>,
    /// Bumped on every stored value.
    pub version: u64,
    pub kind: CellKind,
}

impl Cell {
    pub fn new(value: Value, kind: CellKind) -> Self {
        Self { value, listeners: SmallVec::new(), dispatching: None, version: 0, kind }
    }
}

/// Which handler a delivery is routed to.
#[derive(Clone, Copy)]
enum Target {
    Property,
    Binding,
}

impl Graph {
    /// Store `value` in a cell and notify if it differs by identity.
    pub(crate) fn update_cell(&mut self, cell: CellId, value: Value) -> bool {
        let Some(c) = self.cells.get_mut(cell) else {
            return false;
        };
        if c.value.same(&value) {
            return false;
        }
        c.value = value;
        c.version += 1;
        self.dispatch(cell);
        true
    }

    /// Notify every listener of `cell` with its current value.
    pub(crate) fn dispatch(&mut self, cell: CellId) {
        let (snapshot, version, outer) = match self.cells.get_mut(cell) {
            Some(c) => {
                let outer = c.dispatching.replace(c.version);
                (c.listeners.clone(), c.version, outer)
            }
            None => return,
        };
        log::trace!("dispatch {:?} to {} listeners", cell, snapshot.len());

        let mut superseded = false;
        for listener in snapshot.iter().copied() {
            let Some(c) = self.cells.get(cell) else {
                return;
            };
            if c.version != version {
                superseded = true;
                break;
            }
            if !c.listeners.contains(&listener) {
                continue;
            }
            let value = c.value.clone();
            self.deliver(listener, cell, value);
        }

        // Listeners that attached while we were dispatching
        if !superseded {
            let mut seen = snapshot;
            self.deliver_late(cell, version, &mut seen);
        }

        if let Some(c) = self.cells.get_mut(cell) {
            c.dispatching = outer;
        }
    }

    /// Keep delivering to listeners that joined during dispatch until none
    /// remain, the cell dies or its value changes.
    fn deliver_late(&mut self, cell: CellId, version: u64, seen: &mut SmallVec<[Listener; 2]>) {
        loop {
            let Some(c) = self.cells.get(cell) else {
                return;
            };
            if c.version != version {
                return;
            }
            let Some(listener) = c.listeners.iter().copied().find(|l| !seen.contains(l)) else {
                return;
            };
            let value = c.value.clone();
            seen.push(listener);
            self.deliver(listener, cell, value);
        }
    }

    /// Attach a listener and deliver the current value to it, unless the
    /// cell is mid-dispatch of that same value (the dispatch will deliver it).
    pub(crate) fn listen(&mut self, cell: CellId, listener: Listener) {
        let Some(c) = self.cells.get_mut(cell) else {
            return;
        };
        if c.listeners.contains(&listener) {
            return;
        }
        c.listeners.push(listener);
        let deliver_now = c.dispatching != Some(c.version);
        let value = c.value.clone();
        let is_property = matches!(c.kind, CellKind::Property(_));
        if is_property {
            self.notify_subscribers(cell, PropertyEvent::ListenerAttached);
        }
        if deliver_now {
            self.deliver(listener, cell, value);
        }
    }

    /// Detach a listener. A binding link left without listeners destroys
    /// itself.
    pub(crate) fn unlisten(&mut self, cell: CellId, listener: Listener) {
        let Some(c) = self.cells.get_mut(cell) else {
            return;
        };
        let Some(pos) = c.listeners.iter().position(|l| *l == listener) else {
            return;
        };
        c.listeners.remove(pos);
        let empty = c.listeners.is_empty();
        let route = match c.kind {
            CellKind::Property(_) => Some(Target::Property),
            CellKind::Binding(_) => Some(Target::Binding),
            CellKind::Void => None,
        };
        match route {
            Some(Target::Property) => {
                self.notify_subscribers(cell, PropertyEvent::ListenerDetached)
            }
            Some(Target::Binding) if empty => self.destroy_link(cell),
            _ => {}
        }
    }

    fn deliver(&mut self, listener: Listener, from: CellId, value: Value) {
        if self.dispatch_depth >= self.config.max_dispatch_depth {
            log::error!(
                "dispatch depth {} exceeded delivering {:?} -> {:?}; \
                 cutting propagation (binding cycle?)",
                self.config.max_dispatch_depth,
                from,
                listener
            );
            if let Listener::Cell(target) = listener {
                self.notify_subscribers(
                    target,
                    PropertyEvent::Error("binding cycle: dispatch depth exceeded".into()),
                );
            }
            return;
        }
        self.dispatch_depth += 1;
        match listener {
            Listener::Callback(id) => {
                if let Some(callback) = self.callbacks.get(&id).cloned() {
                    callback(self, &value);
                }
            }
            Listener::Cell(target) => {
                let route = self.cells.get(target).and_then(|c| match c.kind {
                    CellKind::Property(_) => Some(Target::Property),
                    CellKind::Binding(_) => Some(Target::Binding),
                    CellKind::Void => None,
                });
                match route {
                    Some(Target::Property) => self.on_source_value(target, from, value),
                    Some(Target::Binding) => self.on_link_value(target, from, value),
                    None => {}
                }
            }
        }
        self.dispatch_depth -= 1;
    }

    /// Register a value callback on a property. The current value is
    /// delivered immediately.
    pub fn watch(&mut self, prop: PropId, f: impl Fn(&mut Graph, &Value) + 'static) -> CallbackId {
        let id = self.next_callback_id();
        if !self.check_cell(prop, "watch") {
            return id;
        }
        self.callbacks.insert(id, Rc::new(f));
        self.listen(prop, Listener::Callback(id));
        id
    }

    pub fn unwatch(&mut self, prop: PropId, id: CallbackId) {
        self.unlisten(prop, Listener::Callback(id));
        self.callbacks.remove(&id);
    }

    /// Number of listeners currently attached to a property.
    pub fn listener_count(&self, prop: PropId) -> usize {
        self.cells.get(prop).map_or(0, |c| c.listeners.len())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::config::EngineConfig;

    fn recorder(graph: &mut Graph, prop: PropId) -> Rc<RefCell<Vec<Value>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        graph.watch(prop, move |_, v| sink.borrow_mut().push(v.clone()));
        seen
    }

    #[test]
    fn watch_delivers_current_then_changes() {
        let mut graph = Graph::new(EngineConfig::strict());
        let block = graph.create_block(graph.temp(), "b");
        let prop = graph.property(block, "a");
        graph.update_value(prop, Value::from(1));

        let seen = recorder(&mut graph, prop);
        graph.update_value(prop, Value::from(2));
        // identical value is a no-op
        assert!(!graph.update_value(prop, Value::from(2)));
        assert_eq!(*seen.borrow(), vec![Value::from(1), Value::from(2)]);
    }

    #[test]
    fn listener_detaching_mid_dispatch_is_safe() {
        let mut graph = Graph::new(EngineConfig::strict());
        let block = graph.create_block(graph.temp(), "b");
        let prop = graph.property(block, "a");

        let seen = Rc::new(RefCell::new(Vec::new()));
        let second = Rc::new(RefCell::new(None));
        let slot = second.clone();
        graph.watch(prop, move |g, v| {
            if v.as_f64() == Some(1.0) {
                if let Some(id) = *slot.borrow() {
                    g.unwatch(prop, id);
                }
            }
        });
        let sink = seen.clone();
        let id = graph.watch(prop, move |_, v| sink.borrow_mut().push(v.clone()));
        *second.borrow_mut() = Some(id);

        graph.update_value(prop, Value::from(1));
        assert_eq!(*seen.borrow(), vec![Value::Undefined]);
    }

    #[test]
    fn nested_update_supersedes_outer_dispatch() {
        let mut graph = Graph::new(EngineConfig::strict());
        let block = graph.create_block(graph.temp(), "b");
        let prop = graph.property(block, "a");

        graph.watch(prop, move |g, v| {
            if v.as_f64() == Some(1.0) {
                g.update_value(prop, Value::from(2));
            }
        });
        let seen = recorder(&mut graph, prop);
        graph.update_value(prop, Value::from(1));
        // the second listener never sees the superseded value
        assert_eq!(*seen.borrow(), vec![Value::Undefined, Value::from(2)]);
    }

    #[test]
    fn listen_during_dispatch_is_delivered_once() {
        let mut graph = Graph::new(EngineConfig::strict());
        let block = graph.create_block(graph.temp(), "b");
        let prop = graph.property(block, "a");

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let attached = Rc::new(RefCell::new(false));
        graph.watch(prop, move |g, v| {
            if v.as_f64() == Some(1.0) && !*attached.borrow() {
                *attached.borrow_mut() = true;
                let sink = sink.clone();
                g.watch(prop, move |_, v| sink.borrow_mut().push(v.clone()));
            }
        });
        graph.update_value(prop, Value::from(1));
        assert_eq!(*seen.borrow(), vec![Value::from(1)]);
    }

    #[test]
    fn listener_attached_after_nested_update_gets_the_newer_value() {
        let mut graph = Graph::new(EngineConfig::strict());
        let block = graph.create_block(graph.temp(), "b");
        let prop = graph.property(block, "a");

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        graph.watch(prop, move |g, v| {
            if v.as_f64() == Some(1.0) {
                g.update_value(prop, Value::from(2));
                let sink = sink.clone();
                g.watch(prop, move |_, v| sink.borrow_mut().push(v.clone()));
            }
        });
        graph.update_value(prop, Value::from(1));
        assert_eq!(*seen.borrow(), vec![Value::from(2)]);

        graph.update_value(prop, Value::from(3));
        assert_eq!(*seen.borrow(), vec![Value::from(2), Value::from(3)]);
    }
}
