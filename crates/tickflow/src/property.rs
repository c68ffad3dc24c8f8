//! Properties: named reactive slots owned by a Block.
//!
//! A property holds a live value plus the explicitly set `saved` value
//! used for serialization. It either carries a literal or follows a
//! binding path; when bound, `saved` stays undefined so a save reproduces
//! the binding and not a frozen copy of its value.

use std::rc::Rc;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::arena::{BlockId, CellId, PropId};
use crate::binding::walked_path;
use crate::dispatcher::{Cell, CellKind, Listener};
use crate::graph::Graph;
use crate::value::Value;

/// `#`-prefixed keys with a side effect on their Block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Control {
    Is,
    Mode,
    Call,
    Sync,
    Priority,
    Wait,
    Disabled,
    CacheMode,
    Emit,
    Output,
    /// Any other `#name`: a config input of the function.
    Other,
}

/// Role of a property, derived once from its name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PropertyKind {
    /// Plain input or child slot.
    Input,
    Control(Control),
    /// `@name`: display metadata.
    Attribute,
    /// `~name`: holds a helper block.
    Helper,
    /// `^name`: global namespace entry.
    Global,
    /// `##` and `###`: the enclosing flow and job flow.
    Scope,
}

impl PropertyKind {
    pub fn from_name(name: &str) -> Self {
        match name {
            "##" | "###" => PropertyKind::Scope,
            "#is" => PropertyKind::Control(Control::Is),
            "#mode" => PropertyKind::Control(Control::Mode),
            "#call" => PropertyKind::Control(Control::Call),
            "#sync" => PropertyKind::Control(Control::Sync),
            "#priority" => PropertyKind::Control(Control::Priority),
            "#wait" => PropertyKind::Control(Control::Wait),
            "#disabled" => PropertyKind::Control(Control::Disabled),
            "#cacheMode" => PropertyKind::Control(Control::CacheMode),
            "#emit" => PropertyKind::Control(Control::Emit),
            "#output" => PropertyKind::Control(Control::Output),
            _ if name.starts_with('#') => PropertyKind::Control(Control::Other),
            _ if name.starts_with('@') => PropertyKind::Attribute,
            _ if name.starts_with('~') => PropertyKind::Helper,
            _ if name.starts_with('^') => PropertyKind::Global,
            _ => PropertyKind::Input,
        }
    }
}

/// Structural event delivered to property subscribers.
#[derive(Clone, Debug, PartialEq)]
pub enum PropertyEvent {
    BindingChanged(Option<String>),
    ListenerAttached,
    ListenerDetached,
    Error(String),
    Destroyed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

pub type Subscriber = Rc<dyn Fn(&PropertyEvent)>;

pub(crate) struct PropertyData {
    pub block: BlockId,
    pub name: Arc<str>,
    pub kind: PropertyKind,
    pub saved: Value,
    pub binding_path: Option<Arc<str>>,
    /// Head of the resolved chain; listened to, not owned.
    pub binding_source: Option<CellId>,
    /// Child block created for this property, destroyed with the value.
    pub owned: Option<BlockId>,
    pub subscribers: SmallVec<[(SubscriberId, Subscriber); 1]>,
}

impl PropertyData {
    fn new(block: BlockId, name: &str, kind: PropertyKind) -> Self {
        Self {
            block,
            name: Arc::from(name),
            kind,
            saved: Value::Undefined,
            binding_path: None,
            binding_source: None,
            owned: None,
            subscribers: SmallVec::new(),
        }
    }
}

impl Graph {
    pub(crate) fn prop(&self, id: PropId) -> Option<&PropertyData> {
        match &self.cells.get(id)?.kind {
            CellKind::Property(p) => Some(p),
            _ => None,
        }
    }

    pub(crate) fn prop_mut(&mut self, id: PropId) -> Option<&mut PropertyData> {
        match &mut self.cells.get_mut(id)?.kind {
            CellKind::Property(p) => Some(p),
            _ => None,
        }
    }

    /// Get or create the property `name` of `block`.
    ///
    /// On a destroyed block this panics in strict mode and returns the
    /// void property otherwise.
    pub fn property(&mut self, block: BlockId, name: &str) -> PropId {
        if !self.check_block(block, "property") {
            return self.void_prop;
        }
        if let Some(id) = self.find_property(block, name) {
            return id;
        }
        if self.blocks.get(block).is_some_and(|b| b.destroying) {
            return self.void_prop;
        }
        let kind = PropertyKind::from_name(name);
        let initial = match kind {
            PropertyKind::Scope => self.scope_value(block, name),
            _ => Value::Undefined,
        };
        let id = self.cells.alloc(Cell::new(
            initial,
            CellKind::Property(PropertyData::new(block, name, kind)),
        ));
        if let Some(data) = self.blocks.get_mut(block) {
            data.properties.insert(Arc::from(name), id);
        }
        id
    }

    /// Existing property lookup; never creates and never panics.
    pub fn find_property(&self, block: BlockId, name: &str) -> Option<PropId> {
        self.blocks.get(block)?.properties.get(name).copied()
    }

    /// Properties of a block in insertion order.
    pub fn properties(&self, block: BlockId) -> Vec<(String, PropId)> {
        self.blocks
            .get(block)
            .map(|b| b.properties.iter().map(|(k, v)| (k.to_string(), *v)).collect())
            .unwrap_or_default()
    }

    pub fn value(&self, prop: PropId) -> Value {
        if !self.check_cell(prop, "value") {
            return Value::Undefined;
        }
        self.cells.get(prop).map(|c| c.value.clone()).unwrap_or_default()
    }

    pub fn saved(&self, prop: PropId) -> Value {
        self.prop(prop).map(|p| p.saved.clone()).unwrap_or_default()
    }

    pub fn binding_path(&self, prop: PropId) -> Option<String> {
        self.prop(prop)?.binding_path.as_deref().map(str::to_string)
    }

    /// The property a bound property currently follows, if the path
    /// resolves to one.
    pub fn binding_target(&self, prop: PropId) -> Option<PropId> {
        let source = self.prop(prop)?.binding_source?;
        match &self.cells.get(source)?.kind {
            CellKind::Property(_) => Some(source),
            CellKind::Binding(link) => link.source_prop.filter(|p| self.cells.is_valid(*p)),
            CellKind::Void => None,
        }
    }

    pub fn property_block(&self, prop: PropId) -> Option<BlockId> {
        self.prop(prop).map(|p| p.block)
    }

    pub fn property_name(&self, prop: PropId) -> Option<String> {
        self.prop(prop).map(|p| p.name.to_string())
    }

    pub fn property_kind(&self, prop: PropId) -> Option<PropertyKind> {
        self.prop(prop).map(|p| p.kind)
    }

    /// Set an explicit value: clears any binding and records `saved`.
    pub fn set_value(&mut self, prop: PropId, value: Value) {
        if !self.check_cell(prop, "set_value") {
            return;
        }
        self.clear_binding(prop);
        let Some(p) = self.prop_mut(prop) else {
            return;
        };
        p.saved = value.clone();
        let block = p.block;
        self.assign(prop, value);
        self.mark_history(block);
    }

    /// Set a runtime value without touching `saved`. Returns whether the
    /// value changed.
    pub fn update_value(&mut self, prop: PropId, value: Value) -> bool {
        if !self.check_cell(prop, "update_value") {
            return false;
        }
        self.assign(prop, value)
    }

    /// Bind to `path` (resolved through the owning block), or unbind.
    pub fn set_binding(&mut self, prop: PropId, path: Option<&str>) {
        if !self.check_cell(prop, "set_binding") {
            return;
        }
        let Some(p) = self.prop_mut(prop) else {
            return;
        };
        if p.binding_path.as_deref() == path && (path.is_none() || p.binding_source.is_some()) {
            return;
        }
        let block = p.block;
        p.saved = Value::Undefined;
        p.binding_path = path.map(Arc::from);
        let old = p.binding_source.take();
        if let Some(old) = old {
            self.unlisten(old, Listener::Cell(prop));
        }
        self.notify_subscribers(prop, PropertyEvent::BindingChanged(path.map(str::to_string)));

        match path {
            Some(path) => {
                log::trace!("bind {:?} to {}", prop, path);
                let origin = self.binding_origin(block, path);
                let source = self.resolve_binding(origin, path, Listener::Cell(prop));
                if let Some(p) = self.prop_mut(prop) {
                    p.binding_source = source;
                }
            }
            None => {
                self.assign(prop, Value::Undefined);
            }
        }
        self.mark_history(block);
    }

    /// Discard an unconfirmed edit: go back to the binding source value,
    /// or to `saved` when unbound.
    pub fn revert_update(&mut self, prop: PropId) {
        if !self.check_cell(prop, "revert_update") {
            return;
        }
        let Some(p) = self.prop(prop) else {
            return;
        };
        let target = match p.binding_source {
            Some(source) => self.cells.get(source).map(|c| c.value.clone()).unwrap_or_default(),
            None => p.saved.clone(),
        };
        self.assign(prop, target);
    }

    pub fn subscribe(
        &mut self,
        prop: PropId,
        f: impl Fn(&PropertyEvent) + 'static,
    ) -> SubscriberId {
        let id = SubscriberId(self.next_subscriber_id());
        if !self.check_cell(prop, "subscribe") {
            return id;
        }
        if let Some(p) = self.prop_mut(prop) {
            p.subscribers.push((id, Rc::new(f)));
        }
        id
    }

    pub fn unsubscribe(&mut self, prop: PropId, id: SubscriberId) {
        if let Some(p) = self.prop_mut(prop) {
            p.subscribers.retain(|(sid, _)| *sid != id);
        }
    }

    /// Push a structural event to the property's subscribers.
    pub fn add_event(&mut self, prop: PropId, event: PropertyEvent) {
        if self.check_cell(prop, "add_event") {
            self.notify_subscribers(prop, event);
        }
    }

    pub(crate) fn notify_subscribers(&self, prop: PropId, event: PropertyEvent) {
        let subscribers: SmallVec<[Subscriber; 2]> = match self.prop(prop) {
            Some(p) if !p.subscribers.is_empty() => {
                p.subscribers.iter().map(|(_, s)| s.clone()).collect()
            }
            _ => return,
        };
        for subscriber in subscribers {
            subscriber(&event);
        }
    }

    /// Drop a property's binding, if any. Returns whether one was set.
    pub(crate) fn clear_binding(&mut self, prop: PropId) -> bool {
        let Some(p) = self.prop_mut(prop) else {
            return false;
        };
        if p.binding_path.is_none() && p.binding_source.is_none() {
            return false;
        }
        p.binding_path = None;
        let source = p.binding_source.take();
        if let Some(source) = source {
            self.unlisten(source, Listener::Cell(prop));
        }
        self.notify_subscribers(prop, PropertyEvent::BindingChanged(None));
        true
    }

    /// Value arriving from the binding chain head.
    pub(crate) fn on_source_value(&mut self, prop: PropId, from: CellId, value: Value) {
        let Some(p) = self.prop(prop) else {
            return;
        };
        if p.binding_source.is_some_and(|s| s != from) {
            return;
        }
        self.assign(prop, value);
    }

    /// Store, dispatch, run the owner's hook, then release a child block
    /// this property no longer holds.
    pub(crate) fn assign(&mut self, prop: PropId, value: Value) -> bool {
        match self.cells.get_mut(prop) {
            Some(c) if matches!(c.kind, CellKind::Property(_)) => {
                if c.value.same(&value) {
                    return false;
                }
                c.value = value;
                c.version += 1;
            }
            _ => return false,
        }
        self.dispatch(prop);
        self.on_property_changed(prop);
        self.release_owned(prop);
        true
    }

    fn release_owned(&mut self, prop: PropId) {
        let released = match self.cells.get_mut(prop) {
            Some(Cell { value, kind: CellKind::Property(p), .. }) => match p.owned {
                Some(child) if value.as_block() != Some(child) => p.owned.take(),
                _ => None,
            },
            _ => None,
        };
        if let Some(child) = released {
            self.destroy_block(child);
        }
    }

    /// Tear down a property of a dying block.
    pub(crate) fn destroy_property(&mut self, prop: PropId) {
        let Some(p) = self.prop_mut(prop) else {
            return;
        };
        let source = p.binding_source.take();
        let owned = p.owned.take();
        if let Some(source) = source {
            self.unlisten(source, Listener::Cell(prop));
        }
        let had_value = match self.cells.get_mut(prop) {
            Some(c) if !c.value.is_undefined() => {
                c.value = Value::Undefined;
                c.version += 1;
                true
            }
            _ => false,
        };
        if had_value {
            self.dispatch(prop);
        }
        self.notify_subscribers(prop, PropertyEvent::Destroyed);
        if let Some(child) = owned {
            self.destroy_block(child);
        }
        let Some(cell) = self.cells.free(prop) else {
            return;
        };
        for listener in cell.listeners {
            match listener {
                Listener::Cell(target) => match self.cells.get_mut(target).map(|c| &mut c.kind) {
                    Some(CellKind::Binding(link)) if link.source_prop == Some(prop) => {
                        link.source_prop = None;
                    }
                    Some(CellKind::Property(p)) if p.binding_source == Some(prop) => {
                        p.binding_source = None;
                    }
                    _ => {}
                },
                Listener::Callback(id) => {
                    self.callbacks.remove(&id);
                }
            }
        }
    }

    /// Follow a dotted path of existing properties from `block`.
    pub fn query_property(&self, block: BlockId, path: &str) -> Option<PropId> {
        let mut current = block;
        let mut segments = walked_path(path).split('.').peekable();
        while let Some(segment) = segments.next() {
            let owner = if segment.starts_with('^') { self.roots.global } else { current };
            let prop = self.find_property(owner, segment)?;
            if segments.peek().is_none() {
                return Some(prop);
            }
            current = self.cells.get(prop)?.value.as_block()?;
        }
        None
    }

    /// Value at a dotted path, or undefined.
    pub fn query_value(&self, block: BlockId, path: &str) -> Value {
        self.query_property(block, path)
            .and_then(|p| self.cells.get(p))
            .map(|c| c.value.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::config::EngineConfig;

    #[test]
    fn kinds_from_names() {
        assert_eq!(PropertyKind::from_name("0"), PropertyKind::Input);
        assert_eq!(PropertyKind::from_name("#is"), PropertyKind::Control(Control::Is));
        assert_eq!(PropertyKind::from_name("#limit"), PropertyKind::Control(Control::Other));
        assert_eq!(PropertyKind::from_name("@pos"), PropertyKind::Attribute);
        assert_eq!(PropertyKind::from_name("~x"), PropertyKind::Helper);
        assert_eq!(PropertyKind::from_name("^g"), PropertyKind::Global);
        assert_eq!(PropertyKind::from_name("##"), PropertyKind::Scope);
    }

    #[test]
    fn set_value_records_saved() {
        let mut graph = Graph::new(EngineConfig::strict());
        let block = graph.create_block(graph.temp(), "b");
        let prop = graph.property(block, "a");

        graph.set_value(prop, Value::from("hi"));
        assert_eq!(graph.value(prop), Value::from("hi"));
        assert_eq!(graph.saved(prop), Value::from("hi"));

        graph.update_value(prop, Value::from("edit"));
        assert_eq!(graph.saved(prop), Value::from("hi"));
        graph.revert_update(prop);
        assert_eq!(graph.value(prop), Value::from("hi"));
    }

    #[test]
    fn set_value_clears_binding() {
        let mut graph = Graph::new(EngineConfig::strict());
        let flow = graph.create_flow(graph.temp(), "f");
        let a = graph.property(flow, "a");
        let b = graph.property(flow, "b");
        graph.set_value(a, Value::from(1));
        graph.set_binding(b, Some("a"));
        assert_eq!(graph.value(b), Value::from(1));
        assert_eq!(graph.saved(b), Value::Undefined);

        graph.set_value(b, Value::from(2));
        assert_eq!(graph.binding_path(b), None);
        graph.set_value(a, Value::from(3));
        assert_eq!(graph.value(b), Value::from(2));
    }

    #[test]
    fn subscribers_see_structural_events() {
        let mut graph = Graph::new(EngineConfig::strict());
        let flow = graph.create_flow(graph.temp(), "f");
        let a = graph.property(flow, "a");
        let b = graph.property(flow, "b");

        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = events.clone();
        graph.subscribe(a, move |e| sink.borrow_mut().push(e.clone()));
        let sink = events.clone();
        graph.subscribe(b, move |e| sink.borrow_mut().push(e.clone()));

        graph.set_binding(b, Some("a"));
        graph.set_binding(b, None);
        graph.add_event(a, PropertyEvent::Error("remote".into()));

        assert_eq!(
            *events.borrow(),
            vec![
                PropertyEvent::BindingChanged(Some("a".into())),
                PropertyEvent::ListenerAttached,
                PropertyEvent::ListenerDetached,
                PropertyEvent::BindingChanged(None),
                PropertyEvent::Error("remote".into()),
            ]
        );
    }

    #[test]
    fn overwriting_owned_block_destroys_it() {
        let mut graph = Graph::new(EngineConfig::strict());
        let flow = graph.create_flow(graph.temp(), "f");
        let child = graph.create_block(flow, "c");
        let prop = graph.property(flow, "c");
        assert_eq!(graph.value(prop), Value::Block(child));

        graph.set_value(prop, Value::from(1));
        assert!(!graph.is_alive(child));
    }

    #[test]
    fn query_follows_block_values() {
        let mut graph = Graph::new(EngineConfig::strict());
        let flow = graph.create_flow(graph.temp(), "f");
        let child = graph.create_block(flow, "c");
        let v = graph.property(child, "v");
        graph.set_value(v, Value::from(9));
        assert_eq!(graph.query_value(flow, "c.v"), Value::from(9));
        assert_eq!(graph.query_value(flow, "c.missing"), Value::Undefined);
        assert_eq!(graph.query_value(flow, "nothing.v"), Value::Undefined);
    }
}
