//! Blocks: owners of properties, optionally driving a function.
//!
//! Control properties (`#is`, `#mode`, `#call`, ...) feed back into the
//! block through [`Graph::on_property_changed`]. Runs go through the
//! resolver unless the block is `#sync` and called directly.

use std::rc::Rc;
use std::sync::Arc;

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use serde_json::Value as Json;

use crate::arena::{BlockId, CellId, PropId};
use crate::data::{parse_field, wrap_literal, DataMap, FieldData, IS_KEY};
use crate::event::{check_value, EventType};
use crate::flow::FlowData;
use crate::function::{CancelReason, Function, FunctionDesc, PendingTask, RunOutput, TaskResult};
use crate::graph::Graph;
use crate::mode::Mode;
use crate::property::{Control, PropertyKind};
use crate::shared::SharedData;
use crate::value::Value;

/// Whether the block is applying serialized data.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum LoadState {
    Idle,
    Loading,
    LiveUpdating,
}

pub(crate) struct BlockData {
    pub parent: Option<BlockId>,
    /// Property in the parent that owns this block.
    pub owner: Option<PropId>,
    pub properties: IndexMap<Arc<str>, CellId>,
    /// Binding links cached by full path.
    pub bindings: FxHashMap<Arc<str>, CellId>,
    pub function: Option<Box<dyn Function>>,
    pub function_id: Option<String>,
    pub desc: Option<Rc<FunctionDesc>>,
    /// Bumped whenever the function instance is replaced.
    pub function_gen: u64,
    pub mode: Mode,
    pub run_on_change: bool,
    pub run_on_load: bool,
    pub sync: bool,
    pub priority: Option<usize>,
    pub queued: bool,
    pub queue_to_run: bool,
    pub load_state: LoadState,
    pub function_pending: bool,
    pub run_id: u64,
    /// Run id of the outstanding async run.
    pub pending_run: Option<u64>,
    pub destroying: bool,
    pub flow: Option<FlowData>,
    pub shared: Option<SharedData>,
}

impl BlockData {
    pub fn new(parent: Option<BlockId>, owner: Option<PropId>, flow: Option<FlowData>) -> Self {
        Self {
            parent,
            owner,
            properties: IndexMap::new(),
            bindings: FxHashMap::default(),
            function: None,
            function_id: None,
            desc: None,
            function_gen: 0,
            mode: Mode::Auto,
            run_on_change: false,
            run_on_load: false,
            sync: false,
            priority: None,
            queued: false,
            queue_to_run: false,
            load_state: LoadState::Idle,
            function_pending: false,
            run_id: 0,
            pending_run: None,
            destroying: false,
            flow,
            shared: None,
        }
    }
}

fn is_flow_data(map: &DataMap) -> bool {
    map.get(IS_KEY).and_then(Json::as_str) == Some("flow")
}

impl Graph {
    /// Create a plain block owned by `parent.field`, replacing (and
    /// destroying) any block that property owned before.
    pub fn create_block(&mut self, parent: BlockId, field: &str) -> BlockId {
        self.create_child(parent, field, false)
    }

    pub(crate) fn create_child(&mut self, parent: BlockId, field: &str, flow: bool) -> BlockId {
        if !self.check_block(parent, "create_block") || !self.is_alive(parent) {
            // stale handle: every later use degrades like any destroyed block
            let orphan = self.blocks.alloc(BlockData::new(None, None, None));
            self.blocks.free(orphan);
            return orphan;
        }
        let prop = self.property(parent, field);
        let flow_data = flow.then(|| FlowData::new(self.is_disabled(parent)));
        let child = self.blocks.alloc(BlockData::new(Some(parent), Some(prop), flow_data));

        self.clear_binding(prop);
        let previous = match self.prop_mut(prop) {
            Some(p) => {
                p.saved = Value::Undefined;
                p.owned.replace(child)
            }
            None => None,
        };
        self.assign(prop, Value::Block(child));
        if let Some(previous) = previous.filter(|b| *b != child) {
            self.destroy_block(previous);
        }
        let noun = if flow { "flow" } else { "block" };
        log::debug!("created {} {:?} at {:?}.{}", noun, child, parent, field);
        self.mark_history(parent);
        child
    }

    /// Destroy a block, its properties, owned children and links.
    /// Destroying twice is a no-op.
    pub fn destroy_block(&mut self, block: BlockId) {
        if self.is_root(block) {
            log::warn!("refusing to destroy root flow {:?}", block);
            return;
        }
        let owner = match self.blocks.get_mut(block) {
            Some(data) if !data.destroying => {
                data.destroying = true;
                data.owner
            }
            _ => return,
        };
        log::debug!("destroy block {:?}", block);

        // detach from the owning property without recursing back here
        if let Some(owner) = owner {
            let held = match self.prop_mut(owner) {
                Some(p) if p.owned == Some(block) => {
                    p.owned = None;
                    true
                }
                _ => false,
            };
            if held && self.cells.get(owner).is_some_and(|c| c.value.as_block() == Some(block)) {
                self.assign(owner, Value::Undefined);
                if let Some(parent) = self.property_block(owner) {
                    self.mark_history(parent);
                }
            }
        }

        self.cancel_pending(block, CancelReason::Void);

        let Some(data) = self.blocks.get_mut(block) else {
            return;
        };
        let function = data.function.take();
        data.function_gen += 1;
        data.desc = None;
        let shared = data.shared.take();
        let leases = data.flow.as_mut().map(|f| std::mem::take(&mut f.leases)).unwrap_or_default();
        let props: Vec<CellId> = data.properties.values().copied().collect();

        if let Some(mut function) = function {
            function.destroy();
        }
        if let Some(shared) = shared {
            self.forget_shared(block, shared);
        }
        for lease in leases {
            self.detach_flow(lease, Some(block));
        }
        for prop in props {
            self.destroy_property(prop);
        }
        let links: Vec<CellId> = self
            .blocks
            .get_mut(block)
            .map(|d| d.bindings.drain().map(|(_, link)| link).collect())
            .unwrap_or_default();
        for link in links {
            self.destroy_link(link);
        }
        self.blocks.free(block);
    }

    pub fn parent(&self, block: BlockId) -> Option<BlockId> {
        self.blocks.get(block)?.parent
    }

    /// Function id named by `#is`, registered or not.
    pub fn function_id(&self, block: BlockId) -> Option<String> {
        self.blocks.get(block)?.function_id.clone()
    }

    /// Whether a function instance is attached.
    pub fn has_function_instance(&self, block: BlockId) -> bool {
        self.blocks.get(block).is_some_and(|b| b.desc.is_some())
    }

    pub fn is_waiting(&self, block: BlockId) -> bool {
        self.blocks.get(block).is_some_and(|b| b.pending_run.is_some())
    }

    pub fn mode(&self, block: BlockId) -> Mode {
        self.blocks.get(block).map_or(Mode::Auto, |b| b.mode)
    }

    /// Blocks owned by properties of `block`, in property order.
    pub fn owned_children(&self, block: BlockId) -> Vec<BlockId> {
        let Some(data) = self.blocks.get(block) else {
            return Vec::new();
        };
        data.properties.values().filter_map(|&p| self.prop(p).and_then(|p| p.owned)).collect()
    }

    /// Hook run after a property's value changed.
    pub(crate) fn on_property_changed(&mut self, prop: PropId) {
        let Some(p) = self.prop(prop) else {
            return;
        };
        let (block, kind, name) = (p.block, p.kind, p.name.clone());
        let Some(data) = self.blocks.get_mut(block) else {
            return;
        };
        if data.destroying {
            return;
        }
        let value = self.cells.get(prop).map(|c| c.value.clone()).unwrap_or_default();

        match kind {
            PropertyKind::Input => self.on_input_changed(block, &name, &value, false),
            PropertyKind::Control(control) => match control {
                Control::Is => {
                    let loading =
                        self.blocks.get(block).is_some_and(|d| d.load_state != LoadState::Idle);
                    if loading {
                        if let Some(d) = self.blocks.get_mut(block) {
                            d.function_pending = true;
                        }
                    } else {
                        self.apply_function(block);
                    }
                }
                Control::Mode => self.on_mode_changed(block),
                Control::Call => self.on_call(block, &value),
                Control::Sync => {
                    if let Some(d) = self.blocks.get_mut(block) {
                        d.sync = value.truthy();
                    }
                }
                Control::Priority => {
                    if let Some(d) = self.blocks.get_mut(block) {
                        d.priority = value
                            .as_f64()
                            .filter(|n| n.is_finite() && *n >= 0.0)
                            .map(|n| n as usize);
                    }
                }
                Control::Disabled => {
                    if self.is_flow(block) {
                        self.set_flow_disabled(block, value.truthy());
                    }
                }
                Control::CacheMode => {
                    let shared = self.blocks.get_mut(block).and_then(|d| d.shared.as_mut());
                    if let Some(shared) = shared {
                        shared.persist = value.as_str() == Some("persist");
                    }
                }
                Control::Other => self.on_input_changed(block, &name, &value, true),
                Control::Wait | Control::Emit | Control::Output => {}
            },
            PropertyKind::Attribute
            | PropertyKind::Helper
            | PropertyKind::Global
            | PropertyKind::Scope => {}
        }
    }

    /// Replace the function instance after `#is` changed or its id was
    /// (un)registered.
    pub(crate) fn apply_function(&mut self, block: BlockId) {
        let id = self
            .find_property(block, "#is")
            .and_then(|p| self.cells.get(p))
            .and_then(|c| c.value.as_str().map(str::to_string));
        let desc = id.as_deref().and_then(|id| self.functions.get(id));

        let Some(data) = self.blocks.get_mut(block) else {
            return;
        };
        if data.destroying {
            return;
        }
        let old = data.function.take();
        data.function_gen += 1;
        data.function = desc.as_ref().map(|d| d.create());
        data.desc = desc;
        data.function_id = id;
        let had_pending = data.pending_run.is_some();
        let mode = data.mode;

        if let Some(mut old) = old {
            if had_pending {
                old.cancel(CancelReason::Void, mode);
            }
            old.destroy();
        }
        if had_pending {
            self.set_waiting(block, None);
        }
        self.update_mode(block);

        let Some(data) = self.blocks.get(block) else {
            return;
        };
        log::debug!("block {:?} function {:?}", block, data.function_id);
        if data.desc.is_some() && data.run_on_load {
            self.queue_function(block);
        }
    }

    fn update_mode(&mut self, block: BlockId) {
        let mode = self
            .find_property(block, "#mode")
            .and_then(|p| self.cells.get(p))
            .map(|c| Mode::parse(&c.value))
            .unwrap_or_default();
        let Some(data) = self.blocks.get_mut(block) else {
            return;
        };
        let default = data.desc.as_ref().map_or(Mode::Auto, |d| d.mode);
        let (on_change, on_load) = mode.triggers(default);
        data.mode = mode;
        data.run_on_change = on_change;
        data.run_on_load = on_load;
    }

    fn on_mode_changed(&mut self, block: BlockId) {
        let was_on_load = self.blocks.get(block).is_some_and(|b| b.run_on_load);
        self.update_mode(block);
        let Some(data) = self.blocks.get(block) else {
            return;
        };
        if data.desc.is_none() || data.load_state != LoadState::Idle {
            return;
        }
        if data.mode == Mode::Disabled {
            self.with_function(block, |f, ctx| f.cleanup(ctx));
        } else if data.run_on_load && !was_on_load {
            self.queue_function(block);
        }
    }

    fn on_input_changed(&mut self, block: BlockId, name: &str, value: &Value, config: bool) {
        if !self.blocks.get(block).is_some_and(|b| b.desc.is_some()) {
            return;
        }
        let wants_run = self
            .with_function(block, |f, ctx| {
                if config {
                    f.config_changed(ctx, name, value)
                } else {
                    f.input_changed(ctx, name, value)
                }
            })
            .unwrap_or(true);
        if !wants_run {
            return;
        }
        let Some(data) = self.blocks.get(block) else {
            return;
        };
        let trigger = match data.load_state {
            LoadState::Loading => data.run_on_load,
            LoadState::Idle | LoadState::LiveUpdating => data.run_on_change,
        };
        if trigger {
            self.queue_function(block);
        }
    }

    /// Request a run through the resolver. A disabled flow keeps the
    /// request until it is enabled again.
    pub(crate) fn queue_function(&mut self, block: BlockId) {
        let disabled = self.is_disabled(block);
        let Some(data) = self.blocks.get_mut(block) else {
            return;
        };
        if data.desc.is_none() {
            return;
        }
        data.queue_to_run = true;
        if !disabled {
            self.queue_block(block);
        }
    }

    /// Run the function now.
    pub(crate) fn execute_block(&mut self, block: BlockId) {
        let disabled = self.is_disabled(block);
        let Some(data) = self.blocks.get_mut(block) else {
            return;
        };
        if data.desc.is_none() || data.destroying || data.mode == Mode::Disabled {
            data.queue_to_run = false;
            return;
        }
        if disabled {
            return;
        }
        data.queue_to_run = false;
        data.run_id += 1;
        let run_id = data.run_id;
        let superseded = data.pending_run.is_some();

        if superseded {
            self.cancel_pending(block, CancelReason::Void);
        }
        log::trace!(
            "run {:?} ({:?}) #{}",
            block,
            self.blocks.get(block).and_then(|b| b.function_id.as_deref()),
            run_id
        );
        let Some(output) = self.with_function(block, |f, ctx| f.run(ctx)) else {
            return;
        };
        self.handle_output(block, run_id, output);
    }

    fn handle_output(&mut self, block: BlockId, run_id: u64, output: RunOutput) {
        match output {
            RunOutput::None => {}
            RunOutput::Value(value) => self.emit(block, value),
            RunOutput::Pending(rx) => {
                self.pending_tasks.push(PendingTask { block, run_id, rx });
                self.set_waiting(block, Some(run_id));
            }
            RunOutput::Wait => self.set_waiting(block, Some(run_id)),
        }
    }

    fn set_waiting(&mut self, block: BlockId, run: Option<u64>) {
        let Some(data) = self.blocks.get_mut(block) else {
            return;
        };
        let was = data.pending_run.is_some();
        data.pending_run = run;
        if run.is_some() || was {
            let wait = self.property(block, "#wait");
            self.update_value(wait, Value::Bool(run.is_some()));
        }
    }

    fn cancel_pending(&mut self, block: BlockId, reason: CancelReason) -> bool {
        let Some(data) = self.blocks.get(block) else {
            return false;
        };
        if data.pending_run.is_none() {
            return false;
        }
        let mode = data.mode;
        let accepted = self.with_function(block, |f, _| f.cancel(reason, mode)).unwrap_or(true);
        if accepted {
            log::debug!("cancelled pending run of {:?} ({:?})", block, reason);
            self.set_waiting(block, None);
        }
        accepted
    }

    /// Cancel the block's outstanding async run. Returns whether the
    /// function accepted.
    pub fn cancel(&mut self, block: BlockId) -> bool {
        if !self.check_block(block, "cancel") {
            return false;
        }
        self.cancel_pending(block, CancelReason::Explicit)
    }

    /// Route an async completion; stale run ids are dropped.
    pub(crate) fn settle_run(&mut self, block: BlockId, run_id: u64, result: TaskResult) {
        let Some(data) = self.blocks.get(block) else {
            log::warn!("settlement for destroyed block {:?}", block);
            return;
        };
        if data.pending_run != Some(run_id) {
            log::debug!("discarding stale settlement of {:?} run {}", block, run_id);
            return;
        }
        self.set_waiting(block, None);
        let value = match result {
            Ok(Some(value)) => value,
            Ok(None) => Value::Event(self.clock.trigger()),
            Err(detail) => Value::Event(self.clock.error(detail)),
        };
        self.emit(block, value);
    }

    fn emit(&mut self, block: BlockId, value: Value) {
        let prop = self.property(block, "#emit");
        self.update_value(prop, value);
    }

    fn on_call(&mut self, block: BlockId, value: &Value) {
        if !self.blocks.get(block).is_some_and(|b| b.desc.is_some()) {
            return;
        }
        match check_value(value, &self.clock) {
            EventType::Void => {
                self.cancel_pending(block, CancelReason::Void);
            }
            EventType::Error => {
                self.cancel_pending(block, CancelReason::Error);
                self.emit(block, value.clone());
            }
            EventType::Trigger => {
                let Some(data) = self.blocks.get(block) else {
                    return;
                };
                if data.mode == Mode::Disabled {
                    log::debug!("ignoring call of disabled {:?}", block);
                    return;
                }
                if data.sync {
                    // an on-load block with a run already queued will run anyway
                    if !(data.run_on_change && data.run_on_load && data.queue_to_run) {
                        self.execute_block(block);
                    }
                } else {
                    self.queue_function(block);
                }
            }
        }
    }

    /// Fire `#call` with a fresh trigger event.
    pub fn call(&mut self, block: BlockId) {
        if !self.check_block(block, "call") {
            return;
        }
        let event = self.clock.trigger();
        let prop = self.property(block, "#call");
        self.update_value(prop, Value::Event(event));
    }

    fn begin_load(&mut self, block: BlockId, state: LoadState) -> LoadState {
        match self.blocks.get_mut(block) {
            Some(data) => std::mem::replace(&mut data.load_state, state),
            None => LoadState::Idle,
        }
    }

    fn finish_load(&mut self, block: BlockId, previous: LoadState) {
        let Some(data) = self.blocks.get_mut(block) else {
            return;
        };
        data.load_state = previous;
        if previous != LoadState::Idle {
            return;
        }
        if std::mem::take(&mut data.function_pending) {
            self.apply_function(block);
        }
    }

    /// Apply serialized data to a freshly created block.
    pub fn load(&mut self, block: BlockId, data: &DataMap) {
        if !self.check_block(block, "load") {
            return;
        }
        let previous = self.begin_load(block, LoadState::Loading);
        for (key, json) in data {
            self.load_field(block, key, json);
        }
        self.finish_load(block, previous);
    }

    fn load_field(&mut self, block: BlockId, key: &str, json: &Json) {
        match parse_field(key, json) {
            (name, FieldData::Literal(value)) => {
                let prop = self.property(block, name);
                self.set_value(prop, value);
            }
            (name, FieldData::Binding(path)) => {
                let prop = self.property(block, name);
                self.set_binding(prop, path);
            }
            (name, FieldData::Block(map)) => {
                let child = self.create_child(block, name, is_flow_data(map));
                self.load(child, map);
            }
            (name, FieldData::Helper(map)) => {
                let helper = format!("~{name}");
                let child = self.create_block(block, &helper);
                self.load(child, map);
                let prop = self.property(block, name);
                self.set_binding(prop, Some(format!("{helper}.#output").as_str()));
            }
        }
    }

    /// Apply data to a running block: clear persisted properties absent
    /// from `data`, leave unchanged ones alone and update the rest.
    pub fn live_update(&mut self, block: BlockId, data: &DataMap) {
        if !self.check_block(block, "live_update") {
            return;
        }
        let previous = self.begin_load(block, LoadState::LiveUpdating);

        for (name, prop) in self.properties(block) {
            if self.property_kind(prop) == Some(PropertyKind::Scope) {
                continue;
            }
            let present = if name.starts_with('~') {
                data.get(&name).is_some_and(Json::is_object)
            } else {
                data.contains_key(&name) || data.contains_key(&format!("~{name}"))
            };
            let persisted = self.prop(prop).is_some_and(|p| {
                !p.saved.is_undefined() || p.binding_path.is_some() || p.owned.is_some()
            });
            if !present && persisted {
                self.set_value(prop, Value::Undefined);
            }
        }

        for (key, json) in data {
            self.live_update_field(block, key, json);
        }
        self.finish_load(block, previous);
    }

    fn live_update_field(&mut self, block: BlockId, key: &str, json: &Json) {
        match parse_field(key, json) {
            (name, FieldData::Literal(value)) => {
                let prop = self.property(block, name);
                let unchanged = self.prop(prop).is_some_and(|p| {
                    p.binding_path.is_none() && p.owned.is_none() && p.saved == value
                });
                if !unchanged {
                    self.set_value(prop, value);
                }
            }
            (name, FieldData::Binding(path)) => {
                let prop = self.property(block, name);
                if self.binding_path(prop).as_deref() != path {
                    self.set_binding(prop, path);
                }
            }
            (name, FieldData::Block(map)) => self.live_update_child(block, name, map),
            (name, FieldData::Helper(map)) => {
                let helper = format!("~{name}");
                self.live_update_child(block, &helper, map);
                let path = format!("{helper}.#output");
                let prop = self.property(block, name);
                if self.binding_path(prop).as_deref() != Some(path.as_str()) {
                    self.set_binding(prop, Some(path.as_str()));
                }
            }
        }
    }

    /// Keep a child block whose `#is` did not change; rebuild otherwise.
    fn live_update_child(&mut self, block: BlockId, name: &str, map: &DataMap) {
        let prop = self.property(block, name);
        let existing = self.prop(prop).and_then(|p| p.owned);
        let wanted = map.get(IS_KEY).map(Value::from_json).unwrap_or_default();
        if let Some(child) = existing {
            if self.query_value(child, IS_KEY) == wanted {
                self.live_update(child, map);
                return;
            }
        }
        let child = self.create_child(block, name, is_flow_data(map));
        self.load(child, map);
    }

    /// Serialize a block: literals, bindings, owned children and helpers.
    pub fn save(&self, block: BlockId) -> DataMap {
        let mut out = DataMap::new();
        let Some(data) = self.blocks.get(block) else {
            return out;
        };
        for (name, &prop) in &data.properties {
            let Some(p) = self.prop(prop) else {
                continue;
            };
            match p.kind {
                PropertyKind::Scope => continue,
                PropertyKind::Helper => {
                    if let Some(child) = p.owned {
                        out.insert(name.to_string(), Json::Object(self.save(child)));
                    }
                    continue;
                }
                _ => {}
            }
            if let Some(path) = &p.binding_path {
                let helper = format!("~{name}");
                let via_helper = path.strip_suffix(".#output") == Some(helper.as_str())
                    && self
                        .find_property(block, &helper)
                        .and_then(|h| self.prop(h))
                        .is_some_and(|h| h.owned.is_some());
                if !via_helper {
                    out.insert(helper, Json::String(path.to_string()));
                }
                continue;
            }
            if let Some(child) = p.owned {
                out.insert(name.to_string(), Json::Object(self.save(child)));
                continue;
            }
            if let Some(json) = p.saved.to_json() {
                out.insert(name.to_string(), wrap_literal(json));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::config::EngineConfig;

    fn data(json: Json) -> DataMap {
        match json {
            Json::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn save_skips_derived_values() {
        let mut graph = Graph::new(EngineConfig::strict());
        let flow = graph.create_flow(graph.temp(), "f");
        let a = graph.property(flow, "a");
        graph.set_value(a, Value::from(1));
        let b = graph.property(flow, "b");
        graph.set_binding(b, Some("a"));
        let c = graph.property(flow, "c");
        graph.update_value(c, Value::from("runtime"));

        assert_eq!(Json::Object(graph.save(flow)), json!({"a": 1, "~b": "a"}));
    }

    #[test]
    fn load_builds_nested_blocks_and_helpers() {
        let mut graph = Graph::new(EngineConfig::strict());
        let flow = graph.create_flow(graph.temp(), "f");
        let input = data(json!({
            "n": 2,
            "child": {"#is": "noop", "v": "x"},
            "~h": {"#is": "noop"},
            "sub": {"#is": "flow", "k": true},
            "raw": {"#is": {"#is": "noop"}}
        }));
        graph.load(flow, &input);

        let child = graph.query_value(flow, "child").as_block().unwrap();
        assert_eq!(graph.function_id(child), Some("noop".into()));
        assert!(!graph.has_function_instance(child));
        let h = graph.find_property(flow, "h").unwrap();
        assert_eq!(graph.binding_path(h), Some("~h.#output".into()));
        let sub = graph.query_value(flow, "sub").as_block().unwrap();
        assert!(graph.is_flow(sub));
        assert_eq!(graph.query_value(flow, "raw").field("#is"), Some(Value::from("noop")));

        assert_eq!(graph.save(flow), input);
    }

    #[test]
    fn live_update_clears_absent_and_keeps_children() {
        let mut graph = Graph::new(EngineConfig::strict());
        let flow = graph.create_flow(graph.temp(), "f");
        graph.load(flow, &data(json!({"a": 1, "b": 2, "c": {"#is": "noop", "v": 1}})));
        let child = graph.query_value(flow, "c").as_block().unwrap();
        let runtime = graph.property(child, "#output");
        graph.update_value(runtime, Value::from("kept"));

        graph.live_update(flow, &data(json!({"a": 5, "c": {"#is": "noop", "v": 2}})));
        assert_eq!(graph.query_value(flow, "a"), Value::from(5));
        assert_eq!(graph.query_value(flow, "b"), Value::Undefined);
        assert!(graph.is_alive(child));
        assert_eq!(graph.query_value(child, "v"), Value::from(2));
        assert_eq!(graph.value(runtime), Value::from("kept"));

        graph.live_update(flow, &data(json!({"a": 5, "c": {"#is": "other"}})));
        assert!(!graph.is_alive(child));
    }

    #[test]
    fn destroy_is_idempotent() {
        let mut graph = Graph::new(EngineConfig::strict());
        let flow = graph.create_flow(graph.temp(), "f");
        let block = graph.create_block(flow, "b");
        let prop = graph.find_property(flow, "b").unwrap();

        graph.destroy_block(block);
        graph.destroy_block(block);
        assert!(!graph.is_alive(block));
        assert_eq!(graph.value(prop), Value::Undefined);
    }
}
