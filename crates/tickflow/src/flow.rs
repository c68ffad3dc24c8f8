//! Flows: blocks that are also containers.
//!
//! A Flow scopes binding resolution, carries an enable/disable state that
//! cascades to the blocks it owns, may record undo history, and leases
//! SharedBlocks.

use crate::arena::BlockId;
use crate::data::DataMap;
use crate::graph::Graph;
use crate::history::History;
use crate::value::Value;

#[derive(Default)]
pub(crate) struct FlowData {
    /// Own `#disabled` flag.
    pub disabled: bool,
    /// Own flag or any ancestor flow's.
    pub effective_disabled: bool,
    pub history: Option<History>,
    pub history_watchers: usize,
    /// SharedBlocks this flow is attached to.
    pub leases: Vec<BlockId>,
}

impl FlowData {
    pub fn new(inherited_disabled: bool) -> Self {
        Self { effective_disabled: inherited_disabled, ..Self::default() }
    }
}

impl Graph {
    pub(crate) fn flow_data(&self, block: BlockId) -> Option<&FlowData> {
        self.blocks.get(block)?.flow.as_ref()
    }

    pub(crate) fn flow_data_mut(&mut self, block: BlockId) -> Option<&mut FlowData> {
        self.blocks.get_mut(block)?.flow.as_mut()
    }

    /// Create a Flow owned by `parent.field`.
    pub fn create_flow(&mut self, parent: BlockId, field: &str) -> BlockId {
        self.create_child(parent, field, true)
    }

    pub fn is_flow(&self, block: BlockId) -> bool {
        self.flow_data(block).is_some()
    }

    /// The root and its three singleton flows.
    pub fn is_root(&self, block: BlockId) -> bool {
        let r = &self.roots;
        block == r.root || block == r.global || block == r.shared || block == r.temp
    }

    /// Nearest Flow strictly above `block`.
    pub fn enclosing_flow(&self, block: BlockId) -> Option<BlockId> {
        let mut current = self.parent(block)?;
        loop {
            if self.is_flow(current) {
                return Some(current);
            }
            current = self.parent(current)?;
        }
    }

    /// The job Flow holding `block`: its ancestor directly under the root.
    pub fn job_of(&self, block: BlockId) -> Option<BlockId> {
        if !self.blocks.is_valid(block) {
            return None;
        }
        let mut current = block;
        loop {
            match self.parent(current) {
                Some(parent) if parent == self.roots.root => return Some(current),
                Some(parent) => current = parent,
                None => return Some(current),
            }
        }
    }

    /// Value of the virtual `##` / `###` properties.
    pub(crate) fn scope_value(&self, block: BlockId, name: &str) -> Value {
        let target = match name {
            "##" => self.enclosing_flow(block),
            "###" => self.job_of(block),
            _ => None,
        };
        target.map(Value::Block).unwrap_or_default()
    }

    /// Whether runs of `block` are suppressed by a disabled flow.
    pub fn is_disabled(&self, block: BlockId) -> bool {
        let flow = if self.is_flow(block) { Some(block) } else { self.enclosing_flow(block) };
        flow.and_then(|f| self.flow_data(f)).is_some_and(|f| f.effective_disabled)
    }

    /// Set a flow's own disabled flag (what `#disabled` drives).
    pub fn set_flow_disabled(&mut self, flow: BlockId, disabled: bool) {
        let Some(data) = self.flow_data_mut(flow) else {
            return;
        };
        data.disabled = disabled;
        self.recompute_disabled(flow);
    }

    fn recompute_disabled(&mut self, flow: BlockId) {
        let inherited = self.enclosing_flow(flow).is_some_and(|f| self.is_disabled(f));
        let Some(data) = self.flow_data_mut(flow) else {
            return;
        };
        let effective = inherited || data.disabled;
        if data.effective_disabled == effective {
            return;
        }
        data.effective_disabled = effective;
        log::debug!("flow {:?} {}", flow, if effective { "disabled" } else { "enabled" });
        self.cascade_disabled(flow, effective);
    }

    /// Push a disabled change down through owned children only.
    fn cascade_disabled(&mut self, container: BlockId, disabled: bool) {
        for child in self.owned_children(container) {
            if self.is_flow(child) {
                self.recompute_disabled(child);
                continue;
            }
            if disabled {
                self.with_function(child, |f, ctx| f.cleanup(ctx));
            } else if self.blocks.get(child).is_some_and(|b| b.queue_to_run) {
                self.queue_block(child);
            }
            self.cascade_disabled(child, disabled);
        }
    }

    /// Create and load a top-level job flow.
    pub fn add_job(&mut self, name: &str, data: &DataMap) -> BlockId {
        let root = self.roots.root;
        let job = self.create_flow(root, name);
        self.load(job, data);
        log::debug!("job {} loaded as {:?}", name, job);
        job
    }

    pub fn job(&self, name: &str) -> Option<BlockId> {
        let prop = self.find_property(self.roots.root, name)?;
        self.cells.get(prop)?.value.as_block().filter(|b| self.is_flow(*b))
    }

    /// Names of jobs under the root, excluding the singleton flows.
    pub fn job_names(&self) -> Vec<String> {
        self.properties(self.roots.root)
            .into_iter()
            .filter(|(name, _)| !name.starts_with('#'))
            .filter(|(name, _)| self.job(name).is_some())
            .map(|(name, _)| name)
            .collect()
    }

    pub fn remove_job(&mut self, name: &str) {
        if let Some(prop) = self.find_property(self.roots.root, name) {
            self.set_value(prop, Value::Undefined);
        }
    }
}
