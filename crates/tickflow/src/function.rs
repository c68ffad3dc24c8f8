//! Function contract, registry and async settlement.
//!
//! A Block delegates computation to a [`Function`] instance built from a
//! registered [`FunctionDesc`]. Registration is by string id and may happen
//! before or after blocks naming that id are loaded.

use std::cell::RefCell;
use std::rc::Rc;

use futures_channel::oneshot;
use rustc_hash::FxHashMap;

use crate::arena::BlockId;
use crate::graph::Graph;
use crate::mode::Mode;
use crate::shared::CacheKey;
use crate::value::Value;

/// Light synchronous work.
pub const PRIORITY_LIGHT: usize = 0;
/// Heavy synchronous work.
pub const PRIORITY_HEAVY: usize = 1;
/// Work that usually returns a pending result.
pub const PRIORITY_ASYNC: usize = 2;

/// Outcome of an async run: `Ok(Some(v))` emits `v`, `Ok(None)` emits a
/// "done" trigger, `Err(detail)` emits an error event.
pub type TaskResult = Result<Option<Value>, Value>;

/// What a call to [`Function::run`] produced.
pub enum RunOutput {
    /// Nothing to emit.
    None,
    /// Synchronous emission.
    Value(Value),
    /// The block waits for the channel to settle.
    Pending(oneshot::Receiver<TaskResult>),
    /// The block waits for a [`Settler`] obtained from the context.
    Wait,
}

impl RunOutput {
    /// A pending result and the sender that settles it.
    pub fn pending() -> (oneshot::Sender<TaskResult>, RunOutput) {
        let (tx, rx) = oneshot::channel();
        (tx, RunOutput::Pending(rx))
    }
}

impl std::fmt::Debug for RunOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunOutput::None => write!(f, "None"),
            RunOutput::Value(v) => write!(f, "Value({v})"),
            RunOutput::Pending(_) => write!(f, "Pending"),
            RunOutput::Wait => write!(f, "Wait"),
        }
    }
}

/// Why a pending run is being cancelled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CancelReason {
    /// Superseded by a new run or a stale call.
    Void,
    /// An error event arrived at `#call`.
    Error,
    /// Requested through [`Graph::cancel`].
    Explicit,
}

/// A compute unit attached to a Block.
pub trait Function {
    /// An input property changed. Return false to skip queueing a run.
    fn input_changed(
        &mut self,
        _ctx: &mut FunctionContext<'_>,
        _name: &str,
        _value: &Value,
    ) -> bool {
        true
    }

    /// A `#name` config property changed.
    fn config_changed(&mut self, ctx: &mut FunctionContext<'_>, name: &str, value: &Value) -> bool {
        self.input_changed(ctx, name, value)
    }

    fn run(&mut self, ctx: &mut FunctionContext<'_>) -> RunOutput;

    /// Abort the pending run. Returns whether cancellation was accepted.
    fn cancel(&mut self, _reason: CancelReason, _mode: Mode) -> bool {
        true
    }

    /// Release runtime state; called when the block's flow is disabled.
    fn cleanup(&mut self, _ctx: &mut FunctionContext<'_>) {}

    /// Called once before the instance is dropped.
    fn destroy(&mut self) {}
}

type Factory = Box<dyn Fn() -> Box<dyn Function>>;

/// Registered metadata and constructor for a function id.
pub struct FunctionDesc {
    pub id: String,
    pub priority: usize,
    /// Default trigger policy used by `#mode: auto`.
    pub mode: Mode,
    pub pure: bool,
    factory: Factory,
}

impl FunctionDesc {
    /// Light, pure, running on load by default.
    pub fn new(id: impl Into<String>, factory: impl Fn() -> Box<dyn Function> + 'static) -> Self {
        Self {
            id: id.into(),
            priority: PRIORITY_LIGHT,
            mode: Mode::OnLoad,
            pure: true,
            factory: Box::new(factory),
        }
    }

    /// Descriptor for a `Default`-constructible function type.
    pub fn of<F: Function + Default + 'static>(id: impl Into<String>) -> Self {
        Self::new(id, || Box::new(F::default()))
    }

    pub fn with_priority(mut self, priority: usize) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn impure(mut self) -> Self {
        self.pure = false;
        self
    }

    pub fn create(&self) -> Box<dyn Function> {
        (self.factory)()
    }
}

impl std::fmt::Debug for FunctionDesc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionDesc")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("mode", &self.mode)
            .field("pure", &self.pure)
            .finish()
    }
}

#[derive(Default)]
pub struct FunctionRegistry {
    descs: FxHashMap<String, Rc<FunctionDesc>>,
}

impl FunctionRegistry {
    pub fn insert(&mut self, desc: FunctionDesc) -> Option<Rc<FunctionDesc>> {
        self.descs.insert(desc.id.clone(), Rc::new(desc))
    }

    pub fn remove(&mut self, id: &str) -> Option<Rc<FunctionDesc>> {
        self.descs.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<Rc<FunctionDesc>> {
        self.descs.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.descs.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.descs.keys().map(String::as_str)
    }
}

/// View of the graph handed to a running function.
pub struct FunctionContext<'a> {
    graph: &'a mut Graph,
    block: BlockId,
    run_id: u64,
}

impl<'a> FunctionContext<'a> {
    pub(crate) fn new(graph: &'a mut Graph, block: BlockId, run_id: u64) -> Self {
        Self { graph, block, run_id }
    }

    pub fn block(&self) -> BlockId {
        self.block
    }

    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    /// Current value of one of the block's properties.
    pub fn input(&self, name: &str) -> Value {
        self.graph
            .find_property(self.block, name)
            .and_then(|p| self.graph.cells.get(p))
            .map(|c| c.value.clone())
            .unwrap_or_default()
    }

    /// Runtime update of one of the block's properties.
    pub fn set(&mut self, name: &str, value: Value) {
        if !self.graph.is_alive(self.block) {
            return;
        }
        let prop = self.graph.property(self.block, name);
        self.graph.update_value(prop, value);
    }

    /// Write `#output`.
    pub fn output(&mut self, value: Value) {
        self.set("#output", value);
    }

    /// Handle for settling a [`RunOutput::Wait`] later.
    pub fn settler(&self) -> Settler {
        Settler {
            inbox: self.graph.settlements.clone(),
            block: self.block,
            run_id: self.run_id,
        }
    }

    pub fn loop_id(&self) -> u64 {
        self.graph.loop_id()
    }

    pub fn graph(&mut self) -> &mut Graph {
        self.graph
    }
}

pub(crate) struct Settlement {
    pub block: BlockId,
    pub run_id: u64,
    pub result: TaskResult,
}

pub(crate) struct PendingTask {
    pub block: BlockId,
    pub run_id: u64,
    pub rx: oneshot::Receiver<TaskResult>,
}

/// Completes the run it was created for. Late settlements of superseded
/// runs are discarded by the graph.
pub struct Settler {
    inbox: Rc<RefCell<Vec<Settlement>>>,
    block: BlockId,
    run_id: u64,
}

impl Settler {
    pub fn resolve(self, value: Option<Value>) {
        self.settle(Ok(value));
    }

    pub fn reject(self, detail: Value) {
        self.settle(Err(detail));
    }

    fn settle(self, result: TaskResult) {
        self.inbox.borrow_mut().push(Settlement { block: self.block, run_id: self.run_id, result });
    }
}

impl Graph {
    /// Register (or replace) a function.
    ///
    /// Blocks naming the id get a fresh instance; SharedBlocks cached under
    /// a replaced id are evicted.
    pub fn register_function(&mut self, desc: FunctionDesc) {
        let id = desc.id.clone();
        let replaced = self.functions.insert(desc).is_some();
        log::debug!("register function {} (replaced: {})", id, replaced);
        if replaced {
            if let Some(&shared) = self.shared_cache.get(&CacheKey::Function(id.clone())) {
                self.detach_flow(shared, None);
            }
        }
        for block in self.blocks_with_function(&id) {
            self.apply_function(block);
        }
    }

    pub fn unregister_function(&mut self, id: &str) {
        if self.functions.remove(id).is_none() {
            return;
        }
        for block in self.blocks_with_function(id) {
            self.apply_function(block);
        }
    }

    pub fn has_function(&self, id: &str) -> bool {
        self.functions.contains(id)
    }

    fn blocks_with_function(&self, id: &str) -> Vec<BlockId> {
        self.blocks
            .iter()
            .filter(|(_, b)| !b.destroying && b.function_id.as_deref() == Some(id))
            .map(|(block, _)| block)
            .collect()
    }

    /// Run `f` with the block's function taken out of its slot.
    ///
    /// If the function was replaced while `f` ran, the taken instance is
    /// destroyed instead of put back.
    pub(crate) fn with_function<R>(
        &mut self,
        block: BlockId,
        f: impl FnOnce(&mut dyn Function, &mut FunctionContext<'_>) -> R,
    ) -> Option<R> {
        let (mut function, generation, run_id) = {
            let data = self.blocks.get_mut(block)?;
            (data.function.take()?, data.function_gen, data.run_id)
        };
        let result = {
            let mut ctx = FunctionContext::new(self, block, run_id);
            f(function.as_mut(), &mut ctx)
        };
        match self.blocks.get_mut(block) {
            Some(data) if data.function_gen == generation && data.function.is_none() => {
                data.function = Some(function);
            }
            _ => function.destroy(),
        }
        Some(result)
    }

    /// Collect finished async runs and route them to their blocks.
    /// Returns whether anything settled. [`Graph::tick`] and
    /// [`Graph::needs_tick`] call this.
    pub fn poll_tasks(&mut self) -> bool {
        let mut ready: Vec<Settlement> = Vec::new();
        let blocks = &self.blocks;
        self.pending_tasks.retain_mut(|task| {
            let current = blocks.get(task.block).and_then(|b| b.pending_run) == Some(task.run_id);
            if !current {
                return false;
            }
            match task.rx.try_recv() {
                Ok(Some(result)) => {
                    ready.push(Settlement { block: task.block, run_id: task.run_id, result });
                    false
                }
                Ok(None) => true,
                Err(_) => {
                    ready.push(Settlement {
                        block: task.block,
                        run_id: task.run_id,
                        result: Err(Value::from("task dropped")),
                    });
                    false
                }
            }
        });
        ready.extend(self.settlements.borrow_mut().drain(..));
        let any = !ready.is_empty();
        for settlement in ready {
            self.settle_run(settlement.block, settlement.run_id, settlement.result);
        }
        any
    }

    /// Async runs still awaiting settlement.
    pub fn pending_task_count(&self) -> usize {
        self.pending_tasks.len()
    }
}
