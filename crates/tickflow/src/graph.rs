//! The process-wide context: arenas, registry, resolver and roots.

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::arena::{Arena, BlockId, CellId, PropId};
use crate::block::BlockData;
use crate::config::EngineConfig;
use crate::dispatcher::{Callback, CallbackId, Cell, CellKind};
use crate::event::{Clock, Event};
use crate::flow::FlowData;
use crate::function::{FunctionRegistry, PendingTask, Settlement};
use crate::resolver::Resolver;
use crate::shared::CacheKey;
use crate::value::Value;

/// The three singleton flows every graph owns under its root.
#[derive(Clone, Copy, Debug)]
pub struct Roots {
    pub root: BlockId,
    /// Namespace for `^name` references.
    pub global: BlockId,
    /// Parent of every SharedBlock.
    pub shared: BlockId,
    /// Scratch space for temporary blocks.
    pub temp: BlockId,
}

/// A dataflow graph with its scheduler.
///
/// All mutation happens through `&mut Graph` on one thread. Handles into
/// the graph ([`BlockId`], [`PropId`]) are generational and are checked
/// before every use.
pub struct Graph {
    pub(crate) config: EngineConfig,
    pub(crate) cells: Arena<CellId, Cell>,
    pub(crate) blocks: Arena<BlockId, BlockData>,
    pub(crate) callbacks: FxHashMap<CallbackId, Callback>,
    next_callback: u64,
    next_subscriber: u64,
    pub(crate) functions: FunctionRegistry,
    pub(crate) resolver: Resolver,
    pub(crate) clock: Clock,
    pub(crate) roots: Roots,
    pub(crate) shared_cache: FxHashMap<CacheKey, BlockId>,
    pub(crate) pending_tasks: Vec<PendingTask>,
    pub(crate) settlements: Rc<RefCell<Vec<Settlement>>>,
    pub(crate) dispatch_depth: usize,
    pub(crate) void_prop: CellId,
}

impl Graph {
    pub fn new(config: EngineConfig) -> Self {
        let mut cells = Arena::new();
        let void_prop = cells.alloc(Cell::new(Value::Undefined, CellKind::Void));
        let mut blocks = Arena::new();
        let root = blocks.alloc(BlockData::new(None, None, Some(FlowData::default())));
        let resolver = Resolver::new(config.priority_classes);

        let mut graph = Self {
            config,
            cells,
            blocks,
            callbacks: FxHashMap::default(),
            next_callback: 0,
            next_subscriber: 0,
            functions: FunctionRegistry::default(),
            resolver,
            clock: Clock::new(),
            roots: Roots { root, global: root, shared: root, temp: root },
            shared_cache: FxHashMap::default(),
            pending_tasks: Vec::new(),
            settlements: Rc::new(RefCell::new(Vec::new())),
            dispatch_depth: 0,
            void_prop,
        };
        graph.roots.global = graph.create_flow(root, "#global");
        graph.roots.shared = graph.create_flow(root, "#shared");
        graph.roots.temp = graph.create_flow(root, "#temp");
        graph
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn roots(&self) -> Roots {
        self.roots
    }

    pub fn root(&self) -> BlockId {
        self.roots.root
    }

    pub fn global(&self) -> BlockId {
        self.roots.global
    }

    pub fn temp(&self) -> BlockId {
        self.roots.temp
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Current logical tick.
    pub fn loop_id(&self) -> u64 {
        self.clock.loop_id()
    }

    /// New trigger event tagged with the current tick.
    pub fn trigger(&mut self) -> Event {
        self.clock.trigger()
    }

    /// New error event tagged with the current tick.
    pub fn error_event(&mut self, detail: Value) -> Event {
        self.clock.error(detail)
    }

    /// The sentinel returned for properties of destroyed blocks in relaxed mode.
    pub fn void_property(&self) -> PropId {
        self.void_prop
    }

    pub fn is_alive(&self, block: BlockId) -> bool {
        self.blocks.get(block).is_some_and(|b| !b.destroying)
    }

    /// Live blocks, including the roots.
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub(crate) fn next_callback_id(&mut self) -> CallbackId {
        self.next_callback += 1;
        CallbackId(self.next_callback)
    }

    pub(crate) fn next_subscriber_id(&mut self) -> u64 {
        self.next_subscriber += 1;
        self.next_subscriber
    }

    /// Validate a block handle for an operation.
    ///
    /// Strict mode panics on a destroyed handle; relaxed mode logs and
    /// lets the caller degrade to a no-op.
    pub(crate) fn check_block(&self, block: BlockId, op: &str) -> bool {
        if self.blocks.is_valid(block) {
            return true;
        }
        if self.config.strict {
            panic!("{op}: block {block:?} has been destroyed");
        }
        log::warn!("{op}: ignoring destroyed block {block:?}");
        false
    }

    /// Validate a property handle. The void property is accepted silently
    /// but never mutated.
    pub(crate) fn check_cell(&self, cell: CellId, op: &str) -> bool {
        match self.cells.get(cell) {
            Some(c) => !matches!(c.kind, CellKind::Void),
            None => {
                if self.config.strict {
                    panic!("{op}: property {cell:?} has been destroyed");
                }
                log::warn!("{op}: ignoring destroyed property {cell:?}");
                false
            }
        }
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}
