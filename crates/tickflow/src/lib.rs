//! Tickflow: a reactive block/property dataflow engine.
//!
//! A [`Graph`] owns a tree of Blocks. Each Block owns named Properties;
//! a Property holds a literal or follows a dotted binding path to another
//! Property. Blocks that name a registered [`Function`] in `#is` run it when
//! their inputs change, queued through a priority resolver that drains to
//! a fixed point once per tick.
//!
//! ```text
//! root (flow)
//! ├── #global  (flow, `^name` namespace)
//! ├── #shared  (flow, SharedBlocks)
//! ├── #temp    (flow)
//! └── job      (flow loaded from data)
//!     ├── x    {#is: add, 0: 1, 1: 2}
//!     └── y    {#is: add, ~0: "x.#output", 1: 10}
//! ```

pub mod arena;
pub mod binding;
pub mod block;
pub mod config;
pub mod data;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod flow;
pub mod function;
pub mod graph;
pub mod history;
pub mod mode;
pub mod property;
pub mod resolver;
pub mod shared;
pub mod storage;
pub mod value;

pub use arena::{BlockId, CellId, PropId};
pub use config::EngineConfig;
pub use data::{DataMap, FieldData};
pub use dispatcher::{CallbackId, Listener};
pub use error::{Error, Result};
pub use event::{check_value, Clock, Event, EventKind, EventType};
pub use function::{
    CancelReason, Function, FunctionContext, FunctionDesc, PRIORITY_ASYNC, PRIORITY_HEAVY,
    PRIORITY_LIGHT, RunOutput, Settler, TaskResult,
};
pub use graph::{Graph, Roots};
pub use mode::Mode;
pub use property::{Control, PropertyEvent, PropertyKind, SubscriberId};
pub use shared::CacheKey;
pub use storage::{FileStorage, MemoryStorage, Storage};
pub use value::{Value, ValueMap};
