#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use futures_channel::oneshot;
use serde_json::Value as Json;
use tickflow::{
    BlockId, CancelReason, DataMap, EngineConfig, Function, FunctionContext, FunctionDesc, Graph,
    Mode, RunOutput, Settler, TaskResult, Value,
};

pub type Log = Rc<RefCell<Vec<String>>>;

pub fn data(json: Json) -> DataMap {
    match json {
        Json::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

/// Strict graph with `add` registered.
pub fn graph() -> Graph {
    let mut graph = Graph::new(EngineConfig::strict());
    graph.register_function(FunctionDesc::of::<Add>("add"));
    graph
}

pub fn set(graph: &mut Graph, block: BlockId, name: &str, value: impl Into<Value>) {
    let prop = graph.property(block, name);
    graph.set_value(prop, value.into());
}

pub fn settle(graph: &mut Graph) {
    assert!(graph.run_all(16), "graph did not settle");
}

/// `#output = 0 + 1`; undefined unless both inputs are numbers.
#[derive(Default)]
pub struct Add;

impl Function for Add {
    fn run(&mut self, ctx: &mut FunctionContext<'_>) -> RunOutput {
        let sum = match (ctx.input("0").as_f64(), ctx.input("1").as_f64()) {
            (Some(a), Some(b)) => Value::from(a + b),
            _ => Value::Undefined,
        };
        ctx.output(sum);
        RunOutput::None
    }
}

/// Logs its `tag` on every run; bumps `poke.in` when `poke` holds a block.
pub struct Recorder {
    log: Log,
}

impl Function for Recorder {
    fn run(&mut self, ctx: &mut FunctionContext<'_>) -> RunOutput {
        self.log.borrow_mut().push(ctx.input("tag").to_string());
        if let Some(target) = ctx.input("poke").as_block() {
            let graph = ctx.graph();
            let input = graph.property(target, "in");
            let next = graph.value(input).as_f64().unwrap_or(0.0) + 1.0;
            graph.update_value(input, Value::from(next));
        }
        RunOutput::None
    }

    fn cleanup(&mut self, ctx: &mut FunctionContext<'_>) {
        self.log.borrow_mut().push(format!("cleanup:{}", ctx.input("tag")));
    }
}

pub fn recorder(id: &str, log: &Log) -> FunctionDesc {
    let log = log.clone();
    FunctionDesc::new(id, move || Box::new(Recorder { log: log.clone() }))
}

/// Recorder block in `parent` that only runs when called.
pub fn called_block(graph: &mut Graph, parent: BlockId, name: &str, priority: i32) -> BlockId {
    let block = graph.create_block(parent, name);
    set(graph, block, "#mode", Mode::OnCall.as_str());
    set(graph, block, "#priority", priority);
    set(graph, block, "tag", name);
    set(graph, block, "#is", "rec");
    block
}

/// Shared state of the async test functions.
#[derive(Default)]
pub struct Pending {
    pub senders: RefCell<Vec<oneshot::Sender<TaskResult>>>,
    pub settlers: RefCell<Vec<Settler>>,
    pub cancels: RefCell<Vec<CancelReason>>,
    pub refuse_cancel: std::cell::Cell<bool>,
}

/// Every run returns a pending channel.
pub struct Echo {
    state: Rc<Pending>,
}

impl Function for Echo {
    fn run(&mut self, _ctx: &mut FunctionContext<'_>) -> RunOutput {
        let (tx, output) = RunOutput::pending();
        self.state.senders.borrow_mut().push(tx);
        output
    }

    fn cancel(&mut self, reason: CancelReason, _mode: Mode) -> bool {
        self.state.cancels.borrow_mut().push(reason);
        !self.state.refuse_cancel.get()
    }
}

/// Every run waits on a settler taken from its context.
pub struct Waiter {
    state: Rc<Pending>,
}

impl Function for Waiter {
    fn run(&mut self, ctx: &mut FunctionContext<'_>) -> RunOutput {
        self.state.settlers.borrow_mut().push(ctx.settler());
        RunOutput::Wait
    }

    fn cancel(&mut self, reason: CancelReason, _mode: Mode) -> bool {
        self.state.cancels.borrow_mut().push(reason);
        true
    }
}

pub fn echo(state: &Rc<Pending>) -> FunctionDesc {
    let state = state.clone();
    FunctionDesc::new("echo", move || Box::new(Echo { state: state.clone() }))
        .with_priority(tickflow::PRIORITY_ASYNC)
}

pub fn waiter(state: &Rc<Pending>) -> FunctionDesc {
    let state = state.clone();
    FunctionDesc::new("wait", move || Box::new(Waiter { state: state.clone() }))
}
