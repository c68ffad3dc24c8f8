//! Priority resolver: drains queued blocks to a fixed point per tick.
//!
//! One FIFO queue per priority class, lowest number first. Nothing in a
//! higher class runs while lower-class work is pending, including work
//! queued mid-pass:
//!
//! ```text
//! pass:   take the lowest non-empty class as a batch
//!         run each block (queued flag cleared first)
//!         lower-class work appeared? put the rest back, restart the pass
//! done:   advance the clock, run call_later callbacks
//! ```

use std::collections::VecDeque;

use crate::arena::BlockId;
use crate::function::PRIORITY_LIGHT;
use crate::graph::Graph;

type Deferred = Box<dyn FnOnce(&mut Graph)>;

pub(crate) struct Resolver {
    queues: Vec<VecDeque<BlockId>>,
    /// A drain has been requested and not started.
    scheduled: bool,
    running: bool,
    later: Vec<Deferred>,
    drains: u64,
}

impl Resolver {
    pub fn new(classes: usize) -> Self {
        Self {
            queues: (0..classes.max(1)).map(|_| VecDeque::new()).collect(),
            scheduled: false,
            running: false,
            later: Vec::new(),
            drains: 0,
        }
    }

    fn schedule(&mut self) {
        if !self.running {
            self.scheduled = true;
        }
    }

    fn has_work_below(&self, class: usize) -> bool {
        self.queues[..class].iter().any(|q| !q.is_empty())
    }

    /// Return an interrupted batch to the front of its queue.
    fn requeue_front(&mut self, class: usize, mut rest: VecDeque<BlockId>) {
        rest.extend(self.queues[class].drain(..));
        self.queues[class] = rest;
    }
}

impl Graph {
    /// Enqueue a block in its priority class unless already queued.
    pub(crate) fn queue_block(&mut self, block: BlockId) {
        let last = self.resolver.queues.len() - 1;
        let Some(data) = self.blocks.get_mut(block) else {
            return;
        };
        if data.queued {
            return;
        }
        data.queued = true;
        let class = data
            .priority
            .or_else(|| data.desc.as_ref().map(|d| d.priority))
            .unwrap_or(PRIORITY_LIGHT)
            .min(last);
        log::trace!("queue {:?} in class {}", block, class);
        self.resolver.queues[class].push_back(block);
        self.resolver.schedule();
    }

    /// Run `f` once the current (or next) drain has settled.
    pub fn call_later(&mut self, f: impl FnOnce(&mut Graph) + 'static) {
        self.resolver.later.push(Box::new(f));
        self.resolver.schedule();
    }

    /// Whether work is waiting for [`Graph::tick`]. Finished async runs are
    /// routed first, so work their results queue is reported too.
    pub fn needs_tick(&mut self) -> bool {
        if !self.resolver.running {
            self.poll_tasks();
        }
        self.resolver.scheduled
    }

    pub fn is_queued(&self, block: BlockId) -> bool {
        self.blocks.get(block).is_some_and(|b| b.queued)
    }

    /// Completed drains so far.
    pub fn drain_count(&self) -> u64 {
        self.resolver.drains
    }

    /// Route finished async runs, then drain once. A call from inside a
    /// running drain is ignored; the running drain picks up whatever was
    /// queued.
    pub fn tick(&mut self) {
        if self.resolver.running {
            return;
        }
        self.poll_tasks();
        self.resolver.running = true;
        self.resolver.scheduled = false;

        'pass: loop {
            let Some(class) = self.resolver.queues.iter().position(|q| !q.is_empty()) else {
                break;
            };
            let mut batch = std::mem::take(&mut self.resolver.queues[class]);
            while let Some(block) = batch.pop_front() {
                self.run_queued(block);
                if self.resolver.has_work_below(class) {
                    self.resolver.requeue_front(class, batch);
                    continue 'pass;
                }
            }
        }

        self.clock.advance();
        self.resolver.running = false;
        self.resolver.drains += 1;
        log::trace!("drain {} done, loop id {}", self.resolver.drains, self.clock.loop_id());

        let later = std::mem::take(&mut self.resolver.later);
        for f in later {
            f(self);
        }
    }

    fn run_queued(&mut self, block: BlockId) {
        let Some(data) = self.blocks.get_mut(block) else {
            return;
        };
        data.queued = false;
        if data.queue_to_run {
            self.execute_block(block);
        }
    }

    /// Poll async settlements and drain until nothing is scheduled, for at
    /// most `max_rounds` drains. Returns whether the graph went quiet.
    ///
    /// Runs still waiting on their own settlement do not keep the graph
    /// busy.
    pub fn run_all(&mut self, max_rounds: usize) -> bool {
        for _ in 0..max_rounds {
            self.poll_tasks();
            if !self.resolver.scheduled {
                return true;
            }
            self.tick();
        }
        self.poll_tasks();
        !self.resolver.scheduled
    }

    /// [`Graph::run_all`] bounded by the configured `max_rounds`.
    pub fn run_until_quiescent(&mut self) -> bool {
        let rounds = self.config.max_rounds;
        self.run_all(rounds)
    }
}
