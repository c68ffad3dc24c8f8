//! Undo history for flows.
//!
//! Recording runs only while at least one watcher holds it. Explicit edits
//! inside a recorded flow commit at most one snapshot per tick, after the
//! tick's propagation settled. Dropping the last watcher discards the log.

use std::collections::VecDeque;

use crate::arena::BlockId;
use crate::data::DataMap;
use crate::graph::Graph;

pub(crate) struct History {
    undo: VecDeque<DataMap>,
    redo: Vec<DataMap>,
    /// Snapshot matching the flow as of the last commit.
    current: DataMap,
    /// A commit is already scheduled.
    pending: bool,
}

impl History {
    fn new(current: DataMap) -> Self {
        Self { undo: VecDeque::new(), redo: Vec::new(), current, pending: false }
    }
}

impl Graph {
    fn history_mut(&mut self, flow: BlockId) -> Option<&mut History> {
        self.flow_data_mut(flow)?.history.as_mut()
    }

    pub fn watch_history(&mut self, flow: BlockId) {
        if !self.check_block(flow, "watch_history") {
            return;
        }
        let snapshot = self.save(flow);
        let Some(data) = self.flow_data_mut(flow) else {
            return;
        };
        data.history_watchers += 1;
        if data.history.is_none() {
            data.history = Some(History::new(snapshot));
        }
    }

    pub fn unwatch_history(&mut self, flow: BlockId) {
        let Some(data) = self.flow_data_mut(flow) else {
            return;
        };
        data.history_watchers = data.history_watchers.saturating_sub(1);
        if data.history_watchers == 0 {
            data.history = None;
        }
    }

    pub fn is_recording(&self, flow: BlockId) -> bool {
        self.flow_data(flow).is_some_and(|f| f.history.is_some())
    }

    /// Schedule a commit for every recorded flow containing `block`.
    pub(crate) fn mark_history(&mut self, block: BlockId) {
        let mut current = Some(block);
        while let Some(b) = current {
            let schedule = match self.history_mut(b) {
                Some(h) if !h.pending => {
                    h.pending = true;
                    true
                }
                _ => false,
            };
            if schedule {
                self.call_later(move |g| g.commit_history(b));
            }
            current = self.parent(b);
        }
    }

    /// Record the flow's state if it differs from the last snapshot.
    pub fn commit_history(&mut self, flow: BlockId) {
        if self.history_mut(flow).is_none() {
            return;
        }
        let snapshot = self.save(flow);
        let limit = self.config.history_limit;
        let Some(h) = self.history_mut(flow) else {
            return;
        };
        h.pending = false;
        if snapshot == h.current {
            return;
        }
        let previous = std::mem::replace(&mut h.current, snapshot);
        h.undo.push_back(previous);
        while h.undo.len() > limit {
            h.undo.pop_front();
        }
        h.redo.clear();
        log::trace!("history commit on {:?} ({} undo)", flow, h.undo.len());
    }

    pub fn can_undo(&self, flow: BlockId) -> bool {
        self.flow_data(flow).and_then(|f| f.history.as_ref()).is_some_and(|h| !h.undo.is_empty())
    }

    pub fn can_redo(&self, flow: BlockId) -> bool {
        self.flow_data(flow).and_then(|f| f.history.as_ref()).is_some_and(|h| !h.redo.is_empty())
    }

    /// Step back one snapshot. Uncommitted edits are committed first.
    pub fn undo(&mut self, flow: BlockId) -> bool {
        self.commit_history(flow);
        let Some(h) = self.history_mut(flow) else {
            return false;
        };
        let Some(previous) = h.undo.pop_back() else {
            return false;
        };
        let current = std::mem::replace(&mut h.current, previous.clone());
        h.redo.push(current);
        self.apply_snapshot(flow, &previous);
        true
    }

    pub fn redo(&mut self, flow: BlockId) -> bool {
        self.commit_history(flow);
        let Some(h) = self.history_mut(flow) else {
            return false;
        };
        let Some(next) = h.redo.pop() else {
            return false;
        };
        let current = std::mem::replace(&mut h.current, next.clone());
        h.undo.push_back(current);
        self.apply_snapshot(flow, &next);
        true
    }

    fn apply_snapshot(&mut self, flow: BlockId, snapshot: &DataMap) {
        self.live_update(flow, snapshot);
        // the scheduled commit then sees no difference
        let saved = self.save(flow);
        if let Some(h) = self.history_mut(flow) {
            h.current = saved;
        }
    }
}
