//! SharedBlocks: cache-keyed flows leased by several flows.
//!
//! The cache key is the requesting function's id, or the canonical form of
//! the requested data when no id is given. The last lessee detaching
//! destroys the SharedBlock unless its `#cacheMode` is `"persist"`; a
//! detach without a flow always evicts.

use indexmap::IndexSet;
use serde_json::Value as Json;
use ulid::Ulid;

use crate::arena::BlockId;
use crate::data::{canonical_key, DataMap};
use crate::graph::Graph;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Function(String),
    Data(String),
}

impl CacheKey {
    pub fn new(function_id: Option<&str>, data: &DataMap) -> Self {
        match function_id {
            Some(id) => CacheKey::Function(id.to_string()),
            None => CacheKey::Data(canonical_key(&Json::Object(data.clone()))),
        }
    }
}

pub(crate) struct SharedData {
    pub key: CacheKey,
    pub lessees: IndexSet<BlockId>,
    pub persist: bool,
}

impl Graph {
    /// Get or create the SharedBlock for `(function_id, data)` and attach
    /// `flow` to it.
    pub fn lease_shared(
        &mut self,
        flow: BlockId,
        function_id: Option<&str>,
        data: &DataMap,
    ) -> BlockId {
        let key = CacheKey::new(function_id, data);
        if let Some(&shared) = self.shared_cache.get(&key) {
            if self.is_alive(shared) {
                self.attach_flow(shared, flow);
                return shared;
            }
        }

        let name = Ulid::new().to_string();
        let shared_root = self.roots.shared;
        let shared = self.create_flow(shared_root, &name);
        if let Some(block) = self.blocks.get_mut(shared) {
            block.shared =
                Some(SharedData { key: key.clone(), lessees: IndexSet::new(), persist: false });
        }
        // registered before loading so a reentrant request finds it
        self.shared_cache.insert(key.clone(), shared);
        log::debug!("shared block {} for {:?}", name, key);
        self.load(shared, data);
        self.attach_flow(shared, flow);
        shared
    }

    pub fn attach_flow(&mut self, shared: BlockId, flow: BlockId) {
        if !self.check_block(shared, "attach_flow") || !self.check_block(flow, "attach_flow") {
            return;
        }
        let lessee = self.lessee_of(flow);
        let Some(data) = self.blocks.get_mut(shared).and_then(|b| b.shared.as_mut()) else {
            log::warn!("attach_flow: {:?} is not a shared block", shared);
            return;
        };
        data.lessees.insert(lessee);
        if let Some(f) = self.flow_data_mut(lessee) {
            if !f.leases.contains(&shared) {
                f.leases.push(shared);
            }
        }
    }

    /// Detach `flow`, or evict unconditionally with `None`.
    pub fn detach_flow(&mut self, shared: BlockId, flow: Option<BlockId>) {
        let flow = flow.map(|f| self.lessee_of(f));
        let Some(data) = self.blocks.get_mut(shared).and_then(|b| b.shared.as_mut()) else {
            return;
        };
        let evict = match flow {
            Some(flow) => {
                data.lessees.shift_remove(&flow);
                data.lessees.is_empty() && !data.persist
            }
            None => true,
        };
        if let Some(f) = flow.and_then(|f| self.flow_data_mut(f)) {
            f.leases.retain(|b| *b != shared);
        }
        if evict {
            log::debug!("evict shared block {:?}", shared);
            self.destroy_block(shared);
        }
    }

    /// Flow that holds leases for `block`: itself or its enclosing flow.
    fn lessee_of(&self, block: BlockId) -> BlockId {
        if self.is_flow(block) {
            block
        } else {
            self.enclosing_flow(block).unwrap_or(block)
        }
    }

    pub fn shared_block(&self, key: &CacheKey) -> Option<BlockId> {
        self.shared_cache.get(key).copied()
    }

    pub fn shared_count(&self) -> usize {
        self.shared_cache.len()
    }

    pub fn lessees(&self, shared: BlockId) -> Vec<BlockId> {
        self.blocks
            .get(shared)
            .and_then(|b| b.shared.as_ref())
            .map(|s| s.lessees.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Drop dictionary and lease bookkeeping of a dying SharedBlock.
    pub(crate) fn forget_shared(&mut self, block: BlockId, shared: SharedData) {
        if self.shared_cache.get(&shared.key) == Some(&block) {
            self.shared_cache.remove(&shared.key);
        }
        for lessee in shared.lessees {
            if let Some(f) = self.flow_data_mut(lessee) {
                f.leases.retain(|b| *b != block);
            }
        }
    }
}
