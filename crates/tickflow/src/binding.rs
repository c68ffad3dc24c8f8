//! Binding chains for dotted paths.
//!
//! `a.b.c` resolves to one link per segment after the first. Each link
//! listens to the link (or property) of its parent path and re-derives its
//! own value when that changes:
//!
//! - upstream is a Block: follow its property named after the segment
//! - upstream is plain data: take the field, one level deep, non-reactive
//! - anything else: undefined
//!
//! Links are cached per origin block by full path, so every listener of
//! the same path from the same origin shares one chain. A link lives while
//! it has listeners.

use std::sync::Arc;

use crate::arena::{BlockId, CellId};
use crate::dispatcher::{Cell, CellKind, Listener};
use crate::graph::Graph;
use crate::value::Value;

pub(crate) struct BindingLink {
    pub origin: BlockId,
    pub path: Arc<str>,
    pub field: Arc<str>,
    /// Head of the parent path.
    pub parent: CellId,
    /// Property currently followed when upstream is a Block.
    pub source_prop: Option<CellId>,
}

/// First segment names something on the block itself.
fn is_block_local(segment: &str) -> bool {
    segment.starts_with(['#', '~', '@'])
}

/// Part of `path` that is actually walked: a `^name` segment anywhere
/// restarts the walk at the global flow, dropping what came before it.
pub(crate) fn walked_path(path: &str) -> &str {
    match path.rfind(".^") {
        Some(at) => &path[at + 1..],
        None => path,
    }
}

impl Graph {
    fn link(&self, id: CellId) -> Option<&BindingLink> {
        match &self.cells.get(id)?.kind {
            CellKind::Binding(link) => Some(link),
            _ => None,
        }
    }

    fn link_mut(&mut self, id: CellId) -> Option<&mut BindingLink> {
        match &mut self.cells.get_mut(id)?.kind {
            CellKind::Binding(link) => Some(link),
            _ => None,
        }
    }

    /// Block a property of `owner` resolves `path` against.
    ///
    /// A Flow resolves against itself; a plain block against the container
    /// holding it, unless the path starts on the block itself.
    pub(crate) fn binding_origin(&self, owner: BlockId, path: &str) -> BlockId {
        let first = path.split('.').next().unwrap_or(path);
        if self.is_flow(owner) || is_block_local(first) {
            return owner;
        }
        self.parent(owner).unwrap_or(owner)
    }

    /// Resolve `path` from `origin` and attach `listener` to the chain head.
    pub(crate) fn resolve_binding(
        &mut self,
        origin: BlockId,
        path: &str,
        listener: Listener,
    ) -> Option<CellId> {
        let head = self.resolve_head(origin, path)?;
        self.listen(head, listener);
        Some(head)
    }

    fn resolve_head(&mut self, origin: BlockId, path: &str) -> Option<CellId> {
        if !self.is_alive(origin) {
            return None;
        }
        let path = walked_path(path);
        let Some((parent_path, field)) = path.rsplit_once('.') else {
            return Some(self.segment_property(origin, path));
        };
        if let Some(&link) = self.blocks.get(origin)?.bindings.get(path) {
            if self.cells.is_valid(link) {
                return Some(link);
            }
        }
        let parent = self.resolve_head(origin, parent_path)?;
        let link = self.cells.alloc(Cell::new(
            Value::Undefined,
            CellKind::Binding(BindingLink {
                origin,
                path: Arc::from(path),
                field: Arc::from(field),
                parent,
                source_prop: None,
            }),
        ));
        if let Some(data) = self.blocks.get_mut(origin) {
            data.bindings.insert(Arc::from(path), link);
        }
        log::trace!("binding link {:?} for {} on {:?}", link, path, origin);
        self.listen(parent, Listener::Cell(link));
        Some(link)
    }

    /// Property for a single path segment; `^name` lives in the global flow.
    fn segment_property(&mut self, origin: BlockId, segment: &str) -> CellId {
        if segment.starts_with('^') {
            let global = self.roots.global;
            return self.property(global, segment);
        }
        self.property(origin, segment)
    }

    pub(crate) fn on_link_value(&mut self, link: CellId, from: CellId, value: Value) {
        let Some(l) = self.link(link) else {
            return;
        };
        if from == l.parent {
            self.derive(link, value);
        } else if l.source_prop == Some(from) {
            self.update_cell(link, value);
        }
    }

    /// Re-derive a link from a new upstream value.
    fn derive(&mut self, link: CellId, upstream: Value) {
        let Some(l) = self.link(link) else {
            return;
        };
        let field = l.field.clone();
        let old = l.source_prop;

        let target = match upstream.as_block() {
            Some(block) if self.is_alive(block) => Some(self.property(block, &field)),
            _ => None,
        };
        if target.is_some() && target == old {
            return;
        }
        if let Some(l) = self.link_mut(link) {
            l.source_prop = target;
        }
        if let Some(old) = old {
            self.unlisten(old, Listener::Cell(link));
        }
        match target {
            // delivers the new property's value through on_link_value
            Some(target) => self.listen(target, Listener::Cell(link)),
            None => {
                let value = upstream.field(&field).unwrap_or_default();
                self.update_cell(link, value);
            }
        }
    }

    /// Free a link and detach it from its upstream. Parent links left
    /// without listeners go with it.
    pub(crate) fn destroy_link(&mut self, link: CellId) {
        let Some(cell) = self.cells.free(link) else {
            return;
        };
        let CellKind::Binding(l) = cell.kind else {
            return;
        };
        if let Some(origin) = self.blocks.get_mut(l.origin) {
            if origin.bindings.get(&l.path) == Some(&link) {
                origin.bindings.remove(&l.path);
            }
        }
        if let Some(source) = l.source_prop {
            self.unlisten(source, Listener::Cell(link));
        }
        self.unlisten(l.parent, Listener::Cell(link));
    }

    /// Number of live links cached on a block.
    pub fn binding_link_count(&self, block: BlockId) -> usize {
        self.blocks.get(block).map_or(0, |b| b.bindings.len())
    }
}
