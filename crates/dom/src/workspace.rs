//! Per-request workspace
//!
//! Owns four resource tables (trees, selectors, collections, buffers) for
//! the lifetime of one request. Every resource is addressed by a typed
//! handle, and every call validates its handles before touching the engine.
//!
//! ```text
//! allocate_tree ──┐
//!                 ├─ allocate_collection ─ remove ─┐
//! allocate_selector┘                               ├─ serialize ─ join
//!                                    (tree revision bumps)
//! ```
//!
//! A collection remembers the revision of its tree at match time. Any
//! removal on that tree bumps the revision, so older collections fail with
//! `InvalidHandle` instead of pointing at detached nodes.
//!
//! Scope roots are resolved once per tree, on first use, and pinned. After
//! a removal detaches a scope root, that scope serializes to nothing rather
//! than sliding onto whichever node now sits in the same place.

use crate::arena::{next_workspace_id, SlotArena, SlotError, WorkspaceId};
use crate::engine::Engine;
use crate::error::{DomError, Result};
use crate::types::{
    BufferHandle, CollectionHandle, ResourceCounts, Scope, SelectorHandle, TreeHandle,
};
use encoding_rs::Encoding;
use std::fmt::Display;

struct TreeEntry<T, N> {
    tree: T,
    revision: u64,
    roots: Vec<(Scope, Option<N>)>,
}

impl<T, N: Copy> TreeEntry<T, N> {
    fn new(tree: T) -> Self {
        Self {
            tree,
            revision: 0,
            roots: Vec::new(),
        }
    }
}

/// Root of `scope` in `entry`, resolved by the engine the first time only
fn pinned_root<E: Engine>(
    engine: &E,
    entry: &mut TreeEntry<E::Tree, E::Node>,
    scope: Scope,
) -> Option<E::Node> {
    if let Some(&(_, root)) = entry.roots.iter().find(|(pinned, _)| *pinned == scope) {
        return root;
    }

    let root = engine.scope_root(&entry.tree, scope);
    entry.roots.push((scope, root));
    root
}

struct CollectionEntry<N> {
    tree: TreeHandle,
    revision: u64,
    scope: Scope,
    nodes: Vec<N>,
}

/// Build the loud `InvalidHandle` error. Reaching this means a pipeline
/// composed its calls wrongly; bad input never lands here.
fn invalid_handle(workspace: WorkspaceId, what: impl Display, reason: impl Display) -> DomError {
    let message = format!("{} {}", what, reason);
    tracing::error!(workspace = workspace, "Invalid handle: {}", message);
    DomError::InvalidHandle(message)
}

/// Resource arena for one request
pub struct Workspace<'e, E: Engine> {
    id: WorkspaceId,
    engine: &'e E,
    trees: SlotArena<TreeEntry<E::Tree, E::Node>>,
    selectors: SlotArena<E::Selector>,
    collections: SlotArena<CollectionEntry<E::Node>>,
    buffers: SlotArena<Vec<String>>,
    destroyed: bool,
}

impl<'e, E: Engine> Workspace<'e, E> {
    pub fn new(engine: &'e E) -> Self {
        let id = next_workspace_id();
        tracing::debug!(workspace = id, "Workspace created");

        Self {
            id,
            engine,
            trees: SlotArena::new(id),
            selectors: SlotArena::new(id),
            collections: SlotArena::new(id),
            buffers: SlotArena::new(id),
            destroyed: false,
        }
    }

    pub fn id(&self) -> WorkspaceId {
        self.id
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Live entries per table
    pub fn live_resources(&self) -> ResourceCounts {
        ResourceCounts {
            trees: self.trees.live(),
            selectors: self.selectors.live(),
            collections: self.collections.live(),
            buffers: self.buffers.live(),
        }
    }

    fn ensure_live(&self) -> Result<()> {
        if self.destroyed {
            return Err(invalid_handle(self.id, "workspace", "has been destroyed"));
        }
        Ok(())
    }

    /// Parse `html` into a new tree
    pub fn allocate_tree(
        &mut self,
        html: &[u8],
        encoding: &'static Encoding,
    ) -> Result<TreeHandle> {
        self.ensure_live()?;
        let tree = self.engine.parse(html, encoding)?;
        let handle = TreeHandle(self.trees.insert(TreeEntry::new(tree)));
        tracing::trace!(workspace = self.id, "Allocated {} ({} bytes)", handle, html.len());
        Ok(handle)
    }

    /// Compile `selector` into a new selector
    pub fn allocate_selector(&mut self, selector: &[u8]) -> Result<SelectorHandle> {
        self.ensure_live()?;
        let compiled = self.engine.compile_selector(selector)?;
        Ok(SelectorHandle(self.selectors.insert(compiled)))
    }

    /// Match `selector` against `scope` of `tree`. No match is an empty
    /// collection, not an error.
    pub fn allocate_collection(
        &mut self,
        tree: TreeHandle,
        scope: Scope,
        selector: SelectorHandle,
    ) -> Result<CollectionHandle> {
        self.ensure_live()?;
        let id = self.id;

        let tree_entry = self
            .trees
            .get_mut(tree.0)
            .map_err(|e| invalid_handle(id, tree, e))?;
        let compiled = self
            .selectors
            .get(selector.0)
            .map_err(|e| invalid_handle(id, selector, e))?;

        let nodes = match pinned_root(self.engine, tree_entry, scope) {
            Some(root) => self.engine.select(&tree_entry.tree, root, scope, compiled),
            None => Vec::new(),
        };
        let revision = tree_entry.revision;

        let handle = CollectionHandle(self.collections.insert(CollectionEntry {
            tree,
            revision,
            scope,
            nodes,
        }));
        tracing::trace!(workspace = id, "Allocated {} in scope {}", handle, scope);
        Ok(handle)
    }

    /// Number of nodes in a collection
    pub fn collection_len(&self, collection: CollectionHandle) -> Result<usize> {
        self.ensure_live()?;
        self.collections
            .get(collection.0)
            .map(|entry| entry.nodes.len())
            .map_err(|e| invalid_handle(self.id, collection, e))
    }

    /// Delete every node of `collection` from its tree.
    ///
    /// Fails with `EmptyCollection` when nothing matched. After a successful
    /// removal every collection computed on the same tree is stale.
    pub fn remove(&mut self, collection: CollectionHandle) -> Result<usize> {
        self.ensure_live()?;
        let id = self.id;

        let entry = self
            .collections
            .get(collection.0)
            .map_err(|e| invalid_handle(id, collection, e))?;

        if entry.nodes.is_empty() {
            return Err(DomError::EmptyCollection);
        }

        let tree_entry = self
            .trees
            .get_mut(entry.tree.0)
            .map_err(|e| invalid_handle(id, entry.tree, e))?;

        if tree_entry.revision != entry.revision {
            return Err(invalid_handle(
                id,
                collection,
                format_args!("is stale: {} changed since it was matched", entry.tree),
            ));
        }

        let removed = self.engine.remove(&mut tree_entry.tree, &entry.nodes)?;
        tree_entry.revision += 1;

        tracing::debug!(
            workspace = id,
            "Removed {} nodes of {} (scope {})",
            removed,
            collection,
            entry.scope
        );
        Ok(removed)
    }

    /// Serialize `scope` of `tree` into a new buffer
    pub fn serialize(&mut self, tree: TreeHandle, scope: Scope) -> Result<BufferHandle> {
        self.ensure_live()?;
        let id = self.id;

        let tree_entry = self
            .trees
            .get_mut(tree.0)
            .map_err(|e| invalid_handle(id, tree, e))?;
        let fragments = match pinned_root(self.engine, tree_entry, scope) {
            Some(root) => self.engine.serialize(&tree_entry.tree, root, scope)?,
            None => Vec::new(),
        };

        Ok(BufferHandle(self.buffers.insert(fragments)))
    }

    /// Serialize each node of `collection` into a new buffer, one fragment per node
    pub fn serialize_collection(&mut self, collection: CollectionHandle) -> Result<BufferHandle> {
        self.ensure_live()?;
        let id = self.id;

        let entry = self
            .collections
            .get(collection.0)
            .map_err(|e| invalid_handle(id, collection, e))?;
        let tree_entry = self
            .trees
            .get(entry.tree.0)
            .map_err(|e| invalid_handle(id, entry.tree, e))?;

        if tree_entry.revision != entry.revision {
            return Err(invalid_handle(
                id,
                collection,
                format_args!("is stale: {} changed since it was matched", entry.tree),
            ));
        }

        let fragments = self.engine.serialize_nodes(&tree_entry.tree, &entry.nodes)?;
        Ok(BufferHandle(self.buffers.insert(fragments)))
    }

    /// Path labels of the first node in `tree` matching `selector`
    pub fn locate(
        &self,
        tree: TreeHandle,
        selector: SelectorHandle,
    ) -> Result<Option<Vec<String>>> {
        self.ensure_live()?;

        let tree_entry = self
            .trees
            .get(tree.0)
            .map_err(|e| invalid_handle(self.id, tree, e))?;
        let compiled = self
            .selectors
            .get(selector.0)
            .map_err(|e| invalid_handle(self.id, selector, e))?;

        Ok(self.engine.locate(&tree_entry.tree, compiled))
    }

    /// Concatenate a buffer's fragments. The buffer is consumed: a second
    /// join on the same handle fails with `InvalidHandle`.
    pub fn join(&mut self, buffer: BufferHandle, separator: &str) -> Result<String> {
        self.ensure_live()?;
        let id = self.id;

        let fragments = self
            .buffers
            .take(buffer.0)
            .map_err(|e: SlotError| invalid_handle(id, buffer, e))?;

        Ok(fragments.join(separator))
    }

    /// Release every resource. Safe to call any number of times; `Drop`
    /// calls it as well.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }

        let counts = self.live_resources();
        self.buffers.clear();
        self.collections.clear();
        self.selectors.clear();
        self.trees.clear();
        self.destroyed = true;

        tracing::debug!(
            workspace = self.id,
            trees = counts.trees,
            selectors = counts.selectors,
            collections = counts.collections,
            buffers = counts.buffers,
            "Workspace destroyed"
        );
    }
}

impl<E: Engine> Drop for Workspace<'_, E> {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ScraperEngine;
    use encoding_rs::UTF_8;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Resource that reports its own release
    struct Tracked(Arc<AtomicUsize>);

    impl Tracked {
        fn new(live: &Arc<AtomicUsize>) -> Self {
            live.fetch_add(1, Ordering::SeqCst);
            Self(live.clone())
        }
    }

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Stub engine counting live trees and selectors
    struct CountingEngine {
        live: Arc<AtomicUsize>,
    }

    impl CountingEngine {
        fn new() -> Self {
            Self {
                live: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn live(&self) -> usize {
            self.live.load(Ordering::SeqCst)
        }
    }

    impl Engine for CountingEngine {
        type Tree = Tracked;
        type Selector = Tracked;
        type Node = u32;

        fn parse(&self, _html: &[u8], _encoding: &'static Encoding) -> Result<Tracked> {
            Ok(Tracked::new(&self.live))
        }

        fn compile_selector(&self, selector: &[u8]) -> Result<Tracked> {
            if selector.is_empty() {
                return Err(DomError::SelectorError("empty".into()));
            }
            Ok(Tracked::new(&self.live))
        }

        fn scope_root(&self, _tree: &Tracked, scope: Scope) -> Option<u32> {
            match scope {
                Scope::Head => None,
                _ => Some(0),
            }
        }

        fn select(&self, _tree: &Tracked, _root: u32, _scope: Scope, _selector: &Tracked) -> Vec<u32> {
            vec![1, 2]
        }

        fn remove(&self, _tree: &mut Tracked, nodes: &[u32]) -> Result<usize> {
            Ok(nodes.len())
        }

        fn serialize(&self, _tree: &Tracked, _root: u32, _scope: Scope) -> Result<Vec<String>> {
            Ok(vec!["<a>".into(), "</a>".into()])
        }

        fn serialize_nodes(&self, _tree: &Tracked, nodes: &[u32]) -> Result<Vec<String>> {
            Ok(nodes.iter().map(|n| n.to_string()).collect())
        }

        fn locate(&self, _tree: &Tracked, _selector: &Tracked) -> Option<Vec<String>> {
            Some(vec!["1".into()])
        }
    }

    #[test]
    fn test_destroy_twice() {
        let engine = CountingEngine::new();
        let mut workspace = Workspace::new(&engine);
        workspace.allocate_tree(b"<p>", UTF_8).unwrap();
        workspace.allocate_selector(b"p").unwrap();
        assert_eq!(engine.live(), 2);

        workspace.destroy();
        workspace.destroy();

        assert!(workspace.is_destroyed());
        assert_eq!(engine.live(), 0);
        assert_eq!(workspace.live_resources().total(), 0);
    }

    #[test]
    fn test_drop_releases_resources() {
        let engine = CountingEngine::new();
        {
            let mut workspace = Workspace::new(&engine);
            workspace.allocate_tree(b"<p>", UTF_8).unwrap();
            workspace.allocate_tree(b"<p>", UTF_8).unwrap();
            assert_eq!(workspace.live_resources().trees, 2);
        }
        assert_eq!(engine.live(), 0);
    }

    #[test]
    fn test_panic_still_releases_resources() {
        let engine = CountingEngine::new();

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let mut workspace = Workspace::new(&engine);
            workspace.allocate_tree(b"<p>", UTF_8).unwrap();
            panic!("request aborted mid-pipeline");
        }));

        assert!(outcome.is_err());
        assert_eq!(engine.live(), 0);
    }

    #[test]
    fn test_calls_after_destroy_fail() {
        let engine = CountingEngine::new();
        let mut workspace = Workspace::new(&engine);
        let tree = workspace.allocate_tree(b"", UTF_8).unwrap();
        workspace.destroy();

        assert!(matches!(
            workspace.serialize(tree, Scope::Document),
            Err(DomError::InvalidHandle(_))
        ));
        assert!(matches!(
            workspace.allocate_selector(b"p"),
            Err(DomError::InvalidHandle(_))
        ));
        assert_eq!(engine.live(), 0);
    }

    #[test]
    fn test_foreign_handle_rejected() {
        let engine = CountingEngine::new();
        let mut first = Workspace::new(&engine);
        let mut second = Workspace::new(&engine);

        let tree = first.allocate_tree(b"", UTF_8).unwrap();
        second.allocate_tree(b"", UTF_8).unwrap();

        assert_ne!(first.id(), second.id());
        assert!(matches!(
            second.serialize(tree, Scope::Document),
            Err(DomError::InvalidHandle(_))
        ));
    }

    #[test]
    fn test_selector_error_allocates_nothing() {
        let engine = CountingEngine::new();
        let mut workspace = Workspace::new(&engine);

        assert!(matches!(
            workspace.allocate_selector(b""),
            Err(DomError::SelectorError(_))
        ));
        assert_eq!(workspace.live_resources(), ResourceCounts::default());
    }

    #[test]
    fn test_empty_collection_remove() {
        let engine = CountingEngine::new();
        let mut workspace = Workspace::new(&engine);
        let tree = workspace.allocate_tree(b"", UTF_8).unwrap();
        let selector = workspace.allocate_selector(b"p").unwrap();
        let collection = workspace
            .allocate_collection(tree, Scope::Head, selector)
            .unwrap();

        assert_eq!(workspace.collection_len(collection).unwrap(), 0);
        assert_eq!(workspace.remove(collection), Err(DomError::EmptyCollection));
    }

    #[test]
    fn test_remove_invalidates_collections_on_same_tree() {
        let engine = CountingEngine::new();
        let mut workspace = Workspace::new(&engine);
        let tree = workspace.allocate_tree(b"", UTF_8).unwrap();
        let other_tree = workspace.allocate_tree(b"", UTF_8).unwrap();
        let selector = workspace.allocate_selector(b"p").unwrap();

        let first = workspace
            .allocate_collection(tree, Scope::Body, selector)
            .unwrap();
        let second = workspace
            .allocate_collection(tree, Scope::Body, selector)
            .unwrap();
        let elsewhere = workspace
            .allocate_collection(other_tree, Scope::Body, selector)
            .unwrap();

        assert_eq!(workspace.remove(first).unwrap(), 2);

        // Reuse of the removed collection and of its sibling is refused
        assert!(matches!(workspace.remove(first), Err(DomError::InvalidHandle(_))));
        assert!(matches!(
            workspace.serialize_collection(second),
            Err(DomError::InvalidHandle(_))
        ));

        // A collection on another tree is unaffected
        assert_eq!(workspace.remove(elsewhere).unwrap(), 2);

        // Re-matching after the mutation yields a fresh, valid collection
        let fresh = workspace
            .allocate_collection(tree, Scope::Body, selector)
            .unwrap();
        assert!(workspace.serialize_collection(fresh).is_ok());
    }

    #[test]
    fn test_join_consumes_buffer() {
        let engine = CountingEngine::new();
        let mut workspace = Workspace::new(&engine);
        let tree = workspace.allocate_tree(b"", UTF_8).unwrap();
        let buffer = workspace.serialize(tree, Scope::Document).unwrap();

        assert_eq!(workspace.join(buffer, "|").unwrap(), "<a>|</a>");
        assert!(matches!(
            workspace.join(buffer, ""),
            Err(DomError::InvalidHandle(_))
        ));
        assert_eq!(workspace.live_resources().buffers, 0);
    }

    #[test]
    fn test_handles_monotonic_per_table() {
        let engine = CountingEngine::new();
        let mut workspace = Workspace::new(&engine);
        let a = workspace.allocate_tree(b"", UTF_8).unwrap();
        let s = workspace.allocate_selector(b"p").unwrap();
        let b = workspace.allocate_tree(b"", UTF_8).unwrap();

        assert_eq!((a.index(), b.index()), (0, 1));
        assert_eq!(s.index(), 0);
        assert_eq!(a.workspace(), workspace.id());
    }

    #[test]
    fn test_full_remove_sequence_with_html_engine() {
        let engine = ScraperEngine::default();
        let mut workspace = Workspace::new(&engine);

        let tree = workspace
            .allocate_tree(b"<p>keep</p><p class=\"rm\">drop</p>", UTF_8)
            .unwrap();
        let selector = workspace.allocate_selector(b".rm").unwrap();
        let collection = workspace
            .allocate_collection(tree, Scope::BodyChildren, selector)
            .unwrap();

        assert_eq!(workspace.remove(collection).unwrap(), 1);

        let buffer = workspace.serialize(tree, Scope::BodyChildren).unwrap();
        assert_eq!(workspace.join(buffer, "").unwrap(), "<p>keep</p>");

        workspace.destroy();
        assert_eq!(workspace.live_resources().total(), 0);
    }

    #[test]
    fn test_scope_root_pinned_across_removal() {
        let engine = ScraperEngine::default();
        let mut workspace = Workspace::new(&engine);

        let tree = workspace
            .allocate_tree(b"<p class=\"rm\">a</p><p>b</p>", UTF_8)
            .unwrap();
        let selector = workspace.allocate_selector(b".rm").unwrap();
        let collection = workspace
            .allocate_collection(tree, Scope::BodyFirstChild, selector)
            .unwrap();

        assert_eq!(workspace.remove(collection).unwrap(), 1);

        // The matched scope root is gone; its former sibling is not in scope
        let buffer = workspace.serialize(tree, Scope::BodyFirstChild).unwrap();
        assert_eq!(workspace.join(buffer, "").unwrap(), "");

        let again = workspace
            .allocate_collection(tree, Scope::BodyFirstChild, selector)
            .unwrap();
        assert_eq!(workspace.collection_len(again).unwrap(), 0);

        // Other scopes of the same tree still resolve normally
        let buffer = workspace.serialize(tree, Scope::BodyChildren).unwrap();
        assert_eq!(workspace.join(buffer, "").unwrap(), "<p>b</p>");
    }
}
