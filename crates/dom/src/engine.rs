//! Engine Adapter - typed façade over the HTML parsing and matching engine
//!
//! The workspace never touches parser or matcher types directly. It only
//! calls the primitives below, handing back whatever the engine produced.
//! Every textual input is a byte slice with an explicit length.

use crate::error::{DomError, Result};
use crate::serializer;
use crate::types::Scope;
use crate::utils;
use ahash::AHashSet;
use ego_tree::{NodeId, NodeRef};
use encoding_rs::Encoding;
use scraper::{ElementRef, Html, Node, Selector};

/// Primitives the workspace composes into pipelines.
///
/// Implementations are shared by every concurrently running workspace, hence
/// `Send + Sync`: they must hold no mutable state outside the trees and
/// selectors they return.
pub trait Engine: Send + Sync {
    /// Parsed document
    type Tree;
    /// Compiled selector
    type Selector;
    /// Reference to one node of a `Tree`
    type Node: Copy + Eq + std::hash::Hash;

    /// Build a tree from raw bytes in the given encoding
    fn parse(&self, html: &[u8], encoding: &'static Encoding) -> Result<Self::Tree>;

    /// Compile selector text
    fn compile_selector(&self, selector: &[u8]) -> Result<Self::Selector>;

    /// Root node of `scope`, `None` when the tree has no such region
    fn scope_root(&self, tree: &Self::Tree, scope: Scope) -> Option<Self::Node>;

    /// Every node under `root` matching `selector`, in document order. The
    /// root itself is a candidate only when `scope` includes it. A root
    /// detached from the tree matches nothing.
    fn select(
        &self,
        tree: &Self::Tree,
        root: Self::Node,
        scope: Scope,
        selector: &Self::Selector,
    ) -> Vec<Self::Node>;

    /// Detach `nodes` from the tree. Descendants go before their ancestors.
    /// Returns how many nodes were detached.
    fn remove(&self, tree: &mut Self::Tree, nodes: &[Self::Node]) -> Result<usize>;

    /// Markup of the region rooted at `root`, as ordered fragments. A root
    /// detached from the tree serializes to nothing.
    fn serialize(&self, tree: &Self::Tree, root: Self::Node, scope: Scope)
        -> Result<Vec<String>>;

    /// Outer markup of each node, one fragment per node
    fn serialize_nodes(&self, tree: &Self::Tree, nodes: &[Self::Node]) -> Result<Vec<String>>;

    /// Path labels (root first) of the first node matching `selector`
    fn locate(&self, tree: &Self::Tree, selector: &Self::Selector) -> Option<Vec<String>>;
}

/// Engine configuration.
///
/// Created once at process start and read-only afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Replace malformed input sequences instead of failing the parse
    pub lossy_decoding: bool,
    /// Inputs larger than this fail with `ParseError`
    pub max_document_bytes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lossy_decoding: false,
            max_document_bytes: 64 * 1024 * 1024,
        }
    }
}

/// html5ever tree builder + `selectors` matching, via `scraper`
#[derive(Debug, Clone, Default)]
pub struct ScraperEngine {
    config: EngineConfig,
}

impl ScraperEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

/// Root element (`<html>`), if the tree still has one
fn root_element(html: &Html) -> Option<NodeRef<'_, Node>> {
    html.tree.root().children().find(|n| n.value().is_element())
}

fn child_element<'a>(parent: NodeRef<'a, Node>, name: &str) -> Option<NodeRef<'a, Node>> {
    parent.children().find(|n| match n.value() {
        Node::Element(element) => element.name() == name,
        _ => false,
    })
}

/// Node of `scope` from which matching and serialization start
fn resolve_scope(html: &Html, scope: Scope) -> Option<NodeRef<'_, Node>> {
    let body = || root_element(html).and_then(|root| child_element(root, "body"));

    match scope {
        Scope::Document => Some(html.tree.root()),
        Scope::Html => root_element(html),
        Scope::Head => root_element(html).and_then(|root| child_element(root, "head")),
        Scope::Body | Scope::BodyChildren => body(),
        Scope::BodyFirstChild => {
            body().and_then(|b| b.children().find(|n| n.value().is_element()))
        }
    }
}

/// Node `id`, if it is still reachable from the document node
fn attached(html: &Html, id: NodeId) -> Option<NodeRef<'_, Node>> {
    let document = html.tree.root().id();

    html.tree
        .get(id)
        .filter(|n| n.id() == document || n.ancestors().any(|a| a.id() == document))
}

impl Engine for ScraperEngine {
    type Tree = Html;
    type Selector = Selector;
    type Node = NodeId;

    fn parse(&self, html: &[u8], encoding: &'static Encoding) -> Result<Html> {
        if html.len() > self.config.max_document_bytes {
            return Err(DomError::ParseError(format!(
                "document is {} bytes, limit is {}",
                html.len(),
                self.config.max_document_bytes
            )));
        }

        let text = utils::decode_input(html, encoding, self.config.lossy_decoding)?;
        let document = Html::parse_document(&text);

        if !document.errors.is_empty() {
            tracing::trace!("Parsed with {} recoverable errors", document.errors.len());
        }

        Ok(document)
    }

    fn compile_selector(&self, selector: &[u8]) -> Result<Selector> {
        let text = utils::decode_selector(selector)?;
        Selector::parse(text).map_err(|e| DomError::SelectorError(format!("{}: {}", text, e)))
    }

    fn scope_root(&self, tree: &Html, scope: Scope) -> Option<NodeId> {
        resolve_scope(tree, scope).map(|n| n.id())
    }

    fn select(&self, tree: &Html, root: NodeId, scope: Scope, selector: &Selector) -> Vec<NodeId> {
        let Some(root) = attached(tree, root) else {
            return Vec::new();
        };
        let include_root = scope.includes_root();

        root.descendants()
            .filter(|n| include_root || n.id() != root.id())
            .filter(|n| ElementRef::wrap(*n).is_some_and(|element| selector.matches(&element)))
            .map(|n| n.id())
            .collect()
    }

    fn remove(&self, tree: &mut Html, nodes: &[NodeId]) -> Result<usize> {
        let targets: AHashSet<NodeId> = nodes.iter().copied().collect();

        // Document order of the targets still attached to the tree
        let ordered: Vec<NodeId> = tree
            .tree
            .root()
            .descendants()
            .map(|n| n.id())
            .filter(|id| targets.contains(id))
            .collect();

        // Reverse document order: every descendant precedes its ancestor
        for &id in ordered.iter().rev() {
            if let Some(mut node) = tree.tree.get_mut(id) {
                node.detach();
            }
        }

        Ok(ordered.len())
    }

    fn serialize(&self, tree: &Html, root: NodeId, scope: Scope) -> Result<Vec<String>> {
        let Some(root) = attached(tree, root) else {
            return Ok(Vec::new());
        };

        if root.id() == tree.tree.root().id() {
            return Ok(vec![tree.html()]);
        }

        if !scope.includes_root() {
            return Ok(serializer::serialize_children(root));
        }

        serializer::serialize_node(root)
            .map(|markup| vec![markup])
            .ok_or_else(|| DomError::SerializationError(format!("scope {} has no markup", scope)))
    }

    fn serialize_nodes(&self, tree: &Html, nodes: &[NodeId]) -> Result<Vec<String>> {
        nodes
            .iter()
            .map(|&id| {
                tree.tree
                    .get(id)
                    .and_then(serializer::serialize_node)
                    .ok_or_else(|| {
                        DomError::SerializationError(format!("node {:?} is not serializable", id))
                    })
            })
            .collect()
    }

    fn locate(&self, tree: &Html, selector: &Selector) -> Option<Vec<String>> {
        tree.tree
            .root()
            .descendants()
            .filter_map(ElementRef::wrap)
            .find(|element| selector.matches(element))
            .map(|element| serializer::path_labels(*element))
    }
}
