//! Query Service - Main entry point for query pipelines
//!
//! Each query kind is a fixed sequence of workspace calls, run to completion
//! or to the first failure. A fresh workspace is created per query and is
//! destroyed before the result leaves this module, whichever branch was taken.
//!
//! This handles:
//! - Position: locate the first match and describe its path
//! - Remove: delete matches, serialize what is left
//! - Find: serialize every match
//! - Serialize: normalize a scope of the document

use crate::engine::Engine;
use crate::error::Result;
use crate::types::{Query, Scope};
use crate::workspace::Workspace;
use encoding_rs::{Encoding, UTF_8};

/// Runs query pipelines against a shared engine
pub struct QueryService<E: Engine> {
    engine: E,
    encoding: &'static Encoding,
}

impl<E: Engine> QueryService<E> {
    /// Create service decoding documents as UTF-8
    pub fn new(engine: E) -> Self {
        Self::with_encoding(engine, UTF_8)
    }

    /// Create service decoding documents with `encoding`
    pub fn with_encoding(engine: E, encoding: &'static Encoding) -> Self {
        Self { engine, encoding }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn encoding(&self) -> &'static Encoding {
        self.encoding
    }

    /// Run `pipeline` in a new workspace, destroying it afterwards
    fn with_workspace<T>(
        &self,
        kind: &'static str,
        pipeline: impl FnOnce(&mut Workspace<'_, E>) -> Result<T>,
    ) -> Result<T> {
        let mut workspace = Workspace::new(&self.engine);
        let result = pipeline(&mut workspace);
        workspace.destroy();

        if let Err(e) = &result {
            if e.is_internal() {
                tracing::error!(kind = kind, "Pipeline composition fault: {}", e);
            } else {
                tracing::debug!(kind = kind, "Query failed: {}", e);
            }
        }

        result
    }

    /// Dispatch on query kind
    pub fn run(&self, query: &Query) -> Result<String> {
        match query {
            Query::Position {
                html,
                selector,
                delimiter,
            } => self.position(html, selector, delimiter),
            Query::Remove {
                html,
                selector,
                scope,
            } => self.remove(html, selector, scope),
            Query::Find {
                html,
                selector,
                delimiter,
            } => self.find(html, selector, delimiter),
            Query::Serialize { html, scope } => self.serialize(html, scope),
        }
    }

    /// Path of the first node matching `selector`, labels joined by
    /// `delimiter`. No match is an empty string.
    pub fn position(&self, html: &[u8], selector: &[u8], delimiter: &[u8]) -> Result<String> {
        let delimiter = String::from_utf8_lossy(delimiter);

        self.with_workspace("position", |ws| {
            let selector = ws.allocate_selector(selector)?;
            let tree = ws.allocate_tree(html, self.encoding)?;

            Ok(ws
                .locate(tree, selector)?
                .map(|labels| labels.join(delimiter.as_ref()))
                .unwrap_or_default())
        })
    }

    /// Serialization of `scope` after deleting every node matching
    /// `selector` inside it. Matching nothing is a failure.
    pub fn remove(&self, html: &[u8], selector: &[u8], scope: &[u8]) -> Result<String> {
        self.with_workspace("remove", |ws| {
            let tree = ws.allocate_tree(html, self.encoding)?;
            let selector = ws.allocate_selector(selector)?;
            let scope = Scope::from_bytes(scope)?;
            let collection = ws.allocate_collection(tree, scope, selector)?;

            ws.remove(collection)?;

            let buffer = ws.serialize(tree, scope)?;
            ws.join(buffer, "")
        })
    }

    /// Outer markup of every node matching `selector`, joined by `delimiter`
    pub fn find(&self, html: &[u8], selector: &[u8], delimiter: &[u8]) -> Result<String> {
        let delimiter = String::from_utf8_lossy(delimiter);

        self.with_workspace("find", |ws| {
            let tree = ws.allocate_tree(html, self.encoding)?;
            let selector = ws.allocate_selector(selector)?;
            let collection = ws.allocate_collection(tree, Scope::Document, selector)?;
            let buffer = ws.serialize_collection(collection)?;
            ws.join(buffer, &delimiter)
        })
    }

    /// Normalized markup of `scope`
    pub fn serialize(&self, html: &[u8], scope: &[u8]) -> Result<String> {
        self.with_workspace("serialize", |ws| {
            let tree = ws.allocate_tree(html, self.encoding)?;
            let scope = Scope::from_bytes(scope)?;
            let buffer = ws.serialize(tree, scope)?;
            ws.join(buffer, "")
        })
    }
}

impl<E: Engine + Default> Default for QueryService<E> {
    fn default() -> Self {
        Self::new(E::default())
    }
}
