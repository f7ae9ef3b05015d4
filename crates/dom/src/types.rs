//! Core type definitions shared by the engine, the workspace and the pipelines
//!
//! Key design principles:
//! 1. Handles are typed: a tree handle cannot be passed where a buffer is expected
//! 2. Handles are small `Copy` values (workspace id + slot index)
//! 3. Scopes are a closed enum; unknown names never silently widen to the document

use crate::arena::{Slot, WorkspaceId};
use crate::error::{DomError, Result};
use std::fmt;
use std::str::FromStr;

macro_rules! define_handle {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(pub(crate) Slot);

        impl $name {
            /// Workspace that minted this handle
            pub fn workspace(&self) -> WorkspaceId {
                self.0.workspace()
            }

            /// Slot index within its table
            pub fn index(&self) -> u32 {
                self.0.index()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}#{}@ws{}", $label, self.0.index(), self.0.workspace())
            }
        }
    };
}

define_handle!(
    /// Parsed document tree
    TreeHandle,
    "tree"
);
define_handle!(
    /// Compiled selector
    SelectorHandle,
    "selector"
);
define_handle!(
    /// Nodes matched in one tree
    CollectionHandle,
    "collection"
);
define_handle!(
    /// Serialized markup fragments
    BufferHandle,
    "buffer"
);

/// Region of a tree a selector is evaluated in, and serialized from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Whole tree, doctype included
    Document,
    /// Root `<html>` element
    Html,
    Head,
    Body,
    /// Every child of `<body>`, body itself excluded
    BodyChildren,
    /// First element child of `<body>`
    BodyFirstChild,
}

impl Scope {
    pub const ALL: [Scope; 6] = [
        Scope::Document,
        Scope::Html,
        Scope::Head,
        Scope::Body,
        Scope::BodyChildren,
        Scope::BodyFirstChild,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Scope::Document => "document",
            Scope::Html => "html",
            Scope::Head => "head",
            Scope::Body => "body",
            Scope::BodyChildren => "body_children",
            Scope::BodyFirstChild => "body_first_child",
        }
    }

    /// Whether the scope root itself takes part in matching and is
    /// serialized as one fragment. `body_children` is the only scope that
    /// stands for the root's children instead.
    pub fn includes_root(&self) -> bool {
        !matches!(self, Scope::BodyChildren)
    }

    /// Resolve a scope token received as raw bytes
    pub fn from_bytes(name: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(name)
            .map_err(|_| DomError::InvalidScope(String::from_utf8_lossy(name).into_owned()))?;
        text.parse()
    }
}

impl FromStr for Scope {
    type Err = DomError;

    fn from_str(name: &str) -> Result<Self> {
        Scope::ALL
            .iter()
            .copied()
            .find(|scope| scope.name() == name)
            .ok_or_else(|| DomError::InvalidScope(name.to_string()))
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Live entries per workspace table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceCounts {
    pub trees: usize,
    pub selectors: usize,
    pub collections: usize,
    pub buffers: usize,
}

impl ResourceCounts {
    pub fn total(&self) -> usize {
        self.trees + self.selectors + self.collections + self.buffers
    }
}

/// One unit of work. Byte fields are length-delimited payloads as received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    /// Path of the first match, labels joined by `delimiter`
    Position {
        html: Vec<u8>,
        selector: Vec<u8>,
        delimiter: Vec<u8>,
    },
    /// Serialization of `scope` after deleting every match inside it
    Remove {
        html: Vec<u8>,
        selector: Vec<u8>,
        scope: Vec<u8>,
    },
    /// Outer markup of every match, joined by `delimiter`
    Find {
        html: Vec<u8>,
        selector: Vec<u8>,
        delimiter: Vec<u8>,
    },
    /// Normalized serialization of `scope`
    Serialize { html: Vec<u8>, scope: Vec<u8> },
}

impl Query {
    /// Tag used on the wire for this kind
    pub fn kind(&self) -> &'static str {
        match self {
            Query::Position { .. } => "position",
            Query::Remove { .. } => "remove",
            Query::Find { .. } => "find",
            Query::Serialize { .. } => "serialize",
        }
    }
}
