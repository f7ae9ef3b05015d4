//! Term Protocol Types
//!
//! Requests and responses are tagged tuples of atoms and binaries. On the
//! stream each term is one line of externally tagged JSON:
//!
//! ```json
//! {"tuple":[{"atom":"remove"},{"binary":"PHA+YTwvcD4="},{"binary":"cA=="},{"atom":"body"}]}
//! ```
//!
//! Binaries travel base64 encoded and always carry their exact length, so
//! embedded NUL bytes survive untouched.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Term {
    Atom(String),
    Binary(#[serde(with = "base64_binary")] Vec<u8>),
    Tuple(Vec<Term>),
}

impl Term {
    pub fn atom(name: impl Into<String>) -> Self {
        Term::Atom(name.into())
    }

    pub fn binary(bytes: impl Into<Vec<u8>>) -> Self {
        Term::Binary(bytes.into())
    }

    pub fn tuple(items: impl IntoIterator<Item = Term>) -> Self {
        Term::Tuple(items.into_iter().collect())
    }

    /// Bytes of an atom or binary, used for name-like fields
    pub fn into_name(self) -> Option<Vec<u8>> {
        match self {
            Term::Atom(name) => Some(name.into_bytes()),
            Term::Binary(bytes) => Some(bytes),
            Term::Tuple(_) => None,
        }
    }
}

/// Compact rendering for logs: binaries show their size, not their content
impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Atom(name) => f.write_str(name),
            Term::Binary(bytes) => write!(f, "<<{} bytes>>", bytes.len()),
            Term::Tuple(items) => {
                f.write_str("{")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("}")
            }
        }
    }
}

mod base64_binary {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD
            .decode(text.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
