//! Node identity used for deduplication.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::position::GamePosition;

/// How positions are mapped to graph nodes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum KeyMode {
    /// One node per position: transpositions collapse and the output is a
    /// graph.
    #[default]
    Merged,
    /// One node per move sequence: the output is a tree.
    Path,
}

impl KeyMode {
    /// Computes the key of `pos` under this mode.
    pub fn key(self, pos: &GamePosition) -> PositionKey {
        match self {
            KeyMode::Merged => PositionKey::new(pos.epd()),
            KeyMode::Path => {
                let mut key = String::from(pos.root_epd());
                if !pos.path().is_empty() {
                    key.push_str(" moves ");
                    key.push_str(&pos.path().join(" "));
                }
                PositionKey::new(key)
            }
        }
    }
}

impl FromStr for KeyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "merged" => Ok(KeyMode::Merged),
            "path" => Ok(KeyMode::Path),
            other => Err(format!("unknown key mode: {other}")),
        }
    }
}

impl fmt::Display for KeyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyMode::Merged => f.write_str("merged"),
            KeyMode::Path => f.write_str("path"),
        }
    }
}

/// Opaque node identity. Only ever compared for equality and hashed.
///
/// Cheap to clone: keys are shared between the visited set, edges and nodes.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PositionKey(Arc<str>);

impl PositionKey {
    pub fn new(key: impl Into<Arc<str>>) -> Self {
        PositionKey(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PositionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PositionKey {
    fn from(s: &str) -> Self {
        PositionKey::new(s)
    }
}
