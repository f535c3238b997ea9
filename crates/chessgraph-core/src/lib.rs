//! Opening exploration graphs.
//!
//! Starting from a position, the [`Explorer`] asks a [`MoveOracle`] for scored
//! candidate moves and follows the promising ones, spending less depth on
//! worse alternatives. The result is a [`Graph`] of positions and moves that
//! [`render`] turns into Graphviz output.

pub mod cache;
pub mod error;
pub mod explore;
pub mod graph;
pub mod options;
pub mod oracle;
pub mod pools;
pub mod position;
pub mod position_key;
pub mod render;
pub mod types;
pub mod util;
pub mod visited;

pub use cache::{CacheKey, OracleCache};
pub use error::{CacheError, ChessGraphError, ConfigError, RenderError, Result};
pub use explore::{Exploration, ExploreProgress, ExploreProgressCallback, ExploreStats, Explorer};
pub use graph::{ExplorationEdge, ExplorationNode, Graph, GraphAccumulator};
pub use options::ExploreOptions;
pub use oracle::{CachedOracle, MoveOracle, OracleConfig};
pub use position::{GamePosition, Terminal};
pub use position_key::{KeyMode, PositionKey};
pub use render::OutputFormat;
pub use types::{MoveCandidate, Score, SearchWindow};
pub use visited::VisitedSet;
