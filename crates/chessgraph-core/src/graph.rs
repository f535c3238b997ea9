//! Nodes and edges collected during exploration.

use shakmaty::Color;

use crate::position_key::PositionKey;
use crate::types::Score;
use crate::util::spinlock::SpinMutex;

/// One explored position, emitted once its subtree is complete.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExplorationNode {
    pub key: PositionKey,
    /// EPD of the position, for labels and links.
    pub epd: String,
    pub side_to_move: Color,
    /// Best score with positive values favoring White, `None` if the oracle
    /// had no data.
    pub display_score: Option<Score>,
    pub is_pv: bool,
    pub show_board: bool,
    pub ply: usize,
    pub tooltip: String,
}

/// An accepted candidate move from one node to another.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExplorationEdge {
    pub from: PositionKey,
    pub to: PositionKey,
    pub uci: String,
    pub san: String,
    /// Side that plays the move.
    pub mover: Color,
    /// Candidate score with positive values favoring White.
    pub score: Score,
    pub is_pv: bool,
    /// The move scored below the best candidate.
    pub is_late: bool,
}

/// The finished exploration.
#[derive(Clone, Debug, Default)]
pub struct Graph {
    pub nodes: Vec<ExplorationNode>,
    pub edges: Vec<ExplorationEdge>,
}

impl Graph {
    pub fn node(&self, key: &PositionKey) -> Option<&ExplorationNode> {
        self.nodes.iter().find(|n| &n.key == key)
    }

    /// Edges leaving `key`, in emission order.
    pub fn edges_from<'a>(&'a self, key: &'a PositionKey) -> impl Iterator<Item = &'a ExplorationEdge> + 'a {
        self.edges.iter().filter(move |e| &e.from == key)
    }

    /// The node at ply 0, if any.
    pub fn root(&self) -> Option<&ExplorationNode> {
        self.nodes.iter().find(|n| n.ply == 0)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Append-only sink shared by all exploration tasks.
#[derive(Default)]
pub struct GraphAccumulator {
    graph: SpinMutex<Graph>,
}

impl GraphAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&self, node: ExplorationNode) {
        self.graph.lock().nodes.push(node);
    }

    pub fn add_edge(&self, edge: ExplorationEdge) {
        self.graph.lock().edges.push(edge);
    }

    /// Appends a node together with its outgoing edges, edges first.
    pub fn add_subtree_root(&self, node: ExplorationNode, edges: Vec<ExplorationEdge>) {
        let mut graph = self.graph.lock();
        graph.edges.extend(edges);
        graph.nodes.push(node);
    }

    /// Returns `(nodes, edges)` added so far.
    pub fn counts(&self) -> (usize, usize) {
        let graph = self.graph.lock();
        (graph.nodes.len(), graph.edges.len())
    }

    /// Moves the collected graph out, leaving the accumulator empty.
    pub fn take(&self) -> Graph {
        std::mem::take(&mut *self.graph.lock())
    }

    pub fn into_graph(self) -> Graph {
        self.graph.into_inner()
    }
}
