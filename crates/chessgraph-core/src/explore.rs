//! The exploration engine.
//!
//! Exploration is a negamax-style walk over oracle candidates. At every node
//! the candidates are sorted best first and followed while they beat alpha.
//! The best line loses one ply of budget per move, alternatives lose more the
//! further down they rank, so the graph stays narrow but still shows the
//! strongest alternatives near the main line.
//!
//! Children run concurrently on the [`PoolHierarchy`]. A node waits for all of
//! its children before emitting itself, so in the output a node always follows
//! the nodes below it.

use std::fmt::Write as _;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use tracing::{debug, info, trace, warn};

use crate::error::ConfigError;
use crate::graph::{ExplorationEdge, ExplorationNode, Graph, GraphAccumulator};
use crate::oracle::CachedOracle;
use crate::options::ExploreOptions;
use crate::pools::PoolHierarchy;
use crate::position::{GamePosition, Terminal};
use crate::position_key::PositionKey;
use crate::types::{
    DRAW_SCORE, Depth, MATE_SCORE, MoveCandidate, Score, SearchWindow, accepted_prefix, child_depth, orient,
    sort_candidates,
};
use crate::visited::VisitedSet;

/// Progress information, reported after every emitted node.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExploreProgress {
    pub nodes: u64,
    pub edges: u64,
    pub oracle_calls: u64,
}

/// Type alias for the exploration progress callback.
pub type ExploreProgressCallback = dyn Fn(ExploreProgress) + Send + Sync + 'static;

/// Statistics of a finished run.
#[derive(Clone, Debug, Default)]
pub struct ExploreStats {
    pub nodes: u64,
    pub edges: u64,
    /// Queries that reached the oracle backend.
    pub oracle_calls: u64,
    pub cache_hits: u64,
    /// Branches that found their position already claimed.
    pub duplicate_claims: u64,
    /// Child tasks that panicked. Their subtrees are missing from the graph.
    pub failed_tasks: u64,
    pub elapsed: Duration,
}

/// Result of [`Explorer::explore`].
#[derive(Debug)]
pub struct Exploration {
    pub root_key: PositionKey,
    pub graph: Graph,
    pub stats: ExploreStats,
}

/// Why a node has no accepted edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LeafReason {
    Terminal(Terminal),
    NoData,
    BelowAlpha,
    NoLegalCandidate,
}

impl LeafReason {
    fn describe(self) -> &'static str {
        match self {
            LeafReason::Terminal(terminal) => terminal.describe(),
            LeafReason::NoData => "no oracle data",
            LeafReason::BelowAlpha => "all moves below alpha",
            LeafReason::NoLegalCandidate => "no legal oracle move",
        }
    }
}

/// Concurrent, depth-adaptive explorer.
pub struct Explorer {
    options: ExploreOptions,
    pools: Arc<PoolHierarchy>,
    oracle: Arc<CachedOracle>,
    callback: Option<Arc<ExploreProgressCallback>>,
}

impl Explorer {
    /// Creates an explorer and starts its worker pools.
    ///
    /// # Arguments
    ///
    /// * `options` - Depth, window, key mode and pool sizes
    /// * `oracle` - The cached oracle consulted for every non-terminal node
    ///
    /// # Errors
    ///
    /// Returns an error if the options are invalid or the pools cannot be
    /// started.
    pub fn new(options: ExploreOptions, oracle: CachedOracle) -> Result<Self, ConfigError> {
        options.validate()?;
        let pools = PoolHierarchy::new(options.max_depth, options.concurrency, options.oracle_concurrency)?;
        Ok(Explorer {
            options,
            pools: Arc::new(pools),
            oracle: Arc::new(oracle),
            callback: None,
        })
    }

    /// Installs a callback invoked after every emitted node.
    pub fn with_progress(mut self, callback: Arc<ExploreProgressCallback>) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn options(&self) -> &ExploreOptions {
        &self.options
    }

    pub fn oracle(&self) -> &CachedOracle {
        &self.oracle
    }

    /// Explores from `root` until every branch has run out of budget or
    /// candidates, and returns the accumulated graph.
    ///
    /// Each call starts with an empty visited set; the oracle cache is shared
    /// between calls.
    pub fn explore(&self, root: GamePosition) -> Exploration {
        let start = Instant::now();
        let calls_before = self.oracle.live_calls();
        let hits_before = self.oracle.cache().hits();

        let root_key = self.options.key_mode.key(&root);
        info!(
            root = %root,
            depth = self.options.max_depth,
            alpha = self.options.window.alpha,
            beta = self.options.window.beta,
            key_mode = %self.options.key_mode,
            oracle = self.oracle.name(),
            "starting exploration"
        );

        let run = Arc::new(Run {
            options: self.options.clone(),
            pools: Arc::clone(&self.pools),
            oracle: Arc::clone(&self.oracle),
            callback: self.callback.clone(),
            visited: VisitedSet::new(),
            graph: GraphAccumulator::new(),
            oracle_calls_before: calls_before,
            nodes: AtomicU64::new(0),
            edges: AtomicU64::new(0),
            failed_tasks: AtomicU64::new(0),
        });

        run.explore_node(root, self.options.max_depth, self.options.window, true);

        let stats = ExploreStats {
            nodes: run.nodes.load(Ordering::Relaxed),
            edges: run.edges.load(Ordering::Relaxed),
            oracle_calls: self.oracle.live_calls() - calls_before,
            cache_hits: self.oracle.cache().hits() - hits_before,
            duplicate_claims: run.visited.rejected_claims(),
            failed_tasks: run.failed_tasks.load(Ordering::Relaxed),
            elapsed: start.elapsed(),
        };
        info!(
            nodes = stats.nodes,
            edges = stats.edges,
            oracle_calls = stats.oracle_calls,
            elapsed_ms = stats.elapsed.as_millis() as u64,
            "exploration finished"
        );

        Exploration {
            root_key,
            graph: run.graph.take(),
            stats,
        }
    }
}

/// State of one `explore` call, shared by all of its tasks.
struct Run {
    options: ExploreOptions,
    pools: Arc<PoolHierarchy>,
    oracle: Arc<CachedOracle>,
    callback: Option<Arc<ExploreProgressCallback>>,
    visited: VisitedSet,
    graph: GraphAccumulator,
    oracle_calls_before: u64,
    nodes: AtomicU64,
    edges: AtomicU64,
    failed_tasks: AtomicU64,
}

impl Run {
    fn explore_node(self: &Arc<Self>, position: GamePosition, depth: Depth, window: SearchWindow, is_pv: bool) {
        let key = self.options.key_mode.key(&position);
        if !self.visited.claim(&key) {
            trace!(%key, "already claimed");
            return;
        }

        let (candidates, best, terminal) = self.evaluate(&position);
        let accepted = accepted_prefix(&candidates, window);
        let mover = position.side_to_move();

        let (tx, rx) = mpsc::channel();
        let mut submitted = 0;
        let mut edges = Vec::with_capacity(accepted.len());

        // 1-based rank among the accepted legal candidates.
        let mut rank = 0;
        for candidate in accepted {
            let Some(mv) = position.parse_uci(&candidate.uci) else {
                warn!(position = %position, uci = %candidate.uci, "oracle proposed an illegal move");
                continue;
            };
            rank += 1;

            let san = position.san(mv);
            let child = position.play(mv);
            let child_key = self.options.key_mode.key(&child);
            let tied = Some(candidate.score) == best;
            let edge_is_pv = is_pv && tied;
            let budget = child_depth(depth, rank, tied);

            if budget >= 0 && !self.visited.contains(&child_key) {
                submitted += 1;
                let tx = tx.clone();
                let run = Arc::clone(self);
                let child_window = window.flip();
                self.pools.spawn_at(depth, move || {
                    run.explore_node(child, budget, child_window, edge_is_pv);
                    drop(run);
                    let _ = tx.send(());
                });
            }

            edges.push(ExplorationEdge {
                from: key.clone(),
                to: child_key,
                uci: candidate.uci.clone(),
                san,
                mover,
                score: orient(candidate.score, mover),
                is_pv: edge_is_pv,
                is_late: !tied,
            });
        }

        drop(tx);
        let completed = rx.iter().count();
        if completed < submitted {
            let failed = (submitted - completed) as u64;
            self.failed_tasks.fetch_add(failed, Ordering::Relaxed);
            warn!(position = %position, failed, "child explorations panicked");
        }

        let leaf_reason = if !edges.is_empty() {
            None
        } else if let Some(terminal) = terminal {
            Some(LeafReason::Terminal(terminal))
        } else if candidates.is_empty() {
            Some(LeafReason::NoData)
        } else if accepted.is_empty() {
            Some(LeafReason::BelowAlpha)
        } else {
            Some(LeafReason::NoLegalCandidate)
        };

        let ply = position.ply();
        let n_edges = edges.len();
        let node = ExplorationNode {
            key,
            epd: position.epd(),
            side_to_move: mover,
            display_score: best.map(|score| orient(score, mover)),
            is_pv,
            show_board: n_edges >= self.options.board_threshold || (is_pv && n_edges == 0) || ply == 0,
            ply,
            tooltip: tooltip(&position, &edges, leaf_reason),
        };
        debug!(position = %position, depth, edges = n_edges, score = ?node.display_score, "node complete");

        self.graph.add_subtree_root(node, edges);
        self.report(n_edges as u64);
    }

    /// Returns the sorted candidates, the best score and the terminal state.
    ///
    /// Terminal positions are scored by the rules without asking the oracle.
    fn evaluate(&self, position: &GamePosition) -> (Vec<MoveCandidate>, Option<Score>, Option<Terminal>) {
        match position.terminal() {
            Some(Terminal::Checkmate) => (Vec::new(), Some(-MATE_SCORE), Some(Terminal::Checkmate)),
            Some(draw) => (Vec::new(), Some(DRAW_SCORE), Some(draw)),
            None => {
                let oracle = Arc::clone(&self.oracle);
                let query = position.clone();
                let mut candidates = self
                    .pools
                    .run_oracle(move || oracle.get_moves(&query))
                    .unwrap_or_default();
                sort_candidates(&mut candidates);
                let best = candidates.first().map(|c| c.score);
                (candidates, best, None)
            }
        }
    }

    fn report(&self, new_edges: u64) {
        let nodes = self.nodes.fetch_add(1, Ordering::Relaxed) + 1;
        let edges = self.edges.fetch_add(new_edges, Ordering::Relaxed) + new_edges;
        if let Some(callback) = &self.callback {
            callback(ExploreProgress {
                nodes,
                edges,
                oracle_calls: self.oracle.live_calls() - self.oracle_calls_before,
            });
        }
    }
}

/// Builds the hover text of a node.
fn tooltip(position: &GamePosition, edges: &[ExplorationEdge], leaf_reason: Option<LeafReason>) -> String {
    let mut text = position.epd();
    for edge in edges {
        let _ = write!(text, "\n{} {:+}", edge.san, edge.score);
    }

    let hidden = position.legal_move_count().saturating_sub(edges.len());
    if hidden > 0 {
        let _ = write!(text, "\n{hidden} more legal moves not shown");
    }
    if let Some(reason) = leaf_reason {
        let _ = write!(text, "\n{}", reason.describe());
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::OracleCache;
    use crate::oracle::MoveOracle;

    struct Fixed(Vec<MoveCandidate>);

    impl MoveOracle for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn cache_params(&self) -> String {
            "fixed".to_string()
        }

        fn get_moves(&self, position: &GamePosition) -> Vec<MoveCandidate> {
            if position.ply() == 0 { self.0.clone() } else { Vec::new() }
        }
    }

    fn fixed_explorer(candidates: Vec<MoveCandidate>, max_depth: Depth) -> Explorer {
        let oracle = CachedOracle::new(Box::new(Fixed(candidates)), Arc::new(OracleCache::new()));
        let options = ExploreOptions {
            max_depth,
            concurrency: 2,
            oracle_concurrency: 1,
            ..ExploreOptions::default()
        };
        Explorer::new(options, oracle).unwrap()
    }

    #[test]
    fn test_illegal_candidates_do_not_take_a_rank() {
        let explorer = fixed_explorer(
            vec![
                MoveCandidate::new("e2e5", 40),
                MoveCandidate::new("e2e4", 30),
                MoveCandidate::new("d2d4", 25),
            ],
            1,
        );
        let result = explorer.explore(GamePosition::default());

        let root = result.graph.root().unwrap();
        assert_eq!(root.display_score, Some(40));
        let edges: Vec<_> = result.graph.edges_from(&result.root_key).collect();
        assert_eq!(edges.len(), 2);
        // No candidate ties with the illegal best, so rank 1 gets one ply less.
        assert!(edges.iter().all(|e| e.is_late && !e.is_pv));
        // e2e4 is rank 1 with budget 0 and is explored; d2d4 is rank 2 with
        // budget -1.
        assert_eq!(result.stats.nodes, 2);
    }

    #[test]
    fn test_tooltip_lists_moves_and_hidden_count() {
        let explorer = fixed_explorer(vec![MoveCandidate::new("e2e4", 30)], 0);
        let result = explorer.explore(GamePosition::default());
        let root = result.graph.root().unwrap();

        assert!(root.tooltip.contains("\ne4 +30"));
        assert!(root.tooltip.contains("19 more legal moves not shown"));
    }

    #[test]
    fn test_leaf_reasons() {
        let explorer = fixed_explorer(vec![MoveCandidate::new("e2e4", -5)], 0);
        let root = explorer.explore(GamePosition::default()).graph.root().cloned().unwrap();
        assert!(root.tooltip.ends_with("all moves below alpha"));
        assert_eq!(root.display_score, Some(-5));

        let explorer = fixed_explorer(Vec::new(), 0);
        let root = explorer.explore(GamePosition::default()).graph.root().cloned().unwrap();
        assert!(root.tooltip.ends_with("no oracle data"));
        assert_eq!(root.display_score, None);
    }
}
