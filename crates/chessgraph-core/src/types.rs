//! Basic types shared by the exploration engine and the oracles.

use serde::{Deserialize, Serialize};
use shakmaty::Color;

/// Centipawn-like score from the perspective of the side to move.
pub type Score = i32;

/// Remaining depth budget of an exploration call. May become negative for
/// children that are drawn but not explored.
pub type Depth = i32;

/// Score of a checkmated side to move. Mate scores saturate at this bound.
pub const MATE_SCORE: Score = 30_000;

/// Score of a drawn or equal position.
pub const DRAW_SCORE: Score = 0;

/// Upper limit for the depth budget accepted by the options.
pub const MAX_DEPTH: Depth = 64;

/// A move proposed by an oracle together with its score.
///
/// The move is kept in UCI notation so that candidates can be persisted and
/// compared without a position at hand.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MoveCandidate {
    pub uci: String,
    pub score: Score,
}

impl MoveCandidate {
    pub fn new(uci: impl Into<String>, score: Score) -> Self {
        MoveCandidate {
            uci: uci.into(),
            score,
        }
    }
}

/// Negamax pruning window, always from the side to move at the current node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SearchWindow {
    pub alpha: Score,
    pub beta: Score,
}

impl SearchWindow {
    pub const fn new(alpha: Score, beta: Score) -> Self {
        SearchWindow { alpha, beta }
    }

    /// Returns the window seen by the opponent after one move.
    #[inline]
    pub const fn flip(self) -> Self {
        SearchWindow {
            alpha: self.beta.saturating_neg(),
            beta: self.alpha.saturating_neg(),
        }
    }

    /// Returns true if a candidate with this score passes the alpha bound.
    #[inline]
    pub const fn accepts(self, score: Score) -> bool {
        score > self.alpha
    }
}

/// Converts a side-to-move score into the display convention, where positive
/// values favor White.
///
/// Applying the orientation twice with the same side yields the input again.
#[inline]
pub fn orient(score: Score, side_to_move: Color) -> Score {
    match side_to_move {
        Color::White => score,
        Color::Black => -score,
    }
}

/// Sorts candidates by score, best first. Ties keep the oracle's order.
pub fn sort_candidates(candidates: &mut [MoveCandidate]) {
    candidates.sort_by(|a, b| b.score.cmp(&a.score));
}

/// Returns the prefix of `sorted` whose scores pass the window's alpha bound.
pub fn accepted_prefix(sorted: &[MoveCandidate], window: SearchWindow) -> &[MoveCandidate] {
    let end = sorted
        .iter()
        .position(|c| !window.accepts(c.score))
        .unwrap_or(sorted.len());
    &sorted[..end]
}

/// Depth budget of a child reached through the candidate of rank `rank`
/// (1-based).
///
/// Moves tied with the best score lose one ply. Alternatives lose
/// `floor(1.5 + log2(rank))` plies.
#[inline]
pub fn child_depth(depth: Depth, rank: usize, tied_with_best: bool) -> Depth {
    if tied_with_best {
        return depth - 1;
    }

    debug_assert!(rank >= 1);
    let reduction = (1.5 + (rank.max(1) as f64).log2()).floor() as Depth;
    depth - reduction
}
