//! Exploration options.

use crate::error::ConfigError;
use crate::position_key::KeyMode;
use crate::types::{Depth, MATE_SCORE, MAX_DEPTH, SearchWindow};

/// Options of one exploration run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExploreOptions {
    /// Depth budget of the root.
    pub max_depth: Depth,
    /// Window at the root, from the side to move's perspective.
    pub window: SearchWindow,
    pub key_mode: KeyMode,
    /// Workers per depth pool.
    pub concurrency: usize,
    /// Workers of the oracle pool.
    pub oracle_concurrency: usize,
    /// Accepted edges from which a node shows its full board.
    pub board_threshold: usize,
}

impl Default for ExploreOptions {
    fn default() -> Self {
        ExploreOptions {
            max_depth: 6,
            window: SearchWindow::new(0, 15),
            key_mode: KeyMode::Merged,
            concurrency: num_cpus::get(),
            oracle_concurrency: 4,
            board_threshold: 3,
        }
    }
}

impl ExploreOptions {
    /// Checks the options before any pool is built.
    ///
    /// # Errors
    ///
    /// Returns the first invalid setting found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0..=MAX_DEPTH).contains(&self.max_depth) {
            return Err(ConfigError::InvalidDepth {
                depth: self.max_depth,
                max: MAX_DEPTH,
            });
        }
        if self.window.alpha >= self.window.beta {
            return Err(ConfigError::InvalidWindow {
                alpha: self.window.alpha,
                beta: self.window.beta,
            });
        }
        let bounds = -MATE_SCORE..=MATE_SCORE;
        if !bounds.contains(&self.window.alpha) || !bounds.contains(&self.window.beta) {
            return Err(ConfigError::WindowOutOfRange {
                alpha: self.window.alpha,
                beta: self.window.beta,
                bound: MATE_SCORE,
            });
        }
        if self.concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency { what: "concurrency" });
        }
        if self.oracle_concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency {
                what: "oracle concurrency",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let options = ExploreOptions::default();
        assert_eq!(options.validate(), Ok(()));
        assert!(options.concurrency >= 1);
    }

    #[test]
    fn test_invalid_window() {
        let options = ExploreOptions {
            window: SearchWindow::new(15, 15),
            ..ExploreOptions::default()
        };
        assert_eq!(
            options.validate(),
            Err(ConfigError::InvalidWindow { alpha: 15, beta: 15 })
        );
    }

    #[test]
    fn test_window_beyond_mate_bound() {
        for window in [SearchWindow::new(i32::MIN, 15), SearchWindow::new(0, MATE_SCORE + 1)] {
            let options = ExploreOptions {
                window,
                ..ExploreOptions::default()
            };
            assert!(matches!(options.validate(), Err(ConfigError::WindowOutOfRange { .. })));
        }

        let options = ExploreOptions {
            window: SearchWindow::new(-MATE_SCORE, MATE_SCORE),
            ..ExploreOptions::default()
        };
        assert_eq!(options.validate(), Ok(()));
    }

    #[test]
    fn test_invalid_depth() {
        for depth in [-1, MAX_DEPTH + 1] {
            let options = ExploreOptions {
                max_depth: depth,
                ..ExploreOptions::default()
            };
            assert!(matches!(options.validate(), Err(ConfigError::InvalidDepth { .. })));
        }
    }

    #[test]
    fn test_zero_concurrency() {
        let options = ExploreOptions {
            oracle_concurrency: 0,
            ..ExploreOptions::default()
        };
        assert_eq!(
            options.validate(),
            Err(ConfigError::ZeroConcurrency {
                what: "oracle concurrency"
            })
        );
    }
}
