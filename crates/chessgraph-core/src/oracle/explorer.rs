//! Lichess opening explorer backend.
//!
//! The explorer reports win/draw/loss counts instead of evaluations. Counts are
//! mapped to a centipawn-like score with a logistic model whose scale `β` is
//! calibrated on the start position, so that the usual first-move advantage
//! comes out near +35.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use shakmaty::Color;
use tracing::{debug, info, warn};

use super::{MoveOracle, OracleError, soften};
use crate::position::GamePosition;
use crate::types::{MoveCandidate, Score};

pub const EXPLORER_URL: &str = "https://explorer.lichess.ovh";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(3);

/// Score the start position is calibrated to.
const CALIBRATION_TARGET: f64 = 35.0;

/// Score magnitude of a move with only wins or only losses.
const DECISIVE_SCORE: Score = 10_000;

/// Scale used when calibration is impossible.
pub const DEFAULT_BETA: f64 = 1.0;

/// Game collection queried.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExplorerDatabase {
    #[default]
    Lichess,
    Masters,
}

impl ExplorerDatabase {
    pub fn path(self) -> &'static str {
        match self {
            ExplorerDatabase::Lichess => "lichess",
            ExplorerDatabase::Masters => "masters",
        }
    }
}

impl FromStr for ExplorerDatabase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lichess" => Ok(ExplorerDatabase::Lichess),
            "masters" => Ok(ExplorerDatabase::Masters),
            other => Err(format!("unknown explorer database: {other}")),
        }
    }
}

impl fmt::Display for ExplorerDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Parameters of the explorer backend.
#[derive(Clone, Debug)]
pub struct ExplorerOptions {
    pub base_url: String,
    pub database: ExplorerDatabase,
    /// Candidates with fewer games are dropped.
    pub min_games: u64,
    /// Maximum number of moves requested per position.
    pub max_moves: u32,
    /// Comma separated speed filter, lichess database only.
    pub speeds: Option<String>,
    /// Comma separated rating buckets, lichess database only.
    pub ratings: Option<String>,
}

impl Default for ExplorerOptions {
    fn default() -> Self {
        ExplorerOptions {
            base_url: EXPLORER_URL.to_string(),
            database: ExplorerDatabase::Lichess,
            min_games: 10,
            max_moves: 12,
            speeds: None,
            ratings: None,
        }
    }
}

/// Win/draw/loss counts from the side to move's perspective.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Outcomes {
    pub wins: u64,
    pub draws: u64,
    pub losses: u64,
}

impl Outcomes {
    /// Orients absolute White/Black counts towards `side_to_move`.
    pub fn for_side(white: u64, draws: u64, black: u64, side_to_move: Color) -> Self {
        let (wins, losses) = match side_to_move {
            Color::White => (white, black),
            Color::Black => (black, white),
        };
        Outcomes { wins, draws, losses }
    }

    pub fn total(&self) -> u64 {
        self.wins + self.draws + self.losses
    }

    /// `ln(t / max(w, l) - 1)`, the logit of the dominant result.
    fn log_odds(&self) -> f64 {
        let dominant = self.wins.max(self.losses) as f64;
        (self.total() as f64 / dominant - 1.0).ln()
    }

    /// Maps the counts to a score with logistic scale `beta`.
    pub fn score(&self, beta: f64) -> Score {
        let total = self.total();
        if self.wins == self.losses {
            return 0;
        }
        if self.wins == total {
            return DECISIVE_SCORE;
        }
        if self.losses == total {
            return -DECISIVE_SCORE;
        }

        let magnitude = (100.0 - 100.0 * beta * self.log_odds()).round();
        let magnitude = magnitude.clamp(-f64::from(DECISIVE_SCORE), f64::from(DECISIVE_SCORE)) as Score;
        if self.wins > self.losses { magnitude } else { -magnitude }
    }
}

/// Computes the scale at which `outcomes` score exactly +35.
///
/// Returns `None` if there are no decisive games or the log-odds are not a
/// positive finite number.
pub fn calibrate_beta(outcomes: &Outcomes) -> Option<f64> {
    if outcomes.wins.max(outcomes.losses) == 0 {
        return None;
    }
    let log_odds = outcomes.log_odds();
    if !log_odds.is_finite() || log_odds <= 0.0 {
        return None;
    }
    Some((100.0 - CALIBRATION_TARGET) / (100.0 * log_odds))
}

#[derive(Debug, Deserialize)]
struct ExplorerResponse {
    white: u64,
    draws: u64,
    black: u64,
    #[serde(default)]
    moves: Vec<ExplorerMove>,
}

#[derive(Debug, Deserialize)]
struct ExplorerMove {
    uci: String,
    white: u64,
    draws: u64,
    black: u64,
}

/// Oracle backed by the Lichess opening explorer.
pub struct ExplorerOracle {
    agent: ureq::Agent,
    options: ExplorerOptions,
    beta: f64,
}

impl ExplorerOracle {
    /// Creates an oracle with a fixed scale.
    pub fn with_beta(options: ExplorerOptions, beta: f64) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build();
        ExplorerOracle { agent, options, beta }
    }

    /// Creates an oracle and calibrates its scale on the start position.
    ///
    /// Falls back to [`DEFAULT_BETA`] with a warning if the start position
    /// statistics cannot be fetched or are degenerate.
    pub fn calibrated(options: ExplorerOptions) -> Self {
        let mut oracle = Self::with_beta(options, DEFAULT_BETA);
        let root = GamePosition::default();

        match oracle.fetch(&root) {
            Ok(response) => {
                let outcomes = Outcomes::for_side(response.white, response.draws, response.black, Color::White);
                match calibrate_beta(&outcomes) {
                    Some(beta) => {
                        info!(beta, games = outcomes.total(), "calibrated explorer scores");
                        oracle.beta = beta;
                    }
                    None => warn!(?outcomes, "start position statistics are degenerate, using default scale"),
                }
            }
            Err(err) => warn!(error = %err, "explorer calibration failed, using default scale"),
        }
        oracle
    }

    pub fn beta(&self) -> f64 {
        self.beta
    }

    fn fetch(&self, position: &GamePosition) -> Result<ExplorerResponse, OracleError> {
        let url = format!("{}/{}", self.options.base_url.trim_end_matches('/'), self.options.database.path());
        let fen = position.fen();
        let moves = self.options.max_moves.to_string();
        debug!(%url, %fen, "explorer query");

        let mut request = self.agent.get(&url).query("fen", &fen).query("moves", &moves);
        if self.options.database == ExplorerDatabase::Lichess {
            if let Some(speeds) = &self.options.speeds {
                request = request.query("speeds", speeds);
            }
            if let Some(ratings) = &self.options.ratings {
                request = request.query("ratings", ratings);
            }
        }

        let body = request
            .call()
            .map_err(|err| OracleError::Http(err.to_string()))?
            .into_string()?;
        serde_json::from_str(&body).map_err(|err| OracleError::Payload(err.to_string()))
    }

    /// Converts an explorer answer into candidates for `side_to_move`.
    fn candidates(&self, response: ExplorerResponse, side_to_move: Color) -> Vec<MoveCandidate> {
        response
            .moves
            .into_iter()
            .filter_map(|m| {
                let outcomes = Outcomes::for_side(m.white, m.draws, m.black, side_to_move);
                if outcomes.total() < self.options.min_games {
                    return None;
                }
                Some(MoveCandidate::new(m.uci, outcomes.score(self.beta)))
            })
            .collect()
    }
}

impl MoveOracle for ExplorerOracle {
    fn name(&self) -> &str {
        "explorer"
    }

    fn cache_params(&self) -> String {
        format!(
            "explorer:{}:min_games={}:beta={:.4}",
            self.options.database, self.options.min_games, self.beta
        )
    }

    fn get_moves(&self, position: &GamePosition) -> Vec<MoveCandidate> {
        let result = self
            .fetch(position)
            .map(|response| self.candidates(response, position.side_to_move()));
        soften(self.name(), position, result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn outcomes(wins: u64, draws: u64, losses: u64) -> Outcomes {
        Outcomes { wins, draws, losses }
    }

    #[test_case(5, 0, 5, 0; "balanced")]
    #[test_case(7, 0, 0, 10_000; "only wins")]
    #[test_case(0, 0, 7, -10_000; "only losses")]
    #[test_case(0, 9, 0, 0; "only draws")]
    fn test_score_special_cases(w: u64, d: u64, l: u64, expected: Score) {
        assert_eq!(outcomes(w, d, l).score(1.0), expected);
    }

    #[test]
    fn test_score_sign_follows_majority() {
        let good = outcomes(60, 10, 30).score(1.0);
        let bad = outcomes(30, 10, 60).score(1.0);
        assert!(good > 0);
        assert_eq!(good, -bad);
    }

    #[test]
    fn test_calibration_hits_target() {
        let start = outcomes(480, 100, 420);
        let beta = calibrate_beta(&start).unwrap();
        assert_eq!(start.score(beta), 35);
    }

    #[test]
    fn test_calibration_degenerate() {
        assert_eq!(calibrate_beta(&outcomes(0, 10, 0)), None);
        // w dominates so strongly that the log-odds are negative.
        assert_eq!(calibrate_beta(&outcomes(90, 0, 10)), None);
    }

    #[test]
    fn test_outcomes_for_black() {
        let o = Outcomes::for_side(10, 3, 20, Color::Black);
        assert_eq!(o, outcomes(20, 3, 10));
    }

    #[test]
    fn test_candidates_filter_and_orient() {
        let oracle = ExplorerOracle::with_beta(ExplorerOptions::default(), 1.0);
        let response: ExplorerResponse = serde_json::from_str(
            r#"{"white":100,"draws":20,"black":80,"moves":[
                {"uci":"e7e5","san":"e5","white":40,"draws":10,"black":50,"averageRating":2000},
                {"uci":"c7c5","san":"c5","white":50,"draws":10,"black":40,"averageRating":2000},
                {"uci":"a7a6","san":"a6","white":2,"draws":1,"black":1,"averageRating":1500}
            ]}"#,
        )
        .unwrap();

        let candidates = oracle.candidates(response, Color::Black);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].uci, "e7e5");
        assert!(candidates[0].score > 0);
        assert!(candidates[1].score < 0);
    }

    #[test]
    fn test_cache_params() {
        let oracle = ExplorerOracle::with_beta(ExplorerOptions::default(), 0.123456);
        assert_eq!(oracle.cache_params(), "explorer:lichess:min_games=10:beta=0.1235");
    }

    #[test]
    fn test_database_parse() {
        assert_eq!("Masters".parse::<ExplorerDatabase>(), Ok(ExplorerDatabase::Masters));
        assert!("fide".parse::<ExplorerDatabase>().is_err());
    }
}
