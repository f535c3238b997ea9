//! chessdb.cn position database backend.

use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use super::{MoveOracle, OracleError, soften};
use crate::position::GamePosition;
use crate::types::{MATE_SCORE, MoveCandidate, Score};

/// Query endpoint of the public database.
pub const CHESSDB_URL: &str = "http://www.chessdb.cn/cdb.php";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(3);

/// Statuses meaning "no data right now" rather than a failure.
const ROUTINE_STATUSES: [&str; 2] = ["unknown", "rate limited exceeded"];

#[derive(Debug, Deserialize)]
struct QueryAllResponse {
    status: String,
    #[serde(default)]
    moves: Vec<ChessDbMove>,
}

#[derive(Debug, Deserialize)]
struct ChessDbMove {
    uci: String,
    /// Usually an integer; unscored moves carry a placeholder string.
    score: serde_json::Value,
}

/// Oracle backed by the chessdb `queryall` endpoint.
pub struct ChessDbOracle {
    agent: ureq::Agent,
    url: String,
}

impl Default for ChessDbOracle {
    fn default() -> Self {
        Self::new()
    }
}

impl ChessDbOracle {
    pub fn new() -> Self {
        Self::with_url(CHESSDB_URL)
    }

    /// Creates an oracle querying a different endpoint with the same protocol.
    pub fn with_url(url: impl Into<String>) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build();
        ChessDbOracle {
            agent,
            url: url.into(),
        }
    }

    fn query(&self, position: &GamePosition) -> Result<Vec<MoveCandidate>, OracleError> {
        let epd = position.epd();
        debug!(board = %epd, "chessdb queryall");

        let body = self
            .agent
            .get(&self.url)
            .query("action", "queryall")
            .query("board", &epd)
            .query("json", "1")
            .call()
            .map_err(|err| OracleError::Http(err.to_string()))?
            .into_string()?;

        parse_response(&body)
    }
}

impl MoveOracle for ChessDbOracle {
    fn name(&self) -> &str {
        "chessdb"
    }

    fn cache_params(&self) -> String {
        "chessdb".to_string()
    }

    fn get_moves(&self, position: &GamePosition) -> Vec<MoveCandidate> {
        soften(self.name(), position, self.query(position))
    }
}

/// Parses a `queryall` JSON answer.
///
/// Moves without a numeric score are skipped. Scores are clamped below the
/// mate bound. Unknown positions and rate limiting yield an empty list.
fn parse_response(body: &str) -> Result<Vec<MoveCandidate>, OracleError> {
    let response: QueryAllResponse =
        serde_json::from_str(body).map_err(|err| OracleError::Payload(err.to_string()))?;

    if ROUTINE_STATUSES.contains(&response.status.as_str()) {
        debug!(status = %response.status, "chessdb has no moves");
        return Ok(Vec::new());
    }
    if response.status != "ok" {
        return Err(OracleError::Status(response.status));
    }

    let candidates = response
        .moves
        .into_iter()
        .filter_map(|m| {
            let score = numeric_score(&m.score)?;
            Some(MoveCandidate::new(m.uci, score))
        })
        .collect();
    Ok(candidates)
}

fn numeric_score(value: &serde_json::Value) -> Option<Score> {
    let raw = match value {
        serde_json::Value::Number(n) => n.as_i64()?,
        serde_json::Value::String(s) => s.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    let bound = i64::from(MATE_SCORE - 1);
    Some(raw.clamp(-bound, bound) as Score)
}
