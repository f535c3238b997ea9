//! Local UCI engine backend.
//!
//! A fresh engine process is started for every query. The engine runs a
//! fixed-depth MultiPV search and the last `info` line of each principal
//! variation becomes one candidate.

use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use super::{MoveOracle, OracleError, soften};
use crate::error::ConfigError;
use crate::position::GamePosition;
use crate::types::{MATE_SCORE, MoveCandidate, Score};

/// Time allowed for `uciok` and `readyok`.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default time allowed for one `go depth` search.
pub const SEARCH_TIMEOUT: Duration = Duration::from_secs(120);

/// Parameters of the engine backend.
#[derive(Clone, Debug)]
pub struct UciOptions {
    /// Engine command line, split with shell quoting rules.
    pub command: String,
    pub depth: u32,
    pub multipv: u32,
    /// Deadline for the search, from `go` to `bestmove`.
    pub search_timeout: Duration,
}

impl Default for UciOptions {
    fn default() -> Self {
        UciOptions {
            command: "stockfish".to_string(),
            depth: 20,
            multipv: 5,
            search_timeout: SEARCH_TIMEOUT,
        }
    }
}

/// Splits an engine command line into program and arguments.
///
/// # Errors
///
/// Returns `ConfigError::InvalidEngineCommand` if the command has unbalanced
/// quotes or no program.
pub fn parse_engine_command(command: &str) -> Result<(String, Vec<String>), ConfigError> {
    match shlex::split(command) {
        Some(mut parts) if !parts.is_empty() => {
            let program = parts.remove(0);
            Ok((program, parts))
        }
        _ => Err(ConfigError::InvalidEngineCommand(command.to_string())),
    }
}

/// Oracle that asks a UCI engine.
pub struct UciOracle {
    options: UciOptions,
    program: String,
    args: Vec<String>,
}

impl UciOracle {
    /// Creates the oracle. The engine is not started until the first query.
    ///
    /// # Errors
    ///
    /// Returns an error if the command line cannot be parsed or the search
    /// parameters are zero.
    pub fn new(options: UciOptions) -> Result<Self, ConfigError> {
        let (program, args) = parse_engine_command(&options.command)?;
        if options.depth == 0 {
            return Err(ConfigError::InvalidEngineCommand(format!(
                "{}: search depth must be at least 1",
                options.command
            )));
        }
        if options.multipv == 0 {
            return Err(ConfigError::InvalidEngineCommand(format!(
                "{}: multipv must be at least 1",
                options.command
            )));
        }
        Ok(UciOracle { options, program, args })
    }

    fn analyse(&self, position: &GamePosition) -> Result<Vec<MoveCandidate>, OracleError> {
        let mut engine = UciProcess::spawn(&self.program, &self.args)?;

        engine.send("uci")?;
        engine.wait_for("uciok", Instant::now() + HANDSHAKE_TIMEOUT)?;
        engine.send(&format!("setoption name MultiPV value {}", self.options.multipv))?;
        engine.send("isready")?;
        engine.wait_for("readyok", Instant::now() + HANDSHAKE_TIMEOUT)?;
        engine.send(&format!("position fen {}", position.fen()))?;
        engine.send(&format!("go depth {}", self.options.depth))?;

        let deadline = Instant::now() + self.options.search_timeout;
        let mut lines: BTreeMap<u32, InfoLine> = BTreeMap::new();
        loop {
            let line = engine.read_line(deadline)?;
            if line.starts_with("bestmove") {
                break;
            }
            if let Some(info) = parse_info_line(&line) {
                lines.insert(info.multipv, info);
            }
        }

        Ok(lines
            .into_values()
            .map(|info| MoveCandidate::new(info.uci, info.score))
            .collect())
    }
}

impl MoveOracle for UciOracle {
    fn name(&self) -> &str {
        "engine"
    }

    fn cache_params(&self) -> String {
        format!(
            "engine:{}:depth={}:multipv={}",
            self.options.command, self.options.depth, self.options.multipv
        )
    }

    fn get_moves(&self, position: &GamePosition) -> Vec<MoveCandidate> {
        soften(self.name(), position, self.analyse(position))
    }
}

/// A running engine process.
///
/// Output lines are read on a helper thread so that every read can time out.
/// Dropping the process sends `quit` and then kills and reaps it, which also
/// ends the reader thread.
struct UciProcess {
    process: Child,
    stdin: ChildStdin,
    lines: Receiver<String>,
}

impl UciProcess {
    fn spawn(program: &str, args: &[String]) -> Result<Self, OracleError> {
        let mut process = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| OracleError::Engine("failed to open stdin".to_string()))?;
        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| OracleError::Engine("failed to open stdout".to_string()))?;

        let (tx, lines) = mpsc::channel();
        thread::Builder::new()
            .name("uci-reader".to_string())
            .spawn(move || {
                for line in BufReader::new(stdout).lines() {
                    let Ok(line) = line else { break };
                    if tx.send(line).is_err() {
                        break;
                    }
                }
            })?;

        Ok(UciProcess { process, stdin, lines })
    }

    fn send(&mut self, command: &str) -> Result<(), OracleError> {
        trace!(command, "uci >");
        writeln!(self.stdin, "{command}")?;
        self.stdin.flush()?;
        Ok(())
    }

    /// Reads the next output line, failing once `deadline` has passed.
    fn read_line(&mut self, deadline: Instant) -> Result<String, OracleError> {
        let timeout = deadline.saturating_duration_since(Instant::now());
        match self.lines.recv_timeout(timeout) {
            Ok(line) => {
                let line = line.trim().to_string();
                trace!(line, "uci <");
                Ok(line)
            }
            Err(RecvTimeoutError::Timeout) => Err(OracleError::Engine("engine timed out".to_string())),
            Err(RecvTimeoutError::Disconnected) => Err(OracleError::Engine("engine closed stdout".to_string())),
        }
    }

    fn wait_for(&mut self, token: &str, deadline: Instant) -> Result<(), OracleError> {
        loop {
            if self.read_line(deadline)? == token {
                return Ok(());
            }
        }
    }
}

impl Drop for UciProcess {
    fn drop(&mut self) {
        let _ = self.send("quit");
        let _ = self.process.kill();
        let _ = self.process.wait();
        debug!("engine process stopped");
    }
}

/// The fields of an `info` line used for scoring.
#[derive(Clone, Debug, PartialEq, Eq)]
struct InfoLine {
    multipv: u32,
    score: Score,
    uci: String,
}

/// Parses an `info` line carrying a score and a principal variation.
///
/// Bound scores (`lowerbound`/`upperbound`) are ignored since they are not
/// final for the iteration.
fn parse_info_line(line: &str) -> Option<InfoLine> {
    let mut tokens = line.split_whitespace();
    if tokens.next()? != "info" {
        return None;
    }

    let mut multipv = 1;
    let mut score = None;
    let mut uci = None;

    while let Some(token) = tokens.next() {
        match token {
            "multipv" => multipv = tokens.next()?.parse().ok()?,
            "score" => {
                let kind = tokens.next()?;
                let value: i32 = tokens.next()?.parse().ok()?;
                score = Some(match kind {
                    "cp" => cp_score(value),
                    "mate" => mate_score(value),
                    _ => return None,
                });
            }
            "lowerbound" | "upperbound" => return None,
            "pv" => {
                uci = tokens.next().map(str::to_string);
                break;
            }
            // Free text until the end of the line.
            "string" => return None,
            _ => {}
        }
    }

    Some(InfoLine {
        multipv,
        score: score?,
        uci: uci?,
    })
}

fn cp_score(cp: i32) -> Score {
    cp.clamp(-(MATE_SCORE - 1), MATE_SCORE - 1)
}

/// Maps "mate in `n`" (negative when being mated) onto the score scale.
fn mate_score(n: i32) -> Score {
    if n == 0 {
        return -MATE_SCORE;
    }
    let distance = n.unsigned_abs().min(MATE_SCORE as u32 - 1) as Score;
    n.signum() * (MATE_SCORE - distance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_parse_info_cp() {
        let line = "info depth 20 seldepth 28 multipv 2 score cp 31 nodes 123 nps 1000 pv d2d4 d7d5 c2c4";
        assert_eq!(
            parse_info_line(line),
            Some(InfoLine {
                multipv: 2,
                score: 31,
                uci: "d2d4".to_string()
            })
        );
    }

    #[test]
    fn test_parse_info_without_multipv() {
        let info = parse_info_line("info depth 5 score mate 3 pv f7f8q").unwrap();
        assert_eq!(info.multipv, 1);
        assert_eq!(info.score, MATE_SCORE - 3);
    }

    #[test_case("info depth 1 currmove e2e4 currmovenumber 1"; "no score")]
    #[test_case("info depth 20 score cp 40 lowerbound pv e2e4"; "bound")]
    #[test_case("info string NNUE evaluation enabled"; "string")]
    #[test_case("info depth 20 multipv 1 score cp 12"; "no pv")]
    #[test_case("bestmove e2e4 ponder e7e5"; "not info")]
    fn test_parse_info_rejects(line: &str) {
        assert_eq!(parse_info_line(line), None);
    }

    #[test_case(5, MATE_SCORE - 5; "mating")]
    #[test_case(-2, -(MATE_SCORE - 2); "mated")]
    #[test_case(0, -MATE_SCORE; "mated now")]
    fn test_mate_score(n: i32, expected: Score) {
        assert_eq!(mate_score(n), expected);
    }

    #[test]
    fn test_cp_clamped() {
        assert_eq!(cp_score(100_000), MATE_SCORE - 1);
        assert_eq!(cp_score(-100_000), -(MATE_SCORE - 1));
        assert_eq!(cp_score(-42), -42);
    }

    #[test]
    fn test_parse_engine_command() {
        let (program, args) = parse_engine_command("/opt/sf/stockfish --threads 'a b'").unwrap();
        assert_eq!(program, "/opt/sf/stockfish");
        assert_eq!(args, vec!["--threads".to_string(), "a b".to_string()]);

        assert!(parse_engine_command("").is_err());
        assert!(parse_engine_command("stockfish 'unterminated").is_err());
    }

    #[test]
    fn test_cache_params() {
        let oracle = UciOracle::new(UciOptions::default()).unwrap();
        assert_eq!(oracle.cache_params(), "engine:stockfish:depth=20:multipv=5");
    }

    #[test]
    fn test_missing_engine_is_empty() {
        let oracle = UciOracle::new(UciOptions {
            command: "/nonexistent/engine-binary".to_string(),
            ..UciOptions::default()
        })
        .unwrap();
        assert!(oracle.get_moves(&GamePosition::default()).is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_scripted_engine() {
        // A shell script speaking just enough UCI.
        let script = "read l; echo uciok; read l; read l; echo readyok; read l; read l; \
            echo 'info depth 1 multipv 1 score cp 10 pv e2e4'; \
            echo 'info depth 2 multipv 1 score cp 30 pv e2e4 e7e5'; \
            echo 'info depth 2 multipv 2 score cp 25 pv d2d4'; \
            echo 'bestmove e2e4'";
        let oracle = UciOracle::new(UciOptions {
            command: format!("sh -c \"{script}\""),
            depth: 2,
            multipv: 2,
            ..UciOptions::default()
        })
        .unwrap();

        let moves = oracle.get_moves(&GamePosition::default());
        assert_eq!(
            moves,
            vec![MoveCandidate::new("e2e4", 30), MoveCandidate::new("d2d4", 25)]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_silent_engine_times_out() {
        // `cat` echoes the commands back and never answers `uciok`.
        let oracle = UciOracle::new(UciOptions {
            command: "cat".to_string(),
            ..UciOptions::default()
        })
        .unwrap();

        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let _ = tx.send(oracle.get_moves(&GamePosition::default()));
        });
        let moves = rx
            .recv_timeout(HANDSHAKE_TIMEOUT + Duration::from_secs(10))
            .expect("engine query did not time out");
        assert!(moves.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_stalled_search_times_out() {
        // Completes the handshake, then never answers `go`.
        let script = "read l; echo uciok; read l; read l; echo readyok; exec sleep 60";
        let oracle = UciOracle::new(UciOptions {
            command: format!("sh -c \"{script}\""),
            search_timeout: Duration::from_millis(300),
            ..UciOptions::default()
        })
        .unwrap();

        let started = Instant::now();
        assert!(oracle.get_moves(&GamePosition::default()).is_empty());
        assert!(started.elapsed() < Duration::from_secs(30));
    }
}
