//! Position wrapper around the rules engine.
//!
//! Every exploration branch owns its own `GamePosition`. Children are built by
//! cloning the parent and playing one move, so concurrent branches never share
//! mutable game state.

use std::fmt;
use std::str::FromStr;

use shakmaty::fen::{Epd, Fen};
use shakmaty::san::San;
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess, Color, EnPassantMode, File, Move, Position, Rank, Square};

use crate::error::ConfigError;

/// FEN of the standard starting position.
pub const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// Number of halfmoves without capture or pawn move after which a draw can be
/// claimed.
const FIFTY_MOVE_HALFMOVES: u32 = 100;

/// Authoritative classification of a position by the rules engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Terminal {
    Checkmate,
    Stalemate,
    InsufficientMaterial,
    FiftyMoves,
    Repetition,
}

impl Terminal {
    /// Human readable annotation used in node tooltips.
    pub fn describe(self) -> &'static str {
        match self {
            Terminal::Checkmate => "checkmate",
            Terminal::Stalemate => "stalemate",
            Terminal::InsufficientMaterial => "draw by insufficient material",
            Terminal::FiftyMoves => "draw by fifty-move rule",
            Terminal::Repetition => "draw by threefold repetition",
        }
    }
}

/// A chess position together with the path that led to it.
#[derive(Clone, Debug)]
pub struct GamePosition {
    chess: Chess,
    /// Moves played from the root, in UCI notation.
    path: Vec<String>,
    /// EPDs of the positions before each move on `path`.
    history: Vec<String>,
    root_epd: String,
}

impl Default for GamePosition {
    fn default() -> Self {
        Self::new(Chess::default())
    }
}

impl GamePosition {
    /// Creates a root position.
    pub fn new(chess: Chess) -> Self {
        let root_epd = epd_of(&chess);
        GamePosition {
            chess,
            path: Vec::new(),
            history: Vec::new(),
            root_epd,
        }
    }

    /// Parses a FEN (or EPD) into a root position.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidPosition` if the text is not a legal
    /// standard chess position.
    pub fn from_fen(fen: &str) -> Result<Self, ConfigError> {
        let parsed = Fen::from_str(fen.trim())
            .map_err(|err| ConfigError::InvalidPosition(format!("{fen}: {err}")))?;
        let chess: Chess = parsed
            .into_position(CastlingMode::Standard)
            .map_err(|err| ConfigError::InvalidPosition(format!("{fen}: {err}")))?;
        Ok(Self::new(chess))
    }

    /// Returns the underlying rules-engine position.
    pub fn chess(&self) -> &Chess {
        &self.chess
    }

    pub fn side_to_move(&self) -> Color {
        self.chess.turn()
    }

    /// Canonical encoding of this position, ignoring move counters.
    pub fn epd(&self) -> String {
        epd_of(&self.chess)
    }

    /// Full FEN including move counters, as sent to UCI engines.
    pub fn fen(&self) -> String {
        Fen::from_position(&self.chess, EnPassantMode::Legal).to_string()
    }

    pub fn root_epd(&self) -> &str {
        &self.root_epd
    }

    /// Moves played from the root in UCI notation.
    pub fn path(&self) -> &[String] {
        &self.path
    }

    pub fn ply(&self) -> usize {
        self.path.len()
    }

    pub fn legal_move_count(&self) -> usize {
        self.chess.legal_moves().len()
    }

    /// Resolves a UCI move string against this position.
    ///
    /// Returns `None` if the text does not parse or the move is illegal here.
    pub fn parse_uci(&self, uci: &str) -> Option<Move> {
        let parsed = UciMove::from_str(uci).ok()?;
        parsed.to_move(&self.chess).ok()
    }

    /// Returns the SAN notation of a legal move in this position.
    pub fn san(&self, mv: Move) -> String {
        San::from_move(&self.chess, mv).to_string()
    }

    /// Returns a copy of this position with `mv` played.
    ///
    /// The move must be legal in this position.
    pub fn play(&self, mv: Move) -> GamePosition {
        let mut child = self.clone();
        child.history.push(self.epd());
        child.path.push(mv.to_uci(CastlingMode::Standard).to_string());
        child.chess.play_unchecked(mv);
        child
    }

    /// Classifies the position as terminal or claimable draw.
    ///
    /// Returns `None` for an ongoing position, which must be scored by an
    /// oracle.
    pub fn terminal(&self) -> Option<Terminal> {
        if self.chess.is_checkmate() {
            return Some(Terminal::Checkmate);
        }
        if self.chess.is_stalemate() {
            return Some(Terminal::Stalemate);
        }
        if self.chess.is_insufficient_material() {
            return Some(Terminal::InsufficientMaterial);
        }
        if self.chess.halfmoves() >= FIFTY_MOVE_HALFMOVES {
            return Some(Terminal::FiftyMoves);
        }
        if self.is_threefold_repetition() {
            return Some(Terminal::Repetition);
        }
        None
    }

    /// True if the current position occurred twice before on the path.
    fn is_threefold_repetition(&self) -> bool {
        // Repetitions can only happen within the reversible tail of the path.
        let reversible = self.chess.halfmoves() as usize;
        if reversible < 4 {
            return false;
        }

        let current = self.epd();
        let earlier = self
            .history
            .iter()
            .rev()
            .take(reversible)
            .filter(|epd| **epd == current)
            .count();
        earlier >= 2
    }

    /// Renders the board with Unicode pieces, White at the bottom.
    pub fn unicode_board(&self) -> String {
        unicode_board(&self.chess)
    }
}

impl fmt::Display for GamePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.epd())
    }
}

/// EPD of a position with only legal en passant squares.
pub fn epd_of(chess: &Chess) -> String {
    Epd::from_position(chess, EnPassantMode::Legal).to_string()
}

/// Parses an EPD back into a position. Used by the renderer.
pub fn chess_from_epd(epd: &str) -> Option<Chess> {
    Epd::from_str(epd)
        .ok()?
        .into_position(CastlingMode::Standard)
        .ok()
}

/// Renders the board of `chess` with Unicode pieces and middle dots for empty
/// squares, one rank per line.
pub fn unicode_board(chess: &Chess) -> String {
    let board = chess.board();
    let mut out = String::with_capacity(8 * 17);

    for rank in (0..8).rev() {
        for file in 0..8 {
            let sq = Square::from_coords(File::new(file), Rank::new(rank));
            let ch = match board.piece_at(sq) {
                Some(piece) => unicode_piece(piece.char()),
                None => '\u{00B7}',
            };
            if file > 0 {
                out.push(' ');
            }
            out.push(ch);
        }
        if rank > 0 {
            out.push('\n');
        }
    }

    out
}

fn unicode_piece(ascii: char) -> char {
    match ascii {
        'K' => '♔',
        'Q' => '♕',
        'R' => '♖',
        'B' => '♗',
        'N' => '♘',
        'P' => '♙',
        'k' => '♚',
        'q' => '♛',
        'r' => '♜',
        'b' => '♝',
        'n' => '♞',
        'p' => '♟',
        other => other,
    }
}
