//! Embedded two-player tic-tac-toe: one active game per player, symmetric
//! opponent pairing, and durable win/loss/streak statistics.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Symbol {
    X,
    O,
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Symbol::X => write!(f, "X"),
            Symbol::O => write!(f, "O"),
        }
    }
}

/// The 3x3 grid as it travels on the wire: `"X"`, `"O"` or `null` per cell.
pub type Board = [[Option<Symbol>; 3]; 3];

/// Board evaluation result. Checks run rows, then columns, then the main
/// diagonal, then the anti-diagonal; the order is a determinism contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Win(Symbol),
    Tie,
    Continue,
}

pub fn evaluate(board: &Board) -> Verdict {
    let lines: [[(usize, usize); 3]; 8] = [
        [(0, 0), (0, 1), (0, 2)],
        [(1, 0), (1, 1), (1, 2)],
        [(2, 0), (2, 1), (2, 2)],
        [(0, 0), (1, 0), (2, 0)],
        [(0, 1), (1, 1), (2, 1)],
        [(0, 2), (1, 2), (2, 2)],
        [(0, 0), (1, 1), (2, 2)],
        [(0, 2), (1, 1), (2, 0)],
    ];
    for [a, b, c] in lines {
        if let Some(sym) = board[a.0][a.1] {
            if board[b.0][b.1] == Some(sym) && board[c.0][c.1] == Some(sym) {
                return Verdict::Win(sym);
            }
        }
    }
    if board.iter().flatten().all(Option::is_some) {
        return Verdict::Tie;
    }
    Verdict::Continue
}

#[derive(Debug)]
struct GameSession {
    x_player: String,
    o_player: String,
    board: Board,
}

/// Outcome of a valid move. Terminal outcomes carry the final board for the
/// `end` payload; the session is gone from the engine by the time they are
/// returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    Continue,
    Win {
        winner: String,
        symbol: Symbol,
        board: Board,
    },
    Tie {
        board: Board,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveError {
    /// Both seats of a new game given to the same player.
    SelfPlay,
    /// The player has no active game.
    NotPlaying,
    /// Row or column outside 0..=2.
    OutOfRange,
    /// The cell is already occupied.
    CellTaken,
    /// The submitted symbol is not the one assigned to this player.
    WrongSymbol,
}

impl std::fmt::Display for MoveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MoveError::SelfPlay => write!(f, "cannot play against yourself"),
            MoveError::NotPlaying => write!(f, "no active game for this player"),
            MoveError::OutOfRange => write!(f, "row/column out of range"),
            MoveError::CellTaken => write!(f, "cell already occupied"),
            MoveError::WrongSymbol => write!(f, "symbol does not match assignment"),
        }
    }
}

impl std::error::Error for MoveError {}

#[derive(Debug, Default)]
pub struct GameEngine {
    /// Symmetric pairing: `pairs[a] == b` iff `pairs[b] == a`.
    pairs: HashMap<String, String>,
    sessions: HashMap<String, GameSession>,
}

/// Order-independent id for the game between two players.
fn game_id(a: &str, b: &str) -> String {
    if a <= b {
        format!("{}_vs_{}", a, b)
    } else {
        format!("{}_vs_{}", b, a)
    }
}

impl GameEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a fresh game: `p1` plays X, `p2` plays O, `p1` moves first by
    /// convention. Any game either player was already in is discarded.
    pub fn start(&mut self, p1: &str, p2: &str) -> Result<(), MoveError> {
        if p1 == p2 {
            return Err(MoveError::SelfPlay);
        }
        self.remove_player(p1);
        self.remove_player(p2);
        self.pairs.insert(p1.to_string(), p2.to_string());
        self.pairs.insert(p2.to_string(), p1.to_string());
        self.sessions.insert(
            game_id(p1, p2),
            GameSession {
                x_player: p1.to_string(),
                o_player: p2.to_string(),
                board: Board::default(),
            },
        );
        Ok(())
    }

    pub fn opponent_of(&self, player: &str) -> Option<&str> {
        self.pairs.get(player).map(String::as_str)
    }

    /// Drops any game `player` is part of, both the pairing and the board.
    /// Used on logout so a later move from the abandoned opponent is a
    /// `NotPlaying` error, not a dangling lookup.
    pub fn remove_player(&mut self, player: &str) {
        if let Some(opponent) = self.pairs.remove(player) {
            self.pairs.remove(&opponent);
            self.sessions.remove(&game_id(player, &opponent));
        }
    }

    /// Applies one move and evaluates the board. Terminal results remove the
    /// session. Occupied cells and foreign symbols are rejected.
    pub fn apply_move(
        &mut self,
        player: &str,
        row: i64,
        column: i64,
        symbol: Symbol,
    ) -> Result<MoveOutcome, MoveError> {
        let opponent = self.pairs.get(player).ok_or(MoveError::NotPlaying)?.clone();
        if !(0..3).contains(&row) || !(0..3).contains(&column) {
            return Err(MoveError::OutOfRange);
        }
        let id = game_id(player, &opponent);
        let session = self.sessions.get_mut(&id).ok_or(MoveError::NotPlaying)?;
        let assigned = if session.x_player == player {
            Symbol::X
        } else {
            Symbol::O
        };
        if assigned != symbol {
            return Err(MoveError::WrongSymbol);
        }

        let cell = &mut session.board[row as usize][column as usize];
        if cell.is_some() {
            return Err(MoveError::CellTaken);
        }
        *cell = Some(symbol);

        match evaluate(&session.board) {
            Verdict::Continue => Ok(MoveOutcome::Continue),
            Verdict::Tie => {
                let board = session.board;
                self.remove_player(player);
                Ok(MoveOutcome::Tie { board })
            }
            Verdict::Win(winning) => {
                let winner = if winning == Symbol::X {
                    session.x_player.clone()
                } else {
                    session.o_player.clone()
                };
                let board = session.board;
                self.remove_player(player);
                Ok(MoveOutcome::Win {
                    winner,
                    symbol: winning,
                    board,
                })
            }
        }
    }
}

/// Durable per-player record, stored under the player's name in one JSON
/// statistics file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerStats {
    pub wins: u32,
    pub losses: u32,
    pub ties: u32,
    pub current_streak: u32,
    pub max_streak: u32,
}

#[derive(Debug)]
pub struct StatsBook {
    path: PathBuf,
    stats: HashMap<String, PlayerStats>,
}

impl StatsBook {
    /// Loads the statistics file, starting empty when it is missing or
    /// unreadable. Persistence is best effort in both directions.
    pub fn load(path: &Path) -> Self {
        let stats = match fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(stats) => stats,
                Err(e) => {
                    warn!("bad statistics file {}: {}", path.display(), e);
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("no statistics file yet at {}", path.display());
                HashMap::new()
            }
            Err(e) => {
                warn!("cannot read statistics file {}: {}", path.display(), e);
                HashMap::new()
            }
        };
        Self {
            path: path.to_path_buf(),
            stats,
        }
    }

    pub fn get(&self, player: &str) -> Option<&PlayerStats> {
        self.stats.get(player)
    }

    /// Records a decided game and persists immediately. Returns the winner's
    /// new streak for the broadcast announcement.
    pub fn record_win(&mut self, winner: &str, loser: &str) -> u32 {
        let w = self.stats.entry(winner.to_string()).or_default();
        w.wins += 1;
        w.current_streak += 1;
        w.max_streak = w.max_streak.max(w.current_streak);
        let streak = w.current_streak;

        let l = self.stats.entry(loser.to_string()).or_default();
        l.losses += 1;
        l.current_streak = 0;

        self.save();
        streak
    }

    /// Records a tie for both players and persists. Streaks are untouched.
    pub fn record_tie(&mut self, p1: &str, p2: &str) {
        self.stats.entry(p1.to_string()).or_default().ties += 1;
        self.stats.entry(p2.to_string()).or_default().ties += 1;
        self.save();
    }

    fn save(&self) {
        let raw = match serde_json::to_string_pretty(&self.stats) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("cannot serialize statistics: {}", e);
                return;
            }
        };
        if let Err(e) = fs::write(&self.path, raw) {
            warn!("cannot save statistics to {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board_from(rows: [[&str; 3]; 3]) -> Board {
        let mut board = Board::default();
        for (r, row) in rows.iter().enumerate() {
            for (c, cell) in row.iter().enumerate() {
                board[r][c] = match *cell {
                    "X" => Some(Symbol::X),
                    "O" => Some(Symbol::O),
                    _ => None,
                };
            }
        }
        board
    }

    #[test]
    fn row_win_is_detected_before_anything_else() {
        let board = board_from([["X", "X", "X"], ["O", "O", ""], ["", "", ""]]);
        assert_eq!(evaluate(&board), Verdict::Win(Symbol::X));
    }

    #[test]
    fn column_diagonal_and_anti_diagonal_wins() {
        let col = board_from([["O", "X", ""], ["O", "X", ""], ["O", "", "X"]]);
        assert_eq!(evaluate(&col), Verdict::Win(Symbol::O));
        let diag = board_from([["X", "O", ""], ["O", "X", ""], ["", "", "X"]]);
        assert_eq!(evaluate(&diag), Verdict::Win(Symbol::X));
        let anti = board_from([["X", "X", "O"], ["X", "O", ""], ["O", "", ""]]);
        assert_eq!(evaluate(&anti), Verdict::Win(Symbol::O));
    }

    #[test]
    fn full_board_without_a_line_is_a_tie() {
        let board = board_from([["X", "O", "X"], ["X", "O", "O"], ["O", "X", "X"]]);
        assert_eq!(evaluate(&board), Verdict::Tie);
    }

    #[test]
    fn sparse_board_continues() {
        let board = board_from([["X", "", ""], ["", "O", ""], ["", "", ""]]);
        assert_eq!(evaluate(&board), Verdict::Continue);
    }

    #[test]
    fn start_rejects_playing_against_yourself() {
        let mut engine = GameEngine::new();
        assert_eq!(engine.start("alice", "alice"), Err(MoveError::SelfPlay));
        assert!(engine.opponent_of("alice").is_none());
    }

    #[test]
    fn pairing_is_symmetric_and_replaced_on_restart() {
        let mut engine = GameEngine::new();
        engine.start("alice", "bob").unwrap();
        assert_eq!(engine.opponent_of("alice"), Some("bob"));
        assert_eq!(engine.opponent_of("bob"), Some("alice"));

        // A new game involving alice drops the old one entirely.
        engine.start("alice", "carol").unwrap();
        assert_eq!(engine.opponent_of("alice"), Some("carol"));
        assert!(engine.opponent_of("bob").is_none());
    }

    #[test]
    fn alternating_moves_reach_a_win_with_consistent_winner() {
        let mut engine = GameEngine::new();
        engine.start("alice", "bob").unwrap();
        assert_eq!(engine.apply_move("alice", 0, 0, Symbol::X).unwrap(), MoveOutcome::Continue);
        assert_eq!(engine.apply_move("bob", 1, 0, Symbol::O).unwrap(), MoveOutcome::Continue);
        assert_eq!(engine.apply_move("alice", 0, 1, Symbol::X).unwrap(), MoveOutcome::Continue);
        assert_eq!(engine.apply_move("bob", 1, 1, Symbol::O).unwrap(), MoveOutcome::Continue);

        match engine.apply_move("alice", 0, 2, Symbol::X).unwrap() {
            MoveOutcome::Win { winner, symbol, board } => {
                assert_eq!(winner, "alice");
                assert_eq!(symbol, Symbol::X);
                assert_eq!(board[0], [Some(Symbol::X); 3]);
            }
            other => panic!("expected a win, got {:?}", other),
        }
        // The finished game is gone.
        assert!(engine.opponent_of("alice").is_none());
        assert_eq!(engine.apply_move("bob", 2, 2, Symbol::O), Err(MoveError::NotPlaying));
    }

    #[test]
    fn nine_moves_without_a_line_end_in_a_tie() {
        let mut engine = GameEngine::new();
        engine.start("alice", "bob").unwrap();
        // X O X / X O O / O X X : no three-in-a-row anywhere.
        let moves = [
            ("alice", 0, 0), ("bob", 0, 1), ("alice", 0, 2),
            ("bob", 1, 1), ("alice", 1, 0), ("bob", 1, 2),
            ("alice", 2, 1), ("bob", 2, 0), ("alice", 2, 2),
        ];
        let mut last = MoveOutcome::Continue;
        for (who, r, c) in moves {
            let sym = if who == "alice" { Symbol::X } else { Symbol::O };
            last = engine.apply_move(who, r, c, sym).unwrap();
        }
        assert!(matches!(last, MoveOutcome::Tie { .. }));
    }

    #[test]
    fn bad_moves_are_rejected() {
        let mut engine = GameEngine::new();
        engine.start("alice", "bob").unwrap();
        assert_eq!(engine.apply_move("alice", 3, 0, Symbol::X), Err(MoveError::OutOfRange));
        assert_eq!(engine.apply_move("alice", 0, -1, Symbol::X), Err(MoveError::OutOfRange));
        assert_eq!(engine.apply_move("alice", 0, 0, Symbol::O), Err(MoveError::WrongSymbol));
        engine.apply_move("alice", 0, 0, Symbol::X).unwrap();
        assert_eq!(engine.apply_move("bob", 0, 0, Symbol::O), Err(MoveError::CellTaken));
        assert_eq!(engine.apply_move("carol", 0, 0, Symbol::X), Err(MoveError::NotPlaying));
    }

    #[test]
    fn stats_track_wins_losses_streaks_and_ties() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tictactoe_stats.json");
        let mut book = StatsBook::load(&path);

        assert_eq!(book.record_win("alice", "bob"), 1);
        assert_eq!(book.record_win("alice", "bob"), 2);
        book.record_tie("alice", "bob");
        assert_eq!(book.record_win("bob", "alice"), 1);

        let alice = book.get("alice").unwrap();
        assert_eq!((alice.wins, alice.losses, alice.ties), (2, 1, 1));
        assert_eq!((alice.current_streak, alice.max_streak), (0, 2));
        let bob = book.get("bob").unwrap();
        assert_eq!((bob.wins, bob.losses, bob.ties), (1, 2, 1));
        assert_eq!((bob.current_streak, bob.max_streak), (1, 1));

        // Every update hit the disk; a fresh load sees the same numbers.
        let reloaded = StatsBook::load(&path);
        assert_eq!(reloaded.get("alice"), book.get("alice"));
        assert_eq!(reloaded.get("bob"), book.get("bob"));
    }

    #[test]
    fn missing_or_corrupt_stats_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.json");
        assert!(StatsBook::load(&path).get("alice").is_none());
        std::fs::write(&path, "][").unwrap();
        assert!(StatsBook::load(&path).get("alice").is_none());
    }
}
