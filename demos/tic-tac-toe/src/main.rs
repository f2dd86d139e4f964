use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tablehub::prelude::*;

// ---------------------------------------------------------------------------
// Game types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
enum Cell {
    #[default]
    Empty,
    X,
    O,
}

impl Cell {
    fn for_seat(seat: usize) -> Self {
        if seat == 0 { Cell::X } else { Cell::O }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "kebab-case")]
enum Outcome {
    Win { seat: usize },
    Draw,
}

/// Parameters of `play-move`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Move {
    pub row: usize,
    pub col: usize,
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

#[derive(Default)]
struct TicTacToe {
    board: [[Cell; 3]; 3],
    names: Vec<String>,
    turn: usize, // seat holding the turn: 0 = X, 1 = O
    outcome: Option<Outcome>,
    started: bool,
}

impl TicTacToe {
    fn play(&mut self, seat: usize, mv: Move) -> Result<(), DriverError> {
        if !self.started {
            return Err(DriverError::new("game has not started"));
        }
        if self.outcome.is_some() {
            return Err(DriverError::new("game is over"));
        }
        if seat != self.turn {
            return Err(DriverError::new("not your turn"));
        }
        if mv.row >= 3 || mv.col >= 3 {
            return Err(DriverError::new("row and col must be 0-2"));
        }
        if self.board[mv.row][mv.col] != Cell::Empty {
            return Err(DriverError::new("cell is occupied"));
        }

        let mark = Cell::for_seat(seat);
        self.board[mv.row][mv.col] = mark;

        if check_winner(&self.board, mark) {
            self.outcome = Some(Outcome::Win { seat });
        } else if board_full(&self.board) {
            self.outcome = Some(Outcome::Draw);
        } else {
            self.turn = 1 - self.turn;
        }
        Ok(())
    }
}

impl Driver for TicTacToe {
    fn config(&self) -> DriverConfig {
        DriverConfig {
            min_players: 2,
            max_players: 2,
            auto_start: true,
            ..DriverConfig::default()
        }
    }

    fn start(&mut self, players: &[Seat]) -> Result<(), DriverError> {
        if players.len() != 2 {
            return Err(DriverError::new("tic-tac-toe needs exactly two players"));
        }
        self.names = players.iter().map(|p| p.name.clone()).collect();
        self.started = true;
        Ok(())
    }

    fn parse(
        &mut self,
        seat: usize,
        command: &str,
        params: &Value,
    ) -> Result<(), DriverError> {
        match command {
            "play-move" => {
                let mv = Move::deserialize(params)
                    .map_err(|e| DriverError::new(format!("invalid move: {e}")))?;
                self.play(seat, mv)
            }
            other => Err(DriverError::new(format!("unknown command {other}"))),
        }
    }

    fn started(&self) -> bool {
        self.started
    }

    fn current_actor(&self) -> Option<usize> {
        (self.started && self.outcome.is_none()).then_some(self.turn)
    }

    fn is_over(&self) -> bool {
        self.outcome.is_some()
    }

    fn common_state(&self) -> Value {
        json!({
            "board": self.board,
            "players": self.names,
            "turn": self.turn,
            "outcome": self.outcome,
        })
    }

    fn player_state(&self, seat: usize) -> Value {
        json!({ "mark": Cell::for_seat(seat) })
    }
}

fn check_winner(b: &[[Cell; 3]; 3], m: Cell) -> bool {
    (0..3).any(|i| (0..3).all(|j| b[i][j] == m))           // rows
    || (0..3).any(|j| (0..3).all(|i| b[i][j] == m))        // cols
    || (0..3).all(|i| b[i][i] == m)                         // diagonal
    || (0..3).all(|i| b[i][2 - i] == m)                     // anti-diagonal
}

fn board_full(b: &[[Cell; 3]; 3]) -> bool {
    b.iter().all(|row| row.iter().all(|c| *c != Cell::Empty))
}

// ---------------------------------------------------------------------------
// Server bootstrap
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tablehub::init_tracing("info");

    let config = ServerConfig::from_env()?;
    tracing::info!(bind = %config.bind, "starting tic-tac-toe server");

    let server = TablehubServer::builder()
        .config(config)
        .driver("tic-tac-toe", TicTacToe::default)
        .build()
        .await?;

    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}
