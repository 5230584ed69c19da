//! Client-side session state machine. Mirrors the dispatcher's login states
//! and speaks exactly the same tagged action vocabulary; it knows nothing
//! about presentation: commands come in as text lines, display text goes
//! out as a list of lines, and whoever drives it owns the socket.

use crate::game::{Board, Symbol};
use crate::protocol::{
    ClientRequest, ConnectStatus, EndStatus, LoginStatus, PmStatus, ServerMsg, StartStatus,
    TurnStatus,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Offline,
    /// Socket open, not logged in yet.
    Connected,
    LoggedIn,
    /// In a conversation group.
    Chatting,
}

/// What the machine wants done with one user command: optionally a request
/// on the wire, some lines on the screen, and possibly shutdown.
#[derive(Debug, Default)]
pub struct Reaction {
    pub request: Option<ClientRequest>,
    pub output: Vec<String>,
    pub quit: bool,
}

impl Reaction {
    fn say(text: impl Into<String>) -> Self {
        Reaction {
            output: vec![text.into()],
            ..Default::default()
        }
    }

    fn send(request: ClientRequest) -> Self {
        Reaction {
            request: Some(request),
            ..Default::default()
        }
    }
}

#[derive(Debug)]
pub struct ClientSm {
    state: ClientState,
    me: String,
    peer: String,
    /// Connect target we are waiting on a reply for.
    pending_peer: Option<String>,
    /// Symbol assigned by the server for the active game, if any.
    symbol: Option<Symbol>,
}

impl Default for ClientSm {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientSm {
    pub fn new() -> Self {
        Self {
            state: ClientState::Offline,
            me: String::new(),
            peer: String::new(),
            pending_peer: None,
            symbol: None,
        }
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn me(&self) -> &str {
        &self.me
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn symbol(&self) -> Option<Symbol> {
        self.symbol
    }

    /// Produces the login request and moves to `Connected` until the server
    /// answers.
    pub fn login(&mut self, name: &str) -> ClientRequest {
        self.me = name.to_string();
        self.state = ClientState::Connected;
        ClientRequest::Login {
            name: name.to_string(),
        }
    }

    /// Maps one line of user input onto the wire vocabulary.
    pub fn handle_command(&mut self, input: &str) -> Reaction {
        let input = input.trim();
        if input.is_empty() {
            return Reaction::default();
        }
        match self.state {
            ClientState::Offline | ClientState::Connected => {
                Reaction::say("You are not logged in yet.")
            }
            ClientState::LoggedIn | ClientState::Chatting => self.command_online(input),
        }
    }

    fn command_online(&mut self, input: &str) -> Reaction {
        if input == "q" {
            self.state = ClientState::Offline;
            return Reaction {
                quit: true,
                output: vec!["See you next time!".to_string()],
                ..Default::default()
            };
        }
        if input == "time" {
            return Reaction::send(ClientRequest::Time);
        }
        if input == "who" {
            return Reaction::send(ClientRequest::List);
        }
        if let Some(rest) = input.strip_prefix("ttt ") {
            let target = rest.trim();
            if target.is_empty() {
                return Reaction::say("Usage: ttt <username>");
            }
            return Reaction::send(ClientRequest::StartTtt {
                target: target.to_string(),
            });
        }
        if let Some(rest) = input.strip_prefix("move ") {
            return self.command_move(rest);
        }
        if let Some(term) = input.strip_prefix('?') {
            return Reaction::send(ClientRequest::Search {
                target: term.trim().to_string(),
            });
        }
        if let Some(rest) = input.strip_prefix("p ") {
            return match rest.trim().parse::<u32>() {
                Ok(n) => Reaction::send(ClientRequest::Poem { target: n }),
                Err(_) => Reaction::say("Usage: p <number>"),
            };
        }
        if let Some(rest) = input.strip_prefix("/setpfp ") {
            let url = rest.trim();
            if url.is_empty() {
                return Reaction::say("Usage: /setpfp <URL>");
            }
            return Reaction::send(ClientRequest::SetProfilePic {
                url: url.to_string(),
            });
        }
        if let Some(rest) = input.strip_prefix('@') {
            return match rest.split_once(' ') {
                Some((to, text)) if !text.trim().is_empty() => {
                    Reaction::send(ClientRequest::PrivateMessage {
                        to: to.to_string(),
                        message: text.to_string(),
                    })
                }
                _ => Reaction::say("Usage: @user message"),
            };
        }

        match self.state {
            ClientState::LoggedIn => {
                if let Some(rest) = input.strip_prefix("c ") {
                    let peer = rest.trim();
                    if !peer.is_empty() {
                        self.pending_peer = Some(peer.to_string());
                        return Reaction::send(ClientRequest::Connect {
                            target: peer.to_string(),
                        });
                    }
                }
                Reaction::say("Not chatting yet. Try: c <user>, who, time, ? <term>, p <n>, ttt <user>, q")
            }
            ClientState::Chatting => {
                if input == "bye" {
                    self.state = ClientState::LoggedIn;
                    let peer = std::mem::take(&mut self.peer);
                    return Reaction {
                        request: Some(ClientRequest::Disconnect),
                        output: vec![format!("You are disconnected from {}", peer)],
                        quit: false,
                    };
                }
                // Anything else is a broadcast line; echo it locally.
                Reaction {
                    request: Some(ClientRequest::Exchange {
                        from: format!("[{}]", self.me),
                        message: input.to_string(),
                    }),
                    output: vec![format!("[{}] {}", self.me, input)],
                    quit: false,
                }
            }
            _ => Reaction::default(),
        }
    }

    fn command_move(&mut self, rest: &str) -> Reaction {
        let symbol = match self.symbol {
            Some(symbol) => symbol,
            None => return Reaction::say("No active game."),
        };
        let parts: Vec<&str> = rest.split_whitespace().collect();
        let coords = match parts.as_slice() {
            [r, c] => r.parse::<i64>().ok().zip(c.parse::<i64>().ok()),
            _ => None,
        };
        match coords {
            Some((row, column)) => Reaction::send(ClientRequest::Move {
                row,
                column,
                from: symbol,
            }),
            None => Reaction::say("Usage: move <row> <col>"),
        }
    }

    /// Consumes one pushed or replied server message, transitioning state
    /// where the protocol demands it.
    pub fn handle_server(&mut self, msg: ServerMsg) -> Vec<String> {
        match msg {
            ServerMsg::Login { status } => match status {
                LoginStatus::Ok => {
                    self.state = ClientState::LoggedIn;
                    vec![format!("Logged in as {}. Welcome!", self.me)]
                }
                LoginStatus::Duplicate => {
                    vec!["That name is taken, pick another one.".to_string()]
                }
            },
            ServerMsg::Connect { status, from } => self.on_connect(status, from),
            ServerMsg::Exchange { from, message } => vec![format!("{} {}", from, message)],
            ServerMsg::List { results } => {
                let mut out = vec!["Online users:".to_string()];
                for entry in results {
                    match entry.pfp_url {
                        Some(url) => out.push(format!("- {} ({})", entry.name, url)),
                        None => out.push(format!("- {}", entry.name)),
                    }
                }
                out
            }
            ServerMsg::Poem { results } => {
                if results.is_empty() {
                    vec!["Poem not found.".to_string()]
                } else {
                    results.lines().map(str::to_string).collect()
                }
            }
            ServerMsg::Time { results } => vec![format!("Current time: {}", results)],
            ServerMsg::PrivateMessageStatus { to, status, detail } => match status {
                PmStatus::Sent => vec![format!("[PM to {}: {}]", to, detail)],
                _ => vec![format!("[PM error: {}]", detail)],
            },
            ServerMsg::IncomingPrivateMessage { from, message } => {
                vec![format!("{} {}", from, message)]
            }
            ServerMsg::Search { results } => {
                if results.is_empty() {
                    vec!["No matches.".to_string()]
                } else {
                    results.lines().map(str::to_string).collect()
                }
            }
            ServerMsg::SetProfilePicStatus { detail, .. } => vec![format!("[PFP: {}]", detail)],
            ServerMsg::OpenTtt {
                status,
                from,
                symbol,
            } => match status {
                StartStatus::Ok => {
                    self.symbol = symbol;
                    let symbol = symbol.map(|s| s.to_string()).unwrap_or_default();
                    vec![format!(
                        "Tic-Tac-Toe with {}: you play {}. X moves first (move <row> <col>).",
                        from.unwrap_or_default(),
                        symbol
                    )]
                }
                StartStatus::SelfTarget => {
                    vec!["Cannot play against yourself.".to_string()]
                }
                StartStatus::NoUser => vec!["That user is not online.".to_string()],
            },
            ServerMsg::Update {
                status,
                from,
                turn,
                row,
                column,
            } => match status {
                TurnStatus::YourTurn => vec![format!(
                    "{} played {},{}. Your turn.",
                    from, row, column
                )],
                TurnStatus::OpponentTurn => vec![format!("Waiting for {}...", turn)],
            },
            ServerMsg::End {
                status,
                winner,
                board,
                ..
            } => {
                self.symbol = None;
                let mut out = render_board(&board);
                match status {
                    EndStatus::Win => match winner {
                        Some(w) if w == self.me => out.push("You won! 🎉".to_string()),
                        Some(w) => out.push(format!("{} won the game.", w)),
                        None => out.push("Game over.".to_string()),
                    },
                    EndStatus::Tie => out.push("It's a tie.".to_string()),
                }
                out
            }
            ServerMsg::Disconnect => {
                self.state = ClientState::LoggedIn;
                let peer = std::mem::take(&mut self.peer);
                vec![format!("({} left the chat)", peer)]
            }
        }
    }

    fn on_connect(&mut self, status: ConnectStatus, from: Option<String>) -> Vec<String> {
        match status {
            ConnectStatus::Success => {
                self.peer = self.pending_peer.take().unwrap_or_default();
                self.state = ClientState::Chatting;
                vec![format!("You are connected with {}. Chat away!", self.peer)]
            }
            ConnectStatus::SelfTarget => {
                self.pending_peer = None;
                vec!["Cannot talk to yourself.".to_string()]
            }
            ConnectStatus::NoUser => {
                self.pending_peer = None;
                vec!["User is not online, try again later.".to_string()]
            }
            ConnectStatus::Request => {
                let peer = from.unwrap_or_default();
                self.peer = peer.clone();
                self.state = ClientState::Chatting;
                vec![format!("Request from {0}. You are connected with {0}. Chat away!", peer)]
            }
        }
    }
}

fn render_board(board: &Board) -> Vec<String> {
    board
        .iter()
        .map(|row| {
            row.iter()
                .map(|cell| match cell {
                    Some(sym) => sym.to_string(),
                    None => ".".to_string(),
                })
                .collect::<Vec<_>>()
                .join(" | ")
        })
        .collect()
}
