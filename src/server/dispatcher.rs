//! The event loop and action switchboard. One thread, one `poll(2)` call per
//! tick; all registries are plain owned fields on [`Server`], so no handler
//! ever needs a lock. Per tick, already-logged-in sockets are serviced first,
//! then pending logins, then new connections are accepted, so in-progress
//! conversations and games take priority over onboarding.

use std::collections::{HashMap, HashSet};
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::os::fd::{AsRawFd, RawFd};
use std::time::Duration;

use chrono::Local;
use log::{debug, info, warn};

use crate::common::{self, UserEntry};
use crate::game::{GameEngine, MoveOutcome, StatsBook, Symbol};
use crate::groups::GroupRegistry;
use crate::index::MessageIndex;
use crate::poems::PoemIndex;
use crate::protocol::{
    ClientRequest, ConnectStatus, EndStatus, LoginStatus, PfpStatus, PmStatus, ServerMsg,
    StartStatus, TurnStatus,
};
use crate::server::perf::PerfMonitor;
use crate::server::state::{ServerConfig, Session};
use crate::transport;

/// Sends one framed message. Sockets are non-blocking for readiness
/// purposes, so the frame write runs in blocking mode and the socket is
/// flipped back afterwards.
fn send_msg(stream: &mut TcpStream, msg: &ServerMsg) -> io::Result<()> {
    let payload = msg
        .to_wire()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    stream.set_nonblocking(false)?;
    let res = transport::send_frame(stream, &payload);
    let _ = stream.set_nonblocking(true);
    res
}

/// Receives one framed payload, same blocking dance as [`send_msg`]. The
/// socket was reported readable, so at worst this stalls for the tail of one
/// small frame from a slow peer.
fn recv_msg(stream: &mut TcpStream) -> io::Result<Option<String>> {
    stream.set_nonblocking(false)?;
    let res = transport::recv_frame(stream);
    let _ = stream.set_nonblocking(true);
    res
}

pub struct Server {
    listener: TcpListener,
    /// Accepted sockets that have not completed login yet.
    new_clients: Vec<TcpStream>,
    sessions: HashMap<String, Session>,
    groups: GroupRegistry,
    games: GameEngine,
    stats: StatsBook,
    poems: PoemIndex,
    perf: PerfMonitor,
    config: ServerConfig,
}

impl Server {
    /// Loads the poem corpus and statistics and binds the listener. A
    /// missing or corrupt corpus or numeral mapping is fatal; there is no
    /// degraded mode.
    pub fn bind(config: ServerConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let poems = PoemIndex::from_files(&config.corpus, &config.numerals)?;
        let stats = StatsBook::load(&config.stats_file());
        let listener = TcpListener::bind(&config.addr)?;
        listener.set_nonblocking(true)?;
        info!("server listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            new_clients: Vec::new(),
            sessions: HashMap::new(),
            groups: GroupRegistry::new(),
            games: GameEngine::new(),
            stats,
            poems,
            perf: PerfMonitor::new(config.perf_log()),
            config,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the loop forever. Only a failure of the multiplexing call itself
    /// escapes; per-connection faults are absorbed in the tick.
    pub fn run(&mut self) -> io::Result<()> {
        loop {
            self.tick(Duration::from_secs(1))?;
        }
    }

    /// One iteration of the event loop.
    pub fn tick(&mut self, timeout: Duration) -> io::Result<()> {
        let readable = self.poll_readable(timeout)?;

        let ready: Vec<String> = self
            .sessions
            .iter()
            .filter(|(_, sess)| readable.contains(&sess.stream.as_raw_fd()))
            .map(|(name, _)| name.clone())
            .collect();
        for name in ready {
            // A broadcast earlier in this tick may have logged the peer out.
            if self.sessions.contains_key(&name) {
                self.handle_frame(&name);
            }
        }

        let pending = std::mem::take(&mut self.new_clients);
        for stream in pending {
            if readable.contains(&stream.as_raw_fd()) {
                self.try_login(stream);
            } else {
                self.new_clients.push(stream);
            }
        }

        if readable.contains(&self.listener.as_raw_fd()) {
            self.accept_new();
        }

        self.perf
            .maybe_log(self.sessions.len(), self.groups.group_count());
        Ok(())
    }

    fn poll_readable(&self, timeout: Duration) -> io::Result<HashSet<RawFd>> {
        let mut fds: Vec<libc::pollfd> =
            Vec::with_capacity(1 + self.sessions.len() + self.new_clients.len());
        let mut watch = |fd: RawFd| {
            fds.push(libc::pollfd {
                fd,
                events: libc::POLLIN,
                revents: 0,
            })
        };
        watch(self.listener.as_raw_fd());
        for sess in self.sessions.values() {
            watch(sess.stream.as_raw_fd());
        }
        for stream in &self.new_clients {
            watch(stream.as_raw_fd());
        }

        let timeout_ms = timeout.as_millis().min(i32::MAX as u128) as libc::c_int;
        let rc = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout_ms) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(HashSet::new());
            }
            return Err(err);
        }
        Ok(fds
            .iter()
            .filter(|p| p.revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR) != 0)
            .map(|p| p.fd)
            .collect())
    }

    fn accept_new(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, addr)) => {
                    info!("new client from {}", addr);
                    if let Err(e) = stream.set_nonblocking(true) {
                        warn!("cannot set {} non-blocking: {}", addr, e);
                        continue;
                    }
                    self.new_clients.push(stream);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!("accept failed: {}", e);
                    break;
                }
            }
        }
    }

    /// First frame from a pending connection must be a login. Duplicate or
    /// unusable names get a `duplicate` reply and the connection stays
    /// pending for a retry; malformed JSON closes it.
    fn try_login(&mut self, mut stream: TcpStream) {
        let raw = match recv_msg(&mut stream) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                info!("client left before sending login info");
                return;
            }
            Err(e) => {
                warn!("error during login: {}", e);
                return;
            }
        };
        let req = match ClientRequest::from_wire(&raw) {
            Ok(req) => req,
            Err(e) => {
                warn!("malformed login payload, closing connection: {}", e);
                return;
            }
        };
        let name = match req {
            ClientRequest::Login { name } => name,
            other => {
                warn!("expected login, got {:?}; keeping connection pending", other);
                self.new_clients.push(stream);
                return;
            }
        };

        if !common::name_is_usable(&name) || self.sessions.contains_key(&name) {
            info!("duplicate login attempt for {:?}", name);
            let reply = ServerMsg::Login {
                status: LoginStatus::Duplicate,
            };
            if send_msg(&mut stream, &reply).is_ok() {
                self.new_clients.push(stream);
            }
            return;
        }

        let index = match MessageIndex::load(&self.config.data_dir, &name) {
            Ok(index) => index,
            Err(e) => {
                warn!("cannot load index for {}: {}; starting fresh", name, e);
                MessageIndex::new(&name)
            }
        };
        let reply = ServerMsg::Login {
            status: LoginStatus::Ok,
        };
        if let Err(e) = send_msg(&mut stream, &reply) {
            warn!("login reply to {} failed: {}", name, e);
            return;
        }
        self.groups.join(&name);
        info!("{} logged in", name);
        debug!("{}", self.groups.list_all());
        self.sessions.insert(name.clone(), Session::new(stream, index));
    }

    /// Flushes the user's index, forgets them everywhere and closes the
    /// socket. Any live game pairing is cleared so the abandoned opponent's
    /// next move is rejected instead of dangling.
    fn logout(&mut self, name: &str) {
        if let Some(sess) = self.sessions.remove(name) {
            if let Err(e) = sess.index.save(&self.config.data_dir) {
                warn!("cannot save index for {}: {}", name, e);
            }
            self.groups.leave(name);
            self.games.remove_player(name);
            info!("{} logged out", name);
        }
    }

    /// Sends a message to a logged-in session; a transport failure logs the
    /// session out. Unknown recipients are ignored.
    fn send_to(&mut self, name: &str, msg: &ServerMsg) {
        let failed = match self.sessions.get_mut(name) {
            Some(sess) => match send_msg(&mut sess.stream, msg) {
                Ok(()) => false,
                Err(e) => {
                    warn!("send to {} failed: {}", name, e);
                    true
                }
            },
            None => false,
        };
        if failed {
            self.logout(name);
        }
    }

    /// Reads and routes one frame from a logged-in session.
    fn handle_frame(&mut self, name: &str) {
        let raw = match self.sessions.get_mut(name) {
            Some(sess) => recv_msg(&mut sess.stream),
            None => return,
        };
        match raw {
            Err(e) => {
                warn!("socket error from {}: {}", name, e);
                self.logout(name);
            }
            Ok(None) => {
                info!("{} disconnected", name);
                self.logout(name);
            }
            Ok(Some(payload)) => match ClientRequest::from_wire(&payload) {
                Err(e) => warn!("malformed frame from {}: {}", name, e),
                Ok(req) => self.dispatch(name, req),
            },
        }
    }

    /// The action switchboard.
    fn dispatch(&mut self, name: &str, req: ClientRequest) {
        debug!("request from {}: {:?}", name, req);
        match req {
            ClientRequest::Connect { target } => self.handle_connect(name, target),
            ClientRequest::Exchange { from, message } => self.handle_exchange(name, from, message),
            ClientRequest::List => self.handle_list(name),
            ClientRequest::Poem { target } => self.handle_poem(name, target),
            ClientRequest::Time => {
                let results = Local::now().format("%I:%M%p").to_string();
                self.send_to(name, &ServerMsg::Time { results });
            }
            ClientRequest::PrivateMessage { to, message } => self.handle_pm(name, to, message),
            ClientRequest::Search { target } => self.handle_search(name, target),
            ClientRequest::SetProfilePic { url } => {
                if let Some(sess) = self.sessions.get_mut(name) {
                    sess.pfp_url = Some(url);
                }
                let reply = ServerMsg::SetProfilePicStatus {
                    status: PfpStatus::Ok,
                    detail: "Profile picture updated.".to_string(),
                };
                self.send_to(name, &reply);
            }
            ClientRequest::StartTtt { target } => self.handle_start_ttt(name, target),
            ClientRequest::Move { row, column, from } => self.handle_move(name, row, column, from),
            ClientRequest::Disconnect => self.handle_disconnect(name),
            ClientRequest::Login { .. } => {
                warn!("unexpected login frame from already logged-in {}", name)
            }
            ClientRequest::Unknown => warn!("unknown action from {}", name),
        }
    }

    fn handle_connect(&mut self, name: &str, target: String) {
        let reply = if target == name {
            ServerMsg::Connect {
                status: ConnectStatus::SelfTarget,
                from: None,
            }
        } else if self.groups.is_member(&target) {
            self.groups.connect(name, &target);
            let room = self.groups.list_with(name);
            let push = ServerMsg::Connect {
                status: ConnectStatus::Request,
                from: Some(name.to_string()),
            };
            for peer in room.iter().skip(1).cloned().collect::<Vec<_>>() {
                self.send_to(&peer, &push);
            }
            ServerMsg::Connect {
                status: ConnectStatus::Success,
                from: None,
            }
        } else {
            ServerMsg::Connect {
                status: ConnectStatus::NoUser,
                from: None,
            }
        };
        self.send_to(name, &reply);
    }

    /// Broadcast: the timestamped line lands in the sender's and every
    /// recipient's history index, and every other session gets the raw
    /// exchange pushed.
    fn handle_exchange(&mut self, name: &str, from: String, message: String) {
        let archived = common::chat_line(name, &message);
        if let Some(sess) = self.sessions.get_mut(name) {
            sess.index.add_msg_and_index(&archived);
        }
        let others: Vec<String> = self
            .sessions
            .keys()
            .filter(|n| n.as_str() != name)
            .cloned()
            .collect();
        let push = ServerMsg::Exchange { from, message };
        for peer in others {
            if let Some(sess) = self.sessions.get_mut(&peer) {
                sess.index.add_msg_and_index(&archived);
            }
            self.send_to(&peer, &push);
        }
    }

    fn handle_list(&mut self, name: &str) {
        let results: Vec<UserEntry> = self
            .sessions
            .iter()
            .map(|(n, sess)| UserEntry {
                name: n.clone(),
                pfp_url: sess.pfp_url.clone(),
            })
            .collect();
        self.send_to(name, &ServerMsg::List { results });
    }

    fn handle_poem(&mut self, name: &str, target: u32) {
        info!("{} asks for poem {}", name, target);
        let results = match self.poems.get_poem(target) {
            Some(lines) => lines.join("\n"),
            None => String::new(),
        };
        self.send_to(name, &ServerMsg::Poem { results });
    }

    fn handle_pm(&mut self, name: &str, to: String, message: String) {
        let (status, detail) = if to == name {
            (
                PmStatus::SelfMessage,
                "Cannot send a private message to yourself.".to_string(),
            )
        } else if self.sessions.contains_key(&to) {
            let push = ServerMsg::IncomingPrivateMessage {
                from: format!("[PM from {}]", name),
                message,
            };
            self.send_to(&to, &push);
            (PmStatus::Sent, format!("PM sent to {}.", to))
        } else {
            (PmStatus::UserOffline, format!("User {} is not online.", to))
        };
        let reply = ServerMsg::PrivateMessageStatus { to, status, detail };
        self.send_to(name, &reply);
    }

    fn handle_search(&mut self, name: &str, target: String) {
        debug!("search request from {} for {:?}", name, target);
        let results = match self.sessions.get(name) {
            Some(sess) => sess
                .index
                .search(&target)
                .into_iter()
                .map(|(_, m)| m.to_string())
                .collect::<Vec<_>>()
                .join("\n"),
            None => String::new(),
        };
        self.send_to(name, &ServerMsg::Search { results });
    }

    fn handle_start_ttt(&mut self, name: &str, target: String) {
        if target == name {
            let reply = ServerMsg::OpenTtt {
                status: StartStatus::SelfTarget,
                from: None,
                symbol: None,
            };
            self.send_to(name, &reply);
            return;
        }
        if !self.sessions.contains_key(&target) {
            let reply = ServerMsg::OpenTtt {
                status: StartStatus::NoUser,
                from: None,
                symbol: None,
            };
            self.send_to(name, &reply);
            return;
        }
        if let Err(e) = self.games.start(name, &target) {
            warn!("cannot start game between {} and {}: {}", name, target, e);
            return;
        }
        info!("tic-tac-toe: {} (X) vs {} (O)", name, target);
        let to_initiator = ServerMsg::OpenTtt {
            status: StartStatus::Ok,
            from: Some(name.to_string()),
            symbol: Some(Symbol::X),
        };
        let to_target = ServerMsg::OpenTtt {
            status: StartStatus::Ok,
            from: Some(name.to_string()),
            symbol: Some(Symbol::O),
        };
        self.send_to(name, &to_initiator);
        self.send_to(&target, &to_target);
    }

    fn handle_move(&mut self, name: &str, row: i64, column: i64, symbol: Symbol) {
        let opponent = match self.games.opponent_of(name) {
            Some(op) => op.to_string(),
            None => {
                warn!("move from {} with no active game", name);
                return;
            }
        };
        // The wire vocabulary has no move-error reply, so rejected moves are
        // dropped with a log line and the board stays as it was.
        let outcome = match self.games.apply_move(name, row, column, symbol) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("rejected move from {}: {}", name, e);
                return;
            }
        };
        match outcome {
            MoveOutcome::Continue => {
                let to_opponent = ServerMsg::Update {
                    status: TurnStatus::YourTurn,
                    from: name.to_string(),
                    turn: opponent.clone(),
                    row,
                    column,
                };
                let to_mover = ServerMsg::Update {
                    status: TurnStatus::OpponentTurn,
                    from: name.to_string(),
                    turn: opponent.clone(),
                    row,
                    column,
                };
                self.send_to(&opponent, &to_opponent);
                self.send_to(name, &to_mover);
            }
            MoveOutcome::Win {
                winner,
                symbol,
                board,
            } => {
                let end = ServerMsg::End {
                    status: EndStatus::Win,
                    winner: Some(winner.clone()),
                    winning_symbol: Some(symbol),
                    board,
                };
                self.send_to(&opponent, &end);
                self.send_to(name, &end);
                let loser = if winner == name {
                    opponent
                } else {
                    name.to_string()
                };
                let streak = self.stats.record_win(&winner, &loser);
                self.broadcast_announcement(format!(
                    "{} has won a game of Tic-Tac-Toe! Current win streak: {}.",
                    winner, streak
                ));
            }
            MoveOutcome::Tie { board } => {
                let end = ServerMsg::End {
                    status: EndStatus::Tie,
                    winner: None,
                    winning_symbol: None,
                    board,
                };
                self.send_to(&opponent, &end);
                self.send_to(name, &end);
                self.stats.record_tie(name, &opponent);
                self.broadcast_announcement(format!(
                    "The Tic-Tac-Toe game between {} and {} was a tie!",
                    name, opponent
                ));
            }
        }
    }

    /// Game results go to every logged-in session, not just the players.
    fn broadcast_announcement(&mut self, announcement: String) {
        info!("broadcasting game result: {}", announcement);
        let everyone: Vec<String> = self.sessions.keys().cloned().collect();
        let push = ServerMsg::Exchange {
            from: "[GameServer]".to_string(),
            message: announcement,
        };
        for peer in everyone {
            self.send_to(&peer, &push);
        }
    }

    /// Leaves the current room; if exactly one member remains after the
    /// collapse, they are told the room is gone.
    fn handle_disconnect(&mut self, name: &str) {
        let mut room = self.groups.list_with(name);
        self.groups.disconnect(name);
        room.retain(|m| m != name);
        if room.len() == 1 {
            self.send_to(&room[0], &ServerMsg::Disconnect);
        }
    }
}
