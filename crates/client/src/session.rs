//! Session controller
//!
//! Owns the connection and drives the screen flow from inbound protocol
//! lines. The display layer renders the state exposed here and forwards
//! user intents through the methods below; it never touches the wire.
//!
//! ```text
//! ┌──────────────┐   login()    ┌────────────────┐  "Login successful" ┌─────────┐
//! │ Disconnected │ ────────────▶│ Authenticating │ ───────────────────▶│ InLobby │
//! └──────────────┘              └────────────────┘                     └─────────┘
//!        ▲                             │                                │       │
//!        │        timeout / refusal    │       INVITE_RESULT:ACCEPTED   │       │
//!        │◀────────────────────────────┘                                ▼       │
//!        │                                                ┌───────────────────┐ │
//!        │◀── LOGOUT_OK or server close ◀─ AwaitingLogout │ AwaitingMatchStart│ │
//!        │                                      ▲         └───────────────────┘ │
//!        │                                      │ LOGOUT / DELETE_ME  first     │
//!        │    connection loss, anywhere         │                     STATE     │
//!        │◀───────────────────────────          │              ┌─────────┐      │
//!        │                                 InLobby ◀───────────│ InMatch │◀─────┘
//!        │                              (game over + return)   └─────────┘
//! ```
//!
//! Authentication is the one synchronous exchange: after LOGIN/REGISTER
//! the controller takes from the transport's central buffer with a
//! bounded wait. Everything after that flows through subscriber queues,
//! drained non-blockingly once per frame by [`SessionController::update`].

use std::io;
use std::sync::mpsc::{Receiver, TryRecvError};

use glam::Vec2;

use dogfight::arena::MatchState;
use dogfight::lobby::LobbyState;
use dogfight::player::PlayerName;
use dogfight::protocol::Message;

use crate::net::{ClientConfig, Transport};

const LOGIN_OK: &str = "Login successful";
const REGISTER_OK: &str = "Registration successful";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Authenticating,
    InLobby,
    AwaitingMatchStart,
    InMatch,
    AwaitingLogout,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("cannot reach server: {0}")]
    Connect(#[source] io::Error),
    #[error("server not responding")]
    AuthTimeout,
    #[error("{0}")]
    AuthRejected(String),
    #[error("not connected")]
    NotConnected,
    #[error("send failed: {0}")]
    Send(#[from] io::Error),
}

/// Server verdict on a registration attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisterReply {
    pub accepted: bool,
    pub message: String,
}

enum Inbound {
    Line(String),
    Idle,
    Gone,
}

pub struct SessionController {
    config: ClientConfig,
    state: SessionState,
    identity: Option<PlayerName>,
    transport: Option<Transport>,
    feed: Option<Receiver<String>>,
    lobby: Option<LobbyState>,
    arena: Option<MatchState>,
    status: Option<String>,
}

impl SessionController {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            state: SessionState::Disconnected,
            identity: None,
            transport: None,
            feed: None,
            lobby: None,
            arena: None,
            status: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn identity(&self) -> Option<&PlayerName> {
        self.identity.as_ref()
    }

    pub fn lobby(&self) -> Option<&LobbyState> {
        self.lobby.as_ref()
    }

    pub fn arena(&self) -> Option<&MatchState> {
        self.arena.as_ref()
    }

    /// Last user-visible status line (e.g. the disconnect reason), if any.
    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    /// Connect and authenticate. Blocks the caller for at most the
    /// configured auth timeout; on any failure the session is back at
    /// `Disconnected` and the error is reported, never retried.
    pub fn login(
        &mut self,
        host: &str,
        port: u16,
        user: &str,
        pass: &str,
    ) -> Result<(), SessionError> {
        self.disconnect();
        self.status = None;

        let transport = self.open(host, port)?;
        self.state = SessionState::Authenticating;

        if let Err(err) = transport.send(
            &Message::Login {
                user: user.to_string(),
                pass: pass.to_string(),
            }
            .to_string(),
        ) {
            self.state = SessionState::Disconnected;
            return Err(err.into());
        }

        match transport.take_central(self.config.auth_timeout) {
            Some(line) if line.trim().eq_ignore_ascii_case(LOGIN_OK) => {
                // Anything that raced in between the reply and now moves
                // into the lobby queue before it is registered.
                let feed = transport.subscribe_with_backlog();
                if let Err(err) = transport.send(&Message::List.to_string()) {
                    self.state = SessionState::Disconnected;
                    return Err(err.into());
                }

                self.transport = Some(transport);
                self.feed = Some(feed);
                self.identity = Some(PlayerName::from(user));
                self.lobby = Some(LobbyState::new(user));
                self.arena = None;
                self.state = SessionState::InLobby;
                log::info!("logged in as {user}");
                Ok(())
            }
            Some(line) => {
                self.state = SessionState::Disconnected;
                Err(SessionError::AuthRejected(line.trim().to_string()))
            }
            None => {
                self.state = SessionState::Disconnected;
                Err(SessionError::AuthTimeout)
            }
        }
    }

    /// Create an account. Same bounded synchronous exchange as `login`;
    /// the connection is dropped afterwards either way and the caller
    /// logs in separately.
    pub fn register(
        &mut self,
        host: &str,
        port: u16,
        user: &str,
        email: &str,
        pass: &str,
    ) -> Result<RegisterReply, SessionError> {
        self.disconnect();
        self.status = None;

        let transport = self.open(host, port)?;
        self.state = SessionState::Authenticating;

        let sent = transport.send(
            &Message::Register {
                user: user.to_string(),
                email: email.to_string(),
                pass: pass.to_string(),
            }
            .to_string(),
        );
        if let Err(err) = sent {
            self.state = SessionState::Disconnected;
            return Err(err.into());
        }

        let reply = transport.take_central(self.config.auth_timeout);
        self.state = SessionState::Disconnected;
        match reply {
            Some(line) => {
                let message = line.trim().to_string();
                Ok(RegisterReply {
                    accepted: starts_with_ci(&message, REGISTER_OK),
                    message,
                })
            }
            None => Err(SessionError::AuthTimeout),
        }
    }

    /// Drain the current subscriber queue and apply every line. Call once
    /// per frame; never blocks.
    pub fn update(&mut self) {
        match self.state {
            SessionState::InLobby => self.pump_lobby(),
            SessionState::AwaitingMatchStart | SessionState::InMatch => self.pump_match(),
            SessionState::AwaitingLogout => self.pump_logout(),
            SessionState::Disconnected | SessionState::Authenticating => {}
        }
    }

    // ── Intents ─────────────────────────────────────────────────────

    pub fn send_chat(&mut self, text: &str) -> Result<(), SessionError> {
        if self.state != SessionState::InLobby || text.is_empty() {
            return Ok(());
        }
        let Some(me) = self.identity.clone() else {
            return Err(SessionError::NotConnected);
        };
        self.send(&Message::Chat {
            from: me.to_string(),
            text: text.to_string(),
        })
    }

    pub fn invite(&mut self, target: &str) -> Result<(), SessionError> {
        if self.state != SessionState::InLobby {
            return Ok(());
        }
        if self.identity.as_ref().is_some_and(|me| *me == target) {
            return Ok(());
        }
        self.send(&Message::Invite {
            target: target.to_string(),
        })
    }

    /// Answer the pending invitation, if there is one.
    pub fn respond_invite(&mut self, accept: bool) -> Result<(), SessionError> {
        if self.state != SessionState::InLobby {
            return Ok(());
        }
        let Some(inviter) = self.lobby.as_mut().and_then(LobbyState::take_invite) else {
            return Ok(());
        };
        self.send(&Message::InviteResponse { inviter, accept })
    }

    pub fn request_query(&mut self, slot: u8) -> Result<(), SessionError> {
        if self.state != SessionState::InLobby {
            return Ok(());
        }
        if !(1..=3).contains(&slot) {
            log::debug!("ignoring stat query for slot {slot}");
            return Ok(());
        }
        if let Some(lobby) = self.lobby.as_mut() {
            lobby.clear_query_result();
        }
        self.send(&Message::Query { slot })
    }

    /// Advance the local plane for this frame's input and report the new
    /// position. Prediction is display-only; the next snapshot overwrites
    /// it.
    pub fn move_local(&mut self, direction: Vec2, dt: f32) -> Result<(), SessionError> {
        if self.state != SessionState::InMatch {
            return Ok(());
        }
        let Some(position) = self
            .arena
            .as_mut()
            .and_then(|arena| arena.predict_move(direction, dt))
        else {
            return Ok(());
        };
        self.send(&Message::Move { position })
    }

    /// Fire towards the opponent's side. Nothing is drawn locally until
    /// the server's FIRE_ACK comes back with the canonical projectile.
    pub fn fire(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::InMatch {
            return Ok(());
        }
        let Some(arena) = self.arena.as_ref() else {
            return Ok(());
        };
        if arena.is_over() {
            return Ok(());
        }
        let Some(position) = arena.local_position() else {
            return Ok(());
        };
        let velocity = arena.fire_velocity();
        self.send(&Message::Fire { position, velocity })
    }

    /// Back to the lobby once the match is decided: per-match state and
    /// the central backlog are discarded so a stale game-over line cannot
    /// replay into the next match.
    pub fn return_to_lobby(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::InMatch {
            return Ok(());
        }
        if !self.arena.as_ref().is_some_and(MatchState::is_over) {
            return Ok(());
        }
        let Some(transport) = self.transport.as_ref() else {
            return Err(SessionError::NotConnected);
        };

        transport.clear_central();
        self.feed = Some(transport.subscribe_with_backlog());
        self.arena = None;
        if let Some(me) = self.identity.clone() {
            self.lobby = Some(LobbyState::new(me));
        }
        self.state = SessionState::InLobby;
        log::info!("returned to lobby");
        self.send(&Message::List)
    }

    pub fn request_logout(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::InLobby {
            return Ok(());
        }
        self.send(&Message::Logout)?;
        self.state = SessionState::AwaitingLogout;
        log::info!("logout requested");
        Ok(())
    }

    /// Request account deletion. The server answers by closing the
    /// connection; until then every local intent is ignored.
    pub fn delete_account(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::InLobby {
            return Ok(());
        }
        self.send(&Message::DeleteMe)?;
        self.state = SessionState::AwaitingLogout;
        log::info!("account deletion requested");
        Ok(())
    }

    /// Drop the connection and all session state. Safe in any state.
    pub fn disconnect(&mut self) {
        if let Some(transport) = self.transport.take() {
            transport.dispose();
        }
        self.feed = None;
        self.lobby = None;
        self.arena = None;
        self.identity = None;
        self.state = SessionState::Disconnected;
    }

    /// Players whose health crossed to zero since the last call.
    pub fn take_eliminated(&mut self) -> Vec<PlayerName> {
        self.arena
            .as_mut()
            .map(MatchState::take_eliminated)
            .unwrap_or_default()
    }

    // ── Inbound pumps ───────────────────────────────────────────────

    fn pump_lobby(&mut self) {
        loop {
            let line = match self.poll_feed() {
                Inbound::Line(line) => line,
                Inbound::Idle => break,
                Inbound::Gone => {
                    self.connection_lost();
                    return;
                }
            };
            let Some(msg) = Message::parse(&line) else {
                continue;
            };

            match msg {
                Message::UpdateList(names) => {
                    if let Some(lobby) = self.lobby.as_mut() {
                        lobby.set_roster(names);
                    }
                }
                Message::Chat { from, text } => {
                    if let Some(lobby) = self.lobby.as_mut() {
                        lobby.push_chat(from, text);
                    }
                }
                Message::InviteRequest { inviter, targets } => {
                    if let Some(lobby) = self.lobby.as_mut() {
                        lobby.offer_invite(&inviter, &targets);
                    }
                }
                Message::InviteResult {
                    inviter,
                    target,
                    outcome,
                } => {
                    let me = self.identity.as_ref();
                    let involved = me.is_some_and(|me| {
                        *me == inviter.as_str() || *me == target.as_str()
                    });
                    if involved && outcome.is_accepted() {
                        self.enter_match();
                        return;
                    }
                    if involved {
                        log::info!("invite between {inviter} and {target} fell through");
                    }
                }
                Message::QueryResult { text, .. } => {
                    if let Some(lobby) = self.lobby.as_mut() {
                        lobby.set_query_result(text);
                    }
                }
                Message::LogoutOk => {
                    self.finish_logout();
                    return;
                }
                _ => {}
            }
        }
    }

    fn pump_match(&mut self) {
        loop {
            let line = match self.poll_feed() {
                Inbound::Line(line) => line,
                Inbound::Idle => break,
                Inbound::Gone => {
                    self.connection_lost();
                    return;
                }
            };
            let Some(msg) = Message::parse(&line) else {
                continue;
            };
            let Some(arena) = self.arena.as_mut() else {
                return;
            };

            match msg {
                Message::State(snapshot) => {
                    arena.apply_snapshot(&snapshot);
                    if self.state == SessionState::AwaitingMatchStart && arena.started() {
                        self.state = SessionState::InMatch;
                        log::info!("first snapshot received, match running");
                    }
                }
                Message::FireAck {
                    id,
                    owner,
                    position,
                } => arena.apply_fire_ack(id, &owner, position),
                Message::Hit { player, health } => arena.apply_hit(&player, health),
                Message::GameOver { winner } => arena.apply_game_over(&winner),
                _ => {}
            }
        }
    }

    fn pump_logout(&mut self) {
        loop {
            match self.poll_feed() {
                Inbound::Line(line) => {
                    if matches!(Message::parse(&line), Some(Message::LogoutOk)) {
                        self.finish_logout();
                        return;
                    }
                }
                Inbound::Idle => return,
                // Account deletion ends with the server closing the
                // connection instead of a LOGOUT_OK.
                Inbound::Gone => {
                    self.finish_logout();
                    return;
                }
            }
        }
    }

    // ── Internals ───────────────────────────────────────────────────

    fn open(&self, host: &str, port: u16) -> Result<Transport, SessionError> {
        Transport::connect((host, port), self.config.connect_timeout)
            .map_err(SessionError::Connect)
    }

    fn send(&self, msg: &Message) -> Result<(), SessionError> {
        let transport = self.transport.as_ref().ok_or(SessionError::NotConnected)?;
        transport.send(&msg.to_string())?;
        Ok(())
    }

    fn poll_feed(&self) -> Inbound {
        let Some(feed) = self.feed.as_ref() else {
            return Inbound::Gone;
        };
        match feed.try_recv() {
            Ok(line) => Inbound::Line(line),
            Err(TryRecvError::Empty) => Inbound::Idle,
            Err(TryRecvError::Disconnected) => Inbound::Gone,
        }
    }

    /// Both sides accepted: swap the feed over to a fresh match queue and
    /// wait for the first snapshot.
    fn enter_match(&mut self) {
        let Some(transport) = self.transport.as_ref() else {
            return;
        };
        let Some(me) = self.identity.clone() else {
            return;
        };

        // A snapshot may already have raced past the invite result; the
        // backlog handoff keeps it. Leftover lobby lines are harmless,
        // the match pump does not react to them.
        self.feed = Some(transport.subscribe_with_backlog());
        self.arena = Some(MatchState::new(me));
        self.state = SessionState::AwaitingMatchStart;
        log::info!("invite accepted, waiting for first snapshot");
    }

    fn finish_logout(&mut self) {
        log::info!("logged out");
        self.disconnect();
    }

    fn connection_lost(&mut self) {
        log::warn!("connection to server lost");
        self.disconnect();
        self.status = Some("Connection lost.".to_string());
    }
}

impl Default for SessionController {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}

fn starts_with_ci(line: &str, prefix: &str) -> bool {
    line.get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}
