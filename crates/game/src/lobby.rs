//! Client-side lobby state: the roster, the chat log, a pending
//! invitation and the last stat-query result.

use serde::{Deserialize, Serialize};

use crate::player::PlayerName;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub from: String,
    pub text: String,
}

#[derive(Debug)]
pub struct LobbyState {
    local: PlayerName,
    players: Vec<String>,
    chat: Vec<ChatMessage>,
    pending_invite: Option<String>,
    query_result: Option<String>,
}

impl LobbyState {
    pub fn new(local: impl Into<PlayerName>) -> Self {
        Self {
            local: local.into(),
            players: Vec::new(),
            chat: Vec::new(),
            pending_invite: None,
            query_result: None,
        }
    }

    pub fn local(&self) -> &PlayerName {
        &self.local
    }

    pub fn players(&self) -> &[String] {
        &self.players
    }

    pub fn chat(&self) -> &[ChatMessage] {
        &self.chat
    }

    /// Inviter of the invitation currently awaiting a decision, if any.
    pub fn pending_invite(&self) -> Option<&str> {
        self.pending_invite.as_deref()
    }

    pub fn query_result(&self) -> Option<&str> {
        self.query_result.as_deref()
    }

    /// Replace the roster with the server's full player list.
    pub fn set_roster(&mut self, names: Vec<String>) {
        self.players = names;
    }

    pub fn push_chat(&mut self, from: String, text: String) {
        self.chat.push(ChatMessage { from, text });
    }

    /// Offer an invitation to the local player. Only invitations that name
    /// the local player among their targets are actionable; anything else
    /// is dropped. Returns whether the invitation is now pending.
    pub fn offer_invite(&mut self, inviter: &str, targets: &[String]) -> bool {
        let addressed = targets.iter().any(|target| self.local == target.as_str());
        if !addressed {
            log::debug!("invite from {inviter} not addressed to {}", self.local);
            return false;
        }
        self.pending_invite = Some(inviter.to_string());
        true
    }

    /// Consume the pending invitation to answer it.
    pub fn take_invite(&mut self) -> Option<String> {
        self.pending_invite.take()
    }

    pub fn set_query_result(&mut self, text: String) {
        self.query_result = Some(text);
    }

    pub fn clear_query_result(&mut self) {
        self.query_result = None;
    }
}
