//! Authoritative match state and its reconciliation against the local,
//! predicted view of the fight.

use std::collections::HashMap;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::player::PlayerName;
use crate::protocol::Snapshot;

/// Horizontal speed of the local plane, world units per second.
pub const PLANE_SPEED: f32 = 200.0;
/// Players spawned right of this x fire leftwards, and vice versa.
pub const ARENA_MIDPOINT_X: f32 = 280.0;
pub const MAX_HEALTH: i32 = 100;

const FIRE_SPEED: f32 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScreenSide {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchOutcome {
    Win,
    Loss,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projectile {
    pub id: i32,
    pub position: Vec2,
    /// Only known once the server acknowledged a local shot; snapshots do
    /// not carry ownership.
    pub owner: Option<PlayerName>,
}

/// Per-match entity state, fed by authoritative server messages and the
/// local movement prediction.
///
/// Snapshots replace whole collections, never patch them; the local
/// player's predicted position is display-only smoothing that the next
/// snapshot overwrites. Game over latches once, from either an explicit
/// server verdict or the local health fallback, and later updates are
/// ignored until `reset`.
#[derive(Debug)]
pub struct MatchState {
    local: PlayerName,
    positions: HashMap<PlayerName, Vec2>,
    health: HashMap<PlayerName, i32>,
    projectiles: HashMap<i32, Projectile>,
    eliminated: Vec<PlayerName>,
    side: ScreenSide,
    started: bool,
    outcome: Option<MatchOutcome>,
}

impl MatchState {
    pub fn new(local: impl Into<PlayerName>) -> Self {
        Self {
            local: local.into(),
            positions: HashMap::new(),
            health: HashMap::new(),
            projectiles: HashMap::new(),
            eliminated: Vec::new(),
            side: ScreenSide::Left,
            started: false,
            outcome: None,
        }
    }

    pub fn local(&self) -> &PlayerName {
        &self.local
    }

    /// True once the first snapshot arrived.
    pub fn started(&self) -> bool {
        self.started
    }

    pub fn side(&self) -> ScreenSide {
        self.side
    }

    pub fn outcome(&self) -> Option<MatchOutcome> {
        self.outcome
    }

    pub fn is_over(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn local_position(&self) -> Option<Vec2> {
        self.positions.get(&self.local).copied()
    }

    pub fn position_of(&self, name: &PlayerName) -> Option<Vec2> {
        self.positions.get(name).copied()
    }

    pub fn health_of(&self, name: &PlayerName) -> Option<i32> {
        self.health.get(name).copied()
    }

    pub fn positions(&self) -> impl Iterator<Item = (&PlayerName, &Vec2)> {
        self.positions.iter()
    }

    pub fn health(&self) -> impl Iterator<Item = (&PlayerName, &i32)> {
        self.health.iter()
    }

    pub fn projectiles(&self) -> impl Iterator<Item = &Projectile> {
        self.projectiles.values()
    }

    pub fn projectile_count(&self) -> usize {
        self.projectiles.len()
    }

    /// Players whose health crossed to zero since the last call; the
    /// display layer consumes this for the explosion cue.
    pub fn take_eliminated(&mut self) -> Vec<PlayerName> {
        std::mem::take(&mut self.eliminated)
    }

    /// Merge one authoritative snapshot. Each section replaces its whole
    /// collection; the local player's predicted position is overwritten
    /// along with everything else.
    pub fn apply_snapshot(&mut self, snapshot: &Snapshot) {
        if self.is_over() {
            return;
        }
        self.started = true;

        self.projectiles = snapshot
            .projectiles
            .iter()
            .map(|&(id, position)| {
                (
                    id,
                    Projectile {
                        id,
                        position,
                        owner: None,
                    },
                )
            })
            .collect();

        let mut health = HashMap::with_capacity(snapshot.health.len());
        for (name, hp) in &snapshot.health {
            let name = PlayerName::from(name.as_str());
            if *hp <= 0 && self.health.get(&name).is_some_and(|&prev| prev > 0) {
                self.eliminated.push(name.clone());
            }
            health.insert(name, *hp);
        }
        self.health = health;

        self.positions = snapshot
            .positions
            .iter()
            .map(|(name, position)| (PlayerName::from(name.as_str()), *position))
            .collect();

        if let Some(position) = self.local_position() {
            self.side = if position.x > ARENA_MIDPOINT_X {
                ScreenSide::Right
            } else {
                ScreenSide::Left
            };
        }

        self.check_health();
    }

    /// Single-player health update between snapshots.
    pub fn apply_hit(&mut self, player: &str, hp: i32) {
        if self.is_over() {
            return;
        }
        let name = PlayerName::from(player);
        if hp <= 0 && self.health.get(&name).is_some_and(|&prev| prev > 0) {
            self.eliminated.push(name.clone());
        }
        self.health.insert(name, hp);
        self.check_health();
    }

    /// The server assigned a canonical id and position to a shot; insert
    /// or overwrite by id. Local fire intents are never drawn before this.
    pub fn apply_fire_ack(&mut self, id: i32, owner: &str, position: Vec2) {
        if self.is_over() {
            return;
        }
        self.projectiles.insert(
            id,
            Projectile {
                id,
                position,
                owner: Some(PlayerName::from(owner)),
            },
        );
    }

    /// Explicit server verdict. Latches once; repeats are ignored.
    pub fn apply_game_over(&mut self, winner: &str) {
        if self.is_over() {
            return;
        }
        let outcome = if self.local == *winner {
            MatchOutcome::Win
        } else {
            MatchOutcome::Loss
        };
        log::info!("match over, winner {winner}");
        self.outcome = Some(outcome);
    }

    /// Advance the local plane for this frame's input and return the new
    /// position to report to the server. `None` when there is nothing to
    /// send: no input, no known local position yet, or the match ended.
    pub fn predict_move(&mut self, direction: Vec2, dt: f32) -> Option<Vec2> {
        if self.is_over() || !self.started || direction == Vec2::ZERO {
            return None;
        }
        let position = self.positions.get_mut(&self.local)?;
        *position += direction.normalize() * PLANE_SPEED * dt;
        Some(*position)
    }

    /// Muzzle velocity for a local shot: towards the opponent's side.
    pub fn fire_velocity(&self) -> Vec2 {
        match self.side {
            ScreenSide::Left => Vec2::new(FIRE_SPEED, 0.0),
            ScreenSide::Right => Vec2::new(-FIRE_SPEED, 0.0),
        }
    }

    pub fn reset(&mut self) {
        self.positions.clear();
        self.health.clear();
        self.projectiles.clear();
        self.eliminated.clear();
        self.side = ScreenSide::Left;
        self.started = false;
        self.outcome = None;
    }

    // Fallback for a missed GAME_OVER: declare the match over as soon as
    // any tracked health reaches zero. The local player losing wins the
    // tie if both drop in the same merge.
    fn check_health(&mut self) {
        if self.is_over() {
            return;
        }
        if self.health.get(&self.local).is_some_and(|&hp| hp <= 0) {
            log::info!("local player down, declaring defeat");
            self.outcome = Some(MatchOutcome::Loss);
            return;
        }
        if self
            .health
            .iter()
            .any(|(name, &hp)| *name != self.local && hp <= 0)
        {
            log::info!("opponent down, declaring victory");
            self.outcome = Some(MatchOutcome::Win);
        }
    }
}
