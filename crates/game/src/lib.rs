pub mod arena;
pub mod lobby;
pub mod player;
pub mod protocol;

pub use arena::{
    ARENA_MIDPOINT_X, MAX_HEALTH, MatchOutcome, MatchState, PLANE_SPEED, Projectile, ScreenSide,
};
pub use lobby::{ChatMessage, LobbyState};
pub use player::PlayerName;
pub use protocol::{DEFAULT_PORT, InviteOutcome, Message, Snapshot};
