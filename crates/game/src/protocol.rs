use std::fmt;

use glam::Vec2;
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 12345;

/// One protocol line, either direction.
///
/// The wire format is newline-terminated UTF-8 text, colon-separated
/// command words. Prefix matching is case-insensitive and payload fields
/// are split with a fixed arity so that trailing fields (chat bodies,
/// query results) may themselves contain `:`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    Login { user: String, pass: String },
    Register { user: String, email: String, pass: String },
    List,
    UpdateList(Vec<String>),
    Chat { from: String, text: String },
    Invite { target: String },
    InviteRequest { inviter: String, targets: Vec<String> },
    InviteResponse { inviter: String, accept: bool },
    InviteResult { inviter: String, target: String, outcome: InviteOutcome },
    Query { slot: u8 },
    QueryResult { slot: u8, text: String },
    Move { position: Vec2 },
    Fire { position: Vec2, velocity: Vec2 },
    FireAck { id: i32, owner: String, position: Vec2 },
    State(Snapshot),
    Hit { player: String, health: i32 },
    GameOver { winner: String },
    Logout,
    LogoutOk,
    DeleteMe,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InviteOutcome {
    Accepted,
    Rejected(String),
}

impl InviteOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// Full authoritative match snapshot: `STATE:<projectiles>|<health>|<positions>`.
///
/// Every section is optional; an empty section replaces the corresponding
/// collection with nothing. Entries that fail to parse are skipped rather
/// than failing the whole snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub projectiles: Vec<(i32, Vec2)>,
    pub health: Vec<(String, i32)>,
    pub positions: Vec<(String, Vec2)>,
}

impl Message {
    /// Parse one inbound line. Unknown prefixes and wrong-arity payloads
    /// yield `None`; the pump must never die on a bad line.
    pub fn parse(line: &str) -> Option<Message> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        if line.eq_ignore_ascii_case("LIST") {
            return Some(Message::List);
        }
        if line.eq_ignore_ascii_case("LOGOUT") {
            return Some(Message::Logout);
        }
        if line.eq_ignore_ascii_case("LOGOUT_OK") {
            return Some(Message::LogoutOk);
        }
        if line.eq_ignore_ascii_case("DELETE_ME") {
            return Some(Message::DeleteMe);
        }

        if let Some(rest) = strip_prefix_ci(line, "QUERY") {
            return parse_query(rest);
        }

        if let Some(rest) = strip_prefix_ci(line, "LOGIN:") {
            let (user, pass) = rest.split_once(':')?;
            return Some(Message::Login {
                user: user.to_string(),
                pass: pass.to_string(),
            });
        }
        if let Some(rest) = strip_prefix_ci(line, "REGISTER:") {
            let (user, rest) = rest.split_once(':')?;
            let (email, pass) = rest.split_once(':')?;
            return Some(Message::Register {
                user: user.to_string(),
                email: email.to_string(),
                pass: pass.to_string(),
            });
        }
        if let Some(rest) = strip_prefix_ci(line, "UPDATE_LIST:") {
            return Some(Message::UpdateList(split_names(rest)));
        }
        if let Some(rest) = strip_prefix_ci(line, "CHAT:") {
            let (from, text) = rest.split_once(':')?;
            return Some(Message::Chat {
                from: from.to_string(),
                text: text.to_string(),
            });
        }
        if let Some(rest) = strip_prefix_ci(line, "INVITE_REQUEST:") {
            let (inviter, targets) = rest.split_once(':')?;
            return Some(Message::InviteRequest {
                inviter: inviter.to_string(),
                targets: split_names(targets),
            });
        }
        if let Some(rest) = strip_prefix_ci(line, "INVITE_RESP:") {
            let (inviter, verdict) = rest.split_once(':')?;
            let accept = if verdict.eq_ignore_ascii_case("ACCEPT") {
                true
            } else if verdict.eq_ignore_ascii_case("REJECT") {
                false
            } else {
                return None;
            };
            return Some(Message::InviteResponse {
                inviter: inviter.to_string(),
                accept,
            });
        }
        if let Some(rest) = strip_prefix_ci(line, "INVITE_RESULT:") {
            let (inviter, rest) = rest.split_once(':')?;
            let (target, outcome) = rest.split_once(':')?;
            let outcome = if outcome.eq_ignore_ascii_case("ACCEPTED") {
                InviteOutcome::Accepted
            } else {
                InviteOutcome::Rejected(outcome.to_string())
            };
            return Some(Message::InviteResult {
                inviter: inviter.to_string(),
                target: target.to_string(),
                outcome,
            });
        }
        if let Some(rest) = strip_prefix_ci(line, "INVITE:") {
            return Some(Message::Invite {
                target: rest.to_string(),
            });
        }
        if let Some(rest) = strip_prefix_ci(line, "MOVE:") {
            let fields: Vec<&str> = rest.split(':').collect();
            if fields.len() != 2 {
                return None;
            }
            return Some(Message::Move {
                position: parse_vec2(fields[0], fields[1])?,
            });
        }
        if let Some(rest) = strip_prefix_ci(line, "FIRE_ACK:") {
            let fields: Vec<&str> = rest.split(':').collect();
            if fields.len() < 4 {
                return None;
            }
            return Some(Message::FireAck {
                id: fields[0].trim().parse().ok()?,
                owner: fields[1].to_string(),
                position: parse_vec2(fields[2], fields[3])?,
            });
        }
        if let Some(rest) = strip_prefix_ci(line, "FIRE:") {
            let fields: Vec<&str> = rest.split(':').collect();
            if fields.len() != 4 {
                return None;
            }
            return Some(Message::Fire {
                position: parse_vec2(fields[0], fields[1])?,
                velocity: parse_vec2(fields[2], fields[3])?,
            });
        }
        if let Some(rest) = strip_prefix_ci(line, "STATE:") {
            return Some(Message::State(parse_snapshot(rest)));
        }
        if let Some(rest) = strip_prefix_ci(line, "HIT:") {
            let (player, health) = rest.split_once(':')?;
            return Some(Message::Hit {
                player: player.to_string(),
                health: health.trim().parse().ok()?,
            });
        }
        if let Some(rest) = strip_prefix_ci(line, "GAME_OVER:") {
            return Some(Message::GameOver {
                winner: rest.to_string(),
            });
        }

        log::debug!("ignoring unrecognized line: {line:?}");
        None
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Login { user, pass } => write!(f, "LOGIN:{user}:{pass}"),
            Message::Register { user, email, pass } => {
                write!(f, "REGISTER:{user}:{email}:{pass}")
            }
            Message::List => f.write_str("LIST"),
            Message::UpdateList(names) => write!(f, "UPDATE_LIST:{}", names.join(",")),
            Message::Chat { from, text } => write!(f, "CHAT:{from}:{text}"),
            Message::Invite { target } => write!(f, "INVITE:{target}"),
            Message::InviteRequest { inviter, targets } => {
                write!(f, "INVITE_REQUEST:{inviter}:{}", targets.join(","))
            }
            Message::InviteResponse { inviter, accept } => {
                let verdict = if *accept { "ACCEPT" } else { "REJECT" };
                write!(f, "INVITE_RESP:{inviter}:{verdict}")
            }
            Message::InviteResult {
                inviter,
                target,
                outcome,
            } => {
                let outcome = match outcome {
                    InviteOutcome::Accepted => "ACCEPTED",
                    InviteOutcome::Rejected(raw) => raw.as_str(),
                };
                write!(f, "INVITE_RESULT:{inviter}:{target}:{outcome}")
            }
            Message::Query { slot } => write!(f, "QUERY{slot}"),
            Message::QueryResult { slot, text } => write!(f, "QUERY{slot}_RESULT:{text}"),
            Message::Move { position } => {
                write!(f, "MOVE:{:.0}:{:.0}", position.x, position.y)
            }
            Message::Fire { position, velocity } => write!(
                f,
                "FIRE:{:.0}:{:.0}:{:.0}:{:.0}",
                position.x, position.y, velocity.x, velocity.y
            ),
            Message::FireAck {
                id,
                owner,
                position,
            } => write!(f, "FIRE_ACK:{id}:{owner}:{:.0}:{:.0}", position.x, position.y),
            Message::State(snapshot) => write!(f, "STATE:{snapshot}"),
            Message::Hit { player, health } => write!(f, "HIT:{player}:{health}"),
            Message::GameOver { winner } => write!(f, "GAME_OVER:{winner}"),
            Message::Logout => f.write_str("LOGOUT"),
            Message::LogoutOk => f.write_str("LOGOUT_OK"),
            Message::DeleteMe => f.write_str("DELETE_ME"),
        }
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let projectiles: Vec<String> = self
            .projectiles
            .iter()
            .map(|(id, p)| format!("{id}:{:.0}:{:.0}", p.x, p.y))
            .collect();
        let health: Vec<String> = self
            .health
            .iter()
            .map(|(name, hp)| format!("{name}:{hp}"))
            .collect();
        let positions: Vec<String> = self
            .positions
            .iter()
            .map(|(name, p)| format!("{name}:{:.0}:{:.0}", p.x, p.y))
            .collect();
        write!(
            f,
            "{}|{}|{}",
            projectiles.join(","),
            health.join(","),
            positions.join(",")
        )
    }
}

fn strip_prefix_ci<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    match line.get(..prefix.len()) {
        Some(head) if head.eq_ignore_ascii_case(prefix) => Some(&line[prefix.len()..]),
        _ => None,
    }
}

fn parse_query(rest: &str) -> Option<Message> {
    let slot = match rest.bytes().next()? {
        b'1' => 1,
        b'2' => 2,
        b'3' => 3,
        _ => return None,
    };
    let tail = &rest[1..];
    if tail.is_empty() {
        return Some(Message::Query { slot });
    }
    let text = strip_prefix_ci(tail, "_RESULT:")?;
    Some(Message::QueryResult {
        slot,
        text: text.to_string(),
    })
}

fn parse_vec2(x: &str, y: &str) -> Option<Vec2> {
    Some(Vec2::new(
        x.trim().parse().ok()?,
        y.trim().parse().ok()?,
    ))
}

fn split_names(csv: &str) -> Vec<String> {
    csv.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_snapshot(payload: &str) -> Snapshot {
    let mut sections = payload.splitn(3, '|');
    let projectiles = sections.next().unwrap_or("");
    let health = sections.next().unwrap_or("");
    let positions = sections.next().unwrap_or("");

    Snapshot {
        projectiles: split_entries(projectiles, |fields| {
            if fields.len() != 3 {
                return None;
            }
            Some((
                fields[0].trim().parse().ok()?,
                parse_vec2(fields[1], fields[2])?,
            ))
        }),
        health: split_entries(health, |fields| {
            if fields.len() != 2 {
                return None;
            }
            Some((fields[0].to_string(), fields[1].trim().parse().ok()?))
        }),
        positions: split_entries(positions, |fields| {
            if fields.len() != 3 {
                return None;
            }
            Some((fields[0].to_string(), parse_vec2(fields[1], fields[2])?))
        }),
    }
}

fn split_entries<T>(section: &str, parse: impl Fn(&[&str]) -> Option<T>) -> Vec<T> {
    section
        .split(',')
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| {
            let fields: Vec<&str> = entry.split(':').collect();
            parse(&fields)
        })
        .collect()
}
