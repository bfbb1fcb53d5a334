use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// A player identity as the server hands it out.
///
/// The server is inconsistent about casing (roster entries, invite targets
/// and snapshot sections do not always agree), so equality and hashing
/// ignore ASCII case while the original spelling is kept for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerName(String);

impl PlayerName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl PartialEq for PlayerName {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Eq for PlayerName {}

impl PartialEq<str> for PlayerName {
    fn eq(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other)
    }
}

impl PartialEq<&str> for PlayerName {
    fn eq(&self, other: &&str) -> bool {
        self.0.eq_ignore_ascii_case(other)
    }
}

impl Hash for PlayerName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for byte in self.0.bytes() {
            byte.to_ascii_lowercase().hash(state);
        }
    }
}

impl fmt::Display for PlayerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayerName {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for PlayerName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_name_equality_ignores_case() {
        assert_eq!(PlayerName::from("Alice"), PlayerName::from("alice"));
        assert_eq!(PlayerName::from("BOB"), "bob");
        assert_ne!(PlayerName::from("Alice"), PlayerName::from("Bob"));
    }

    #[test]
    fn test_name_as_map_key() {
        let mut map = HashMap::new();
        map.insert(PlayerName::from("Alice"), 100);
        map.insert(PlayerName::from("ALICE"), 50);

        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&PlayerName::from("aLiCe")), Some(&50));
    }

    #[test]
    fn test_display_keeps_original_spelling() {
        assert_eq!(PlayerName::from("McFly").to_string(), "McFly");
    }
}
