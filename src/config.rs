//! Flow tunables.
//!
//! Defaults suit a chat party game. Each value can be overridden from the
//! environment; a value that does not parse is ignored with a warning.

/// Consecutive zero-event restarts a `repeat` tolerates before failing.
pub const DEFAULT_SPIN_LIMIT: usize = 64;

/// Players needed before a lobby can start.
pub const DEFAULT_MIN_PLAYERS: usize = 2;

/// Lobby capacity.
pub const DEFAULT_MAX_PLAYERS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowConfig {
    pub spin_limit: usize,
    pub min_players: usize,
    pub max_players: usize,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            spin_limit: DEFAULT_SPIN_LIMIT,
            min_players: DEFAULT_MIN_PLAYERS,
            max_players: DEFAULT_MAX_PLAYERS,
        }
    }
}

impl FlowConfig {
    /// Read `RUNECAST_SPIN_LIMIT`, `RUNECAST_MIN_PLAYERS` and
    /// `RUNECAST_MAX_PLAYERS`, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let read = |key: &str, default: usize| match lookup(key) {
            None => default,
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(value) => value,
                Err(_) => {
                    tracing::warn!(key, value = %raw, default, "Ignoring invalid config value");
                    default
                }
            },
        };

        let mut config = Self {
            spin_limit: read("RUNECAST_SPIN_LIMIT", defaults.spin_limit),
            min_players: read("RUNECAST_MIN_PLAYERS", defaults.min_players),
            max_players: read("RUNECAST_MAX_PLAYERS", defaults.max_players),
        };

        if config.max_players < config.min_players {
            tracing::warn!(
                min = config.min_players,
                max = config.max_players,
                "Max players below min players, raising max"
            );
            config.max_players = config.min_players;
        }

        tracing::info!(
            spin_limit = config.spin_limit,
            min_players = config.min_players,
            max_players = config.max_players,
            "Flow config loaded"
        );
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        assert_eq!(FlowConfig::from_lookup(|_| None), FlowConfig::default());
    }

    #[test]
    fn test_overrides() {
        let config = FlowConfig::from_lookup(lookup(&[
            ("RUNECAST_MIN_PLAYERS", "3"),
            ("RUNECAST_MAX_PLAYERS", " 8 "),
        ]));
        assert_eq!(config.min_players, 3);
        assert_eq!(config.max_players, 8);
        assert_eq!(config.spin_limit, DEFAULT_SPIN_LIMIT);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = FlowConfig::from_lookup(lookup(&[("RUNECAST_SPIN_LIMIT", "lots")]));
        assert_eq!(config.spin_limit, DEFAULT_SPIN_LIMIT);
    }

    #[test]
    fn test_max_raised_to_min() {
        let config = FlowConfig::from_lookup(lookup(&[
            ("RUNECAST_MIN_PLAYERS", "4"),
            ("RUNECAST_MAX_PLAYERS", "2"),
        ]));
        assert_eq!(config.max_players, 4);
    }
}
