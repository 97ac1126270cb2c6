use std::path::PathBuf;
use tracing::warn;

pub const DEFAULT_MAX_SIM_GAMES: u32 = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArenaConfig {
    /// Worker threads for parallel simulation games.
    pub sim_concurrency: usize,
    pub max_sim_games: u32,
    pub qtable_path: Option<PathBuf>,
    /// Base seed for every strategy's random source.
    pub seed: Option<u64>,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            sim_concurrency: default_concurrency(),
            max_sim_games: DEFAULT_MAX_SIM_GAMES,
            qtable_path: None,
            seed: None,
        }
    }
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .max(1)
}

impl ArenaConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let sim_concurrency =
            parse_or("OTHELLO_SIM_CONCURRENCY", &lookup, defaults.sim_concurrency).max(1);
        let max_sim_games =
            parse_or("OTHELLO_MAX_SIM_GAMES", &lookup, defaults.max_sim_games).max(1);
        let qtable_path = lookup("OTHELLO_QTABLE_PATH")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);
        let seed = lookup("OTHELLO_SEED").and_then(|raw| match raw.trim().parse::<u64>() {
            Ok(seed) => Some(seed),
            Err(_) => {
                warn!(key = "OTHELLO_SEED", value = %raw, "ignoring unparsable seed");
                None
            }
        });
        Self {
            sim_concurrency,
            max_sim_games,
            qtable_path,
            seed,
        }
    }
}

fn parse_or<T>(key: &str, lookup: &impl Fn(&str) -> Option<String>, default: T) -> T
where
    T: std::str::FromStr + Copy + std::fmt::Display,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, fallback = %default, "unparsable setting, using default");
            default
        }),
    }
}

/// Mixes a base seed with a game index and seat so every agent gets its own stream.
pub fn derive_seed(base: Option<u64>, index: u64, seat: u64) -> Option<u64> {
    base.map(|b| {
        let mut x = b
            ^ index.wrapping_mul(0x9E37_79B9_7F4A_7C15)
            ^ seat.wrapping_mul(0xBF58_476D_1CE4_E5B9);
        x ^= x >> 31;
        x = x.wrapping_mul(0x94D0_49BB_1331_11EB);
        x ^ (x >> 29)
    })
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
    fn reads_every_setting() {
        let config = ArenaConfig::from_lookup(lookup(&[
            ("OTHELLO_SIM_CONCURRENCY", "3"),
            ("OTHELLO_MAX_SIM_GAMES", "50"),
            ("OTHELLO_QTABLE_PATH", "/tmp/q.bin"),
            ("OTHELLO_SEED", "17"),
        ]));
        assert_eq!(config.sim_concurrency, 3);
        assert_eq!(config.max_sim_games, 50);
        assert_eq!(config.qtable_path, Some(PathBuf::from("/tmp/q.bin")));
        assert_eq!(config.seed, Some(17));
    }

    #[test]
    fn bad_values_fall_back_to_defaults() {
        let config = ArenaConfig::from_lookup(lookup(&[
            ("OTHELLO_SIM_CONCURRENCY", "many"),
            ("OTHELLO_MAX_SIM_GAMES", "-4"),
            ("OTHELLO_SEED", "abc"),
        ]));
        assert_eq!(config.sim_concurrency, default_concurrency());
        assert_eq!(config.max_sim_games, DEFAULT_MAX_SIM_GAMES);
        assert_eq!(config.seed, None);
        assert_eq!(config.qtable_path, None);
    }

    #[test]
    fn zero_concurrency_is_clamped() {
        let config = ArenaConfig::from_lookup(lookup(&[("OTHELLO_SIM_CONCURRENCY", "0")]));
        assert_eq!(config.sim_concurrency, 1);
    }

    #[test]
    fn derived_seeds_differ_per_seat_and_game() {
        assert_eq!(derive_seed(None, 1, 0), None);
        let a = derive_seed(Some(5), 0, 0);
        let b = derive_seed(Some(5), 0, 1);
        let c = derive_seed(Some(5), 1, 0);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, derive_seed(Some(5), 0, 0));
    }
}
