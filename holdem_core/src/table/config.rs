//! Table configuration models.

use serde::{Deserialize, Serialize};

use crate::game::constants::MAX_SEATS;
use crate::game::entities::Chips;
use crate::game::hand::HandConfig;

/// Configuration for one table. Everything a session needs to run hands
/// and manage its clients; the directory service owns the rest of the
/// table's metadata.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct TableConfig {
    /// Table display name.
    pub name: String,

    /// Seats available, 0-based numbering.
    pub max_seats: usize,

    pub small_blind: Chips,

    pub big_blind: Chips,

    /// Forced pre-blind contribution; zero disables antes.
    pub ante: Chips,

    /// Default stack for seats created without an explicit buy-in.
    pub initial_stack: Chips,

    /// Seconds a seat has to act before the timeout handler steps in.
    pub action_timeout_secs: u64,

    /// How long a disconnected seat may reconnect before eviction.
    pub reconnect_grace_ms: u64,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            name: "Table".to_string(),
            max_seats: MAX_SEATS,
            small_blind: 10,
            big_blind: 20,
            ante: 0,
            initial_stack: 1_000,
            action_timeout_secs: 30,
            reconnect_grace_ms: 60_000,
        }
    }
}

impl TableConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.small_blind == 0 {
            return Err("Small blind must be greater than 0".to_string());
        }
        if self.big_blind <= self.small_blind {
            return Err("Big blind must be greater than small blind".to_string());
        }
        if self.max_seats < 2 || self.max_seats > MAX_SEATS {
            return Err(format!("Max seats must be between 2 and {MAX_SEATS}"));
        }
        if self.action_timeout_secs == 0 {
            return Err("Action timeout must be greater than 0".to_string());
        }
        Ok(())
    }

    pub fn hand_config(&self) -> HandConfig {
        HandConfig {
            small_blind: self.small_blind,
            big_blind: self.big_blind,
            initial_stack: self.initial_stack,
            ante: self.ante,
            action_timeout_secs: self.action_timeout_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        TableConfig::default().validate().unwrap();
    }

    #[test]
    fn inverted_blinds_rejected() {
        let config = TableConfig {
            small_blind: 20,
            big_blind: 10,
            ..TableConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_timeout_rejected() {
        let config = TableConfig {
            action_timeout_secs: 0,
            ..TableConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
