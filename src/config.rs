//! Protocol configuration
//!
//! Loaded from JSON; every field falls back to its default when omitted.

use crate::bet::Bet;
use crate::constants::*;
use crate::error::{BetError, Result};
use crate::keys::Network;
use crate::timelock::SearchBounds;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    pub network: Network,
    /// Bounds of the quantized-timeout search
    pub search: SearchBounds,
    /// Oracle reply deadline as a multiple of the bet resolution timeout
    pub reply_timeout_factor: u32,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            network: Network::Mainnet,
            search: SearchBounds::default(),
            reply_timeout_factor: DEFAULT_REPLY_TIMEOUT_FACTOR,
        }
    }
}

impl ProtocolConfig {
    pub fn validate(&self) -> Result<()> {
        if self.search.single == 0 || self.search.pair == 0 {
            return Err(BetError::Configuration(
                "search bounds must be positive".to_string(),
            ));
        }
        if self.reply_timeout_factor < 2 {
            return Err(BetError::Configuration(format!(
                "reply timeout factor must be at least 2, got {}",
                self.reply_timeout_factor
            )));
        }
        Ok(())
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| BetError::Configuration(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| BetError::Configuration(format!("cannot encode configuration: {e}")))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            BetError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&text)
    }

    /// Nominal (resolution, reply) timeouts in seconds
    pub fn nominal_timeouts(&self, bet: &Bet) -> Result<(u32, u32)> {
        let resolution = bet.timeout.seconds()?;
        let reply = resolution
            .checked_mul(self.reply_timeout_factor)
            .ok_or_else(|| BetError::malformed(format!("reply timeout overflows for {resolution}s")))?;
        Ok((resolution, reply))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProtocolConfig::default();
        assert_eq!(config.search.single, 2000);
        assert_eq!(config.search.pair, 2000);
        assert_eq!(config.reply_timeout_factor, 2);
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_json() {
        let config = ProtocolConfig::from_json(r#"{"network": "testnet", "search": {"single": 10, "pair": 5}}"#).unwrap();
        assert_eq!(config.network, Network::Testnet);
        assert_eq!(config.search, SearchBounds { single: 10, pair: 5 });
        assert_eq!(config.reply_timeout_factor, 2);
    }

    #[test]
    fn test_json_round_trip() {
        let config = ProtocolConfig {
            network: Network::Testnet,
            search: SearchBounds { single: 3, pair: 4 },
            reply_timeout_factor: 3,
        };
        assert_eq!(ProtocolConfig::from_json(&config.to_json().unwrap()).unwrap(), config);
    }

    #[test]
    fn test_rejects_zero_bounds() {
        assert!(matches!(
            ProtocolConfig::from_json(r#"{"search": {"single": 0, "pair": 5}}"#),
            Err(BetError::Configuration(_))
        ));
        assert!(matches!(
            ProtocolConfig::from_json(r#"{"reply_timeout_factor": 1}"#),
            Err(BetError::Configuration(_))
        ));
        assert!(ProtocolConfig::from_json("not json").is_err());
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            ProtocolConfig::load("/nonexistent/oracle-bet.json"),
            Err(BetError::Configuration(_))
        ));
    }
}
