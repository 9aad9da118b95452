//! Confirmation policy: how many network confirmations a deposit needs before
//! an operator should treat it as final.

use crate::models::{defaults, BotSettings};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmationThresholds {
    pub bitcoin: i32,
    pub ethereum: i32,
    pub litecoin: i32,
    pub erc20: i32,
    pub trc20: i32,
    pub bep20: i32,
    pub polygon: i32,
    pub solana: i32,
}

impl Default for ConfirmationThresholds {
    fn default() -> Self {
        Self {
            bitcoin: defaults::bitcoin(),
            ethereum: defaults::ethereum(),
            litecoin: defaults::litecoin(),
            erc20: defaults::erc20(),
            trc20: defaults::trc20(),
            bep20: defaults::bep20(),
            polygon: defaults::polygon(),
            solana: defaults::solana(),
        }
    }
}

impl From<&BotSettings> for ConfirmationThresholds {
    fn from(s: &BotSettings) -> Self {
        Self {
            bitcoin: s.bitcoin_confirmations,
            ethereum: s.ethereum_confirmations,
            litecoin: s.litecoin_confirmations,
            erc20: s.erc20_confirmations,
            trc20: s.trc20_confirmations,
            bep20: s.bep20_confirmations,
            polygon: s.polygon_confirmations,
            solana: s.solana_confirmations,
        }
    }
}

impl ConfirmationThresholds {
    fn for_label(&self, label: &str) -> Option<i32> {
        match label.trim().to_ascii_uppercase().as_str() {
            "ERC20" => Some(self.erc20),
            "TRC20" => Some(self.trc20),
            "BEP20" => Some(self.bep20),
            "POLYGON" | "MATIC" => Some(self.polygon),
            "SOLANA" | "SOL" | "SPL" => Some(self.solana),
            "BTC" | "BITCOIN" => Some(self.bitcoin),
            "ETH" | "ETHEREUM" => Some(self.ethereum),
            "LTC" | "LITECOIN" => Some(self.litecoin),
            _ => None,
        }
    }

    fn strictest(&self) -> i32 {
        [
            self.bitcoin,
            self.ethereum,
            self.litecoin,
            self.erc20,
            self.trc20,
            self.bep20,
            self.polygon,
            self.solana,
        ]
        .into_iter()
        .max()
        .unwrap_or(1)
    }

    /// Network wins over currency, so USDT on TRC20 uses the TRC20 threshold.
    /// Unrecognised pairs get the strictest configured threshold.
    pub fn required_for(&self, currency: &str, network: Option<&str>) -> i32 {
        network
            .and_then(|n| self.for_label(n))
            .or_else(|| self.for_label(currency))
            .unwrap_or_else(|| self.strictest())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_takes_precedence_over_currency() {
        let t = ConfirmationThresholds::default();
        assert_eq!(t.required_for("USDT", Some("TRC20")), 15);
        assert_eq!(t.required_for("USDT", Some("BEP20")), 10);
        assert_eq!(t.required_for("USDC", Some("Solana")), 32);
        assert_eq!(t.required_for("USDC", Some("polygon")), 15);
    }

    #[test]
    fn currency_is_used_when_network_is_missing_or_unknown() {
        let t = ConfirmationThresholds::default();
        assert_eq!(t.required_for("BTC", None), 3);
        assert_eq!(t.required_for("LTC", Some("LTC")), 6);
        assert_eq!(t.required_for("eth", Some("mainnet")), 15);
    }

    #[test]
    fn unknown_pair_uses_strictest_threshold() {
        let t = ConfirmationThresholds {
            bitcoin: 50,
            ..Default::default()
        };
        assert_eq!(t.required_for("DOGE", None), 50);
    }
}
