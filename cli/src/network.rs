//! Network argument type for CLI commands.

use clap::ValueEnum;
use utxo_wallet_core::network::{self, Network};

/// CLI argument type for network selection.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum NetworkArg {
    Btc,
    Tbtc,
    Ltc,
    Tltc,
    Bch,
    Tbch,
    Doge,
    Tdoge,
    Dash,
    Tdash,
    Zec,
    Tzec,
}

impl From<NetworkArg> for Network {
    fn from(arg: NetworkArg) -> Self {
        match arg {
            NetworkArg::Btc => network::BITCOIN,
            NetworkArg::Tbtc => network::BITCOIN_TESTNET,
            NetworkArg::Ltc => network::LITECOIN,
            NetworkArg::Tltc => network::LITECOIN_TESTNET,
            NetworkArg::Bch => network::BITCOIN_CASH,
            NetworkArg::Tbch => network::BITCOIN_CASH_TESTNET,
            NetworkArg::Doge => network::DOGECOIN,
            NetworkArg::Tdoge => network::DOGECOIN_TESTNET,
            NetworkArg::Dash => network::DASH,
            NetworkArg::Tdash => network::DASH_TESTNET,
            NetworkArg::Zec => network::ZCASH,
            NetworkArg::Tzec => network::ZCASH_TESTNET,
        }
    }
}
