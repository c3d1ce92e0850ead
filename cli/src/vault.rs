use anyhow::{Context, Result};
use clap::Subcommand;
use ptree::TreeBuilder;
use utxo_wallet_core::bitcoin::bip32::Xpub;
use utxo_wallet_core::bitcoin::consensus::{deserialize, serialize};
use utxo_wallet_core::bitcoin::Transaction;
use utxo_wallet_core::fixed_script_wallet::wallet_keys::RootWalletKeys;
use utxo_wallet_core::recovery::{self, OfflineVaultDescriptor};
use utxo_wallet_core::Network;

use crate::input::{decode_input, read_input};
use crate::network::NetworkArg;

#[derive(Subcommand)]
pub enum VaultCommand {
    /// Parse an offline-vault descriptor (as produced by an unsigned
    /// recovery sweep) and list the unspents it covers.
    Parse {
        user_xpub: String,
        backup_xpub: String,
        bitgo_xpub: String,
        #[arg(short, long, value_enum, default_value = "btc")]
        network: NetworkArg,
        /// Path to the descriptor JSON, or "-"/omitted for stdin.
        path: Option<String>,
    },
    /// Bump a prebuilt transaction's locktime to `height + 1`.
    BumpLocktime {
        height: u32,
        /// Path to the raw transaction hex, or "-"/omitted for stdin.
        path: Option<String>,
    },
}

pub fn handle_command(command: VaultCommand) -> Result<()> {
    match command {
        VaultCommand::Parse {
            user_xpub,
            backup_xpub,
            bitgo_xpub,
            network,
            path,
        } => {
            let raw = read_input(path.as_deref())?;
            let descriptor: OfflineVaultDescriptor =
                serde_json::from_str(&raw).context("malformed offline-vault descriptor")?;

            let parse_xpub = |s: &str| s.parse::<Xpub>().with_context(|| format!("invalid xpub: {s}"));
            let xpubs = [parse_xpub(&user_xpub)?, parse_xpub(&backup_xpub)?, parse_xpub(&bitgo_xpub)?];
            let wallet_keys = RootWalletKeys::new(xpubs).context("failed to build wallet keys")?;
            let network: Network = network.into();

            let unspents = recovery::parse_offline_vault(&descriptor, &wallet_keys, &network)
                .context("failed to parse offline-vault descriptor")?;

            let mut tree = TreeBuilder::new(format!("offline vault ({})", descriptor.coin));
            tree.add_empty_child(format!("tx_hex: {}", descriptor.tx_hex));
            tree.begin_child("unspents".to_string());
            for u in &unspents {
                tree.begin_child(format!("{}:{}", u.txid, u.output_index));
                tree.add_empty_child(format!("address: {}", u.address));
                tree.add_empty_child(format!("value: {} sat", u.value));
                tree.add_empty_child(format!("chain/index: {}/{}", u.chain, u.index));
                tree.end_child();
            }
            tree.end_child();
            ptree::print_tree(&tree.build()).context("failed to render tree")?;
            Ok(())
        }
        VaultCommand::BumpLocktime { height, path } => {
            let raw = read_input(path.as_deref())?;
            let bytes = decode_input(&raw)?;
            let tx: Transaction = deserialize(&bytes).context("malformed transaction")?;
            let bumped = recovery::apply_locktime_bump(tx, height).context("failed to bump locktime")?;
            println!("{}", hex::encode(serialize(&bumped)));
            Ok(())
        }
    }
}
