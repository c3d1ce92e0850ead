use anyhow::{Context, Result};
use clap::Subcommand;
use utxo_wallet_core::address::{self, AddressClaim};
use utxo_wallet_core::bitcoin::bip32::Xpub;
use utxo_wallet_core::fixed_script_wallet::wallet_keys::RootWalletKeys;
use utxo_wallet_core::fixed_script_wallet::wallet_scripts::Chain;
use utxo_wallet_core::Network;

use crate::network::NetworkArg;

#[derive(Subcommand)]
pub enum AddressCommand {
    /// Derive a wallet address at a given chain/index and print its scripts.
    Generate {
        user_xpub: String,
        backup_xpub: String,
        bitgo_xpub: String,
        /// Chain number (0/1 = p2sh, 10/11 = p2sh-p2wsh, 20/21 = p2wsh).
        chain: u32,
        index: u32,
        #[arg(short, long, value_enum, default_value = "btc")]
        network: NetworkArg,
    },
    /// Check that an address was in fact derived from this wallet.
    Verify {
        user_xpub: String,
        backup_xpub: String,
        bitgo_xpub: String,
        address: String,
        chain: u32,
        index: u32,
        #[arg(short, long, value_enum, default_value = "btc")]
        network: NetworkArg,
        /// Accept a network's historically-reused alt P2SH version byte
        /// (e.g. Litecoin's old byte 5) as well as its current one.
        #[arg(long)]
        force_alt_script_support: bool,
    },
}

fn root_keys(user_xpub: &str, backup_xpub: &str, bitgo_xpub: &str) -> Result<RootWalletKeys> {
    let parse = |s: &str| s.parse::<Xpub>().with_context(|| format!("invalid xpub: {s}"));
    let xpubs = [parse(user_xpub)?, parse(backup_xpub)?, parse(bitgo_xpub)?];
    RootWalletKeys::new(xpubs).context("failed to build wallet keys")
}

pub fn handle_command(command: AddressCommand) -> Result<()> {
    match command {
        AddressCommand::Generate {
            user_xpub,
            backup_xpub,
            bitgo_xpub,
            chain,
            index,
            network,
        } => {
            let keys = root_keys(&user_xpub, &backup_xpub, &bitgo_xpub)?;
            let network: Network = network.into();
            let chain = Chain::try_from(chain).context("unrecognized chain number")?;
            let record = address::generate_address(&keys, chain, index, &network, address::DEFAULT_THRESHOLD)
                .context("failed to derive address")?;

            println!("address:        {}", record.address);
            println!("address_type:   {}", record.address_type);
            if let Some(redeem) = &record.coin_specific.redeem_script {
                println!("redeem_script:  {}", hex::encode(redeem.as_bytes()));
            }
            if let Some(witness) = &record.coin_specific.witness_script {
                println!("witness_script: {}", hex::encode(witness.as_bytes()));
            }
            println!("output_script:  {}", hex::encode(record.coin_specific.output_script.as_bytes()));
            Ok(())
        }
        AddressCommand::Verify {
            user_xpub,
            backup_xpub,
            bitgo_xpub,
            address,
            chain,
            index,
            network,
            force_alt_script_support,
        } => {
            let keys = root_keys(&user_xpub, &backup_xpub, &bitgo_xpub)?;
            let network: Network = network.into();
            let chain_parsed = Chain::try_from(chain).context("unrecognized chain number")?;
            let derived = address::generate_address(&keys, chain_parsed, index, &network, address::DEFAULT_THRESHOLD)
                .context("failed to re-derive address for verification")?;

            let claim = AddressClaim {
                address,
                address_type: chain_parsed.script_type,
                chain: chain as i64,
                index: index as i64,
                coin_specific: Some(derived.coin_specific.clone()),
                force_alt_script_support,
            };
            address::verify_address(&claim, &keys, &network).context("address verification failed")?;
            println!("ok: address belongs to this wallet at chain {chain} index {index}");
            Ok(())
        }
    }
}
