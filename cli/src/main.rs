mod address;
mod input;
mod network;
mod vault;

use anyhow::Result;
use clap::{Parser, Subcommand};

use address::AddressCommand;
use vault::VaultCommand;

#[derive(Parser)]
#[command(name = "utxo-wallet-cli", about = "Multisig UTXO wallet core CLI")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Derive and verify wallet addresses.
    #[command(subcommand)]
    Address(AddressCommand),
    /// Inspect and transform offline-recovery artifacts.
    #[command(subcommand)]
    Vault(VaultCommand),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Address(cmd) => address::handle_command(cmd),
        Command::Vault(cmd) => vault::handle_command(cmd),
    }
}
