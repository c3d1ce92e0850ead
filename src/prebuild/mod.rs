//! Prebuild parsing (§4.3) and verification (§4.4): the core's reason
//! for existing — prove a server-proposed transaction matches user
//! intent before any key material touches it.

mod parse;
mod verify;

pub use parse::parse_prebuild;
pub use verify::verify_prebuild;

use std::collections::HashMap;

use miniscript::bitcoin::Txid;

use crate::address::CoinSpecific;
use crate::fixed_script_wallet::wallet_scripts::OutputScriptType;
use crate::keys::{KeySignatures, Keychain};

/// §3 "Recipient". Composite-key `(address, amount)` matching with
/// multiplicity is implemented in `parse.rs` via a counted multiset.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Recipient {
    pub address: String,
    pub amount: u64,
}

#[derive(Debug, Clone, Default)]
pub struct TxParams {
    pub recipients: Vec<Recipient>,
    pub change_address: Option<String>,
    pub wallet_passphrase: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AddressDetails {
    pub chain: u32,
    pub index: u32,
    pub address_type: OutputScriptType,
    pub coin_specific: CoinSpecific,
}

#[derive(Debug, Clone, Default)]
pub struct TxInfo {
    pub unspents: Vec<Unspent>,
    pub tx_hexes: HashMap<Txid, String>,
    pub wallet_address_details: HashMap<String, AddressDetails>,
    pub change_addresses: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Unspent {
    pub txid: Txid,
    pub output_index: u32,
    pub value: u64,
    pub address: String,
    pub chain: u32,
    pub index: u32,
    pub redeem_script: Option<miniscript::bitcoin::ScriptBuf>,
    pub witness_script: Option<miniscript::bitcoin::ScriptBuf>,
}

#[derive(Debug, Clone)]
pub struct TxPrebuild {
    pub tx_hex: String,
    pub tx_info: TxInfo,
}

#[derive(Debug, Clone, Default)]
pub struct Wallet {
    /// Legacy v1 base-address exception (§4.3 step 4): an address equal
    /// to this is never treated as external even on lookup failure.
    pub migrated_from: Option<String>,
}

/// Caller-supplied overrides for keychain resolution and per-address
/// verification data (§4.3 step 1, step 4).
#[derive(Debug, Default)]
pub struct Verification {
    pub keychains: Option<[Keychain; 3]>,
    pub addresses: HashMap<String, AddressDetails>,
    pub disable_networking: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedOutput {
    pub address: Option<String>,
    pub amount: u64,
    pub vout: u32,
    pub external: bool,
}

/// §3 "ParsedTransaction".
#[derive(Debug)]
pub struct ParsedTransaction {
    pub keychains: [Keychain; 3],
    pub key_signatures: Option<KeySignatures>,
    pub outputs: Vec<ParsedOutput>,
    pub missing_outputs: Vec<Recipient>,
    pub explicit_external_outputs: Vec<ParsedOutput>,
    pub implicit_external_outputs: Vec<ParsedOutput>,
    pub change_outputs: Vec<ParsedOutput>,
    pub explicit_external_spend_amount: u64,
    pub implicit_external_spend_amount: u64,
}
