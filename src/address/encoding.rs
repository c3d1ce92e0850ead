//! Base58check (P2SH classes) and segwit-bech32 (P2WSH) address codecs,
//! bit-exact per the per-coin version byte / HRP table in §6. Uses `bs58`
//! for base58check (its `with_check_version` already implements the
//! leading-version-byte + double-SHA256 checksum BIP16 expects) and
//! `bech32`'s `segwit` module for BIP173 witness addresses.

use bech32::segwit;
use bech32::{Fe32, Hrp};

use crate::error::{Result, WalletError};
use crate::network::Network;

pub fn encode_base58check_p2sh(network: &Network, hash: [u8; 20]) -> String {
    bs58::encode(hash)
        .with_check_version(network.script_hash_version)
        .into_string()
}

pub fn encode_bech32_p2wsh(network: &Network, program: [u8; 32]) -> Result<String> {
    let hrp_str = network.bech32_hrp.ok_or(WalletError::P2wshUnsupported)?;
    let hrp = Hrp::parse(hrp_str).map_err(|e| WalletError::Script(format!("bad hrp: {e}")))?;
    let witness_version =
        Fe32::try_from(0u8).map_err(|e| WalletError::Script(format!("bad witness version: {e}")))?;
    segwit::encode(hrp, witness_version, &program)
        .map_err(|e| WalletError::Script(format!("bech32 encode failed: {e}")))
}

/// Best-effort parse: does `address` decode at all against `network`'s
/// base58 version bytes (the alt byte only when `force_alt_script_support`
/// is set) or bech32 HRP? Doesn't reconstruct a hash — `verify_address`
/// rederives and compares the full canonical string instead of trusting
/// the decoded payload.
pub fn decode_address(address: &str, network: &Network, force_alt_script_support: bool) -> Option<()> {
    if let Ok(bytes) = bs58::decode(address).with_check(None).into_vec() {
        let version = *bytes.first()?;
        let allowed = network.allowed_script_hash_versions(force_alt_script_support);
        if allowed.contains(&version) || version == network.pub_key_hash_version {
            return Some(());
        }
        return None;
    }

    if let Some(hrp_str) = network.bech32_hrp {
        if let Ok((hrp, _witver, _program)) = segwit::decode(address) {
            if hrp.as_str().eq_ignore_ascii_case(hrp_str) {
                return Some(());
            }
        }
    }

    None
}
