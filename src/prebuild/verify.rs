//! §4.4: prebuild verification — keychain integrity, intent match, the
//! pay-as-you-go cap, and fee non-negativity.

use std::collections::HashMap;

use miniscript::bitcoin::consensus::deserialize;
use miniscript::bitcoin::{Transaction, Txid};

use crate::collaborators::{Explorer, RequestContext};
use crate::error::{Result, WalletError};
use crate::message::verify_bitcoin_message;

use super::{ParsedTransaction, TxPrebuild};

/// Implicit external spend is capped at 150 bps (1.5%) of explicit
/// external spend (§4.4 step 3, GLOSSARY "pay-as-you-go").
const PAYGO_CAP_BPS: u32 = 150;

pub struct VerifyPrebuildOptions<'a> {
    pub wallet_passphrase: Option<&'a str>,
    /// Decrypts `encrypted_prv` given the wallet passphrase (§4.4.1).
    pub decrypt: Box<dyn FnOnce(&str, &str) -> Result<String> + Send + 'a>,
}

#[tracing::instrument(skip(parsed, prebuild, explorer, ctx, options), fields(disable_networking))]
pub async fn verify_prebuild(
    parsed: &ParsedTransaction,
    prebuild: &TxPrebuild,
    explorer: Option<&dyn Explorer>,
    ctx: &RequestContext,
    disable_networking: bool,
    options: Option<VerifyPrebuildOptions<'_>>,
) -> Result<()> {
    verify_keychain_integrity(parsed, disable_networking, options)?;
    tracing::debug!("keychain integrity check passed");

    // Step 2: intent match.
    if !parsed.missing_outputs.is_empty() {
        let err = WalletError::MissingRecipients(parsed.missing_outputs.clone());
        tracing::error!(error = %err, "verify_prebuild: intent match failed");
        return Err(err);
    }

    // Step 3: pay-as-you-go cap.
    let implicit = parsed.implicit_external_spend_amount as u128;
    let explicit = parsed.explicit_external_spend_amount as u128;
    if implicit * 10_000 > explicit * PAYGO_CAP_BPS as u128 {
        let err = WalletError::ImplicitSpendLimitExceeded {
            implicit: parsed.implicit_external_spend_amount,
            explicit: parsed.explicit_external_spend_amount,
            bps: PAYGO_CAP_BPS,
        };
        tracing::error!(error = %err, "verify_prebuild: pay-as-you-go cap exceeded");
        return Err(err);
    }
    tracing::debug!(implicit, explicit, "pay-as-you-go cap check passed");

    // Step 4: fee >= 0.
    let tx_bytes =
        hex::decode(&prebuild.tx_hex).map_err(|e| WalletError::Script(format!("bad tx hex: {e}")))?;
    let tx: Transaction = deserialize(&tx_bytes)?;

    let mut fetched: HashMap<Txid, Vec<crate::collaborators::TxOutput>> = HashMap::new();
    let mut input_total: u64 = 0;
    for input in &tx.input {
        let prev_txid = input.previous_output.txid;
        let prev_vout = input.previous_output.vout as usize;

        let value = if let Some(hex_str) = prebuild.tx_info.tx_hexes.get(&prev_txid) {
            let bytes = hex::decode(hex_str).map_err(|e| WalletError::Script(format!("bad prevtx hex: {e}")))?;
            let prev_tx: Transaction = deserialize(&bytes)?;
            if prev_tx.compute_txid() != prev_txid {
                return Err(WalletError::Script(format!(
                    "prevtx hash mismatch: expected {prev_txid}, got {}",
                    prev_tx.compute_txid()
                )));
            }
            prev_tx
                .output
                .get(prev_vout)
                .ok_or_else(|| WalletError::Script(format!("prevout index {prev_vout} out of bounds")))?
                .value
                .to_sat()
        } else {
            if !fetched.contains_key(&prev_txid) {
                if disable_networking {
                    let err = WalletError::NetworkingDisabled(format!("fetch prevtx {prev_txid}"));
                    tracing::error!(error = %err, "verify_prebuild: networking disabled for required prevtx fetch");
                    return Err(err);
                }
                let explorer = explorer
                    .ok_or_else(|| WalletError::ExplorerUnavailable("no explorer configured".into()))?;
                tracing::debug!(txid = %prev_txid, "fetching prevtx from explorer");
                let outputs = explorer.get_tx(prev_txid, ctx).await?;
                fetched.insert(prev_txid, outputs);
            }
            fetched
                .get(&prev_txid)
                .and_then(|outputs| outputs.get(prev_vout))
                .ok_or_else(|| WalletError::Script(format!("prevout index {prev_vout} out of bounds")))?
                .value
        };
        input_total = input_total.saturating_add(value);
    }

    let output_total: u64 = tx.output.iter().map(|o| o.value.to_sat()).sum();
    if input_total < output_total {
        let err = WalletError::NegativeFee {
            inputs: input_total,
            outputs: output_total,
        };
        tracing::error!(error = %err, "verify_prebuild: fee would be negative");
        return Err(err);
    }
    tracing::debug!(input_total, output_total, "fee non-negativity check passed");

    Ok(())
}

fn verify_keychain_integrity(
    parsed: &ParsedTransaction,
    disable_networking: bool,
    options: Option<VerifyPrebuildOptions<'_>>,
) -> Result<()> {
    let Some(key_signatures) = &parsed.key_signatures else {
        if disable_networking {
            let err = WalletError::KeychainIntegrityFailure(
                "missing key signatures and networking disabled".into(),
            );
            tracing::error!(error = %err, "verify_keychain_integrity: no key signatures to fall back on");
            return Err(err);
        }
        tracing::warn!("prebuild has no key signatures; skipping keychain integrity check");
        return Ok(());
    };

    let options = options.ok_or_else(|| {
        WalletError::KeychainIntegrityFailure("key signatures present but no passphrase/decrypt supplied".into())
    })?;

    let user = &parsed.keychains[0];
    let secp = miniscript::bitcoin::secp256k1::Secp256k1::new();
    let xprv = user.resolve_xprv(options.wallet_passphrase, options.decrypt)?;
    let neutered = miniscript::bitcoin::bip32::Xpub::from_priv(&secp, &xprv);
    if neutered != user.xpub {
        let err = WalletError::KeychainIntegrityFailure(
            "private key does not match published xpub".into(),
        );
        tracing::error!(error = %err, "verify_keychain_integrity: xpub mismatch");
        return Err(err);
    }

    let backup_pub = parsed.keychains[1].xpub.to_string();
    let bitgo_pub = parsed.keychains[2].xpub.to_string();

    let backup_ok = verify_bitcoin_message(&user.xpub.public_key, &backup_pub, &key_signatures.backup_pub_sig)
        .unwrap_or(false);
    let bitgo_ok = verify_bitcoin_message(&user.xpub.public_key, &bitgo_pub, &key_signatures.bitgo_pub_sig)
        .unwrap_or(false);

    if !backup_ok || !bitgo_ok {
        let err = WalletError::KeychainIntegrityFailure(
            "backup/bitgo key signature verification failed".into(),
        );
        tracing::error!(error = %err, "verify_keychain_integrity: key signature verification failed");
        return Err(err);
    }

    Ok(())
}
