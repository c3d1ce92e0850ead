//! §4.3: classify a prebuild's outputs against the user's stated intent.

use std::collections::{HashMap, HashSet};

use miniscript::bitcoin::consensus::deserialize;
use miniscript::bitcoin::Transaction;

use crate::address::{self, AddressClaim, CoinSpecific};
use crate::collaborators::{KeychainService, RequestContext, WalletAddressError, WalletAddressService};
use crate::error::{Result, WalletError};
use crate::explainer::explain_tx;
use crate::fixed_script_wallet::wallet_keys::RootWalletKeys;
use crate::fixed_script_wallet::wallet_scripts::{Chain, OutputScriptType};
use crate::keys::Keychain;
use crate::network::Network;

use super::{AddressDetails, ParsedOutput, ParsedTransaction, Recipient, TxParams, TxPrebuild, Verification, Wallet};

fn recipient_counts(items: impl Iterator<Item = (String, u64)>) -> HashMap<(String, u64), i64> {
    let mut counts = HashMap::new();
    for key in items {
        *counts.entry(key).or_insert(0) += 1;
    }
    counts
}

fn address_type_from_details(details: &AddressDetails) -> OutputScriptType {
    match (
        &details.coin_specific.redeem_script,
        &details.coin_specific.witness_script,
    ) {
        (Some(_), Some(_)) => OutputScriptType::P2shP2wsh,
        (None, Some(_)) => OutputScriptType::P2wsh,
        _ => OutputScriptType::P2sh,
    }
}

#[allow(clippy::too_many_arguments)]
pub async fn parse_prebuild(
    params: &TxParams,
    prebuild: &TxPrebuild,
    wallet: &Wallet,
    wallet_keychain_ids: &[String; 3],
    verification: Verification,
    wallet_keys: &RootWalletKeys,
    network: &Network,
    keychain_service: &dyn KeychainService,
    wallet_address_service: &dyn WalletAddressService,
    ctx: &RequestContext,
) -> Result<ParsedTransaction> {
    // Step 1: keychain resolution.
    let keychains: [Keychain; 3] = match verification.keychains {
        Some(k) => k,
        None => {
            if verification.disable_networking {
                return Err(WalletError::NetworkingDisabled("fetch keychains".into()));
            }
            let mut fetched = Vec::with_capacity(3);
            for id in wallet_keychain_ids {
                fetched.push(keychain_service.get_keychain(id, ctx).await?);
            }
            fetched
                .try_into()
                .map_err(|_| WalletError::KeychainIntegrityFailure("expected 3 keychains".into()))?
        }
    };

    // Step 2: explain.
    let tx_bytes = hex::decode(&prebuild.tx_hex)
        .map_err(|e| WalletError::Script(format!("bad tx hex: {e}")))?;
    let tx: Transaction = deserialize(&tx_bytes)?;
    let change_set: HashSet<String> = prebuild.tx_info.change_addresses.iter().cloned().collect();
    let explained = explain_tx(&tx, network, &change_set);

    // Step 3: missing outputs (multiset diff: recipients \ allOutputs).
    let mut actual_counts = recipient_counts(
        explained
            .outputs
            .iter()
            .filter_map(|o| o.address.as_ref().map(|a| (a.clone(), o.amount))),
    );
    let mut missing_outputs = Vec::new();
    for recipient in &params.recipients {
        let key = (recipient.address.clone(), recipient.amount);
        let remaining = actual_counts.entry(key).or_insert(0);
        if *remaining > 0 {
            *remaining -= 1;
        } else {
            missing_outputs.push(recipient.clone());
        }
    }

    // Step 4: per-output classification.
    let mut outputs = Vec::with_capacity(explained.outputs.len());
    for explained_output in &explained.outputs {
        let Some(addr) = &explained_output.address else {
            outputs.push(ParsedOutput {
                address: None,
                amount: explained_output.amount,
                vout: explained_output.vout,
                external: true,
            });
            continue;
        };

        let details = prebuild
            .tx_info
            .wallet_address_details
            .get(addr)
            .or_else(|| verification.addresses.get(addr));

        let external = match details {
            Some(details) => {
                classify_with_details(addr, details, params, wallet, wallet_keys, network)?
            }
            None => {
                if verification.disable_networking {
                    return Err(WalletError::NetworkingDisabled(format!(
                        "look up wallet address {addr}"
                    )));
                }
                match wallet_address_service.get_address(addr, ctx).await {
                    Ok(record) => {
                        let details = AddressDetails {
                            chain: record.chain,
                            index: record.index,
                            address_type: record.address_type,
                            coin_specific: record.coin_specific,
                        };
                        classify_with_details(addr, &details, params, wallet, wallet_keys, network)?
                    }
                    Err(WalletAddressError::NotFound(_)) => {
                        wallet.migrated_from.as_deref() != Some(addr.as_str())
                    }
                    Err(WalletAddressError::Other(e)) => return Err(e),
                }
            }
        };

        outputs.push(ParsedOutput {
            address: Some(addr.clone()),
            amount: explained_output.amount,
            vout: explained_output.vout,
            external,
        });
    }

    // Step 5: derived sets.
    let mut recipient_remaining = recipient_counts(
        params
            .recipients
            .iter()
            .map(|r| (r.address.clone(), r.amount)),
    );
    let mut explicit_outputs = Vec::new();
    let mut implicit_outputs = Vec::new();
    for output in &outputs {
        let is_explicit = match &output.address {
            Some(addr) => {
                let key = (addr.clone(), output.amount);
                match recipient_remaining.get_mut(&key) {
                    Some(count) if *count > 0 => {
                        *count -= 1;
                        true
                    }
                    _ => false,
                }
            }
            None => false,
        };
        if is_explicit {
            explicit_outputs.push(output.clone());
        } else {
            implicit_outputs.push(output.clone());
        }
    }

    let change_outputs: Vec<ParsedOutput> = outputs.iter().filter(|o| !o.external).cloned().collect();
    let explicit_external_outputs: Vec<ParsedOutput> =
        explicit_outputs.iter().filter(|o| o.external).cloned().collect();
    let implicit_external_outputs: Vec<ParsedOutput> =
        implicit_outputs.iter().filter(|o| o.external).cloned().collect();

    let explicit_external_spend_amount: u64 = explicit_external_outputs.iter().map(|o| o.amount).sum();
    let implicit_external_spend_amount: u64 = implicit_external_outputs.iter().map(|o| o.amount).sum();

    let key_signatures = keychains[0].key_signatures.clone();

    Ok(ParsedTransaction {
        keychains,
        key_signatures,
        outputs,
        missing_outputs,
        explicit_external_outputs,
        implicit_external_outputs,
        change_outputs,
        explicit_external_spend_amount,
        implicit_external_spend_amount,
    })
}

fn classify_with_details(
    addr: &str,
    details: &AddressDetails,
    params: &TxParams,
    wallet: &Wallet,
    wallet_keys: &RootWalletKeys,
    network: &Network,
) -> Result<bool> {
    let address_type = address_type_from_details(details);
    let chain = Chain::try_from(details.chain)?;

    let claim = AddressClaim {
        address: addr.to_string(),
        address_type,
        chain: chain.value() as i64,
        index: details.index as i64,
        coin_specific: Some(CoinSpecific {
            redeem_script: details.coin_specific.redeem_script.clone(),
            witness_script: details.coin_specific.witness_script.clone(),
            output_script: details.coin_specific.output_script.clone(),
        }),
        force_alt_script_support: false,
    };

    match address::verify_address(&claim, wallet_keys, network) {
        Ok(_) => Ok(false),
        Err(WalletError::UnexpectedAddress { .. }) | Err(WalletError::WalletAddressNotFound(_)) => {
            Ok(wallet.migrated_from.as_deref() != Some(addr))
        }
        Err(WalletError::InvalidAddressDerivationProperty(_))
            if params.change_address.as_deref() == Some(addr) =>
        {
            Ok(false)
        }
        Err(other) => Err(other),
    }
}
