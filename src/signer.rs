//! Transaction signer (§4.7): places a user (or backup) signature on
//! every non-replay-protection input, incrementally or as the final
//! cosignature, and validates each placement via §4.6 before returning.

use miniscript::bitcoin::bip32::Xpriv;
use miniscript::bitcoin::blockdata::script::Builder;
use miniscript::bitcoin::secp256k1::{self, Secp256k1};
use miniscript::bitcoin::sighash::SighashCache;
use miniscript::bitcoin::{Amount, EcdsaSighashType, ScriptBuf, Transaction, Witness};

use crate::error::{InputSignatureIssue, Result, WalletError};
use crate::fixed_script_wallet::replay_protection::ReplayProtection;
use crate::fixed_script_wallet::wallet_keys::PubTriple;
use crate::fixed_script_wallet::wallet_scripts::multisig::{parse_multisig_script_2_of_3, push_bytes};
use crate::keys::derive_secret_key;
use crate::network::Network;
use crate::prebuild::Unspent;

/// §4.7: sign every input of `tx` against its matching `unspents` entry
/// (same order), skipping platform replay-protection inputs. Builds a
/// half-signed scriptSig/witness when `is_last_signature` is false, or
/// combines with the signature already present when true.
#[tracing::instrument(skip(tx, unspents, user_xprv, replay_protection), fields(inputs = unspents.len()))]
pub fn sign_transaction(
    mut tx: Transaction,
    unspents: &[Unspent],
    user_xprv: &Xpriv,
    network: &Network,
    replay_protection: &ReplayProtection,
    is_last_signature: bool,
) -> Result<Transaction> {
    if unspents.len() != tx.input.len() {
        let err = WalletError::Script(format!(
            "unspent count {} does not match input count {}",
            unspents.len(),
            tx.input.len()
        ));
        tracing::error!(error = %err, "sign_transaction: input/unspent count mismatch");
        return Err(err);
    }

    let secp = Secp256k1::new();
    let hash_ty = EcdsaSighashType::from_consensus(network.base_sighash_u32());
    let mut issues = Vec::new();

    for (index, unspent) in unspents.iter().enumerate() {
        let path = format!("m/0/0/{}/{}", unspent.chain, unspent.index);

        if let Some(output_script) = unspent_output_script(unspent) {
            if replay_protection.is_bitgo_tainted_unspent(&output_script) {
                tracing::debug!(index, path, "skipping replay-protection-tainted input");
                continue;
            }
        }

        if let Err(e) = sign_one_input(&mut tx, index, unspent, user_xprv, &secp, hash_ty, is_last_signature) {
            tracing::debug!(index, path, error = %e, "input signing failed");
            issues.push(InputSignatureIssue {
                input_index: index,
                path,
                error: e.to_string(),
            });
            continue;
        }

        let amount = unspent.witness_script.is_some().then(|| Amount::from_sat(unspent.value));
        let settings = crate::sigverify::VerifySettings::default();
        if !crate::sigverify::verify_signature(&tx, index, amount, &settings) {
            tracing::debug!(index, path, "freshly placed signature failed verification");
            issues.push(InputSignatureIssue {
                input_index: index,
                path,
                error: "freshly placed signature failed verification".into(),
            });
        } else {
            tracing::debug!(index, path, "input signed");
        }
    }

    if !issues.is_empty() {
        let err = WalletError::InputSignatureFailure { issues };
        tracing::error!(error = %err, "sign_transaction: one or more inputs failed to sign");
        return Err(err);
    }

    Ok(tx)
}

fn unspent_output_script(unspent: &Unspent) -> Option<ScriptBuf> {
    match (&unspent.redeem_script, &unspent.witness_script) {
        (Some(redeem), _) => Some(redeem.to_p2sh()),
        (None, Some(witness)) => Some(witness.to_p2wsh()),
        (None, None) => None,
    }
}

#[allow(clippy::too_many_arguments)]
fn sign_one_input(
    tx: &mut Transaction,
    index: usize,
    unspent: &Unspent,
    user_xprv: &Xpriv,
    secp: &Secp256k1<secp256k1::All>,
    hash_ty: EcdsaSighashType,
    is_last_signature: bool,
) -> Result<()> {
    let secret_key = derive_secret_key(user_xprv, secp, unspent.chain, unspent.index)?;
    let public_key = secp256k1::PublicKey::from_secret_key(secp, &secret_key);

    // §4.7 step 3.
    let (subscript, is_segwit) = match (&unspent.redeem_script, &unspent.witness_script) {
        (_, Some(witness_script)) => (witness_script.clone(), true),
        (Some(redeem_script), None) => (redeem_script.clone(), false),
        (None, None) => return Err(WalletError::Script("unspent carries no redeem/witness script".into())),
    };

    let pubkeys = parse_multisig_script_2_of_3(&subscript)?;
    let our_index = pubkeys
        .iter()
        .position(|k| k.0 == public_key)
        .ok_or_else(|| WalletError::Key("derived key is not a signer of this script".into()))?;

    let message = {
        let mut cache = SighashCache::new(&*tx);
        let hash = if is_segwit {
            cache
                .p2wsh_signature_hash(index, &subscript, Amount::from_sat(unspent.value), hash_ty)
                .map_err(|e| WalletError::Signature(format!("sighash failed: {e}")))?
                .to_byte_array()
        } else {
            cache
                .legacy_signature_hash(index, &subscript, hash_ty.to_u32())
                .map_err(|e| WalletError::Signature(format!("sighash failed: {e}")))?
                .to_byte_array()
        };
        secp256k1::Message::from_digest(hash)
    };

    let signature = secp.sign_ecdsa(&message, &secret_key);
    let mut sig_bytes = signature.serialize_der().to_vec();
    sig_bytes.push(hash_ty.to_u32() as u8);

    let mut combined = other_signatures(tx, index, &message, &pubkeys, our_index)?;
    combined.push((our_index, sig_bytes));
    combined.sort_by_key(|(i, _)| *i);

    if is_last_signature && combined.len() < 2 {
        return Err(WalletError::Signature(
            "final signature requested with fewer than 2 signatures present".into(),
        ));
    }

    if is_segwit {
        let mut witness = Witness::new();
        witness.push(Vec::new()); // OP_CHECKMULTISIG's off-by-one null dummy
        for (_, sig) in &combined {
            witness.push(sig.clone());
        }
        witness.push(subscript.as_bytes());
        tx.input[index].witness = witness;

        tx.input[index].script_sig = match &unspent.redeem_script {
            Some(redeem) => Builder::new().push_slice(push_bytes(redeem.as_bytes())?).into_script(),
            None => ScriptBuf::new(),
        };
    } else {
        let mut builder = Builder::new().push_int(0);
        for (_, sig) in &combined {
            builder = builder.push_slice(push_bytes(sig)?);
        }
        tx.input[index].script_sig = builder.push_slice(push_bytes(subscript.as_bytes())?).into_script();
    }

    Ok(())
}

/// Signatures already present on this input (from a prior half-sign pass),
/// paired with the index of the pubkey each verifies against. Assumes every
/// cosigner signs with the same sighash type, so a single sighash `message`
/// is valid for every signature on the input.
fn other_signatures(
    tx: &Transaction,
    index: usize,
    message: &secp256k1::Message,
    pubkeys: &PubTriple,
    exclude_index: usize,
) -> Result<Vec<(usize, Vec<u8>)>> {
    let parsed = crate::sigscript::parse_signature_script(tx, index)?;
    let secp = Secp256k1::verification_only();

    let mut found = Vec::new();
    for sig_bytes in &parsed.signatures {
        if sig_bytes.len() < 2 {
            continue;
        }
        let der = &sig_bytes[..sig_bytes.len() - 1];
        let Ok(sig) = secp256k1::ecdsa::Signature::from_der(der) else {
            continue;
        };
        for (i, key) in pubkeys.iter().enumerate() {
            if i == exclude_index {
                continue;
            }
            if secp.verify_ecdsa(message, &sig, &key.0).is_ok() {
                found.push((i, sig_bytes.clone()));
                break;
            }
        }
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed_script_wallet::wallet_keys::tests::get_test_wallet_keys;
    use crate::fixed_script_wallet::wallet_scripts::{Chain, Scope, WalletScripts};
    use crate::keys::test_utils::test_wallet_xprvs;
    use miniscript::bitcoin::hashes::Hash;
    use miniscript::bitcoin::{absolute::LockTime, transaction::Version, OutPoint, Sequence, TxIn, Txid};

    fn build_unsigned_tx(n: usize) -> Transaction {
        Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: (0..n)
                .map(|_| TxIn {
                    previous_output: OutPoint::new(Txid::all_zeros(), 0),
                    script_sig: ScriptBuf::new(),
                    sequence: Sequence::ZERO,
                    witness: Witness::new(),
                })
                .collect(),
            output: vec![],
        }
    }

    #[test]
    fn half_then_full_sign_p2sh_input() {
        let wallet_keys = get_test_wallet_keys("signer-p2sh");
        let xprvs = test_wallet_xprvs("signer-p2sh");
        let chain = Chain::new(crate::address::AddressType::P2sh, Scope::External);
        let scripts = WalletScripts::from_wallet_keys(&wallet_keys, chain, 0, &crate::network::BITCOIN).unwrap();
        let redeem_script = match &scripts {
            WalletScripts::P2sh(s) => s.redeem_script.clone(),
            _ => unreachable!(),
        };

        let unspent = Unspent {
            txid: Txid::all_zeros(),
            output_index: 0,
            value: 50_000,
            address: "irrelevant".into(),
            chain: chain.value(),
            index: 0,
            redeem_script: Some(redeem_script),
            witness_script: None,
        };

        let tx = build_unsigned_tx(1);
        let replay_protection = ReplayProtection::default();

        let half_signed = sign_transaction(tx, &[unspent.clone()], &xprvs[0], &crate::network::BITCOIN, &replay_protection, false).unwrap();
        assert!(!half_signed.input[0].script_sig.is_empty());

        let full_signed = sign_transaction(half_signed, &[unspent], &xprvs[1], &crate::network::BITCOIN, &replay_protection, true).unwrap();
        assert!(!full_signed.input[0].script_sig.is_empty());
    }

    #[test]
    fn half_then_full_sign_p2wsh_input() {
        let wallet_keys = get_test_wallet_keys("signer-p2wsh");
        let xprvs = test_wallet_xprvs("signer-p2wsh");
        let chain = Chain::new(crate::address::AddressType::P2wsh, Scope::External);
        let scripts = WalletScripts::from_wallet_keys(&wallet_keys, chain, 0, &crate::network::BITCOIN).unwrap();
        let witness_script = match &scripts {
            WalletScripts::P2wsh(s) => s.witness_script.clone(),
            _ => unreachable!(),
        };

        let unspent = Unspent {
            txid: Txid::all_zeros(),
            output_index: 0,
            value: 50_000,
            address: "irrelevant".into(),
            chain: chain.value(),
            index: 0,
            redeem_script: None,
            witness_script: Some(witness_script),
        };

        let tx = build_unsigned_tx(1);
        let replay_protection = ReplayProtection::default();

        let half_signed = sign_transaction(tx, &[unspent.clone()], &xprvs[0], &crate::network::BITCOIN, &replay_protection, false).unwrap();
        assert!(half_signed.input[0].script_sig.is_empty());
        assert_eq!(half_signed.input[0].witness.len(), 3);

        let full_signed = sign_transaction(half_signed, &[unspent], &xprvs[1], &crate::network::BITCOIN, &replay_protection, true).unwrap();
        assert_eq!(full_signed.input[0].witness.len(), 4);
    }

    #[test]
    fn tainted_replay_protection_input_is_skipped() {
        use miniscript::bitcoin::bip32::Xpub;
        use miniscript::bitcoin::blockdata::opcodes::all::OP_CHECKSIG;
        use miniscript::bitcoin::CompressedPublicKey;

        let xprvs = test_wallet_xprvs("signer-replay");
        let secp = Secp256k1::new();
        let pubkey = CompressedPublicKey(Xpub::from_priv(&secp, &xprvs[0]).public_key);
        let replay_protection = ReplayProtection::from_public_keys(vec![pubkey]).unwrap();

        let p2pk_script = Builder::new()
            .push_slice(push_bytes(&pubkey.to_bytes()).unwrap())
            .push_opcode(OP_CHECKSIG)
            .into_script();
        assert!(replay_protection.is_bitgo_tainted_unspent(&p2pk_script.to_p2sh()));

        let unspent = Unspent {
            txid: Txid::all_zeros(),
            output_index: 0,
            value: 1_000,
            address: "irrelevant".into(),
            chain: 0,
            index: 0,
            redeem_script: Some(p2pk_script),
            witness_script: None,
        };

        let tx = build_unsigned_tx(1);
        let signed = sign_transaction(tx, &[unspent], &xprvs[0], &crate::network::BITCOIN, &replay_protection, false).unwrap();
        assert!(signed.input[0].script_sig.is_empty());
    }
}
