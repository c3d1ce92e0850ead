//! Signature verifier (§4.6): computes the correct legacy or BIP143
//! sighash for a parsed input and checks ECDSA signatures against it,
//! in all-against-all, indexed, or pubkey-targeted modes.

use miniscript::bitcoin::ecdsa::Signature as EcdsaSignature;
use miniscript::bitcoin::secp256k1::{self, Message, Secp256k1};
use miniscript::bitcoin::sighash::SighashCache;
use miniscript::bitcoin::{Amount, CompressedPublicKey, EcdsaSighashType, Transaction};

use crate::sigscript::{parse_signature_script, InputClassification};

#[derive(Debug, Clone, Default)]
pub struct VerifySettings {
    /// Restrict verification to `signatures[signature_index]`.
    pub signature_index: Option<usize>,
    /// Restrict verification to signatures made against this key, and
    /// return a per-key rather than per-signature-set verdict.
    pub public_key: Option<CompressedPublicKey>,
}

/// §4.6: verify the signature(s) already present on `tx`'s input
/// `input_index`. `amount` is required for segwit inputs (prevout
/// value, needed by BIP143).
pub fn verify_signature(
    tx: &Transaction,
    input_index: usize,
    amount: Option<Amount>,
    settings: &VerifySettings,
) -> bool {
    let parsed = match parse_signature_script(tx, input_index) {
        Ok(p) => p,
        Err(_) => return false,
    };

    if !matches!(
        parsed.classification,
        InputClassification::P2sh | InputClassification::P2pkh
    ) {
        return false;
    }
    if parsed.is_segwit_input && amount.is_none() {
        return false;
    }
    if parsed.signatures.is_empty() {
        return false;
    }

    let signatures: Vec<&Vec<u8>> = match settings.signature_index {
        Some(i) => match parsed.signatures.get(i) {
            Some(s) => vec![s],
            None => return false,
        },
        None => parsed.signatures.iter().collect(),
    };

    let secp = Secp256k1::verification_only();
    let mut cache = SighashCache::new(tx);
    let mut matched_keys = vec![false; parsed.public_keys.len()];

    if let Some(target_key) = &settings.public_key {
        for sig_bytes in &signatures {
            if let Some((sig, hash_ty)) = split_der_signature(sig_bytes) {
                if let Some(msg) =
                    sighash_message(&mut cache, input_index, &parsed.pub_script, amount, hash_ty, parsed.is_segwit_input)
                {
                    if secp
                        .verify_ecdsa(&msg, &sig.signature, &target_key.0)
                        .is_ok()
                    {
                        return true;
                    }
                }
            }
        }
        return false;
    }

    'sig: for sig_bytes in &signatures {
        let Some((sig, hash_ty)) = split_der_signature(sig_bytes) else {
            return false;
        };
        let Some(msg) = sighash_message(
            &mut cache,
            input_index,
            &parsed.pub_script,
            amount,
            hash_ty,
            parsed.is_segwit_input,
        ) else {
            return false;
        };
        for (i, key_bytes) in parsed.public_keys.iter().enumerate() {
            if matched_keys[i] {
                continue;
            }
            let Ok(key) = secp256k1::PublicKey::from_slice(key_bytes) else {
                continue;
            };
            if secp.verify_ecdsa(&msg, &sig.signature, &key).is_ok() {
                matched_keys[i] = true;
                continue 'sig;
            }
        }
        return false;
    }

    true
}

fn split_der_signature(raw: &[u8]) -> Option<(EcdsaSignature, EcdsaSighashType)> {
    if raw.is_empty() {
        return None;
    }
    let (der, hash_byte) = raw.split_at(raw.len() - 1);
    let hash_ty = EcdsaSighashType::from_consensus(hash_byte[0] as u32);
    let signature = secp256k1::ecdsa::Signature::from_der(der).ok()?;
    Some((
        EcdsaSignature {
            signature,
            sighash_type: hash_ty,
        },
        hash_ty,
    ))
}

fn sighash_message(
    cache: &mut SighashCache<&Transaction>,
    input_index: usize,
    pub_script: &miniscript::bitcoin::ScriptBuf,
    amount: Option<Amount>,
    hash_ty: EcdsaSighashType,
    is_segwit: bool,
) -> Option<Message> {
    let hash = if is_segwit {
        cache
            .p2wsh_signature_hash(input_index, pub_script, amount?, hash_ty)
            .ok()?
    } else {
        return cache
            .legacy_signature_hash(input_index, pub_script, hash_ty.to_u32())
            .ok()
            .map(|h| Message::from_digest(h.to_byte_array().into()));
    };
    Some(Message::from_digest(hash.to_byte_array().into()))
}
