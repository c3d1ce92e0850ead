//! Signature-script parser (§4.5): decomposes an input's scriptSig/
//! witness into its signatures, public keys, and the subscript actually
//! hashed, for any of the input classes this core signs or verifies.

use miniscript::bitcoin::blockdata::opcodes::all::OP_CHECKSIG;
use miniscript::bitcoin::blockdata::script::{Builder, Instruction};
use miniscript::bitcoin::hashes::{hash160, Hash};
use miniscript::bitcoin::{ScriptBuf, Transaction};

use crate::error::{Result, WalletError};
use crate::fixed_script_wallet::wallet_scripts::multisig::push_bytes;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputClassification {
    P2sh,
    P2pkh,
    Other,
}

#[derive(Debug, Clone)]
pub struct ParsedSignatureScript {
    pub signatures: Vec<Vec<u8>>,
    pub public_keys: Vec<Vec<u8>>,
    pub is_segwit_input: bool,
    pub classification: InputClassification,
    /// The script actually hashed to produce each signature's sighash
    /// preimage: the witness script for segwit inputs (native or
    /// P2SH-wrapped), the redeem script for legacy P2SH, a synthesized
    /// P2PKH pubScript for bare P2PKH (§9 "Faked pubScript" — none of
    /// these ever appear on the wire as a standalone object).
    pub pub_script: ScriptBuf,
}

fn decompile(script: &ScriptBuf) -> Result<Vec<Instruction<'_>>> {
    script
        .instructions()
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| WalletError::Script(format!("malformed script: {e}")))
}

fn push_data(instr: &Instruction) -> Option<Vec<u8>> {
    match instr {
        Instruction::PushBytes(bytes) => Some(bytes.as_bytes().to_vec()),
        _ => None,
    }
}

/// §4.5: parse one input's scriptSig + witness.
pub fn parse_signature_script(
    tx: &Transaction,
    input_index: usize,
) -> Result<ParsedSignatureScript> {
    let input = tx
        .input
        .get(input_index)
        .ok_or_else(|| WalletError::Script(format!("input {input_index} out of bounds")))?;

    let is_segwit_input = !input.witness.is_empty();

    // Both native P2WSH and P2SH-wrapped segwit carry the witness script as
    // the last witness stack element; script_sig (empty, or a single
    // redeem-script push for the P2SH wrapper) plays no part in the
    // signature set.
    if is_segwit_input {
        let witness_script = input
            .witness
            .last()
            .ok_or_else(|| WalletError::Script("empty witness".into()))?;
        let signatures = input
            .witness
            .iter()
            .take(input.witness.len() - 1)
            .skip(1) // OP_CHECKMULTISIG's off-by-one null dummy
            .map(|s| s.to_vec())
            .collect();
        let witness_script_buf = ScriptBuf::from_bytes(witness_script.to_vec());
        let public_keys =
            crate::fixed_script_wallet::wallet_scripts::parse_multisig_script_2_of_3(
                &witness_script_buf,
            )
            .map(|keys| keys.iter().map(|k| k.to_bytes().to_vec()).collect())
            .unwrap_or_default();

        return Ok(ParsedSignatureScript {
            signatures,
            public_keys,
            is_segwit_input: true,
            classification: InputClassification::P2sh,
            pub_script: witness_script_buf,
        });
    }

    let decompiled = decompile(&input.script_sig)?;

    // P2SH multisig: 0 <sig>... <redeemScript>
    if let Some(Instruction::PushBytes(redeem_bytes)) = decompiled.last() {
        let redeem_script = ScriptBuf::from_bytes(redeem_bytes.as_bytes().to_vec());
        if let Ok(keys) =
            crate::fixed_script_wallet::wallet_scripts::parse_multisig_script_2_of_3(&redeem_script)
        {
            let signatures = decompiled[..decompiled.len() - 1]
                .iter()
                .filter_map(push_data)
                .filter(|b| !b.is_empty())
                .collect();
            return Ok(ParsedSignatureScript {
                signatures,
                public_keys: keys.iter().map(|k| k.to_bytes().to_vec()).collect(),
                is_segwit_input,
                classification: InputClassification::P2sh,
                pub_script: redeem_script,
            });
        }
    }

    // P2PKH: <sig> <pubkey>
    if decompiled.len() == 2 {
        if let (Some(sig), Some(pubkey)) = (push_data(&decompiled[0]), push_data(&decompiled[1])) {
            let hash = hash160::Hash::hash(&pubkey);
            let pub_script = Builder::new()
                .push_opcode(miniscript::bitcoin::blockdata::opcodes::all::OP_DUP)
                .push_opcode(miniscript::bitcoin::blockdata::opcodes::all::OP_HASH160)
                .push_slice(push_bytes(hash.as_ref())?)
                .push_opcode(miniscript::bitcoin::blockdata::opcodes::all::OP_EQUALVERIFY)
                .push_opcode(OP_CHECKSIG)
                .into_script();
            return Ok(ParsedSignatureScript {
                signatures: vec![sig],
                public_keys: vec![pubkey],
                is_segwit_input,
                classification: InputClassification::P2pkh,
                pub_script,
            });
        }
    }

    Ok(ParsedSignatureScript {
        signatures: vec![],
        public_keys: vec![],
        is_segwit_input,
        classification: InputClassification::Other,
        pub_script: ScriptBuf::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed_script_wallet::wallet_keys::test_helpers::test_pub_triple;
    use crate::fixed_script_wallet::wallet_scripts::build_multisig_script_2_of_3;
    use miniscript::bitcoin::{
        absolute::LockTime, transaction::Version, OutPoint, ScriptBuf as BtcScriptBuf, Sequence,
        Transaction, TxIn, Witness,
    };

    #[test]
    fn classifies_p2sh_multisig() {
        let keys = test_pub_triple("sigscript");
        let redeem = build_multisig_script_2_of_3(&keys).unwrap();
        let script_sig = Builder::new()
            .push_int(0)
            .push_slice(push_bytes(&[1, 2, 3]).unwrap())
            .push_slice(push_bytes(redeem.as_bytes()).unwrap())
            .into_script();

        let tx = Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![TxIn {
                previous_output: OutPoint::null(),
                script_sig,
                sequence: Sequence::ZERO,
                witness: Witness::new(),
            }],
            output: vec![],
        };

        let parsed = parse_signature_script(&tx, 0).unwrap();
        assert_eq!(parsed.classification, InputClassification::P2sh);
        assert_eq!(parsed.public_keys.len(), 3);
        assert_eq!(parsed.signatures.len(), 1);
        assert!(!parsed.is_segwit_input);
    }

    #[test]
    fn other_input_is_classified_as_other() {
        let tx = Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![TxIn {
                previous_output: OutPoint::null(),
                script_sig: BtcScriptBuf::new(),
                sequence: Sequence::ZERO,
                witness: Witness::new(),
            }],
            output: vec![],
        };
        let parsed = parse_signature_script(&tx, 0).unwrap();
        assert_eq!(parsed.classification, InputClassification::Other);
    }
}
