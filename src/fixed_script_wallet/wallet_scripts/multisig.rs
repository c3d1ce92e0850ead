//! 2-of-3 multisig script construction and parsing.
//!
//! Grounded on the teacher's `wallet_scripts::checkmultisig` module (used
//! from `wallet_scripts/mod.rs` as `build_multisig_script_2_of_3`/
//! `parse_multisig_script_2_of_3`, and again from
//! `bitgo_psbt/legacy_txformat.rs`'s half-signed-tx builder) and on
//! `legacy_txformat.rs`'s push-byte handling for scriptSig/witness
//! construction.

use miniscript::bitcoin::blockdata::opcodes::all::OP_CHECKMULTISIG;
use miniscript::bitcoin::blockdata::script::{Builder, Instruction};
use miniscript::bitcoin::script::{PushBytes, PushBytesBuf};
use miniscript::bitcoin::{CompressedPublicKey, ScriptBuf};

use crate::error::{Result, WalletError};
use crate::fixed_script_wallet::wallet_keys::PubTriple;

/// `OP_2 <pub_1> <pub_2> <pub_3> OP_3 OP_CHECKMULTISIG`
pub fn build_multisig_script_2_of_3(keys: &PubTriple) -> Result<ScriptBuf> {
    let mut builder = Builder::new().push_int(2);
    for key in keys {
        builder = builder.push_slice(push_bytes(&key.to_bytes())?);
    }
    Ok(builder
        .push_int(3)
        .push_opcode(OP_CHECKMULTISIG)
        .into_script())
}

/// Inverse of the above: recover the three compressed pubkeys from a
/// 2-of-3 `OP_CHECKMULTISIG` script. Used both to verify a rederived
/// output matches a claimed redeem/witness script (§4.2) and to find a
/// signature's key index when placing it in a scriptSig (§4.7).
pub fn parse_multisig_script_2_of_3(script: &ScriptBuf) -> Result<PubTriple> {
    let instructions: Vec<Instruction> = script
        .instructions()
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| WalletError::Script(format!("malformed multisig script: {e}")))?;

    if instructions.len() != 6 {
        return Err(WalletError::Script(format!(
            "expected 6 script elements for 2-of-3 multisig, got {}",
            instructions.len()
        )));
    }

    let m = push_num(&instructions[0])?;
    let n = push_num(&instructions[4])?;
    if m != 2 || n != 3 {
        return Err(WalletError::Script(format!(
            "expected 2-of-3 multisig, got {m}-of-{n}"
        )));
    }
    if !matches!(instructions[5], Instruction::Op(op) if op == OP_CHECKMULTISIG) {
        return Err(WalletError::Script("missing OP_CHECKMULTISIG".into()));
    }

    let mut keys = Vec::with_capacity(3);
    for instr in &instructions[1..4] {
        match instr {
            Instruction::PushBytes(bytes) => {
                keys.push(
                    CompressedPublicKey::from_slice(bytes.as_bytes())
                        .map_err(|e| WalletError::Script(format!("bad pubkey: {e}")))?,
                );
            }
            _ => return Err(WalletError::Script("expected pubkey push".into())),
        }
    }

    keys.try_into()
        .map_err(|_| WalletError::Script("expected exactly 3 pubkeys".into()))
}

fn push_num(instr: &Instruction) -> Result<i64> {
    match instr {
        Instruction::Op(op) => {
            let byte = op.to_u8();
            // OP_1..OP_16 are consecutive opcodes starting at 0x51.
            if (0x51..=0x60).contains(&byte) {
                Ok((byte - 0x50) as i64)
            } else {
                Err(WalletError::Script(format!("expected small int opcode, got {op}")))
            }
        }
        Instruction::PushBytes(bytes) if bytes.as_bytes().len() <= 1 => {
            Ok(bytes.as_bytes().first().copied().unwrap_or(0) as i64)
        }
        _ => Err(WalletError::Script("expected small integer".into())),
    }
}

pub fn push_bytes(data: &[u8]) -> Result<PushBytesBuf> {
    PushBytesBuf::try_from(data.to_vec())
        .map_err(|e| WalletError::Script(format!("data too large to push: {e}")))
}

pub fn push_bytes_ref(data: &[u8]) -> Result<&PushBytes> {
    <&PushBytes>::try_from(data).map_err(|e| WalletError::Script(format!("data too large to push: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed_script_wallet::wallet_keys::test_helpers::test_pub_triple;

    #[test]
    fn roundtrip_build_and_parse() {
        let keys = test_pub_triple("multisig-roundtrip");
        let script = build_multisig_script_2_of_3(&keys).unwrap();
        let parsed = parse_multisig_script_2_of_3(&script).unwrap();
        assert_eq!(parsed, keys);
    }
}
