//! Replay-protection input detection (§4.7 step 1, §9 "`isBitGoTaintedUnspent`").
//!
//! Some fork chains need a platform-signed P2SH-P2PK input consumed
//! alongside user inputs purely to satisfy a replay-protection rule;
//! the signer must skip these rather than try to co-sign them.
//! Grounded on the teacher's `fixed_script_wallet::replay_protection`
//! module, with its `ScriptP2shP2pk` dependency (taproot/singlesig,
//! dropped) inlined as a small local P2SH-P2PK builder.

use miniscript::bitcoin::blockdata::opcodes::all::OP_CHECKSIG;
use miniscript::bitcoin::blockdata::script::Builder;
use miniscript::bitcoin::{CompressedPublicKey, ScriptBuf};

use crate::error::Result;
use crate::fixed_script_wallet::wallet_scripts::multisig::push_bytes;

/// `<pubkey> OP_CHECKSIG`, wrapped in P2SH by `to_p2sh()`.
fn p2pk_script(key: CompressedPublicKey) -> Result<ScriptBuf> {
    Ok(Builder::new()
        .push_slice(push_bytes(&key.to_bytes())?)
        .push_opcode(OP_CHECKSIG)
        .into_script())
}

fn p2sh_p2pk_output_script(key: CompressedPublicKey) -> Result<ScriptBuf> {
    Ok(p2pk_script(key)?.to_p2sh())
}

#[derive(Debug, Clone, Default)]
pub struct ReplayProtection {
    pub permitted_output_scripts: Vec<ScriptBuf>,
}

impl ReplayProtection {
    pub fn new(permitted_output_scripts: Vec<ScriptBuf>) -> Self {
        Self {
            permitted_output_scripts,
        }
    }

    /// Build from the platform's known replay-protection public keys,
    /// deriving their P2SH-P2PK output scripts.
    pub fn from_public_keys(public_keys: Vec<CompressedPublicKey>) -> Result<Self> {
        let output_scripts = public_keys
            .into_iter()
            .map(p2sh_p2pk_output_script)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            permitted_output_scripts: output_scripts,
        })
    }

    /// `is_bitgo_tainted_unspent` (§4.7 step 1): true if an unspent's
    /// output script matches one of the platform's replay-protection
    /// scripts and should be skipped by the signer rather than co-signed.
    pub fn is_bitgo_tainted_unspent(&self, output_script: &ScriptBuf) -> bool {
        self.permitted_output_scripts.contains(output_script)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed_script_wallet::wallet_keys::test_helpers::test_pub_triple;

    #[test]
    fn matches_only_known_replay_protection_scripts() {
        let keys = test_pub_triple("replay-protection");
        let protection = ReplayProtection::from_public_keys(vec![keys[0]]).unwrap();

        let tainted = p2sh_p2pk_output_script(keys[0]).unwrap();
        assert!(protection.is_bitgo_tainted_unspent(&tainted));

        let untainted = p2sh_p2pk_output_script(keys[1]).unwrap();
        assert!(!protection.is_bitgo_tainted_unspent(&untainted));
    }
}
