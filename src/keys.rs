//! Keychain data record (§3) and the public/private key-material duality
//! used across address derivation, signing, and recovery.

use miniscript::bitcoin::bip32::{ChildNumber, DerivationPath, Xpriv, Xpub};
use miniscript::bitcoin::secp256k1::{Secp256k1, SecretKey, Signing, Verification};
use secrecy::{ExposeSecret, SecretString};
use zeroize::Zeroize;

use crate::error::{Result, WalletError};

/// `m/0/0` — the fixed prefix every leaf key is derived under (§6).
pub fn base_derivation_path() -> DerivationPath {
    DerivationPath::from(vec![
        ChildNumber::Normal { index: 0 },
        ChildNumber::Normal { index: 0 },
    ])
}

/// `m/0/0/<chain>/<index>` (§6).
pub fn leaf_derivation_path(chain: u32, index: u32) -> DerivationPath {
    base_derivation_path()
        .child(ChildNumber::Normal { index: chain })
        .child(ChildNumber::Normal { index })
}

/// One of the three keys in a BitGo-style 2-of-3 wallet.
///
/// `prv` is sensitive: the field is a `SecretString` so it is redacted in
/// `Debug` output, and decrypting `encrypted_prv` zeroizes the intermediate
/// plaintext buffer on every exit path (§3 "Ownership", §5 "Resource
/// discipline").
pub struct Keychain {
    pub xpub: Xpub,
    prv: Option<SecretString>,
    encrypted_prv: Option<SecretString>,
    pub key_signatures: Option<KeySignatures>,
}

impl std::fmt::Debug for Keychain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keychain")
            .field("xpub", &self.xpub)
            .field("prv", &self.prv.as_ref().map(|_| "<redacted>"))
            .field(
                "encrypted_prv",
                &self.encrypted_prv.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// Signed-message attestations the backup and bitgo keys carry (§4.4.1).
#[derive(Debug, Clone)]
pub struct KeySignatures {
    pub backup_pub_sig: Vec<u8>,
    pub bitgo_pub_sig: Vec<u8>,
}

impl Keychain {
    pub fn from_xpub(xpub: Xpub) -> Self {
        Self {
            xpub,
            prv: None,
            encrypted_prv: None,
            key_signatures: None,
        }
    }

    pub fn with_xprv(xprv: &Xpriv, secp: &Secp256k1<impl Signing>) -> Self {
        Self {
            xpub: Xpub::from_priv(secp, xprv),
            prv: Some(SecretString::new(Box::from(xprv.to_string()))),
            encrypted_prv: None,
            key_signatures: None,
        }
    }

    pub fn with_encrypted_prv(xpub: Xpub, encrypted_prv: impl Into<String>) -> Self {
        Self {
            xpub,
            prv: None,
            encrypted_prv: Some(SecretString::new(Box::from(encrypted_prv.into()))),
            key_signatures: None,
        }
    }

    pub fn has_private_key_material(&self) -> bool {
        self.prv.is_some() || self.encrypted_prv.is_some()
    }

    /// Resolve to a usable `Xpriv`, decrypting `encrypted_prv` with
    /// `passphrase` if `prv` itself isn't present (§4.4.1 step 1).
    ///
    /// The decrypted plaintext is held only long enough to parse into an
    /// `Xpriv` and is zeroized immediately after, win or lose.
    pub fn resolve_xprv(
        &self,
        passphrase: Option<&str>,
        decrypt: impl FnOnce(&str, &str) -> Result<String>,
    ) -> Result<Xpriv> {
        if let Some(prv) = &self.prv {
            return Xpriv::from_str(prv.expose_secret())
                .map_err(|e| WalletError::Key(format!("invalid xprv: {e}")));
        }
        let encrypted = self
            .encrypted_prv
            .as_ref()
            .ok_or_else(|| WalletError::KeychainIntegrityFailure("no private key material".into()))?;
        let passphrase = passphrase.ok_or_else(|| {
            WalletError::KeychainIntegrityFailure("wallet passphrase required to decrypt".into())
        })?;
        let mut plaintext = decrypt(encrypted.expose_secret(), passphrase)?;
        let result = Xpriv::from_str(&plaintext)
            .map_err(|e| WalletError::Key(format!("invalid decrypted xprv: {e}")));
        plaintext.zeroize();
        result
    }
}

use std::str::FromStr;

/// Derive the leaf public key for one keychain at `(chain, index)`.
pub fn derive_pubkey(
    xpub: &Xpub,
    secp: &Secp256k1<impl Verification>,
    chain: u32,
    index: u32,
) -> Result<Xpub> {
    xpub.derive_pub(secp, &leaf_derivation_path(chain, index))
        .map_err(|e| WalletError::Key(format!("derive_pub failed: {e}")))
}

/// Derive the leaf private key for a signing key at `(chain, index)`
/// (§4.7 step 2).
pub fn derive_secret_key(
    xprv: &Xpriv,
    secp: &Secp256k1<impl Signing>,
    chain: u32,
    index: u32,
) -> Result<SecretKey> {
    let derived = xprv
        .derive_priv(secp, &leaf_derivation_path(chain, index))
        .map_err(|e| WalletError::Key(format!("derive_priv failed: {e}")))?;
    Ok(derived.private_key)
}

#[cfg(test)]
pub mod test_utils {
    use super::*;
    use miniscript::bitcoin::hashes::{sha256, Hash};
    use miniscript::bitcoin::Network as BtcNetwork;

    pub fn xpriv_from_seed(seed: &str) -> Xpriv {
        let seed_hash = sha256::Hash::hash(seed.as_bytes()).to_byte_array();
        Xpriv::new_master(BtcNetwork::Testnet, &seed_hash).expect("valid seed")
    }

    pub fn test_wallet_xprvs(seed: &str) -> [Xpriv; 3] {
        [
            xpriv_from_seed(&format!("{seed}/0")),
            xpriv_from_seed(&format!("{seed}/1")),
            xpriv_from_seed(&format!("{seed}/2")),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use miniscript::bitcoin::secp256k1::All;

    #[test]
    fn resolve_xprv_prefers_plaintext_prv() {
        let secp = Secp256k1::<All>::new();
        let xprv = test_utils::xpriv_from_seed("a");
        let keychain = Keychain::with_xprv(&xprv, &secp);
        let resolved = keychain
            .resolve_xprv(None, |_, _| unreachable!("should not need to decrypt"))
            .unwrap();
        assert_eq!(resolved, xprv);
    }

    #[test]
    fn resolve_xprv_decrypts_when_no_plaintext() {
        let xprv = test_utils::xpriv_from_seed("b");
        let keychain = Keychain::with_encrypted_prv(
            Xpub::from_priv(&Secp256k1::new(), &xprv),
            "ciphertext",
        );
        let resolved = keychain
            .resolve_xprv(Some("hunter2"), |ct, pass| {
                assert_eq!(ct, "ciphertext");
                assert_eq!(pass, "hunter2");
                Ok(xprv.to_string())
            })
            .unwrap();
        assert_eq!(resolved, xprv);
    }

    #[test]
    fn resolve_xprv_fails_without_passphrase() {
        let xprv = test_utils::xpriv_from_seed("c");
        let keychain = Keychain::with_encrypted_prv(
            Xpub::from_priv(&Secp256k1::new(), &xprv),
            "ciphertext",
        );
        let result = keychain.resolve_xprv(None, |_, _| Ok(String::new()));
        assert!(result.is_err());
    }
}
