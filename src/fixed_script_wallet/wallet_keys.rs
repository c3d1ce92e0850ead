//! Cached xpub derivation to `(chain, index)`, grounded on the teacher's
//! own `RootWalletKeys` (`fixed_script_wallet/wallet_keys.rs`): pre-derive
//! to the shared `m/0/0` prefix once, then cache per-(chain,index) triples
//! since a prebuild or recovery scan re-derives the same handful of leaves
//! many times over.

use std::cell::RefCell;
use std::collections::HashMap;
use std::convert::TryInto;

use miniscript::bitcoin::bip32::Xpub;
use miniscript::bitcoin::secp256k1::{All, Secp256k1};
use miniscript::bitcoin::CompressedPublicKey;

use crate::error::{Result, WalletError};
use crate::keys::{base_derivation_path, leaf_derivation_path};

pub type XpubTriple = [Xpub; 3];
pub type PubTriple = [CompressedPublicKey; 3];

pub fn to_pub_triple(xpubs: &XpubTriple) -> Result<PubTriple> {
    xpubs
        .iter()
        .map(|x| CompressedPublicKey(x.public_key))
        .collect::<Vec<_>>()
        .try_into()
        .map_err(|_| WalletError::Key("expected exactly 3 public keys".into()))
}

const DERIVATION_CACHE_MAX_SIZE: usize = 128;

pub struct RootWalletKeys {
    pub xpubs: XpubTriple,
    prefix_derived: XpubTriple,
    derivation_cache: RefCell<HashMap<(u32, u32), XpubTriple>>,
    secp: Secp256k1<All>,
}

impl RootWalletKeys {
    pub fn new(xpubs: XpubTriple) -> Result<Self> {
        let secp = Secp256k1::new();
        let prefix = base_derivation_path();
        let prefix_derived: XpubTriple = xpubs
            .iter()
            .map(|xpub| {
                xpub.derive_pub(&secp, &prefix)
                    .map_err(|e| WalletError::Key(format!("prefix derivation failed: {e}")))
            })
            .collect::<Result<Vec<_>>>()?
            .try_into()
            .map_err(|_| WalletError::Key("expected exactly 3 xpubs".into()))?;

        Ok(Self {
            xpubs,
            prefix_derived,
            derivation_cache: RefCell::new(HashMap::new()),
            secp,
        })
    }

    pub fn user_key(&self) -> &Xpub {
        &self.xpubs[0]
    }

    pub fn backup_key(&self) -> &Xpub {
        &self.xpubs[1]
    }

    pub fn bitgo_key(&self) -> &Xpub {
        &self.xpubs[2]
    }

    pub fn derive_for_chain_and_index(&self, chain: u32, index: u32) -> Result<XpubTriple> {
        let cache_key = (chain, index);
        if let Some(cached) = self.derivation_cache.borrow().get(&cache_key) {
            return Ok(*cached);
        }

        let path = leaf_derivation_path(chain, index);
        let derived: XpubTriple = self
            .prefix_derived
            .iter()
            .map(|xpub| {
                xpub.derive_pub(&self.secp, &path)
                    .map_err(|e| WalletError::Key(format!("leaf derivation failed: {e}")))
            })
            .collect::<Result<Vec<_>>>()?
            .try_into()
            .map_err(|_| WalletError::Key("expected exactly 3 derived xpubs".into()))?;

        let mut cache = self.derivation_cache.borrow_mut();
        if cache.len() >= DERIVATION_CACHE_MAX_SIZE {
            cache.clear();
        }
        cache.insert(cache_key, derived);

        Ok(derived)
    }

    /// Convenience used heavily by the prebuild parser: derive straight to
    /// the compressed-pubkey triple needed by the script codec.
    pub fn derive_pub_triple(&self, chain: u32, index: u32) -> Result<PubTriple> {
        to_pub_triple(&self.derive_for_chain_and_index(chain, index)?)
    }
}

impl std::fmt::Debug for RootWalletKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RootWalletKeys")
            .field("xpubs", &self.xpubs)
            .field(
                "derivation_cache_size",
                &self.derivation_cache.borrow().len(),
            )
            .finish()
    }
}

#[cfg(test)]
pub mod test_helpers {
    use super::*;
    use crate::keys::test_utils::test_wallet_xprvs;

    pub fn test_pub_triple(seed: &str) -> PubTriple {
        let secp = Secp256k1::new();
        let xpubs = test_wallet_xprvs(seed).map(|x| Xpub::from_priv(&secp, &x));
        to_pub_triple(&xpubs).unwrap()
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::keys::test_utils::test_wallet_xprvs;
    use miniscript::bitcoin::bip32::Xpriv;

    pub fn get_test_wallet_keys(seed: &str) -> RootWalletKeys {
        let xprvs = test_wallet_xprvs(seed);
        let secp = Secp256k1::new();
        RootWalletKeys::new(xprvs.map(|x: Xpriv| Xpub::from_priv(&secp, &x))).unwrap()
    }

    #[test]
    fn derives_and_caches() {
        let keys = get_test_wallet_keys("test");
        assert!(keys.derive_for_chain_and_index(0, 0).is_ok());
        let a = keys.derive_for_chain_and_index(0, 5).unwrap();
        let b = keys.derive_for_chain_and_index(0, 5).unwrap();
        assert_eq!(a, b);
    }
}
