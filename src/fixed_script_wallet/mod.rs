//! Fixed-script (2-of-3 multisig) wallet types: these are not based on
//! output descriptors, every address is a literal redeem/witness script
//! built from three derived public keys.

pub mod replay_protection;
pub mod wallet_keys;
pub mod wallet_scripts;

pub use replay_protection::ReplayProtection;
pub use wallet_keys::RootWalletKeys;
