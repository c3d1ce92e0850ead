//! Multi-signature UTXO wallet core: address derivation/verification,
//! transaction prebuild parsing and verification, signing, and cold
//! recovery for BitGo-style 2-of-3 fixed-script wallets.

pub mod address;
pub mod collaborators;
pub mod error;
pub mod explainer;
pub mod fixed_script_wallet;
pub mod keys;
pub mod krs;
pub mod message;
pub mod network;
pub mod prebuild;
pub mod recovery;
pub mod sigscript;
pub mod signer;
pub mod sigverify;

// Re-export bitcoin from the miniscript crate: this keeps every caller on
// one copy of `bitcoin`'s types rather than pulling the crate in directly
// and risking a version mismatch with the one miniscript was built against.
pub use ::miniscript::bitcoin;

pub use error::{Result, WalletError};
pub use network::Network;
