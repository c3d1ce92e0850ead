//! Error taxonomy for the wallet core.
//!
//! One flat enum rather than per-module error types: almost every caller
//! (verification, signing, recovery) needs to match on the same handful of
//! variants, and the source's string-matching on error messages
//! (`e.message.includes('wallet address not found')`) is exactly the thing
//! this is meant to replace with a structured match.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, WalletError>;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid address derivation property: {0}")]
    InvalidAddressDerivationProperty(String),

    #[error("invalid address verification object: missing coinSpecific")]
    InvalidAddressVerificationObjectProperty,

    #[error("unexpected address: expected {expected}, got {actual}")]
    UnexpectedAddress { expected: String, actual: String },

    #[error("network does not support p2wsh")]
    P2wshUnsupported,

    #[error("unsupported address type: {0}")]
    UnsupportedAddressType(String),

    #[error("invalid threshold {threshold} for {n} keys")]
    InvalidThreshold { threshold: usize, n: usize },

    #[error("missing recipients: {0:?}")]
    MissingRecipients(Vec<crate::prebuild::Recipient>),

    #[error("implicit external spend {implicit} exceeds pay-as-you-go cap ({bps} bps of {explicit})")]
    ImplicitSpendLimitExceeded {
        implicit: u64,
        explicit: u64,
        bps: u32,
    },

    #[error("negative fee: inputs={inputs} outputs={outputs}")]
    NegativeFee { inputs: u64, outputs: u64 },

    #[error("keychain integrity failure: {0}")]
    KeychainIntegrityFailure(String),

    #[error("{n} input(s) failed to sign", n = issues.len())]
    InputSignatureFailure { issues: Vec<InputSignatureIssue> },

    #[error("networking disabled but required to {0}")]
    NetworkingDisabled(String),

    #[error("explorer unavailable: {0}")]
    ExplorerUnavailable(String),

    #[error("KRS fee structure not implemented: {0}")]
    FeeStructureNotImplemented(String),

    #[error("wallet address not found: {0}")]
    WalletAddressNotFound(String),

    #[error("no funds found to recover")]
    NoFundsToRecover,

    #[error(transparent)]
    Consensus(#[from] miniscript::bitcoin::consensus::encode::Error),

    #[error("script error: {0}")]
    Script(String),

    #[error("key error: {0}")]
    Key(String),

    #[error("signature error: {0}")]
    Signature(String),
}

/// Per-input failure recorded by the signer (§4.7) and surfaced in aggregate.
#[derive(Debug, Clone)]
pub struct InputSignatureIssue {
    pub input_index: usize,
    pub path: String,
    pub error: String,
}

impl std::fmt::Display for InputSignatureIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "input {} (path {}): {}",
            self.input_index, self.path, self.error
        )
    }
}
