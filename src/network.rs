//! Per-coin network profile (§3 "Network", §6 "Network profile").
//!
//! Mirrors the shape of the teacher workspace's own `NetworkArg` →
//! `wasm_utxo::Network` mapping (`cli/src/network.rs`), but as data rather
//! than an enum of behaviors: every coin the core supports is one
//! `Network` value, so adding a coin never touches verification code.

/// Coin family, used only to pick the sighash flavor (§4.7's
/// "`defaultSigHashType` = SIGHASH_ALL unless coin overrides").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoinFamily {
    Bitcoin,
    Litecoin,
    Dogecoin,
    Dash,
    Zcash,
    /// BCH/BSV/BTG-style chains that mix SIGHASH_FORKID into every signature.
    ForkId,
}

#[derive(Debug, Clone, Copy)]
pub struct Network {
    pub name: &'static str,
    pub family: CoinFamily,
    pub pub_key_hash_version: u8,
    pub script_hash_version: u8,
    /// A second, historically-reused P2SH version byte (e.g. Litecoin's
    /// old `5`, shared with Bitcoin, before Litecoin minted its own `0x32`).
    /// Addresses under this byte validate only when the caller opts in
    /// (§8 scenario 2, `forceAltScriptSupport`).
    pub alt_script_hash_version: Option<u8>,
    pub bech32_hrp: Option<&'static str>,
    pub supports_p2wsh: bool,
    /// Unused by the core itself but retained as a capability bit for
    /// collaborators (§9 open question: `supportsBlockTarget`-style flags
    /// live here even when nothing in this crate reads them yet).
    pub supports_block_target: bool,
}

impl Network {
    /// Sighash flag actually applied when building scriptSigs/witnesses.
    /// Fork-id chains OR in `SIGHASH_FORKID` (0x40); everyone else signs
    /// plain SIGHASH_ALL unless told otherwise by the caller.
    pub const fn base_sighash_u32(&self) -> u32 {
        match self.family {
            CoinFamily::ForkId => 0x01 | 0x40,
            _ => 0x01,
        }
    }

    pub fn allowed_script_hash_versions(&self, force_alt_script_support: bool) -> Vec<u8> {
        let mut versions = vec![self.script_hash_version];
        if force_alt_script_support {
            if let Some(alt) = self.alt_script_hash_version {
                versions.push(alt);
            }
        }
        versions
    }
}

pub const BITCOIN: Network = Network {
    name: "btc",
    family: CoinFamily::Bitcoin,
    pub_key_hash_version: 0x00,
    script_hash_version: 0x05,
    alt_script_hash_version: None,
    bech32_hrp: Some("bc"),
    supports_p2wsh: true,
    supports_block_target: true,
};

pub const BITCOIN_TESTNET: Network = Network {
    name: "tbtc",
    family: CoinFamily::Bitcoin,
    pub_key_hash_version: 0x6f,
    script_hash_version: 0xc4,
    alt_script_hash_version: None,
    bech32_hrp: Some("tb"),
    supports_p2wsh: true,
    supports_block_target: true,
};

pub const LITECOIN: Network = Network {
    name: "ltc",
    family: CoinFamily::Litecoin,
    pub_key_hash_version: 0x30,
    script_hash_version: 0x32,
    // Historically Litecoin P2SH addresses reused Bitcoin's version byte 5
    // before dedicated byte 0x32 was introduced; old-style "3..." addresses
    // are still seen in the wild.
    alt_script_hash_version: Some(0x05),
    bech32_hrp: Some("ltc"),
    supports_p2wsh: true,
    supports_block_target: true,
};

pub const LITECOIN_TESTNET: Network = Network {
    name: "tltc",
    family: CoinFamily::Litecoin,
    pub_key_hash_version: 0x6f,
    script_hash_version: 0x3a,
    alt_script_hash_version: Some(0xc4),
    bech32_hrp: Some("tltc"),
    supports_p2wsh: true,
    supports_block_target: true,
};

pub const BITCOIN_CASH: Network = Network {
    name: "bch",
    family: CoinFamily::ForkId,
    pub_key_hash_version: 0x00,
    script_hash_version: 0x05,
    alt_script_hash_version: None,
    bech32_hrp: None,
    supports_p2wsh: false,
    supports_block_target: true,
};

pub const BITCOIN_CASH_TESTNET: Network = Network {
    name: "tbch",
    family: CoinFamily::ForkId,
    pub_key_hash_version: 0x6f,
    script_hash_version: 0xc4,
    alt_script_hash_version: None,
    bech32_hrp: None,
    supports_p2wsh: false,
    supports_block_target: true,
};

pub const DOGECOIN: Network = Network {
    name: "doge",
    family: CoinFamily::Dogecoin,
    pub_key_hash_version: 0x1e,
    script_hash_version: 0x16,
    alt_script_hash_version: None,
    bech32_hrp: None,
    supports_p2wsh: false,
    supports_block_target: false,
};

pub const DOGECOIN_TESTNET: Network = Network {
    name: "tdoge",
    family: CoinFamily::Dogecoin,
    pub_key_hash_version: 0x71,
    script_hash_version: 0xc4,
    alt_script_hash_version: None,
    bech32_hrp: None,
    supports_p2wsh: false,
    supports_block_target: false,
};

pub const DASH: Network = Network {
    name: "dash",
    family: CoinFamily::Dash,
    pub_key_hash_version: 0x4c,
    script_hash_version: 0x10,
    alt_script_hash_version: None,
    bech32_hrp: None,
    supports_p2wsh: false,
    supports_block_target: false,
};

pub const DASH_TESTNET: Network = Network {
    name: "tdash",
    family: CoinFamily::Dash,
    pub_key_hash_version: 0x8c,
    script_hash_version: 0x13,
    alt_script_hash_version: None,
    bech32_hrp: None,
    supports_p2wsh: false,
    supports_block_target: false,
};

pub const ZCASH: Network = Network {
    name: "zec",
    family: CoinFamily::Zcash,
    pub_key_hash_version: 0x1c,
    script_hash_version: 0xbd,
    alt_script_hash_version: None,
    bech32_hrp: None,
    supports_p2wsh: false,
    supports_block_target: false,
};

pub const ZCASH_TESTNET: Network = Network {
    name: "tzec",
    family: CoinFamily::Zcash,
    pub_key_hash_version: 0x1d,
    script_hash_version: 0xba,
    alt_script_hash_version: None,
    bech32_hrp: None,
    supports_p2wsh: false,
    supports_block_target: false,
};
