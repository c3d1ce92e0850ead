//! Cold recovery sweep (§4.8) and the offline-vault export/import round
//! trip and post-process locktime bump supplementing it (§6, SPEC_FULL §B).

use miniscript::bitcoin::absolute::LockTime;
use miniscript::bitcoin::bip32::{Xpriv, Xpub};
use miniscript::bitcoin::consensus::{deserialize, serialize};
use miniscript::bitcoin::secp256k1::Secp256k1;
use miniscript::bitcoin::{absolute, transaction::Version, Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid};
use serde::{Deserialize, Serialize};

use crate::address::{self, DEFAULT_THRESHOLD};
use crate::collaborators::{Explorer, RequestContext};
use crate::error::{Result, WalletError};
use crate::fixed_script_wallet::replay_protection::ReplayProtection;
use crate::fixed_script_wallet::wallet_keys::RootWalletKeys;
use crate::fixed_script_wallet::wallet_scripts::{Chain, OutputScriptType, Scope};
use crate::network::Network;
use crate::prebuild::Unspent;
use crate::signer::sign_transaction;

const DEFAULT_SCAN: u32 = 20;

/// Rough legacy-multisig size constants (bytes) for the constant-fallback
/// fee estimate §4.8 step 4 calls for (no fee-rate estimation beyond this).
const TX_OVERHEAD: u64 = 10;
const OUTPUT_SIZE: u64 = 34;
const P2SH_INPUT_SIZE: u64 = 296;

#[derive(Debug, Clone)]
pub enum RecoveryKeyMaterial {
    Prv(Xpriv),
    Pub(Xpub),
}

impl RecoveryKeyMaterial {
    fn xpub(&self, secp: &Secp256k1<impl miniscript::bitcoin::secp256k1::Signing>) -> Xpub {
        match self {
            RecoveryKeyMaterial::Prv(xprv) => Xpub::from_priv(secp, xprv),
            RecoveryKeyMaterial::Pub(xpub) => *xpub,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryMode {
    /// user + backup both private: cosign completely in one pass.
    FullSweep,
    /// user private, backup public, a KRS provider takes the third
    /// signature later: user-sign only, allocate a provider fee output.
    Krs,
    /// user + backup both public: build an incomplete tx for offline signing.
    Unsigned,
}

pub struct RecoveryParams<'a> {
    pub user_key: RecoveryKeyMaterial,
    pub backup_key: RecoveryKeyMaterial,
    pub bitgo_key: RecoveryKeyMaterial,
    pub recovery_destination: ScriptBuf,
    pub scan: u32,
    pub ignore_address_types: Vec<OutputScriptType>,
    pub fee_per_byte: u64,
    /// Present only in KRS mode: the fee owed to the provider and the
    /// script it should be paid to. Computed separately via `crate::krs`.
    pub krs_fee: Option<(u64, ScriptBuf)>,
    pub coin: &'a str,
}

fn determine_mode(params: &RecoveryParams) -> Result<RecoveryMode> {
    match (&params.user_key, &params.backup_key) {
        (RecoveryKeyMaterial::Prv(_), RecoveryKeyMaterial::Prv(_)) => Ok(RecoveryMode::FullSweep),
        (RecoveryKeyMaterial::Prv(_), RecoveryKeyMaterial::Pub(_)) if params.krs_fee.is_some() => {
            Ok(RecoveryMode::Krs)
        }
        (RecoveryKeyMaterial::Pub(_), RecoveryKeyMaterial::Pub(_)) => Ok(RecoveryMode::Unsigned),
        _ => {
            let err = WalletError::KeychainIntegrityFailure(
                "key material doesn't match full-sweep, KRS, or unsigned recovery".into(),
            );
            tracing::error!(error = %err, "determine_mode: inconsistent key material");
            Err(err)
        }
    }
}

pub enum RecoveryOutcome {
    Signed {
        tx_hex: String,
        total_input_amount: u64,
        recovery_amount: u64,
        fee: u64,
    },
    Unsigned(OfflineVaultDescriptor),
}

/// §4.8: scan every non-ignored address type's two chains for funds, build
/// a single sweep transaction, and sign it per `mode`.
#[tracing::instrument(skip(params, network, explorer, ctx), fields(coin = params.coin))]
pub async fn recover_wallet(
    params: &RecoveryParams<'_>,
    network: &Network,
    explorer: &dyn Explorer,
    ctx: &RequestContext,
) -> Result<RecoveryOutcome> {
    let mode = determine_mode(params)?;
    tracing::debug!(?mode, "recovery mode determined");
    let secp = Secp256k1::new();

    let xpubs = [
        params.user_key.xpub(&secp),
        params.backup_key.xpub(&secp),
        params.bitgo_key.xpub(&secp),
    ];
    let wallet_keys = RootWalletKeys::new(xpubs)?;

    let pool = scan_for_unspents(&wallet_keys, network, params, explorer, ctx).await?;
    tracing::debug!(unspents = pool.len(), "unspent scan complete");

    let total_input_amount: u64 = pool.iter().map(|u| u.value).sum();
    if total_input_amount == 0 {
        tracing::error!("recover_wallet: no funds found across scanned addresses");
        return Err(WalletError::NoFundsToRecover);
    }

    let n_outputs = if params.krs_fee.is_some() { 2 } else { 1 };
    let fee = (TX_OVERHEAD + OUTPUT_SIZE * n_outputs + P2SH_INPUT_SIZE * pool.len() as u64) * params.fee_per_byte;
    let krs_fee_amount = params.krs_fee.as_ref().map(|(amt, _)| *amt).unwrap_or(0);

    let total_deductions = fee + krs_fee_amount;
    if total_input_amount < total_deductions {
        tracing::error!(
            inputs = total_input_amount,
            outputs = total_deductions,
            "recover_wallet: deductions exceed swept funds"
        );
        return Err(WalletError::NegativeFee {
            inputs: total_input_amount,
            outputs: total_deductions,
        });
    }
    let recovery_amount = total_input_amount - total_deductions;

    let mut outputs = vec![TxOut {
        value: Amount::from_sat(recovery_amount),
        script_pubkey: params.recovery_destination.clone(),
    }];
    if let Some((fee_amount, fee_script)) = &params.krs_fee {
        outputs.push(TxOut {
            value: Amount::from_sat(*fee_amount),
            script_pubkey: fee_script.clone(),
        });
    }

    let tx = Transaction {
        version: Version::TWO,
        lock_time: absolute::LockTime::ZERO,
        input: pool
            .iter()
            .map(|u| TxIn {
                previous_output: OutPoint::new(u.txid, u.output_index),
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: miniscript::bitcoin::Witness::new(),
            })
            .collect(),
        output: outputs,
    };

    match mode {
        RecoveryMode::Unsigned => Ok(RecoveryOutcome::Unsigned(export_offline_vault(
            &tx,
            &pool,
            params.coin,
        ))),
        RecoveryMode::Krs => {
            let RecoveryKeyMaterial::Prv(user_xprv) = &params.user_key else {
                unreachable!("determine_mode guarantees user_key is private for KRS")
            };
            let replay_protection = ReplayProtection::default();
            let signed = sign_transaction(tx, &pool, user_xprv, network, &replay_protection, false)?;
            Ok(RecoveryOutcome::Signed {
                tx_hex: hex::encode(serialize(&signed)),
                total_input_amount,
                recovery_amount,
                fee,
            })
        }
        RecoveryMode::FullSweep => {
            let (RecoveryKeyMaterial::Prv(user_xprv), RecoveryKeyMaterial::Prv(backup_xprv)) =
                (&params.user_key, &params.backup_key)
            else {
                unreachable!("determine_mode guarantees both keys are private for full sweep")
            };
            let replay_protection = ReplayProtection::default();
            let half_signed = sign_transaction(tx, &pool, user_xprv, network, &replay_protection, false)?;
            let fully_signed =
                sign_transaction(half_signed, &pool, backup_xprv, network, &replay_protection, true)?;
            Ok(RecoveryOutcome::Signed {
                tx_hex: hex::encode(serialize(&fully_signed)),
                total_input_amount,
                recovery_amount,
                fee,
            })
        }
    }
}

async fn scan_for_unspents(
    wallet_keys: &RootWalletKeys,
    network: &Network,
    params: &RecoveryParams<'_>,
    explorer: &dyn Explorer,
    ctx: &RequestContext,
) -> Result<Vec<Unspent>> {
    let mut pool = Vec::new();

    for script_type in OutputScriptType::all() {
        if params.ignore_address_types.contains(script_type) {
            continue;
        }
        if *script_type == OutputScriptType::P2wsh && !network.supports_p2wsh {
            continue;
        }

        for scope in [Scope::External, Scope::Internal] {
            let chain = Chain::new(*script_type, scope);
            tracing::debug!(chain = chain.value(), "scanning chain for unspents");
            let mut index = 0u32;
            let mut dry_streak = 0u32;

            while dry_streak < params.scan {
                let addr = address::generate_address(wallet_keys, chain, index, network, DEFAULT_THRESHOLD)?;
                let info = explorer.get_address_info(&addr.address, ctx).await?;

                if info.tx_count == 0 {
                    dry_streak += 1;
                } else {
                    dry_streak = 0;
                    if info.total_balance > 0 {
                        let unspents = explorer.get_address_unspents(&addr.address, ctx).await?;
                        tracing::debug!(
                            chain = chain.value(),
                            index,
                            found = unspents.len(),
                            "funded address classified"
                        );
                        for u in unspents {
                            pool.push(Unspent {
                                txid: u.txid,
                                output_index: u.output_index,
                                value: u.value,
                                address: u.address,
                                chain: chain.value(),
                                index,
                                redeem_script: addr.coin_specific.redeem_script.clone(),
                                witness_script: addr.coin_specific.witness_script.clone(),
                            });
                        }
                    }
                }

                index += 1;
            }
        }
    }

    Ok(pool)
}

/// `tx.locktime = latestBlockHeight + 1`, re-serialized (§6 "Post-process
/// prebuild"). Pure and independent of however the caller obtained the
/// height.
pub fn apply_locktime_bump(mut tx: Transaction, latest_block_height: u32) -> Result<Transaction> {
    let height = latest_block_height
        .checked_add(1)
        .ok_or_else(|| WalletError::Script("block height overflow".into()))?;
    tx.lock_time = LockTime::from_height(height)
        .map_err(|e| WalletError::Script(format!("invalid locktime height: {e}")))?;
    Ok(tx)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfflineVaultUnspent {
    pub chain: u32,
    pub index: u32,
    pub redeem_script: Option<String>,
    pub witness_script: Option<String>,
    pub value: u64,
}

/// §6 "Offline-vault export format".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfflineVaultDescriptor {
    pub tx_hex: String,
    pub unspents: Vec<OfflineVaultUnspent>,
    pub coin: String,
}

fn export_offline_vault(tx: &Transaction, unspents: &[Unspent], coin: &str) -> OfflineVaultDescriptor {
    OfflineVaultDescriptor {
        tx_hex: hex::encode(serialize(tx)),
        unspents: unspents
            .iter()
            .map(|u| OfflineVaultUnspent {
                chain: u.chain,
                index: u.index,
                redeem_script: u.redeem_script.as_ref().map(|s| hex::encode(s.as_bytes())),
                witness_script: u.witness_script.as_ref().map(|s| hex::encode(s.as_bytes())),
                value: u.value,
            })
            .collect(),
        coin: coin.to_string(),
    }
}

/// The inverse of `export_offline_vault`: reconstruct scan-ready unspents
/// (SPEC_FULL §B) so a cold-recovery workflow can resume an
/// unsigned sweep on its next, signing-capable pass.
pub fn parse_offline_vault(
    descriptor: &OfflineVaultDescriptor,
    wallet_keys: &RootWalletKeys,
    network: &Network,
) -> Result<Vec<Unspent>> {
    let tx_bytes = hex::decode(&descriptor.tx_hex)
        .map_err(|e| WalletError::Script(format!("bad offline-vault tx hex: {e}")))?;
    let tx: Transaction = deserialize(&tx_bytes)?;

    if tx.input.len() != descriptor.unspents.len() {
        return Err(WalletError::Script(format!(
            "offline-vault unspent count {} does not match tx input count {}",
            descriptor.unspents.len(),
            tx.input.len()
        )));
    }

    tx.input
        .iter()
        .zip(&descriptor.unspents)
        .map(|(input, u)| {
            let chain = Chain::try_from(u.chain)?;
            let addr = address::generate_address(wallet_keys, chain, u.index, network, DEFAULT_THRESHOLD)?;
            Ok(Unspent {
                txid: input.previous_output.txid,
                output_index: input.previous_output.vout,
                value: u.value,
                address: addr.address,
                chain: u.chain,
                index: u.index,
                redeem_script: decode_hex_script(u.redeem_script.as_deref())?,
                witness_script: decode_hex_script(u.witness_script.as_deref())?,
            })
        })
        .collect()
}

fn decode_hex_script(hex_str: Option<&str>) -> Result<Option<ScriptBuf>> {
    hex_str
        .map(|h| {
            hex::decode(h)
                .map(ScriptBuf::from_bytes)
                .map_err(|e| WalletError::Script(format!("bad script hex: {e}")))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed_script_wallet::wallet_keys::tests::get_test_wallet_keys;
    use crate::fixed_script_wallet::wallet_scripts::{Chain, Scope, WalletScripts};
    use crate::network;
    use async_trait::async_trait;
    use miniscript::bitcoin::hashes::Hash;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct ScriptedExplorer {
        balances: Vec<(u64, u64)>,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Explorer for ScriptedExplorer {
        async fn latest_block_height(&self, _ctx: &RequestContext) -> Result<u64> {
            Ok(100)
        }
        async fn get_tx(&self, _txid: Txid, _ctx: &RequestContext) -> Result<Vec<crate::collaborators::TxOutput>> {
            Ok(vec![])
        }
        async fn get_address_info(&self, _address: &str, _ctx: &RequestContext) -> Result<crate::collaborators::AddressInfo> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            let (tx_count, total_balance) = self.balances.get(call).copied().unwrap_or((0, 0));
            Ok(crate::collaborators::AddressInfo {
                tx_count,
                total_balance,
            })
        }
        async fn get_address_unspents(&self, address: &str, _ctx: &RequestContext) -> Result<Vec<crate::collaborators::Unspent>> {
            Ok(vec![crate::collaborators::Unspent {
                txid: Txid::all_zeros(),
                output_index: 0,
                value: 60_000,
                address: address.to_string(),
            }])
        }
    }

    #[tokio::test]
    async fn unsigned_sweep_finds_funded_address_and_stops_dry_streak() {
        let wallet_keys = get_test_wallet_keys("recovery");
        let user_xpub = *wallet_keys.user_key();
        let backup_xpub = *wallet_keys.backup_key();
        let bitgo_xpub = *wallet_keys.bitgo_key();

        let mut balances = vec![(1, 60_000)];
        balances.extend(std::iter::repeat((0, 0)).take(200));

        let explorer = ScriptedExplorer {
            balances,
            calls: AtomicU32::new(0),
        };

        let params = RecoveryParams {
            user_key: RecoveryKeyMaterial::Pub(user_xpub),
            backup_key: RecoveryKeyMaterial::Pub(backup_xpub),
            bitgo_key: RecoveryKeyMaterial::Pub(bitgo_xpub),
            recovery_destination: ScriptBuf::new(),
            scan: 3,
            ignore_address_types: vec![],
            fee_per_byte: 10,
            krs_fee: None,
            coin: "btc",
        };

        let ctx = RequestContext::default();
        let outcome = recover_wallet(&params, &network::BITCOIN, &explorer, &ctx).await.unwrap();
        match outcome {
            RecoveryOutcome::Unsigned(descriptor) => {
                assert_eq!(descriptor.unspents.len(), 1);
                assert_eq!(descriptor.unspents[0].value, 60_000);
            }
            _ => panic!("expected unsigned outcome"),
        }
    }

    struct AlwaysDryExplorer {
        calls: AtomicU32,
    }

    #[async_trait]
    impl Explorer for AlwaysDryExplorer {
        async fn latest_block_height(&self, _ctx: &RequestContext) -> Result<u64> {
            Ok(100)
        }
        async fn get_tx(&self, _txid: Txid, _ctx: &RequestContext) -> Result<Vec<crate::collaborators::TxOutput>> {
            Ok(vec![])
        }
        async fn get_address_info(&self, _address: &str, _ctx: &RequestContext) -> Result<crate::collaborators::AddressInfo> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(crate::collaborators::AddressInfo {
                tx_count: 0,
                total_balance: 0,
            })
        }
        async fn get_address_unspents(&self, _address: &str, _ctx: &RequestContext) -> Result<Vec<crate::collaborators::Unspent>> {
            panic!("must not be called once a chain is dry")
        }
    }

    /// §8 scenario 6: with `scan=3` and three consecutive empty indices, the
    /// scanner stops at index 3 and does not query index 4 — i.e. exactly
    /// `scan` calls per chain, not `scan + 1`.
    #[tokio::test]
    async fn dry_streak_stops_scanning_after_exactly_scan_indices() {
        let wallet_keys = get_test_wallet_keys("dry-streak");
        let user_xpub = *wallet_keys.user_key();
        let backup_xpub = *wallet_keys.backup_key();
        let bitgo_xpub = *wallet_keys.bitgo_key();

        let explorer = AlwaysDryExplorer {
            calls: AtomicU32::new(0),
        };

        let params = RecoveryParams {
            user_key: RecoveryKeyMaterial::Pub(user_xpub),
            backup_key: RecoveryKeyMaterial::Pub(backup_xpub),
            bitgo_key: RecoveryKeyMaterial::Pub(bitgo_xpub),
            recovery_destination: ScriptBuf::new(),
            scan: 3,
            ignore_address_types: vec![],
            fee_per_byte: 10,
            krs_fee: None,
            coin: "btc",
        };

        let ctx = RequestContext::default();
        let result = recover_wallet(&params, &network::BITCOIN, &explorer, &ctx).await;
        assert!(matches!(result, Err(WalletError::NoFundsToRecover)));

        // 3 address types x 2 scopes (main/change), 3 calls each.
        assert_eq!(explorer.calls.load(Ordering::SeqCst), 3 * 2 * 3);
    }

    #[test]
    fn offline_vault_round_trips() {
        let wallet_keys = get_test_wallet_keys("vault-roundtrip");
        let chain = Chain::new(crate::address::AddressType::P2sh, Scope::External);
        let scripts = WalletScripts::from_wallet_keys(&wallet_keys, chain, 0, &network::BITCOIN).unwrap();
        let redeem_script = match &scripts {
            WalletScripts::P2sh(s) => s.redeem_script.clone(),
            _ => unreachable!(),
        };

        let unspent = Unspent {
            txid: Txid::all_zeros(),
            output_index: 1,
            value: 25_000,
            address: "irrelevant".into(),
            chain: chain.value(),
            index: 0,
            redeem_script: Some(redeem_script),
            witness_script: None,
        };

        let tx = Transaction {
            version: Version::TWO,
            lock_time: absolute::LockTime::ZERO,
            input: vec![TxIn {
                previous_output: OutPoint::new(unspent.txid, unspent.output_index),
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: miniscript::bitcoin::Witness::new(),
            }],
            output: vec![],
        };

        let descriptor = export_offline_vault(&tx, &[unspent.clone()], "btc");
        let parsed = parse_offline_vault(&descriptor, &wallet_keys, &network::BITCOIN).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].value, unspent.value);
        assert_eq!(parsed[0].output_index, unspent.output_index);
        assert_eq!(parsed[0].redeem_script, unspent.redeem_script);
    }

    #[test]
    fn locktime_bump_sets_height_plus_one() {
        let tx = Transaction {
            version: Version::TWO,
            lock_time: absolute::LockTime::ZERO,
            input: vec![],
            output: vec![],
        };
        let bumped = apply_locktime_bump(tx, 799_999).unwrap();
        assert_eq!(bumped.lock_time, LockTime::from_height(800_000).unwrap());
    }

    fn base_params(user_key: RecoveryKeyMaterial, backup_key: RecoveryKeyMaterial) -> RecoveryParams<'static> {
        let bitgo_xpub = *get_test_wallet_keys("mode-check").bitgo_key();
        RecoveryParams {
            user_key,
            backup_key,
            bitgo_key: RecoveryKeyMaterial::Pub(bitgo_xpub),
            recovery_destination: ScriptBuf::new(),
            scan: DEFAULT_SCAN,
            ignore_address_types: vec![OutputScriptType::P2wsh],
            fee_per_byte: 10,
            krs_fee: None,
            coin: "btc",
        }
    }

    #[test]
    fn mode_is_unsigned_when_both_keys_are_public() {
        let xpub = *get_test_wallet_keys("mode-check").user_key();
        let params = base_params(RecoveryKeyMaterial::Pub(xpub), RecoveryKeyMaterial::Pub(xpub));
        assert_eq!(determine_mode(&params).unwrap(), RecoveryMode::Unsigned);
    }

    #[test]
    fn mode_is_full_sweep_when_both_keys_are_private() {
        let xprvs = crate::keys::test_utils::test_wallet_xprvs("mode-check-prv");
        let params = base_params(
            RecoveryKeyMaterial::Prv(xprvs[0].clone()),
            RecoveryKeyMaterial::Prv(xprvs[1].clone()),
        );
        assert_eq!(determine_mode(&params).unwrap(), RecoveryMode::FullSweep);
    }

    #[test]
    fn mode_is_krs_only_when_fee_is_set() {
        let xprvs = crate::keys::test_utils::test_wallet_xprvs("mode-check-krs");
        let backup_xpub = *get_test_wallet_keys("mode-check-krs").backup_key();

        let mut params = base_params(
            RecoveryKeyMaterial::Prv(xprvs[0].clone()),
            RecoveryKeyMaterial::Pub(backup_xpub),
        );
        assert!(determine_mode(&params).is_err());

        params.krs_fee = Some((1_000, ScriptBuf::new()));
        assert_eq!(determine_mode(&params).unwrap(), RecoveryMode::Krs);
    }
}
