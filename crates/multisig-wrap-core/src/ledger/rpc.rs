//! # JSON-RPC Ledger Client
//!
//! Ledger client for a live cluster with:
//! - Endpoint failover
//! - Re-send of the same signed transaction until its blockhash expires
//! - Blockhash refresh once a transaction can no longer land
//! - Confirmation polling up to the configured commitment
//!
//! ## Example
//!
//! ```rust,ignore
//! use multisig_wrap_core::{config::LedgerConfig, ledger::RpcLedger};
//!
//! let ledger = RpcLedger::new(LedgerConfig::devnet(), payer)?;
//! let account = ledger.get_account(&address).await?;
//! ```

use super::{LedgerClient, Memcmp};
use crate::config::LedgerConfig;
use crate::smart_wallet::state::anchor_account_discriminator;
use crate::{AccountData, Bundle, DerivedKeyInfo, Error, Receipt, Result};
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use borsh::BorshDeserialize;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use solana_sdk::{
    hash::Hash,
    message::Message,
    pubkey::Pubkey,
    signature::{Keypair, Signer},
    transaction::Transaction,
};
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

// ============================================================================
// RPC Client
// ============================================================================

/// JSON-RPC transport over one or more endpoints
///
/// A transport failure moves on to the next endpoint and keeps it preferred
/// for later calls. An error answered by a node is returned at once: every
/// endpoint of a cluster answers alike.
#[derive(Clone)]
pub struct RpcClient {
    endpoints: Arc<[String]>,
    http: reqwest::Client,
    preferred: Arc<AtomicUsize>,
}

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: &'a serde_json::Value,
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: serde_json::Value,
    error: Option<RpcNodeError>,
}

#[derive(Debug, Deserialize)]
struct RpcNodeError {
    code: i64,
    message: String,
}

enum Failure {
    /// The endpoint could not be reached or answered garbage
    Transport(Error),
    /// The node rejected the call
    Node(Error),
}

impl RpcClient {
    /// Client over `endpoints`, tried in order
    pub fn new(endpoints: Vec<String>) -> Result<Self> {
        if endpoints.is_empty() {
            return Err(Error::InvalidConfig("At least one RPC URL required".into()));
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Ledger(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            endpoints: endpoints.into(),
            http,
            preferred: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Call `method`, failing over between endpoints
    pub async fn request<T: DeserializeOwned>(&self, method: &str, params: serde_json::Value) -> Result<T> {
        let first = self.preferred.load(Ordering::Relaxed);
        let mut last_error = None;

        for offset in 0..self.endpoints.len() {
            let index = (first + offset) % self.endpoints.len();
            let endpoint = &self.endpoints[index];

            match self.call(endpoint, method, &params).await {
                Ok(value) => {
                    self.preferred.store(index, Ordering::Relaxed);
                    return serde_json::from_value(value)
                        .map_err(|e| Error::Serialization(format!("{} result: {}", method, e)));
                }
                Err(Failure::Node(e)) => return Err(e),
                Err(Failure::Transport(e)) => {
                    tracing::warn!(%endpoint, method, "RPC endpoint failed: {}", e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| Error::Ledger("All RPC endpoints failed".into())))
    }

    async fn call(
        &self,
        endpoint: &str,
        method: &str,
        params: &serde_json::Value,
    ) -> std::result::Result<serde_json::Value, Failure> {
        let body = RpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method,
            params,
        };

        let response: RpcResponse = self
            .http
            .post(endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| Failure::Transport(Error::Timeout(format!("{} on {}: {}", method, endpoint, e))))?
            .json()
            .await
            .map_err(|e| Failure::Transport(Error::Serialization(format!("{} response: {}", method, e))))?;

        match response.error {
            Some(error) => Err(Failure::Node(Error::Ledger(format!(
                "{} rejected: {} (code {})",
                method, error.message, error.code
            )))),
            None => Ok(response.result),
        }
    }
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient")
            .field("endpoints", &self.endpoints)
            .field("preferred", &self.preferred.load(Ordering::Relaxed))
            .finish()
    }
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Deserialize)]
struct RpcAccount {
    lamports: u64,
    owner: String,
    data: (String, String),
    executable: bool,
}

impl RpcAccount {
    fn into_account(self) -> Result<AccountData> {
        let owner = Pubkey::from_str(&self.owner)
            .map_err(|e| Error::Serialization(format!("Invalid owner: {}", e)))?;
        let data = BASE64
            .decode(self.data.0)
            .map_err(|e| Error::Serialization(format!("Invalid account data: {}", e)))?;
        Ok(AccountData {
            owner,
            lamports: self.lamports,
            data,
            executable: self.executable,
        })
    }
}

#[derive(Deserialize)]
struct Contextual<T> {
    value: T,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignatureStatus {
    slot: u64,
    err: Option<serde_json::Value>,
    confirmation_status: Option<String>,
}

/// Next step for a transaction that was not confirmed in time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resubmit {
    /// It may still land: send the same signed bytes again
    SameTransaction,
    /// Its blockhash expired unseen, so it can never land: sign anew
    FreshBlockhash,
}

impl Resubmit {
    /// `blockhash_valid` must be observed before `seen`: a transaction
    /// unseen after its blockhash expired cannot execute later.
    fn after_timeout(blockhash_valid: bool, seen: bool) -> Self {
        if blockhash_valid || seen {
            Resubmit::SameTransaction
        } else {
            Resubmit::FreshBlockhash
        }
    }
}

/// Key info record kept by the derived-address registry program
#[derive(BorshDeserialize)]
struct KeyInfoRecord {
    owner: Pubkey,
    seeds: Vec<u8>,
}

// ============================================================================
// Ledger
// ============================================================================

/// Ledger client for a live cluster
#[derive(Debug, Clone)]
pub struct RpcLedger {
    config: LedgerConfig,
    rpc: RpcClient,
    payer: Arc<Keypair>,
}

impl RpcLedger {
    /// Create a client paying fees from `payer`
    pub fn new(config: LedgerConfig, payer: Arc<Keypair>) -> Result<Self> {
        config.validate()?;
        let rpc = RpcClient::new(config.rpc_urls.clone())?;
        Ok(Self { config, rpc, payer })
    }

    /// Get the configuration
    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Get RPC client reference
    pub fn rpc(&self) -> &RpcClient {
        &self.rpc
    }

    async fn latest_blockhash(&self) -> Result<Hash> {
        #[derive(Deserialize)]
        struct BlockhashResponse {
            blockhash: String,
        }

        let response: Contextual<BlockhashResponse> = self
            .rpc
            .request(
                "getLatestBlockhash",
                serde_json::json!([{ "commitment": self.config.commitment.as_str() }]),
            )
            .await?;

        Hash::from_str(&response.value.blockhash)
            .map_err(|e| Error::Serialization(format!("Invalid blockhash: {}", e)))
    }

    fn sign(&self, bundle: &Bundle, blockhash: Hash) -> Result<Transaction> {
        let payer = self.payer.pubkey();
        let message = Message::new(&bundle.instructions, Some(&payer));
        let mut tx = Transaction::new_unsigned(message);

        let mut keypairs: Vec<&Keypair> = vec![self.payer.as_ref()];
        keypairs.extend(
            bundle
                .signers
                .iter()
                .filter(|s| s.pubkey() != payer)
                .map(|s| s.as_ref()),
        );
        tx.try_sign(&keypairs, blockhash)
            .map_err(|e| Error::Ledger(format!("Failed to sign transaction: {}", e)))?;
        Ok(tx)
    }

    async fn is_blockhash_valid(&self, blockhash: &Hash) -> Result<bool> {
        let response: Contextual<bool> = self
            .rpc
            .request(
                "isBlockhashValid",
                serde_json::json!([
                    blockhash.to_string(),
                    { "commitment": self.config.commitment.as_str() }
                ]),
            )
            .await?;
        Ok(response.value)
    }

    async fn signature_status(&self, signature: &str, search_history: bool) -> Result<Option<SignatureStatus>> {
        let response: Contextual<Vec<Option<SignatureStatus>>> = self
            .rpc
            .request(
                "getSignatureStatuses",
                serde_json::json!([[signature], { "searchTransactionHistory": search_history }]),
            )
            .await?;
        Ok(response.value.into_iter().next().flatten())
    }

    async fn send_raw(&self, raw: &[u8]) -> Result<()> {
        let _: String = self
            .rpc
            .request(
                "sendTransaction",
                serde_json::json!([
                    BASE64.encode(raw),
                    {
                        "encoding": "base64",
                        "skipPreflight": false,
                        "preflightCommitment": self.config.commitment.as_str()
                    }
                ]),
            )
            .await?;
        Ok(())
    }

    async fn wait_for_confirmation(&self, signature: &str) -> Result<u64> {
        let start = Instant::now();
        let timeout = Duration::from_secs(self.config.confirm_timeout_secs);
        let wanted = self.config.commitment.as_str();

        loop {
            if start.elapsed() > timeout {
                return Err(Error::Timeout(format!(
                    "Transaction {} not confirmed within {} seconds",
                    signature, self.config.confirm_timeout_secs
                )));
            }

            if let Some(status) = self.signature_status(signature, false).await? {
                if let Some(err) = status.err {
                    return Err(Error::Ledger(format!(
                        "Transaction {} failed: {}",
                        signature, err
                    )));
                }
                let reached = match status.confirmation_status.as_deref() {
                    Some("finalized") => true,
                    Some("confirmed") => wanted != "finalized",
                    Some("processed") => wanted == "processed",
                    _ => false,
                };
                if reached {
                    return Ok(status.slot);
                }
            }

            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    }
}

#[async_trait]
impl LedgerClient for RpcLedger {
    fn payer(&self) -> Pubkey {
        self.payer.pubkey()
    }

    async fn get_account(&self, address: &Pubkey) -> Result<Option<AccountData>> {
        let response: Contextual<Option<RpcAccount>> = self
            .rpc
            .request(
                "getAccountInfo",
                serde_json::json!([
                    address.to_string(),
                    {
                        "encoding": "base64",
                        "commitment": self.config.commitment.as_str()
                    }
                ]),
            )
            .await?;

        response.value.map(RpcAccount::into_account).transpose()
    }

    async fn get_program_accounts(
        &self,
        program: &Pubkey,
        filters: &[Memcmp],
    ) -> Result<Vec<(Pubkey, AccountData)>> {
        #[derive(Deserialize)]
        struct KeyedAccount {
            pubkey: String,
            account: RpcAccount,
        }

        let filters: Vec<_> = filters
            .iter()
            .map(|f| {
                serde_json::json!({
                    "memcmp": {
                        "offset": f.offset,
                        "bytes": bs58::encode(&f.bytes).into_string()
                    }
                })
            })
            .collect();

        let response: Vec<KeyedAccount> = self
            .rpc
            .request(
                "getProgramAccounts",
                serde_json::json!([
                    program.to_string(),
                    {
                        "encoding": "base64",
                        "commitment": self.config.commitment.as_str(),
                        "filters": filters
                    }
                ]),
            )
            .await?;

        response
            .into_iter()
            .map(|keyed| {
                let address = Pubkey::from_str(&keyed.pubkey)
                    .map_err(|e| Error::Serialization(format!("Invalid address: {}", e)))?;
                Ok((address, keyed.account.into_account()?))
            })
            .collect()
    }

    async fn token_supply(&self, mint: &Pubkey) -> Result<u64> {
        #[derive(Deserialize)]
        struct Supply {
            amount: String,
        }

        let response: Contextual<Supply> = self
            .rpc
            .request("getTokenSupply", serde_json::json!([mint.to_string()]))
            .await?;

        response
            .value
            .amount
            .parse()
            .map_err(|e| Error::Serialization(format!("Invalid supply: {}", e)))
    }

    async fn unix_timestamp(&self) -> Result<i64> {
        let slot: u64 = self
            .rpc
            .request(
                "getSlot",
                serde_json::json!([{ "commitment": self.config.commitment.as_str() }]),
            )
            .await?;
        let time: Option<i64> = self
            .rpc
            .request("getBlockTime", serde_json::json!([slot]))
            .await?;
        time.ok_or_else(|| Error::Ledger(format!("No block time for slot {}", slot)))
    }

    async fn resolve_derived(&self, address: &Pubkey) -> Result<Option<DerivedKeyInfo>> {
        let Some(registry) = self.config.key_info_program else {
            return Ok(None);
        };

        let (record_address, _) = Pubkey::find_program_address(&[address.as_ref()], &registry);
        let Some(account) = self.get_account(&record_address).await? else {
            return Ok(None);
        };

        let invalid = |reason: String| Error::InvalidAccountData {
            address: record_address,
            reason,
        };
        let discriminator = anchor_account_discriminator("KeyInfo");
        let body = account
            .data
            .strip_prefix(discriminator.as_slice())
            .ok_or_else(|| invalid("not a key info record".into()))?;
        let record =
            KeyInfoRecord::deserialize(&mut &body[..]).map_err(|e| invalid(e.to_string()))?;

        Ok(Some(DerivedKeyInfo {
            owner: record.owner,
            seeds: record.seeds,
        }))
    }

    async fn send_and_confirm(&self, bundle: &Bundle) -> Result<Receipt> {
        let mut last_error = None;
        // signed bytes that may still land; never replaced while they can
        let mut pending: Option<(Hash, String, Vec<u8>)> = None;

        for attempt in 0..=self.config.send_retries {
            let (blockhash, signature, raw) = match pending.take() {
                Some(signed) => signed,
                None => {
                    let blockhash = self.latest_blockhash().await?;
                    let tx = self.sign(bundle, blockhash)?;
                    let signature = tx
                        .signatures
                        .first()
                        .map(|s| s.to_string())
                        .ok_or_else(|| Error::Ledger("Unsigned transaction".into()))?;
                    (blockhash, signature, bincode1::serialize(&tx)?)
                }
            };

            match self.send_raw(&raw).await {
                Ok(()) => {}
                Err(e) if e.to_string().contains("already been processed") => {
                    tracing::debug!(attempt, %signature, "Transaction already landed");
                }
                Err(e) if e.to_string().contains("Blockhash not found") => {
                    tracing::warn!(attempt, "Stale blockhash, signing anew");
                    last_error = Some(e);
                    continue;
                }
                Err(e) => return Err(e),
            }

            match self.wait_for_confirmation(&signature).await {
                Ok(slot) => {
                    return Ok(Receipt {
                        signature,
                        slot,
                        instruction_count: bundle.len(),
                    });
                }
                Err(e @ Error::Timeout(_)) => {
                    let blockhash_valid = self.is_blockhash_valid(&blockhash).await?;
                    let seen = self.signature_status(&signature, true).await?.is_some();
                    match Resubmit::after_timeout(blockhash_valid, seen) {
                        Resubmit::SameTransaction => {
                            tracing::warn!(attempt, %signature, "Confirmation timed out, re-sending");
                            pending = Some((blockhash, signature, raw));
                        }
                        Resubmit::FreshBlockhash => {
                            tracing::warn!(attempt, %signature, "Blockhash expired unseen, signing anew");
                        }
                    }
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| Error::Ledger("Submission failed".into())))
    }
}
