//! # Ledger Client
//!
//! Everything this crate knows about the chain goes through [`LedgerClient`]:
//! account lookup, submission with confirmation, derived-address resolution and
//! the "does this bundle fit" check the wrapping engine relies on.
//!
//! Two implementations ship with the crate:
//! - [`MemoryLedger`] keeps accounts in process and records submissions
//! - [`RpcLedger`] talks JSON-RPC to a cluster (feature `rpc`)

pub mod memory;

#[cfg(feature = "rpc")]
pub mod rpc;

use crate::{AccountData, Bundle, DerivedKeyInfo, Error, Receipt, Result};
use async_trait::async_trait;
use solana_sdk::{
    instruction::Instruction, message::Message, pubkey::Pubkey, signature::Signer,
    transaction::Transaction,
};
use std::collections::HashSet;

pub use memory::MemoryLedger;

#[cfg(feature = "rpc")]
pub use rpc::{RpcClient, RpcLedger};

/// Maximum serialized transaction size accepted by the cluster
pub const PACKET_DATA_SIZE: usize = solana_sdk::packet::PACKET_DATA_SIZE;

/// Maximum number of distinct accounts one transaction may reference
pub const MAX_TRANSACTION_ACCOUNTS: usize = 64;

/// Byte-range filter for program account scans
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Memcmp {
    /// Offset into the account data
    pub offset: usize,
    /// Bytes expected at `offset`
    pub bytes: Vec<u8>,
}

impl Memcmp {
    /// Filter for `bytes` at `offset`
    pub fn new(offset: usize, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            offset,
            bytes: bytes.into(),
        }
    }

    /// Whether `data` passes the filter
    pub fn matches(&self, data: &[u8]) -> bool {
        data.get(self.offset..self.offset + self.bytes.len()) == Some(self.bytes.as_slice())
    }
}

/// Access to the ledger
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Fee payer that signs every submission
    fn payer(&self) -> Pubkey;

    /// Serialized transaction size limit
    fn max_transaction_size(&self) -> usize {
        PACKET_DATA_SIZE
    }

    /// Fetch an account, `None` if it does not exist
    async fn get_account(&self, address: &Pubkey) -> Result<Option<AccountData>>;

    /// Fetch all accounts of `program` passing every filter
    async fn get_program_accounts(
        &self,
        program: &Pubkey,
        filters: &[Memcmp],
    ) -> Result<Vec<(Pubkey, AccountData)>>;

    /// Total supply of a token mint
    async fn token_supply(&self, mint: &Pubkey) -> Result<u64>;

    /// Current cluster time
    async fn unix_timestamp(&self) -> Result<i64>;

    /// Recover the owner and seeds a derived address was computed from
    async fn resolve_derived(&self, address: &Pubkey) -> Result<Option<DerivedKeyInfo>>;

    /// Submit one transaction worth of `bundle` and wait for confirmation
    async fn send_and_confirm(&self, bundle: &Bundle) -> Result<Receipt>;

    /// Split `bundle` into submittable transactions, failing when an
    /// operation cannot fit into any transaction
    fn try_build(&self, bundle: &Bundle) -> Result<Vec<Bundle>> {
        partition(bundle, &self.payer(), self.max_transaction_size())
    }

    /// Fetch an account that must exist
    async fn require_account(&self, address: &Pubkey) -> Result<AccountData> {
        self.get_account(address)
            .await?
            .ok_or(Error::AccountNotFound(*address))
    }
}

/// Serialized size of a transaction carrying `instructions`
pub fn transaction_size(instructions: &[Instruction], payer: &Pubkey) -> Result<usize> {
    let message = Message::new(instructions, Some(payer));
    let tx = Transaction::new_unsigned(message);
    Ok(bincode1::serialized_size(&tx)? as usize)
}

fn check_fits(instructions: &[Instruction], payer: &Pubkey, limit: usize) -> Result<()> {
    let mut keys: HashSet<Pubkey> = HashSet::new();
    keys.insert(*payer);
    for ix in instructions {
        keys.insert(ix.program_id);
        keys.extend(ix.accounts.iter().map(|meta| meta.pubkey));
    }
    if keys.len() > MAX_TRANSACTION_ACCOUNTS {
        return Err(Error::TooManyAccounts {
            count: keys.len(),
            limit: MAX_TRANSACTION_ACCOUNTS,
        });
    }

    let size = transaction_size(instructions, payer)?;
    if size > limit {
        return Err(Error::TransactionTooLarge { size, limit });
    }
    Ok(())
}

fn part(instructions: Vec<Instruction>, source: &Bundle) -> Bundle {
    let needed: HashSet<Pubkey> = instructions
        .iter()
        .flat_map(|ix| ix.accounts.iter())
        .filter(|meta| meta.is_signer)
        .map(|meta| meta.pubkey)
        .collect();
    let signers = source
        .signers
        .iter()
        .filter(|s| needed.contains(&s.pubkey()))
        .cloned()
        .collect();
    Bundle::new(instructions).with_signers(signers)
}

/// Greedily pack `bundle` into transactions no larger than `limit`
///
/// Operations keep their order. Each part only carries the signers its
/// operations reference. Fails if a single operation exceeds the limit.
pub fn partition(bundle: &Bundle, payer: &Pubkey, limit: usize) -> Result<Vec<Bundle>> {
    let mut parts = Vec::new();
    let mut current: Vec<Instruction> = Vec::new();

    for ix in &bundle.instructions {
        current.push(ix.clone());
        if check_fits(&current, payer, limit).is_ok() {
            continue;
        }

        current.pop();
        check_fits(std::slice::from_ref(ix), payer, limit)?;
        if !current.is_empty() {
            parts.push(part(std::mem::take(&mut current), bundle));
        }
        current.push(ix.clone());
    }

    if !current.is_empty() {
        parts.push(part(current, bundle));
    }
    Ok(parts)
}

/// Partition `bundle` and submit every part in order
pub async fn submit_partitioned(ledger: &dyn LedgerClient, bundle: &Bundle) -> Result<Vec<Receipt>> {
    let parts = ledger.try_build(bundle)?;
    let mut receipts = Vec::with_capacity(parts.len());
    for part in &parts {
        let receipt = ledger.send_and_confirm(part).await?;
        tracing::debug!(signature = %receipt.signature, "Submitted {} instruction(s)", part.len());
        receipts.push(receipt);
    }
    Ok(receipts)
}
