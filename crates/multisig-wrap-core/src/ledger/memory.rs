//! In-memory ledger for testing and local development
//!
//! Accounts, token supplies and derived-address records are plain maps. Every
//! submission is recorded instead of executed, so tests can inspect exactly
//! what a backend tried to send.

use super::{LedgerClient, Memcmp, PACKET_DATA_SIZE, partition};
use crate::{AccountData, Bundle, DerivedKeyInfo, Error, Receipt, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use solana_sdk::pubkey::Pubkey;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug)]
struct LedgerState {
    accounts: HashMap<Pubkey, AccountData>,
    derived: HashMap<Pubkey, DerivedKeyInfo>,
    supplies: HashMap<Pubkey, u64>,
    submissions: Vec<Bundle>,
    build_attempts: Vec<usize>,
    max_transaction_size: usize,
    fail_sends: u32,
    slot: u64,
    now: i64,
}

/// In-process ledger client
#[derive(Debug, Clone)]
pub struct MemoryLedger {
    payer: Pubkey,
    state: Arc<RwLock<LedgerState>>,
}

impl MemoryLedger {
    /// Create an empty ledger with a random payer
    pub fn new() -> Self {
        Self::with_payer(Pubkey::new_unique())
    }

    /// Create an empty ledger paying from `payer`
    pub fn with_payer(payer: Pubkey) -> Self {
        Self {
            payer,
            state: Arc::new(RwLock::new(LedgerState {
                accounts: HashMap::new(),
                derived: HashMap::new(),
                supplies: HashMap::new(),
                submissions: Vec::new(),
                build_attempts: Vec::new(),
                max_transaction_size: PACKET_DATA_SIZE,
                fail_sends: 0,
                slot: 1,
                now: chrono::Utc::now().timestamp(),
            })),
        }
    }

    /// Store or replace an account
    pub fn set_account(&self, address: Pubkey, account: AccountData) {
        self.state.write().accounts.insert(address, account);
    }

    /// Snapshot of an account
    pub fn account(&self, address: &Pubkey) -> Option<AccountData> {
        self.state.read().accounts.get(address).cloned()
    }

    /// Remove an account
    pub fn remove_account(&self, address: &Pubkey) -> Option<AccountData> {
        self.state.write().accounts.remove(address)
    }

    /// Record the derivation of `address`
    pub fn register_derived(&self, address: Pubkey, info: DerivedKeyInfo) {
        self.state.write().derived.insert(address, info);
    }

    /// Set the supply of a token mint
    pub fn set_token_supply(&self, mint: Pubkey, supply: u64) {
        self.state.write().supplies.insert(mint, supply);
    }

    /// Lower or raise the transaction size limit
    pub fn set_max_transaction_size(&self, size: usize) {
        self.state.write().max_transaction_size = size;
    }

    /// Set the cluster clock
    pub fn set_unix_timestamp(&self, now: i64) {
        self.state.write().now = now;
    }

    /// Make the next `count` submissions fail
    pub fn fail_next_sends(&self, count: u32) {
        self.state.write().fail_sends = count;
    }

    /// All confirmed submissions in order
    pub fn submissions(&self) -> Vec<Bundle> {
        self.state.read().submissions.clone()
    }

    /// Operation counts of every `try_build` call in order
    pub fn build_attempts(&self) -> Vec<usize> {
        self.state.read().build_attempts.clone()
    }

    /// Clear recorded submissions and build attempts
    pub fn clear_history(&self) {
        let mut state = self.state.write();
        state.submissions.clear();
        state.build_attempts.clear();
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerClient for MemoryLedger {
    fn payer(&self) -> Pubkey {
        self.payer
    }

    fn max_transaction_size(&self) -> usize {
        self.state.read().max_transaction_size
    }

    async fn get_account(&self, address: &Pubkey) -> Result<Option<AccountData>> {
        Ok(self.state.read().accounts.get(address).cloned())
    }

    async fn get_program_accounts(
        &self,
        program: &Pubkey,
        filters: &[Memcmp],
    ) -> Result<Vec<(Pubkey, AccountData)>> {
        let state = self.state.read();
        let mut found: Vec<_> = state
            .accounts
            .iter()
            .filter(|(_, account)| account.owner == *program)
            .filter(|(_, account)| filters.iter().all(|f| f.matches(&account.data)))
            .map(|(address, account)| (*address, account.clone()))
            .collect();
        found.sort_by_key(|(address, _)| *address);
        Ok(found)
    }

    async fn token_supply(&self, mint: &Pubkey) -> Result<u64> {
        self.state
            .read()
            .supplies
            .get(mint)
            .copied()
            .ok_or(Error::AccountNotFound(*mint))
    }

    async fn unix_timestamp(&self) -> Result<i64> {
        Ok(self.state.read().now)
    }

    async fn resolve_derived(&self, address: &Pubkey) -> Result<Option<DerivedKeyInfo>> {
        Ok(self.state.read().derived.get(address).cloned())
    }

    async fn send_and_confirm(&self, bundle: &Bundle) -> Result<Receipt> {
        let mut state = self.state.write();
        if state.fail_sends > 0 {
            state.fail_sends -= 1;
            return Err(Error::Ledger("simulated submission failure".into()));
        }

        state.slot += 1;
        state.submissions.push(bundle.clone());
        Ok(Receipt {
            signature: bs58::encode(Pubkey::new_unique().to_bytes()).into_string(),
            slot: state.slot,
            instruction_count: bundle.len(),
        })
    }

    fn try_build(&self, bundle: &Bundle) -> Result<Vec<Bundle>> {
        let limit = {
            let mut state = self.state.write();
            state.build_attempts.push(bundle.len());
            state.max_transaction_size
        };
        partition(bundle, &self.payer, limit)
    }
}
