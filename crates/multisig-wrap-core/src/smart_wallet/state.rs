//! Smart wallet account layouts
//!
//! Both records are Anchor accounts: an 8-byte discriminator followed by the
//! borsh encoded fields. Trailing reserved space is ignored on decode.

use crate::{Error, Result};
use borsh::{BorshDeserialize, BorshSerialize};
use sha2::{Digest, Sha256};
use solana_sdk::{instruction::AccountMeta, pubkey::Pubkey};
use std::fmt;

/// `executed_at` of a transaction that has not run yet
pub const NOT_EXECUTED: i64 = -1;

/// Anchor account discriminator: `sha256("account:<Name>")[..8]`
pub fn anchor_account_discriminator(name: &str) -> [u8; 8] {
    discriminator("account", name)
}

/// Anchor instruction discriminator: `sha256("global:<name>")[..8]`
pub fn anchor_instruction_discriminator(name: &str) -> [u8; 8] {
    discriminator("global", name)
}

fn discriminator(namespace: &str, name: &str) -> [u8; 8] {
    let hash = Sha256::digest(format!("{}:{}", namespace, name).as_bytes());
    let mut out = [0u8; 8];
    out.copy_from_slice(&hash[..8]);
    out
}

fn decode<T: BorshDeserialize>(name: &str, address: &Pubkey, data: &[u8]) -> Result<T> {
    let invalid = |reason: String| Error::InvalidAccountData {
        address: *address,
        reason,
    };
    let body = data
        .strip_prefix(anchor_account_discriminator(name).as_slice())
        .ok_or_else(|| invalid(format!("not a {} account", name)))?;
    T::deserialize(&mut &body[..]).map_err(|e| invalid(e.to_string()))
}

fn encode<T: BorshSerialize>(name: &str, value: &T) -> Vec<u8> {
    let mut data = anchor_account_discriminator(name).to_vec();
    // writing into a Vec cannot fail
    let _ = value.serialize(&mut data);
    data
}

// ============================================================================
// Smart Wallet
// ============================================================================

/// Multi-owner threshold wallet
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct SmartWallet {
    /// Base key the wallet address is derived from
    pub base: Pubkey,
    pub bump: u8,
    /// Approvals required to execute
    pub threshold: u64,
    pub minimum_delay: i64,
    pub grace_period: i64,
    /// Bumped whenever the owner set changes
    pub owner_set_seqno: u32,
    /// Transactions created so far; the next one gets this index
    pub num_transactions: u64,
    pub owners: Vec<Pubkey>,
}

impl SmartWallet {
    /// Decode from raw account data
    pub fn unpack(address: &Pubkey, data: &[u8]) -> Result<Self> {
        decode("SmartWallet", address, data)
    }

    /// Encode into raw account data
    pub fn pack(&self) -> Vec<u8> {
        encode("SmartWallet", self)
    }

    /// Position of `owner` in the owner list
    pub fn owner_index(&self, owner: &Pubkey) -> Option<usize> {
        self.owners.iter().position(|o| o == owner)
    }
}

// ============================================================================
// Transaction
// ============================================================================

/// Account reference inside a wrapped instruction
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct TxAccountMeta {
    pub pubkey: Pubkey,
    pub is_signer: bool,
    pub is_writable: bool,
}

/// Instruction stored in a wallet transaction
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct TxInstruction {
    pub program_id: Pubkey,
    pub keys: Vec<TxAccountMeta>,
    pub data: Vec<u8>,
}

impl From<&solana_sdk::instruction::Instruction> for TxInstruction {
    fn from(ix: &solana_sdk::instruction::Instruction) -> Self {
        Self {
            program_id: ix.program_id,
            keys: ix
                .accounts
                .iter()
                .map(|meta| TxAccountMeta {
                    pubkey: meta.pubkey,
                    is_signer: meta.is_signer,
                    is_writable: meta.is_writable,
                })
                .collect(),
            data: ix.data.clone(),
        }
    }
}

impl TxInstruction {
    /// Accounts to pass when the wallet replays this instruction.
    ///
    /// The wallet signs through the program, so it is never a transaction signer.
    pub fn replay_accounts(&self, wallet: &Pubkey) -> Vec<AccountMeta> {
        let mut metas: Vec<_> = self
            .keys
            .iter()
            .map(|key| {
                let is_signer = key.is_signer && key.pubkey != *wallet;
                if key.is_writable {
                    AccountMeta::new(key.pubkey, is_signer)
                } else {
                    AccountMeta::new_readonly(key.pubkey, is_signer)
                }
            })
            .collect();
        metas.push(AccountMeta::new_readonly(self.program_id, false));
        metas
    }
}

/// Lifecycle of a wallet transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletTransactionStatus {
    /// Created, no approvals
    Proposed,
    /// Some approvals, below threshold
    PartiallyApproved,
    /// Threshold met, not executed
    Approved,
    Executed,
}

impl fmt::Display for WalletTransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WalletTransactionStatus::Proposed => "proposed",
            WalletTransactionStatus::PartiallyApproved => "partially approved",
            WalletTransactionStatus::Approved => "approved",
            WalletTransactionStatus::Executed => "executed",
        };
        f.write_str(s)
    }
}

/// Pending or executed wallet transaction
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct WalletTransaction {
    pub smart_wallet: Pubkey,
    pub index: u64,
    pub bump: u8,
    pub proposer: Pubkey,
    pub instructions: Vec<TxInstruction>,
    /// Approval flag per owner slot
    pub signers: Vec<bool>,
    pub owner_set_seqno: u32,
    pub eta: i64,
    pub executor: Pubkey,
    pub executed_at: i64,
}

impl WalletTransaction {
    /// Decode from raw account data
    pub fn unpack(address: &Pubkey, data: &[u8]) -> Result<Self> {
        decode("Transaction", address, data)
    }

    /// Encode into raw account data
    pub fn pack(&self) -> Vec<u8> {
        encode("Transaction", self)
    }

    /// Number of owner slots that approved
    pub fn approvals(&self) -> u64 {
        self.signers.iter().filter(|approved| **approved).count() as u64
    }

    /// Whether the transaction ran
    pub fn is_executed(&self) -> bool {
        self.executed_at != NOT_EXECUTED
    }

    /// Whether the transaction may be executed now
    pub fn is_executable(&self, threshold: u64) -> bool {
        !self.is_executed() && self.approvals() >= threshold
    }

    /// Current lifecycle stage
    pub fn status(&self, threshold: u64) -> WalletTransactionStatus {
        match self.approvals() {
            _ if self.is_executed() => WalletTransactionStatus::Executed,
            0 => WalletTransactionStatus::Proposed,
            n if n >= threshold => WalletTransactionStatus::Approved,
            _ => WalletTransactionStatus::PartiallyApproved,
        }
    }

    /// Record the approval of owner slot `owner_index`.
    ///
    /// An owner that already approved is rejected and nothing changes.
    pub fn approve(&mut self, owner_index: usize) -> Result<()> {
        if self.is_executed() {
            return Err(Error::InvalidState {
                expected: "pending".into(),
                actual: "executed".into(),
            });
        }
        let slot = self.signers.get_mut(owner_index).ok_or_else(|| {
            Error::ApprovalRejected(format!("owner index {} out of range", owner_index))
        })?;
        if *slot {
            return Err(Error::ApprovalRejected(format!(
                "owner {} already approved",
                owner_index
            )));
        }
        *slot = true;
        Ok(())
    }

    /// Mark executed at `now`
    pub fn execute(&mut self, threshold: u64, executor: Pubkey, now: i64) -> Result<()> {
        if self.is_executed() {
            return Err(Error::InvalidState {
                expected: "pending".into(),
                actual: "executed".into(),
            });
        }
        if self.approvals() < threshold {
            return Err(Error::ThresholdNotMet {
                required: threshold,
                actual: self.approvals(),
            });
        }
        self.executor = executor;
        self.executed_at = now;
        Ok(())
    }
}
