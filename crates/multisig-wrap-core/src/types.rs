//! Core types for authority wrapping
//!
//! A [`Bundle`] is the unit every component passes around: an ordered list of
//! operations plus the auxiliary keypairs that must sign when it is submitted.
//! Operations are plain Solana instructions.

use serde::{Deserialize, Serialize};
use solana_sdk::{
    instruction::Instruction,
    pubkey::Pubkey,
    signature::{Keypair, Signer},
};
use std::fmt;
use std::sync::Arc;

/// An atomic unit of work: program id, account metas and data
pub type Operation = Instruction;

/// Check whether `op` lists `authority` as a required signer
pub fn requires_signer(op: &Operation, authority: &Pubkey) -> bool {
    op.accounts
        .iter()
        .any(|meta| meta.is_signer && meta.pubkey == *authority)
}

/// Ordered operations plus the extra signers needed to submit them
#[derive(Debug, Clone, Default)]
pub struct Bundle {
    /// Operations in submission order
    pub instructions: Vec<Operation>,
    /// Auxiliary signers (the fee payer is supplied by the ledger client)
    pub signers: Vec<Arc<Keypair>>,
}

impl Bundle {
    /// Create a bundle without auxiliary signers
    pub fn new(instructions: Vec<Operation>) -> Self {
        Self {
            instructions,
            signers: Vec::new(),
        }
    }

    /// Attach auxiliary signers
    pub fn with_signers(mut self, signers: Vec<Arc<Keypair>>) -> Self {
        for signer in signers {
            self.add_signer(signer);
        }
        self
    }

    /// Add a signer unless one with the same key is already present
    pub fn add_signer(&mut self, signer: Arc<Keypair>) {
        let key = signer.pubkey();
        if !self.signers.iter().any(|s| s.pubkey() == key) {
            self.signers.push(signer);
        }
    }

    /// Append an operation
    pub fn push(&mut self, instruction: Operation) {
        self.instructions.push(instruction);
    }

    /// Append all operations and signers of `other`
    pub fn combine(mut self, other: Bundle) -> Self {
        self.instructions.extend(other.instructions);
        for signer in other.signers {
            self.add_signer(signer);
        }
        self
    }

    /// Number of operations
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Whether the bundle holds no operations
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Public keys of the auxiliary signers
    pub fn signer_keys(&self) -> Vec<Pubkey> {
        self.signers.iter().map(|s| s.pubkey()).collect()
    }

    /// Index of the first operation requiring `authority` as signer
    pub fn first_signed_by(&self, authority: &Pubkey) -> Option<usize> {
        self.instructions
            .iter()
            .position(|ix| requires_signer(ix, authority))
    }

    /// Split into `[0, at)` and `[at, len)`, both keeping the signer set
    pub fn split_at(self, at: usize) -> (Bundle, Vec<Operation>) {
        let mut head = self;
        let tail = head.instructions.split_off(at);
        (head, tail)
    }
}

impl From<Vec<Operation>> for Bundle {
    fn from(instructions: Vec<Operation>) -> Self {
        Bundle::new(instructions)
    }
}

/// Account snapshot as returned by the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountData {
    /// Owning program
    pub owner: Pubkey,
    /// Balance in lamports
    pub lamports: u64,
    /// Raw account data
    pub data: Vec<u8>,
    /// Whether the account holds a program
    pub executable: bool,
}

impl AccountData {
    /// Create an account owned by `owner` holding `data`
    pub fn new(owner: Pubkey, data: Vec<u8>) -> Self {
        Self {
            owner,
            lamports: 1_000_000,
            data,
            executable: false,
        }
    }

    /// Whether the account is owned by the system program (uninitialized)
    pub fn is_system_owned(&self) -> bool {
        self.owner == solana_sdk::system_program::id()
    }
}

/// Owner and seed bytes a derived address was computed from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedKeyInfo {
    /// Program the address was derived for
    pub owner: Pubkey,
    /// Concatenated seed bytes
    pub seeds: Vec<u8>,
}

impl DerivedKeyInfo {
    /// Create key info from the individual seed slices
    pub fn from_seeds(owner: Pubkey, seeds: &[&[u8]]) -> Self {
        Self {
            owner,
            seeds: seeds.concat(),
        }
    }
}

/// Receipt for a confirmed submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// Transaction signature (base58)
    pub signature: String,
    /// Slot the transaction landed in
    pub slot: u64,
    /// Number of operations included
    pub instruction_count: usize,
}

impl fmt::Display for Receipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (slot {}, {} ix)",
            self.signature, self.slot, self.instruction_count
        )
    }
}
