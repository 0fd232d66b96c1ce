//! Error types for authority wrapping

use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

/// Result type alias for wrapping operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while wrapping, proposing or executing bundles
#[derive(Debug, Error)]
pub enum Error {
    // ============ Wrapping Errors ============
    /// A single operation cannot be wrapped by the backend at all
    #[error("Operation {index} cannot be wrapped: {reason}")]
    UnwrappableOperation { index: usize, reason: String },

    /// Candidate bundle does not fit into a ledger transaction
    #[error("Transaction too large: {size} bytes (limit {limit})")]
    TransactionTooLarge { size: usize, limit: usize },

    /// Candidate bundle references more accounts than a transaction may lock
    #[error("Too many accounts: {count} (limit {limit})")]
    TooManyAccounts { count: usize, limit: usize },

    // ============ Backend Errors ============
    /// Proposer has no token-owner-record or no permission to propose
    #[error("Proposer is not eligible: {0}")]
    ProposerIneligible(String),

    /// Approval was rejected (already approved, not an owner, ...)
    #[error("Approval rejected: {0}")]
    ApprovalRejected(String),

    /// Approval threshold requirements not met
    #[error("Threshold not met: required {required}, got {actual}")]
    ThresholdNotMet { required: u64, actual: u64 },

    /// Record is not in the state the operation requires
    #[error("Invalid state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    /// Signer cannot produce signatures
    #[error("Can not sign for {0}")]
    CannotSign(Pubkey),

    // ============ Dispatch Errors ============
    /// Derived address is owned by a program that is not a known multisig
    #[error("Unknown multisig program {0}")]
    UnknownMultisigProgram(Pubkey),

    /// Derived address uses a seed layout we cannot interpret
    #[error("Unknown PDA seed scheme {seeds} (owner {owner})")]
    UnknownSeedScheme { owner: Pubkey, seeds: String },

    // ============ Ledger Errors ============
    /// Account does not exist
    #[error("Account not found: {0}")]
    AccountNotFound(Pubkey),

    /// Account exists but its data could not be decoded
    #[error("Invalid account data for {address}: {reason}")]
    InvalidAccountData { address: Pubkey, reason: String },

    /// Ledger client failure
    #[error("Ledger error: {0}")]
    Ledger(String),

    /// Timeout waiting for confirmation
    #[error("Timeout waiting for {0}")]
    Timeout(String),

    // ============ Configuration Errors ============
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ============ Serialization Errors ============
    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the engine may retry with a smaller group after this error
    pub fn is_size_limit(&self) -> bool {
        matches!(
            self,
            Error::TransactionTooLarge { .. } | Error::TooManyAccounts { .. }
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<bincode1::Error> for Error {
    fn from(e: bincode1::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
