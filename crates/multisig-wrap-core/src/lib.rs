//! # Multisig Wrap Core
//!
//! Routes Solana instruction bundles through shared authorities. Any
//! instruction that must be signed by a multisig authority is rewritten into a
//! deferred-execution construct which the authority's members approve later.
//!
//! ## Architecture
//!
//! This crate provides:
//! - **Wrapping Engine**: splits a bundle at the first operation needing the
//!   authority and wraps the rest in groups that fit ledger limits
//! - **Smart Wallet Backend**: Goki-style N-of-M owner wallets (propose, approve, execute)
//! - **Governance Backend**: token-weighted proposals (create, vote, execute),
//!   including native treasuries
//! - **Backend Dispatch**: classifies an authority address and installs the
//!   matching backend once
//! - **Ledger Clients**: JSON-RPC with endpoint failover, plus an in-memory ledger
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use multisig_wrap_core::{Bundle, dispatch::{BackendOptions, BackendRegistry}};
//! use multisig_wrap_core::config::{DispatchConfig, LedgerConfig};
//! use multisig_wrap_core::ledger::{RpcLedger, submit_partitioned};
//!
//! let ledger = Arc::new(RpcLedger::new(LedgerConfig::devnet(), payer)?);
//!
//! // Detect the authority behind the treasury
//! let mut registry = BackendRegistry::new();
//! registry.install(treasury, ledger.clone(), &DispatchConfig::default(), &BackendOptions::default()).await?;
//!
//! // Every instruction signed by the treasury becomes part of a proposal
//! let wrapped = registry.apply(Bundle::new(instructions), ledger.as_ref()).await?;
//! submit_partitioned(ledger.as_ref(), &wrapped).await?;
//! ```
//!
//! ## Ordering
//!
//! Operations before the first authority-bearing one are submitted as they
//! are. Everything from that point on is wrapped, in original order, even if
//! later operations would not need the authority.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod governance;
pub mod ledger;
pub mod signer;
pub mod smart_wallet;
pub mod types;
pub mod wrap;

pub use error::{Error, Result};
pub use types::{AccountData, Bundle, DerivedKeyInfo, Operation, Receipt, requires_signer};

pub use dispatch::{Backend, BackendKind, BackendRegistry};
pub use governance::GovernanceBackend;
pub use signer::{DerivedAddressSigner, KeypairSigner, SignerProvider, WalletSigner};
pub use smart_wallet::SmartWalletBackend;
pub use wrap::{Wrapper, wrap};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
