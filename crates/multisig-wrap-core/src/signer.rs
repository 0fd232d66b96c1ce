//! Signer providers
//!
//! Every party that proposes, approves, votes or executes is represented by a
//! [`SignerProvider`]. Three flavors exist:
//! - [`KeypairSigner`] holds a local keypair and attaches it to bundles
//! - [`WalletSigner`] is the ledger client's own fee-payer wallet
//! - [`DerivedAddressSigner`] stands for a program-derived address and can never sign

use crate::ledger::{LedgerClient, submit_partitioned};
use crate::{Bundle, Error, Receipt, Result};
use async_trait::async_trait;
use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signer},
};
use std::fmt;
use std::sync::Arc;

/// A party able (or not) to authorize bundles
#[async_trait]
pub trait SignerProvider: Send + Sync + fmt::Debug {
    /// Address this provider signs as
    fn authority(&self) -> Pubkey;

    /// Whether this provider can produce signatures
    fn can_sign(&self) -> bool;

    /// Attach whatever is needed for `bundle` to carry this provider's signature
    fn sign(&self, bundle: &mut Bundle) -> Result<()>;

    /// Sign `bundle` and submit it, split into as many transactions as needed
    async fn sign_and_submit(
        &self,
        ledger: &dyn LedgerClient,
        mut bundle: Bundle,
    ) -> Result<Vec<Receipt>> {
        self.sign(&mut bundle)?;
        submit_partitioned(ledger, &bundle).await
    }
}

/// Signer backed by a local keypair
#[derive(Debug, Clone)]
pub struct KeypairSigner {
    keypair: Arc<Keypair>,
}

impl KeypairSigner {
    /// Wrap a keypair
    pub fn new(keypair: Keypair) -> Self {
        Self {
            keypair: Arc::new(keypair),
        }
    }

    /// Wrap a shared keypair
    pub fn from_arc(keypair: Arc<Keypair>) -> Self {
        Self { keypair }
    }

    /// Shared keypair handle
    pub fn keypair(&self) -> Arc<Keypair> {
        Arc::clone(&self.keypair)
    }
}

#[async_trait]
impl SignerProvider for KeypairSigner {
    fn authority(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    fn can_sign(&self) -> bool {
        true
    }

    fn sign(&self, bundle: &mut Bundle) -> Result<()> {
        bundle.add_signer(self.keypair());
        Ok(())
    }
}

/// The ledger client's fee-payer wallet; it signs every submission already
#[derive(Debug, Clone, Copy)]
pub struct WalletSigner {
    authority: Pubkey,
}

impl WalletSigner {
    /// Signer for the wallet of `ledger`
    pub fn of(ledger: &dyn LedgerClient) -> Self {
        Self {
            authority: ledger.payer(),
        }
    }

    /// Signer for a known wallet address
    pub fn new(authority: Pubkey) -> Self {
        Self { authority }
    }
}

#[async_trait]
impl SignerProvider for WalletSigner {
    fn authority(&self) -> Pubkey {
        self.authority
    }

    fn can_sign(&self) -> bool {
        true
    }

    fn sign(&self, _bundle: &mut Bundle) -> Result<()> {
        Ok(())
    }
}

/// Placeholder for a program-derived address; any sign attempt fails
#[derive(Debug, Clone, Copy)]
pub struct DerivedAddressSigner {
    authority: Pubkey,
}

impl DerivedAddressSigner {
    /// Placeholder for `authority`
    pub fn new(authority: Pubkey) -> Self {
        Self { authority }
    }
}

#[async_trait]
impl SignerProvider for DerivedAddressSigner {
    fn authority(&self) -> Pubkey {
        self.authority
    }

    fn can_sign(&self) -> bool {
        false
    }

    fn sign(&self, _bundle: &mut Bundle) -> Result<()> {
        Err(Error::CannotSign(self.authority))
    }

    async fn sign_and_submit(
        &self,
        _ledger: &dyn LedgerClient,
        _bundle: Bundle,
    ) -> Result<Vec<Receipt>> {
        Err(Error::CannotSign(self.authority))
    }
}
