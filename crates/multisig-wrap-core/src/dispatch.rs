//! # Backend Dispatch
//!
//! Classifies an authority address and binds the matching backend:
//!
//! 1. account owned by the smart wallet program: [`SmartWalletBackend`]
//! 2. account owned by a known governance program: [`GovernanceBackend`]
//! 3. missing or system-owned account: the derived-address registry is asked
//!    how the address was computed. A governance native treasury
//!    (`"native-treasury" || governance`) binds the governance and signs as
//!    the treasury; any other derivation is an error.
//!
//! Installed backends live in a [`BackendRegistry`] keyed by signing
//! authority, so each authority is detected at most once.
//!
//! ## Example
//!
//! ```rust,ignore
//! use multisig_wrap_core::dispatch::{BackendOptions, BackendRegistry};
//!
//! let mut registry = BackendRegistry::new();
//! registry.install(treasury, ledger.clone(), &DispatchConfig::default(), &BackendOptions::default()).await?;
//! let wrapped = registry.apply(bundle, ledger.as_ref()).await?;
//! ```

use crate::config::DispatchConfig;
use crate::governance::{GovernanceBackend, instruction::NATIVE_TREASURY_SEED, instruction::native_treasury_address};
use crate::ledger::LedgerClient;
use crate::signer::SignerProvider;
use crate::smart_wallet::SmartWalletBackend;
use crate::wrap::{Wrapper, wrap};
use crate::{Bundle, Error, Result};
use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Stable tag of a backend variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    SmartWallet,
    Governance,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::SmartWallet => write!(f, "smart-wallet"),
            BackendKind::Governance => write!(f, "governance"),
        }
    }
}

/// A detected backend
#[derive(Debug, Clone)]
pub enum Backend {
    SmartWallet(SmartWalletBackend),
    Governance(GovernanceBackend),
}

impl Backend {
    pub fn kind(&self) -> BackendKind {
        match self {
            Backend::SmartWallet(_) => BackendKind::SmartWallet,
            Backend::Governance(_) => BackendKind::Governance,
        }
    }

    /// Address of the wallet or governance account the backend is bound to
    pub fn host(&self) -> Pubkey {
        match self {
            Backend::SmartWallet(backend) => backend.address(),
            Backend::Governance(backend) => backend.address(),
        }
    }

    pub fn as_smart_wallet(&self) -> Option<&SmartWalletBackend> {
        match self {
            Backend::SmartWallet(backend) => Some(backend),
            Backend::Governance(_) => None,
        }
    }

    pub fn as_governance(&self) -> Option<&GovernanceBackend> {
        match self {
            Backend::Governance(backend) => Some(backend),
            Backend::SmartWallet(_) => None,
        }
    }

    fn inner(&self) -> &dyn Wrapper {
        match self {
            Backend::SmartWallet(backend) => backend,
            Backend::Governance(backend) => backend,
        }
    }
}

#[async_trait]
impl Wrapper for Backend {
    fn signing_by(&self) -> Pubkey {
        self.inner().signing_by()
    }

    fn program_id(&self) -> Pubkey {
        self.inner().program_id()
    }

    async fn create_wrapped(&self, group: Bundle, sequence: u64) -> Result<Bundle> {
        self.inner().create_wrapped(group, sequence).await
    }
}

/// Parties new backends propose and pay with; `None` keeps the ledger wallet
#[derive(Debug, Clone, Default)]
pub struct BackendOptions {
    pub proposer: Option<Arc<dyn SignerProvider>>,
    pub rent_payer: Option<Arc<dyn SignerProvider>>,
}

impl BackendOptions {
    pub fn with_proposer(mut self, proposer: Arc<dyn SignerProvider>) -> Self {
        self.proposer = Some(proposer);
        self
    }

    pub fn with_rent_payer(mut self, rent_payer: Arc<dyn SignerProvider>) -> Self {
        self.rent_payer = Some(rent_payer);
        self
    }

    fn smart_wallet(&self, mut backend: SmartWalletBackend) -> SmartWalletBackend {
        if let Some(proposer) = &self.proposer {
            backend = backend.with_proposer(proposer.clone());
        }
        if let Some(payer) = &self.rent_payer {
            backend = backend.with_payer(payer.clone());
        }
        backend
    }

    fn governance(&self, mut backend: GovernanceBackend) -> GovernanceBackend {
        if let Some(proposer) = &self.proposer {
            backend = backend.with_proposer(proposer.clone());
        }
        if let Some(payer) = &self.rent_payer {
            backend = backend.with_rent_payer(payer.clone());
        }
        backend
    }
}

async fn bind_governance(
    ledger: Arc<dyn LedgerClient>,
    program_id: Pubkey,
    governance: Pubkey,
    config: &DispatchConfig,
    options: &BackendOptions,
) -> Result<GovernanceBackend> {
    let backend = GovernanceBackend::load(ledger, program_id, config.governance_version, governance)
        .await?
        .with_side(config.side)
        .with_log_only(config.log_only);
    Ok(options.governance(backend))
}

/// Treasury derivation `"native-treasury" || governance` of `program_id`
fn treasury_governance(program_id: &Pubkey, address: &Pubkey, seeds: &[u8]) -> Option<Pubkey> {
    let suffix = seeds.strip_prefix(NATIVE_TREASURY_SEED)?;
    let governance = Pubkey::try_from(suffix).ok()?;
    (native_treasury_address(program_id, &governance) == *address).then_some(governance)
}

/// Find the backend able to sign as `address`.
///
/// Returns `Ok(None)` for addresses that are not multisig authorities.
pub async fn detect(
    address: Pubkey,
    ledger: Arc<dyn LedgerClient>,
    config: &DispatchConfig,
    options: &BackendOptions,
) -> Result<Option<Backend>> {
    let account = ledger.get_account(&address).await?;

    if let Some(account) = account.as_ref().filter(|a| !a.is_system_owned()) {
        if account.owner == config.smart_wallet_program {
            tracing::info!(%address, "Detected smart wallet");
            let backend = SmartWalletBackend::load(ledger, address, account.owner).await?;
            return Ok(Some(Backend::SmartWallet(options.smart_wallet(backend))));
        }
        if config.is_known_governance(&account.owner) {
            tracing::info!(%address, program = %account.owner, "Detected governance");
            let backend = bind_governance(ledger, account.owner, address, config, options).await?;
            return Ok(Some(Backend::Governance(backend)));
        }
        tracing::debug!(%address, owner = %account.owner, "Not a multisig account");
        return Ok(None);
    }

    let Some(info) = ledger.resolve_derived(&address).await? else {
        tracing::debug!(%address, "No derivation recorded");
        return Ok(None);
    };
    if !config.is_known_governance(&info.owner) {
        return Err(Error::UnknownMultisigProgram(info.owner));
    }
    let Some(governance) = treasury_governance(&info.owner, &address, &info.seeds) else {
        return Err(Error::UnknownSeedScheme {
            owner: info.owner,
            seeds: hex::encode(&info.seeds),
        });
    };

    tracing::info!(%address, %governance, "Detected governance native treasury");
    let backend = bind_governance(ledger, info.owner, governance, config, options)
        .await?
        .with_signing_by(address);
    Ok(Some(Backend::Governance(backend)))
}

/// Installed backends, at most one per signing authority
#[derive(Debug, Default)]
pub struct BackendRegistry {
    backends: Vec<Backend>,
    by_authority: HashMap<Pubkey, usize>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Whether a backend of `kind` signing as `authority` is installed
    pub fn contains(&self, kind: BackendKind, authority: &Pubkey) -> bool {
        self.get(authority).is_some_and(|b| b.kind() == kind)
    }

    /// Backend signing as `authority`
    pub fn get(&self, authority: &Pubkey) -> Option<&Backend> {
        self.by_authority.get(authority).map(|&i| &self.backends[i])
    }

    /// Installed backends in installation order
    pub fn iter(&self) -> impl Iterator<Item = &Backend> {
        self.backends.iter()
    }

    /// Add `backend` unless its authority is taken; returns whether it was added
    pub fn insert(&mut self, backend: Backend) -> bool {
        let authority = backend.signing_by();
        if self.by_authority.contains_key(&authority) {
            return false;
        }
        self.by_authority.insert(authority, self.backends.len());
        self.backends.push(backend);
        true
    }

    /// Detect and install the backend for `address`.
    ///
    /// Detection is skipped when `address` already has a backend. Returns
    /// whether a backend was added.
    pub async fn install(
        &mut self,
        address: Pubkey,
        ledger: Arc<dyn LedgerClient>,
        config: &DispatchConfig,
        options: &BackendOptions,
    ) -> Result<bool> {
        if self.by_authority.contains_key(&address) {
            tracing::debug!(%address, "Backend already installed");
            return Ok(false);
        }
        match detect(address, ledger, config, options).await? {
            Some(backend) => Ok(self.insert(backend)),
            None => Ok(false),
        }
    }

    /// Run `bundle` through every installed backend in installation order
    pub async fn apply(&self, mut bundle: Bundle, ledger: &dyn LedgerClient) -> Result<Bundle> {
        for backend in &self.backends {
            bundle = wrap(bundle, backend, ledger).await?;
        }
        Ok(bundle)
    }
}
