//! # Smart Wallet Backend
//!
//! Wraps operations into transactions of a Goki-style threshold smart wallet.
//!
//! Lifecycle of a wrapped group:
//! `Proposed -> (PartiallyApproved)* -> Approved -> Executed`
//!
//! - `create_wrapped` proposes the group as a new wallet transaction
//! - every owner approves at most once; the program rejects repeats
//! - once approvals reach the threshold any owner may execute
//!
//! ## Example
//!
//! ```rust,ignore
//! use multisig_wrap_core::smart_wallet::SmartWalletBackend;
//!
//! let backend = SmartWalletBackend::load(ledger.clone(), wallet, SMART_WALLET_PROGRAM_ID)
//!     .await?
//!     .with_proposer(owner.clone());
//! let wrapped = wrap(bundle, &backend, ledger.as_ref()).await?;
//! ```

pub mod instruction;
pub mod state;

use crate::ledger::{LedgerClient, submit_partitioned};
use crate::signer::{SignerProvider, WalletSigner};
use crate::wrap::Wrapper;
use crate::{Bundle, Error, Receipt, Result};
use async_trait::async_trait;
use futures_util::future::try_join_all;
use solana_sdk::pubkey::Pubkey;
use std::fmt;
use std::sync::Arc;

pub use state::{SmartWallet, TxInstruction, WalletTransaction, WalletTransactionStatus};

/// Threshold smart wallet bound to one wallet account
#[derive(Clone)]
pub struct SmartWalletBackend {
    program_id: Pubkey,
    address: Pubkey,
    ledger: Arc<dyn LedgerClient>,
    proposer: Arc<dyn SignerProvider>,
    payer: Arc<dyn SignerProvider>,
}

impl SmartWalletBackend {
    /// Bind to the wallet at `address`, proposing and paying from the ledger wallet
    pub async fn load(ledger: Arc<dyn LedgerClient>, address: Pubkey, program_id: Pubkey) -> Result<Self> {
        let account = ledger.require_account(&address).await?;
        if account.owner != program_id {
            return Err(Error::InvalidAccountData {
                address,
                reason: format!("owned by {}, expected {}", account.owner, program_id),
            });
        }
        let wallet = SmartWallet::unpack(&address, &account.data)?;
        tracing::debug!(
            %address,
            threshold = wallet.threshold,
            owners = wallet.owners.len(),
            "Loaded smart wallet"
        );

        let wallet_signer: Arc<dyn SignerProvider> = Arc::new(WalletSigner::of(ledger.as_ref()));
        Ok(Self {
            program_id,
            address,
            ledger,
            proposer: wallet_signer.clone(),
            payer: wallet_signer,
        })
    }

    /// Propose as `proposer`
    pub fn with_proposer(mut self, proposer: Arc<dyn SignerProvider>) -> Self {
        self.proposer = proposer;
        self
    }

    /// Pay rent from `payer`
    pub fn with_payer(mut self, payer: Arc<dyn SignerProvider>) -> Self {
        self.payer = payer;
        self
    }

    /// Wallet account address
    pub fn address(&self) -> Pubkey {
        self.address
    }

    /// Current wallet state
    pub async fn wallet(&self) -> Result<SmartWallet> {
        let account = self.ledger.require_account(&self.address).await?;
        SmartWallet::unpack(&self.address, &account.data)
    }

    /// Address of transaction `index`
    pub fn transaction_address(&self, index: u64) -> Pubkey {
        instruction::find_transaction_address(&self.program_id, &self.address, index).0
    }

    /// Transaction `index`, `None` if it was never created
    pub async fn transaction(&self, index: u64) -> Result<Option<WalletTransaction>> {
        let address = self.transaction_address(index);
        self.ledger
            .get_account(&address)
            .await?
            .map(|account| WalletTransaction::unpack(&address, &account.data))
            .transpose()
    }

    async fn require_transaction(&self, index: u64) -> Result<WalletTransaction> {
        self.transaction(index)
            .await?
            .ok_or_else(|| Error::AccountNotFound(self.transaction_address(index)))
    }

    /// Approve transaction `index` as `owner`
    pub async fn approve(&self, index: u64, owner: &dyn SignerProvider) -> Result<Vec<Receipt>> {
        let wallet = self.wallet().await?;
        let mut tx = self.require_transaction(index).await?;
        let slot = wallet.owner_index(&owner.authority()).ok_or_else(|| {
            Error::ApprovalRejected(format!("{} is not an owner", owner.authority()))
        })?;
        // rejects a repeated approval before anything is sent
        tx.approve(slot)?;

        let ix = instruction::approve(
            &self.program_id,
            &self.address,
            &self.transaction_address(index),
            &owner.authority(),
        );
        owner.sign_and_submit(self.ledger.as_ref(), Bundle::new(vec![ix])).await
    }

    /// Execute transaction `index` as `owner`; the threshold must be met
    pub async fn execute(&self, index: u64, owner: &dyn SignerProvider) -> Result<Vec<Receipt>> {
        let wallet = self.wallet().await?;
        let tx = self.require_transaction(index).await?;
        if tx.is_executed() {
            return Err(Error::InvalidState {
                expected: "pending".into(),
                actual: "executed".into(),
            });
        }
        if !tx.is_executable(wallet.threshold) {
            return Err(Error::ThresholdNotMet {
                required: wallet.threshold,
                actual: tx.approvals(),
            });
        }

        let ix = instruction::execute_transaction(
            &self.program_id,
            &self.address,
            &self.transaction_address(index),
            &owner.authority(),
            &tx.instructions,
        );
        owner.sign_and_submit(self.ledger.as_ref(), Bundle::new(vec![ix])).await
    }

    /// Collect missing approvals from `members` and execute transaction `index`.
    ///
    /// Members that cannot sign or are not owners are skipped. Approvals and
    /// the execution are submitted together, split into as many ledger
    /// transactions as needed.
    pub async fn approve_and_execute(
        &self,
        index: u64,
        members: &[Arc<dyn SignerProvider>],
    ) -> Result<Vec<Receipt>> {
        let wallet = self.wallet().await?;
        let mut tx = self.require_transaction(index).await?;
        if tx.is_executed() {
            return Err(Error::InvalidState {
                expected: "pending".into(),
                actual: "executed".into(),
            });
        }

        let transaction = self.transaction_address(index);
        let mut bundle = Bundle::default();
        let mut executor: Option<&Arc<dyn SignerProvider>> = None;

        for member in members.iter().filter(|m| m.can_sign()) {
            let Some(slot) = wallet.owner_index(&member.authority()) else {
                continue;
            };
            executor.get_or_insert(member);
            if tx.approvals() >= wallet.threshold || tx.approve(slot).is_err() {
                continue;
            }
            bundle.push(instruction::approve(
                &self.program_id,
                &self.address,
                &transaction,
                &member.authority(),
            ));
            member.sign(&mut bundle)?;
        }

        if tx.approvals() < wallet.threshold {
            return Err(Error::ThresholdNotMet {
                required: wallet.threshold,
                actual: tx.approvals(),
            });
        }
        let executor = executor.ok_or(Error::CannotSign(self.address))?;

        bundle.push(instruction::execute_transaction(
            &self.program_id,
            &self.address,
            &transaction,
            &executor.authority(),
            &tx.instructions,
        ));
        executor.sign(&mut bundle)?;

        tracing::info!(
            wallet = %self.address,
            index,
            approvals = bundle.len() - 1,
            "Executing wallet transaction"
        );
        submit_partitioned(self.ledger.as_ref(), &bundle).await
    }

    /// Unexecuted transactions whose approvals are below the threshold
    pub async fn pending_transactions(&self) -> Result<Vec<(u64, WalletTransaction)>> {
        let wallet = self.wallet().await?;
        let fetched = try_join_all((0..wallet.num_transactions).map(|index| async move {
            Ok::<_, Error>((index, self.transaction(index).await?))
        }))
        .await?;

        Ok(fetched
            .into_iter()
            .filter_map(|(index, tx)| Some((index, tx?)))
            .filter(|(_, tx)| !tx.is_executed() && tx.approvals() < wallet.threshold)
            .collect())
    }

    /// Drive every unexecuted transaction to execution
    pub async fn execute_all_pending(&self, members: &[Arc<dyn SignerProvider>]) -> Result<Vec<Receipt>> {
        let wallet = self.wallet().await?;
        let mut receipts = Vec::new();
        for index in 0..wallet.num_transactions {
            match self.transaction(index).await? {
                Some(tx) if !tx.is_executed() => {
                    receipts.extend(self.approve_and_execute(index, members).await?);
                }
                _ => {}
            }
        }
        Ok(receipts)
    }
}

impl fmt::Debug for SmartWalletBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmartWalletBackend")
            .field("program_id", &self.program_id)
            .field("address", &self.address)
            .field("proposer", &self.proposer.authority())
            .finish()
    }
}

#[async_trait]
impl Wrapper for SmartWalletBackend {
    fn signing_by(&self) -> Pubkey {
        self.address
    }

    fn program_id(&self) -> Pubkey {
        self.program_id
    }

    async fn create_wrapped(&self, group: Bundle, sequence: u64) -> Result<Bundle> {
        let wallet = self.wallet().await?;
        let proposer = self.proposer.authority();
        if wallet.owner_index(&proposer).is_none() {
            return Err(Error::ProposerIneligible(format!(
                "{} is not an owner of smart wallet {}",
                proposer, self.address
            )));
        }

        let index = wallet.num_transactions + sequence;
        let (transaction, bump) =
            instruction::find_transaction_address(&self.program_id, &self.address, index);
        let instructions: Vec<TxInstruction> = group.instructions.iter().map(TxInstruction::from).collect();

        let mut bundle = Bundle::new(vec![instruction::create_transaction(
            &self.program_id,
            &self.address,
            &transaction,
            bump,
            &proposer,
            &self.payer.authority(),
            &instructions,
        )]);
        self.proposer.sign(&mut bundle)?;
        self.payer.sign(&mut bundle)?;

        tracing::debug!(
            wallet = %self.address,
            index,
            %transaction,
            "Proposing {} instruction(s)",
            instructions.len()
        );
        Ok(bundle)
    }
}
