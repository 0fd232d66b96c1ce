//! # Governance Backend
//!
//! Wraps operations into token-weighted governance proposals.
//!
//! Lifecycle of a wrapped group:
//! `Draft -> SigningOff -> Voting -> {Succeeded | Defeated} -> Executing -> Completed`
//!
//! `create_wrapped` creates the proposal, inserts every operation as its own
//! proposal-transaction entry and signs off in one bundle, so the proposal
//! is already voting once the wrapped bundle lands. A vote that misses the
//! threshold is not an error: the proposal ends `Defeated` and callers
//! inspect [`ProposalState`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use multisig_wrap_core::governance::{GovernanceBackend, Voter};
//!
//! let backend = GovernanceBackend::load(ledger.clone(), GOVERNANCE_PROGRAM_ID, 3, governance)
//!     .await?
//!     .with_side(GoverningSide::Community);
//! let wrapped = wrap(bundle, &backend, ledger.as_ref()).await?;
//!
//! backend.approve_and_execute(&proposal, &[Voter::new(member)]).await?;
//! ```

pub mod instruction;
pub mod state;

use crate::config::{GOVERNANCE_PROGRAM_VERSION_V3, GoverningSide};
use crate::ledger::{LedgerClient, Memcmp, submit_partitioned};
use crate::signer::{SignerProvider, WalletSigner};
use crate::wrap::Wrapper;
use crate::{Bundle, Error, Receipt, Result};
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use borsh::BorshSerialize;
use instruction::{ProposalAccounts, VoteAccounts};
use solana_sdk::pubkey::Pubkey;
use std::fmt;
use std::sync::Arc;

pub use state::{
    GovernanceAccount, GovernanceThresholds, InstructionData, ProposalAccount, ProposalState,
    ProposalTransactionAccount, RealmAccount, TokenOwnerRecord, Vote, VoteThreshold,
};

/// A token holder taking part in a vote, optionally through a delegate
#[derive(Debug, Clone)]
pub struct Voter {
    pub owner: Arc<dyn SignerProvider>,
    pub delegate: Option<Arc<dyn SignerProvider>>,
}

impl Voter {
    /// Voter signing as the record owner
    pub fn new(owner: Arc<dyn SignerProvider>) -> Self {
        Self {
            owner,
            delegate: None,
        }
    }

    /// Vote through `delegate` when the owner cannot sign
    pub fn with_delegate(mut self, delegate: Arc<dyn SignerProvider>) -> Self {
        self.delegate = Some(delegate);
        self
    }
}

/// Governance proposal host bound to one governance account
#[derive(Clone)]
pub struct GovernanceBackend {
    program_id: Pubkey,
    version: u8,
    address: Pubkey,
    realm: Pubkey,
    signing_by: Pubkey,
    side: GoverningSide,
    log_only: bool,
    ledger: Arc<dyn LedgerClient>,
    proposer: Arc<dyn SignerProvider>,
    rent_payer: Arc<dyn SignerProvider>,
}

impl GovernanceBackend {
    /// Bind to the governance at `address`, signing as the governance itself
    pub async fn load(
        ledger: Arc<dyn LedgerClient>,
        program_id: Pubkey,
        version: u8,
        address: Pubkey,
    ) -> Result<Self> {
        let account = ledger.require_account(&address).await?;
        if account.owner != program_id {
            return Err(Error::InvalidAccountData {
                address,
                reason: format!("owned by {}, expected {}", account.owner, program_id),
            });
        }
        let governance = GovernanceAccount::unpack(&address, &account.data, version)?;
        let realm = ledger.require_account(&governance.realm).await?;
        RealmAccount::unpack(&governance.realm, &realm.data)?;

        tracing::debug!(
            %address,
            realm = %governance.realm,
            version,
            "Loaded governance"
        );

        let wallet: Arc<dyn SignerProvider> = Arc::new(WalletSigner::of(ledger.as_ref()));
        Ok(Self {
            program_id,
            version,
            address,
            realm: governance.realm,
            signing_by: address,
            side: GoverningSide::default(),
            log_only: false,
            ledger,
            proposer: wallet.clone(),
            rent_payer: wallet,
        })
    }

    /// Sign as `authority` (e.g. the native treasury) instead of the governance
    pub fn with_signing_by(mut self, authority: Pubkey) -> Self {
        self.signing_by = authority;
        self
    }

    /// Create proposals with the mint of `side`
    pub fn with_side(mut self, side: GoverningSide) -> Self {
        self.side = side;
        self
    }

    /// Log wrapped operations instead of proposing them
    pub fn with_log_only(mut self, log_only: bool) -> Self {
        self.log_only = log_only;
        self
    }

    /// Create proposals as `proposer`
    pub fn with_proposer(mut self, proposer: Arc<dyn SignerProvider>) -> Self {
        self.proposer = proposer;
        self
    }

    /// Pay rent from `rent_payer`
    pub fn with_rent_payer(mut self, rent_payer: Arc<dyn SignerProvider>) -> Self {
        self.rent_payer = rent_payer;
        self
    }

    /// Governance account address
    pub fn address(&self) -> Pubkey {
        self.address
    }

    /// Realm account address
    pub fn realm_address(&self) -> Pubkey {
        self.realm
    }

    pub fn side(&self) -> GoverningSide {
        self.side
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn is_log_only(&self) -> bool {
        self.log_only
    }

    /// Treasury address signed for by this governance
    pub fn native_treasury(&self) -> Pubkey {
        instruction::native_treasury_address(&self.program_id, &self.address)
    }

    /// Current governance state
    pub async fn governance(&self) -> Result<GovernanceAccount> {
        let account = self.ledger.require_account(&self.address).await?;
        GovernanceAccount::unpack(&self.address, &account.data, self.version)
    }

    /// Current realm state
    pub async fn realm(&self) -> Result<RealmAccount> {
        let account = self.ledger.require_account(&self.realm).await?;
        RealmAccount::unpack(&self.realm, &account.data)
    }

    /// Proposal at `address`
    pub async fn proposal(&self, address: &Pubkey) -> Result<ProposalAccount> {
        let account = self.ledger.require_account(address).await?;
        ProposalAccount::unpack(address, &account.data)
    }

    /// Token owner record of `owner` for `mint`, `None` if absent
    pub async fn token_owner_record(&self, mint: &Pubkey, owner: &Pubkey) -> Result<Option<(Pubkey, TokenOwnerRecord)>> {
        let address = instruction::token_owner_record_address(&self.program_id, &self.realm, mint, owner);
        match self.ledger.get_account(&address).await? {
            Some(account) => Ok(Some((address, TokenOwnerRecord::unpack(&address, &account.data)?))),
            None => Ok(None),
        }
    }

    fn governing_mint(&self, realm: &RealmAccount, side: GoverningSide) -> Result<Pubkey> {
        realm
            .governing_mint(side)
            .ok_or_else(|| Error::ProposerIneligible(format!("realm {} has no {} mint", self.realm, side)))
    }

    fn vote_accounts(&self, address: &Pubkey, proposal: &ProposalAccount) -> VoteAccounts {
        VoteAccounts {
            program_id: self.program_id,
            realm: self.realm,
            governance: self.address,
            proposal: *address,
            proposal_owner_record: proposal.token_owner_record,
            governing_token_mint: proposal.governing_token_mint,
        }
    }

    /// Threshold and max voter weight `proposal` is measured against
    pub async fn vote_requirements(&self, proposal: &ProposalAccount) -> Result<(VoteThreshold, u64)> {
        let realm = self.realm().await?;
        let side = realm.side_of(&proposal.governing_token_mint).unwrap_or(self.side);
        let threshold = match proposal.vote_threshold {
            Some(threshold) => threshold,
            None => self.governance().await?.vote_threshold(side),
        };
        let supply = self.ledger.token_supply(&proposal.governing_token_mint).await?;
        Ok((threshold, realm.max_voter_weight(side, supply)))
    }

    /// State of `address` as voting would resolve it now.
    ///
    /// A proposal past its voting time without enough yes weight reports
    /// `Defeated` even before anyone finalizes it.
    pub async fn poll_state(&self, address: &Pubkey) -> Result<ProposalState> {
        let mut proposal = self.proposal(address).await?;
        if proposal.state != ProposalState::Voting {
            return Ok(proposal.state);
        }
        let (threshold, max_weight) = self.vote_requirements(&proposal).await?;
        let now = self.ledger.unix_timestamp().await?;
        if proposal.try_tip(max_weight, threshold, now) != ProposalState::Voting {
            return Ok(proposal.state);
        }
        let max_voting_time = match proposal.max_voting_time {
            Some(time) => time,
            None => self.governance().await?.config.max_voting_time,
        };
        Ok(proposal
            .finalize(now, max_voting_time, max_weight, threshold)
            .unwrap_or(ProposalState::Voting))
    }

    /// Cast an approve vote on `proposal` for `voter`.
    ///
    /// The record owner signs when it can, otherwise the record's delegate.
    pub async fn cast_vote(&self, proposal: &Pubkey, voter: &Voter, weights: &[u8]) -> Result<Vec<Receipt>> {
        let account = self.proposal(proposal).await?;
        let owner = voter.owner.authority();
        let (record_address, record) = self
            .token_owner_record(&account.governing_token_mint, &owner)
            .await?
            .ok_or_else(|| Error::AccountNotFound(owner))?;

        let signer: &Arc<dyn SignerProvider> = if voter.owner.can_sign() {
            &voter.owner
        } else {
            match &voter.delegate {
                Some(delegate)
                    if delegate.can_sign() && record.governance_delegate == Some(delegate.authority()) =>
                {
                    delegate
                }
                _ => return Err(Error::CannotSign(owner)),
            }
        };

        let weights = if weights.is_empty() { &[100u8][..] } else { weights };
        let ix = instruction::cast_vote(
            &self.vote_accounts(proposal, &account),
            &record_address,
            &signer.authority(),
            &self.ledger.payer(),
            &Vote::approve(weights),
        );
        tracing::debug!(%proposal, voter = %owner, "Casting vote");
        signer.sign_and_submit(self.ledger.as_ref(), Bundle::new(vec![ix])).await
    }

    /// Close voting on `proposal`
    pub async fn finalize_vote(&self, proposal: &Pubkey) -> Result<Vec<Receipt>> {
        let account = self.proposal(proposal).await?;
        if account.state != ProposalState::Voting {
            return Err(Error::InvalidState {
                expected: ProposalState::Voting.to_string(),
                actual: account.state.to_string(),
            });
        }
        let ix = instruction::finalize_vote(&self.vote_accounts(proposal, &account));
        submit_partitioned(self.ledger.as_ref(), &Bundle::new(vec![ix])).await
    }

    /// Execute every entry of a succeeded `proposal` in index order
    pub async fn execute(&self, proposal: &Pubkey) -> Result<Vec<Receipt>> {
        let account = self.proposal(proposal).await?;
        if !account.is_executable() {
            return Err(Error::InvalidState {
                expected: ProposalState::Succeeded.to_string(),
                actual: account.state.to_string(),
            });
        }
        let count = account.transactions_count();
        if count == 0 {
            return Err(Error::InvalidState {
                expected: "proposal with instructions".into(),
                actual: "no instructions to execute".into(),
            });
        }

        let mut bundle = Bundle::default();
        for index in 0..count {
            let address = instruction::proposal_transaction_address(&self.program_id, proposal, 0, index);
            let entry = self.ledger.require_account(&address).await?;
            let entry = ProposalTransactionAccount::unpack(&address, &entry.data)?;
            if entry.executed_at.is_some() {
                continue;
            }
            bundle.push(instruction::execute_transaction(
                &self.program_id,
                &self.address,
                proposal,
                &address,
                &entry.instructions,
            ));
        }

        tracing::info!(%proposal, entries = bundle.len(), "Executing proposal");
        submit_partitioned(self.ledger.as_ref(), &bundle).await
    }

    /// Vote with `voters` one by one until `proposal` succeeds, then execute it
    pub async fn approve_and_execute(&self, proposal: &Pubkey, voters: &[Voter]) -> Result<Vec<Receipt>> {
        let mut receipts = Vec::new();
        for voter in voters {
            // the stored state only moves on a landed vote
            if self.proposal(proposal).await?.is_executable() {
                break;
            }
            receipts.extend(self.cast_vote(proposal, voter, &[100]).await?);
        }

        let account = self.proposal(proposal).await?;
        if !account.is_executable() {
            let (threshold, max_weight) = self.vote_requirements(&account).await?;
            return Err(Error::ThresholdNotMet {
                required: threshold.required_weight(max_weight),
                actual: account.yes_vote_weight(),
            });
        }

        receipts.extend(self.execute(proposal).await?);
        Ok(receipts)
    }

    /// Proposals of this governance that are voting or awaiting execution
    pub async fn pending_proposals(&self) -> Result<Vec<(Pubkey, ProposalAccount)>> {
        let filters = [
            Memcmp::new(0, vec![state::PROPOSAL_V2]),
            Memcmp::new(ProposalAccount::GOVERNANCE_OFFSET, self.address.to_bytes().to_vec()),
        ];
        let mut pending = Vec::new();
        for (address, account) in self.ledger.get_program_accounts(&self.program_id, &filters).await? {
            let proposal = ProposalAccount::unpack(&address, &account.data)?;
            if matches!(proposal.state, ProposalState::Voting | ProposalState::Succeeded) {
                pending.push((address, proposal));
            }
        }
        Ok(pending)
    }

    /// Drive every pending proposal to execution
    pub async fn execute_all_pending(&self, voters: &[Voter]) -> Result<Vec<Receipt>> {
        let mut receipts = Vec::new();
        for (address, _) in self.pending_proposals().await? {
            receipts.extend(self.approve_and_execute(&address, voters).await?);
        }
        Ok(receipts)
    }

    fn log_operations(&self, group: &Bundle) {
        tracing::info!(governance = %self.address, "Instructions:");
        for ix in &group.instructions {
            let mut raw = Vec::new();
            let _ = InstructionData::from(ix).serialize(&mut raw);
            tracing::info!("  {}", BASE64.encode(raw));
        }
    }
}

impl fmt::Debug for GovernanceBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GovernanceBackend")
            .field("program_id", &self.program_id)
            .field("version", &self.version)
            .field("address", &self.address)
            .field("signing_by", &self.signing_by)
            .field("side", &self.side)
            .field("log_only", &self.log_only)
            .finish()
    }
}

#[async_trait]
impl Wrapper for GovernanceBackend {
    fn signing_by(&self) -> Pubkey {
        self.signing_by
    }

    fn program_id(&self) -> Pubkey {
        self.program_id
    }

    async fn create_wrapped(&self, group: Bundle, sequence: u64) -> Result<Bundle> {
        if self.log_only {
            self.log_operations(&group);
            return Ok(Bundle::default());
        }

        let governance = self.governance().await?;
        let realm = self.realm().await?;
        let mint = self.governing_mint(&realm, self.side)?;
        let proposer = self.proposer.authority();

        let (record_address, record) = self.token_owner_record(&mint, &proposer).await?.ok_or_else(|| {
            Error::ProposerIneligible(format!(
                "{} has no {} token owner record in realm {}",
                proposer, self.side, self.realm
            ))
        })?;
        let required = governance.min_weight_to_create_proposal(self.side);
        if record.governing_token_deposit_amount < required {
            return Err(Error::ProposerIneligible(format!(
                "{} deposited {} {} tokens, {} required",
                proposer, record.governing_token_deposit_amount, self.side, required
            )));
        }

        let seed = Pubkey::new_from_array(rand::random());
        let proposal = if self.version >= GOVERNANCE_PROGRAM_VERSION_V3 {
            instruction::proposal_address(&self.program_id, &self.address, &mint, seed.as_ref())
        } else {
            let index = governance.proposals_count + sequence as u32;
            instruction::proposal_address(&self.program_id, &self.address, &mint, &index.to_le_bytes())
        };

        let accounts = ProposalAccounts {
            program_id: self.program_id,
            version: self.version,
            realm: self.realm,
            governance: self.address,
            proposal,
            token_owner_record: record_address,
            governing_token_mint: mint,
            governance_authority: proposer,
            payer: self.rent_payer.authority(),
        };
        let name = format!("{:016x}", rand::random::<u64>());

        let mut bundle = Bundle::new(vec![instruction::create_proposal(&accounts, &name, "", &seed)]);
        for (index, op) in group.instructions.iter().enumerate() {
            bundle.push(instruction::insert_transaction(
                &accounts,
                index as u16,
                0,
                &[InstructionData::from(op)],
            ));
        }
        bundle.push(instruction::sign_off_proposal(&accounts));
        self.proposer.sign(&mut bundle)?;
        self.rent_payer.sign(&mut bundle)?;

        tracing::debug!(
            governance = %self.address,
            %proposal,
            side = %self.side,
            "Proposing {} instruction(s)",
            group.len()
        );
        Ok(bundle)
    }
}
