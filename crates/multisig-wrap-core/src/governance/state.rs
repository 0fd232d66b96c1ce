//! Governance account layouts, vote math and proposal lifecycle
//!
//! Accounts start with a one byte account type followed by borsh encoded
//! fields. Only the leading fields this crate needs are decoded; trailing
//! reserved space is ignored.

use crate::config::{GOVERNANCE_PROGRAM_VERSION_V3, GoverningSide};
use crate::{Error, Result};
use borsh::{BorshDeserialize, BorshSerialize};
use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
};
use std::fmt;

// ============================================================================
// Account Types
// ============================================================================

pub const PROPOSAL_TRANSACTION_V2: u8 = 13;
pub const PROPOSAL_V2: u8 = 14;
pub const REALM_V2: u8 = 16;
pub const TOKEN_OWNER_RECORD_V2: u8 = 17;
pub const GOVERNANCE_V2: u8 = 18;

/// Full-supply fraction of [`MintMaxVoterWeightSource::SupplyFraction`]
pub const SUPPLY_FRACTION_BASE: u64 = 10_000_000_000;

fn invalid_data(address: &Pubkey, reason: String) -> Error {
    Error::InvalidAccountData {
        address: *address,
        reason,
    }
}

/// Account data after the type byte
fn typed_body<'a>(address: &Pubkey, data: &'a [u8], account_type: u8) -> Result<&'a [u8]> {
    match data.first() {
        Some(t) if *t == account_type => Ok(&data[1..]),
        Some(t) => Err(invalid_data(address, format!("account type {}, expected {}", t, account_type))),
        None => Err(invalid_data(address, "empty account".into())),
    }
}

fn read<T: BorshDeserialize>(address: &Pubkey, buf: &mut &[u8]) -> Result<T> {
    T::deserialize(buf).map_err(|e| invalid_data(address, e.to_string()))
}

fn unpack_typed<T: BorshDeserialize>(address: &Pubkey, data: &[u8], account_type: u8) -> Result<T> {
    let mut body = typed_body(address, data, account_type)?;
    read(address, &mut body)
}

fn pack_typed<T: BorshSerialize>(account_type: u8, value: &T) -> Vec<u8> {
    let mut data = vec![account_type];
    // writing into a Vec cannot fail
    let _ = value.serialize(&mut data);
    data
}

// ============================================================================
// Vote Thresholds
// ============================================================================

/// Vote threshold of one governing side
#[derive(Debug, Clone, Copy, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum VoteThreshold {
    /// Percentage of the max voter weight that must vote yes
    YesVotePercentage(u8),
    /// Percentage of the max voter weight that must participate
    QuorumPercentage(u8),
    /// Side cannot vote
    Disabled,
}

impl VoteThreshold {
    /// Whether `yes` out of `max_weight` satisfies the threshold
    pub fn is_met(&self, yes: u64, max_weight: u64) -> bool {
        match self {
            VoteThreshold::YesVotePercentage(pct) | VoteThreshold::QuorumPercentage(pct) => {
                yes as u128 * 100 >= *pct as u128 * max_weight as u128
            }
            VoteThreshold::Disabled => false,
        }
    }

    /// Smallest yes weight satisfying the threshold
    pub fn required_weight(&self, max_weight: u64) -> u64 {
        match self {
            VoteThreshold::YesVotePercentage(pct) | VoteThreshold::QuorumPercentage(pct) => {
                (*pct as u128 * max_weight as u128).div_ceil(100) as u64
            }
            VoteThreshold::Disabled => u64::MAX,
        }
    }
}

impl fmt::Display for VoteThreshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoteThreshold::YesVotePercentage(pct) => write!(f, "{}% yes", pct),
            VoteThreshold::QuorumPercentage(pct) => write!(f, "{}% quorum", pct),
            VoteThreshold::Disabled => write!(f, "disabled"),
        }
    }
}

/// When a proposal may succeed before its voting time ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum VoteTipping {
    Strict,
    Early,
    Disabled,
}

/// Thresholds a governance is created with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GovernanceThresholds {
    pub community: VoteThreshold,
    pub council: VoteThreshold,
    pub council_veto: VoteThreshold,
    pub community_veto: VoteThreshold,
}

impl GovernanceThresholds {
    /// Thresholds for a program of `version` with a community yes percentage.
    ///
    /// Before v3 council and veto thresholds do not exist and must be passed
    /// as 0%. From v3 the council side follows the community threshold and
    /// community veto is disabled.
    pub fn for_version(version: u8, community_yes_pct: u8) -> Self {
        let community = VoteThreshold::YesVotePercentage(community_yes_pct);
        if version >= GOVERNANCE_PROGRAM_VERSION_V3 {
            Self {
                community,
                council: community,
                council_veto: community,
                community_veto: VoteThreshold::Disabled,
            }
        } else {
            let unset = VoteThreshold::YesVotePercentage(0);
            Self {
                community,
                council: unset,
                council_veto: unset,
                community_veto: unset,
            }
        }
    }
}

// ============================================================================
// Realm
// ============================================================================

/// How the community max voter weight is derived from the mint supply
#[derive(Debug, Clone, Copy, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum MintMaxVoterWeightSource {
    /// Fraction of the supply, [`SUPPLY_FRACTION_BASE`] being 100%
    SupplyFraction(u64),
    /// Fixed weight
    Absolute(u64),
}

impl MintMaxVoterWeightSource {
    /// Max voter weight given the mint supply
    pub fn max_voter_weight(&self, supply: u64) -> u64 {
        match self {
            MintMaxVoterWeightSource::SupplyFraction(fraction) => {
                (supply as u128 * *fraction as u128 / SUPPLY_FRACTION_BASE as u128) as u64
            }
            MintMaxVoterWeightSource::Absolute(weight) => (*weight).min(supply),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct RealmConfig {
    pub legacy1: u8,
    pub legacy2: u8,
    pub reserved: [u8; 6],
    pub min_community_weight_to_create_governance: u64,
    pub community_mint_max_voter_weight_source: MintMaxVoterWeightSource,
    pub council_mint: Option<Pubkey>,
}

/// Realm: the community of a set of governances
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct RealmAccount {
    pub community_mint: Pubkey,
    pub config: RealmConfig,
    pub reserved: [u8; 6],
    pub legacy1: u16,
    pub authority: Option<Pubkey>,
    pub name: String,
}

impl RealmAccount {
    /// Decode from raw account data
    pub fn unpack(address: &Pubkey, data: &[u8]) -> Result<Self> {
        unpack_typed(address, data, REALM_V2)
    }

    /// Encode into raw account data
    pub fn pack(&self) -> Vec<u8> {
        pack_typed(REALM_V2, self)
    }

    /// Governing token mint of `side`
    pub fn governing_mint(&self, side: GoverningSide) -> Option<Pubkey> {
        match side {
            GoverningSide::Community => Some(self.community_mint),
            GoverningSide::Council => self.config.council_mint,
        }
    }

    /// Side governed by `mint`
    pub fn side_of(&self, mint: &Pubkey) -> Option<GoverningSide> {
        if *mint == self.community_mint {
            Some(GoverningSide::Community)
        } else if self.config.council_mint.as_ref() == Some(mint) {
            Some(GoverningSide::Council)
        } else {
            None
        }
    }

    /// Effective supply votes of `side` are measured against
    pub fn max_voter_weight(&self, side: GoverningSide, supply: u64) -> u64 {
        match side {
            GoverningSide::Community => self
                .config
                .community_mint_max_voter_weight_source
                .max_voter_weight(supply),
            GoverningSide::Council => supply,
        }
    }
}

// ============================================================================
// Governance
// ============================================================================

/// Configuration fields shared by every program version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GovernanceConfig {
    pub community_vote_threshold: VoteThreshold,
    pub min_community_weight_to_create_proposal: u64,
    pub min_transaction_hold_up_time: u32,
    pub max_voting_time: u32,
    pub community_vote_tipping: VoteTipping,
    pub min_council_weight_to_create_proposal: u64,
}

/// Council and veto thresholds introduced with v3
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VetoConfig {
    pub council_vote_threshold: VoteThreshold,
    pub council_veto_vote_threshold: VoteThreshold,
    pub council_vote_tipping: VoteTipping,
    pub community_veto_vote_threshold: VoteThreshold,
}

/// Governance: proposal host of a realm
///
/// The on-chain config interleaves the v3 fields with the common ones:
///
/// ```text
/// community_vote_threshold | min_community_weight | hold_up | max_voting_time
/// | community_vote_tipping | council_vote_threshold council_veto_vote_threshold
/// | min_council_weight | council_vote_tipping community_veto_vote_threshold
/// | voting_cool_off_time deposit_exempt_proposal_count
/// ```
///
/// Before v3 the two council thresholds occupy the four bytes of
/// `proposal_cool_off_time` and the fields after `min_council_weight` do not
/// exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GovernanceAccount {
    pub realm: Pubkey,
    pub governed_account: Pubkey,
    /// Proposals created so far (index of the next index-seeded proposal)
    pub proposals_count: u32,
    pub config: GovernanceConfig,
    /// Absent on deployments older than v3
    pub veto: Option<VetoConfig>,
}

impl GovernanceAccount {
    /// Decode as written by a program of `version`
    pub fn unpack(address: &Pubkey, data: &[u8], version: u8) -> Result<Self> {
        let mut buf = typed_body(address, data, GOVERNANCE_V2)?;
        let buf = &mut buf;
        let realm = read(address, buf)?;
        let governed_account = read(address, buf)?;
        let proposals_count = read(address, buf)?;
        let community_vote_threshold = read(address, buf)?;
        let min_community_weight_to_create_proposal = read(address, buf)?;
        let min_transaction_hold_up_time = read(address, buf)?;
        let max_voting_time = read(address, buf)?;
        let community_vote_tipping = read(address, buf)?;

        let council = if version >= GOVERNANCE_PROGRAM_VERSION_V3 {
            Some((read::<VoteThreshold>(address, buf)?, read::<VoteThreshold>(address, buf)?))
        } else {
            // proposal_cool_off_time, unused
            read::<u32>(address, buf)?;
            None
        };
        let min_council_weight_to_create_proposal = read(address, buf)?;

        let veto = match council {
            Some((council_vote_threshold, council_veto_vote_threshold)) => Some(VetoConfig {
                council_vote_threshold,
                council_veto_vote_threshold,
                council_vote_tipping: read(address, buf)?,
                community_veto_vote_threshold: read(address, buf)?,
            }),
            None => None,
        };

        Ok(Self {
            realm,
            governed_account,
            proposals_count,
            config: GovernanceConfig {
                community_vote_threshold,
                min_community_weight_to_create_proposal,
                min_transaction_hold_up_time,
                max_voting_time,
                community_vote_tipping,
                min_council_weight_to_create_proposal,
            },
            veto,
        })
    }

    /// Encode into raw account data, in the layout of the version `veto` implies
    pub fn pack(&self) -> Vec<u8> {
        let config = &self.config;
        let mut data = vec![GOVERNANCE_V2];
        // writing into a Vec cannot fail
        let _ = (
            self.realm,
            self.governed_account,
            self.proposals_count,
            config.community_vote_threshold,
            config.min_community_weight_to_create_proposal,
            config.min_transaction_hold_up_time,
            config.max_voting_time,
            config.community_vote_tipping,
        )
            .serialize(&mut data);
        match &self.veto {
            Some(veto) => {
                let _ = (veto.council_vote_threshold, veto.council_veto_vote_threshold).serialize(&mut data);
                let _ = config.min_council_weight_to_create_proposal.serialize(&mut data);
                let _ = (veto.council_vote_tipping, veto.community_veto_vote_threshold, 0u32, 0u8)
                    .serialize(&mut data);
            }
            None => {
                let _ = (0u32, config.min_council_weight_to_create_proposal).serialize(&mut data);
            }
        }
        data
    }

    /// Yes-vote threshold for proposals of `side`; unset thresholds are 0%
    pub fn vote_threshold(&self, side: GoverningSide) -> VoteThreshold {
        match side {
            GoverningSide::Community => self.config.community_vote_threshold,
            GoverningSide::Council => self
                .veto
                .as_ref()
                .map(|v| v.council_vote_threshold)
                .unwrap_or(VoteThreshold::YesVotePercentage(0)),
        }
    }

    /// Veto threshold applying to `side`; community veto is disabled when unsupported
    pub fn veto_threshold(&self, side: GoverningSide) -> VoteThreshold {
        match (&self.veto, side) {
            (Some(veto), GoverningSide::Council) => veto.council_veto_vote_threshold,
            (Some(veto), GoverningSide::Community) => veto.community_veto_vote_threshold,
            (None, GoverningSide::Council) => VoteThreshold::YesVotePercentage(0),
            (None, GoverningSide::Community) => VoteThreshold::Disabled,
        }
    }

    /// Deposit required to create a proposal on `side`
    pub fn min_weight_to_create_proposal(&self, side: GoverningSide) -> u64 {
        match side {
            GoverningSide::Community => self.config.min_community_weight_to_create_proposal,
            GoverningSide::Council => self.config.min_council_weight_to_create_proposal,
        }
    }
}

// ============================================================================
// Token Owner Record
// ============================================================================

/// Voting weight of one participant on one side of a realm
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct TokenOwnerRecord {
    pub realm: Pubkey,
    pub governing_token_mint: Pubkey,
    pub governing_token_owner: Pubkey,
    pub governing_token_deposit_amount: u64,
    pub unrelinquished_votes_count: u64,
    pub outstanding_proposal_count: u8,
    pub version: u8,
    pub reserved: [u8; 6],
    pub governance_delegate: Option<Pubkey>,
}

impl TokenOwnerRecord {
    /// Decode from raw account data
    pub fn unpack(address: &Pubkey, data: &[u8]) -> Result<Self> {
        unpack_typed(address, data, TOKEN_OWNER_RECORD_V2)
    }

    /// Encode into raw account data
    pub fn pack(&self) -> Vec<u8> {
        pack_typed(TOKEN_OWNER_RECORD_V2, self)
    }
}

// ============================================================================
// Proposal
// ============================================================================

/// Proposal lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum ProposalState {
    Draft,
    SigningOff,
    Voting,
    Succeeded,
    Executing,
    Completed,
    Cancelled,
    Defeated,
    ExecutingWithErrors,
    Vetoed,
}

impl fmt::Display for ProposalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

fn invalid_state(expected: &str, actual: ProposalState) -> Error {
    Error::InvalidState {
        expected: expected.to_string(),
        actual: actual.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum MultiChoiceType {
    FullWeight,
    Weighted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum VoteType {
    SingleChoice,
    MultiChoice {
        choice_type: MultiChoiceType,
        min_voter_options: u8,
        max_voter_options: u8,
        max_winning_options: u8,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum OptionVoteResult {
    None,
    Succeeded,
    Defeated,
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct ProposalOption {
    pub label: String,
    pub vote_weight: u64,
    pub vote_result: OptionVoteResult,
    pub transactions_executed_count: u16,
    pub transactions_count: u16,
    pub transactions_next_index: u16,
}

/// One ranked choice with its share of the voter's weight
#[derive(Debug, Clone, Copy, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct VoteChoice {
    pub rank: u8,
    pub weight_percentage: u8,
}

/// A cast vote
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum Vote {
    Approve(Vec<VoteChoice>),
    Deny,
    Abstain,
    Veto,
}

impl Vote {
    /// Approve vote splitting the weight as `weights` (percentages)
    pub fn approve(weights: &[u8]) -> Self {
        Vote::Approve(
            weights
                .iter()
                .map(|w| VoteChoice {
                    rank: 0,
                    weight_percentage: *w,
                })
                .collect(),
        )
    }
}

/// Proposal record
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct ProposalAccount {
    pub governance: Pubkey,
    pub governing_token_mint: Pubkey,
    pub state: ProposalState,
    pub token_owner_record: Pubkey,
    pub signatories_count: u8,
    pub signatories_signed_off_count: u8,
    pub vote_type: VoteType,
    pub options: Vec<ProposalOption>,
    pub deny_vote_weight: Option<u64>,
    pub reserved1: u8,
    pub abstain_vote_weight: Option<u64>,
    pub start_voting_at: Option<i64>,
    pub draft_at: i64,
    pub signing_off_at: Option<i64>,
    pub voting_at: Option<i64>,
    pub voting_at_slot: Option<u64>,
    pub voting_completed_at: Option<i64>,
    pub executing_at: Option<i64>,
    pub closed_at: Option<i64>,
    pub execution_flags: u8,
    pub max_vote_weight: Option<u64>,
    pub max_voting_time: Option<u32>,
    pub vote_threshold: Option<VoteThreshold>,
    pub reserved: [u8; 64],
    pub name: String,
    pub description_link: String,
    pub veto_vote_weight: u64,
}

impl ProposalAccount {
    /// Byte offset of `governance` within the account data
    pub const GOVERNANCE_OFFSET: usize = 1;

    /// Empty single-choice draft with one "approve" option and a deny option
    pub fn draft(governance: Pubkey, mint: Pubkey, token_owner_record: Pubkey, name: String, now: i64) -> Self {
        Self {
            governance,
            governing_token_mint: mint,
            state: ProposalState::Draft,
            token_owner_record,
            signatories_count: 1,
            signatories_signed_off_count: 0,
            vote_type: VoteType::SingleChoice,
            options: vec![ProposalOption {
                label: "approve".to_string(),
                vote_weight: 0,
                vote_result: OptionVoteResult::None,
                transactions_executed_count: 0,
                transactions_count: 0,
                transactions_next_index: 0,
            }],
            deny_vote_weight: Some(0),
            reserved1: 0,
            abstain_vote_weight: None,
            start_voting_at: None,
            draft_at: now,
            signing_off_at: None,
            voting_at: None,
            voting_at_slot: None,
            voting_completed_at: None,
            executing_at: None,
            closed_at: None,
            execution_flags: 0,
            max_vote_weight: None,
            max_voting_time: None,
            vote_threshold: None,
            reserved: [0; 64],
            name,
            description_link: String::new(),
            veto_vote_weight: 0,
        }
    }

    /// Decode from raw account data
    pub fn unpack(address: &Pubkey, data: &[u8]) -> Result<Self> {
        unpack_typed(address, data, PROPOSAL_V2)
    }

    /// Encode into raw account data
    pub fn pack(&self) -> Vec<u8> {
        pack_typed(PROPOSAL_V2, self)
    }

    /// Cumulative yes weight
    pub fn yes_vote_weight(&self) -> u64 {
        self.options.first().map(|o| o.vote_weight).unwrap_or(0)
    }

    /// Number of proposal-transaction entries
    pub fn transactions_count(&self) -> u16 {
        self.options.first().map(|o| o.transactions_count).unwrap_or(0)
    }

    /// Whether execution may proceed
    pub fn is_executable(&self) -> bool {
        matches!(self.state, ProposalState::Succeeded | ProposalState::Executing)
    }

    fn first_option(&mut self) -> Result<&mut ProposalOption> {
        self.options.first_mut().ok_or_else(|| Error::InvalidState {
            expected: "proposal with options".into(),
            actual: "no options".into(),
        })
    }

    /// Append a transaction entry to the draft, returning its index
    pub fn insert_transaction(&mut self) -> Result<u16> {
        if self.state != ProposalState::Draft {
            return Err(invalid_state("Draft", self.state));
        }
        let option = self.first_option()?;
        let index = option.transactions_next_index;
        option.transactions_count += 1;
        option.transactions_next_index += 1;
        Ok(index)
    }

    /// Sign off as one signatory; voting starts once everybody signed
    pub fn sign_off(&mut self, now: i64) -> Result<()> {
        if !matches!(self.state, ProposalState::Draft | ProposalState::SigningOff) {
            return Err(invalid_state("Draft or SigningOff", self.state));
        }
        self.signatories_signed_off_count += 1;
        self.signing_off_at.get_or_insert(now);
        if self.signatories_signed_off_count >= self.signatories_count {
            self.state = ProposalState::Voting;
            self.voting_at = Some(now);
        } else {
            self.state = ProposalState::SigningOff;
        }
        Ok(())
    }

    /// Record `vote` carrying `weight`
    pub fn cast_vote(&mut self, vote: &Vote, weight: u64) -> Result<()> {
        if self.state != ProposalState::Voting {
            return Err(invalid_state("Voting", self.state));
        }
        match vote {
            Vote::Approve(choices) => {
                let pct = choices.first().map(|c| c.weight_percentage).unwrap_or(100);
                let share = (weight as u128 * pct as u128 / 100) as u64;
                let option = self.first_option()?;
                option.vote_weight = option.vote_weight.saturating_add(share);
            }
            Vote::Deny => {
                let deny = self.deny_vote_weight.get_or_insert(0);
                *deny = deny.saturating_add(weight);
            }
            Vote::Abstain => {
                let abstain = self.abstain_vote_weight.get_or_insert(0);
                *abstain = abstain.saturating_add(weight);
            }
            Vote::Veto => self.veto_vote_weight = self.veto_vote_weight.saturating_add(weight),
        }
        Ok(())
    }

    /// Succeed early once the yes weight reaches the threshold
    pub fn try_tip(&mut self, max_weight: u64, threshold: VoteThreshold, now: i64) -> ProposalState {
        if self.state == ProposalState::Voting && threshold.is_met(self.yes_vote_weight(), max_weight) {
            self.complete_voting(ProposalState::Succeeded, max_weight, threshold, now);
        }
        self.state
    }

    /// Close voting after `max_voting_time` seconds
    pub fn finalize(
        &mut self,
        now: i64,
        max_voting_time: u32,
        max_weight: u64,
        threshold: VoteThreshold,
    ) -> Result<ProposalState> {
        if self.state != ProposalState::Voting {
            return Err(invalid_state("Voting", self.state));
        }
        let ends_at = self.voting_at.unwrap_or(self.draft_at) + max_voting_time as i64;
        if now < ends_at {
            return Err(Error::InvalidState {
                expected: format!("voting ended at {}", ends_at),
                actual: format!("voting at {}", now),
            });
        }
        let outcome = if threshold.is_met(self.yes_vote_weight(), max_weight) {
            ProposalState::Succeeded
        } else {
            ProposalState::Defeated
        };
        self.complete_voting(outcome, max_weight, threshold, now);
        Ok(self.state)
    }

    fn complete_voting(&mut self, outcome: ProposalState, max_weight: u64, threshold: VoteThreshold, now: i64) {
        self.state = outcome;
        self.voting_completed_at = Some(now);
        self.max_vote_weight = Some(max_weight);
        self.vote_threshold = Some(threshold);
        if let Some(option) = self.options.first_mut() {
            option.vote_result = if outcome == ProposalState::Succeeded {
                OptionVoteResult::Succeeded
            } else {
                OptionVoteResult::Defeated
            };
        }
    }

    /// Enter the executing stage
    pub fn start_execution(&mut self, now: i64) -> Result<()> {
        match self.state {
            ProposalState::Succeeded => {
                self.state = ProposalState::Executing;
                self.executing_at = Some(now);
                Ok(())
            }
            ProposalState::Executing => Ok(()),
            other => Err(invalid_state("Succeeded", other)),
        }
    }

    /// Count one executed entry; the proposal completes after the last one
    pub fn complete_transaction(&mut self, now: i64) -> Result<ProposalState> {
        self.start_execution(now)?;
        let option = self.first_option()?;
        option.transactions_executed_count += 1;
        if option.transactions_executed_count >= option.transactions_count {
            self.state = ProposalState::Completed;
            self.closed_at = Some(now);
        }
        Ok(self.state)
    }
}

// ============================================================================
// Proposal Transaction
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct AccountMetaData {
    pub pubkey: Pubkey,
    pub is_signer: bool,
    pub is_writable: bool,
}

/// Instruction stored in a proposal transaction
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct InstructionData {
    pub program_id: Pubkey,
    pub accounts: Vec<AccountMetaData>,
    pub data: Vec<u8>,
}

impl From<&Instruction> for InstructionData {
    fn from(ix: &Instruction) -> Self {
        Self {
            program_id: ix.program_id,
            accounts: ix
                .accounts
                .iter()
                .map(|meta| AccountMetaData {
                    pubkey: meta.pubkey,
                    is_signer: meta.is_signer,
                    is_writable: meta.is_writable,
                })
                .collect(),
            data: ix.data.clone(),
        }
    }
}

impl From<&InstructionData> for Instruction {
    fn from(data: &InstructionData) -> Self {
        Instruction {
            program_id: data.program_id,
            accounts: data
                .accounts
                .iter()
                .map(|meta| AccountMeta {
                    pubkey: meta.pubkey,
                    is_signer: meta.is_signer,
                    is_writable: meta.is_writable,
                })
                .collect(),
            data: data.data.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum TransactionExecutionStatus {
    None,
    Success,
    Error,
}

/// One proposal-transaction entry
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct ProposalTransactionAccount {
    pub proposal: Pubkey,
    pub option_index: u8,
    pub transaction_index: u16,
    pub hold_up_time: u32,
    pub instructions: Vec<InstructionData>,
    pub executed_at: Option<i64>,
    pub execution_status: TransactionExecutionStatus,
}

impl ProposalTransactionAccount {
    /// Decode from raw account data
    pub fn unpack(address: &Pubkey, data: &[u8]) -> Result<Self> {
        unpack_typed(address, data, PROPOSAL_TRANSACTION_V2)
    }

    /// Encode into raw account data
    pub fn pack(&self) -> Vec<u8> {
        pack_typed(PROPOSAL_TRANSACTION_V2, self)
    }
}
