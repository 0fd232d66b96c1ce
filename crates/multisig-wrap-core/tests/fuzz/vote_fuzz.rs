//! Fuzz tests for governance vote math

use multisig_wrap_core::governance::state::{
    MintMaxVoterWeightSource, ProposalAccount, ProposalState, SUPPLY_FRACTION_BASE, Vote, VoteThreshold,
};
use proptest::prelude::*;
use solana_sdk::pubkey::Pubkey;

fn threshold_strategy() -> impl Strategy<Value = VoteThreshold> {
    prop_oneof![
        (0u8..=100).prop_map(VoteThreshold::YesVotePercentage),
        (0u8..=100).prop_map(VoteThreshold::QuorumPercentage),
        Just(VoteThreshold::Disabled),
    ]
}

proptest! {
    /// More yes weight never turns a met threshold into an unmet one
    #[test]
    fn threshold_is_monotonic(
        threshold in threshold_strategy(),
        yes in any::<u64>(),
        extra in any::<u64>(),
        max_weight in any::<u64>(),
    ) {
        if threshold.is_met(yes, max_weight) {
            prop_assert!(threshold.is_met(yes.saturating_add(extra), max_weight));
        }
    }

    /// `required_weight` is the smallest weight that meets the threshold
    #[test]
    fn required_weight_is_tight(pct in 0u8..=100, max_weight in any::<u64>()) {
        let threshold = VoteThreshold::YesVotePercentage(pct);
        let required = threshold.required_weight(max_weight);

        prop_assert!(required <= max_weight);
        prop_assert!(threshold.is_met(required, max_weight));
        if required > 0 {
            prop_assert!(!threshold.is_met(required - 1, max_weight));
        }
    }

    #[test]
    fn disabled_never_met(yes in any::<u64>(), max_weight in any::<u64>()) {
        prop_assert!(!VoteThreshold::Disabled.is_met(yes, max_weight));
    }

    /// A supply fraction never exceeds the supply
    #[test]
    fn supply_fraction_bounded(fraction in 0..=SUPPLY_FRACTION_BASE, supply in any::<u64>()) {
        let max = MintMaxVoterWeightSource::SupplyFraction(fraction).max_voter_weight(supply);
        prop_assert!(max <= supply);
    }

    /// A proposal tips exactly when the accumulated yes weight meets the threshold
    #[test]
    fn proposal_tips_with_threshold(
        pct in 1u8..=100,
        votes in prop::collection::vec(0u64..1_000, 1..8),
        max_weight in 1u64..10_000,
    ) {
        let threshold = VoteThreshold::YesVotePercentage(pct);
        let mut proposal = ProposalAccount::draft(
            Pubkey::new_unique(),
            Pubkey::new_unique(),
            Pubkey::new_unique(),
            "fuzz".to_string(),
            0,
        );
        proposal.insert_transaction().unwrap();
        proposal.sign_off(0).unwrap();

        let mut yes = 0u64;
        for weight in votes {
            if proposal.state != ProposalState::Voting {
                prop_assert!(proposal.cast_vote(&Vote::approve(&[100]), weight).is_err());
                break;
            }
            proposal.cast_vote(&Vote::approve(&[100]), weight).unwrap();
            yes += weight;
            let state = proposal.try_tip(max_weight, threshold, 1);
            prop_assert_eq!(state == ProposalState::Succeeded, threshold.is_met(yes, max_weight));
        }
    }
}
