//! Configuration for ledger access and backend dispatch
//!
//! ## Example
//!
//! ```rust,ignore
//! use multisig_wrap_core::config::{DispatchConfig, GoverningSide, LedgerConfig};
//!
//! let ledger = LedgerConfig::devnet().with_confirm_timeout(60);
//! let dispatch = DispatchConfig::default()
//!     .with_side(GoverningSide::Community)
//!     .with_governance_version(2);
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use solana_sdk::{pubkey, pubkey::Pubkey};
use std::fmt;

/// Goki smart wallet program
pub const SMART_WALLET_PROGRAM_ID: Pubkey = pubkey!("GokivDYuQXPZCWRkwMhdH2h91KpDQXBEmpgBgs55bnpH");

/// Default SPL governance deployment
pub const GOVERNANCE_PROGRAM_ID: Pubkey = pubkey!("GovER5Lthms3bLBqWub97yVrMmEogzX7xNjdXpPPCVZw");

/// Public test deployment of SPL governance
pub const GOVERNANCE_TEST_PROGRAM_ID: Pubkey = pubkey!("GTesTBiEWE32WHXXE2S4XbZvA5CrEc4xs6ZgRe895dP");

/// Governance deployments recognized without extra configuration
///
/// Realms run their own SPL governance builds too; those are added through
/// [`DispatchConfig::extra_governance_programs`].
pub const KNOWN_GOVERNANCE_PROGRAM_IDS: &[Pubkey] = &[
    GOVERNANCE_PROGRAM_ID,
    GOVERNANCE_TEST_PROGRAM_ID,
    // Marinade
    pubkey!("GovMaiHfpVPw8BAM1mbdzgmSZYDw2tdP32J2fapoQoYs"),
    // Mango
    pubkey!("GqTPL6qRf5aUuqscLh8Rg2HTxPUXfhhAXDptTLhp1t2J"),
];

/// Latest governance program version this crate speaks
pub const GOVERNANCE_PROGRAM_VERSION_V3: u8 = 3;

// ============================================================================
// Ledger
// ============================================================================

/// Commitment level for reads and confirmations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    Processed,
    #[default]
    Confirmed,
    Finalized,
}

impl Commitment {
    /// Convert to string for RPC calls
    pub fn as_str(&self) -> &'static str {
        match self {
            Commitment::Processed => "processed",
            Commitment::Confirmed => "confirmed",
            Commitment::Finalized => "finalized",
        }
    }
}

/// Configuration for the ledger client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// RPC endpoint URLs (for failover)
    pub rpc_urls: Vec<String>,
    /// Commitment level for reads and confirmations
    #[serde(default)]
    pub commitment: Commitment,
    /// Seconds to wait for a submission to confirm
    #[serde(default = "default_confirm_timeout")]
    pub confirm_timeout_secs: u64,
    /// How often a submission is re-sent on a stale blockhash
    #[serde(default = "default_send_retries")]
    pub send_retries: u32,
    /// Program holding derived-address key info records
    #[serde(default, with = "opt_pubkey")]
    pub key_info_program: Option<Pubkey>,
}

fn default_confirm_timeout() -> u64 {
    60
}

fn default_send_retries() -> u32 {
    3
}

impl LedgerConfig {
    /// Config for Solana Mainnet
    pub fn mainnet() -> Self {
        Self::custom(vec!["https://api.mainnet-beta.solana.com".to_string()])
    }

    /// Config for Solana Devnet
    pub fn devnet() -> Self {
        Self::custom(vec!["https://api.devnet.solana.com".to_string()])
    }

    /// Config for a local validator
    pub fn localnet() -> Self {
        Self::custom(vec!["http://127.0.0.1:8899".to_string()]).with_commitment(Commitment::Processed)
    }

    /// Config with custom endpoints
    pub fn custom(rpc_urls: Vec<String>) -> Self {
        Self {
            rpc_urls,
            commitment: Commitment::Confirmed,
            confirm_timeout_secs: default_confirm_timeout(),
            send_retries: default_send_retries(),
            key_info_program: None,
        }
    }

    /// Set commitment level
    pub fn with_commitment(mut self, commitment: Commitment) -> Self {
        self.commitment = commitment;
        self
    }

    /// Set confirmation timeout
    pub fn with_confirm_timeout(mut self, secs: u64) -> Self {
        self.confirm_timeout_secs = secs;
        self
    }

    /// Set the derived-address registry program
    pub fn with_key_info_program(mut self, program: Pubkey) -> Self {
        self.key_info_program = Some(program);
        self
    }

    /// Check the config is usable
    pub fn validate(&self) -> Result<()> {
        if self.rpc_urls.is_empty() {
            return Err(Error::InvalidConfig("At least one RPC URL required".into()));
        }
        Ok(())
    }
}

// ============================================================================
// Dispatch
// ============================================================================

/// Which governing token a governance proposal is created with
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GoverningSide {
    #[default]
    Council,
    Community,
}

impl fmt::Display for GoverningSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GoverningSide::Council => write!(f, "council"),
            GoverningSide::Community => write!(f, "community"),
        }
    }
}

/// Program ids and backend options used when detecting an authority
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Smart wallet program
    #[serde(with = "pubkey_str")]
    pub smart_wallet_program: Pubkey,
    /// Governance program new backends are bound to
    #[serde(with = "pubkey_str")]
    pub governance_program: Pubkey,
    /// Version of `governance_program`
    pub governance_version: u8,
    /// Additional governance deployments recognized as owners
    #[serde(default, with = "vec_pubkey_str")]
    pub extra_governance_programs: Vec<Pubkey>,
    /// Governing side used for proposals
    #[serde(default)]
    pub side: GoverningSide,
    /// Log wrapped operations instead of creating proposals
    #[serde(default)]
    pub log_only: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            smart_wallet_program: SMART_WALLET_PROGRAM_ID,
            governance_program: GOVERNANCE_PROGRAM_ID,
            governance_version: GOVERNANCE_PROGRAM_VERSION_V3,
            extra_governance_programs: Vec::new(),
            side: GoverningSide::Council,
            log_only: false,
        }
    }
}

impl DispatchConfig {
    /// Use a different governance deployment
    pub fn with_governance_program(mut self, program: Pubkey) -> Self {
        self.governance_program = program;
        self
    }

    /// Set the governance program version
    pub fn with_governance_version(mut self, version: u8) -> Self {
        self.governance_version = version;
        self
    }

    /// Set the governing side
    pub fn with_side(mut self, side: GoverningSide) -> Self {
        self.side = side;
        self
    }

    /// Enable/disable log-only mode
    pub fn with_log_only(mut self, log_only: bool) -> Self {
        self.log_only = log_only;
        self
    }

    /// Whether `program` is a governance deployment we recognize
    pub fn is_known_governance(&self, program: &Pubkey) -> bool {
        *program == self.governance_program
            || KNOWN_GOVERNANCE_PROGRAM_IDS.contains(program)
            || self.extra_governance_programs.contains(program)
    }
}

mod pubkey_str {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};
    use solana_sdk::pubkey::Pubkey;
    use std::str::FromStr;

    pub fn serialize<S: Serializer>(key: &Pubkey, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&key.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Pubkey, D::Error> {
        let s = String::deserialize(d)?;
        Pubkey::from_str(&s).map_err(D::Error::custom)
    }
}

mod opt_pubkey {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};
    use solana_sdk::pubkey::Pubkey;
    use std::str::FromStr;

    pub fn serialize<S: Serializer>(key: &Option<Pubkey>, s: S) -> Result<S::Ok, S::Error> {
        match key {
            Some(key) => s.serialize_some(&key.to_string()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Pubkey>, D::Error> {
        Option::<String>::deserialize(d)?
            .map(|s| Pubkey::from_str(&s).map_err(D::Error::custom))
            .transpose()
    }
}

mod vec_pubkey_str {
    use serde::{Deserialize, Deserializer, Serializer, de::Error, ser::SerializeSeq};
    use solana_sdk::pubkey::Pubkey;
    use std::str::FromStr;

    pub fn serialize<S: Serializer>(keys: &[Pubkey], s: S) -> Result<S::Ok, S::Error> {
        let mut seq = s.serialize_seq(Some(keys.len()))?;
        for key in keys {
            seq.serialize_element(&key.to_string())?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Pubkey>, D::Error> {
        Vec::<String>::deserialize(d)?
            .iter()
            .map(|s| Pubkey::from_str(s).map_err(D::Error::custom))
            .collect()
    }
}
