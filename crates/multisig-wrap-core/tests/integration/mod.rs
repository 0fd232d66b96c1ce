//! Integration tests module
//!
//! End-to-end flows: wrapped bundles land on the simulated programs, members
//! approve or vote, and the stored records are checked afterwards.

pub mod dispatch_test;
pub mod governance_flow_test;
pub mod smart_wallet_flow_test;
