//! Unit tests module
//!
//! This module contains unit tests for individual components:
//! - Governance vote math
//! - Smart wallet approvals
//! - Wrapping engine with a real backend

pub mod engine_test;
pub mod wallet_state_test;
