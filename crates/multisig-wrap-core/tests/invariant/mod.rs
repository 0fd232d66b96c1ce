//! Invariant tests module
//!
//! Guarantees that must hold for any sequence of approvals.

pub mod approval_invariant;
