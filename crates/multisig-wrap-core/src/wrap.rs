//! # Wrapping Engine
//!
//! Rewrites a bundle so that every operation from the first one requiring a
//! shared authority onward is handed to a backend instead of being submitted
//! directly.
//!
//! The engine grows nothing: it starts with the whole remaining tail and
//! shrinks the candidate group one operation at a time until the backend's
//! output passes the ledger's `try_build` check. Wrapped groups are appended
//! to the untouched head in their original order.
//!
//! ## Example
//!
//! ```rust,ignore
//! use multisig_wrap_core::wrap::wrap;
//!
//! let wrapped = wrap(bundle, &backend, ledger.as_ref()).await?;
//! submit_partitioned(ledger.as_ref(), &wrapped).await?;
//! ```

use crate::ledger::LedgerClient;
use crate::{Bundle, Error, Result};
use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;

/// A backend able to turn a group of operations into a deferred-execution
/// construct authorized by [`Wrapper::signing_by`]
#[async_trait]
pub trait Wrapper: Send + Sync {
    /// Authority whose signature the wrapped operations require
    fn signing_by(&self) -> Pubkey;

    /// Program implementing the backend
    fn program_id(&self) -> Pubkey;

    /// Produce the operations that propose `group` to the backend.
    ///
    /// `sequence` counts the groups already wrapped by the current engine
    /// run; backends addressing records by a running counter add it to the
    /// on-ledger value. May return an empty bundle.
    async fn create_wrapped(&self, group: Bundle, sequence: u64) -> Result<Bundle>;
}

/// Outcome of one candidate group
#[derive(Debug)]
pub enum WrapAttempt {
    /// Candidate is constructible
    Wrapped(Bundle),
    /// Candidate exceeds ledger limits; a smaller group may fit
    Retry(Error),
    /// Backend refused; no smaller group will help
    Fatal(Error),
}

/// Ask `wrapper` to wrap `group` and check the result against ledger limits
pub async fn attempt(
    wrapper: &dyn Wrapper,
    ledger: &dyn LedgerClient,
    group: Bundle,
    sequence: u64,
) -> WrapAttempt {
    let wrapped = match wrapper.create_wrapped(group, sequence).await {
        Ok(wrapped) => wrapped,
        Err(e) => return WrapAttempt::Fatal(e),
    };
    if wrapped.is_empty() {
        return WrapAttempt::Wrapped(wrapped);
    }

    match ledger.try_build(&wrapped) {
        Ok(_) => WrapAttempt::Wrapped(wrapped),
        Err(e) if e.is_size_limit() => WrapAttempt::Retry(e),
        Err(e) => WrapAttempt::Fatal(e),
    }
}

/// Wrap every operation of `bundle` from the first one signed by
/// `wrapper.signing_by()` onward.
///
/// Returns `bundle` unchanged, without calling the backend, when no
/// operation requires the authority.
pub async fn wrap(bundle: Bundle, wrapper: &dyn Wrapper, ledger: &dyn LedgerClient) -> Result<Bundle> {
    let authority = wrapper.signing_by();
    let Some(start) = bundle.first_signed_by(&authority) else {
        return Ok(bundle);
    };

    let signers = bundle.signers.clone();
    let (mut head, mut tail) = bundle.split_at(start);
    let mut consumed = start;
    let mut sequence = 0u64;

    tracing::debug!(
        %authority,
        start,
        operations = tail.len(),
        "Wrapping operations"
    );

    while !tail.is_empty() {
        let mut count = tail.len();
        loop {
            let group = Bundle::new(tail[..count].to_vec()).with_signers(signers.clone());

            match attempt(wrapper, ledger, group, sequence).await {
                WrapAttempt::Wrapped(wrapped) => {
                    tracing::debug!(%authority, count, "Wrapped group of {} operation(s)", count);
                    head = head.combine(wrapped);
                    tail.drain(..count);
                    consumed += count;
                    sequence += 1;
                    break;
                }
                WrapAttempt::Retry(e) if count > 1 => {
                    tracing::debug!(%authority, count, "Group does not fit ({}), shrinking", e);
                    count -= 1;
                }
                WrapAttempt::Retry(e) => {
                    return Err(Error::UnwrappableOperation {
                        index: consumed,
                        reason: e.to_string(),
                    });
                }
                WrapAttempt::Fatal(e) => {
                    tracing::warn!(%authority, count, "Backend refused group: {}", e);
                    return Err(e);
                }
            }
        }
    }

    tracing::info!(%authority, groups = sequence, "Wrapped {} operation(s)", consumed - start);
    Ok(head)
}
