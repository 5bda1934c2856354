//! Identity verification collaborator.
//!
//! Verification is best-effort: implementations report "no information"
//! as `Ok(None)` and reserve `Err` for calls that could not be made at all.
//! The call budget is tracked by the caller.

mod api;

pub use api::PersonLookupApi;

use crate::core::error::Result;
use crate::core::models::IdentityRecord;
use async_trait::async_trait;

#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, address: &str) -> Result<Option<IdentityRecord>>;
}
