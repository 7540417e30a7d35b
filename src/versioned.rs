//! Compare-and-swap storage contract.
//!
//! A read hands back the value together with a [`VersionToken`]. A write names
//! the token it expects the store to still hold; if someone else wrote in the
//! meantime the write fails with a conflict, which is reported separately from
//! "not found" (see [`crate::error::ApiError`]).
#![allow(async_fn_in_trait)]

use std::fmt;

use anyhow::Result;

/// Opaque identifier of one stored version of a value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionToken(pub String);

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    pub value: T,
    pub token: VersionToken,
}

pub trait VersionedStore {
    type Key: ?Sized;
    type Value;

    /// Read the current value and its token.
    async fn load(&self, key: &Self::Key) -> Result<Versioned<Self::Value>>;

    /// Write `value` if the stored version still matches `expected`.
    ///
    /// `expected = None` asserts that nothing is stored under `key` yet.
    /// Returns the token of the newly written version.
    async fn store(
        &self,
        key: &Self::Key,
        value: Self::Value,
        expected: Option<&VersionToken>,
    ) -> Result<VersionToken>;
}
