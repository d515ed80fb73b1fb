//! Proof-of-origin tokens.
//!
//! A [`TokenMinter`] performs the expensive challenge solve; the
//! [`TokenManager`] in front of it deduplicates concurrent mints, caches
//! results and hands out cheap placeholder tokens while a real one is pending.

pub mod http;
pub mod manager;
pub mod placeholder;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::TokenError;

pub use http::HttpTokenMinter;
pub use manager::TokenManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    /// Locally generated, weak but immediately available
    Placeholder,
    /// Produced by a full challenge solve
    Minted,
}

/// A proof-of-origin token bound to one identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub value: String,
    pub kind: TokenKind,
    pub minted_for: String,
}

impl Token {
    pub fn is_minted(&self) -> bool {
        self.kind == TokenKind::Minted
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MintOptions {
    /// Rebuild the minting subsystem's internal state before solving
    pub force_refresh: bool,
}

/// Capability to mint proof-of-origin tokens.
#[async_trait]
pub trait TokenMinter: Send + Sync {
    async fn mint(&self, identifier: &str, options: MintOptions) -> Result<String, TokenError>;

    fn placeholder(&self, identifier: &str) -> String {
        placeholder::generate(identifier)
    }

    /// Discard any state the subsystem holds. Must be idempotent.
    async fn invalidate(&self) -> Result<(), TokenError>;
}
