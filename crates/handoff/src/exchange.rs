//! Token exchange: park a parse result in the chunk cache behind a random
//! token and reassemble it for a later reader.
//!
//! Layout for token `T` under prefix `P`:
//! - `P T _0 .. P T _{N-1}`: chunks of the serialized result
//! - `P T _meta`: decimal chunk count `N`, written last
//!
//! The meta entry is the reader's existence check, so it is only written once
//! every chunk it names is in place.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::codec::{self, DEFAULT_CHUNK_SIZE};
use crate::error::{MintError, StoreError};
use crate::schema::ParseResult;
use crate::store::ResultStore;
use crate::token::Token;

pub const DEFAULT_TTL: Duration = Duration::from_secs(600);
pub const DEFAULT_KEY_PREFIX: &str = "parse_result_";

/// Upper bound on the chunk count accepted from a meta entry.
pub const MAX_CHUNKS: usize = 10_000;

#[derive(Debug, Clone)]
pub struct HandoffSettings {
    pub ttl: Duration,
    pub chunk_size: usize,
    pub key_prefix: String,
}

impl Default for HandoffSettings {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            chunk_size: DEFAULT_CHUNK_SIZE,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }
}

/// Outcome of a token lookup. Unknown, malformed, expired and damaged
/// tokens all collapse into `NotFound`.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    Found(ParseResult),
    NotFound,
}

impl Resolved {
    pub fn into_option(self) -> Option<ParseResult> {
        match self {
            Resolved::Found(result) => Some(result),
            Resolved::NotFound => None,
        }
    }
}

#[derive(Clone)]
pub struct TokenExchange {
    store: Arc<dyn ResultStore>,
    settings: HandoffSettings,
}

impl TokenExchange {
    pub fn new(store: Arc<dyn ResultStore>, settings: HandoffSettings) -> Self {
        Self { store, settings }
    }

    pub fn settings(&self) -> &HandoffSettings {
        &self.settings
    }

    pub fn meta_key(&self, token: &Token) -> String {
        format!("{}{}_meta", self.settings.key_prefix, token)
    }

    pub fn chunk_key(&self, token: &Token, index: usize) -> String {
        format!("{}{}_{}", self.settings.key_prefix, token, index)
    }

    /// Persist `result` and return its token.
    ///
    /// Returns `Ok(None)` without touching the cache when there are no pages.
    /// A token is only returned after every entry was written.
    pub async fn store(&self, result: &ParseResult) -> Result<Option<Token>, MintError> {
        if result.is_empty() {
            debug!("Empty parse result, no token minted");
            return Ok(None);
        }

        let text = codec::serialize(result)?;
        let chunks = codec::split(&text, self.settings.chunk_size)?;
        let token = Token::generate();
        let ttl = self.settings.ttl;
        let count = chunks.len();

        for (index, chunk) in chunks.into_iter().enumerate() {
            self.store.put(&self.chunk_key(&token, index), chunk, ttl).await?;
        }
        self.store
            .put(&self.meta_key(&token), count.to_string(), ttl)
            .await?;

        info!(
            token = %token,
            chunks = count,
            bytes = text.len(),
            pages = result.page_count(),
            "Stored parse result"
        );
        Ok(Some(token))
    }

    /// Reassemble the result behind `raw_token`.
    ///
    /// Only a failing cache read is an error; every form of absence is
    /// [`Resolved::NotFound`].
    pub async fn resolve(&self, raw_token: &str) -> Result<Resolved, StoreError> {
        let Some(token) = Token::parse(raw_token) else {
            debug!("Malformed token");
            return Ok(Resolved::NotFound);
        };

        let Some(meta) = self.store.get(&self.meta_key(&token)).await? else {
            debug!(token = %token, "No meta entry");
            return Ok(Resolved::NotFound);
        };

        let count = match meta.trim().parse::<usize>() {
            Ok(n) if (1..=MAX_CHUNKS).contains(&n) => n,
            _ => {
                warn!(token = %token, meta = %meta, "Unusable chunk count");
                return Ok(Resolved::NotFound);
            }
        };

        let mut chunks = Vec::with_capacity(count);
        for index in 0..count {
            match self.store.get(&self.chunk_key(&token, index)).await? {
                Some(chunk) => chunks.push(chunk),
                None => {
                    warn!(token = %token, index, count, "Missing chunk");
                    return Ok(Resolved::NotFound);
                }
            }
        }

        match codec::deserialize(&codec::join(&chunks)) {
            Ok(result) => {
                debug!(token = %token, chunks = count, "Resolved parse result");
                Ok(Resolved::Found(result))
            }
            Err(e) => {
                warn!(token = %token, error = %e, "Stored result is corrupt");
                Ok(Resolved::NotFound)
            }
        }
    }
}
