//! Hand-off of large parse results between independent client sessions.
//!
//! A result is serialized, cut into chunks that fit a size-bounded cache and
//! parked behind a short random token with a fixed TTL. Any later session
//! holding the token can reassemble it, until the entries expire.

pub mod codec;
pub mod error;
pub mod exchange;
pub mod schema;
pub mod store;
pub mod token;

pub use codec::{DEFAULT_CHUNK_SIZE, DEFAULT_MAX_ENTRY_BYTES};
pub use error::{CodecError, MintError, StoreError};
pub use exchange::{HandoffSettings, Resolved, TokenExchange, DEFAULT_KEY_PREFIX, DEFAULT_TTL};
pub use schema::{Element, ElementKind, Page, ParseResult};
pub use store::{MemoryStore, ResultStore, StoreStats};
pub use token::Token;
