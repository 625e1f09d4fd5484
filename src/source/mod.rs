//! Event-source abstraction over the remote audit-log API.
//!
//! The aggregation engine only ever talks to an [`EventSource`]; the
//! production implementation in [`mediawiki`] speaks the MediaWiki action
//! API, and tests substitute frozen in-memory sources.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::{ActionEvent, Role, RoleChangeEvent};

pub mod mediawiki;

pub use mediawiki::{Credentials, MediaWikiClient};

/// Default per-page entry cap sent with paginated queries. A request
/// parameter, not a correctness constraint.
pub const DEFAULT_PAGE_LIMIT: u32 = 500;

/// Errors surfaced by an event source. Transient by nature; the source never
/// retries internally, retry policy belongs to the caller.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("api error {code}: {info}")]
    Api { code: String, info: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("login failed ({result}): {reason}")]
    Login { result: String, reason: String },
}

/// Opaque continuation cursor returned by a paginated query. Scoped to the
/// query that produced it; never shared across queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Continuation(pub String);

/// One page of a paginated query result. Absence of a continuation means the
/// query is exhausted.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub continuation: Option<Continuation>,
}

impl<T> Page<T> {
    pub fn terminal(items: Vec<T>) -> Self {
        Self {
            items,
            continuation: None,
        }
    }
}

/// Query for one subject's action log within the reporting window.
#[derive(Debug, Clone)]
pub struct ActionQuery {
    pub role: Role,
    pub subject: String,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub limit: u32,
}

/// Read-only access to the remote audit logs and membership lists. All
/// timestamps are UTC. Implementations must be usable from parallel workers,
/// with continuation state confined to each query.
pub trait EventSource: Sync {
    /// Current holders of `role`.
    fn current_holders(&self, role: Role) -> Result<Vec<String>, SourceError>;

    /// One page of the rights log restricted to the reporting window,
    /// already translated into per-role add/remove events. Event order
    /// within and across pages is the source's native most-recent-first
    /// order; callers normalize.
    fn role_change_page(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        continuation: Option<&Continuation>,
    ) -> Result<Page<RoleChangeEvent>, SourceError>;

    /// One page of one subject's action log for the query's time range.
    fn action_page(
        &self,
        query: &ActionQuery,
        continuation: Option<&Continuation>,
    ) -> Result<Page<ActionEvent>, SourceError>;
}
