//! Paginated Log Fetcher: drain a continuation-token query to exhaustion.

use tracing::trace;

use crate::source::{Continuation, Page, SourceError};

/// Drive a paginated query until the source stops returning a continuation,
/// concatenating page items in arrival order.
///
/// The closure receives the continuation from the previous page (`None` on
/// the first request). An empty result set is a valid terminal state. Any
/// error discards accumulated items and is returned as-is; retry policy
/// belongs to the caller.
pub fn drain_pages<T, F>(mut fetch_page: F) -> Result<Vec<T>, SourceError>
where
    F: FnMut(Option<&Continuation>) -> Result<Page<T>, SourceError>,
{
    let mut items = Vec::new();
    let mut continuation: Option<Continuation> = None;
    let mut pages = 0usize;
    loop {
        let page = fetch_page(continuation.as_ref())?;
        pages += 1;
        trace!(page = pages, items = page.items.len(), "fetched page");
        items.extend(page.items);
        match page.continuation {
            Some(token) => continuation = Some(token),
            None => break,
        }
    }
    Ok(items)
}
