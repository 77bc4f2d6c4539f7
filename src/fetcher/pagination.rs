//! Page-following within a single window
//!
//! Pages are produced lazily as a [`Stream`]; each page fetch goes through
//! the retry controller on its own, so a transient failure on page 7 only
//! retries page 7.
//!
//! Safety mechanisms:
//! - Maximum page count per window to prevent infinite loops
//! - A cursor that does not advance is treated as a malformed response
//! - An empty page ends the window even if a cursor is present

use crate::fetcher::retry_formatter::CallScope;
use crate::fetcher::{FetcherError, PageRequest, PageToken, ReportPage, ReportSource};
use crate::sync::retry::{RetryController, RetryError};
use crate::window::ExtractionWindow;
use futures_util::stream::{self, Stream};
use tracing::debug;

/// Maximum number of pages fetched for one window
pub const MAX_PAGES_PER_WINDOW: usize = 10_000;

#[derive(Debug, Clone)]
struct PageCursor {
    token: Option<PageToken>,
    pages: usize,
    records: usize,
}

/// Lazily fetch every page of `window`
///
/// The stream ends after the last page, or yields a single error and ends
/// if a page fails terminally.
pub fn page_stream<'a, S>(
    source: &'a S,
    retry: &'a RetryController,
    window: ExtractionWindow,
) -> impl Stream<Item = Result<ReportPage, RetryError>> + 'a
where
    S: ReportSource + ?Sized,
{
    let scope = CallScope::new(source.describe(), Some(window));
    let start = PageCursor {
        token: Some(PageToken::First),
        pages: 0,
        records: 0,
    };

    stream::try_unfold(start, move |cursor| {
        let scope = scope.clone();
        async move {
            let Some(token) = cursor.token else {
                debug!(
                    %window,
                    pages = cursor.pages,
                    records = cursor.records,
                    "Pagination complete"
                );
                return Ok(None);
            };

            if cursor.pages >= MAX_PAGES_PER_WINDOW {
                return Err(RetryError::Rejected(FetcherError::MalformedResponse(format!(
                    "max pages ({MAX_PAGES_PER_WINDOW}) exceeded for window {window} - possible pagination loop"
                ))));
            }

            let request = PageRequest { window, token };
            debug!(%window, page = cursor.pages + 1, token = ?request.token, "Fetching page");

            let page = retry
                .run(&scope, || source.fetch_page(&request))
                .await?;

            let next = if page.records.is_empty() {
                debug!(%window, page = cursor.pages + 1, "Empty page, stopping");
                None
            } else {
                page.next.clone()
            };

            if next.as_ref() == Some(&request.token) {
                return Err(RetryError::Rejected(FetcherError::MalformedResponse(format!(
                    "pagination token {:?} did not advance in window {window}",
                    request.token
                ))));
            }

            let advanced = PageCursor {
                token: next,
                pages: cursor.pages + 1,
                records: cursor.records + page.records.len(),
            };
            Ok(Some((page, advanced)))
        }
    })
}
