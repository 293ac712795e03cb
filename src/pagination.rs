//! pagination
//!
//! Cursor-driven page walking.
//!
//! # Design
//!
//! [`all_pages`] repeatedly calls a "fetch one page" closure, resuming each
//! time from the provider's `nextPageStart`, until a page reports
//! `isLastPage`. It never computes the next start itself: providers are free
//! to return non-contiguous pages.
//!
//! Providers that page by number (GitHub's `Link` header) map onto the same
//! cursor with [`Page::from_link`]: `start` is the page number and
//! `next_page_start` the next page number.
//!
//! # Example
//!
//! ```
//! use gitprovider::pagination::{all_pages, Page, PageCursor, PageOptions};
//! use gitprovider::CallContext;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let mut cursor = PageCursor::default();
//! let items = all_pages(&CallContext::new(), &mut cursor, &PageOptions::default(), |c| async move {
//!     Ok(if c.start == 0 {
//!         Page::new(vec!["a", "b"], 0, Some(2))
//!     } else {
//!         Page::new(vec!["c"], 2, None)
//!     })
//! })
//! .await
//! .unwrap();
//! assert_eq!(items, vec!["a", "b", "c"]);
//! # });
//! ```

use std::future::Future;

use serde::Deserialize;

use crate::context::CallContext;
use crate::error::{FieldError, ProviderError};

/// Position within a paged collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageCursor {
    /// First item index (or page number) requested
    pub start: u64,
    /// Requested page size; `None` means provider default
    pub limit: Option<u64>,
    /// Items in the last page received
    pub size: u64,
    /// Whether the last page received was the final one
    pub is_last_page: bool,
    /// Where the next page begins, as reported by the provider
    pub next_page_start: Option<u64>,
}

impl PageCursor {
    /// A cursor starting at `start` with page size `limit`.
    pub fn starting_at(start: u64, limit: Option<u64>) -> Self {
        Self {
            start,
            limit,
            ..Self::default()
        }
    }
}

/// Limits applied while walking pages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageOptions {
    /// Page size to request when the cursor has none
    pub limit: Option<u64>,
    /// Stop with `TooManyPages` after this many pages
    pub max_pages: Option<usize>,
    /// Stop once this many items are collected; also caps the page size
    pub max_items: Option<usize>,
}

impl PageOptions {
    /// The same options, returning at most `max_items` items.
    pub fn up_to(&self, max_items: Option<usize>) -> Self {
        Self {
            max_items,
            ..self.clone()
        }
    }
}

/// One page of results in Bitbucket Server's envelope.
///
/// ```json
/// {"size": 2, "limit": 2, "isLastPage": false, "start": 0, "nextPageStart": 2, "values": [...]}
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub values: Vec<T>,
    #[serde(default)]
    pub start: u64,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub size: u64,
    /// A page that omits the flag is treated as the last one.
    #[serde(default = "missing_is_last_page")]
    pub is_last_page: bool,
    #[serde(default)]
    pub next_page_start: Option<u64>,
}

fn missing_is_last_page() -> bool {
    true
}

impl<T> Page<T> {
    /// Build a page; it is the last one when `next_page_start` is `None`.
    pub fn new(values: Vec<T>, start: u64, next_page_start: Option<u64>) -> Self {
        Self {
            size: values.len() as u64,
            values,
            start,
            limit: None,
            is_last_page: next_page_start.is_none(),
            next_page_start,
        }
    }

    /// Build a page from a page-numbered response and its `Link` next page.
    pub fn from_link(values: Vec<T>, page: u64, next_page: Option<u64>) -> Self {
        Self::new(values, page, next_page)
    }

    /// Transform the items, keeping the cursor fields.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            values: self.values.into_iter().map(f).collect(),
            start: self.start,
            limit: self.limit,
            size: self.size,
            is_last_page: self.is_last_page,
            next_page_start: self.next_page_start,
        }
    }

    /// The cursor state this page reports.
    pub fn cursor(&self) -> PageCursor {
        PageCursor {
            start: self.start,
            limit: self.limit,
            size: self.size,
            is_last_page: self.is_last_page,
            next_page_start: self.next_page_start,
        }
    }
}

/// Walk every page and return all items in order.
///
/// `fetch_one` receives the cursor to request and returns the page the
/// provider sent back. After each page `cursor` holds what the provider
/// reported; on the way to the next page `cursor.start` is set to
/// `next_page_start`.
///
/// With `options.max_items` set, walking stops once that many items are
/// collected, and no page larger than that is requested.
///
/// # Errors
///
/// - Any error from `fetch_one`, immediately; items gathered so far are dropped
/// - `InvalidServerData` if a page is not last but has no `nextPageStart`
/// - `TooManyPages` if `options.max_pages` pages were fetched without
///   reaching the last one
/// - `Cancelled` / `DeadlineExceeded` between pages
pub async fn all_pages<T, F, Fut>(
    ctx: &CallContext,
    cursor: &mut PageCursor,
    options: &PageOptions,
    mut fetch_one: F,
) -> Result<Vec<T>, ProviderError>
where
    F: FnMut(PageCursor) -> Fut,
    Fut: Future<Output = Result<Page<T>, ProviderError>>,
{
    if cursor.limit.is_none() {
        cursor.limit = options.limit;
    }
    if let Some(max_items) = options.max_items {
        if max_items == 0 {
            return Ok(Vec::new());
        }
        let max = max_items as u64;
        cursor.limit = Some(cursor.limit.map_or(max, |limit| limit.min(max)));
    }

    let mut items = Vec::new();
    let mut pages: usize = 0;

    loop {
        ctx.check()?;
        if let Some(max_pages) = options.max_pages {
            if pages >= max_pages {
                tracing::warn!(pages, "page budget exhausted before the last page");
                return Err(ProviderError::TooManyPages(pages));
            }
        }

        let page = fetch_one(cursor.clone()).await?;
        pages += 1;

        let reported = page.cursor();
        items.extend(page.values);

        cursor.size = reported.size;
        cursor.is_last_page = reported.is_last_page;
        cursor.next_page_start = reported.next_page_start;
        if reported.limit.is_some() {
            cursor.limit = reported.limit;
        }

        if let Some(max_items) = options.max_items {
            if items.len() >= max_items {
                items.truncate(max_items);
                tracing::debug!(pages, items = items.len(), "collected requested items");
                return Ok(items);
            }
        }
        if cursor.is_last_page {
            tracing::debug!(pages, items = items.len(), "reached last page");
            return Ok(items);
        }

        let Some(next_start) = cursor.next_page_start else {
            return Err(ProviderError::InvalidServerData(vec![FieldError::new(
                "nextPageStart",
                "missing on a page that is not the last",
            )]));
        };
        tracing::debug!(page = pages, next_start, "fetching next page");
        cursor.start = next_start;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use crate::error::ErrorKind;

    #[tokio::test]
    async fn walks_chained_pages_in_order() {
        let mut cursor = PageCursor::default();
        let items = all_pages(
            &CallContext::new(),
            &mut cursor,
            &PageOptions::default(),
            |c| async move {
                match c.start {
                    0 => Ok(Page::new(vec!['a', 'b'], 0, Some(2))),
                    2 => Ok(Page::new(vec!['c'], 2, None)),
                    other => panic!("unexpected start {other}"),
                }
            },
        )
        .await
        .unwrap();

        assert_eq!(items, vec!['a', 'b', 'c']);
        assert!(cursor.is_last_page);
        assert_eq!(cursor.start, 2);
        assert_eq!(cursor.size, 1);
    }

    #[tokio::test]
    async fn resumes_from_next_page_start_not_start_plus_size() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_capture = Arc::clone(&seen);
        let mut cursor = PageCursor::default();

        let items = all_pages(
            &CallContext::new(),
            &mut cursor,
            &PageOptions::default(),
            move |c| {
                seen_capture.lock().unwrap().push(c.start);
                async move {
                    Ok(match c.start {
                        0 => Page::new(vec![1, 2], 0, Some(40)),
                        40 => Page::new(vec![3], 40, Some(97)),
                        _ => Page::new(vec![4], c.start, None),
                    })
                }
            },
        )
        .await
        .unwrap();

        assert_eq!(items, vec![1, 2, 3, 4]);
        assert_eq!(*seen.lock().unwrap(), vec![0, 40, 97]);
    }

    #[tokio::test]
    async fn passes_limit_to_every_fetch() {
        let mut cursor = PageCursor::default();
        let options = PageOptions {
            limit: Some(25),
            ..PageOptions::default()
        };
        all_pages(&CallContext::new(), &mut cursor, &options, |c| async move {
            assert_eq!(c.limit, Some(25));
            Ok(Page::new(vec![()], c.start, (c.start == 0).then_some(25)))
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn error_propagates_and_discards_partial_results() {
        let mut cursor = PageCursor::default();
        let result: Result<Vec<u32>, _> = all_pages(
            &CallContext::new(),
            &mut cursor,
            &PageOptions::default(),
            |c| async move {
                if c.start == 0 {
                    Ok(Page::new(vec![1], 0, Some(1)))
                } else {
                    Err(ProviderError::Http {
                        status: 500,
                        body: "boom".into(),
                    })
                }
            },
        )
        .await;

        assert_eq!(result.unwrap_err().kind(), ErrorKind::Http);
    }

    #[tokio::test]
    async fn max_pages_stops_endless_provider() {
        let calls = Arc::new(Mutex::new(0usize));
        let calls_capture = Arc::clone(&calls);
        let mut cursor = PageCursor::default();
        let options = PageOptions {
            max_pages: Some(5),
            ..PageOptions::default()
        };

        let result: Result<Vec<u64>, _> =
            all_pages(&CallContext::new(), &mut cursor, &options, move |c| {
                *calls_capture.lock().unwrap() += 1;
                async move { Ok(Page::new(vec![c.start], c.start, Some(c.start + 1))) }
            })
            .await;

        assert!(matches!(result, Err(ProviderError::TooManyPages(5))));
        assert_eq!(*calls.lock().unwrap(), 5);
    }

    #[tokio::test]
    async fn max_items_stops_early_and_caps_page_size() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let calls_capture = Arc::clone(&calls);
        let mut cursor = PageCursor::default();
        let options = PageOptions {
            limit: Some(25),
            ..PageOptions::default()
        }
        .up_to(Some(3));

        let items = all_pages(&CallContext::new(), &mut cursor, &options, move |c| {
            calls_capture.lock().unwrap().push(c.limit);
            let start = c.start;
            let size = c.limit.unwrap_or(25);
            async move {
                let values: Vec<u64> = (start..start + size).collect();
                Ok(Page::new(values, start, Some(start + size)))
            }
        })
        .await
        .unwrap();

        assert_eq!(items, vec![0, 1, 2]);
        assert_eq!(*calls.lock().unwrap(), vec![Some(3)]);
    }

    #[tokio::test]
    async fn zero_max_items_makes_no_request() {
        let mut cursor = PageCursor::default();
        let items: Vec<u8> = all_pages(
            &CallContext::new(),
            &mut cursor,
            &PageOptions::default().up_to(Some(0)),
            |_| async move {
                Err::<Page<u8>, _>(ProviderError::InvalidRequest("unexpected request".into()))
            },
        )
        .await
        .unwrap();
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn missing_next_page_start_is_invalid_server_data() {
        let mut cursor = PageCursor::default();
        let result: Result<Vec<u8>, _> = all_pages(
            &CallContext::new(),
            &mut cursor,
            &PageOptions::default(),
            |_| async move {
                let mut page = Page::new(vec![1], 0, None);
                page.is_last_page = false;
                Ok(page)
            },
        )
        .await;

        assert_eq!(result.unwrap_err().kind(), ErrorKind::InvalidServerData);
    }

    #[tokio::test]
    async fn cancelled_context_stops_before_fetching() {
        let ctx = CallContext::new();
        ctx.cancel();
        let calls = Arc::new(Mutex::new(0usize));
        let calls_capture = Arc::clone(&calls);
        let mut cursor = PageCursor::default();
        let result: Result<Vec<u8>, _> =
            all_pages(&ctx, &mut cursor, &PageOptions::default(), move |_| {
                *calls_capture.lock().unwrap() += 1;
                async move { Ok(Page::new(vec![1], 0, None)) }
            })
            .await;
        assert!(matches!(result, Err(ProviderError::Cancelled)));
        assert_eq!(*calls.lock().unwrap(), 0);
    }

    #[test]
    fn stash_envelope_deserializes() {
        let json = r#"{"size":2,"limit":2,"isLastPage":false,"start":0,"nextPageStart":2,
                       "values":[{"slug":"a"},{"slug":"b"}]}"#;
        let page: Page<serde_json::Value> = serde_json::from_str(json).unwrap();
        assert_eq!(page.values.len(), 2);
        assert_eq!(
            page.cursor(),
            PageCursor {
                start: 0,
                limit: Some(2),
                size: 2,
                is_last_page: false,
                next_page_start: Some(2),
            }
        );
    }

    #[test]
    fn envelope_without_flag_is_last() {
        let page: Page<u8> = serde_json::from_str(r#"{"values":[1]}"#).unwrap();
        assert!(page.is_last_page);
        assert!(page.next_page_start.is_none());
    }
}
