//! Cursor-paginated collection walks.
//!
//! A walk issues one signed GET per page and stops on the first short or empty
//! page, on a cap, or on the first failure. Failures never discard what was
//! already fetched: the caller gets the partial items plus the error.

use std::time::Duration;

use log::{debug, info, warn};
use serde::de::DeserializeOwned;

use crate::{
    ApiClient, FlomoError, Note, PageCursor, PageItem, TagInfo, NOTES_ENDPOINT, TAGS_ENDPOINT,
};

/// Page size the search endpoint honors.
pub const SEARCH_PAGE_SIZE: usize = 50;

/// Describes one collection walk.
#[derive(Debug, Clone)]
pub struct PageQuery {
    pub endpoint: String,
    pub page_size: usize,
    /// Fixed parameters repeated on every page
    pub extras: Vec<(String, String)>,
    /// Upper bound on the total number of items
    pub cap: Option<usize>,
}

impl PageQuery {
    pub fn new(endpoint: impl Into<String>, page_size: usize) -> Self {
        Self {
            endpoint: endpoint.into(),
            page_size,
            extras: Vec::new(),
            cap: None,
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extras.push((key.into(), value.into()));
        self
    }

    pub fn cap(mut self, cap: Option<usize>) -> Self {
        self.cap = cap;
        self
    }
}

/// Result of a walk: every item fetched, plus the failure that ended it early.
#[derive(Debug)]
pub struct FetchOutcome<T> {
    /// Items in server order
    pub items: Vec<T>,
    /// Number of requests issued
    pub pages: usize,
    pub error: Option<FlomoError>,
}

impl<T> FetchOutcome<T> {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    /// Items if the walk finished cleanly, the error otherwise.
    pub fn into_result(self) -> crate::Result<Vec<T>> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.items),
        }
    }
}

impl ApiClient {
    /// Walks a paginated collection to completion.
    pub async fn paginate<T>(&self, query: &PageQuery) -> FetchOutcome<T>
    where
        T: PageItem + DeserializeOwned,
    {
        let mut outcome = FetchOutcome {
            items: Vec::new(),
            pages: 0,
            error: None,
        };

        if query.page_size == 0 {
            outcome.error = Some(FlomoError::ConfigError {
                message: format!("page size for {} must be at least 1", query.endpoint),
            });
            return outcome;
        }

        if query.cap == Some(0) {
            debug!("Cap of 0 on {}, nothing to fetch", query.endpoint);
            return outcome;
        }

        let offset = match self.config.tz_offset() {
            Ok(offset) => offset,
            Err(e) => {
                outcome.error = Some(e);
                return outcome;
            }
        };
        let delay = Duration::from_millis(self.config.request_delay_ms);
        let mut cursor: Option<PageCursor> = None;

        loop {
            let mut params = vec![("limit".to_string(), query.page_size.to_string())];
            params.extend(query.extras.iter().cloned());
            if let Some(cursor) = &cursor {
                params.extend(cursor.params());
            }

            outcome.pages += 1;
            debug!("Fetching page {} of {}", outcome.pages, query.endpoint);

            let batch: Vec<T> = match self.get_json(&query.endpoint, params).await {
                Ok(batch) => batch,
                Err(e) => {
                    warn!(
                        "Page {} of {} failed, keeping {} items: {}",
                        outcome.pages,
                        query.endpoint,
                        outcome.items.len(),
                        e
                    );
                    outcome.error = Some(e);
                    break;
                }
            };

            let received = batch.len();
            if received == 0 {
                debug!("Empty page, walk finished");
                break;
            }

            let next = batch.last().map(|last| last.cursor(offset));
            outcome.items.extend(batch);
            debug!("Page {} returned {} items", outcome.pages, received);

            if let Some(cap) = query.cap {
                if outcome.items.len() >= cap {
                    outcome.items.truncate(cap);
                    debug!("Reached cap of {} items", cap);
                    break;
                }
            }

            if received < query.page_size {
                break;
            }

            match next {
                Some(Ok(next)) => cursor = Some(next),
                Some(Err(e)) => {
                    warn!("Cannot advance cursor on {}: {}", query.endpoint, e);
                    outcome.error = Some(e);
                    break;
                }
                None => break,
            }

            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        info!(
            "Fetched {} items from {} in {} requests",
            outcome.items.len(),
            query.endpoint,
            outcome.pages
        );
        outcome
    }

    /// Every note, most recently updated first.
    pub async fn fetch_notes(&self, cap: Option<usize>) -> FetchOutcome<Note> {
        let query = PageQuery::new(NOTES_ENDPOINT, self.config.page_size)
            .param("tz", self.config.tz.clone())
            .cap(cap);
        self.paginate(&query).await
    }

    /// Search hits for `q`, at most `max_results`.
    pub async fn search_notes(&self, q: &str, max_results: usize) -> FetchOutcome<Note> {
        if q.trim().is_empty() {
            return FetchOutcome {
                items: Vec::new(),
                pages: 0,
                error: None,
            };
        }

        let query = PageQuery::new(NOTES_ENDPOINT, SEARCH_PAGE_SIZE)
            .param("q", q)
            .cap(Some(max_results));
        self.paginate(&query).await
    }

    /// Every tag of the account.
    pub async fn fetch_tags(&self, cap: Option<usize>) -> FetchOutcome<TagInfo> {
        let query = PageQuery::new(TAGS_ENDPOINT, self.config.page_size)
            .param("tz", self.config.tz.clone())
            .cap(cap);
        self.paginate(&query).await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::client::testing::*;
    use crate::{parse_timestamp, HttpResponse};

    fn client_with_pages(sizes: &[usize]) -> (ApiClient, std::sync::Arc<ScriptedTransport>) {
        let transport = ScriptedTransport::new();
        let mut start = 0;
        for &size in sizes {
            transport.push_data(notes_page(start, size));
            start += size;
        }
        let client = ApiClient::with_transport(test_config(), transport.clone());
        (client, transport)
    }

    #[tokio::test]
    async fn test_short_page_ends_walk() {
        let (client, transport) = client_with_pages(&[200, 200, 137]);

        let outcome = client.fetch_notes(None).await;
        assert!(outcome.is_complete());
        assert_eq!(outcome.items.len(), 537);
        assert_eq!(outcome.pages, 3);
        assert_eq!(transport.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_cap_truncates_exactly() {
        let (client, transport) = client_with_pages(&[200, 200, 200, 200]);

        let outcome = client.fetch_notes(Some(450)).await;
        assert_eq!(outcome.items.len(), 450);
        assert_eq!(transport.requests().len(), 3);
        assert_eq!(outcome.items[449].slug, "note-449");
    }

    #[tokio::test]
    async fn test_empty_page_ends_walk() {
        let (client, transport) = client_with_pages(&[200, 0]);

        let outcome = client.fetch_notes(None).await;
        assert!(outcome.is_complete());
        assert_eq!(outcome.items.len(), 200);
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_cursor_advances_from_last_item() {
        let (client, transport) = client_with_pages(&[200, 10]);

        let outcome = client.fetch_notes(None).await;
        let requests = transport.requests();

        assert_eq!(requests[0].param("latest_slug"), None);
        assert_eq!(requests[0].param("latest_updated_at"), None);

        let last = &outcome.items[199];
        let expected = parse_timestamp(&last.updated_at, client.config().tz_offset().unwrap())
            .unwrap()
            .timestamp()
            .to_string();
        assert_eq!(requests[1].param("latest_slug"), Some(last.slug.as_str()));
        assert_eq!(
            requests[1].param("latest_updated_at"),
            Some(expected.as_str())
        );
        assert_eq!(requests[1].param("tz"), Some("8:0"));
        assert_eq!(requests[1].param("limit"), Some("200"));
    }

    #[tokio::test]
    async fn test_failure_keeps_earlier_pages() {
        let transport = ScriptedTransport::new();
        transport.push_data(notes_page(0, 200));
        transport.push(Ok(HttpResponse {
            status: 500,
            body: Vec::new(),
        }));
        transport.push_data(notes_page(400, 100));
        let client = ApiClient::with_transport(test_config(), transport.clone());

        let outcome = client.fetch_notes(None).await;
        assert_eq!(outcome.items.len(), 200);
        assert!(matches!(outcome.error, Some(FlomoError::Http { status: 500 })));
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_zero_page_size_is_rejected() {
        let transport = ScriptedTransport::new();
        for start in [0, 3, 6] {
            transport.push_data(notes_page(start, 3));
        }
        let config = crate::Config {
            page_size: 0,
            ..test_config()
        };
        let client = ApiClient::with_transport(config, transport.clone());

        let outcome = client.fetch_notes(None).await;
        assert!(outcome.items.is_empty());
        assert_eq!(outcome.pages, 0);
        assert!(matches!(outcome.error, Some(FlomoError::ConfigError { .. })));
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_zero_cap_sends_nothing() {
        let (client, transport) = client_with_pages(&[200]);

        let outcome = client.fetch_notes(Some(0)).await;
        assert!(outcome.is_complete());
        assert!(outcome.items.is_empty());
        assert_eq!(outcome.pages, 0);

        let hits = client.search_notes("sunset", 0).await;
        assert!(hits.is_complete());
        assert!(hits.items.is_empty());
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_connection_failure_keeps_earlier_pages() {
        let transport = ScriptedTransport::new();
        transport.push_data(notes_page(0, 200));
        transport.push(Err(FlomoError::Transport {
            message: "connection reset".to_string(),
        }));
        transport.push_data(notes_page(200, 10));
        let client = ApiClient::with_transport(test_config(), transport.clone());

        let outcome = client.fetch_notes(None).await;
        assert_eq!(outcome.items.len(), 200);
        assert_eq!(outcome.pages, 2);
        assert!(matches!(outcome.error, Some(FlomoError::Transport { .. })));
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_non_json_page_keeps_earlier_pages() {
        let transport = ScriptedTransport::new();
        transport.push_data(notes_page(0, 200));
        transport.push(Ok(HttpResponse {
            status: 200,
            body: b"<html>maintenance</html>".to_vec(),
        }));
        transport.push_data(notes_page(200, 10));
        let client = ApiClient::with_transport(test_config(), transport.clone());

        let outcome = client.fetch_notes(None).await;
        assert_eq!(outcome.items.len(), 200);
        assert!(matches!(
            outcome.error,
            Some(FlomoError::MalformedResponse { .. })
        ));
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_application_error_stops_walk() {
        let transport = ScriptedTransport::new();
        transport.push(Ok(HttpResponse {
            status: 200,
            body: br#"{"code": -1, "message": "token expired"}"#.to_vec(),
        }));
        let client = ApiClient::with_transport(test_config(), transport);

        let outcome = client.fetch_notes(None).await;
        assert!(outcome.items.is_empty());
        assert!(matches!(outcome.error, Some(FlomoError::Api { code: -1, .. })));
    }

    #[tokio::test]
    async fn test_unparsable_cursor_aborts_walk() {
        let transport = ScriptedTransport::new();
        let mut page = notes_page(0, 200);
        page[199]["updated_at"] = json!("not a date");
        transport.push_data(page);
        transport.push_data(notes_page(200, 10));
        let client = ApiClient::with_transport(test_config(), transport.clone());

        let outcome = client.fetch_notes(None).await;
        assert_eq!(outcome.items.len(), 200);
        assert!(matches!(
            outcome.error,
            Some(FlomoError::InvalidTimestamp { .. })
        ));
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_search_uses_query_and_search_page_size() {
        let (client, transport) = client_with_pages(&[50, 50, 50]);

        let outcome = client.search_notes("sunset", 120).await;
        assert_eq!(outcome.items.len(), 120);

        let requests = transport.requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].param("q"), Some("sunset"));
        assert_eq!(requests[0].param("limit"), Some("50"));
        assert_eq!(requests[0].param("tz"), None);
    }

    #[tokio::test]
    async fn test_tags_paginate_by_updated_at_only() {
        let transport = ScriptedTransport::new();
        let config = crate::Config {
            page_size: 2,
            ..test_config()
        };
        transport.push_data(json!([
            {"name": "a", "updated_at": "2024-02-01 10:00:00"},
            {"name": "b", "updated_at": "2024-02-01 09:00:00"}
        ]));
        transport.push_data(json!([{"name": "c", "updated_at": "2024-02-01 08:00:00"}]));
        let client = ApiClient::with_transport(config, transport.clone());

        let tags = client.fetch_tags(None).await.into_result().unwrap();
        assert_eq!(tags.len(), 3);

        let second = &transport.requests()[1];
        assert_eq!(second.param("latest_slug"), None);
        assert!(second.param("latest_updated_at").is_some());
    }
}
