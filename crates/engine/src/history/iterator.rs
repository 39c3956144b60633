//! Lazy, paginated reader over one execution's history

use async_trait::async_trait;
use tracing::{debug, warn};

use super::event::{find_event, HistoryEvent};
use crate::platform::PlatformError;
use crate::reliability::RetryPolicy;

/// One page of history plus the token for the following page
#[derive(Debug, Clone, Default)]
pub struct HistoryPage {
    pub events: Vec<HistoryEvent>,
    /// `None` (or empty) when this is the last page
    pub next_page_token: Option<String>,
}

/// Source of follow-up history pages
#[async_trait]
pub trait HistoryPager: Send + Sync {
    /// Fetch the page identified by `next_page_token`
    async fn next_history_page(&self, next_page_token: &str) -> Result<HistoryPage, PlatformError>;
}

/// History errors
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    /// Requested event id is outside the available history
    #[error("event id {id} is out of range (1..={buffered})")]
    OutOfRange { id: i64, buffered: usize },
}

/// Forward-only, restartable sequence over history events
///
/// Starts with the page delivered with the decision task and pages in the
/// rest on demand. Buffered events only ever grow; a page is never fetched
/// twice. When a page cannot be fetched after the configured number of
/// attempts, iteration ends with whatever was buffered.
pub struct HistoryIterator<'a, P: HistoryPager + ?Sized> {
    pager: &'a P,
    events: Vec<HistoryEvent>,
    next_page_token: Option<String>,
    cursor: usize,
    retry: RetryPolicy,
}

impl<'a, P: HistoryPager + ?Sized> HistoryIterator<'a, P> {
    /// Create an iterator from the first page of a decision task
    pub fn new(pager: &'a P, first_page: HistoryPage, retry: RetryPolicy) -> Self {
        Self {
            pager,
            events: first_page.events,
            next_page_token: first_page.next_page_token.filter(|t| !t.is_empty()),
            cursor: 0,
            retry,
        }
    }

    /// Next event in id order, paging in more history when needed
    pub async fn next_event(&mut self) -> Option<HistoryEvent> {
        while self.cursor >= self.events.len() {
            if !self.fetch_next_page().await {
                return None;
            }
        }
        let event = self.events[self.cursor].clone();
        self.cursor += 1;
        Some(event)
    }

    /// Restart iteration from the first event
    pub fn rewind(&mut self) {
        self.cursor = 0;
    }

    /// Events read so far
    pub fn buffered(&self) -> &[HistoryEvent] {
        &self.events
    }

    /// Whether the platform reported more pages
    pub fn has_more_pages(&self) -> bool {
        self.next_page_token.is_some()
    }

    /// Look up an event by its 1-based id
    pub async fn event(&mut self, id: i64) -> Result<&HistoryEvent, HistoryError> {
        if id >= 1 {
            while id as usize > self.events.len() && self.has_more_pages() {
                if !self.fetch_next_page().await {
                    break;
                }
            }
        }
        let buffered = self.events.len();
        find_event(&self.events, id).ok_or(HistoryError::OutOfRange { id, buffered })
    }

    /// Fetch the next page, retrying per policy
    ///
    /// Returns `false` when there is nothing more to read.
    async fn fetch_next_page(&mut self) -> bool {
        let Some(token) = self.next_page_token.clone() else {
            return false;
        };

        for attempt in 1..=self.retry.max_attempts {
            let delay = self.retry.delay_for_attempt(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            match self.pager.next_history_page(&token).await {
                Ok(page) => {
                    debug!(
                        count = page.events.len(),
                        buffered = self.events.len(),
                        "Fetched history page"
                    );
                    self.events.extend(page.events);
                    self.next_page_token = page.next_page_token.filter(|t| !t.is_empty());
                    return true;
                }
                Err(e) => {
                    warn!(attempt, error = %e, "History page fetch failed");
                }
            }
        }

        warn!(
            attempts = self.retry.max_attempts,
            buffered = self.events.len(),
            "Giving up on history paging, continuing with buffered events"
        );
        self.next_page_token = None;
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::EventAttributes;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::time::Duration;

    struct ScriptedPager {
        responses: Mutex<VecDeque<Result<HistoryPage, PlatformError>>>,
        calls: Mutex<u32>,
    }

    impl ScriptedPager {
        fn new(responses: Vec<Result<HistoryPage, PlatformError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock()
        }
    }

    #[async_trait]
    impl HistoryPager for ScriptedPager {
        async fn next_history_page(&self, _token: &str) -> Result<HistoryPage, PlatformError> {
            *self.calls.lock() += 1;
            self.responses
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(PlatformError::Unavailable("no more pages".into())))
        }
    }

    fn page(ids: std::ops::RangeInclusive<i64>, token: Option<&str>) -> HistoryPage {
        HistoryPage {
            events: ids
                .map(|id| HistoryEvent::new(id, EventAttributes::DecisionTaskScheduled))
                .collect(),
            next_page_token: token.map(String::from),
        }
    }

    fn no_delay() -> RetryPolicy {
        RetryPolicy::fixed(Duration::ZERO, 10)
    }

    #[tokio::test]
    async fn test_iterates_across_pages() {
        let pager = ScriptedPager::new(vec![Ok(page(3..=4, None))]);
        let mut iter = HistoryIterator::new(&pager, page(1..=2, Some("p2")), no_delay());

        let mut ids = vec![];
        while let Some(event) = iter.next_event().await {
            ids.push(event.event_id);
        }

        assert_eq!(ids, vec![1, 2, 3, 4]);
        assert_eq!(pager.calls(), 1);
    }

    #[tokio::test]
    async fn test_rewind_does_not_refetch() {
        let pager = ScriptedPager::new(vec![Ok(page(2..=2, None))]);
        let mut iter = HistoryIterator::new(&pager, page(1..=1, Some("p2")), no_delay());

        while iter.next_event().await.is_some() {}
        iter.rewind();
        let mut count = 0;
        while iter.next_event().await.is_some() {
            count += 1;
        }

        assert_eq!(count, 2);
        assert_eq!(pager.calls(), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_ten_failed_fetches() {
        let failures = (0..10)
            .map(|_| Err(PlatformError::Unavailable("throttled".into())))
            .collect();
        let pager = ScriptedPager::new(failures);
        let mut iter = HistoryIterator::new(&pager, page(1..=3, Some("p2")), no_delay());

        let mut ids = vec![];
        while let Some(event) = iter.next_event().await {
            ids.push(event.event_id);
        }

        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(pager.calls(), 10);
        assert!(!iter.has_more_pages());
    }

    #[tokio::test]
    async fn test_retry_succeeds_before_limit() {
        let pager = ScriptedPager::new(vec![
            Err(PlatformError::Unavailable("blip".into())),
            Err(PlatformError::Unavailable("blip".into())),
            Ok(page(2..=2, None)),
        ]);
        let mut iter = HistoryIterator::new(&pager, page(1..=1, Some("p2")), no_delay());

        let event = iter.event(2).await.expect("should page in event 2");
        assert_eq!(event.event_id, 2);
        assert_eq!(pager.calls(), 3);
    }

    #[tokio::test]
    async fn test_lookup_out_of_range() {
        let pager = ScriptedPager::new(vec![]);
        let mut iter = HistoryIterator::new(&pager, page(1..=2, None), no_delay());

        assert!(iter.event(1).await.is_ok());
        assert!(matches!(
            iter.event(0).await,
            Err(HistoryError::OutOfRange { id: 0, buffered: 2 })
        ));
        assert!(matches!(
            iter.event(3).await,
            Err(HistoryError::OutOfRange { id: 3, .. })
        ));
        assert_eq!(pager.calls(), 0);
    }
}
