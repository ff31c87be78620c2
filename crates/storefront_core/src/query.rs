//! Catalog query stream: newest intent wins, regardless of the order in which
//! responses come back.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use shared::domain::Money;
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{debug, warn};

use crate::{
    error::{ClientError, TransportError},
    filter::{FilterState, PageState},
    generation::{Generation, GenerationToken, RequestGenerationTracker},
    normalize::{normalize, QueryResult},
    transport::{CatalogRequest, CommerceTransport},
    StorefrontEvent,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    Idle,
    Fetching(GenerationToken),
    Committed(GenerationToken),
    Failed(GenerationToken),
}

/// Read-only copy of what the catalog screen should display.
#[derive(Debug, Clone)]
pub struct QueryView {
    pub filter: FilterState,
    pub page: PageState,
    pub status: QueryStatus,
    pub result: Option<QueryResult>,
    pub last_error: Option<ClientError>,
}

impl QueryView {
    pub fn is_loading(&self) -> bool {
        matches!(self.status, QueryStatus::Fetching(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    Committed(QueryResult),
    Failed(ClientError),
    /// A newer query took over; nothing was applied or reported.
    Superseded,
}

/// Handle to one issued query.
#[derive(Debug)]
pub struct QueryTask {
    token: GenerationToken,
    handle: JoinHandle<QueryOutcome>,
}

impl QueryTask {
    pub fn token(&self) -> GenerationToken {
        self.token
    }

    pub async fn outcome(self) -> QueryOutcome {
        match self.handle.await {
            Ok(outcome) => outcome,
            Err(err) => {
                if err.is_panic() {
                    warn!(token = %self.token, "catalog: query task panicked");
                }
                QueryOutcome::Superseded
            }
        }
    }
}

struct QueryState {
    tracker: RequestGenerationTracker,
    filter: FilterState,
    page: PageState,
    status: QueryStatus,
    /// Status to fall back to when an in-flight query is cancelled.
    settled: QueryStatus,
    result: Option<QueryResult>,
    last_error: Option<ClientError>,
}

pub struct QueryController {
    transport: Arc<dyn CommerceTransport>,
    state: Mutex<QueryState>,
    events: broadcast::Sender<StorefrontEvent>,
}

impl QueryController {
    pub fn new(
        transport: Arc<dyn CommerceTransport>,
        filter: FilterState,
        page: PageState,
        events: broadcast::Sender<StorefrontEvent>,
    ) -> Arc<Self> {
        Arc::new(Self {
            transport,
            state: Mutex::new(QueryState {
                tracker: RequestGenerationTracker::new(),
                filter,
                page,
                status: QueryStatus::Idle,
                settled: QueryStatus::Idle,
                result: None,
                last_error: None,
            }),
            events,
        })
    }

    pub fn view(&self) -> QueryView {
        let state = self.lock_state();
        QueryView {
            filter: state.filter.clone(),
            page: state.page,
            status: state.status,
            result: state.result.clone(),
            last_error: state.last_error.clone(),
        }
    }

    pub fn current_token(&self) -> GenerationToken {
        self.lock_state().tracker.current()
    }

    pub fn set_filter(self: &Arc<Self>, filter: FilterState) -> Result<QueryTask, ClientError> {
        filter.validate()?;
        Ok(self.issue(move |state| {
            state.filter = filter;
            state.page = state.page.rewound();
        }))
    }

    /// Pages past the end are sent anyway; the remote answers with an empty
    /// page.
    pub fn set_page(self: &Arc<Self>, page: u32) -> Result<QueryTask, ClientError> {
        if page == 0 {
            return Err(ClientError::validation("page must be at least 1"));
        }
        if page != 1 {
            let state = self.lock_state();
            if !state.filter.is_paged() {
                return Err(ClientError::validation(format!(
                    "{:?} results are not paged",
                    state.filter.mode()
                )));
            }
        }
        Ok(self.issue(move |state| state.page = state.page.at(page)))
    }

    pub fn set_per_page(self: &Arc<Self>, per_page: u32) -> Result<QueryTask, ClientError> {
        let page = PageState::first(per_page)?;
        Ok(self.issue(move |state| state.page = page))
    }

    pub fn filter_by_price_range(
        self: &Arc<Self>,
        min: Money,
        max: Money,
    ) -> Result<QueryTask, ClientError> {
        let filter = {
            let state = self.lock_state();
            FilterState::price_range(min, max, state.filter.scope())
                .with_location(state.filter.location.clone())
        };
        self.set_filter(filter)
    }

    pub fn filter_by_rating(self: &Arc<Self>, rating: u8) -> Result<QueryTask, ClientError> {
        let filter = {
            let state = self.lock_state();
            FilterState::rating(rating, state.filter.scope())
                .with_location(state.filter.location.clone())
        };
        self.set_filter(filter)
    }

    pub fn search(self: &Arc<Self>, text: &str) -> Result<QueryTask, ClientError> {
        if text.trim().is_empty() {
            return Err(ClientError::validation("search text must not be empty"));
        }
        let location = self.lock_state().filter.location.clone();
        self.set_filter(FilterState::search(text).with_location(location))
    }

    pub fn refresh(self: &Arc<Self>) -> QueryTask {
        self.issue(|_| {})
    }

    /// Aborts the in-flight query. Visible state returns to what it showed
    /// before that query was issued.
    pub fn cancel(&self) {
        let mut state = self.lock_state();
        if let QueryStatus::Fetching(token) = state.status {
            // a fresh token makes any late response stale
            let unused = state.tracker.new_token();
            unused.cancel.cancel();
            state.status = state.settled;
            debug!(%token, "catalog: query cancelled");
        }
    }

    fn issue(self: &Arc<Self>, update: impl FnOnce(&mut QueryState)) -> QueryTask {
        let (generation, request, page) = {
            let mut state = self.lock_state();
            update(&mut state);
            let generation = state.tracker.new_token();
            state.status = QueryStatus::Fetching(generation.token);
            let request = state.filter.to_request(state.page);
            let _ = self.events.send(StorefrontEvent::CatalogLoading {
                token: generation.token,
            });
            (generation, request, state.page)
        };
        debug!(token = %generation.token, %request, "catalog: query issued");

        let token = generation.token;
        let controller = Arc::clone(self);
        let handle =
            tokio::spawn(async move { controller.run(generation, request, page).await });
        QueryTask { token, handle }
    }

    async fn run(
        self: Arc<Self>,
        generation: Generation,
        request: CatalogRequest,
        page: PageState,
    ) -> QueryOutcome {
        let Generation { token, cancel } = generation;
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TransportError::Cancelled),
            response = self.transport.fetch_catalog(&request, cancel.clone()) => response,
        };

        match response {
            Ok(raw) => self.commit(token, normalize(&raw, page)),
            Err(TransportError::Cancelled) => {
                debug!(%token, "catalog: query superseded before response");
                QueryOutcome::Superseded
            }
            Err(err) => self.fail(token, ClientError::from(err)),
        }
    }

    fn commit(&self, token: GenerationToken, result: QueryResult) -> QueryOutcome {
        let mut state = self.lock_state();
        if !state.tracker.is_current(token) {
            debug!(%token, current = %state.tracker.current(), "catalog: discarding stale response");
            return QueryOutcome::Superseded;
        }
        state.status = QueryStatus::Committed(token);
        state.settled = state.status;
        state.result = Some(result.clone());
        state.last_error = None;
        debug!(%token, items = result.items.len(), total = result.total, "catalog: committed");
        let _ = self.events.send(StorefrontEvent::CatalogCommitted {
            token,
            result: result.clone(),
        });
        QueryOutcome::Committed(result)
    }

    fn fail(&self, token: GenerationToken, error: ClientError) -> QueryOutcome {
        let mut state = self.lock_state();
        if !state.tracker.is_current(token) {
            debug!(%token, "catalog: ignoring failure of stale query");
            return QueryOutcome::Superseded;
        }
        warn!(%token, %error, "catalog: query failed");
        state.status = QueryStatus::Failed(token);
        state.settled = state.status;
        state.last_error = Some(error.clone());
        let _ = self.events.send(StorefrontEvent::CatalogFailed {
            token,
            error: error.clone(),
        });
        QueryOutcome::Failed(error)
    }

    fn lock_state(&self) -> MutexGuard<'_, QueryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[path = "tests/query_tests.rs"]
mod tests;
