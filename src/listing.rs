//! Admin listing engine
//!
//! Paginated, sortable, name-filtered view of the member collection. The
//! service does the actual paging, sorting and filtering; this module owns
//! the query state: page/offset arithmetic, the sort toggle, explicit search
//! commits, and discarding responses that a newer query has superseded.

use std::ops::RangeInclusive;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, warn};

use crate::error::{Result, RosterError};
use crate::record::{MemberField, MemberRecord};
use crate::service::MemberService;

/// Page numbers shown around the current page.
pub const PAGE_WINDOW: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }

    pub fn toggled(&self) -> Self {
        match self {
            SortOrder::Asc => SortOrder::Desc,
            SortOrder::Desc => SortOrder::Asc,
        }
    }
}

/// Parameters of one listing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    /// 1-based page number
    pub page: u32,
    pub limit: u32,
    pub sort_by: MemberField,
    pub sort_order: SortOrder,
    /// Committed name filter; `None` lists everyone
    pub name_filter: Option<String>,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 10,
            sort_by: MemberField::Nome,
            sort_order: SortOrder::Asc,
            name_filter: None,
        }
    }
}

impl ListQuery {
    /// Rows to skip: `(page - 1) * limit`, never negative.
    pub fn skip(&self) -> u64 {
        u64::from(self.page.max(1) - 1) * u64::from(self.limit)
    }

    /// Query-string parameters of `GET /membros`.
    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("skip", self.skip().to_string()),
            ("limit", self.limit.to_string()),
            ("sort_by", self.sort_by.as_str().to_string()),
            ("sort_order", self.sort_order.as_str().to_string()),
        ];
        if let Some(ref nome) = self.name_filter {
            params.push(("nome", nome.clone()));
        }
        params
    }
}

/// One page of results. `total` drives pagination even when `rows` is short.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub rows: Vec<MemberRecord>,
    pub total: u64,
}

/// `ceil(total / limit)`
pub fn total_pages(total: u64, limit: u32) -> u32 {
    if limit == 0 {
        return 0;
    }
    let pages = total.div_ceil(u64::from(limit));
    u32::try_from(pages).unwrap_or(u32::MAX)
}

/// Window of at most `width` page numbers centred on `current`.
pub fn page_window(current: u32, total_pages: u32, width: u32) -> RangeInclusive<u32> {
    let width = width.max(1);
    let mut start = current.saturating_sub(width / 2).max(1);
    let mut end = start + width - 1;
    if end > total_pages {
        end = total_pages;
        start = end.saturating_sub(width - 1).max(1);
    }
    start..=end
}

/// Handle for a dispatched query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTicket {
    pub generation: u64,
    pub query: ListQuery,
}

/// What happened to a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOutcome {
    /// Rows and total replaced
    Applied,
    /// A newer query was dispatched; response dropped
    Stale,
    /// Applied, but the page fell outside the new total and was clamped;
    /// the clamped page must be fetched
    Reclamped,
}

/// Query state of the admin listing.
#[derive(Debug, Clone)]
pub struct ListingState {
    query: ListQuery,
    search_draft: String,
    rows: Vec<MemberRecord>,
    total: u64,
    loading: bool,
    error: Option<String>,
    generation: u64,
}

impl ListingState {
    pub fn new(limit: u32) -> Self {
        Self {
            query: ListQuery {
                limit: limit.max(1),
                ..Default::default()
            },
            search_draft: String::new(),
            rows: Vec::new(),
            total: 0,
            loading: false,
            error: None,
            generation: 0,
        }
    }

    pub fn query(&self) -> &ListQuery {
        &self.query
    }

    pub fn rows(&self) -> &[MemberRecord] {
        &self.rows
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn search_draft(&self) -> &str {
        &self.search_draft
    }

    pub fn total_pages(&self) -> u32 {
        total_pages(self.total, self.query.limit)
    }

    pub fn page_window(&self) -> RangeInclusive<u32> {
        page_window(self.query.page, self.total_pages(), PAGE_WINDOW)
    }

    /// Sort by `field`: the same field flips the order, a new field sorts
    /// ascending. Either way the listing returns to page 1.
    pub fn toggle_sort(&mut self, field: MemberField) {
        if self.query.sort_by == field {
            self.query.sort_order = self.query.sort_order.toggled();
        } else {
            self.query.sort_by = field;
            self.query.sort_order = SortOrder::Asc;
        }
        self.query.page = 1;
    }

    /// Update the search box without querying.
    pub fn set_search_draft(&mut self, text: impl Into<String>) {
        self.search_draft = text.into();
    }

    /// Apply the search box as the name filter and return to page 1.
    pub fn commit_search(&mut self) {
        let text = self.search_draft.trim();
        self.query.name_filter = if text.is_empty() { None } else { Some(text.to_string()) };
        self.query.page = 1;
    }

    /// Empty the search box and the filter, back to page 1.
    pub fn clear_search(&mut self) {
        self.search_draft.clear();
        self.query.name_filter = None;
        self.query.page = 1;
    }

    /// Move to `page` if it lies in `[1, total_pages]`. Returns whether the
    /// page changed; out-of-range requests leave the state untouched.
    pub fn go_to_page(&mut self, page: u32) -> bool {
        if page == 0 || page > self.total_pages() || page == self.query.page {
            return false;
        }
        self.query.page = page;
        true
    }

    pub fn next_page(&mut self) -> bool {
        self.go_to_page(self.query.page.saturating_add(1))
    }

    pub fn prev_page(&mut self) -> bool {
        self.go_to_page(self.query.page.saturating_sub(1))
    }

    /// Dispatch the current query.
    pub fn begin(&mut self) -> QueryTicket {
        self.generation += 1;
        self.loading = true;
        QueryTicket {
            generation: self.generation,
            query: self.query.clone(),
        }
    }

    /// Apply a response. Stale responses are dropped; a failure keeps the
    /// rows already shown.
    pub fn complete(&mut self, ticket: &QueryTicket, result: Result<ListPage>) -> Result<QueryOutcome> {
        if ticket.generation != self.generation {
            warn!(
                stale = ticket.generation,
                current = self.generation,
                "dropping superseded listing response"
            );
            return Ok(QueryOutcome::Stale);
        }

        self.loading = false;
        match result {
            Ok(page) => {
                self.rows = page.rows;
                self.total = page.total;
                self.error = None;

                let last = self.total_pages().max(1);
                if self.query.page > last {
                    debug!(from = self.query.page, to = last, "clamping page to new total");
                    self.query.page = last;
                    return Ok(QueryOutcome::Reclamped);
                }
                Ok(QueryOutcome::Applied)
            }
            Err(e) => {
                self.error = Some(LIST_FAILURE_MESSAGE.to_string());
                Err(e)
            }
        }
    }
}

/// Shown when a listing request fails.
pub const LIST_FAILURE_MESSAGE: &str = "Ocorreu um erro ao buscar os membros.";

/// Listing state bound to a record service.
pub struct AdminListingEngine<S: MemberService + ?Sized> {
    service: Arc<S>,
    state: Mutex<ListingState>,
}

impl<S: MemberService + ?Sized> AdminListingEngine<S> {
    pub fn new(service: Arc<S>, limit: u32) -> Self {
        Self::from_state(service, ListingState::new(limit))
    }

    /// Start from a prepared state, e.g. a sort and filter chosen up front.
    pub fn from_state(service: Arc<S>, state: ListingState) -> Self {
        Self {
            service,
            state: Mutex::new(state),
        }
    }

    fn state(&self) -> MutexGuard<'_, ListingState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Copy of the current state for rendering.
    pub fn snapshot(&self) -> ListingState {
        self.state().clone()
    }

    /// Fetch the current query, re-fetching once more if the page had to be
    /// clamped to a shrunken total.
    pub async fn refresh(&self) -> Result<QueryOutcome> {
        let mut outcome = self.fetch_once().await?;
        if outcome == QueryOutcome::Reclamped {
            outcome = self.fetch_once().await?;
        }
        Ok(outcome)
    }

    async fn fetch_once(&self) -> Result<QueryOutcome> {
        let ticket = self.state().begin();
        debug!(generation = ticket.generation, skip = ticket.query.skip(), "listing query dispatched");
        let result = self.service.list_members(&ticket.query).await;
        self.state().complete(&ticket, result)
    }

    /// Sort by a column and refetch from page 1.
    pub async fn sort_by(&self, field: MemberField) -> Result<QueryOutcome> {
        self.state().toggle_sort(field);
        self.refresh().await
    }

    /// Type into the search box; no request is made.
    pub fn type_search(&self, text: impl Into<String>) {
        self.state().set_search_draft(text);
    }

    /// Commit the search box (Enter or the search button).
    pub async fn search(&self) -> Result<QueryOutcome> {
        self.state().commit_search();
        self.refresh().await
    }

    pub async fn clear_search(&self) -> Result<QueryOutcome> {
        self.state().clear_search();
        self.refresh().await
    }

    /// Navigate to a page. Out-of-range pages are rejected before any
    /// request is made.
    pub async fn go_to_page(&self, page: u32) -> Result<QueryOutcome> {
        let (moved, last) = {
            let mut state = self.state();
            (state.go_to_page(page), state.total_pages())
        };
        if !moved {
            if page == 0 || page > last {
                return Err(RosterError::Validation(format!(
                    "Página {} fora do intervalo 1..={}",
                    page, last
                )));
            }
            return Ok(QueryOutcome::Applied);
        }
        self.refresh().await
    }

    pub async fn next_page(&self) -> Result<QueryOutcome> {
        let page = self.state().query().page.saturating_add(1);
        self.go_to_page(page).await
    }

    pub async fn prev_page(&self) -> Result<QueryOutcome> {
        let page = self.state().query().page.saturating_sub(1);
        self.go_to_page(page).await
    }
}
