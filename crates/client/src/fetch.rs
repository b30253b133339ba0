//! Incremental loading for the scrolling client list.
//!
//! The coordinator is a plain state object: it hands out [`PageTicket`]s and
//! takes results back through [`FetchCoordinator::complete`]. At most one
//! ticket is outstanding per filter session. Changing the filter starts a new
//! session (new epoch), and results that come back for an older epoch are
//! dropped without touching state.

use std::future::Future;

use tracing::{debug, warn};

use democrm_api::{DuplicateField, FieldError, PageRequest, PageResult, QueryError, Record};
use democrm_api_client::{ApiClient, ClientError};
use democrm_core::validate::{find_duplicate, validate_record};
use democrm_runtime_config::ListSettings;

/// Where pages come from. Implemented by [`ApiClient`].
pub trait PageSource {
    fn fetch_page(
        &self,
        req: &PageRequest,
    ) -> impl Future<Output = Result<PageResult, ClientError>> + Send;
}

impl PageSource for ApiClient {
    fn fetch_page(
        &self,
        req: &PageRequest,
    ) -> impl Future<Output = Result<PageResult, ClientError>> + Send {
        self.list_clients(req)
    }
}

/// Scroll position of the list viewport, in content units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollMetrics {
    pub scroll_top: f64,
    pub scroll_height: f64,
    pub client_height: f64,
}

impl ScrollMetrics {
    pub fn distance_from_bottom(&self) -> f64 {
        self.scroll_height - self.scroll_top - self.client_height
    }
}

/// An issued page request. Hand it back to `complete` with the result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageTicket {
    epoch: u64,
    pub request: PageRequest,
}

impl PageTicket {
    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

#[derive(Debug)]
pub enum FetchOutcome {
    Appended { added: usize, has_more: bool },
    /// The filter changed while this page was in flight.
    Stale,
    Failed(ClientError),
}

/// Why a form submission was stopped before reaching the server.
#[derive(Debug, Clone, PartialEq)]
pub enum Precheck {
    Invalid(Vec<FieldError>),
    Duplicate(DuplicateField),
}

#[derive(Debug)]
pub struct FetchCoordinator {
    page_size: u32,
    threshold: f64,
    filter: Option<String>,
    epoch: u64,
    cursor: u32,
    records: Vec<Record>,
    in_flight: bool,
    has_more: bool,
    total: Option<u64>,
    last_scroll_top: Option<f64>,
}

impl FetchCoordinator {
    pub fn new(page_size: u32, threshold: f64) -> Result<Self, QueryError> {
        if page_size == 0 {
            return Err(QueryError::ZeroPageSize);
        }
        Ok(Self {
            page_size,
            threshold,
            filter: None,
            epoch: 0,
            cursor: 1,
            records: Vec::new(),
            in_flight: false,
            has_more: true,
            total: None,
            last_scroll_top: None,
        })
    }

    pub fn from_settings(settings: &ListSettings) -> Result<Self, QueryError> {
        Self::new(settings.page_size, settings.fetch_threshold)
    }

    /// Request page 1 for the current filter, discarding anything loaded.
    pub fn start(&mut self) -> Option<PageTicket> {
        let filter = self.filter.take();
        self.set_filter(filter)
    }

    /// Begin a new filter session. Always issues a page-1 ticket.
    pub fn set_filter(&mut self, filter: Option<String>) -> Option<PageTicket> {
        self.epoch += 1;
        self.filter = filter.filter(|f| !f.is_empty());
        self.cursor = 1;
        self.records.clear();
        self.in_flight = false;
        self.has_more = true;
        self.total = None;
        self.last_scroll_top = None;
        debug!(epoch = self.epoch, filter = ?self.filter, "filter session started");
        self.request_next()
    }

    /// Issue the next page if more are known to exist and none is in flight.
    pub fn request_next(&mut self) -> Option<PageTicket> {
        if self.in_flight || !self.has_more {
            return None;
        }
        let request = PageRequest::new(self.cursor, self.page_size, self.filter.clone()).ok()?;
        self.in_flight = true;
        Some(PageTicket {
            epoch: self.epoch,
            request,
        })
    }

    /// Report a scroll position. Returns a ticket when the viewport is
    /// within the threshold of the bottom and a fetch is allowed.
    pub fn on_scroll(&mut self, metrics: ScrollMetrics) -> Option<PageTicket> {
        if self.last_scroll_top == Some(metrics.scroll_top) {
            return None;
        }
        self.last_scroll_top = Some(metrics.scroll_top);
        if metrics.distance_from_bottom() >= self.threshold {
            return None;
        }
        let ticket = self.request_next()?;
        debug!(cursor = ticket.request.cursor(), "scroll near bottom, fetching next page");
        Some(ticket)
    }

    /// Apply the result for `ticket`.
    pub fn complete(
        &mut self,
        ticket: PageTicket,
        result: Result<PageResult, ClientError>,
    ) -> FetchOutcome {
        if ticket.epoch != self.epoch {
            debug!(
                ticket_epoch = ticket.epoch,
                epoch = self.epoch,
                "discarding page for a previous filter"
            );
            return FetchOutcome::Stale;
        }
        self.in_flight = false;

        let page = match result {
            Ok(page) => page,
            Err(e) => {
                warn!("Failed to load page {}: {e}", ticket.request.cursor());
                return FetchOutcome::Failed(e);
            }
        };

        let added = page.items.len();
        self.has_more = added == self.page_size as usize;
        self.total = Some(page.total_matches);
        if added > 0 {
            self.records.extend(page.items);
            self.cursor += 1;
        }
        FetchOutcome::Appended {
            added,
            has_more: self.has_more,
        }
    }

    /// Fetch `ticket` from `source` and apply the result.
    ///
    /// Borrows the coordinator for the whole round trip, so it suits a single
    /// sequential caller. A view that must change the filter while a page is
    /// in flight calls [`PageSource::fetch_page`] itself and hands the result
    /// to [`complete`](Self::complete).
    pub async fn drive<S: PageSource>(&mut self, source: &S, ticket: PageTicket) -> FetchOutcome {
        let result = source.fetch_page(&ticket.request).await;
        self.complete(ticket, result)
    }

    /// Field rules plus a duplicate check against the rows loaded so far.
    /// Only a subset may be loaded, so the server still checks on write.
    pub fn precheck(&self, candidate: &Record) -> Result<(), Precheck> {
        validate_record(candidate).map_err(Precheck::Invalid)?;
        match find_duplicate(&self.records, candidate) {
            Some(dup) => Err(Precheck::Duplicate(dup)),
            None => Ok(()),
        }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    /// Matches reported by the server for the current filter, once known.
    pub fn total(&self) -> Option<u64> {
        self.total
    }

    /// Page number the next request will ask for.
    pub fn cursor(&self) -> u32 {
        self.cursor
    }

    pub fn filter(&self) -> Option<&str> {
        self.filter.as_deref()
    }
}
