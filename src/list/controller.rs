//! Paginated List Controller
//!
//! Drives one table or scrolling list view. Every load sends two requests
//! concurrently with the same filter: a detail request (`count: false`, with
//! start/limit/sort) and a count request (`count: true`, start and limit 0).
//! Results are applied only if no newer load or reset was issued meanwhile.

use super::page::{list_body, PageParams, PageState, ResponsePaths, DEFAULT_PAGE_LIMIT};
use super::sort::{SortController, SortDirection, SortState};
use crate::api::Transport;
use crate::error::ListResult;
use crate::filter::{
    ComposeOptions, DeleteOption, FilterComposer, FilterSet, PropertyRegistry, Rule, SearchChip,
    SearchOptions, SearchState,
};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

/// How fetched details are applied to the list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    Replace,
    Append,
}

#[derive(Debug, Clone)]
pub struct ListOptions {
    pub limit: u64,
    pub default_sort: SortState,
    /// Issue the count request; without it "has more" means "last page was full"
    pub enable_count: bool,
    pub paths: ResponsePaths,
    /// Rules the view starts with
    pub base_rules: Vec<Rule>,
    /// Applied to the base rules, e.g. drop `bk_biz_id = "all"`
    pub delete_option: Option<DeleteOption>,
    /// Extra top-level fields sent with every request
    pub extension: Map<String, Value>,
    pub composer: FilterComposer,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_LIMIT,
            default_sort: SortState::default(),
            enable_count: true,
            paths: ResponsePaths::default(),
            base_rules: Vec::new(),
            delete_option: None,
            extension: Map::new(),
            composer: FilterComposer::default(),
        }
    }
}

struct ListState<T> {
    list: Vec<T>,
    page: PageState,
    filter: FilterSet,
    sort: SortController,
    search: SearchState,
    last_page_full: bool,
}

impl<T> ListState<T> {
    fn has_more(&self, enable_count: bool) -> bool {
        if enable_count {
            (self.list.len() as u64) < self.page.count
        } else {
            self.last_page_full
        }
    }
}

/// Counts a load as in flight until dropped
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Holds the scroll lock until dropped
struct ScrollLock<'a>(&'a AtomicBool);

impl<'a> ScrollLock<'a> {
    fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for ScrollLock<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct ListController<T = Value> {
    transport: Arc<dyn Transport>,
    url: String,
    options: ListOptions,
    properties: Arc<PropertyRegistry>,
    search_options: SearchOptions,
    state: Mutex<ListState<T>>,
    generation: AtomicU64,
    in_flight: AtomicUsize,
    scrolling: AtomicBool,
}

impl<T> ListController<T>
where
    T: DeserializeOwned + Clone + Send + 'static,
{
    pub fn new(transport: Arc<dyn Transport>, url: impl Into<String>, options: ListOptions) -> Self {
        let compose_options = ComposeOptions {
            delete_option: options.delete_option.clone(),
            difference_fields: Vec::new(),
        };
        let rules = options
            .composer
            .compose(&options.base_rules, &[], &compose_options);

        let state = ListState {
            list: Vec::new(),
            page: PageState::new(options.limit),
            filter: FilterSet::and(rules),
            sort: SortController::new(options.default_sort.clone()),
            search: SearchState::new(),
            last_page_full: false,
        };

        Self {
            transport,
            url: url.into(),
            options,
            properties: Arc::new(PropertyRegistry::default()),
            search_options: SearchOptions::default(),
            state: Mutex::new(state),
            generation: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            scrolling: AtomicBool::new(false),
        }
    }

    /// Properties used to resolve search chip operators and values
    pub fn with_properties(mut self, properties: Arc<PropertyRegistry>) -> Self {
        self.properties = properties;
        self
    }

    pub fn with_search_options(mut self, options: SearchOptions) -> Self {
        self.search_options = options;
        self
    }

    // =========================================================================
    // Observed state
    // =========================================================================

    pub fn list(&self) -> Vec<T> {
        self.state.lock().list.clone()
    }

    pub fn len(&self) -> usize {
        self.state.lock().list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().list.is_empty()
    }

    pub fn count(&self) -> u64 {
        self.state.lock().page.count
    }

    pub fn page(&self) -> PageState {
        self.state.lock().page
    }

    pub fn filter(&self) -> FilterSet {
        self.state.lock().filter.clone()
    }

    pub fn sort(&self) -> SortState {
        self.state.lock().sort.current().clone()
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }

    pub fn has_more(&self) -> bool {
        self.state.lock().has_more(self.options.enable_count)
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Merge `custom_rules` into the filter and load the current page
    pub async fn load(&self, custom_rules: &[Rule], mode: LoadMode) -> ListResult<()> {
        if !custom_rules.is_empty() {
            self.compose_into_filter(custom_rules, &ComposeOptions::default());
        }
        self.fetch(mode).await
    }

    /// Compose rules with explicit options (delete flag, removed facets), go
    /// back to the first page and reload
    pub async fn apply_rules(&self, rules: &[Rule], options: &ComposeOptions) -> ListResult<()> {
        self.compose_into_filter(rules, options);
        self.state.lock().page.start = 0;
        self.fetch(LoadMode::Replace).await
    }

    /// Apply search-select chips; fields whose chips were removed are dropped
    pub async fn search(&self, chips: &[SearchChip]) -> ListResult<()> {
        {
            let mut state = self.state.lock();
            let update = state
                .search
                .update(chips, &self.search_options, &self.properties);
            let options = ComposeOptions::default().with_difference_fields(update.difference_fields);
            state.filter.rules = self
                .options
                .composer
                .compose(&update.rules, &state.filter.rules, &options);
            state.page.start = 0;
        }
        self.fetch(LoadMode::Replace).await
    }

    /// Replace, insert or (with `None`) remove the externally injected rule
    /// for `field`, then reload from the first page
    pub async fn set_scope_rule(&self, field: &str, rule: Option<Rule>) -> ListResult<()> {
        {
            let mut state = self.state.lock();
            let idx = state
                .filter
                .rules
                .iter()
                .position(|r| r.subject() == Some(field));
            match (idx, rule) {
                (Some(i), Some(rule)) => state.filter.rules[i] = rule,
                (None, Some(rule)) => state.filter.rules.push(rule),
                (Some(i), None) => {
                    state.filter.rules.remove(i);
                }
                (None, None) => {}
            }
            state.page.start = 0;
        }
        self.fetch(LoadMode::Replace).await
    }

    /// Append the next page. Returns `false` without fetching when everything
    /// is loaded or another scroll load is still in flight.
    pub async fn scroll_to_end(&self) -> ListResult<bool> {
        let Some(_scroll) = ScrollLock::try_acquire(&self.scrolling) else {
            tracing::trace!("Scroll load already in flight");
            return Ok(false);
        };

        let next_start = {
            let mut state = self.state.lock();
            if !state.has_more(self.options.enable_count) {
                return Ok(false);
            }
            state.page.start = state.page.start.saturating_add(state.page.limit);
            state.page.start
        };

        match self.fetch(LoadMode::Append).await {
            Ok(()) => Ok(true),
            Err(err) => {
                // let the next scroll retry the same page
                let mut state = self.state.lock();
                if state.page.start == next_start {
                    state.page.start -= state.page.limit;
                }
                Err(err)
            }
        }
    }

    /// Clear the list and restore the initial page window. Loads issued
    /// before the reset are discarded when they complete.
    pub fn reset(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        state.list.clear();
        state.page = PageState::new(self.options.limit);
        state.last_page_full = false;
    }

    pub async fn refresh(&self) -> ListResult<()> {
        self.reset();
        self.fetch(LoadMode::Replace).await
    }

    /// Table header sort; `SortDirection::None` restores the default sort
    pub async fn handle_sort(&self, field: &str, direction: SortDirection) -> ListResult<()> {
        {
            let mut state = self.state.lock();
            state.sort.set_sort(field, direction);
            state.page.start = 0;
        }
        self.fetch(LoadMode::Replace).await
    }

    /// Jump to a zero-based page (classic paginated table)
    pub async fn set_page(&self, page_index: u64) -> ListResult<()> {
        {
            let mut state = self.state.lock();
            state.page.start = page_index.saturating_mul(state.page.limit);
        }
        self.fetch(LoadMode::Replace).await
    }

    /// Change the page size and go back to the first page
    pub async fn set_limit(&self, limit: u64) -> ListResult<()> {
        {
            let mut state = self.state.lock();
            state.page.limit = limit.max(1);
            state.page.start = 0;
        }
        self.fetch(LoadMode::Replace).await
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn compose_into_filter(&self, rules: &[Rule], options: &ComposeOptions) {
        let mut state = self.state.lock();
        state.filter.rules = self
            .options
            .composer
            .compose(rules, &state.filter.rules, options);
    }

    async fn fetch(&self, mode: LoadMode) -> ListResult<()> {
        let _loading = InFlight::enter(&self.in_flight);
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let (filter, details_page) = {
            let state = self.state.lock();
            (
                state.filter.clone().merge_duplicate_fields(),
                PageParams::details(state.page.start, state.page.limit, Some(state.sort.current())),
            )
        };

        let request_id = Uuid::new_v4();
        let span = tracing::debug_span!("list_load", %request_id, url = %self.url, ?mode);

        async move {
            tracing::debug!(
                "Loading start={} limit={} rules={}",
                details_page.start,
                details_page.limit,
                filter.rules.len()
            );

            let details_body = list_body(&filter, &details_page, &self.options.extension)?;
            let details = async {
                let response = self.transport.post(&self.url, &details_body).await?;
                self.options.paths.details_from::<T>(&response)
            };

            let (details, count) = if self.options.enable_count {
                let count_body = list_body(&filter, &PageParams::count_only(), &self.options.extension)?;
                let count = async {
                    let response = self.transport.post(&self.url, &count_body).await?;
                    self.options.paths.count_from(&response)
                };
                let (details, count) = tokio::try_join!(details, count)?;
                (details, Some(count))
            } else {
                (details.await?, None)
            };

            self.apply(generation, mode, details_page.limit, details, count);
            ListResult::Ok(())
        }
        .instrument(span)
        .await
        .inspect_err(|err| tracing::warn!("List load failed: {}", err))
    }

    fn apply(&self, generation: u64, mode: LoadMode, limit: u64, details: Vec<T>, count: Option<u64>) {
        if self.generation.load(Ordering::SeqCst) != generation {
            tracing::debug!("Discarding stale load (generation {})", generation);
            return;
        }

        let mut state = self.state.lock();
        state.last_page_full = details.len() as u64 >= limit;
        match mode {
            LoadMode::Replace => state.list = details,
            LoadMode::Append => state.list.extend(details),
        }
        state.page.count = count.unwrap_or(state.list.len() as u64);
        tracing::debug!("Loaded {} of {} items", state.list.len(), state.page.count);
    }
}
