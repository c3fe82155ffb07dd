//! Page cache, last-write-wins request tracking and the engine tying them to
//! the [`Paginator`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use epub_folio::{Book, ParsedNode};

use crate::paginate::{LayoutConfig, Page, Paginator, Viewport};

/// Cancellation hook for long-running pagination.
pub trait CancelToken {
    /// True once the work should stop.
    fn is_cancelled(&self) -> bool;
}

/// Never-cancel token for default call paths.
#[derive(Clone, Copy, Debug, Default)]
pub struct NeverCancel;

impl CancelToken for NeverCancel {
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Runtime diagnostics from pagination.
#[derive(Clone, Debug, PartialEq)]
pub enum RenderDiagnostic {
    /// A pagination pass observed cancellation and stopped.
    Cancelled,
    /// Pages were served from the cache.
    CacheHit {
        chapter_index: usize,
        page_count: usize,
    },
    /// Pages had to be computed.
    CacheMiss { chapter_index: usize },
    /// The cached viewport changed and all cached chapters were dropped.
    ViewportChanged { from: Viewport, to: Viewport },
    /// A result arrived for a request that is no longer the latest.
    StaleDiscarded {
        chapter_index: usize,
        generation: u64,
        latest: u64,
    },
    /// A result arrived for a viewport that is no longer the current one.
    StaleViewportDiscarded {
        chapter_index: usize,
        viewport: Viewport,
        latest: Viewport,
    },
    /// A worker thread panicked; its chapters were not paginated.
    WorkerPanicked { chapter_count: usize },
}

/// Pagination failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RenderEngineError {
    /// Pagination was cancelled.
    Cancelled,
    /// A newer request superseded this one.
    Stale {
        chapter_index: usize,
        generation: u64,
        latest: u64,
    },
    /// The request was for a viewport that has since been replaced.
    StaleViewport {
        chapter_index: usize,
        viewport: Viewport,
        latest: Viewport,
    },
}

impl RenderEngineError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Cancelled => "PAGINATION_CANCELLED",
            Self::Stale { .. } => "PAGINATION_STALE",
            Self::StaleViewport { .. } => "PAGINATION_STALE_VIEWPORT",
        }
    }
}

impl fmt::Display for RenderEngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => write!(f, "pagination cancelled"),
            Self::Stale {
                chapter_index,
                generation,
                latest,
            } => write!(
                f,
                "stale pagination for chapter {} (request {} superseded by {})",
                chapter_index, generation, latest
            ),
            Self::StaleViewport {
                chapter_index,
                viewport,
                latest,
            } => write!(
                f,
                "stale pagination for chapter {} ({}x{} replaced by {}x{})",
                chapter_index,
                viewport.width_px,
                viewport.height_px,
                latest.width_px,
                latest.height_px
            ),
        }
    }
}

impl std::error::Error for RenderEngineError {}

/// Per-chapter pages for a single viewport.
///
/// Entries are replaced, never edited. Storing pages for a different
/// viewport drops every entry first.
#[derive(Clone, Debug, Default)]
pub struct PageCache {
    viewport: Option<Viewport>,
    chapters: BTreeMap<usize, Arc<[Page]>>,
}

impl PageCache {
    /// Empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Viewport the cached pages were computed for.
    pub fn viewport(&self) -> Option<Viewport> {
        self.viewport
    }

    /// Cached pages for `chapter_index`, only if computed for `viewport`.
    pub fn get(&self, chapter_index: usize, viewport: Viewport) -> Option<Arc<[Page]>> {
        if self.viewport != Some(viewport) {
            return None;
        }
        self.chapters.get(&chapter_index).cloned()
    }

    /// Store pages, returning the previous viewport when the cache was
    /// reset for a new one.
    pub fn insert(
        &mut self,
        chapter_index: usize,
        viewport: Viewport,
        pages: Arc<[Page]>,
    ) -> Option<Viewport> {
        let reset = match self.viewport {
            Some(current) if current != viewport => {
                self.chapters.clear();
                Some(current)
            }
            _ => None,
        };
        self.viewport = Some(viewport);
        self.chapters.insert(chapter_index, pages);
        reset
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.viewport = None;
        self.chapters.clear();
    }

    /// Number of cached chapters.
    pub fn len(&self) -> usize {
        self.chapters.len()
    }

    /// True when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.chapters.is_empty()
    }

    /// Page count per chapter index in `0..chapter_count`; uncached chapters
    /// count as zero.
    pub fn page_counts(&self, chapter_count: usize) -> Vec<usize> {
        (0..chapter_count)
            .map(|index| self.chapters.get(&index).map_or(0, |pages| pages.len()))
            .collect()
    }
}

/// Handle for one in-flight pagination request.
///
/// Cancelled as soon as a newer request is issued for the same chapter.
#[derive(Clone, Debug)]
pub struct RequestToken {
    chapter_index: usize,
    viewport: Viewport,
    generation: u64,
    latest: Arc<AtomicU64>,
}

impl RequestToken {
    /// Chapter this request paginates.
    pub fn chapter_index(&self) -> usize {
        self.chapter_index
    }

    /// Viewport this request paginates for.
    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Monotonic request number.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// True while no newer request exists for the chapter.
    pub fn is_current(&self) -> bool {
        self.latest.load(Ordering::Acquire) == self.generation
    }
}

impl CancelToken for RequestToken {
    fn is_cancelled(&self) -> bool {
        !self.is_current()
    }
}

/// Issues request tokens; the newest token per chapter wins, and only
/// tokens for the most recently requested viewport are accepted.
#[derive(Debug, Default)]
pub struct PaginationRequests {
    next_generation: u64,
    latest: BTreeMap<usize, Arc<AtomicU64>>,
    viewport: Option<Viewport>,
}

impl PaginationRequests {
    /// No requests issued yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a request, superseding any earlier one for `chapter_index`.
    pub fn issue(&mut self, chapter_index: usize, viewport: Viewport) -> RequestToken {
        self.next_generation = self.next_generation.saturating_add(1);
        let generation = self.next_generation;
        self.viewport = Some(viewport);
        let latest = self
            .latest
            .entry(chapter_index)
            .or_insert_with(|| Arc::new(AtomicU64::new(0)));
        latest.store(generation, Ordering::Release);
        RequestToken {
            chapter_index,
            viewport,
            generation,
            latest: Arc::clone(latest),
        }
    }

    /// Latest generation issued for `chapter_index`.
    pub fn latest(&self, chapter_index: usize) -> Option<u64> {
        self.latest
            .get(&chapter_index)
            .map(|latest| latest.load(Ordering::Acquire))
    }

    /// Viewport of the most recent request or synchronous lookup.
    pub fn viewport(&self) -> Option<Viewport> {
        self.viewport
    }

    /// Record a viewport used outside the request path.
    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = Some(viewport);
    }

    /// Accept `token` only if it is still the newest for its chapter and its
    /// viewport is the current one.
    pub fn check(&self, token: &RequestToken) -> Result<(), RenderEngineError> {
        let latest = self.latest(token.chapter_index).unwrap_or(0);
        if latest != token.generation {
            return Err(RenderEngineError::Stale {
                chapter_index: token.chapter_index,
                generation: token.generation,
                latest,
            });
        }
        match self.viewport {
            Some(current) if current != token.viewport => Err(RenderEngineError::StaleViewport {
                chapter_index: token.chapter_index,
                viewport: token.viewport,
                latest: current,
            }),
            _ => Ok(()),
        }
    }
}

type DiagnosticCallback = Arc<Mutex<Box<dyn FnMut(RenderDiagnostic) + Send + 'static>>>;
type DiagnosticSink = Option<DiagnosticCallback>;

/// Paginator plus cache and request tracking for one open book.
#[derive(Clone, Default)]
pub struct RenderEngine {
    paginator: Paginator,
    cache: PageCache,
    requests: Arc<Mutex<PaginationRequests>>,
    diagnostic_sink: DiagnosticSink,
}

impl fmt::Debug for RenderEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderEngine")
            .field("paginator", &self.paginator)
            .field("cached_chapters", &self.cache.len())
            .finish_non_exhaustive()
    }
}

impl RenderEngine {
    /// Engine with an injected height table.
    pub fn new(config: LayoutConfig) -> Self {
        Self {
            paginator: Paginator::new(config),
            ..Self::default()
        }
    }

    /// Register or replace the diagnostics sink.
    pub fn set_diagnostic_sink<F>(&mut self, sink: F)
    where
        F: FnMut(RenderDiagnostic) + Send + 'static,
    {
        self.diagnostic_sink = Some(Arc::new(Mutex::new(Box::new(sink))));
    }

    fn emit_diagnostic(&self, diagnostic: RenderDiagnostic) {
        let Some(sink) = &self.diagnostic_sink else {
            return;
        };
        if let Ok(mut sink) = sink.lock() {
            sink(diagnostic);
        }
    }

    /// Paginator in use.
    pub fn paginator(&self) -> &Paginator {
        &self.paginator
    }

    /// Current page cache.
    pub fn cache(&self) -> &PageCache {
        &self.cache
    }

    /// Pages for one chapter, from cache when the viewport matches.
    pub fn pages(
        &mut self,
        chapter_index: usize,
        tree: &ParsedNode,
        viewport: Viewport,
    ) -> Arc<[Page]> {
        if let Some(pages) = self.cache.get(chapter_index, viewport) {
            self.emit_diagnostic(RenderDiagnostic::CacheHit {
                chapter_index,
                page_count: pages.len(),
            });
            return pages;
        }
        self.emit_diagnostic(RenderDiagnostic::CacheMiss { chapter_index });
        match self.requests.lock() {
            Ok(mut requests) => requests.set_viewport(viewport),
            Err(poisoned) => poisoned.into_inner().set_viewport(viewport),
        }
        let pages: Arc<[Page]> = self.paginator.paginate(tree, viewport).into();
        self.store(chapter_index, viewport, Arc::clone(&pages));
        pages
    }

    /// Start an asynchronous request for `chapter_index`.
    ///
    /// The returned token is `Send` and doubles as the [`CancelToken`] for
    /// [`Paginator::paginate_with_cancel`] on a worker thread.
    pub fn request(&self, chapter_index: usize, viewport: Viewport) -> RequestToken {
        match self.requests.lock() {
            Ok(mut requests) => requests.issue(chapter_index, viewport),
            Err(poisoned) => poisoned.into_inner().issue(chapter_index, viewport),
        }
    }

    /// Install the result of a request if it is still the latest one.
    ///
    /// Stale results are dropped and reported as
    /// [`RenderDiagnostic::StaleDiscarded`] or
    /// [`RenderDiagnostic::StaleViewportDiscarded`].
    pub fn commit(
        &mut self,
        token: &RequestToken,
        pages: Vec<Page>,
    ) -> Result<Arc<[Page]>, RenderEngineError> {
        let checked = match self.requests.lock() {
            Ok(requests) => requests.check(token),
            Err(poisoned) => poisoned.into_inner().check(token),
        };
        if let Err(err) = checked {
            log::debug!("discarding pages: {}", err);
            match err {
                RenderEngineError::Stale {
                    chapter_index,
                    generation,
                    latest,
                } => self.emit_diagnostic(RenderDiagnostic::StaleDiscarded {
                    chapter_index,
                    generation,
                    latest,
                }),
                RenderEngineError::StaleViewport {
                    chapter_index,
                    viewport,
                    latest,
                } => self.emit_diagnostic(RenderDiagnostic::StaleViewportDiscarded {
                    chapter_index,
                    viewport,
                    latest,
                }),
                RenderEngineError::Cancelled => {}
            }
            return Err(err);
        }
        let pages: Arc<[Page]> = pages.into();
        self.store(token.chapter_index, token.viewport, Arc::clone(&pages));
        Ok(pages)
    }

    /// Paginate one request to completion on the calling thread.
    pub fn run(
        &mut self,
        token: &RequestToken,
        tree: &ParsedNode,
    ) -> Result<Arc<[Page]>, RenderEngineError> {
        match self
            .paginator
            .paginate_with_cancel(tree, token.viewport, token)
        {
            Ok(pages) => self.commit(token, pages),
            Err(err) => {
                self.emit_diagnostic(RenderDiagnostic::Cancelled);
                Err(err)
            }
        }
    }

    /// Paginate every chapter of `book`, filling the cache, and return the
    /// page count per chapter in spine order.
    ///
    /// With `parallel` set, chapters are split over scoped worker threads;
    /// results are committed in chapter order.
    pub fn paginate_book(&mut self, book: &Book, viewport: Viewport, parallel: bool) -> Vec<usize> {
        let chapters = book.chapters();
        let tokens: Vec<RequestToken> = (0..chapters.len())
            .filter(|&index| self.cache.get(index, viewport).is_none())
            .map(|index| self.request(index, viewport))
            .collect();

        let paginator = self.paginator;
        let results: Vec<(RequestToken, Result<Vec<Page>, RenderEngineError>)> =
            if parallel && tokens.len() > 1 {
                let workers = std::thread::available_parallelism()
                    .map_or(1, |n| n.get())
                    .min(tokens.len());
                let chunk = tokens.len().div_ceil(workers);
                std::thread::scope(|scope| {
                    let handles: Vec<_> = tokens
                        .chunks(chunk)
                        .map(|slice| {
                            scope.spawn(move || {
                                slice
                                    .iter()
                                    .map(|token| {
                                        let tree = &chapters[token.chapter_index].tree;
                                        let pages =
                                            paginator.paginate_with_cancel(tree, viewport, token);
                                        (token.clone(), pages)
                                    })
                                    .collect::<Vec<_>>()
                            })
                        })
                        .collect();
                    let mut results = Vec::with_capacity(tokens.len());
                    for (handle, batch) in handles.into_iter().zip(tokens.chunks(chunk)) {
                        match handle.join() {
                            Ok(batch_results) => results.extend(batch_results),
                            Err(_) => {
                                log::error!(
                                    "pagination worker panicked; {} chapters skipped",
                                    batch.len()
                                );
                                self.emit_diagnostic(RenderDiagnostic::WorkerPanicked {
                                    chapter_count: batch.len(),
                                });
                            }
                        }
                    }
                    results
                })
            } else {
                tokens
                    .into_iter()
                    .map(|token| {
                        let tree = &chapters[token.chapter_index].tree;
                        let pages = paginator.paginate_with_cancel(tree, viewport, &token);
                        (token, pages)
                    })
                    .collect()
            };

        for (token, pages) in results {
            match pages {
                Ok(pages) => {
                    if let Err(err) = self.commit(&token, pages) {
                        log::debug!("chapter {} not cached: {}", token.chapter_index, err);
                    }
                }
                Err(_) => self.emit_diagnostic(RenderDiagnostic::Cancelled),
            }
        }
        let counts = self.cache.page_counts(chapters.len());
        log::info!(
            "paginated {} chapters into {} pages at {}x{}",
            chapters.len(),
            counts.iter().sum::<usize>(),
            viewport.width_px,
            viewport.height_px
        );
        counts
    }

    /// Drop all cached pages.
    pub fn invalidate(&mut self) {
        self.cache.clear();
    }

    fn store(&mut self, chapter_index: usize, viewport: Viewport, pages: Arc<[Page]>) {
        if let Some(from) = self.cache.insert(chapter_index, viewport, pages) {
            self.emit_diagnostic(RenderDiagnostic::ViewportChanged { from, to: viewport });
        }
    }
}
