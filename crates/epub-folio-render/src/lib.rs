//! Viewport pagination, page caching and reading state for `epub-folio`.

#![cfg_attr(
    not(test),
    deny(
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::panic_in_result_fn,
        clippy::todo,
        clippy::unimplemented
    )
)]

mod engine;
mod export;
mod paginate;
mod reader;

pub use engine::{
    CancelToken, NeverCancel, PageCache, PaginationRequests, RenderDiagnostic, RenderEngine,
    RenderEngineError, RequestToken,
};
pub use export::{ExportError, PageExport};
pub use paginate::{LayoutConfig, Page, PageNode, PageNodeKind, Paginator, Viewport};
pub use reader::{BackwardPolicy, ReadingPosition};
