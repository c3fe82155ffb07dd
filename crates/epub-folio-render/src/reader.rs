//! Reading position state machine over paginated chapters.
//!
//! Every operation takes the current page count per chapter (spine order),
//! as produced by [`crate::RenderEngine::paginate_book`]. Chapters with zero
//! pages are stepped over.

use serde::{Deserialize, Serialize};

/// Where a backward step across a chapter boundary lands.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackwardPolicy {
    /// Last page of the previous chapter.
    #[default]
    LastPage,
    /// First page of the previous chapter.
    FirstPage,
}

/// Current `(chapter, page)` of a reader.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReadingPosition {
    /// Chapter index in spine order.
    pub chapter: usize,
    /// Page index within the chapter.
    pub page: usize,
    /// Backward chapter-boundary behavior.
    #[serde(default)]
    pub policy: BackwardPolicy,
}

impl ReadingPosition {
    /// Position at `(chapter, page)` with the default policy.
    pub fn new(chapter: usize, page: usize) -> Self {
        Self {
            chapter,
            page,
            policy: BackwardPolicy::default(),
        }
    }

    /// Set the backward chapter-boundary policy.
    pub fn with_policy(mut self, policy: BackwardPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Advance one page. Returns `false` (and stays put) on the last page of
    /// the last non-empty chapter.
    pub fn next(&mut self, page_counts: &[usize]) -> bool {
        let count = page_count(page_counts, self.chapter);
        if self.page + 1 < count {
            self.page += 1;
            return true;
        }
        match (self.chapter + 1..page_counts.len()).find(|&c| page_counts[c] > 0) {
            Some(chapter) => {
                self.chapter = chapter;
                self.page = 0;
                true
            }
            None => false,
        }
    }

    /// Step back one page. Returns `false` (and stays put) on the first page
    /// of the first non-empty chapter.
    pub fn previous(&mut self, page_counts: &[usize]) -> bool {
        if self.page > 0 {
            self.page = self.page.min(page_count(page_counts, self.chapter)).saturating_sub(1);
            return true;
        }
        let end = self.chapter.min(page_counts.len());
        match (0..end).rev().find(|&c| page_counts[c] > 0) {
            Some(chapter) => {
                self.chapter = chapter;
                self.page = match self.policy {
                    BackwardPolicy::LastPage => page_counts[chapter] - 1,
                    BackwardPolicy::FirstPage => 0,
                };
                true
            }
            None => false,
        }
    }

    /// Jump to the first page of `chapter`. Returns `false` for an unknown
    /// chapter.
    pub fn go_to_chapter(&mut self, chapter: usize, page_counts: &[usize]) -> bool {
        if chapter >= page_counts.len() {
            return false;
        }
        self.chapter = chapter;
        self.page = 0;
        true
    }

    /// Pull the position back into range after re-pagination.
    pub fn clamp(&mut self, page_counts: &[usize]) {
        if page_counts.is_empty() {
            *self = Self::new(0, 0).with_policy(self.policy);
            return;
        }
        if self.chapter >= page_counts.len() {
            self.chapter = page_counts.len() - 1;
            self.page = usize::MAX;
        }
        self.page = self.page.min(page_counts[self.chapter].saturating_sub(1));
    }

    /// Global page index across all chapters.
    pub fn global_page(&self, page_counts: &[usize]) -> usize {
        let before: usize = page_counts.iter().take(self.chapter).sum();
        before + self.page
    }

    /// Fraction of the book read, `0.0..=1.0`. The last page reports `1.0`.
    pub fn progress(&self, page_counts: &[usize]) -> f32 {
        let total: usize = page_counts.iter().sum();
        if total <= 1 {
            return if total == 1 { 1.0 } else { 0.0 };
        }
        let global = self.global_page(page_counts).min(total - 1);
        global as f32 / (total - 1) as f32
    }
}

fn page_count(page_counts: &[usize], chapter: usize) -> usize {
    page_counts.get(chapter).copied().unwrap_or(0)
}
