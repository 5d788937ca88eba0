//! Fixed offline catalog served whenever the content store cannot be reached.
//!
//! The catalog is read-only seed data. It is not a cache of earlier remote
//! reads and nothing in the session layer ever writes to it.

use std::collections::BTreeMap;

use shared::{
    domain::{Lesson, PageId},
    protocol::PageRecord,
};

mod seed;

/// Read side of a content source, shaped like the remote one so either can
/// stand in for the other in tests.
pub trait FallbackCatalog: Send + Sync {
    /// The full lesson tree. Callers rely on this being non-empty for the
    /// default catalog.
    fn lessons(&self) -> Vec<Lesson>;

    fn page(&self, page_id: &PageId) -> Option<PageRecord>;
}

#[derive(Debug, Clone)]
pub struct SeedCatalog {
    lessons: Vec<Lesson>,
    pages: BTreeMap<PageId, PageRecord>,
}

impl SeedCatalog {
    pub fn new(lessons: Vec<Lesson>, pages: impl IntoIterator<Item = PageRecord>) -> Self {
        Self {
            lessons,
            pages: pages
                .into_iter()
                .map(|page| (page.id.clone(), page))
                .collect(),
        }
    }

    pub fn page_ids(&self) -> impl Iterator<Item = &PageId> {
        self.pages.keys()
    }
}

impl Default for SeedCatalog {
    fn default() -> Self {
        Self::new(seed::lessons(), seed::pages())
    }
}

impl FallbackCatalog for SeedCatalog {
    fn lessons(&self) -> Vec<Lesson> {
        self.lessons.clone()
    }

    fn page(&self, page_id: &PageId) -> Option<PageRecord> {
        self.pages.get(page_id).cloned()
    }
}

/// Catalog with nothing in it, for exercising the not-found paths.
pub struct EmptyCatalog;

impl FallbackCatalog for EmptyCatalog {
    fn lessons(&self) -> Vec<Lesson> {
        Vec::new()
    }

    fn page(&self, _page_id: &PageId) -> Option<PageRecord> {
        None
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
