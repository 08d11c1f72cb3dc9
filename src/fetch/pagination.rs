use futures_util::stream::{self, Stream, TryStreamExt};
use std::future::Future;

/// Position of one page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCursor {
    pub offset: usize,
    pub size: usize,
}

/// Describes how to walk an offset- or page-numbered listing.
///
/// A `Pager` is `Copy`; calling [`pages`] again with the same pager restarts
/// the walk from the first page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pager {
    pub start: usize,
    pub step: usize,
    pub size: usize,
    pub max_pages: Option<usize>,
}

impl Pager {
    /// `start`, `start + size`, ... as used by offset based listings.
    pub fn offset(start: usize, size: usize) -> Self {
        Self {
            start,
            step: size,
            size,
            max_pages: None,
        }
    }

    /// Page numbers `1, 2, 3, ...`.
    pub fn numbered(size: usize) -> Self {
        Self {
            start: 1,
            step: 1,
            size,
            max_pages: None,
        }
    }

    pub fn max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = Some(max_pages);
        self
    }

    fn first(&self) -> PageCursor {
        PageCursor {
            offset: self.start,
            size: self.size,
        }
    }

    fn next(&self, cursor: PageCursor) -> PageCursor {
        PageCursor {
            offset: cursor.offset + self.step,
            size: self.size,
        }
    }
}

/// Lazily requests pages until one comes back empty. An error is yielded once
/// and ends the sequence.
pub fn pages<T, E, F, Fut>(pager: Pager, fetch: F) -> impl Stream<Item = Result<Vec<T>, E>>
where
    F: FnMut(PageCursor) -> Fut,
    Fut: Future<Output = Result<Vec<T>, E>>,
{
    stream::unfold(Some((pager.first(), fetch, 0usize)), move |state| async move {
        let (cursor, mut fetch, fetched) = state?;
        if pager.max_pages.is_some_and(|max| fetched >= max) {
            return None;
        }

        match fetch(cursor).await {
            Ok(page) if page.is_empty() => None,
            Ok(page) => Some((Ok(page), Some((pager.next(cursor), fetch, fetched + 1)))),
            Err(err) => Some((Err(err), None)),
        }
    })
}

pub async fn collect_pages<T, E, F, Fut>(pager: Pager, fetch: F) -> Result<Vec<T>, E>
where
    F: FnMut(PageCursor) -> Fut,
    Fut: Future<Output = Result<Vec<T>, E>>,
{
    pages(pager, fetch).try_concat().await
}
