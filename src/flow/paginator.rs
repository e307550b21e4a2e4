//! Listing paginator.
//!
//! Produces [`ListingPage`]s lazily, one per call, following the listing's
//! next-page control. The walk ends on the `#` sentinel, on a missing control,
//! on a control whose click loads nothing, or when the optional page bound is
//! reached. An empty page never ends it.

use crate::config::SiteProfile;
use crate::external_deps::browser::{ClickOptions, PageError, PageSession};

use super::error::HarvestResult;
use super::timing::InteractionTiming;
use super::types::{ItemRow, ListingPage, NextPage, RowHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cursor {
    First,
    Next,
    Exhausted,
}

/// Cursor over the uploads listing of one session.
///
/// Restarting requires a new paginator (and in practice a new run).
pub struct ListingPaginator<'a> {
    site: &'a SiteProfile,
    timing: &'a InteractionTiming,
    max_pages: Option<usize>,
    cursor: Cursor,
    pages_read: usize,
}

impl<'a> ListingPaginator<'a> {
    pub fn new(site: &'a SiteProfile, timing: &'a InteractionTiming) -> Self {
        Self {
            site,
            timing,
            max_pages: None,
            cursor: Cursor::First,
            pages_read: 0,
        }
    }

    pub fn with_max_pages(mut self, max_pages: Option<usize>) -> Self {
        self.max_pages = max_pages;
        self
    }

    pub fn pages_read(&self) -> usize {
        self.pages_read
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor == Cursor::Exhausted
    }

    /// Reads the next listing page, or `None` once the walk is over.
    ///
    /// Callers must be done with every row of the previous page: advancing
    /// invalidates their handles.
    pub async fn next_page(
        &mut self,
        page: &mut dyn PageSession,
    ) -> HarvestResult<Option<ListingPage>> {
        if self.cursor == Cursor::Exhausted {
            return Ok(None);
        }
        if self.max_pages.is_some_and(|max| self.pages_read >= max) {
            log::info!("page bound of {} reached", self.pages_read);
            self.cursor = Cursor::Exhausted;
            return Ok(None);
        }

        if self.cursor == Cursor::Next && !self.advance(page).await? {
            self.cursor = Cursor::Exhausted;
            return Ok(None);
        }

        page.wait(self.timing.settle_interval()).await;

        let rows = self.read_rows(page).await?;
        let next = self.read_next(page).await?;
        self.cursor = if next.has_more() {
            Cursor::Next
        } else {
            Cursor::Exhausted
        };
        self.pages_read += 1;

        log::debug!(
            "listing page {} has {} rows, more={}",
            self.pages_read,
            rows.len(),
            next.has_more()
        );
        Ok(Some(ListingPage {
            number: self.pages_read,
            rows,
            next,
        }))
    }

    /// Clicks the next-page control. `false` when it has disappeared or the
    /// click left the current document in place.
    async fn advance(&self, page: &mut dyn PageSession) -> HarvestResult<bool> {
        let control = match page.locate(&self.site.next_page).await {
            Ok(control) => control,
            Err(PageError::LocatorNotFound(_)) => {
                log::warn!("next-page control vanished before advancing");
                return Ok(false);
            }
            Err(err) => return Err(err.into()),
        };
        let before = page.generation();
        page.click(&control, ClickOptions::default()).await?;
        if page.generation() == before {
            log::warn!("next-page control did not load a new page; treating page as last");
            return Ok(false);
        }
        Ok(true)
    }

    async fn read_rows(&self, page: &mut dyn PageSession) -> HarvestResult<Vec<ItemRow>> {
        let handles = page.locate_all(&self.site.listing_row).await?;
        let mut rows = Vec::with_capacity(handles.len());

        for row in handles {
            let title_el = page.locate_within(&row, &self.site.row_title).await?;
            let title = page.inner_text(&title_el).await?;
            let download = optional(page.locate_within(&row, &self.site.row_download).await)?;
            let delete = optional(page.locate_within(&row, &self.site.row_delete).await)?;

            rows.push(ItemRow {
                title,
                handle: RowHandle {
                    row,
                    download,
                    delete,
                },
            });
        }
        Ok(rows)
    }

    async fn read_next(&self, page: &mut dyn PageSession) -> HarvestResult<NextPage> {
        let control = match page.locate(&self.site.next_page).await {
            Ok(control) => control,
            Err(PageError::LocatorNotFound(_)) => {
                log::debug!("no next-page control; treating page as last");
                return Ok(NextPage::Terminal);
            }
            Err(err) => return Err(err.into()),
        };
        let href = page.attribute(&control, "href").await?;
        Ok(NextPage::from_href(href.as_deref()))
    }
}

fn optional<T>(result: Result<T, PageError>) -> Result<Option<T>, PageError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(PageError::LocatorNotFound(_)) => Ok(None),
        Err(err) => Err(err),
    }
}
