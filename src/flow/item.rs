//! Item harvester.
//!
//! Turns one listing row into a [`HarvestRecord`]: a real download saved
//! under the target directory, or a dry-run name built from the row's delete
//! identifier.

use std::path::Path;

use crate::config::{DownloadMode, SiteProfile};
use crate::external_deps::browser::PageSession;

use super::error::{HarvestError, HarvestResult};
use super::types::{DRY_RUN_EXTENSION, HarvestRecord, ItemRow};

pub struct ItemHarvester<'a> {
    site: &'a SiteProfile,
}

impl<'a> ItemHarvester<'a> {
    pub fn new(site: &'a SiteProfile) -> Self {
        Self { site }
    }

    pub async fn harvest(
        &self,
        page: &mut dyn PageSession,
        row: &ItemRow,
        mode: &DownloadMode,
    ) -> HarvestResult<HarvestRecord> {
        let filename = match mode {
            DownloadMode::Persist(dir) => self.download(page, row, dir).await?,
            DownloadMode::DryRun => self.dry_run_name(page, row).await?,
        };
        Ok(HarvestRecord::new(row.title.clone(), filename))
    }

    async fn download(
        &self,
        page: &mut dyn PageSession,
        row: &ItemRow,
        dir: &Path,
    ) -> HarvestResult<String> {
        let control = row.handle.download.as_ref().ok_or_else(|| {
            HarvestError::LocatorNotFound(format!("{} for '{}'", self.site.row_download, row.title))
        })?;

        let download = page.click_for_download(control).await?;
        let filename = safe_filename(download.suggested_filename())?;
        download.save_as(&dir.join(&filename)).await?;
        download.delete()?;

        log::info!("saved '{}' as {filename}", row.title);
        Ok(filename)
    }

    /// Approximates the download name as `<delete id>.pdf` without any
    /// transfer. Not guaranteed to match the server's suggested name.
    async fn dry_run_name(&self, page: &mut dyn PageSession, row: &ItemRow) -> HarvestResult<String> {
        let control = row.handle.delete.as_ref().ok_or_else(|| {
            HarvestError::LocatorNotFound(format!("{} for '{}'", self.site.row_delete, row.title))
        })?;

        let id = page
            .attribute(control, &self.site.delete_id_attribute)
            .await?
            .ok_or_else(|| {
                HarvestError::LocatorNotFound(format!(
                    "attribute `{}` for '{}'",
                    self.site.delete_id_attribute, row.title
                ))
            })?;

        log::info!("dry run: '{}' would be {id}{DRY_RUN_EXTENSION}", row.title);
        Ok(format!("{id}{DRY_RUN_EXTENSION}"))
    }
}

/// Final path component of a server-suggested name.
fn safe_filename(suggested: &str) -> HarvestResult<String> {
    let normalized = suggested.replace('\\', "/");
    normalized
        .rsplit('/')
        .next()
        .map(str::trim)
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")
        .map(str::to_string)
        .ok_or_else(|| HarvestError::Download(format!("unusable suggested filename '{suggested}'")))
}
