//! Remote file listing.

use tracing::{debug, info};

use crate::archive::{ArchiveConnector, ArchiveSession};
use crate::connection::ConnectionManager;
use crate::error::TransportError;

/// Lists the working directory and keeps the files of one grid resolution.
#[derive(Debug, Clone)]
pub struct FileCatalog {
    grid_marker: String,
}

impl FileCatalog {
    /// `grid_marker` is a substring every wanted name contains, e.g. "regular".
    pub fn new(grid_marker: impl Into<String>) -> Self {
        Self {
            grid_marker: grid_marker.into(),
        }
    }

    /// List the current directory, retrying through the connection manager.
    pub async fn fetch<C: ArchiveConnector>(
        &self,
        connection: &mut ConnectionManager<'_, C>,
    ) -> Result<Vec<String>, TransportError> {
        let mut failures = 0;
        let names = loop {
            let result = connection.session()?.list().await;
            match result {
                Ok(names) => break names,
                Err(e) => {
                    failures += 1;
                    connection.recover("list", failures, e).await?;
                }
            }
        };

        let total = names.len();
        let selected = self.filter(names);
        info!(
            listed = total,
            selected = selected.len(),
            marker = %self.grid_marker,
            "Listed forecast files"
        );
        Ok(selected)
    }

    /// Keep names containing the grid marker, in listing order.
    pub fn filter(&self, names: Vec<String>) -> Vec<String> {
        names
            .into_iter()
            .filter(|name| {
                let keep = name.contains(&self.grid_marker);
                if !keep {
                    debug!(name = %name, "Skipping file on another grid");
                }
                keep
            })
            .collect()
    }
}

impl Default for FileCatalog {
    fn default() -> Self {
        Self::new("regular")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_keeps_listing_order() {
        let names = vec![
            "icon-eu_europe_regular-lat-lon_single-level_2023010100_002_TOT_PREC.grib2.bz2",
            "icon-eu_europe_icosahedral_single-level_2023010100_000_TOT_PREC.grib2.bz2",
            "icon-eu_europe_regular-lat-lon_single-level_2023010100_000_TOT_PREC.grib2.bz2",
        ]
        .into_iter()
        .map(String::from)
        .collect();

        let selected = FileCatalog::default().filter(names);
        assert_eq!(selected.len(), 2);
        assert!(selected[0].contains("_002_"));
        assert!(selected[1].contains("_000_"));
    }

    #[test]
    fn test_custom_marker() {
        let names = vec!["a_rotated-lat-lon_1".to_string(), "a_regular_1".to_string()];
        assert_eq!(
            FileCatalog::new("rotated").filter(names),
            vec!["a_rotated-lat-lon_1".to_string()]
        );
    }
}
