//! Archive access over HTTPS directory indexes.

use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use reqwest::Client;
use tracing::{debug, instrument};

use super::{ArchiveConnector, ArchiveSession};
use crate::error::TransportError;

/// Settings for [`HttpArchive`].
#[derive(Debug, Clone)]
pub struct HttpArchiveConfig {
    /// Archive root, e.g. `https://opendata.dwd.de/`
    pub base_url: String,
    /// Whole-request timeout (covers the body download)
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for HttpArchiveConfig {
    fn default() -> Self {
        Self {
            base_url: "https://opendata.dwd.de/".to_string(),
            request_timeout: Duration::from_secs(600), // 10 minutes
            connect_timeout: Duration::from_secs(30),
        }
    }
}

/// Archive served as Apache-style directory index pages.
pub struct HttpArchive {
    client: Client,
    base_url: String,
}

impl HttpArchive {
    pub fn new(config: HttpArchiveConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(1)
            .tcp_nodelay(true)
            .user_agent(concat!("nwp-fetcher/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::Connect {
                url: config.base_url.clone(),
                reason: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: with_trailing_slash(&config.base_url),
        })
    }
}

#[async_trait]
impl ArchiveConnector for HttpArchive {
    type Session = HttpSession;

    async fn connect(&self) -> Result<HttpSession, TransportError> {
        let connect_error = |reason: String| TransportError::Connect {
            url: self.base_url.clone(),
            reason,
        };

        let response = self
            .client
            .head(&self.base_url)
            .send()
            .await
            .map_err(|e| connect_error(e.to_string()))?;

        if !response.status().is_success() {
            return Err(connect_error(format!("HTTP {}", response.status())));
        }

        debug!(url = %self.base_url, "Archive reachable");
        Ok(HttpSession {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            cwd: self.base_url.clone(),
        })
    }
}

/// One logical session; HTTP itself is stateless, so this tracks the working directory.
pub struct HttpSession {
    client: Client,
    base_url: String,
    cwd: String,
}

#[async_trait]
impl ArchiveSession for HttpSession {
    async fn change_dir(&mut self, path: &str) -> Result<(), TransportError> {
        let url = with_trailing_slash(&format!(
            "{}{}",
            self.base_url,
            path.trim_start_matches('/')
        ));
        let navigate_error = |reason: String| TransportError::Navigate {
            path: path.to_string(),
            reason,
        };

        let response = self
            .client
            .head(&url)
            .send()
            .await
            .map_err(|e| navigate_error(e.to_string()))?;

        if !response.status().is_success() {
            return Err(navigate_error(format!("HTTP {}", response.status())));
        }

        self.cwd = url;
        Ok(())
    }

    async fn list(&mut self) -> Result<Vec<String>, TransportError> {
        let listing_error = |reason: String| TransportError::Listing {
            path: self.cwd.clone(),
            reason,
        };

        let response = self
            .client
            .get(&self.cwd)
            .send()
            .await
            .map_err(|e| listing_error(e.to_string()))?;

        if !response.status().is_success() {
            return Err(listing_error(format!("HTTP {}", response.status())));
        }

        let body = response
            .text()
            .await
            .map_err(|e| listing_error(e.to_string()))?;

        Ok(parse_index_listing(&body))
    }

    #[instrument(skip(self), fields(dir = %self.cwd))]
    async fn retrieve(&mut self, name: &str) -> Result<Bytes, TransportError> {
        let url = format!("{}{}", self.cwd, name);
        let retrieve_error = |reason: String| TransportError::Retrieve {
            name: name.to_string(),
            reason,
        };

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| retrieve_error(e.to_string()))?;

        if !response.status().is_success() {
            return Err(retrieve_error(format!("HTTP {}", response.status())));
        }

        let expected = response.content_length();
        let mut buffer = BytesMut::with_capacity(expected.unwrap_or(0) as usize);
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| retrieve_error(e.to_string()))?;
            buffer.extend_from_slice(&chunk);
        }

        let received = buffer.len() as u64;
        if let Some(expected) = expected {
            if received != expected {
                return Err(TransportError::Incomplete {
                    name: name.to_string(),
                    expected,
                    received,
                });
            }
        }

        Ok(buffer.freeze())
    }

    async fn quit(&mut self) -> Result<(), TransportError> {
        // Nothing to close server-side; pooled connections drop with the client
        self.cwd = self.base_url.clone();
        Ok(())
    }
}

/// File names linked from a directory index page, in page order.
///
/// Sort links (`?C=M;O=A`), the parent link, absolute links and
/// subdirectories are skipped.
pub fn parse_index_listing(html: &str) -> Vec<String> {
    const HREF: &str = "href=\"";

    let mut names = Vec::new();
    let mut rest = html;
    while let Some(start) = rest.find(HREF) {
        rest = &rest[start + HREF.len()..];
        let Some(end) = rest.find('"') else {
            break;
        };
        let target = &rest[..end];
        rest = &rest[end..];

        let skip = target.is_empty()
            || target.starts_with('?')
            || target.starts_with('/')
            || target.starts_with("..")
            || target.contains("://")
            || target.ends_with('/');
        if !skip {
            names.push(target.to_string());
        }
    }
    names
}

fn with_trailing_slash(url: &str) -> String {
    if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{}/", url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INDEX: &str = r#"<html>
<head><title>Index of /weather/nwp/icon-eu/grib/06/tot_prec/</title></head>
<body>
<h1>Index of /weather/nwp/icon-eu/grib/06/tot_prec/</h1><hr><pre><a href="../">../</a>
<a href="icon-eu_europe_icosahedral_single-level_2023010106_000_TOT_PREC.grib2.bz2">icon-eu_europe_icosahedral_single-level_2023010106_000_TOT_PREC.grib2.bz2</a> 01-Jan-2023 08:52  5123
<a href="icon-eu_europe_regular-lat-lon_single-level_2023010106_000_TOT_PREC.grib2.bz2">icon-eu_europe_regular-lat-lon_single-level_2023010106_000_TOT_PREC.grib2.bz2</a> 01-Jan-2023 08:52  4211
<a href="icon-eu_europe_regular-lat-lon_single-level_2023010106_001_TOT_PREC.grib2.bz2">icon-eu_europe_regular-lat-lon_single-level_2023010106_001_TOT_PREC.grib2.bz2</a> 01-Jan-2023 08:53  80415
</pre><hr></body>
</html>"#;

    #[test]
    fn test_parse_index_listing() {
        let names = parse_index_listing(INDEX);
        assert_eq!(names.len(), 3);
        assert!(names[0].contains("icosahedral"));
        assert_eq!(
            names[2],
            "icon-eu_europe_regular-lat-lon_single-level_2023010106_001_TOT_PREC.grib2.bz2"
        );
    }

    #[test]
    fn test_parse_index_skips_navigation_links() {
        let html = r#"<a href="?C=N;O=D">Name</a><a href="/weather/">up</a>
<a href="subdir/">subdir/</a><a href="https://example.org/x">x</a><a href="file.bz2">f</a>"#;
        assert_eq!(parse_index_listing(html), vec!["file.bz2".to_string()]);
    }

    #[test]
    fn test_trailing_slash() {
        assert_eq!(with_trailing_slash("https://opendata.dwd.de"), "https://opendata.dwd.de/");
        assert_eq!(with_trailing_slash("https://opendata.dwd.de/"), "https://opendata.dwd.de/");
    }

    #[test]
    fn test_client_builds_with_defaults() {
        let archive = HttpArchive::new(HttpArchiveConfig::default()).unwrap();
        assert_eq!(archive.base_url, "https://opendata.dwd.de/");
    }
}
