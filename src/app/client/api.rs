//! Storefront response shapes and their conversion into domain models
//!
//! Only the fields the downloader needs are declared; everything else in the
//! (large) order documents is ignored by serde.

use chrono::{DateTime, NaiveDateTime};
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::app::hash::{ContentHash, HashAlgorithm};
use crate::app::models::{OrderDetail, OrderKey, Platform, ProductFile};
use crate::errors::{ApiError, ApiResult};

#[derive(Debug, Deserialize)]
pub(crate) struct OrderKeyEntry {
    pub gamekey: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OrderResponse {
    #[serde(default)]
    pub created: Option<String>,
    pub product: ProductInfo,
    #[serde(default)]
    pub subproducts: Vec<Subproduct>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProductInfo {
    pub human_name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Subproduct {
    #[serde(default)]
    pub human_name: String,
    #[serde(default)]
    pub downloads: Vec<DownloadEntry>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DownloadEntry {
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub download_struct: Vec<DownloadStruct>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DownloadStruct {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: Option<DownloadUrls>,
    #[serde(default)]
    pub file_size: Option<u64>,
    #[serde(default)]
    pub md5: Option<String>,
    #[serde(default)]
    pub sha1: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DownloadUrls {
    #[serde(default)]
    pub web: Option<String>,
}

/// Parse the order-list document into order keys
pub(crate) fn parse_order_keys(endpoint: &str, body: &[u8]) -> ApiResult<Vec<OrderKey>> {
    let entries: Vec<OrderKeyEntry> =
        serde_json::from_slice(body).map_err(|e| ApiError::ParseError {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })?;
    Ok(entries
        .into_iter()
        .map(|entry| OrderKey::new(entry.gamekey))
        .collect())
}

/// Parse one order document
pub(crate) fn parse_order_detail(
    endpoint: &str,
    order_key: &OrderKey,
    body: &[u8],
) -> ApiResult<OrderDetail> {
    let parse_error = |reason: String| ApiError::ParseError {
        endpoint: endpoint.to_string(),
        reason,
    };

    let response: OrderResponse =
        serde_json::from_slice(body).map_err(|e| parse_error(e.to_string()))?;

    let mut files = Vec::new();
    for subproduct in &response.subproducts {
        for download in &subproduct.downloads {
            let platform = Platform::from(download.platform.as_str());
            for entry in &download.download_struct {
                let Some(web) = entry.url.as_ref().and_then(|u| u.web.as_deref()) else {
                    debug!(
                        "Skipping {} / {}: no web download",
                        subproduct.human_name, entry.name
                    );
                    continue;
                };

                let url = Url::parse(web)
                    .map_err(|e| parse_error(format!("invalid download URL {}: {}", web, e)))?;

                files.push(ProductFile {
                    display_name: display_name(&url, &subproduct.human_name, &entry.name),
                    platform: platform.clone(),
                    declared_size: entry.file_size.filter(|size| *size > 0),
                    declared_hash: declared_hash(entry),
                    sub_name: subproduct.human_name.clone(),
                    url,
                });
            }
        }
    }

    Ok(OrderDetail {
        order_key: order_key.clone(),
        human_name: response.product.human_name,
        created: response.created.as_deref().and_then(parse_created),
        files,
    })
}

/// File name as served: last URL path segment, percent-decoded
fn display_name(url: &Url, sub_name: &str, entry_name: &str) -> String {
    let from_url = url
        .path_segments()
        .and_then(|segments| segments.last())
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            urlencoding::decode(segment)
                .map(|decoded| decoded.into_owned())
                .unwrap_or_else(|_| segment.to_string())
        });

    from_url.unwrap_or_else(|| match (sub_name.is_empty(), entry_name.is_empty()) {
        (false, false) => format!("{} - {}", sub_name, entry_name),
        (false, true) => sub_name.to_string(),
        (true, false) => entry_name.to_string(),
        (true, true) => "download".to_string(),
    })
}

/// Declared hash, preferring SHA-1 over MD5; malformed digests are dropped
fn declared_hash(entry: &DownloadStruct) -> Option<ContentHash> {
    let candidates = [
        (HashAlgorithm::Sha1, entry.sha1.as_deref()),
        (HashAlgorithm::Md5, entry.md5.as_deref()),
    ];

    candidates
        .into_iter()
        .filter_map(|(algorithm, digest)| {
            let digest = digest?.trim();
            if digest.is_empty() {
                return None;
            }
            match ContentHash::from_hex(algorithm, digest) {
                Ok(hash) => Some(hash),
                Err(e) => {
                    warn!("Ignoring declared hash for {}: {}", entry.name, e);
                    None
                }
            }
        })
        .next()
}

fn parse_created(created: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(created, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(created)
                .ok()
                .map(|dt| dt.naive_utc())
        })
}
