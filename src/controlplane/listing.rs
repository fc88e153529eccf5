//! Masking View Listing
//!
//! Lists every masking view on the array and fetches each view's detail and
//! connections concurrently:
//!
//! - one task per view, at most `concurrency` of them talking to the array at
//!   a time (semaphore permits);
//! - each task owns a sender on the result channel and sends exactly one
//!   message;
//! - the calling task is the only reader of the channel and the only writer
//!   of the diagnostics, so nothing is shared behind a lock.
//!
//! Once the cancellation token fires, tasks still waiting for a permit skip
//! their fetch and report it; tasks already fetching finish normally.
//! Per-view failures become diagnostics; only the initial id listing can
//! fail the whole call.

use crate::domain::ports::{Diagnostics, PowerMaxClientRef};
use crate::domain::value::AttributeValue;
use crate::error::{Error, Result};
use crate::mapping::{map_record, MappingSkip};
use crate::resources::masking_view::{self, MaskingViewDetails};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Fan-out settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingConfig {
    /// Maximum concurrent detail fetches
    pub concurrency: usize,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self { concurrency: 10 }
    }
}

/// Result of listing masking views
#[derive(Debug, Default)]
pub struct ListedViews {
    /// Mapped views, sorted by id
    pub views: Vec<AttributeValue>,
    /// Fields dropped while mapping, across all views
    pub skipped: Vec<MappingSkip>,
    /// One entry per view that could not be read, plus mapping warnings
    pub diagnostics: Diagnostics,
}

impl ListedViews {
    pub fn ids(&self) -> Vec<&str> {
        self.views
            .iter()
            .filter_map(|v| v.get("id").and_then(AttributeValue::as_str))
            .collect()
    }
}

/// What a worker sends back
enum Fetched {
    Mapped(AttributeValue, Vec<MappingSkip>),
    Failed(String),
    Cancelled,
}

async fn fetch_view(
    client: &PowerMaxClientRef,
    array: &str,
    id: &str,
) -> Result<MaskingViewDetails> {
    let view = client.get_masking_view(array, id).await?;
    let connections = client.get_masking_view_connections(array, id).await?;
    Ok(MaskingViewDetails { view, connections })
}

/// List and map every masking view on `array`
pub async fn list_masking_views(
    client: &PowerMaxClientRef,
    array: &str,
    config: &ListingConfig,
    cancel: &CancellationToken,
) -> Result<ListedViews> {
    if config.concurrency == 0 {
        return Err(Error::Configuration(
            "listing concurrency must be at least 1".into(),
        ));
    }

    let ids = client.list_masking_views(array).await?;
    info!(
        "Listing {} masking views on {} (concurrency {})",
        ids.len(),
        array,
        config.concurrency
    );

    let semaphore = Arc::new(Semaphore::new(config.concurrency));
    let (tx, mut rx) = mpsc::channel::<(String, Fetched)>(config.concurrency);

    let mut handles = Vec::with_capacity(ids.len());
    for id in ids {
        let tx = tx.clone();
        let semaphore = semaphore.clone();
        let client = client.clone();
        let array = array.to_string();
        let cancel = cancel.clone();

        handles.push(tokio::spawn(async move {
            let fetched = match semaphore.acquire_owned().await {
                Err(_) => Fetched::Failed("listing shut down".into()),
                Ok(_) if cancel.is_cancelled() => Fetched::Cancelled,
                Ok(_permit) => match fetch_view(&client, &array, &id).await {
                    Ok(details) => match map_record(Some(&details), masking_view::shape()) {
                        Ok(mapped) => Fetched::Mapped(mapped.value, mapped.skipped),
                        Err(e) => Fetched::Failed(e.to_string()),
                    },
                    Err(e) => Fetched::Failed(e.to_string()),
                },
            };
            // receiver outlives every sender
            let _ = tx.send((id, fetched)).await;
        }));
    }
    drop(tx);

    let mut listed = ListedViews::default();
    let mut by_id = Vec::new();
    let mut cancelled = 0usize;
    while let Some((id, fetched)) = rx.recv().await {
        match fetched {
            Fetched::Mapped(value, skipped) => {
                for skip in &skipped {
                    listed
                        .diagnostics
                        .warning(format!("masking view {}: field dropped", id), skip.to_string());
                }
                listed.skipped.extend(skipped);
                by_id.push((id, value));
            }
            Fetched::Failed(reason) => {
                warn!("Failed to read masking view {}: {}", id, reason);
                listed
                    .diagnostics
                    .error(format!("failed to read masking view {}", id), reason);
            }
            Fetched::Cancelled => {
                cancelled += 1;
                listed.diagnostics.error(
                    format!("skipped masking view {}", id),
                    "listing was cancelled before the view was fetched",
                );
            }
        }
    }

    for joined in join_all(handles).await {
        if let Err(e) = joined {
            listed
                .diagnostics
                .error("masking view worker failed", e.to_string());
        }
    }

    by_id.sort_by(|a, b| a.0.cmp(&b.0));
    listed.views = by_id.into_iter().map(|(_, v)| v).collect();

    if cancelled > 0 {
        warn!("Masking view listing cancelled: {} view(s) skipped", cancelled);
    }
    debug!(
        "Listed {} masking views on {} ({} diagnostics)",
        listed.views.len(),
        array,
        listed.diagnostics.len()
    );
    Ok(listed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controlplane::backends::SimulatedArray;
    use crate::domain::ports::Severity;
    use crate::domain::records::{MaskingViewConnection, MaskingViewRecord};
    use crate::resources::testing::{client, ARRAY};
    use assert_matches::assert_matches;
    use std::time::Duration;

    fn array_with_views(n: usize, latency: Option<Duration>) -> Arc<SimulatedArray> {
        let mut array = SimulatedArray::new(ARRAY);
        if let Some(latency) = latency {
            array = array.with_latency(latency);
        }
        // inserted in reverse to check the output ordering
        for i in (0..n).rev() {
            array.insert_masking_view(
                MaskingViewRecord {
                    masking_view_id: format!("mv{:02}", i),
                    host_id: Some("h1".into()),
                    port_group_id: "pg1".into(),
                    storage_group_id: "sg1".into(),
                    ..Default::default()
                },
                vec![MaskingViewConnection {
                    volume_id: format!("{:05}", i),
                    logged_in: true,
                    ..Default::default()
                }],
            );
        }
        Arc::new(array)
    }

    #[tokio::test]
    async fn test_lists_all_views_sorted() {
        let array = array_with_views(12, None);
        let listed = list_masking_views(
            &client(&array),
            ARRAY,
            &ListingConfig::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(listed.views.len(), 12);
        assert!(listed.diagnostics.is_empty());
        let ids = listed.ids();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
        assert_eq!(ids[0], "mv00");
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let array = array_with_views(20, Some(Duration::from_millis(5)));
        let config = ListingConfig { concurrency: 3 };
        let listed = list_masking_views(&client(&array), ARRAY, &config, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(listed.views.len(), 20);
        assert!(array.peak_in_flight() <= 3, "peak {}", array.peak_in_flight());
    }

    #[tokio::test]
    async fn test_failed_view_becomes_diagnostic() {
        let array = array_with_views(5, None);
        array.fail_on_target("get_masking_view_connections", "mv03");
        let listed = list_masking_views(
            &client(&array),
            ARRAY,
            &ListingConfig::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(listed.ids(), vec!["mv00", "mv01", "mv02", "mv04"]);
        assert_eq!(listed.diagnostics.len(), 1);
        let diag = listed.diagnostics.iter().next().unwrap();
        assert_eq!(diag.severity, Severity::Error);
        assert!(diag.summary.contains("mv03"));
    }

    #[tokio::test]
    async fn test_listing_failure_is_call_level() {
        let array = array_with_views(2, None);
        array.fail_on("list_masking_views");
        let err = list_masking_views(
            &client(&array),
            ARRAY,
            &ListingConfig::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert_matches!(err, Error::BackendOperationFailed { .. });
    }

    #[tokio::test]
    async fn test_cancelled_before_start_skips_every_fetch() {
        let array = array_with_views(4, None);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let listed = list_masking_views(&client(&array), ARRAY, &ListingConfig::default(), &cancel)
            .await
            .unwrap();

        assert!(listed.views.is_empty());
        assert_eq!(listed.diagnostics.len(), 4);
        assert!(listed.diagnostics.iter().all(|d| d.summary.starts_with("skipped")));
        assert!(array
            .calls()
            .iter()
            .all(|c| c.operation == "list_masking_views"));
    }

    #[tokio::test]
    async fn test_in_flight_fetch_completes_after_cancel() {
        let array = array_with_views(5, Some(Duration::from_millis(30)));
        let cancel = CancellationToken::new();
        let config = ListingConfig { concurrency: 1 };

        let listing = {
            let client = client(&array);
            let cancel = cancel.clone();
            tokio::spawn(async move { list_masking_views(&client, ARRAY, &config, &cancel).await })
        };

        // wait until the first worker is talking to the array
        while !array.calls().iter().any(|c| c.operation == "get_masking_view") {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        cancel.cancel();

        let listed = listing.await.unwrap().unwrap();
        assert_eq!(listed.views.len(), 1);
        assert_eq!(listed.diagnostics.len(), 4);
        let fetched = array
            .calls()
            .iter()
            .filter(|c| c.operation == "get_masking_view")
            .count();
        assert_eq!(fetched, 1);
    }

    #[tokio::test]
    async fn test_zero_concurrency_is_rejected() {
        let array = array_with_views(1, None);
        let config = ListingConfig { concurrency: 0 };
        let err = list_masking_views(&client(&array), ARRAY, &config, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_matches!(err, Error::Configuration(_));
    }
}
