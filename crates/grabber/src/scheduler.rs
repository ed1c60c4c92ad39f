// Segment Scheduler: bounded concurrent fetching with in-order hand-off to the assembler.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

use crate::error::{DownloadError, FetchError};
use crate::fetcher::{SegmentDownloader, SegmentJob};
use crate::retry::{RetryAction, RetryPolicy, retry_with_backoff};

/// A segment body ready to be appended, in manifest order.
#[derive(Debug, Clone)]
pub struct FetchedSegment {
    pub index: usize,
    pub data: Bytes,
}

pub struct SegmentScheduler {
    downloader: Arc<dyn SegmentDownloader>,
    policy: RetryPolicy,
    concurrency: usize,
    reorder_window: usize,
    token: CancellationToken,
}

impl SegmentScheduler {
    pub fn new(
        downloader: Arc<dyn SegmentDownloader>,
        policy: RetryPolicy,
        concurrency: usize,
        reorder_window: usize,
        token: CancellationToken,
    ) -> Self {
        Self {
            downloader,
            policy,
            concurrency: concurrency.max(1),
            reorder_window: reorder_window.max(concurrency).max(1),
            token,
        }
    }

    /// Fetches `jobs` and sends their bodies to `output` strictly in order.
    ///
    /// Stops dispatching on cancellation or on the first segment that fails
    /// for good; fetches already in flight are drained and any of them that
    /// complete the in-order prefix are still sent.
    pub async fn run(
        self,
        jobs: Vec<SegmentJob>,
        output: mpsc::Sender<FetchedSegment>,
    ) -> Result<(), DownloadError> {
        info!(
            segments = jobs.len(),
            concurrency = self.concurrency,
            window = self.reorder_window,
            "SegmentScheduler started."
        );
        // Sibling retry loops stop as soon as one segment fails for good.
        let failure_token = self.token.child_token();
        let mut in_flight = FuturesUnordered::new();
        let mut reorder: BTreeMap<usize, Bytes> = BTreeMap::new();
        let mut next_dispatch = 0;
        let mut next_emit = 0;
        let mut failure: Option<DownloadError> = None;

        loop {
            while failure.is_none()
                && !self.token.is_cancelled()
                && in_flight.len() < self.concurrency
                && next_dispatch < jobs.len()
                && next_dispatch < next_emit + self.reorder_window
            {
                trace!(index = jobs[next_dispatch].index, "dispatching segment");
                in_flight.push(fetch_job(
                    Arc::clone(&self.downloader),
                    self.policy.clone(),
                    failure_token.clone(),
                    next_dispatch,
                    jobs[next_dispatch].clone(),
                ));
                next_dispatch += 1;
            }

            let Some((position, result)) = in_flight.next().await else {
                break;
            };

            match result {
                Ok(data) => {
                    reorder.insert(position, data);
                    while let Some(data) = reorder.remove(&next_emit) {
                        let index = jobs[next_emit].index;
                        if output.send(FetchedSegment { index, data }).await.is_err() {
                            debug!("assembler stopped receiving; draining");
                            if failure.is_none() {
                                failure = Some(DownloadError::internal(
                                    "assembler stopped before the download ended",
                                ));
                            }
                            failure_token.cancel();
                            reorder.clear();
                            break;
                        }
                        next_emit += 1;
                    }
                }
                Err(FetchError::Cancelled) => {
                    trace!(index = jobs[position].index, "segment fetch cancelled");
                }
                Err(e) => {
                    let index = jobs[position].index;
                    error!(index, error = %e, "segment failed");
                    if failure.is_none() {
                        failure = Some(DownloadError::segment(index, e));
                        failure_token.cancel();
                    }
                }
            }
        }

        if let Some(failure) = failure {
            return Err(failure);
        }
        if next_emit < jobs.len() {
            info!(written = next_emit, total = jobs.len(), "SegmentScheduler cancelled.");
            return Err(DownloadError::Cancelled);
        }
        info!("SegmentScheduler finished.");
        Ok(())
    }
}

async fn fetch_job(
    downloader: Arc<dyn SegmentDownloader>,
    policy: RetryPolicy,
    token: CancellationToken,
    position: usize,
    job: SegmentJob,
) -> (usize, Result<Bytes, FetchError>) {
    let downloader = downloader.as_ref();
    let job = &job;
    let result = retry_with_backoff(&policy, &token, |_| async move {
        RetryAction::from_result(downloader.download(job).await)
    })
    .await;
    (position, result)
}
