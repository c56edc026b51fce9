//! Pull batches: the blobs of one Active request, streamed as frames.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use bytes::Bytes;
use futures::Stream;
use pin_project_lite::pin_project;
use tracing::{info, warn};

use terasync_core::result::AppResult;
use terasync_core::traits::storage::ByteStream;
use terasync_core::types::{RequestId, Uid};
use terasync_storage::block::{block_stream, content_length, payload_length};
use terasync_storage::{BlobHandle, CachedBlobProvider};

use crate::queue::{PullTicket, RequestQueue};

/// Blobs resolved for one pull, ready to stream.
#[derive(Debug)]
pub struct PullBatch {
    request_id: RequestId,
    completion: Option<Completion>,
    pub blobs: Vec<BlobHandle>,
    /// Hashes that could not be made available; they are left out of the
    /// stream.
    pub skipped: usize,
}

/// Resolve every hash of an Active request through the cache.
///
/// Hashes the cache cannot provide are skipped, the rest keep request
/// order. The request slot is released when the returned batch's stream
/// ends or is dropped, or immediately when the batch itself is dropped
/// unstreamed.
pub async fn prepare_pull(
    queue: &RequestQueue,
    provider: &CachedBlobProvider,
    id: &RequestId,
    owner: &Uid,
) -> AppResult<PullBatch> {
    let ticket = queue.begin_pull(id, owner)?;

    let mut blobs = Vec::with_capacity(ticket.hashes.len());
    let mut skipped = 0;
    for hash in &ticket.hashes {
        match provider.ensure(hash).await {
            Ok(blob) => blobs.push(blob),
            Err(e) => {
                warn!(request_id = %id, %hash, error = %e, "Skipping unavailable blob");
                skipped += 1;
            }
        }
    }

    let completion = Completion {
        ticket,
        queue: queue.clone(),
        provider: provider.clone(),
        files: blobs.len(),
        payload: payload_length(&blobs),
        started: Instant::now(),
        sent: 0,
    };
    Ok(PullBatch {
        request_id: *id,
        completion: Some(completion),
        blobs,
        skipped,
    })
}

impl PullBatch {
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Exact length of the framed body.
    pub fn content_length(&self) -> u64 {
        content_length(&self.blobs)
    }

    /// Stream the frames and complete the request once the stream is done.
    pub fn into_stream(mut self) -> TrackedStream {
        let blobs = std::mem::take(&mut self.blobs);
        let mut completion = self.completion.take();
        if let Some(completion) = completion.as_mut() {
            completion.started = Instant::now();
        }
        TrackedStream {
            inner: block_stream(blobs),
            completion,
        }
    }
}

impl Drop for PullBatch {
    fn drop(&mut self) {
        if let Some(completion) = self.completion.take() {
            completion.complete(false);
        }
    }
}

/// Releases the request slot exactly once.
#[derive(Debug)]
struct Completion {
    ticket: PullTicket,
    queue: RequestQueue,
    provider: CachedBlobProvider,
    files: usize,
    payload: u64,
    started: Instant,
    sent: u64,
}

impl Completion {
    fn complete(self, finished: bool) {
        // Only a stream that reached its end counts as served.
        let released = self.queue.finish(&self.ticket);
        if released && finished {
            self.provider.stats().record_request(self.payload);
        }
        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        if finished {
            info!(
                request_id = %self.ticket.request_id,
                owner = %self.ticket.owner,
                files = self.files,
                bytes = self.sent,
                elapsed_ms,
                "Pull completed"
            );
        } else {
            warn!(
                request_id = %self.ticket.request_id,
                owner = %self.ticket.owner,
                files = self.files,
                bytes = self.sent,
                elapsed_ms,
                "Pull aborted before the end of the stream"
            );
        }
    }
}

pin_project! {
    /// Frame stream of a pull. Completes its request when exhausted or
    /// dropped.
    pub struct TrackedStream {
        #[pin]
        inner: ByteStream,
        completion: Option<Completion>,
    }

    impl PinnedDrop for TrackedStream {
        fn drop(this: Pin<&mut Self>) {
            if let Some(completion) = this.project().completion.take() {
                completion.complete(false);
            }
        }
    }
}

impl Stream for TrackedStream {
    type Item = Result<Bytes, std::io::Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        let polled = this.inner.poll_next(cx);
        match &polled {
            Poll::Ready(Some(Ok(chunk))) => {
                if let Some(completion) = this.completion.as_mut() {
                    completion.sent += chunk.len() as u64;
                }
            }
            Poll::Ready(None) => {
                if let Some(completion) = this.completion.take() {
                    completion.complete(true);
                }
            }
            _ => {}
        }
        polled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use futures::{StreamExt, stream};

    use terasync_core::ErrorKind;
    use terasync_core::traits::storage::BlobStore;
    use terasync_core::types::ContentHash;
    use terasync_storage::block::block_header;
    use terasync_storage::origin::LocalOrigin;
    use terasync_storage::provider::ProviderOptions;
    use terasync_storage::{FileStatistics, LocalBlobStore};

    use crate::queue::QueueLimits;
    use crate::state::RequestState;

    fn uid(s: &str) -> Uid {
        Uid::parse(s).unwrap()
    }

    fn hash(n: u8) -> ContentHash {
        ContentHash::parse(&format!("{n:02X}").repeat(20)).unwrap()
    }

    fn payload(hash: &ContentHash) -> Vec<u8> {
        format!("contents of {hash}").into_bytes()
    }

    /// A provider whose origin holds `present`.
    async fn provider_with(present: &[ContentHash]) -> CachedBlobProvider {
        let base = std::env::temp_dir().join(format!("terasync-pull-{}", uuid::Uuid::new_v4()));
        let cold = LocalBlobStore::new(base.join("cold")).await.unwrap();
        for hash in present {
            let body: ByteStream = Box::pin(stream::iter(vec![Ok(Bytes::from(payload(hash)))]));
            cold.write_stream(hash, body).await.unwrap();
        }
        let cache = LocalBlobStore::new(base.join("cache")).await.unwrap();
        CachedBlobProvider::new(
            Arc::new(cache),
            Arc::new(LocalOrigin::new(Arc::new(cold))),
            Arc::new(FileStatistics::new()),
            ProviderOptions::default(),
        )
    }

    async fn collect(mut stream: TrackedStream) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(chunk) = stream.next().await {
            out.extend_from_slice(&chunk.unwrap());
        }
        out
    }

    fn active_request(queue: &RequestQueue, owner: &str, hashes: Vec<ContentHash>) -> RequestId {
        let id = RequestId::new();
        queue.enqueue(id, &uid(owner), hashes, false).unwrap();
        queue.promote();
        id
    }

    #[tokio::test]
    async fn test_pull_skips_missing_and_completes() {
        let hashes: Vec<ContentHash> = (1..=5).map(hash).collect();
        let provider = provider_with(&[hash(1), hash(2), hash(4), hash(5)]).await;
        let queue = RequestQueue::new(QueueLimits::new(2, 0));
        let id = active_request(&queue, "u1", hashes);

        let batch = prepare_pull(&queue, &provider, &id, &uid("u1")).await.unwrap();
        assert_eq!(batch.skipped, 1);
        assert_eq!(batch.blobs.len(), 4);
        let expected_len = batch.content_length();

        let body = collect(batch.into_stream()).await;
        assert_eq!(body.len() as u64, expected_len);

        let mut expected = Vec::new();
        for n in [1, 2, 4, 5] {
            let h = hash(n);
            let data = payload(&h);
            expected.extend_from_slice(block_header(&h, data.len() as u64).as_bytes());
            expected.extend_from_slice(&data);
        }
        assert_eq!(body, expected);

        assert!(queue.state_of(&id, &uid("u1")).is_err());
        let stats = queue.stats();
        assert_eq!(stats.active_normal, 0);
        assert_eq!(stats.completed_total, 1);
        assert_eq!(provider.stats().snapshot().requests_served, 1);
    }

    #[tokio::test]
    async fn test_dropped_stream_frees_slot() {
        let provider = provider_with(&[hash(1), hash(2)]).await;
        let queue = RequestQueue::new(QueueLimits::new(1, 0));
        let id = active_request(&queue, "u1", vec![hash(1), hash(2)]);

        let batch = prepare_pull(&queue, &provider, &id, &uid("u1")).await.unwrap();
        let mut stream = batch.into_stream();
        assert!(stream.next().await.is_some());
        drop(stream);

        assert_eq!(queue.stats().active_normal, 0);
        assert_eq!(queue.stats().completed_total, 1);
        let served = provider.stats().snapshot();
        assert_eq!(served.requests_served, 0);
        assert_eq!(served.bytes_served, 0);
    }

    #[tokio::test]
    async fn test_unstreamed_batch_is_not_counted_as_served() {
        let provider = provider_with(&[hash(1)]).await;
        let queue = RequestQueue::new(QueueLimits::new(1, 0));
        let id = active_request(&queue, "u1", vec![hash(1)]);

        let batch = prepare_pull(&queue, &provider, &id, &uid("u1")).await.unwrap();
        drop(batch);

        assert_eq!(queue.stats().active_normal, 0);
        assert_eq!(provider.stats().snapshot().requests_served, 0);
    }

    #[tokio::test]
    async fn test_pull_of_queued_request_is_rejected() {
        let provider = provider_with(&[hash(1)]).await;
        let queue = RequestQueue::new(QueueLimits::new(1, 0));
        let _blocker = active_request(&queue, "a", vec![hash(1)]);
        let waiting = RequestId::new();
        queue.enqueue(waiting, &uid("b"), vec![hash(1)], false).unwrap();

        let err = prepare_pull(&queue, &provider, &waiting, &uid("b"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::AdmissionRejected);
        assert_eq!(queue.state_of(&waiting, &uid("b")).unwrap(), RequestState::Queued);
    }
}
