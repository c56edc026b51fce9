//! Concatenated, delimited blob streams.
//!
//! A pull response carries many blobs over one connection. Each blob is
//! framed as `#<HASH>:<LENGTH>#` followed by exactly `LENGTH` raw bytes,
//! and frames follow each other in request order.

use bytes::Bytes;
use futures::{StreamExt, TryStreamExt, future, stream};
use tokio::io::AsyncReadExt;
use tokio_util::io::ReaderStream;

use terasync_core::traits::storage::ByteStream;
use terasync_core::types::ContentHash;

use crate::provider::BlobHandle;

/// Frame header for one blob.
pub fn block_header(hash: &ContentHash, size_bytes: u64) -> String {
    format!("#{hash}:{size_bytes}#")
}

/// Payload bytes of `blobs`, excluding frame headers.
pub fn payload_length(blobs: &[BlobHandle]) -> u64 {
    blobs.iter().map(|b| b.size_bytes).sum()
}

/// Exact number of bytes [`block_stream`] will produce for `blobs`.
pub fn content_length(blobs: &[BlobHandle]) -> u64 {
    blobs
        .iter()
        .map(|b| block_header(&b.hash, b.size_bytes).len() as u64 + b.size_bytes)
        .sum()
}

/// Stream `blobs` as consecutive frames. Files are opened lazily, one at a
/// time, and each body is capped at the size recorded in its handle.
pub fn block_stream(blobs: Vec<BlobHandle>) -> ByteStream {
    let frames = stream::iter(blobs).flat_map(|blob| {
        let header = Bytes::from(block_header(&blob.hash, blob.size_bytes));
        let size = blob.size_bytes;
        let path = blob.path;
        let body = stream::once(async move { tokio::fs::File::open(path).await })
            .map_ok(move |file| ReaderStream::new(file.take(size)))
            .try_flatten();
        stream::once(future::ready(Ok::<Bytes, std::io::Error>(header))).chain(body)
    });
    Box::pin(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::provider::tests::{ScriptedOrigin, hash, provider_with};

    async fn collect(mut stream: ByteStream) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(chunk) = stream.next().await {
            out.extend_from_slice(&chunk.expect("chunk"));
        }
        out
    }

    #[tokio::test]
    async fn test_frames_follow_request_order() {
        let provider = provider_with(Arc::new(ScriptedOrigin::open())).await;
        let first = provider.ensure(&hash(0xA1)).await.unwrap();
        let second = provider.ensure(&hash(0xB2)).await.unwrap();
        let blobs = vec![second.clone(), first.clone()];
        let expected_len = content_length(&blobs);

        let body = collect(block_stream(blobs)).await;
        assert_eq!(body.len() as u64, expected_len);

        let mut expected = Vec::new();
        for blob in [&second, &first] {
            expected.extend_from_slice(block_header(&blob.hash, blob.size_bytes).as_bytes());
            expected.extend_from_slice(&ScriptedOrigin::payload(&blob.hash));
        }
        assert_eq!(body, expected);
    }

    #[test]
    fn test_header_format() {
        let h = ContentHash::parse(&"ab".repeat(20)).unwrap();
        assert_eq!(block_header(&h, 42), format!("#{}:42#", "AB".repeat(20)));
    }

    #[tokio::test]
    async fn test_empty_batch_is_empty_stream() {
        assert!(collect(block_stream(Vec::new())).await.is_empty());
        assert_eq!(content_length(&[]), 0);
    }
}
