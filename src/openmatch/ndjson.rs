//! Newline-delimited JSON stream decoding
//!
//! Converts a raw byte stream into typed values, one per line. Each line is a
//! [`StreamEnvelope`]: a `result` line yields a value, an `error` line yields
//! an error and ends the stream.

use crate::error::Result;
use crate::openmatch::messages::StreamEnvelope;
use anyhow::anyhow;
use bytes::Bytes;
use futures::stream::{Stream, TryStreamExt};
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{Context, Poll};

type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Stream adapter decoding newline-delimited JSON envelopes
pub struct NdjsonStream<T> {
    inner: ByteStream,
    buffer: Vec<u8>,
    finished: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<T> NdjsonStream<T> {
    pub fn new<S, E>(byte_stream: S) -> Self
    where
        S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            inner: Box::pin(byte_stream.map_err(anyhow::Error::from)),
            buffer: Vec::new(),
            finished: false,
            _marker: PhantomData,
        }
    }
}

impl<T: DeserializeOwned> NdjsonStream<T> {
    /// Take the next complete line from the buffer and decode it
    fn next_line(&mut self, flush: bool) -> Option<Result<T>> {
        loop {
            let line: Vec<u8> = match self.buffer.iter().position(|b| *b == b'\n') {
                Some(pos) => self.buffer.drain(..=pos).collect(),
                None if flush && !self.buffer.is_empty() => std::mem::take(&mut self.buffer),
                None => return None,
            };

            if line.iter().all(|b| b.is_ascii_whitespace()) {
                continue;
            }

            let envelope: StreamEnvelope<T> = match serde_json::from_slice(&line) {
                Ok(envelope) => envelope,
                Err(e) => {
                    self.finished = true;
                    return Some(Err(anyhow!("Malformed stream line: {}", e)));
                }
            };

            if let Some(status) = envelope.error {
                self.finished = true;
                return Some(Err(anyhow!(
                    "Stream error {}: {}",
                    status.code,
                    status.message
                )));
            }

            if let Some(value) = envelope.result {
                return Some(Ok(value));
            }
        }
    }
}

impl<T: DeserializeOwned> Stream for NdjsonStream<T> {
    type Item = Result<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if this.finished {
                return Poll::Ready(None);
            }

            if let Some(item) = this.next_line(false) {
                return Poll::Ready(Some(item));
            }

            match this.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => this.buffer.extend_from_slice(&bytes),
                Poll::Ready(Some(Err(e))) => {
                    this.finished = true;
                    return Poll::Ready(Some(Err(e.context("Stream transport failed"))));
                }
                Poll::Ready(None) => {
                    let item = this.next_line(true);
                    this.finished = true;
                    return Poll::Ready(item);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Item {
        n: u32,
    }

    fn chunks(parts: &[&str]) -> impl Stream<Item = std::result::Result<Bytes, std::io::Error>> {
        let owned: Vec<std::result::Result<Bytes, std::io::Error>> = parts
            .iter()
            .map(|p| Ok(Bytes::from(p.to_string())))
            .collect();
        futures::stream::iter(owned)
    }

    #[tokio::test]
    async fn test_decodes_lines_split_across_chunks() {
        let stream: NdjsonStream<Item> = NdjsonStream::new(chunks(&[
            "{\"result\":{\"n\":1}}\n{\"res",
            "ult\":{\"n\":2}}\n\n",
            "{\"result\":{\"n\":3}}",
        ]));

        let items: Vec<Item> = stream.map(|r| r.unwrap()).collect().await;
        assert_eq!(items, vec![Item { n: 1 }, Item { n: 2 }, Item { n: 3 }]);
    }

    #[tokio::test]
    async fn test_error_line_ends_stream() {
        let mut stream: NdjsonStream<Item> = NdjsonStream::new(chunks(&[
            "{\"result\":{\"n\":1}}\n",
            "{\"error\":{\"code\":13,\"message\":\"boom\"}}\n",
            "{\"result\":{\"n\":2}}\n",
        ]));

        assert_eq!(stream.next().await.unwrap().unwrap(), Item { n: 1 });
        let err = stream.next().await.unwrap().unwrap_err();
        assert!(err.to_string().contains("boom"));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_transport_error_ends_stream() {
        let parts: Vec<std::result::Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from("{\"result\":{\"n\":1}}\n")),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
        ];
        let mut stream: NdjsonStream<Item> = NdjsonStream::new(futures::stream::iter(parts));

        assert!(stream.next().await.unwrap().is_ok());
        assert!(stream.next().await.unwrap().is_err());
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_malformed_line_is_an_error() {
        let mut stream: NdjsonStream<Item> = NdjsonStream::new(chunks(&["not json\n"]));
        assert!(stream.next().await.unwrap().is_err());
        assert!(stream.next().await.is_none());
    }
}
