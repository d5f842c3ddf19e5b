//! Scripted log sources for tests

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use podtail_core::{LogRequest, LogSourceProvider, LogStream};
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};
use tokio_util::io::StreamReader;

/// What the stream does after its scripted chunks
#[derive(Debug, Clone, Copy)]
pub(crate) enum Tail {
    End,
    Pending,
    Error,
}

/// Yields each scripted chunk from its own read, then follows `tail`
pub(crate) struct ScriptedSource {
    chunks: Vec<Bytes>,
    tail: Tail,
    pub opened: Arc<AtomicUsize>,
    pub released: Arc<AtomicBool>,
}

impl ScriptedSource {
    fn new<I, C>(chunks: I, tail: Tail) -> Self
    where
        I: IntoIterator<Item = C>,
        C: AsRef<[u8]>,
    {
        Self {
            chunks: chunks
                .into_iter()
                .map(|c| Bytes::copy_from_slice(c.as_ref()))
                .collect(),
            tail,
            opened: Arc::new(AtomicUsize::new(0)),
            released: Arc::new(AtomicBool::new(false)),
        }
    }

    pub(crate) fn ending<I, C>(chunks: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: AsRef<[u8]>,
    {
        Self::new(chunks, Tail::End)
    }

    pub(crate) fn pending<I, C>(chunks: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: AsRef<[u8]>,
    {
        Self::new(chunks, Tail::Pending)
    }

    pub(crate) fn failing<I, C>(chunks: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: AsRef<[u8]>,
    {
        Self::new(chunks, Tail::Error)
    }

    /// Never produces anything
    pub(crate) fn silent() -> Self {
        Self::new(Vec::<Vec<u8>>::new(), Tail::Pending)
    }

    pub(crate) fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LogSourceProvider for ScriptedSource {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn open(&self, _request: &LogRequest) -> podtail_core::Result<LogStream> {
        self.opened.fetch_add(1, Ordering::SeqCst);

        let tail: BoxStream<'static, io::Result<Bytes>> = match self.tail {
            Tail::End => stream::empty().boxed(),
            Tail::Pending => stream::pending().boxed(),
            Tail::Error => stream::iter([Err(io::Error::other("connection reset"))]).boxed(),
        };
        let chunks = stream::iter(self.chunks.clone().into_iter().map(Ok)).chain(tail);

        Ok(Box::pin(ReleaseOnDrop {
            inner: StreamReader::new(chunks),
            released: self.released.clone(),
        }))
    }
}

/// Always fails to open, as for a pod that does not exist
pub(crate) struct MissingSource;

#[async_trait]
impl LogSourceProvider for MissingSource {
    fn name(&self) -> &'static str {
        "missing"
    }

    async fn open(&self, request: &LogRequest) -> podtail_core::Result<LogStream> {
        Err(podtail_core::Error::WorkloadNotFound(format!(
            "pod default/{}",
            request.workload
        )))
    }
}

/// Never finishes opening, as for an API server that stopped answering
#[derive(Default)]
pub(crate) struct HangingSource {
    /// Set once the pending open is dropped
    pub abandoned: Arc<AtomicBool>,
}

#[async_trait]
impl LogSourceProvider for HangingSource {
    fn name(&self) -> &'static str {
        "hanging"
    }

    async fn open(&self, _request: &LogRequest) -> podtail_core::Result<LogStream> {
        let _flag = SetOnDrop(self.abandoned.clone());
        std::future::pending().await
    }
}

struct SetOnDrop(Arc<AtomicBool>);

impl Drop for SetOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

struct ReleaseOnDrop<R> {
    inner: R,
    released: Arc<AtomicBool>,
}

impl<R> Drop for ReleaseOnDrop<R> {
    fn drop(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for ReleaseOnDrop<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_read(cx, buf)
    }
}
