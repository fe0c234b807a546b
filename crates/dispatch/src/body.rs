//! The response body produced by a [`Runner`](crate::Runner).
//!
//! A body is either an ordered sequence of byte chunks, which is what handlers write, or a
//! boxed stream, which is what [`send_file`](crate::Runner::send_file) installs.

use bytes::Bytes;
use http_body::Body as HttpBody;
use http_body::{Frame, SizeHint};
use http_body_util::combinators::UnsyncBoxBody;
use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

pub struct ResponseBody {
    inner: Kind,
}

enum Kind {
    Chunks(VecDeque<Bytes>),
    Stream(UnsyncBoxBody<Bytes, io::Error>),
}

impl ResponseBody {
    pub fn empty() -> Self {
        Self { inner: Kind::Chunks(VecDeque::new()) }
    }

    pub fn once(bytes: Bytes) -> Self {
        Self::chunks([bytes])
    }

    /// Builds a body from already split chunks, keeping their order. Empty chunks are dropped.
    pub fn chunks<I, B>(chunks: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        let chunks = chunks.into_iter().map(Into::into).filter(|bytes| !bytes.is_empty()).collect();
        Self { inner: Kind::Chunks(chunks) }
    }

    pub fn stream<B>(body: B) -> Self
    where
        B: HttpBody<Data = Bytes, Error = io::Error> + Send + 'static,
    {
        Self { inner: Kind::Stream(UnsyncBoxBody::new(body)) }
    }

    /// The buffered chunks, or `None` for a streaming body.
    pub fn as_chunks(&self) -> Option<impl Iterator<Item = &Bytes>> {
        match &self.inner {
            Kind::Chunks(chunks) => Some(chunks.iter()),
            Kind::Stream(_) => None,
        }
    }

    /// Total length, when it is known without polling the body.
    pub fn len(&self) -> Option<u64> {
        self.size_hint().exact()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }
}

impl Default for ResponseBody {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            Kind::Chunks(chunks) => f.debug_tuple("ResponseBody::Chunks").field(chunks).finish(),
            Kind::Stream(_) => f.write_str("ResponseBody::Stream"),
        }
    }
}

impl From<()> for ResponseBody {
    fn from((): ()) -> Self {
        Self::empty()
    }
}

impl From<Bytes> for ResponseBody {
    fn from(bytes: Bytes) -> Self {
        Self::once(bytes)
    }
}

impl From<Option<Bytes>> for ResponseBody {
    fn from(option: Option<Bytes>) -> Self {
        match option {
            Some(bytes) => Self::once(bytes),
            None => Self::empty(),
        }
    }
}

impl From<&'static str> for ResponseBody {
    fn from(value: &'static str) -> Self {
        Self::once(Bytes::from_static(value.as_bytes()))
    }
}

impl From<String> for ResponseBody {
    fn from(value: String) -> Self {
        Self::once(Bytes::from(value))
    }
}

impl From<Vec<u8>> for ResponseBody {
    fn from(value: Vec<u8>) -> Self {
        Self::once(Bytes::from(value))
    }
}

impl From<Vec<Bytes>> for ResponseBody {
    fn from(value: Vec<Bytes>) -> Self {
        Self::chunks(value)
    }
}

impl From<Vec<String>> for ResponseBody {
    fn from(value: Vec<String>) -> Self {
        Self::chunks(value)
    }
}

impl From<Vec<&'static str>> for ResponseBody {
    fn from(value: Vec<&'static str>) -> Self {
        Self::chunks(value)
    }
}

impl HttpBody for ResponseBody {
    type Data = Bytes;
    type Error = io::Error;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match &mut self.get_mut().inner {
            Kind::Chunks(chunks) => Poll::Ready(chunks.pop_front().map(|bytes| Ok(Frame::data(bytes)))),
            Kind::Stream(box_body) => Pin::new(box_body).poll_frame(cx),
        }
    }

    fn is_end_stream(&self) -> bool {
        match &self.inner {
            Kind::Chunks(chunks) => chunks.is_empty(),
            Kind::Stream(box_body) => box_body.is_end_stream(),
        }
    }

    fn size_hint(&self) -> SizeHint {
        match &self.inner {
            Kind::Chunks(chunks) => SizeHint::with_exact(chunks.iter().map(|bytes| bytes.len() as u64).sum()),
            Kind::Stream(box_body) => box_body.size_hint(),
        }
    }
}
