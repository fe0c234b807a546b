//! Conditional and byte-range file delivery behind [`Runner::send_file`](crate::Runner::send_file).

use crate::url::percent_encode;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::Stream;
use http_body::{Body as HttpBody, Frame, SizeHint};
use std::fmt;
use std::future::Future;
use std::io::{self, SeekFrom};
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::SystemTime;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, Take};
use tokio_util::io::ReaderStream;
use tracing::debug;

/// Options of [`Runner::send_file`](crate::Runner::send_file).
#[derive(Debug, Clone, Default)]
pub struct SendFileOptions {
    pub content_type: Option<String>,
    pub disposition: Option<String>,
    pub filename: Option<String>,
}

impl SendFileOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the type derived from the file extension. Takes an extension or a mime type.
    #[must_use]
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    #[must_use]
    pub fn disposition(mut self, disposition: impl Into<String>) -> Self {
        self.disposition = Some(disposition.into());
        self
    }

    #[must_use]
    pub fn filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }
}

/// The `Content-Disposition` value for `filename`.
///
/// `"` and `\` are escaped inside the quoted `filename`. A name that is not printable ASCII
/// gets `_` for every other character there, and its exact form as an extra `filename*`.
pub fn content_disposition(disposition: &str, filename: &str) -> String {
    let mut quoted = String::with_capacity(filename.len());
    for ch in filename.chars() {
        match ch {
            '"' | '\\' => {
                quoted.push('\\');
                quoted.push(ch);
            }
            ' '..='~' => quoted.push(ch),
            _ => quoted.push('_'),
        }
    }

    let mut value = format!("{disposition}; filename=\"{quoted}\"");
    if !filename.chars().all(|ch| matches!(ch, ' '..='~')) {
        value.push_str("; filename*=UTF-8''");
        value.push_str(&percent_encode(filename));
    }
    value
}

/// Formats `time` as an IMF-fixdate, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`.
pub fn http_date(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// The inclusive byte window selected by a `Range` header value, if it names exactly one
/// satisfiable range.
///
/// Accepted forms are `bytes=a-b`, `bytes=a-` and `bytes=-n`. The end is clipped to the last
/// byte of the file.
pub fn byte_range(range: &str, size: u64) -> Option<(u64, u64)> {
    let ranges = range.trim().strip_prefix("bytes=")?;
    if size == 0 || ranges.contains(',') {
        return None;
    }

    let (start, end) = ranges.trim().split_once('-')?;
    let (start, end) = (start.trim(), end.trim());
    let last = size - 1;

    match (start.is_empty(), end.is_empty()) {
        (false, false) => {
            let start = start.parse::<u64>().ok()?;
            let end = end.parse::<u64>().ok()?;
            (start <= end && start <= last).then(|| (start, end.min(last)))
        }
        (false, true) => {
            let start = start.parse::<u64>().ok()?;
            (start <= last).then_some((start, last))
        }
        (true, false) => {
            let suffix = end.parse::<u64>().ok()?;
            (suffix > 0).then(|| (size - suffix.min(size), last))
        }
        (true, true) => None,
    }
}

enum State {
    Idle,
    Opening(BoxFuture<'static, io::Result<File>>),
    Streaming(ReaderStream<Take<File>>),
    Done,
}

/// A lazy reader over a byte window of a file.
///
/// Nothing touches the filesystem until the body is first polled. The file handle is closed
/// as soon as the window is read, a read fails, or the body is dropped.
pub struct FileWindowBody {
    path: PathBuf,
    offset: u64,
    remaining: u64,
    chunk_size: usize,
    state: State,
}

impl FileWindowBody {
    pub fn new(path: impl Into<PathBuf>, offset: u64, len: u64, chunk_size: usize) -> Self {
        Self { path: path.into(), offset, remaining: len, chunk_size: chunk_size.max(1), state: State::Idle }
    }

    fn open(&self) -> BoxFuture<'static, io::Result<File>> {
        let path = self.path.clone();
        let offset = self.offset;
        Box::pin(async move {
            let mut file = File::open(&path).await?;
            file.seek(SeekFrom::Start(offset)).await?;
            debug!(path = %path.display(), offset, "file window opened");
            Ok(file)
        })
    }
}

impl fmt::Debug for FileWindowBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileWindowBody")
            .field("path", &self.path)
            .field("offset", &self.offset)
            .field("remaining", &self.remaining)
            .finish_non_exhaustive()
    }
}

impl HttpBody for FileWindowBody {
    type Data = Bytes;
    type Error = io::Error;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        loop {
            match &mut this.state {
                State::Idle if this.remaining == 0 => {
                    this.state = State::Done;
                }
                State::Idle => {
                    this.state = State::Opening(this.open());
                }
                State::Opening(future) => match future.as_mut().poll(cx) {
                    Poll::Ready(Ok(file)) => {
                        let reader = file.take(this.remaining);
                        this.state = State::Streaming(ReaderStream::with_capacity(reader, this.chunk_size));
                    }
                    Poll::Ready(Err(e)) => {
                        this.state = State::Done;
                        return Poll::Ready(Some(Err(e)));
                    }
                    Poll::Pending => return Poll::Pending,
                },
                State::Streaming(stream) => match Pin::new(stream).poll_next(cx) {
                    Poll::Ready(Some(Ok(bytes))) => {
                        this.remaining = this.remaining.saturating_sub(bytes.len() as u64);
                        if this.remaining == 0 {
                            this.state = State::Done;
                        }
                        return Poll::Ready(Some(Ok(Frame::data(bytes))));
                    }
                    Poll::Ready(Some(Err(e))) => {
                        this.state = State::Done;
                        return Poll::Ready(Some(Err(e)));
                    }
                    Poll::Ready(None) => {
                        this.state = State::Done;
                        if this.remaining > 0 {
                            return Poll::Ready(Some(Err(io::Error::new(
                                io::ErrorKind::UnexpectedEof,
                                "file is shorter than the announced window",
                            ))));
                        }
                    }
                    Poll::Pending => return Poll::Pending,
                },
                State::Done => return Poll::Ready(None),
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        matches!(self.state, State::Done) || self.remaining == 0
    }

    fn size_hint(&self) -> SizeHint {
        SizeHint::with_exact(self.remaining)
    }
}
