use bytes::Bytes;
use futures_util::future;
use futures_util::stream::{self, BoxStream, Stream, StreamExt, TryStreamExt};
#[cfg(feature = "tokio-io")]
use {tokio::io::AsyncRead, tokio_util::io::ReaderStream};

use crate::error::BoxError;

/// A body handed to [`FormDecoder::parse`](crate::FormDecoder::parse).
///
/// Whole bodies given as bytes or text are decoded as a single chunk.
pub enum Input<'a> {
    Stream(BoxStream<'a, Result<Bytes, BoxError>>),
    Bytes(Bytes),
    Text(String),
}

impl<'a> Input<'a> {
    /// Wraps any fallible stream of byte chunks.
    pub fn stream<S, O, E>(stream: S) -> Input<'a>
    where
        S: Stream<Item = Result<O, E>> + Send + 'a,
        O: Into<Bytes> + 'a,
        E: Into<BoxError> + 'a,
    {
        Input::Stream(stream.map_ok(Into::into).map_err(Into::into).boxed())
    }

    /// Reads the body from an [`AsyncRead`].
    ///
    /// # Optional
    ///
    /// This requires the optional `tokio-io` feature to be enabled.
    #[cfg(feature = "tokio-io")]
    #[cfg_attr(nightly, doc(cfg(feature = "tokio-io")))]
    pub fn reader<R>(reader: R) -> Input<'a>
    where
        R: AsyncRead + Send + 'a,
    {
        Input::stream(ReaderStream::new(reader))
    }

    pub(crate) fn into_stream(self) -> BoxStream<'a, Result<Bytes, BoxError>> {
        match self {
            Input::Stream(stream) => stream,
            Input::Bytes(bytes) => stream::once(future::ready(Ok(bytes))).boxed(),
            Input::Text(text) => stream::once(future::ready(Ok(Bytes::from(text)))).boxed(),
        }
    }
}

impl From<Bytes> for Input<'_> {
    fn from(bytes: Bytes) -> Self {
        Input::Bytes(bytes)
    }
}

impl From<Vec<u8>> for Input<'_> {
    fn from(bytes: Vec<u8>) -> Self {
        Input::Bytes(bytes.into())
    }
}

impl From<&'static [u8]> for Input<'_> {
    fn from(bytes: &'static [u8]) -> Self {
        Input::Bytes(Bytes::from_static(bytes))
    }
}

impl From<String> for Input<'_> {
    fn from(text: String) -> Self {
        Input::Text(text)
    }
}

impl From<&str> for Input<'_> {
    fn from(text: &str) -> Self {
        Input::Text(text.to_owned())
    }
}
