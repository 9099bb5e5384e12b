use std::borrow::Cow;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use encoding_rs::{Encoding, UTF_8};
use futures_util::stream::Stream;
use spin::mutex::spin::SpinMutex as Mutex;

use crate::constants;
use crate::state::{FieldInProgress, MultipartState, StreamingStage};

/// What the part headers say about one part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PartDescriptor {
    pub(crate) field_name: String,
    pub(crate) file_name: Option<String>,
    pub(crate) transfer_encoding: String,
    pub(crate) mime_type: String,
    pub(crate) charset: Option<String>,
    pub(crate) index: usize,
}

impl PartDescriptor {
    pub(crate) fn is_file(&self) -> bool {
        self.file_name.is_some() || self.mime_type == mime::APPLICATION_OCTET_STREAM.essence_str()
    }
}

/// A plain field read to its end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CompletedField {
    pub(crate) descriptor: PartDescriptor,
    pub(crate) value: String,
    pub(crate) name_truncated: bool,
    pub(crate) value_truncated: bool,
}

impl From<FieldInProgress> for CompletedField {
    fn from(field: FieldInProgress) -> Self {
        let label = field.descriptor.charset.as_deref().unwrap_or(constants::DEFAULT_CHARSET);
        let encoding = Encoding::for_label(label.as_bytes()).unwrap_or(UTF_8);

        let value = match encoding.decode(&field.value).0 {
            Cow::Owned(s) => s,
            Cow::Borrowed(s) => String::from(s),
        };

        CompletedField {
            descriptor: field.descriptor,
            value,
            name_truncated: field.name_truncated,
            value_truncated: field.value_truncated,
        }
    }
}

/// The byte stream of one file part.
///
/// The tokenizer does not move on to the next part while a `FilePart` is
/// alive and unfinished. Dropping it early hands the rest of the part back
/// to the tokenizer, which drains and discards it.
pub(crate) struct FilePart<S> {
    state: Arc<Mutex<MultipartState<S>>>,
    descriptor: PartDescriptor,
    size_limit: Option<u64>,
    received: u64,
    truncated: bool,
    done: bool,
}

impl<S> FilePart<S> {
    pub(crate) fn new(state: Arc<Mutex<MultipartState<S>>>, descriptor: PartDescriptor, size_limit: Option<u64>) -> Self {
        FilePart {
            state,
            descriptor,
            size_limit,
            received: 0,
            truncated: false,
            done: false,
        }
    }

    pub(crate) fn descriptor(&self) -> &PartDescriptor {
        &self.descriptor
    }

    /// Whether bytes past the file size limit were dropped.
    pub(crate) fn truncated(&self) -> bool {
        self.truncated
    }
}

impl<S> Stream for FilePart<S>
where
    S: Stream<Item = Result<Bytes, crate::Error>> + Unpin,
{
    type Item = crate::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if this.done {
            return Poll::Ready(None);
        }

        let mut guard = this.state.lock();
        let state: &mut MultipartState<S> = &mut guard;

        loop {
            let pending = match state.buffer.poll_stream(cx) {
                Ok(pending) => pending,
                Err(err) => return Poll::Ready(Some(Err(err))),
            };

            let (done, bytes) = match state.buffer.read_field_data(&state.boundary, &this.descriptor.field_name) {
                Ok(Some(data)) => data,
                Ok(None) if pending => return Poll::Pending,
                Ok(None) => return Poll::Ready(Some(Err(crate::Error::IncompleteStream))),
                Err(err) => return Poll::Ready(Some(Err(err))),
            };

            if done {
                this.done = true;
                state.stage = StreamingStage::ReadingBoundary;
                state.is_prev_part_consumed = true;

                if let Some(waker) = state.next_part_waker.take() {
                    waker.wake();
                }
            }

            let bytes = match this.size_limit {
                Some(limit) => {
                    let room = limit.saturating_sub(this.received);
                    if bytes.len() as u64 > room {
                        this.truncated = true;
                        bytes.slice(..room as usize)
                    } else {
                        bytes
                    }
                }
                None => bytes,
            };
            this.received += bytes.len() as u64;

            if !bytes.is_empty() {
                return Poll::Ready(Some(Ok(bytes)));
            }

            if done {
                return Poll::Ready(None);
            }
        }
    }
}

impl<S> Drop for FilePart<S> {
    fn drop(&mut self) {
        if self.done {
            return;
        }

        let mut guard = self.state.lock();
        let state: &mut MultipartState<S> = &mut guard;

        state.stage = StreamingStage::CleaningPrevPartData;
        state.is_prev_part_consumed = true;

        if let Some(waker) = state.next_part_waker.take() {
            waker.wake();
        }
    }
}
