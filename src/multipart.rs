use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures_util::stream::Stream;
use http::header::HeaderMap;
use spin::mutex::spin::SpinMutex as Mutex;

use crate::buffer::StreamBuffer;
use crate::content_disposition::ContentDisposition;
use crate::error::Limit;
use crate::helpers;
use crate::part::{CompletedField, FilePart, PartDescriptor};
use crate::state::{FieldInProgress, MultipartState, PartCounts, StreamingStage};
use crate::{constants, Limits};

/// What the tokenizer reports to its driver.
pub(crate) enum Token<S> {
    /// A file part begins; its bytes flow through the carried stream.
    PartStarted(FilePart<S>),
    /// A plain field was read to its end.
    FieldComplete(CompletedField),
    /// A count limit was crossed. Nothing follows.
    LimitHit(Limit),
}

enum Progress {
    Token(TokenKind),
    Continue,
    NeedMore,
    Finished,
}

enum TokenKind {
    PartStarted(PartDescriptor),
    FieldComplete(CompletedField),
    LimitHit(Limit),
}

/// Splits a `multipart/form-data` byte stream into parts.
///
/// This is a [`Stream`] of [`Token`]s ending after the closing delimiter.
/// While a file part is being read through its [`FilePart`], polling the
/// tokenizer stays pending until that part is finished or dropped.
pub(crate) struct Multipart<S> {
    state: Arc<Mutex<MultipartState<S>>>,
    limits: Limits,
    preserve_path: bool,
}

impl<S> Multipart<S>
where
    S: Stream<Item = Result<Bytes, crate::Error>> + Unpin,
{
    pub(crate) fn new<B: Into<String>>(stream: S, boundary: B, limits: Limits, preserve_path: bool) -> Multipart<S> {
        let state = MultipartState {
            buffer: StreamBuffer::new(stream),
            boundary: boundary.into(),
            stage: StreamingStage::FindingFirstBoundary,
            is_prev_part_consumed: true,
            next_part_waker: None,
            next_part_idx: 0,
            counts: PartCounts::default(),
            curr_field: None,
        };

        Multipart {
            state: Arc::new(Mutex::new(state)),
            limits,
            preserve_path,
        }
    }
}

impl<S> Stream for Multipart<S>
where
    S: Stream<Item = Result<Bytes, crate::Error>> + Unpin,
{
    type Item = crate::Result<Token<S>>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let mut guard = this.state.lock();
        let state: &mut MultipartState<S> = &mut guard;

        loop {
            if state.stage == StreamingStage::Eof {
                return Poll::Ready(None);
            }

            if !state.is_prev_part_consumed {
                state.next_part_waker = Some(cx.waker().clone());
                return Poll::Pending;
            }

            let pending = match state.buffer.poll_stream(cx) {
                Ok(pending) => pending,
                Err(err) => {
                    state.stage = StreamingStage::Eof;
                    return Poll::Ready(Some(Err(err)));
                }
            };

            let token = match advance(state, &this.limits, this.preserve_path) {
                Ok(Progress::Token(token)) => token,
                Ok(Progress::Continue) => continue,
                Ok(Progress::NeedMore) if pending => return Poll::Pending,
                Ok(Progress::NeedMore) => {
                    state.stage = StreamingStage::Eof;
                    return Poll::Ready(Some(Err(crate::Error::IncompleteStream)));
                }
                Ok(Progress::Finished) => return Poll::Ready(None),
                Err(err) => {
                    state.stage = StreamingStage::Eof;
                    return Poll::Ready(Some(Err(err)));
                }
            };

            let token = match token {
                TokenKind::PartStarted(descriptor) => Token::PartStarted(FilePart::new(
                    Arc::clone(&this.state),
                    descriptor,
                    this.limits.file_size,
                )),
                TokenKind::FieldComplete(field) => Token::FieldComplete(field),
                TokenKind::LimitHit(limit) => Token::LimitHit(limit),
            };

            return Poll::Ready(Some(Ok(token)));
        }
    }
}

fn advance<S>(state: &mut MultipartState<S>, limits: &Limits, preserve_path: bool) -> crate::Result<Progress>
where
    S: Stream<Item = Result<Bytes, crate::Error>> + Unpin,
{
    match state.stage {
        StreamingStage::FindingFirstBoundary => {
            if state.buffer.skip_preamble(&state.boundary) {
                state.stage = StreamingStage::ReadingBoundary;
                Ok(Progress::Continue)
            } else {
                Ok(Progress::NeedMore)
            }
        }
        StreamingStage::ReadingBoundary => {
            let delimiter = format!("{}{}", constants::BOUNDARY_EXT, state.boundary);

            match state.buffer.read_exact(delimiter.len()) {
                Some(bytes) if bytes[..] == *delimiter.as_bytes() => {
                    state.stage = StreamingStage::DeterminingBoundaryType;
                    Ok(Progress::Continue)
                }
                Some(_) => Err(crate::Error::IncompleteStream),
                None => Ok(Progress::NeedMore),
            }
        }
        StreamingStage::DeterminingBoundaryType => {
            let is_closing = match state.buffer.peek_exact(constants::BOUNDARY_EXT.len()) {
                Some(ext) => ext == constants::BOUNDARY_EXT.as_bytes(),
                None => return Ok(Progress::NeedMore),
            };

            if is_closing {
                log::trace!("closing delimiter reached after {} parts", state.counts.parts);
                state.stage = StreamingStage::ReadingEpilogue;
                Ok(Progress::Continue)
            } else {
                state.stage = StreamingStage::ReadingTransportPadding;
                Ok(Progress::Continue)
            }
        }
        StreamingStage::ReadingTransportPadding => match state.buffer.read_until(constants::CRLF.as_bytes()) {
            Some(line) => {
                let padding = &line[..line.len() - constants::CRLF.len()];
                if padding.iter().all(|b| *b == b' ' || *b == b'\t') {
                    state.stage = StreamingStage::ReadingPartHeaders;
                    Ok(Progress::Continue)
                } else {
                    Err(crate::Error::IncompleteStream)
                }
            }
            None if state.buffer.buf.len() > constants::MAX_HEADER_BLOCK_SIZE => Err(crate::Error::HeadersTooLarge {
                limit: constants::MAX_HEADER_BLOCK_SIZE,
            }),
            None => Ok(Progress::NeedMore),
        },
        StreamingStage::ReadingPartHeaders => {
            let headers = match read_part_headers(&mut state.buffer)? {
                Some(headers) => headers,
                None => return Ok(Progress::NeedMore),
            };

            start_part(state, headers, limits, preserve_path)
        }
        StreamingStage::ReadingFieldValue => {
            let field = match state.curr_field.as_mut() {
                Some(field) => field,
                None => {
                    state.stage = StreamingStage::CleaningPrevPartData;
                    return Ok(Progress::Continue);
                }
            };

            match state.buffer.read_field_data(&state.boundary, &field.descriptor.field_name)? {
                Some((done, bytes)) => {
                    field.push(&bytes, limits.field_value_length);

                    if !done {
                        return Ok(Progress::Continue);
                    }

                    state.stage = StreamingStage::ReadingBoundary;
                    match state.curr_field.take() {
                        Some(field) => Ok(Progress::Token(TokenKind::FieldComplete(field.into()))),
                        None => Ok(Progress::Continue),
                    }
                }
                None => Ok(Progress::NeedMore),
            }
        }
        StreamingStage::ReadingPartData | StreamingStage::CleaningPrevPartData => {
            match state.buffer.read_field_data(&state.boundary, "")? {
                Some((true, _)) => {
                    state.stage = StreamingStage::ReadingBoundary;
                    Ok(Progress::Continue)
                }
                Some((false, _)) => Ok(Progress::Continue),
                None => Ok(Progress::NeedMore),
            }
        }
        StreamingStage::ReadingEpilogue => {
            if state.buffer.eof {
                state.buffer.buf.clear();
                state.stage = StreamingStage::Eof;
                Ok(Progress::Finished)
            } else if !state.buffer.buf.is_empty() {
                state.buffer.buf.clear();
                Ok(Progress::Continue)
            } else {
                Ok(Progress::NeedMore)
            }
        }
        StreamingStage::Eof => Ok(Progress::Finished),
    }
}

fn read_part_headers<S>(buffer: &mut StreamBuffer<S>) -> crate::Result<Option<HeaderMap>>
where
    S: Stream<Item = Result<Bytes, crate::Error>> + Unpin,
{
    let no_headers = match buffer.peek_exact(constants::CRLF.len()) {
        Some(start) => start == constants::CRLF.as_bytes(),
        None => return Ok(None),
    };

    if no_headers {
        drop(buffer.read_exact(constants::CRLF.len()));
        return Ok(Some(HeaderMap::new()));
    }

    let header_bytes = match buffer.read_until(constants::CRLF_CRLF.as_bytes()) {
        Some(bytes) => bytes,
        None if buffer.buf.len() > constants::MAX_HEADER_BLOCK_SIZE => {
            return Err(crate::Error::HeadersTooLarge {
                limit: constants::MAX_HEADER_BLOCK_SIZE,
            })
        }
        None => return Ok(None),
    };

    let mut headers = [httparse::EMPTY_HEADER; constants::MAX_HEADERS];

    match httparse::parse_headers(&header_bytes, &mut headers) {
        Ok(httparse::Status::Complete((_, raw_headers))) => helpers::convert_raw_headers_to_header_map(raw_headers).map(Some),
        Ok(httparse::Status::Partial) => Err(crate::Error::IncompleteHeaders),
        Err(err) => Err(crate::Error::ReadHeaderFailed(err)),
    }
}

fn start_part<S>(
    state: &mut MultipartState<S>,
    headers: HeaderMap,
    limits: &Limits,
    preserve_path: bool,
) -> crate::Result<Progress> {
    state.counts.parts += 1;
    if Limits::exceeded(limits.parts, state.counts.parts) {
        return Ok(limit_hit(state, Limit::Parts));
    }

    let content_disposition = ContentDisposition::parse(&headers);
    if !content_disposition.is_form_data {
        log::trace!("skipping part without a form-data disposition");
        state.stage = StreamingStage::CleaningPrevPartData;
        return Ok(Progress::Continue);
    }

    let (mime_type, charset) = helpers::parse_part_content_type(&headers);
    let transfer_encoding = headers
        .get(constants::CONTENT_TRANSFER_ENCODING)
        .and_then(|val| val.to_str().ok())
        .map(|val| val.trim().to_ascii_lowercase())
        .unwrap_or_else(|| constants::DEFAULT_TRANSFER_ENCODING.to_owned());

    let (field_name, name_truncated) = helpers::truncate_to(
        content_disposition.field_name.unwrap_or_default(),
        limits.field_name_length,
    );

    let file_name = match content_disposition.file_name {
        Some(name) if !preserve_path => Some(helpers::basename(&name).to_owned()),
        name => name,
    };

    let index = state.next_part_idx;
    state.next_part_idx += 1;

    let descriptor = PartDescriptor {
        field_name,
        file_name,
        transfer_encoding,
        mime_type,
        charset,
        index,
    };

    if descriptor.is_file() {
        state.counts.files += 1;
        if Limits::exceeded(limits.files, state.counts.files) {
            return Ok(limit_hit(state, Limit::Files));
        }

        log::trace!("file part {} '{}' started", index, descriptor.field_name);
        state.stage = StreamingStage::ReadingPartData;
        state.is_prev_part_consumed = false;

        Ok(Progress::Token(TokenKind::PartStarted(descriptor)))
    } else {
        state.counts.fields += 1;
        if Limits::exceeded(limits.fields, state.counts.fields) {
            return Ok(limit_hit(state, Limit::Fields));
        }

        state.curr_field = Some(FieldInProgress {
            descriptor,
            name_truncated,
            value: BytesMut::new(),
            value_truncated: false,
        });
        state.stage = StreamingStage::ReadingFieldValue;

        Ok(Progress::Continue)
    }
}

fn limit_hit<S>(state: &mut MultipartState<S>, limit: Limit) -> Progress {
    log::warn!("multipart {} crossed after {} parts", limit.tag(), state.counts.parts);
    state.stage = StreamingStage::Eof;
    Progress::Token(TokenKind::LimitHit(limit))
}
