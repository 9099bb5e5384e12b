use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures_util::stream::Stream;
use memchr::memmem;

use crate::constants;

pub(crate) struct StreamBuffer<S> {
    pub(crate) eof: bool,
    pub(crate) buf: BytesMut,
    pub(crate) stream: S,
}

impl<S> StreamBuffer<S>
where
    S: Stream<Item = Result<Bytes, crate::Error>> + Unpin,
{
    pub fn new(stream: S) -> Self {
        StreamBuffer {
            eof: false,
            buf: BytesMut::new(),
            stream,
        }
    }

    /// Pulls chunks until the source is pending, ends, or the buffer reaches
    /// the high-water mark. Returns `true` when the source is pending and the
    /// task's waker has been registered with it.
    pub fn poll_stream(&mut self, cx: &mut Context<'_>) -> crate::Result<bool> {
        while !self.eof && self.buf.len() < constants::BUFFER_HIGH_WATER {
            match Pin::new(&mut self.stream).poll_next(cx) {
                Poll::Ready(Some(Ok(data))) => self.buf.extend_from_slice(&data),
                Poll::Ready(Some(Err(err))) => return Err(err),
                Poll::Ready(None) => self.eof = true,
                Poll::Pending => return Ok(true),
            }
        }

        Ok(false)
    }

    pub fn read_exact(&mut self, size: usize) -> Option<Bytes> {
        if size <= self.buf.len() {
            Some(self.buf.split_to(size).freeze())
        } else {
            None
        }
    }

    pub fn peek_exact(&self, size: usize) -> Option<&[u8]> {
        self.buf.get(..size)
    }

    pub fn read_until(&mut self, pattern: &[u8]) -> Option<Bytes> {
        memmem::find(&self.buf, pattern).map(|idx| self.buf.split_to(idx + pattern.len()).freeze())
    }

    /// Drops everything before the first `--boundary`. Returns `true` once
    /// the delimiter sits at the front of the buffer.
    pub fn skip_preamble(&mut self, boundary: &str) -> bool {
        let delimiter = format!("{}{}", constants::BOUNDARY_EXT, boundary);

        match memmem::find(&self.buf, delimiter.as_bytes()) {
            Some(idx) => {
                drop(self.buf.split_to(idx));
                true
            }
            None => {
                let keep = delimiter.len() - 1;
                if self.buf.len() > keep {
                    let len = self.buf.len();
                    drop(self.buf.split_to(len - keep));
                }
                false
            }
        }
    }

    /// Reads the next chunk of part data.
    ///
    /// Returns `(true, bytes)` when the closing delimiter was found; the
    /// delimiter itself stays in the buffer, minus its leading CRLF. Bytes
    /// that could be the start of a delimiter split across reads are held
    /// back.
    pub fn read_field_data(&mut self, boundary: &str, field_name: &str) -> crate::Result<Option<(bool, Bytes)>> {
        if self.buf.is_empty() {
            return if self.eof {
                Err(crate::Error::IncompleteFieldData {
                    field_name: field_name.to_owned(),
                })
            } else {
                Ok(None)
            };
        }

        let boundary_deriv = format!("{}{}{}", constants::CRLF, constants::BOUNDARY_EXT, boundary);
        let b_len = boundary_deriv.len();

        if let Some(idx) = memmem::find(&self.buf, boundary_deriv.as_bytes()) {
            let bytes = self.buf.split_to(idx).freeze();

            // discard \r\n.
            drop(self.buf.split_to(constants::CRLF.len()));

            return Ok(Some((true, bytes)));
        }

        if self.eof {
            return Err(crate::Error::IncompleteFieldData {
                field_name: field_name.to_owned(),
            });
        }

        let buf_len = self.buf.len();
        let window_start = buf_len.saturating_sub(b_len - 1);

        let hold_from = memchr::memchr_iter(constants::CR, &self.buf[window_start..])
            .map(|rel_idx| window_start + rel_idx)
            .find(|&idx| boundary_deriv.as_bytes().starts_with(&self.buf[idx..]))
            .unwrap_or(buf_len);

        if hold_from == 0 {
            Ok(None)
        } else {
            Ok(Some((false, self.buf.split_to(hold_from).freeze())))
        }
    }
}
