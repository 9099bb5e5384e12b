use std::task::Waker;

use bytes::BytesMut;

use crate::buffer::StreamBuffer;
use crate::part::PartDescriptor;

pub(crate) struct MultipartState<S> {
    pub(crate) buffer: StreamBuffer<S>,
    pub(crate) boundary: String,
    pub(crate) stage: StreamingStage,
    pub(crate) is_prev_part_consumed: bool,
    pub(crate) next_part_waker: Option<Waker>,
    pub(crate) next_part_idx: usize,
    pub(crate) counts: PartCounts,
    pub(crate) curr_field: Option<FieldInProgress>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StreamingStage {
    FindingFirstBoundary,
    ReadingBoundary,
    DeterminingBoundaryType,
    ReadingTransportPadding,
    ReadingPartHeaders,
    ReadingFieldValue,
    ReadingPartData,
    CleaningPrevPartData,
    ReadingEpilogue,
    Eof,
}

#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct PartCounts {
    pub(crate) parts: u64,
    pub(crate) files: u64,
    pub(crate) fields: u64,
}

/// A plain field whose value is still being read.
pub(crate) struct FieldInProgress {
    pub(crate) descriptor: PartDescriptor,
    pub(crate) name_truncated: bool,
    pub(crate) value: BytesMut,
    pub(crate) value_truncated: bool,
}

impl FieldInProgress {
    pub(crate) fn push(&mut self, bytes: &[u8], limit: Option<usize>) {
        let room = limit.map_or(bytes.len(), |limit| limit.saturating_sub(self.value.len()));

        if bytes.len() > room {
            self.value_truncated = true;
        }

        self.value.extend_from_slice(&bytes[..room.min(bytes.len())]);
    }
}
