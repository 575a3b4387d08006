use bytes::Bytes;

use super::endian::{self, Endian};
use super::{
    ClientMessage, ClientMessageKind, Header, INDEX_WIDTH, MAX_CELL_INDEX, ServerMessage,
    ServerMessageKind,
};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("empty frame")]
    EmptyFrame,
    #[error("unknown message kind: {0}")]
    UnknownKind(u8),
    #[error("{kind} body too short: expected {expected} bytes, got {actual}")]
    TruncatedBody {
        kind: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("diff body length {len} is not a multiple of 3")]
    MalformedDiff { len: usize },
    #[error("unsupported integer width: {0}")]
    UnsupportedWidth(usize),
    #[error("read of {width} bytes at offset {offset} exceeds buffer of {len}")]
    OutOfBounds {
        offset: usize,
        width: usize,
        len: usize,
    },
}

/// A cell index that does not fit the 24-bit wire field.
#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
#[error("cell index {index} out of range (must be 0-16777215)")]
pub struct RangeError {
    pub index: usize,
}

fn check_index(index: usize) -> Result<u32, RangeError> {
    if index > MAX_CELL_INDEX {
        return Err(RangeError { index });
    }
    Ok(index as u32)
}

pub fn decode_server_message(bytes: &[u8]) -> Result<ServerMessage, ProtocolError> {
    let (&first, rest) = bytes.split_first().ok_or(ProtocolError::EmptyFrame)?;
    let header = Header::from_byte(first);
    let kind =
        ServerMessageKind::from_u8(header.kind).ok_or(ProtocolError::UnknownKind(header.kind))?;
    Ok(ServerMessage {
        kind,
        aux_len: header.aux_len,
        aux_val: header.aux_val,
        body: Bytes::copy_from_slice(rest),
    })
}

/// Encodes the client's report that cell `index` was set to `value`.
pub fn encode_toggle_report(index: usize, value: bool) -> Result<[u8; 4], RangeError> {
    let index = check_index(index)?;
    let header = Header::new(ClientMessageKind::ToggleReport.as_u8(), 0, value as u8);
    let mut out = Vec::with_capacity(4);
    out.push(header.to_byte());
    endian::write_u24(&mut out, index, Endian::Little)?;
    let mut frame = [0u8; 4];
    frame.copy_from_slice(&out);
    Ok(frame)
}

/// Inverse of [`encode_toggle_report`], as the authority reads it.
pub fn decode_client_message(bytes: &[u8]) -> Result<ClientMessage, ProtocolError> {
    let (&first, rest) = bytes.split_first().ok_or(ProtocolError::EmptyFrame)?;
    let header = Header::from_byte(first);
    match ClientMessageKind::from_u8(header.kind) {
        Some(ClientMessageKind::ToggleReport) => {
            if rest.len() < INDEX_WIDTH {
                return Err(ProtocolError::TruncatedBody {
                    kind: "toggle report",
                    expected: INDEX_WIDTH,
                    actual: rest.len(),
                });
            }
            let index = endian::read_u24(rest, 0, Endian::Little)? as usize;
            Ok(ClientMessage::ToggleReport {
                index,
                value: header.aux_val == 1,
            })
        }
        None => Err(ProtocolError::UnknownKind(header.kind)),
    }
}

/// Number of zero bits needed to round `bits` up to a whole byte.
pub const fn byte_padding_length(bits: usize) -> usize {
    (8 - bits % 8) % 8
}

/// Packs cells MSB first, zero padding the final byte.
pub fn pack_bits(cells: &[bool]) -> Vec<u8> {
    let mut packed = vec![0u8; cells.len().div_ceil(8)];
    for (index, _) in cells.iter().enumerate().filter(|(_, set)| **set) {
        packed[index / 8] |= 1 << (7 - index % 8);
    }
    packed
}

impl ServerMessage {
    pub fn init(body: impl Into<Bytes>, last_byte_bits: u8) -> Self {
        Self {
            kind: ServerMessageKind::Init,
            aux_len: last_byte_bits & 0b111,
            aux_val: 0,
            body: body.into(),
        }
    }

    pub fn init_from_bits(cells: &[bool]) -> Self {
        let tail = (8 - byte_padding_length(cells.len())) % 8;
        Self::init(pack_bits(cells), tail as u8)
    }

    pub fn toggled(index: usize, value: bool) -> Result<Self, RangeError> {
        let mut body = Vec::with_capacity(INDEX_WIDTH);
        endian::write_u24(&mut body, check_index(index)?, Endian::Little)?;
        Ok(Self {
            kind: ServerMessageKind::Toggled,
            aux_len: 0,
            aux_val: value as u8,
            body: body.into(),
        })
    }

    pub fn diff(indices: &[usize], value: bool) -> Result<Self, RangeError> {
        let mut body = Vec::with_capacity(indices.len() * INDEX_WIDTH);
        for &index in indices {
            endian::write_u24(&mut body, check_index(index)?, Endian::Little)?;
        }
        Ok(Self {
            kind: ServerMessageKind::Diff,
            aux_len: 0,
            aux_val: value as u8,
            body: body.into(),
        })
    }

    pub fn header(&self) -> Header {
        Header::new(self.kind.as_u8(), self.aux_len, self.aux_val)
    }

    /// Valid bit count of the final init byte; 0 means all eight.
    pub fn last_byte_bits(&self) -> u8 {
        self.aux_len
    }

    /// Cell value carried by toggled and diff frames.
    pub fn value(&self) -> bool {
        self.aux_val == 1
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.body.len());
        out.push(self.header().to_byte());
        out.extend_from_slice(&self.body);
        out
    }

    pub fn toggled_index(&self) -> Result<usize, ProtocolError> {
        if self.body.len() < INDEX_WIDTH {
            return Err(ProtocolError::TruncatedBody {
                kind: self.kind.label(),
                expected: INDEX_WIDTH,
                actual: self.body.len(),
            });
        }
        Ok(endian::read_u24(&self.body, 0, Endian::Little)? as usize)
    }

    /// Indices listed by a diff body, in encounter order.
    pub fn diff_indices(&self) -> Result<DiffIndices<'_>, ProtocolError> {
        if self.body.len() % INDEX_WIDTH != 0 {
            return Err(ProtocolError::MalformedDiff {
                len: self.body.len(),
            });
        }
        Ok(DiffIndices {
            chunks: self.body.chunks_exact(INDEX_WIDTH),
        })
    }
}

#[derive(Debug, Clone)]
pub struct DiffIndices<'a> {
    chunks: std::slice::ChunksExact<'a, u8>,
}

impl Iterator for DiffIndices<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let chunk = self.chunks.next()?;
        // chunks_exact guarantees a full window, so the read cannot fail
        endian::read_u24(chunk, 0, Endian::Little)
            .ok()
            .map(|index| index as usize)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.chunks.size_hint()
    }
}

impl ExactSizeIterator for DiffIndices<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggle_report_matches_reference_bytes() {
        assert_eq!(encode_toggle_report(5, true).unwrap(), [0x21, 0x05, 0x00, 0x00]);
        assert_eq!(encode_toggle_report(5, false).unwrap(), [0x20, 0x05, 0x00, 0x00]);
        assert_eq!(
            encode_toggle_report(0x12_3456, true).unwrap(),
            [0x21, 0x56, 0x34, 0x12]
        );
    }

    #[test]
    fn toggle_report_rejects_wide_index() {
        assert_eq!(
            encode_toggle_report(MAX_CELL_INDEX + 1, true),
            Err(RangeError {
                index: MAX_CELL_INDEX + 1
            })
        );
        assert!(encode_toggle_report(MAX_CELL_INDEX, true).is_ok());
    }

    #[test]
    fn toggle_report_round_trips_through_client_decoder() {
        let step = 0x1_0001;
        let mut indices: Vec<usize> = (0..=MAX_CELL_INDEX).step_by(step).collect();
        indices.extend([1, 7, 8, 255, 256, 0xFFFF, 0x1_0000, MAX_CELL_INDEX]);
        for index in indices {
            for value in [false, true] {
                let frame = encode_toggle_report(index, value).unwrap();
                let decoded = decode_client_message(&frame).unwrap();
                assert_eq!(decoded, ClientMessage::ToggleReport { index, value });
                assert_eq!(decoded.kind(), ClientMessageKind::ToggleReport);
            }
        }
    }

    #[test]
    fn decode_splits_header_fields() {
        let message = decode_server_message(&[0b000_011_00, 0xFF, 0xA0]).unwrap();
        assert_eq!(message.kind, ServerMessageKind::Init);
        assert_eq!(message.last_byte_bits(), 3);
        assert_eq!(&message.body[..], &[0xFF, 0xA0]);

        let message = decode_server_message(&[0b001_000_01, 0x05, 0x00, 0x00]).unwrap();
        assert_eq!(message.kind, ServerMessageKind::Toggled);
        assert!(message.value());
        assert_eq!(message.toggled_index().unwrap(), 5);
    }

    #[test]
    fn decode_rejects_unknown_kinds_and_empty_frames() {
        for kind in 3u8..8 {
            assert_eq!(
                decode_server_message(&[kind << 5]),
                Err(ProtocolError::UnknownKind(kind))
            );
        }
        assert_eq!(decode_server_message(&[]), Err(ProtocolError::EmptyFrame));
        assert_eq!(
            decode_client_message(&[0x00, 0, 0, 0]),
            Err(ProtocolError::UnknownKind(0))
        );
    }

    #[test]
    fn decode_does_not_validate_bodies() {
        let message = decode_server_message(&[0b010_000_01, 0x01]).unwrap();
        assert_eq!(message.kind, ServerMessageKind::Diff);
        assert_eq!(
            message.diff_indices().map(|it| it.count()),
            Err(ProtocolError::MalformedDiff { len: 1 })
        );

        let message = decode_server_message(&[0b001_000_01, 0x01]).unwrap();
        assert_eq!(
            message.toggled_index(),
            Err(ProtocolError::TruncatedBody {
                kind: "toggled",
                expected: 3,
                actual: 1
            })
        );
    }

    #[test]
    fn diff_indices_in_encounter_order() {
        let message = ServerMessage::diff(&[9, 0x01_0203, 4], true).unwrap();
        let decoded = decode_server_message(&message.encode()).unwrap();
        assert_eq!(decoded.body.len(), 9);
        let indices: Vec<usize> = decoded.diff_indices().unwrap().collect();
        assert_eq!(indices, vec![9, 0x01_0203, 4]);
        assert!(decoded.value());

        let empty = ServerMessage::diff(&[], false).unwrap();
        assert_eq!(empty.diff_indices().unwrap().len(), 0);
    }

    #[test]
    fn init_from_bits_sets_trailing_length() {
        let cells = [true, false, true, true, false, false, false, false, true, true];
        let message = ServerMessage::init_from_bits(&cells);
        assert_eq!(message.last_byte_bits(), 2);
        assert_eq!(&message.body[..], &[0b1011_0000, 0b1100_0000]);
        assert_eq!(message.encode()[0], 0b000_010_00);

        let full = ServerMessage::init_from_bits(&[true; 16]);
        assert_eq!(full.last_byte_bits(), 0);
        assert_eq!(byte_padding_length(16), 0);
        assert_eq!(byte_padding_length(11), 5);
    }
}
