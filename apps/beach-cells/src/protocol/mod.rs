//! Binary wire protocol spoken between the grid authority and this client.
//!
//! Every transport frame carries exactly one message: a one byte header
//! `[kind:3][aux_len:3][aux_val:2]` followed by a kind specific body. Server
//! and client kinds live in separate enums; the numeric value 1 appears in
//! both without the two ever being interchangeable.

use bytes::Bytes;

pub mod endian;
pub mod wire;

pub use wire::{
    ProtocolError, RangeError, byte_padding_length, decode_client_message,
    decode_server_message, encode_toggle_report, pack_bits,
};

/// Largest cell index representable in the 24-bit index fields.
pub const MAX_CELL_INDEX: usize = 0xFF_FFFF;

/// Width in bytes of one encoded cell index.
pub const INDEX_WIDTH: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ServerMessageKind {
    Init = 0,
    Toggled = 1,
    Diff = 2,
}

impl ServerMessageKind {
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Init),
            1 => Some(Self::Toggled),
            2 => Some(Self::Diff),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Toggled => "toggled",
            Self::Diff => "diff",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ClientMessageKind {
    ToggleReport = 1,
}

impl ClientMessageKind {
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::ToggleReport),
            _ => None,
        }
    }
}

/// Unpacked header byte. `kind` is the raw 3-bit discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub kind: u8,
    pub aux_len: u8,
    pub aux_val: u8,
}

impl Header {
    pub const fn new(kind: u8, aux_len: u8, aux_val: u8) -> Self {
        Self {
            kind: kind & 0b111,
            aux_len: aux_len & 0b111,
            aux_val: aux_val & 0b11,
        }
    }

    pub const fn from_byte(byte: u8) -> Self {
        Self {
            kind: byte >> 5,
            aux_len: (byte & 0b0001_1100) >> 2,
            aux_val: byte & 0b0000_0011,
        }
    }

    pub const fn to_byte(self) -> u8 {
        (self.kind << 5) | (self.aux_len << 2) | self.aux_val
    }
}

/// A decoded server frame. The body is kept raw; each handler validates the
/// shape it needs through [`ServerMessage::toggled_index`] or
/// [`ServerMessage::diff_indices`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerMessage {
    pub kind: ServerMessageKind,
    pub aux_len: u8,
    pub aux_val: u8,
    pub body: Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientMessage {
    ToggleReport { index: usize, value: bool },
}

impl ClientMessage {
    pub const fn kind(&self) -> ClientMessageKind {
        match self {
            Self::ToggleReport { .. } => ClientMessageKind::ToggleReport,
        }
    }
}
