// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Core types for the RPC overlay: opcodes, statuses, result codes, the
//! fixed-layout request/response headers, and the buffer sizing rules.
//!
//! The header codec is pure: it holds no state and touches no I/O. Every
//! PDU starts with the encoded header; the body occupies the remainder of
//! the buffer.

use crate::config::PduSizeSpec;
use std::fmt;

/// Maximum encoded length of `service_name` / `client_name` on the wire.
pub const MAX_NAME_LEN: usize = 64;

// ============================================================================
// Enumerations (stable numeric encodings)
// ============================================================================

/// Request intent set by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum OpCode {
    /// Standard service request.
    Request = 0,
    /// Cancel the currently active request.
    Cancel = 1,
}

impl OpCode {
    #[must_use]
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Request),
            1 => Some(Self::Cancel),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

impl Default for OpCode {
    fn default() -> Self {
        Self::Request
    }
}

/// Server-side progress indicator carried in the response header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum RpcStatus {
    /// No active service.
    #[default]
    None = 0,
    /// Request is being processed.
    Doing = 1,
    /// Cancel is in progress.
    Canceling = 2,
    /// Request has completed.
    Done = 3,
    /// Processing failed.
    Error = 4,
}

impl RpcStatus {
    #[must_use]
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::None),
            1 => Some(Self::Doing),
            2 => Some(Self::Canceling),
            3 => Some(Self::Done),
            4 => Some(Self::Error),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

/// Outcome of a request, orthogonal to [`RpcStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i32)]
pub enum RpcResultCode {
    /// Request completed successfully.
    #[default]
    Ok = 0,
    /// Execution failed.
    Error = 1,
    /// Request was canceled by the client.
    Canceled = 2,
    /// Request was malformed or arrived in an invalid state.
    Invalid = 3,
    /// A prior request for the same client is still in flight.
    Busy = 4,
}

impl RpcResultCode {
    #[must_use]
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::Ok),
            1 => Some(Self::Error),
            2 => Some(Self::Canceled),
            3 => Some(Self::Invalid),
            4 => Some(Self::Busy),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

// ============================================================================
// Codec errors
// ============================================================================

/// Header codec failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Destination buffer is smaller than the header prefix.
    BufferTooSmall { needed: usize, got: usize },
    /// Source buffer ends before the header prefix does.
    UnexpectedEof { needed: usize, got: usize },
    /// A name exceeds [`MAX_NAME_LEN`] bytes.
    NameTooLong { field: &'static str, len: usize },
    /// A name field is not valid UTF-8.
    InvalidUtf8 { field: &'static str },
    /// An enumerated field is outside its range.
    FieldOutOfRange { field: &'static str, value: i64 },
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BufferTooSmall { needed, got } => {
                write!(f, "buffer too small: need {} bytes, got {}", needed, got)
            }
            Self::UnexpectedEof { needed, got } => {
                write!(f, "unexpected end of buffer: need {} bytes, got {}", needed, got)
            }
            Self::NameTooLong { field, len } => {
                write!(f, "{} too long: {} bytes (max {})", field, len, MAX_NAME_LEN)
            }
            Self::InvalidUtf8 { field } => write!(f, "{} is not valid UTF-8", field),
            Self::FieldOutOfRange { field, value } => {
                write!(f, "{} out of range: {}", field, value)
            }
        }
    }
}

impl std::error::Error for CodecError {}

// ============================================================================
// Fixed-string helpers
// ============================================================================

fn encode_fixed_str(
    buf: &mut [u8],
    value: &str,
    field: &'static str,
) -> Result<(), CodecError> {
    let bytes = value.as_bytes();
    if bytes.len() > MAX_NAME_LEN {
        return Err(CodecError::NameTooLong {
            field,
            len: bytes.len(),
        });
    }
    buf[..bytes.len()].copy_from_slice(bytes);
    buf[bytes.len()..MAX_NAME_LEN].fill(0);
    Ok(())
}

fn decode_fixed_str(src: &[u8], field: &'static str) -> Result<String, CodecError> {
    let end = src.iter().position(|&b| b == 0).unwrap_or(MAX_NAME_LEN);
    std::str::from_utf8(&src[..end])
        .map(str::to_owned)
        .map_err(|_| CodecError::InvalidUtf8 { field })
}

// ============================================================================
// Request header
// ============================================================================

/// Fixed header at the start of every request PDU.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RequestHeader {
    /// Monotonically assigned by the client endpoint; unique per
    /// `(service, client)`.
    pub request_id: i64,
    pub service_name: String,
    pub client_name: String,
    pub opcode: OpCode,
    /// Polling-cadence hint for the server; not interpreted by the core.
    pub status_poll_interval_msec: u32,
}

impl RequestHeader {
    /// Encoded size: 8 (id) + 64 (service) + 64 (client) + 4 (opcode)
    /// + 4 (poll interval).
    pub const WIRE_SIZE: usize = 144;

    /// Encode into the first [`Self::WIRE_SIZE`] bytes of `buf`.
    pub fn encode_le(&self, buf: &mut [u8]) -> Result<usize, CodecError> {
        if buf.len() < Self::WIRE_SIZE {
            return Err(CodecError::BufferTooSmall {
                needed: Self::WIRE_SIZE,
                got: buf.len(),
            });
        }

        buf[0..8].copy_from_slice(&self.request_id.to_le_bytes());
        encode_fixed_str(&mut buf[8..72], &self.service_name, "service_name")?;
        encode_fixed_str(&mut buf[72..136], &self.client_name, "client_name")?;
        buf[136..140].copy_from_slice(&self.opcode.as_u32().to_le_bytes());
        buf[140..144].copy_from_slice(&self.status_poll_interval_msec.to_le_bytes());

        Ok(Self::WIRE_SIZE)
    }

    /// Decode from the first [`Self::WIRE_SIZE`] bytes of `src`.
    pub fn decode_le(src: &[u8]) -> Result<(Self, usize), CodecError> {
        if src.len() < Self::WIRE_SIZE {
            return Err(CodecError::UnexpectedEof {
                needed: Self::WIRE_SIZE,
                got: src.len(),
            });
        }

        let request_id = i64::from_le_bytes(src[0..8].try_into().unwrap_or_default());
        let service_name = decode_fixed_str(&src[8..72], "service_name")?;
        let client_name = decode_fixed_str(&src[72..136], "client_name")?;

        let raw_opcode = u32::from_le_bytes(src[136..140].try_into().unwrap_or_default());
        let opcode = OpCode::from_u32(raw_opcode).ok_or(CodecError::FieldOutOfRange {
            field: "opcode",
            value: i64::from(raw_opcode),
        })?;

        let status_poll_interval_msec =
            u32::from_le_bytes(src[140..144].try_into().unwrap_or_default());

        Ok((
            Self {
                request_id,
                service_name,
                client_name,
                opcode,
                status_poll_interval_msec,
            },
            Self::WIRE_SIZE,
        ))
    }

    /// Best-effort read of `(request_id, service_name, client_name)` from a
    /// header whose enumerated fields may be out of range. Used to address
    /// an error reply at a peer that sent garbage.
    #[must_use]
    pub fn peek_identity(src: &[u8]) -> Option<(i64, String, String)> {
        if src.len() < Self::WIRE_SIZE {
            return None;
        }
        let request_id = i64::from_le_bytes(src[0..8].try_into().ok()?);
        let service_name = decode_fixed_str(&src[8..72], "service_name").ok()?;
        let client_name = decode_fixed_str(&src[72..136], "client_name").ok()?;
        Some((request_id, service_name, client_name))
    }
}

// ============================================================================
// Response header
// ============================================================================

/// Fixed header at the start of every response PDU. Identity fields echo
/// the request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResponseHeader {
    pub request_id: i64,
    pub service_name: String,
    pub client_name: String,
    pub status: RpcStatus,
    /// Progress hint; not interpreted by the core.
    pub processing_percentage: u32,
    pub result_code: RpcResultCode,
}

impl ResponseHeader {
    /// Encoded size: 8 + 64 + 64 + 4 (status) + 4 (percentage) + 4 (result).
    pub const WIRE_SIZE: usize = 148;

    pub fn encode_le(&self, buf: &mut [u8]) -> Result<usize, CodecError> {
        if buf.len() < Self::WIRE_SIZE {
            return Err(CodecError::BufferTooSmall {
                needed: Self::WIRE_SIZE,
                got: buf.len(),
            });
        }

        buf[0..8].copy_from_slice(&self.request_id.to_le_bytes());
        encode_fixed_str(&mut buf[8..72], &self.service_name, "service_name")?;
        encode_fixed_str(&mut buf[72..136], &self.client_name, "client_name")?;
        buf[136..140].copy_from_slice(&self.status.as_u32().to_le_bytes());
        buf[140..144].copy_from_slice(&self.processing_percentage.to_le_bytes());
        buf[144..148].copy_from_slice(&self.result_code.as_i32().to_le_bytes());

        Ok(Self::WIRE_SIZE)
    }

    pub fn decode_le(src: &[u8]) -> Result<(Self, usize), CodecError> {
        if src.len() < Self::WIRE_SIZE {
            return Err(CodecError::UnexpectedEof {
                needed: Self::WIRE_SIZE,
                got: src.len(),
            });
        }

        let request_id = i64::from_le_bytes(src[0..8].try_into().unwrap_or_default());
        let service_name = decode_fixed_str(&src[8..72], "service_name")?;
        let client_name = decode_fixed_str(&src[72..136], "client_name")?;

        let raw_status = u32::from_le_bytes(src[136..140].try_into().unwrap_or_default());
        let status = RpcStatus::from_u32(raw_status).ok_or(CodecError::FieldOutOfRange {
            field: "status",
            value: i64::from(raw_status),
        })?;

        let processing_percentage =
            u32::from_le_bytes(src[140..144].try_into().unwrap_or_default());

        let raw_result = i32::from_le_bytes(src[144..148].try_into().unwrap_or_default());
        let result_code =
            RpcResultCode::from_i32(raw_result).ok_or(CodecError::FieldOutOfRange {
                field: "result_code",
                value: i64::from(raw_result),
            })?;

        Ok((
            Self {
                request_id,
                service_name,
                client_name,
                status,
                processing_percentage,
                result_code,
            },
            Self::WIRE_SIZE,
        ))
    }

    /// Read only the `request_id` field; used for the stale check before a
    /// full decode is attempted.
    pub fn peek_request_id(src: &[u8]) -> Result<i64, CodecError> {
        if src.len() < 8 {
            return Err(CodecError::UnexpectedEof {
                needed: 8,
                got: src.len(),
            });
        }
        Ok(i64::from_le_bytes(src[0..8].try_into().unwrap_or_default()))
    }
}

// ============================================================================
// Buffer sizing
// ============================================================================

/// Size of a request PDU: the server's base region, the client's heap
/// region, plus the fixed metadata overhead.
#[must_use]
pub fn request_pdu_size(sizes: &PduSizeSpec, pdu_meta_data_size: usize) -> usize {
    sizes.server.base_size + sizes.client.heap_size + pdu_meta_data_size
}

/// Size of a response PDU: the client's base region, the server's heap
/// region, plus the fixed metadata overhead.
#[must_use]
pub fn response_pdu_size(sizes: &PduSizeSpec, pdu_meta_data_size: usize) -> usize {
    sizes.client.base_size + sizes.server.heap_size + pdu_meta_data_size
}

// ============================================================================
// Event carriers
// ============================================================================

/// A request as delivered to the server application by `poll`.
#[derive(Debug, Clone)]
pub struct RpcRequest {
    /// Convenience copy of `header.client_name`.
    pub client_name: String,
    pub header: RequestHeader,
    /// The full PDU buffer (header prefix + body).
    pub pdu: Vec<u8>,
}

/// A response as delivered to the client application by `poll`.
#[derive(Debug, Clone)]
pub struct RpcResponse {
    pub header: ResponseHeader,
    /// The full PDU buffer (header prefix + body).
    pub pdu: Vec<u8>,
}

/// Event surfaced by a client endpoint's `poll`. Absence of an event is
/// `None` at the `Option` level.
#[derive(Debug)]
pub enum ClientEvent {
    /// A valid response with `result_code == OK` arrived.
    ResponseIn(RpcResponse),
    /// The server acknowledged a cancel (`result_code == CANCELED`).
    ResponseCancel(RpcResponse),
    /// The deadline elapsed; a cancel was emitted internally.
    ResponseTimeout,
}

/// Event surfaced by a server endpoint's `poll`.
#[derive(Debug)]
pub enum ServerEvent {
    /// A new request was accepted; the client row is now `RUNNING`.
    RequestIn(RpcRequest),
    /// A matching cancel arrived; the client row is now `CANCELLING`.
    RequestCancel(RpcRequest),
}
