// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Message framing.
//!
//! Every element is stored as a fixed-width length prefix followed by the
//! payload bytes, contiguously in arena-address space:
//!
//! ```text
//! ┌──────────────────────┬──────────────────────────────┐
//! │  Length (8B)         │   Payload (variable)         │
//! │  little-endian u64   │   raw bytes, may span arenas │
//! └──────────────────────┴──────────────────────────────┘
//! ```
//!
//! - **Length**: never split across arenas. A writer that would straddle an
//!   arena boundary skips to offset 0 of the next arena, and the reader
//!   mirrors the skip.
//! - **Payload**: split freely; each arena contributes as many contiguous
//!   bytes as it has left.

/// Size of the length prefix in bytes (8 bytes = u64).
pub const LENGTH_PREFIX_SIZE: u64 = 8;

/// Encode a payload length as it is stored on disk.
#[inline]
pub(crate) const fn encode_length(length: u64) -> [u8; LENGTH_PREFIX_SIZE as usize] {
    length.to_le_bytes()
}

/// Decode a stored length prefix.
#[inline]
pub(crate) const fn decode_length(buf: [u8; LENGTH_PREFIX_SIZE as usize]) -> u64 {
    u64::from_le_bytes(buf)
}

/// Total stream bytes occupied by a payload, excluding any alignment skip.
///
/// Returns `None` if the framed size does not fit in a `u64`.
#[inline]
pub(crate) const fn framed_size(payload_len: u64) -> Option<u64> {
    LENGTH_PREFIX_SIZE.checked_add(payload_len)
}
