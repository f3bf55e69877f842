/*
 Copyright (c) 2025 Mark Hughes

 This program is free software: you can redistribute it and/or modify
 it under the terms of the GNU Affero General Public License as published by
 the Free Software Foundation, either version 3 of the License, or
 (at your option) any later version.

 This program is distributed in the hope that it will be useful,
 but WITHOUT ANY WARRANTY; without even the implied warranty of
 MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 GNU Affero General Public License for more details.

 You should have received a copy of the GNU Affero General Public License
 along with this program. If not, see <https://www.gnu.org/licenses/>.
*/

//! The on-disk form of a cache entry, an HTTP/1.1 response message:
//!
//!    `HTTP/1.1 200 OK\r\n`
//!    `content-type: text/html\r\n`
//!    ...
//!    `content-length: 15\r\n`
//!    `\r\n`
//!    `<html>v1</html>`
//!
//! Headers are stored as received except for message framing. The body is
//! stored decoded from any transfer encoding, so `transfer-encoding` is
//! dropped and a `content-length` for the stored body is written instead.

use crate::origin::RawResponse;

/// Most headers a stored response may have
pub const MAX_HEADERS: usize = 128;

/// Larger heads are treated as corrupt
pub const MAX_HEAD_SIZE: usize = 64 * 1024;

// Room left in the head for the status line and content-length
const HEAD_RESERVE: usize = 256;

/// Headers which describe how a message is framed on the wire rather than
/// its content. These are not stored from the origin and not copied into
/// responses, where actix-web frames the body itself.
const FRAMING_HEADERS: [&str; 3] = ["content-length", "transfer-encoding", "connection"];

pub fn is_framing_header(name: &str) -> bool {
    FRAMING_HEADERS
        .iter()
        .any(|framing| name.eq_ignore_ascii_case(framing))
}

/// Serialise a response from the origin for storage.
///
/// Headers which would take the head past [`MAX_HEADERS`] or
/// [`MAX_HEAD_SIZE`] are dropped, so that every stored entry can be read back.
pub fn encode_response(response: &RawResponse) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(response.body.len() + 1024);
    let reason = response.status.canonical_reason().unwrap_or("");
    bytes.extend_from_slice(
        format!("HTTP/1.1 {} {reason}\r\n", response.status.as_u16()).as_bytes(),
    );

    // One header is kept back for content-length
    let mut header_count = 1;
    let mut dropped = 0;
    for (name, value) in response.headers.iter() {
        if is_framing_header(name.as_str()) {
            continue;
        }
        let line_length = name.as_str().len() + value.len() + 4;
        if header_count >= MAX_HEADERS || bytes.len() + line_length > MAX_HEAD_SIZE - HEAD_RESERVE
        {
            dropped += 1;
            continue;
        }
        header_count += 1;
        bytes.extend_from_slice(name.as_str().as_bytes());
        bytes.extend_from_slice(b": ");
        bytes.extend_from_slice(value.as_bytes());
        bytes.extend_from_slice(b"\r\n");
    }
    if dropped > 0 {
        log::warn!("Dropped {dropped} headers from an origin response which are too many to store");
    }
    bytes.extend_from_slice(format!("content-length: {}\r\n", response.body.len()).as_bytes());
    bytes.extend_from_slice(b"\r\n");
    bytes.extend_from_slice(&response.body);
    bytes
}

/// The status line and headers of a stored response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryHead {
    pub status: u16,
    pub headers: Vec<(String, Vec<u8>)>,
}

impl EntryHead {
    /// The stored content-length, if present and numeric
    pub fn content_length(&self) -> Option<u64> {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| std::str::from_utf8(value).ok())
            .and_then(|value| value.trim().parse().ok())
    }
}

/// Parse the head of a stored response from the start of `buffer`.
///
/// Returns the head and its length in bytes (where the body starts), or
/// `Ok(None)` if `buffer` doesn't yet hold the complete head.
pub fn parse_head(buffer: &[u8]) -> Result<Option<(EntryHead, usize)>, httparse::Error> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut response = httparse::Response::new(&mut headers);

    let head_length = match response.parse(buffer)? {
        httparse::Status::Complete(head_length) => head_length,
        httparse::Status::Partial => return Ok(None),
    };

    // A complete parse always has a status code
    let status = response.code.ok_or(httparse::Error::Status)?;
    let headers = response
        .headers
        .iter()
        .map(|header| (header.name.to_string(), header.value.to_vec()))
        .collect();

    Ok(Some((EntryHead { status, headers }, head_length)))
}
