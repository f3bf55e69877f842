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

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use actix_web::{
    body::SizedStream,
    http::header::{HeaderName, HeaderValue},
    http::StatusCode,
    web, HttpResponse,
};
use async_stream::try_stream;
use bytes::{Bytes, BytesMut};
use futures::Stream;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use super::entry::{encode_response, is_framing_header, parse_head, EntryHead, MAX_HEAD_SIZE};
use super::key::CacheKey;
use crate::error::{ProxyError, Result};
use crate::origin::RawResponse;
use crate::web::{CacheStatus, X_CACHE};

const READ_CHUNK: usize = 16 * 1024;
const TEMP_FILE_PREFIX: &str = ".craproxy-";

/// Cache entries stored as files under a root directory
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    pub fn new(root: impl Into<PathBuf>) -> CacheStore {
        CacheStore { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        key.path_under(&self.root)
    }

    /// Open the entry for `key`, reading just its head.
    ///
    /// Returns `Ok(None)` if there is no entry (a cache miss). An entry that
    /// can't be parsed is an error, and is left in place.
    pub async fn lookup(&self, key: &CacheKey) -> Result<Option<CachedEntry>> {
        let path = self.path_for(key);
        let mut file = match File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ProxyError::io(path, e)),
        };

        let file_length = file
            .metadata()
            .await
            .map_err(|e| ProxyError::io(&path, e))?
            .len();

        let mut buffer = BytesMut::with_capacity(READ_CHUNK);
        let (head, head_length) = loop {
            let parsed =
                parse_head(&buffer).map_err(|e| ProxyError::malformed(&path, e.to_string()))?;
            if let Some(parsed) = parsed {
                break parsed;
            }

            if buffer.len() >= MAX_HEAD_SIZE {
                return Err(ProxyError::malformed(&path, "response head is too large"));
            }
            buffer.reserve(READ_CHUNK);
            let read = file
                .read_buf(&mut buffer)
                .await
                .map_err(|e| ProxyError::io(&path, e))?;
            if read == 0 {
                return Err(ProxyError::malformed(&path, "response head is incomplete"));
            }
        };

        let body_prefix = buffer.split_off(head_length).freeze();
        let body_length = file_length.saturating_sub(head_length as u64);
        if let Some(content_length) = head.content_length() {
            if content_length != body_length {
                return Err(ProxyError::malformed(
                    &path,
                    format!("content-length is {content_length} but body is {body_length} bytes"),
                ));
            }
        }

        Ok(Some(CachedEntry {
            head,
            path,
            body_prefix,
            body_length,
            file,
        }))
    }

    /// Store a response from the origin as the entry for `key`.
    ///
    /// The entry is written to a temporary file beside its destination and
    /// renamed into place, so it appears complete or not at all. Missing
    /// directories are created.
    pub async fn put(&self, key: &CacheKey, response: &RawResponse) -> Result<()> {
        let path = self.path_for(key);
        let bytes = encode_response(response);

        let destination = path.clone();
        web::block(move || write_entry(&destination, &bytes))
            .await
            .map_err(|e| ProxyError::io(&path, io::Error::other(e.to_string())))?
            .map_err(|e| ProxyError::io(&path, e))?;

        log::debug!("Stored {key} in {}", path.display());
        Ok(())
    }
}

fn write_entry(destination: &Path, bytes: &[u8]) -> io::Result<()> {
    let directory = destination
        .parent()
        .ok_or_else(|| io::Error::other("cache entry has no parent directory"))?;
    std::fs::create_dir_all(directory)?;

    let mut temp_file = tempfile::Builder::new()
        .prefix(TEMP_FILE_PREFIX)
        .tempfile_in(directory)?;
    temp_file.write_all(bytes)?;
    temp_file.as_file().sync_all()?;
    temp_file.persist(destination).map_err(|e| e.error)?;
    Ok(())
}

/// An open cache entry whose head has been read
pub struct CachedEntry {
    head: EntryHead,
    path: PathBuf,
    // Body bytes read along with the head
    body_prefix: Bytes,
    body_length: u64,
    file: File,
}

impl CachedEntry {
    pub fn head(&self) -> &EntryHead {
        &self.head
    }

    pub fn body_length(&self) -> u64 {
        self.body_length
    }

    /// A response with the stored status and headers, plus `X-Cache`, which
    /// streams the body from the file.
    pub fn into_response(self, cache_status: CacheStatus) -> Result<HttpResponse> {
        let status_code = StatusCode::from_u16(self.head.status)
            .map_err(|e| ProxyError::malformed(&self.path, e.to_string()))?;

        let mut builder = HttpResponse::build(status_code);
        for (name, value) in &self.head.headers {
            if is_framing_header(name) {
                continue;
            }
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ProxyError::malformed(&self.path, e.to_string()))?;
            let value = HeaderValue::from_bytes(value)
                .map_err(|e| ProxyError::malformed(&self.path, e.to_string()))?;
            builder.append_header((name, value));
        }
        builder.insert_header((X_CACHE, cache_status.as_str()));

        let body = body_stream(self.body_prefix, self.file);
        Ok(builder.body(SizedStream::new(self.body_length, body)))
    }
}

// Reading stops when the stream is dropped, e.g. when the client goes away
fn body_stream(prefix: Bytes, mut file: File) -> impl Stream<Item = io::Result<Bytes>> {
    try_stream! {
        if !prefix.is_empty() {
            yield prefix;
        }
        loop {
            let mut chunk = BytesMut::with_capacity(READ_CHUNK);
            if file.read_buf(&mut chunk).await? == 0 {
                break;
            }
            yield chunk.freeze();
        }
    }
}

#[cfg(test)]
mod tests {
    use actix_web::body::to_bytes;
    use http::{header, HeaderMap};
    use tempfile::TempDir;

    use super::*;

    fn raw_response(status: u16, body: &'static [u8]) -> RawResponse {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, "text/css".parse().unwrap());
        RawResponse {
            status: http::StatusCode::from_u16(status).unwrap(),
            headers,
            body: Bytes::from_static(body),
        }
    }

    #[actix_web::test]
    async fn missing_entry_is_a_miss() {
        let root = TempDir::new().unwrap();
        let store = CacheStore::new(root.path());
        let key = CacheKey::new("/v1/site.css");
        assert!(store.lookup(&key).await.unwrap().is_none());
    }

    #[actix_web::test]
    async fn put_then_lookup() {
        let root = TempDir::new().unwrap();
        let store = CacheStore::new(root.path());
        let key = CacheKey::new("/v1/css/site.css");

        store
            .put(&key, &raw_response(200, b"body { color: red }"))
            .await
            .unwrap();
        assert!(root.path().join("v1").join("css").join("site.css").is_file());

        let entry = store.lookup(&key).await.unwrap().unwrap();
        assert_eq!(entry.head().status, 200);
        assert_eq!(entry.body_length(), 19);

        let response = entry.into_response(CacheStatus::Hit).unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get(X_CACHE).unwrap(), "hit");
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "text/css"
        );
        let body = to_bytes(response.into_body()).await.unwrap();
        assert_eq!(&body[..], b"body { color: red }");
    }

    #[actix_web::test]
    async fn large_bodies_stream_in_full() {
        static LARGE: [u8; 100_000] = [b'x'; 100_000];
        let root = TempDir::new().unwrap();
        let store = CacheStore::new(root.path());
        let key = CacheKey::new("/v1/big.js");

        store.put(&key, &raw_response(200, &LARGE)).await.unwrap();
        let entry = store.lookup(&key).await.unwrap().unwrap();
        let response = entry.into_response(CacheStatus::Miss).unwrap();
        let body = to_bytes(response.into_body()).await.unwrap();
        assert_eq!(body.len(), LARGE.len());
    }

    #[actix_web::test]
    async fn no_temporary_files_left_behind() {
        let root = TempDir::new().unwrap();
        let store = CacheStore::new(root.path());
        let key = CacheKey::new("/v2/app.js");
        store.put(&key, &raw_response(200, b"app")).await.unwrap();

        let names: Vec<String> = std::fs::read_dir(root.path().join("v2"))
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["app.js"]);
    }

    #[actix_web::test]
    async fn responses_with_many_headers_can_be_read_back() {
        let root = TempDir::new().unwrap();
        let store = CacheStore::new(root.path());
        let key = CacheKey::new("/v1/noisy.js");

        let mut response = raw_response(200, b"noisy");
        for n in 0..300 {
            response.headers.append(
                http::HeaderName::from_bytes(format!("x-noise-{n}").as_bytes()).unwrap(),
                http::HeaderValue::from_static("1"),
            );
        }
        store.put(&key, &response).await.unwrap();

        let entry = store.lookup(&key).await.unwrap().unwrap();
        assert_eq!(entry.head().headers.len(), crate::cache::entry::MAX_HEADERS);
        let response = entry.into_response(CacheStatus::Hit).unwrap();
        let body = to_bytes(response.into_body()).await.unwrap();
        assert_eq!(&body[..], b"noisy");
    }

    #[actix_web::test]
    async fn malformed_entry_is_an_error_and_is_kept() {
        let root = TempDir::new().unwrap();
        let store = CacheStore::new(root.path());
        let key = CacheKey::new("/v1/broken.js");
        let path = store.path_for(&key);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"not an http response").unwrap();

        let result = store.lookup(&key).await;
        assert!(matches!(result, Err(ProxyError::MalformedEntry { .. })));
        assert!(path.exists());
    }

    #[actix_web::test]
    async fn truncated_entry_is_an_error() {
        let root = TempDir::new().unwrap();
        let store = CacheStore::new(root.path());
        let key = CacheKey::new("/v1/short.js");
        let path = store.path_for(&key);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"HTTP/1.1 200 OK\r\ncontent-length: 10\r\n\r\nabc").unwrap();

        let result = store.lookup(&key).await;
        assert!(matches!(result, Err(ProxyError::MalformedEntry { .. })));
    }

    #[actix_web::test]
    async fn unwritable_root_is_an_io_error() {
        let root = TempDir::new().unwrap();
        // A file where a directory is needed
        let blocker = root.path().join("v1");
        std::fs::write(&blocker, b"").unwrap();
        let store = CacheStore::new(root.path());

        let result = store
            .put(&CacheKey::new("/v1/app.js"), &raw_response(200, b"app"))
            .await;
        assert!(matches!(result, Err(ProxyError::Io { .. })));
    }
}
