use std::collections::hash_map::RandomState;
use std::convert::TryFrom;
use std::hash::{BuildHasher, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use httparse::Header;

use crate::constants;

pub(crate) fn convert_raw_headers_to_header_map(raw_headers: &[Header<'_>]) -> crate::Result<HeaderMap> {
    let mut headers = HeaderMap::with_capacity(raw_headers.len());

    for raw_header in raw_headers {
        let name = HeaderName::try_from(raw_header.name).map_err(|err| crate::Error::DecodeHeaderName {
            name: raw_header.name.to_owned(),
            cause: err.into(),
        })?;

        let value = HeaderValue::try_from(raw_header.value).map_err(|err| crate::Error::DecodeHeaderValue {
            value: raw_header.value.to_owned(),
            cause: err.into(),
        })?;

        headers.append(name, value);
    }

    Ok(headers)
}

/// Returns the lowercased essence of a part's `Content-Type` and its charset.
pub(crate) fn parse_part_content_type(headers: &HeaderMap) -> (String, Option<String>) {
    let mime = headers
        .get(header::CONTENT_TYPE)
        .and_then(|val| val.to_str().ok())
        .and_then(|val| val.parse::<mime::Mime>().ok());

    match mime {
        Some(mime) => {
            let charset = mime.get_param(mime::CHARSET).map(|charset| charset.as_str().to_owned());
            (mime.essence_str().to_ascii_lowercase(), charset)
        }
        None => (constants::DEFAULT_MIME_TYPE.to_owned(), None),
    }
}

/// Cuts `value` to at most `limit` bytes on a char boundary.
pub(crate) fn truncate_to(mut value: String, limit: Option<usize>) -> (String, bool) {
    match limit {
        Some(limit) if value.len() > limit => {
            let mut end = limit;
            while !value.is_char_boundary(end) {
                end -= 1;
            }
            value.truncate(end);
            (value, true)
        }
        _ => (value, false),
    }
}

/// The last path component of a client supplied filename.
pub(crate) fn basename(name: &str) -> &str {
    let base = name.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or(name);

    match base {
        "." | ".." => "",
        base => base,
    }
}

/// The extension of `name` including the dot, or `""`.
///
/// Dotfiles such as `.bashrc` have no extension.
pub(crate) fn extension(name: &str) -> &str {
    let base = basename(name);

    match base.rfind('.') {
        Some(idx) if idx > 0 => &base[idx..],
        _ => "",
    }
}

static NONCE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A random, content independent file name keeping the extension of
/// `original`.
pub(crate) fn random_file_name(original: &str) -> String {
    let mut hasher = RandomState::new().build_hasher();
    hasher.write_u64(NONCE_COUNTER.fetch_add(1, Ordering::Relaxed));
    hasher.write_u128(
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos())
            .unwrap_or_default(),
    );
    let nonce = hasher.finish();

    format!("{}{}", blake3::hash(&nonce.to_le_bytes()).to_hex(), extension(original))
}
