use encoding_rs::{Encoding, UTF_8};
use http::header::{self, HeaderMap};

pub(crate) struct ContentDisposition {
    pub(crate) is_form_data: bool,
    pub(crate) field_name: Option<String>,
    pub(crate) file_name: Option<String>,
}

impl ContentDisposition {
    pub fn parse(headers: &HeaderMap) -> ContentDisposition {
        let value = headers
            .get(header::CONTENT_DISPOSITION)
            .map(|val| String::from_utf8_lossy(val.as_bytes()).into_owned());

        match value {
            Some(value) => ContentDisposition::parse_value(&value),
            None => ContentDisposition {
                is_form_data: false,
                field_name: None,
                file_name: None,
            },
        }
    }

    pub fn parse_value(value: &str) -> ContentDisposition {
        let mut params = split_params(value);
        let disposition = params.next().map(|(key, _)| key);

        let mut field_name = None;
        let mut file_name = None;
        let mut ext_file_name = None;

        for (key, val) in params {
            match key.to_ascii_lowercase().as_str() {
                "name" => field_name = val,
                "filename" => file_name = val,
                "filename*" => ext_file_name = val.and_then(|val| decode_ext_value(&val)),
                _ => {}
            }
        }

        ContentDisposition {
            is_form_data: disposition.map_or(false, |d| d.eq_ignore_ascii_case("form-data")),
            field_name,
            file_name: ext_file_name.or(file_name),
        }
    }
}

// Yields `(key, value)` pairs separated by `;`, unquoting quoted values.
fn split_params(input: &str) -> impl Iterator<Item = (String, Option<String>)> + '_ {
    let mut rest = input;

    std::iter::from_fn(move || {
        rest = rest.trim_start_matches(|c: char| c == ';' || c.is_ascii_whitespace());
        if rest.is_empty() {
            return None;
        }

        let key_end = rest.find(|c: char| c == '=' || c == ';').unwrap_or(rest.len());
        let key = rest[..key_end].trim().to_owned();
        rest = &rest[key_end..];

        if !rest.starts_with('=') {
            return Some((key, None));
        }
        rest = rest[1..].trim_start();

        let value = if let Some(quoted) = rest.strip_prefix('"') {
            let mut value = String::new();
            let mut chars = quoted.char_indices();
            let mut consumed = quoted.len();

            while let Some((idx, ch)) = chars.next() {
                match ch {
                    '\\' => {
                        if let Some((_, escaped)) = chars.next() {
                            value.push(escaped);
                        }
                    }
                    '"' => {
                        consumed = idx + 1;
                        break;
                    }
                    _ => value.push(ch),
                }
            }

            rest = &quoted[consumed..];
            let skip = rest.find(';').unwrap_or(rest.len());
            rest = &rest[skip..];
            value
        } else {
            let end = rest.find(';').unwrap_or(rest.len());
            let value = rest[..end].trim().to_owned();
            rest = &rest[end..];
            value
        };

        Some((key, Some(value)))
    })
}

// RFC 5987 `charset'lang'percent-encoded` values.
fn decode_ext_value(value: &str) -> Option<String> {
    let mut pieces = value.splitn(3, '\'');
    let charset = pieces.next()?;
    let _lang = pieces.next()?;
    let encoded = pieces.next()?;

    let bytes = percent_decode(encoded.as_bytes());
    let encoding = Encoding::for_label(charset.as_bytes()).unwrap_or(UTF_8);
    let (text, _, _) = encoding.decode(&bytes);

    Some(text.into_owned())
}

fn percent_decode(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut idx = 0;

    while idx < input.len() {
        if input[idx] == b'%' && idx + 2 < input.len() {
            let hex = std::str::from_utf8(&input[idx + 1..idx + 3]).ok();
            if let Some(byte) = hex.and_then(|hex| u8::from_str_radix(hex, 16).ok()) {
                out.push(byte);
                idx += 3;
                continue;
            }
        }
        out.push(input[idx]);
        idx += 1;
    }

    out
}
