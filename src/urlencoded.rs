use bytes::{Bytes, BytesMut};
use futures_util::stream::{Stream, TryStreamExt};

use crate::error::Limit;
use crate::options::{Kind, ParseConfig};
use crate::{accumulate, constants, helpers, Form, Limits};

/// Decodes an `application/x-www-form-urlencoded` body.
///
/// Only the bytes of the pair currently being received are buffered. With
/// length limits set, a pair is rejected as soon as its encoded form is
/// longer than any pair within the limits could be.
pub(crate) async fn decode<S>(mut stream: S, config: &ParseConfig) -> crate::Result<Form>
where
    S: Stream<Item = Result<Bytes, crate::Error>> + Unpin,
{
    let mut form = config.seed();
    let collect = !config.expect.ignores(Kind::Vars);
    let mut decoder = PairDecoder {
        limits: &config.limits,
        fields: 0,
    };
    let mut pending = BytesMut::new();

    while let Some(chunk) = stream.try_next().await? {
        if !collect {
            continue;
        }

        pending.extend_from_slice(&chunk);

        while let Some(idx) = memchr::memchr(constants::URLENCODED_PAIR_SEPARATOR, &pending) {
            let pair = pending.split_to(idx + 1);
            decoder.decode_into(&pair[..idx], &mut form)?;
        }

        decoder.check_partial(&pending)?;
    }

    if collect && !pending.is_empty() {
        decoder.decode_into(&pending, &mut form)?;
    }

    log::debug!("urlencoded body decoded with {} fields", decoder.fields);

    Ok(form)
}

struct PairDecoder<'a> {
    limits: &'a Limits,
    fields: u64,
}

impl PairDecoder<'_> {
    /// Fails early on a pair that is still arriving but can no longer fit
    /// the limits. A decoded byte takes at most three encoded bytes.
    fn check_partial(&self, pending: &[u8]) -> crate::Result<()> {
        if pending.is_empty() {
            return Ok(());
        }

        let separator = memchr::memchr(b'=', pending);
        let name_len = separator.unwrap_or(pending.len());
        let name_over = self.limits.field_name_length.map_or(false, |limit| name_len > limit.saturating_mul(3));
        let value_over = match (separator, self.limits.field_value_length) {
            (Some(idx), Some(limit)) => pending.len() - idx - 1 > limit.saturating_mul(3),
            _ => false,
        };

        if !name_over && !value_over {
            return Ok(());
        }

        if Limits::exceeded(self.limits.fields, self.fields + 1) {
            return Err(Limit::Fields.into());
        }

        if name_over {
            Err(Limit::FieldName.into())
        } else {
            Err(Limit::FieldSize.into())
        }
    }

    fn decode_into(&mut self, raw: &[u8], form: &mut Form) -> crate::Result<()> {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(raw).map_err(crate::Error::DecodeUrlEncoded)?;

        for (name, value) in pairs {
            self.fields += 1;
            if Limits::exceeded(self.limits.fields, self.fields) {
                return Err(Limit::Fields.into());
            }

            let (name, name_truncated) = helpers::truncate_to(name, self.limits.field_name_length);
            if name_truncated {
                return Err(Limit::FieldName.into());
            }

            if self.limits.field_value_length.map_or(false, |limit| value.len() > limit) {
                return Err(Limit::FieldSize.into());
            }

            accumulate::append_field(&mut form.vars, &name, value);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Expect, Options};
    use futures_util::stream::{self, StreamExt};
    use serde_json::json;

    fn chunks(data: &'static str, size: usize) -> impl Stream<Item = crate::Result<Bytes>> + Unpin {
        stream::iter(data.as_bytes().chunks(size).map(|chunk| Ok(Bytes::copy_from_slice(chunk))))
    }

    #[tokio::test]
    async fn test_pairs_split_across_chunks() {
        let config = Options::new().resolve();
        let form = decode(chunks("one=first&arr=a&arr=b&arr=c&two=sec%20ond&sp=a+b", 4), &config)
            .await
            .unwrap();

        assert_eq!(
            serde_json::to_value(&form.vars).unwrap(),
            json!({ "one": "first", "arr": ["a", "b", "c"], "two": "sec ond", "sp": "a b" })
        );
    }

    #[tokio::test]
    async fn test_nested_names() {
        let config = Options::new().resolve();
        let form = decode(chunks("user%5Bname%5D=ada&user[tags][]=x&flag", 5), &config).await.unwrap();

        assert_eq!(
            serde_json::to_value(&form.vars).unwrap(),
            json!({ "user": { "name": "ada", "tags": ["x"] }, "flag": "" })
        );
    }

    #[tokio::test]
    async fn test_limits() {
        let config = Options::new().limits(Limits::new().fields(2)).resolve();
        let err = decode(chunks("a=1&b=2&c=3", 2), &config).await.unwrap_err();
        assert_eq!(err.limit(), Some(Limit::Fields));

        let config = Options::new().limits(Limits::new().field_value_length(3)).resolve();
        let err = decode(chunks("a=1234", 2), &config).await.unwrap_err();
        assert_eq!(err.limit(), Some(Limit::FieldSize));

        let config = Options::new().limits(Limits::new().field_name_length(3)).resolve();
        let err = decode(chunks("abcd=1", 2), &config).await.unwrap_err();
        assert_eq!(err.limit(), Some(Limit::FieldName));
    }

    #[tokio::test]
    async fn test_unbounded_pair_is_rejected_early() {
        let endless = || {
            stream::iter(vec![Ok(Bytes::from_static(b"a="))])
                .chain(stream::repeat_with(|| Ok(Bytes::from_static(b"xxxxxxxx"))))
        };

        let config = Options::new().limits(Limits::new().field_value_length(3)).resolve();
        let err = decode(endless(), &config).await.unwrap_err();
        assert_eq!(err.limit(), Some(Limit::FieldSize));

        let nameless = stream::repeat_with(|| Ok(Bytes::from_static(b"nnnnnnnn")));
        let config = Options::new().limits(Limits::new().field_name_length(3)).resolve();
        let err = decode(nameless, &config).await.unwrap_err();
        assert_eq!(err.limit(), Some(Limit::FieldName));

        let config = Options::new()
            .limits(Limits::new().fields(0).field_value_length(3))
            .resolve();
        let err = decode(endless(), &config).await.unwrap_err();
        assert_eq!(err.limit(), Some(Limit::Fields));
    }

    #[tokio::test]
    async fn test_encoded_value_within_limit() {
        let config = Options::new().limits(Limits::new().field_value_length(2)).resolve();
        let form = decode(chunks("a=%41%42", 1), &config).await.unwrap();
        assert_eq!(serde_json::to_value(&form.vars).unwrap(), json!({ "a": "AB" }));
    }

    #[tokio::test]
    async fn test_deep_names_stay_flat() {
        let name = format!("a{}", "[b]".repeat(100_000));
        let body: &'static str = Box::leak(format!("{}=1", name).into_boxed_str());

        let config = Options::new().resolve();
        let form = decode(chunks(body, 4096), &config).await.unwrap();
        assert_eq!(form.vars[&name].as_value().map(String::as_str), Some("1"));
    }

    #[tokio::test]
    async fn test_ignored_vars_are_drained() {
        let config = Options::new().expect(Expect::new().files(json!({}))).resolve();
        let form = decode(chunks("a=1&b=2", 1), &config).await.unwrap();
        assert!(form.is_empty());
    }
}
