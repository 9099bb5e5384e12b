use std::path::PathBuf;

use bytes::Bytes;
use futures_util::future::{BoxFuture, FutureExt};
use futures_util::stream::{FuturesUnordered, Stream, StreamExt, TryStreamExt};
use log::{debug, trace, warn};

use crate::error::{BoxError, Limit};
use crate::form::FileRecord;
use crate::multipart::{Multipart, Token};
use crate::options::{Kind, ParseConfig};
use crate::part::{CompletedField, FilePart};
use crate::{accumulate, sink, urlencoded, Form};

/// Decodes a request body into a [`Form`].
///
/// The body encoding is taken from the `Content-Type` in `config`. Without
/// one, or with a type that is not a form encoding, the stream is left
/// untouched and an empty form is returned; the `result` seed only applies
/// to bodies that are actually decoded.
///
/// The returned future resolves once, after the body is fully consumed and
/// every file part has been completely written. The first error wins: file
/// saves still in flight are abandoned and every file already written to the
/// save directory by this call is removed.
///
/// The stream is not polled again after the future resolves, so passing
/// `&mut stream` hands it back to the caller.
pub async fn decode<S, O, E>(stream: S, config: &ParseConfig) -> crate::Result<Form>
where
    S: Stream<Item = Result<O, E>> + Unpin + Send,
    O: Into<Bytes>,
    E: Into<BoxError>,
{
    let kind = match config.content_type() {
        Some(content_type) => BodyKind::from_content_type(content_type)?,
        None => None,
    };

    let stream = stream
        .map_ok(Into::<Bytes>::into)
        .map_err(|err| crate::Error::StreamReadFailed(err.into()));

    match kind {
        Some(BodyKind::UrlEncoded) => urlencoded::decode(stream, config).await,
        Some(BodyKind::Multipart(boundary)) => decode_multipart(stream, boundary, config).await,
        None => {
            debug!("body has no form content type, returning an empty form");
            Ok(Form::default())
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum BodyKind {
    UrlEncoded,
    Multipart(String),
}

impl BodyKind {
    fn from_content_type(content_type: &str) -> crate::Result<Option<BodyKind>> {
        let mime = content_type
            .parse::<mime::Mime>()
            .map_err(crate::Error::DecodeContentType)?;

        if mime.type_() == mime::MULTIPART && mime.subtype() == mime::FORM_DATA {
            return mime
                .get_param(mime::BOUNDARY)
                .map(|boundary| Some(BodyKind::Multipart(boundary.as_str().to_owned())))
                .ok_or(crate::Error::NoBoundary);
        }

        if mime.essence_str() == mime::APPLICATION_WWW_FORM_URLENCODED.essence_str() {
            return Ok(Some(BodyKind::UrlEncoded));
        }

        Ok(None)
    }
}

enum Event<S> {
    PartStarted(FilePart<S>),
    FieldComplete(CompletedField),
    FileComplete(String, crate::Result<FileRecord>),
    LimitHit(Limit),
    StreamFinished,
    StreamErrored(crate::Error),
}

impl<S> From<Option<crate::Result<Token<S>>>> for Event<S> {
    fn from(token: Option<crate::Result<Token<S>>>) -> Self {
        match token {
            Some(Ok(Token::PartStarted(part))) => Event::PartStarted(part),
            Some(Ok(Token::FieldComplete(field))) => Event::FieldComplete(field),
            Some(Ok(Token::LimitHit(limit))) => Event::LimitHit(limit),
            Some(Err(err)) => Event::StreamErrored(err),
            None => Event::StreamFinished,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Streaming,
    Draining,
}

async fn decode_multipart<S>(stream: S, boundary: String, config: &ParseConfig) -> crate::Result<Form>
where
    S: Stream<Item = Result<Bytes, crate::Error>> + Unpin + Send,
{
    let save = config.save.clone();
    drive_multipart(stream, boundary, config, move |part| sink::sink(part, save.clone()).boxed()).await
}

/// Runs the tokenizer and hands every collected file part to `store`.
async fn drive_multipart<'a, S, F>(stream: S, boundary: String, config: &ParseConfig, mut store: F) -> crate::Result<Form>
where
    S: Stream<Item = Result<Bytes, crate::Error>> + Unpin + Send + 'a,
    F: FnMut(FilePart<S>) -> BoxFuture<'a, crate::Result<FileRecord>>,
{
    let mut form = config.seed();
    let collect_vars = !config.expect.ignores(Kind::Vars);
    let collect_files = !config.expect.ignores(Kind::Files);

    let mut multipart = Multipart::new(stream, boundary, config.limits.clone(), config.preserve_path);
    let mut pending: FuturesUnordered<BoxFuture<'a, (String, crate::Result<FileRecord>)>> = FuturesUnordered::new();
    let mut saved: Vec<PathBuf> = Vec::new();
    let mut stage = Stage::Streaming;

    let outcome: crate::Result<()> = loop {
        let event = tokio::select! {
            biased;

            Some((field_name, stored)) = pending.next(), if !pending.is_empty() => Event::FileComplete(field_name, stored),
            token = multipart.next(), if stage == Stage::Streaming => Event::from(token),
            else => break Ok(()),
        };

        match event {
            Event::PartStarted(part) if collect_files => {
                let field_name = part.descriptor().field_name.clone();
                trace!("file part '{}' started", field_name);

                pending.push(store(part).map(move |stored| (field_name, stored)).boxed());
            }
            Event::PartStarted(part) => {
                trace!("discarding file part '{}'", part.descriptor().field_name);
            }
            Event::FieldComplete(field) if collect_vars => {
                if let Err(err) = merge_field(&mut form, field) {
                    break Err(err);
                }
            }
            Event::FieldComplete(_) => {}
            Event::FileComplete(field_name, Ok(record)) => {
                if let Some(path) = record.path() {
                    saved.push(path.clone());
                }
                accumulate::append_field(&mut form.files, &field_name, record);
            }
            Event::FileComplete(field_name, Err(err)) => {
                warn!("file part '{}' failed: {}", field_name, err);
                break Err(err);
            }
            Event::LimitHit(limit) => {
                warn!("multipart body rejected: {}", limit);
                break Err(limit.into());
            }
            Event::StreamFinished => {
                debug!("multipart body consumed, waiting on {} file parts", pending.len());
                stage = Stage::Draining;
            }
            Event::StreamErrored(err) => break Err(err),
        }
    };

    match outcome {
        Ok(()) => Ok(form),
        Err(err) => {
            drop(pending);
            discard(saved).await;
            Err(err)
        }
    }
}

/// Removes the files a rejected decode already wrote.
async fn discard(saved: Vec<PathBuf>) {
    for path in saved {
        if let Err(err) = tokio::fs::remove_file(&path).await {
            warn!("could not remove {:?} after a failed decode: {}", path, err);
        }
    }
}

fn merge_field(form: &mut Form, field: CompletedField) -> crate::Result<()> {
    if field.name_truncated {
        return Err(Limit::FieldName.into());
    }

    if field.value_truncated {
        return Err(Limit::FieldSize.into());
    }

    accumulate::append_field(&mut form.vars, &field.descriptor.field_name, field.value);
    Ok(())
}
