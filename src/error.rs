use std::fmt::{self, Debug, Display, Formatter};
use std::path::PathBuf;

use derive_more::Display;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A structural limit that stops the whole parse once it is crossed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Limit {
    /// More parts than [`Limits::parts`](crate::Limits::parts).
    Parts,
    /// More file parts than [`Limits::files`](crate::Limits::files).
    Files,
    /// More plain fields than [`Limits::fields`](crate::Limits::fields).
    Fields,
    /// A field name longer than
    /// [`Limits::field_name_length`](crate::Limits::field_name_length).
    FieldName,
    /// A field value longer than
    /// [`Limits::field_value_length`](crate::Limits::field_value_length).
    FieldSize,
}

impl Limit {
    /// The signal name of this limit, e.g. `fieldsLimit`.
    pub fn tag(self) -> &'static str {
        match self {
            Limit::Parts => "partsLimit",
            Limit::Files => "filesLimit",
            Limit::Fields => "fieldsLimit",
            Limit::FieldName => "fieldnameLimit",
            Limit::FieldSize => "fieldsizeLimit",
        }
    }

    /// The human readable failure description.
    pub fn description(self) -> &'static str {
        match self {
            Limit::Parts => "The given part count limit was reached.",
            Limit::Files => "The given file count limit was reached.",
            Limit::Fields => "The given field count limit was reached.",
            Limit::FieldName => "The given fieldname limit was reached.",
            Limit::FieldSize => "The given field size limit was reached.",
        }
    }

    /// Looks a limit up by its signal name.
    pub fn from_tag(tag: &str) -> Option<Limit> {
        match tag {
            "partsLimit" => Some(Limit::Parts),
            "filesLimit" => Some(Limit::Files),
            "fieldsLimit" => Some(Limit::Fields),
            "fieldnameLimit" => Some(Limit::FieldName),
            "fieldsizeLimit" => Some(Limit::FieldSize),
            _ => None,
        }
    }
}

impl Display for Limit {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Maps a limit signal name to the error that terminates the parse.
///
/// Names that are not one of the known limit tags produce
/// [`Error::UnknownSignal`] carrying the raw name.
pub fn signal<T: AsRef<str>>(tag: T) -> Error {
    let tag = tag.as_ref();
    match Limit::from_tag(tag) {
        Some(limit) => Error::LimitReached(limit),
        None => Error::UnknownSignal(tag.to_owned()),
    }
}

/// A set of errors that can occur while decoding a form body.
#[derive(Display)]
#[non_exhaustive]
pub enum Error {
    /// One of the configured [`Limits`](crate::Limits) was crossed.
    #[display(fmt = "{}", _0)]
    LimitReached(Limit),

    /// An unrecognized signal was raised while parsing.
    #[display(fmt = "Unknown error happened while parsing: {}", _0)]
    UnknownSignal(String),

    /// The field data is found incomplete.
    #[display(fmt = "field '{}' received with incomplete data", field_name)]
    IncompleteFieldData { field_name: String },

    /// Couldn't read the part headers completely.
    #[display(fmt = "failed to read part complete headers")]
    IncompleteHeaders,

    /// The part header block is larger than the parser accepts.
    #[display(fmt = "part headers exceeded the maximum size: {} bytes", limit)]
    HeadersTooLarge { limit: usize },

    /// Failed to read headers.
    #[display(fmt = "failed to read headers: {}", _0)]
    ReadHeaderFailed(httparse::Error),

    /// Failed to decode the part's raw header name to
    /// [`HeaderName`](http::header::HeaderName) type.
    #[display(fmt = "failed to decode part's raw header name: {:?} {}", name, cause)]
    DecodeHeaderName { name: String, cause: BoxError },

    /// Failed to decode the part's raw header value to
    /// [`HeaderValue`](http::header::HeaderValue) type.
    #[display(fmt = "failed to decode part's raw header value: {}", cause)]
    DecodeHeaderValue { value: Vec<u8>, cause: BoxError },

    /// Multipart stream is incomplete.
    #[display(fmt = "incomplete multipart stream")]
    IncompleteStream,

    /// Stream read failed.
    #[display(fmt = "stream read failed: {}", _0)]
    StreamReadFailed(BoxError),

    /// Failed to convert the `Content-Type` to [`mime::Mime`] type.
    #[display(fmt = "Failed to convert Content-Type to `mime::Mime` type: {}", _0)]
    DecodeContentType(mime::FromStrError),

    /// No boundary found in a `multipart/form-data` `Content-Type` header.
    #[display(fmt = "multipart boundary not found in Content-Type")]
    NoBoundary,

    /// A urlencoded pair could not be decoded.
    #[display(fmt = "failed to decode urlencoded body: {}", _0)]
    DecodeUrlEncoded(serde_urlencoded::de::Error),

    /// Writing an uploaded file to the save directory failed.
    #[display(fmt = "failed to save file to {:?}: {}", path, cause)]
    SaveFailed { path: PathBuf, cause: std::io::Error },
}

impl Error {
    /// The limit behind this error, if it is a limit breach.
    pub fn limit(&self) -> Option<Limit> {
        match self {
            Error::LimitReached(limit) => Some(*limit),
            _ => None,
        }
    }
}

impl From<Limit> for Error {
    fn from(limit: Limit) -> Self {
        Error::LimitReached(limit)
    }
}

impl Debug for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

impl std::error::Error for Error {}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.to_string().eq(&other.to_string())
    }
}

impl Eq for Error {}
