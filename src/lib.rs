//! Streaming decoder for HTML form bodies.
//!
//! Decodes `multipart/form-data` and `application/x-www-form-urlencoded`
//! request bodies into a [`Form`]: the field values in `vars`, the uploaded
//! files in `files`. Bracketed field names such as `user[tags][]` build
//! nested maps and lists.
//!
//! File parts are written straight to disk while the body streams in, or
//! buffered in memory when no save directory is configured. The decode
//! resolves only after every file is completely written.
//!
//! # Examples
//!
//! ```
//! use bytes::Bytes;
//! use futures_util::stream::once;
//! use formstream::{FormDecoder, Options};
//! use std::convert::Infallible;
//!
//! # async fn run() {
//! let data = "--X-BOUNDARY\r\nContent-Disposition: form-data; name=\"my_text_field\"\r\n\r\nabcd\r\n--X-BOUNDARY--\r\n";
//! let stream = once(async move { Result::<Bytes, Infallible>::Ok(Bytes::from(data)) });
//!
//! let opts = Options::new().content_type("multipart/form-data; boundary=X-BOUNDARY");
//! let form = FormDecoder::new().parse(formstream::Input::stream(stream), opts).await.unwrap();
//!
//! assert_eq!(form.vars["my_text_field"].as_value().map(String::as_str), Some("abcd"));
//! # }
//! # tokio::runtime::Runtime::new().unwrap().block_on(run());
//! ```
//!
//! ## Optional features
//!
//! * `tokio-io`: reading bodies from any `tokio::io::AsyncRead` through
//!   [`Input::reader`].
//! * `all`: every optional feature.

#![cfg_attr(nightly, feature(doc_cfg))]

pub use accumulate::{append_field, FormMap, FormValue};
pub use decoder::decode;
pub use error::{signal, BoxError, Error, Limit};
pub use form::{FileRecord, Form, Stored};
pub use form_decoder::{FormDecoder, Query};
pub use input::Input;
pub use limits::Limits;
pub use options::{Expect, Kind, Options, ParseConfig, Seed};

mod accumulate;
mod buffer;
mod constants;
mod content_disposition;
mod decoder;
mod error;
mod form;
mod form_decoder;
mod helpers;
mod input;
mod limits;
mod multipart;
mod options;
mod part;
mod sink;
mod state;
mod urlencoded;

/// A Result type often returned from methods that can have `formstream` errors.
pub type Result<T> = std::result::Result<T, Error>;
