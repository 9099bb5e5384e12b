use std::fmt::{self, Debug, Formatter};
use std::path::PathBuf;
use std::sync::Arc;

use http::header::{self, HeaderMap, HeaderValue};
use serde_json::Value;

use crate::{Form, Limits};

/// The two collections a decode produces, plus the names under which the
/// request integration exposes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Vars,
    Files,
    Body,
    Query,
}

/// Declares which collections the caller expects.
///
/// An empty expectation collects everything. As soon as one slot is set,
/// kinds whose slot is absent are not collected at all; their parts are
/// still read off the stream and discarded. The schema values themselves
/// are not interpreted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Expect {
    pub vars: Option<Value>,
    pub files: Option<Value>,
    pub body: Option<Value>,
    pub query: Option<Value>,
}

impl Expect {
    pub fn new() -> Expect {
        Expect::default()
    }

    pub fn vars(mut self, schema: Value) -> Expect {
        self.vars = Some(schema);
        self
    }

    pub fn files(mut self, schema: Value) -> Expect {
        self.files = Some(schema);
        self
    }

    pub fn body(mut self, schema: Value) -> Expect {
        self.body = Some(schema);
        self
    }

    pub fn query(mut self, schema: Value) -> Expect {
        self.query = Some(schema);
        self
    }

    pub fn get(&self, kind: Kind) -> Option<&Value> {
        match kind {
            Kind::Vars => self.vars.as_ref(),
            Kind::Files => self.files.as_ref(),
            Kind::Body => self.body.as_ref(),
            Kind::Query => self.query.as_ref(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_none() && self.files.is_none() && self.body.is_none() && self.query.is_none()
    }

    /// Whether parts of `kind` are left out of the result.
    pub fn ignores(&self, kind: Kind) -> bool {
        !self.is_empty() && self.get(kind).is_none()
    }

    /// Carries the expectation for `kind` over to `vars`, which is the only
    /// slot the decoder consults for field values.
    pub(crate) fn masquerade(mut self, kind: Kind) -> Expect {
        if let Some(schema) = self.get(kind).cloned() {
            self.vars = Some(schema);
        }
        self
    }
}

/// The starting point a decode accumulates into.
#[derive(Clone)]
pub enum Seed {
    /// A pre-populated form that is cloned for every decode.
    Form(Form),
    /// Called once per decode to produce a fresh form.
    Factory(Arc<dyn Fn() -> Form + Send + Sync>),
}

impl Seed {
    pub fn factory<F>(factory: F) -> Seed
    where
        F: Fn() -> Form + Send + Sync + 'static,
    {
        Seed::Factory(Arc::new(factory))
    }

    pub(crate) fn produce(&self) -> Form {
        match self {
            Seed::Form(form) => form.clone(),
            Seed::Factory(factory) => factory(),
        }
    }
}

impl Debug for Seed {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Seed::Form(form) => f.debug_tuple("Form").field(form).finish(),
            Seed::Factory(_) => f.write_str("Factory(..)"),
        }
    }
}

impl From<Form> for Seed {
    fn from(form: Form) -> Self {
        Seed::Form(form)
    }
}

/// One tier of decode options.
///
/// Every field is optional so that tiers can be layered with
/// [`merge`](Options::merge): the process defaults, then the options of a
/// [`FormDecoder`](crate::FormDecoder), then the options of a single call.
/// Merging is shallow: a tier that sets `headers` replaces the whole map.
///
/// # Examples
///
/// ```
/// use formstream::{Limits, Options};
///
/// let instance = Options::new().limits(Limits::new().fields(10));
/// let call = Options::new().content_type("multipart/form-data; boundary=X");
///
/// let config = instance.merge(call).resolve();
/// assert!(config.content_type().is_some());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Options {
    pub headers: Option<HeaderMap>,
    pub limits: Option<Limits>,
    pub save: Option<PathBuf>,
    pub expect: Option<Expect>,
    pub result: Option<Seed>,
    pub preserve_path: Option<bool>,
}

impl Options {
    pub fn new() -> Options {
        Options::default()
    }

    /// The process-wide defaults: bodies without headers are treated as
    /// `application/x-www-form-urlencoded`.
    pub fn process_defaults() -> Options {
        Options::new().content_type(mime::APPLICATION_WWW_FORM_URLENCODED.as_ref())
    }

    pub fn headers(mut self, headers: HeaderMap) -> Options {
        self.headers = Some(headers);
        self
    }

    /// Sets `headers` to a map holding only this `Content-Type`.
    ///
    /// A value that is not a valid header value leaves the headers unset.
    pub fn content_type<T: AsRef<str>>(mut self, content_type: T) -> Options {
        self.headers = HeaderValue::from_str(content_type.as_ref()).ok().map(|value| {
            let mut headers = HeaderMap::new();
            headers.insert(header::CONTENT_TYPE, value);
            headers
        });
        self
    }

    pub fn limits(mut self, limits: Limits) -> Options {
        self.limits = Some(limits);
        self
    }

    pub fn save<P: Into<PathBuf>>(mut self, dir: P) -> Options {
        self.save = Some(dir.into());
        self
    }

    pub fn expect(mut self, expect: Expect) -> Options {
        self.expect = Some(expect);
        self
    }

    pub fn result<R: Into<Seed>>(mut self, seed: R) -> Options {
        self.result = Some(seed.into());
        self
    }

    pub fn preserve_path(mut self, preserve: bool) -> Options {
        self.preserve_path = Some(preserve);
        self
    }

    /// Layers `over` on top of `self`; every field set in `over` wins.
    pub fn merge(self, over: Options) -> Options {
        Options {
            headers: over.headers.or(self.headers),
            limits: over.limits.or(self.limits),
            save: over.save.or(self.save),
            expect: over.expect.or(self.expect),
            result: over.result.or(self.result),
            preserve_path: over.preserve_path.or(self.preserve_path),
        }
    }

    pub(crate) fn masquerade(mut self, kind: Kind) -> Options {
        self.expect = self.expect.map(|expect| expect.masquerade(kind));
        self
    }

    /// Fixes unset fields to their defaults.
    pub fn resolve(self) -> ParseConfig {
        ParseConfig {
            headers: self.headers.unwrap_or_default(),
            limits: self.limits.unwrap_or_default(),
            save: self.save,
            expect: self.expect.unwrap_or_default(),
            seed: self.result,
            preserve_path: self.preserve_path.unwrap_or(false),
        }
    }
}

/// Fully resolved options for one decode.
#[derive(Debug, Clone, Default)]
pub struct ParseConfig {
    pub(crate) headers: HeaderMap,
    pub(crate) limits: Limits,
    pub(crate) save: Option<PathBuf>,
    pub(crate) expect: Expect,
    pub(crate) seed: Option<Seed>,
    pub(crate) preserve_path: bool,
}

impl ParseConfig {
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(header::CONTENT_TYPE).and_then(|val| val.to_str().ok())
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub fn save_dir(&self) -> Option<&PathBuf> {
        self.save.as_ref()
    }

    pub fn expect(&self) -> &Expect {
        &self.expect
    }

    pub(crate) fn seed(&self) -> Form {
        self.seed.as_ref().map(Seed::produce).unwrap_or_default()
    }
}
