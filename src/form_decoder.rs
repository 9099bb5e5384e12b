use std::future::Future;

use bytes::Bytes;
use futures_util::future::{BoxFuture, FutureExt};
use futures_util::stream::Stream;
use http::{HeaderMap, Request, Uri};

use crate::error::BoxError;
use crate::options::{Kind, Options};
use crate::{decoder, Form, FormMap, Input};

/// The decoded query string of a request, attached to its extensions by
/// [`FormDecoder::handle`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query(pub FormMap<String>);

/// Decodes request bodies and query strings with a set of instance options.
///
/// Options are layered for every call: the process defaults first, then the
/// instance options, then the options passed to the call.
///
/// # Examples
///
/// ```
/// use formstream::{FormDecoder, Options};
///
/// # async fn run() {
/// let decoder = FormDecoder::new();
/// let form = decoder.parse("name=ada&langs[]=rust".into(), Options::new()).await.unwrap();
///
/// assert_eq!(form.vars["name"].as_value().map(String::as_str), Some("ada"));
/// # }
/// # tokio::runtime::Runtime::new().unwrap().block_on(run());
/// ```
#[derive(Debug, Clone, Default)]
pub struct FormDecoder {
    opts: Options,
}

impl FormDecoder {
    pub fn new() -> FormDecoder {
        FormDecoder::default()
    }

    pub fn with_options(opts: Options) -> FormDecoder {
        FormDecoder { opts }
    }

    pub fn options(&self) -> &Options {
        &self.opts
    }

    pub fn set_options(&mut self, opts: Options) {
        self.opts = opts;
    }

    fn consolidate<I>(&self, tiers: I) -> Options
    where
        I: IntoIterator<Item = Options>,
    {
        tiers
            .into_iter()
            .fold(Options::process_defaults().merge(self.opts.clone()), Options::merge)
    }

    /// Decodes a standalone body.
    ///
    /// Without a `Content-Type` in any tier the body is decoded as
    /// `application/x-www-form-urlencoded`.
    pub async fn parse(&self, input: Input<'_>, opts: Options) -> crate::Result<Form> {
        let config = self.consolidate(Some(opts)).resolve();
        decoder::decode(input.into_stream(), &config).await
    }

    /// Decodes a request body using the request's own headers.
    ///
    /// The request headers replace the default headers; headers given in
    /// `opts` replace the request headers. An expectation set for
    /// [`Kind::Body`] stands in for the one on `vars`.
    pub async fn body<S, O, E>(&self, headers: &HeaderMap, body: S, opts: Options) -> crate::Result<Form>
    where
        S: Stream<Item = Result<O, E>> + Unpin + Send,
        O: Into<Bytes>,
        E: Into<BoxError>,
    {
        let config = self
            .consolidate([Options::new().headers(headers.clone()), opts])
            .masquerade(Kind::Body)
            .resolve();

        decoder::decode(body, &config).await
    }

    /// Decodes the query string of `uri` as `application/x-www-form-urlencoded`.
    ///
    /// The `result` seed does not apply to query strings.
    pub async fn query(&self, uri: &Uri, opts: Options) -> crate::Result<FormMap<String>> {
        let query = match uri.query() {
            Some(query) if !query.is_empty() => query,
            _ => return Ok(FormMap::new()),
        };

        let mut opts = self.consolidate([opts, Options::process_defaults()]);
        if opts.expect.as_ref().map_or(false, |expect| expect.ignores(Kind::Query)) {
            return Ok(FormMap::new());
        }
        opts.result = None;

        let config = opts.masquerade(Kind::Query).resolve();
        let form = decoder::decode(Input::from(query).into_stream(), &config).await?;

        Ok(form.vars)
    }

    /// Decodes both the body and the query string of `request`.
    ///
    /// The results are attached to the request extensions as a [`Form`] and
    /// a [`Query`]. The body stream is consumed in place.
    pub async fn handle<S, O, E>(&self, mut request: Request<S>, opts: Options) -> crate::Result<Request<S>>
    where
        S: Stream<Item = Result<O, E>> + Unpin + Send,
        O: Into<Bytes>,
        E: Into<BoxError>,
    {
        let headers = request.headers().clone();
        let form = self.body(&headers, request.body_mut(), opts.clone()).await?;
        let query = self.query(request.uri(), opts).await?;

        log::debug!(
            "decoded request to {}: {} vars, {} files, {} query params",
            request.uri().path(),
            form.vars.len(),
            form.files.len(),
            query.len()
        );

        request.extensions_mut().insert(form);
        request.extensions_mut().insert(Query(query));

        Ok(request)
    }

    /// Wraps `handler` so that every request reaches it already decoded.
    ///
    /// A failed decode short-circuits and the handler is not called.
    pub fn wrap<S, O, E, F, Fut>(
        &self,
        handler: F,
        opts: Options,
    ) -> impl Fn(Request<S>) -> BoxFuture<'static, crate::Result<Fut::Output>> + Clone + Send + Sync
    where
        S: Stream<Item = Result<O, E>> + Unpin + Send + 'static,
        O: Into<Bytes> + 'static,
        E: Into<BoxError> + 'static,
        F: Fn(Request<S>) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future + Send + 'static,
    {
        let decoder = self.clone();

        move |request| {
            let decoder = decoder.clone();
            let handler = handler.clone();
            let opts = opts.clone();

            async move {
                let request = decoder.handle(request, opts).await?;
                Ok(handler(request).await)
            }
            .boxed()
        }
    }
}
