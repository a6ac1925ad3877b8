//! CORS that only claims real preflights.
//!
//! `CorsLayer` answers every `OPTIONS` request itself. Pods also answer
//! plain `OPTIONS` with `Allow` and `Accept-Patch`, so only requests that
//! carry both `Origin` and `Access-Control-Request-Method` are treated as
//! preflights. Everything else passes through the inner CORS service or,
//! for plain `OPTIONS`, straight to the pod handler.

use std::task::{Context, Poll};

use futures::future::Either;
use http::{header, Method, Request, Response};
use tower::{Layer, Service};
use tower_http::cors::{Cors, CorsLayer, ResponseFuture};

#[derive(Debug, Clone)]
pub struct PreflightCorsLayer {
    cors: CorsLayer,
}

impl PreflightCorsLayer {
    pub fn new(cors: CorsLayer) -> Self {
        Self { cors }
    }
}

impl<S: Clone> Layer<S> for PreflightCorsLayer {
    type Service = PreflightCors<S>;

    fn layer(&self, inner: S) -> Self::Service {
        PreflightCors {
            cors: self.cors.layer(inner.clone()),
            inner,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PreflightCors<S> {
    cors: Cors<S>,
    inner: S,
}

pub fn is_preflight<B>(req: &Request<B>) -> bool {
    req.method() == Method::OPTIONS
        && req.headers().contains_key(header::ORIGIN)
        && req
            .headers()
            .contains_key(header::ACCESS_CONTROL_REQUEST_METHOD)
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for PreflightCors<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    ResBody: Default,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future = Either<ResponseFuture<S::Future>, S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        match self.cors.poll_ready(cx) {
            Poll::Ready(Ok(())) => self.inner.poll_ready(cx),
            other => other,
        }
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        if req.method() == Method::OPTIONS && !is_preflight(&req) {
            Either::Right(self.inner.call(req))
        } else {
            Either::Left(self.cors.call(req))
        }
    }
}
