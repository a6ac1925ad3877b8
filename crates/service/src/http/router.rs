//! The pod handler: every request outside the status tree goes through
//! credentials, access control and the LDP engine, in that order.

use axum::body::Body;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::header::{self, HeaderName, HeaderValue};
use http::{HeaderMap, Method, StatusCode, Uri};
use url::Url;

use common::acl::AccessModes;
use common::agent::Agent;
use common::credentials::RequestInfo;
use common::deadline::Deadline;
use common::ldp::{
    LdpRequest, Outcome, Representation, LDP_BASIC_CONTAINER, LDP_CONTAINER, LDP_RESOURCE,
    N3_CONTENT_TYPE,
};
use common::path::{ResourcePath, Target};

use super::RequestError;
use crate::ServiceState;

const WAC_ALLOW: HeaderName = HeaderName::from_static("wac-allow");
const ACCEPT_PATCH: HeaderName = HeaderName::from_static("accept-patch");
const X_FORWARDED_PROTO: &str = "x-forwarded-proto";
const X_FORWARDED_HOST: &str = "x-forwarded-host";

pub async fn handler(
    State(state): State<ServiceState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match handle(&state, method, uri, headers, body).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}

#[tracing::instrument(skip_all, fields(method = %method, path = uri.path()))]
async fn handle(
    state: &ServiceState,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, RequestError> {
    let deadline = state.deadline();

    let url = request_url(state.base().url(), &uri, &headers);
    let path = pod_path(state, &uri)?;
    let target = state.acl_suffix().classify(path);

    // 1. Who is asking
    let mut info = RequestInfo::new(method.clone(), url, headers.clone());
    info.peer_certificate = state
        .client_cert_header()
        .and_then(|name| headers.get(name))
        .and_then(|value| value.to_str().ok())
        .and_then(decode_certificate);
    let credentials = state.extractor().extract(&info, &deadline).await?;
    let agent = Agent::from_credentials(&credentials);
    tracing::debug!(agent = %agent, target = %target.requested(), "resolved agent");

    // 2. May they
    let required = AccessModes::required_for(&method, target.is_acl());
    let granted = state
        .resolver()
        .authorize(target.resource(), &agent, required, &deadline)
        .await?;
    if !granted {
        return Err(if agent.is_anonymous() {
            RequestError::Unauthorized
        } else {
            RequestError::Forbidden
        });
    }

    // 3. Do it
    let request = LdpRequest::from_headers(method.clone(), target.clone(), agent.clone(), &headers, body);
    let outcome = state.engine().handle(request, &deadline).await?;

    match outcome {
        Outcome::Read(representation) => {
            let wac_allow = wac_allow(state, &target, &agent, &deadline).await?;
            Ok(read_response(
                state,
                &method,
                &target,
                representation,
                wac_allow,
            ))
        }
        Outcome::Created { location } => {
            let location = state.base().url_for(&location);
            let mut response = StatusCode::CREATED.into_response();
            if let Ok(value) = HeaderValue::from_str(location.path()) {
                response.headers_mut().insert(header::LOCATION, value);
            }
            Ok(response)
        }
        Outcome::Updated => Ok(StatusCode::OK.into_response()),
        Outcome::Deleted => Ok(StatusCode::NO_CONTENT.into_response()),
        Outcome::Options { allow } => {
            let mut response = StatusCode::NO_CONTENT.into_response();
            let allow = allow
                .iter()
                .map(Method::as_str)
                .collect::<Vec<_>>()
                .join(", ");
            let headers = response.headers_mut();
            if let Ok(value) = HeaderValue::from_str(&allow) {
                headers.insert(header::ALLOW, value);
            }
            if !target.is_acl() {
                headers.insert(ACCEPT_PATCH, HeaderValue::from_static(N3_CONTENT_TYPE));
            }
            Ok(response)
        }
    }
}

/// The absolute URL the client addressed, as seen through any proxy.
fn request_url(base: &Url, uri: &Uri, headers: &HeaderMap) -> Url {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(',').next().unwrap_or_default().trim().to_string())
            .filter(|v| !v.is_empty())
    };
    let scheme = header(X_FORWARDED_PROTO).unwrap_or_else(|| base.scheme().to_string());
    let host = header(X_FORWARDED_HOST)
        .or_else(|| header(header::HOST.as_str()))
        .or_else(|| uri.authority().map(|a| a.to_string()));
    let path_and_query = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    host.and_then(|host| Url::parse(&format!("{}://{}{}", scheme, host, path_and_query)).ok())
        .or_else(|| base.join(path_and_query.trim_start_matches('/')).ok())
        .unwrap_or_else(|| base.clone())
}

/// The pod path of a request, relative to the base URL's path.
fn pod_path(state: &ServiceState, uri: &Uri) -> Result<ResourcePath, RequestError> {
    let rest = uri
        .path()
        .strip_prefix(state.base().url().path())
        .ok_or(RequestError::OutsidePod)?;
    Ok(ResourcePath::parse(&format!("/{}", rest))?)
}

/// A client certificate forwarded by a proxy, either PEM or bare base64 DER.
fn decode_certificate(raw: &str) -> Option<Vec<u8>> {
    // base64 has no '-', so only the armor lines contain it
    let body: String = raw
        .split_whitespace()
        .filter(|chunk| !chunk.contains('-'))
        .collect();
    match STANDARD.decode(body) {
        Ok(der) => Some(der),
        Err(e) => {
            tracing::debug!(error = %e, "ignoring undecodable client certificate");
            None
        }
    }
}

/// `user="read write",public="read"` for the resource behind `target`.
async fn wac_allow(
    state: &ServiceState,
    target: &Target,
    agent: &Agent,
    deadline: &Deadline,
) -> Result<String, RequestError> {
    let resolver = state.resolver();
    let user = resolver
        .allowed_modes(target.resource(), agent, deadline)
        .await?;
    let public = resolver
        .allowed_modes(target.resource(), &Agent::Anonymous, deadline)
        .await?;
    Ok(format!(
        "user=\"{}\",public=\"{}\"",
        user.names(),
        public.names()
    ))
}

fn read_response(
    state: &ServiceState,
    method: &Method,
    target: &Target,
    representation: Representation,
    wac_allow: String,
) -> Response {
    let mut links = vec![format!("<{}>; rel=\"type\"", LDP_RESOURCE)];
    if representation.is_container {
        links.push(format!("<{}>; rel=\"type\"", LDP_BASIC_CONTAINER));
        links.push(format!("<{}>; rel=\"type\"", LDP_CONTAINER));
    }
    if let Target::Resource(path) = target {
        let acl = state.base().url_for(&state.acl_suffix().acl_path_for(path));
        links.push(format!("<{}>; rel=\"acl\"", acl));
    }

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, representation.content_type.as_str())
        .header(header::LINK, links.join(", "))
        .header(WAC_ALLOW, wac_allow);
    if let Some(metadata) = &representation.metadata {
        builder = builder
            .header(header::ETAG, metadata.etag())
            .header(header::LAST_MODIFIED, http_date(&metadata.last_modified));
    }
    if !target.is_acl() {
        builder = builder.header(ACCEPT_PATCH, N3_CONTENT_TYPE);
    }

    let body = if *method == Method::HEAD {
        Body::empty()
    } else {
        Body::from(representation.data)
    };
    match builder.body(body) {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(error = %e, "building read response");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// RFC 7231 IMF-fixdate.
fn http_date(at: &DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_http_date() {
        let at = Utc.with_ymd_and_hms(1994, 11, 6, 8, 49, 37).unwrap();
        assert_eq!(http_date(&at), "Sun, 06 Nov 1994 08:49:37 GMT");
    }

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        pairs
            .iter()
            .map(|&(name, value)| {
                (
                    HeaderName::from_static(name),
                    HeaderValue::from_static(value),
                )
            })
            .collect()
    }

    #[test]
    fn test_request_url_behind_proxy() {
        let base = Url::parse("http://localhost:3000/").unwrap();
        let uri: Uri = "/notes.txt?rev=2".parse().unwrap();

        let url = request_url(
            &base,
            &uri,
            &headers(&[
                ("x-forwarded-proto", "https"),
                ("x-forwarded-host", "pod.example, internal.lan"),
                ("host", "localhost:3000"),
            ]),
        );
        assert_eq!(url.as_str(), "https://pod.example/notes.txt?rev=2");

        // host header keeps the base scheme
        let url = request_url(&base, &uri, &headers(&[("host", "pod.example:8080")]));
        assert_eq!(url.as_str(), "http://pod.example:8080/notes.txt?rev=2");

        // nothing to go on but the base
        let url = request_url(&base, &uri, &HeaderMap::new());
        assert_eq!(url.as_str(), "http://localhost:3000/notes.txt?rev=2");

        // an absolute request target carries its own authority
        let uri: Uri = "http://other.example/a".parse().unwrap();
        let url = request_url(&base, &uri, &HeaderMap::new());
        assert_eq!(url.as_str(), "http://other.example/a");
    }

    #[test]
    fn test_decode_certificate_forms() {
        let der = b"\x30\x82\x01\x0a";
        let b64 = STANDARD.encode(der);
        assert_eq!(decode_certificate(&b64).unwrap(), der);

        let pem = format!(
            "-----BEGIN CERTIFICATE-----\n{}\n-----END CERTIFICATE-----\n",
            b64
        );
        assert_eq!(decode_certificate(&pem).unwrap(), der);

        // nginx folds the PEM onto one line
        let folded = format!(
            "-----BEGIN CERTIFICATE----- {} -----END CERTIFICATE-----",
            b64
        );
        assert_eq!(decode_certificate(&folded).unwrap(), der);

        assert!(decode_certificate("not base64!").is_none());
    }
}
