//! Wire helpers: form-encoded inputs, JSON outputs.

use anyhow::Result;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::{Request, Response, StatusCode};
use serde::Serialize;

pub(crate) type HttpResponse = Response<Full<Bytes>>;

pub(crate) fn empty(status: StatusCode) -> Result<HttpResponse> {
    let resp = Response::builder()
        .status(status)
        .body(Full::new(Bytes::new()))?;
    Ok(resp)
}

pub(crate) fn json<T: Serialize>(value: &T) -> Result<HttpResponse> {
    let body = serde_json::to_vec(value)?;
    let resp = Response::builder()
        .status(StatusCode::OK)
        .header(hyper::header::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(body)))?;
    Ok(resp)
}

/// Looks a form parameter up in the query string first, then in an
/// urlencoded request body. Returns an empty string when the parameter is
/// absent, mirroring how unknown IDs are handled downstream (lookup miss).
pub(crate) async fn form_param(req: Request<Incoming>, name: &str) -> Result<String> {
    if let Some(query) = req.uri().query() {
        if let Some(value) = find_param(query, name) {
            return Ok(value);
        }
    }

    let body = req.into_body().collect().await?.to_bytes();
    let form = String::from_utf8_lossy(&body);
    Ok(find_param(&form, name).unwrap_or_default())
}

fn find_param(form: &str, name: &str) -> Option<String> {
    form.split('&')
        .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
        .find(|(key, _)| url_decode(key) == name)
        .map(|(_, value)| url_decode(value))
}

/// application/x-www-form-urlencoded decoding: `+` is a space, `%XX` is a
/// byte. Stray `%` sequences pass through unchanged.
fn url_decode(input: &str) -> String {
    let mut out = Vec::with_capacity(input.len());
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' => match hex_pair(bytes.get(i + 1).copied(), bytes.get(i + 2).copied()) {
                Some(b) => {
                    out.push(b);
                    i += 3;
                }
                None => {
                    out.push(b'%');
                    i += 1;
                }
            },
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_pair(hi: Option<u8>, lo: Option<u8>) -> Option<u8> {
    let hi = (hi? as char).to_digit(16)?;
    let lo = (lo? as char).to_digit(16)?;
    Some((hi * 16 + lo) as u8)
}
