//! The engine's single HTTP primitive: a blocking GET
//!
//! Three consumption styles sit on top of one send path: fully buffered
//! (listings, small object reads), buffered with the `Content-Range` total
//! captured (ranged reads), and chunked delivery in fixed 256 KiB units
//! (streaming downloads). Redirect following is disabled so S3
//! `PermanentRedirect` bodies reach the caller's parser.
//!
//! Cancellation: each call takes an optional shared flag, polled between
//! body reads. A cancelled transfer aborts and reports [`FetchError::Cancelled`];
//! the caller emits no event for it.

use std::io::Read;
use std::sync::atomic::Ordering;
use std::time::Duration;

use reqwest::header::CONTENT_RANGE;

use crate::auth::signer::SignedRequest;
use crate::engine::work::CancelFlag;
use crate::errors::Result;

/// Streaming downloads hand data to the sink in units of this size.
pub const STREAM_CHUNK_SIZE: usize = 256 * 1024;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const RANGE_TIMEOUT: Duration = Duration::from_secs(60);
pub const STREAM_TIMEOUT: Duration = Duration::from_secs(300);

/// Why a fetch produced no body.
#[derive(Debug)]
pub enum FetchError {
    /// The cancel flag was observed; no event should be emitted.
    Cancelled,
    /// Transport-level failure (DNS, TLS, timeout, reset…).
    Transport(String),
}

/// A buffered response body plus what the headers revealed.
#[derive(Debug)]
pub struct FetchedBody {
    /// 2xx status. Error bodies still arrive here for XML inspection.
    pub success: bool,
    pub status: u16,
    pub body: Vec<u8>,
    /// Total resource size parsed from `Content-Range`, when present.
    pub total_size: Option<u64>,
}

/// Outcome of a chunk-streamed fetch.
#[derive(Debug)]
pub struct StreamedBody {
    pub success: bool,
    pub status: u16,
    /// Bytes handed to the sink (whole chunks only).
    pub bytes_streamed: u64,
    /// Tail smaller than one chunk, or the entire body on a non-2xx
    /// response (kept out of the sink so it can be parsed as an error).
    pub leftover: Vec<u8>,
}

fn is_cancelled(cancel: Option<&CancelFlag>) -> bool {
    cancel.map(|flag| flag.load(Ordering::SeqCst)).unwrap_or(false)
}

/// Parse the total from `Content-Range: bytes a-b/N`.
fn parse_content_range_total(value: &str) -> Option<u64> {
    let (_, total) = value.rsplit_once('/')?;
    total.trim().parse().ok()
}

pub struct HttpClient {
    client: reqwest::blocking::Client,
}

impl HttpClient {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(HttpClient { client })
    }

    fn send(
        &self,
        request: &SignedRequest,
        extra_headers: &[(String, String)],
        timeout: Duration,
        cancel: Option<&CancelFlag>,
    ) -> std::result::Result<reqwest::blocking::Response, FetchError> {
        if is_cancelled(cancel) {
            return Err(FetchError::Cancelled);
        }

        let mut builder = self.client.get(&request.url).timeout(timeout);
        for (name, value) in request.headers.iter().chain(extra_headers) {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder
            .send()
            .map_err(|err| FetchError::Transport(err.to_string()))
    }

    /// GET with the whole body buffered.
    pub fn get(
        &self,
        request: &SignedRequest,
        extra_headers: &[(String, String)],
        timeout: Duration,
        cancel: Option<&CancelFlag>,
    ) -> std::result::Result<FetchedBody, FetchError> {
        let mut response = self.send(request, extra_headers, timeout, cancel)?;
        let success = response.status().is_success();
        let status = response.status().as_u16();
        let total_size = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range_total);

        let mut body = Vec::new();
        let mut buf = [0u8; 16 * 1024];
        loop {
            if is_cancelled(cancel) {
                return Err(FetchError::Cancelled);
            }
            match response.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => body.extend_from_slice(&buf[..n]),
                Err(err) => return Err(FetchError::Transport(err.to_string())),
            }
        }

        Ok(FetchedBody {
            success,
            status,
            body,
            total_size,
        })
    }

    /// GET with the body delivered to `sink` in [`STREAM_CHUNK_SIZE`] units
    /// as it arrives. The final partial chunk is returned in
    /// [`StreamedBody::leftover`], as is the whole body of an error
    /// response.
    pub fn get_streaming(
        &self,
        request: &SignedRequest,
        extra_headers: &[(String, String)],
        timeout: Duration,
        cancel: Option<&CancelFlag>,
        sink: &mut dyn FnMut(Vec<u8>),
    ) -> std::result::Result<StreamedBody, FetchError> {
        let mut response = self.send(request, extra_headers, timeout, cancel)?;
        let success = response.status().is_success();
        let status = response.status().as_u16();

        let mut pending: Vec<u8> = Vec::with_capacity(STREAM_CHUNK_SIZE);
        let mut bytes_streamed = 0u64;
        let mut buf = [0u8; 16 * 1024];
        loop {
            if is_cancelled(cancel) {
                return Err(FetchError::Cancelled);
            }
            let n = match response.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(err) => return Err(FetchError::Transport(err.to_string())),
            };
            pending.extend_from_slice(&buf[..n]);

            // Error bodies stay buffered for XML inspection by the caller.
            if success {
                while pending.len() >= STREAM_CHUNK_SIZE {
                    let rest = pending.split_off(STREAM_CHUNK_SIZE);
                    let chunk = std::mem::replace(&mut pending, rest);
                    bytes_streamed += chunk.len() as u64;
                    sink(chunk);
                }
            }
        }

        Ok(StreamedBody {
            success,
            status,
            bytes_streamed,
            leftover: pending,
        })
    }
}
