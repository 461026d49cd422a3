use crate::error::FetchError;
use crate::http::HttpResponse;

/// One outbound GET, carrying a caller-defined tag back with its result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTask<T> {
    pub url: String,
    pub tag: T,
}

impl<T> FetchTask<T> {
    pub fn new(url: impl Into<String>, tag: T) -> Self { Self { url: url.into(), tag } }
}

/// The outcome of a [`FetchTask`]. Failures are data, not errors.
#[derive(Debug)]
pub struct FetchResult<T> {
    pub task:    FetchTask<T>,
    pub outcome: Result<HttpResponse, FetchError>,
}

impl<T> FetchResult<T> {
    /// The response, if the request completed with a 2xx status.
    pub fn success(&self) -> Option<&HttpResponse> {
        self.outcome.as_ref().ok().filter(|r| r.is_success())
    }

    pub fn status(&self) -> Option<u16> { self.outcome.as_ref().ok().map(|r| r.status) }

    /// A short description of why this result needs a retry, or `None` on success.
    pub fn failure(&self) -> Option<String> {
        match &self.outcome {
            Ok(response) if response.is_success() => None,
            Ok(response) => Some(format!("HTTP {}", response.status)),
            Err(e) => Some(e.to_string()),
        }
    }
}
