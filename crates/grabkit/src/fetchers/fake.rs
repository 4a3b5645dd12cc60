//! Scripted fetcher for unit tests

use super::{FetchRequest, FetchResult, Fetcher};
use crate::error::FetchError;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

/// One scripted upstream response
pub(crate) struct FakeResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub chunks: Vec<Result<Bytes, FetchError>>,
}

impl FakeResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            chunks: Vec::new(),
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_lowercase(), value.to_string());
        self
    }

    pub fn body(mut self, body: &str) -> Self {
        self.chunks = vec![Ok(Bytes::copy_from_slice(body.as_bytes()))];
        self
    }

    pub fn chunks(mut self, chunks: Vec<Result<Bytes, FetchError>>) -> Self {
        self.chunks = chunks;
        self
    }
}

/// Replays scripted responses in order and records every request
#[derive(Default)]
pub(crate) struct FakeFetcher {
    script: Mutex<VecDeque<Result<FakeResponse, FetchError>>>,
    requests: Mutex<Vec<FetchRequest>>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, response: FakeResponse) -> Self {
        self.script.lock().unwrap().push_back(Ok(response));
        self
    }

    pub fn fail(self, error: FetchError) -> Self {
        self.script.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn fetch(&self, request: FetchRequest) -> Result<FetchResult, FetchError> {
        let url = request.url.to_string();
        self.requests.lock().unwrap().push(request);
        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .expect("unexpected fetch: script exhausted");
        let response = next?;
        Ok(FetchResult::new(
            url,
            response.status,
            reason(response.status),
            response.headers,
            futures::stream::iter(response.chunks).boxed(),
        ))
    }
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        206 => "Partial Content",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "",
    }
}
