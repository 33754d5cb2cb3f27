//! Endpoint bookkeeping and retry policy.
//!
//! Selection prefers the endpoint checked most recently if it was verified;
//! otherwise it probes the endpoint checked longest ago, which walks the
//! candidates round-robin. Initial check times are staggered by one second
//! so the first probe goes to the base port.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::config::RetryTiming;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EndpointResult {
    #[default]
    Unknown,
    Verified,
    Invalid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub url: String,
    pub last_checked: SystemTime,
    pub last_verified: Option<SystemTime>,
    pub result: EndpointResult,
}

#[derive(Debug, Clone)]
pub struct EndpointSet {
    endpoints: Vec<Endpoint>,
}

impl EndpointSet {
    pub fn new(urls: impl IntoIterator<Item = String>) -> Self {
        let endpoints = urls
            .into_iter()
            .enumerate()
            .map(|(i, url)| Endpoint {
                url,
                last_checked: UNIX_EPOCH + Duration::from_secs(i as u64),
                last_verified: None,
                result: EndpointResult::Unknown,
            })
            .collect();
        Self { endpoints }
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Endpoint> {
        self.endpoints.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Endpoint> {
        self.endpoints.iter()
    }

    /// Index of the endpoint to try next. `None` only for an empty set.
    pub fn select(&self) -> Option<usize> {
        let newest = self
            .endpoints
            .iter()
            .enumerate()
            .rev()
            .max_by_key(|(_, e)| e.last_checked)?;
        if newest.1.result == EndpointResult::Verified {
            return Some(newest.0);
        }
        self.endpoints
            .iter()
            .enumerate()
            .min_by_key(|(_, e)| e.last_checked)
            .map(|(i, _)| i)
    }

    /// An attempt on `index` is starting.
    pub fn begin(&mut self, index: usize, now: SystemTime) {
        if let Some(e) = self.endpoints.get_mut(index) {
            e.last_checked = now;
            e.result = EndpointResult::Unknown;
        }
    }

    /// Connected and handshaken; also used when a verified connection ends.
    pub fn verified(&mut self, index: usize, now: SystemTime) {
        if let Some(e) = self.endpoints.get_mut(index) {
            e.last_checked = now;
            e.last_verified = Some(now);
            e.result = EndpointResult::Verified;
        }
    }

    pub fn invalid(&mut self, index: usize) {
        if let Some(e) = self.endpoints.get_mut(index) {
            e.result = EndpointResult::Invalid;
        }
    }
}

/// How an attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    /// Reached Ready, then the connection ended.
    Dropped,
    /// Never reached Ready.
    Failed,
}

/// Delay before the next attempt.
///
/// `failures_in_row` counts consecutive failed attempts including this one.
/// Every `endpoint_count`-th consecutive failure means all candidates were
/// tried, and the longer sweep delay applies.
pub fn next_delay(
    attempt: Attempt,
    failures_in_row: usize,
    endpoint_count: usize,
    timing: &RetryTiming,
) -> Duration {
    let full_sweep =
        endpoint_count > 0 && failures_in_row > 0 && failures_in_row % endpoint_count == 0;
    match attempt {
        Attempt::Dropped => timing.after_drop,
        Attempt::Failed if full_sweep => timing.after_sweep,
        Attempt::Failed => timing.after_failure,
    }
}
