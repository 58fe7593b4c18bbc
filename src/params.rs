//! Request parameters shared by the streaming and batch entry points.
//!
//! Validation order: numeric parse, port bounds, range span. Worker count and
//! timeout are never rejected; values outside their bounds fall back to the
//! defaults.

use std::time::Duration;

use serde::Deserialize;

use crate::error::RequestError;
use crate::types::ScanRequest;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_START_PORT: i64 = 1;
pub const DEFAULT_END_PORT: i64 = 1000;
pub const DEFAULT_TIMEOUT_SECS: f64 = 0.5;
pub const DEFAULT_THREADS: i64 = 20;

pub const MAX_PORT_SPAN: i64 = 10_000;
const THREADS_RANGE: std::ops::RangeInclusive<i64> = 1..=100;
const TIMEOUT_RANGE: std::ops::RangeInclusive<f64> = 0.1..=5.0;

/// Raw query string of the streaming endpoint. Everything arrives as text so
/// malformed numbers surface as an error event rather than an HTTP rejection.
/// The access key is read separately, before this struct is decoded.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ScanQuery {
    pub ip: Option<String>,
    pub start_port: Option<String>,
    pub end_port: Option<String>,
    pub timeout: Option<String>,
    pub threads: Option<String>,
}

impl ScanQuery {
    pub fn params(&self) -> Result<ScanParams, RequestError> {
        Ok(ScanParams {
            ip: host_or_default(self.ip.as_deref()),
            start_port: parse_or(self.start_port.as_deref(), DEFAULT_START_PORT)?,
            end_port: parse_or(self.end_port.as_deref(), DEFAULT_END_PORT)?,
            timeout: parse_or(self.timeout.as_deref(), DEFAULT_TIMEOUT_SECS)?,
            threads: parse_or(self.threads.as_deref(), DEFAULT_THREADS)?,
        })
    }
}

/// JSON body of the batch endpoint.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ScanPayload {
    pub key: Option<String>,
    pub ip: Option<String>,
    pub start_port: Option<i64>,
    pub end_port: Option<i64>,
    pub timeout: Option<f64>,
    pub threads: Option<i64>,
}

impl ScanPayload {
    pub fn params(&self) -> ScanParams {
        ScanParams {
            ip: host_or_default(self.ip.as_deref()),
            start_port: self.start_port.unwrap_or(DEFAULT_START_PORT),
            end_port: self.end_port.unwrap_or(DEFAULT_END_PORT),
            timeout: self.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS),
            threads: self.threads.unwrap_or(DEFAULT_THREADS),
        }
    }
}

/// Parsed but not yet validated scan parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanParams {
    pub ip: String,
    pub start_port: i64,
    pub end_port: i64,
    pub timeout: f64,
    pub threads: i64,
}

impl Default for ScanParams {
    fn default() -> Self {
        Self {
            ip: DEFAULT_HOST.to_string(),
            start_port: DEFAULT_START_PORT,
            end_port: DEFAULT_END_PORT,
            timeout: DEFAULT_TIMEOUT_SECS,
            threads: DEFAULT_THREADS,
        }
    }
}

impl ScanParams {
    pub fn validate(self) -> Result<ScanRequest, RequestError> {
        if self.start_port < 1 || self.end_port > 65535 || self.start_port > self.end_port {
            return Err(RequestError::InvalidPortRange);
        }
        if self.end_port - self.start_port > MAX_PORT_SPAN {
            return Err(RequestError::RangeTooLarge);
        }

        Ok(ScanRequest {
            host: self.ip,
            // Both bounds are within 1..=65535 after the checks above.
            start_port: self.start_port as u16,
            end_port: self.end_port as u16,
            timeout: clamp_timeout(self.timeout),
            worker_count: clamp_threads(self.threads),
        })
    }
}

/// Out-of-range worker counts fall back to the default rather than the bound.
pub fn clamp_threads(threads: i64) -> usize {
    if THREADS_RANGE.contains(&threads) {
        threads as usize
    } else {
        DEFAULT_THREADS as usize
    }
}

/// Out-of-range (or non-finite) timeouts fall back to the default.
pub fn clamp_timeout(secs: f64) -> Duration {
    if TIMEOUT_RANGE.contains(&secs) {
        Duration::from_secs_f64(secs)
    } else {
        Duration::from_secs_f64(DEFAULT_TIMEOUT_SECS)
    }
}

pub fn check_access_key(expected: &str, supplied: Option<&str>) -> Result<(), RequestError> {
    match supplied {
        Some(key) if key == expected => Ok(()),
        _ => Err(RequestError::InvalidAccessKey),
    }
}

fn host_or_default(ip: Option<&str>) -> String {
    match ip.map(str::trim) {
        Some(ip) if !ip.is_empty() => ip.to_string(),
        _ => DEFAULT_HOST.to_string(),
    }
}

fn parse_or<T: std::str::FromStr>(raw: Option<&str>, default: T) -> Result<T, RequestError> {
    match raw {
        None => Ok(default),
        Some(s) => s.trim().parse().map_err(|_| RequestError::InvalidParameters),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(pairs: &[(&str, &str)]) -> ScanQuery {
        let mut q = ScanQuery::default();
        for (k, v) in pairs {
            let v = Some(v.to_string());
            match *k {
                "ip" => q.ip = v,
                "start_port" => q.start_port = v,
                "end_port" => q.end_port = v,
                "timeout" => q.timeout = v,
                "threads" => q.threads = v,
                other => panic!("unknown field {other}"),
            }
        }
        q
    }

    #[test]
    fn defaults_apply_when_missing() {
        let req = ScanQuery::default().params().unwrap().validate().unwrap();
        assert_eq!(req.host, "127.0.0.1");
        assert_eq!((req.start_port, req.end_port), (1, 1000));
        assert_eq!(req.timeout, Duration::from_millis(500));
        assert_eq!(req.worker_count, 20);
    }

    #[test]
    fn out_of_range_threads_and_timeout_fall_back_to_defaults() {
        let req = query(&[("threads", "500"), ("timeout", "50")])
            .params()
            .unwrap()
            .validate()
            .unwrap();
        assert_eq!(req.worker_count, 20);
        assert_eq!(req.timeout, Duration::from_millis(500));

        assert_eq!(clamp_threads(0), 20);
        assert_eq!(clamp_threads(100), 100);
        assert_eq!(clamp_timeout(0.05), Duration::from_millis(500));
        assert_eq!(clamp_timeout(5.0), Duration::from_secs(5));
        assert_eq!(clamp_timeout(f64::NAN), Duration::from_millis(500));
    }

    #[test]
    fn malformed_numbers_are_invalid_parameters() {
        assert_eq!(
            query(&[("start_port", "abc")]).params(),
            Err(RequestError::InvalidParameters)
        );
        assert_eq!(
            query(&[("threads", "2.5")]).params(),
            Err(RequestError::InvalidParameters)
        );
        assert!(query(&[("timeout", "1.5")]).params().is_ok());
    }

    #[test]
    fn port_bounds_checked_before_span() {
        let bad = |start, end| {
            ScanParams {
                start_port: start,
                end_port: end,
                ..ScanParams::default()
            }
            .validate()
        };
        assert_eq!(bad(0, 10), Err(RequestError::InvalidPortRange));
        assert_eq!(bad(1, 65536), Err(RequestError::InvalidPortRange));
        assert_eq!(bad(30, 20), Err(RequestError::InvalidPortRange));
        assert_eq!(bad(0, 50_000), Err(RequestError::InvalidPortRange));
        assert_eq!(bad(1, 10_002), Err(RequestError::RangeTooLarge));
        assert!(bad(1, 10_001).is_ok());
        assert!(bad(65535, 65535).is_ok());
    }

    #[test]
    fn payload_uses_defaults() {
        let params = ScanPayload {
            start_port: Some(20),
            end_port: Some(25),
            ..ScanPayload::default()
        }
        .params();
        assert_eq!(params.ip, DEFAULT_HOST);
        assert_eq!(params.threads, DEFAULT_THREADS);
        assert_eq!((params.start_port, params.end_port), (20, 25));
    }

    #[test]
    fn access_key_must_match() {
        assert!(check_access_key("secret", Some("secret")).is_ok());
        assert_eq!(
            check_access_key("secret", Some("nope")),
            Err(RequestError::InvalidAccessKey)
        );
        assert_eq!(check_access_key("secret", None), Err(RequestError::InvalidAccessKey));
    }
}
