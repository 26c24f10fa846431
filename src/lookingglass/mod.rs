//! Looking-glass clients
//!
//! A looking glass answers one question for route-check: which routes does
//! the public collector currently hold for paths through a given AS. The
//! answer is returned as raw `show ip bgp` text; interpreting it is the job of
//! [`crate::lens::routeview::RouteViewParser`].
//!
//! Two transports are provided:
//! - [`TelnetLookingGlass`]: the classic route-views telnet interface (default)
//! - [`HttpLookingGlass`]: any HTTP endpoint returning the same text
//!
//! Both are wrapped in [`Retry`], which retries a transient failure once.

mod http;
mod telnet;

pub use http::HttpLookingGlass;
pub use telnet::TelnetLookingGlass;

use crate::config::RouteCheckConfig;
use crate::error::FetchError;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Source of raw looking-glass text
pub trait LookingGlassFetcher {
    /// Query routes whose AS path contains `asn`
    fn fetch(&self, asn: u32) -> Result<String, FetchError>;

    /// Human-readable identifier of the endpoint, stored with snapshots
    fn source(&self) -> String;
}

impl<T: LookingGlassFetcher + ?Sized> LookingGlassFetcher for Box<T> {
    fn fetch(&self, asn: u32) -> Result<String, FetchError> {
        (**self).fetch(asn)
    }

    fn source(&self) -> String {
        (**self).source()
    }
}

/// The command issued on a Cisco-style looking glass for `asn`
///
/// `_` matches any delimiter in Cisco AS-path regexps, so `_64500_` selects
/// paths containing AS64500 as a whole token.
pub fn route_query(asn: u32) -> String {
    format!("show ip bgp regexp _{}_", asn)
}

/// Transport used to reach the looking glass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LookingGlassMethod {
    #[default]
    Telnet,
    Http,
}

impl fmt::Display for LookingGlassMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookingGlassMethod::Telnet => write!(f, "telnet"),
            LookingGlassMethod::Http => write!(f, "http"),
        }
    }
}

impl FromStr for LookingGlassMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "telnet" => Ok(LookingGlassMethod::Telnet),
            "http" | "https" => Ok(LookingGlassMethod::Http),
            _ => Err(format!(
                "Unknown looking glass method '{}'. Valid methods: telnet, http",
                s
            )),
        }
    }
}

/// Retry a transient fetch failure at most once
pub struct Retry<F> {
    inner: F,
}

impl<F: LookingGlassFetcher> Retry<F> {
    pub fn new(inner: F) -> Self {
        Self { inner }
    }
}

impl<F: LookingGlassFetcher> LookingGlassFetcher for Retry<F> {
    fn fetch(&self, asn: u32) -> Result<String, FetchError> {
        match self.inner.fetch(asn) {
            Err(e) if e.is_transient() => {
                warn!("looking glass query failed ({}), retrying once", e);
                self.inner.fetch(asn)
            }
            other => other,
        }
    }

    fn source(&self) -> String {
        self.inner.source()
    }
}

/// Build the configured looking-glass client, with retry
pub fn from_config(config: &RouteCheckConfig) -> Result<Box<dyn LookingGlassFetcher>> {
    match config.lg_method {
        LookingGlassMethod::Telnet => {
            let client = TelnetLookingGlass::new(
                config.lg_host.clone(),
                config.lg_port,
                config.lg_username.clone(),
                config.lg_timeout(),
            )
            .with_command_timeout(config.lg_command_timeout());
            Ok(Box::new(Retry::new(client)))
        }
        LookingGlassMethod::Http => {
            let url = config
                .lg_http_url
                .clone()
                .ok_or_else(|| anyhow!("lg_http_url must be set to use the HTTP looking glass"))?;
            let client = HttpLookingGlass::new(url, config.lg_timeout());
            Ok(Box::new(Retry::new(client)))
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::io;
    use std::rc::Rc;

    /// Fetcher replaying a fixed list of outcomes, counting calls
    pub struct ScriptedFetcher {
        outcomes: RefCell<VecDeque<Result<String, FetchError>>>,
        pub calls: Rc<RefCell<usize>>,
    }

    impl ScriptedFetcher {
        pub fn new(outcomes: Vec<Result<String, FetchError>>) -> Self {
            Self {
                outcomes: RefCell::new(outcomes.into()),
                calls: Rc::new(RefCell::new(0)),
            }
        }
    }

    impl LookingGlassFetcher for ScriptedFetcher {
        fn fetch(&self, _asn: u32) -> Result<String, FetchError> {
            *self.calls.borrow_mut() += 1;
            self.outcomes
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Err(unreachable_error()))
        }

        fn source(&self) -> String {
            "scripted".to_string()
        }
    }

    pub fn timeout_error() -> FetchError {
        FetchError::from_io("scripted", io::Error::from(io::ErrorKind::TimedOut))
    }

    pub fn unreachable_error() -> FetchError {
        FetchError::Unreachable {
            endpoint: "scripted".to_string(),
            message: "no more scripted outcomes".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn test_route_query() {
        assert_eq!(route_query(64500), "show ip bgp regexp _64500_");
    }

    #[test]
    fn test_method_from_str() {
        assert_eq!(
            "telnet".parse::<LookingGlassMethod>().unwrap(),
            LookingGlassMethod::Telnet
        );
        assert_eq!(
            "HTTPS".parse::<LookingGlassMethod>().unwrap(),
            LookingGlassMethod::Http
        );
        assert!("ssh".parse::<LookingGlassMethod>().is_err());
        assert_eq!(LookingGlassMethod::Http.to_string(), "http");
    }

    #[test]
    fn test_retry_once_on_transient_error() {
        let fetcher = ScriptedFetcher::new(vec![Err(timeout_error()), Ok("routes".to_string())]);
        let calls = fetcher.calls.clone();
        let retry = Retry::new(fetcher);

        assert_eq!(retry.fetch(64500).unwrap(), "routes");
        assert_eq!(*calls.borrow(), 2);
    }

    #[test]
    fn test_retry_gives_up_after_second_failure() {
        let fetcher = ScriptedFetcher::new(vec![
            Err(timeout_error()),
            Err(timeout_error()),
            Ok("never reached".to_string()),
        ]);
        let calls = fetcher.calls.clone();
        let retry = Retry::new(fetcher);

        assert!(matches!(retry.fetch(64500), Err(FetchError::Timeout { .. })));
        assert_eq!(*calls.borrow(), 2);
    }

    #[test]
    fn test_no_retry_on_permanent_error() {
        let fetcher = ScriptedFetcher::new(vec![
            Err(FetchError::HttpStatus {
                endpoint: "https://lg.example".to_string(),
                status: 404,
            }),
            Ok("never reached".to_string()),
        ]);
        let calls = fetcher.calls.clone();
        let retry = Retry::new(fetcher);

        assert!(matches!(
            retry.fetch(64500),
            Err(FetchError::HttpStatus { status: 404, .. })
        ));
        assert_eq!(*calls.borrow(), 1);
    }

    #[test]
    fn test_no_retry_on_empty_body() {
        let fetcher = ScriptedFetcher::new(vec![Ok(String::new()), Ok("second".to_string())]);
        let calls = fetcher.calls.clone();
        let retry = Retry::new(fetcher);

        assert_eq!(retry.fetch(64500).unwrap(), "");
        assert_eq!(*calls.borrow(), 1);
    }
}
