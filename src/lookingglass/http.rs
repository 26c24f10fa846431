//! HTTP looking-glass client
//!
//! For looking glasses that expose `show ip bgp` output over HTTP. The URL
//! template must contain `{asn}`, which is replaced by the queried AS number.

use std::time::Duration;
use tracing::info;

use super::LookingGlassFetcher;
use crate::error::FetchError;

pub struct HttpLookingGlass {
    url_template: String,
    agent: ureq::Agent,
}

impl HttpLookingGlass {
    pub fn new(url_template: String, timeout: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        Self {
            url_template,
            agent,
        }
    }

    fn url_for(&self, asn: u32) -> String {
        self.url_template.replace("{asn}", &asn.to_string())
    }
}

impl LookingGlassFetcher for HttpLookingGlass {
    fn fetch(&self, asn: u32) -> Result<String, FetchError> {
        let url = self.url_for(asn);
        info!("querying looking glass {}", url);

        let mut response = self
            .agent
            .get(&url)
            .call()
            .map_err(|e| from_ureq(&url, e))?;
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| from_ureq(&url, e))?;

        info!("received {} bytes from {}", body.len(), url);
        Ok(body)
    }

    fn source(&self) -> String {
        self.url_template.clone()
    }
}

fn from_ureq(url: &str, err: ureq::Error) -> FetchError {
    match err {
        ureq::Error::StatusCode(status) => FetchError::HttpStatus {
            endpoint: url.to_string(),
            status,
        },
        ureq::Error::Timeout(t) => FetchError::Timeout {
            endpoint: url.to_string(),
            message: format!("{:?} timeout", t),
        },
        ureq::Error::Io(e) => FetchError::from_io(url, e),
        other => FetchError::Unreachable {
            endpoint: url.to_string(),
            message: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_url_template() {
        let lg = HttpLookingGlass::new(
            "https://lg.example.net/bgp?regexp=_{asn}_".to_string(),
            Duration::from_secs(10),
        );
        assert_eq!(lg.url_for(64500), "https://lg.example.net/bgp?regexp=_64500_");
        assert_eq!(lg.source(), "https://lg.example.net/bgp?regexp=_{asn}_");
    }

    #[test]
    fn test_error_mapping() {
        let status = from_ureq("https://lg.example.net", ureq::Error::StatusCode(502));
        assert!(matches!(status, FetchError::HttpStatus { status: 502, .. }));
        assert!(!status.is_transient());

        let reset = from_ureq(
            "https://lg.example.net",
            ureq::Error::Io(io::Error::from(io::ErrorKind::ConnectionReset)),
        );
        assert!(reset.is_transient());

        let host = from_ureq("https://lg.example.net", ureq::Error::HostNotFound);
        assert!(matches!(host, FetchError::Unreachable { .. }));
        assert!(!host.is_transient());
    }
}
