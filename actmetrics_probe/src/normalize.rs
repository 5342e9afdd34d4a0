/**
 * Request attribute normalization (spec §4.2).
 *
 * Pulls `protocol`/`host`/`port`/`path`/`url`/`method`/`domain` out of an
 * `http::Uri` + `http::Method` the same way the source probe's
 * `normalizeOptions` does it from Node's `http.request` option shapes —
 * the Rust side just reads them off the already-typed `Uri` instead.
 */
use http::{Method, Uri};

#[derive(Debug, Clone)]
pub struct RequestAttributes {
    /// The literal scheme with its trailing colon (`"http:"` /
    /// `"https:"`), matching Node's `url.protocol` shape (spec §4.2).
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub path: String,
    pub url: String,
    pub method: String,
    pub domain: String,
}

impl RequestAttributes {
    pub fn from_parts(uri: &Uri, method: &Method) -> Self {
        let scheme = uri.scheme_str().unwrap_or("http");
        let protocol = format!("{scheme}:");
        let host = uri.host().unwrap_or("localhost").to_string();
        let default_port = if scheme == "https" { 443 } else { 80 };
        let port = uri.port_u16().unwrap_or(default_port);
        let path = uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());

        // "{protocol}//{host}{:port if not default}{path}" (spec §4.2).
        let url = if port == default_port {
            format!("{protocol}//{host}{path}")
        } else {
            format!("{protocol}//{host}:{port}{path}")
        };
        let domain = naive_domain(&host);

        Self {
            protocol,
            host,
            port,
            path,
            url,
            method: method.as_str().to_string(),
            domain,
        }
    }

    pub fn is_https(&self) -> bool {
        self.protocol == "https:"
    }
}

/// Deliberately naive "registrable domain" heuristic: the last two
/// dot-separated components of the host (spec §9 Open Question,
/// resolved by keeping the source's heuristic as-is — it mishandles
/// multi-part TLDs like `co.uk`, and that's left unfixed on purpose).
fn naive_domain(host: &str) -> String {
    let parts: Vec<&str> = host.split('.').collect();
    if parts.len() <= 2 {
        host.to_string()
    } else {
        parts[parts.len() - 2..].join(".")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_scheme_host_port_and_path_from_a_uri() {
        let uri: Uri = "https://api.example.com:8443/v1/things?x=1".parse().unwrap();
        let attrs = RequestAttributes::from_parts(&uri, &Method::GET);
        assert_eq!(attrs.protocol, "https:");
        assert_eq!(attrs.host, "api.example.com");
        assert_eq!(attrs.port, 8443);
        assert_eq!(attrs.path, "/v1/things?x=1");
        assert_eq!(attrs.method, "GET");
        assert_eq!(attrs.domain, "example.com");
        assert_eq!(attrs.url, "https://api.example.com:8443/v1/things?x=1");
    }

    #[test]
    fn defaults_port_by_scheme_when_absent() {
        let uri: Uri = "http://example.com/".parse().unwrap();
        let attrs = RequestAttributes::from_parts(&uri, &Method::POST);
        assert_eq!(attrs.port, 80);

        let uri: Uri = "https://example.com/".parse().unwrap();
        let attrs = RequestAttributes::from_parts(&uri, &Method::POST);
        assert_eq!(attrs.port, 443);
    }

    #[test]
    fn url_omits_the_port_when_it_matches_the_scheme_default() {
        let uri: Uri = "http://subdomain.example.com/test".parse().unwrap();
        let attrs = RequestAttributes::from_parts(&uri, &Method::GET);
        assert_eq!(attrs.url, "http://subdomain.example.com/test");

        let uri: Uri = "https://example.com/test".parse().unwrap();
        let attrs = RequestAttributes::from_parts(&uri, &Method::GET);
        assert_eq!(attrs.url, "https://example.com/test");
    }

    #[test]
    fn url_keeps_a_non_default_port() {
        let uri: Uri = "http://example.com:8080/test".parse().unwrap();
        let attrs = RequestAttributes::from_parts(&uri, &Method::GET);
        assert_eq!(attrs.url, "http://example.com:8080/test");
    }

    #[test]
    fn domain_heuristic_is_naively_wrong_for_multipart_tlds() {
        // Known, intentional limitation: this should be "example.co.uk"
        // but the naive last-two-components rule yields "co.uk".
        assert_eq!(naive_domain("www.example.co.uk"), "co.uk");
    }

    #[test]
    fn domain_passes_through_short_hosts_unchanged() {
        assert_eq!(naive_domain("localhost"), "localhost");
    }

    #[test]
    fn host_defaults_to_localhost_when_absent_from_the_uri() {
        let uri: Uri = "/just/a/path".parse().unwrap();
        let attrs = RequestAttributes::from_parts(&uri, &Method::GET);
        assert_eq!(attrs.host, "localhost");
    }
}
