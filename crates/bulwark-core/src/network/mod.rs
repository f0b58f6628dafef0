//! Network Guard - SSRF protection for outbound requests
//!
//! A URL is checked before any connection is made:
//! 1. Scheme must be `http` or `https`
//! 2. A hostname must be present
//! 3. The host must be on the domain allowlist, if one is configured
//! 4. A literal IP is classified directly; a name is resolved and **every**
//!    address is classified, so one private record is enough to refuse
//!
//! The HTTP client for a request is then pinned to the addresses that were
//! checked, and each redirect hop is checked again before it is followed.

pub mod address;
pub mod resolver;

use std::error::Error as StdError;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use bulwark_primitives::SecurityViolation;
use reqwest::redirect::{Attempt, Policy};
use reqwest::Method;
use tracing::{debug, info, warn};
use url::{Host, Url};

use crate::config::Limits;
use crate::intent::Action;
use crate::result::{ActionOutput, ValidationResult};

pub use address::{is_restricted, restriction};
pub use resolver::{Resolver, StaticResolver, SystemResolver};

pub const GUARD_NETWORK: &str = "network_guard";
pub const GUARD_HTTP_METHOD: &str = "http_method";

pub const ALLOWED_SCHEMES: &[&str] = &["http", "https"];
pub const ALLOWED_METHODS: &[&str] = &["GET", "HEAD"];

/// A URL that passed every check, with the addresses it was checked against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedUrl {
    pub url: Url,
    /// Lowercased hostname, or the IP literal without brackets
    pub host: String,
    pub addrs: Vec<IpAddr>,
    pub literal_ip: bool,
}

pub struct NetworkGuard {
    resolver: Arc<dyn Resolver>,
    allowed_domains: Option<Vec<String>>,
    timeout: Duration,
    max_redirects: usize,
    max_body_bytes: usize,
}

impl NetworkGuard {
    pub fn new(
        resolver: Arc<dyn Resolver>,
        allowed_domains: Option<Vec<String>>,
        limits: &Limits,
    ) -> Self {
        let allowed_domains = allowed_domains.map(|domains| {
            domains
                .iter()
                .map(|d| d.trim().to_ascii_lowercase())
                .filter(|d| !d.is_empty())
                .collect()
        });
        Self {
            resolver,
            allowed_domains,
            timeout: limits.http_timeout(),
            max_redirects: limits.max_redirects,
            max_body_bytes: limits.max_response_bytes,
        }
    }

    pub fn allowed_domains(&self) -> Option<&[String]> {
        self.allowed_domains.as_deref()
    }

    /// Run the full URL policy. `allowed_domains` of `None` admits any
    /// public host.
    pub async fn validate_url(
        &self,
        raw: &str,
        allowed_domains: Option<&[String]>,
    ) -> Result<ValidatedUrl, SecurityViolation> {
        let url = Url::parse(raw)
            .map_err(|e| violation(format!("Malformed URL: {raw} ({e})"), raw))?;

        check_scheme(&url)?;

        let (host, literal) = match url.host() {
            Some(Host::Domain(d)) if !d.is_empty() => (d.to_ascii_lowercase(), None),
            Some(Host::Ipv4(ip)) => (ip.to_string(), Some(IpAddr::V4(ip))),
            Some(Host::Ipv6(ip)) => (ip.to_string(), Some(IpAddr::V6(ip))),
            _ => return Err(violation(format!("No hostname in URL: {raw}"), raw)),
        };

        if let Some(domains) = allowed_domains {
            if !domains.iter().any(|d| d.trim().eq_ignore_ascii_case(&host)) {
                return Err(violation(
                    format!("Domain '{host}' not in allowed list: [{}]", domains.join(", ")),
                    host,
                ));
            }
        }

        if let Some(ip) = literal {
            if let Some(class) = restriction(ip) {
                return Err(violation(format!("Blocked {class} IP address: {ip}"), ip.to_string()));
            }
            debug!(url = %url, ip = %ip, "URL points to public IP");
            return Ok(ValidatedUrl {
                url,
                host,
                addrs: vec![ip],
                literal_ip: true,
            });
        }

        let addrs = self.resolver.resolve(&host).await.map_err(|e| {
            violation(format!("DNS resolution failed for '{host}': {e}"), host.clone())
        })?;
        if addrs.is_empty() {
            return Err(violation(format!("DNS returned no results for '{host}'"), host));
        }

        for ip in &addrs {
            if let Some(class) = restriction(*ip) {
                return Err(violation(
                    format!("Domain '{host}' resolves to {class} IP {ip}; request blocked"),
                    ip.to_string(),
                ));
            }
        }

        debug!(url = %url, records = addrs.len(), "URL validated, all addresses public");
        Ok(ValidatedUrl {
            url,
            host,
            addrs,
            literal_ip: false,
        })
    }

    /// Validate then perform a GET or HEAD request.
    ///
    /// The method is checked before the URL, so a disallowed method is
    /// refused whatever the target.
    pub async fn request(&self, raw: &str, method: &str) -> ValidationResult {
        let action = Action::WebRequest;
        let method = method.trim().to_ascii_uppercase();

        if !ALLOWED_METHODS.contains(&method.as_str()) {
            return ValidationResult::refused(
                action,
                GUARD_HTTP_METHOD,
                format!("HTTP method '{method}' not allowed. Only GET and HEAD are permitted."),
                method,
            );
        }

        let validated = match self.validate_url(raw, self.allowed_domains()).await {
            Ok(v) => v,
            Err(v) => return ValidationResult::blocked(action, v, raw),
        };

        self.fetch(raw, &validated, method).await
    }

    /// Perform the request against an already validated target
    async fn fetch(&self, raw: &str, target: &ValidatedUrl, method: String) -> ValidationResult {
        let action = Action::WebRequest;

        let client = match self.client_for(target) {
            Ok(c) => c,
            Err(e) => {
                return ValidationResult::error(action, format!("Failed to build HTTP client: {e}"))
            }
        };

        let verb = if method == "HEAD" { Method::HEAD } else { Method::GET };
        let response = match client.request(verb, target.url.clone()).send().await {
            Ok(r) => r,
            Err(e) => return self.send_failure(raw, e),
        };

        let status = response.status().as_u16();
        let (content, truncated) = match read_capped(response, self.max_body_bytes).await {
            Ok(body) => body,
            Err(e) => return self.send_failure(raw, e),
        };

        info!(url = %target.url, status, truncated, "web request completed");
        ValidationResult::Success(ActionOutput::WebRequest {
            url: raw.to_string(),
            method,
            status_code: status,
            content,
            truncated,
        })
    }

    fn send_failure(&self, raw: &str, err: reqwest::Error) -> ValidationResult {
        let action = Action::WebRequest;

        if let Some(v) = redirect_violation(&err) {
            warn!(url = %raw, reason = %v.message, "redirect refused");
            return ValidationResult::blocked(action, v, raw);
        }
        if err.is_timeout() {
            return ValidationResult::error(
                action,
                format!("Request to {raw} timed out after {}s", self.timeout.as_secs_f64()),
            );
        }
        ValidationResult::error(action, format!("HTTP request failed: {err}"))
    }

    /// Client that can only connect to the addresses `target` was checked
    /// against, with redirects re-validated hop by hop.
    fn client_for(&self, target: &ValidatedUrl) -> reqwest::Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .no_proxy()
            .user_agent(concat!("bulwark/", env!("CARGO_PKG_VERSION")))
            .redirect(redirect_policy(
                target.host.clone(),
                self.max_redirects,
                self.allowed_domains.is_none(),
            ));

        if !target.literal_ip {
            // Port is taken from the URL; 0 is a placeholder
            let pinned: Vec<SocketAddr> = target.addrs.iter().map(|ip| SocketAddr::new(*ip, 0)).collect();
            builder = builder.resolve_to_addrs(&target.host, &pinned);
        }

        builder.build()
    }
}

fn violation(message: impl Into<String>, value: impl Into<String>) -> SecurityViolation {
    SecurityViolation::new(GUARD_NETWORK, message, value)
}

fn check_scheme(url: &Url) -> Result<(), SecurityViolation> {
    let scheme = url.scheme();
    if ALLOWED_SCHEMES.contains(&scheme) {
        Ok(())
    } else {
        Err(violation(
            format!("Blocked scheme '{scheme}'. Allowed: [{}]", ALLOWED_SCHEMES.join(", ")),
            scheme,
        ))
    }
}

fn redirect_policy(pinned_host: String, max_redirects: usize, allow_public_ips: bool) -> Policy {
    Policy::custom(move |attempt: Attempt<'_>| {
        if attempt.previous().len() > max_redirects {
            let next = attempt.url().to_string();
            return attempt.error(violation(
                format!("Too many redirects (max {max_redirects})"),
                next,
            ));
        }
        match check_redirect(attempt.url(), &pinned_host, allow_public_ips) {
            Ok(()) => attempt.follow(),
            Err(v) => attempt.error(v),
        }
    })
}

/// A redirect may stay on the validated host, or go to a public literal IP
/// when no domain allowlist is in force. Anything else would reach an
/// address the client was never pinned to.
fn check_redirect(next: &Url, pinned_host: &str, allow_public_ips: bool) -> Result<(), SecurityViolation> {
    check_scheme(next)?;

    let ip = match next.host() {
        Some(Host::Domain(d)) if d.eq_ignore_ascii_case(pinned_host) => return Ok(()),
        Some(Host::Domain(d)) => {
            return Err(violation(
                format!("Redirect to a different host '{d}' is not allowed"),
                next.as_str(),
            ))
        }
        Some(Host::Ipv4(ip)) => IpAddr::V4(ip),
        Some(Host::Ipv6(ip)) => IpAddr::V6(ip),
        None => return Err(violation("Redirect target has no host", next.as_str())),
    };

    if let Some(class) = restriction(ip) {
        return Err(violation(
            format!("Redirect to {class} IP address {ip} blocked"),
            ip.to_string(),
        ));
    }
    if allow_public_ips || ip.to_string() == pinned_host {
        Ok(())
    } else {
        Err(violation(
            format!("Redirect to a different host '{ip}' is not allowed"),
            next.as_str(),
        ))
    }
}

/// Our redirect policy reports refusals as a `SecurityViolation` somewhere
/// in reqwest's error chain
fn redirect_violation(err: &reqwest::Error) -> Option<SecurityViolation> {
    if !err.is_redirect() {
        return None;
    }
    let mut source = err.source();
    while let Some(e) = source {
        if let Some(v) = e.downcast_ref::<SecurityViolation>() {
            return Some(v.clone());
        }
        source = e.source();
    }
    None
}

/// Accumulates at most `cap` bytes of a body, remembering whether more arrived
#[derive(Debug)]
struct BodyBuffer {
    bytes: Vec<u8>,
    cap: usize,
    truncated: bool,
}

impl BodyBuffer {
    fn new(cap: usize) -> Self {
        Self {
            bytes: Vec::new(),
            cap,
            truncated: false,
        }
    }

    /// Returns `false` once the cap is exceeded and reading should stop
    fn push(&mut self, chunk: &[u8]) -> bool {
        let room = self.cap.saturating_sub(self.bytes.len());
        if chunk.len() > room {
            self.bytes.extend_from_slice(&chunk[..room]);
            self.truncated = true;
            return false;
        }
        self.bytes.extend_from_slice(chunk);
        true
    }

    fn finish(self) -> (String, bool) {
        (String::from_utf8_lossy(&self.bytes).into_owned(), self.truncated)
    }
}

async fn read_capped(mut response: reqwest::Response, cap: usize) -> reqwest::Result<(String, bool)> {
    let mut body = BodyBuffer::new(cap);
    while let Some(chunk) = response.chunk().await? {
        if !body.push(&chunk) {
            break;
        }
    }
    Ok(body.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::{Failure, Refusal};
    use pretty_assertions::assert_eq;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn guard(resolver: StaticResolver) -> NetworkGuard {
        NetworkGuard::new(Arc::new(resolver), None, &Limits::default())
    }

    /// Target pinned to a listener on loopback, as if `pinned.test` had
    /// resolved there
    fn pinned(port: u16, path: &str) -> ValidatedUrl {
        ValidatedUrl {
            url: Url::parse(&format!("http://pinned.test:{port}{path}")).unwrap(),
            host: "pinned.test".to_string(),
            addrs: vec![ip("127.0.0.1")],
            literal_ip: false,
        }
    }

    /// Answer every connection with the same canned HTTP response
    async fn serve(response: String) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let response = response.clone();
                tokio::spawn(async move {
                    let mut buf = [0u8; 4096];
                    let _ = stream.read(&mut buf).await;
                    let _ = stream.write_all(response.as_bytes()).await;
                    let _ = stream.shutdown().await;
                });
            }
        });
        port
    }

    fn public_resolver() -> StaticResolver {
        StaticResolver::new()
            .with_host("example.com", [ip("93.184.216.34")])
            .with_host("rebind.test", [ip("93.184.216.34"), ip("127.0.0.1")])
            .with_host("v6local.test", [ip("2606:4700::1"), ip("::1")])
            .with_host("empty.test", [])
    }

    #[tokio::test]
    async fn test_public_host_validates() {
        let guard = guard(public_resolver());
        let validated = guard.validate_url("https://Example.com/page", None).await.unwrap();
        assert_eq!(validated.host, "example.com");
        assert_eq!(validated.addrs, vec![ip("93.184.216.34")]);
        assert!(!validated.literal_ip);
    }

    #[tokio::test]
    async fn test_bad_scheme_blocked() {
        let guard = guard(public_resolver());
        for url in ["ftp://example.com/x", "file:///etc/passwd", "gopher://example.com"] {
            let err = guard.validate_url(url, None).await.unwrap_err();
            assert_eq!(err.guard, GUARD_NETWORK);
            assert!(err.message.contains("Blocked scheme"), "{url}");
        }
    }

    #[tokio::test]
    async fn test_malformed_and_hostless() {
        let guard = guard(public_resolver());
        assert!(guard.validate_url("not a url", None).await.is_err());
        assert!(guard.validate_url("http://", None).await.is_err());
    }

    #[tokio::test]
    async fn test_private_literal_blocked() {
        let guard = guard(public_resolver());
        let err = guard.validate_url("http://192.168.1.1/admin", None).await.unwrap_err();
        assert_eq!(err.value, "192.168.1.1");

        let err = guard.validate_url("http://[::1]:8080/", None).await.unwrap_err();
        assert_eq!(err.value, "::1");

        // Decimal and hex encodings of 127.0.0.1 are normalized by the parser
        for obfuscated in ["http://2130706433/", "http://0x7f.0.0.1/", "http://127.1/"] {
            let err = guard.validate_url(obfuscated, None).await.unwrap_err();
            assert_eq!(err.value, "127.0.0.1", "{obfuscated}");
        }
    }

    #[tokio::test]
    async fn test_metadata_endpoint_blocked() {
        let guard = guard(public_resolver());
        let err = guard
            .validate_url("http://169.254.169.254/latest/meta-data/", None)
            .await
            .unwrap_err();
        assert!(err.message.contains("link-local"));
    }

    #[tokio::test]
    async fn test_any_private_record_blocks() {
        let guard = guard(public_resolver());
        let err = guard.validate_url("http://rebind.test/", None).await.unwrap_err();
        assert_eq!(err.value, "127.0.0.1");
        let err = guard.validate_url("http://v6local.test/", None).await.unwrap_err();
        assert_eq!(err.value, "::1");
    }

    #[tokio::test]
    async fn test_dns_failure_blocked() {
        let guard = guard(public_resolver());
        let err = guard.validate_url("http://nxdomain.test/", None).await.unwrap_err();
        assert_eq!(err.value, "nxdomain.test");
        assert!(err.message.contains("DNS resolution failed"));

        let err = guard.validate_url("http://empty.test/", None).await.unwrap_err();
        assert!(err.message.contains("no results"));
    }

    #[tokio::test]
    async fn test_domain_allowlist_case_insensitive() {
        let guard = guard(public_resolver());
        let allowed = vec!["EXAMPLE.com".to_string()];
        assert!(guard
            .validate_url("https://example.COM/", Some(&allowed))
            .await
            .is_ok());

        let err = guard
            .validate_url("https://other.org/", Some(&allowed))
            .await
            .unwrap_err();
        assert_eq!(err.value, "other.org");
    }

    #[tokio::test]
    async fn test_method_checked_first() {
        let guard = guard(public_resolver());
        // Even a private target reports the method refusal
        let result = guard.request("http://10.0.0.1/", "post").await;
        let ValidationResult::Blocked(Refusal { guard, violator, reason, .. }) = result else {
            panic!("expected blocked");
        };
        assert_eq!(guard, GUARD_HTTP_METHOD);
        assert_eq!(violator, "POST");
        assert!(reason.contains("Only GET and HEAD"));
    }

    #[tokio::test]
    async fn test_request_private_target_blocked_before_io() {
        let guard = guard(public_resolver());
        let result = guard.request("http://192.168.1.1/admin", "GET").await;
        let ValidationResult::Blocked(refusal) = result else {
            panic!("expected blocked");
        };
        assert_eq!(refusal.guard, GUARD_NETWORK);
        assert!(refusal.violator.contains("192.168.1.1"));
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        // Bound but never accepted: the connection lands in the backlog and
        // no response ever comes
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut guard = guard(public_resolver());
        guard.timeout = Duration::from_millis(200);

        let result = guard.fetch("http://pinned.test/", &pinned(port, "/"), "GET".into()).await;
        let ValidationResult::Error(Failure { reason, .. }) = result else {
            panic!("expected error");
        };
        assert!(reason.contains("timed out after 0.2s"), "{reason}");
        drop(listener);
    }

    #[tokio::test]
    async fn test_closed_port_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut guard = guard(public_resolver());
        guard.timeout = Duration::from_secs(2);

        let result = guard.fetch("http://pinned.test/", &pinned(port, "/"), "GET".into()).await;
        let ValidationResult::Error(Failure { reason, .. }) = result else {
            panic!("expected error");
        };
        assert!(reason.starts_with("HTTP request failed"), "{reason}");
    }

    #[tokio::test]
    async fn test_redirect_loop_capped() {
        let port = serve(
            "HTTP/1.1 302 Found\r\nLocation: /again\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                .to_string(),
        )
        .await;

        let mut guard = guard(public_resolver());
        guard.max_redirects = 2;
        guard.timeout = Duration::from_secs(5);

        let result = guard.fetch("http://pinned.test/", &pinned(port, "/"), "GET".into()).await;
        let ValidationResult::Blocked(refusal) = result else {
            panic!("expected blocked");
        };
        assert_eq!(refusal.guard, GUARD_NETWORK);
        assert!(refusal.reason.contains("Too many redirects (max 2)"), "{}", refusal.reason);
    }

    #[tokio::test]
    async fn test_redirect_to_loopback_blocked() {
        let port = serve(
            "HTTP/1.1 302 Found\r\nLocation: http://127.0.0.1:9/\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                .to_string(),
        )
        .await;

        let mut guard = guard(public_resolver());
        guard.timeout = Duration::from_secs(5);

        let result = guard.fetch("http://pinned.test/", &pinned(port, "/"), "GET".into()).await;
        let ValidationResult::Blocked(refusal) = result else {
            panic!("expected blocked");
        };
        assert_eq!(refusal.guard, GUARD_NETWORK);
        assert!(refusal.reason.contains("loopback"), "{}", refusal.reason);
    }

    #[tokio::test]
    async fn test_oversized_body_truncated() {
        let body = "x".repeat(300);
        let port = serve(format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        ))
        .await;

        let mut guard = guard(public_resolver());
        guard.max_body_bytes = 100;
        guard.timeout = Duration::from_secs(5);

        let result = guard.fetch("http://pinned.test/", &pinned(port, "/"), "GET".into()).await;
        let ValidationResult::Success(ActionOutput::WebRequest { status_code, content, truncated, .. }) = result else {
            panic!("expected success");
        };
        assert_eq!(status_code, 200);
        assert_eq!(content.len(), 100);
        assert!(truncated);
    }

    #[test]
    fn test_redirect_rules() {
        let url = |s: &str| Url::parse(s).unwrap();

        assert!(check_redirect(&url("https://example.com/next"), "example.com", true).is_ok());
        assert!(check_redirect(&url("https://EXAMPLE.com/next"), "example.com", false).is_ok());
        assert!(check_redirect(&url("https://8.8.8.8/"), "example.com", true).is_ok());

        let err = check_redirect(&url("http://127.0.0.1/"), "example.com", true).unwrap_err();
        assert_eq!(err.value, "127.0.0.1");
        assert!(check_redirect(&url("https://evil.test/"), "example.com", true).is_err());
        assert!(check_redirect(&url("https://8.8.8.8/"), "example.com", false).is_err());
        assert!(check_redirect(&url("ftp://example.com/"), "example.com", true).is_err());
    }

    #[test]
    fn test_body_buffer_caps_and_flags() {
        let mut body = BodyBuffer::new(8);
        assert!(body.push(b"1234"));
        assert!(body.push(b"5678"));
        assert_eq!(body.finish(), ("12345678".to_string(), false));

        let mut body = BodyBuffer::new(8);
        assert!(body.push(b"12345"));
        assert!(!body.push(b"6789"));
        assert_eq!(body.finish(), ("12345678".to_string(), true));
    }

    #[test]
    fn test_body_buffer_lossy_at_cut() {
        let mut body = BodyBuffer::new(1);
        body.push("é".as_bytes());
        let (text, truncated) = body.finish();
        assert!(truncated);
        assert_eq!(text, "\u{FFFD}");
    }
}
