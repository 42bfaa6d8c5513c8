//! Hostname resolution for tunnel targets
//!
//! Resolution is always delegated: either to the system resolver or to
//! `dig +short`. Every address returned for a host is kept, since
//! round-robin records can hand out any of them to the client.

use crate::config::ResolverKind;
use std::net::IpAddr;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("DNS resolution failed for {host}: {source}")]
    DnsError {
        host: String,
        source: std::io::Error,
    },
    #[error("Failed to run dig for {host}: {source}")]
    DigSpawn {
        host: String,
        source: std::io::Error,
    },
    #[error("dig failed for {host}: {message}")]
    DigFailed { host: String, message: String },
    #[error("No IP addresses found for host: {0}")]
    NoAddressFound(String),
}

/// Outcome of resolving one configured host
#[derive(Debug)]
pub struct Resolution {
    pub hostname: String,
    pub result: Result<Vec<IpAddr>, ResolveError>,
}

pub struct HostResolver {
    kind: ResolverKind,
    dig_bin: String,
}

impl HostResolver {
    pub fn new(kind: ResolverKind) -> Self {
        Self {
            kind,
            dig_bin: "dig".to_string(),
        }
    }

    pub fn kind(&self) -> ResolverKind {
        self.kind
    }

    /// Resolve one hostname. IP literals are returned as-is.
    pub async fn resolve(&self, hostname: &str) -> Result<Vec<IpAddr>, ResolveError> {
        if let Ok(ip) = hostname.parse::<IpAddr>() {
            return Ok(vec![ip]);
        }

        let ips = match self.kind {
            ResolverKind::System => self.resolve_system(hostname).await?,
            ResolverKind::Dig => self.resolve_dig(hostname).await?,
        };

        if ips.is_empty() {
            return Err(ResolveError::NoAddressFound(hostname.to_string()));
        }

        info!("Resolved {} -> {:?}", hostname, ips);
        Ok(ips)
    }

    /// Resolve every host in order, collecting failures instead of stopping
    pub async fn resolve_all(&self, hostnames: &[String]) -> Vec<Resolution> {
        let mut resolutions = Vec::with_capacity(hostnames.len());
        for hostname in hostnames {
            let result = self.resolve(hostname).await;
            if let Err(ref e) = result {
                warn!("{}", e);
            }
            resolutions.push(Resolution {
                hostname: hostname.clone(),
                result,
            });
        }
        resolutions
    }

    async fn resolve_system(&self, hostname: &str) -> Result<Vec<IpAddr>, ResolveError> {
        debug!("Resolving {} via system DNS", hostname);
        let addrs = tokio::net::lookup_host((hostname, 0))
            .await
            .map_err(|e| ResolveError::DnsError {
                host: hostname.to_string(),
                source: e,
            })?;

        let mut ips: Vec<IpAddr> = Vec::new();
        for ip in addrs.map(|a| a.ip()) {
            if !ips.contains(&ip) {
                ips.push(ip);
            }
        }
        Ok(ips)
    }

    async fn resolve_dig(&self, hostname: &str) -> Result<Vec<IpAddr>, ResolveError> {
        debug!("Resolving {} via {} +short", hostname, self.dig_bin);
        let output = Command::new(&self.dig_bin)
            .args(["+short", hostname])
            .output()
            .await
            .map_err(|e| ResolveError::DigSpawn {
                host: hostname.to_string(),
                source: e,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ResolveError::DigFailed {
                host: hostname.to_string(),
                message: format!("{} ({})", stderr.trim(), output.status),
            });
        }

        Ok(parse_dig_short(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Extract addresses from `dig +short` output
///
/// CNAME targets and comment lines (`;; connection timed out`) are skipped.
pub fn parse_dig_short(output: &str) -> Vec<IpAddr> {
    let mut ips = Vec::new();
    for line in output.lines().map(str::trim) {
        if let Ok(ip) = line.parse::<IpAddr>() {
            if !ips.contains(&ip) {
                ips.push(ip);
            }
        }
    }
    ips
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_error_display() {
        let err = ResolveError::NoAddressFound("test.example.com".to_string());
        assert_eq!(
            err.to_string(),
            "No IP addresses found for host: test.example.com"
        );

        let err = ResolveError::DigFailed {
            host: "a.example.com".to_string(),
            message: "exit status: 9".to_string(),
        };
        assert!(err.to_string().contains("a.example.com"));
        assert!(err.to_string().contains("exit status: 9"));
    }

    #[test]
    fn test_parse_dig_short_plain() {
        let ips = parse_dig_short("93.184.216.34\n");
        assert_eq!(ips, vec!["93.184.216.34".parse::<IpAddr>().unwrap()]);
    }

    #[test]
    fn test_parse_dig_short_skips_cname() {
        let output = "www.example.com.cdn.net.\nedge.cdn.net.\n10.0.0.5\n10.0.0.6\n";
        let ips = parse_dig_short(output);
        assert_eq!(
            ips,
            vec![
                "10.0.0.5".parse::<IpAddr>().unwrap(),
                "10.0.0.6".parse::<IpAddr>().unwrap()
            ]
        );
    }

    #[test]
    fn test_parse_dig_short_errors_and_empty() {
        assert!(parse_dig_short("").is_empty());
        assert!(parse_dig_short(";; connection timed out; no servers could be reached\n").is_empty());
    }

    #[test]
    fn test_parse_dig_short_dedupes_and_keeps_ipv6() {
        let ips = parse_dig_short("2001:db8::1\n10.0.0.1\n2001:db8::1\n");
        assert_eq!(ips.len(), 2);
        assert!(ips[0].is_ipv6());
    }

    #[tokio::test]
    async fn test_ip_literal_bypasses_resolver() {
        let resolver = HostResolver::new(ResolverKind::Dig);
        let ips = resolver.resolve("10.20.30.40").await.unwrap();
        assert_eq!(ips, vec!["10.20.30.40".parse::<IpAddr>().unwrap()]);
    }

    #[tokio::test]
    async fn test_resolve_localhost_system() {
        let resolver = HostResolver::new(ResolverKind::System);
        // localhost might not be configured on all systems
        if let Ok(ips) = resolver.resolve("localhost").await {
            assert!(ips.iter().all(|ip| ip.is_loopback()));
        }
    }

    #[tokio::test]
    async fn test_resolve_nonexistent_host_system() {
        let resolver = HostResolver::new(ResolverKind::System);
        let result = resolver
            .resolve("this-domain-definitely-does-not-exist-12345.invalid")
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_missing_dig_binary() {
        let resolver = HostResolver {
            kind: ResolverKind::Dig,
            dig_bin: "/nonexistent/dig".to_string(),
        };
        let result = resolver.resolve("example.com").await;
        assert!(matches!(result, Err(ResolveError::DigSpawn { .. })));
    }

    #[tokio::test]
    async fn test_resolve_all_keeps_going() {
        let resolver = HostResolver {
            kind: ResolverKind::Dig,
            dig_bin: "/nonexistent/dig".to_string(),
        };
        let hosts = vec!["a.example.com".to_string(), "10.0.0.9".to_string()];
        let resolutions = resolver.resolve_all(&hosts).await;

        assert_eq!(resolutions.len(), 2);
        assert!(resolutions[0].result.is_err());
        assert_eq!(
            resolutions[1].result.as_ref().unwrap(),
            &vec!["10.0.0.9".parse::<IpAddr>().unwrap()]
        );
    }
}
