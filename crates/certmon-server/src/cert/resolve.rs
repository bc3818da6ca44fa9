use std::net::Ipv4Addr;

use anyhow::Context;
use async_trait::async_trait;
use hickory_resolver::TokioResolver;

/// IPv4 name resolution used by the prober.
#[async_trait]
pub trait HostResolver: Send + Sync {
    /// Returns every A record for `hostname`, in resolver order.
    async fn lookup_ipv4(&self, hostname: &str) -> Result<Vec<Ipv4Addr>, String>;
}

/// System-configured hickory resolver.
pub struct HickoryResolver {
    resolver: TokioResolver,
}

impl HickoryResolver {
    pub fn from_system_conf() -> anyhow::Result<Self> {
        let resolver = TokioResolver::builder_tokio()
            .context("Failed to create DNS resolver")?
            .build();
        Ok(Self { resolver })
    }
}

#[async_trait]
impl HostResolver for HickoryResolver {
    async fn lookup_ipv4(&self, hostname: &str) -> Result<Vec<Ipv4Addr>, String> {
        if let Ok(ip) = hostname.parse::<Ipv4Addr>() {
            return Ok(vec![ip]);
        }
        let response = self
            .resolver
            .ipv4_lookup(hostname)
            .await
            .map_err(|e| e.to_string())?;
        Ok(response.iter().map(|a| a.0).collect())
    }
}

/// Whether `ip` is outside the publicly routable IPv4 space.
pub fn is_private_ipv4(ip: &Ipv4Addr) -> bool {
    let octets = ip.octets();
    // RFC 1918 private networks
    ip.is_private()
        // Loopback
        || ip.is_loopback()
        // Link-local
        || ip.is_link_local()
        // Documentation (RFC 5737)
        || ip.is_documentation()
        // Broadcast
        || ip.is_broadcast()
        // Unspecified
        || ip.is_unspecified()
        // Multicast
        || ip.is_multicast()
        // Reserved (240.0.0.0/4)
        || octets[0] >= 240
        // Carrier-grade NAT (100.64.0.0/10, RFC 6598)
        || (octets[0] == 100 && (octets[1] & 0xC0) == 64)
        // "This network" (0.0.0.0/8)
        || octets[0] == 0
        // IETF protocol assignments (192.0.0.0/24)
        || (octets[0] == 192 && octets[1] == 0 && octets[2] == 0)
        // Benchmarking (198.18.0.0/15)
        || (octets[0] == 198 && (octets[1] & 0xFE) == 18)
}

/// First public address in resolver order.
pub fn select_public_address(addresses: &[Ipv4Addr]) -> Option<Ipv4Addr> {
    addresses.iter().copied().find(|ip| !is_private_ipv4(ip))
}
