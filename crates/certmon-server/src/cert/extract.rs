use certmon_common::types::CertificateInfo;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use x509_parser::prelude::*;

use super::prober::ProbeError;

/// Reads the metadata we track from a DER-encoded leaf certificate.
///
/// `ip` is left empty; the prober fills it with the connected address.
pub fn certificate_info(der: &[u8]) -> Result<CertificateInfo, ProbeError> {
    let (_, cert) =
        X509Certificate::from_der(der).map_err(|e| ProbeError::ReadFailure(e.to_string()))?;

    let validity = cert.validity();
    let out_of_range = || ProbeError::ReadFailure("validity out of range".to_string());
    let not_before = DateTime::<Utc>::from_timestamp(validity.not_before.timestamp(), 0)
        .ok_or_else(out_of_range)?;
    let not_after = DateTime::<Utc>::from_timestamp(validity.not_after.timestamp(), 0)
        .ok_or_else(out_of_range)?;

    let issuer = cert
        .issuer()
        .iter_organization()
        .find_map(attr_string)
        .or_else(|| {
            cert.issuer()
                .iter_common_name()
                .find_map(attr_string)
        });
    let cn = cert
        .subject()
        .iter_common_name()
        .find_map(attr_string);

    let san = cert
        .subject_alternative_name()
        .ok()
        .flatten()
        .map(|ext| {
            ext.value
                .general_names
                .iter()
                .filter_map(|name| match name {
                    GeneralName::DNSName(dns) => normalize_dns_name(dns),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(CertificateInfo {
        not_before,
        not_after,
        issuer,
        cn,
        san,
        serial: Some(hex::encode_upper(cert.raw_serial())),
        fingerprint: Some(fingerprint_sha256(der)),
        ip: None,
    })
}

fn attr_string(attr: &AttributeTypeAndValue<'_>) -> Option<String> {
    attr.as_str()
        .ok()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Strips an optional `dns:` prefix (any case). Empty names are dropped.
pub fn normalize_dns_name(name: &str) -> Option<String> {
    let name = name.trim();
    let name = match name.get(..4) {
        Some(prefix) if prefix.eq_ignore_ascii_case("dns:") => name[4..].trim(),
        _ => name,
    };
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// SHA-256 of the DER encoding as colon-separated upper-case hex.
pub fn fingerprint_sha256(der: &[u8]) -> String {
    Sha256::digest(der)
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(":")
}
