//! Protocol detection
//!
//! Pure, stateless classification of a discovered device into the protocol
//! it speaks. Evaluation order, first match wins:
//!
//! 1. Advertised service identifiers - exact match against each protocol's
//!    known service. Confidence 1.0.
//! 2. Device name heuristics - the MeshCore firmware's literal name prefix,
//!    or the legacy firmware's default "name + 4 hex digits" scheme.
//!    Confidence 0.7-0.8.
//! 3. Manufacturer data - reserved; neither protocol documents a company
//!    identifier, so this step always falls through.
//! 4. Unknown, confidence 0.0.
//!
//! No side effects; safe to call repeatedly and concurrently.

use tracing::debug;
use uuid::Uuid;

use meshlink_session::MESHCORE_SERVICE_UUID;

use crate::types::{DiscoveredDevice, Protocol, ProtocolDetection};

/// GATT service identifier advertised by Meshtastic radios.
pub const MESHTASTIC_SERVICE_UUID: Uuid =
    Uuid::from_u128(0x6ba1b218_15a8_461f_9fa8_5dcae273eafd);

/// Name prefix used by MeshCore firmware defaults.
const MESHCORE_NAME_PREFIX: &str = "meshcore";

/// Stateless protocol classifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProtocolDetector;

impl ProtocolDetector {
    /// Create a detector.
    pub fn new() -> Self {
        Self
    }

    /// Classify a discovered device.
    pub fn detect(&self, device: &DiscoveredDevice) -> ProtocolDetection {
        // Service identifiers are authoritative. Uuid parsing already
        // normalizes case, so equality is the case-insensitive match.
        for service in &device.service_uuids {
            if *service == MESHCORE_SERVICE_UUID {
                return ProtocolDetection {
                    protocol: Protocol::MeshCore,
                    confidence: 1.0,
                    reason: "advertises the MeshCore companion service".to_string(),
                };
            }
            if *service == MESHTASTIC_SERVICE_UUID {
                return ProtocolDetection {
                    protocol: Protocol::Meshtastic,
                    confidence: 1.0,
                    reason: "advertises the Meshtastic service".to_string(),
                };
            }
        }

        if let Some(name) = device.name.as_deref() {
            if name.to_lowercase().starts_with(MESHCORE_NAME_PREFIX) {
                return ProtocolDetection {
                    protocol: Protocol::MeshCore,
                    confidence: 0.8,
                    reason: format!("device name '{name}' matches the MeshCore prefix"),
                };
            }
            if has_legacy_default_name(name) {
                return ProtocolDetection {
                    protocol: Protocol::Meshtastic,
                    confidence: 0.7,
                    reason: format!("device name '{name}' matches the legacy naming scheme"),
                };
            }
        }

        // Manufacturer data is reserved for future use: no company
        // identifier is documented for either protocol.

        debug!(device = %device.id, "no protocol match");
        ProtocolDetection::unknown("no known service or name pattern")
    }
}

/// Whether `name` looks like a legacy firmware default: one or more words
/// followed by a separator and exactly four hex digits (e.g.
/// "Meshtastic_1a2b").
fn has_legacy_default_name(name: &str) -> bool {
    let name = name.trim();
    if name.len() < 6 {
        return false;
    }
    let (head, suffix) = name.split_at(name.len() - 4);
    if !suffix.chars().all(|c| c.is_ascii_hexdigit()) {
        return false;
    }
    let Some(sep) = head.chars().last() else {
        return false;
    };
    (sep == '_' || sep == ' ') && head.len() > 1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ble_device(name: Option<&str>, services: Vec<Uuid>) -> DiscoveredDevice {
        DiscoveredDevice {
            id: "dev-1".to_string(),
            name: name.map(str::to_string),
            service_uuids: services,
            ..Default::default()
        }
    }

    #[test]
    fn test_meshcore_service_uuid_wins_with_full_confidence() {
        let device = ble_device(Some("anything"), vec![MESHCORE_SERVICE_UUID]);
        let detection = ProtocolDetector::new().detect(&device);
        assert_eq!(detection.protocol, Protocol::MeshCore);
        assert_eq!(detection.confidence, 1.0);
    }

    #[test]
    fn test_meshtastic_service_uuid_detected() {
        let device = ble_device(None, vec![MESHTASTIC_SERVICE_UUID]);
        let detection = ProtocolDetector::new().detect(&device);
        assert_eq!(detection.protocol, Protocol::Meshtastic);
        assert_eq!(detection.confidence, 1.0);
    }

    #[test]
    fn test_service_match_is_case_insensitive() {
        // Uuid::parse_str normalizes case, so an upper-case advertisement
        // still matches.
        let upper = Uuid::parse_str("6E400001-B5A3-F393-E0A9-E50E24DCCA9E").unwrap();
        let device = ble_device(None, vec![upper]);
        let detection = ProtocolDetector::new().detect(&device);
        assert_eq!(detection.protocol, Protocol::MeshCore);
    }

    #[test]
    fn test_meshcore_name_prefix() {
        let device = ble_device(Some("MeshCore-a1f0"), vec![]);
        let detection = ProtocolDetector::new().detect(&device);
        assert_eq!(detection.protocol, Protocol::MeshCore);
        assert_eq!(detection.confidence, 0.8);
    }

    #[test]
    fn test_legacy_default_name_pattern() {
        for name in ["Meshtastic_1a2b", "Meshtastic d00f", "T-Beam_CAFE"] {
            let device = ble_device(Some(name), vec![]);
            let detection = ProtocolDetector::new().detect(&device);
            assert_eq!(detection.protocol, Protocol::Meshtastic, "{name}");
            assert_eq!(detection.confidence, 0.7);
        }
    }

    #[test]
    fn test_non_matching_names_fall_through() {
        for name in ["JBL Speaker", "watch_12zz", "_1a2b", "1a2b"] {
            let device = ble_device(Some(name), vec![]);
            let detection = ProtocolDetector::new().detect(&device);
            assert_eq!(detection.protocol, Protocol::Unknown, "{name}");
            assert_eq!(detection.confidence, 0.0);
        }
    }

    #[test]
    fn test_manufacturer_data_never_matches() {
        let mut device = ble_device(None, vec![]);
        device.manufacturer_data.insert(0x004C, vec![1, 2, 3]);
        let detection = ProtocolDetector::new().detect(&device);
        assert_eq!(detection.protocol, Protocol::Unknown);
    }

    #[test]
    fn test_service_beats_name() {
        // A conflicting name loses to the advertised service.
        let device = ble_device(Some("Meshtastic_1a2b"), vec![MESHCORE_SERVICE_UUID]);
        let detection = ProtocolDetector::new().detect(&device);
        assert_eq!(detection.protocol, Protocol::MeshCore);
    }
}
