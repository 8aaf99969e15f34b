// Source catalog
//
// Pure queries over the source types the engine knows about: which endpoints
// are currently attached and which rates each type accepts. Enumeration
// failures degrade to "nothing available" instead of surfacing an error.

use crate::source::SourceDescriptor;
use crate::types::{StreamError, StreamResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Standard serial baud rates, ascending
pub const SERIAL_BAUD_RATES: &[u32] = &[
    9_600, 19_200, 38_400, 57_600, 115_200, 230_400, 460_800, 921_600, 2_000_000,
];

/// Nominal synthetic sample rate in samples per second
pub const SYNTHETIC_RATE: u32 = 100;

/// Kind of sample source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// Physical serial device streaming comma-separated lines
    Serial,
    /// Built-in waveform generator, no hardware needed
    Synthetic,
}

impl SourceType {
    pub const ALL: [SourceType; 2] = [SourceType::Serial, SourceType::Synthetic];

    pub fn name(&self) -> &'static str {
        match self {
            SourceType::Serial => "serial",
            SourceType::Synthetic => "synthetic",
        }
    }

    /// Whether the type needs an endpoint (device path) to open
    pub fn needs_endpoint(&self) -> bool {
        matches!(self, SourceType::Serial)
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// List the endpoints currently available for a source type
///
/// For serial this enumerates attached ports; an enumeration failure is
/// logged and reported as an empty list. Synthetic sources need no endpoint.
pub fn available_endpoints(source_type: SourceType) -> Vec<String> {
    match source_type {
        SourceType::Serial => match tokio_serial::available_ports() {
            Ok(ports) => {
                let mut names: Vec<String> = ports
                    .into_iter()
                    .map(|p| {
                        log::debug!("Found serial port {}", p.port_name);
                        p.port_name
                    })
                    .collect();
                names.sort();
                names.dedup();
                names
            }
            Err(e) => {
                log::warn!("Serial port enumeration failed: {}", e);
                Vec::new()
            }
        },
        SourceType::Synthetic => Vec::new(),
    }
}

/// List the supported rates for a source type, ascending
pub fn available_rates(source_type: SourceType) -> Vec<u32> {
    match source_type {
        SourceType::Serial => SERIAL_BAUD_RATES.to_vec(),
        SourceType::Synthetic => vec![SYNTHETIC_RATE],
    }
}

/// Check a descriptor against the catalog
///
/// The rate must be one of `available_rates`. A serial endpoint must be
/// currently attached; a synthetic endpoint must be empty.
pub fn validate(descriptor: &SourceDescriptor) -> StreamResult<()> {
    let rates = available_rates(descriptor.source_type);
    if !rates.contains(&descriptor.rate) {
        return Err(StreamError::Configuration(format!(
            "Rate {} is not supported by {} sources (supported: {:?})",
            descriptor.rate, descriptor.source_type, rates
        )));
    }

    if descriptor.source_type.needs_endpoint() {
        if descriptor.endpoint.is_empty() {
            return Err(StreamError::Configuration(format!(
                "{} source requires an endpoint",
                descriptor.source_type
            )));
        }
        if !available_endpoints(descriptor.source_type).contains(&descriptor.endpoint) {
            return Err(StreamError::Configuration(format!(
                "Endpoint \"{}\" is not available",
                descriptor.endpoint
            )));
        }
    } else if !descriptor.endpoint.is_empty() {
        return Err(StreamError::Configuration(format!(
            "{} source takes no endpoint, got \"{}\"",
            descriptor.source_type, descriptor.endpoint
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rates_are_ascending() {
        for source_type in SourceType::ALL {
            let rates = available_rates(source_type);
            assert!(!rates.is_empty());
            assert!(rates.windows(2).all(|w| w[0] < w[1]));
        }
        assert!(SERIAL_BAUD_RATES.contains(&115_200));
        assert!(SERIAL_BAUD_RATES.contains(&2_000_000));
    }

    #[test]
    fn test_synthetic_has_no_endpoints() {
        assert!(available_endpoints(SourceType::Synthetic).is_empty());
        assert_eq!(available_rates(SourceType::Synthetic), vec![SYNTHETIC_RATE]);
    }

    #[test]
    fn test_validate_synthetic() {
        assert!(validate(&SourceDescriptor::synthetic()).is_ok());

        let bad_rate = SourceDescriptor::new(SourceType::Synthetic, "", 7);
        assert!(matches!(validate(&bad_rate), Err(StreamError::Configuration(_))));

        let with_endpoint = SourceDescriptor::new(SourceType::Synthetic, "/dev/ttyUSB0", SYNTHETIC_RATE);
        assert!(validate(&with_endpoint).is_err());
    }

    #[test]
    fn test_validate_serial_unknown_endpoint() {
        let descriptor = SourceDescriptor::serial("/dev/rtgraph-does-not-exist", 115_200);
        assert!(matches!(validate(&descriptor), Err(StreamError::Configuration(_))));

        let no_endpoint = SourceDescriptor::serial("", 115_200);
        assert!(validate(&no_endpoint).is_err());

        let bad_rate = SourceDescriptor::serial("/dev/ttyUSB0", 1234);
        assert!(validate(&bad_rate).is_err());
    }
}
