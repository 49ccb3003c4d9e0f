//! The closed set of AWS regions a credential may point at.
//!
//! Region strings are resolved once, when a record is built, so no client is
//! ever constructed for a region we cannot name.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Region {
    UsEast1,
    UsEast2,
    UsWest1,
    UsWest2,
    UsGovWest1,
    UsGovEast1,
    CaCentral1,
    SaEast1,
    EuWest1,
    EuWest2,
    EuWest3,
    EuCentral1,
    EuNorth1,
    EuSouth1,
    ApEast1,
    ApSouth1,
    ApSoutheast1,
    ApSoutheast2,
    ApNortheast1,
    ApNortheast2,
    ApNortheast3,
    MeSouth1,
    AfSouth1,
    CnNorth1,
    CnNorthwest1,
}

impl Region {
    pub const ALL: &'static [Region] = &[
        Region::UsEast1,
        Region::UsEast2,
        Region::UsWest1,
        Region::UsWest2,
        Region::UsGovWest1,
        Region::UsGovEast1,
        Region::CaCentral1,
        Region::SaEast1,
        Region::EuWest1,
        Region::EuWest2,
        Region::EuWest3,
        Region::EuCentral1,
        Region::EuNorth1,
        Region::EuSouth1,
        Region::ApEast1,
        Region::ApSouth1,
        Region::ApSoutheast1,
        Region::ApSoutheast2,
        Region::ApNortheast1,
        Region::ApNortheast2,
        Region::ApNortheast3,
        Region::MeSouth1,
        Region::AfSouth1,
        Region::CnNorth1,
        Region::CnNorthwest1,
    ];

    /// Canonical region id, e.g. `us-east-1`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Region::UsEast1 => "us-east-1",
            Region::UsEast2 => "us-east-2",
            Region::UsWest1 => "us-west-1",
            Region::UsWest2 => "us-west-2",
            Region::UsGovWest1 => "us-gov-west-1",
            Region::UsGovEast1 => "us-gov-east-1",
            Region::CaCentral1 => "ca-central-1",
            Region::SaEast1 => "sa-east-1",
            Region::EuWest1 => "eu-west-1",
            Region::EuWest2 => "eu-west-2",
            Region::EuWest3 => "eu-west-3",
            Region::EuCentral1 => "eu-central-1",
            Region::EuNorth1 => "eu-north-1",
            Region::EuSouth1 => "eu-south-1",
            Region::ApEast1 => "ap-east-1",
            Region::ApSouth1 => "ap-south-1",
            Region::ApSoutheast1 => "ap-southeast-1",
            Region::ApSoutheast2 => "ap-southeast-2",
            Region::ApNortheast1 => "ap-northeast-1",
            Region::ApNortheast2 => "ap-northeast-2",
            Region::ApNortheast3 => "ap-northeast-3",
            Region::MeSouth1 => "me-south-1",
            Region::AfSouth1 => "af-south-1",
            Region::CnNorth1 => "cn-north-1",
            Region::CnNorthwest1 => "cn-northwest-1",
        }
    }

    /// DNS suffix for service endpoints in this partition.
    pub fn dns_suffix(&self) -> &'static str {
        match self {
            Region::CnNorth1 | Region::CnNorthwest1 => "amazonaws.com.cn",
            _ => "amazonaws.com",
        }
    }

    /// Public endpoint for `service` in this region, e.g.
    /// `https://kms.eu-west-1.amazonaws.com`.
    pub fn endpoint(&self, service: &str) -> String {
        format!("https://{}.{}.{}", service, self.as_str(), self.dns_suffix())
    }

    /// Upper-snake spelling (`US_EAST_1`) used by older host configurations.
    fn constant_name(&self) -> String {
        self.as_str().to_ascii_uppercase().replace('-', "_")
    }
}

impl FromStr for Region {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed == "GovCloud" {
            return Ok(Region::UsGovWest1);
        }
        Region::ALL
            .iter()
            .copied()
            .find(|r| r.as_str() == trimmed || r.constant_name() == trimmed)
            .ok_or_else(|| ConfigError::UnknownRegion(s.to_string()))
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Region {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Region {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_canonical_and_constant_names() {
        assert_eq!("us-east-1".parse::<Region>().unwrap(), Region::UsEast1);
        assert_eq!("US_EAST_1".parse::<Region>().unwrap(), Region::UsEast1);
        assert_eq!("EU_CENTRAL_1".parse::<Region>().unwrap(), Region::EuCentral1);
        assert_eq!("GovCloud".parse::<Region>().unwrap(), Region::UsGovWest1);
        assert_eq!(" ap-southeast-2 ".parse::<Region>().unwrap(), Region::ApSoutheast2);
    }

    #[test]
    fn test_unknown_region_rejected() {
        for bad in ["", "us-east-9", "mars-north-1", "us_east_1"] {
            assert!(
                matches!(bad.parse::<Region>(), Err(ConfigError::UnknownRegion(_))),
                "{bad:?} should not parse"
            );
        }
    }

    #[test]
    fn test_every_region_round_trips_through_its_id() {
        for region in Region::ALL {
            assert_eq!(region.as_str().parse::<Region>().unwrap(), *region);
        }
    }

    #[test]
    fn test_endpoints() {
        assert_eq!(Region::EuWest1.endpoint("kms"), "https://kms.eu-west-1.amazonaws.com");
        assert_eq!(
            Region::CnNorth1.endpoint("kms"),
            "https://kms.cn-north-1.amazonaws.com.cn"
        );
    }
}
