//! Player identity and region types.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Separator between the name and tag of a riot-style identifier.
pub const TAG_DELIMITER: char = '#';

/// Reasons a mention cannot be turned into a [`PlayerIdentity`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("No name#tag identifier found")]
    NoMention,

    #[error("Missing '#' between name and tag in '{0}'")]
    MissingDelimiter(String),

    #[error("Player name is empty")]
    EmptyName,

    #[error("Player tag is empty")]
    EmptyTag,

    #[error("Player tag '{0}' must be letters and digits only")]
    InvalidTag(String),

    #[error("Unknown region '{0}'")]
    UnknownRegion(String),
}

/// Upstream region shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    Na,
    Eu,
    Ap,
    Kr,
    Latam,
    Br,
}

impl Region {
    /// Default probe order when a player's region is not known.
    pub const PROBE_ORDER: [Region; 6] = [
        Region::Na,
        Region::Eu,
        Region::Ap,
        Region::Kr,
        Region::Latam,
        Region::Br,
    ];

    /// Path segment used by the upstream API.
    pub fn as_str(&self) -> &'static str {
        match self {
            Region::Na => "na",
            Region::Eu => "eu",
            Region::Ap => "ap",
            Region::Kr => "kr",
            Region::Latam => "latam",
            Region::Br => "br",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Region {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "na" => Ok(Region::Na),
            "eu" => Ok(Region::Eu),
            "ap" => Ok(Region::Ap),
            "kr" => Ok(Region::Kr),
            "latam" => Ok(Region::Latam),
            "br" => Ok(Region::Br),
            other => Err(IdentityError::UnknownRegion(other.to_string())),
        }
    }
}

/// A player referenced by name, tag and (possibly not yet known) region.
///
/// Equality and hashing ignore case on name and tag and ignore the region,
/// so an identity keeps comparing equal to itself after its region is
/// resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerIdentity {
    pub region: Option<Region>,
    pub name: String,
    pub tag: String,
}

impl PlayerIdentity {
    /// Build an identity, rejecting an empty name or a tag that is empty or
    /// not alphanumeric.
    pub fn new(
        name: impl Into<String>,
        tag: impl Into<String>,
        region: Option<Region>,
    ) -> Result<Self, IdentityError> {
        let name = name.into().trim().to_string();
        let tag = tag.into().trim().to_string();

        if name.is_empty() {
            return Err(IdentityError::EmptyName);
        }
        if tag.is_empty() {
            return Err(IdentityError::EmptyTag);
        }
        if !tag.chars().all(char::is_alphanumeric) {
            return Err(IdentityError::InvalidTag(tag));
        }

        Ok(Self { region, name, tag })
    }

    /// Parse a bare `name#tag` identifier.
    pub fn parse(input: &str) -> Result<Self, IdentityError> {
        let input = input.trim();
        let (name, tag) = input
            .split_once(TAG_DELIMITER)
            .ok_or_else(|| IdentityError::MissingDelimiter(input.to_string()))?;
        Self::new(name, tag, None)
    }

    /// Parse an argument that is exactly one identifier.
    ///
    /// Accepts `name#tag`, optionally quoted and optionally prefixed with a
    /// region (`eu:name#tag`, `eu/name#tag`). The whole input is the
    /// identifier, so names keep their spaces and trailing words fail the
    /// tag check instead of being dropped.
    pub fn parse_qualified(input: &str) -> Result<Self, IdentityError> {
        let input = input.trim().trim_matches('"').trim();

        if let Some((prefix, rest)) = input.split_once([':', '/']) {
            if let Ok(region) = prefix.parse::<Region>() {
                let rest = rest.trim().trim_matches('"');
                return Ok(Self::parse(rest)?.with_region(region));
            }
        }

        Self::parse(input)
    }

    pub fn with_region(mut self, region: Region) -> Self {
        self.region = Some(region);
        self
    }

    /// Case-insensitive comparison against a roster entry.
    pub fn matches(&self, name: &str, tag: &str) -> bool {
        self.name.to_lowercase() == name.trim().to_lowercase()
            && self.tag.to_lowercase() == tag.trim().to_lowercase()
    }

    /// Storage partition key (`region/name/tag`, lowercased).
    ///
    /// `None` until the region is known.
    pub fn partition_key(&self) -> Option<String> {
        self.region.map(|region| {
            format!(
                "{}/{}/{}",
                region,
                self.name.to_lowercase(),
                self.tag.to_lowercase()
            )
        })
    }

    /// The `name#tag` form used in chat.
    pub fn riot_id(&self) -> String {
        format!("{}{}{}", self.name, TAG_DELIMITER, self.tag)
    }
}

impl PartialEq for PlayerIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.matches(&other.name, &other.tag)
    }
}

impl Eq for PlayerIdentity {}

impl Hash for PlayerIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.to_lowercase().hash(state);
        self.tag.to_lowercase().hash(state);
    }
}

impl fmt::Display for PlayerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.region {
            Some(region) => write!(f, "{} ({})", self.riot_id(), region),
            None => f.write_str(&self.riot_id()),
        }
    }
}

impl FromStr for PlayerIdentity {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_parse_basic() {
        let id = PlayerIdentity::parse("ollie#chaos").unwrap();
        assert_eq!(id.name, "ollie");
        assert_eq!(id.tag, "chaos");
        assert!(id.region.is_none());
    }

    #[test]
    fn test_parse_name_with_spaces() {
        let id = PlayerIdentity::parse("  big ollie #NA1 ").unwrap();
        assert_eq!(id.name, "big ollie");
        assert_eq!(id.tag, "NA1");
    }

    #[test]
    fn test_parse_missing_delimiter() {
        assert_eq!(
            PlayerIdentity::parse("ollie"),
            Err(IdentityError::MissingDelimiter("ollie".to_string()))
        );
    }

    #[test]
    fn test_parse_empty_parts() {
        assert_eq!(PlayerIdentity::parse("#chaos"), Err(IdentityError::EmptyName));
        assert_eq!(PlayerIdentity::parse("ollie#"), Err(IdentityError::EmptyTag));
    }

    #[test]
    fn test_parse_rejects_trailing_words_in_tag() {
        assert_eq!(
            PlayerIdentity::parse("ollie#chaos please"),
            Err(IdentityError::InvalidTag("chaos please".to_string()))
        );
    }

    #[test]
    fn test_parse_qualified_keeps_spaces() {
        let id = PlayerIdentity::parse_qualified("big ollie#NA1").unwrap();
        assert_eq!(id.name, "big ollie");
        assert_eq!(id.tag, "NA1");
        assert_eq!(id.region, None);

        let quoted = PlayerIdentity::parse_qualified("\"big ollie#NA1\"").unwrap();
        assert_eq!(quoted.name, "big ollie");
    }

    #[test]
    fn test_parse_qualified_region_prefix() {
        let id = PlayerIdentity::parse_qualified("eu:ollie#chaos").unwrap();
        assert_eq!(id.name, "ollie");
        assert_eq!(id.region, Some(Region::Eu));

        let id = PlayerIdentity::parse_qualified("KR/big ollie#NA1").unwrap();
        assert_eq!(id.name, "big ollie");
        assert_eq!(id.region, Some(Region::Kr));

        // Not a region, so the colon is part of the name.
        let id = PlayerIdentity::parse_qualified("dr:ollie#chaos").unwrap();
        assert_eq!(id.name, "dr:ollie");
        assert_eq!(id.region, None);
    }

    #[test]
    fn test_parse_qualified_rejects_non_identifiers() {
        assert_eq!(
            PlayerIdentity::parse_qualified("ollie"),
            Err(IdentityError::MissingDelimiter("ollie".to_string()))
        );
        assert!(matches!(
            PlayerIdentity::parse_qualified("stats for ollie#chaos please"),
            Err(IdentityError::InvalidTag(_))
        ));
        assert_eq!(
            PlayerIdentity::parse_qualified("eu:#chaos"),
            Err(IdentityError::EmptyName)
        );
    }

    #[test]
    fn test_case_insensitive_equality() {
        let a = PlayerIdentity::parse("Ollie#CHAOS").unwrap();
        let b = PlayerIdentity::parse("ollie#chaos").unwrap().with_region(Region::Na);
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn test_partition_key() {
        let id = PlayerIdentity::parse("Ollie#Chaos").unwrap();
        assert_eq!(id.partition_key(), None);
        assert_eq!(
            id.with_region(Region::Eu).partition_key().as_deref(),
            Some("eu/ollie/chaos")
        );
    }

    #[test]
    fn test_region_from_str() {
        assert_eq!("LATAM".parse::<Region>().unwrap(), Region::Latam);
        assert!(matches!(
            "mars".parse::<Region>(),
            Err(IdentityError::UnknownRegion(_))
        ));
    }

    #[test]
    fn test_region_serialization() {
        let json = serde_json::to_string(&Region::Kr).unwrap();
        assert_eq!(json, "\"kr\"");
    }

    #[test]
    fn test_display() {
        let id = PlayerIdentity::parse("ollie#chaos").unwrap();
        assert_eq!(id.to_string(), "ollie#chaos");
        assert_eq!(id.with_region(Region::Ap).to_string(), "ollie#chaos (ap)");
    }
}
