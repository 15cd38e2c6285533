//! Session-scoped active player tracking.
//!
//! Each conversation owns one [`ActivePlayerContext`]. It holds at most one
//! active identity and is replaced wholesale whenever a different player is
//! mentioned. Switching players never touches stored match data.
//!
//! Pronouns ("me", "my") are not resolved here: callers read
//! [`ActivePlayerContext::active`] and prompt the user when it is unset.

use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{IdentityError, PlayerIdentity, Region, TAG_DELIMITER};

/// Longest player name the upstream allows.
const MAX_NAME_LEN: usize = 16;

fn mention_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)(?:\b(na|eu|ap|kr|latam|br)[:/])?([\p{L}\p{N}_.]+)#([\p{L}\p{N}]+)(?:\s*\((na|eu|ap|kr|latam|br)\))?",
        )
        .expect("mention pattern is valid")
    })
}

/// Find a `name#tag` identifier in free text.
///
/// An optional region may precede the identifier (`eu:name#tag`) or follow
/// it in parentheses (`name#tag (eu)`). Names containing spaces must be
/// quoted.
pub fn resolve_mention(text: &str) -> Result<PlayerIdentity, IdentityError> {
    let text = text.trim();
    if !text.contains(TAG_DELIMITER) {
        return Err(IdentityError::NoMention);
    }

    if let Some(identity) = parse_quoted(text) {
        return Ok(identity);
    }

    if let Some(caps) = mention_regex().captures(text) {
        let region = caps
            .get(1)
            .or_else(|| caps.get(4))
            .map(|m| m.as_str().parse::<Region>())
            .transpose()?;
        let name = caps.get(2).map_or("", |m| m.as_str());
        let tag = caps.get(3).map_or("", |m| m.as_str());
        return PlayerIdentity::new(name, tag, region);
    }

    Err(rejection_reason(text))
}

/// Accept a quoted identifier (`"big ollie#NA1"`) whose name has spaces.
fn parse_quoted(text: &str) -> Option<PlayerIdentity> {
    let mut parts = text.split('"');
    parts.next()?;
    let quoted = parts.next()?;
    if quoted.chars().count() > MAX_NAME_LEN + 6 || !quoted.contains(TAG_DELIMITER) {
        return None;
    }
    PlayerIdentity::parse(quoted).ok()
}

/// Explain why text containing `#` did not yield an identifier.
fn rejection_reason(text: &str) -> IdentityError {
    let Some(pos) = text.find(TAG_DELIMITER) else {
        return IdentityError::NoMention;
    };

    let before = text[..pos].chars().next_back();
    let after = text[pos + TAG_DELIMITER.len_utf8()..].chars().next();

    match (before, after) {
        (None, _) => IdentityError::EmptyName,
        (Some(c), _) if c.is_whitespace() => IdentityError::EmptyName,
        (_, None) => IdentityError::EmptyTag,
        (_, Some(c)) if !c.is_alphanumeric() => IdentityError::EmptyTag,
        _ => IdentityError::MissingDelimiter(text.to_string()),
    }
}

/// What `observe` did with a user message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// No identifier in the message; pointer untouched
    NoMention,

    /// The message named the already active player
    Unchanged,

    /// The pointer now refers to a new player
    Switched { previous: Option<PlayerIdentity> },
}

/// The active player pointer for one conversation.
#[derive(Debug, Clone)]
pub struct ActivePlayerContext {
    session_id: Uuid,
    active: Option<PlayerIdentity>,
}

impl ActivePlayerContext {
    pub fn new() -> Self {
        Self {
            session_id: Uuid::new_v4(),
            active: None,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Parse a mention; see [`resolve_mention`].
    pub fn resolve_mention(&self, text: &str) -> Result<PlayerIdentity, IdentityError> {
        resolve_mention(text)
    }

    /// Replace the active player, returning the previous one.
    ///
    /// No fields carry over from the previous identity.
    pub fn set_active(&mut self, identity: PlayerIdentity) -> Option<PlayerIdentity> {
        info!(
            session = %self.session_id,
            "Active player set to {}",
            identity
        );
        self.active.replace(identity)
    }

    pub fn active(&self) -> Option<&PlayerIdentity> {
        self.active.as_ref()
    }

    /// Mutable access so a sync can write a resolved region back.
    pub fn active_mut(&mut self) -> Option<&mut PlayerIdentity> {
        self.active.as_mut()
    }

    pub fn is_set(&self) -> bool {
        self.active.is_some()
    }

    /// Resolve a user message and switch players when it names a new one.
    ///
    /// Re-mentioning the active player keeps its resolved region.
    pub fn observe(&mut self, text: &str) -> Result<Observation, IdentityError> {
        let identity = match resolve_mention(text) {
            Ok(identity) => identity,
            Err(IdentityError::NoMention) => return Ok(Observation::NoMention),
            Err(e) => return Err(e),
        };

        if let Some(current) = self.active.as_mut() {
            let same_region = match (current.region, identity.region) {
                (Some(a), Some(b)) => a == b,
                _ => true,
            };
            if *current == identity && same_region {
                if current.region.is_none() {
                    current.region = identity.region;
                }
                debug!(session = %self.session_id, "Mention matches active player {}", current);
                return Ok(Observation::Unchanged);
            }
        }

        let previous = self.set_active(identity);
        Ok(Observation::Switched { previous })
    }
}

impl Default for ActivePlayerContext {
    fn default() -> Self {
        Self::new()
    }
}
