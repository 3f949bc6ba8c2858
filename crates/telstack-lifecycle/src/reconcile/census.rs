//! Channel census of a channel configuration file.
//!
//! Two configurations with the same census drive the same spans and the same
//! channels in the same signalling roles; they may still differ in tuning such
//! as echo canceller choice, timing priority, or tone zone.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

/// Directives that place channels into a signalling role.
const CHANNEL_DIRECTIVES: &[&str] = &[
    "bchan", "dchan", "hardhdlc", "fxsks", "fxsls", "fxsgs", "fxoks", "fxols", "fxogs", "e&m",
    "e&me1", "cas", "clear", "mtp2", "dacs",
];

/// Highest channel number a configuration may name.
pub const MAX_CHANNEL: u32 = 4096;

/// Spans and role assignments declared by a configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Census {
    spans: BTreeSet<u32>,
    channels: BTreeMap<String, BTreeSet<u32>>,
}

/// A line that a census cannot be taken from.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot count channels in line {line} ('{content}'): {reason}")]
pub struct CensusError {
    /// One-based line number.
    pub line: usize,
    /// Offending line.
    pub content: String,
    /// What was wrong with it.
    pub reason: &'static str,
}

impl Census {
    /// Takes the census of configuration `text`.
    ///
    /// # Errors
    ///
    /// Returns a [`CensusError`] when a span or channel directive has values
    /// that are not channel numbers or ranges.
    pub fn parse(text: &str) -> Result<Self, CensusError> {
        let mut census = Self::default();
        for (index, raw) in text.lines().enumerate() {
            let content = raw.split_once('#').map_or(raw, |(before, _)| before).trim();
            let Some((key, value)) = content.split_once('=') else {
                continue;
            };
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim();
            let error = |reason| CensusError {
                line: index + 1,
                content: content.to_owned(),
                reason,
            };
            if key == "span" {
                let number = value
                    .split(',')
                    .next()
                    .and_then(|field| field.trim().parse::<u32>().ok())
                    .ok_or_else(|| error("span number is not an integer"))?;
                census.spans.insert(number);
            } else if CHANNEL_DIRECTIVES.contains(&key.as_str()) {
                let channels = parse_channel_list(value).map_err(error)?;
                census.channels.entry(key).or_default().extend(channels);
            }
        }
        Ok(census)
    }

    /// Declared span numbers.
    #[must_use]
    pub const fn spans(&self) -> &BTreeSet<u32> {
        &self.spans
    }

    /// Channels assigned to `directive`.
    #[must_use]
    pub fn channels(&self, directive: &str) -> Option<&BTreeSet<u32>> {
        self.channels.get(directive)
    }

    /// Number of distinct channels placed in any role.
    #[must_use]
    pub fn channel_total(&self) -> usize {
        self.channels
            .values()
            .flatten()
            .collect::<BTreeSet<_>>()
            .len()
    }
}

/// Parses `1-15,17-31` style lists of channels up to [`MAX_CHANNEL`].
fn parse_channel_list(value: &str) -> Result<BTreeSet<u32>, &'static str> {
    let mut channels = BTreeSet::new();
    for item in value.split(',').map(str::trim) {
        let (first, last) = match item.split_once('-') {
            Some((first, last)) => (channel_number(first)?, channel_number(last)?),
            None => {
                let channel = channel_number(item)?;
                (channel, channel)
            }
        };
        if first > last {
            return Err("channel range runs backwards");
        }
        channels.extend(first..=last);
    }
    Ok(channels)
}

fn channel_number(text: &str) -> Result<u32, &'static str> {
    let number: u32 = text.trim().parse().map_err(|_| "bad channel list")?;
    if number > MAX_CHANNEL {
        return Err("channel number above the supported maximum");
    }
    Ok(number)
}
