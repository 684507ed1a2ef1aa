//! The archive index: `<PREFIX><DATE><SUFFIX>`, used verbatim as a file's basename.
//!
//! PREFIX is the alphabetic code registered for a media type, DATE is the
//! timestamp rendered with the configured strftime format (local time), and
//! SUFFIX is the file size squeezed into a fixed number of digits.

use std::collections::{BTreeMap, HashMap};

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone};
use regex::Regex;

use crate::config::ArchiveConfig;
use crate::error::{MediaError, ParseFailure, Result};

/// A fully validated index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedIndex {
    pub prefix: String,
    /// Raw date field, as it appears in the name
    pub date: String,
    /// Date field decoded to Unix seconds
    pub timestamp: i64,
    /// Raw suffix field
    pub suffix: String,
    /// Media type registered for `prefix`
    pub media_type: String,
}

/// Result of a lenient parse: every sub-result that failed is `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialIndex {
    pub prefix: Option<String>,
    pub date: Option<String>,
    pub timestamp: Option<i64>,
    pub suffix: Option<String>,
    pub media_type: Option<String>,
}

impl PartialIndex {
    pub fn is_complete(&self) -> bool {
        self.prefix.is_some()
            && self.timestamp.is_some()
            && self.suffix.is_some()
            && self.media_type.is_some()
    }
}

/// Format `number` as exactly `length` decimal digits.
///
/// Shorter numbers are left-padded with zeros. Longer numbers fail with
/// `OutOfRange` in strict mode and keep their rightmost `length` digits
/// otherwise. A `length` of zero means "no formatting" and yields `None`.
pub fn format_number(number: i64, length: usize, strict: bool) -> Result<Option<String>> {
    if length == 0 {
        return Ok(None);
    }
    if number < 0 {
        return Err(MediaError::InvalidNumber(number));
    }
    let digits = number.to_string();
    if digits.len() > length {
        if strict {
            return Err(MediaError::OutOfRange { number, length });
        }
        return Ok(Some(digits[digits.len() - length..].to_string()));
    }
    Ok(Some(format!("{:0>width$}", digits, width = length)))
}

/// Generates and parses index strings against a media type registry.
///
/// Built once from an [`ArchiveConfig`] and shared by every entity handle.
#[derive(Debug)]
pub struct IndexCodec {
    prefixes: BTreeMap<String, String>,
    media_types: HashMap<String, String>,
    suffix_length: usize,
    datetime_format: String,
    date_length: usize,
    pattern: Regex,
}

impl IndexCodec {
    pub fn new(config: &ArchiveConfig) -> Result<Self> {
        if config.media_types.is_empty() {
            return Err(MediaError::Config("no media types registered".to_string()));
        }
        if config.suffix_length == 0 {
            return Err(MediaError::Config("suffix_length must be at least 1".to_string()));
        }

        let mut media_types = HashMap::with_capacity(config.media_types.len());
        for (media_type, prefix) in &config.media_types {
            if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_alphabetic()) {
                return Err(MediaError::Config(format!(
                    "prefix {:?} for {} must be ASCII letters",
                    prefix, media_type
                )));
            }
            if let Some(other) = media_types.insert(prefix.clone(), media_type.clone()) {
                return Err(MediaError::Config(format!(
                    "prefix {} is registered for both {} and {}",
                    prefix, other, media_type
                )));
            }
        }

        let format = &config.datetime_format;
        if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
            return Err(MediaError::Config(format!("invalid datetime format {:?}", format)));
        }
        // The date field width is whatever the format renders today.
        let sample = Local::now().format(format).to_string();
        if sample.is_empty() || !sample.bytes().all(|b| b.is_ascii_digit()) {
            return Err(MediaError::Config(format!(
                "datetime format {:?} must render digits only",
                format
            )));
        }
        let date_length = sample.len();

        let pattern = Regex::new(&format!(
            r"^(?P<prefix>(?i:[a-z]+))(?P<date>[0-9]{{{}}})(?P<suffix>[0-9]{{{}}})$",
            date_length, config.suffix_length
        ))
        .map_err(|e| MediaError::Config(e.to_string()))?;

        Ok(Self {
            prefixes: config.media_types.clone(),
            media_types,
            suffix_length: config.suffix_length,
            datetime_format: format.clone(),
            date_length,
            pattern,
        })
    }

    pub fn suffix_length(&self) -> usize {
        self.suffix_length
    }

    pub fn date_length(&self) -> usize {
        self.date_length
    }

    pub fn pattern(&self) -> &Regex {
        &self.pattern
    }

    pub fn is_registered(&self, media_type: &str) -> bool {
        self.prefixes.contains_key(media_type)
    }

    pub fn media_types(&self) -> impl Iterator<Item = &str> {
        self.prefixes.keys().map(String::as_str)
    }

    /// Index prefix registered for `media_type`.
    pub fn prefix(&self, media_type: Option<&str>) -> Result<&str> {
        media_type
            .and_then(|t| self.prefixes.get(t))
            .map(String::as_str)
            .ok_or_else(|| MediaError::UnknownMediaType(media_type.map(str::to_string)))
    }

    /// Media type a prefix maps back to (exact case).
    pub fn media_type_for(&self, prefix: &str) -> Option<&str> {
        self.media_types.get(prefix).map(String::as_str)
    }

    /// Render a Unix timestamp as the index date field.
    pub fn encode_datetime(&self, timestamp: i64) -> Option<String> {
        if timestamp < 0 {
            return None;
        }
        let local = DateTime::from_timestamp(timestamp, 0)?.with_timezone(&Local);
        let encoded = local.format(&self.datetime_format).to_string();
        (encoded.len() == self.date_length).then_some(encoded)
    }

    /// Decode an index date field back into a Unix timestamp.
    pub fn decode_datetime(&self, date: &str) -> Option<i64> {
        let naive = NaiveDateTime::parse_from_str(date, &self.datetime_format)
            .ok()
            .or_else(|| {
                NaiveDate::parse_from_str(date, &self.datetime_format)
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
            })?;
        Local
            .from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.timestamp())
    }

    /// Build `prefix + date(timestamp) + suffix(suffix_seed)` and check that it parses.
    pub fn generate(&self, prefix: &str, timestamp: i64, suffix_seed: i64) -> Result<String> {
        let suffix = format_number(suffix_seed, self.suffix_length, false)?.unwrap_or_default();
        let Some(date) = self.encode_datetime(timestamp) else {
            return Err(MediaError::IndexGeneration {
                candidate: format!("{}{}{}", prefix, timestamp, suffix),
                source: ParseFailure::InvalidDate(timestamp.to_string()),
            });
        };
        let candidate = format!("{}{}{}", prefix, date, suffix);
        match self.parse(&candidate) {
            Ok(_) => Ok(candidate),
            Err(source) => Err(MediaError::IndexGeneration { candidate, source }),
        }
    }

    /// Strictly parse `candidate` with the configured grammar.
    pub fn parse(&self, candidate: &str) -> std::result::Result<ParsedIndex, ParseFailure> {
        self.parse_with(candidate, &self.pattern)
    }

    /// Strictly parse with a caller-supplied grammar.
    ///
    /// `pattern` must define the named groups `prefix`, `date` and `suffix`.
    pub fn parse_with(
        &self,
        candidate: &str,
        pattern: &Regex,
    ) -> std::result::Result<ParsedIndex, ParseFailure> {
        let (prefix, date, suffix) = split(candidate, pattern)
            .ok_or_else(|| ParseFailure::Shape(candidate.to_string()))?;
        let media_type = self
            .media_type_for(prefix)
            .ok_or_else(|| ParseFailure::UnregisteredPrefix(prefix.to_string()))?;
        let timestamp = self
            .decode_datetime(date)
            .ok_or_else(|| ParseFailure::InvalidDate(date.to_string()))?;
        Ok(ParsedIndex {
            prefix: prefix.to_string(),
            date: date.to_string(),
            timestamp,
            suffix: suffix.to_string(),
            media_type: media_type.to_string(),
        })
    }

    /// Lenient parse: keeps whatever sub-results are valid.
    pub fn probe(&self, candidate: &str) -> PartialIndex {
        let Some((prefix, date, suffix)) = split(candidate, &self.pattern) else {
            return PartialIndex::default();
        };
        let media_type = self.media_type_for(prefix);
        let timestamp = self.decode_datetime(date);
        PartialIndex {
            prefix: media_type.map(|_| prefix.to_string()),
            media_type: media_type.map(str::to_string),
            date: timestamp.map(|_| date.to_string()),
            timestamp,
            suffix: Some(suffix.to_string()),
        }
    }
}

fn split<'a>(candidate: &'a str, pattern: &Regex) -> Option<(&'a str, &'a str, &'a str)> {
    let caps = pattern.captures(candidate)?;
    Some((
        caps.name("prefix")?.as_str(),
        caps.name("date")?.as_str(),
        caps.name("suffix")?.as_str(),
    ))
}
