//! Record normalizer: turns a raw scraped listing into a typed record.
//!
//! Keys arrive as the site prints them (`" Kaina mėn. "`) and leave as ASCII
//! CamelCase (`KainaMen`). Configured fields are typed on the way, list
//! fields are expanded into `Variable_Item = 1` pseudo-categorical fields.

use chrono::NaiveDateTime;
use regex::Regex;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::config::NormalizerSettings;
use crate::errors::AvmResult;
use crate::models::{Batch, Record, Value};

const DATE_SCRAPED_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Title-case in the "capitalise after any non-letter" sense: `"1mėn"` ->
/// `"1Mėn"`, `"NAMO numeris"` -> `"Namo Numeris"`.
fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut previous_is_letter = false;
    for c in text.chars() {
        if c.is_alphabetic() {
            if previous_is_letter {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            previous_is_letter = true;
        } else {
            out.push(c);
            previous_is_letter = false;
        }
    }
    out
}

/// `"this house"` -> `"ThisHouse"`.
fn title_camel_case(text: &str) -> String {
    title_case(text.trim()).split(' ').collect()
}

/// Trim, drop ASCII punctuation, title-case the words and join them.
pub fn normalize_key(key: &str) -> String {
    let stripped: String = key
        .trim()
        .chars()
        .filter(|c| !c.is_ascii_punctuation())
        .collect();
    title_case(&stripped.to_lowercase()).split(' ').collect()
}

/// Strip diacritics: canonical decomposition without combining marks.
pub fn transliterate(text: &str) -> String {
    text.nfd().filter(|c| !is_combining_mark(*c)).collect()
}

pub struct RecordNormalizer {
    settings: NormalizerSettings,
    integer_pattern: Regex,
    float_pattern: Regex,
}

impl RecordNormalizer {
    pub fn new(settings: NormalizerSettings) -> AvmResult<Self> {
        Ok(Self {
            settings,
            integer_pattern: Regex::new(r"\d+")?,
            float_pattern: Regex::new(r"\d+(?:[.,]\d+)?")?,
        })
    }

    fn parse_integer(&self, value: &Value) -> Value {
        match value {
            Value::Text(text) => self
                .integer_pattern
                .find(text)
                .and_then(|m| m.as_str().parse::<f64>().ok())
                .map(Value::Number)
                .unwrap_or(Value::Null),
            other => other.clone(),
        }
    }

    /// `"\n   69,42 €/mėn."` -> `69.42`.
    fn parse_float(&self, value: &Value) -> Value {
        match value {
            Value::Text(text) => self
                .float_pattern
                .find(text)
                .and_then(|m| m.as_str().replace(',', ".").parse::<f64>().ok())
                .map(Value::Number)
                .unwrap_or(Value::Null),
            other => other.clone(),
        }
    }

    /// Normalize one listing. `scraped_at`, when given, is stamped into the
    /// configured date field.
    pub fn normalize(&self, raw: &Record, scraped_at: Option<NaiveDateTime>) -> Record {
        let mut record: Record = raw
            .iter()
            .map(|(key, value)| (normalize_key(key), value.clone()))
            .collect();

        for field in &self.settings.integer_fields {
            if let Some(value) = record.get_mut(field) {
                *value = self.parse_integer(value);
            }
        }
        for field in &self.settings.float_fields {
            if let Some(value) = record.get_mut(field) {
                *value = self.parse_float(value);
            }
        }
        for field in &self.settings.categorical_fields {
            if let Some(Value::Text(text)) = record.get_mut(field) {
                *text = text.trim().to_string();
            }
        }

        for field in &self.settings.list_fields {
            let items = match record.shift_remove(field) {
                Some(Value::List(items)) => items,
                Some(Value::Text(item)) => vec![item],
                _ => continue,
            };
            for item in items {
                let item = title_camel_case(&item);
                if !item.is_empty() {
                    record.insert(format!("{field}_{item}"), Value::Number(1.0));
                }
            }
        }

        for split in &self.settings.split_fields {
            let Some(Value::Text(text)) = record.shift_remove(&split.source) else {
                continue;
            };
            for (target, part) in split.targets.iter().zip(text.split(split.separator.as_str())) {
                record.insert(target.clone(), Value::Text(part.trim().to_string()));
            }
        }

        let mut normalized: Record = record
            .into_iter()
            .map(|(key, value)| (transliterate(&key), value))
            .collect();

        if let Some(at) = scraped_at {
            normalized.insert(
                self.settings.date_field.clone(),
                Value::Text(at.format(DATE_SCRAPED_FORMAT).to_string()),
            );
        }
        normalized
    }

    pub fn normalize_batch(&self, raw: &[Record], scraped_at: Option<NaiveDateTime>) -> Batch {
        Batch::new(
            raw.iter()
                .map(|record| self.normalize(record, scraped_at))
                .collect(),
        )
    }
}
