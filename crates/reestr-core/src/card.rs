//! Summary-record extraction from a grid card's visible text.
//!
//! The grid's card view renders each record as label-prefixed lines of
//! plain text. Only a handful of fields are scraped here; the detail page
//! is the authoritative source and overwrites these on merge. The card
//! scrape exists so that a record still carries something useful when the
//! detail fetch comes back thin.

use chrono::NaiveDate;
use regex::Regex;

use crate::category::Category;
use crate::fields::REGISTRY_DATE_FORMAT;
use crate::record::Record;
use crate::translit::fix_mixed_characters;

/// Builds a summary record from one card's text.
#[must_use]
pub fn extract_summary(card_text: &str, category: Category) -> Record {
    let mut record = Record::for_category(category);

    record.title = field_value(card_text, "Название:?").map(|t| fix_mixed_characters(&t));
    record.bulletin_number = field_value(card_text, "Номер бюллетеня:?");
    record.bulletin_date = date_field(card_text, "Дата бюллетеня:?");
    record.authors = field_value(card_text, r"Автор\(-ы\)?:?");
    record.sort_name = field_value(card_text, "Наименование сорта, породы:?");

    // Selection achievements often carry only a variety name; use it as
    // the title so validation and display have something to show.
    if record.title.is_none() && record.sort_name.is_some() {
        record.title = record.sort_name.clone();
    }

    record
}

/// Rest-of-line value after a label, or `None` when the label is absent.
fn field_value(text: &str, label_pattern: &str) -> Option<String> {
    let re = Regex::new(&format!(r"{label_pattern}\s*:?\s*(.*)")).expect("valid field regex");
    re.captures(text).map(|caps| {
        caps.get(1)
            .map(|m| m.as_str().trim().to_owned())
            .unwrap_or_default()
    })
}

/// `dd.MM.yyyy` date after a label, or `None` when absent or malformed.
fn date_field(text: &str, label_pattern: &str) -> Option<NaiveDate> {
    let re = Regex::new(&format!(r"{label_pattern}\s*:?\s*(\d{{2}}\.\d{{2}}\.\d{{4}})"))
        .expect("valid date regex");
    let raw = re.captures(text)?.get(1)?.as_str().trim().to_owned();
    match NaiveDate::parse_from_str(&raw, REGISTRY_DATE_FORMAT) {
        Ok(date) => Some(date),
        Err(err) => {
            tracing::warn!(value = raw, error = %err, "unparseable card date");
            None
        }
    }
}
