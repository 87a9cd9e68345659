//! Static routing from detail-page field labels to typed record fields.
//!
//! The registry labels its detail fields in Russian. A fixed set of ~17
//! labels maps to first-class record columns; everything else becomes an
//! extension attribute. The set is closed on purpose: adding a column
//! means adding a match arm here, nothing reflective.

use chrono::NaiveDate;

use crate::record::Record;

/// Date format used everywhere on the registry.
pub const REGISTRY_DATE_FORMAT: &str = "%d.%m.%Y";

/// Strips a parenthetical annotation from a raw label, e.g.
/// `"Статус (11)"` becomes `"Статус"`.
#[must_use]
pub fn strip_parenthetical(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut depth = 0usize;
    for c in raw.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out.trim().to_owned()
}

/// Parses a registry `dd.MM.yyyy` date, logging and dropping values the
/// registry occasionally mangles rather than failing the whole record.
#[must_use]
pub fn parse_registry_date(value: &str) -> Option<NaiveDate> {
    match NaiveDate::parse_from_str(value, REGISTRY_DATE_FORMAT) {
        Ok(date) => Some(date),
        Err(err) => {
            tracing::warn!(value, error = %err, "unparseable registry date, dropping field");
            None
        }
    }
}

/// Routes one (label, value) pair onto `record`. Returns `true` when the
/// label is a core field (consumed here); `false` means the caller should
/// store the pair as an extension attribute.
pub fn apply_core_field(record: &mut Record, label: &str, value: &str) -> bool {
    match label {
        "№ охранного документа" => record.security_doc_number = Some(value.to_owned()),
        "№ регистрации" => record.registration_number = Some(value.to_owned()),
        "Статус" => record.status = Some(value.to_owned()),
        "Номер заявки" => record.application_number = Some(value.to_owned()),
        "Дата подачи заявки" => record.filing_date = parse_registry_date(value),
        // Registration dates sometimes trail a time component; the date is
        // always the first ten characters.
        "Дата регистрации" => {
            record.registration_date = parse_registry_date(value.get(..10).unwrap_or(value));
        }
        "Срок действия" => record.expiration_date = parse_registry_date(value),
        "Название" => record.title = Some(value.to_owned()),
        "МПК" => record.ipc = Some(value.to_owned()),
        "МКПО" | "МКТУ" => record.classification_code = Some(value.to_owned()),
        "Номер бюллетеня" => record.bulletin_number = Some(value.to_owned()),
        "Дата бюллетеня" => record.bulletin_date = parse_registry_date(value),
        "Наименование сорта, породы" => record.sort_name = Some(value.to_owned()),
        "Патентообладатель" => record.holder = Some(value.to_owned()),
        // The page labels this "Автор(-ы)"; parenthetical stripping has
        // already reduced it to the bare form by the time we route it.
        "Автор" | "Автор(-ы)" | "Авторы" => record.authors = Some(value.to_owned()),
        "Владелец" => record.owner = Some(value.to_owned()),
        _ => return false,
    }
    true
}
