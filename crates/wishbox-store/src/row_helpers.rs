use chrono::NaiveDate;

use crate::error::StoreError;

/// Get a required column value from a row, returning CorruptRow on failure.
pub fn get<T: rusqlite::types::FromSql>(
    row: &rusqlite::Row<'_>,
    idx: usize,
    table: &'static str,
    column: &'static str,
) -> Result<T, StoreError> {
    row.get(idx).map_err(|e| StoreError::CorruptRow {
        table,
        column,
        detail: e.to_string(),
    })
}

/// Get an optional column value.
pub fn get_opt<T: rusqlite::types::FromSql>(
    row: &rusqlite::Row<'_>,
    idx: usize,
    table: &'static str,
    column: &'static str,
) -> Result<Option<T>, StoreError> {
    row.get(idx).map_err(|e| StoreError::CorruptRow {
        table,
        column,
        detail: e.to_string(),
    })
}

/// Parse a string into an enum, returning CorruptRow on failure.
pub fn parse_enum<T: std::str::FromStr>(
    raw: &str,
    table: &'static str,
    column: &'static str,
) -> Result<T, StoreError> {
    raw.parse().map_err(|_| StoreError::CorruptRow {
        table,
        column,
        detail: format!("unknown variant: {raw}"),
    })
}

/// Parse an ISO-8601 date column (YYYY-MM-DD).
pub fn parse_date(
    raw: &str,
    table: &'static str,
    column: &'static str,
) -> Result<NaiveDate, StoreError> {
    raw.parse().map_err(|_| StoreError::CorruptRow {
        table,
        column,
        detail: format!("invalid date: {raw}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wishbox_core::RelationshipType;

    #[test]
    fn parse_enum_success() {
        let result: Result<RelationshipType, _> = parse_enum("friend", "relationships", "type");
        assert_eq!(result.unwrap(), RelationshipType::Friend);
    }

    #[test]
    fn parse_enum_failure() {
        let result: Result<RelationshipType, _> = parse_enum("INVALID", "relationships", "type");
        assert!(matches!(
            result,
            Err(StoreError::CorruptRow { table: "relationships", column: "type", .. })
        ));
    }

    #[test]
    fn parse_date_success() {
        let d = parse_date("2026-06-14", "events", "date").unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2026, 6, 14).unwrap());
    }

    #[test]
    fn parse_date_failure() {
        let result = parse_date("not a date", "events", "date");
        assert!(matches!(
            result,
            Err(StoreError::CorruptRow { table: "events", column: "date", .. })
        ));
    }
}
