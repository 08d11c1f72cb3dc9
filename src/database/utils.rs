use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::Row;

pub fn safe_get_string(row: &PgRow, column: &str) -> String {
    row.try_get::<String, _>(column)
        .unwrap_or_else(|_| "".to_string())
}

pub fn safe_get_optional_string(row: &PgRow, column: &str) -> Option<String> {
    row.try_get::<Option<String>, _>(column).ok().flatten()
}

pub fn safe_get_i64(row: &PgRow, column: &str) -> i64 {
    row.try_get::<i64, _>(column).unwrap_or(0)
}

pub fn safe_get_optional_i64(row: &PgRow, column: &str) -> Option<i64> {
    row.try_get::<Option<i64>, _>(column).ok().flatten()
}

pub fn safe_get_optional_i32(row: &PgRow, column: &str) -> Option<i32> {
    row.try_get::<Option<i32>, _>(column).ok().flatten()
}

pub fn safe_get_decimal(row: &PgRow, column: &str) -> Decimal {
    row.try_get::<Decimal, _>(column)
        .unwrap_or_else(|_| Decimal::ZERO)
}

pub fn safe_get_optional_decimal(row: &PgRow, column: &str) -> Option<Decimal> {
    row.try_get::<Option<Decimal>, _>(column).ok().flatten()
}

pub fn safe_get_f64(row: &PgRow, column: &str) -> f64 {
    row.try_get::<f64, _>(column).unwrap_or(0.0)
}

pub fn safe_get_optional_f64(row: &PgRow, column: &str) -> Option<f64> {
    row.try_get::<Option<f64>, _>(column).ok().flatten()
}

pub fn safe_get_bool(row: &PgRow, column: &str) -> bool {
    row.try_get::<bool, _>(column).unwrap_or(false)
}

pub fn safe_get_datetime(row: &PgRow, column: &str) -> DateTime<Utc> {
    row.try_get::<DateTime<Utc>, _>(column)
        .unwrap_or_else(|_| Utc::now())
}

pub fn safe_get_optional_datetime(row: &PgRow, column: &str) -> Option<DateTime<Utc>> {
    row.try_get::<Option<DateTime<Utc>>, _>(column).ok().flatten()
}

/// Escapes `%`, `_` and `\` for a `LIKE` pattern.
pub fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("usd_coin 100%"), "usd\\_coin 100\\%");
        assert_eq!(escape_like("pepe"), "pepe");
    }
}
