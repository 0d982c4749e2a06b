use crate::utils::error::{AnalyticsError, Result};
use regex::Regex;
use std::sync::OnceLock;
use url::Url;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

fn identifier_regex() -> Option<&'static Regex> {
    static RE: OnceLock<std::result::Result<Regex, regex::Error>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$"))
        .as_ref()
        .ok()
}

/// 表名是否可以不加引號直接放進 SQL
pub fn is_plain_identifier(name: &str) -> bool {
    identifier_regex().is_some_and(|re| re.is_match(name))
}

pub fn validate_url(field_name: &str, url_str: &str) -> Result<()> {
    if url_str.is_empty() {
        return Err(AnalyticsError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: "URL cannot be empty".to_string(),
        });
    }

    match Url::parse(url_str) {
        Ok(url) => match url.scheme() {
            "http" | "https" => Ok(()),
            scheme => Err(AnalyticsError::InvalidConfigValueError {
                field: field_name.to_string(),
                value: url_str.to_string(),
                reason: format!("Unsupported URL scheme: {}", scheme),
            }),
        },
        Err(e) => Err(AnalyticsError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: format!("Invalid URL format: {}", e),
        }),
    }
}

pub fn validate_positive_number(field_name: &str, value: u64, min_value: u64) -> Result<()> {
    if value < min_value {
        return Err(AnalyticsError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be at least {}", min_value),
        });
    }
    Ok(())
}

pub fn validate_sql_identifier(field_name: &str, name: &str) -> Result<()> {
    if !is_plain_identifier(name) {
        return Err(AnalyticsError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: name.to_string(),
            reason: "Table names may only contain letters, digits, '_' and one schema '.'"
                .to_string(),
        });
    }
    Ok(())
}

pub fn validate_required_field<'a, T>(field_name: &str, value: &'a Option<T>) -> Result<&'a T> {
    value.as_ref().ok_or_else(|| AnalyticsError::MissingConfigError {
        field: field_name.to_string(),
    })
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(AnalyticsError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Value cannot be empty or whitespace-only".to_string(),
        });
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(AnalyticsError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be between {} and {}", min, max),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url() {
        assert!(validate_url("tabular.endpoint", "https://example.com/api/v2/sql").is_ok());
        assert!(validate_url("tabular.endpoint", "http://localhost:8080").is_ok());
        assert!(validate_url("tabular.endpoint", "").is_err());
        assert!(validate_url("tabular.endpoint", "invalid-url").is_err());
        assert!(validate_url("tabular.endpoint", "ftp://example.com").is_err());
    }

    #[test]
    fn test_validate_positive_number() {
        assert!(validate_positive_number("tabular.timeout_seconds", 60, 1).is_ok());
        assert!(validate_positive_number("tabular.timeout_seconds", 0, 1).is_err());
    }

    #[test]
    fn test_validate_sql_identifier() {
        assert!(validate_sql_identifier("tables.forma", "cdm_2013_11_08").is_ok());
        assert!(validate_sql_identifier("tables.forma", "public.hansen").is_ok());
        assert!(validate_sql_identifier("tables.forma", "hansen; DROP TABLE x").is_err());
        assert!(validate_sql_identifier("tables.forma", "1table").is_err());
        assert!(validate_sql_identifier("tables.forma", "").is_err());
    }

    #[test]
    fn test_validate_range() {
        assert!(validate_range("begin", 2013, 1900, 2099).is_ok());
        assert!(validate_range("begin", 1899, 1900, 2099).is_err());
        assert!(validate_range("end", 2100, 1900, 2099).is_err());
    }
}
