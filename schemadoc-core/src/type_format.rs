//! Canonical column type strings.
//!
//! Every dialect reports a column's type as a base name plus optional
//! length, precision and scale. This module folds those into the single
//! display string stored in the repository, e.g. `varchar(255)` or
//! `decimal(10,2)`, independent of where the column came from.

/// Length sentinel meaning "unbounded" (`varchar(max)` on SQL Server).
pub const UNBOUNDED_LENGTH: i64 = -1;

/// Placeholder for columns whose type name could not be read.
pub const UNKNOWN_TYPE: &str = "unknown";

/// Formats a raw column type descriptor into its canonical display string.
///
/// # Arguments
/// * `type_name` - Base type name as reported by the catalog
/// * `max_length` - Maximum length; byte length for `nchar`/`nvarchar`
/// * `precision` - Numeric precision
/// * `scale` - Numeric scale
///
/// # Example
/// ```rust
/// use schemadoc_core::type_format::format_type;
///
/// assert_eq!(format_type(Some("varchar"), Some(255), None, None), "varchar(255)");
/// assert_eq!(format_type(Some("varchar"), Some(-1), None, None), "varchar(MAX)");
/// assert_eq!(format_type(Some("nvarchar"), Some(100), None, None), "nvarchar(50)");
/// assert_eq!(format_type(Some("decimal"), None, Some(10), Some(2)), "decimal(10,2)");
/// assert_eq!(format_type(Some("int"), None, None, None), "int");
/// assert_eq!(format_type(None, None, None, None), "unknown");
/// ```
pub fn format_type(
    type_name: Option<&str>,
    max_length: Option<i64>,
    precision: Option<i64>,
    scale: Option<i64>,
) -> String {
    let base = match type_name.map(str::trim) {
        Some(name) if !name.is_empty() => name.to_lowercase(),
        _ => return UNKNOWN_TYPE.to_string(),
    };

    match base.as_str() {
        "varchar" | "char" | "binary" | "varbinary" => with_length(base, max_length, false),
        "nvarchar" | "nchar" => with_length(base, max_length, true),
        "decimal" | "numeric" => match (precision, scale) {
            (Some(precision), Some(scale)) => format!("{}({},{})", base, precision, scale),
            _ => base,
        },
        _ => base,
    }
}

fn with_length(base: String, max_length: Option<i64>, double_byte: bool) -> String {
    match max_length {
        Some(UNBOUNDED_LENGTH) => format!("{}(MAX)", base),
        Some(length) if length > 0 => {
            let length = if double_byte { length / 2 } else { length };
            format!("{}({})", base, length)
        }
        _ => base,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_types() {
        assert_eq!(format_type(Some("varchar"), Some(255), None, None), "varchar(255)");
        assert_eq!(format_type(Some("char"), Some(10), None, None), "char(10)");
        assert_eq!(format_type(Some("varbinary"), Some(16), None, None), "varbinary(16)");
        assert_eq!(format_type(Some("binary"), Some(-1), None, None), "binary(MAX)");
    }

    #[test]
    fn test_unbounded_sentinel() {
        assert_eq!(format_type(Some("varchar"), Some(-1), None, None), "varchar(MAX)");
        // The sentinel is never halved
        assert_eq!(format_type(Some("nvarchar"), Some(-1), None, None), "nvarchar(MAX)");
    }

    #[test]
    fn test_double_byte_halving() {
        assert_eq!(format_type(Some("nvarchar"), Some(100), None, None), "nvarchar(50)");
        assert_eq!(format_type(Some("nchar"), Some(20), None, None), "nchar(10)");
    }

    #[test]
    fn test_fixed_point() {
        assert_eq!(format_type(Some("decimal"), None, Some(10), Some(2)), "decimal(10,2)");
        assert_eq!(format_type(Some("numeric"), None, Some(18), Some(0)), "numeric(18,0)");
        assert_eq!(format_type(Some("decimal"), None, Some(10), None), "decimal");
    }

    #[test]
    fn test_passthrough_and_normalization() {
        assert_eq!(format_type(Some("int"), None, None, None), "int");
        assert_eq!(format_type(Some("INT"), Some(4), Some(10), Some(0)), "int");
        assert_eq!(format_type(Some("  VarChar "), Some(30), None, None), "varchar(30)");
        assert_eq!(format_type(Some("text"), Some(65535), None, None), "text");
        assert_eq!(format_type(Some("varchar"), None, None, None), "varchar");
        assert_eq!(format_type(Some("varchar"), Some(0), None, None), "varchar");
    }

    #[test]
    fn test_missing_type_name() {
        assert_eq!(format_type(None, Some(10), None, None), "unknown");
        assert_eq!(format_type(Some("   "), None, None, None), "unknown");
    }
}
