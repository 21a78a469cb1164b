//! Text rendering of numeric table fields.

/// Render a float the way the output tables expect it.
///
/// Zero is `0`, NaN is `NA`, magnitudes below 1e-4 use scientific
/// notation (`7.99e-11`) and everything else uses the shortest
/// round-trip decimal form.
pub fn format_float(x: f64) -> String {
    if x == 0.0 {
        "0".to_string()
    } else if x.is_nan() {
        "NA".to_string()
    } else if x.abs() < 1e-4 {
        format!("{x:e}")
    } else {
        format!("{x}")
    }
}

/// Render an optional float, `NA` when absent.
pub fn format_opt(x: Option<f64>) -> String {
    x.map(format_float).unwrap_or_else(|| "NA".to_string())
}

/// True for the null markers accepted in input tables.
pub fn is_null(field: &str) -> bool {
    let f = field.trim();
    f.is_empty() || f == "NA" || f == "NaN" || f == "nan" || f == "."
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_float() {
        assert_eq!(format_float(7.99e-11), "7.99e-11");
        assert_eq!(format_float(5e-8), "5e-8");
        assert_eq!(format_float(-0.0241), "-0.0241");
        assert_eq!(format_float(0.0037), "0.0037");
        assert_eq!(format_float(1.0), "1");
        assert_eq!(format_float(0.0), "0");
        assert_eq!(format_float(f64::NAN), "NA");
        assert_eq!(format_opt(None), "NA");
    }

    #[test]
    fn test_is_null() {
        assert!(is_null("NA"));
        assert!(is_null(""));
        assert!(is_null(" "));
        assert!(!is_null("0.1"));
    }
}
