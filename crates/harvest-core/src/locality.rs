//! Municipality identifier normalization.

/// State code used when the locality cell carries no "(UF)" suffix.
pub const UNKNOWN_STATE: &str = "XX";

/// Width of an IBGE municipality code.
pub const MUNICIPALITY_CODE_WIDTH: usize = 7;

/// Split a combined `"<name> (<UF>)"` cell into name and state code.
///
/// Never fails: anything that does not contain `" ("` and end with `")"`
/// becomes `(raw.trim(), "XX")`.
pub fn parse_locality(raw: &str) -> (String, String) {
    if raw.ends_with(')') {
        if let Some((name, rest)) = raw.split_once(" (") {
            let state = rest.split(')').next().unwrap_or_default();
            return (name.trim().to_string(), state.trim().to_string());
        }
    }
    (raw.trim().to_string(), UNKNOWN_STATE.to_string())
}

/// Left-pad a municipality code with zeros to 7 characters.
///
/// Longer codes pass through untouched. An absent code maps to the "0"
/// sentinel, which is never a valid 7-digit code.
pub fn normalize_municipality_code(raw: Option<&str>) -> String {
    match raw {
        Some(code) => {
            let code = code.trim();
            format!("{:0>width$}", code, width = MUNICIPALITY_CODE_WIDTH)
        }
        None => "0".to_string(),
    }
}

/// True for codes the map layer can join on (exactly 7 ASCII digits).
pub fn is_map_code(code: &str) -> bool {
    code.len() == MUNICIPALITY_CODE_WIDTH && code.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_locality_with_state() {
        assert_eq!(
            parse_locality("Alta Floresta D'Oeste (RO)"),
            ("Alta Floresta D'Oeste".to_string(), "RO".to_string())
        );
    }

    #[test]
    fn test_parse_locality_trims_parts() {
        assert_eq!(
            parse_locality("  São Desidério  ( BA )"),
            ("São Desidério".to_string(), "BA".to_string())
        );
    }

    #[test]
    fn test_parse_locality_without_state() {
        assert_eq!(
            parse_locality("  Brasília  "),
            ("Brasília".to_string(), "XX".to_string())
        );
    }

    #[test]
    fn test_parse_locality_not_ending_with_paren() {
        assert_eq!(
            parse_locality("Cacoal (RO) "),
            ("Cacoal (RO)".to_string(), "XX".to_string())
        );
    }

    #[test]
    fn test_parse_locality_paren_without_space() {
        assert_eq!(
            parse_locality("Cacoal(RO)"),
            ("Cacoal(RO)".to_string(), "XX".to_string())
        );
    }

    #[test]
    fn test_parse_locality_empty() {
        assert_eq!(parse_locality(""), (String::new(), "XX".to_string()));
    }

    #[test]
    fn test_normalize_pads_short_codes() {
        assert_eq!(normalize_municipality_code(Some("110001")), "0110001");
        assert_eq!(normalize_municipality_code(Some("15")), "0000015");
        assert_eq!(normalize_municipality_code(Some(" 1100015 ")), "1100015");
    }

    #[test]
    fn test_normalize_keeps_long_codes() {
        assert_eq!(normalize_municipality_code(Some("1100015")), "1100015");
        assert_eq!(normalize_municipality_code(Some("11000150")), "11000150");
    }

    #[test]
    fn test_normalize_absent_code() {
        assert_eq!(normalize_municipality_code(None), "0");
    }

    #[test]
    fn test_padding_makes_codes_comparable() {
        assert_eq!(
            normalize_municipality_code(Some("0110001")),
            normalize_municipality_code(Some("110001"))
        );
    }

    #[test]
    fn test_is_map_code() {
        assert!(is_map_code("1100015"));
        assert!(!is_map_code("0"));
        assert!(!is_map_code("11000A5"));
        assert!(!is_map_code("11000150"));
    }
}
