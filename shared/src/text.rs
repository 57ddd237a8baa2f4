//! Text normalisation for user-supplied fields

use chrono::NaiveDate;

/// Plain-text form of a user-supplied field: markup removed, whitespace
/// runs collapsed to one space, trimmed.
///
/// A `<` that opens a tag drops everything up to the next `>`. When no `>`
/// follows, only the `<` is dropped and the rest of the text is kept. Stray
/// angle brackets are removed.
pub fn clean_text(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    let mut out = String::with_capacity(value.len());
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '<' => {
                let opens_tag = chars
                    .get(i + 1)
                    .map(|n| n.is_ascii_alphabetic() || matches!(n, '/' | '!' | '?'))
                    .unwrap_or(false);
                let close = chars[i + 1..].iter().position(|c| *c == '>');
                i = match (opens_tag, close) {
                    (true, Some(offset)) => i + offset + 2,
                    _ => i + 1,
                };
            }
            '>' => i += 1,
            c => {
                out.push(c);
                i += 1;
            }
        }
    }

    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `clean_text` over an optional field, mapping blank results to `None`
pub fn clean_optional(value: Option<&str>) -> Option<String> {
    value.map(clean_text).filter(|s| !s.is_empty())
}

/// Escape `%`, `_` and `\` for use inside an ILIKE pattern
pub fn escape_like(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 4);
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// `%value%` with LIKE metacharacters escaped
pub fn contains_pattern(value: &str) -> String {
    format!("%{}%", escape_like(value))
}

/// ILIKE pattern for an optional substring filter; blank filters match all
pub fn filter_pattern(value: Option<&str>) -> Option<String> {
    clean_optional(value).map(|v| contains_pattern(&v))
}

/// Parse a calendar day written as `dd/mm/yyyy` or `yyyy-mm-dd`
pub fn parse_day(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(value, "%d/%m/%Y")
        .or_else(|_| NaiveDate::parse_from_str(value, "%Y-%m-%d"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text_strips_tags() {
        assert_eq!(clean_text("  <b>Tornillo</b> 8mm "), "Tornillo 8mm");
        assert_eq!(clean_text("<script>alert(1)</script>"), "alert(1)");
        assert_eq!(clean_text("a > b"), "a b");
        assert_eq!(clean_text("3 < 4"), "3 4");
    }

    #[test]
    fn test_clean_text_unterminated_tag_keeps_text() {
        assert_eq!(clean_text("Perno <M8 galv"), "Perno M8 galv");
        assert_eq!(clean_text("<b>Perno</b> <M8"), "Perno M8");
    }

    #[test]
    fn test_clean_text_collapses_whitespace() {
        assert_eq!(clean_text(" Ferretería \t  Sur\n"), "Ferretería Sur");
    }

    #[test]
    fn test_clean_text_plain_passthrough() {
        assert_eq!(clean_text("Cemento Polpaico"), "Cemento Polpaico");
        assert_eq!(clean_text("   "), "");
    }

    #[test]
    fn test_clean_optional() {
        assert_eq!(clean_optional(Some(" OC-12 ")), Some("OC-12".to_string()));
        assert_eq!(clean_optional(Some("<i></i>")), None);
        assert_eq!(clean_optional(None), None);
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(contains_pattern("ab"), "%ab%");
    }

    #[test]
    fn test_filter_pattern() {
        assert_eq!(filter_pattern(Some(" jp ")), Some("%jp%".to_string()));
        assert_eq!(filter_pattern(Some("   ")), None);
        assert_eq!(filter_pattern(None), None);
    }

    #[test]
    fn test_parse_day_formats() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(parse_day("09/03/2024"), Some(d));
        assert_eq!(parse_day("2024-03-09"), Some(d));
        assert_eq!(parse_day(" 9/3/2024 "), Some(d));
        assert_eq!(parse_day("31/02/2024"), None);
        assert_eq!(parse_day(""), None);
        assert_eq!(parse_day("ayer"), None);
    }
}
