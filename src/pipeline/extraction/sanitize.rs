/// Sanitize extracted text before passing downstream.
/// Strips control characters, trims lines and drops blank ones.
/// Punctuation used in lab results (units, ranges, comparisons) survives.
pub fn sanitize_extracted_text(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || is_kept_symbol(*c))
        .collect::<String>()
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn is_kept_symbol(c: char) -> bool {
    matches!(
        c,
        '.' | ','
            | ';'
            | ':'
            | '-'
            | '/'
            | '('
            | ')'
            | '['
            | ']'
            | '+'
            | '='
            | '%'
            | '#'
            | '&'
            | '\''
            | '"'
            | '!'
            | '?'
            | '<'
            | '>'
            | '*'
            | '_'
            | '°'
            | '²'
            | '³'
            | 'µ'
            | '≤'
            | '≥'
            | '\u{2013}' // en dash
            | '\u{2014}'
            | '\u{2018}'
            | '\u{2019}'
            | '\u{201C}'
            | '\u{201D}'
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_control_characters() {
        let raw = "Glicose: 85 mg/dl\x01\x02\x03\nData: 12/03/2024";
        let clean = sanitize_extracted_text(raw);
        assert!(!clean.contains('\x01'));
        assert!(clean.contains("85 mg/dl"));
        assert!(clean.contains("12/03/2024"));
    }

    #[test]
    fn collapses_blank_lines() {
        let raw = "Hemograma\n\n\n\nHemoglobina 13,5 g/dl\n\n\nPlaquetas 250000";
        let clean = sanitize_extracted_text(raw);
        assert_eq!(clean, "Hemograma\nHemoglobina 13,5 g/dl\nPlaquetas 250000");
    }

    #[test]
    fn trims_whitespace_per_line() {
        let raw = "  Ureia: 30 mg/dl  \n  Creatinina: 0,9 mg/dl  ";
        assert_eq!(sanitize_extracted_text(raw), "Ureia: 30 mg/dl\nCreatinina: 0,9 mg/dl");
    }

    #[test]
    fn preserves_units_and_ranges() {
        let raw = "Colesterol total: 180 mg/dl (< 200)";
        assert_eq!(sanitize_extracted_text(raw), raw);
        let raw = "Hemoglobina: 13,5 g/dl (12 – 16) µ ≤ ≥ °";
        assert_eq!(sanitize_extracted_text(raw), raw);
    }

    #[test]
    fn preserves_portuguese_accents() {
        let raw = "Hemácias, leucócitos, triglicérides, ressonância";
        assert_eq!(sanitize_extracted_text(raw), raw);
    }

    #[test]
    fn empty_and_control_only_input_returns_empty() {
        assert_eq!(sanitize_extracted_text(""), "");
        assert_eq!(sanitize_extracted_text("\x00\x01\x02"), "");
    }
}
