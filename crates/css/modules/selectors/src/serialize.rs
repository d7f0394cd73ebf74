//! Selector serialization.
//! Reference: <https://drafts.csswg.org/cssom/#serializing-identifiers>

/// Append `\<hex> ` for a code point that must be escaped numerically.
fn push_code_point_escape(out: &mut String, character: char) {
    out.push_str(&format!("\\{:x} ", u32::from(character)));
}

/// Serialize an identifier so that it parses back to the same value (`CSS.escape`).
pub fn serialize_identifier(ident: &str) -> String {
    let mut out = String::with_capacity(ident.len());
    let mut chars = ident.chars().peekable();
    let mut index = 0usize;
    let mut first = None;
    while let Some(character) = chars.next() {
        let is_lone_hyphen = index == 0 && character == '-' && chars.peek().is_none();
        match character {
            '\0' => out.push('\u{FFFD}'),
            '\u{1}'..='\u{1f}' | '\u{7f}' => push_code_point_escape(&mut out, character),
            '0'..='9' if index == 0 || (index == 1 && first == Some('-')) => {
                push_code_point_escape(&mut out, character);
            }
            _ if is_lone_hyphen => out.push_str("\\-"),
            _ if !character.is_ascii()
                || character.is_ascii_alphanumeric()
                || character == '-'
                || character == '_' =>
            {
                out.push(character);
            }
            _ => {
                out.push('\\');
                out.push(character);
            }
        }
        if index == 0 {
            first = Some(character);
        }
        index = index.saturating_add(1);
    }
    out
}

/// Serialize a double-quoted CSS string.
pub fn serialize_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len().saturating_add(2));
    out.push('"');
    for character in value.chars() {
        match character {
            '\0' => out.push('\u{FFFD}'),
            '\u{1}'..='\u{1f}' | '\u{7f}' => push_code_point_escape(&mut out, character),
            '"' | '\\' => {
                out.push('\\');
                out.push(character);
            }
            _ => out.push(character),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SimpleSelector, parse_complex_selector};

    #[test]
    fn escapes_leading_digits_and_punctuation() {
        assert_eq!(serialize_identifier("1st"), "\\31 st");
        assert_eq!(serialize_identifier("-2"), "-\\32 ");
        assert_eq!(serialize_identifier("-"), "\\-");
        assert_eq!(serialize_identifier("a.b:c"), "a\\.b\\:c");
        assert_eq!(serialize_identifier("héllo_wörld"), "héllo_wörld");
        assert_eq!(serialize_identifier("tab\u{9}bed\u{7f}"), "tab\\9 bed\\7f ");
    }

    #[test]
    fn escaped_identifiers_parse_back() {
        for raw in ["1st", "a.b:c", "x y", "-9lives", "nav[0]"] {
            let selector = format!("#{}", serialize_identifier(raw));
            let parsed = parse_complex_selector(&selector).expect("parses");
            assert_eq!(
                parsed.first.simples,
                vec![SimpleSelector::IdSelector(raw.to_owned())],
                "round trip of {raw:?} via {selector:?}"
            );
        }
    }

    #[test]
    fn strings_escape_quotes() {
        assert_eq!(serialize_string(r#"say "hi"\"#), r#""say \"hi\"\\""#);
    }
}
