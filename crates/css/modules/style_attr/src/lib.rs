//! CSS Style Attributes: style="..." attribute processing.
//! Reference: <https://www.w3.org/TR/css-style-attr/>
//!
//! Besides parsing, this crate edits a single declaration of an inline style
//! and re-serializes the block, leaving every other declaration as it was.
//! This is what `element.style.setProperty()` does on a live element.

#![forbid(unsafe_code)]

/// A single CSS declaration parsed from a style attribute.
///
/// Reference: <https://www.w3.org/TR/css-style-attr/#interpreting>
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Declaration {
    /// Property name normalized to ASCII lowercase as per CSS case-insensitivity.
    pub property: String,
    /// Raw value trimmed of surrounding ASCII whitespace. May contain spaces.
    pub value: String,
}

/// ASCII whitespace per CSS Syntax (TAB, LF, FF, CR, SPACE).
///
/// Reference: <https://www.w3.org/TR/css-syntax-3/#whitespace>
const fn is_ascii_whitespace(character: char) -> bool {
    matches!(
        character,
        '\u{0009}' | '\u{000A}' | '\u{000C}' | '\u{000D}' | '\u{0020}'
    )
}

/// Split a declaration block on `;` that are not inside quotes or parentheses,
/// so `url("a;b")` stays one item.
fn split_declarations(input: &str) -> Vec<&str> {
    let mut items = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0usize;
    for (offset, character) in input.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match (quote, character) {
            (_, '\\') => escaped = true,
            (Some(open), _) if character == open => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(character),
            (None, '(') => depth = depth.saturating_add(1),
            (None, ')') => depth = depth.saturating_sub(1),
            (None, ';') if depth == 0 => {
                items.push(&input[start..offset]);
                start = offset.saturating_add(1);
            }
            (None, _) => {}
        }
    }
    items.push(&input[start..]);
    items
}

/// Parse the value of a `style` attribute into a list of declarations.
///
/// - Splits on top-level semicolons into declaration items.
/// - For each item, splits on the first colon into property and value.
/// - Trims ASCII whitespace and lowercases the property name.
/// - Skips empty or invalid items (no colon, empty property, or empty value).
///
/// Reference: <https://www.w3.org/TR/css-style-attr/#interpreting>
pub fn parse_style_attribute(input: &str) -> Vec<Declaration> {
    let mut out: Vec<Declaration> = Vec::new();
    for raw_item in split_declarations(input) {
        let item = raw_item.trim_matches(is_ascii_whitespace);
        let Some((raw_prop, raw_value)) = item.split_once(':') else {
            continue;
        };
        let property_text = raw_prop.trim_matches(is_ascii_whitespace);
        let value_text = raw_value.trim_matches(is_ascii_whitespace);
        if property_text.is_empty() || value_text.is_empty() {
            continue;
        }
        out.push(Declaration {
            property: property_text.to_ascii_lowercase(),
            value: value_text.to_owned(),
        });
    }
    out
}

/// Look up a property; the last declaration wins, as in source order cascading.
pub fn get_property(input: &str, property: &str) -> Option<String> {
    let needle = property.to_ascii_lowercase();
    parse_style_attribute(input)
        .into_iter()
        .rev()
        .find(|decl| decl.property == needle)
        .map(|decl| decl.value)
}

/// Serialize declarations as `prop: value; prop: value;`.
pub fn serialize_declarations(declarations: &[Declaration]) -> String {
    declarations
        .iter()
        .map(|decl| format!("{}: {};", decl.property, decl.value))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Set one property, keeping every other declaration and its order.
///
/// An existing declaration of the property is replaced where it first appears
/// and later duplicates are dropped; otherwise the declaration is appended.
/// An empty `value` removes the property.
pub fn set_property(input: &str, property: &str, value: &str) -> String {
    let needle = property.trim_matches(is_ascii_whitespace).to_ascii_lowercase();
    let value_text = value.trim_matches(is_ascii_whitespace);
    if value_text.is_empty() {
        return remove_property(input, &needle);
    }
    let mut replaced = false;
    let mut out: Vec<Declaration> = Vec::new();
    for decl in parse_style_attribute(input) {
        if decl.property != needle {
            out.push(decl);
        } else if !replaced {
            replaced = true;
            out.push(Declaration {
                property: needle.clone(),
                value: value_text.to_owned(),
            });
        }
    }
    if !replaced {
        out.push(Declaration {
            property: needle,
            value: value_text.to_owned(),
        });
    }
    serialize_declarations(&out)
}

/// Remove every declaration of a property.
pub fn remove_property(input: &str, property: &str) -> String {
    let needle = property.to_ascii_lowercase();
    let kept: Vec<Declaration> = parse_style_attribute(input)
        .into_iter()
        .filter(|decl| decl.property != needle)
        .collect();
    serialize_declarations(&kept)
}
