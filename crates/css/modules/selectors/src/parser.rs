//! CSS selector parsing.
//! Reference: <https://www.w3.org/TR/selectors-3/>

use crate::{Combinator, ComplexSelector, CompoundSelector, Nth, SelectorList, SimpleSelector};
use core::fmt::{Display, Formatter, Result as FmtResult};
use core::mem::take;
use std::error::Error;

/// Error produced for selectors outside the supported grammar.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SelectorParseError {
    /// Character offset where parsing stopped.
    pub position: usize,
    /// Human readable reason.
    pub message: String,
}

impl Display for SelectorParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "invalid selector at {}: {}", self.position, self.message)
    }
}

impl Error for SelectorParseError {}

#[derive(Clone, Debug, PartialEq, Eq)]
/// Internal tokenizer token kinds.
enum Tok {
    /// A combinator token like child/adjacent/general sibling.
    Combinator(Combinator),
    /// Whitespace that may imply a descendant combinator.
    DescendantWS,
    /// A simple selector token.
    Simple(SimpleSelector),
    /// Separator between selectors of a group.
    Comma,
}

/// Tokenizer over a selector string.
struct SelectorTokenizer {
    /// Selector source as characters so escapes and non-ASCII idents index cleanly.
    chars: Vec<char>,
    /// Current cursor index into `chars`.
    index: usize,
}

/// Identifier code points (ASCII alphanumerics, `-`, `_` and anything non-ASCII).
fn is_ident_char(character: char) -> bool {
    character.is_ascii_alphanumeric() || character == '-' || character == '_' || !character.is_ascii()
}

impl SelectorTokenizer {
    fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            index: 0,
        }
    }

    fn error(&self, message: &str) -> SelectorParseError {
        SelectorParseError {
            position: self.index,
            message: message.to_owned(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.index).copied()
    }

    fn bump(&mut self) {
        self.index = self.index.saturating_add(1);
    }

    fn skip_spaces(&mut self) -> bool {
        let start = self.index;
        while self.peek().is_some_and(|character| character.is_ascii_whitespace()) {
            self.bump();
        }
        self.index != start
    }

    /// Return the next selector token, if any.
    fn next_token(&mut self) -> Result<Option<Tok>, SelectorParseError> {
        if self.skip_spaces() {
            return Ok(self.peek().map(|_| Tok::DescendantWS));
        }
        let Some(current) = self.peek() else {
            return Ok(None);
        };
        let token = match current {
            '*' => {
                self.bump();
                Tok::Simple(SimpleSelector::Universal)
            }
            '.' => {
                self.bump();
                Tok::Simple(SimpleSelector::Class(self.consume_required_ident()?))
            }
            '#' => {
                self.bump();
                Tok::Simple(SimpleSelector::IdSelector(self.consume_required_ident()?))
            }
            '[' => Tok::Simple(self.consume_attr()?),
            ':' => Tok::Simple(self.consume_pseudo()?),
            '>' => {
                self.bump();
                Tok::Combinator(Combinator::Child)
            }
            '+' => {
                self.bump();
                Tok::Combinator(Combinator::AdjacentSibling)
            }
            '~' => {
                self.bump();
                Tok::Combinator(Combinator::GeneralSibling)
            }
            ',' => {
                self.bump();
                Tok::Comma
            }
            other if is_ident_char(other) || other == '\\' => {
                let ident = self.consume_ident()?;
                Tok::Simple(SimpleSelector::Type(ident.to_ascii_lowercase()))
            }
            _ => return Err(self.error("unexpected character")),
        };
        Ok(Some(token))
    }

    /// Consume an identifier, resolving backslash escapes. Case is preserved.
    fn consume_ident(&mut self) -> Result<String, SelectorParseError> {
        let mut out = String::new();
        while let Some(character) = self.peek() {
            if character == '\\' {
                self.bump();
                out.push(self.consume_escape()?);
            } else if is_ident_char(character) {
                out.push(character);
                self.bump();
            } else {
                break;
            }
        }
        Ok(out)
    }

    fn consume_required_ident(&mut self) -> Result<String, SelectorParseError> {
        let ident = self.consume_ident()?;
        if ident.is_empty() {
            return Err(self.error("expected identifier"));
        }
        Ok(ident)
    }

    /// Consume the body of an escape; the backslash has already been consumed.
    /// CSS Syntax 3 §4.3.7: consume an escaped code point
    fn consume_escape(&mut self) -> Result<char, SelectorParseError> {
        let Some(first) = self.peek() else {
            return Err(self.error("dangling escape"));
        };
        if !first.is_ascii_hexdigit() {
            self.bump();
            return Ok(first);
        }
        let mut hex = String::new();
        while hex.len() < 6 {
            match self.peek() {
                Some(digit) if digit.is_ascii_hexdigit() => {
                    hex.push(digit);
                    self.bump();
                }
                _ => break,
            }
        }
        if self.peek().is_some_and(|character| character.is_ascii_whitespace()) {
            self.bump();
        }
        let code = u32::from_str_radix(&hex, 16).unwrap_or(0xFFFD);
        Ok(char::from_u32(code)
            .filter(|decoded| *decoded != '\0')
            .unwrap_or('\u{FFFD}'))
    }

    /// Parse `[name]` or `[name=value]` with a quoted or identifier value.
    fn consume_attr(&mut self) -> Result<SimpleSelector, SelectorParseError> {
        // skip '['
        self.bump();
        self.skip_spaces();
        let name = self.consume_required_ident()?.to_ascii_lowercase();
        self.skip_spaces();
        match self.peek() {
            Some(']') => {
                self.bump();
                Ok(SimpleSelector::AttrExists(name))
            }
            Some('=') => {
                self.bump();
                self.skip_spaces();
                let value = match self.peek() {
                    Some(quote @ ('"' | '\'')) => {
                        self.bump();
                        self.consume_quoted(quote)?
                    }
                    _ => self.consume_required_ident()?,
                };
                self.skip_spaces();
                if self.peek() != Some(']') {
                    return Err(self.error("expected ']'"));
                }
                self.bump();
                Ok(SimpleSelector::AttrEquals { name, value })
            }
            _ => Err(self.error("unsupported attribute matcher")),
        }
    }

    /// Consume a quoted string until the matching quote; the opening quote is consumed.
    fn consume_quoted(&mut self, quote: char) -> Result<String, SelectorParseError> {
        let mut out = String::new();
        loop {
            match self.peek() {
                None => return Err(self.error("unterminated string")),
                Some(character) if character == quote => {
                    self.bump();
                    return Ok(out);
                }
                Some('\\') => {
                    self.bump();
                    if self.peek() == Some('\n') {
                        self.bump();
                    } else {
                        out.push(self.consume_escape()?);
                    }
                }
                Some(character) => {
                    out.push(character);
                    self.bump();
                }
            }
        }
    }

    /// Parse a pseudo-class. Only `:nth-child()` is supported.
    fn consume_pseudo(&mut self) -> Result<SimpleSelector, SelectorParseError> {
        // skip ':'
        self.bump();
        let name = self.consume_required_ident()?.to_ascii_lowercase();
        if name != "nth-child" || self.peek() != Some('(') {
            return Err(self.error("unsupported pseudo-class"));
        }
        self.bump();
        let mut argument = String::new();
        loop {
            match self.peek() {
                None => return Err(self.error("unterminated :nth-child")),
                Some(')') => {
                    self.bump();
                    break;
                }
                Some(character) => {
                    argument.push(character);
                    self.bump();
                }
            }
        }
        parse_nth(&argument)
            .map(SimpleSelector::NthChild)
            .ok_or_else(|| self.error("invalid :nth-child argument"))
    }
}

/// Parse the `An+B` micro-syntax, including `odd` and `even`.
/// CSS Syntax 3 §6: The An+B microsyntax
fn parse_nth(raw: &str) -> Option<Nth> {
    let compact: String = raw
        .chars()
        .filter(|character| !character.is_ascii_whitespace())
        .collect::<String>()
        .to_ascii_lowercase();
    match compact.as_str() {
        "" => None,
        "odd" => Some(Nth { step: 2, offset: 1 }),
        "even" => Some(Nth { step: 2, offset: 0 }),
        expression => {
            let Some((step_part, offset_part)) = expression.split_once('n') else {
                return expression.parse::<i64>().ok().map(|offset| Nth { step: 0, offset });
            };
            let step = match step_part {
                "" | "+" => 1,
                "-" => -1,
                digits => digits.parse::<i64>().ok()?,
            };
            let offset = if offset_part.is_empty() {
                0
            } else if offset_part.starts_with('+') || offset_part.starts_with('-') {
                offset_part.parse::<i64>().ok()?
            } else {
                return None;
            };
            Some(Nth { step, offset })
        }
    }
}

/// Assemble one complex selector from a comma-free token run.
fn build_complex(
    tokens: Vec<Tok>,
    tokenizer: &SelectorTokenizer,
) -> Result<ComplexSelector, SelectorParseError> {
    let mut compounds: Vec<CompoundSelector> = Vec::new();
    let mut combinators: Vec<Combinator> = Vec::new();
    let mut current = CompoundSelector::default();
    let mut pending: Option<Combinator> = None;

    for token in tokens {
        match token {
            Tok::Simple(simple) => {
                if let Some(combinator) = pending.take() {
                    combinators.push(combinator);
                }
                current.simples.push(simple);
            }
            Tok::DescendantWS => {
                if !current.simples.is_empty() {
                    compounds.push(take(&mut current));
                    pending = Some(Combinator::Descendant);
                }
            }
            Tok::Combinator(combinator) => {
                if !current.simples.is_empty() {
                    compounds.push(take(&mut current));
                } else if compounds.is_empty() {
                    return Err(tokenizer.error("selector starts with a combinator"));
                } else if pending.is_some_and(|previous| previous != Combinator::Descendant) {
                    return Err(tokenizer.error("consecutive combinators"));
                }
                pending = Some(combinator);
            }
            Tok::Comma => return Err(tokenizer.error("unexpected ','")),
        }
    }

    if current.simples.is_empty() {
        if compounds.is_empty() {
            return Err(tokenizer.error("empty selector"));
        }
        if pending.is_some_and(|previous| previous != Combinator::Descendant) {
            return Err(tokenizer.error("selector ends with a combinator"));
        }
    } else {
        compounds.push(current);
    }

    let mut compounds = compounds.into_iter();
    let first = compounds.next().unwrap_or_default();
    let rest = combinators.into_iter().zip(compounds).collect();
    Ok(ComplexSelector { first, rest })
}

/// Parse a selector list from CSS text.
/// Selectors Level 3 §3, 4, 5–8, 11
///
/// # Errors
/// Returns an error for syntax outside the supported subset or empty groups.
pub fn parse_selector_list(input: &str) -> Result<SelectorList, SelectorParseError> {
    let mut tokenizer = SelectorTokenizer::new(input);
    let mut list = SelectorList::default();
    let mut group: Vec<Tok> = Vec::new();
    while let Some(token) = tokenizer.next_token()? {
        if token == Tok::Comma {
            list.selectors.push(build_complex(take(&mut group), &tokenizer)?);
        } else {
            group.push(token);
        }
    }
    list.selectors.push(build_complex(group, &tokenizer)?);
    Ok(list)
}

/// Parse one complex selector.
/// Selectors Level 3 §11: Combinators; Section 5–8: simple selectors
///
/// # Errors
/// Returns an error for syntax outside the supported subset, including commas.
pub fn parse_complex_selector(input: &str) -> Result<ComplexSelector, SelectorParseError> {
    let mut tokenizer = SelectorTokenizer::new(input);
    let mut tokens: Vec<Tok> = Vec::new();
    while let Some(token) = tokenizer.next_token()? {
        tokens.push(token);
    }
    build_complex(tokens, &tokenizer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_chain_with_nth_child() {
        let parsed = parse_complex_selector("div:nth-child(2) > p.lead").expect("parses");
        assert_eq!(
            parsed.first.simples,
            vec![
                SimpleSelector::Type("div".into()),
                SimpleSelector::NthChild(Nth { step: 0, offset: 2 }),
            ]
        );
        assert_eq!(parsed.rest.len(), 1);
        assert_eq!(parsed.rest[0].0, Combinator::Child);
        assert_eq!(
            parsed.rest[0].1.simples,
            vec![
                SimpleSelector::Type("p".into()),
                SimpleSelector::Class("lead".into()),
            ]
        );
    }

    #[test]
    fn whitespace_around_combinators_is_not_a_descendant() {
        let parsed = parse_complex_selector("  a >b  ").expect("parses");
        assert_eq!(parsed.rest.len(), 1);
        assert_eq!(parsed.rest[0].0, Combinator::Child);

        let descendant = parse_complex_selector("a b").expect("parses");
        assert_eq!(descendant.rest[0].0, Combinator::Descendant);
    }

    #[test]
    fn ids_and_classes_keep_case_and_escapes() {
        let parsed = parse_complex_selector(r"#Main\.Title.\31 st").expect("parses");
        assert_eq!(
            parsed.first.simples,
            vec![
                SimpleSelector::IdSelector("Main.Title".into()),
                SimpleSelector::Class("1st".into()),
            ]
        );
    }

    #[test]
    fn quoted_attribute_values_may_contain_commas() {
        let list = parse_selector_list(r#"[data-testid="a,b \"c\""], span"#).expect("parses");
        assert_eq!(list.selectors.len(), 2);
        assert_eq!(
            list.selectors[0].first.simples,
            vec![SimpleSelector::AttrEquals {
                name: "data-testid".into(),
                value: "a,b \"c\"".into(),
            }]
        );
    }

    #[test]
    fn nth_micro_syntax() {
        assert_eq!(parse_nth("odd"), Some(Nth { step: 2, offset: 1 }));
        assert_eq!(parse_nth("-n + 3"), Some(Nth { step: -1, offset: 3 }));
        assert_eq!(parse_nth("2n"), Some(Nth { step: 2, offset: 0 }));
        assert_eq!(parse_nth("3n1"), None);
        assert_eq!(parse_nth(""), None);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_complex_selector("").is_err());
        assert!(parse_complex_selector("> a").is_err());
        assert!(parse_complex_selector("a > > b").is_err());
        assert!(parse_complex_selector("a >").is_err());
        assert!(parse_complex_selector("#").is_err());
        assert!(parse_complex_selector("a:hover").is_err());
        assert!(parse_complex_selector("[x~=y]").is_err());
        assert!(parse_complex_selector("a, b").is_err());
    }
}
