//! Custom message templates
//!
//! Templates use a printf-style syntax over exactly four string values,
//! always supplied in this order:
//!
//! 1. pod name
//! 2. pod namespace
//! 3. event reason
//! 4. event message
//!
//! Supported placeholders:
//!
//! - `%s` / `%v`: the next value in order
//! - `%[n]s` / `%[n]v`: value `n` (1-based), after which `%s` continues
//!   with value `n + 1`
//! - `%%`: a literal percent sign
//!
//! A template that only uses sequential placeholders must consume all four
//! values. Once an explicit index appears, any subset may be referenced.

use std::fmt;
use thiserror::Error;

/// Number of values every template is rendered with
pub const VALUE_COUNT: usize = 4;

/// Errors raised while parsing a template
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    /// `%` at the end of the template
    #[error("dangling '%' at position {position}")]
    DanglingPercent {
        /// Byte offset of the `%`
        position: usize,
    },

    /// A verb other than `s` or `v`
    #[error("unsupported verb '%{verb}' at position {position}: only %s and %v are allowed")]
    UnsupportedVerb {
        /// Verb character
        verb: char,
        /// Byte offset of the `%`
        position: usize,
    },

    /// Malformed or out-of-range `%[n]` index
    #[error("invalid argument index '{index}' at position {position}: expected 1..={max}")]
    InvalidIndex {
        /// Index text as written
        index: String,
        /// Byte offset of the `%`
        position: usize,
        /// Highest valid index
        max: usize,
    },

    /// More sequential placeholders than values
    #[error("placeholder at position {position} has no value left ({max} available)")]
    MissingValue {
        /// Byte offset of the `%`
        position: usize,
        /// Number of available values
        max: usize,
    },

    /// Sequential template that does not use every value
    #[error("template uses {found} placeholders, expected {expected}")]
    WrongCount {
        /// Placeholders found
        found: usize,
        /// Placeholders required
        expected: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Value(usize),
}

/// Parsed template ready for rendering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageTemplate {
    segments: Vec<Segment>,
}

impl MessageTemplate {
    /// Parse a template string
    ///
    /// # Errors
    ///
    /// Returns a [`TemplateError`] if the template uses an unsupported
    /// placeholder or the wrong number of values.
    ///
    /// # Examples
    ///
    /// ```
    /// use podwatch::notify::template::MessageTemplate;
    ///
    /// let template = MessageTemplate::parse("%s/%s restarted: %s (%s)").unwrap();
    /// let text = template.render(["worker-1", "ns", "BackOff", "crash loop"]);
    /// assert_eq!(text, "worker-1/ns restarted: BackOff (crash loop)");
    ///
    /// assert!(MessageTemplate::parse("pod %s restarted").is_err());
    /// assert!(MessageTemplate::parse("pod %[1]s restarted").is_ok());
    /// ```
    pub fn parse(template: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut next_value = 0usize;
        let mut reordered = false;
        let mut chars = template.char_indices();

        while let Some((position, c)) = chars.next() {
            if c != '%' {
                literal.push(c);
                continue;
            }

            let index = match chars.next() {
                None => return Err(TemplateError::DanglingPercent { position }),
                Some((_, '%')) => {
                    literal.push('%');
                    continue;
                }
                Some((_, '[')) => {
                    let mut digits = String::new();
                    let mut closed = false;
                    for (_, d) in chars.by_ref() {
                        if d == ']' {
                            closed = true;
                            break;
                        }
                        digits.push(d);
                    }
                    let index = match digits.parse::<usize>() {
                        Ok(n) if closed && (1..=VALUE_COUNT).contains(&n) => n - 1,
                        _ => {
                            return Err(TemplateError::InvalidIndex {
                                index: digits,
                                position,
                                max: VALUE_COUNT,
                            })
                        }
                    };
                    reordered = true;
                    match chars.next() {
                        Some((_, 's' | 'v')) => index,
                        Some((_, verb)) => {
                            return Err(TemplateError::UnsupportedVerb { verb, position })
                        }
                        None => return Err(TemplateError::DanglingPercent { position }),
                    }
                }
                Some((_, 's' | 'v')) => {
                    if next_value >= VALUE_COUNT {
                        return Err(TemplateError::MissingValue {
                            position,
                            max: VALUE_COUNT,
                        });
                    }
                    next_value
                }
                Some((_, verb)) => return Err(TemplateError::UnsupportedVerb { verb, position }),
            };

            next_value = index + 1;
            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(Segment::Value(index));
        }

        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        if !reordered && next_value != VALUE_COUNT {
            return Err(TemplateError::WrongCount {
                found: next_value,
                expected: VALUE_COUNT,
            });
        }

        Ok(Self { segments })
    }

    /// Render with the four values in placeholder order
    pub fn render(&self, values: [&str; VALUE_COUNT]) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Value(i) => out.push_str(values[*i]),
            }
        }
        out
    }
}

impl fmt::Display for MessageTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => write!(f, "{}", text.replace('%', "%%"))?,
                Segment::Value(i) => write!(f, "%[{}]s", i + 1)?,
            }
        }
        Ok(())
    }
}
