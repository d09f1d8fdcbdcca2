//! Strict parser for Freedesktop `os-release` files.
//!
//! Unlike most real-world readers, every non-blank, non-comment line must be a
//! `KEY=VALUE` assignment. Anything else aborts the parse with the offending
//! line number.

use std::collections::BTreeMap;

use crate::error::ParseError;

/// Parsed content of an `os-release` file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OsIdentity {
    values: BTreeMap<String, String>,
}

impl OsIdentity {
    /// Build an identity from explicit pairs. Later pairs replace earlier ones.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// The `ID` field.
    pub fn id(&self) -> Option<&str> {
        self.get("ID")
    }

    /// The whitespace-split `ID_LIKE` field; empty when absent.
    pub fn id_like(&self) -> Vec<&str> {
        self.get("ID_LIKE")
            .map(|raw| raw.split_whitespace().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Parse the text of an `os-release` file.
pub fn parse_os_release(content: &str) -> Result<OsIdentity, ParseError> {
    let mut values = BTreeMap::new();

    for (index, raw_line) in content.split('\n').enumerate() {
        let line_number = index + 1;
        let line = raw_line.trim_end();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((key, value)) = split_assignment(line) else {
            return Err(ParseError::InvalidLine {
                line: line_number,
                content: line.to_string(),
            });
        };

        let value = if value.starts_with('"') || value.starts_with('\'') {
            unquote(value).map_err(|message| ParseError::InvalidQuoting {
                line: line_number,
                message,
            })?
        } else {
            value.to_string()
        };

        values.insert(key.to_string(), value);
    }

    Ok(OsIdentity { values })
}

/// Split `KEY=VALUE` where KEY is `[A-Z][A-Z_0-9]+`.
fn split_assignment(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once('=')?;
    let mut chars = key.chars();
    let first = chars.next()?;
    if !first.is_ascii_uppercase() {
        return None;
    }
    let rest = chars.as_str();
    if rest.is_empty()
        || !rest
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
    {
        return None;
    }
    Some((key, value))
}

/// Interpret a single quoted literal with backslash escapes.
///
/// The escape set is the os-release(5) shell-quoting one (`\\`, `\'`, `\"`,
/// `\$`, `` \` ``) plus the single-character C escapes. `\0` is a lone NUL
/// rather than an octal prefix and hex escapes are kept verbatim. Adjacent
/// literals and text after the closing quote (even a `# comment`) are
/// rejected.
fn unquote(value: &str) -> Result<String, String> {
    let mut chars = value.char_indices();
    let Some((_, quote)) = chars.next() else {
        return Err("empty value".to_string());
    };

    let mut out = String::with_capacity(value.len());
    while let Some((pos, c)) = chars.next() {
        if c == quote {
            let trailing = &value[pos + c.len_utf8()..];
            if !trailing.is_empty() {
                return Err(format!(
                    "invalid syntax: unexpected text {trailing:?} after closing quote"
                ));
            }
            return Ok(out);
        }
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some((_, escaped)) = chars.next() else {
            break;
        };
        match escaped {
            '\\' | '\'' | '"' | '$' | '`' => out.push(escaped),
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '0' => out.push('\0'),
            'a' => out.push('\u{07}'),
            'b' => out.push('\u{08}'),
            'f' => out.push('\u{0C}'),
            'v' => out.push('\u{0B}'),
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }

    Err(format!("unterminated string literal (missing closing {quote})"))
}
