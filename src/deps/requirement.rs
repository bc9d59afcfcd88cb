//! Dependency specifiers (PEP 508 subset)
//!
//! `name [extras] (versions | @ url) ; marker`. The canonical rendering
//! matches what Python installers print for a requirement, with every
//! quote turned into a single quote.

use crate::error::{IdaeError, IdaeResult};
use crate::python::SpecifierSet;
use std::collections::BTreeSet;
use std::fmt;

/// A parsed dependency specifier
#[derive(Debug, Clone)]
pub struct Requirement {
    pub name: String,
    pub extras: BTreeSet<String>,
    pub specifier: SpecifierSet,
    pub url: Option<String>,
    pub marker: Option<String>,
}

/// Collapse runs of `-`, `_` and `.` into `-` and lower-case
pub fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_separator = false;
    for c in name.chars() {
        if matches!(c, '-' | '_' | '.') {
            if !in_separator {
                out.push('-');
            }
            in_separator = true;
        } else {
            out.extend(c.to_lowercase());
            in_separator = false;
        }
    }
    out
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
}

fn valid_name(name: &str) -> bool {
    let ends_ok = |c: Option<char>| c.is_some_and(|c| c.is_ascii_alphanumeric());
    ends_ok(name.chars().next()) && ends_ok(name.chars().last()) && name.chars().all(is_name_char)
}

/// Byte offset of the `;` that opens the environment marker
///
/// URLs may themselves contain `;`, so after `@ url` only a `;` preceded by
/// whitespace starts a marker.
fn marker_start(input: &str) -> Option<usize> {
    let first = input.find(';')?;
    match input.find('@') {
        Some(at) if at < first => input[at..]
            .match_indices(';')
            .map(|(i, _)| at + i)
            .find(|&i| input[..i].ends_with(char::is_whitespace)),
        _ => Some(first),
    }
}

impl Requirement {
    /// Parse a requirement string
    pub fn parse(input: &str) -> IdaeResult<Self> {
        let invalid = |reason: &str| IdaeError::InvalidRequirement {
            requirement: input.to_string(),
            reason: reason.to_string(),
        };

        let (body, marker) = match marker_start(input) {
            Some(at) => {
                let (body, marker) = (&input[..at], input[at + 1..].trim());
                if marker.is_empty() {
                    return Err(invalid("empty environment marker"));
                }
                (body, Some(normalize_marker(marker).map_err(|r| invalid(&r))?))
            }
            None => (input, None),
        };

        let body = body.trim();
        let name_end = body.find(|c: char| !is_name_char(c)).unwrap_or(body.len());
        let name = &body[..name_end];
        if !valid_name(name) {
            return Err(invalid("invalid project name"));
        }
        let mut rest = body[name_end..].trim_start();

        let mut extras = BTreeSet::new();
        if let Some(after) = rest.strip_prefix('[') {
            let close = after.find(']').ok_or_else(|| invalid("unclosed extras"))?;
            for extra in after[..close].split(',').map(str::trim) {
                if extra.is_empty() {
                    continue;
                }
                if !valid_name(extra) {
                    return Err(invalid("invalid extra name"));
                }
                extras.insert(normalize_name(extra));
            }
            rest = after[close + 1..].trim_start();
        }

        let mut url = None;
        let mut specifier = SpecifierSet::default();
        if let Some(after) = rest.strip_prefix('@') {
            let target = after.trim();
            if target.is_empty() || target.chars().any(char::is_whitespace) {
                return Err(invalid("invalid URL"));
            }
            url = Some(target.to_string());
        } else if !rest.is_empty() {
            let versions = match rest.strip_prefix('(') {
                Some(inner) => inner
                    .trim_end()
                    .strip_suffix(')')
                    .ok_or_else(|| invalid("unclosed version parentheses"))?,
                None => rest,
            };
            // Specifier text is case-insensitive
            specifier = versions
                .to_lowercase()
                .parse()
                .map_err(|e: crate::python::InvalidSpecifier| invalid(&e.reason))?;
        }

        Ok(Self {
            name: normalize_name(name),
            extras,
            specifier,
            url,
            marker,
        })
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.extras.is_empty() {
            let extras: Vec<&str> = self.extras.iter().map(String::as_str).collect();
            write!(f, "[{}]", extras.join(","))?;
        }
        write!(f, "{}", self.specifier)?;
        if let Some(ref url) = self.url {
            write!(f, "@ {}", url)?;
            if self.marker.is_some() {
                write!(f, " ")?;
            }
        }
        if let Some(ref marker) = self.marker {
            write!(f, "; {}", marker)?;
        }
        Ok(())
    }
}

/// Re-render a marker expression with single spaces and single quotes
fn normalize_marker(marker: &str) -> Result<String, String> {
    let mut tokens: Vec<String> = Vec::new();
    let mut chars = marker.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == '\'' || c == '"' {
            chars.next();
            let mut literal = String::new();
            loop {
                match chars.next() {
                    Some(q) if q == c => break,
                    Some(other) => literal.push(other),
                    None => return Err("unterminated string in marker".to_string()),
                }
            }
            if literal.contains('\'') {
                return Err("marker string contains a single quote".to_string());
            }
            tokens.push(format!("'{}'", literal));
        } else if c == '(' || c == ')' {
            chars.next();
            tokens.push(c.to_string());
        } else if matches!(c, '<' | '>' | '=' | '!' | '~') {
            let mut op = String::new();
            while let Some(&o) = chars.peek() {
                if !matches!(o, '<' | '>' | '=' | '!' | '~') {
                    break;
                }
                op.push(o);
                chars.next();
            }
            tokens.push(op);
        } else {
            let mut word = String::new();
            while let Some(&w) = chars.peek() {
                if w.is_whitespace()
                    || matches!(w, '\'' | '"' | '(' | ')' | '<' | '>' | '=' | '!' | '~')
                {
                    break;
                }
                word.push(w);
                chars.next();
            }
            tokens.push(word);
        }
    }

    let mut out = String::new();
    for (i, token) in tokens.iter().enumerate() {
        let after_open = i > 0 && tokens[i - 1] == "(";
        if i > 0 && !after_open && token != ")" {
            out.push(' ');
        }
        out.push_str(token);
    }
    Ok(out)
}
