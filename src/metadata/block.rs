//! Fenced comment block scanning
//!
//! A block looks like:
//!
//! ```text
//! # /// script
//! # dependencies = ["rich"]
//! # ///
//! ```
//!
//! Every line between the fences must be a comment (`#` alone or `# ...`).
//! The closing fence is the last `# ///` in that run of comment lines.

const FENCE: &str = "# ///";

/// A fenced block found in script source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block<'a> {
    /// Block type from the opening fence (e.g. `script`)
    pub kind: &'a str,
    /// Content lines with the comment prefix removed
    pub lines: Vec<&'a str>,
}

impl Block<'_> {
    /// Join the content lines back into text
    pub fn content(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            out.push_str(line);
            out.push('\n');
        }
        out
    }
}

/// Find every fenced block in `source`, in order of appearance
pub fn scan(source: &str) -> Vec<Block<'_>> {
    let lines: Vec<&str> = source.lines().collect();
    let mut blocks = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let Some(kind) = opening_kind(lines[i]) else {
            i += 1;
            continue;
        };

        // Contiguous comment lines after the opener
        let run_end = lines[i + 1..]
            .iter()
            .position(|line| !is_comment(line))
            .map_or(lines.len(), |offset| i + 1 + offset);

        // Need at least one content line before the closer
        let closer = (i + 2..run_end).rev().find(|&j| lines[j] == FENCE);

        match closer {
            Some(close) => {
                blocks.push(Block {
                    kind,
                    lines: lines[i + 1..close].iter().map(|l| strip_comment(l)).collect(),
                });
                i = close + 1;
            }
            None => i += 1,
        }
    }

    blocks
}

/// Recognize `# /// <kind>` and return the kind
fn opening_kind(line: &str) -> Option<&str> {
    let kind = line.strip_prefix("# /// ")?;
    let valid = !kind.is_empty()
        && kind
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-');
    valid.then_some(kind)
}

fn is_comment(line: &str) -> bool {
    line == "#" || line.starts_with("# ")
}

fn strip_comment(line: &str) -> &str {
    line.strip_prefix("# ")
        .unwrap_or_else(|| line.strip_prefix('#').unwrap_or(line))
}
