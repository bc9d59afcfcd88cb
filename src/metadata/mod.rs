//! Inline script metadata
//!
//! Extracts the `# /// script` declaration from a Python script and decodes
//! it as TOML. Two layouts are accepted:
//!
//! ```text
//! # /// script                    # /// script
//! # requires-python = ">=3.11"    # [run]
//! # dependencies = ["rich"]       # requires-python = ">=3.11"
//! # ///                           # dependencies = ["rich"]
//!                                 # ///
//! ```
//!
//! Top-level keys win over the `[run]` table when both are present.

mod block;

pub use block::{scan, Block};

use crate::error::{IdaeError, IdaeResult};
use serde::Deserialize;
use tracing::debug;

/// The block type idae reads
pub const SCRIPT_BLOCK: &str = "script";

/// Dependency and interpreter requirements declared by a script
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptMetadata {
    /// Raw dependency specifiers, in declaration order
    pub dependencies: Option<Vec<String>>,
    /// Raw `requires-python` constraint
    pub requires_python: Option<String>,
}

impl ScriptMetadata {
    /// Declared dependencies, empty when none were declared
    pub fn dependencies(&self) -> &[String] {
        self.dependencies.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawFields {
    dependencies: Option<Vec<String>>,
    requires_python: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawMetadata {
    #[serde(flatten)]
    top: RawFields,
    #[serde(default)]
    run: Option<RawFields>,
}

impl From<RawMetadata> for ScriptMetadata {
    fn from(raw: RawMetadata) -> Self {
        let run = raw.run.unwrap_or_default();
        Self {
            dependencies: raw.top.dependencies.or(run.dependencies),
            requires_python: raw.top.requires_python.or(run.requires_python),
        }
    }
}

/// Read the script metadata block from source text
///
/// Returns `Ok(None)` when the script has no `script` block.
pub fn read(source: &str) -> IdaeResult<Option<ScriptMetadata>> {
    let mut matches = scan(source)
        .into_iter()
        .filter(|b| b.kind == SCRIPT_BLOCK);

    let Some(block) = matches.next() else {
        debug!("No {} block found", SCRIPT_BLOCK);
        return Ok(None);
    };
    if matches.next().is_some() {
        return Err(IdaeError::MultipleBlocks {
            kind: SCRIPT_BLOCK.to_string(),
        });
    }

    let raw: RawMetadata = toml::from_str(&block.content())?;
    let metadata = ScriptMetadata::from(raw);
    debug!(
        "Script metadata: {} dependencies, requires-python {:?}",
        metadata.dependencies().len(),
        metadata.requires_python
    );
    Ok(Some(metadata))
}
