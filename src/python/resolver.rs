//! Interpreter selection
//!
//! Turns a `requires-python` value into a [`SpecifierSet`] and picks the
//! newest discovered interpreter that satisfies it.

use super::discovery::{Interpreter, InterpreterDiscovery};
use super::specifier::SpecifierSet;
use crate::error::{IdaeError, IdaeResult};
use tracing::{debug, info};

/// Parse a version constraint
///
/// A bare number is read as a float and means "compatible release": `3.11`
/// is `~=3.11`, `3` is `~=3.0` and `3.10` is `~=3.1`. Anything else must be
/// a specifier set such as `>=3.11,<4`.
pub fn parse_constraint(constraint: &str) -> IdaeResult<SpecifierSet> {
    let normalized = normalize_constraint(constraint);
    if normalized != constraint.trim() {
        debug!("Constraint {:?} normalized to {:?}", constraint, normalized);
    }
    normalized
        .parse()
        .map_err(|e: super::specifier::InvalidSpecifier| IdaeError::InvalidConstraint {
            constraint: constraint.to_string(),
            reason: e.reason,
        })
}

fn normalize_constraint(constraint: &str) -> String {
    let trimmed = constraint.trim();
    match trimmed.parse::<f64>() {
        // Read as a float, so `3.10` is `3.1` and `3` is `3.0`
        Ok(number) => format!("~={:?}", number),
        Err(_) => trimmed.to_string(),
    }
}

/// Newest interpreter satisfying `spec`
pub fn select<'a>(spec: &SpecifierSet, interpreters: &'a [Interpreter]) -> Option<&'a Interpreter> {
    let mut ordered: Vec<&Interpreter> = interpreters.iter().collect();
    // Stable: among equal versions the first discovered wins
    ordered.sort_by(|a, b| b.version.cmp(&a.version));
    ordered.into_iter().find(|i| spec.contains(&i.version))
}

/// Resolve `constraint` against everything `discovery` finds
pub async fn resolve(
    constraint: &str,
    discovery: &dyn InterpreterDiscovery,
) -> IdaeResult<Interpreter> {
    let spec = parse_constraint(constraint)?;
    let interpreters = discovery.find_all().await?;
    debug!("Discovered {} interpreters", interpreters.len());

    let chosen = select(&spec, &interpreters).ok_or_else(|| IdaeError::InterpreterNotFound {
        constraint: constraint.to_string(),
    })?;

    info!(
        "Using Python {} ({}) for {}",
        chosen.version,
        chosen.executable.display(),
        constraint
    );
    Ok(chosen.clone())
}
