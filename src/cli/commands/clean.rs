//! Clean command - delete cached environments

use crate::cli::args::CleanArgs;
use crate::config::{cache_root, Config};
use crate::error::{IdaeError, IdaeResult};
use crate::ui::{TaskSpinner, UiContext};
use crate::venv::purge_root;

/// Execute the clean command
pub async fn execute(args: CleanArgs, config: &Config) -> IdaeResult<()> {
    let ctx = UiContext::detect();
    let cwd = std::env::current_dir().map_err(|e| IdaeError::io("getting current directory", e))?;
    let root = cache_root(config, args.cache.cache_dir.as_deref(), args.cache.local, &cwd);

    let mut spinner = TaskSpinner::new(&ctx);
    spinner.start(&format!("Removing {}", root.display()));

    match purge_root(&root).await {
        Ok(true) => spinner.stop("Cache removed"),
        Ok(false) => spinner.stop("Cache already empty"),
        Err(e) => {
            spinner.stop_error("Failed to remove cache");
            return Err(e);
        }
    }
    Ok(())
}
