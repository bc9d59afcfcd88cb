//! Run command - execute a script in its cached environment

use crate::cli::args::RunArgs;
use crate::config::{cache_root, Config};
use crate::deps::NormalizedDependencySet;
use crate::error::{IdaeError, IdaeResult};
use crate::metadata::{self, ScriptMetadata};
use crate::python::{self, Interpreter, PathDiscovery};
use crate::relay::{self, RelayCommand};
use crate::ui::{BuildProgress, UiContext};
use crate::venv::{env_python, EnvironmentCache, VenvBuilder};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Execute the run command, returning the script's exit code
pub async fn execute(args: RunArgs, config: &Config) -> IdaeResult<i32> {
    let ctx = UiContext::detect();

    let source = read_script(&args.script).await?;
    let metadata = metadata::read(&source)?.unwrap_or_default();
    let deps = NormalizedDependencySet::from_raw(metadata.dependencies())?;
    debug!("Normalized dependencies: {:?}", deps.to_vec());

    let python = select_interpreter(&args, &metadata, config).await?;
    let flags = split_python_flags(&args.python_flags)?;

    let cwd =
        std::env::current_dir().map_err(|e| IdaeError::io("getting current directory", e))?;
    let root = cache_root(config, args.cache.cache_dir.as_deref(), args.cache.local, &cwd);
    let cache = EnvironmentCache::new(root, Box::new(VenvBuilder::new()));

    if args.clean {
        cache.purge().await?;
    }

    let env = prepare_environment(&ctx, &cache, &python, &deps).await?;

    let cmd = RelayCommand::new(env_python(&env))
        .args(flags)
        .arg(args.script.to_string_lossy())
        .args(args.args);
    relay::run(&cmd).await
}

async fn read_script(path: &Path) -> IdaeResult<String> {
    tokio::fs::read_to_string(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            IdaeError::ScriptNotFound(path.to_path_buf())
        } else {
            IdaeError::io(format!("reading {}", path.display()), e)
        }
    })
}

/// Constraint in effect: `--force-version`, else the script's unless ignored
fn effective_constraint<'a>(args: &'a RunArgs, metadata: &'a ScriptMetadata) -> Option<&'a str> {
    if let Some(ref forced) = args.force_version {
        return Some(forced);
    }
    if args.ignore_version {
        return None;
    }
    metadata.requires_python.as_deref()
}

async fn select_interpreter(
    args: &RunArgs,
    metadata: &ScriptMetadata,
    config: &Config,
) -> IdaeResult<Interpreter> {
    match effective_constraint(args, metadata) {
        Some(constraint) => python::resolve(constraint, &PathDiscovery::new()).await,
        None => {
            let default = PathBuf::from(&config.python.default);
            let interpreter = python::probe(&default).await?;
            info!(
                "Using default Python {} ({})",
                interpreter.version,
                interpreter.executable.display()
            );
            Ok(interpreter)
        }
    }
}

fn split_python_flags(values: &[String]) -> IdaeResult<Vec<String>> {
    let mut flags = Vec::new();
    for value in values {
        let split = shell_words::split(value).map_err(|e| IdaeError::InvalidPythonFlags {
            flags: value.clone(),
            reason: e.to_string(),
        })?;
        flags.extend(split);
    }
    Ok(flags)
}

async fn prepare_environment(
    ctx: &UiContext,
    cache: &EnvironmentCache,
    python: &Interpreter,
    deps: &NormalizedDependencySet,
) -> IdaeResult<PathBuf> {
    let key = crate::deps::CacheKey::new(&python.version, deps);
    if let Some(env) = cache.lookup(&key) {
        debug!("Reusing environment {}", env.display());
        return Ok(env);
    }

    let progress = BuildProgress::new(
        ctx,
        &format!("Building Python {} environment", key.python),
    );
    let result = cache
        .get_or_create(python, deps, &|line| {
            debug!("{}", line);
            progress.on_line(line);
        })
        .await;
    progress.finish();
    result
}
