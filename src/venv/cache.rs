//! Content-addressed environment cache
//!
//! Environments live at `<root>/<major>.<minor>/<hash>` and are built in
//! place, because virtual environments hard-code their own path into entry
//! points. A build holds the exclusive lock file `<mm>/.<hash>.lock` and
//! writes a completion marker as its last step; only marked directories
//! count as hits.

use super::builder::{CapturedOutput, EnvironmentBuilder};
use crate::deps::{CacheKey, NormalizedDependencySet};
use crate::error::{BuildStage, IdaeError, IdaeResult};
use crate::python::Interpreter;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Written inside an environment once it is fully built
pub const COMPLETE_MARKER: &str = ".idae-complete";

/// How often a waiting build re-checks a held lock
const LOCK_POLL: Duration = Duration::from_millis(200);

/// Cache of built environments under a single root
pub struct EnvironmentCache {
    root: PathBuf,
    builder: Box<dyn EnvironmentBuilder>,
}

impl EnvironmentCache {
    pub fn new(root: impl Into<PathBuf>, builder: Box<dyn EnvironmentBuilder>) -> Self {
        Self {
            root: root.into(),
            builder,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Final location for `key`
    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.root.join(key.relative_path())
    }

    fn lock_path(&self, key: &CacheKey) -> PathBuf {
        self.root.join(&key.python).join(format!(".{}.lock", key.hash))
    }

    /// Existing, completely built environment for `key`
    pub fn lookup(&self, key: &CacheKey) -> Option<PathBuf> {
        let path = self.path_for(key);
        path.join(COMPLETE_MARKER).is_file().then_some(path)
    }

    /// Return the environment for `python` + `deps`, building it on a miss
    pub async fn get_or_create(
        &self,
        python: &Interpreter,
        deps: &NormalizedDependencySet,
        on_output: &(dyn Fn(String) + Send + Sync),
    ) -> IdaeResult<PathBuf> {
        let key = CacheKey::new(&python.version, deps);
        if let Some(path) = self.lookup(&key) {
            debug!("Cache hit: {}", key);
            return Ok(path);
        }

        info!("Cache miss: {} ({} dependencies)", key, deps.len());
        let parent = self.root.join(&key.python);
        tokio::fs::create_dir_all(&parent)
            .await
            .map_err(|e| IdaeError::io(format!("creating {}", parent.display()), e))?;

        let _lock = BuildLock::acquire(self.lock_path(&key)).await?;
        if let Some(path) = self.lookup(&key) {
            debug!("{} was built while waiting for the lock", key);
            return Ok(path);
        }

        // Leftovers of an interrupted build
        let target = self.path_for(&key);
        if remove_if_exists(&target).await? {
            warn!("Discarded incomplete environment at {}", target.display());
        }

        if let Err(e) = self.build(python, deps, &target, on_output).await {
            discard(&target).await;
            return Err(e);
        }

        let marker = target.join(COMPLETE_MARKER);
        tokio::fs::write(&marker, key.to_string())
            .await
            .map_err(|e| IdaeError::io(format!("writing {}", marker.display()), e))?;

        info!("Environment ready: {}", target.display());
        Ok(target)
    }

    async fn build(
        &self,
        python: &Interpreter,
        deps: &NormalizedDependencySet,
        target: &Path,
        on_output: &(dyn Fn(String) + Send + Sync),
    ) -> IdaeResult<()> {
        let created = self.builder.create(python, target, on_output).await?;
        check(BuildStage::Create, created)?;

        if deps.is_empty() {
            return Ok(());
        }
        let installed = self
            .builder
            .install(target, &deps.to_vec(), on_output)
            .await?;
        check(BuildStage::Install, installed)
    }

    /// Delete the whole cache root. Returns whether anything was removed.
    pub async fn purge(&self) -> IdaeResult<bool> {
        purge_root(&self.root).await
    }
}

/// Exclusive build lock, removed on drop
struct BuildLock {
    path: PathBuf,
}

impl BuildLock {
    /// Create `path` exclusively, waiting while a live process holds it
    async fn acquire(path: PathBuf) -> IdaeResult<Self> {
        let mut waiting = false;
        loop {
            let attempt = tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await;

            match attempt {
                Ok(mut file) => {
                    let pid = std::process::id().to_string();
                    file.write_all(pid.as_bytes())
                        .await
                        .map_err(|e| IdaeError::io(format!("writing {}", path.display()), e))?;
                    return Ok(Self { path });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if lock_is_stale(&path) {
                        warn!("Removing stale lock {}", path.display());
                        if let Err(e) = std::fs::remove_file(&path) {
                            debug!("Stale lock already gone: {}", e);
                        }
                        continue;
                    }
                    if !waiting {
                        info!("Waiting for another build ({})", path.display());
                        waiting = true;
                    }
                    tokio::time::sleep(LOCK_POLL).await;
                }
                Err(e) => {
                    return Err(IdaeError::io(format!("locking {}", path.display()), e));
                }
            }
        }
    }
}

impl Drop for BuildLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("Failed to release {}: {}", self.path.display(), e);
        }
    }
}

/// A lock is stale when the pid it records no longer exists
fn lock_is_stale(path: &Path) -> bool {
    let Some(pid) = std::fs::read_to_string(path)
        .ok()
        .and_then(|s| s.trim().parse::<i32>().ok())
    else {
        // Unreadable or still being written
        return false;
    };
    !process_alive(pid)
}

#[cfg(unix)]
fn process_alive(pid: i32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    !matches!(kill(Pid::from_raw(pid), None), Err(Errno::ESRCH))
}

#[cfg(not(unix))]
fn process_alive(_pid: i32) -> bool {
    true
}

/// Delete a cache root, treating a missing directory as already clean
pub async fn purge_root(root: &Path) -> IdaeResult<bool> {
    let removed = remove_if_exists(root).await?;
    if removed {
        info!("Removed cache at {}", root.display());
    } else {
        debug!("Cache at {} already absent", root.display());
    }
    Ok(removed)
}

fn check(stage: BuildStage, result: CapturedOutput) -> IdaeResult<()> {
    if result.is_success() {
        return Ok(());
    }
    Err(IdaeError::EnvironmentCreation {
        stage,
        output: result.output,
    })
}

async fn remove_if_exists(path: &Path) -> IdaeResult<bool> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(IdaeError::io(format!("removing {}", path.display()), e)),
    }
}

async fn discard(target: &Path) {
    if let Err(e) = remove_if_exists(target).await {
        warn!("Failed to clean up {}: {}", target.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    #[derive(Default)]
    struct Calls {
        create: AtomicUsize,
        install: AtomicUsize,
        targets: Mutex<Vec<PathBuf>>,
    }

    #[derive(Default)]
    struct StubBuilder {
        calls: Arc<Calls>,
        fail_create: bool,
        fail_install: bool,
    }

    #[async_trait]
    impl EnvironmentBuilder for StubBuilder {
        async fn create(
            &self,
            _python: &Interpreter,
            target: &Path,
            on_output: &(dyn Fn(String) + Send + Sync),
        ) -> IdaeResult<CapturedOutput> {
            self.calls.create.fetch_add(1, Ordering::SeqCst);
            self.calls.targets.lock().unwrap().push(target.to_path_buf());

            // Like venv, entry points embed the directory they were created in
            let bin = target.join("bin");
            std::fs::create_dir_all(&bin).unwrap();
            std::fs::write(bin.join("python"), "").unwrap();
            std::fs::write(
                bin.join("pip"),
                format!("#!{}\n", bin.join("python").display()),
            )
            .unwrap();
            on_output("created".to_string());

            if self.fail_create {
                return Ok(CapturedOutput {
                    code: Some(1),
                    output: "Error: no ensurepip".to_string(),
                });
            }
            Ok(CapturedOutput::success())
        }

        async fn install(
            &self,
            env: &Path,
            requirements: &[String],
            _on_output: &(dyn Fn(String) + Send + Sync),
        ) -> IdaeResult<CapturedOutput> {
            self.calls.install.fetch_add(1, Ordering::SeqCst);
            std::fs::write(env.join("installed.txt"), requirements.join("\n")).unwrap();
            if self.fail_install {
                return Ok(CapturedOutput {
                    code: Some(1),
                    output: "ERROR: No matching distribution found for nope".to_string(),
                });
            }
            Ok(CapturedOutput::success())
        }
    }

    fn python() -> Interpreter {
        Interpreter::new("3.12.4".parse().unwrap(), "/usr/bin/python3.12")
    }

    fn deps(raw: &[&str]) -> NormalizedDependencySet {
        NormalizedDependencySet::from_raw(raw).unwrap()
    }

    fn counting(temp: &TempDir) -> (EnvironmentCache, Arc<Calls>) {
        let calls = Arc::new(Calls::default());
        let builder = StubBuilder {
            calls: calls.clone(),
            ..Default::default()
        };
        (cache(temp, builder), calls)
    }

    fn cache(temp: &TempDir, builder: StubBuilder) -> EnvironmentCache {
        EnvironmentCache::new(temp.path().join("cache"), Box::new(builder))
    }

    fn leftovers(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .map(|entries| {
                entries
                    .filter_map(Result::ok)
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn miss_builds_at_content_address() {
        let temp = TempDir::new().unwrap();
        let (cache, calls) = counting(&temp);

        let deps = deps(&["rich", "requests<3"]);
        let env = cache.get_or_create(&python(), &deps, &|_| {}).await.unwrap();

        let key = CacheKey::new(&python().version, &deps);
        assert_eq!(env, temp.path().join("cache").join("3.12").join(&key.hash));
        assert!(env.join("bin").join("python").exists());
        assert!(env.join(COMPLETE_MARKER).is_file());
        assert_eq!(
            std::fs::read_to_string(env.join("installed.txt")).unwrap(),
            "requests<3\nrich"
        );
        assert_eq!(calls.create.load(Ordering::SeqCst), 1);
        assert_eq!(calls.install.load(Ordering::SeqCst), 1);
        // Lock released, nothing else left beside the environment
        assert_eq!(leftovers(&temp.path().join("cache").join("3.12")), vec![key.hash]);
    }

    #[tokio::test]
    async fn environment_is_built_at_its_final_path() {
        let temp = TempDir::new().unwrap();
        let (cache, calls) = counting(&temp);

        let env = cache
            .get_or_create(&python(), &deps(&["rich"]), &|_| {})
            .await
            .unwrap();

        assert_eq!(*calls.targets.lock().unwrap(), vec![env.clone()]);
        let shebang = std::fs::read_to_string(env.join("bin").join("pip")).unwrap();
        assert_eq!(
            shebang.trim_end(),
            format!("#!{}", env.join("bin").join("python").display())
        );
    }

    #[tokio::test]
    async fn hit_skips_builder() {
        let temp = TempDir::new().unwrap();
        let (cache, calls) = counting(&temp);

        let first = cache
            .get_or_create(&python(), &deps(&["rich"]), &|_| {})
            .await
            .unwrap();
        let second = cache
            .get_or_create(&python(), &deps(&["Rich"]), &|_| {})
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(calls.create.load(Ordering::SeqCst), 1);
        assert_eq!(calls.install.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_dependencies_skip_install() {
        let temp = TempDir::new().unwrap();
        let (cache, calls) = counting(&temp);

        let env = cache
            .get_or_create(&python(), &NormalizedDependencySet::default(), &|_| {})
            .await
            .unwrap();

        assert!(env.is_dir());
        assert_eq!(calls.create.load(Ordering::SeqCst), 1);
        assert_eq!(calls.install.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn create_failure_leaves_nothing_behind() {
        let temp = TempDir::new().unwrap();
        let cache = cache(
            &temp,
            StubBuilder {
                fail_create: true,
                ..Default::default()
            },
        );

        let err = cache
            .get_or_create(&python(), &deps(&["rich"]), &|_| {})
            .await
            .unwrap_err();

        match err {
            IdaeError::EnvironmentCreation { stage, output } => {
                assert_eq!(stage, BuildStage::Create);
                assert!(output.contains("ensurepip"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(leftovers(&temp.path().join("cache").join("3.12")).is_empty());
    }

    #[tokio::test]
    async fn install_failure_is_not_cached() {
        let temp = TempDir::new().unwrap();
        let calls = Arc::new(Calls::default());
        let cache = cache(
            &temp,
            StubBuilder {
                calls: calls.clone(),
                fail_install: true,
                ..Default::default()
            },
        );

        let err = cache
            .get_or_create(&python(), &deps(&["nope"]), &|_| {})
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            IdaeError::EnvironmentCreation {
                stage: BuildStage::Install,
                ..
            }
        ));
        assert!(err.to_string().contains("No matching distribution"));
        assert!(leftovers(&temp.path().join("cache").join("3.12")).is_empty());

        // Nothing was cached, so a retry builds again
        let _ = cache.get_or_create(&python(), &deps(&["nope"]), &|_| {}).await;
        assert_eq!(calls.create.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unmarked_directory_is_rebuilt() {
        let temp = TempDir::new().unwrap();
        let (cache, calls) = counting(&temp);
        let deps = deps(&["rich"]);
        let key = CacheKey::new(&python().version, &deps);

        // An interrupted build: directory present, marker missing
        let partial = cache.path_for(&key);
        std::fs::create_dir_all(&partial).unwrap();
        std::fs::write(partial.join("half-written"), "").unwrap();
        assert!(cache.lookup(&key).is_none());

        let env = cache.get_or_create(&python(), &deps, &|_| {}).await.unwrap();
        assert_eq!(env, partial);
        assert!(!env.join("half-written").exists());
        assert_eq!(calls.create.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_builds_share_one_environment() {
        let temp = TempDir::new().unwrap();
        let (cache, calls) = counting(&temp);
        let deps = deps(&["rich"]);

        let (python_a, python_b) = (python(), python());
        let (a, b) = tokio::join!(
            cache.get_or_create(&python_a, &deps, &|_| {}),
            cache.get_or_create(&python_b, &deps, &|_| {}),
        );
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(calls.create.load(Ordering::SeqCst), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stale_lock_is_taken_over() {
        let temp = TempDir::new().unwrap();
        let (cache, calls) = counting(&temp);
        let deps = deps(&[]);
        let key = CacheKey::new(&python().version, &deps);

        // Lock left behind by a process that no longer exists
        let lock = cache.lock_path(&key);
        std::fs::create_dir_all(lock.parent().unwrap()).unwrap();
        std::fs::write(&lock, i32::MAX.to_string()).unwrap();

        cache.get_or_create(&python(), &deps, &|_| {}).await.unwrap();
        assert_eq!(calls.create.load(Ordering::SeqCst), 1);
        assert!(!lock.exists());
    }

    #[tokio::test]
    async fn output_is_streamed() {
        let temp = TempDir::new().unwrap();
        let cache = cache(&temp, StubBuilder::default());
        let seen = Mutex::new(Vec::new());

        cache
            .get_or_create(&python(), &deps(&[]), &|line| seen.lock().unwrap().push(line))
            .await
            .unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["created".to_string()]);
    }

    #[tokio::test]
    async fn purge_removes_root_and_forces_rebuild() {
        let temp = TempDir::new().unwrap();
        let (cache, calls) = counting(&temp);

        cache
            .get_or_create(&python(), &deps(&["rich"]), &|_| {})
            .await
            .unwrap();
        assert!(cache.purge().await.unwrap());
        assert!(!cache.root().exists());

        cache
            .get_or_create(&python(), &deps(&["rich"]), &|_| {})
            .await
            .unwrap();
        assert_eq!(calls.create.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn purge_of_missing_root_is_ok() {
        let temp = TempDir::new().unwrap();
        let cache = cache(&temp, StubBuilder::default());
        assert!(!cache.purge().await.unwrap());
    }

    #[test]
    fn lookup_requires_completion_marker() {
        let temp = TempDir::new().unwrap();
        let cache = cache(&temp, StubBuilder::default());
        let key = CacheKey::new(&python().version, &deps(&[]));
        assert!(cache.lookup(&key).is_none());

        std::fs::create_dir_all(cache.path_for(&key)).unwrap();
        assert!(cache.lookup(&key).is_none());

        std::fs::write(cache.path_for(&key).join(COMPLETE_MARKER), "").unwrap();
        assert_eq!(cache.lookup(&key), Some(cache.path_for(&key)));
    }
}
