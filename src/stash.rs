// Stash: memoizes function results under a base directory.
// `Stash::wrap` is the decorator; `Stashed` is the wrapped, caching function.

use std::fs;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, info, warn};

use crate::cache::{FunctionId, digest_args, paths, read_stashed, store, write_stashed};
use crate::config::StashConfig;
use crate::error::{Result, StashError};

/// Manages a cache directory and wraps functions so their results persist across runs.
#[derive(Debug, Clone)]
pub struct Stash {
    base_dir: PathBuf,
}

impl Stash {
    /// Create a stash in the user's cache directory (e.g. ~/.cache/bamboo-stash).
    pub fn new() -> Result<Self> {
        Self::from_config(&StashConfig::default())
    }

    /// Create a stash storing results under `base_dir`.
    ///
    /// The directory is created lazily, when the first result is written.
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        info!("Data will be cached in {}", base_dir.display());
        Self { base_dir }
    }

    pub fn from_config(config: &StashConfig) -> Result<Self> {
        Ok(Self::with_base_dir(config.resolve_base_dir()?))
    }

    /// Base directory for stored results.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Wrap `f` so its results are stored under this stash.
    ///
    /// Arguments are passed as a single value, usually a tuple.
    pub fn wrap<A, R, F>(&self, id: FunctionId, f: F) -> Stashed<A, R, F>
    where
        F: Fn(A) -> R,
    {
        Stashed::new(&self.base_dir, id, f)
    }

    /// Wrap a fallible `f`. Only `Ok` values are stored; see [`Stashed::try_call`].
    pub fn wrap_try<A, R, E, F>(&self, id: FunctionId, f: F) -> Stashed<A, R, F>
    where
        F: Fn(A) -> std::result::Result<R, E>,
    {
        Stashed::new(&self.base_dir, id, f)
    }

    /// Delete every stored result. Returns whether anything was removed.
    pub fn clear(&self) -> Result<bool> {
        info!(dir = %self.base_dir.display(), "Clearing stash");
        store::delete_dir(&self.base_dir)
    }

    /// Summarize stored results per function version.
    pub fn functions(&self) -> Result<Vec<FunctionUsage>> {
        let mut usage = Vec::new();
        for name_dir in subdirs(&self.base_dir)? {
            let name = file_name(&name_dir);
            for digest_dir in subdirs(&name_dir)? {
                let (entries, bytes) = store::dir_usage(&digest_dir)?;
                usage.push(FunctionUsage {
                    name: name.clone(),
                    source_digest: file_name(&digest_dir),
                    entries,
                    bytes,
                });
            }
        }
        usage.sort_by(|a, b| {
            a.name
                .cmp(&b.name)
                .then_with(|| a.source_digest.cmp(&b.source_digest))
        });
        Ok(usage)
    }
}

/// Stored results for one version of one function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionUsage {
    /// Sanitized qualified name (the directory name).
    pub name: String,
    pub source_digest: String,
    pub entries: usize,
    pub bytes: u64,
}

/// A function wrapped by [`Stash::wrap`].
pub struct Stashed<A, R, F> {
    id: FunctionId,
    function_root: PathBuf,
    function_dir: PathBuf,
    f: F,
    _marker: PhantomData<fn(A) -> R>,
}

impl<A, R, F> Stashed<A, R, F> {
    fn new(base_dir: &Path, id: FunctionId, f: F) -> Self {
        Self {
            function_root: paths::function_root(base_dir, id.qualname()),
            function_dir: paths::function_dir(base_dir, id.qualname(), id.source_digest()),
            id,
            f,
            _marker: PhantomData,
        }
    }

    pub fn id(&self) -> &FunctionId {
        &self.id
    }

    /// Directory holding this function version's results.
    pub fn function_dir(&self) -> &Path {
        &self.function_dir
    }

    /// Remove this function's results, including those of older source versions.
    pub fn invalidate(&self) -> Result<bool> {
        debug!(function = self.id.qualname(), "Invalidating stashed results");
        store::delete_dir(&self.function_root)
    }
}

impl<A, R, F> Stashed<A, R, F>
where
    A: Serialize,
    R: Serialize + DeserializeOwned,
{
    /// Path of the entry that stores the result for `args`.
    pub fn entry_path(&self, args: &A) -> Result<PathBuf> {
        Ok(paths::entry_path(&self.function_dir, &digest_args(args)?))
    }

    /// Remove the stored result for `args`, if any.
    pub fn forget(&self, args: &A) -> Result<bool> {
        store::delete(&self.entry_path(args)?)
    }

    /// Return the stored result for `args`, or call the function and store its result.
    pub fn call(&self, args: A) -> Result<R>
    where
        F: Fn(A) -> R,
    {
        let path = self.entry_path(&args)?;
        if let Some(result) = self.load(&path)? {
            return Ok(result);
        }

        // Fall back to the actual function and store the result
        let result = (self.f)(args);
        write_stashed(&path, &result)?;
        Ok(result)
    }

    /// Like [`call`](Self::call) for fallible functions: errors are returned
    /// unchanged and never stored.
    pub fn try_call<E>(&self, args: A) -> std::result::Result<R, E>
    where
        F: Fn(A) -> std::result::Result<R, E>,
        E: From<StashError>,
    {
        let path = self.entry_path(&args)?;
        if let Some(result) = self.load(&path)? {
            return Ok(result);
        }

        let result = (self.f)(args)?;
        write_stashed(&path, &result)?;
        Ok(result)
    }

    fn load(&self, path: &Path) -> Result<Option<R>> {
        debug!(
            function = self.id.qualname(),
            path = %path.display(),
            "Call will use stash entry"
        );
        match read_stashed::<R>(path) {
            Ok(stashed) => Ok(stashed.map(|s| s.data)),
            Err(StashError::Json(e)) => {
                warn!(error = %e, path = %path.display(), "Discarding unreadable stash entry");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

fn subdirs(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut dirs = Vec::new();
    for item in fs::read_dir(dir)? {
        let item = item?;
        if item.file_type()?.is_dir() {
            dirs.push(item.path());
        }
    }
    Ok(dirs)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    fn stash() -> (TempDir, Stash) {
        let temp_dir = TempDir::new().unwrap();
        let stash = Stash::with_base_dir(temp_dir.path().join("bamboo_stash"));
        (temp_dir, stash)
    }

    fn id(source: &str) -> FunctionId {
        FunctionId::new("tests::f", source)
    }

    #[test]
    fn test_no_args() {
        let (_tmp, stash) = stash();
        let call_count = Cell::new(0);

        let f = stash.wrap(id("four"), |(): ()| {
            call_count.set(call_count.get() + 1);
            4
        });

        assert_eq!(f.call(()).unwrap(), 4);
        assert_eq!(f.call(()).unwrap(), 4);
        assert_eq!(call_count.get(), 1);
    }

    #[test]
    fn test_args() {
        let (_tmp, stash) = stash();
        let call_count = Cell::new(0);

        let f = stash.wrap(id("square"), |(a,): (i64,)| {
            call_count.set(call_count.get() + 1);
            a * a
        });

        assert_eq!(f.call((1,)).unwrap(), 1);
        assert_eq!(f.call((2,)).unwrap(), 4);
        assert_eq!(f.call((2,)).unwrap(), 4);
        assert_eq!(f.call((1,)).unwrap(), 1);
        assert_eq!(call_count.get(), 2);
    }

    #[test]
    fn test_stash_dir_deletion() {
        let (_tmp, stash) = stash();
        let call_count = Cell::new(0);

        let f = stash.wrap(id("four"), |(): ()| {
            call_count.set(call_count.get() + 1);
            4
        });

        assert_eq!(f.call(()).unwrap(), 4);
        assert_eq!(f.call(()).unwrap(), 4);
        assert_eq!(call_count.get(), 1);

        fs::remove_dir_all(stash.base_dir()).unwrap();
        assert_eq!(f.call(()).unwrap(), 4);
        assert_eq!(call_count.get(), 2);
    }

    #[test]
    fn test_table_arg_copy_hits() {
        let (_tmp, stash) = stash();
        let call_count = Cell::new(0);

        let f = stash.wrap(id("table_sum"), |(rows,): (Vec<Vec<i64>>,)| {
            call_count.set(call_count.get() + 1);
            rows.iter().flatten().sum::<i64>()
        });

        let rows = vec![vec![1, 2, 3], vec![4, 5, 6]];
        assert_eq!(f.call((rows.clone(),)).unwrap(), 21);
        assert_eq!(f.call((rows.clone(),)).unwrap(), 21);
        assert_eq!(call_count.get(), 1);
    }

    #[test]
    fn test_persists_across_instances() {
        let (tmp, stash) = stash();
        let first = stash.wrap(id("greeting"), |(name,): (String,)| format!("hello {}", name));
        assert_eq!(first.call(("ada".to_string(),)).unwrap(), "hello ada");

        let reopened = Stash::with_base_dir(tmp.path().join("bamboo_stash"));
        let second = reopened.wrap(id("greeting"), |(_name,): (String,)| -> String {
            panic!("result should come from disk")
        });
        assert_eq!(second.call(("ada".to_string(),)).unwrap(), "hello ada");
    }

    #[test]
    fn test_source_change_gets_new_dir() {
        let (_tmp, stash) = stash();
        let old = stash.wrap(id("fn f() -> i32 { 1 }"), |(): ()| 1);
        let new = stash.wrap(id("fn f() -> i32 { 2 }"), |(): ()| 2);

        assert_ne!(old.function_dir(), new.function_dir());
        assert_eq!(old.call(()).unwrap(), 1);
        assert_eq!(new.call(()).unwrap(), 2);
    }

    #[test]
    fn test_try_call_skips_errors() {
        let (_tmp, stash) = stash();
        let call_count = Cell::new(0);

        let f = stash.wrap_try(id("parse"), |(s,): (String,)| {
            call_count.set(call_count.get() + 1);
            s.parse::<u32>().map_err(|e| Failure::Call(e.to_string()))
        });

        // Err values are not stored, so the function runs every time.
        let bad: std::result::Result<u32, Failure> = f.try_call(("x".to_string(),));
        assert!(matches!(bad, Err(Failure::Call(_))));
        let bad: std::result::Result<u32, Failure> = f.try_call(("x".to_string(),));
        assert!(bad.is_err());
        assert_eq!(call_count.get(), 2);
        assert!(!f.entry_path(&("x".to_string(),)).unwrap().exists());

        let good: std::result::Result<u32, Failure> = f.try_call(("7".to_string(),));
        assert_eq!(good.unwrap(), 7);
        let good: std::result::Result<u32, Failure> = f.try_call(("7".to_string(),));
        assert_eq!(good.unwrap(), 7);
        assert_eq!(call_count.get(), 3);
    }

    #[derive(Debug)]
    enum Failure {
        Call(String),
        #[allow(dead_code)]
        Stash(StashError),
    }

    impl From<StashError> for Failure {
        fn from(e: StashError) -> Self {
            Failure::Stash(e)
        }
    }

    #[test]
    fn test_corrupt_entry_recomputed() {
        let (_tmp, stash) = stash();
        let call_count = Cell::new(0);

        let f = stash.wrap(id("four"), |(): ()| {
            call_count.set(call_count.get() + 1);
            4
        });
        f.call(()).unwrap();

        let path = f.entry_path(&()).unwrap();
        fs::write(&path, "garbage").unwrap();

        assert_eq!(f.call(()).unwrap(), 4);
        assert_eq!(call_count.get(), 2);
        assert_eq!(f.call(()).unwrap(), 4);
        assert_eq!(call_count.get(), 2);
    }

    #[test]
    fn test_non_utf8_entry_recomputed() {
        let (_tmp, stash) = stash();
        let call_count = Cell::new(0);

        let f = stash.wrap(id("four"), |(): ()| {
            call_count.set(call_count.get() + 1);
            4
        });
        f.call(()).unwrap();

        let path = f.entry_path(&()).unwrap();
        fs::write(&path, [0xff, 0xfe, 0x00]).unwrap();

        assert_eq!(f.call(()).unwrap(), 4);
        assert_eq!(call_count.get(), 2);
        assert_eq!(f.call(()).unwrap(), 4);
        assert_eq!(call_count.get(), 2);
    }

    #[test]
    fn test_non_finite_float_args_kept_apart() {
        let (_tmp, stash) = stash();
        let call_count = Cell::new(0);

        let is_nan = stash.wrap(id("is_nan"), |(x,): (f64,)| {
            call_count.set(call_count.get() + 1);
            x.is_nan()
        });

        assert!(!is_nan.call((f64::INFINITY,)).unwrap());
        assert!(is_nan.call((f64::NAN,)).unwrap());
        assert!(!is_nan.call((f64::NEG_INFINITY,)).unwrap());
        assert!(is_nan.call((f64::NAN,)).unwrap());
        assert_eq!(call_count.get(), 3);
    }

    #[test]
    fn test_nested_option_args_kept_apart() {
        let (_tmp, stash) = stash();

        let describe = stash.wrap(id("describe"), |(x,): (Option<Option<i32>>,)| {
            format!("{:?}", x)
        });

        assert_eq!(describe.call((None,)).unwrap(), "None");
        assert_eq!(describe.call((Some(None),)).unwrap(), "Some(None)");
        assert_eq!(describe.call((Some(Some(1)),)).unwrap(), "Some(Some(1))");
    }

    #[test]
    fn test_logs_resolved_base_dir() {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let writer = LogBuffer(buffer.clone());
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::INFO)
            .finish();

        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("logged");
        tracing::subscriber::with_default(subscriber, || {
            let stash = Stash::with_base_dir(&dir);
            assert_eq!(stash.base_dir(), dir);
        });

        let output = String::from_utf8(buffer.lock().unwrap().clone()).unwrap();
        let expected = format!("Data will be cached in {}", dir.display());
        assert!(output.contains(&expected), "log output: {}", output);
    }

    #[derive(Clone)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_forget_and_invalidate() {
        let (_tmp, stash) = stash();
        let call_count = Cell::new(0);

        let f = stash.wrap(id("double"), |(a,): (u8,)| {
            call_count.set(call_count.get() + 1);
            u16::from(a) * 2
        });

        f.call((1,)).unwrap();
        f.call((2,)).unwrap();
        assert!(f.forget(&(1,)).unwrap());
        assert!(!f.forget(&(1,)).unwrap());

        f.call((1,)).unwrap();
        f.call((2,)).unwrap();
        assert_eq!(call_count.get(), 3);

        assert!(f.invalidate().unwrap());
        f.call((2,)).unwrap();
        assert_eq!(call_count.get(), 4);
    }

    #[test]
    fn test_clear_and_functions() {
        let (_tmp, stash) = stash();
        assert!(stash.functions().unwrap().is_empty());
        assert!(!stash.clear().unwrap());

        let square = stash.wrap(FunctionId::new("demo::square", "v1"), |(a,): (i32,)| a * a);
        let negate = stash.wrap(FunctionId::new("demo::negate", "v1"), |(a,): (i32,)| -a);
        square.call((2,)).unwrap();
        square.call((3,)).unwrap();
        negate.call((2,)).unwrap();

        let usage = stash.functions().unwrap();
        assert_eq!(usage.len(), 2);
        assert_eq!(usage[0].name, "demo__negate");
        assert_eq!(usage[0].entries, 1);
        assert_eq!(usage[1].name, "demo__square");
        assert_eq!(usage[1].entries, 2);
        assert_eq!(usage[1].source_digest, square.id().source_digest());
        assert!(usage[1].bytes > 0);

        assert!(stash.clear().unwrap());
        assert!(!stash.base_dir().exists());
        assert!(stash.functions().unwrap().is_empty());
    }

    static MACRO_CALLS: AtomicUsize = AtomicUsize::new(0);

    #[test]
    fn test_stashed_macro() {
        let (_tmp, stash) = stash();

        let add = crate::stashed!(stash, fn add(a: i32, b: i32) -> i32 {
            MACRO_CALLS.fetch_add(1, Ordering::SeqCst);
            a + b
        });

        assert_eq!(add.call((2, 3)).unwrap(), 5);
        assert_eq!(add.call((2, 3)).unwrap(), 5);
        assert_eq!(MACRO_CALLS.load(Ordering::SeqCst), 1);
        assert!(add.id().qualname().ends_with("::add"));
        assert!(add.function_dir().starts_with(stash.base_dir()));
    }

    #[test]
    fn test_stashed_macro_mut_params() {
        let (_tmp, stash) = stash();

        let steps = crate::stashed!(stash, fn steps(mut n: u32, step: u32,) -> u32 {
            let mut count = 0;
            while n >= step {
                n -= step;
                count += 1;
            }
            count
        });

        assert_eq!(steps.call((10, 3)).unwrap(), 3);
        assert_eq!(steps.call((10, 3)).unwrap(), 3);
        assert!(steps.entry_path(&(10, 3)).unwrap().exists());
        assert!(steps.id().qualname().ends_with("::steps"));
    }

    #[test]
    fn test_stashed_macro_no_params() {
        let (_tmp, stash) = stash();

        let answer = crate::stashed!(stash, fn answer() -> u8 { 42 });
        assert_eq!(answer.call(()).unwrap(), 42);
        assert!(answer.entry_path(&()).unwrap().exists());
    }
}
