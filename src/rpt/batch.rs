//! Batch processing of many containers.
//!
//! Containers share nothing, so each file is one task on a small scoped
//! worker pool. Cancellation (explicit or by timeout) stops new files from
//! being started; files already in progress run to completion.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use super::types::error::{Result, RptError};

/// Shared flag that stops a batch from starting further files.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Worker threads; zero means one per available CPU.
    pub workers: usize,
    /// Stop starting new files once this much time has passed.
    pub timeout: Option<Duration>,
    pub cancel: CancelToken,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            workers: 0,
            timeout: None,
            cancel: CancelToken::new(),
        }
    }
}

/// Per-file outcome, in input order.
#[derive(Debug)]
pub struct BatchItem<T> {
    pub path: PathBuf,
    pub result: Result<T>,
}

/// Runs `job` on every path and collects the outcomes in input order.
///
/// Errors from one file never stop the others. Files not started before
/// cancellation report [`RptError::Cancelled`].
pub fn run<T, F>(paths: &[PathBuf], options: &BatchOptions, job: F) -> Vec<BatchItem<T>>
where
    T: Send,
    F: Fn(&Path) -> Result<T> + Sync,
{
    let workers = match options.workers {
        0 => thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
        n => n,
    }
    .min(paths.len())
    .max(1);
    info!("Processing {} containers on {} workers", paths.len(), workers);

    let deadline = options.timeout.map(|t| Instant::now() + t);
    let next = AtomicUsize::new(0);
    let slots: Vec<Mutex<Option<Result<T>>>> = paths.iter().map(|_| Mutex::new(None)).collect();

    thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| loop {
                if options.cancel.is_cancelled() {
                    break;
                }
                if deadline.is_some_and(|d| Instant::now() >= d) {
                    warn!("Batch timeout reached; remaining files are abandoned");
                    options.cancel.cancel();
                    break;
                }
                let i = next.fetch_add(1, Ordering::SeqCst);
                let Some(path) = paths.get(i) else { break };
                debug!("Worker picked {}", path.display());
                let outcome = job(path);
                if let Ok(mut slot) = slots[i].lock() {
                    *slot = Some(outcome);
                }
            });
        }
    });

    paths
        .iter()
        .zip(slots)
        .map(|(path, slot)| BatchItem {
            path: path.clone(),
            result: slot
                .into_inner()
                .ok()
                .flatten()
                .unwrap_or(Err(RptError::Cancelled)),
        })
        .collect()
}

/// Container files directly inside `dir` (extension `.rpt`, any case), sorted.
pub fn discover(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    let mut found = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_container = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("rpt"));
        if is_container && path.is_file() {
            found.push(path);
        }
    }
    found.sort();
    debug!("Found {} containers in {}", found.len(), dir.display());
    Ok(found)
}

/// Reads an externally produced list of container paths, one per line.
/// Relative entries resolve against the list's directory.
pub fn read_path_list(list: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let list = list.as_ref();
    let base = list.parent().unwrap_or_else(|| Path::new(""));
    let text = fs::read_to_string(list)?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(|l| {
            let p = PathBuf::from(l);
            if p.is_absolute() {
                p
            } else {
                base.join(p)
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(n: usize) -> Vec<PathBuf> {
        (0..n).map(|i| PathBuf::from(format!("f{i}.rpt"))).collect()
    }

    #[test]
    fn results_keep_input_order_and_isolate_errors() {
        let options = BatchOptions {
            workers: 3,
            ..Default::default()
        };
        let items = run(&paths(7), &options, |p| {
            if p == Path::new("f3.rpt") {
                Err(RptError::Format("bad".into()))
            } else {
                Ok(p.to_string_lossy().len())
            }
        });
        assert_eq!(items.len(), 7);
        assert_eq!(items[0].path, PathBuf::from("f0.rpt"));
        assert!(items[3].result.is_err());
        assert_eq!(items.iter().filter(|i| i.result.is_ok()).count(), 6);
    }

    #[test]
    fn cancelled_batch_starts_nothing() {
        let options = BatchOptions::default();
        options.cancel.cancel();
        let items = run(&paths(3), &options, |_| Ok(()));
        assert!(items
            .iter()
            .all(|i| matches!(i.result, Err(RptError::Cancelled))));
    }

    #[test]
    fn zero_timeout_abandons_remaining_files() {
        let options = BatchOptions {
            workers: 1,
            timeout: Some(Duration::ZERO),
            ..Default::default()
        };
        let items = run(&paths(2), &options, |_| Ok(()));
        assert!(items.iter().all(|i| i.result.is_err()));
        assert!(options.cancel.is_cancelled());
    }
}
