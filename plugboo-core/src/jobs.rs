use crate::error::{CoreError, CoreResult};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

type JobFuture<T> = Shared<BoxFuture<'static, CoreResult<T>>>;
type InflightMap<T> = Arc<Mutex<HashMap<String, JobFuture<T>>>>;

/// Handle to a background job. Dropping it does not cancel the job.
pub struct JobHandle<T> {
    key: String,
    coalesced: bool,
    fut: JobFuture<T>,
}

impl<T> std::fmt::Debug for JobHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobHandle").field("key", &self.key).field("coalesced", &self.coalesced).finish()
    }
}

impl<T: Clone> JobHandle<T> {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// True when this request attached to a job that was already running.
    pub fn is_coalesced(&self) -> bool {
        self.coalesced
    }

    pub async fn wait(self) -> CoreResult<T> {
        self.fut.await
    }
}

/// In-flight jobs keyed by what they work on. A second `spawn` for a key that is still
/// running returns a handle to the existing job instead of starting another one.
pub struct JobRegistry<T> {
    inflight: InflightMap<T>,
}

impl<T> Clone for JobRegistry<T> {
    fn clone(&self) -> Self {
        Self { inflight: Arc::clone(&self.inflight) }
    }
}

impl<T> Default for JobRegistry<T> {
    fn default() -> Self {
        Self { inflight: Arc::new(Mutex::new(HashMap::new())) }
    }
}

struct ReleaseKey<T> {
    inflight: InflightMap<T>,
    key: String,
}

impl<T> Drop for ReleaseKey<T> {
    fn drop(&mut self) {
        self.inflight.lock().remove(&self.key);
    }
}

impl<T: Clone + Send + Sync + 'static> JobRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Must be called from within a tokio runtime.
    pub fn spawn<F>(&self, key: impl Into<String>, job: F) -> JobHandle<T>
    where
        F: Future<Output = CoreResult<T>> + Send + 'static,
    {
        let key = key.into();
        let mut map = self.inflight.lock();
        if let Some(existing) = map.get(&key) {
            debug!("joining in-flight job {}", key);
            return JobHandle { key, coalesced: true, fut: existing.clone() };
        }

        // The key is released even if the job panics.
        let release = ReleaseKey { inflight: Arc::clone(&self.inflight), key: key.clone() };
        let task = tokio::spawn(async move {
            let _release = release;
            job.await
        });
        let fut: JobFuture<T> = async move {
            match task.await {
                Ok(out) => out,
                Err(e) => Err(CoreError::TaskFailed(e.to_string())),
            }
        }
        .boxed()
        .shared();
        map.insert(key.clone(), fut.clone());
        JobHandle { key, coalesced: false, fut }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inflight.lock().contains_key(key)
    }

    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        let mut keys: Vec<String> = self.inflight.lock().keys().filter(|k| k.starts_with(prefix)).cloned().collect();
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn duplicate_key_attaches_to_running_job() {
        let registry: JobRegistry<u32> = JobRegistry::new();
        let runs = Arc::new(AtomicUsize::new(0));

        let r1 = Arc::clone(&runs);
        let first = registry.spawn("mod:p:123", async move {
            r1.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            Ok(7)
        });
        let r2 = Arc::clone(&runs);
        let second = registry.spawn("mod:p:123", async move {
            r2.fetch_add(1, Ordering::SeqCst);
            Ok(8)
        });

        assert!(!first.is_coalesced());
        assert!(second.is_coalesced());
        assert_eq!(registry.keys_with_prefix("mod:p:"), vec!["mod:p:123".to_string()]);
        assert_eq!(first.wait().await.unwrap(), 7);
        assert_eq!(second.wait().await.unwrap(), 7);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(!registry.contains("mod:p:123"));
    }

    #[tokio::test]
    async fn handle_debug_shows_key_and_coalescing() {
        let registry: JobRegistry<u32> = JobRegistry::new();
        let first = registry.spawn("loader:p", async { Ok(1) });
        let second = registry.spawn("loader:p", async { Ok(2) });
        assert_eq!(format!("{first:?}"), r#"JobHandle { key: "loader:p", coalesced: false }"#);
        assert_eq!(format!("{second:?}"), r#"JobHandle { key: "loader:p", coalesced: true }"#);
        let failed: CoreResult<JobHandle<u32>> = Err(CoreError::NameCannotBeEmpty);
        assert_eq!(failed.unwrap_err().reason(), "NAME_CANNOT_BE_EMPTY");
        assert_eq!(first.wait().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn finished_key_can_run_again() {
        let registry: JobRegistry<u32> = JobRegistry::new();
        assert_eq!(registry.spawn("k", async { Ok(1) }).wait().await.unwrap(), 1);
        let again = registry.spawn("k", async { Ok(2) });
        assert!(!again.is_coalesced());
        assert_eq!(again.wait().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn panicking_job_reports_task_failure_and_releases_key() {
        let registry: JobRegistry<u32> = JobRegistry::new();
        let handle = registry.spawn("boom", async {
            if true {
                panic!("job exploded");
            }
            Ok(0)
        });
        let err = handle.wait().await.unwrap_err();
        assert_eq!(err.reason(), "TASK_FAILED");
        assert!(!registry.contains("boom"));
    }
}
