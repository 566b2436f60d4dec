use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use taskrow_core::TaskArgs;

/// What a callable produces: one string value, or an error message
pub type CallableResult = Result<String, String>;

type SingleFn = Arc<dyn Fn(&TaskArgs) -> CallableResult + Send + Sync>;
type StreamingFn =
    Arc<dyn Fn(&TaskArgs) -> Box<dyn Iterator<Item = CallableResult> + Send> + Send + Sync>;

/// A registered unit of work.
///
/// Single-value callables return one string. Streaming callables return a
/// lazy, finite, non-restartable sequence of chunks; each chunk is appended
/// to the task's output and persisted as it is produced.
#[derive(Clone)]
pub enum Callable {
    Single(SingleFn),
    Streaming(StreamingFn),
}

/// Registry mapping dotted callable names to functions.
///
/// Populated at worker startup in both the poll-loop process and the
/// execution subprocess; a name missing here is a typed failure recorded on
/// the task, never a crash.
#[derive(Default)]
pub struct CallableRegistry {
    callables: RwLock<HashMap<String, Callable>>,
}

impl CallableRegistry {
    pub fn new() -> Self {
        CallableRegistry {
            callables: RwLock::new(HashMap::new()),
        }
    }

    /// Register a single-value callable
    pub fn register_fn<F>(&self, name: impl Into<String>, callable: F)
    where
        F: Fn(&TaskArgs) -> CallableResult + Send + Sync + 'static,
    {
        self.callables
            .write()
            .insert(name.into(), Callable::Single(Arc::new(callable)));
    }

    /// Register a streaming (multi-chunk) callable
    pub fn register_streaming<F>(&self, name: impl Into<String>, callable: F)
    where
        F: Fn(&TaskArgs) -> Box<dyn Iterator<Item = CallableResult> + Send>
            + Send
            + Sync
            + 'static,
    {
        self.callables
            .write()
            .insert(name.into(), Callable::Streaming(Arc::new(callable)));
    }

    pub fn get(&self, name: &str) -> Option<Callable> {
        self.callables.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.callables.read().contains_key(name)
    }

    /// All registered callable names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.callables.read().keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let registry = CallableRegistry::new();
        registry.register_fn("reports.daily", |_| Ok("done".into()));
        registry.register_streaming("reports.pages", |_| {
            Box::new((0..2).map(|i| Ok(format!("page {i}"))))
        });

        assert!(registry.contains("reports.daily"));
        assert!(!registry.contains("reports.monthly"));
        assert_eq!(registry.names(), vec!["reports.daily", "reports.pages"]);

        match registry.get("reports.daily") {
            Some(Callable::Single(f)) => assert_eq!(f(&TaskArgs::new()), Ok("done".into())),
            _ => panic!("expected single-value callable"),
        }

        match registry.get("reports.pages") {
            Some(Callable::Streaming(f)) => {
                let chunks: Vec<_> = f(&TaskArgs::new()).collect();
                assert_eq!(chunks, vec![Ok("page 0".into()), Ok("page 1".into())]);
            }
            _ => panic!("expected streaming callable"),
        }
    }
}
