use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

/// Pushes the wakeup just past the window edge so the freed slot is
/// actually free when the caller records its call.
const WAIT_BUFFER: Duration = Duration::from_millis(100);

struct Budget {
    max_calls: usize,
    window: Duration,
    /// Timestamps of recorded calls, oldest first. The mutex is held across
    /// prune, wait, and append: the whole read-modify-write is one critical
    /// section, so concurrent callers queue FIFO and cannot double-book the
    /// quota. There is no cap on how long a caller may queue here.
    history: tokio::sync::Mutex<VecDeque<Instant>>,
}

/// Sliding-window call budgeting per named external resource.
///
/// Resources without a registered limit pass through untouched.
pub struct RateLimiter {
    budgets: Mutex<HashMap<String, Arc<Budget>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            budgets: Mutex::new(HashMap::new()),
        }
    }

    /// Register a call budget for a named resource. Re-registering replaces
    /// the rule and clears the recorded history.
    pub fn add_limit(&self, name: &str, max_calls: usize, window_seconds: u64) {
        let budget = Arc::new(Budget {
            max_calls,
            window: Duration::from_secs(window_seconds),
            history: tokio::sync::Mutex::new(VecDeque::new()),
        });
        self.budgets
            .lock()
            .unwrap()
            .insert(name.to_string(), budget);
        debug!(resource = name, max_calls, window_seconds, "Rate limit registered");
    }

    /// Suspend until the named resource has quota for one more call, then
    /// record the call. No-op for unregistered names.
    pub async fn wait_if_needed(&self, name: &str) {
        let budget = {
            let budgets = self.budgets.lock().unwrap();
            budgets.get(name).cloned()
        };
        let Some(budget) = budget else {
            return;
        };

        let mut history = budget.history.lock().await;
        prune(&mut history, budget.window);

        if history.len() >= budget.max_calls {
            if let Some(oldest) = history.front() {
                let elapsed = Instant::now().duration_since(*oldest);
                let wait = budget.window.saturating_sub(elapsed) + WAIT_BUFFER;
                warn!(
                    resource = name,
                    wait_ms = wait.as_millis() as u64,
                    "Rate limit saturated, waiting"
                );
                tokio::time::sleep(wait).await;
                prune(&mut history, budget.window);
            }
        }

        history.push_back(Instant::now());
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

/// Drop recorded calls older than the window.
fn prune(history: &mut VecDeque<Instant>, window: Duration) {
    let now = Instant::now();
    while let Some(front) = history.front() {
        if now.duration_since(*front) >= window {
            history.pop_front();
        } else {
            break;
        }
    }
}
