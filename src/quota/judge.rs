//! Judges and the judge registry.
//!
//! A judge contributes one counter command to the validation batch and later
//! decides pass/fail from that command's reply. The registry is a fixed table
//! built at startup; judges run in registration order.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::apps::AppInfo;
use crate::quota::store::{CounterCommand, PendingReply};

/// Pluggable quota rule.
pub trait Judge: Send + Sync {
    /// Stable identifier, also used in counter keys and error messages.
    fn id(&self) -> &'static str;

    /// Counter operation to queue for this caller.
    fn command(&self, app: &AppInfo, now: SystemTime) -> CounterCommand;

    /// True if `count` (the counter value after increment) is within the caller's limit.
    fn judge(&self, app: &AppInfo, count: i64) -> bool;
}

/// Fixed-window request quota.
#[derive(Debug, Clone)]
pub struct WindowQuotaJudge {
    id: &'static str,
    window: Duration,
    limit: fn(&AppInfo) -> u64,
}

impl WindowQuotaJudge {
    pub fn new(id: &'static str, window: Duration, limit: fn(&AppInfo) -> u64) -> Self {
        Self { id, window, limit }
    }

    /// Calls per calendar day (UTC).
    pub fn daily() -> Self {
        Self::new("daily", Duration::from_secs(86_400), |app| app.daily_limit)
    }

    /// Calls per clock minute.
    pub fn minutely() -> Self {
        Self::new("minutely", Duration::from_secs(60), |app| app.minutely_limit)
    }

    fn window_index(&self, now: SystemTime) -> u64 {
        let secs = now.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
        secs / self.window.as_secs().max(1)
    }
}

impl Judge for WindowQuotaJudge {
    fn id(&self) -> &'static str {
        self.id
    }

    fn command(&self, app: &AppInfo, now: SystemTime) -> CounterCommand {
        CounterCommand {
            key: format!("quota:{}:{}:{}", self.id, app.key, self.window_index(now)),
            window: self.window,
        }
    }

    fn judge(&self, app: &AppInfo, count: i64) -> bool {
        count >= 0 && (count as u64) <= (self.limit)(app)
    }
}

type JudgeFactory = fn() -> Arc<dyn Judge>;

fn daily_judge() -> Arc<dyn Judge> {
    Arc::new(WindowQuotaJudge::daily())
}

fn minutely_judge() -> Arc<dyn Judge> {
    Arc::new(WindowQuotaJudge::minutely())
}

/// Every judge the gateway knows by id.
const BUILTIN_JUDGES: &[(&str, JudgeFactory)] = &[
    ("daily", daily_judge),
    ("minutely", minutely_judge),
];

/// Ordered set of judges evaluated for every request.
#[derive(Clone, Default)]
pub struct JudgeRegistry {
    judges: Vec<Arc<dyn Judge>>,
}

impl JudgeRegistry {
    /// Registry from explicit judge instances, in evaluation order.
    pub fn new(judges: Vec<Arc<dyn Judge>>) -> Self {
        Self { judges }
    }

    /// Registry from builtin ids. Returns the first unknown id on failure.
    pub fn from_ids(ids: &[String]) -> Result<Self, String> {
        let mut judges = Vec::with_capacity(ids.len());
        for id in ids {
            let factory = BUILTIN_JUDGES
                .iter()
                .find(|(name, _)| *name == id.as_str())
                .map(|(_, factory)| factory)
                .ok_or_else(|| id.clone())?;
            judges.push(factory());
        }
        Ok(Self { judges })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Judge>> {
        self.judges.iter()
    }

    pub fn ids(&self) -> Vec<&'static str> {
        self.judges.iter().map(|j| j.id()).collect()
    }

    pub fn len(&self) -> usize {
        self.judges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.judges.is_empty()
    }
}

/// Pending replies for one request, keyed by judge in registration order.
///
/// Consumed by value, so the evaluation loop can only walk it once.
#[derive(Default)]
pub struct JudgeResultSet {
    entries: Vec<(Arc<dyn Judge>, PendingReply)>,
}

impl JudgeResultSet {
    pub fn push(&mut self, judge: Arc<dyn Judge>, reply: PendingReply) {
        self.entries.push((judge, reply));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl IntoIterator for JudgeResultSet {
    type Item = (Arc<dyn Judge>, PendingReply);
    type IntoIter = std::vec::IntoIter<Self::Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
