// coverme/src/utils/context.rs
use chrono::{Local, NaiveDateTime};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Source of wall-clock time for name expansion and archive timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Local wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Always returns the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

/// Everything name expansion needs from the outside world: a clock and a
/// snapshot of the process environment taken once at startup.
#[derive(Clone)]
pub struct RunContext {
    clock: Arc<dyn Clock>,
    env: BTreeMap<String, String>,
}

impl RunContext {
    pub fn new(clock: impl Clock + 'static, env: BTreeMap<String, String>) -> Self {
        Self {
            clock: Arc::new(clock),
            env,
        }
    }

    /// System clock plus the current process environment.
    pub fn from_process() -> Self {
        // Non-UTF-8 variables cannot be referenced from a pattern anyway.
        let env = std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .collect();
        Self::new(SystemClock, env)
    }

    /// Fixed clock and the given environment.
    pub fn fixed(now: NaiveDateTime, env: BTreeMap<String, String>) -> Self {
        Self::new(FixedClock(now), env)
    }

    pub fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }

    pub fn env_var(&self, key: &str) -> Option<&str> {
        self.env.get(key).map(String::as_str)
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("now", &self.now())
            .field("env_vars", &self.env.len())
            .finish()
    }
}
