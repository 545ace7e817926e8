//! Host capabilities the handler depends on.
//!
//! Time and "where am I" are injected so that extraction, statistics and id
//! generation can be driven deterministically in tests.

use std::sync::Mutex;

use chrono::{DateTime, Duration as ChronoDuration, Utc};

/// Provides the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Moves the clock forward by `by`.
    pub fn advance(&self, by: ChronoDuration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Location and client description of the place a fault was observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Site {
    pub url: String,
    pub user_agent: String,
}

impl Site {
    pub fn new(url: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            user_agent: user_agent.into(),
        }
    }
}

/// Captures the current [`Site`].
pub trait SiteProbe: Send + Sync {
    fn capture(&self) -> Site;
}

/// Describes the running process: `process://<exe>/<pid>` and a
/// `faultline/<version> (<os>; <arch>)` agent string.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessSite;

impl SiteProbe for ProcessSite {
    fn capture(&self) -> Site {
        let exe = std::env::current_exe()
            .ok()
            .and_then(|path| path.file_name().map(|n| n.to_string_lossy().into_owned()))
            .unwrap_or_else(|| "unknown".to_string());
        Site {
            url: format!("process://{}/{}", exe, std::process::id()),
            user_agent: format!(
                "faultline/{} ({}; {})",
                env!("CARGO_PKG_VERSION"),
                std::env::consts::OS,
                std::env::consts::ARCH
            ),
        }
    }
}

/// A probe whose site can be swapped at runtime. Used by tests and by hosts
/// that track a "current location" themselves (e.g. the active request path).
#[derive(Debug)]
pub struct FixedSite {
    site: Mutex<Site>,
}

impl FixedSite {
    pub fn new(url: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            site: Mutex::new(Site::new(url, user_agent)),
        }
    }

    /// Changes the URL reported by later captures.
    pub fn navigate(&self, url: impl Into<String>) {
        self.site.lock().unwrap_or_else(|e| e.into_inner()).url = url.into();
    }
}

impl SiteProbe for FixedSite {
    fn capture(&self) -> Site {
        self.site.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}
