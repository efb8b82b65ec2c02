//! Initialization watchdog
//!
//! Tracks three readiness stages (auth, connection, profile) and flags any
//! stage that stays loading past its threshold. Each loading episode arms one
//! timer; leaving loading cancels it and clears the slow flag at once.
//!
//! ```text
//! NotLoading ──load──▶ Loading ──threshold──▶ Loading + Slow
//!     ▲                   │                        │
//!     └──── done/error ───┴────────────────────────┘
//! ```

use agora_core::WatchdogConfig;
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Readiness stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Identity provider bootstrap
    Auth,
    /// Connection handle construction
    Connection,
    /// Caller profile fetch
    Profile,
}

impl Stage {
    /// Every stage, in readiness order
    pub const ALL: [Stage; 3] = [Stage::Auth, Stage::Connection, Stage::Profile];

    /// Slow threshold for this stage
    #[must_use]
    pub fn threshold(self, config: &WatchdogConfig) -> Duration {
        Duration::from_millis(match self {
            Self::Auth => config.auth_ms,
            Self::Connection => config.connection_ms,
            Self::Profile => config.profile_ms,
        })
    }

    /// Stable name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Connection => "connection",
            Self::Profile => "profile",
        }
    }

    fn index(self) -> usize {
        match self {
            Self::Auth => 0,
            Self::Connection => 1,
            Self::Profile => 2,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flags for one stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StageStatus {
    /// Stage is loading
    pub is_loading: bool,
    /// Loading has outlasted the threshold (implies `is_loading`)
    pub is_slow: bool,
    /// Stage failed
    pub is_error: bool,
}

/// Aggregated watchdog output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WatchdogReport {
    /// Identity provider
    pub auth: StageStatus,
    /// Connection handle
    pub connection: StageStatus,
    /// Caller profile
    pub profile: StageStatus,
}

impl WatchdogReport {
    /// Flags for `stage`
    #[must_use]
    pub fn stage(&self, stage: Stage) -> StageStatus {
        match stage {
            Stage::Auth => self.auth,
            Stage::Connection => self.connection,
            Stage::Profile => self.profile,
        }
    }

    fn stage_mut(&mut self, stage: Stage) -> &mut StageStatus {
        match stage {
            Stage::Auth => &mut self.auth,
            Stage::Connection => &mut self.connection,
            Stage::Profile => &mut self.profile,
        }
    }

    /// Any stage slow
    #[must_use]
    pub fn is_slow(&self) -> bool {
        Stage::ALL.iter().any(|s| self.stage(*s).is_slow)
    }

    /// Any stage failed
    #[must_use]
    pub fn has_error(&self) -> bool {
        Stage::ALL.iter().any(|s| self.stage(*s).is_error)
    }

    /// User-facing notice, if anything needs one
    ///
    /// Errors take precedence over slowness; within each, earlier stages win.
    #[must_use]
    pub fn notice(&self) -> Option<Notice> {
        if self.has_error() {
            let message = if self.auth.is_error {
                "Failed to initialize authentication. Please try signing in again."
            } else if self.connection.is_error {
                "Failed to connect to the backend service. Please check your connection and try again."
            } else {
                "Failed to load your profile. You can still browse public pages."
            };
            return Some(Notice {
                severity: Severity::Error,
                message,
            });
        }
        if self.is_slow() {
            let message = if self.auth.is_slow {
                "Authentication is taking longer than expected. Please wait or reload the page."
            } else if self.connection.is_slow {
                "Connecting to the backend is taking longer than expected. Please wait or reload the page."
            } else {
                "Loading your profile is taking longer than expected. You can still browse public pages."
            };
            return Some(Notice {
                severity: Severity::Slow,
                message,
            });
        }
        None
    }
}

/// Notice severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Offer retry and reload
    Error,
    /// Offer reload
    Slow,
}

/// Banner content derived from a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Notice {
    /// Severity
    pub severity: Severity,
    /// Message text
    pub message: &'static str,
}

/// Raw stage inputs sampled from the identity, handle and profile state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageInputs {
    /// Identity provider bootstrapping
    pub auth_loading: bool,
    /// Last login failed
    pub auth_error: bool,
    /// Handle under construction
    pub connection_loading: bool,
    /// Handle construction failed
    pub connection_error: bool,
    /// Profile loading
    pub profile_loading: bool,
    /// Profile fetch failed
    pub profile_error: bool,
    /// Caller authenticated (arms the profile stage)
    pub authenticated: bool,
}

#[derive(Default)]
struct Episode {
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

struct WatchdogInner {
    config: WatchdogConfig,
    report: watch::Sender<WatchdogReport>,
    episodes: Mutex<[Episode; 3]>,
}

/// Per-stage slow detector
#[derive(Clone)]
pub struct Watchdog {
    inner: Arc<WatchdogInner>,
}

impl Watchdog {
    /// Create watchdog with thresholds
    #[must_use]
    pub fn new(config: WatchdogConfig) -> Self {
        let (report, _) = watch::channel(WatchdogReport::default());
        Self {
            inner: Arc::new(WatchdogInner {
                config,
                report,
                episodes: Mutex::new(Default::default()),
            }),
        }
    }

    /// Current report
    #[must_use]
    pub fn report(&self) -> WatchdogReport {
        *self.inner.report.borrow()
    }

    /// Report change notifications
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<WatchdogReport> {
        self.inner.report.subscribe()
    }

    /// Feed a full sample of stage inputs
    ///
    /// The profile stage only counts while authenticated.
    pub fn observe(&self, inputs: StageInputs) {
        self.update(Stage::Auth, inputs.auth_loading, inputs.auth_error);
        self.update(
            Stage::Connection,
            inputs.connection_loading,
            inputs.connection_error,
        );
        let armed = inputs.authenticated;
        self.update(
            Stage::Profile,
            armed && inputs.profile_loading,
            armed && inputs.profile_error,
        );
    }

    /// Set loading and error flags for one stage
    pub fn update(&self, stage: Stage, loading: bool, error: bool) {
        let mut episodes = self.inner.episodes.lock();
        let episode = &mut episodes[stage.index()];
        let was_loading = self.inner.report.borrow().stage(stage).is_loading;

        if loading && !was_loading {
            episode.generation += 1;
            if let Some(stale) = episode.timer.take() {
                stale.abort();
            }
            let threshold = stage.threshold(&self.inner.config);
            debug!(stage = %stage, threshold_ms = threshold.as_millis(), "stage loading");
            episode.timer = Some(spawn_timer(
                Arc::downgrade(&self.inner),
                stage,
                episode.generation,
                threshold,
            ));
        } else if !loading && was_loading {
            episode.generation += 1;
            if let Some(timer) = episode.timer.take() {
                timer.abort();
            }
            debug!(stage = %stage, error, "stage settled");
        }

        self.inner.report.send_if_modified(|report| {
            let status = report.stage_mut(stage);
            let next = StageStatus {
                is_loading: loading,
                is_slow: loading && status.is_slow,
                is_error: error,
            };
            let changed = *status != next;
            *status = next;
            changed
        });
    }
}

impl fmt::Debug for Watchdog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watchdog")
            .field("config", &self.inner.config)
            .field("report", &self.report())
            .finish()
    }
}

impl Drop for WatchdogInner {
    fn drop(&mut self) {
        for episode in self.episodes.get_mut().iter_mut() {
            if let Some(timer) = episode.timer.take() {
                timer.abort();
            }
        }
    }
}

fn spawn_timer(
    inner: Weak<WatchdogInner>,
    stage: Stage,
    generation: u64,
    threshold: Duration,
) -> JoinHandle<()> {
    let deadline = Instant::now() + threshold;
    tokio::spawn(async move {
        tokio::time::sleep_until(deadline).await;
        let Some(inner) = inner.upgrade() else {
            return;
        };
        let episodes = inner.episodes.lock();
        if episodes[stage.index()].generation != generation {
            return;
        }
        let fired = inner.report.send_if_modified(|report| {
            let status = report.stage_mut(stage);
            if status.is_loading && !status.is_slow {
                status.is_slow = true;
                true
            } else {
                false
            }
        });
        drop(episodes);
        if fired {
            warn!(
                stage = %stage,
                threshold_ms = threshold.as_millis(),
                "initialization stage is taking longer than expected"
            );
        }
    })
}
