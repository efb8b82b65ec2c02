//! Session simulator
//!
//! Drives a [`CommunityClient`] through a scripted session against the
//! in-memory backend: anonymous browsing, login, onboarding, chat and
//! moderation. Connection latency and failures can be injected to exercise
//! the initialization watchdog.

use crate::memory::{MemoryConnector, MemoryStore, CONNECT};
use agora_client::{AccessDecision, CommunityClient, IdentityAdapter, Notice, Stage, WatchdogReport};
use agora_core::{ClientConfig, Identity, PrincipalId};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Simulator configuration
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Members seeded before the session starts
    pub members: usize,
    /// Messages posted by the signed-in member
    pub messages: usize,
    /// Latency of every connection attempt
    pub connect_latency: Duration,
    /// Connection attempts that fail before one succeeds
    pub connect_failures: usize,
    /// Client configuration
    pub client: ClientConfig,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            members: 5,
            messages: 3,
            connect_latency: Duration::ZERO,
            connect_failures: 0,
            client: ClientConfig::default(),
        }
    }
}

/// Outcome of one scripted step
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub name: &'static str,
    pub ok: bool,
    pub detail: String,
    pub elapsed_ms: u64,
}

/// Session report
#[derive(Debug, Clone, Serialize)]
pub struct SimulatorReport {
    pub steps: Vec<StepRecord>,
    /// Banner notices in the order they appeared
    pub notices: Vec<Notice>,
    pub watchdog: WatchdogReport,
    pub backend_calls: BTreeMap<String, u64>,
    pub cached_entries: usize,
}

impl SimulatorReport {
    /// Every step succeeded
    #[must_use]
    pub fn passed(&self) -> bool {
        self.steps.iter().all(|s| s.ok)
    }

    /// Step by name
    #[must_use]
    pub fn step(&self, name: &str) -> Option<&StepRecord> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// JSON rendering
    ///
    /// # Errors
    /// Serialization failure.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    #[must_use]
    pub fn generate_text(&self) -> String {
        let mut report = String::new();

        report.push_str("=== Agora Session Report ===\n\n");
        for (i, step) in self.steps.iter().enumerate() {
            report.push_str(&format!(
                "{}. {:<22} {:>4} {:>6} ms  {}\n",
                i + 1,
                step.name,
                if step.ok { "ok" } else { "FAIL" },
                step.elapsed_ms,
                step.detail
            ));
        }

        if !self.notices.is_empty() {
            report.push_str("\n=== Notices ===\n");
            for notice in &self.notices {
                report.push_str(&format!("[{:?}] {}\n", notice.severity, notice.message));
            }
        }

        report.push_str("\n=== Watchdog ===\n");
        for stage in Stage::ALL {
            let status = self.watchdog.stage(stage);
            report.push_str(&format!(
                "{:<12} loading={} slow={} error={}\n",
                stage.as_str(),
                status.is_loading,
                status.is_slow,
                status.is_error
            ));
        }

        report.push_str("\n=== Backend Calls ===\n");
        for (op, calls) in &self.backend_calls {
            report.push_str(&format!("{op:<36} {calls}\n"));
        }
        report.push_str(&format!("\nCached entries: {}\n", self.cached_entries));

        report.push_str(&format!(
            "\n=== Result: {} ===\n",
            if self.passed() { "PASS" } else { "FAIL" }
        ));

        report
    }
}

struct Recorder {
    steps: Vec<StepRecord>,
}

impl Recorder {
    async fn step<T, E, F>(&mut self, name: &'static str, fut: F) -> Option<T>
    where
        E: Display,
        F: Future<Output = Result<T, E>>,
    {
        let started = Instant::now();
        let result = fut.await;
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let (ok, detail, value) = match result {
            Ok(value) => (true, String::new(), Some(value)),
            Err(e) => (false, e.to_string(), None),
        };
        tracing::info!(step = name, ok, elapsed_ms, "simulator step");
        self.steps.push(StepRecord {
            name,
            ok,
            detail,
            elapsed_ms,
        });
        value
    }

    fn check(&mut self, name: &'static str, ok: bool, detail: impl Into<String>) {
        self.steps.push(StepRecord {
            name,
            ok,
            detail: detail.into(),
            elapsed_ms: 0,
        });
    }
}

fn seed(store: &MemoryStore, config: &SimulatorConfig) -> PrincipalId {
    let admin = PrincipalId::new("admin-principal");
    store.grant_admin(&admin);
    for i in 1..=config.members {
        let member = PrincipalId::new(format!("member-{i}"));
        store.seed_member(&member, &format!("Member {i}"));
        store.seed_message(&member, &format!("hello from member {i}"), true);
    }
    admin
}

/// Run the scripted session
pub async fn run_session(config: SimulatorConfig) -> SimulatorReport {
    let connector = MemoryConnector::default();
    let store = connector.store().clone();
    let admin = seed(&store, &config);
    if !config.connect_latency.is_zero() {
        store.set_latency(CONNECT, config.connect_latency);
    }
    if config.connect_failures > 0 {
        store.fail_times(CONNECT, config.connect_failures, "IC0503: replica unavailable");
    }

    let auth = IdentityAdapter::initializing();
    let client = CommunityClient::new(Arc::new(connector), auth.clone(), config.client.clone());
    let notices = Arc::new(Mutex::new(Vec::new()));
    let collector = tokio::spawn(collect_notices(client.clone(), notices.clone()));
    let mut rec = Recorder { steps: Vec::new() };

    auth.bootstrap_finished(None);
    connect(&mut rec, &client, "anonymous connect").await;
    rec.step("browse messages", client.visible_messages().fetch()).await;
    rec.step("browse leaderboard", client.leaderboard().fetch()).await;

    auth.login_started();
    auth.login_succeeded(Identity::new("visitor-principal"));
    connect(&mut rec, &client, "member connect").await;
    rec.step("register", client.register_user()).await;
    rec.step("complete onboarding", client.complete_onboarding()).await;
    rec.step("load profile", client.current_user_profile().refetch()).await;
    let decision = client.require_onboarding();
    rec.check("onboarding guard", decision == AccessDecision::Allow, format!("{decision:?}"));

    for i in 0..config.messages {
        rec.step("post message", client.post_message(format!("message {i}")))
            .await;
    }

    auth.logout();
    auth.login_started();
    auth.login_succeeded(Identity::new(admin.as_str()));
    connect(&mut rec, &client, "admin connect").await;
    let decision = {
        let _ = client.is_admin().fetch().await;
        client.require_admin()
    };
    rec.check("admin guard", decision == AccessDecision::Allow, format!("{decision:?}"));

    if let Some(all) = rec.step("load moderation queue", client.all_messages().fetch()).await {
        for message in all.iter().filter(|m| !m.approved) {
            rec.step("approve message", client.approve_message(message.id))
                .await;
        }
    }
    if let Some(visible) = rec.step("reload messages", client.visible_messages().fetch()).await {
        let expected = config.members + config.messages;
        rec.check(
            "messages visible",
            visible.len() == expected,
            format!("{} of {expected}", visible.len()),
        );
        if let Some(first) = visible.first() {
            rec.step("vote", client.vote_message(first.id)).await;
        }
        if let Some(last) = visible.last() {
            rec.step("remove message", client.remove_message(last.id))
                .await;
        }
    }

    collector.abort();
    let notices = notices.lock().clone();
    SimulatorReport {
        steps: rec.steps,
        notices,
        watchdog: client.watchdog().report(),
        backend_calls: store.call_counts(),
        cached_entries: client.cache().stats().entry_count,
    }
}

async fn connect(rec: &mut Recorder, client: &CommunityClient, name: &'static str) {
    if rec.step(name, client.wait_ready()).await.is_some() {
        return;
    }
    let report = client.retry_initialization().await;
    tracing::info!(?report, "retried initialization");
    rec.step("retry connect", client.wait_ready()).await;
}

async fn collect_notices(client: CommunityClient, notices: Arc<Mutex<Vec<Notice>>>) {
    let mut rx = client.watchdog().subscribe();
    drop(client);
    let mut last = None;
    loop {
        let notice = rx.borrow_and_update().notice();
        if notice != last {
            if let Some(notice) = notice {
                notices.lock().push(notice);
            }
            last = notice;
        }
        if rx.changed().await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn default_session_passes() {
        let report = run_session(SimulatorConfig::default()).await;

        assert!(report.passed(), "{}", report.generate_text());
        assert!(report.notices.is_empty());
        assert_eq!(report.step("vote").map(|s| s.ok), Some(true));
        assert_eq!(report.step("remove message").map(|s| s.ok), Some(true));
        assert!(report.backend_calls["post_message"] >= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_connection_recovers_on_retry() {
        let config = SimulatorConfig {
            connect_failures: 2,
            ..SimulatorConfig::default()
        };

        let report = run_session(config).await;

        assert_eq!(report.step("anonymous connect").map(|s| s.ok), Some(false));
        assert_eq!(report.step("retry connect").map(|s| s.ok), Some(true));
        assert_eq!(report.backend_calls[CONNECT], 5);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_connection_raises_a_notice() {
        let config = SimulatorConfig {
            connect_latency: Duration::from_secs(5),
            members: 1,
            messages: 0,
            ..SimulatorConfig::default()
        };

        let report = run_session(config).await;

        assert!(report.passed(), "{}", report.generate_text());
        assert!(!report.notices.is_empty());
    }
}
