//! Threshold alerts over sampled metrics and container stats.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pulse_core::{Change, Message, MessageKind, PullSource, Topic, UpstreamError};
use pulse_settings::AlertSettings;
use serde::Serialize;
use serde_json::{Value, json};
use tokio::time::Instant;
use tracing::{debug, info};

use super::change::EventShaper;

const CPU_ERROR_PERCENT: f64 = 90.0;
const MEMORY_ERROR_PERCENT: f64 = 95.0;
const ERROR_RATE_ERROR: f64 = 0.10;

/// Alert severity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    /// Over threshold.
    Warning,
    /// Well over threshold, or a container is down.
    Error,
}

/// One active alert.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Alert {
    /// Stable identity used for change detection and cooldown.
    pub key: String,
    /// Severity.
    pub level: AlertLevel,
    /// Alert category, e.g. `high_cpu`.
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// Human-readable description.
    pub message: String,
    /// Observed value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    /// Configured threshold.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    /// Container the alert is about.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_name: Option<String>,
    /// Container status that triggered the alert.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl Alert {
    fn threshold(kind: &'static str, level: AlertLevel, message: String, value: f64, threshold: f64) -> Self {
        Self {
            key: kind.to_string(),
            level,
            kind,
            message,
            value: Some(value),
            threshold: Some(threshold),
            container_name: None,
            status: None,
        }
    }
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// A [`PullSource`] that answers `system_alerts` by evaluating thresholds
/// over `metrics` and `containers`, and passes every other topic through.
///
/// The alert value is `{"active": [keys], "alerts": [details]}` with keys
/// sorted, so `/active` is a stable signal for change detection.
pub struct AlertEvaluator {
    inner: Arc<dyn PullSource>,
    settings: AlertSettings,
}

impl AlertEvaluator {
    /// Wrap `inner` with alert evaluation.
    pub fn new(inner: Arc<dyn PullSource>, settings: AlertSettings) -> Self {
        Self { inner, settings }
    }

    /// Active alerts for the given upstream values, ordered by key.
    pub fn evaluate(&self, metrics: &Value, containers: &Value) -> Vec<Alert> {
        let mut alerts = Vec::new();
        let aggregated = &containers["aggregated"];

        if let Some(cpu) = aggregated["total_cpu_percent"].as_f64() {
            if cpu > self.settings.cpu_threshold {
                let level = if cpu < CPU_ERROR_PERCENT {
                    AlertLevel::Warning
                } else {
                    AlertLevel::Error
                };
                alerts.push(Alert::threshold(
                    "high_cpu",
                    level,
                    format!("High CPU usage: {cpu:.1}%"),
                    round_to(cpu, 2),
                    self.settings.cpu_threshold,
                ));
            }
        }

        if let Some(memory) = aggregated["total_memory_percent"].as_f64() {
            if memory > self.settings.memory_threshold {
                let level = if memory < MEMORY_ERROR_PERCENT {
                    AlertLevel::Warning
                } else {
                    AlertLevel::Error
                };
                alerts.push(Alert::threshold(
                    "high_memory",
                    level,
                    format!("High memory usage: {memory:.1}%"),
                    round_to(memory, 2),
                    self.settings.memory_threshold,
                ));
            }
        }

        if let Some(rate) = metrics["performance"]["error_rate"].as_f64() {
            if rate > self.settings.error_rate_threshold {
                let level = if rate < ERROR_RATE_ERROR {
                    AlertLevel::Warning
                } else {
                    AlertLevel::Error
                };
                alerts.push(Alert::threshold(
                    "high_error_rate",
                    level,
                    format!("High error rate: {:.1}%", rate * 100.0),
                    round_to(rate, 4),
                    self.settings.error_rate_threshold,
                ));
            }
        }

        for container in containers["containers"].as_array().into_iter().flatten() {
            let name = container["name"].as_str().unwrap_or("unknown");
            let status = container["status"].as_str().unwrap_or("unknown");
            if status != "running" {
                alerts.push(Alert {
                    key: format!("container_down_{name}"),
                    level: AlertLevel::Error,
                    kind: "container_down",
                    message: format!("Container '{name}' is {status}"),
                    value: None,
                    threshold: None,
                    container_name: Some(name.to_string()),
                    status: Some(status.to_string()),
                });
            }
        }

        alerts.sort_by(|a, b| a.key.cmp(&b.key));
        alerts.dedup_by(|a, b| a.key == b.key);
        alerts
    }
}

#[async_trait]
impl PullSource for AlertEvaluator {
    async fn get(&self, topic: Topic) -> Result<Value, UpstreamError> {
        if topic != Topic::SystemAlerts {
            return self.inner.get(topic).await;
        }

        let (metrics, containers) = tokio::join!(
            self.inner.get(Topic::Metrics),
            self.inner.get(Topic::Containers)
        );
        // A partial view would read as cleared alerts; report nothing instead.
        let (metrics, containers) = (metrics?, containers?);

        let alerts = self.evaluate(&metrics, &containers);
        let active: Vec<&str> = alerts.iter().map(|a| a.key.as_str()).collect();
        debug!(active = ?active, "alerts evaluated");
        Ok(json!({ "active": active, "alerts": alerts }))
    }
}

/// Shapes an active-set transition into a `system_alert` event with the
/// newly raised alerts and the cleared keys.
///
/// A raise whose key was broadcast less than `cooldown` ago is held back.
/// While its key stays active it is sent once the cooldown has passed, on
/// the next change or quiet check; if it clears first it is forgotten.
#[derive(Debug)]
pub struct AlertShaper {
    cooldown: Duration,
    last_broadcast: HashMap<String, Instant>,
    held: BTreeMap<String, Value>,
    active: BTreeSet<String>,
}

impl AlertShaper {
    /// Create a shaper with the given per-key cooldown.
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_broadcast: HashMap::new(),
            held: BTreeMap::new(),
            active: BTreeSet::new(),
        }
    }

    fn in_cooldown(&self, key: &str, now: Instant) -> bool {
        self.last_broadcast
            .get(key)
            .is_some_and(|at| now.duration_since(*at) < self.cooldown)
    }

    /// Take every held alert whose cooldown has passed.
    fn release_due(&mut self, now: Instant) -> Vec<Value> {
        let due: Vec<String> = self
            .held
            .keys()
            .filter(|key| !self.in_cooldown(key, now))
            .cloned()
            .collect();
        due.iter().filter_map(|key| self.held.remove(key)).collect()
    }

    fn emit(&mut self, raised: &[Value], cleared: &[String], now: Instant) -> Option<Message> {
        if raised.is_empty() && cleared.is_empty() {
            return None;
        }
        for alert in raised {
            if let Some(key) = alert["key"].as_str() {
                let _ = self.last_broadcast.insert(key.to_string(), now);
            }
        }
        info!(raised = raised.len(), cleared = cleared.len(), "system alert");
        Some(Message::event(
            MessageKind::SystemAlert,
            Topic::SystemAlerts,
            json!({
                "alerts": raised,
                "cleared": cleared,
                "active": self.active,
            }),
        ))
    }
}

fn key_set(value: &Value) -> BTreeSet<String> {
    value
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect()
}

impl EventShaper for AlertShaper {
    fn shape(&mut self, change: &Change) -> Option<Message> {
        let previous = key_set(&change.previous);
        let current = key_set(&change.current);
        let now = Instant::now();

        // A held key was never re-announced, so viewers already see it cleared.
        let cleared: Vec<String> = previous
            .difference(&current)
            .filter(|key| !self.held.contains_key(*key))
            .cloned()
            .collect();
        self.held.retain(|key, _| current.contains(key));

        let mut raised = self.release_due(now);
        for alert in change.snapshot["alerts"].as_array().into_iter().flatten() {
            let Some(key) = alert["key"].as_str() else {
                continue;
            };
            if previous.contains(key) {
                continue;
            }
            if self.in_cooldown(key, now) {
                debug!(key, "alert raise held back by cooldown");
                let _ = self.held.insert(key.to_string(), alert.clone());
            } else {
                raised.push(alert.clone());
            }
        }

        self.active = current;
        self.emit(&raised, &cleared, now)
    }

    fn on_quiet(&mut self) -> Option<Message> {
        if self.held.is_empty() {
            return None;
        }
        let now = Instant::now();
        let raised = self.release_due(now);
        self.emit(&raised, &[], now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::testing::ScriptedSource;
    use pulse_core::Payload;

    fn evaluator(source: Arc<ScriptedSource>) -> AlertEvaluator {
        AlertEvaluator::new(source, AlertSettings::default())
    }

    fn containers(cpu: f64, memory: f64) -> Value {
        json!({
            "aggregated": {"total_cpu_percent": cpu, "total_memory_percent": memory},
            "containers": [],
        })
    }

    fn keys(alerts: &[Alert]) -> Vec<&str> {
        alerts.iter().map(|a| a.key.as_str()).collect()
    }

    #[test]
    fn quiet_system_has_no_alerts() {
        let eval = evaluator(Arc::new(ScriptedSource::new()));
        let metrics = json!({"performance": {"error_rate": 0.01}});
        assert!(eval.evaluate(&metrics, &containers(20.0, 30.0)).is_empty());
    }

    #[test]
    fn cpu_levels() {
        let eval = evaluator(Arc::new(ScriptedSource::new()));
        let warn = eval.evaluate(&json!({}), &containers(85.0, 0.0));
        assert_eq!(keys(&warn), vec!["high_cpu"]);
        assert_eq!(warn[0].level, AlertLevel::Warning);

        let error = eval.evaluate(&json!({}), &containers(93.456, 0.0));
        assert_eq!(error[0].level, AlertLevel::Error);
        assert_eq!(error[0].value, Some(93.46));
        assert_eq!(error[0].message, "High CPU usage: 93.5%");
    }

    #[test]
    fn memory_and_error_rate() {
        let eval = evaluator(Arc::new(ScriptedSource::new()));
        let metrics = json!({"performance": {"error_rate": 0.12}});
        let alerts = eval.evaluate(&metrics, &containers(0.0, 96.0));
        assert_eq!(keys(&alerts), vec!["high_error_rate", "high_memory"]);
        assert!(alerts.iter().all(|a| a.level == AlertLevel::Error));
    }

    #[test]
    fn stopped_container_alerts_by_name() {
        let eval = evaluator(Arc::new(ScriptedSource::new()));
        let stats = json!({
            "containers": [
                {"name": "api", "status": "running"},
                {"name": "redis", "status": "exited"},
            ],
        });
        let alerts = eval.evaluate(&json!({}), &stats);
        assert_eq!(keys(&alerts), vec!["container_down_redis"]);
        let body = serde_json::to_value(&alerts[0]).unwrap();
        assert_eq!(body["type"], "container_down");
        assert_eq!(body["status"], "exited");
        assert!(body.get("threshold").is_none());
    }

    #[tokio::test]
    async fn evaluator_answers_alert_topic_and_passes_through_others() {
        let source = Arc::new(ScriptedSource::new());
        source.set(Topic::Metrics, json!({"performance": {"error_rate": 0.0}}));
        source.set(Topic::Containers, containers(95.0, 10.0));
        let eval = evaluator(source);

        let value = eval.get(Topic::SystemAlerts).await.unwrap();
        assert_eq!(value["active"], json!(["high_cpu"]));
        assert_eq!(value["alerts"][0]["level"], "error");

        let passthrough = eval.get(Topic::Metrics).await.unwrap();
        assert_eq!(passthrough["performance"]["error_rate"], 0.0);
    }

    #[tokio::test]
    async fn partial_upstream_is_an_error() {
        let source = Arc::new(ScriptedSource::new());
        source.set(Topic::Containers, containers(95.0, 10.0));
        source.fail(Topic::Metrics);
        assert!(evaluator(source).get(Topic::SystemAlerts).await.is_err());
    }

    fn transition(previous: &[&str], alerts: &[&str]) -> Change {
        let details: Vec<Value> = alerts
            .iter()
            .map(|key| json!({"key": key, "type": key, "level": "warning"}))
            .collect();
        Change {
            previous: json!(previous),
            current: json!(alerts),
            snapshot: json!({"active": alerts, "alerts": details}),
        }
    }

    fn event_of(message: &Message) -> Value {
        match message.payload() {
            Payload::Event(event) => event.clone(),
            Payload::Bundle(_) => panic!("expected an event"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn shaper_reports_raised_and_cleared() {
        let mut shaper = AlertShaper::new(Duration::from_secs(60));
        let message = shaper.shape(&transition(&["high_cpu"], &["high_memory"])).unwrap();
        assert_eq!(message.kind(), MessageKind::SystemAlert);
        let event = event_of(&message);
        assert_eq!(event["alerts"][0]["key"], "high_memory");
        assert_eq!(event["cleared"], json!(["high_cpu"]));
        assert_eq!(event["active"], json!(["high_memory"]));
    }

    #[tokio::test(start_paused = true)]
    async fn held_raise_is_sent_once_cooldown_passes() {
        let mut shaper = AlertShaper::new(Duration::from_secs(60));
        assert!(shaper.shape(&transition(&[], &["high_cpu"])).is_some());

        // Cleared, then raised again within the cooldown: only the clear goes out.
        let cleared = shaper.shape(&transition(&["high_cpu"], &[])).unwrap();
        assert_eq!(event_of(&cleared)["cleared"], json!(["high_cpu"]));
        assert!(shaper.shape(&transition(&[], &["high_cpu"])).is_none());
        assert!(shaper.on_quiet().is_none());

        tokio::time::advance(Duration::from_secs(61)).await;
        let again = shaper.on_quiet().unwrap();
        let event = event_of(&again);
        assert_eq!(event["alerts"][0]["key"], "high_cpu");
        assert_eq!(event["cleared"], json!([]));
        assert_eq!(event["active"], json!(["high_cpu"]));
        assert!(shaper.on_quiet().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn held_raise_rides_along_with_next_change() {
        let mut shaper = AlertShaper::new(Duration::from_secs(60));
        let _ = shaper.shape(&transition(&[], &["high_cpu"])).unwrap();
        let _ = shaper.shape(&transition(&["high_cpu"], &[])).unwrap();
        assert!(shaper.shape(&transition(&[], &["high_cpu"])).is_none());

        tokio::time::advance(Duration::from_secs(61)).await;
        let message = shaper
            .shape(&transition(&["high_cpu"], &["high_cpu", "high_memory"]))
            .unwrap();
        let event = event_of(&message);
        let keys: Vec<&str> = event["alerts"]
            .as_array()
            .unwrap()
            .iter()
            .map(|a| a["key"].as_str().unwrap())
            .collect();
        assert_eq!(keys, vec!["high_cpu", "high_memory"]);
    }

    #[tokio::test(start_paused = true)]
    async fn held_raise_that_clears_is_forgotten() {
        let mut shaper = AlertShaper::new(Duration::from_secs(60));
        let _ = shaper.shape(&transition(&[], &["high_cpu"])).unwrap();
        let _ = shaper.shape(&transition(&["high_cpu"], &[])).unwrap();
        assert!(shaper.shape(&transition(&[], &["high_cpu"])).is_none());

        // Viewers never saw the second raise, so its clear is not announced.
        assert!(shaper.shape(&transition(&["high_cpu"], &[])).is_none());
        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(shaper.on_quiet().is_none());
    }

    #[tokio::test]
    async fn alert_active_at_startup_is_broadcast_on_first_check() {
        use crate::sources::change::{ChangeSource, PollingChangeFeed, Signal};
        use crate::websocket::connection::ClientConnection;
        use crate::websocket::dispatcher::Dispatcher;
        use crate::websocket::registry::ConnectionRegistry;
        use pulse_core::BundlePolicy;
        use tokio::sync::mpsc;

        let registry = Arc::new(ConnectionRegistry::new(true));
        let (tx, mut rx) = mpsc::channel(8);
        let _ = registry.add(Arc::new(ClientConnection::new("c1".into(), tx))).await;
        let dispatcher = Arc::new(Dispatcher::new(registry, BundlePolicy::Filter));

        let source = Arc::new(ScriptedSource::new());
        source.set(Topic::Metrics, json!({"performance": {"error_rate": 0.0}}));
        source.set(Topic::Containers, containers(97.0, 10.0));
        let feed = PollingChangeFeed::new(Arc::new(evaluator(source))).watch_from(
            Topic::SystemAlerts,
            Signal::at(Topic::SystemAlerts, "/active"),
            json!([]),
        );
        let mut alerts = ChangeSource::new(
            Topic::SystemAlerts,
            Arc::new(feed),
            AlertShaper::new(Duration::from_secs(60)),
            dispatcher,
            Duration::from_secs(3),
        );

        assert_eq!(alerts.check_once().await.unwrap().delivered, 1);
        for _ in 0..4 {
            assert!(alerts.check_once().await.is_none());
        }

        let frame: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(frame["type"], "system_alert");
        assert_eq!(frame["event"]["alerts"][0]["key"], "high_cpu");
        assert_eq!(frame["event"]["alerts"][0]["level"], "error");
        assert!(rx.try_recv().is_err());
    }
}
