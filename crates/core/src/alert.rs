//! Cooldown-gated soil alert engine.
//!
//! Every reading is checked against three condition classes (dry, normal,
//! preventive). A class that matches sends at most one notification per
//! cooldown window. All classes share a single lock, so evaluation is
//! serialized and the cooldown holds even when readings arrive concurrently.
//!
//! Threshold policy (raw sensor value, higher = drier):
//!
//! ```text
//!   soil_moisture <  wet_below                 -> Normal
//!   wet_below <= soil_moisture <= dry_above    -> mid band (Preventive if hot and dry air)
//!   soil_moisture >  dry_above                 -> Dry
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;

use crate::clock::Clock;
use crate::env;
use crate::notify::Notifier;
use crate::reading::Reading;
use crate::types::Timestamp;

/// Minimum interval between two notifications of the same class.
pub const DEFAULT_COOLDOWN_SECS: i64 = 30 * 60;

/// Raw moisture value above which the soil counts as dry.
pub const DEFAULT_DRY_ABOVE: i32 = 3000;

/// Raw moisture value below which the soil counts as sufficiently wet.
pub const DEFAULT_WET_BELOW: i32 = 2000;

/// Air temperature (Celsius) at or above which preventive watering is advised.
pub const DEFAULT_HEAT_CELSIUS: f64 = 30.0;

/// Relative humidity (percent) below which the air counts as dry.
pub const DEFAULT_DRY_AIR_HUMIDITY: f64 = 40.0;

// ---------------------------------------------------------------------------
// Condition classes
// ---------------------------------------------------------------------------

/// Alert category. Each one has its own cooldown timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConditionClass {
    Dry,
    Normal,
    Preventive,
}

impl ConditionClass {
    /// Evaluation order.
    pub const ALL: [ConditionClass; 3] = [
        ConditionClass::Dry,
        ConditionClass::Normal,
        ConditionClass::Preventive,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ConditionClass::Dry => "dry",
            ConditionClass::Normal => "normal",
            ConditionClass::Preventive => "preventive",
        }
    }
}

impl fmt::Display for ConditionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Band boundaries used to classify a reading.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertThresholds {
    pub dry_above: i32,
    pub wet_below: i32,
    pub heat_celsius: f64,
    pub dry_air_humidity: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            dry_above: DEFAULT_DRY_ABOVE,
            wet_below: DEFAULT_WET_BELOW,
            heat_celsius: DEFAULT_HEAT_CELSIUS,
            dry_air_humidity: DEFAULT_DRY_AIR_HUMIDITY,
        }
    }
}

impl AlertThresholds {
    /// Whether `class` holds for `reading`.
    pub fn matches(&self, class: ConditionClass, reading: &Reading) -> bool {
        let moisture = reading.soil_moisture;
        match class {
            ConditionClass::Dry => moisture > self.dry_above,
            ConditionClass::Normal => moisture < self.wet_below,
            ConditionClass::Preventive => {
                (self.wet_below..=self.dry_above).contains(&moisture)
                    && reading.temperature >= self.heat_celsius
                    && reading.humidity < self.dry_air_humidity
            }
        }
    }
}

/// Alert engine configuration.
#[derive(Debug, Clone)]
pub struct AlertConfig {
    pub thresholds: AlertThresholds,
    pub cooldown: chrono::Duration,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            thresholds: AlertThresholds::default(),
            cooldown: chrono::Duration::seconds(DEFAULT_COOLDOWN_SECS),
        }
    }
}

impl AlertConfig {
    /// Load overrides from the environment.
    ///
    /// | Env Var                  | Default |
    /// |--------------------------|---------|
    /// | `ALERT_COOLDOWN_SECS`    | `1800`  |
    /// | `ALERT_DRY_ABOVE`        | `3000`  |
    /// | `ALERT_WET_BELOW`        | `2000`  |
    /// | `ALERT_HEAT_CELSIUS`     | `30.0`  |
    /// | `ALERT_DRY_AIR_HUMIDITY` | `40.0`  |
    pub fn from_env() -> Self {
        let mut thresholds = AlertThresholds {
            dry_above: env::parse_or("ALERT_DRY_ABOVE", DEFAULT_DRY_ABOVE),
            wet_below: env::parse_or("ALERT_WET_BELOW", DEFAULT_WET_BELOW),
            heat_celsius: env::parse_or("ALERT_HEAT_CELSIUS", DEFAULT_HEAT_CELSIUS),
            dry_air_humidity: env::parse_or("ALERT_DRY_AIR_HUMIDITY", DEFAULT_DRY_AIR_HUMIDITY),
        };

        if thresholds.wet_below > thresholds.dry_above {
            tracing::warn!(
                wet_below = thresholds.wet_below,
                dry_above = thresholds.dry_above,
                "Alert bands overlap, using default moisture bands"
            );
            thresholds.dry_above = DEFAULT_DRY_ABOVE;
            thresholds.wet_below = DEFAULT_WET_BELOW;
        }

        let cooldown_secs: i64 = env::parse_or("ALERT_COOLDOWN_SECS", DEFAULT_COOLDOWN_SECS);

        Self {
            thresholds,
            cooldown: chrono::Duration::seconds(cooldown_secs.max(0)),
        }
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Last successful delivery time per condition class.
///
/// Only the [`AlertEngine`] that owns it may change it, and only after a
/// confirmed delivery.
#[derive(Debug, Default)]
pub struct AlertState {
    last_fired: HashMap<ConditionClass, Timestamp>,
}

impl AlertState {
    pub fn last_fired(&self, class: ConditionClass) -> Option<Timestamp> {
        self.last_fired.get(&class).copied()
    }

    /// Time left before `class` may fire again, or `None` if it may fire now.
    fn remaining_cooldown(
        &self,
        class: ConditionClass,
        now: Timestamp,
        cooldown: chrono::Duration,
    ) -> Option<chrono::Duration> {
        let last = self.last_fired.get(&class)?;
        let elapsed = now.signed_duration_since(*last);
        if elapsed >= cooldown {
            None
        } else {
            Some(cooldown - elapsed)
        }
    }

    fn record(&mut self, class: ConditionClass, at: Timestamp) {
        self.last_fired.insert(class, at);
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// What happened to one matching condition class.
#[derive(Debug, Clone, PartialEq)]
pub enum AlertOutcome {
    /// Notification delivered; cooldown restarted.
    Sent,
    /// Suppressed because the class fired recently.
    CoolingDown { remaining: chrono::Duration },
    /// Delivery failed; cooldown untouched so the next reading retries.
    DeliveryFailed(String),
}

/// Per-class result of evaluating one reading.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassOutcome {
    pub class: ConditionClass,
    pub outcome: AlertOutcome,
}

/// Stateful evaluator that turns readings into notifications.
pub struct AlertEngine {
    config: AlertConfig,
    state: Mutex<AlertState>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
}

impl AlertEngine {
    pub fn new(config: AlertConfig, notifier: Arc<dyn Notifier>, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            state: Mutex::new(AlertState::default()),
            notifier,
            clock,
        }
    }

    /// Last successful delivery time for `class`.
    pub async fn last_fired(&self, class: ConditionClass) -> Option<Timestamp> {
        self.state.lock().await.last_fired(class)
    }

    /// Evaluate every condition class against `reading`.
    ///
    /// Classes are checked in [`ConditionClass::ALL`] order without
    /// short-circuiting. Only matching classes appear in the result.
    /// The state lock is held for the whole evaluation, including the
    /// notification round-trips.
    pub async fn evaluate(&self, reading: &Reading) -> Vec<ClassOutcome> {
        let mut state = self.state.lock().await;
        let mut outcomes = Vec::new();

        for class in ConditionClass::ALL {
            if !self.config.thresholds.matches(class, reading) {
                continue;
            }

            let now = self.clock.now();
            if let Some(remaining) = state.remaining_cooldown(class, now, self.config.cooldown) {
                tracing::debug!(
                    class = %class,
                    remaining_secs = remaining.num_seconds(),
                    "Alert suppressed by cooldown"
                );
                outcomes.push(ClassOutcome {
                    class,
                    outcome: AlertOutcome::CoolingDown { remaining },
                });
                continue;
            }

            let text = alert_message(class, reading);
            let outcome = match self.notifier.send_text(&text).await {
                Ok(()) => {
                    state.record(class, now);
                    tracing::info!(
                        class = %class,
                        soil_moisture = reading.soil_moisture,
                        "Alert notification sent"
                    );
                    AlertOutcome::Sent
                }
                Err(e) => {
                    tracing::error!(class = %class, error = %e, "Failed to send alert notification");
                    AlertOutcome::DeliveryFailed(e.to_string())
                }
            };
            outcomes.push(ClassOutcome { class, outcome });
        }

        outcomes
    }
}

/// Human-readable notification text for `class`.
pub fn alert_message(class: ConditionClass, reading: &Reading) -> String {
    match class {
        ConditionClass::Dry => format!(
            "ALERT: Soil is dry, pump activated. Moisture: {}, temperature: {:.1}°C, humidity: {:.1}%",
            reading.soil_moisture, reading.temperature, reading.humidity
        ),
        ConditionClass::Normal => format!(
            "Soil moisture normal. Moisture: {}, temperature: {:.1}°C, humidity: {:.1}%",
            reading.soil_moisture, reading.temperature, reading.humidity
        ),
        ConditionClass::Preventive => format!(
            "ADVISORY: Hot and dry air ({:.1}°C, {:.1}% humidity). Consider watering before the soil dries out. Moisture: {}",
            reading.temperature, reading.humidity, reading.soil_moisture
        ),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
