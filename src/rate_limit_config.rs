use crate::error::ThrottlerError;
use crate::interval::ThrottleInterval;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use validator::{Validate, ValidationError};

/// Budget for one interval of a throttle domain
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate)]
pub struct IntervalLimit {
    #[validate(range(min = 1))]
    pub capacity: u32,
    #[serde(with = "humantime_serde", default)]
    pub min_delay: Duration,
}

impl IntervalLimit {
    pub fn new(capacity: u32, min_delay: Duration) -> Self {
        Self {
            capacity,
            min_delay,
        }
    }

    pub fn min_delay_millis(&self) -> u64 {
        self.min_delay.as_millis() as u64
    }
}

/// Interval budgets for one throttle domain, keyed shortest window first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThrottleDomainConfig {
    limits: BTreeMap<ThrottleInterval, IntervalLimit>,
}

impl ThrottleDomainConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(mut self, interval: ThrottleInterval, capacity: u32, min_delay: Duration) -> Self {
        self.limits.insert(interval, IntervalLimit::new(capacity, min_delay));
        self
    }

    pub fn limit(&self, interval: ThrottleInterval) -> Option<&IntervalLimit> {
        self.limits.get(&interval)
    }

    /// Configured intervals, shortest window first
    pub fn intervals(&self) -> impl Iterator<Item = ThrottleInterval> + '_ {
        self.limits.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.limits.is_empty()
    }

    /// Default per-user budgets
    pub fn default_user() -> Self {
        Self::new()
            .with_limit(ThrottleInterval::QuarterMin, 15, Duration::from_millis(100))
            .with_limit(ThrottleInterval::Hour, 900, Duration::ZERO)
            .with_limit(ThrottleInterval::Day, 5000, Duration::ZERO)
    }

    /// Default budgets shared by all API callers
    pub fn default_global() -> Self {
        Self::new()
            .with_limit(ThrottleInterval::QuarterMin, 75, Duration::ZERO)
            .with_limit(ThrottleInterval::Hour, 3600, Duration::ZERO)
            .with_limit(ThrottleInterval::Day, 30_000, Duration::ZERO)
    }

    /// Default inventory API budget
    pub fn default_inventory() -> Self {
        Self::new().with_limit(ThrottleInterval::Hour, 1800, Duration::ZERO)
    }
}

/// Rolling hourly upload volume
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate)]
pub struct UploadQuotaConfig {
    #[validate(range(exclusive_min = 0.0))]
    pub capacity_mb: f64,
}

impl Default for UploadQuotaConfig {
    fn default() -> Self {
        Self { capacity_mb: 100.0 }
    }
}

/// All throttle domains, loaded once at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ThrottleSettings {
    #[validate(custom(function = "validate_domain"))]
    #[serde(default = "ThrottleDomainConfig::default_user")]
    pub user: ThrottleDomainConfig,
    #[validate(custom(function = "validate_domain"))]
    #[serde(default = "ThrottleDomainConfig::default_global")]
    pub global: ThrottleDomainConfig,
    #[validate(custom(function = "validate_inventory_domain"))]
    #[serde(default = "ThrottleDomainConfig::default_inventory")]
    pub inventory: ThrottleDomainConfig,
    #[validate(nested)]
    #[serde(default)]
    pub upload: UploadQuotaConfig,
}

impl Default for ThrottleSettings {
    fn default() -> Self {
        Self {
            user: ThrottleDomainConfig::default_user(),
            global: ThrottleDomainConfig::default_global(),
            inventory: ThrottleDomainConfig::default_inventory(),
            upload: UploadQuotaConfig::default(),
        }
    }
}

impl ThrottleSettings {
    /// Parse and validate settings from a JSON document
    pub fn from_json(json: &str) -> Result<Self, ThrottlerError> {
        let settings: ThrottleSettings = serde_json::from_str(json)
            .map_err(|e| ThrottlerError::Configuration(format!("Invalid throttle settings: {}", e)))?;
        settings.check()?;
        Ok(settings)
    }

    /// Read settings from a JSON file
    pub fn from_file(path: &Path) -> Result<Self, ThrottlerError> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            ThrottlerError::Configuration(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&json)
    }

    /// Run validation, mapping failures into a configuration error
    pub fn check(&self) -> Result<(), ThrottlerError> {
        self.validate()
            .map_err(|e| ThrottlerError::Configuration(e.to_string()))
    }
}

fn validate_domain(domain: &ThrottleDomainConfig) -> Result<(), ValidationError> {
    if domain.is_empty() {
        return Err(ValidationError::new("no_intervals")
            .with_message("a throttle domain needs at least one interval".into()));
    }
    for interval in domain.intervals() {
        if let Some(limit) = domain.limit(interval) {
            if limit.validate().is_err() {
                return Err(ValidationError::new("capacity")
                    .with_message(format!("{} capacity must be at least 1", interval).into()));
            }
        }
    }
    Ok(())
}

fn validate_inventory_domain(domain: &ThrottleDomainConfig) -> Result<(), ValidationError> {
    validate_domain(domain)?;
    if domain.limit(ThrottleInterval::Hour).is_none() {
        return Err(ValidationError::new("missing_hour")
            .with_message("the inventory domain must configure HOUR".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_are_valid() {
        let settings = ThrottleSettings::default();
        assert!(settings.check().is_ok());
        assert_eq!(
            settings.user.intervals().collect::<Vec<_>>(),
            ThrottleInterval::ALL.to_vec()
        );
        assert_eq!(
            settings.inventory.intervals().collect::<Vec<_>>(),
            vec![ThrottleInterval::Hour]
        );
    }

    #[test]
    fn test_parse_settings_json() {
        let json = r#"{
            "user": {
                "QUARTER_MIN": { "capacity": 10, "min_delay": "250ms" },
                "DAY": { "capacity": 1000 }
            },
            "upload": { "capacity_mb": 50.5 }
        }"#;

        let settings = ThrottleSettings::from_json(json).unwrap();
        let quarter = settings.user.limit(ThrottleInterval::QuarterMin).unwrap();
        assert_eq!(quarter.capacity, 10);
        assert_eq!(quarter.min_delay_millis(), 250);
        assert_eq!(settings.user.limit(ThrottleInterval::Day).unwrap().min_delay, Duration::ZERO);
        assert!(settings.user.limit(ThrottleInterval::Hour).is_none());
        assert_eq!(settings.global, ThrottleDomainConfig::default_global());
        assert_eq!(settings.upload.capacity_mb, 50.5);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let json = r#"{ "global": { "HOUR": { "capacity": 0 } } }"#;
        let result = ThrottleSettings::from_json(json);
        assert!(matches!(result, Err(ThrottlerError::Configuration(_))));
    }

    #[test]
    fn test_empty_domain_rejected() {
        let json = r#"{ "user": {} }"#;
        assert!(ThrottleSettings::from_json(json).is_err());
    }

    #[test]
    fn test_inventory_requires_hour() {
        let json = r#"{ "inventory": { "DAY": { "capacity": 10 } } }"#;
        assert!(ThrottleSettings::from_json(json).is_err());
    }

    #[test]
    fn test_upload_capacity_must_be_positive() {
        let json = r#"{ "upload": { "capacity_mb": 0.0 } }"#;
        assert!(ThrottleSettings::from_json(json).is_err());
    }

    #[test]
    fn test_unknown_interval_rejected() {
        let json = r#"{ "user": { "WEEK": { "capacity": 10 } } }"#;
        assert!(ThrottleSettings::from_json(json).is_err());
    }
}
