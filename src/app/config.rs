use std::collections::HashSet;
use std::path::PathBuf;

use crate::adapters::firestore::FirestoreSettings;
use crate::adapters::gpio::LineLevel;
use crate::adapters::host_power::ShutdownCommand;
use crate::adapters::machine_id::DEFAULT_MACHINE_ID_PATHS;
use crate::adapters::relay_bank::{PowerPortSpec, dedupe_ports};
use crate::app::AppError;
use crate::domain::cable_debounce::EdgePolicy;
use crate::domain::session_policy::StateNaming;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub power_ports: Vec<PowerPortSpec>,
    pub detector_port: u32,
    pub store: FirestoreSettings,
    pub cache_path: PathBuf,
    pub device_collection: String,
    pub heartbeat_interval_ms: u64,
    pub staleness_threshold_ms: i64,
    pub detector_debounce_ms: u64,
    pub detector_poll_interval_ms: u64,
    pub detector_edge: EdgePolicy,
    pub relay_rest_level: LineLevel,
    pub state_naming: StateNaming,
    pub store_poll_interval_ms: u64,
    pub shutdown_write_timeout_ms: u64,
    pub host_shutdown: ShutdownCommand,
    pub gpio_root: PathBuf,
    pub machine_id_paths: Vec<PathBuf>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let power_ports = parse_power_ports(&required(&lookup, "POWER_PORT")?)?;
        let detector_port = required(&lookup, "DETECTOR_PORT")?
            .parse::<u32>()
            .map_err(|_| AppError::hardware_spec("DETECTOR_PORT must be a pin number"))?;
        if power_ports.iter().any(|spec| spec.port == detector_port) {
            return Err(AppError::hardware_spec(format!(
                "DETECTOR_PORT {detector_port} is also configured as a relay port"
            )));
        }

        let store = FirestoreSettings::from_blob(&required(&lookup, "FIREBASE_CONFIG")?)
            .map_err(|error| AppError::config(format!("FIREBASE_CONFIG: {error}")))?;
        let cache_path = PathBuf::from(required(&lookup, "CONFIG_FILE")?);

        let host_shutdown = match optional(&lookup, "HOST_SHUTDOWN_COMMAND") {
            Some(raw) => ShutdownCommand::parse(&raw)
                .ok_or_else(|| AppError::config("HOST_SHUTDOWN_COMMAND must name a program"))?,
            None => ShutdownCommand::parse("shutdown now")
                .ok_or_else(|| AppError::config("default shutdown command is empty"))?,
        };

        let machine_id_paths = match optional(&lookup, "MACHINE_ID_PATH") {
            Some(path) => vec![PathBuf::from(path)],
            None => DEFAULT_MACHINE_ID_PATHS.iter().map(PathBuf::from).collect(),
        };

        Ok(Self {
            power_ports,
            detector_port,
            store,
            cache_path,
            device_collection: optional(&lookup, "DEVICE_COLLECTION")
                .unwrap_or_else(|| "rechargeDevices".to_string()),
            heartbeat_interval_ms: positive_or_default(&lookup, "HEARTBEAT_INTERVAL_MS", 60_000)?,
            staleness_threshold_ms: positive_or_default(
                &lookup,
                "STALENESS_THRESHOLD_MS",
                80_000_i64,
            )?,
            detector_debounce_ms: parse_or_default(&lookup, "DETECTOR_DEBOUNCE_MS", 10_u64)?,
            detector_poll_interval_ms: positive_or_default(&lookup, "DETECTOR_POLL_INTERVAL_MS", 5)?,
            detector_edge: choice_or_default(
                &lookup,
                "DETECTOR_EDGE",
                EdgePolicy::parse,
                EdgePolicy::Both,
                "rising, falling or both",
            )?,
            relay_rest_level: choice_or_default(
                &lookup,
                "RELAY_REST_LEVEL",
                LineLevel::parse,
                LineLevel::Low,
                "low or high",
            )?,
            state_naming: choice_or_default(
                &lookup,
                "STATE_NAMING",
                StateNaming::parse,
                StateNaming::PendingCharging,
                "pending-charging or unavailable",
            )?,
            store_poll_interval_ms: positive_or_default(&lookup, "STORE_POLL_INTERVAL_MS", 1000)?,
            shutdown_write_timeout_ms: positive_or_default(
                &lookup,
                "SHUTDOWN_WRITE_TIMEOUT_MS",
                10_000,
            )?,
            host_shutdown,
            gpio_root: optional(&lookup, "GPIO_SYSFS_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("/sys/class/gpio")),
            machine_id_paths,
        })
    }
}

fn optional<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required<F>(lookup: &F, key: &str) -> Result<String, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    optional(lookup, key).ok_or_else(|| AppError::missing(format!("{key} is required")))
}

fn parse_power_ports(raw: &str) -> Result<Vec<PowerPortSpec>, AppError> {
    let specs: Vec<PowerPortSpec> = serde_json::from_str(raw)
        .map_err(|error| AppError::hardware_spec(format!("POWER_PORT is not a port list: {error}")))?;
    if specs.is_empty() {
        return Err(AppError::hardware_spec("POWER_PORT lists no ports"));
    }
    if let Some(spec) = specs.iter().find(|spec| spec.power == 0) {
        return Err(AppError::hardware_spec(format!(
            "port {} has power level 0, which means no profile",
            spec.port
        )));
    }

    let ports = dedupe_ports(&specs);
    let mut seen = HashSet::new();
    for spec in &ports {
        if !seen.insert(spec.power) {
            return Err(AppError::hardware_spec(format!(
                "power level {} is mapped to more than one port",
                spec.power
            )));
        }
    }
    Ok(ports)
}

fn parse_or_default<T, F>(lookup: &F, key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr + Copy,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| AppError::config(format!("{key} must be a valid number"))),
        None => Ok(default),
    }
}

fn positive_or_default<T, F>(lookup: &F, key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr + Copy + Default + PartialOrd,
    F: Fn(&str) -> Option<String>,
{
    let value = parse_or_default(lookup, key, default)?;
    if value <= T::default() {
        return Err(AppError::config(format!("{key} must be greater than zero")));
    }
    Ok(value)
}

fn choice_or_default<T, F, P>(
    lookup: &F,
    key: &str,
    parse: P,
    default: T,
    expected: &str,
) -> Result<T, AppError>
where
    F: Fn(&str) -> Option<String>,
    P: Fn(&str) -> Option<T>,
{
    match optional(lookup, key) {
        Some(raw) => parse(&raw).ok_or_else(|| AppError::config(format!("{key} must be {expected}"))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::AppConfig;
    use crate::adapters::gpio::LineLevel;
    use crate::adapters::relay_bank::PowerPortSpec;
    use crate::app::AppError;
    use crate::domain::cable_debounce::EdgePolicy;
    use crate::domain::session_policy::StateNaming;

    fn base(key: &str) -> Option<String> {
        match key {
            "POWER_PORT" => Some(r#"[{"port":17,"power":5},{"port":27,"power":22}]"#.to_string()),
            "DETECTOR_PORT" => Some("4".to_string()),
            "FIREBASE_CONFIG" => Some(r#"{"projectId":"demo","apiKey":"k"}"#.to_string()),
            "CONFIG_FILE" => Some("/var/lib/charger/device.json".to_string()),
            _ => None,
        }
    }

    fn with<'a>(overrides: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| {
            overrides
                .iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| value.to_string())
                .or_else(|| base(key))
        }
    }

    #[test]
    fn applies_defaults_for_optional_fields() {
        let config = AppConfig::from_lookup(base).expect("config should be valid");

        assert_eq!(
            config.power_ports,
            vec![
                PowerPortSpec { port: 17, power: 5 },
                PowerPortSpec { port: 27, power: 22 }
            ]
        );
        assert_eq!(config.detector_port, 4);
        assert_eq!(config.store.project_id, "demo");
        assert_eq!(config.cache_path, PathBuf::from("/var/lib/charger/device.json"));
        assert_eq!(config.device_collection, "rechargeDevices");
        assert_eq!(config.heartbeat_interval_ms, 60_000);
        assert_eq!(config.staleness_threshold_ms, 80_000);
        assert_eq!(config.detector_debounce_ms, 10);
        assert_eq!(config.detector_edge, EdgePolicy::Both);
        assert_eq!(config.relay_rest_level, LineLevel::Low);
        assert_eq!(config.state_naming, StateNaming::PendingCharging);
        assert_eq!(config.gpio_root, PathBuf::from("/sys/class/gpio"));
        assert_eq!(config.machine_id_paths.len(), 2);
    }

    #[test]
    fn reports_each_missing_required_value() {
        for key in ["POWER_PORT", "DETECTOR_PORT", "FIREBASE_CONFIG", "CONFIG_FILE"] {
            let result = AppConfig::from_lookup(|name| if name == key { None } else { base(name) });
            assert_eq!(
                result.expect_err("missing value should fail").to_string(),
                format!("missing configuration: {key} is required")
            );
        }
    }

    #[test]
    fn dedupes_ports_keeping_first_occurrence() {
        let overrides = [(
            "POWER_PORT",
            r#"[{"port":17,"power":5},{"port":17,"power":11},{"port":27,"power":22}]"#,
        )];
        let config = AppConfig::from_lookup(with(&overrides)).expect("config should be valid");

        assert_eq!(config.power_ports.len(), 2);
        assert_eq!(config.power_ports[0], PowerPortSpec { port: 17, power: 5 });
    }

    #[test]
    fn rejects_bad_hardware_specifications() {
        let cases: [&[(&str, &str)]; 5] = [
            &[("POWER_PORT", "17:5")],
            &[("POWER_PORT", "[]")],
            &[("POWER_PORT", r#"[{"port":17,"power":0}]"#)],
            &[("POWER_PORT", r#"[{"port":17,"power":5},{"port":18,"power":5}]"#)],
            &[("DETECTOR_PORT", "17")],
        ];

        for overrides in cases {
            let result = AppConfig::from_lookup(with(overrides));
            assert!(
                matches!(result, Err(AppError::InvalidHardwareSpecification(_))),
                "{overrides:?} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_invalid_optional_values() {
        let overrides = [("HEARTBEAT_INTERVAL_MS", "abc")];
        assert_eq!(
            AppConfig::from_lookup(with(&overrides))
                .expect_err("invalid number should fail")
                .to_string(),
            "invalid configuration: HEARTBEAT_INTERVAL_MS must be a valid number"
        );

        let overrides = [("DETECTOR_EDGE", "sideways")];
        assert!(matches!(
            AppConfig::from_lookup(with(&overrides)),
            Err(AppError::Config(_))
        ));

        let overrides = [("STORE_POLL_INTERVAL_MS", "0")];
        assert!(matches!(
            AppConfig::from_lookup(with(&overrides)),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn rejects_non_positive_staleness_threshold() {
        for raw in ["0", "-5"] {
            let overrides = [("STALENESS_THRESHOLD_MS", raw)];
            assert_eq!(
                AppConfig::from_lookup(with(&overrides))
                    .expect_err("non-positive threshold should fail")
                    .to_string(),
                "invalid configuration: STALENESS_THRESHOLD_MS must be greater than zero"
            );
        }

        let overrides = [("STALENESS_THRESHOLD_MS", "1")];
        let config = AppConfig::from_lookup(with(&overrides)).expect("config should be valid");
        assert_eq!(config.staleness_threshold_ms, 1);
    }

    #[test]
    fn reads_alternate_behaviour_switches() {
        let overrides = [
            ("DETECTOR_EDGE", "rising"),
            ("RELAY_REST_LEVEL", "high"),
            ("STATE_NAMING", "unavailable"),
            ("MACHINE_ID_PATH", "/tmp/machine-id"),
        ];
        let config = AppConfig::from_lookup(with(&overrides)).expect("config should be valid");

        assert_eq!(config.detector_edge, EdgePolicy::Rising);
        assert_eq!(config.relay_rest_level, LineLevel::High);
        assert_eq!(config.state_naming, StateNaming::Unavailable);
        assert_eq!(config.machine_id_paths, vec![PathBuf::from("/tmp/machine-id")]);
    }
}
