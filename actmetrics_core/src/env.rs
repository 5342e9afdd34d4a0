/**
 * Environment / deadline reader.
 *
 * Reads activation identity and the absolute platform deadline from the
 * process environment once, at `Agent` construction (spec §6). Absence
 * of a variable yields an absent key, never an error — these are
 * best-effort identity hints, not required configuration.
 */
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::types::EventValue;

/// Activation identity derived from `__OW_*` / platform environment
/// variables, merged into every outgoing event as the lowest-priority
/// default metrics (spec §3).
#[derive(Debug, Clone, Default)]
pub struct ActivationIdentity {
    pub action_name: Option<String>,
    pub package: Option<String>,
    pub namespace: Option<String>,
    pub activation_id: Option<String>,
    pub transaction_id: Option<String>,
    pub region: Option<String>,
    pub cloud: Option<String>,
    pub activation_host: Option<String>,
    pub activation_container_name: Option<String>,
}

impl ActivationIdentity {
    /// Reads identity fields from the process environment. Never
    /// fails — every field is independently optional.
    pub fn from_env() -> Self {
        let action_name = std::env::var("__OW_ACTION_NAME").ok();

        // `__OW_ACTION_NAME` is a slash-separated path, e.g.
        // "/ns/pkg/act" — the last segment is the action name, and the
        // third-from-last (when present) is the package.
        let segments: Vec<&str> = action_name
            .as_deref()
            .map(|s| s.split('/').filter(|seg| !seg.is_empty()).collect())
            .unwrap_or_default();

        let derived_action_name = segments.last().map(|s| s.to_string());
        let package = if segments.len() >= 2 {
            segments.get(segments.len() - 2).map(|s| s.to_string())
        } else {
            None
        };

        Self {
            action_name: derived_action_name,
            package,
            namespace: std::env::var("__OW_NAMESPACE").ok(),
            activation_id: std::env::var("__OW_ACTIVATION_ID").ok(),
            transaction_id: std::env::var("__OW_TRANSACTION_ID").ok(),
            region: std::env::var("__OW_REGION").ok(),
            cloud: std::env::var("__OW_CLOUD").ok(),
            activation_host: std::env::var("HOSTNAME").ok(),
            activation_container_name: std::env::var("MESOS_CONTAINER_NAME").ok(),
        }
    }

    /// Turns the identity into the default-metrics map merged into
    /// every event (spec §3: "the default identity keys that were
    /// present in the environment when the Agent was constructed").
    pub fn as_default_metrics(&self) -> BTreeMap<String, EventValue> {
        let mut map = BTreeMap::new();
        let mut put = |key: &str, value: &Option<String>| {
            if let Some(v) = value {
                map.insert(key.to_string(), EventValue::Str(v.clone()));
            }
        };
        put("actionName", &self.action_name);
        put("package", &self.package);
        put("namespace", &self.namespace);
        put("activationId", &self.activation_id);
        put("transactionId", &self.transaction_id);
        put("region", &self.region);
        put("cloud", &self.cloud);
        put("activationHost", &self.activation_host);
        put("activationContainerName", &self.activation_container_name);
        map
    }
}

/// Returns the current wall-clock time in milliseconds since the Unix
/// epoch — the unit `timestamp` and `__OW_DEADLINE` are both expressed
/// in.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Reads the absolute deadline (`__OW_DEADLINE`, ms since epoch) from
/// the environment. Returns `None` if absent or malformed.
pub fn read_deadline() -> Option<i64> {
    std::env::var("__OW_DEADLINE").ok()?.parse::<i64>().ok()
}

/// `timeUntilTimeout()` — the deadline minus the current time, in
/// milliseconds. Negative once the deadline has passed.
pub fn time_until_timeout(deadline_ms: i64) -> i64 {
    deadline_ms - now_ms()
}

/// Truthy-string check matching the source catcher's env-var convention:
/// any value other than empty/"0"/"false" (case-insensitive) disables
/// the guarded behavior.
pub fn env_flag_enabled(name: &str) -> bool {
    match std::env::var(name) {
        Ok(v) => {
            let v = v.trim().to_ascii_lowercase();
            !(v.is_empty() || v == "0" || v == "false")
        }
        Err(_) => false,
    }
}

/// Reads an environment variable as a positive integer, falling back to
/// `default` when absent or unparseable (spec §6:
/// `NEW_RELIC_SEND_INTERVAL_MS`, `NEW_RELIC_ERROR_METRIC_MAX_STRING_LENGTH`).
pub fn env_u64_or(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variables are process-global state; serialize tests
    // that touch them so they don't race under `cargo test`'s default
    // multi-threaded runner.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn derives_action_name_and_package_from_the_action_path() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("__OW_ACTION_NAME", "/ns/pkg/act");
        std::env::set_var("__OW_NAMESPACE", "ns");
        std::env::remove_var("__OW_ACTIVATION_ID");

        let identity = ActivationIdentity::from_env();
        assert_eq!(identity.action_name.as_deref(), Some("act"));
        assert_eq!(identity.package.as_deref(), Some("pkg"));
        assert_eq!(identity.namespace.as_deref(), Some("ns"));
        assert_eq!(identity.activation_id, None);

        std::env::remove_var("__OW_ACTION_NAME");
        std::env::remove_var("__OW_NAMESPACE");
    }

    #[test]
    fn time_until_timeout_can_go_negative() {
        let past = now_ms() - 1_000;
        assert!(time_until_timeout(past) < 0);
    }

    #[test]
    fn env_flag_enabled_treats_zero_and_false_as_disabled() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("DISABLE_TEST_FLAG", "0");
        assert!(!env_flag_enabled("DISABLE_TEST_FLAG"));
        std::env::set_var("DISABLE_TEST_FLAG", "true");
        assert!(env_flag_enabled("DISABLE_TEST_FLAG"));
        std::env::remove_var("DISABLE_TEST_FLAG");
        assert!(!env_flag_enabled("DISABLE_TEST_FLAG"));
    }
}
