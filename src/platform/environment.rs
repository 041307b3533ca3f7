//! Runtime environment detection and default configuration discovery.
//!
//! Defaults can be supplied as a JSON object (or `key=value,key=value` list) in
//! `__WEBPERF_DEFAULTS__`, or as a path to a JSON file in
//! `__WEBPERF_DEFAULTS_PATH`. Individual `WEBPERF_*` variables take precedence.

use std::env;
use std::fs;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Where the instrumented page lives, as reported in every report.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageContext {
    pub url: String,
    pub user_agent: String,
}

impl PageContext {
    pub fn new(url: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            user_agent: user_agent.into(),
        }
    }

    /// Reads the page url and user agent from the browser when available,
    /// otherwise describes the native host.
    pub fn detect() -> Self {
        #[cfg(all(target_arch = "wasm32", feature = "wasm-web"))]
        {
            if let Some(window) = web_sys::window() {
                let url = window.location().href().unwrap_or_default();
                let user_agent = window.navigator().user_agent().unwrap_or_default();
                return Self { url, user_agent };
            }
        }

        Self {
            url: String::new(),
            user_agent: native_user_agent(),
        }
    }
}

fn native_user_agent() -> String {
    format!(
        "webperf/{} ({}; {})",
        env!("CARGO_PKG_VERSION"),
        env::consts::OS,
        env::consts::ARCH
    )
}

/// Returns the parsed defaults object when one is configured.
pub(crate) fn webperf_defaults() -> Option<Map<String, Value>> {
    defaults_from_env()
        .or_else(defaults_from_path)
        .and_then(|value| value.as_object().cloned())
}

fn defaults_from_env() -> Option<Value> {
    let raw = env::var("__WEBPERF_DEFAULTS__").ok()?;
    parse_config_source(&raw)
}

fn defaults_from_path() -> Option<Value> {
    let path = env::var("__WEBPERF_DEFAULTS_PATH").ok()?;
    let content = fs::read_to_string(path).ok()?;
    parse_config_source(&content)
}

fn parse_config_source(raw: &str) -> Option<Value> {
    if let Ok(json) = serde_json::from_str::<Value>(raw) {
        if json.is_object() {
            return Some(json);
        }
    }
    parse_key_value_config(raw)
}

fn parse_key_value_config(raw: &str) -> Option<Value> {
    let mut map = Map::new();
    for entry in raw.split(',') {
        let mut parts = entry.splitn(2, '=');
        let key = parts.next()?.trim();
        let value = parts.next()?.trim();
        if key.is_empty() || value.is_empty() {
            continue;
        }
        map.insert(key.to_string(), Value::String(value.to_string()));
    }
    if map.is_empty() {
        None
    } else {
        Some(Value::Object(map))
    }
}

/// Looks up a string setting, preferring the `WEBPERF_<NAME>` variable over
/// the `name` key of the defaults object.
pub(crate) fn setting(var: &str, key: &str) -> Option<String> {
    if let Ok(value) = env::var(var) {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            return Some(trimmed.to_string());
        }
    }
    webperf_defaults()?.get(key).and_then(|value| match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    })
}

/// Returns `true` when running inside a browser window.
pub fn is_browser() -> bool {
    #[cfg(all(target_arch = "wasm32", feature = "wasm-web"))]
    {
        use wasm_bindgen::JsCast;
        js_sys::global().dyn_into::<web_sys::Window>().is_ok()
    }

    #[cfg(not(all(target_arch = "wasm32", feature = "wasm-web")))]
    {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_key_value_configs() {
        let value = parse_key_value_config("endpoint=https://collect.test,environment=production")
            .unwrap();
        let map = value.as_object().unwrap();
        assert_eq!(map.get("endpoint").unwrap().as_str(), Some("https://collect.test"));
        assert_eq!(map.get("environment").unwrap().as_str(), Some("production"));
    }

    #[test]
    fn parse_config_source_prefers_json_objects() {
        let json = parse_config_source("{\"endpoint\":\"https://collect.test\"}").unwrap();
        assert_eq!(json["endpoint"], "https://collect.test");
        assert!(parse_config_source("[1, 2]").is_none());
    }

    #[test]
    fn native_context_reports_crate_user_agent() {
        if is_browser() {
            return;
        }
        let context = PageContext::detect();
        assert!(context.user_agent.starts_with("webperf/"));
        assert!(context.url.is_empty());
    }
}
