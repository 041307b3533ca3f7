use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One timed operation.
///
/// Times are monotonic milliseconds from the context's clock. `duration` is
/// only present once the metric has ended, and always equals
/// `end_time - start_time`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metric {
    pub name: String,
    pub start_time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MetricKind>,
}

impl Metric {
    pub fn started(name: impl Into<String>, start_time: f64, metadata: Option<MetricKind>) -> Self {
        Self {
            name: name.into(),
            start_time,
            end_time: None,
            duration: None,
            metadata,
        }
    }

    /// A metric whose start and end are both already known, as reported by
    /// the platform's timing entries.
    pub fn completed(
        name: impl Into<String>,
        start_time: f64,
        duration: f64,
        metadata: Option<MetricKind>,
    ) -> Self {
        let duration = duration.max(0.0);
        Self {
            name: name.into(),
            start_time,
            end_time: Some(start_time + duration),
            duration: Some(duration),
            metadata,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.duration.is_some()
    }

    /// The `type` tag reported for this metric, if it carries metadata.
    pub fn metric_type(&self) -> Option<&str> {
        self.metadata.as_ref().and_then(MetricKind::type_name)
    }

    pub(crate) fn finish(&mut self, end_time: f64, extra: Option<MetricKind>) {
        self.end_time = Some(end_time);
        self.duration = Some(end_time - self.start_time);
        if let Some(extra) = extra {
            match self.metadata.as_mut() {
                Some(existing) => existing.merge(extra),
                None => self.metadata = Some(extra),
            }
        }
    }
}

/// What a metric measured, with only the fields relevant to that kind.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum MetricKind {
    Component {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        success: Option<bool>,
    },
    Image {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        success: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        size: Option<u64>,
    },
    Bundle {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        success: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        size: Option<u64>,
    },
    Api {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        method: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<u16>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        success: Option<bool>,
    },
    /// Page navigations and client-side route changes.
    Navigation {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        dom_content_loaded: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        first_paint: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        first_contentful_paint: Option<f64>,
    },
    /// A resource fetch observed by the platform. Its type is the initiator
    /// (`img`, `script`, ...), not `resource`.
    Resource {
        initiator_type: String,
        size: u64,
        cached: bool,
    },
    /// Anything else. `label` plays the role of the type tag.
    Custom {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        fields: BTreeMap<String, Value>,
    },
}

impl MetricKind {
    pub fn component() -> Self {
        MetricKind::Component { success: None }
    }

    pub fn image() -> Self {
        MetricKind::Image {
            success: None,
            size: None,
        }
    }

    pub fn bundle() -> Self {
        MetricKind::Bundle {
            success: None,
            size: None,
        }
    }

    pub fn api(method: impl Into<String>) -> Self {
        MetricKind::Api {
            method: Some(method.into()),
            status: None,
            success: None,
        }
    }

    pub fn route() -> Self {
        MetricKind::Navigation {
            dom_content_loaded: None,
            first_paint: None,
            first_contentful_paint: None,
        }
    }

    pub fn custom(label: impl Into<String>) -> Self {
        MetricKind::Custom {
            label: Some(label.into()),
            fields: BTreeMap::new(),
        }
    }

    pub fn type_name(&self) -> Option<&str> {
        match self {
            MetricKind::Component { .. } => Some("component"),
            MetricKind::Image { .. } => Some("image"),
            MetricKind::Bundle { .. } => Some("bundle"),
            MetricKind::Api { .. } => Some("api"),
            MetricKind::Navigation { .. } => Some("navigation"),
            MetricKind::Resource { initiator_type, .. } => Some(initiator_type.as_str()),
            MetricKind::Custom { label, .. } => label.as_deref(),
        }
    }

    pub fn success(&self) -> Option<bool> {
        match self {
            MetricKind::Component { success }
            | MetricKind::Image { success, .. }
            | MetricKind::Bundle { success, .. }
            | MetricKind::Api { success, .. } => *success,
            _ => None,
        }
    }

    /// Folds `extra` into `self`. Fields present in `extra` win; a different
    /// kind replaces `self` entirely.
    pub fn merge(&mut self, extra: MetricKind) {
        match (self, extra) {
            (MetricKind::Component { success }, MetricKind::Component { success: other }) => {
                overlay(success, other);
            }
            (
                MetricKind::Image { success, size },
                MetricKind::Image {
                    success: other_success,
                    size: other_size,
                },
            )
            | (
                MetricKind::Bundle { success, size },
                MetricKind::Bundle {
                    success: other_success,
                    size: other_size,
                },
            ) => {
                overlay(success, other_success);
                overlay(size, other_size);
            }
            (
                MetricKind::Api {
                    method,
                    status,
                    success,
                },
                MetricKind::Api {
                    method: other_method,
                    status: other_status,
                    success: other_success,
                },
            ) => {
                overlay(method, other_method);
                overlay(status, other_status);
                overlay(success, other_success);
            }
            (
                MetricKind::Navigation {
                    dom_content_loaded,
                    first_paint,
                    first_contentful_paint,
                },
                MetricKind::Navigation {
                    dom_content_loaded: other_dcl,
                    first_paint: other_fp,
                    first_contentful_paint: other_fcp,
                },
            ) => {
                overlay(dom_content_loaded, other_dcl);
                overlay(first_paint, other_fp);
                overlay(first_contentful_paint, other_fcp);
            }
            (
                MetricKind::Custom { label, fields },
                MetricKind::Custom {
                    label: other_label,
                    fields: other_fields,
                },
            ) => {
                overlay(label, other_label);
                fields.extend(other_fields);
            }
            (this, other) => *this = other,
        }
    }
}

fn overlay<T>(slot: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *slot = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn finish_computes_duration_and_merges() {
        let mut metric = Metric::started("api_/certs", 10.0, Some(MetricKind::api("GET")));
        metric.finish(
            35.5,
            Some(MetricKind::Api {
                method: None,
                status: Some(201),
                success: Some(true),
            }),
        );
        assert_eq!(metric.duration, Some(25.5));
        assert_eq!(
            metric.metadata,
            Some(MetricKind::Api {
                method: Some("GET".into()),
                status: Some(201),
                success: Some(true),
            })
        );
    }

    #[test]
    fn merge_with_different_kind_replaces() {
        let mut kind = MetricKind::component();
        kind.merge(MetricKind::custom("interaction"));
        assert_eq!(kind.type_name(), Some("interaction"));
    }

    #[test]
    fn custom_fields_are_unioned_with_extra_winning() {
        let mut kind = MetricKind::Custom {
            label: Some("form".into()),
            fields: BTreeMap::from([
                ("step".to_string(), json!(1)),
                ("valid".to_string(), json!(false)),
            ]),
        };
        kind.merge(MetricKind::Custom {
            label: None,
            fields: BTreeMap::from([("valid".to_string(), json!(true))]),
        });
        let MetricKind::Custom { label, fields } = kind else {
            panic!("expected custom metadata");
        };
        assert_eq!(label.as_deref(), Some("form"));
        assert_eq!(fields["step"], json!(1));
        assert_eq!(fields["valid"], json!(true));
    }

    #[test]
    fn serializes_with_type_tag() {
        let metric = Metric::completed(
            "resource_/chunk-1.js",
            5.0,
            20.0,
            Some(MetricKind::Resource {
                initiator_type: "script".into(),
                size: 0,
                cached: true,
            }),
        );
        let value = serde_json::to_value(&metric).unwrap();
        assert_eq!(value["metadata"]["type"], "resource");
        assert_eq!(value["metadata"]["initiatorType"], "script");
        assert_eq!(value["endTime"], 25.0);
        assert_eq!(metric.metric_type(), Some("script"));
    }
}
