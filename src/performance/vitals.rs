use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

/// The standard page-load quality signals. Any of them may never arrive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WebVitals {
    /// First Contentful Paint, ms.
    #[serde(rename = "FCP", default, skip_serializing_if = "Option::is_none")]
    pub fcp: Option<f64>,
    /// Largest Contentful Paint, ms.
    #[serde(rename = "LCP", default, skip_serializing_if = "Option::is_none")]
    pub lcp: Option<f64>,
    /// First Input Delay, ms.
    #[serde(rename = "FID", default, skip_serializing_if = "Option::is_none")]
    pub fid: Option<f64>,
    /// Cumulative Layout Shift, unitless.
    #[serde(rename = "CLS", default, skip_serializing_if = "Option::is_none")]
    pub cls: Option<f64>,
    /// Time To First Byte, ms.
    #[serde(rename = "TTFB", default, skip_serializing_if = "Option::is_none")]
    pub ttfb: Option<f64>,
}

/// Holds the vitals as the observation adapter reports them.
///
/// Values are stored as given; there is no range validation.
#[derive(Debug, Default)]
pub struct VitalsCollector {
    vitals: Mutex<WebVitals>,
}

impl VitalsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, WebVitals> {
        self.vitals.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn web_vitals(&self) -> WebVitals {
        *self.lock()
    }

    /// Sets FCP unless already known. Returns whether the value was taken.
    pub fn set_fcp_once(&self, value: f64) -> bool {
        set_once(&mut self.lock().fcp, value)
    }

    /// LCP candidates keep arriving until input; the latest one wins.
    pub fn set_lcp(&self, value: f64) {
        self.lock().lcp = Some(value);
    }

    pub fn set_fid_once(&self, value: f64) -> bool {
        set_once(&mut self.lock().fid, value)
    }

    /// Adds one layout shift to the running CLS sum.
    pub fn add_layout_shift(&self, value: f64) {
        let mut vitals = self.lock();
        vitals.cls = Some(vitals.cls.unwrap_or(0.0) + value);
    }

    pub fn set_ttfb_once(&self, value: f64) -> bool {
        set_once(&mut self.lock().ttfb, value)
    }
}

fn set_once(slot: &mut Option<f64>, value: f64) -> bool {
    if slot.is_some() {
        return false;
    }
    *slot = Some(value);
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn once_fields_keep_first_value() {
        let collector = VitalsCollector::new();
        assert!(collector.set_fid_once(12.0));
        assert!(!collector.set_fid_once(400.0));
        assert_eq!(collector.web_vitals().fid, Some(12.0));
    }

    #[test]
    fn lcp_latest_wins_and_cls_accumulates() {
        let collector = VitalsCollector::new();
        collector.set_lcp(1200.0);
        collector.set_lcp(2500.0);
        collector.add_layout_shift(0.05);
        collector.add_layout_shift(0.1);
        let vitals = collector.web_vitals();
        assert_eq!(vitals.lcp, Some(2500.0));
        assert!((vitals.cls.unwrap() - 0.15).abs() < 1e-9);
    }

    #[test]
    fn serializes_with_vital_names() {
        let vitals = WebVitals {
            fcp: Some(900.0),
            ..Default::default()
        };
        let json = serde_json::to_value(vitals).unwrap();
        assert_eq!(json, serde_json::json!({ "FCP": 900.0 }));
    }
}
