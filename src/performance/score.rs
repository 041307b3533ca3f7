use std::fmt;

use serde::{Deserialize, Serialize};

use crate::performance::report::CustomMetrics;
use crate::performance::vitals::WebVitals;

/// One scoring rule: deduct `penalty` when `value > limit`.
struct Rule {
    limit: f64,
    penalty: i32,
}

const FCP: Rule = Rule { limit: 3000.0, penalty: 20 };
const LCP: Rule = Rule { limit: 4000.0, penalty: 25 };
const FID: Rule = Rule { limit: 300.0, penalty: 20 };
const CLS: Rule = Rule { limit: 0.25, penalty: 15 };
const TTFB: Rule = Rule { limit: 800.0, penalty: 10 };
const BUNDLE_LOAD: Rule = Rule { limit: 1000.0, penalty: 10 };
const COMPONENT_LOAD: Rule = Rule { limit: 500.0, penalty: 5 };
const IMAGE_LOAD: Rule = Rule { limit: 1000.0, penalty: 5 };
const API_RESPONSE: Rule = Rule { limit: 1000.0, penalty: 10 };

const PENALTY_PER_RECENT_ERROR: i32 = 5;
const MAX_ERROR_PENALTY: i32 = 20;

impl Rule {
    fn deduction(&self, value: Option<f64>) -> i32 {
        match value {
            Some(value) if value > self.limit => self.penalty,
            _ => 0,
        }
    }
}

/// Letter grade derived from a score.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    pub fn from_score(score: u8) -> Self {
        match score {
            90.. => Grade::A,
            80..=89 => Grade::B,
            70..=79 => Grade::C,
            60..=69 => Grade::D,
            _ => Grade::F,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the score depends on.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ScoreInputs {
    pub vitals: WebVitals,
    pub custom: CustomMetrics,
    /// Errors recorded within the recent-error window.
    pub recent_errors: usize,
}

/// Scores `inputs` from 100 down. Every rule deducts independently and the
/// result is clamped to `0..=100`.
pub fn performance_score(inputs: &ScoreInputs) -> u8 {
    let vitals = &inputs.vitals;
    let custom = &inputs.custom;
    let mut score: i32 = 100;

    score -= FCP.deduction(vitals.fcp);
    score -= LCP.deduction(vitals.lcp);
    score -= FID.deduction(vitals.fid);
    score -= CLS.deduction(vitals.cls);
    score -= TTFB.deduction(vitals.ttfb);

    score -= BUNDLE_LOAD.deduction(Some(custom.bundle_load_time));
    score -= COMPONENT_LOAD.deduction(Some(custom.component_load_time));
    score -= IMAGE_LOAD.deduction(Some(custom.image_load_time));
    score -= API_RESPONSE.deduction(Some(custom.api_response_time));

    let errors = i32::try_from(inputs.recent_errors).unwrap_or(i32::MAX);
    score -= errors
        .saturating_mul(PENALTY_PER_RECENT_ERROR)
        .min(MAX_ERROR_PENALTY);

    score.clamp(0, 100) as u8
}

pub fn performance_grade(inputs: &ScoreInputs) -> Grade {
    Grade::from_score(performance_score(inputs))
}
