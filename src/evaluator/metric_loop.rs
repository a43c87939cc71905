//! Bounded retry loop for scoring one metric of one QA item.
//!
//! Every attempt either yields a parsed score or fails, whether on the service
//! call or on parsing the reply. Failed attempts are retried until the attempt
//! budget is spent; the metric then keeps its sentinel score.

use thiserror::Error;

use crate::ollama::OllamaError;

use super::score_parser::{ParsedScore, ScoreParseError, parse_score_response};

/// Score recorded for a metric whose evaluation never succeeded.
pub const FAILED_SCORE: f64 = -1.0;

/// Attempts allowed per (item, metric) unless configured otherwise.
pub const DEFAULT_MAX_ATTEMPTS: usize = 2;

/// Why a single attempt produced no score.
#[derive(Debug, Error)]
pub enum AttemptFailure {
    #[error("judge call failed: {0}")]
    Call(#[from] OllamaError),

    #[error("judge reply unusable: {0}")]
    Parse(#[from] ScoreParseError),
}

/// States of one metric evaluation.
#[derive(Debug)]
enum MetricState {
    Pending { attempt: usize },
    Scored { attempts: usize, parsed: ParsedScore },
    Exhausted { attempts: usize, last: AttemptFailure },
}

/// Final result of scoring one metric.
#[derive(Debug)]
pub struct MetricOutcome {
    pub attempts: usize,
    pub result: Result<ParsedScore, AttemptFailure>,
}

impl MetricOutcome {
    /// The score to record: the parsed score, or [`FAILED_SCORE`].
    pub fn score(&self) -> f64 {
        self.result.as_ref().map_or(FAILED_SCORE, |parsed| parsed.score)
    }
}

/// Runs up to `max_attempts` attempts of `call`, parsing each reply.
///
/// `call` receives the 1-based attempt number. The loop stops at the first
/// reply that parses; `max_attempts` of zero is treated as one.
pub fn score_with_retries<F>(max_attempts: usize, mut call: F) -> MetricOutcome
where
    F: FnMut(usize) -> Result<String, OllamaError>,
{
    let max_attempts = max_attempts.max(1);
    let mut state = MetricState::Pending { attempt: 1 };

    loop {
        state = match state {
            MetricState::Pending { attempt } => {
                let outcome = call(attempt)
                    .map_err(AttemptFailure::from)
                    .and_then(|raw| parse_score_response(&raw).map_err(AttemptFailure::from));
                match outcome {
                    Ok(parsed) => MetricState::Scored {
                        attempts: attempt,
                        parsed,
                    },
                    Err(failure) if attempt < max_attempts => {
                        tracing::debug!(attempt, error = %failure, "retrying metric");
                        MetricState::Pending {
                            attempt: attempt + 1,
                        }
                    }
                    Err(failure) => MetricState::Exhausted {
                        attempts: attempt,
                        last: failure,
                    },
                }
            }
            MetricState::Scored { attempts, parsed } => {
                return MetricOutcome {
                    attempts,
                    result: Ok(parsed),
                };
            }
            MetricState::Exhausted { attempts, last } => {
                return MetricOutcome {
                    attempts,
                    result: Err(last),
                };
            }
        };
    }
}
