//! Range classification
//!
//! Routes top-level timestamp comparisons into the `range()` stage instead
//! of the filter. The bound side of the comparison becomes the start or the
//! stop of the range depending on the operator and on which side the
//! timestamp column appears.

use super::aggregator::QueryAggregator;
use super::parts::ExpressionPart;
use crate::model::BinaryKind;
use crate::query::error::{QueryError, QueryResult};
use tracing::{debug, warn};

/// Which bound of the range an assignment targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeBound {
    Start,
    Stop,
}

const START: &[RangeBound] = &[RangeBound::Start];
const STOP: &[RangeBound] = &[RangeBound::Stop];
const BOTH: &[RangeBound] = &[RangeBound::Start, RangeBound::Stop];

/// Bounds a comparison contributes to the range
///
/// `member_at_left` is true when the timestamp column is the left operand.
pub fn classify(op: BinaryKind, member_at_left: bool) -> QueryResult<&'static [RangeBound]> {
    match op {
        BinaryKind::Equal => Ok(BOTH),
        BinaryKind::LessThan | BinaryKind::LessThanOrEqual => {
            Ok(if member_at_left { STOP } else { START })
        }
        BinaryKind::GreaterThan | BinaryKind::GreaterThanOrEqual => {
            Ok(if member_at_left { START } else { STOP })
        }
        other => Err(QueryError::UnsupportedTimeComparison(other.to_string())),
    }
}

/// Applies time-range candidates of one translation to the aggregator.
///
/// A repeated bound replaces the earlier one.
#[derive(Debug, Default)]
pub struct RangeClassifier {
    start_set: bool,
    stop_set: bool,
}

impl RangeClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a candidate; non-candidate parts are rejected
    pub fn apply(&mut self, candidate: &ExpressionPart, aggregator: &mut QueryAggregator) -> QueryResult<()> {
        let (bound, member_at_left, op) = match candidate {
            ExpressionPart::TimeRangeCandidate {
                left: None,
                right: Some(bound),
                op,
            } => (bound, true, *op),
            ExpressionPart::TimeRangeCandidate {
                left: Some(bound),
                right: None,
                op,
            } => (bound, false, *op),
            other => return Err(QueryError::unsupported(format!("{:?}", other), "TimeRange")),
        };

        let bounds = classify(op, member_at_left)?;
        let assignment = bound.to_flux()?;

        for target in bounds {
            match target {
                RangeBound::Start => {
                    let previous = aggregator.add_range_start(assignment.clone());
                    if self.start_set {
                        warn!(previous = %previous, current = %assignment, "range start overwritten");
                    }
                    self.start_set = true;
                }
                RangeBound::Stop => {
                    let previous = aggregator.add_range_stop(assignment.clone());
                    if let (true, Some(previous)) = (self.stop_set, previous) {
                        warn!(previous = %previous, current = %assignment, "range stop overwritten");
                    }
                    self.stop_set = true;
                }
            }
            debug!(bound = ?target, assignment = %assignment, op = %op, "time range bound assigned");
        }

        Ok(())
    }
}
