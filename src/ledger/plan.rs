use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::store::PlanLine;
use crate::types::{PlanPriceType, PlanProductType};

/// the plan a subject is currently on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentPlan {
    pub product_type: PlanProductType,
    pub price_type: PlanPriceType,
}

/// pick the latest plan among candidate lines
///
/// Lines are ordered by `(created_at, sequence)`; equal timestamps fall back
/// to insertion sequence so the answer never depends on storage order.
/// Lines whose product is not a plan are ignored, as are plan lines billed
/// one-off, which have no recurring cadence to report.
pub fn select_current_plan<I>(lines: I) -> Option<CurrentPlan>
where
    I: IntoIterator<Item = PlanLine>,
{
    let mut latest: Option<PlanLine> = None;
    for line in lines {
        if !line.product_type.is_plan() {
            continue;
        }
        if line.price_type.plan().is_none() {
            warn!(
                product_type = ?line.product_type,
                sequence = line.sequence,
                "plan line without a recurring price ignored"
            );
            continue;
        }
        let newer = match &latest {
            Some(current) => (line.created_at, line.sequence) > (current.created_at, current.sequence),
            None => true,
        };
        if newer {
            latest = Some(line);
        }
    }

    let line = latest?;
    Some(CurrentPlan {
        product_type: line.product_type.plan()?,
        price_type: line.price_type.plan()?,
    })
}
