//! Admission controller
//!
//! Decides whether a job fits into the current quota headroom of its
//! namespace. The controller is a pure function of the job and the quota
//! snapshot; it performs no I/O.

use sluice_core::domain::job::JobRecord;
use sluice_core::domain::quota::{NamespaceQuotaView, ResourceRequirements};
use sluice_core::domain::workload::WorkloadCall;

/// Outcome of an admission check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// The job fits; carries what it will consume
    Admit(ResourceRequirements),
    Deny(DenyReason),
}

/// Why a job was not admitted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    /// Not enough headroom right now; retry later
    QuotaExceeded(String),
    /// The job can never be admitted as written
    Invalid(String),
}

/// Admission controller
///
/// A dimension the quota does not track never blocks admission. A job asking
/// for more than a dimension's hard limit waits like any other denied job,
/// since the limit itself may be raised.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdmissionController;

impl AdmissionController {
    pub fn new() -> Self {
        Self
    }

    pub fn try_admit(&self, job: &JobRecord, quota: &NamespaceQuotaView) -> Decision {
        if let Err(e) = WorkloadCall::from_definition(&job.definition) {
            return Decision::Deny(DenyReason::Invalid(e.to_string()));
        }

        let requirements = match ResourceRequirements::from_definition(&job.definition) {
            Ok(requirements) => requirements,
            Err(e) => return Decision::Deny(DenyReason::Invalid(e.to_string())),
        };

        for (name, required) in requirements.iter() {
            let Some(dimension) = quota.dimension(name) else {
                continue;
            };

            if required > dimension.hard {
                return Decision::Deny(DenyReason::QuotaExceeded(format!(
                    "requires {} {} which is above the namespace limit of {}",
                    required, name, dimension.hard
                )));
            }

            if required > dimension.headroom() {
                return Decision::Deny(DenyReason::QuotaExceeded(format!(
                    "requires {} {} but only {} of {} available",
                    required,
                    name,
                    dimension.headroom(),
                    dimension.hard
                )));
            }
        }

        Decision::Admit(requirements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use sluice_core::domain::quota::COUNT_DIMENSION;
    use uuid::Uuid;

    fn job(definition: serde_json::Value) -> JobRecord {
        JobRecord::new(Uuid::new_v4(), 1, definition, Utc::now())
    }

    fn units(n: u64) -> JobRecord {
        job(json!({ "method": "run", "parameters": {}, "resources": { "units": n } }))
    }

    #[test]
    fn test_admits_when_headroom_suffices() {
        let quota = NamespaceQuotaView::new("ns").with_dimension("units", 10, 8);
        let decision = AdmissionController::new().try_admit(&units(2), &quota);

        match decision {
            Decision::Admit(req) => assert_eq!(req.get("units"), 2),
            other => panic!("expected admit, got {:?}", other),
        }
    }

    #[test]
    fn test_denies_when_headroom_is_short() {
        let quota = NamespaceQuotaView::new("ns").with_dimension("units", 10, 8);
        assert!(matches!(
            AdmissionController::new().try_admit(&units(4), &quota),
            Decision::Deny(DenyReason::QuotaExceeded(_))
        ));
    }

    #[test]
    fn test_every_tracked_dimension_must_fit() {
        let quota = NamespaceQuotaView::new("ns")
            .with_dimension("cpu", 4000, 1000)
            .with_dimension(COUNT_DIMENSION, 3, 3);
        let small = job(json!({
            "method": "run",
            "parameters": {},
            "resources": { "cpu": "500m" }
        }));

        assert!(matches!(
            AdmissionController::new().try_admit(&small, &quota),
            Decision::Deny(DenyReason::QuotaExceeded(msg)) if msg.contains(COUNT_DIMENSION)
        ));
    }

    #[test]
    fn test_untracked_dimensions_do_not_block() {
        let quota = NamespaceQuotaView::new("ns").with_dimension("units", 10, 0);
        let job = job(json!({
            "method": "run",
            "parameters": {},
            "resources": { "units": 1, "gpu": 8 }
        }));
        assert!(matches!(
            AdmissionController::new().try_admit(&job, &quota),
            Decision::Admit(_)
        ));
    }

    #[test]
    fn test_malformed_definition_is_invalid() {
        let quota = NamespaceQuotaView::new("ns");
        for definition in [
            json!("run"),
            json!({ "method": "run", "parameters": {}, "resources": { "memory": "huge" } }),
        ] {
            assert!(matches!(
                AdmissionController::new().try_admit(&job(definition), &quota),
                Decision::Deny(DenyReason::Invalid(_))
            ));
        }
    }

    #[test]
    fn test_incomplete_workload_call_is_invalid() {
        let quota = NamespaceQuotaView::new("ns").with_dimension("units", 10, 0);
        for definition in [
            json!({ "parameters": {}, "resources": { "units": 1 } }),
            json!({ "method": "run", "resources": { "units": 1 } }),
            json!({ "method": "run", "parameters": "{ not json", "resources": { "units": 1 } }),
        ] {
            assert!(matches!(
                AdmissionController::new().try_admit(&job(definition), &quota),
                Decision::Deny(DenyReason::Invalid(_))
            ));
        }
    }

    #[test]
    fn test_requirement_above_hard_limit_waits() {
        let quota = NamespaceQuotaView::new("ns").with_dimension("units", 3, 0);
        assert!(matches!(
            AdmissionController::new().try_admit(&units(4), &quota),
            Decision::Deny(DenyReason::QuotaExceeded(msg)) if msg.contains("limit of 3")
        ));
    }

    #[test]
    fn test_over_committed_namespace_denies_without_underflow() {
        let quota = NamespaceQuotaView::new("ns").with_dimension("units", 5, 7);
        assert!(matches!(
            AdmissionController::new().try_admit(&units(1), &quota),
            Decision::Deny(DenyReason::QuotaExceeded(_))
        ));
    }
}
