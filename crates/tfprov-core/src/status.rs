use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Position of a remote run in its lifecycle.
///
/// Statuses this build does not know about land in `Other` and are treated
/// as still in flight by both phase classifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RunStatus {
    Pending,
    Fetching,
    FetchingCompleted,
    PrePlanRunning,
    PrePlanCompleted,
    Queuing,
    PlanQueued,
    Planning,
    Planned,
    CostEstimating,
    CostEstimated,
    PolicyChecking,
    PolicyOverride,
    PolicySoftFailed,
    PolicyChecked,
    Confirmed,
    PostPlanRunning,
    PostPlanCompleted,
    PlannedAndFinished,
    PlannedAndSaved,
    ApplyQueued,
    Applying,
    Applied,
    Discarded,
    Errored,
    Canceled,
    ForceCanceled,
    Other(String),
}

const KNOWN_RUN_STATUSES: &[(&str, RunStatus)] = &[
    ("pending", RunStatus::Pending),
    ("fetching", RunStatus::Fetching),
    ("fetching_completed", RunStatus::FetchingCompleted),
    ("pre_plan_running", RunStatus::PrePlanRunning),
    ("pre_plan_completed", RunStatus::PrePlanCompleted),
    ("queuing", RunStatus::Queuing),
    ("plan_queued", RunStatus::PlanQueued),
    ("planning", RunStatus::Planning),
    ("planned", RunStatus::Planned),
    ("cost_estimating", RunStatus::CostEstimating),
    ("cost_estimated", RunStatus::CostEstimated),
    ("policy_checking", RunStatus::PolicyChecking),
    ("policy_override", RunStatus::PolicyOverride),
    ("policy_soft_failed", RunStatus::PolicySoftFailed),
    ("policy_checked", RunStatus::PolicyChecked),
    ("confirmed", RunStatus::Confirmed),
    ("post_plan_running", RunStatus::PostPlanRunning),
    ("post_plan_completed", RunStatus::PostPlanCompleted),
    ("planned_and_finished", RunStatus::PlannedAndFinished),
    ("planned_and_saved", RunStatus::PlannedAndSaved),
    ("apply_queued", RunStatus::ApplyQueued),
    ("applying", RunStatus::Applying),
    ("applied", RunStatus::Applied),
    ("discarded", RunStatus::Discarded),
    ("errored", RunStatus::Errored),
    ("canceled", RunStatus::Canceled),
    ("force_canceled", RunStatus::ForceCanceled),
];

impl RunStatus {
    pub fn parse(raw: &str) -> Self {
        KNOWN_RUN_STATUSES
            .iter()
            .find(|(name, _)| *name == raw)
            .map(|(_, status)| status.clone())
            .unwrap_or_else(|| RunStatus::Other(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        if let RunStatus::Other(raw) = self {
            return raw;
        }
        KNOWN_RUN_STATUSES
            .iter()
            .find(|(_, status)| status == self)
            .map(|(name, _)| *name)
            .unwrap_or("unknown")
    }

    /// Final statuses that did not produce the requested change.
    fn is_failure(&self) -> bool {
        matches!(
            self,
            RunStatus::Errored
                | RunStatus::Discarded
                | RunStatus::Canceled
                | RunStatus::ForceCanceled
        )
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for RunStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RunStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(RunStatus::parse(&raw))
    }
}

/// The two polling phases a run passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Plan,
    Apply,
}

/// What a single status observation means for the current phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Not terminal for this phase yet; poll again.
    Continue,
    Success,
    Failure,
}

impl RunPhase {
    /// Total classifier: every status maps to exactly one verdict.
    pub fn classify(self, status: &RunStatus) -> Verdict {
        if status.is_failure() {
            return Verdict::Failure;
        }
        let done = match self {
            RunPhase::Plan => matches!(
                status,
                RunStatus::Planned
                    | RunStatus::PlannedAndFinished
                    | RunStatus::PolicyChecked
                    | RunStatus::ApplyQueued
                    | RunStatus::Applying
                    | RunStatus::Applied
            ),
            RunPhase::Apply => matches!(
                status,
                RunStatus::Applied | RunStatus::PlannedAndFinished
            ),
        };
        if done {
            Verdict::Success
        } else {
            Verdict::Continue
        }
    }
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunPhase::Plan => write!(f, "plan"),
            RunPhase::Apply => write!(f, "apply"),
        }
    }
}

/// Ingestion status of a configuration version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationStatus {
    Pending,
    Fetching,
    Uploaded,
    Archived,
    Errored,
    Other(String),
}

impl ConfigurationStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "pending" => ConfigurationStatus::Pending,
            "fetching" => ConfigurationStatus::Fetching,
            "uploaded" => ConfigurationStatus::Uploaded,
            "archived" => ConfigurationStatus::Archived,
            "errored" => ConfigurationStatus::Errored,
            other => ConfigurationStatus::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ConfigurationStatus::Pending => "pending",
            ConfigurationStatus::Fetching => "fetching",
            ConfigurationStatus::Uploaded => "uploaded",
            ConfigurationStatus::Archived => "archived",
            ConfigurationStatus::Errored => "errored",
            ConfigurationStatus::Other(raw) => raw,
        }
    }

    /// `Success` once ingested, `Failure` if ingestion can no longer complete.
    pub fn verdict(&self) -> Verdict {
        match self {
            ConfigurationStatus::Uploaded => Verdict::Success,
            ConfigurationStatus::Errored | ConfigurationStatus::Archived => Verdict::Failure,
            _ => Verdict::Continue,
        }
    }
}

impl std::fmt::Display for ConfigurationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trips_known_statuses() {
        for (name, status) in KNOWN_RUN_STATUSES {
            assert_eq!(&RunStatus::parse(name), status);
            assert_eq!(status.as_str(), *name);
        }
    }

    #[test]
    fn unknown_status_is_preserved() {
        let status = RunStatus::parse("assessing");
        assert_eq!(status, RunStatus::Other("assessing".into()));
        assert_eq!(status.to_string(), "assessing");
    }

    #[test]
    fn plan_phase_success_statuses() {
        for raw in [
            "planned",
            "planned_and_finished",
            "policy_checked",
            "apply_queued",
            "applying",
            "applied",
        ] {
            assert_eq!(
                RunPhase::Plan.classify(&RunStatus::parse(raw)),
                Verdict::Success,
                "{raw}"
            );
        }
    }

    #[test]
    fn apply_phase_only_finishes_on_applied_or_planned_and_finished() {
        assert_eq!(
            RunPhase::Apply.classify(&RunStatus::Applied),
            Verdict::Success
        );
        assert_eq!(
            RunPhase::Apply.classify(&RunStatus::PlannedAndFinished),
            Verdict::Success
        );
        assert_eq!(
            RunPhase::Apply.classify(&RunStatus::Applying),
            Verdict::Continue
        );
        assert_eq!(
            RunPhase::Apply.classify(&RunStatus::Planned),
            Verdict::Continue
        );
    }

    #[test]
    fn errored_fails_both_phases() {
        assert_eq!(RunPhase::Plan.classify(&RunStatus::Errored), Verdict::Failure);
        assert_eq!(RunPhase::Apply.classify(&RunStatus::Errored), Verdict::Failure);
    }

    #[test]
    fn every_status_has_expected_verdict_per_phase() {
        use Verdict::{Continue, Failure, Success};

        // (status, plan verdict, apply verdict)
        let expected: &[(&str, Verdict, Verdict)] = &[
            ("pending", Continue, Continue),
            ("fetching", Continue, Continue),
            ("fetching_completed", Continue, Continue),
            ("pre_plan_running", Continue, Continue),
            ("pre_plan_completed", Continue, Continue),
            ("queuing", Continue, Continue),
            ("plan_queued", Continue, Continue),
            ("planning", Continue, Continue),
            ("planned", Success, Continue),
            ("cost_estimating", Continue, Continue),
            ("cost_estimated", Continue, Continue),
            ("policy_checking", Continue, Continue),
            ("policy_override", Continue, Continue),
            ("policy_soft_failed", Continue, Continue),
            ("policy_checked", Success, Continue),
            ("confirmed", Continue, Continue),
            ("post_plan_running", Continue, Continue),
            ("post_plan_completed", Continue, Continue),
            ("planned_and_finished", Success, Success),
            ("planned_and_saved", Continue, Continue),
            ("apply_queued", Success, Continue),
            ("applying", Success, Continue),
            ("applied", Success, Success),
            ("discarded", Failure, Failure),
            ("errored", Failure, Failure),
            ("canceled", Failure, Failure),
            ("force_canceled", Failure, Failure),
            ("something_new", Continue, Continue),
            ("", Continue, Continue),
        ];
        assert_eq!(
            expected.len(),
            KNOWN_RUN_STATUSES.len() + 2,
            "every known status needs an expectation"
        );

        for (raw, plan, apply) in expected {
            let status = RunStatus::parse(raw);
            assert_eq!(RunPhase::Plan.classify(&status), *plan, "plan: {raw:?}");
            assert_eq!(RunPhase::Apply.classify(&status), *apply, "apply: {raw:?}");
        }
    }

    #[test]
    fn abandoned_runs_fail_both_phases() {
        for raw in ["discarded", "canceled", "force_canceled"] {
            let status = RunStatus::parse(raw);
            assert_eq!(RunPhase::Plan.classify(&status), Verdict::Failure, "{raw}");
            assert_eq!(RunPhase::Apply.classify(&status), Verdict::Failure, "{raw}");
        }
    }

    #[test]
    fn transient_statuses_continue() {
        for raw in ["pending", "fetching", "plan_queued", "planning", "cost_estimating"] {
            assert_eq!(
                RunPhase::Plan.classify(&RunStatus::parse(raw)),
                Verdict::Continue,
                "{raw}"
            );
        }
    }

    #[test]
    fn configuration_status_verdicts() {
        assert_eq!(ConfigurationStatus::parse("uploaded").verdict(), Verdict::Success);
        assert_eq!(ConfigurationStatus::parse("errored").verdict(), Verdict::Failure);
        assert_eq!(ConfigurationStatus::parse("archived").verdict(), Verdict::Failure);
        assert_eq!(ConfigurationStatus::parse("fetching").verdict(), Verdict::Continue);
        assert_eq!(ConfigurationStatus::parse("pending").verdict(), Verdict::Continue);
    }

    #[test]
    fn run_status_deserializes_from_json_string() {
        let status: RunStatus = serde_json::from_str("\"apply_queued\"").unwrap();
        assert_eq!(status, RunStatus::ApplyQueued);
        assert_eq!(serde_json::to_string(&status).unwrap(), "\"apply_queued\"");
    }
}
