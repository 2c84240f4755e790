use std::fmt::Write;

use tfprov_pipeline::ProvisionReport;

/// Human-readable summary followed by one `name = value` line per output.
pub fn text(report: &ProvisionReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Workspace {} ({}) run {}: {}",
        report.workspace, report.workspace_id, report.run_id, report.status
    );
    match &report.commit {
        Some(commit) => {
            let _ = writeln!(out, "Committed {} as {}", report.files.join(", "), commit.id);
        }
        None => {
            let _ = writeln!(out, "Staged {}", report.files.join(", "));
        }
    }
    if report.outputs.is_empty() {
        return out;
    }
    let width = report.outputs.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
    for (name, value) in report.outputs.iter() {
        let _ = writeln!(out, "{name:<width$} = {value}");
    }
    out
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tfprov_core::{OutputSet, RunStatus, StateOutput};
    use tfprov_pipeline::metrics::MetricsSnapshot;

    use super::*;

    #[test]
    fn renders_outputs_aligned() {
        let outputs = OutputSet::filter(
            vec![
                StateOutput {
                    name: "vpc_id".into(),
                    value: json!("vpc-123"),
                    sensitive: false,
                },
                StateOutput {
                    name: "subnet_ids".into(),
                    value: json!(["a"]),
                    sensitive: false,
                },
            ],
            &["vpc_id".to_string(), "subnet_ids".to_string()],
        );
        let report = ProvisionReport {
            workspace: "network".into(),
            workspace_id: "ws-1".into(),
            run_id: "run-1".into(),
            status: RunStatus::Applied,
            destination: "network".into(),
            files: vec!["network/main.tf".into()],
            commit: None,
            outputs,
            metrics: MetricsSnapshot::default(),
        };

        assert_eq!(
            text(&report),
            "Workspace network (ws-1) run run-1: applied\n\
             Staged network/main.tf\n\
             subnet_ids = [\"a\"]\n\
             vpc_id     = \"vpc-123\"\n"
        );
    }
}
