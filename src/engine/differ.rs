//! Plan display

use colored::{ColoredString, Colorize};
use declarative::{Operation, ReconciliationRecord, RefreshOutcome, ResourcePlan};
use std::collections::BTreeMap;

use super::executor::RefreshEntry;
use super::planner::PlanReport;

fn operation_symbol(plan: &ResourcePlan) -> ColoredString {
    match &plan.operation {
        Operation::Create => plan.operation.symbol().green(),
        Operation::Replace { .. } => plan.operation.symbol().red(),
        Operation::Update { .. } | Operation::NoOp => "~".yellow(),
    }
}

fn operation_detail(plan: &ResourcePlan) -> String {
    let id = plan
        .id
        .as_ref()
        .map(|id| format!("[{id}] "))
        .unwrap_or_default();
    match &plan.operation {
        Operation::NoOp => format!("{id}(members only)"),
        operation => format!("{id}({operation})"),
    }
}

/// Display the changes of a plan, grouped by kind
pub fn display_plan(report: &PlanReport) {
    let changes: Vec<&ResourcePlan> = report.changes().collect();
    if changes.is_empty() && report.invalid.is_empty() {
        println!();
        println!("  {} No changes needed", "✓".green());
        return;
    }

    let mut by_subject: BTreeMap<String, Vec<&ResourcePlan>> = BTreeMap::new();
    for plan in changes {
        by_subject
            .entry(plan.subject.to_string())
            .or_default()
            .push(plan);
    }

    println!();
    println!(
        "┌─ {} ─────────────────────────────────────────┐",
        "Reconciliation Plan".bold()
    );
    println!("│");

    for (subject, plans) in &by_subject {
        println!("│ {}", subject.bold());
        for plan in plans {
            println!(
                "│   {} {:<36} {}",
                operation_symbol(plan),
                plan.address.as_str(),
                operation_detail(plan).dimmed()
            );
            for (kind, delta) in &plan.members {
                let added = delta.to_add.iter().map(|m| format!("+{m}").green().to_string());
                let removed = delta
                    .to_remove
                    .iter()
                    .map(|m| format!("-{m}").red().to_string());
                println!(
                    "│       {}: {}",
                    kind.to_string().dimmed(),
                    removed.chain(added).collect::<Vec<_>>().join(" ")
                );
            }
        }
        println!("│");
    }

    if !report.invalid.is_empty() {
        println!("│ {}", "Invalid".red().bold());
        for (address, error) in &report.invalid {
            println!("│   {} {:<36} {}", "✗".red(), address.as_str(), error.dimmed());
        }
        println!("│");
    }

    let summary = report.summary();
    println!("├─────────────────────────────────────────────────────┤");
    println!(
        "│ Summary: {} to create, {} to update, {} to replace, {} member changes",
        summary.creates.to_string().green(),
        summary.updates.to_string().yellow(),
        summary.replaces.to_string().red(),
        (summary.member_additions + summary.member_removals)
            .to_string()
            .bold()
    );
    println!("└─────────────────────────────────────────────────────┘");
}

/// Display the records a destroy will remove
pub fn display_destroy(records: &[ReconciliationRecord]) {
    println!();
    println!(
        "┌─ {} ─────────────────────────────────────────┐",
        "Destroy".red().bold()
    );
    println!("│");
    for record in records {
        println!(
            "│   {} {:<36} {}",
            "-".red(),
            record.address.as_str(),
            record
                .id
                .as_ref()
                .map(|id| format!("[{id}]"))
                .unwrap_or_default()
                .dimmed()
        );
    }
    println!("│");
    println!("├─────────────────────────────────────────────────────┤");
    println!(
        "│ Summary: {} resources will be deleted",
        records.len().to_string().red().bold()
    );
    println!("└─────────────────────────────────────────────────────┘");
}

/// Display what a refresh found; unchanged resources are omitted unless `all`
pub fn display_refresh(entries: &[RefreshEntry], all: bool) {
    for entry in entries {
        match &entry.outcome {
            Ok(RefreshOutcome::Refreshed { drifted }) if drifted.is_empty() => {
                if all {
                    println!("  {} {}", "○".dimmed(), entry.address);
                }
            }
            Ok(RefreshOutcome::Refreshed { drifted }) => println!(
                "  {} {} {}",
                "~".yellow(),
                entry.address,
                format!("(drift: {})", drifted.join(", ")).dimmed()
            ),
            Ok(RefreshOutcome::Gone) => println!(
                "  {} {} {}",
                "-".red(),
                entry.address,
                "(gone remotely, will be recreated)".dimmed()
            ),
            Err(error) => println!("  {} {} {}", "✗".red(), entry.address, error.dimmed()),
        }
    }
}
