//! Execution engine - staged, parallel reconciliation with UI integration

use anyhow::{Context as AnyhowContext, Result, bail};
use colored::Colorize;
use declarative::{
    ApplyOutcome, ApplyResult, CancelToken, Error, ExecuteSummary, Gateway, RecordStore,
    Reconciler, RefreshOutcome, ResourceAddress,
};
use rayon::prelude::*;
use std::sync::{Arc, Mutex};

use crate::progress;
use crate::schema::Declaration;

use super::differ::{display_destroy, display_plan, display_refresh};
use super::planner::{self, Ids, Item, Target, stage_of};

/// Options for execution
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Number of parallel jobs per stage
    pub jobs: usize,
    /// Skip confirmation prompts
    pub yes: bool,
    /// Re-read managed resources before planning
    pub refresh: bool,
    pub cancel: CancelToken,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            jobs: 4,
            yes: false,
            refresh: true,
            cancel: CancelToken::new(),
        }
    }
}

/// What refreshing one record found
#[derive(Debug)]
pub struct RefreshEntry {
    pub address: ResourceAddress,
    pub outcome: std::result::Result<RefreshOutcome, String>,
}

// ============================================================================
// Apply
// ============================================================================

/// Converge the selected resources of `declaration`, stage by stage
pub fn apply(
    declaration: &Declaration,
    target: &Target,
    gateway: &dyn Gateway,
    store: &dyn RecordStore,
    opts: &ExecuteOptions,
) -> Result<ExecuteSummary> {
    if opts.refresh {
        let entries = refresh(gateway, store, target, opts)?;
        display_refresh(&entries, false);
    }

    // 1. Plan against recorded state and show it
    let reconciler = Reconciler::new(gateway, store).with_cancel(opts.cancel.clone());
    let report = planner::plan(declaration, target, &reconciler, store)?;
    display_plan(&report);

    if !report.is_valid() {
        bail!(
            "{} invalid resources in the declaration; nothing was applied",
            report.invalid.len()
        );
    }
    let changes = report.changes().count();
    if changes == 0 {
        return Ok(ExecuteSummary::default());
    }

    // 2. Confirm (unless --yes)
    if !opts.yes && !confirm_proceed(true)? {
        println!();
        println!("  {} Aborted", "✗".red());
        return Ok(ExecuteSummary {
            skipped: changes,
            ..Default::default()
        });
    }

    // 3. Apply stage by stage; references resolve against ids recorded so far
    let stages = planner::stages(declaration, target);
    let mut summary = ExecuteSummary::default();
    for (index, stage) in stages.iter().enumerate() {
        let ids = Ids::snapshot(store, false)?;
        println!();
        println!(
            "  {} Stage {}/{}: applying {} resources...",
            "→".cyan(),
            index + 1,
            stages.len(),
            stage.len()
        );

        let results = execute_parallel(stage, opts.jobs, "Applying", |item| {
            (item.address().clone(), apply_item(&reconciler, &ids, item))
        })?;
        merge_summary(&mut summary, &results);
    }

    print_summary(&summary, "applied");
    Ok(summary)
}

fn apply_item(reconciler: &Reconciler<'_>, ids: &Ids, item: &Item<'_>) -> ApplyResult {
    let outcome = match item {
        Item::Entity(entity) => match ids.entity(entity) {
            Ok(resolved) => reconciler.apply(&resolved),
            Err(waiting) => return waiting_on(item.address(), &waiting),
        },
        Item::Association(block) => match ids.association(block) {
            Ok(resolved) => reconciler.apply_association(&resolved),
            Err(waiting) => return waiting_on(item.address(), &waiting),
        },
    };
    outcome_result(item.address(), outcome)
}

fn waiting_on(address: &ResourceAddress, waiting: &ResourceAddress) -> ApplyResult {
    log::warn!("{address}: skipped, {waiting} has no remote id");
    ApplyResult::Skipped {
        reason: format!("{waiting} has no remote id"),
    }
}

fn outcome_result(
    address: &ResourceAddress,
    outcome: declarative::Result<ApplyOutcome>,
) -> ApplyResult {
    match outcome {
        Ok(outcome) => {
            if outcome.result.is_change() {
                log::info!("{address}: {:?}", outcome.result);
            }
            outcome.result
        }
        Err(err @ Error::Cancelled { .. }) => ApplyResult::Skipped {
            reason: err.to_string(),
        },
        Err(err) => {
            log::error!("{err}");
            ApplyResult::Failed {
                error: err.to_string(),
            }
        }
    }
}

// ============================================================================
// Destroy
// ============================================================================

/// Delete the selected managed resources, dependents first
pub fn destroy(
    target: &Target,
    gateway: &dyn Gateway,
    store: &dyn RecordStore,
    opts: &ExecuteOptions,
) -> Result<ExecuteSummary> {
    let records: Vec<_> = store
        .list()?
        .into_iter()
        .filter(|r| target.matches(&r.address))
        .collect();

    if records.is_empty() {
        println!();
        println!("  {} Nothing to destroy", "✓".green());
        return Ok(ExecuteSummary::default());
    }

    display_destroy(&records);
    if !opts.yes && !confirm_proceed(false)? {
        println!();
        println!("  {} Aborted", "✗".red());
        return Ok(ExecuteSummary {
            skipped: records.len(),
            ..Default::default()
        });
    }

    let reconciler = Reconciler::new(gateway, store).with_cancel(opts.cancel.clone());
    let mut summary = ExecuteSummary::default();
    for stage in (0..=planner::ENTITY_STAGES.len()).rev() {
        let addresses: Vec<ResourceAddress> = records
            .iter()
            .filter(|r| stage_of(r.subject) == stage)
            .map(|r| r.address.clone())
            .collect();
        if addresses.is_empty() {
            continue;
        }

        let results = execute_parallel(&addresses, opts.jobs, "Destroying", |address| {
            (address.clone(), outcome_result(address, reconciler.destroy(address)))
        })?;
        merge_summary(&mut summary, &results);
    }

    print_summary(&summary, "destroyed");
    Ok(summary)
}

// ============================================================================
// Refresh
// ============================================================================

/// Re-read the selected managed resources and record drift
pub fn refresh(
    gateway: &dyn Gateway,
    store: &dyn RecordStore,
    target: &Target,
    opts: &ExecuteOptions,
) -> Result<Vec<RefreshEntry>> {
    let addresses: Vec<ResourceAddress> = store
        .list()?
        .into_iter()
        .map(|r| r.address)
        .filter(|a| target.matches(a))
        .collect();
    if addresses.is_empty() {
        return Ok(Vec::new());
    }

    let reconciler = Reconciler::new(gateway, store).with_cancel(opts.cancel.clone());
    let mut entries = execute_parallel(&addresses, opts.jobs, "Refreshing", |address| {
        let outcome = reconciler.refresh(address).map_err(|e| {
            log::warn!("{e}");
            e.to_string()
        });
        RefreshEntry {
            address: address.clone(),
            outcome,
        }
    })?;
    entries.sort_by(|a, b| a.address.cmp(&b.address));
    Ok(entries)
}

// ============================================================================
// Parallel execution
// ============================================================================

trait Symbol {
    fn symbol(&self) -> &'static str;
}

impl Symbol for (ResourceAddress, ApplyResult) {
    fn symbol(&self) -> &'static str {
        match &self.1 {
            ApplyResult::NoChange => "○",
            ApplyResult::Created
            | ApplyResult::Modified
            | ApplyResult::Replaced
            | ApplyResult::Removed => "✓",
            ApplyResult::Failed { .. } => "✗",
            ApplyResult::Skipped { .. } => "⊘",
        }
    }
}

impl Symbol for RefreshEntry {
    fn symbol(&self) -> &'static str {
        match &self.outcome {
            Ok(RefreshOutcome::Refreshed { drifted }) if drifted.is_empty() => "○",
            Ok(_) => "~",
            Err(_) => "✗",
        }
    }
}

/// Run `run` over `items` on a pool of `jobs` threads
fn execute_parallel<T, R, F>(items: &[T], jobs: usize, prefix: &str, run: F) -> Result<Vec<R>>
where
    T: Sync,
    R: Send + Symbol + AddressOf,
    F: Fn(&T) -> R + Sync,
{
    let pb = progress::bar(items.len() as u64, prefix);
    let results: Arc<Mutex<Vec<R>>> = Arc::new(Mutex::new(Vec::new()));

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs)
        .build()
        .context("Failed to create reconciliation thread pool")?;

    pool.install(|| {
        items.par_iter().for_each(|item| {
            let result = run(item);
            pb.set_message(format!("{} {}", result.symbol(), result.address()));
            pb.inc(1);
            push_result(&results, result);
        });
    });

    pb.finish_and_clear();

    into_results(results)
}

trait AddressOf {
    fn address(&self) -> &ResourceAddress;
}

impl AddressOf for (ResourceAddress, ApplyResult) {
    fn address(&self) -> &ResourceAddress {
        &self.0
    }
}

impl AddressOf for RefreshEntry {
    fn address(&self) -> &ResourceAddress {
        &self.address
    }
}

fn push_result<R>(results: &Arc<Mutex<Vec<R>>>, result: R) {
    match results.lock() {
        Ok(mut locked) => locked.push(result),
        Err(poisoned) => poisoned.into_inner().push(result),
    }
}

fn into_results<R>(results: Arc<Mutex<Vec<R>>>) -> Result<Vec<R>> {
    let mutex = Arc::try_unwrap(results)
        .map_err(|_| anyhow::anyhow!("Failed to collect results: shared result state"))?;

    match mutex.into_inner() {
        Ok(collected) => Ok(collected),
        Err(poisoned) => Ok(poisoned.into_inner()),
    }
}

/// Merge results into summary, reporting failures and skips
fn merge_summary(summary: &mut ExecuteSummary, results: &[(ResourceAddress, ApplyResult)]) {
    let mut results: Vec<_> = results.iter().collect();
    results.sort_by(|a, b| a.0.cmp(&b.0));
    for (address, result) in results {
        match result {
            ApplyResult::Failed { error } => {
                println!("    {} {} {}", "✗".red(), address, error.dimmed());
            }
            ApplyResult::Skipped { reason } => {
                println!("    {} {} {}", "⊘".yellow(), address, reason.dimmed());
            }
            _ => {}
        }
        summary.add_result(result);
    }
}

/// Confirm with user
fn confirm_proceed(default: bool) -> Result<bool> {
    use dialoguer::Confirm;

    let confirmed = Confirm::new()
        .with_prompt("Continue?")
        .default(default)
        .interact()?;

    Ok(confirmed)
}

/// Print final summary
fn print_summary(summary: &ExecuteSummary, verb: &str) {
    println!();
    if summary.is_success() {
        println!(
            "  {} Configuration {verb} successfully!",
            "✓".green().bold()
        );
    } else {
        println!("  {} Configuration {verb} with errors", "⚠".yellow().bold());
    }

    if summary.created > 0 {
        println!("    • {} resources created", summary.created);
    }
    if summary.modified > 0 {
        println!("    • {} resources modified", summary.modified);
    }
    if summary.replaced > 0 {
        println!("    • {} resources replaced", summary.replaced);
    }
    if summary.removed > 0 {
        println!("    • {} resources removed", summary.removed);
    }
    if summary.skipped > 0 {
        println!("    • {} resources skipped", summary.skipped);
    }
    if summary.failed > 0 {
        println!("    • {} {} failed", summary.failed, "resources".red());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::{EntityKind, MemoryStore};
    use gatewaykit::MemoryGateway;

    const DECLARATION: &str = r#"
[permission.read]
name = "Read"
key = "read"

[role.reader]
name = "Reader"
key = "reader"
description = "Read-only access"
permissions = ["@permission.read"]

[user.alice]
identities = ["email:alice@example.com"]

[organization.acme]
name = "Acme"
code = "org_acme"
members = ["@user.alice"]

[organization_user_roles.alice-at-acme]
organization = "@organization.acme"
user = "@user.alice"
roles = ["@role.reader"]
"#;

    fn options() -> ExecuteOptions {
        ExecuteOptions {
            jobs: 2,
            yes: true,
            refresh: true,
            cancel: CancelToken::new(),
        }
    }

    #[test]
    fn push_result_handles_poisoned_mutex() {
        let results: Arc<Mutex<Vec<ApplyResult>>> = Arc::new(Mutex::new(Vec::new()));
        let poisoned = Arc::clone(&results);

        let _ = std::thread::spawn(move || {
            let _guard = poisoned
                .lock()
                .expect("lock should succeed before poisoning");
            panic!("intentional poison");
        })
        .join();

        push_result(&results, ApplyResult::NoChange);

        let len = match results.lock() {
            Ok(locked) => locked.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        };
        assert_eq!(len, 1);
    }

    #[test]
    fn into_results_recovers_from_poisoned_mutex() {
        let results: Arc<Mutex<Vec<ApplyResult>>> = Arc::new(Mutex::new(Vec::new()));
        let poisoned = Arc::clone(&results);

        let _ = std::thread::spawn(move || {
            let mut guard = poisoned
                .lock()
                .expect("lock should succeed before poisoning");
            guard.push(ApplyResult::NoChange);
            panic!("intentional poison");
        })
        .join();

        let collected = into_results(results).expect("poisoned mutex should be recovered");
        assert_eq!(collected.len(), 1);
    }

    #[test]
    fn apply_resolves_references_across_stages() {
        let declaration = Declaration::parse(DECLARATION).unwrap();
        let gateway = MemoryGateway::new();
        let store = MemoryStore::new();

        let summary =
            apply(&declaration, &Target::default(), &gateway, &store, &options()).unwrap();
        assert!(summary.is_success(), "{summary:?}");
        assert_eq!(summary.created, 4);
        assert_eq!(summary.modified, 1);

        let role = store
            .load(&ResourceAddress::from("role.reader"))
            .unwrap()
            .unwrap();
        let permission = store
            .load(&ResourceAddress::from("permission.read"))
            .unwrap()
            .unwrap();
        assert_eq!(
            role.observed_members(declarative::AssociationKind::RolePermissions),
            [permission.id.unwrap()].into_iter().collect()
        );

        let user = store
            .load(&ResourceAddress::from("user.alice"))
            .unwrap()
            .unwrap();
        let user_id = user.id.unwrap();
        let roles = gateway.members(
            declarative::AssociationKind::OrganizationUserRoles,
            &format!("org_acme:{user_id}"),
        );
        assert_eq!(roles, [role.id.unwrap()].into_iter().collect());

        let again = apply(&declaration, &Target::default(), &gateway, &store, &options()).unwrap();
        assert_eq!(again, ExecuteSummary::default());
    }

    #[test]
    fn apply_skips_resources_waiting_on_a_failed_dependency() {
        let declaration = Declaration::parse(DECLARATION).unwrap();
        let gateway = MemoryGateway::new();
        gateway.inject(
            gatewaykit::Fault::new(
                declarative::GatewayCall::Create,
                declarative::GatewayError::fatal("permission quota exceeded"),
            )
            .on("permission"),
        );
        let store = MemoryStore::new();

        let summary =
            apply(&declaration, &Target::default(), &gateway, &store, &options()).unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.created, 2);
        assert!(gateway.ids(EntityKind::Role).is_empty());
        assert!(
            store
                .load(&ResourceAddress::from("role.reader"))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn invalid_declaration_makes_no_remote_call() {
        let declaration = Declaration::parse("[user.bob]\nidentities = [\"phone:1\"]\n").unwrap();
        let gateway = MemoryGateway::new();
        let store = MemoryStore::new();

        assert!(apply(&declaration, &Target::default(), &gateway, &store, &options()).is_err());
        assert!(gateway.calls().is_empty());
    }

    #[test]
    fn destroy_removes_dependents_first() {
        let declaration = Declaration::parse(DECLARATION).unwrap();
        let gateway = MemoryGateway::new();
        let store = MemoryStore::new();
        apply(&declaration, &Target::default(), &gateway, &store, &options()).unwrap();
        gateway.take_calls();

        let summary = destroy(&Target::default(), &gateway, &store, &options()).unwrap();
        assert!(summary.is_success(), "{summary:?}");
        assert_eq!(summary.removed, 5);
        assert!(store.list().unwrap().is_empty());

        let calls = gateway.calls();
        let position = |prefix: &str| calls.iter().position(|c| c.starts_with(prefix));
        assert!(position("remove organization_user_roles") < position("delete organization"));
        assert!(position("delete organization") < position("delete user"));
        assert!(position("delete role") < position("delete permission"));
    }

    #[test]
    fn refresh_reports_vanished_entities() {
        let declaration = Declaration::parse(DECLARATION).unwrap();
        let gateway = MemoryGateway::new();
        let store = MemoryStore::new();
        apply(
            &declaration,
            &Target::parse(Some("permission")),
            &gateway,
            &store,
            &options(),
        )
        .unwrap();

        let id = gateway.ids(EntityKind::Permission).remove(0);
        gateway.remove_entity(EntityKind::Permission, &id);

        let entries = refresh(&gateway, &store, &Target::default(), &options()).unwrap();
        assert_eq!(entries.len(), 1);
        assert!(matches!(entries[0].outcome, Ok(RefreshOutcome::Gone)));
        assert!(store.list().unwrap().is_empty());
    }
}
