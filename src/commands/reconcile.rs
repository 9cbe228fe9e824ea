//! Reconciliation commands
//!
//! - `validate` - Check a declaration offline
//! - `plan` - Show what apply would change
//! - `apply` - Converge the tenant to the declaration
//! - `destroy` - Delete managed resources
//! - `refresh` - Record drift
//! - `import` - Bring an existing entity under management

use anyhow::{Context as AnyhowContext, Result, bail};
use declarative::{EntityKind, FieldSet, FieldValue, MemoryStore, Reconciler, ResourceAddress};
use gatewaykit::MemoryGateway;
use std::path::Path;

use super::{Session, cancel_token};
use crate::Context;
use crate::engine::{self, ExecuteOptions, Target, differ};
use crate::schema::Declaration;
use crate::ui;

/// Check a declaration against the schema without contacting the tenant
pub fn validate(_ctx: &Context, file: &Path) -> Result<()> {
    let declaration = Declaration::load(file)?;
    if declaration.is_empty() {
        ui::warn(&format!("{} declares no resources", file.display()));
        return Ok(());
    }

    // planning makes no remote call; an empty tenant and store are enough
    let gateway = MemoryGateway::new();
    let store = MemoryStore::new();
    let reconciler = Reconciler::new(&gateway, &store);
    let report = engine::plan(&declaration, &Target::default(), &reconciler, &store)?;

    if !report.is_valid() {
        for (address, error) in &report.invalid {
            ui::error(&format!("{address}: {error}"));
        }
        bail!("{} invalid resources in {}", report.invalid.len(), file.display());
    }

    ui::success(&format!(
        "{} is valid ({} resources)",
        file.display(),
        declaration.len()
    ));
    Ok(())
}

pub fn plan(ctx: &Context, file: &Path, target: Option<&str>, no_refresh: bool) -> Result<()> {
    let declaration = Declaration::load(file)?;
    let session = Session::open(ctx)?;
    let target = Target::parse(target);
    let opts = ExecuteOptions {
        jobs: ctx.settings.jobs,
        yes: false,
        refresh: ctx.settings.refresh_before_plan && !no_refresh,
        cancel: cancel_token(ctx, None),
    };

    if opts.refresh {
        let entries = engine::refresh(&session.gateway, &session.store, &target, &opts)?;
        differ::display_refresh(&entries, false);
    }

    let reconciler = Reconciler::new(&session.gateway, &session.store);
    let report = engine::plan(&declaration, &target, &reconciler, &session.store)?;
    differ::display_plan(&report);

    if !report.is_valid() {
        bail!("{} invalid resources in the declaration", report.invalid.len());
    }
    Ok(())
}

pub fn apply(
    ctx: &Context,
    file: &Path,
    target: Option<&str>,
    yes: bool,
    jobs: Option<usize>,
    timeout: Option<u64>,
) -> Result<()> {
    let declaration = Declaration::load(file)?;
    let session = Session::open(ctx)?;
    let opts = ExecuteOptions {
        jobs: jobs.unwrap_or(ctx.settings.jobs).max(1),
        yes,
        refresh: ctx.settings.refresh_before_plan,
        cancel: cancel_token(ctx, timeout),
    };

    let result = engine::apply(
        &declaration,
        &Target::parse(target),
        &session.gateway,
        &session.store,
        &opts,
    );
    session.save()?;

    let summary = result?;
    if !summary.is_success() {
        bail!("{} resources failed to apply", summary.failed);
    }
    Ok(())
}

pub fn destroy(ctx: &Context, target: Option<&str>, yes: bool) -> Result<()> {
    let session = Session::open(ctx)?;
    let opts = ExecuteOptions {
        jobs: ctx.settings.jobs,
        yes,
        refresh: false,
        cancel: cancel_token(ctx, None),
    };

    let result = engine::destroy(
        &Target::parse(target),
        &session.gateway,
        &session.store,
        &opts,
    );
    session.save()?;

    let summary = result?;
    if !summary.is_success() {
        bail!("{} resources failed to destroy", summary.failed);
    }
    Ok(())
}

pub fn refresh(ctx: &Context, target: Option<&str>) -> Result<()> {
    let session = Session::open(ctx)?;
    let opts = ExecuteOptions {
        jobs: ctx.settings.jobs,
        yes: true,
        refresh: true,
        cancel: cancel_token(ctx, None),
    };

    let entries = engine::refresh(&session.gateway, &session.store, &Target::parse(target), &opts)?;
    if entries.is_empty() {
        ui::info("No managed resources");
        return Ok(());
    }

    ui::header("Refresh");
    differ::display_refresh(&entries, ctx.verbose > 0);

    let failed = entries.iter().filter(|e| e.outcome.is_err()).count();
    if failed > 0 {
        bail!("{failed} resources could not be refreshed");
    }
    ui::success(&format!("Refreshed {} resources", entries.len()));
    Ok(())
}

pub fn import(ctx: &Context, address: &str, id: Option<&str>, filter: &[String]) -> Result<()> {
    let address = ResourceAddress::from(address);
    let (kind, name) = address.parts();
    if name.is_empty() {
        bail!("Address must look like 'kind.name', got '{address}'");
    }
    let kind: EntityKind = kind
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid address '{address}': {e}"))?;

    let session = Session::open(ctx)?;
    let reconciler = Reconciler::new(&session.gateway, &session.store)
        .with_cancel(cancel_token(ctx, None));

    let record = match id {
        Some(id) => reconciler.import(&address, kind, id)?,
        None if filter.is_empty() => bail!("Pass --id or at least one --filter key=value"),
        None => reconciler.adopt(&address, kind, &parse_filter(filter)?)?,
    };

    ui::success(&format!(
        "Imported {address} (id {})",
        record.id.as_deref().unwrap_or("?")
    ));
    for state in &record.members {
        ui::kv(
            &state.kind.to_string(),
            &format!("{} members, {} managed", state.observed.len(), state.managed.len()),
        );
    }
    Ok(())
}

/// Parse repeated `key=value` arguments
fn parse_filter(filter: &[String]) -> Result<FieldSet> {
    filter
        .iter()
        .map(|pair| {
            pair.split_once('=')
                .map(|(k, v)| (k.trim().to_string(), FieldValue::from(v.trim())))
                .with_context(|| format!("Filter must be key=value, got '{pair}'"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_filter() {
        let filter = parse_filter(&["key=read".to_string(), "name = Read".to_string()]).unwrap();
        assert_eq!(filter.get("key"), Some(&FieldValue::from("read")));
        assert_eq!(filter.get("name"), Some(&FieldValue::from("Read")));

        assert!(parse_filter(&["key".to_string()]).is_err());
    }
}
