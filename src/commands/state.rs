//! Record inspection: `state list|show|rm`

use anyhow::{Result, bail};
use colored::Colorize;
use declarative::{Lifecycle, RecordStore, ReconciliationRecord, ResourceAddress};

use crate::Context;
use crate::state::FileStore;
use crate::ui;

fn open(ctx: &Context) -> Result<FileStore> {
    FileStore::open(&ctx.settings.state_path()?)
}

fn state_symbol(record: &ReconciliationRecord) -> colored::ColoredString {
    if record.last_error.is_some() {
        return "✗".red();
    }
    match record.state {
        Lifecycle::Converged => "✓".green(),
        Lifecycle::Created => "~".yellow(),
        _ => "○".dimmed(),
    }
}

pub fn list(ctx: &Context) -> Result<()> {
    let store = open(ctx)?;
    let records = store.list()?;
    if records.is_empty() {
        ui::info("No managed resources");
        return Ok(());
    }

    ui::header(&format!("Managed resources ({})", records.len()));
    for record in &records {
        println!(
            "  {} {:<40} {:<10} {}",
            state_symbol(record),
            record.address.as_str(),
            record.state.to_string(),
            record.id.as_deref().unwrap_or("-").dimmed()
        );
    }
    Ok(())
}

pub fn show(ctx: &Context, address: &str) -> Result<()> {
    let store = open(ctx)?;
    let address = ResourceAddress::from(address);
    let Some(record) = store.load(&address)? else {
        bail!("'{address}' is not managed");
    };

    ui::header(address.as_str());
    ui::kv("subject", &record.subject.to_string());
    ui::kv("id", record.id.as_deref().unwrap_or("-"));
    ui::kv("state", &record.state.to_string());
    ui::kv("updated", &record.updated_at.to_rfc3339());
    if let Some(error) = &record.last_error {
        ui::warn(&format!("last error: {error}"));
    }

    if !record.observed.is_empty() {
        ui::section("Observed fields");
        for (name, value) in &record.observed {
            ui::kv(name, &value.to_string());
        }
    }

    for state in &record.members {
        ui::section(&state.kind.to_string());
        for member in &state.observed {
            let marker = if state.managed.contains(member) {
                "managed".green()
            } else {
                "foreign".dimmed()
            };
            println!("  {member} {marker}");
        }
        if state.observed.is_empty() {
            ui::dim("(no members)");
        }
    }
    Ok(())
}

/// Forget a resource; the remote entity is left untouched
pub fn rm(ctx: &Context, address: &str) -> Result<()> {
    let store = open(ctx)?;
    let address = ResourceAddress::from(address);
    let Some(record) = store.load(&address)? else {
        bail!("'{address}' is not managed");
    };

    store.remove(&address)?;
    ui::success(&format!(
        "Forgot {address}{}",
        record
            .id
            .map(|id| format!(" (remote {id} left in place)"))
            .unwrap_or_default()
    ));
    Ok(())
}
