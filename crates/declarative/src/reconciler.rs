//! Per-resource reconciler
//!
//! Drives one entity (or one standalone association set) through
//! plan, apply and verify against a [`Gateway`], persisting the merged
//! observed state in a [`RecordStore`].
//!
//! Failure policy:
//! - validation errors are raised before any remote call and leave the record untouched
//! - transient failures and cancellation before a mutation leave the record untouched
//! - fatal failures annotate the stored record, whose state stays where it was
//! - `NotFound` on update or re-read removes the record; the next plan recreates the entity
//! - once the entity exists remotely, its id is always persisted, whatever fails afterwards

use crate::association::{AssociationReport, plan_members, reconcile_members};
use crate::cancel::CancelToken;
use crate::diff::{Operation, changed_fields, create_payload, plan_entity, update_payload};
use crate::error::{Error, Result};
use crate::gateway::{Gateway, GatewayCall, GatewayError, InlineMembers};
use crate::merge::merge_observed;
use crate::model::{
    DesiredAssociation, DesiredEntity, EntityKind, FieldSet, MemberBlock, ResourceAddress,
};
use crate::record::{Lifecycle, ReconciliationRecord, RecordStore, Subject};
use crate::schema::{association_spec, schema_for};
use crate::types::{ApplyOutcome, ApplyResult, RefreshOutcome, ResourcePlan};
use crate::validate::{Violation, validate_members};

/// Reconciles resources one at a time.
///
/// Safe to share across threads for resources that share no association
/// set. The caller guarantees at most one in-flight pass per
/// (association kind, parent id).
pub struct Reconciler<'a> {
    gateway: &'a dyn Gateway,
    store: &'a dyn RecordStore,
    cancel: CancelToken,
}

impl<'a> Reconciler<'a> {
    pub fn new(gateway: &'a dyn Gateway, store: &'a dyn RecordStore) -> Self {
        Self {
            gateway,
            store,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    // ========================================================================
    // Plan
    // ========================================================================

    /// Plan an entity against its recorded state. Makes no remote call.
    pub fn plan(&self, desired: &DesiredEntity) -> Result<ResourcePlan> {
        let record = self.load(&desired.address)?;
        self.plan_with(desired, record.as_ref())
    }

    fn plan_with(
        &self,
        desired: &DesiredEntity,
        record: Option<&ReconciliationRecord>,
    ) -> Result<ResourcePlan> {
        let address = &desired.address;
        let record = record.filter(|r| r.id.is_some());
        if let Some(r) = record
            && r.subject != Subject::Entity(desired.kind)
        {
            return Err(Error::validation(
                address,
                format!("address already tracks a {}", r.subject),
            ));
        }

        let schema = schema_for(desired.kind);
        let prior = record.map(|r| &r.observed);
        validate_members(schema, &desired.associations, prior.is_none())
            .map_err(|v| invalid(address, v))?;
        let operation =
            plan_entity(desired.kind, &desired.fields, prior).map_err(|v| invalid(address, v))?;

        let fresh = matches!(operation, Operation::Create | Operation::Replace { .. });
        let id = record.and_then(|r| r.id.clone());
        let parent = id.clone().unwrap_or_default();

        let members = schema
            .associations
            .iter()
            .map(|kind| {
                let state = if fresh {
                    None
                } else {
                    record.and_then(|r| r.member_state(*kind))
                };
                (*kind, plan_members(*kind, &parent, desired.block(*kind), state))
            })
            .filter(|(_, delta)| !delta.is_empty())
            .collect();

        Ok(ResourcePlan {
            address: address.clone(),
            subject: Subject::Entity(desired.kind),
            id,
            operation,
            members,
        })
    }

    /// Plan a standalone association set against its recorded state
    pub fn plan_association(&self, desired: &DesiredAssociation) -> Result<ResourcePlan> {
        validate_association(desired)?;
        let record = self.load(&desired.address)?;
        let state = record
            .as_ref()
            .filter(|r| r.id.as_deref() == Some(desired.parent_id.as_str()))
            .and_then(|r| r.member_state(desired.kind));

        let delta = plan_members(desired.kind, &desired.parent_id, &desired.block, state);
        Ok(ResourcePlan {
            address: desired.address.clone(),
            subject: Subject::Association(desired.kind),
            id: Some(desired.parent_id.clone()),
            operation: Operation::NoOp,
            members: if delta.is_empty() {
                Vec::new()
            } else {
                vec![(desired.kind, delta)]
            },
        })
    }

    // ========================================================================
    // Apply
    // ========================================================================

    /// Converge an entity and its embedded association blocks
    pub fn apply(&self, desired: &DesiredEntity) -> Result<ApplyOutcome> {
        let address = &desired.address;
        let existing = self.load(address)?;
        let plan = self.plan_with(desired, existing.as_ref())?;

        let mut record = existing
            .filter(|r| r.id.is_some())
            .unwrap_or_else(|| {
                ReconciliationRecord::new(address.clone(), Subject::Entity(desired.kind))
            });
        log::debug!("{address}: {} -> planned ({})", record.state, plan.operation);
        record.state = Lifecycle::Planned;

        let mut result = match &plan.operation {
            Operation::NoOp => ApplyResult::NoChange,
            Operation::Create => {
                self.create(desired, &mut record)?;
                ApplyResult::Created
            }
            Operation::Update { changed } => {
                self.update(desired, &mut record, changed)?;
                ApplyResult::Modified
            }
            Operation::Replace { .. } => {
                self.replace(desired, &mut record)?;
                ApplyResult::Replaced
            }
        };

        let members = self.reconcile_blocks(desired, &mut record)?;
        if result == ApplyResult::NoChange && members.iter().any(AssociationReport::has_changes) {
            result = ApplyResult::Modified;
        }

        let converged = self.verify(desired, &record);
        record.state = if converged {
            Lifecycle::Converged
        } else {
            Lifecycle::Created
        };
        record.last_error = None;
        self.save(&mut record)?;

        Ok(ApplyOutcome {
            address: address.clone(),
            result,
            operation: plan.operation,
            members,
            converged,
        })
    }

    fn create(&self, desired: &DesiredEntity, record: &mut ReconciliationRecord) -> Result<()> {
        let address = &desired.address;
        let kind = desired.kind;
        let schema = schema_for(kind);
        let (fields, post_create) = create_payload(schema, &desired.fields);
        let inline: InlineMembers = schema
            .associations
            .iter()
            .map(|k| association_spec(*k))
            .filter(|spec| spec.inline_on_create)
            .filter_map(|spec| {
                desired
                    .block(spec.kind)
                    .members()
                    .map(|m| (spec.kind, m.clone()))
            })
            .collect();

        record.state = Lifecycle::Creating;
        self.checkpoint(address, GatewayCall::Create)?;
        let created = self
            .gateway
            .create(kind, &fields, &inline)
            .map_err(remote(kind, address, None, GatewayCall::Create))?;
        log::info!("{address}: created {kind} (id {})", created.id);

        record.id = Some(created.id.clone());
        // create echoes little; what was sent is the best knowledge until the re-read
        let mut echoed = fields.clone();
        echoed.extend(created.fields.clone());
        record.observed = merge_observed(schema, &fields, &echoed, None);
        record.members.clear();
        for (association, members) in &inline {
            let state = record.member_state_mut(*association);
            state.observed = members.clone();
            state.managed = members.clone();
        }
        record.state = Lifecycle::Created;

        if !post_create.is_empty() {
            log::debug!(
                "{address}: setting {:?} after create",
                post_create.keys().collect::<Vec<_>>()
            );
            let sent = self
                .checkpoint(address, GatewayCall::Update)
                .and_then(|()| {
                    self.gateway
                        .update(kind, &created.id, &post_create)
                        .map_err(remote(kind, address, Some(created.id.as_str()), GatewayCall::Update))
                });
            if let Err(err) = sent {
                return Err(self.keep(record, err));
            }
            apply_sent(&mut record.observed, &post_create);
        }

        self.rederive(desired, record, None)
    }

    fn update(
        &self,
        desired: &DesiredEntity,
        record: &mut ReconciliationRecord,
        changed: &std::collections::BTreeSet<String>,
    ) -> Result<()> {
        let address = &desired.address;
        let kind = desired.kind;
        let id = record_id(record)?;
        let payload = update_payload(&desired.fields, &record.observed, changed);

        record.state = Lifecycle::Updating;
        self.checkpoint(address, GatewayCall::Update)?;
        let failed = remote(kind, address, Some(id.as_str()), GatewayCall::Update);
        match self.gateway.update(kind, &id, &payload) {
            Ok(_) => {}
            Err(e) if e.is_not_found() => return Err(self.vanished(address, failed(e))),
            Err(e) => return Err(self.annotate(address, failed(e))),
        }
        log::info!(
            "{address}: updated {kind} (id {id}): {:?}",
            payload.keys().collect::<Vec<_>>()
        );

        let prior = record.observed.clone();
        apply_sent(&mut record.observed, &payload);
        record.state = Lifecycle::Created;
        self.rederive(desired, record, Some(&prior))
    }

    fn replace(&self, desired: &DesiredEntity, record: &mut ReconciliationRecord) -> Result<()> {
        let address = &desired.address;
        let kind = desired.kind;
        let id = record_id(record)?;

        record.state = Lifecycle::Replacing;
        self.checkpoint(address, GatewayCall::Delete)?;
        record.state = Lifecycle::Deleting;
        match self.gateway.delete(kind, &id) {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => {
                let failed = remote(kind, address, Some(id.as_str()), GatewayCall::Delete);
                return Err(self.annotate(address, failed(e)));
            }
        }
        log::info!("{address}: deleted {kind} (id {id}) for replacement");

        // Absent from here on; a failing create leaves no record behind.
        self.forget(address)?;
        *record = ReconciliationRecord::new(address.clone(), Subject::Entity(kind));
        self.create(desired, record)
    }

    /// Re-read after a mutation and merge into the observed state.
    ///
    /// On failure other than `NotFound` the best-known state is persisted
    /// with the error, since the entity exists remotely.
    fn rederive(
        &self,
        desired: &DesiredEntity,
        record: &mut ReconciliationRecord,
        prior: Option<&FieldSet>,
    ) -> Result<()> {
        let address = &desired.address;
        let kind = desired.kind;
        let schema = schema_for(kind);
        let id = record_id(record)?;

        let read = self
            .checkpoint(address, GatewayCall::Get)
            .and_then(|()| {
                self.gateway
                    .get(kind, &id)
                    .map_err(remote(kind, address, Some(id.as_str()), GatewayCall::Get))
            });

        match read {
            Ok(read) => {
                record.observed = merge_observed(schema, &desired.fields, &read, prior);
                Ok(())
            }
            Err(err) if err.is_not_found() => Err(self.vanished(address, err)),
            Err(err) => {
                let best_known = record.observed.clone();
                record.observed = merge_observed(schema, &desired.fields, &best_known, prior);
                Err(self.keep(record, err))
            }
        }
    }

    fn reconcile_blocks(
        &self,
        desired: &DesiredEntity,
        record: &mut ReconciliationRecord,
    ) -> Result<Vec<AssociationReport>> {
        let Some(parent) = record.id.clone() else {
            return Ok(Vec::new());
        };

        let mut reports = Vec::new();
        for kind in schema_for(desired.kind).associations {
            let block = desired.block(*kind);
            if block.is_absent() {
                continue;
            }
            let state = record.member_state_mut(*kind);
            match reconcile_members(
                self.gateway,
                &self.cancel,
                &desired.address,
                *kind,
                &parent,
                block,
                state,
            ) {
                Ok(report) => reports.push(report),
                Err(err) => {
                    record.state = Lifecycle::Created;
                    return Err(self.keep(record, err));
                }
            }
        }
        Ok(reports)
    }

    /// Re-plan against the merged state. Not converging is a warning, not an error.
    fn verify(&self, desired: &DesiredEntity, record: &ReconciliationRecord) -> bool {
        let schema = schema_for(desired.kind);
        let drift = changed_fields(schema, &desired.fields, &record.observed);
        let parent = record.id.clone().unwrap_or_default();
        let pending_members: Vec<_> = schema
            .associations
            .iter()
            .filter(|kind| {
                !plan_members(**kind, &parent, desired.block(**kind), record.member_state(**kind))
                    .is_empty()
            })
            .collect();

        if drift.is_empty() && pending_members.is_empty() {
            return true;
        }
        log::warn!(
            "{}: not converged after apply (fields {:?}, members {:?}); the remote service may still be catching up",
            desired.address,
            drift,
            pending_members
        );
        false
    }

    /// Converge a standalone association set.
    ///
    /// When the parent id changed since the last cycle, members managed under
    /// the old parent are released first.
    pub fn apply_association(&self, desired: &DesiredAssociation) -> Result<ApplyOutcome> {
        validate_association(desired)?;
        let address = &desired.address;
        let kind = desired.kind;

        let existing = self.load(address)?;
        let existed = existing.is_some();
        let mut record = existing
            .unwrap_or_else(|| {
                ReconciliationRecord::new(address.clone(), Subject::Association(kind))
            });
        if record.subject != Subject::Association(kind) {
            return Err(Error::validation(
                address,
                format!("address already tracks a {}", record.subject),
            ));
        }

        let mut changed = false;
        if let Some(old) = record.id.clone().filter(|old| *old != desired.parent_id) {
            log::info!("{address}: parent changed from {old} to {}", desired.parent_id);
            let release = MemberBlock::declared(Vec::<String>::new());
            let state = record.member_state_mut(kind);
            match reconcile_members(self.gateway, &self.cancel, address, kind, &old, &release, state) {
                Ok(report) => changed |= report.has_changes(),
                // old parent is gone, and its memberships with it
                Err(err) if err.is_not_found() => {}
                Err(err) => return Err(self.keep(&mut record, err)),
            }
            record.members.clear();
        }
        record.id = Some(desired.parent_id.clone());

        let state = record.member_state_mut(kind);
        let report = match reconcile_members(
            self.gateway,
            &self.cancel,
            address,
            kind,
            &desired.parent_id,
            &desired.block,
            state,
        ) {
            Ok(report) => report,
            Err(err) => {
                let progressed = matches!(err, Error::PartialAssociation { ref report, .. } if report.has_changes());
                if existed || progressed {
                    return Err(self.keep(&mut record, err));
                }
                return Err(err);
            }
        };
        changed |= report.has_changes();

        let converged = plan_members(kind, &desired.parent_id, &desired.block, record.member_state(kind))
            .is_empty();
        record.state = if converged {
            Lifecycle::Converged
        } else {
            Lifecycle::Created
        };
        record.last_error = None;
        self.save(&mut record)?;

        Ok(ApplyOutcome {
            address: address.clone(),
            result: if changed {
                ApplyResult::Modified
            } else {
                ApplyResult::NoChange
            },
            operation: Operation::NoOp,
            members: vec![report],
            converged,
        })
    }

    // ========================================================================
    // Destroy, refresh, import
    // ========================================================================

    /// Delete the remote entity (or release the managed members of a
    /// standalone association set) and drop the record.
    pub fn destroy(&self, address: &ResourceAddress) -> Result<ApplyOutcome> {
        let Some(mut record) = self.load(address)? else {
            return Ok(ApplyOutcome {
                address: address.clone(),
                result: ApplyResult::NoChange,
                operation: Operation::NoOp,
                members: Vec::new(),
                converged: true,
            });
        };
        let id = record_id(&record)?;
        let mut members = Vec::new();

        match record.subject {
            Subject::Entity(kind) => {
                record.state = Lifecycle::Deleting;
                let deleted = self.checkpoint(address, GatewayCall::Delete).and_then(|()| {
                    match self.gateway.delete(kind, &id) {
                        Ok(()) => Ok(()),
                        Err(e) if e.is_not_found() => {
                            log::debug!("{address}: {kind} {id} already absent");
                            Ok(())
                        }
                        Err(e) => Err(remote(kind, address, Some(id.as_str()), GatewayCall::Delete)(e)),
                    }
                });
                if let Err(err) = deleted {
                    record.state = Lifecycle::Created;
                    return Err(self.keep(&mut record, err));
                }
                log::info!("{address}: deleted {kind} (id {id})");
            }
            Subject::Association(kind) => {
                let release = MemberBlock::declared(Vec::<String>::new());
                let state = record.member_state_mut(kind);
                match reconcile_members(self.gateway, &self.cancel, address, kind, &id, &release, state) {
                    Ok(report) => members.push(report),
                    Err(err) if err.is_not_found() => {}
                    Err(err) => return Err(self.keep(&mut record, err)),
                }
            }
        }

        self.forget(address)?;
        Ok(ApplyOutcome {
            address: address.clone(),
            result: ApplyResult::Removed,
            operation: Operation::NoOp,
            members,
            converged: true,
        })
    }

    /// Re-read a managed resource and record drift.
    ///
    /// A vanished entity drops its record so the next plan recreates it.
    pub fn refresh(&self, address: &ResourceAddress) -> Result<RefreshOutcome> {
        let Some(mut record) = self.load(address)? else {
            return Err(Error::validation(address, "not managed"));
        };
        let id = record_id(&record)?;
        let mut drifted = Vec::new();

        if let Subject::Entity(kind) = record.subject {
            let schema = schema_for(kind);
            self.checkpoint(address, GatewayCall::Get)?;
            let read = match self.gateway.get(kind, &id) {
                Ok(read) => read,
                Err(e) if e.is_not_found() => {
                    log::warn!("{address}: {kind} {id} no longer exists remotely");
                    self.forget(address)?;
                    return Ok(RefreshOutcome::Gone);
                }
                Err(e) => return Err(remote(kind, address, Some(id.as_str()), GatewayCall::Get)(e)),
            };

            let prior = record.observed.clone();
            record.observed = merge_observed(schema, &FieldSet::new(), &read, Some(&prior));
            drifted.extend(
                schema
                    .fields
                    .iter()
                    .filter(|f| !f.computed && prior.get(f.name) != record.observed.get(f.name))
                    .map(|f| f.name.to_string()),
            );
        }

        for state in &mut record.members {
            let kind = state.kind;
            self.checkpoint(address, GatewayCall::ListMembers)?;
            let members = match self.gateway.list_members(kind, &id) {
                Ok(members) => members,
                Err(e) if e.is_not_found() && matches!(record.subject, Subject::Association(_)) => {
                    log::warn!("{address}: parent {id} no longer exists remotely");
                    self.forget(address)?;
                    return Ok(RefreshOutcome::Gone);
                }
                Err(source) => {
                    return Err(Error::Remote {
                        subject: kind.to_string(),
                        address: address.to_string(),
                        id: Some(id.clone()),
                        call: GatewayCall::ListMembers,
                        source,
                    });
                }
            };
            if members != state.observed {
                drifted.push(kind.to_string());
            }
            state.managed.retain(|m| members.contains(m));
            state.observed = members;
        }

        if !drifted.is_empty() {
            log::warn!("{address}: drift in {drifted:?}");
            record.state = Lifecycle::Created;
        }
        self.save(&mut record)?;
        Ok(RefreshOutcome::Refreshed { drifted })
    }

    /// Bring an existing remote entity under management.
    ///
    /// Its current association members become managed, except marker-prefixed ones.
    pub fn import(
        &self,
        address: &ResourceAddress,
        kind: EntityKind,
        id: &str,
    ) -> Result<ReconciliationRecord> {
        if self.load(address)?.is_some() {
            return Err(Error::validation(address, "already managed"));
        }
        let schema = schema_for(kind);

        self.checkpoint(address, GatewayCall::Get)?;
        let read = self
            .gateway
            .get(kind, id)
            .map_err(remote(kind, address, Some(id), GatewayCall::Get))?;

        let mut record = ReconciliationRecord::new(address.clone(), Subject::Entity(kind));
        record.id = Some(id.to_string());
        record.observed = merge_observed(schema, &FieldSet::new(), &read, None);

        for association in schema.associations {
            let spec = association_spec(*association);
            self.checkpoint(address, GatewayCall::ListMembers)?;
            let members = self
                .gateway
                .list_members(*association, id)
                .map_err(remote(kind, address, Some(id), GatewayCall::ListMembers))?;
            let state = record.member_state_mut(*association);
            state.managed = members
                .iter()
                .filter(|m| !spec.is_marked_foreign(m))
                .cloned()
                .collect();
            state.observed = members;
        }

        record.state = Lifecycle::Created;
        self.save(&mut record)?;
        log::info!("{address}: imported {kind} (id {id})");
        Ok(record)
    }

    /// Find exactly one remote entity matching `filter` and import it
    pub fn adopt(
        &self,
        address: &ResourceAddress,
        kind: EntityKind,
        filter: &FieldSet,
    ) -> Result<ReconciliationRecord> {
        self.checkpoint(address, GatewayCall::List)?;
        let found = self
            .gateway
            .list(kind, filter)
            .map_err(remote(kind, address, None, GatewayCall::List))?;

        match found.as_slice() {
            [only] => self.import(address, kind, &only.id),
            [] => Err(Error::validation(
                address,
                format!("no remote {kind} matches {}", describe(filter)),
            )),
            many => Err(Error::validation(
                address,
                format!(
                    "{} remote {kind} entities match {}",
                    many.len(),
                    describe(filter)
                ),
            )),
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn checkpoint(&self, address: &ResourceAddress, before: GatewayCall) -> Result<()> {
        if self.cancel.is_cancelled() {
            log::debug!("{address}: cancelled before {before}");
            return Err(Error::Cancelled {
                address: address.to_string(),
                before,
            });
        }
        Ok(())
    }

    fn load(&self, address: &ResourceAddress) -> Result<Option<ReconciliationRecord>> {
        self.store
            .load(address)
            .map_err(|e| Error::store(address, e))
    }

    fn save(&self, record: &mut ReconciliationRecord) -> Result<()> {
        record.touch();
        self.store
            .save(record)
            .map_err(|e| Error::store(&record.address, e))
    }

    fn forget(&self, address: &ResourceAddress) -> Result<()> {
        self.store
            .remove(address)
            .map_err(|e| Error::store(address, e))
    }

    /// Persist `record` with `err` attached and hand the error back
    fn keep(&self, record: &mut ReconciliationRecord, err: Error) -> Error {
        record.last_error = Some(err.to_string());
        match self.save(record) {
            Ok(()) => err,
            Err(store_err) => {
                log::error!("{}: could not persist failure: {store_err}", record.address);
                err
            }
        }
    }

    /// Attach a fatal error to the stored record, leaving it otherwise as it was
    fn annotate(&self, address: &ResourceAddress, err: Error) -> Error {
        if err.is_retryable() {
            return err;
        }
        match self.load(address) {
            Ok(Some(mut stored)) => self.keep(&mut stored, err),
            Ok(None) => err,
            Err(store_err) => {
                log::error!("{address}: could not load record to annotate: {store_err}");
                err
            }
        }
    }

    /// The entity vanished remotely: drop the record, do not recreate in this pass
    fn vanished(&self, address: &ResourceAddress, err: Error) -> Error {
        log::warn!("{address}: no longer exists remotely; it will be recreated on the next plan");
        match self.forget(address) {
            Ok(()) => err,
            Err(store_err) => store_err,
        }
    }
}

fn remote<'e>(
    kind: EntityKind,
    address: &'e ResourceAddress,
    id: Option<&'e str>,
    call: GatewayCall,
) -> impl FnOnce(GatewayError) -> Error + 'e {
    move |source| Error::Remote {
        subject: kind.to_string(),
        address: address.to_string(),
        id: id.map(str::to_string),
        call,
        source,
    }
}

fn invalid(address: &ResourceAddress, violation: Violation) -> Error {
    Error::validation(address, violation.0)
}

fn record_id(record: &ReconciliationRecord) -> Result<String> {
    record
        .id
        .clone()
        .ok_or_else(|| Error::validation(&record.address, "record has no remote id"))
}

/// Reflect written fields in the observed state; an empty value clears
fn apply_sent(observed: &mut FieldSet, sent: &FieldSet) {
    for (name, value) in sent {
        if value.is_empty() {
            observed.remove(name);
        } else {
            observed.insert(name.clone(), value.clone());
        }
    }
}

fn validate_association(desired: &DesiredAssociation) -> Result<()> {
    let spec = association_spec(desired.kind);
    if desired.parent_id.trim().is_empty() {
        return Err(Error::validation(&desired.address, "parent id is empty"));
    }
    if let Some(members) = desired.block.members() {
        if members.iter().any(|m| m.trim().is_empty()) {
            return Err(Error::validation(&desired.address, "contains an empty member"));
        }
        if let Some(prefix) = spec.required_member_prefix
            && !members.iter().any(|m| m.starts_with(prefix))
        {
            return Err(Error::validation(
                &desired.address,
                format!("must contain at least one '{prefix}' member"),
            ));
        }
    }
    Ok(())
}

fn describe(filter: &FieldSet) -> String {
    filter
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join(", ")
}
