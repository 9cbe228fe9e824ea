//! Association reconciler
//!
//! Applies the member delta of one association set one member at a time:
//! removals first, then additions, each in ascending member order. The
//! first failure aborts the cycle; the report says which member operations
//! were applied, which failed and which were never attempted.

use crate::cancel::CancelToken;
use crate::diff::{AssociationDelta, plan_associations};
use crate::error::{Error, Result};
use crate::gateway::{Gateway, GatewayCall, GatewayError};
use crate::model::{AssociationKind, MemberBlock, ResourceAddress};
use crate::record::MemberState;
use crate::schema::{AssociationSpec, association_spec};
use std::collections::BTreeSet;
use std::fmt;

/// Direction of one member operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberAction {
    Add,
    Remove,
}

impl MemberAction {
    fn call(self) -> GatewayCall {
        match self {
            Self::Add => GatewayCall::AddMember,
            Self::Remove => GatewayCall::RemoveMember,
        }
    }
}

/// Result of one member operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberResult {
    Applied,
    Failed { error: String },
    NotAttempted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberOutcome {
    pub action: MemberAction,
    pub member: String,
    pub result: MemberResult,
}

/// Per-member outcomes of one association cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationReport {
    pub kind: AssociationKind,
    pub parent_id: String,
    pub outcomes: Vec<MemberOutcome>,
}

impl AssociationReport {
    pub fn new(kind: AssociationKind, parent_id: &str) -> Self {
        Self {
            kind,
            parent_id: parent_id.to_string(),
            outcomes: Vec::new(),
        }
    }

    fn count(&self, pred: impl Fn(&MemberResult) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.result)).count()
    }

    pub fn applied(&self) -> usize {
        self.count(|r| matches!(r, MemberResult::Applied))
    }

    pub fn failed(&self) -> impl Iterator<Item = &MemberOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.result, MemberResult::Failed { .. }))
    }

    pub fn not_attempted(&self) -> usize {
        self.count(|r| matches!(r, MemberResult::NotAttempted))
    }

    pub fn has_changes(&self) -> bool {
        self.applied() > 0
    }
}

impl fmt::Display for AssociationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {}: {} applied",
            self.kind,
            self.parent_id,
            self.applied()
        )?;
        for outcome in self.failed() {
            if let MemberResult::Failed { error } = &outcome.result {
                let verb = match outcome.action {
                    MemberAction::Add => "add",
                    MemberAction::Remove => "remove",
                };
                write!(f, ", {verb} {} failed ({error})", outcome.member)?;
            }
        }
        let skipped = self.not_attempted();
        if skipped > 0 {
            write!(f, ", {skipped} not attempted")?;
        }
        Ok(())
    }
}

/// Whether `member` must survive a declared set that does not mention it.
///
/// Marker-prefixed members are always foreign. Otherwise a member this system
/// does not manage is foreign unless the declared block is exclusive.
pub fn is_foreign(
    spec: &AssociationSpec,
    managed: &BTreeSet<String>,
    exclusive: bool,
    member: &str,
) -> bool {
    spec.is_marked_foreign(member) || (!exclusive && !managed.contains(member))
}

/// Delta against recorded state, without contacting the remote service
pub fn plan_members(
    kind: AssociationKind,
    parent_id: &str,
    block: &MemberBlock,
    state: Option<&MemberState>,
) -> AssociationDelta {
    let spec = association_spec(kind);
    let empty = BTreeSet::new();
    let (observed, managed) = state.map_or((&empty, &empty), |s| (&s.observed, &s.managed));
    let exclusive = block.is_exclusive();

    plan_associations(parent_id, block, observed, |m| {
        is_foreign(spec, managed, exclusive, m)
    })
}

/// Converge one association set against a fresh read of its members.
///
/// `state` is updated as each member operation succeeds, so the caller can
/// persist partial progress when this returns an error.
pub fn reconcile_members(
    gateway: &dyn Gateway,
    cancel: &CancelToken,
    address: &ResourceAddress,
    kind: AssociationKind,
    parent_id: &str,
    block: &MemberBlock,
    state: &mut MemberState,
) -> Result<AssociationReport> {
    let mut report = AssociationReport::new(kind, parent_id);
    let Some(declared) = block.members() else {
        return Ok(report);
    };

    let remote_error = |call: GatewayCall| {
        move |source: GatewayError| Error::Remote {
            subject: kind.to_string(),
            address: address.to_string(),
            id: Some(parent_id.to_string()),
            call,
            source,
        }
    };

    if cancel.is_cancelled() {
        return Err(Error::Cancelled {
            address: address.to_string(),
            before: GatewayCall::ListMembers,
        });
    }
    state.observed = gateway
        .list_members(kind, parent_id)
        .map_err(remote_error(GatewayCall::ListMembers))?;
    state.managed.retain(|m| state.observed.contains(m));

    let delta = plan_members(kind, parent_id, block, Some(state));
    log::debug!(
        "{address}: {kind} of {parent_id}: +{:?} -{:?}",
        delta.to_add,
        delta.to_remove
    );

    let operations: Vec<(MemberAction, String)> = delta
        .to_remove
        .into_iter()
        .map(|m| (MemberAction::Remove, m))
        .chain(delta.to_add.into_iter().map(|m| (MemberAction::Add, m)))
        .collect();

    let mut pending = operations.into_iter();
    while let Some((action, member)) = pending.next() {
        if cancel.is_cancelled() {
            report.outcomes.push(MemberOutcome {
                action,
                member,
                result: MemberResult::NotAttempted,
            });
            mark_not_attempted(&mut report, pending);
            log::warn!("{address}: cancelled mid-cycle, {report}");
            return Err(Error::Cancelled {
                address: address.to_string(),
                before: action.call(),
            });
        }

        let result = match action {
            MemberAction::Remove => gateway.remove_association(kind, parent_id, &member),
            MemberAction::Add => gateway.add_association(kind, parent_id, &member),
        };

        match result {
            Ok(()) => {}
            // already gone
            Err(e) if action == MemberAction::Remove && e.is_not_found() => {}
            Err(e) => {
                let error = remote_error(action.call())(e).to_string();
                log::warn!("{address}: {error}");
                report.outcomes.push(MemberOutcome {
                    action,
                    member,
                    result: MemberResult::Failed { error },
                });
                mark_not_attempted(&mut report, pending);
                return Err(Error::PartialAssociation {
                    address: address.to_string(),
                    report,
                });
            }
        }

        match action {
            MemberAction::Remove => {
                state.observed.remove(&member);
                state.managed.remove(&member);
            }
            MemberAction::Add => {
                state.observed.insert(member.clone());
                state.managed.insert(member.clone());
            }
        }
        log::info!("{address}: {:?} {member} ({kind} of {parent_id})", action);
        report.outcomes.push(MemberOutcome {
            action,
            member,
            result: MemberResult::Applied,
        });
    }

    let adopted: Vec<String> = declared
        .iter()
        .filter(|m| state.observed.contains(*m))
        .cloned()
        .collect();
    state.managed.extend(adopted);

    Ok(report)
}

fn mark_not_attempted(
    report: &mut AssociationReport,
    rest: impl Iterator<Item = (MemberAction, String)>,
) {
    report
        .outcomes
        .extend(rest.map(|(action, member)| MemberOutcome {
            action,
            member,
            result: MemberResult::NotAttempted,
        }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{GatewayResult, InlineMembers, RemoteEntity};
    use crate::model::{EntityKind, FieldSet};
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    /// Member-only gateway that logs calls and fails on chosen members
    #[derive(Default)]
    struct Members {
        sets: Mutex<BTreeMap<String, BTreeSet<String>>>,
        fail_on: Option<&'static str>,
        calls: Mutex<Vec<String>>,
    }

    impl Members {
        fn with(parent: &str, members: &[&str]) -> Self {
            let gateway = Self::default();
            gateway.sets.lock().unwrap().insert(
                parent.to_string(),
                members.iter().map(|m| (*m).to_string()).collect(),
            );
            gateway
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Gateway for Members {
        fn create(&self, _: EntityKind, _: &FieldSet, _: &InlineMembers) -> GatewayResult<RemoteEntity> {
            unreachable!()
        }
        fn get(&self, _: EntityKind, _: &str) -> GatewayResult<FieldSet> {
            unreachable!()
        }
        fn update(&self, _: EntityKind, _: &str, _: &FieldSet) -> GatewayResult<FieldSet> {
            unreachable!()
        }
        fn delete(&self, _: EntityKind, _: &str) -> GatewayResult<()> {
            unreachable!()
        }
        fn list(&self, _: EntityKind, _: &FieldSet) -> GatewayResult<Vec<RemoteEntity>> {
            unreachable!()
        }

        fn add_association(&self, _: AssociationKind, parent: &str, member: &str) -> GatewayResult<()> {
            self.calls.lock().unwrap().push(format!("add {member}"));
            if self.fail_on == Some(member) {
                return Err(GatewayError::fatal("rejected"));
            }
            self.sets.lock().unwrap().entry(parent.to_string()).or_default().insert(member.to_string());
            Ok(())
        }

        fn remove_association(&self, _: AssociationKind, parent: &str, member: &str) -> GatewayResult<()> {
            self.calls.lock().unwrap().push(format!("remove {member}"));
            if self.fail_on == Some(member) {
                return Err(GatewayError::fatal("rejected"));
            }
            self.sets.lock().unwrap().entry(parent.to_string()).or_default().remove(member);
            Ok(())
        }

        fn list_members(&self, _: AssociationKind, parent: &str) -> GatewayResult<BTreeSet<String>> {
            self.calls.lock().unwrap().push("list".to_string());
            Ok(self.sets.lock().unwrap().get(parent).cloned().unwrap_or_default())
        }
    }

    fn state(kind: AssociationKind, managed: &[&str]) -> MemberState {
        let mut state = MemberState::new(kind);
        state.managed = managed.iter().map(|m| (*m).to_string()).collect();
        state
    }

    #[test]
    fn test_removals_before_additions_in_order() {
        let gateway = Members::with("role_1", &["p1", "p2", "p4"]);
        let mut st = state(AssociationKind::RolePermissions, &["p1", "p2", "p4"]);

        let report = reconcile_members(
            &gateway,
            &CancelToken::new(),
            &ResourceAddress::from("role.svc"),
            AssociationKind::RolePermissions,
            "role_1",
            &MemberBlock::declared(["p1", "p3", "p0"]),
            &mut st,
        )
        .unwrap();

        assert_eq!(
            gateway.calls(),
            vec!["list", "remove p2", "remove p4", "add p0", "add p3"]
        );
        assert_eq!(report.applied(), 4);
        assert_eq!(st.observed, st.managed);
        assert_eq!(st.observed.len(), 3);
    }

    #[test]
    fn test_unmanaged_members_survive_unless_exclusive() {
        let gateway = Members::with("role_1", &["p1", "console-added"]);
        let mut st = state(AssociationKind::RolePermissions, &["p1"]);
        let address = ResourceAddress::from("role.svc");

        reconcile_members(
            &gateway,
            &CancelToken::new(),
            &address,
            AssociationKind::RolePermissions,
            "role_1",
            &MemberBlock::declared(["p1"]),
            &mut st,
        )
        .unwrap();
        assert!(st.observed.contains("console-added"));

        reconcile_members(
            &gateway,
            &CancelToken::new(),
            &address,
            AssociationKind::RolePermissions,
            "role_1",
            &MemberBlock::exclusive(["p1"]),
            &mut st,
        )
        .unwrap();
        assert!(!st.observed.contains("console-added"));
    }

    #[test]
    fn test_marked_members_survive_exclusive_block() {
        let gateway = Members::with("kp_1", &["email:a@x.com", "oauth2:google:a@x.com"]);
        let mut st = state(AssociationKind::UserIdentities, &["email:a@x.com"]);

        reconcile_members(
            &gateway,
            &CancelToken::new(),
            &ResourceAddress::from("user.a"),
            AssociationKind::UserIdentities,
            "kp_1",
            &MemberBlock::exclusive(["email:b@x.com"]),
            &mut st,
        )
        .unwrap();

        let expected: BTreeSet<String> = ["email:b@x.com", "oauth2:google:a@x.com"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(st.observed, expected);
    }

    #[test]
    fn test_partial_failure_reports_every_member() {
        let mut gateway = Members::with("role_1", &["p1", "p2"]);
        gateway.fail_on = Some("p4");
        let mut st = state(AssociationKind::RolePermissions, &["p1", "p2"]);

        let err = reconcile_members(
            &gateway,
            &CancelToken::new(),
            &ResourceAddress::from("role.svc"),
            AssociationKind::RolePermissions,
            "role_1",
            &MemberBlock::declared(["p3", "p4", "p5"]),
            &mut st,
        )
        .unwrap_err();

        let Error::PartialAssociation { report, .. } = err else {
            panic!("expected partial failure, got {err}");
        };
        let results: Vec<_> = report
            .outcomes
            .iter()
            .map(|o| (o.member.as_str(), &o.result))
            .collect();
        assert!(matches!(results[0], ("p1", MemberResult::Applied)));
        assert!(matches!(results[1], ("p2", MemberResult::Applied)));
        assert!(matches!(results[2], ("p3", MemberResult::Applied)));
        assert!(matches!(results[3], ("p4", MemberResult::Failed { .. })));
        assert!(matches!(results[4], ("p5", MemberResult::NotAttempted)));

        let observed: Vec<_> = st.observed.iter().map(String::as_str).collect();
        assert_eq!(observed, vec!["p3"]);
    }

    #[test]
    fn test_absent_block_makes_no_calls() {
        let gateway = Members::with("role_1", &["p1"]);
        let mut st = state(AssociationKind::RolePermissions, &["p1"]);

        let report = reconcile_members(
            &gateway,
            &CancelToken::new(),
            &ResourceAddress::from("role.svc"),
            AssociationKind::RolePermissions,
            "role_1",
            &MemberBlock::Absent,
            &mut st,
        )
        .unwrap();

        assert!(report.outcomes.is_empty());
        assert!(gateway.calls().is_empty());
    }

    #[test]
    fn test_cancelled_before_any_call() {
        let gateway = Members::with("role_1", &[]);
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut st = state(AssociationKind::RolePermissions, &[]);

        let err = reconcile_members(
            &gateway,
            &cancel,
            &ResourceAddress::from("role.svc"),
            AssociationKind::RolePermissions,
            "role_1",
            &MemberBlock::declared(["p1"]),
            &mut st,
        )
        .unwrap_err();

        assert!(matches!(err, Error::Cancelled { .. }));
        assert!(gateway.calls().is_empty());
    }
}
