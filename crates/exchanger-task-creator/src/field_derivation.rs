//! Pure field-assembly rules from spec §4.2.1. Kept free of I/O: supervisor
//! lookups and process-variable reads happen in the caller, which passes
//! already-resolved inputs here so the testable properties in spec §8
//! (#7, #9) can be checked directly.

use chrono::{DateTime, Utc};
use exchanger_shared::MemberSpec;

/// Inputs to the `CREATED_BY` / `RESPONSIBLE_ID` derivation cascade.
#[derive(Debug, Clone)]
pub struct MemberResolutionInput {
    pub spec: MemberSpec,
    pub initiator: Option<i64>,
    pub supervisor_of_initiator: Option<i64>,
}

/// Result of resolving a single user-id field: the id, and whether no rule
/// matched and the hardcoded default (`1`) was used (callers log WARN).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedUser {
    pub id: i64,
    pub used_default: bool,
}

/// `CREATED_BY` / `RESPONSIBLE_ID` derivation cascade (spec §4.2.1).
pub fn resolve_member_id(input: &MemberResolutionInput) -> ResolvedUser {
    if let Some(&first) = input.spec.members.first() {
        return ResolvedUser { id: first, used_default: false };
    }
    if let Some(scalar) = input.spec.scalar {
        if scalar > 0 {
            return ResolvedUser { id: scalar, used_default: false };
        }
    }
    if input.spec.use_supervisor && input.initiator.is_some() {
        if let Some(supervisor) = input.supervisor_of_initiator {
            return ResolvedUser { id: supervisor, used_default: false };
        }
        return ResolvedUser {
            id: input.initiator.expect("checked is_some above"),
            used_default: false,
        };
    }
    if let Some(initiator) = input.initiator {
        return ResolvedUser { id: initiator, used_default: false };
    }
    ResolvedUser { id: 1, used_default: true }
}

/// `ACCOMPLICES` / `AUDITORS` derivation (spec §4.2.1): template member list
/// plus, when `use_supervisor` is set, the initiator's supervisor (deduped).
pub fn resolve_member_list(spec: &MemberSpec, supervisor_of_initiator: Option<i64>) -> Vec<i64> {
    let mut members = spec.members.clone();
    if spec.use_supervisor {
        if let Some(supervisor) = supervisor_of_initiator {
            if !members.contains(&supervisor) {
                members.push(supervisor);
            }
        }
    }
    members
}

/// `AUDITORS`-only fallback: if still empty, use `[diagramOwner]`.
pub fn apply_auditor_fallback(auditors: Vec<i64>, diagram_owner: Option<i64>) -> Vec<i64> {
    if auditors.is_empty() {
        if let Some(owner) = diagram_owner {
            return vec![owner];
        }
    }
    auditors
}

/// `DEADLINE`: `min(processVariable 'deadline', now + template.DEADLINE_AFTER)`
/// if both exist, else whichever exists, else unset (spec §4.2.1, testable
/// property #7).
pub fn resolve_deadline(
    process_deadline: Option<DateTime<Utc>>,
    deadline_after_seconds: Option<i64>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let template_deadline = deadline_after_seconds.map(|secs| now + chrono::Duration::seconds(secs));
    match (process_deadline, template_deadline) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    }
}

/// `GROUP_ID`: template value if valid (>0), else process variable
/// `groupId` if valid, else unset.
pub fn resolve_group_id(template_group_id: Option<i64>, process_group_id: Option<i64>) -> Option<i64> {
    template_group_id
        .filter(|&id| id > 0)
        .or_else(|| process_group_id.filter(|&id| id > 0))
}

/// `PRIORITY`: template value, else the configured default.
pub fn resolve_priority(template_priority: Option<i64>, default_priority: i64) -> i64 {
    template_priority.unwrap_or(default_priority)
}

/// `TAGS`: comma-joined template tag names.
pub fn resolve_tags(template_tags: &[String]) -> String {
    template_tags.join(", ")
}

/// `PARENT_ID` / `SUBORDINATE='Y'`: only set when the process variable
/// `parentTaskId` is a valid (>0) id.
pub fn resolve_parent_id(process_parent_task_id: Option<i64>) -> Option<i64> {
    process_parent_task_id.filter(|&id| id > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(members: Vec<i64>, scalar: Option<i64>, use_supervisor: bool) -> MemberSpec {
        MemberSpec { members, scalar, use_supervisor }
    }

    #[test]
    fn concrete_member_wins_over_everything_else() {
        let input = MemberResolutionInput {
            spec: spec(vec![42], Some(7), true),
            initiator: Some(3),
            supervisor_of_initiator: Some(9),
        };
        let resolved = resolve_member_id(&input);
        assert_eq!(resolved, ResolvedUser { id: 42, used_default: false });
    }

    #[test]
    fn scalar_used_when_members_list_empty() {
        let input = MemberResolutionInput {
            spec: spec(vec![], Some(7), false),
            initiator: Some(3),
            supervisor_of_initiator: None,
        };
        assert_eq!(resolve_member_id(&input).id, 7);
    }

    #[test]
    fn negative_scalar_is_not_a_valid_id() {
        let input = MemberResolutionInput {
            spec: spec(vec![], Some(-1), false),
            initiator: Some(3),
            supervisor_of_initiator: None,
        };
        assert_eq!(resolve_member_id(&input).id, 3);
    }

    #[test]
    fn use_supervisor_resolves_to_supervisor_when_present() {
        let input = MemberResolutionInput {
            spec: spec(vec![], None, true),
            initiator: Some(3),
            supervisor_of_initiator: Some(9),
        };
        assert_eq!(resolve_member_id(&input).id, 9);
    }

    #[test]
    fn use_supervisor_falls_back_to_initiator_when_supervisor_absent() {
        let input = MemberResolutionInput {
            spec: spec(vec![], None, true),
            initiator: Some(3),
            supervisor_of_initiator: None,
        };
        assert_eq!(resolve_member_id(&input).id, 3);
    }

    #[test]
    fn initiator_used_when_use_supervisor_is_false() {
        let input = MemberResolutionInput {
            spec: spec(vec![], None, false),
            initiator: Some(3),
            supervisor_of_initiator: Some(9),
        };
        assert_eq!(resolve_member_id(&input).id, 3);
    }

    #[test]
    fn default_user_one_used_and_flagged_when_nothing_resolves() {
        let input = MemberResolutionInput {
            spec: spec(vec![], None, false),
            initiator: None,
            supervisor_of_initiator: None,
        };
        let resolved = resolve_member_id(&input);
        assert_eq!(resolved, ResolvedUser { id: 1, used_default: true });
    }

    #[test]
    fn member_list_appends_deduped_supervisor_when_flagged() {
        let spec = spec(vec![5, 9], None, true);
        let members = resolve_member_list(&spec, Some(9));
        assert_eq!(members, vec![5, 9]);
    }

    #[test]
    fn member_list_appends_new_supervisor() {
        let spec = spec(vec![5], None, true);
        let members = resolve_member_list(&spec, Some(9));
        assert_eq!(members, vec![5, 9]);
    }

    #[test]
    fn member_list_unaffected_when_not_flagged() {
        let spec = spec(vec![5], None, false);
        let members = resolve_member_list(&spec, Some(9));
        assert_eq!(members, vec![5]);
    }

    #[test]
    fn auditor_fallback_applies_only_when_empty() {
        assert_eq!(apply_auditor_fallback(vec![], Some(3)), vec![3]);
        assert_eq!(apply_auditor_fallback(vec![5], Some(3)), vec![5]);
        assert_eq!(apply_auditor_fallback(vec![], None), Vec::<i64>::new());
    }

    #[test]
    fn deadline_selection_picks_the_nearer_of_process_and_template() {
        let process_deadline = "2030-01-10T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let now = "2026-07-28T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let deadline = resolve_deadline(Some(process_deadline), Some(86_400), now);
        assert_eq!(deadline, Some(now + chrono::Duration::seconds(86_400)));
    }

    #[test]
    fn deadline_uses_process_value_when_template_after_seconds_absent() {
        let process_deadline = "2030-01-10T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let now = Utc::now();
        assert_eq!(resolve_deadline(Some(process_deadline), None, now), Some(process_deadline));
    }

    #[test]
    fn deadline_uses_template_value_when_process_deadline_absent() {
        let now = "2026-07-28T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let deadline = resolve_deadline(None, Some(3_600), now);
        assert_eq!(deadline, Some(now + chrono::Duration::seconds(3_600)));
    }

    #[test]
    fn deadline_unset_when_neither_source_present() {
        assert_eq!(resolve_deadline(None, None, Utc::now()), None);
    }

    #[test]
    fn group_id_prefers_template_then_process_variable() {
        assert_eq!(resolve_group_id(Some(5), Some(9)), Some(5));
        assert_eq!(resolve_group_id(None, Some(9)), Some(9));
        assert_eq!(resolve_group_id(Some(-1), Some(9)), Some(9));
        assert_eq!(resolve_group_id(None, None), None);
    }

    #[test]
    fn priority_falls_back_to_configured_default() {
        assert_eq!(resolve_priority(Some(80), 50), 80);
        assert_eq!(resolve_priority(None, 50), 50);
    }

    #[test]
    fn tags_are_comma_joined() {
        assert_eq!(resolve_tags(&["a".into(), "b".into()]), "a, b");
        assert_eq!(resolve_tags(&[]), "");
    }

    #[test]
    fn parent_id_requires_a_positive_process_variable() {
        assert_eq!(resolve_parent_id(Some(7)), Some(7));
        assert_eq!(resolve_parent_id(Some(0)), None);
        assert_eq!(resolve_parent_id(None), None);
    }
}
