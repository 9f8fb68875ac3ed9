//! Permission evaluator (C6, §4.6). A pure function over grants already
//! loaded by the caller -- this crate does not own persistence, so the
//! evaluator takes the relevant slice of grants and group memberships as
//! arguments rather than reaching into a store.

use crate::entities::{Capability, Grant, Membership, Role};
use crate::ids::{BackendId, GroupId, PrincipalId};

/// Resolve whether `principal` may exercise `capability` on `backend`.
///
/// `admin` role bypasses every check. Otherwise true iff at least one
/// grant exists whose group intersects the principal's memberships and
/// whose capability flag is set. The result is not cached here; callers
/// may memoize per request (§4.6).
#[must_use]
pub fn has_capability(
    role: Role,
    principal: PrincipalId,
    backend: BackendId,
    capability: Capability,
    memberships: &[Membership],
    grants: &[Grant],
) -> bool {
    if matches!(role, Role::Admin) {
        return true;
    }

    let principal_groups: Vec<GroupId> = memberships
        .iter()
        .filter(|m| m.principal == principal)
        .map(|m| m.group)
        .collect();

    grants.iter().any(|grant| {
        grant.backend == backend
            && principal_groups.contains(&grant.group)
            && match capability {
                Capability::Read => grant.read,
                Capability::Write => grant.write,
                Capability::Approve => grant.approve,
            }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid() -> PrincipalId {
        PrincipalId::new()
    }
    fn bid() -> BackendId {
        BackendId::new()
    }
    fn gid() -> GroupId {
        GroupId::new()
    }

    #[test]
    fn admin_bypasses_grants() {
        let p = pid();
        let b = bid();
        assert!(has_capability(
            Role::Admin,
            p,
            b,
            Capability::Write,
            &[],
            &[]
        ));
    }

    #[test]
    fn user_without_grant_is_denied() {
        let p = pid();
        let b = bid();
        assert!(!has_capability(
            Role::User,
            p,
            b,
            Capability::Read,
            &[],
            &[]
        ));
    }

    #[test]
    fn user_with_matching_group_grant_is_allowed() {
        let p = pid();
        let b = bid();
        let g = gid();
        let memberships = vec![Membership {
            principal: p,
            group: g,
        }];
        let grants = vec![Grant {
            backend: b,
            group: g,
            read: true,
            write: false,
            approve: false,
        }];
        assert!(has_capability(
            Role::User,
            p,
            b,
            Capability::Read,
            &memberships,
            &grants
        ));
        assert!(!has_capability(
            Role::User,
            p,
            b,
            Capability::Write,
            &memberships,
            &grants
        ));
    }
}
