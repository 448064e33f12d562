//! Proptest generators for property-based testing.

use std::collections::BTreeMap;

use proptest::prelude::*;

use coledger::{
    AgentSecret, ExtendRole, GroupId, InviteRole, MemberRef, Role, RoleEntry,
};

use crate::fixtures::TestFixture;

/// Generate any role.
pub fn role() -> impl Strategy<Value = Role> {
    prop_oneof![
        Just(Role::Admin),
        Just(Role::Writer),
        Just(Role::Reader),
        Just(Role::WriteOnly),
        Just(Role::Revoked),
    ]
}

/// Generate a role `everyone` may hold.
pub fn everyone_role() -> impl Strategy<Value = Role> {
    role().prop_filter("everyone cannot be admin", |r| r.allowed_for_everyone())
}

pub fn invite_role() -> impl Strategy<Value = InviteRole> {
    prop_oneof![
        Just(InviteRole::AdminInvite),
        Just(InviteRole::WriterInvite),
        Just(InviteRole::ReaderInvite),
        Just(InviteRole::WriteOnlyInvite),
    ]
}

/// Generate a role map value.
pub fn role_entry() -> impl Strategy<Value = RoleEntry> {
    prop_oneof![
        3 => role().prop_map(RoleEntry::Role),
        1 => invite_role().prop_map(RoleEntry::Invite),
    ]
}

pub fn extend_role() -> impl Strategy<Value = ExtendRole> {
    prop_oneof![
        Just(ExtendRole::Inherit),
        Just(ExtendRole::Admin),
        Just(ExtendRole::Writer),
        Just(ExtendRole::Reader),
    ]
}

/// Generate an agent member from a random seed.
pub fn agent_member() -> impl Strategy<Value = MemberRef> {
    any::<[u8; 32]>().prop_map(|seed| MemberRef::Agent(AgentSecret::from_seed(&seed).agent_id()))
}

/// A random group graph around one member.
///
/// Group `i` gives the member `direct[i]` and `everyone` `everyone[i]`.
/// `edges` maps `(child, parent)` to the edge mapping; `None` marks an
/// edge that was extended and then revoked.
#[derive(Debug, Clone)]
pub struct GraphParams {
    pub direct: Vec<Option<Role>>,
    pub everyone: Vec<Option<Role>>,
    pub edges: BTreeMap<(usize, usize), Option<ExtendRole>>,
}

impl GraphParams {
    pub fn len(&self) -> usize {
        self.direct.len()
    }

    pub fn is_empty(&self) -> bool {
        self.direct.is_empty()
    }
}

fn graph_params(max_groups: usize, acyclic: bool) -> impl Strategy<Value = GraphParams> {
    (1..=max_groups).prop_flat_map(move |n| {
        let edge = (0..n, 0..n, prop::option::weighted(0.8, extend_role()));
        (
            prop::collection::vec(prop::option::of(role()), n),
            prop::collection::vec(prop::option::weighted(0.3, everyone_role()), n),
            prop::collection::vec(edge, 0..=n * 2),
        )
            .prop_map(move |(direct, everyone, edges)| GraphParams {
                direct,
                everyone,
                edges: edges
                    .into_iter()
                    .filter(|(child, parent, _)| !acyclic || child > parent)
                    .map(|(child, parent, mapping)| ((child, parent), mapping))
                    .collect(),
            })
    })
}

/// Graphs whose edges always point to a lower index.
pub fn dag_params() -> impl Strategy<Value = GraphParams> {
    graph_params(5, true)
}

/// Graphs with arbitrary edges, including self-loops and cycles.
pub fn cyclic_params() -> impl Strategy<Value = GraphParams> {
    graph_params(4, false)
}

/// A graph built on a real node by a single admin.
pub struct BuiltGraph {
    pub fixture: TestFixture,
    pub groups: Vec<GroupId>,
    pub member: MemberRef,
}

impl BuiltGraph {
    /// Effective role of the generated member in group `i`.
    pub fn role_of(&self, i: usize) -> Option<Role> {
        self.role_of_member(i, self.member)
    }

    pub fn role_of_member(&self, i: usize, member: MemberRef) -> Option<Role> {
        let state = self
            .fixture
            .node
            .group_state(&self.groups[i])
            .expect("group is loaded");
        self.fixture
            .node
            .graph()
            .role_of(&state, &member, &coledger::LogBound::Full)
            .expect("role resolution within budget")
    }
}

/// Author `params` on a fresh node.
pub fn build_graph(params: &GraphParams) -> BuiltGraph {
    let mut fixture = TestFixture::new();
    let member = MemberRef::Agent(AgentSecret::from_seed(&[7; 32]).agent_id());
    let node = &mut fixture.node;

    let groups: Vec<GroupId> = (0..params.len())
        .map(|_| node.create_group().expect("group creation failed").id())
        .collect();

    for (i, id) in groups.iter().enumerate() {
        let mut group = node.group(id).expect("group exists");
        if let Some(role) = params.direct[i] {
            group.add_member(member, role).expect("member role");
        }
        if let Some(role) = params.everyone[i] {
            group.add_member(MemberRef::Everyone, role).expect("everyone role");
        }
    }

    for (&(child, parent), mapping) in &params.edges {
        let mut group = node.group(&groups[child]).expect("group exists");
        group
            .extend_with(&groups[parent], mapping.unwrap_or_default())
            .expect("extend");
        if mapping.is_none() {
            group.revoke_extend(&groups[parent]).expect("revoke extend");
        }
    }

    BuiltGraph {
        fixture,
        groups,
        member,
    }
}

/// Reference role resolution for acyclic graphs.
///
/// With `everyone` set, resolves the role of `everyone` itself.
pub fn expected_role(params: &GraphParams, group: usize, everyone: bool) -> Option<Role> {
    let mut roles = Vec::new();
    if !everyone {
        roles.extend(params.direct[group]);
    }
    roles.extend(params.everyone[group]);
    for (&(child, parent), mapping) in &params.edges {
        if child != group {
            continue;
        }
        if let Some(mapping) = mapping {
            roles.extend(expected_role(params, parent, everyone).map(|r| mapping.cap(r)));
        }
    }

    let granted = roles
        .iter()
        .copied()
        .filter(|r| *r != Role::Revoked)
        .max_by_key(|r| r.rank());
    granted.or_else(|| (!roles.is_empty()).then_some(Role::Revoked))
}
