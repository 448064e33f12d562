//! Test fixtures and helpers.
//!
//! Every fixture is one account on its own node. Nodes only learn about
//! each other through `introduce` and `sync_from`.

use serde_json::Value;

use coledger::{
    AccountId, CoValueId, GroupId, ImportReport, LocalNode, MemberRef, NodeConfig, Privacy, Role,
};

/// An account with its own node.
pub struct TestFixture {
    pub node: LocalNode,
}

impl TestFixture {
    /// Create a fixture with the default node configuration.
    pub fn new() -> Self {
        Self::with_config(NodeConfig::default())
    }

    pub fn with_config(config: NodeConfig) -> Self {
        Self {
            node: LocalNode::create_account(config).expect("account creation failed"),
        }
    }

    pub fn account(&self) -> AccountId {
        self.node.account_id()
    }

    pub fn member(&self) -> MemberRef {
        self.node.member()
    }

    /// Make `other`'s account known to this node.
    pub fn introduce(&mut self, other: &TestFixture) {
        self.node
            .import_from(&other.node, other.account().covalue_id())
            .expect("account import failed");
    }

    /// Copy every log `other` holds.
    pub fn sync_from(&mut self, other: &TestFixture) -> ImportReport {
        self.node.import_all_from(&other.node)
    }

    /// Create a group and add `members` with their roles.
    ///
    /// Members must already be introduced.
    pub fn shared_group(&mut self, members: &[(&TestFixture, Role)]) -> GroupId {
        let id = self.node.create_group().expect("group creation failed").id();
        let mut group = self.node.group(&id).expect("group just created");
        for (fixture, role) in members {
            group
                .add_member(fixture.account(), *role)
                .expect("adding member failed");
        }
        id
    }

    /// Create a map owned by `owner` holding `entries` as private edits.
    pub fn private_map(&mut self, owner: &GroupId, entries: &[(&str, Value)]) -> CoValueId {
        let map = self.node.create_map(owner).expect("map creation failed");
        for (key, value) in entries {
            self.node
                .map_set(&map, key, value.clone(), Privacy::Private)
                .expect("map write failed");
        }
        map
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Create `count` fixtures that all know each other's accounts.
pub fn multi_party_fixtures(count: usize) -> Vec<TestFixture> {
    let mut parties: Vec<TestFixture> = (0..count).map(|_| TestFixture::new()).collect();
    for_each_pair(&mut parties, |to, from| to.introduce(from));
    parties
}

/// Exchange logs between every pair until all nodes hold the same logs.
pub fn sync_all(fixtures: &mut [TestFixture]) {
    // Two rounds: the first spreads each node's logs to the ones after it.
    for _ in 0..2 {
        for_each_pair(fixtures, |to, from| {
            to.sync_from(from);
        });
    }
}

fn for_each_pair(fixtures: &mut [TestFixture], mut f: impl FnMut(&mut TestFixture, &TestFixture)) {
    for i in 0..fixtures.len() {
        for j in 0..fixtures.len() {
            if i == j {
                continue;
            }
            let (to, from) = if i < j {
                let (lo, hi) = fixtures.split_at_mut(j);
                (&mut lo[i], &hi[0])
            } else {
                let (lo, hi) = fixtures.split_at_mut(i);
                (&mut hi[0], &lo[j])
            };
            f(to, from);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_multi_party() {
        let parties = multi_party_fixtures(3);

        let accounts: Vec<_> = parties.iter().map(|p| p.account()).collect();
        assert_ne!(accounts[0], accounts[1]);
        assert_ne!(accounts[1], accounts[2]);
        assert_ne!(accounts[0], accounts[2]);

        for party in &parties {
            for account in &accounts {
                assert!(party.node.log(account.covalue_id()).is_ok());
            }
        }
    }

    #[test]
    fn test_sync_all_converges() {
        let mut parties = multi_party_fixtures(3);
        let (first, rest) = parties.split_at_mut(1);
        let group = first[0].shared_group(&[(&rest[0], Role::Writer), (&rest[1], Role::Reader)]);
        let map = first[0].private_map(&group, &[("a", json!(1))]);

        sync_all(&mut parties);
        parties[1]
            .node
            .map_set(&map, "b", json!(2), Privacy::Private)
            .unwrap();
        sync_all(&mut parties);

        let views: Vec<_> = parties
            .iter()
            .map(|p| p.node.map_content(&map).unwrap().to_json())
            .collect();
        assert_eq!(views[0], json!({"a": 1, "b": 2}));
        assert!(views.iter().all(|v| *v == views[0]));
    }

    #[test]
    fn test_sync_is_idempotent() {
        let mut parties = multi_party_fixtures(2);
        let (alice, bob) = parties.split_at_mut(1);
        alice[0].shared_group(&[(&bob[0], Role::Reader)]);

        let first = bob[0].sync_from(&alice[0]);
        assert!(first.accepted > 0);
        let again = bob[0].sync_from(&alice[0]);
        assert_eq!(again.accepted, 0);
        assert_eq!(again.rejected, 0);
    }
}
