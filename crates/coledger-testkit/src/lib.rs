//! # coledger testkit
//!
//! Testing utilities for coledger.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: accounts on their own nodes, with helpers to introduce
//!   them to each other and exchange logs
//! - **Generators**: proptest strategies for roles and random extend graphs,
//!   plus a reference resolver to check effective roles against
//!
//! ## Test Fixtures
//!
//! ```rust
//! use coledger::{Privacy, Role};
//! use coledger_testkit::fixtures::multi_party_fixtures;
//! use serde_json::json;
//!
//! let mut parties = multi_party_fixtures(2);
//! let (alice, bob) = parties.split_at_mut(1);
//! let group = alice[0].shared_group(&[(&bob[0], Role::Reader)]);
//! let map = alice[0].private_map(&group, &[("foo", json!("bar"))]);
//!
//! bob[0].sync_from(&alice[0]);
//! let content = bob[0].node.map_content(&map).unwrap();
//! assert_eq!(content.get("foo"), Some(&json!("bar")));
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use coledger_testkit::generators::{build_graph, dag_params, expected_role};
//!
//! proptest! {
//!     #[test]
//!     fn roles_match_reference(params in dag_params()) {
//!         let built = build_graph(&params);
//!         for (i, _) in built.groups.iter().enumerate() {
//!             prop_assert_eq!(built.role_of(i), expected_role(&params, i, false));
//!         }
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{multi_party_fixtures, sync_all, TestFixture};
