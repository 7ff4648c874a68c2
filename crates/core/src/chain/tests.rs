use super::*;
use proptest::prelude::*;
use serde_json::Map;
use std::collections::BTreeMap;

#[derive(Debug, Default)]
struct MemoryChain {
    rules: BTreeMap<RuleId, ChainRule>,
}

impl ChainLookup for MemoryChain {
    type Error = ChainError;

    fn rule(&self, id: &RuleId) -> Result<Option<ChainRule>, ChainError> {
        Ok(self.rules.get(id).cloned())
    }

    fn successors(&self, id: &RuleId) -> Result<Vec<RuleId>, ChainError> {
        Ok(self
            .rules
            .values()
            .filter(|rule| rule.replaces.as_ref() == Some(id))
            .map(|rule| rule.id.clone())
            .collect())
    }
}

impl MemoryChain {
    fn put(&mut self, id: &str, enabled: bool, replaces: Option<&str>) {
        let rule = ChainRule {
            id: rid(id),
            enabled,
            replaces: replaces.map(rid),
        };
        self.rules.insert(rule.id.clone(), rule);
    }

    fn get(&self, id: &str) -> &ChainRule {
        &self.rules[&rid(id)]
    }

    fn reconcile(&mut self, record: &RemoteRecord) -> Result<ReconcilePlan, ChainError> {
        let plan = plan_reconcile(&*self, RuleKind::IdCommand, record)?;
        match &plan {
            ReconcilePlan::UpdateExisting => {}
            ReconcilePlan::InsertRoot { enabled, .. } => {
                self.put(record.id.as_str(), *enabled, None);
            }
            ReconcilePlan::InsertReplacement {
                replaces,
                enabled,
                disable,
                relink,
            } => {
                if let Some(id) = disable {
                    self.rules.get_mut(id).unwrap().enabled = false;
                }
                self.put(record.id.as_str(), *enabled, Some(replaces.as_str()));
                if let Some(id) = relink {
                    self.rules.get_mut(id).unwrap().replaces = Some(record.id.clone());
                }
            }
        }
        Ok(plan)
    }

    fn replace_locally(&mut self, id: &str, target: &str) -> Result<(), ChainError> {
        let plan = plan_local_replacement(&*self, &rid(target))?;
        if let Some(id) = plan.disable {
            self.rules.get_mut(&id).unwrap().enabled = false;
        }
        self.put(id, true, Some(target));
        Ok(())
    }

    fn enabled_per_root(&self) -> BTreeMap<RuleId, usize> {
        let mut out = BTreeMap::new();
        for rule in self.rules.values() {
            let mut root = rule.clone();
            for _ in 0..=self.rules.len() {
                match root.replaces.as_ref().and_then(|id| self.rules.get(id)) {
                    Some(previous) => root = previous.clone(),
                    None => break,
                }
            }
            let count = out.entry(root.id).or_insert(0usize);
            if rule.enabled {
                *count += 1;
            }
        }
        out
    }
}

fn rid(value: &str) -> RuleId {
    RuleId::try_new(value).unwrap()
}

fn remote(id: &str, enabled: bool, replaces: Option<&str>) -> RemoteRecord {
    RemoteRecord {
        id: rid(id),
        enabled,
        replaces: replaces.map(rid),
        last_modified: None,
        payload: Map::new(),
    }
}

#[test]
fn bootstrap_inserts_root_with_given_enablement() {
    let mut chain = MemoryChain::default();
    chain.reconcile(&remote("a", true, None)).unwrap();
    chain.reconcile(&remote("z", false, None)).unwrap();
    assert_eq!(chain.get("a").replaces, None);
    assert!(chain.get("a").enabled);
    assert!(!chain.get("z").enabled);
}

#[test]
fn simple_extension_moves_enablement_to_new_tail() {
    let mut chain = MemoryChain::default();
    chain.put("a", true, None);

    let plan = chain.reconcile(&remote("r", true, Some("a"))).unwrap();
    assert_eq!(
        plan,
        ReconcilePlan::InsertReplacement {
            replaces: rid("a"),
            enabled: true,
            disable: Some(rid("a")),
            relink: None,
        }
    );
    assert!(!chain.get("a").enabled);
    assert!(chain.get("r").enabled);
    assert_eq!(chain.get("r").replaces, Some(rid("a")));
}

#[test]
fn splice_keeps_local_successor_active() {
    let mut chain = MemoryChain::default();
    chain.put("a", false, None);
    chain.put("b", true, Some("a"));

    let plan = chain.reconcile(&remote("r", true, Some("a"))).unwrap();
    assert_eq!(
        plan,
        ReconcilePlan::InsertReplacement {
            replaces: rid("a"),
            enabled: false,
            disable: None,
            relink: Some(rid("b")),
        }
    );
    assert!(!chain.get("a").enabled);
    assert_eq!(chain.get("a").replaces, None);
    assert!(!chain.get("r").enabled);
    assert_eq!(chain.get("r").replaces, Some(rid("a")));
    assert!(chain.get("b").enabled);
    assert_eq!(chain.get("b").replaces, Some(rid("r")));
}

#[test]
fn splice_deep_in_chain_finds_active_tail_beyond_direct_successor() {
    let mut chain = MemoryChain::default();
    chain.put("a", false, None);
    chain.put("b", false, Some("a"));
    chain.put("c", true, Some("b"));

    chain.reconcile(&remote("r", true, Some("a"))).unwrap();
    assert!(!chain.get("r").enabled);
    assert_eq!(chain.get("b").replaces, Some(rid("r")));
    assert!(chain.get("c").enabled);
}

#[test]
fn reconciling_same_record_twice_is_idempotent() {
    let mut chain = MemoryChain::default();
    chain.put("a", true, None);
    let record = remote("r", true, Some("a"));

    chain.reconcile(&record).unwrap();
    let before = chain.rules.clone();
    let plan = chain.reconcile(&record).unwrap();
    assert_eq!(plan, ReconcilePlan::UpdateExisting);
    assert_eq!(chain.rules, before);
}

#[test]
fn dangling_reference_becomes_new_root() {
    let mut chain = MemoryChain::default();
    let plan = chain.reconcile(&remote("r", true, Some("missing"))).unwrap();
    assert_eq!(
        plan,
        ReconcilePlan::InsertRoot {
            enabled: true,
            dangling: Some(rid("missing")),
        }
    );
    assert_eq!(chain.get("r").replaces, None);
}

#[test]
fn disabled_remote_tail_leaves_current_enablement() {
    let mut chain = MemoryChain::default();
    chain.put("a", true, None);
    chain.reconcile(&remote("r", false, Some("a"))).unwrap();
    assert!(chain.get("a").enabled);
    assert!(!chain.get("r").enabled);
}

#[test]
fn enabled_ancestor_is_disabled_when_new_tail_takes_over() {
    let mut chain = MemoryChain::default();
    chain.put("a", true, None);
    chain.put("b", false, Some("a"));

    chain.reconcile(&remote("r", true, Some("b"))).unwrap();
    assert!(!chain.get("a").enabled);
    assert!(!chain.get("b").enabled);
    assert!(chain.get("r").enabled);
}

#[test]
fn multiple_enabled_members_are_rejected() {
    let mut chain = MemoryChain::default();
    chain.put("a", true, None);
    chain.put("b", true, Some("a"));

    let err = chain.reconcile(&remote("r", true, Some("a"))).unwrap_err();
    assert_eq!(
        err,
        ChainError::MultipleEnabled {
            ids: vec![rid("a"), rid("b")],
        }
    );
    assert!(!chain.rules.contains_key(&rid("r")));
}

#[test]
fn cycles_and_branches_are_reported_not_followed() {
    let mut cyclic = MemoryChain::default();
    cyclic.put("a", false, Some("b"));
    cyclic.put("b", false, Some("a"));
    assert!(matches!(
        cyclic.reconcile(&remote("r", true, Some("a"))).unwrap_err(),
        ChainError::Cycle { .. }
    ));

    let mut branching = MemoryChain::default();
    branching.put("a", false, None);
    branching.put("b", true, Some("a"));
    branching.put("c", false, Some("a"));
    assert_eq!(
        branching
            .reconcile(&remote("r", true, Some("a")))
            .unwrap_err(),
        ChainError::Branching {
            id: rid("a"),
            count: 2,
        }
    );
}

#[test]
fn overly_long_chains_hit_the_depth_guard() {
    let mut chain = MemoryChain::default();
    chain.put("n0", false, None);
    for i in 1..=(MAX_CHAIN_DEPTH + 1) {
        chain.put(&format!("n{i}"), false, Some(&format!("n{}", i - 1)));
    }
    let err = chain.reconcile(&remote("r", true, Some("n0"))).unwrap_err();
    assert_eq!(
        err,
        ChainError::DepthExceeded {
            max: MAX_CHAIN_DEPTH,
        }
    );
}

#[test]
fn local_replacement_becomes_enabled_tail() {
    let mut chain = MemoryChain::default();
    chain.put("a", true, None);
    chain.replace_locally("b", "a").unwrap();
    assert!(!chain.get("a").enabled);
    assert!(chain.get("b").enabled);

    assert_eq!(
        chain.replace_locally("c", "a").unwrap_err(),
        ChainError::AlreadyReplaced {
            id: rid("a"),
            successor: rid("b"),
        }
    );
    assert_eq!(
        chain.replace_locally("c", "missing").unwrap_err(),
        ChainError::UnknownRule { id: rid("missing") }
    );
}

#[derive(Clone, Debug)]
enum Op {
    Remote {
        id: usize,
        enabled: bool,
        replaces: Option<usize>,
    },
    Local {
        id: usize,
        target: usize,
    },
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0usize..10, any::<bool>(), proptest::option::of(0usize..10)).prop_map(
            |(id, enabled, replaces)| Op::Remote {
                id,
                enabled,
                replaces,
            }
        ),
        (0usize..10, 0usize..10).prop_map(|(id, target)| Op::Local { id, target }),
    ]
}

proptest! {
    #[test]
    fn at_most_one_enabled_rule_per_chain(ops in proptest::collection::vec(op(), 1..40)) {
        let mut chain = MemoryChain::default();
        for op in ops {
            match op {
                Op::Remote { id, enabled, replaces } => {
                    let replaces = replaces.map(|i| format!("r{i}"));
                    let record = remote(&format!("r{id}"), enabled, replaces.as_deref());
                    let before = chain.rules.clone();
                    if chain.reconcile(&record).is_err() {
                        prop_assert_eq!(&chain.rules, &before);
                    }
                }
                Op::Local { id, target } => {
                    let id = format!("r{id}");
                    if id != format!("r{target}") && !chain.rules.contains_key(&rid(&id)) {
                        let _ = chain.replace_locally(&id, &format!("r{target}"));
                    }
                }
            }
            for (root, enabled) in chain.enabled_per_root() {
                prop_assert!(enabled <= 1, "chain rooted at {} has {} enabled rules", root, enabled);
            }
        }
    }
}
