//! Diffing two snapshots into an executable plan.

use crate::{cancel::CancelToken, id::Identifier, item::Item};
use anyhow::Result;
use std::{collections::HashMap, fmt::Display, sync::Arc};
use tracing::{debug, debug_span, warn};

/// Something that can be run.
pub trait Action: Send + Sync {
    fn run(&self, token: &CancelToken) -> Result<()>;
}

impl<F> Action for F
where
    F: Fn(&CancelToken) -> Result<()> + Send + Sync,
{
    fn run(&self, token: &CancelToken) -> Result<()> {
        self(token)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepKind {
    Remove,
    Update,
    Create,
}

impl Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            StepKind::Remove => "remove",
            StepKind::Update => "update",
            StepKind::Create => "create",
        })
    }
}

/// One entry of a [`Plan`].
#[derive(Clone)]
pub enum Step {
    Remove(Arc<dyn Item>),
    Update {
        next: Arc<dyn Item>,
        prev: Arc<dyn Item>,
    },
    Create(Arc<dyn Item>),
}

impl Step {
    pub fn kind(&self) -> StepKind {
        match self {
            Step::Remove(_) => StepKind::Remove,
            Step::Update { .. } => StepKind::Update,
            Step::Create(_) => StepKind::Create,
        }
    }

    pub fn id(&self) -> &Identifier {
        match self {
            Step::Remove(item) | Step::Create(item) => item.id(),
            Step::Update { next, .. } => next.id(),
        }
    }
}

impl Action for Step {
    fn run(&self, token: &CancelToken) -> Result<()> {
        let _span = debug_span!("step", kind = %self.kind(), id = %self.id()).entered();
        match self {
            Step::Remove(item) => item.remove(token),
            Step::Update { next, prev } => next.update(token, prev.as_ref()),
            Step::Create(item) => item.create(token),
        }
    }
}

impl Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind(), self.id())
    }
}

impl std::fmt::Debug for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Step::Remove(item) => f.debug_tuple("Remove").field(item).finish(),
            Step::Update { next, prev } => f
                .debug_struct("Update")
                .field("next", next)
                .field("prev", prev)
                .finish(),
            Step::Create(item) => f.debug_tuple("Create").field(item).finish(),
        }
    }
}

/// The steps that take one snapshot to another, run in order.
///
/// All removals come first, then all updates, then all creations. Running
/// stops at the first step that fails; earlier steps are not undone.
#[derive(Clone, Debug, Default)]
pub struct Plan {
    steps: Vec<Step>,
}

impl Plan {
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn into_steps(self) -> Vec<Step> {
        self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl Action for Plan {
    fn run(&self, token: &CancelToken) -> Result<()> {
        for step in &self.steps {
            step.run(token)?;
        }
        Ok(())
    }
}

impl From<Vec<Step>> for Plan {
    fn from(steps: Vec<Step>) -> Self {
        Plan { steps }
    }
}

/// Compare two snapshot levels by identifier.
///
/// Items only in `prev` are removed and items only in `next` are created.
/// Items in both are updated unless [`Item::is_same`] holds. Removals and
/// updates follow the order of `prev`, creations the order of `next`.
///
/// Identifiers are expected to be unique within a level. When they are not,
/// the last item in `next` with a given identifier is the one paired with
/// `prev`, and the rest are treated as new.
pub fn infer_actions(prev: &[Arc<dyn Item>], next: &[Arc<dyn Item>]) -> Plan {
    let mut unmatched: HashMap<&Identifier, usize> = HashMap::with_capacity(next.len());
    for (i, item) in next.iter().enumerate() {
        if unmatched.insert(item.id(), i).is_some() {
            warn!(id = %item.id(), "duplicate identifier in the next state");
        }
    }

    let mut matched = vec![false; next.len()];
    let mut removes = Vec::new();
    let mut updates = Vec::new();
    for prev_item in prev {
        match unmatched.remove(prev_item.id()) {
            Some(i) => {
                matched[i] = true;
                let next_item = &next[i];
                if !next_item.is_same(prev_item.as_ref()) {
                    updates.push(Step::Update {
                        next: next_item.clone(),
                        prev: prev_item.clone(),
                    });
                }
            }
            None => removes.push(Step::Remove(prev_item.clone())),
        }
    }
    let creates: Vec<Step> = next
        .iter()
        .zip(&matched)
        .filter(|(_, matched)| !**matched)
        .map(|(item, _)| Step::Create(item.clone()))
        .collect();

    debug!(
        removes = removes.len(),
        updates = updates.len(),
        creates = creates.len(),
        "inferred actions"
    );
    let mut steps = removes;
    steps.extend(updates);
    steps.extend(creates);
    Plan { steps }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{actionable::Actionable, item::StringItem};
    use anyhow::bail;
    use proptest::prelude::*;
    use std::{any::Any, sync::Mutex};

    type Log = Arc<Mutex<Vec<String>>>;

    /// Logs `create <id> with <value>`, `remove <id> with <value>` and
    /// `update <id> with <value> from <prev id>/<prev value>`.
    struct Recorder {
        id: String,
        value: String,
        log: Log,
        fail: bool,
    }

    impl Recorder {
        fn push(&self, entry: String) -> Result<()> {
            self.log.lock().unwrap().push(entry);
            if self.fail {
                bail!("{} failed", self.id);
            }
            Ok(())
        }
    }

    impl Actionable for Recorder {
        fn create(&self, _token: &CancelToken) -> Result<()> {
            self.push(format!("create {} with {}", self.id, self.value))
        }
        fn remove(&self, _token: &CancelToken) -> Result<()> {
            self.push(format!("remove {} with {}", self.id, self.value))
        }
        fn update(&self, _token: &CancelToken, prev: &dyn Any) -> Result<()> {
            let prev = prev.downcast_ref::<StringItem>().expect("string item");
            self.push(format!(
                "update {} with {} from {}/{}",
                self.id,
                self.value,
                prev.id(),
                prev.value()
            ))
        }
    }

    fn item(log: &Log, id: &str, value: &str) -> Arc<dyn Item> {
        failing_item(log, id, value, false)
    }

    fn failing_item(log: &Log, id: &str, value: &str, fail: bool) -> Arc<dyn Item> {
        Arc::new(StringItem::new(
            id,
            value,
            Arc::new(Recorder {
                id: id.to_string(),
                value: value.to_string(),
                log: log.clone(),
                fail,
            }),
        ))
    }

    fn take(log: &Log) -> Vec<String> {
        std::mem::take(&mut *log.lock().unwrap())
    }

    fn describe(plan: &Plan) -> Vec<String> {
        plan.steps().iter().map(|x| x.to_string()).collect()
    }

    #[test]
    fn diff_and_run() {
        let log = Log::default();
        let token = CancelToken::new();
        let prev = vec![item(&log, "1", "a"), item(&log, "2", "b"), item(&log, "3", "c")];
        let next = vec![item(&log, "2", "c"), item(&log, "3", "c"), item(&log, "4", "d")];

        let plan = infer_actions(&prev, &next);
        assert_eq!(describe(&plan), vec!["remove 1", "update 2", "create 4"]);
        plan.run(&token).unwrap();
        assert_eq!(
            take(&log),
            vec![
                "remove 1 with a",
                "update 2 with c from 2/b",
                "create 4 with d"
            ]
        );
    }

    #[test]
    fn from_nothing_and_to_nothing() {
        let log = Log::default();
        let items = vec![item(&log, "a", "1"), item(&log, "b", "2")];
        assert_eq!(describe(&infer_actions(&[], &items)), vec!["create a", "create b"]);
        assert_eq!(describe(&infer_actions(&items, &[])), vec!["remove a", "remove b"]);
        assert!(infer_actions(&[], &[]).is_empty());
    }

    #[test]
    fn phases_are_grouped() {
        let log = Log::default();
        let prev = vec![
            item(&log, "u1", "x"),
            item(&log, "r1", "x"),
            item(&log, "u2", "x"),
            item(&log, "r2", "x"),
        ];
        let next = vec![
            item(&log, "c1", "x"),
            item(&log, "u2", "y"),
            item(&log, "c2", "x"),
            item(&log, "u1", "y"),
        ];
        assert_eq!(
            describe(&infer_actions(&prev, &next)),
            vec!["remove r1", "remove r2", "update u1", "update u2", "create c1", "create c2"]
        );
    }

    #[test]
    fn stops_at_first_failure() {
        let log = Log::default();
        let token = CancelToken::new();
        let next = vec![
            item(&log, "a", "1"),
            failing_item(&log, "b", "2", true),
            item(&log, "c", "3"),
        ];
        let err = infer_actions(&[], &next).run(&token).unwrap_err();
        assert_eq!(err.to_string(), "b failed");
        assert_eq!(take(&log), vec!["create a with 1", "create b with 2"]);
    }

    #[test]
    fn duplicate_identifiers() {
        let log = Log::default();
        let prev = vec![item(&log, "a", "1")];
        let next = vec![item(&log, "a", "1"), item(&log, "a", "2")];
        assert_eq!(
            describe(&infer_actions(&prev, &next)),
            vec!["update a", "create a"]
        );
    }

    #[test]
    fn closures_are_actions() {
        let token = CancelToken::new();
        let check = |token: &CancelToken| token.check();
        assert!(check.run(&token).is_ok());
        token.cancel();
        assert!(check.run(&token).is_err());
    }

    fn snapshot(log: &Log, entries: &[(u8, u8)]) -> Vec<Arc<dyn Item>> {
        let mut seen = std::collections::HashSet::new();
        entries
            .iter()
            .filter(|(id, _)| seen.insert(*id))
            .map(|(id, value)| item(log, &id.to_string(), &value.to_string()))
            .collect()
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 64,
            .. ProptestConfig::default()
        })]

        #[test]
        fn identical_snapshots_need_nothing(entries in prop::collection::vec((0u8..20, 0u8..4), 0..16)) {
            let log = Log::default();
            let a = snapshot(&log, &entries);
            let b = snapshot(&log, &entries);
            prop_assert!(infer_actions(&a, &b).is_empty());
        }

        #[test]
        fn every_identifier_is_accounted_for(
            prev in prop::collection::vec((0u8..20, 0u8..4), 0..16),
            next in prop::collection::vec((0u8..20, 0u8..4), 0..16),
        ) {
            let log = Log::default();
            let prev = snapshot(&log, &prev);
            let next = snapshot(&log, &next);
            let plan = infer_actions(&prev, &next);

            let mut last = StepKind::Remove;
            for step in plan.steps() {
                let kind = step.kind();
                let in_prev = prev.iter().any(|x| x.id() == step.id());
                let in_next = next.iter().any(|x| x.id() == step.id());
                match kind {
                    StepKind::Remove => prop_assert!(in_prev && !in_next),
                    StepKind::Update => prop_assert!(in_prev && in_next),
                    StepKind::Create => prop_assert!(!in_prev && in_next),
                }
                // remove < update < create
                prop_assert!(last as u8 <= kind as u8);
                last = kind;
            }
            let removed = plan.steps().iter().filter(|x| x.kind() == StepKind::Remove).count();
            let created = plan.steps().iter().filter(|x| x.kind() == StepKind::Create).count();
            let common = prev.iter().filter(|x| next.iter().any(|y| y.id() == x.id())).count();
            prop_assert_eq!(removed, prev.len() - common);
            prop_assert_eq!(created, next.len() - common);
        }
    }
}
