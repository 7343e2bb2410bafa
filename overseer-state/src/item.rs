//! State items: the nodes of a snapshot.

use crate::{
    actionable::{is_noop, noop, Actionable},
    cancel::CancelToken,
    id::Identifier,
    plan::{infer_actions, Action},
    shape::Scalar,
};
use anyhow::Result;
use std::{any::Any, collections::HashMap, fmt::Debug, sync::Arc};
use tracing::debug;

/// A node of a snapshot that can be compared with its counterpart in another
/// snapshot and acted upon.
pub trait Item: Send + Sync + Debug {
    fn id(&self) -> &Identifier;

    /// Whether `other` describes the same state. Only meaningful when both
    /// have the same identifier.
    fn is_same(&self, other: &dyn Item) -> bool;

    fn create(&self, token: &CancelToken) -> Result<()>;

    fn remove(&self, token: &CancelToken) -> Result<()>;

    /// Move from `prev`, the item with the same identifier in the previous
    /// snapshot, to this item.
    fn update(&self, token: &CancelToken, prev: &dyn Item) -> Result<()>;

    fn as_any(&self) -> &dyn Any;
}

/// A snapshot, or a level of one: items in order.
pub type Set = Vec<Arc<dyn Item>>;

/// `prev` was built from a different kind of value than `next`, so there is
/// nothing to update from.
fn replace(token: &CancelToken, next: &dyn Item, prev: &dyn Item) -> Result<()> {
    debug!(id = %next.id(), "shape changed, replacing");
    prev.remove(token)?;
    next.create(token)
}

/// A scalar value.
pub struct LeafItem {
    id: Identifier,
    value: Arc<dyn Scalar>,
    actions: Arc<dyn Actionable>,
}

impl LeafItem {
    pub fn new(id: impl Into<Identifier>, value: impl Scalar) -> Self {
        Self::with_actions(id, Arc::new(value), noop())
    }

    pub fn with_actions(
        id: impl Into<Identifier>,
        value: Arc<dyn Scalar>,
        actions: Arc<dyn Actionable>,
    ) -> Self {
        LeafItem {
            id: id.into(),
            value,
            actions,
        }
    }

    pub fn value(&self) -> &dyn Scalar {
        &*self.value
    }

    pub fn actions(&self) -> &Arc<dyn Actionable> {
        &self.actions
    }
}

impl Debug for LeafItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} = {:?}", self.id, self.value)
    }
}

impl Item for LeafItem {
    fn id(&self) -> &Identifier {
        &self.id
    }

    fn is_same(&self, other: &dyn Item) -> bool {
        match other.as_any().downcast_ref::<LeafItem>() {
            Some(other) => self.id == other.id && self.value.eq_scalar(&*other.value),
            None => false,
        }
    }

    fn create(&self, token: &CancelToken) -> Result<()> {
        self.actions.create(token)
    }

    fn remove(&self, token: &CancelToken) -> Result<()> {
        self.actions.remove(token)
    }

    /// The capability receives the previous scalar value.
    fn update(&self, token: &CancelToken, prev: &dyn Item) -> Result<()> {
        match prev.as_any().downcast_ref::<LeafItem>() {
            Some(prev) => self.actions.update(token, prev.value.as_any()),
            None => replace(token, self, prev),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A record, list or map: a node with ordered parts.
pub struct ComposedItem {
    id: Identifier,
    parts: Set,
    actions: Arc<dyn Actionable>,
    original: Option<Arc<dyn Any + Send + Sync>>,
}

impl ComposedItem {
    /// A composed item without behavior of its own.
    pub fn new(id: impl Into<Identifier>, parts: Set) -> Self {
        Self::from_parts(id.into(), parts, noop(), None)
    }

    pub(crate) fn from_parts(
        id: Identifier,
        parts: Set,
        actions: Arc<dyn Actionable>,
        original: Option<Arc<dyn Any + Send + Sync>>,
    ) -> Self {
        ComposedItem {
            id,
            parts,
            actions,
            original,
        }
    }

    pub fn with_actions(mut self, actions: Arc<dyn Actionable>) -> Self {
        self.actions = actions;
        self
    }

    /// Attach the value this item was built from. It is handed to the
    /// capability of the next snapshot's item on update.
    pub fn with_original(mut self, original: Arc<dyn Any + Send + Sync>) -> Self {
        self.original = Some(original);
        self
    }

    pub fn parts(&self) -> &[Arc<dyn Item>] {
        &self.parts
    }

    pub fn actions(&self) -> &Arc<dyn Actionable> {
        &self.actions
    }

    pub fn original(&self) -> Option<&(dyn Any + Send + Sync)> {
        self.original.as_deref()
    }
}

impl Debug for ComposedItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ", self.id)?;
        f.debug_list().entries(self.parts.iter()).finish()
    }
}

impl Item for ComposedItem {
    fn id(&self) -> &Identifier {
        &self.id
    }

    /// Same identifier, pairwise equal parts, and either both or neither
    /// have a capability.
    fn is_same(&self, other: &dyn Item) -> bool {
        let Some(other) = other.as_any().downcast_ref::<ComposedItem>() else {
            return false;
        };
        if self.id != other.id || self.parts.len() != other.parts.len() {
            return false;
        }
        if is_noop(&self.actions) != is_noop(&other.actions) {
            return false;
        }
        let others: HashMap<&Identifier, &Arc<dyn Item>> =
            other.parts.iter().map(|x| (x.id(), x)).collect();
        self.parts.iter().all(|part| {
            others
                .get(part.id())
                .is_some_and(|x| part.is_same(x.as_ref()))
        })
    }

    /// The item's own capability first, then its parts in order.
    fn create(&self, token: &CancelToken) -> Result<()> {
        self.actions.create(token)?;
        for part in &self.parts {
            part.create(token)?;
        }
        Ok(())
    }

    /// The parts in order, then the item's own capability.
    fn remove(&self, token: &CancelToken) -> Result<()> {
        for part in &self.parts {
            part.remove(token)?;
        }
        self.actions.remove(token)
    }

    /// Reconcile the parts first, then run the item's own update, if it has
    /// one, with the previous original value.
    fn update(&self, token: &CancelToken, prev: &dyn Item) -> Result<()> {
        let Some(prev_composed) = prev.as_any().downcast_ref::<ComposedItem>() else {
            return replace(token, self, prev);
        };
        infer_actions(&prev_composed.parts, &self.parts).run(token)?;
        if is_noop(&self.actions) {
            return Ok(());
        }
        let prev_value: &dyn Any = match &prev_composed.original {
            Some(original) => &**original,
            None => prev.as_any(),
        };
        self.actions.update(token, prev_value)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A string value with a capability of its own. Useful for assembling
/// snapshots by hand.
pub struct StringItem {
    id: Identifier,
    value: String,
    actions: Arc<dyn Actionable>,
}

impl StringItem {
    pub fn new(
        id: impl Into<Identifier>,
        value: impl Into<String>,
        actions: Arc<dyn Actionable>,
    ) -> Self {
        StringItem {
            id: id.into(),
            value: value.into(),
            actions,
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

impl Debug for StringItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} = {:?}", self.id, self.value)
    }
}

impl Item for StringItem {
    fn id(&self) -> &Identifier {
        &self.id
    }

    fn is_same(&self, other: &dyn Item) -> bool {
        other
            .as_any()
            .downcast_ref::<StringItem>()
            .is_some_and(|other| self.id == other.id && self.value == other.value)
    }

    fn create(&self, token: &CancelToken) -> Result<()> {
        self.actions.create(token)
    }

    fn remove(&self, token: &CancelToken) -> Result<()> {
        self.actions.remove(token)
    }

    /// The capability receives the previous item itself.
    fn update(&self, token: &CancelToken, prev: &dyn Item) -> Result<()> {
        self.actions.update(token, prev.as_any())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
