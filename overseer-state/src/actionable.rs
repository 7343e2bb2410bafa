//! Capabilities: what a node does when it is created, removed or updated.
//!
//! A node's capability is resolved once, while its snapshot is built, from up
//! to three sources:
//!
//! 1. a wrapped [`Actionable`] exposed by the value itself
//!    ([`Stateful::delegate`](crate::Stateful::delegate));
//! 2. otherwise, for records, the opt-in [`Create`], [`Remove`] and [`Update`]
//!    implementations declared in [`Record::capabilities`](crate::Record::capabilities);
//! 3. a scoped update hook of the parent record, when the node was reached
//!    through a hooked field (see [`Hooks`]).
//!
//! The result is an ordered list of fragments, `[own, parent hook, wrapped]`.
//! Create and update run the list forwards, remove runs it backwards. Nodes
//! with no behavior at all share the canonical [`noop`] capability.

use crate::{cancel::CancelToken, shape::Absent};
use anyhow::{anyhow, Result};
use lazy_static::lazy_static;
use std::{
    any::{type_name, Any, TypeId},
    collections::BTreeMap,
    sync::Arc,
};

/// The capability set of a node. Every operation defaults to a no-op.
///
/// `prev` in [`Actionable::update`] is the most specific previous value
/// available: the previous record or scalar value when there is one, otherwise
/// the previous [`Item`](crate::Item) itself.
pub trait Actionable: Send + Sync {
    fn create(&self, _token: &CancelToken) -> Result<()> {
        Ok(())
    }
    fn remove(&self, _token: &CancelToken) -> Result<()> {
        Ok(())
    }
    fn update(&self, _token: &CancelToken, _prev: &dyn Any) -> Result<()> {
        Ok(())
    }
}

/// Opt-in creation side effect of a record.
pub trait Create {
    fn create(&self, token: &CancelToken) -> Result<()>;
}

/// Opt-in removal side effect of a record.
pub trait Remove {
    fn remove(&self, token: &CancelToken) -> Result<()>;
}

/// Opt-in update side effect of a record, given its previous value.
pub trait Update {
    fn update(&self, token: &CancelToken, prev: &Self) -> Result<()>;
}

struct NoAction;
impl Actionable for NoAction {}

lazy_static! {
    static ref NOOP: Arc<dyn Actionable> = Arc::new(NoAction);
}

/// The shared capability of nodes without any behavior.
pub fn noop() -> Arc<dyn Actionable> {
    NOOP.clone()
}

/// Whether `actionable` is the shared [`noop`] capability.
pub fn is_noop(actionable: &Arc<dyn Actionable>) -> bool {
    Arc::as_ptr(actionable) as *const () == Arc::as_ptr(&*NOOP) as *const ()
}

type RecordOp<R> = fn(&R, &CancelToken) -> Result<()>;
type RecordUpdate<R> = fn(&R, &CancelToken, &R) -> Result<()>;

/// The operations a record declares in
/// [`Record::capabilities`](crate::Record::capabilities).
pub struct Capabilities<R> {
    create: Option<RecordOp<R>>,
    remove: Option<RecordOp<R>>,
    update: Option<RecordUpdate<R>>,
}

impl<R> Capabilities<R> {
    pub(crate) fn new() -> Self {
        Capabilities {
            create: None,
            remove: None,
            update: None,
        }
    }

    pub fn create(&mut self) -> &mut Self
    where
        R: Create,
    {
        self.create = Some(<R as Create>::create);
        self
    }

    pub fn remove(&mut self) -> &mut Self
    where
        R: Remove,
    {
        self.remove = Some(<R as Remove>::remove);
        self
    }

    pub fn update(&mut self) -> &mut Self
    where
        R: Update,
    {
        self.update = Some(<R as Update>::update);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.create.is_none() && self.remove.is_none() && self.update.is_none()
    }
}

impl<R: Send + Sync + 'static> Capabilities<R> {
    /// Bind the declared operations to `record`.
    pub(crate) fn bind(self, record: Arc<R>) -> Option<Fragment> {
        if self.is_empty() {
            return None;
        }
        let create = self.create.map(|op| -> OpFn {
            let record = record.clone();
            Box::new(move |token: &CancelToken| op(&record, token))
        });
        let remove = self.remove.map(|op| -> OpFn {
            let record = record.clone();
            Box::new(move |token: &CancelToken| op(&record, token))
        });
        let update = self.update.map(|op| -> UpdateFn {
            let record = record.clone();
            Box::new(move |token: &CancelToken, prev: &dyn Any| {
                let prev = prev.downcast_ref::<R>().ok_or_else(|| {
                    anyhow!(
                        "update of {} requires a previous value of the same type",
                        type_name::<R>()
                    )
                })?;
                op(&record, token, prev)
            })
        });
        Some(Fragment::Own {
            create,
            remove,
            update,
        })
    }
}

type HookCall<R> = Arc<dyn Fn(&R, &CancelToken, &dyn Any) -> Result<()> + Send + Sync>;

struct Hook<R> {
    arg_type: TypeId,
    arg_type_name: &'static str,
    call: HookCall<R>,
}

/// Scoped update hooks of a record, by name.
///
/// A field visited with [`Fields::hooked`](crate::Fields::hooked) names one of
/// these. When that field changes, the hook is called on the new record with
/// the field's previous value, and nothing else about the record is updated
/// unless the record declares [`Update`] itself.
pub struct Hooks<R> {
    hooks: BTreeMap<String, Hook<R>>,
}

impl<R: 'static> Hooks<R> {
    pub(crate) fn new() -> Self {
        Hooks {
            hooks: BTreeMap::new(),
        }
    }

    /// Register `hook` under `name`. `F` is the type of the hooked field's
    /// value, after unwrapping `Option`, `Box` and `Arc`.
    ///
    /// The hook is not called when the field had no previous value.
    pub fn register<F: Any>(
        &mut self,
        name: &str,
        hook: fn(&R, &CancelToken, &F) -> Result<()>,
    ) -> &mut Self {
        let hook_name = name.to_string();
        let call: HookCall<R> = Arc::new(
            move |record: &R, token: &CancelToken, prev: &dyn Any| match prev.downcast_ref::<F>()
            {
                Some(prev) => hook(record, token, prev),
                None if prev.is::<Absent>() => Ok(()),
                None => Err(anyhow!(
                    "hook {} requires a previous value of type {}",
                    hook_name,
                    type_name::<F>()
                )),
            },
        );
        self.hooks.insert(
            name.to_string(),
            Hook {
                arg_type: TypeId::of::<F>(),
                arg_type_name: type_name::<F>(),
                call,
            },
        );
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.hooks.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

impl<R: Send + Sync + 'static> Hooks<R> {
    /// Bind the hook called `name` to `record`, for use by one field.
    pub(crate) fn bind(&self, name: &str, record: &Arc<R>) -> Option<BoundHook> {
        let hook = self.hooks.get(name)?;
        let call = hook.call.clone();
        let record = record.clone();
        Some(BoundHook {
            name: name.to_string(),
            arg_type: hook.arg_type,
            arg_type_name: hook.arg_type_name,
            call: Box::new(move |token: &CancelToken, prev: &dyn Any| {
                call(&record, token, prev)
            }),
        })
    }
}

/// A parent record's hook, bound to that record, waiting to be attached to
/// the node of the hooked field.
pub(crate) struct BoundHook {
    pub(crate) name: String,
    pub(crate) arg_type: TypeId,
    pub(crate) arg_type_name: &'static str,
    call: UpdateFn,
}

type OpFn = Box<dyn Fn(&CancelToken) -> Result<()> + Send + Sync>;
type UpdateFn = Box<dyn Fn(&CancelToken, &dyn Any) -> Result<()> + Send + Sync>;

pub(crate) enum Fragment {
    Own {
        create: Option<OpFn>,
        remove: Option<OpFn>,
        update: Option<UpdateFn>,
    },
    ParentUpdate(UpdateFn),
    Wrapped(Arc<dyn Actionable>),
}

impl Fragment {
    fn create(&self, token: &CancelToken) -> Result<()> {
        match self {
            Fragment::Own {
                create: Some(op), ..
            } => op(token),
            Fragment::Wrapped(wrapped) => wrapped.create(token),
            _ => Ok(()),
        }
    }

    fn remove(&self, token: &CancelToken) -> Result<()> {
        match self {
            Fragment::Own {
                remove: Some(op), ..
            } => op(token),
            Fragment::Wrapped(wrapped) => wrapped.remove(token),
            _ => Ok(()),
        }
    }

    fn update(&self, token: &CancelToken, prev: &dyn Any) -> Result<()> {
        match self {
            Fragment::Own {
                update: Some(op), ..
            } => op(token, prev),
            Fragment::ParentUpdate(hook) => hook(token, prev),
            Fragment::Wrapped(wrapped) => wrapped.update(token, prev),
            _ => Ok(()),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Fragment::Own { .. } => "own",
            Fragment::ParentUpdate(_) => "parent update",
            Fragment::Wrapped(_) => "wrapped",
        }
    }
}

/// A resolved capability: an ordered list of fragments.
pub(crate) struct Actions {
    fragments: Vec<Fragment>,
}

impl Actionable for Actions {
    fn create(&self, token: &CancelToken) -> Result<()> {
        for fragment in &self.fragments {
            fragment.create(token)?;
        }
        Ok(())
    }

    fn remove(&self, token: &CancelToken) -> Result<()> {
        for fragment in self.fragments.iter().rev() {
            fragment.remove(token)?;
        }
        Ok(())
    }

    fn update(&self, token: &CancelToken, prev: &dyn Any) -> Result<()> {
        for fragment in &self.fragments {
            fragment.update(token, prev)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Actions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.fragments.iter().map(|x| x.kind()))
            .finish()
    }
}

/// Combine the fragments found for one node.
pub(crate) fn resolve(
    own: Option<Fragment>,
    parent_update: Option<BoundHook>,
    wrapped: Option<Arc<dyn Actionable>>,
) -> Arc<dyn Actionable> {
    if own.is_none() && parent_update.is_none() {
        return wrapped.unwrap_or_else(noop);
    }
    let mut fragments = Vec::with_capacity(3);
    fragments.extend(own);
    fragments.extend(parent_update.map(|hook| Fragment::ParentUpdate(hook.call)));
    fragments.extend(wrapped.map(Fragment::Wrapped));
    Arc::new(Actions { fragments })
}
