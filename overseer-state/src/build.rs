//! Turning a typed value into a tree of state items.
//!
//! The builder walks the value's [`Shape`] depth first. Records become
//! composed items whose parts are the fields they describe, lists and maps
//! become composed items whose parts are their elements, and scalars become
//! leaves. Identifiers and capabilities are resolved along the way; see
//! [`crate::id`] and [`crate::actionable`].

use crate::{
    actionable::{noop, resolve, Actionable, BoundHook, Capabilities, Hooks},
    error::BuildError,
    id::{FrozenIds, IdTree, NodeId},
    item::{ComposedItem, Item, LeafItem},
    shape::{Absent, Scalar, Shape, Stateful},
};
use std::{
    any::{type_name, Any, TypeId},
    collections::HashMap,
    fmt::Display,
    sync::Arc,
};
use tracing::{debug, trace};

/// A value with named fields, built into a composed item.
///
/// ```ignore
/// #[derive(Clone)]
/// struct Room {
///     name: String,
///     space: Space,
/// }
///
/// impl Record for Room {
///     fn describe(&self, fields: &mut Fields<'_, Self>) -> Result<(), BuildError> {
///         fields.identity(&self.name)?;
///         fields.field("Space", &self.space)
///     }
/// }
///
/// impl Stateful for Room {
///     fn shape(&self) -> Shape<'_> {
///         Shape::record(self)
///     }
/// }
/// ```
pub trait Record: Clone + Send + Sync + 'static {
    /// Visit the fields that take part in state, in order. Fields that are
    /// not visited are not part of the snapshot.
    fn describe(&self, fields: &mut Fields<'_, Self>) -> Result<(), BuildError>;

    /// Declare which of [`Create`](crate::Create), [`Remove`](crate::Remove)
    /// and [`Update`](crate::Update) the record implements.
    fn capabilities(capabilities: &mut Capabilities<Self>) {
        let _ = capabilities;
    }

    /// Register the scoped update hooks that hooked fields refer to.
    fn hooks(hooks: &mut Hooks<Self>) {
        let _ = hooks;
    }
}

/// The field visitor handed to [`Record::describe`].
pub struct Fields<'b, R> {
    builder: &'b mut Builder,
    record: Arc<R>,
    hooks: Arc<Hooks<R>>,
    node: NodeId,
    identified: bool,
    parts: Vec<Draft>,
}

impl<'b, R: Record> Fields<'b, R> {
    /// Make `value` part of the record's identifier instead of a field.
    ///
    /// In a list the value replaces the element's index, elsewhere it is
    /// added as an extra segment. A record has at most one identity.
    pub fn identity(&mut self, value: &dyn Display) -> Result<(), BuildError> {
        if self.identified {
            return Err(BuildError::DuplicateIdentity {
                record: type_name::<R>(),
            });
        }
        self.identified = true;
        self.node = self.builder.ids.inject(self.node, value.to_string());
        Ok(())
    }

    pub fn field<F: Stateful>(&mut self, name: &str, value: &F) -> Result<(), BuildError> {
        self.visit(name, value, None)
    }

    /// Visit a field whose changes are handled by the record hook `hook`.
    pub fn hooked<F: Stateful>(
        &mut self,
        name: &str,
        value: &F,
        hook: &str,
    ) -> Result<(), BuildError> {
        let bound = self
            .hooks
            .bind(hook, &self.record)
            .ok_or_else(|| BuildError::UnknownHook {
                record: type_name::<R>(),
                field: name.to_string(),
                hook: hook.to_string(),
            })?;
        self.visit(name, value, Some(bound))
    }

    fn visit(
        &mut self,
        name: &str,
        value: &dyn Stateful,
        hook: Option<BoundHook>,
    ) -> Result<(), BuildError> {
        let node = self.builder.ids.child(self.node, name);
        let context = FieldContext {
            field: name.to_string(),
            hook,
        };
        let part = self.builder.node(value, node, context)?;
        self.parts.push(part);
        Ok(())
    }
}

/// The field a node was reached through, if any, and its hook.
#[derive(Default)]
pub(crate) struct FieldContext {
    field: String,
    hook: Option<BoundHook>,
}

impl FieldContext {
    fn signature_error(self, found: &'static str) -> BuildError {
        let (hook, expected) = match self.hook {
            Some(hook) => (hook.name, hook.arg_type_name),
            None => (String::new(), "none"),
        };
        BuildError::HookSignature {
            field: self.field,
            hook,
            expected,
            found,
        }
    }
}

/// An item whose identifier is not rendered yet.
pub(crate) enum Draft {
    Leaf {
        node: NodeId,
        value: Arc<dyn Scalar>,
        actions: Arc<dyn Actionable>,
    },
    Composed {
        node: NodeId,
        parts: Vec<Draft>,
        actions: Arc<dyn Actionable>,
        original: Option<Arc<dyn Any + Send + Sync>>,
    },
}

impl Draft {
    fn finish(self, ids: &FrozenIds) -> Arc<dyn Item> {
        match self {
            Draft::Leaf {
                node,
                value,
                actions,
            } => {
                let id = ids.get(node).clone();
                trace!(%id, value = ?value, "leaf");
                Arc::new(LeafItem::with_actions(id, value, actions))
            }
            Draft::Composed {
                node,
                parts,
                actions,
                original,
            } => Arc::new(finish_composed(ids, node, parts, actions, original)),
        }
    }
}

fn finish_composed(
    ids: &FrozenIds,
    node: NodeId,
    parts: Vec<Draft>,
    actions: Arc<dyn Actionable>,
    original: Option<Arc<dyn Any + Send + Sync>>,
) -> ComposedItem {
    let id = ids.get(node).clone();
    let parts = parts.into_iter().map(|part| part.finish(ids)).collect();
    trace!(%id, "composed");
    ComposedItem::from_parts(id, parts, actions, original)
}

/// The records' view of the builder.
pub(crate) trait ErasedRecord: Send + Sync {
    fn build(
        &self,
        builder: &mut Builder,
        node: NodeId,
        delegate: Option<Arc<dyn Actionable>>,
        context: FieldContext,
    ) -> Result<Draft, BuildError>;
}

impl<R: Record> ErasedRecord for R {
    fn build(
        &self,
        builder: &mut Builder,
        node: NodeId,
        delegate: Option<Arc<dyn Actionable>>,
        context: FieldContext,
    ) -> Result<Draft, BuildError> {
        if let Some(hook) = &context.hook {
            if hook.arg_type != TypeId::of::<R>() {
                return Err(context.signature_error(type_name::<R>()));
            }
        }

        let record = Arc::new(self.clone());
        let hooks = builder.hooks::<R>();
        let mut fields = Fields {
            builder,
            record: record.clone(),
            hooks,
            node,
            identified: false,
            parts: Vec::new(),
        };
        record.describe(&mut fields)?;
        let Fields { node, parts, .. } = fields;

        let own = match delegate {
            Some(_) => None,
            None => {
                let mut capabilities = Capabilities::new();
                R::capabilities(&mut capabilities);
                capabilities.bind(record.clone())
            }
        };
        Ok(Draft::Composed {
            node,
            parts,
            actions: resolve(own, context.hook, delegate),
            original: Some(record as Arc<dyn Any + Send + Sync>),
        })
    }
}

pub(crate) struct Builder {
    ids: IdTree,
    /// `Hooks<R>` per record type, computed once per build.
    hook_tables: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl Builder {
    fn new() -> Self {
        Builder {
            ids: IdTree::new(),
            hook_tables: HashMap::new(),
        }
    }

    fn hooks<R: Record>(&mut self) -> Arc<Hooks<R>> {
        let table = self
            .hook_tables
            .entry(TypeId::of::<R>())
            .or_insert_with(|| {
                let mut hooks = Hooks::<R>::new();
                R::hooks(&mut hooks);
                let table: Arc<dyn Any + Send + Sync> = Arc::new(hooks);
                table
            })
            .clone();
        match table.downcast::<Hooks<R>>() {
            Ok(hooks) => hooks,
            Err(_) => unreachable!("hook tables are keyed by their record type"),
        }
    }

    fn node(
        &mut self,
        value: &dyn Stateful,
        node: NodeId,
        context: FieldContext,
    ) -> Result<Draft, BuildError> {
        self.shaped(value.shape(), value.delegate(), node, context)
    }

    fn shaped(
        &mut self,
        shape: Shape<'_>,
        delegate: Option<Arc<dyn Actionable>>,
        node: NodeId,
        context: FieldContext,
    ) -> Result<Draft, BuildError> {
        let kind = shape.describe();
        match shape {
            Shape::Indirect(inner) => {
                // The outermost delegate wins.
                let delegate = delegate.or_else(|| inner.delegate());
                self.shaped(inner.shape(), delegate, node, context)
            }
            Shape::Record(record) => record.0.build(self, node, delegate, context),
            Shape::List(items) => {
                if context.hook.is_some() {
                    return Err(context.signature_error(kind));
                }
                let mut parts = Vec::with_capacity(items.len());
                for (i, item) in items.into_iter().enumerate() {
                    let child = self.ids.child_by_index(node, i);
                    parts.push(self.node(item, child, FieldContext::default())?);
                }
                Ok(container(node, parts, delegate))
            }
            Shape::Map(entries) => {
                if context.hook.is_some() {
                    return Err(context.signature_error(kind));
                }
                let mut parts = Vec::with_capacity(entries.len());
                for (key, value) in entries {
                    let child = self.ids.child(node, key);
                    parts.push(self.node(value, child, FieldContext::default())?);
                }
                Ok(container(node, parts, delegate))
            }
            Shape::Scalar(value) => leaf(node, value, delegate, context),
            Shape::Absent => leaf(node, &Absent, delegate, context),
        }
    }
}

fn container(node: NodeId, parts: Vec<Draft>, delegate: Option<Arc<dyn Actionable>>) -> Draft {
    Draft::Composed {
        node,
        parts,
        actions: delegate.unwrap_or_else(noop),
        original: None,
    }
}

fn leaf(
    node: NodeId,
    value: &dyn Scalar,
    delegate: Option<Arc<dyn Actionable>>,
    context: FieldContext,
) -> Result<Draft, BuildError> {
    if let Some(hook) = &context.hook {
        let any = value.as_any();
        // An absent value fits every hook.
        if any.type_id() != hook.arg_type && !any.is::<Absent>() {
            return Err(context.signature_error(value.scalar_type_name()));
        }
    }
    Ok(Draft::Leaf {
        node,
        value: value.to_shared(),
        actions: resolve(None, context.hook, delegate),
    })
}

/// Build the item tree of `input`, including its root.
///
/// The root must be a record, a list or a map. Its capability, if it is a
/// record, is kept on the returned item.
pub fn build_state_root(input: &dyn Stateful) -> Result<ComposedItem, BuildError> {
    let mut builder = Builder::new();
    let root = builder.ids.root();
    let draft = builder.node(input, root, FieldContext::default())?;
    let ids = builder.ids.freeze();
    match draft {
        Draft::Leaf { value, .. } => Err(BuildError::UnsupportedRoot {
            found: value.scalar_type_name(),
        }),
        Draft::Composed {
            node,
            parts,
            actions,
            original,
        } => {
            let item = finish_composed(&ids, node, parts, actions, original);
            debug!(id = %item.id(), items = item.parts().len(), "built state");
            Ok(item)
        }
    }
}

/// Build the top-level state items of `input`: the items of its fields or
/// elements, in order.
pub fn build_state_items(input: &dyn Stateful) -> Result<Vec<Arc<dyn Item>>, BuildError> {
    Ok(build_state_root(input)?.parts().to_vec())
}
