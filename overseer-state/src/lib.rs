//! Reconciliation of typed state.
//!
//! A snapshot of the desired state is an ordinary value: records, lists,
//! maps and scalars. [`build_state_items`] turns it into a tree of
//! [`Item`]s with stable hierarchical [`Identifier`]s, [`infer_actions`]
//! compares two such trees and produces a [`Plan`], and running the plan
//! invokes the create, update and remove capabilities that the values
//! declared for themselves.

pub mod actionable;
pub mod build;
pub mod cancel;
pub mod error;
pub mod id;
pub mod item;
pub mod plan;
pub mod shape;

pub use actionable::{is_noop, noop, Actionable, Capabilities, Create, Hooks, Remove, Update};
pub use build::{build_state_items, build_state_root, Fields, Record};
pub use cancel::{CancelToken, Interrupted};
pub use error::BuildError;
pub use id::Identifier;
pub use item::{ComposedItem, Item, LeafItem, Set, StringItem};
pub use plan::{infer_actions, Action, Plan, Step, StepKind};
pub use shape::{Absent, Scalar, Shape, Stateful};
