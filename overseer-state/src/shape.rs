//! How values present themselves to the graph builder.
//!
//! Every value that takes part in a snapshot implements [`Stateful`], which
//! reports its [`Shape`]: a record, a list, a map or a scalar. Containers and
//! pointers (`Option`, `Box`, `Arc`) forward to their contents.

use crate::{actionable::Actionable, build::ErasedRecord, Record};
use std::{
    any::{type_name, Any},
    collections::{BTreeMap, HashMap, VecDeque},
    fmt::{Debug, Display},
    hash::BuildHasher,
    sync::Arc,
};

/// A value that can be turned into state items.
pub trait Stateful: Send + Sync {
    fn shape(&self) -> Shape<'_>;

    /// A complete capability set supplied by the value itself. When present,
    /// it is wrapped by the node's capability and the record's own
    /// [`Capabilities`](crate::Capabilities) are not consulted.
    fn delegate(&self) -> Option<Arc<dyn Actionable>> {
        None
    }
}

pub enum Shape<'a> {
    Record(RecordRef<'a>),
    List(Vec<&'a dyn Stateful>),
    /// Entries with their keys rendered as identifier segments.
    Map(Vec<(String, &'a dyn Stateful)>),
    Scalar(&'a dyn Scalar),
    /// A wrapper around another value. The wrapper's delegate, if any, takes
    /// precedence over the wrapped value's.
    Indirect(&'a dyn Stateful),
    /// A missing optional value.
    Absent,
}

impl<'a> Shape<'a> {
    pub fn record<R: Record>(record: &'a R) -> Self {
        Shape::Record(RecordRef(record))
    }

    pub fn scalar<T: Scalar>(value: &'a T) -> Self {
        Shape::Scalar(value)
    }

    pub fn list<T: Stateful + 'a>(items: impl IntoIterator<Item = &'a T>) -> Self {
        Shape::List(items.into_iter().map(|x| x as &dyn Stateful).collect())
    }

    pub fn map<K: Display + 'a, V: Stateful + 'a>(
        entries: impl IntoIterator<Item = (&'a K, &'a V)>,
    ) -> Self {
        Shape::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), v as &dyn Stateful))
                .collect(),
        )
    }

    pub(crate) fn describe(&self) -> &'static str {
        match self {
            Shape::Record(_) => "record",
            Shape::List(_) => "list",
            Shape::Map(_) => "map",
            Shape::Scalar(value) => value.scalar_type_name(),
            Shape::Indirect(_) => "indirection",
            Shape::Absent => "absent value",
        }
    }
}

/// A record, as seen by the builder. Created with [`Shape::record`].
pub struct RecordRef<'a>(pub(crate) &'a dyn ErasedRecord);

/// A leaf value: compared by value and copied into its item.
pub trait Scalar: Any + Debug + Send + Sync {
    fn eq_scalar(&self, other: &dyn Scalar) -> bool;
    fn to_shared(&self) -> Arc<dyn Scalar>;
    fn as_any(&self) -> &dyn Any;
    fn scalar_type_name(&self) -> &'static str;
}

impl<T: Any + Debug + PartialEq + Clone + Send + Sync> Scalar for T {
    fn eq_scalar(&self, other: &dyn Scalar) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| self == other)
    }

    fn to_shared(&self) -> Arc<dyn Scalar> {
        Arc::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn scalar_type_name(&self) -> &'static str {
        type_name::<T>()
    }
}

/// The value of a leaf built from a `None`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Absent;

macro_rules! scalar_stateful {
    ($($t:ty),* $(,)?) => {
        $(
            impl Stateful for $t {
                fn shape(&self) -> Shape<'_> {
                    Shape::scalar(self)
                }
            }
        )*
    };
}

scalar_stateful!(
    bool,
    char,
    u8,
    u16,
    u32,
    u64,
    u128,
    usize,
    i8,
    i16,
    i32,
    i64,
    i128,
    isize,
    f32,
    f64,
    (),
    String,
    &'static str,
);

impl<T: Stateful> Stateful for Vec<T> {
    fn shape(&self) -> Shape<'_> {
        Shape::list(self)
    }
}

impl<T: Stateful, const N: usize> Stateful for [T; N] {
    fn shape(&self) -> Shape<'_> {
        Shape::list(self)
    }
}

impl<T: Stateful> Stateful for VecDeque<T> {
    fn shape(&self) -> Shape<'_> {
        Shape::list(self)
    }
}

impl<K, V, S> Stateful for HashMap<K, V, S>
where
    K: Display + Send + Sync,
    V: Stateful,
    S: BuildHasher + Send + Sync,
{
    fn shape(&self) -> Shape<'_> {
        Shape::map(self)
    }
}

impl<K: Display + Send + Sync, V: Stateful> Stateful for BTreeMap<K, V> {
    fn shape(&self) -> Shape<'_> {
        Shape::map(self)
    }
}

impl<T: Stateful> Stateful for Option<T> {
    fn shape(&self) -> Shape<'_> {
        match self {
            Some(value) => value.shape(),
            None => Shape::Absent,
        }
    }

    fn delegate(&self) -> Option<Arc<dyn Actionable>> {
        self.as_ref().and_then(|value| value.delegate())
    }
}

impl<T: Stateful + ?Sized> Stateful for Box<T> {
    fn shape(&self) -> Shape<'_> {
        (**self).shape()
    }

    fn delegate(&self) -> Option<Arc<dyn Actionable>> {
        (**self).delegate()
    }
}

impl<T: Stateful + ?Sized> Stateful for Arc<T> {
    fn shape(&self) -> Shape<'_> {
        (**self).shape()
    }

    fn delegate(&self) -> Option<Arc<dyn Actionable>> {
        (**self).delegate()
    }
}

/// JSON documents: objects are maps, arrays are lists, everything else is a
/// scalar.
impl Stateful for serde_json::Value {
    fn shape(&self) -> Shape<'_> {
        match self {
            serde_json::Value::Array(items) => Shape::list(items),
            serde_json::Value::Object(entries) => Shape::map(entries),
            scalar => Shape::scalar(scalar),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalars_compare_by_type_and_value() {
        let a: &dyn Scalar = &42u32;
        let b: &dyn Scalar = &42u32;
        let c: &dyn Scalar = &42u64;
        let d: &dyn Scalar = &String::from("42");
        assert!(a.eq_scalar(b));
        assert!(!a.eq_scalar(c));
        assert!(!a.eq_scalar(d));
        assert_eq!(c.scalar_type_name(), "u64");
    }

    #[test]
    fn shared_copy_is_equal() {
        let value = String::from("abc");
        let shared = value.to_shared();
        assert!(shared.eq_scalar(&value));
        assert_eq!(shared.as_any().downcast_ref::<String>(), Some(&value));
    }

    #[test]
    fn containers_forward() {
        let boxed: Box<dyn Stateful> = Box::new(vec![1, 2, 3]);
        assert!(matches!(boxed.shape(), Shape::List(items) if items.len() == 3));

        let shared = Arc::new(String::from("x"));
        assert!(matches!(shared.shape(), Shape::Scalar(_)));

        let none: Option<u8> = None;
        assert!(matches!(none.shape(), Shape::Absent));
    }

    #[test]
    fn json_shapes() {
        let doc = json!({"a": [1, "two"], "b": null});
        match doc.shape() {
            Shape::Map(entries) => {
                let keys: Vec<&str> = entries.iter().map(|(k, _)| k.as_str()).collect();
                assert_eq!(keys, vec!["a", "b"]);
                assert!(matches!(entries[0].1.shape(), Shape::List(items) if items.len() == 2));
                assert!(matches!(entries[1].1.shape(), Shape::Scalar(_)));
            }
            other => panic!("expected a map, got {}", other.describe()),
        }
    }

    #[test]
    fn map_keys_are_rendered() {
        let mut map = BTreeMap::new();
        map.insert(7u32, "seven");
        match map.shape() {
            Shape::Map(entries) => assert_eq!(entries[0].0, "7"),
            other => panic!("expected a map, got {}", other.describe()),
        }
    }
}
