use thiserror::Error;

/// Reasons a value cannot be turned into state items.
///
/// These are all mistakes in how a type describes itself, so they are
/// reported before any action runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("unsupported root value: expected a record, list or map, found {found}")]
    UnsupportedRoot { found: &'static str },

    #[error("field {field} of {record} refers to unknown hook {hook}")]
    UnknownHook {
        record: &'static str,
        field: String,
        hook: String,
    },

    #[error(
        "hook {hook} on field {field} expects a previous value of type {expected}, but the field holds {found}"
    )]
    HookSignature {
        field: String,
        hook: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("{record} declares more than one identity")]
    DuplicateIdentity { record: &'static str },
}
