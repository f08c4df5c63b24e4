//! Request payloads accepted by the task handlers.

use anchorfs_core::{InternalPath, WriteConflictPolicy};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::TaskError;

/// One source and where it should end up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferItem {
    pub source: InternalPath,
    pub destination: InternalPath,
}

/// Copy every item's source to its destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CopyRequest {
    pub items: Vec<TransferItem>,
    #[serde(default)]
    pub policy: WriteConflictPolicy,
}

/// Move every item's source to its destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MoveRequest {
    pub items: Vec<TransferItem>,
    #[serde(default)]
    pub policy: WriteConflictPolicy,
}

/// Permanently delete the paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeleteRequest {
    pub paths: Vec<InternalPath>,
}

/// Move the paths into the trash directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrashRequest {
    pub paths: Vec<InternalPath>,
}

/// Remove everything inside the trash directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmptyTrashRequest {}

/// Create each path and its missing ancestors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateFolderRequest {
    pub paths: Vec<InternalPath>,
    #[serde(default)]
    pub policy: WriteConflictPolicy,
}

/// Decode a raw request into `T`.
pub(crate) fn decode<T: DeserializeOwned>(raw: &serde_json::Value) -> Result<T, TaskError> {
    Ok(T::deserialize(raw)?)
}
