//! The built-in task kinds.

mod copy;
mod create_folder;
mod delete;
mod move_task;
mod trash;

use anchorfs_core::{FsError, FsResult, InternalPath};

pub use copy::{CopyHandler, CopyTask};
pub use create_folder::{CreateFolderHandler, CreateFolderTask};
pub use delete::{DeleteHandler, DeleteTask};
pub use move_task::{MoveHandler, MoveTask};
pub use trash::{EmptyTrashHandler, EmptyTrashTask, TrashHandler, TrashTask};

/// Refuse to place a directory inside itself.
pub(crate) fn ensure_not_nested(source: &InternalPath, destination: &InternalPath) -> FsResult<()> {
    if destination != source && destination.starts_with(source) {
        return Err(FsError::bad_request(
            destination,
            "cannot place a directory inside itself",
        ));
    }
    Ok(())
}
