use crate::connection::Connection;
use crate::error::DataError;
use crate::session::Cursor;

/// Options of a mutating operation (`insert`, `save`, `delete`).
///
/// Consumed by the operation itself; nothing here reaches the statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    /// Commit the session after the statement succeeds.
    pub commit: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self { commit: true }
    }
}

impl WriteOptions {
    /// Leave the change in the open transaction; the caller commits or rolls back.
    pub fn no_commit() -> Self {
        Self { commit: false }
    }
}

impl From<bool> for WriteOptions {
    fn from(commit: bool) -> Self {
        Self { commit }
    }
}

/// Final step of a successful mutating operation.
///
/// Only reached after the statement succeeded; an error earlier in the
/// operation returns before this and leaves the transaction uncommitted.
pub(crate) async fn finish<C: Connection>(
    cursor: &mut Cursor<'_, C>,
    opts: WriteOptions,
) -> Result<(), DataError> {
    if opts.commit {
        cursor.commit().await?;
    }
    Ok(())
}
