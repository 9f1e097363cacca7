/// Keyset pagination cursor for `iter_files`. Offset-based paging is
/// deliberately avoided: a page is described by the last key seen, not a
/// row count to skip, so inserts/deletes elsewhere in the table never shift
/// a reader's position.
#[derive(Clone, Debug, Default)]
pub struct Page {
    pub after_relative_path: Option<String>,
    pub limit: i64,
}

impl Page {
    pub fn first(limit: i64) -> Self {
        Self { after_relative_path: None, limit: limit.max(1) }
    }

    pub fn after(relative_path: impl Into<String>, limit: i64) -> Self {
        Self { after_relative_path: Some(relative_path.into()), limit: limit.max(1) }
    }
}
