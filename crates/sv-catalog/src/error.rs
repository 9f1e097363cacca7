use sv_core::Error;

/// Converts a `sqlx` failure into the core error contract.
/// Constraint violations map to `AlreadyExists`/`InvalidInput` where the SQL
/// state makes the cause unambiguous; anything else is `Internal`, since a
/// lower-level storage failure tells a caller nothing actionable beyond
/// "retry or give up".
pub fn from_sqlx(err: sqlx::Error) -> Error {
    match &err {
        sqlx::Error::RowNotFound => Error::NotFound("no matching catalog row".into()),
        sqlx::Error::Database(db_err) => {
            let message = db_err.message().to_string();
            match db_err.kind() {
                sqlx::error::ErrorKind::UniqueViolation => Error::AlreadyExists(message),
                sqlx::error::ErrorKind::ForeignKeyViolation | sqlx::error::ErrorKind::CheckViolation => {
                    Error::InvalidInput(message)
                }
                _ => Error::Internal(message),
            }
        }
        other => Error::Internal(other.to_string()),
    }
}
