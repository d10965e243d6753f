//! Repository functions — one function per database operation.
//!
//! Every function takes a `&DbPool` and returns a `Result<T, DbError>`.
//! No business logic and no domain types, just SQL. Queries are checked at
//! runtime so the workspace builds without a live database.

pub mod workflows;
pub mod runs;
