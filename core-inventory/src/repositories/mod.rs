//! # Repository Pattern Implementation
//!
//! Store traits and their SQLite implementations.
//!
//! ## Architecture
//!
//! - Traits define the interface the sync engine depends on
//! - SQLite implementations use sqlx for async database access
//! - Every batch operation runs in a single transaction
//! - Listings are paged via the `Page<T>` wrapper
//!
//! ## Available Repositories
//!
//! - `ResourceStore` - EIP, CVM, disk and network interface records
//! - `RelationStore` - EIP↔CVM, Disk↔CVM and NetworkInterface↔CVM edges

use sqlx::{QueryBuilder, Sqlite};

pub mod pagination;
pub mod relation;
pub mod resource;

pub use pagination::{Page, PageRequest, MAX_PAGE_SIZE};
pub use relation::{delete_in_chunks, RelationStore, SqliteRelationStore};
pub use resource::{ResourceStore, SqliteResourceStore};

/// Bound parameters per `IN (...)` list.
pub(crate) const SQL_CHUNK: usize = 500;

/// Append ` AND <column> IN (?, ?, ...)`. `values` must not be empty.
pub(crate) fn push_in_str<'a>(
    qb: &mut QueryBuilder<'a, Sqlite>,
    column: &str,
    values: &'a [String],
) {
    qb.push(" AND ").push(column).push(" IN (");
    let mut separated = qb.separated(", ");
    for value in values {
        separated.push_bind(value.as_str());
    }
    separated.push_unseparated(")");
}

pub(crate) fn push_in_i64<'a>(qb: &mut QueryBuilder<'a, Sqlite>, column: &str, values: &'a [i64]) {
    qb.push(" AND ").push(column).push(" IN (");
    let mut separated = qb.separated(", ");
    for value in values {
        separated.push_bind(*value);
    }
    separated.push_unseparated(")");
}
