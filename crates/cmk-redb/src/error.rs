//! Redb Error

use std::num::ParseIntError;

use thiserror::Error;

/// Redb Database Error
#[derive(Debug, Error)]
pub enum Error {
    /// Redb Error
    #[error(transparent)]
    Redb(#[from] redb::Error),
    /// Redb Database Error
    #[error(transparent)]
    Database(#[from] redb::DatabaseError),
    /// Redb Transaction Error
    #[error(transparent)]
    Transaction(#[from] redb::TransactionError),
    /// Redb Commit Error
    #[error(transparent)]
    Commit(#[from] redb::CommitError),
    /// Redb Table Error
    #[error(transparent)]
    Table(#[from] redb::TableError),
    /// Redb Storage Error
    #[error(transparent)]
    Storage(#[from] redb::StorageError),
    /// Serde Json Error
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
    /// Parse int Error
    #[error(transparent)]
    ParseInt(#[from] ParseIntError),
    /// NUT00 Error
    #[error(transparent)]
    CMKNUT00(#[from] cmk_common::nuts::nut00::Error),
    /// NUT01 Error
    #[error(transparent)]
    CMKNUT01(#[from] cmk_common::nuts::nut01::Error),
    /// NUT02 Error
    #[error(transparent)]
    CMKNUT02(#[from] cmk_common::nuts::nut02::Error),
    /// Unknown Database Version
    #[error("Unknown Database Version")]
    UnknownDatabaseVersion,
}

impl From<Error> for cmk_common::database::Error {
    fn from(e: Error) -> Self {
        Self::Database(Box::new(e))
    }
}
