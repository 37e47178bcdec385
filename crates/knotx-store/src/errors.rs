//! Store-side error helpers
//!
//! Backend failures surface as [`KnotXError::Persistence`] so the forest can
//! log and classify them like any other operation error.

use knotx_core::errors::KnotXError;

pub use knotx_core::errors::Result;

/// Create a migration error
pub fn migration_error(migration_id: &str, reason: &str) -> KnotXError {
    KnotXError::Persistence {
        message: format!("Migration {} failed: {}", migration_id, reason),
    }
}

/// An applied migration no longer matches its embedded SQL
pub fn checksum_mismatch(migration_id: &str, expected: &str, actual: &str) -> KnotXError {
    KnotXError::Persistence {
        message: format!(
            "Checksum mismatch for migration {}: recorded {}, embedded {}",
            migration_id, expected, actual
        ),
    }
}

pub fn from_rusqlite(err: rusqlite::Error) -> KnotXError {
    KnotXError::Persistence {
        message: format!("sqlite: {}", err),
    }
}

/// A stored JSON body failed to decode
pub fn corrupt_record(table: &str, id: &str, err: serde_json::Error) -> KnotXError {
    KnotXError::Persistence {
        message: format!("corrupt {} record {}: {}", table, id, err),
    }
}
