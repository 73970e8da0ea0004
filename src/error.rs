use thiserror::Error;

/// Integrity faults and collaborator failures. Per-record validation
/// rejections are not errors; they are tallied in `StageCounts`.
#[derive(Error, Debug)]
pub enum EtlError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("archive extraction failed for {path}: {detail}")]
    Extract { path: String, detail: String },

    #[error("input file has no column named '{0}'")]
    MissingColumn(String),

    #[error("code table {table}: description '{description}' already maps to {existing}, refusing {incoming}")]
    CodeConflict {
        table: String,
        description: String,
        existing: String,
        incoming: String,
    },

    #[error("code table {table}: no entry for description '{description}'")]
    CodeNotFound { table: String, description: String },

    #[error("code table {table}: description '{description}' maps to {count} values")]
    CodeAmbiguous {
        table: String,
        description: String,
        count: usize,
    },

    #[error("duplicate parcel id {0} in taxroll input")]
    DuplicateParcel(i64),
}

pub type Result<T> = std::result::Result<T, EtlError>;
