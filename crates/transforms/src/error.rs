use thiserror::Error;

/// Errors raised while compiling or applying a transformation pipeline
///.
#[derive(Error, Debug)]
pub enum TransformError {
    #[error("unknown column: {0}")]
    UnknownColumn(String),

    #[error("duplicate column after transformation: {0}")]
    DuplicateColumn(String),

    #[error("cannot cast column {column} to {target}")]
    CastFailed { column: String, target: String },

    #[error("unrecognized cast target type: {0}")]
    UnknownCastTarget(String),

    #[error("split produced {produced} values but {expected} target columns were declared")]
    SplitArityMismatch { produced: usize, expected: usize },
}
