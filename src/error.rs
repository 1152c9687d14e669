use thiserror::Error;

/// Typed rejections returned synchronously by the GATT object tree.
///
/// The bridge translates each variant into an ATT response code.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GattError {
    #[error("operation not supported: {0}")]
    NotSupported(&'static str),

    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("invalid value length: expected {expected}, got {actual}")]
    InvalidValueLength { expected: usize, actual: usize },

    #[error("invalid offset {offset} for value of length {len}")]
    InvalidOffset { offset: usize, len: usize },

    #[error("no report with id {0}")]
    UnknownReport(u8),

    #[error("no such object: {0}")]
    UnknownObject(String),
}

pub type GattResult<T> = Result<T, GattError>;
