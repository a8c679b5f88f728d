#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TimestampError {
    #[error("Overflow in adding/subtracting a Duration")]
    Overflow,
}

pub type TimestampResult<T> = Result<T, TimestampError>;
