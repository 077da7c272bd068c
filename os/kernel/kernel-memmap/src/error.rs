/// A malformed `memmap=` entry.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MemmapError {
    #[error("expected a number")]
    MissingNumber,
    #[error("number does not fit 64 bits")]
    Overflow,
    #[error("unsupported memmap operator '{0}'")]
    UnknownOperator(char),
    #[error("unexpected '{0}' after the start address")]
    TrailingCharacters(char),
}
