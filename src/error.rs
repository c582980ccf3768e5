use crate::boxes::FourCC;

/// Fatal errors. Any of these aborts the run before output is produced.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("not an AVIF file: {0}")]
    NotAvif(&'static str),
    #[error("box '{typ}' at offset {start} has invalid size {size}")]
    InvalidSize { typ: FourCC, start: u64, size: u64 },
    #[error("box '{typ}' at offset {start} ends at {end}, past the end of its parent ({parent_end})")]
    Overrun {
        typ: FourCC,
        start: u64,
        end: u64,
        parent_end: u64,
    },
    #[error("box '{0}' ended prematurely")]
    Truncated(FourCC),
    #[error("'{0}' box is currently unsupported")]
    UnsupportedBox(FourCC),
    #[error("expected {expected} boxes in '{typ}' but read {actual}")]
    ChildCount {
        typ: FourCC,
        expected: u32,
        actual: usize,
    },
    #[error("box nesting deeper than {0} levels")]
    TooDeep(usize),
    #[error("invalid data: {0}")]
    InvalidData(&'static str),
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("bitstream: {0}")]
    Bitstream(String),
    #[error("required box '{0}' not found")]
    MissingBox(&'static str),
    #[error("property index {index} out of range (ipco holds {count} properties)")]
    PropertyIndexOutOfRange { index: u16, count: usize },
    #[error("file offset {0} does not point into any 'mdat'")]
    OffsetOutsidePayload(u64),
    #[error("offsets of a single item span multiple 'mdat' boxes")]
    OffsetSpansPayloads,
    #[error("moved offset {value} does not fit in {width} bytes")]
    OffsetOverflow { value: i128, width: u8 },
    #[error("no fix available for issue: {0}")]
    NoFix(String),
}

impl Error {
    pub(crate) fn unsupported(msg: impl Into<String>) -> Self {
        Error::Unsupported(msg.into())
    }
}

impl From<bitreader::BitReaderError> for Error {
    fn from(err: bitreader::BitReaderError) -> Self {
        Error::Bitstream(err.to_string())
    }
}

impl From<leb128::read::Error> for Error {
    fn from(err: leb128::read::Error) -> Self {
        match err {
            leb128::read::Error::IoError(e) => Error::Bitstream(format!("leb128: {e}")),
            leb128::read::Error::Overflow => Error::Bitstream("leb128 value overflows u64".into()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
