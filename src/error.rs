use thiserror::Error;

#[derive(Error, Debug)]
pub enum TsError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid sync byte: 0x{0:02x}")]
    InvalidSyncByte(u8),

    #[error("invalid packet size: {0} bytes")]
    InvalidPacketSize(usize),

    #[error("invalid adaptation field: {0}")]
    InvalidAdaptationField(String),

    #[error("adaptation field overflow: {required} bytes required, {available} available")]
    AdaptationFieldOverflow { required: usize, available: usize },

    #[error("serialized packet is {0} bytes instead of 188")]
    FrameSizeInvariantViolation(usize),

    #[error("invalid PCR: base {base}, extension {extension}")]
    InvalidPcr { base: u64, extension: u16 },

    #[error("incomplete section: {0}")]
    IncompleteSection(String),

    #[error("invalid section: {0}")]
    InvalidSection(String),

    #[error("source does not support reset")]
    NotResettable,

    #[error("source is closed")]
    SourceClosed,

    #[error("at least one source is required")]
    NoSources,

    #[error("loop count must be greater than zero")]
    InvalidLoopCount,

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, TsError>;
