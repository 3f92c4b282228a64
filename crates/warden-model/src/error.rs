use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid unit name {0:?} (expected <name>.service)")]
    InvalidName(String),
    #[error("line {line}: assignment outside of any section")]
    OutsideSection { line: u32 },
    #[error("line {line}: malformed line {text:?}")]
    Malformed { line: u32, text: String },
    #[error("section [{0}] appears more than once")]
    DuplicateSection(String),
    #[error("missing [Service] section")]
    MissingService,
    #[error("missing ExecStart=")]
    MissingExecStart,
    #[error("line {line}: ExecStart= given more than once for Type={kind}")]
    DuplicateExecStart { line: u32, kind: &'static str },
    #[error("line {line}: {key}= expects an absolute path, got {value:?}")]
    RelativePath { line: u32, key: String, value: String },
    #[error("line {line}: {key}= has an unsupported value {value:?}")]
    UnknownValue { line: u32, key: String, value: String },
    #[error("line {line}: {key}= expects a boolean, got {value:?}")]
    InvalidBool { line: u32, key: String, value: String },
    #[error("line {line}: {key}= expects a time span, got {value:?}")]
    InvalidTimespan { line: u32, key: String, value: String },
    #[error("line {line}: {key}= expects a number, got {value:?}")]
    InvalidNumber { line: u32, key: String, value: String },
    #[error("line {line}: invalid environment assignment {value:?}")]
    InvalidEnvironment { line: u32, value: String },
    #[error("line {line}: unbalanced quoting in {value:?}")]
    Quoting { line: u32, value: String },
    #[error("line {line}: {key}= is empty")]
    EmptyCommand { line: u32, key: String },
    #[error("io error reading {path}: {reason}")]
    Io { path: String, reason: String },
}
