use derive_more::From;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, From)]
pub enum Error {
    CliUsage(String),

    UnknownTool(String),

    ToolStatus { tool: String, code: Option<i32> },

    MalformedRecord(String),

    #[from]
    File(std::io::Error),

    #[from]
    Reqwest(reqwest::Error),

    #[from]
    Sqlite(rusqlite::Error),

    #[from]
    Json(serde_json::Error),

    #[from]
    Base64(base64::DecodeError),

    #[from]
    TimeFormat(time::error::Format),

    #[from]
    TimeParse(time::error::Parse),

    #[from]
    Tracing(tracing::subscriber::SetGlobalDefaultError),
}

// region:    --- Error Boilerplate

impl core::fmt::Display for Error {
    fn fmt(&self, fmt: &mut core::fmt::Formatter) -> core::result::Result<(), core::fmt::Error> {
        write!(fmt, "{self:?}")
    }
}

impl std::error::Error for Error {}

// endregion: --- Error Boilerplate
