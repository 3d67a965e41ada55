#[derive(thiserror::Error, Debug, serde::Deserialize, serde::Serialize)]
pub enum Error {
    #[error("Source directory not found: {0}")]
    MissingSourceDir(String),

    #[error("No REDCap source files (.php, .txt, .md, .sh) under {0}")]
    NoSources(String),

    #[error("Not a generated interface description: {path} ({reason})")]
    UnreadableDocument { path: String, reason: String },
}
