//! Application error types.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

/// Launcher error carrying a kind and a small key/value payload of context.
#[derive(Debug, Clone)]
pub struct AppError {
    payload: BTreeMap<String, String>,
    kind: ErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Instance name violates the identity charset
    InvalidName,
    /// An instance directory already exists at the target path
    AlreadyExists,
    /// Instance lookup miss
    NotFound,
    /// Another run is still creating the instance
    Busy,
    /// Release archive could not be downloaded
    DownloadFailed,
    /// Release archive could not be extracted by any method
    ExtractionFailed,
    /// No free port inside the scan window
    PortExhaustion,
    /// External tool exited unsuccessfully or could not be spawned
    CommandFailed,
    /// Only one half of a delete (deregistration / disk removal) succeeded
    PartialDeleteFailure,
    /// Operation cancelled at a step boundary
    Cancelled,
    /// Configuration error
    Config,
    /// File system error
    Io,
    /// General error
    Other,
}

impl ErrorKind {
    pub fn code(&self) -> u32 {
        match self {
            Self::InvalidName => 1001,
            Self::AlreadyExists => 1002,
            Self::NotFound => 1003,
            Self::Busy => 1004,
            Self::DownloadFailed => 2001,
            Self::ExtractionFailed => 2002,
            Self::PortExhaustion => 3001,
            Self::CommandFailed => 3002,
            Self::PartialDeleteFailure => 3003,
            Self::Cancelled => 3004,
            Self::Config => 4001,
            Self::Io => 4002,
            Self::Other => 9999,
        }
    }
}

impl AppError {
    pub fn new(kind: ErrorKind, payload: BTreeMap<String, String>) -> Self {
        Self { payload, kind }
    }

    /// Create an error with a single "detail" key from a non-empty string,
    /// or an empty payload if the string is empty.
    fn with_detail(kind: ErrorKind, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        let payload = if detail.is_empty() {
            BTreeMap::new()
        } else {
            BTreeMap::from([("detail".to_string(), detail)])
        };
        Self::new(kind, payload)
    }

    pub fn invalid_name(name: &str, reason: &str) -> Self {
        Self::new(
            ErrorKind::InvalidName,
            BTreeMap::from([
                ("name".to_string(), name.to_string()),
                ("detail".to_string(), reason.to_string()),
            ]),
        )
    }

    pub fn already_exists(name: &str) -> Self {
        Self::new(
            ErrorKind::AlreadyExists,
            BTreeMap::from([("instance".to_string(), name.to_string())]),
        )
    }

    pub fn not_found(name: &str) -> Self {
        Self::new(
            ErrorKind::NotFound,
            BTreeMap::from([("instance".to_string(), name.to_string())]),
        )
    }

    pub fn busy(name: &str) -> Self {
        Self::new(
            ErrorKind::Busy,
            BTreeMap::from([
                ("instance".to_string(), name.to_string()),
                ("detail".to_string(), "creation in progress".to_string()),
            ]),
        )
    }

    pub fn download_status(url: &str, status: u16) -> Self {
        Self::new(
            ErrorKind::DownloadFailed,
            BTreeMap::from([
                ("url".to_string(), url.to_string()),
                ("status".to_string(), status.to_string()),
            ]),
        )
    }

    pub fn download(url: &str, detail: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::DownloadFailed,
            BTreeMap::from([
                ("url".to_string(), url.to_string()),
                ("detail".to_string(), detail.into()),
            ]),
        )
    }

    pub fn extraction(primary: &Self, fallback: &Self) -> Self {
        Self::new(
            ErrorKind::ExtractionFailed,
            BTreeMap::from([
                ("zip".to_string(), primary.to_string()),
                ("tar_gz".to_string(), fallback.to_string()),
            ]),
        )
    }

    pub fn port_exhaustion(preferred: u16, attempts: u32) -> Self {
        Self::new(
            ErrorKind::PortExhaustion,
            BTreeMap::from([
                ("preferred".to_string(), preferred.to_string()),
                ("attempts".to_string(), attempts.to_string()),
            ]),
        )
    }

    pub fn command_failed(command: &str, exit_code: Option<i32>, stderr: &str) -> Self {
        let exit_code = exit_code.map_or_else(|| "signal".to_string(), |c| c.to_string());
        Self::new(
            ErrorKind::CommandFailed,
            BTreeMap::from([
                ("command".to_string(), command.to_string()),
                ("exit_code".to_string(), exit_code),
                ("stderr".to_string(), stderr.trim().to_string()),
            ]),
        )
    }

    pub fn command_spawn(command: &str, detail: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::CommandFailed,
            BTreeMap::from([
                ("command".to_string(), command.to_string()),
                ("detail".to_string(), detail.into()),
            ]),
        )
    }

    pub fn partial_delete(
        name: &str,
        deregister: Option<&Self>,
        disk: Option<&Self>,
    ) -> Self {
        let mut payload = BTreeMap::from([("instance".to_string(), name.to_string())]);
        if let Some(e) = deregister {
            payload.insert("deregister".to_string(), e.to_string());
        }
        if let Some(e) = disk {
            payload.insert("disk".to_string(), e.to_string());
        }
        Self::new(ErrorKind::PartialDeleteFailure, payload)
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, BTreeMap::new())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::with_detail(ErrorKind::Config, message)
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::with_detail(ErrorKind::Io, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::with_detail(ErrorKind::Other, message)
    }

    /// Attach the instance name, keeping the original kind.
    #[must_use]
    pub fn with_instance(mut self, name: &str) -> Self {
        self.payload
            .entry("instance".to_string())
            .or_insert_with(|| name.to_string());
        self
    }

    /// Attach an extra context entry, keeping the original kind.
    #[must_use]
    pub fn with_context(mut self, key: &str, value: impl Into<String>) -> Self {
        self.payload.insert(key.to_string(), value.into());
        self
    }

    /// Attach the pipeline step that failed, keeping the original kind.
    #[must_use]
    pub fn at_step(mut self, step: &str) -> Self {
        self.payload.insert("step".to_string(), step.to_string());
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.payload.get(key).map(String::as_str)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.payload.is_empty() {
            write!(f, "{:?}", self.kind)
        } else {
            let pairs: Vec<String> = self
                .payload
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            write!(f, "{:?}: {}", self.kind, pairs.join(", "))
        }
    }
}

impl std::error::Error for AppError {}

impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct as _;
        let mut s = serializer.serialize_struct("AppError", 2)?;
        s.serialize_field("code", &self.kind.code())?;
        s.serialize_field("payload", &self.payload)?;
        s.end()
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::config(err.to_string())
    }
}

impl From<toml::ser::Error> for AppError {
    fn from(err: toml::ser::Error) -> Self {
        Self::config(err.to_string())
    }
}

impl From<serde_yaml_ng::Error> for AppError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        Self::config(err.to_string())
    }
}

impl From<zip::result::ZipError> for AppError {
    fn from(err: zip::result::ZipError) -> Self {
        Self::io(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::config(err.to_string())
    }
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_keeps_kind_and_adds_keys() {
        let err = AppError::download_status("https://example.test/a.zip", 404)
            .with_instance("demo-site")
            .at_step("fetching");

        assert_eq!(err.kind(), ErrorKind::DownloadFailed);
        assert_eq!(err.get("status"), Some("404"));
        assert_eq!(err.get("instance"), Some("demo-site"));
        assert_eq!(err.get("step"), Some("fetching"));
    }

    #[test]
    fn display_is_sorted_by_key() {
        let err = AppError::command_failed("ddev start", Some(1), "boom\n");
        assert_eq!(
            err.to_string(),
            "CommandFailed: command=ddev start, exit_code=1, stderr=boom"
        );
    }

    #[test]
    fn serializes_code_and_payload() {
        let err = AppError::not_found("ghost");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], 1003);
        assert_eq!(json["payload"]["instance"], "ghost");
    }
}
