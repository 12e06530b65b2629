//! Deployment (remote session) types.

use serde::{Deserialize, Serialize};

use crate::prefixed_hash;

/// Execution environment of a deployment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvType {
    /// Native host-direct execution.
    #[default]
    Hd,
    /// Sandboxed wasm execution.
    Wasm,
}

/// Image a deployment is created from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentImage {
    /// Digest of the image, including its algorithm prefix (`SHA1:...`).
    pub hash: String,
    /// URL the peer fetches the image from.
    pub url: String,
}

impl DeploymentImage {
    /// Build an image reference from a bare SHA-1 hex digest.
    pub fn sha1(hash: &str, url: impl Into<String>) -> Self {
        Self {
            hash: prefixed_hash(hash),
            url: url.into(),
        }
    }
}

/// Specification used to create a deployment on a peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentSpec {
    pub env_type: EnvType,
    pub image: DeploymentImage,
    /// Deployment tag.
    pub name: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl DeploymentSpec {
    pub fn new(image: DeploymentImage, name: impl Into<String>) -> Self {
        Self {
            env_type: EnvType::Hd,
            image,
            name: name.into(),
            args: Vec::new(),
        }
    }
}

/// How a downloaded file is materialised inside the deployment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FileFormat {
    /// Stored as-is.
    #[default]
    Binary,
    /// Unpacked tar archive.
    Tar,
    /// Unpacked gzip-compressed tar archive.
    TarGz,
}

/// A single command sent to a deployment.
///
/// The hub answers an update with one captured output string per command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Command {
    /// Fetch `uri` into `file_path` inside the deployment.
    #[serde(rename_all = "camelCase")]
    DownloadFile {
        uri: String,
        file_path: String,
        format: FileFormat,
    },
    /// Run an executable inside the deployment.
    Exec { executable: String, args: Vec<String> },
    /// PUT the deployment-local file at `file_path` to `uri`.
    #[serde(rename_all = "camelCase")]
    UploadFile { uri: String, file_path: String },
}

impl Command {
    pub fn download(uri: impl Into<String>, file_path: impl Into<String>, format: FileFormat) -> Self {
        Command::DownloadFile {
            uri: uri.into(),
            file_path: file_path.into(),
            format,
        }
    }

    pub fn exec(executable: impl Into<String>, args: Vec<String>) -> Self {
        Command::Exec {
            executable: executable.into(),
            args,
        }
    }

    pub fn upload(uri: impl Into<String>, file_path: impl Into<String>) -> Self {
        Command::UploadFile {
            uri: uri.into(),
            file_path: file_path.into(),
        }
    }

    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Command::DownloadFile { .. } => "downloadFile",
            Command::Exec { .. } => "exec",
            Command::UploadFile { .. } => "uploadFile",
        }
    }

    pub fn is_upload(&self) -> bool {
        matches!(self, Command::UploadFile { .. })
    }
}
