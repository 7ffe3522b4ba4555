//! Remote transfer client
//!
//! FTP operations against the transaction site. Every call opens a fresh
//! single-use session (connect, extended passive mode, login, binary type)
//! and closes it before returning; no connection state is shared between
//! operations or runs. The synchronous client runs on a blocking task off
//! the async runtime.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::io::{Cursor, Read};
use suppaftp::FtpStream;
use tracing::{debug, info, warn};

use crate::config::RemoteSiteConfig;
use crate::error::TransferError;

/// A downloaded remote file with its server-side modification time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    /// File contents; empty when the remote file does not exist
    pub data: Vec<u8>,

    /// Server-reported modification time; Unix epoch when the file does
    /// not exist
    pub modified: DateTime<Utc>,
}

impl RemoteFile {
    /// Sentinel for an absent remote file: empty payload, epoch timestamp
    pub fn missing() -> Self {
        Self {
            data: Vec::new(),
            modified: DateTime::<Utc>::UNIX_EPOCH,
        }
    }
}

/// Remote file-transfer operations used by the load pipeline
#[async_trait]
pub trait RemoteTransfer: Send + Sync {
    /// Download `file` from `dir`
    ///
    /// An absent remote file is not an error: the result carries an empty
    /// payload and an epoch modification time, which the freshness gate
    /// reads as "nothing to do".
    async fn download(&self, dir: &str, file: &str) -> Result<RemoteFile, TransferError>;

    /// Upload `data` as `file` into `dir`
    async fn upload(&self, dir: &str, file: &str, data: Vec<u8>) -> Result<(), TransferError>;
}

/// FTP-backed transfer client
#[derive(Debug, Clone)]
pub struct FtpTransfer {
    config: RemoteSiteConfig,
}

impl FtpTransfer {
    pub fn new(config: RemoteSiteConfig) -> Self {
        Self { config }
    }

    /// Open, configure and authenticate one session
    fn connect(config: &RemoteSiteConfig) -> Result<FtpStream, TransferError> {
        debug!("Connecting to FTP server: {}:{}", config.host, config.port);

        let mut ftp_stream = FtpStream::connect(format!("{}:{}", config.host, config.port))?;

        // Extended Passive Mode - better for NAT/firewall environments
        ftp_stream.set_mode(suppaftp::Mode::ExtendedPassive);

        ftp_stream.login(&config.username, &config.password)?;
        ftp_stream.transfer_type(suppaftp::types::FileType::Binary)?;

        Ok(ftp_stream)
    }

    fn download_sync(
        config: &RemoteSiteConfig,
        dir: &str,
        file: &str,
    ) -> Result<RemoteFile, TransferError> {
        let mut ftp_stream = Self::connect(config)?;

        let entries = ftp_stream.nlst(Some(dir))?;
        if !entries.iter().any(|entry| entry_matches(entry, file)) {
            info!("Remote file {} not found in {}", file, dir);
            if let Err(e) = ftp_stream.quit() {
                warn!("Failed to quit FTP session gracefully: {}", e);
            }
            return Ok(RemoteFile::missing());
        }

        let path = join_path(dir, file);
        let modified = ftp_stream.mdtm(&path)?;

        debug!("Downloading file: {}", path);
        let mut reader = ftp_stream.retr_as_buffer(&path)?;
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;

        if let Err(e) = ftp_stream.quit() {
            warn!("Failed to quit FTP session gracefully: {}", e);
        }

        info!("Downloaded {} ({} bytes)", path, data.len());
        Ok(RemoteFile {
            data,
            modified: Utc.from_utc_datetime(&modified),
        })
    }

    fn upload_sync(
        config: &RemoteSiteConfig,
        dir: &str,
        file: &str,
        data: &[u8],
    ) -> Result<(), TransferError> {
        let mut ftp_stream = Self::connect(config)?;

        ftp_stream.cwd(dir)?;
        ftp_stream.put_file(file, &mut Cursor::new(data))?;

        if let Err(e) = ftp_stream.quit() {
            warn!("Failed to quit FTP session gracefully: {}", e);
        }

        info!("Uploaded {} ({} bytes) to {}", file, data.len(), dir);
        Ok(())
    }
}

#[async_trait]
impl RemoteTransfer for FtpTransfer {
    async fn download(&self, dir: &str, file: &str) -> Result<RemoteFile, TransferError> {
        let config = self.config.clone();
        let dir = dir.to_string();
        let file = file.to_string();

        tokio::task::spawn_blocking(move || Self::download_sync(&config, &dir, &file)).await?
    }

    async fn upload(&self, dir: &str, file: &str, data: Vec<u8>) -> Result<(), TransferError> {
        let config = self.config.clone();
        let dir = dir.to_string();
        let file = file.to_string();

        tokio::task::spawn_blocking(move || Self::upload_sync(&config, &dir, &file, &data)).await?
    }
}

/// Match an NLST entry against a bare file name
///
/// Servers differ in whether NLST returns bare names or full paths; compare
/// the last path segment.
fn entry_matches(entry: &str, file: &str) -> bool {
    entry.rsplit('/').next() == Some(file)
}

fn join_path(dir: &str, file: &str) -> String {
    if dir.is_empty() {
        file.to_string()
    } else {
        format!("{}/{}", dir.trim_end_matches('/'), file)
    }
}
