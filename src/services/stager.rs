use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

#[derive(Error, Debug)]
pub enum StageError {
    #[error("Only image files are allowed (got {0})")]
    UnsupportedMediaType(String),

    #[error("Image exceeds the maximum upload size of {max_bytes} bytes")]
    PayloadTooLarge { max_bytes: u64 },

    #[error("Failed to stage upload: {0}")]
    Io(#[from] std::io::Error),
}

/// One staged upload on disk.
#[derive(Debug, Clone)]
pub struct UploadedAsset {
    pub filename: String,
    pub path: PathBuf,
    pub content_type: String,
    pub size: u64,
}

/// Writes incoming uploads into the staging directory.
///
/// The directory is created lazily on first use and never torn down; staged
/// files are kept after analysis (deliberate retention policy, so the
/// directory grows until an operator prunes it).
pub struct Stager {
    root: PathBuf,
    max_bytes: u64,
    // Distinguishes files staged within the same millisecond.
    sequence: AtomicU64,
}

impl Stager {
    pub fn new(root: impl Into<PathBuf>, max_bytes: u64) -> Self {
        Self {
            root: root.into(),
            max_bytes,
            sequence: AtomicU64::new(0),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Stream one upload to disk.
    ///
    /// The declared content type must be `image/*`; the stream is written to
    /// a `.part` file and only renamed into place once it completes under the
    /// size ceiling, so an oversize upload never remains as a readable file.
    pub async fn stage<R>(
        &self,
        mut reader: R,
        declared_mime: &str,
        original_filename: &str,
    ) -> Result<UploadedAsset, StageError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let content_type = declared_mime
            .parse::<mime::Mime>()
            .map_err(|_| StageError::UnsupportedMediaType(declared_mime.to_string()))?;
        if content_type.type_() != mime::IMAGE {
            return Err(StageError::UnsupportedMediaType(declared_mime.to_string()));
        }

        fs::create_dir_all(&self.root).await?;

        let filename = self.generate_filename(original_filename);
        let final_path = self.root.join(&filename);
        let part_path = self.root.join(format!("{filename}.part"));

        let mut file = fs::File::create(&part_path).await?;
        let mut size: u64 = 0;
        let mut buffer = vec![0u8; 64 * 1024];

        loop {
            let n = match reader.read(&mut buffer).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    drop(file);
                    let _ = fs::remove_file(&part_path).await;
                    return Err(e.into());
                }
            };

            size += n as u64;
            if size > self.max_bytes {
                drop(file);
                let _ = fs::remove_file(&part_path).await;
                return Err(StageError::PayloadTooLarge {
                    max_bytes: self.max_bytes,
                });
            }

            if let Err(e) = file.write_all(&buffer[..n]).await {
                drop(file);
                let _ = fs::remove_file(&part_path).await;
                return Err(e.into());
            }
        }

        file.flush().await?;
        drop(file);
        fs::rename(&part_path, &final_path).await?;

        let path = match fs::canonicalize(&final_path).await {
            Ok(p) => p,
            Err(_) => final_path,
        };

        Ok(UploadedAsset {
            filename,
            path,
            content_type: declared_mime.to_string(),
            size,
        })
    }

    /// Millisecond timestamp + process-lifetime counter + original extension.
    /// Unique across concurrent requests without any locking.
    fn generate_filename(&self, original: &str) -> String {
        let millis = Utc::now().timestamp_millis();
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        match Path::new(original).extension().and_then(|e| e.to_str()) {
            Some(ext) => format!("{millis}-{seq}.{ext}"),
            None => format!("{millis}-{seq}"),
        }
    }
}
