//! Image Normalizer.
//!
//! Rewrites qualifying images in place at a target width and quality. A file
//! that fails to decode is treated as corrupt: it is deleted and its dedup
//! record purged so a corrected copy can flow through again.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use uposs_core::{is_image_path, DedupStore, Error, LogSink, Result};

/// Parsed and validated image settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageSettings {
    pub quality: u8,
    pub width: u32,
}

impl ImageSettings {
    /// Parse operator-entered values. Quality must lie in 0..=100 and width
    /// must be a positive integer.
    pub fn parse(quality: &str, width: &str) -> Result<Self> {
        let quality = match quality.trim().parse::<i64>() {
            Ok(q) if (0..=100).contains(&q) => q as u8,
            _ => {
                return Err(Error::Config(format!(
                    "image quality must be 0-100, got {quality:?}"
                )))
            }
        };
        let width = match width.trim().parse::<u32>() {
            Ok(w) if w > 0 => w,
            _ => {
                return Err(Error::Config(format!(
                    "image width must be a positive integer, got {width:?}"
                )))
            }
        };
        Ok(Self { quality, width })
    }
}

/// Counters for one normalize call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizeReport {
    pub processed: usize,
    pub skipped_small: usize,
    pub purged: usize,
    pub failed: usize,
    /// Messages for failures that could not be fully cleaned up.
    pub errors: Vec<String>,
}

enum Failure {
    Decode(String),
    Encode(String),
}

pub struct ImageNormalizer {
    store: Arc<dyn DedupStore>,
    sink: Arc<dyn LogSink>,
}

impl ImageNormalizer {
    pub fn new(store: Arc<dyn DedupStore>, sink: Arc<dyn LogSink>) -> Self {
        Self { store, sink }
    }

    /// Normalize every image under `folder` of at least `min_size_kb` KB.
    ///
    /// Bad settings abort before any file is touched. A missing folder is
    /// an empty folder.
    pub async fn normalize_tree(
        &self,
        folder: &Path,
        quality: &str,
        width: &str,
        min_size_kb: u64,
    ) -> Result<NormalizeReport> {
        let settings = ImageSettings::parse(quality, width)?;
        let mut report = NormalizeReport::default();
        if !folder.is_dir() {
            debug!(folder = %folder.display(), "Staging folder absent, nothing to normalize");
            return Ok(report);
        }

        let start = Instant::now();
        let min_bytes = min_size_kb.saturating_mul(1024);
        let root = folder.to_path_buf();
        let files = tokio::task::spawn_blocking(move || image_files(&root))
            .await
            .map_err(|e| Error::Internal(format!("image scan panicked: {e}")))?;

        for path in files {
            let size = match tokio::fs::metadata(&path).await {
                Ok(m) => m.len(),
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "Cannot stat image, skipping");
                    report.failed += 1;
                    continue;
                }
            };
            if size < min_bytes {
                report.skipped_small += 1;
                continue;
            }
            self.normalize_file(&path, settings, &mut report).await;
        }

        info!(
            subsystem = "jobs",
            component = "normalize",
            op = "normalize_tree",
            processed = report.processed,
            purged = report.purged,
            failed = report.failed,
            duration_ms = start.elapsed().as_millis() as u64,
            "Normalize complete"
        );
        Ok(report)
    }

    async fn normalize_file(&self, path: &Path, settings: ImageSettings, report: &mut NormalizeReport) {
        let bytes = match tokio::fs::read(path).await {
            Ok(b) => b,
            Err(e) => {
                self.sink
                    .error(&format!("Cannot read {}: {e}", path.display()));
                report.failed += 1;
                return;
            }
        };

        let format = output_format(path);
        let encoded =
            tokio::task::spawn_blocking(move || reencode(&bytes, format, settings)).await;

        match encoded {
            Ok(Ok(out)) => match write_replacing(path, &out).await {
                Ok(()) => {
                    report.processed += 1;
                    debug!(file = %path.display(), bytes = out.len(), "Image normalized");
                }
                Err(e) => {
                    self.sink
                        .error(&format!("Cannot write {}: {e}", path.display()));
                    report.failed += 1;
                }
            },
            Ok(Err(Failure::Decode(reason))) => {
                self.purge(path, reason, report).await;
            }
            Ok(Err(Failure::Encode(reason))) => {
                self.sink
                    .error(&format!("Cannot encode {}: {reason}", path.display()));
                report.failed += 1;
            }
            Err(e) => {
                self.sink
                    .error(&format!("Image task for {} panicked: {e}", path.display()));
                report.failed += 1;
            }
        }
    }

    /// Delete a corrupt file and its dedup record.
    async fn purge(&self, path: &Path, reason: String, report: &mut NormalizeReport) {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let decode_error = Error::Image(format!("{file_name}: {reason}"));

        let file_result = tokio::fs::remove_file(path).await.map_err(Error::from);
        let record_result = self.store.remove(&file_name).await;

        let combined = match (file_result, record_result) {
            (Ok(()), Ok(_)) => None,
            (Err(e), Ok(_)) | (Ok(()), Err(e)) => Some(Error::compound(decode_error, e)),
            (Err(file_err), Err(record_err)) => Some(Error::compound(
                decode_error,
                Error::compound(file_err, record_err),
            )),
        };

        report.purged += 1;
        match combined {
            None => self
                .sink
                .warn(&format!("Deleted undecodable image {file_name}: {reason}")),
            Some(err) => {
                self.sink.error(&err.to_string());
                report.errors.push(err.to_string());
            }
        }
    }
}

fn output_format(path: &Path) -> ImageFormat {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => ImageFormat::Png,
        Some("gif") => ImageFormat::Gif,
        _ => ImageFormat::Jpeg,
    }
}

fn reencode(bytes: &[u8], format: ImageFormat, settings: ImageSettings) -> std::result::Result<Vec<u8>, Failure> {
    let img = image::load_from_memory(bytes).map_err(|e| Failure::Decode(e.to_string()))?;
    let (w, h) = (img.width().max(1), img.height());
    let target_h = ((h as u64 * settings.width as u64) / w as u64).max(1) as u32;
    let resized = img.resize_exact(settings.width, target_h, FilterType::Lanczos3);

    let mut out = Vec::new();
    let written = match format {
        ImageFormat::Jpeg => {
            let encoder = JpegEncoder::new_with_quality(&mut out, settings.quality.max(1));
            DynamicImage::ImageRgb8(resized.to_rgb8()).write_with_encoder(encoder)
        }
        ImageFormat::Gif => {
            DynamicImage::ImageRgba8(resized.to_rgba8()).write_to(&mut Cursor::new(&mut out), format)
        }
        other => resized.write_to(&mut Cursor::new(&mut out), other),
    };
    written.map_err(|e| Failure::Encode(e.to_string()))?;
    Ok(out)
}

/// Replace `path` with `bytes` through a sibling temp file.
async fn write_replacing(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    tokio::fs::write(&tmp, bytes).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

fn image_files(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_image_path(e.path()))
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}
