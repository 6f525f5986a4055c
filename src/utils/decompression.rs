use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::errors::AppResult;

/// Supported compression formats detected by magic bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionFormat {
    Gzip,
    Uncompressed,
}

/// Magic byte detection and in-place decompression of downloaded guides
pub struct DecompressionService;

impl DecompressionService {
    /// Detect compression format using magic bytes
    pub fn detect_compression_format(data: &[u8]) -> CompressionFormat {
        match infer::get(data) {
            Some(kind) if kind.mime_type() == "application/gzip" => CompressionFormat::Gzip,
            _ => CompressionFormat::Uncompressed,
        }
    }

    /// Sniff the first bytes of a file
    pub fn detect_file_format(path: &Path) -> AppResult<CompressionFormat> {
        let mut header = [0u8; 16];
        let mut file = File::open(path)?;
        let mut read = 0;
        while read < header.len() {
            let n = file.read(&mut header[read..])?;
            if n == 0 {
                break;
            }
            read += n;
        }
        Ok(Self::detect_compression_format(&header[..read]))
    }

    /// Replace a gzip file with its decompressed contents.
    ///
    /// Returns the detected format. Uncompressed files are left untouched.
    /// Decompression is streamed through a sibling temp file which is then
    /// renamed over the original, so the file is never half written.
    pub fn decompress_file_in_place(path: &Path) -> AppResult<CompressionFormat> {
        let format = Self::detect_file_format(path)?;
        if format == CompressionFormat::Uncompressed {
            return Ok(format);
        }

        info!("Downloaded file {} is gzipped, decompressing", path.display());
        let temp_path = sibling_temp_path(path);
        let result = (|| -> AppResult<u64> {
            let mut decoder = MultiGzDecoder::new(BufReader::new(File::open(path)?));
            let mut writer = BufWriter::new(File::create(&temp_path)?);
            let written = std::io::copy(&mut decoder, &mut writer)?;
            writer.into_inner().map_err(|e| e.into_error())?.sync_all()?;
            Ok(written)
        })();

        match result {
            Ok(written) => {
                std::fs::rename(&temp_path, path)?;
                info!("Decompressed {} bytes into {}", written, path.display());
                Ok(format)
            }
            Err(e) => {
                let _ = std::fs::remove_file(&temp_path);
                Err(e)
            }
        }
    }
}

fn sibling_temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".inflate");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    #[test]
    fn test_detect_uncompressed() {
        let data = b"<?xml version=\"1.0\"?><tv></tv>";
        let format = DecompressionService::detect_compression_format(data);
        assert_eq!(format, CompressionFormat::Uncompressed);
    }

    #[test]
    fn test_detect_empty_input() {
        let format = DecompressionService::detect_compression_format(&[]);
        assert_eq!(format, CompressionFormat::Uncompressed);
    }

    #[test]
    fn test_decompress_gzip_file_in_place() {
        let original_data = b"<tv><channel id=\"ch1\"/></tv>";

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(original_data).unwrap();
        let compressed = encoder.finish().unwrap();
        assert_eq!(
            DecompressionService::detect_compression_format(&compressed),
            CompressionFormat::Gzip
        );

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guide.xml");
        std::fs::write(&path, &compressed).unwrap();

        let format = DecompressionService::decompress_file_in_place(&path).unwrap();
        assert_eq!(format, CompressionFormat::Gzip);
        assert_eq!(std::fs::read(&path).unwrap(), original_data);
        assert!(!dir.path().join("guide.xml.inflate").exists());
    }

    #[test]
    fn test_plain_file_left_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guide.xml");
        std::fs::write(&path, b"<tv/>").unwrap();

        let format = DecompressionService::decompress_file_in_place(&path).unwrap();
        assert_eq!(format, CompressionFormat::Uncompressed);
        assert_eq!(std::fs::read(&path).unwrap(), b"<tv/>");
    }

    #[test]
    fn test_concatenated_gzip_members_are_all_inflated() {
        let mut compressed = Vec::new();
        for part in [&b"<tv><channel id=\"a\"/>"[..], &b"<channel id=\"b\"/></tv>"[..]] {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(part).unwrap();
            compressed.extend(encoder.finish().unwrap());
        }

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guide.xml");
        std::fs::write(&path, &compressed).unwrap();

        DecompressionService::decompress_file_in_place(&path).unwrap();
        assert_eq!(
            std::fs::read(&path).unwrap(),
            b"<tv><channel id=\"a\"/><channel id=\"b\"/></tv>"
        );
    }
}
