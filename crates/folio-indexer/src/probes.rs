//! File probes
//!
//! Best-effort inspection of the files in a work's data folders: sizes,
//! image dimensions from PNG/JPEG headers, and page full text with an
//! ALTO fallback. Every probe returns `None` instead of failing; a
//! missing or unreadable file never aborts the indexing run.

use async_trait::async_trait;
use folio_core::FileProbes;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::path::Path;
use tokio::io::AsyncReadExt;
use tracing::debug;

/// Bytes read from an image file when probing dimensions. Headers of
/// PNG and baseline JPEG files fit comfortably.
const DIMENSION_PROBE_BYTES: usize = 64 * 1024;

#[derive(Default)]
pub struct BasicProbes;

impl BasicProbes {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FileProbes for BasicProbes {
    async fn file_size(&self, path: &Path) -> Option<u64> {
        tokio::fs::metadata(path).await.ok().map(|m| m.len())
    }

    async fn image_dimensions(&self, path: &Path) -> Option<(u32, u32)> {
        let mut file = tokio::fs::File::open(path).await.ok()?;
        let mut header = vec![0u8; DIMENSION_PROBE_BYTES];
        let mut read = 0;
        while read < header.len() {
            match file.read(&mut header[read..]).await {
                Ok(0) => break,
                Ok(n) => read += n,
                Err(_) => return None,
            }
        }
        header.truncate(read);

        png_dimensions(&header).or_else(|| jpeg_dimensions(&header))
    }

    async fn full_text(&self, path: &Path) -> Option<(String, bool)> {
        if let Ok(text) = tokio::fs::read_to_string(path).await {
            let text = text.trim().to_string();
            if !text.is_empty() {
                return Some((text, false));
            }
        }

        // ALTO sibling with the same stem
        let alto_path = path.with_extension("xml");
        let xml = tokio::fs::read_to_string(&alto_path).await.ok()?;
        let text = alto_text(&xml)?;
        debug!(path = %alto_path.display(), "full text extracted from ALTO");
        Some((text, true))
    }
}

fn png_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    const SIGNATURE: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    if data.len() < 24 || !data.starts_with(SIGNATURE) || &data[12..16] != b"IHDR" {
        return None;
    }
    let width = u32::from_be_bytes([data[16], data[17], data[18], data[19]]);
    let height = u32::from_be_bytes([data[20], data[21], data[22], data[23]]);
    Some((width, height))
}

fn jpeg_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    if data.len() < 4 || data[0] != 0xFF || data[1] != 0xD8 {
        return None;
    }
    let mut pos = 2;
    while pos + 9 <= data.len() {
        if data[pos] != 0xFF {
            pos += 1;
            continue;
        }
        let marker = data[pos + 1];
        // Start-of-frame markers carry the dimensions
        if (0xC0..=0xCF).contains(&marker) && !matches!(marker, 0xC4 | 0xC8 | 0xCC) {
            let height = u16::from_be_bytes([data[pos + 5], data[pos + 6]]) as u32;
            let width = u16::from_be_bytes([data[pos + 7], data[pos + 8]]) as u32;
            return Some((width, height));
        }
        let length = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
        pos += 2 + length;
    }
    None
}

/// Concatenate the CONTENT attributes of an ALTO document's String
/// elements, one output line per TextLine.
fn alto_text(xml: &str) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut lines: Vec<String> = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() == b"String" {
                    for attr in e.attributes().flatten() {
                        if attr.key.local_name().as_ref() == b"CONTENT" {
                            if let Ok(value) = attr.unescape_value() {
                                current.push(value.into_owned());
                            }
                        }
                    }
                }
            },
            Ok(Event::End(e)) if e.local_name().as_ref() == b"TextLine" => {
                if !current.is_empty() {
                    lines.push(current.join(" "));
                    current.clear();
                }
            },
            Ok(Event::Eof) => break,
            Err(_) => return None,
            _ => {},
        }
        buf.clear();
    }
    if !current.is_empty() {
        lines.push(current.join(" "));
    }

    let text = lines.join("\n");
    (!text.is_empty()).then_some(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let mut data = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        data.extend_from_slice(&13u32.to_be_bytes());
        data.extend_from_slice(b"IHDR");
        data.extend_from_slice(&width.to_be_bytes());
        data.extend_from_slice(&height.to_be_bytes());
        data.extend_from_slice(&[8, 2, 0, 0, 0]);
        data
    }

    #[tokio::test]
    async fn test_png_dimensions() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("page.png");
        std::fs::write(&path, png_bytes(1200, 1800)).unwrap();

        let dims = BasicProbes::new().image_dimensions(&path).await;
        assert_eq!(dims, Some((1200, 1800)));
    }

    #[test]
    fn test_jpeg_dimensions_from_sof() {
        // SOI, APP0 (empty), SOF0 with 600x400
        let mut data = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x02];
        data.extend_from_slice(&[0xFF, 0xC0, 0x00, 0x0B, 0x08]);
        data.extend_from_slice(&400u16.to_be_bytes());
        data.extend_from_slice(&600u16.to_be_bytes());
        data.extend_from_slice(&[0x01, 0x01, 0x11, 0x00]);

        assert_eq!(jpeg_dimensions(&data), Some((600, 400)));
    }

    #[tokio::test]
    async fn test_plain_text_preferred_over_alto() {
        let dir = TempDir::new().unwrap();
        let txt = dir.path().join("00000001.txt");
        std::fs::write(&txt, "plain text\n").unwrap();

        let (text, from_alto) = BasicProbes::new().full_text(&txt).await.unwrap();
        assert_eq!(text, "plain text");
        assert!(!from_alto);
    }

    #[tokio::test]
    async fn test_alto_fallback() {
        let dir = TempDir::new().unwrap();
        let alto = dir.path().join("00000001.xml");
        std::fs::write(
            &alto,
            r#"<alto><Layout><TextLine>
                 <String CONTENT="Erster"/><String CONTENT="Satz"/>
               </TextLine><TextLine>
                 <String CONTENT="Zweiter"/>
               </TextLine></Layout></alto>"#,
        )
        .unwrap();

        let (text, from_alto) = BasicProbes::new()
            .full_text(&dir.path().join("00000001.txt"))
            .await
            .unwrap();
        assert_eq!(text, "Erster Satz\nZweiter");
        assert!(from_alto);
    }

    #[tokio::test]
    async fn test_missing_files_yield_none() {
        let probes = BasicProbes::new();
        assert!(probes.file_size(Path::new("/nonexistent")).await.is_none());
        assert!(probes
            .image_dimensions(Path::new("/nonexistent"))
            .await
            .is_none());
        assert!(probes.full_text(Path::new("/nonexistent.txt")).await.is_none());
    }
}
