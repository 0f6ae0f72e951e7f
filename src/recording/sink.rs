//! AVI (MJPG) video sink.
//!
//! Frames arrive from the camera already JPEG-encoded, so the sink is a pure
//! RIFF muxer: header, one `vids/MJPG` stream, `00dc` chunks in a `movi`
//! list, and an `idx1` index. The header is written with placeholder sizes
//! and patched when the file is finalized.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// AVIF_HASINDEX
const AVI_FLAGS: u32 = 0x0000_0010;
/// AVIIF_KEYFRAME; every MJPEG frame is independently decodable
const INDEX_KEYFRAME: u32 = 0x0000_0010;

// Fixed header layout offsets (single video stream, no extra chunks).
const RIFF_SIZE_POS: u64 = 4;
const TOTAL_FRAMES_POS: u64 = 48;
const MAIN_BUFFER_SIZE_POS: u64 = 60;
const STREAM_LENGTH_POS: u64 = 140;
const STREAM_BUFFER_SIZE_POS: u64 = 144;
const MOVI_SIZE_POS: u64 = 216;
const MOVI_FOURCC_POS: u64 = 220;
const HEADER_LEN: u64 = 224;

/// Writable video sink for one recording session.
///
/// Exclusively owned by the recording controller while the session is
/// active; `finish` (or drop) closes and flushes it.
pub struct AviSink {
    writer: Option<BufWriter<File>>,
    path: PathBuf,
    pos: u64,
    frames: u32,
    max_frame_bytes: u32,
    index: Vec<IndexEntry>,
}

struct IndexEntry {
    offset: u32,
    size: u32,
}

impl AviSink {
    /// Create the file and write the AVI header for the given fixed profile.
    pub fn create(path: &Path, fps: u32, width: u32, height: u32) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("failed to create recording file {}", path.display()))?;
        let mut writer = BufWriter::new(file);

        write_header(&mut writer, fps, width, height)?;

        Ok(Self {
            writer: Some(writer),
            path: path.to_path_buf(),
            pos: HEADER_LEN,
            frames: 0,
            max_frame_bytes: 0,
            index: Vec::new(),
        })
    }

    /// Append one JPEG frame.
    pub fn write_frame(&mut self, jpeg: &[u8]) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .context("recording sink already closed")?;

        let offset = (self.pos - MOVI_FOURCC_POS) as u32;
        let size = jpeg.len() as u32;

        writer.write_all(b"00dc")?;
        writer.write_all(&size.to_le_bytes())?;
        writer.write_all(jpeg)?;
        self.pos += 8 + jpeg.len() as u64;

        // RIFF chunks are word-aligned
        if jpeg.len() % 2 == 1 {
            writer.write_all(&[0u8])?;
            self.pos += 1;
        }

        self.index.push(IndexEntry { offset, size });
        self.frames += 1;
        self.max_frame_bytes = self.max_frame_bytes.max(size);

        Ok(())
    }

    pub fn frame_count(&self) -> u32 {
        self.frames
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the index, patch the placeholder sizes, and flush to disk.
    pub fn finish(mut self) -> Result<u32> {
        let frames = self.frames;
        self.close()?;
        Ok(frames)
    }

    fn close(&mut self) -> Result<()> {
        let Some(mut writer) = self.writer.take() else {
            return Ok(());
        };

        // idx1 follows the movi list as the final top-level chunk.
        let movi_size = 4 + (self.pos - HEADER_LEN);
        writer.write_all(b"idx1")?;
        writer.write_all(&((self.index.len() as u32) * 16).to_le_bytes())?;
        for entry in &self.index {
            writer.write_all(b"00dc")?;
            writer.write_all(&INDEX_KEYFRAME.to_le_bytes())?;
            writer.write_all(&entry.offset.to_le_bytes())?;
            writer.write_all(&entry.size.to_le_bytes())?;
        }
        self.pos += 8 + self.index.len() as u64 * 16;

        writer.flush()?;
        let mut file = writer
            .into_inner()
            .map_err(|e| anyhow::anyhow!("failed to flush recording sink: {e}"))?;

        patch_u32(&mut file, RIFF_SIZE_POS, (self.pos - 8) as u32)?;
        patch_u32(&mut file, TOTAL_FRAMES_POS, self.frames)?;
        patch_u32(&mut file, MAIN_BUFFER_SIZE_POS, self.max_frame_bytes)?;
        patch_u32(&mut file, STREAM_LENGTH_POS, self.frames)?;
        patch_u32(&mut file, STREAM_BUFFER_SIZE_POS, self.max_frame_bytes)?;
        patch_u32(&mut file, MOVI_SIZE_POS, movi_size as u32)?;

        file.sync_all()
            .with_context(|| format!("failed to sync {}", self.path.display()))?;

        Ok(())
    }
}

impl Drop for AviSink {
    fn drop(&mut self) {
        if self.writer.is_some() {
            if let Err(e) = self.close() {
                warn!(path = %self.path.display(), error = %e, "failed to finalize sink on drop");
            }
        }
    }
}

fn patch_u32(file: &mut File, pos: u64, value: u32) -> Result<()> {
    file.seek(SeekFrom::Start(pos))?;
    file.write_all(&value.to_le_bytes())?;
    Ok(())
}

fn write_header(writer: &mut BufWriter<File>, fps: u32, width: u32, height: u32) -> Result<()> {
    let fps = fps.max(1);

    writer.write_all(b"RIFF")?;
    writer.write_all(&0u32.to_le_bytes())?; // patched on finish
    writer.write_all(b"AVI ")?;

    // hdrl list: "hdrl" + avih chunk + strl list
    writer.write_all(b"LIST")?;
    writer.write_all(&192u32.to_le_bytes())?;
    writer.write_all(b"hdrl")?;

    writer.write_all(b"avih")?;
    writer.write_all(&56u32.to_le_bytes())?;
    writer.write_all(&(1_000_000 / fps).to_le_bytes())?; // microseconds per frame
    writer.write_all(&0u32.to_le_bytes())?; // max bytes/sec
    writer.write_all(&0u32.to_le_bytes())?; // padding granularity
    writer.write_all(&AVI_FLAGS.to_le_bytes())?;
    writer.write_all(&0u32.to_le_bytes())?; // total frames, patched
    writer.write_all(&0u32.to_le_bytes())?; // initial frames
    writer.write_all(&1u32.to_le_bytes())?; // stream count
    writer.write_all(&0u32.to_le_bytes())?; // suggested buffer, patched
    writer.write_all(&width.to_le_bytes())?;
    writer.write_all(&height.to_le_bytes())?;
    writer.write_all(&[0u8; 16])?; // reserved

    writer.write_all(b"LIST")?;
    writer.write_all(&116u32.to_le_bytes())?;
    writer.write_all(b"strl")?;

    writer.write_all(b"strh")?;
    writer.write_all(&56u32.to_le_bytes())?;
    writer.write_all(b"vids")?;
    writer.write_all(b"MJPG")?;
    writer.write_all(&0u32.to_le_bytes())?; // flags
    writer.write_all(&0u16.to_le_bytes())?; // priority
    writer.write_all(&0u16.to_le_bytes())?; // language
    writer.write_all(&0u32.to_le_bytes())?; // initial frames
    writer.write_all(&1u32.to_le_bytes())?; // scale
    writer.write_all(&fps.to_le_bytes())?; // rate: rate/scale = fps
    writer.write_all(&0u32.to_le_bytes())?; // start
    writer.write_all(&0u32.to_le_bytes())?; // length, patched
    writer.write_all(&0u32.to_le_bytes())?; // suggested buffer, patched
    writer.write_all(&u32::MAX.to_le_bytes())?; // quality: default
    writer.write_all(&0u32.to_le_bytes())?; // sample size
    writer.write_all(&0u16.to_le_bytes())?; // rcFrame left
    writer.write_all(&0u16.to_le_bytes())?; // rcFrame top
    writer.write_all(&(width as u16).to_le_bytes())?;
    writer.write_all(&(height as u16).to_le_bytes())?;

    writer.write_all(b"strf")?;
    writer.write_all(&40u32.to_le_bytes())?;
    writer.write_all(&40u32.to_le_bytes())?; // biSize
    writer.write_all(&width.to_le_bytes())?;
    writer.write_all(&height.to_le_bytes())?;
    writer.write_all(&1u16.to_le_bytes())?; // planes
    writer.write_all(&24u16.to_le_bytes())?; // bit count
    writer.write_all(b"MJPG")?; // compression
    writer.write_all(&(width * height * 3).to_le_bytes())?; // image size
    writer.write_all(&[0u8; 16])?; // resolution + clr fields

    writer.write_all(b"LIST")?;
    writer.write_all(&0u32.to_le_bytes())?; // movi size, patched
    writer.write_all(b"movi")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn fake_jpeg(len: usize) -> Vec<u8> {
        let mut v = vec![0xFF, 0xD8];
        v.resize(len.max(4) - 2, 0xAB);
        v.extend_from_slice(&[0xFF, 0xD9]);
        v
    }

    #[test]
    fn empty_sink_produces_valid_riff() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.avi");

        let sink = AviSink::create(&path, 20, 640, 480).unwrap();
        assert_eq!(sink.finish().unwrap(), 0);

        let bytes = fs::read(&path).unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"AVI ");
        let riff_size = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        assert_eq!(riff_size as usize, bytes.len() - 8);
    }

    #[test]
    fn frames_land_in_movi_with_index() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("clip.avi");

        let mut sink = AviSink::create(&path, 20, 640, 480).unwrap();
        for i in 0..5 {
            sink.write_frame(&fake_jpeg(100 + i)).unwrap();
        }
        assert_eq!(sink.frame_count(), 5);
        assert_eq!(sink.finish().unwrap(), 5);

        let bytes = fs::read(&path).unwrap();
        // header fields patched
        let total_frames =
            u32::from_le_bytes(bytes[TOTAL_FRAMES_POS as usize..][..4].try_into().unwrap());
        assert_eq!(total_frames, 5);
        assert_eq!(&bytes[MOVI_FOURCC_POS as usize..][..4], b"movi");
        // first chunk directly after movi fourcc
        assert_eq!(&bytes[HEADER_LEN as usize..][..4], b"00dc");
        // idx1 present with 5 entries
        let idx = bytes
            .windows(4)
            .position(|w| w == b"idx1")
            .expect("idx1 chunk");
        let idx_size = u32::from_le_bytes(bytes[idx + 4..][..4].try_into().unwrap());
        assert_eq!(idx_size, 5 * 16);
    }

    #[test]
    fn odd_sized_frames_are_padded() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("odd.avi");

        let mut sink = AviSink::create(&path, 20, 640, 480).unwrap();
        sink.write_frame(&fake_jpeg(101)).unwrap();
        sink.write_frame(&fake_jpeg(101)).unwrap();
        sink.finish().unwrap();

        let bytes = fs::read(&path).unwrap();
        // second chunk must start on an even offset
        let second = bytes[HEADER_LEN as usize + 8 + 101..]
            .windows(4)
            .position(|w| w == b"00dc")
            .unwrap()
            + HEADER_LEN as usize
            + 8
            + 101;
        assert_eq!(second % 2, 0);
    }
}
