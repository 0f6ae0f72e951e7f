use anyhow::{Context, Result};
use bytes::{Bytes, BytesMut};
use futures::stream::BoxStream;
use futures::StreamExt;
use std::time::Duration;
use tracing::{info, warn};

use super::source::{Frame, FrameSource, SourceError};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const RECONNECT_BACKOFF: Duration = Duration::from_millis(500);

/// JPEG start-of-image / end-of-image markers
const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];

/// Pull-variant frame source: maintains a persistent connection to the
/// camera's MJPEG stream and extracts one JPEG per `next_frame` call.
///
/// The initial connection is established in `open` and its failure is fatal
/// to the caller; later disconnects are handled internally with
/// reconnect-and-backoff.
pub struct MjpegPullSource {
    url: String,
    client: reqwest::Client,
    stream: Option<BoxStream<'static, reqwest::Result<Bytes>>>,
    buf: BytesMut,
}

impl MjpegPullSource {
    /// Connect to the stream URL. Fails if the first connection cannot be
    /// established.
    pub async fn open(url: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;

        let mut source = Self {
            url,
            client,
            stream: None,
            buf: BytesMut::new(),
        };
        source
            .connect()
            .await
            .map_err(|e| e.context("failed to open MJPEG stream"))?;

        Ok(source)
    }

    async fn connect(&mut self) -> Result<()> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .with_context(|| format!("connect to {}", self.url))?
            .error_for_status()
            .with_context(|| format!("stream {} rejected the request", self.url))?;

        info!(url = %self.url, "connected to MJPEG stream");

        self.buf.clear();
        self.stream = Some(response.bytes_stream().boxed());
        Ok(())
    }

    /// Pop one complete JPEG out of the reassembly buffer, discarding any
    /// multipart boundary bytes in front of it.
    fn take_jpeg(&mut self) -> Option<Bytes> {
        let start = find(&self.buf, &SOI)?;
        let end = find(&self.buf[start + 2..], &EOI)? + start + 2 + 2;

        let _ = self.buf.split_to(start);
        Some(self.buf.split_to(end - start).freeze())
    }
}

fn find(haystack: &[u8], needle: &[u8; 2]) -> Option<usize> {
    haystack.windows(2).position(|w| w == needle)
}

#[async_trait::async_trait]
impl FrameSource for MjpegPullSource {
    async fn next_frame(&mut self) -> Result<Frame, SourceError> {
        loop {
            if let Some(jpeg) = self.take_jpeg() {
                return Ok(Frame::new(jpeg));
            }

            if self.stream.is_none() {
                tokio::time::sleep(RECONNECT_BACKOFF).await;
                if let Err(e) = self.connect().await {
                    warn!(url = %self.url, error = %e, "reconnect failed");
                    continue;
                }
            }

            // Stream is present here; a read error or EOF drops it so the
            // next iteration reconnects.
            let chunk = match self.stream.as_mut() {
                Some(stream) => stream.next().await,
                None => continue,
            };

            match chunk {
                Some(Ok(bytes)) => self.buf.extend_from_slice(&bytes),
                Some(Err(e)) => {
                    warn!(url = %self.url, error = %e, "stream read failed, reconnecting");
                    self.stream = None;
                }
                None => {
                    warn!(url = %self.url, "stream ended, reconnecting");
                    self.stream = None;
                }
            }
        }
    }

    fn name(&self) -> &str {
        "mjpeg-pull"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Minimal JPEG-shaped payload: SOI, filler, EOI.
    fn fake_jpeg(filler: &[u8]) -> Vec<u8> {
        let mut v = vec![0xFF, 0xD8];
        v.extend_from_slice(filler);
        v.extend_from_slice(&[0xFF, 0xD9]);
        v
    }

    fn source_with_buf(bytes: &[u8]) -> MjpegPullSource {
        MjpegPullSource {
            url: "http://camera/stream".to_string(),
            client: reqwest::Client::new(),
            stream: None,
            buf: BytesMut::from(bytes),
        }
    }

    #[test]
    fn extracts_jpeg_and_discards_boundary_prefix() {
        let mut payload = b"--frameboundary\r\nContent-Type: image/jpeg\r\n\r\n".to_vec();
        let jpeg = fake_jpeg(b"pixels");
        payload.extend_from_slice(&jpeg);
        payload.extend_from_slice(b"\r\n--frameboundary");

        let mut source = source_with_buf(&payload);
        let got = source.take_jpeg().expect("should find a frame");
        assert_eq!(&got[..], &jpeg[..]);
        // Trailing boundary stays buffered for the next frame.
        assert!(!source.buf.is_empty());
    }

    #[test]
    fn incomplete_frame_yields_nothing() {
        let mut source = source_with_buf(&[0xFF, 0xD8, 0x01, 0x02]);
        assert!(source.take_jpeg().is_none());
        // Buffer must be preserved so the frame can complete later.
        assert_eq!(source.buf.len(), 4);
    }

    #[test]
    fn consecutive_frames_come_out_in_order() {
        let a = fake_jpeg(b"a");
        let b = fake_jpeg(b"b");
        let mut payload = a.clone();
        payload.extend_from_slice(&b);

        let mut source = source_with_buf(&payload);
        assert_eq!(&source.take_jpeg().unwrap()[..], &a[..]);
        assert_eq!(&source.take_jpeg().unwrap()[..], &b[..]);
        assert!(source.take_jpeg().is_none());
    }
}
