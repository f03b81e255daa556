//! Streaming `multipart/form-data` bodies with an exact `Content-Length`
//!
//! The body is laid out as text fields followed by a single zip file part. Framing bytes are
//! computed upfront so the length is known before the zip is read.

use bytes::Bytes;
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::task::JoinHandle;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

use crate::archive::ZipStream;
use crate::errors::EngineError;

const PIPE_CAPACITY: usize = 64 * 1024;

/// Multipart body with text fields and one trailing zip part
pub struct MultipartUpload {
    boundary: String,
    head: Bytes,
    tail: Bytes,
    zip: ZipStream,
}

fn field_part(boundary: &str, first: bool, name: &str, value: &str) -> String {
    let mut part = String::new();
    if !first {
        part.push_str("\r\n");
    }
    part.push_str(&format!("--{}\r\n", boundary));
    part.push_str(&format!(
        "Content-Disposition: form-data; name=\"{}\"\r\n\r\n",
        name
    ));
    part.push_str(value);
    part
}

fn file_part_header(boundary: &str, first: bool, name: &str, filename: &str, size: u64) -> String {
    let mut part = String::new();
    if !first {
        part.push_str("\r\n");
    }
    part.push_str(&format!("--{}\r\n", boundary));
    part.push_str(&format!(
        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
        name,
        filename.replace('"', "\\\"")
    ));
    part.push_str(&format!("Content-Length: {}\r\n", size));
    part.push_str("Content-Transfer-Encoding: binary\r\n");
    part.push_str("Content-Type: application/zip\r\n\r\n");
    part
}

impl MultipartUpload {
    /// Body made of `fields` then `zip` under `file_field`
    pub fn new(fields: &[(&str, &str)], file_field: &str, file_name: &str, zip: ZipStream) -> Self {
        let boundary = uuid::Uuid::new_v4().simple().to_string();
        let mut head = String::new();
        for (i, (name, value)) in fields.iter().enumerate() {
            head.push_str(&field_part(&boundary, i == 0, name, value));
        }
        head.push_str(&file_part_header(
            &boundary,
            fields.is_empty(),
            file_field,
            file_name,
            zip.size(),
        ));
        let tail = format!("\r\n--{}--\r\n", boundary);

        Self {
            boundary,
            head: Bytes::from(head),
            tail: Bytes::from(tail),
            zip,
        }
    }

    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    /// Exact number of bytes the body will produce
    pub fn content_length(&self) -> u64 {
        self.head.len() as u64 + self.zip.size() + self.tail.len() as u64
    }

    /// Start the producer task writing the body into a pipe and return the read end
    pub fn spawn(self) -> (DuplexStream, JoinHandle<Result<(), EngineError>>) {
        let (mut writer, reader) = tokio::io::duplex(PIPE_CAPACITY);
        let Self {
            head,
            tail,
            mut zip,
            ..
        } = self;

        let producer = tokio::spawn(async move {
            let written = async {
                writer.write_all(&head).await?;
                let copied = tokio::io::copy(&mut zip, &mut writer).await?;
                writer.write_all(&tail).await?;
                writer.shutdown().await?;
                Ok::<u64, std::io::Error>(copied)
            }
            .await;

            if let Err(e) = zip.close() {
                warn!("Failed to clean up archive after upload: {}", e);
            }
            let copied = written?;
            debug!("Streamed {} archive bytes into multipart body", copied);
            Ok::<(), EngineError>(())
        });
        (reader, producer)
    }

    /// Streaming request body plus the producer task
    pub fn into_body(self) -> (reqwest::Body, JoinHandle<Result<(), EngineError>>) {
        let (reader, producer) = self.spawn();
        (reqwest::Body::wrap_stream(ReaderStream::new(reader)), producer)
    }
}

/// Outcome of the producer, surfaced after the request completes
pub async fn join_producer(producer: JoinHandle<Result<(), EngineError>>) -> Result<(), EngineError> {
    producer
        .await
        .map_err(|e| EngineError::Internal(format!("multipart producer failed: {}", e)))?
}
