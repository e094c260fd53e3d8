use bytes::Bytes;

/// Immutable unit of media passed through the pipeline.
///
/// Holds either raw inbound media (pre-transcode) or PCM produced by the
/// transcoder. Cloning is cheap; the underlying buffer is shared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk(Bytes);

impl Chunk {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self(data.into())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl From<Vec<u8>> for Chunk {
    fn from(data: Vec<u8>) -> Self {
        Self(Bytes::from(data))
    }
}

impl From<Bytes> for Chunk {
    fn from(data: Bytes) -> Self {
        Self(data)
    }
}

impl AsRef<[u8]> for Chunk {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Item carried by the relay queue: a chunk, or the end-of-stream marker.
///
/// `End` is not a chunk; exactly one flows through a queue per session and
/// it is always the last item the consumer sees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayItem {
    Chunk(Chunk),
    End,
}

impl RelayItem {
    pub fn is_end(&self) -> bool {
        matches!(self, RelayItem::End)
    }
}
