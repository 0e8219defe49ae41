use crate::error::EnvelopeError;
use bytes::{BufMut, Bytes, BytesMut};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const TIMESTAMP_SIZE: usize = 8;

/// Wire format of every published message: the send time in microseconds
/// since the Unix epoch as a little endian `u64`, followed by the user payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub send_timestamp_micros: u64,
    pub payload: Bytes,
}

impl Envelope {
    pub fn new(send_timestamp_micros: u64, payload: Bytes) -> Self {
        Self {
            send_timestamp_micros,
            payload,
        }
    }

    pub fn now(payload: Bytes) -> Self {
        Self::new(micros_since_epoch(SystemTime::now()), payload)
    }

    pub fn encode(&self) -> Bytes {
        let mut buffer = BytesMut::with_capacity(TIMESTAMP_SIZE + self.payload.len());
        buffer.put_u64_le(self.send_timestamp_micros);
        buffer.put_slice(&self.payload);
        buffer.freeze()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        if bytes.len() < TIMESTAMP_SIZE {
            return Err(EnvelopeError::TooShort(bytes.len()));
        }
        let (timestamp, payload) = bytes.split_at(TIMESTAMP_SIZE);
        let mut timestamp_bytes = [0u8; TIMESTAMP_SIZE];
        timestamp_bytes.copy_from_slice(timestamp);
        Ok(Self::new(
            u64::from_le_bytes(timestamp_bytes),
            Bytes::copy_from_slice(payload),
        ))
    }

    /// Time elapsed between the embedded send time and `now`, zero if the
    /// clock went backwards in between.
    pub fn round_trip_time(&self, now: SystemTime) -> Duration {
        Duration::from_micros(micros_since_epoch(now).saturating_sub(self.send_timestamp_micros))
    }
}

pub fn micros_since_epoch(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_micros() as u64)
        .unwrap_or_default()
}
