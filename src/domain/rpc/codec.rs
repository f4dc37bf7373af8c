use bytes::BytesMut;
use std::io;
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

use crate::domain::rpc::protocol::RpcMessage;

/// Combines LengthDelimitedCodec (TCP framing) with Bincode
/// (serialization) for the records exchanged with the runtime library.
pub struct RpcCodec {
    codec: LengthDelimitedCodec,
}

impl RpcCodec {
    pub fn new() -> Self {
        Self { codec: LengthDelimitedCodec::new() }
    }
}

impl Default for RpcCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder<RpcMessage> for RpcCodec {
    type Error = io::Error;

    fn encode(&mut self, item: RpcMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let bytes = bincode::serialize(&item).map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

        let bytes = bytes::Bytes::from(bytes);
        self.codec.encode(bytes, dst)
    }
}

impl Decoder for RpcCodec {
    type Item = RpcMessage;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.codec.decode(src)? {
            Some(bytes) => {
                let item = bincode::deserialize(&bytes).map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
                Ok(Some(item))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::rpc::protocol::MessageHeader;
    use crate::domain::utils::id::{AppUid, SessionToken};

    #[test]
    fn round_trip_preserves_the_header() {
        let msg = RpcMessage::SyncChange { header: MessageHeader::new(SessionToken(7), AppUid::new(1234, 2)) };

        let mut codec = RpcCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(msg, &mut buf).unwrap();
        let decoded = codec.decode(&mut buf).unwrap().unwrap();

        let header = decoded.header();
        assert_eq!(header.token, SessionToken(7));
        assert_eq!(header.app, AppUid::new(1234, 2));
    }
}
