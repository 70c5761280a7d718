use bytes::{Bytes, BytesMut};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io;
use std::marker::PhantomData;
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

/// Combines LengthDelimitedCodec (TCP framing) with Bincode (Serialization).
///
/// `Enc` is what this side writes, `Dec` what it reads. A client and the
/// server it talks to use the same codec with the parameters swapped.
pub struct RpcCodec<Enc, Dec> {
    codec: LengthDelimitedCodec,
    _marker: PhantomData<fn(Enc) -> Dec>,
}

impl<Enc, Dec> RpcCodec<Enc, Dec> {
    pub fn new() -> Self {
        Self { codec: LengthDelimitedCodec::new(), _marker: PhantomData }
    }
}

impl<Enc, Dec> Default for RpcCodec<Enc, Dec> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Enc: Serialize, Dec> Encoder<Enc> for RpcCodec<Enc, Dec> {
    type Error = io::Error;

    fn encode(&mut self, item: Enc, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let bytes = bincode::serialize(&item).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        self.codec.encode(Bytes::from(bytes), dst)
    }
}

impl<Enc, Dec: DeserializeOwned> Decoder for RpcCodec<Enc, Dec> {
    type Item = Dec;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.codec.decode(src)? {
            Some(bytes) => {
                let item = bincode::deserialize(&bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                Ok(Some(item))
            }
            None => Ok(None),
        }
    }
}
