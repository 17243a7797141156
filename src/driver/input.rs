use bytes::{Buf, BufMut, Bytes, BytesMut};
use uuid::Uuid;

/// Input is one client submission as transported through consensus: the
/// instance id it was allocated, a token naming the submitter's request, and
/// the opaque payload handed to the state transfer.
#[derive(Clone, Debug, PartialEq)]
pub struct Input {
    pub id: i32,
    pub uuid: Uuid,
    pub content: Bytes,
}

/// Output is whatever the state transfer produced for one applied input. It
/// is cloned to every handle still waiting on the id.
#[derive(Clone, Debug, PartialEq)]
pub struct Output {
    pub id: i32,
    pub content: Bytes,
}

// Wire framing, all integers big-endian:
//
//   i32 id | u8 uuid len | uuid | u8 content kind | u32 content len | content
//
// Every replica deserializes what any other replica serialized, so this
// layout must stay stable across versions of the same cluster. Bytes past the
// content field are tolerated on read.
const CONTENT_KIND_OPAQUE: u8 = 0x01;

impl Input {
    pub fn new(id: i32, content: Bytes) -> Self {
        Input {
            id,
            uuid: Uuid::new_v4(),
            content,
        }
    }

    pub fn serialize(&self) -> Result<Bytes, CodecError> {
        let content_len = u32::try_from(self.content.len()).map_err(|_| CodecError::ContentTooLarge {
            len: self.content.len(),
        })?;
        let uuid = self.uuid.as_bytes();

        let mut frame = BytesMut::with_capacity(4 + 1 + uuid.len() + 1 + 4 + self.content.len());
        frame.put_i32(self.id);
        frame.put_u8(uuid.len() as u8);
        frame.put_slice(uuid);
        frame.put_u8(CONTENT_KIND_OPAQUE);
        frame.put_u32(content_len);
        frame.put_slice(&self.content);

        Ok(frame.freeze())
    }

    pub fn deserialize(frame: &[u8]) -> Result<Input, CodecError> {
        let mut frame = frame;

        let id = take_i32(&mut frame)?;

        let uuid_len = take_u8(&mut frame)? as usize;
        let uuid_bytes = take_slice(&mut frame, uuid_len)?;
        let uuid = Uuid::from_slice(&uuid_bytes).map_err(|_| CodecError::MalformedUuid { len: uuid_len })?;

        let kind = take_u8(&mut frame)?;
        if kind != CONTENT_KIND_OPAQUE {
            return Err(CodecError::UnknownContentKind(kind));
        }
        let content_len = take_u32(&mut frame)? as usize;
        let content = take_slice(&mut frame, content_len)?;

        Ok(Input { id, uuid, content })
    }
}

fn take_i32(frame: &mut &[u8]) -> Result<i32, CodecError> {
    if frame.remaining() < 4 {
        return Err(CodecError::Truncated);
    }
    Ok(frame.get_i32())
}

fn take_u32(frame: &mut &[u8]) -> Result<u32, CodecError> {
    if frame.remaining() < 4 {
        return Err(CodecError::Truncated);
    }
    Ok(frame.get_u32())
}

fn take_u8(frame: &mut &[u8]) -> Result<u8, CodecError> {
    if frame.remaining() < 1 {
        return Err(CodecError::Truncated);
    }
    Ok(frame.get_u8())
}

fn take_slice(frame: &mut &[u8], len: usize) -> Result<Bytes, CodecError> {
    if frame.remaining() < len {
        return Err(CodecError::Truncated);
    }
    let taken = Bytes::copy_from_slice(&frame[..len]);
    frame.advance(len);
    Ok(taken)
}

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum CodecError {
    #[error("frame ended before a complete field")]
    Truncated,

    #[error("content kind {0:#04x} is unknown")]
    UnknownContentKind(u8),

    #[error("uuid field of {len} bytes is not a valid uuid")]
    MalformedUuid { len: usize },

    #[error("content of {len} bytes exceeds the frame length limit")]
    ContentTooLarge { len: usize },
}
