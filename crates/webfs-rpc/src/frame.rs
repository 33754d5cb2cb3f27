//! Frame kinds carried over a peer connection.
//!
//! Every message is one array whose element 0 is the frame kind:
//!
//! ```text
//! [0]                                   Ready
//! [1, call_id, method, args...]         Call
//! [2, call_id, status, payload?]        Reply
//! ```
//!
//! `call_id` is a `u64` chosen by the caller and echoed in the reply;
//! replies may come back in any order. `status` is a raw `NtStatus` code.
//! A reply payload is present only for successful calls with a result.

use webfs_types::NtStatus;

use crate::codec::{ArgList, Element, LazyElementList, encode_array};
use crate::error::ProtocolError;

const KIND_READY: u8 = 0;
const KIND_CALL: u8 = 1;
const KIND_REPLY: u8 = 2;

/// A parsed message.
#[derive(Debug)]
pub enum Frame {
    /// The sender's receive loop is running.
    Ready,
    Call {
        call_id: u64,
        method: String,
        args: LazyElementList,
    },
    Reply {
        call_id: u64,
        status: NtStatus,
        payload: Option<Element>,
    },
}

impl Frame {
    /// Parse one complete message.
    pub fn parse(bytes: &[u8]) -> Result<Frame, ProtocolError> {
        let mut list = LazyElementList::decode(bytes)?;
        match list.take_first_as::<u8>()? {
            KIND_READY => Ok(Frame::Ready),
            KIND_CALL => {
                let call_id = list.take_first_as()?;
                let method = list.take_first_as()?;
                Ok(Frame::Call {
                    call_id,
                    method,
                    args: list,
                })
            }
            KIND_REPLY => {
                let call_id = list.take_first_as()?;
                let status = NtStatus::from_code(list.take_first_as()?);
                let payload = list.take_first().ok();
                Ok(Frame::Reply {
                    call_id,
                    status,
                    payload,
                })
            }
            other => Err(ProtocolError::UnknownFrameKind(other)),
        }
    }

    pub fn encode_ready() -> Vec<u8> {
        // fixarray(1), fixint 0
        vec![0x91, KIND_READY]
    }

    pub fn encode_call(call_id: u64, method: &str, args: &ArgList) -> Result<Vec<u8>, ProtocolError> {
        let head = [
            Element::encode(&KIND_CALL)?,
            Element::encode(&call_id)?,
            Element::encode(method)?,
        ];
        Ok(encode_array(&head, args.elements()))
    }

    pub fn encode_reply(
        call_id: u64,
        status: NtStatus,
        payload: Option<Element>,
    ) -> Result<Vec<u8>, ProtocolError> {
        let head = [
            Element::encode(&KIND_REPLY)?,
            Element::encode(&call_id)?,
            Element::encode(&status.code())?,
        ];
        let tail: Vec<Element> = payload.into_iter().collect();
        Ok(encode_array(&head, &tail))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_frame() {
        assert!(matches!(
            Frame::parse(&Frame::encode_ready()).unwrap(),
            Frame::Ready
        ));
    }

    #[test]
    fn test_call_frame_keeps_args_lazy() {
        let args = ArgList::new().arg("a.txt").unwrap().arg(&512u64).unwrap();
        let bytes = Frame::encode_call(42, "read_file", &args).unwrap();
        let Frame::Call {
            call_id,
            method,
            mut args,
        } = Frame::parse(&bytes).unwrap()
        else {
            panic!("expected call");
        };
        assert_eq!(call_id, 42);
        assert_eq!(method, "read_file");
        assert_eq!(args.len(), 2);
        assert_eq!(args.take_first_as::<String>().unwrap(), "a.txt");
        assert_eq!(args.take_first_as::<u64>().unwrap(), 512);
    }

    #[test]
    fn test_reply_with_and_without_payload() {
        let payload = Element::encode(&7u32).unwrap();
        let bytes = Frame::encode_reply(9, NtStatus::Success, Some(payload)).unwrap();
        match Frame::parse(&bytes).unwrap() {
            Frame::Reply {
                call_id: 9,
                status: NtStatus::Success,
                payload: Some(p),
            } => assert_eq!(p.decode::<u32>().unwrap(), 7),
            other => panic!("unexpected {other:?}"),
        }

        let bytes = Frame::encode_reply(10, NtStatus::AccessDenied, None).unwrap();
        assert!(matches!(
            Frame::parse(&bytes).unwrap(),
            Frame::Reply {
                call_id: 10,
                status: NtStatus::AccessDenied,
                payload: None
            }
        ));
    }

    #[test]
    fn test_unknown_kind() {
        let bytes = ArgList::new().arg(&7u8).unwrap().encode();
        assert!(matches!(
            Frame::parse(&bytes),
            Err(ProtocolError::UnknownFrameKind(7))
        ));
    }

    #[test]
    fn test_empty_message() {
        assert!(matches!(Frame::parse(&[0x90]), Err(ProtocolError::EmptyList)));
    }
}
