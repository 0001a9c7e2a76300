#![no_main]

use arbitrary::Arbitrary;
use bytes::Bytes;
use conduit_buffer::{Buffer, Decode, Encode, EncodeSize, ErrorCode, Limits, Read};
use libfuzzer_sys::fuzz_target;
use std::collections::{BTreeMap, HashSet, VecDeque};

#[derive(Arbitrary, Debug)]
enum Target {
    U32,
    Bool,
    String,
    Bytes,
    Vec,
    Deque,
    Map,
    Set,
    Array,
    Tuple,
    ErrorCode,
    Nested,
}

#[derive(Arbitrary, Debug)]
struct Input {
    target: Target,
    max_string_len: u16,
    max_elements: u16,
    data: Vec<u8>,
}

/// Decoding arbitrary bytes never panics, and whatever decodes re-encodes to the bytes consumed.
fn check<T: Read + Encode + EncodeSize>(data: &[u8], limits: &Limits) {
    let mut buf = Buffer::wrap_read_only(data).with_limits(*limits);
    match buf.read::<T>() {
        Ok(value) => {
            let consumed = buf.rpos();
            assert_eq!(value.encode_size(), consumed);
            if consumed == data.len() {
                assert!(T::decode_cfg(data, limits).is_ok());
            }
        }
        Err(_) => assert_eq!(buf.rpos(), 0),
    }
}

fn fuzz(input: Input) {
    let limits = Limits::new(input.max_string_len as usize, input.max_elements as usize);
    let data = &input.data[..];
    match input.target {
        Target::U32 => check::<u32>(data, &limits),
        Target::Bool => check::<bool>(data, &limits),
        Target::String => check::<String>(data, &limits),
        Target::Bytes => check::<Bytes>(data, &limits),
        Target::Vec => check::<Vec<Option<i16>>>(data, &limits),
        Target::Deque => check::<VecDeque<String>>(data, &limits),
        Target::Map => check::<BTreeMap<u8, Vec<u8>>>(data, &limits),
        Target::Set => check::<HashSet<u64>>(data, &limits),
        Target::Array => check::<[u16; 5]>(data, &limits),
        Target::Tuple => check::<(u8, uuid::Uuid, String, f64)>(data, &limits),
        Target::ErrorCode => check::<ErrorCode>(data, &limits),
        Target::Nested => {
            let mut buf = Buffer::from_bytes(Bytes::copy_from_slice(data)).with_limits(limits);
            if let Ok(inner) = buf.read::<Buffer>() {
                assert_eq!(inner.encode_size(), buf.rpos());
            }
        }
    }
}

fuzz_target!(|input: Input| {
    fuzz(input);
});
