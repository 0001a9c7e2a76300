#![no_main]

use arbitrary::Arbitrary;
use conduit_buffer::{Buffer, Mode};
use libfuzzer_sys::fuzz_target;
use std::collections::VecDeque;

#[derive(Arbitrary, Debug)]
enum Op {
    Put(Vec<u8>),
    Get(u8),
    Skip(u8),
    Crunch,
    Mark,
    Reset,
    Grow(u8),
}

#[derive(Arbitrary, Debug)]
struct Input {
    capacity: u8,
    on_demand: bool,
    ops: Vec<Op>,
}

/// Applies every operation to a buffer and to a `VecDeque` model and compares the data.
fn run<M: Mode>(mut buf: Buffer<'static, M>, ops: &[Op]) {
    let mut model: VecDeque<u8> = VecDeque::new();
    let mut marked: Option<(usize, usize)> = None;
    for op in ops {
        match op {
            Op::Put(bytes) => {
                let allocated = buf.allocated_size();
                if buf.put_slice(bytes).is_ok() {
                    model.extend(bytes);
                }
                if buf.allocated_size() != allocated {
                    marked = None;
                }
            }
            Op::Get(n) => {
                let mut out = vec![0; *n as usize];
                if buf.get_slice(&mut out).is_ok() {
                    let expected: Vec<u8> = model.drain(..out.len()).collect();
                    assert_eq!(out, expected);
                } else {
                    assert!(out.len() > model.len());
                }
            }
            Op::Skip(n) => {
                if buf.rskip(*n as usize).is_ok() {
                    model.drain(..*n as usize);
                }
            }
            Op::Crunch => {
                buf.crunch().unwrap();
                assert_eq!(buf.rpos(), 0);
                marked = None;
            }
            Op::Mark => {
                buf.mark();
                marked = Some((buf.rpos(), buf.wpos()));
            }
            Op::Reset => {
                if let Some(positions) = marked {
                    buf.reset().unwrap();
                    assert_eq!((buf.rpos(), buf.wpos()), positions);

                    // A ring may have overwritten the marked region since, so resync
                    model = buf.to_vec().into();
                }
            }
            Op::Grow(n) => {
                if buf.reserve(*n as usize).is_ok() {
                    assert!(buf.free_size() >= *n as usize);
                    marked = None;
                }
            }
        }
        assert_eq!(buf.data_size(), model.len());
        assert_eq!(buf.to_vec(), model.iter().copied().collect::<Vec<_>>());
        assert!(buf.data_size() + buf.free_size() <= buf.allocated_size());
    }
}

fuzz_target!(|input: Input| {
    let capacity = input.capacity as usize;
    if input.on_demand {
        run(Buffer::on_demand(capacity), &input.ops);
        run(Buffer::circular_on_demand(capacity), &input.ops);
    } else {
        run(Buffer::new(capacity), &input.ops);
        run(Buffer::circular(capacity), &input.ops);
    }
});
