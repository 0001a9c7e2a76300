use bytes::Bytes;
use conduit_buffer::{
    impl_codec, Buffer, CircularBuffer, Decode, Encode, EncodeSize, Error, ErrorCode, FixedSize,
    Limits, Mode, Read, Write,
};
use conduit_macros::test_traced;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::collections::{BTreeMap, HashMap, LinkedList, VecDeque};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq)]
struct Player {
    id: Uuid,
    name: String,
    level: u16,
    online: bool,
    position: [f32; 3],
    inventory: BTreeMap<u32, u16>,
}

impl_codec!(Player {
    id,
    name,
    level,
    online,
    position,
    inventory,
});

#[derive(Clone, Debug, PartialEq)]
struct Roster {
    guild: Option<String>,
    members: Vec<Player>,
    ranks: HashMap<String, i8>,
    last_error: ErrorCode,
}

impl_codec!(Roster {
    guild,
    members,
    ranks,
    last_error
});

fn player(seed: u64) -> Player {
    let mut rng = StdRng::seed_from_u64(seed);
    Player {
        id: Uuid::from_u128(rng.gen()),
        name: format!("player-{seed}"),
        level: rng.gen(),
        online: rng.gen(),
        position: [rng.gen(), rng.gen(), rng.gen()],
        inventory: (0..rng.gen_range(0..8)).map(|i| (i, rng.gen())).collect(),
    }
}

fn roster() -> Roster {
    Roster {
        guild: Some("knights".into()),
        members: (0..5).map(player).collect(),
        ranks: [("leader".to_string(), 1i8), ("member".to_string(), -1)]
            .into_iter()
            .collect(),
        last_error: ErrorCode::posix(110),
    }
}

/// Writes into a buffer sized exactly by its encoded size and reads the value back.
fn assert_exact<T>(value: &T)
where
    T: conduit_buffer::Codec + PartialEq + std::fmt::Debug,
{
    let size = Buffer::encoded_size(value);
    let mut buf = Buffer::new(size);
    buf.write(value).unwrap();
    assert_eq!(buf.data_size(), size);
    assert_eq!(buf.free_size(), 0);
    assert_eq!(&buf.read::<T>().unwrap(), value);
    assert!(buf.is_empty());
}

#[test]
fn test_scenario_mixed_values() {
    let mut buf = Buffer::new(128);
    let expected = Buffer::encoded_size(&1234i32)
        + Buffer::encoded_size(&56.0f32)
        + Buffer::encoded_size("hello");
    buf.write(&1234i32).unwrap();
    buf.write(&56.0f32).unwrap();
    buf.write(&"hello".to_string()).unwrap();
    assert_eq!(buf.data_size(), expected);

    assert_eq!(buf.read::<i32>().unwrap(), 1234);
    assert_eq!(buf.read::<f32>().unwrap(), 56.0);
    assert_eq!(buf.read::<String>().unwrap(), "hello");
}

#[test]
fn test_scenario_circular_int32() {
    let mut ring = CircularBuffer::circular(12);
    for value in [1i32, 2, 3] {
        ring.write(&value).unwrap();
    }
    assert_eq!(ring.free_size(), 0);
    for expected in [1i32, 2, 3] {
        assert_eq!(ring.read::<i32>().unwrap(), expected);
    }
    assert_eq!(ring.free_size(), 12);
}

#[test]
fn test_encoded_size_matches_write() {
    assert_exact(&0u8);
    assert_exact(&-5i64);
    assert_exact(&u128::MAX);
    assert_exact(&true);
    assert_exact(&String::new());
    assert_exact(&"x".repeat(300));
    assert_exact(&Uuid::from_u128(42));
    assert_exact(&vec![1u16, 2, 3]);
    assert_exact(&Vec::<String>::new());
    assert_exact(&VecDeque::from([1i8, -1]));
    assert_exact(&LinkedList::from([0.5f64]));
    assert_exact(&[7u32; 4]);
    assert_exact(&[Some(1u8), None]);
    assert_exact(&Bytes::from_static(b"raw"));
    assert_exact(&(1u8, "two".to_string(), 3.0f64));
    assert_exact(&ErrorCode::generic(9));
    assert_exact(&player(7));
    assert_exact(&roster());
}

fn assert_capacity_cycle<T>(capacity: usize, value: T)
where
    T: conduit_buffer::Codec + Copy + PartialEq + std::fmt::Debug,
{
    let stride = Buffer::encoded_size(&value);
    let mut ring = Buffer::circular(capacity);

    // Several cycles so the cursors cross the end of storage at different offsets
    for _ in 0..5 {
        assert_eq!(ring.free_size(), capacity);
        let mut written = 0;
        while ring.free_size() >= stride {
            ring.write(&value).unwrap();
            written += 1;
        }
        assert_eq!(written, capacity / stride);
        assert_eq!(ring.free_size(), capacity % stride);
        assert!(matches!(
            ring.write(&value),
            Err(Error::InsufficientSpace { .. })
        ));
        for _ in 0..written {
            assert_eq!(ring.read::<T>().unwrap(), value);
        }
        assert_eq!(ring.free_size(), capacity);
    }
}

#[test]
fn test_circular_capacity() {
    // Capacity divisible by the element size
    assert_capacity_cycle(12, 0x0102_0304i32);
    assert_capacity_cycle(64, 0x0102_0304_0506_0708u64);

    // Capacity not divisible by the element size (elements straddle the end)
    assert_capacity_cycle(13, 0x0102_0304i32);
    assert_capacity_cycle(30, 0x0102_0304_0506_0708u64);
    assert_capacity_cycle(7, (1u16, true));
}

#[test]
fn test_mark_reset_restores_cursors() {
    let mut rng = StdRng::seed_from_u64(1);
    let mut ring = Buffer::circular(32);
    for _ in 0..200 {
        let fill = rng.gen_range(0..=ring.free_size());
        ring.put_slice(&vec![0xab; fill]).unwrap();
        let drain = rng.gen_range(0..=ring.data_size());
        ring.rskip(drain).unwrap();

        ring.mark();
        let (read, write) = (ring.rpos(), ring.wpos());
        let _ = ring.write(&rng.gen::<u32>());
        let _ = ring.read::<u16>();
        ring.reset().unwrap();
        assert_eq!((ring.rpos(), ring.wpos()), (read, write));
    }
}

#[test]
fn test_reset_past_consumed_data_is_rejected() {
    let mut buf = Buffer::new(8);
    buf.mark_write();
    buf.put_slice(&[1, 2, 3, 4]).unwrap();
    buf.rskip(4).unwrap();

    // Rewinding the write cursor behind the read cursor would corrupt the sizes
    assert!(matches!(
        buf.reset_write(),
        Err(Error::InvalidPosition { position: 0, limit: 8 })
    ));
    assert_eq!((buf.rpos(), buf.wpos()), (4, 4));
    assert_eq!(buf.data_size(), 0);
    assert_eq!(buf.free_size(), 4);

    // The buffer keeps working afterwards
    buf.write(&7u16).unwrap();
    assert_eq!(buf.read::<u16>().unwrap(), 7);
    buf.mark();
    buf.write(&9u8).unwrap();
    buf.reset().unwrap();
    assert!(buf.is_empty());
}

fn assert_crunch_idempotent<M: Mode>(buf: &mut Buffer<'_, M>) {
    let before = buf.to_vec();
    buf.crunch().unwrap();
    let once = (buf.rpos(), buf.wpos(), buf.to_vec());
    buf.crunch().unwrap();
    assert_eq!((buf.rpos(), buf.wpos(), buf.to_vec()), once);
    assert_eq!(once.2, before);
    assert_eq!(buf.rpos(), 0);
}

#[test]
fn test_crunch_idempotent() {
    let mut rng = StdRng::seed_from_u64(2);
    for _ in 0..100 {
        let capacity = rng.gen_range(1..64);
        let mut plain = Buffer::new(capacity);
        let mut ring = Buffer::circular(capacity);
        for _ in 0..4 {
            let len = rng.gen_range(0..=ring.free_size());
            let bytes: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
            ring.put_slice(&bytes).unwrap();
            let drain = rng.gen_range(0..=ring.data_size());
            ring.rskip(drain).unwrap();
        }
        let fill = rng.gen_range(0..=capacity);
        plain.put_slice(&vec![1; fill]).unwrap();
        plain.rskip(rng.gen_range(0..=fill)).unwrap();

        assert_crunch_idempotent(&mut plain);
        assert_crunch_idempotent(&mut ring);
    }
}

#[test]
fn test_plain_and_circular_agree() {
    let mut rng = StdRng::seed_from_u64(3);
    let mut ring = Buffer::circular(97);
    for round in 0..500 {
        // Shift both cursors so values start at varying offsets
        let shift = rng.gen_range(0..=16);
        ring.wskip(shift).unwrap();
        ring.rskip(shift).unwrap();

        let value = player(round);
        ring.write(&value).unwrap();

        // The same bytes decode identically from a linear copy
        let copy = ring.to_vec();
        let mut linear = Buffer::wrap_read_only(&copy);
        assert_eq!(linear.read::<Player>().unwrap(), value);
        assert_eq!(ring.read::<Player>().unwrap(), value);
        assert!(ring.is_empty());
    }
}

#[test]
fn test_truncated_input_is_retryable() {
    let encoded = roster().encode();
    for cut in [0, 1, 4, encoded.len() / 2, encoded.len() - 1] {
        let mut buf = Buffer::wrap_read_only(&encoded[..cut]);
        let err = buf.read::<Roster>().unwrap_err();
        assert!(!err.is_malformed(), "cut {cut}: {err}");
        assert_eq!(buf.rpos(), 0);
    }
    assert_eq!(Roster::decode(&encoded).unwrap(), roster());
}

#[test]
fn test_malformed_input_is_flagged() {
    // String longer than the limit
    let oversized = "x".repeat(9000).encode();
    assert!(String::decode(&oversized).unwrap_err().is_malformed());

    // Vector count above the limit
    let mut buf = Buffer::new(4);
    buf.write(&70_000u32).unwrap();
    assert!(Vec::<u8>::decode(&buf.into_vec()).unwrap_err().is_malformed());

    // Trailing bytes
    let mut encoded = 5u32.encode().to_vec();
    encoded.push(0);
    assert_eq!(u32::decode(&encoded), Err(Error::ExtraData(1)));

    // Custom limits travel with the buffer
    let encoded = vec![1u8; 10].encode();
    let mut buf = Buffer::from_bytes(encoded).with_limits(Limits::new(8192, 5));
    assert_eq!(buf.read::<Vec<u8>>(), Err(Error::LengthExceeded(10, 5)));
}

#[test_traced]
fn test_on_demand_message_stream() {
    let mut buf = Buffer::on_demand(0);
    let players: Vec<Player> = (0..50).map(player).collect();
    for p in &players {
        buf.write(p).unwrap();
    }
    assert!(buf.allocated_size().is_power_of_two());
    assert_eq!(
        buf.data_size(),
        players.iter().map(EncodeSize::encode_size).sum::<usize>()
    );
    for p in &players {
        assert_eq!(&buf.read::<Player>().unwrap(), p);
    }
}

/// A hand-written codec: an RGB color packed into three bytes.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Rgb(u8, u8, u8);

impl Write for Rgb {
    fn write_to<M: Mode>(&self, buf: &mut Buffer<'_, M>) -> Result<(), Error> {
        buf.put_slice(&[self.0, self.1, self.2])
    }
}

impl FixedSize for Rgb {
    const SIZE: usize = 3;
}

impl EncodeSize for Rgb {
    fn encode_size(&self) -> usize {
        Self::SIZE
    }
}

impl Read for Rgb {
    fn read_cfg<M: Mode>(buf: &mut Buffer<'_, M>, _: &Limits) -> Result<Self, Error> {
        let [r, g, b] = buf.get_array()?;
        Ok(Self(r, g, b))
    }
}

#[test]
fn test_manual_codec_with_traits_in_scope() {
    let colors = [Rgb(255, 0, 0), Rgb(0, 128, 255)];

    // Owned buffers still dispatch to Buffer::write with the codec traits imported
    let mut buf = Buffer::new(Buffer::encoded_size_of::<Rgb>() * colors.len());
    for color in &colors {
        buf.write(color).unwrap();
    }
    assert_eq!(buf.chunk(), &[255, 0, 0, 0, 128, 255]);
    assert_eq!(buf.read::<Rgb>().unwrap(), colors[0]);

    // Encoding through the extension trait and nesting a buffer
    assert_eq!(colors[1].encode().as_ref(), &[0, 128, 255]);
    let mut outer = Buffer::new(16);
    outer.write(&buf).unwrap();
    assert_eq!(outer.read::<Vec<u8>>().unwrap(), vec![0, 128, 255]);
}

#[test]
fn test_fluent_operators() {
    let mut buf = Buffer::on_demand(8);
    buf.put(&1u8)
        .unwrap()
        .put("two")
        .unwrap()
        .put(&[3u16, 4])
        .unwrap();

    let (mut one, mut two, mut rest) = (0u8, String::new(), [0u16; 2]);
    buf.take(&mut one)
        .unwrap()
        .take(&mut two)
        .unwrap()
        .take(&mut rest)
        .unwrap();
    assert_eq!((one, two.as_str(), rest), (1, "two", [3, 4]));
}

#[test]
fn test_nested_buffers() {
    let mut payload = Buffer::new(16);
    payload.write(&player(1).level).unwrap();
    payload.write(&99u64).unwrap();

    let mut frame = Buffer::on_demand(4);
    frame.write(&0xCAFEu16).unwrap();
    frame.write(&payload).unwrap();

    let mut frame = Buffer::from_bytes(Bytes::from(frame.into_vec()));
    assert_eq!(frame.read::<u16>().unwrap(), 0xCAFE);
    let mut inner: Buffer = frame.read().unwrap();
    assert_eq!(inner.read::<u16>().unwrap(), player(1).level);
    assert_eq!(inner.read::<u64>().unwrap(), 99);
}

#[test]
fn test_context_keeps_parent_alive() {
    let parent = Bytes::from(vec![1u8, 2, 3, 4, 5, 6]);
    let mut parent_buf = Buffer::from_bytes(parent.clone());
    let mut child = parent_buf.slice(4).unwrap();
    child.set_context(parent);
    drop(parent_buf);
    assert_eq!(child.read::<u32>().unwrap(), u32::from_le_bytes([1, 2, 3, 4]));
    assert_eq!(child.context::<Bytes>().map(|b| b.len()), Some(6));
}
