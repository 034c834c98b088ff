//! Reading and writing PNG-style chunk streams with `rawpack`.
//!
//! A PNG file is an eight-byte signature followed by chunks until the data
//! ends; every chunk is a big-endian length, a four-byte type, that many
//! data bytes and a checksum. One format string describes the whole file.

use rawpack::{Struct, Value};

const FORMAT: &str = ">8s {I 4s /0s I}";

pub const SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];

#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub kind: [u8; 4],
    pub data: Vec<u8>,
    pub crc: u32,
}

pub fn read(data: &[u8]) -> Result<Vec<Chunk>, rawpack::Error> {
    let mut values = Struct::new(FORMAT)?.unpack(data, &[])?;
    let chunks = match values.pop() {
        Some(Value::List(chunks)) => chunks,
        _ => unreachable!(),
    };
    match values.pop() {
        Some(Value::Bytes(sig)) if sig == SIGNATURE => {}
        _ => panic!("oh noes, this is not a png stream!"),
    }
    Ok(chunks.into_iter().map(chunk).collect())
}

pub fn write(chunks: &[Chunk]) -> Result<Vec<u8>, rawpack::Error> {
    let items = chunks
        .iter()
        .map(|c| {
            Value::List(vec![
                Value::Uint(c.data.len() as u64),
                Value::Bytes(c.kind.to_vec()),
                Value::Bytes(c.data.clone()),
                Value::Uint(c.crc as u64),
            ])
        })
        .collect();
    Struct::new(FORMAT)?.pack(
        &[Value::Bytes(SIGNATURE.to_vec()), Value::List(items)],
        &[],
    )
}

fn chunk(value: Value) -> Chunk {
    let items = match value {
        Value::List(items) => items,
        _ => unreachable!(),
    };
    let mut items = items.into_iter();
    // the length was only needed to delimit the data
    let _length = items.next();
    let kind = match items.next() {
        Some(Value::Bytes(kind)) => {
            let mut k = [0; 4];
            k.copy_from_slice(&kind);
            k
        }
        _ => unreachable!(),
    };
    let data = match items.next() {
        Some(Value::Bytes(data)) => data,
        _ => unreachable!(),
    };
    let crc = match items.next() {
        Some(Value::Uint(crc)) => crc as u32,
        _ => unreachable!(),
    };
    Chunk { kind, data, crc }
}
