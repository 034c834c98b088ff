mod common;

use common::*;
use rawpack::{calcsize, iter_unpack, pack, pack_into, unpack, Error, Options, Struct, Value};
use std::io::{Cursor, Seek, SeekFrom};

#[test]
fn sizes() {
    assert_eq!(calcsize("", &[]).unwrap(), 0);
    assert_eq!(calcsize("4B 3s 3s", &[]).unwrap(), 10);
    assert_eq!(calcsize("<2h 3x f", &[]).unwrap(), 11);
    assert_eq!(calcsize("b B h H u U i I q Q", &[]).unwrap(), 36);
    assert_eq!(calcsize("e f d F", &[]).unwrap(), 30);
    assert_eq!(calcsize("2(B 3s)", &[]).unwrap(), 8);
    assert_eq!(calcsize("3[H B]", &[]).unwrap(), 9);
    assert_eq!(calcsize("#0I 4s", &[3]).unwrap(), 16);
    assert_eq!(calcsize("B 4a B", &[]).unwrap(), 5);
    assert_eq!(calcsize("QB| BB 4a", &[]).unwrap(), 13);
}

#[test]
fn indeterminate_sizes() {
    for fmt in ["n", "B $", "4s {B}", "B /0s", "B /p1s", "#0I"] {
        assert!(matches!(
            calcsize(fmt, &[]),
            Err(Error::Format { .. })
        ));
    }
}

#[test]
fn size_determinism() {
    let cases: Vec<(&str, Vec<Value>, Vec<usize>)> = vec![
        ("<2H B", vec![uint(1), uint(2), uint(3)], vec![]),
        ("B 4a 2s", vec![uint(9), bytes(b"ok")], vec![]),
        ("#0B 3s", vec![uint(1), uint(2), bytes(b"abc")], vec![2]),
    ];
    for (fmt, args, refdata) in cases {
        let size = calcsize(fmt, &refdata).unwrap();
        let packed = pack(fmt, &args, &refdata).unwrap();
        assert_eq!(packed.len(), size, "packed size mismatch for {:?}", fmt);
        let st = Struct::new(fmt).unwrap();
        let (_, end) = st.unpack_from(&packed, 0, &refdata).unwrap();
        assert_eq!(end, size, "consumed size mismatch for {:?}", fmt);
    }
}

#[test]
fn byte_orders() {
    assert_eq!(pack(">H", &[uint(0x0102)], &[]).unwrap(), [0x01, 0x02]);
    assert_eq!(pack("<H", &[uint(0x0102)], &[]).unwrap(), [0x02, 0x01]);
    assert_eq!(pack("!H", &[uint(0x0102)], &[]).unwrap(), [0x01, 0x02]);
    let system = pack("H", &[uint(0x0102)], &[]).unwrap();
    assert_eq!(pack("=H", &[uint(0x0102)], &[]).unwrap(), system);
    assert_eq!(pack("@H", &[uint(0x0102)], &[]).unwrap(), system);
}

#[test]
fn configured_order_applies_without_marker() {
    let opts = Options {
        unsafe_references: false,
        byte_order: Some(rawpack::ByteOrder::BigEndian),
    };
    let st = Struct::with_options("H", opts).unwrap();
    assert_eq!(st.pack(&[uint(0x0102)], &[]).unwrap(), [0x01, 0x02]);
    // a marker in the format always wins
    let st = Struct::with_options("<H", opts).unwrap();
    assert_eq!(st.pack(&[uint(0x0102)], &[]).unwrap(), [0x02, 0x01]);
}

#[test]
fn format_errors() {
    for fmt in ["v", "3", "(B", "2{B}", "$B", "B {B} B", "/0B", "2s /0B", "B n /0s"] {
        assert!(
            matches!(Struct::new(fmt), Err(Error::Format { .. })),
            "expected a format error for {:?}",
            fmt
        );
    }
}

#[test]
fn data_errors() {
    assert!(matches!(
        unpack("4B", &[1, 2], &[]),
        Err(Error::Data { offset: 2, .. })
    ));
    assert!(matches!(
        unpack("n", b"no terminator", &[]),
        Err(Error::Data { .. })
    ));
    assert!(matches!(
        unpack("#0B", &[1], &[]),
        Err(Error::Data { .. })
    ));
}

#[test]
fn argument_errors() {
    assert!(matches!(
        pack("2B", &[uint(1)], &[]),
        Err(Error::Argument { index: 1, .. })
    ));
    assert!(matches!(
        pack("B", &[uint(1), uint(2)], &[]),
        Err(Error::Argument { .. })
    ));
    assert!(matches!(
        pack("B", &[bytes(b"zz")], &[]),
        Err(Error::Argument { index: 0, .. })
    ));
    assert!(matches!(
        pack("2[B]", &[list(vec![list(vec![uint(1)])])], &[]),
        Err(Error::Argument { .. })
    ));
    assert!(matches!(
        pack("(2B)", &[list(vec![uint(1), uint(2), uint(3)])], &[]),
        Err(Error::Argument { .. })
    ));
}

#[test]
fn overflow_errors() {
    assert!(matches!(
        pack("B", &[uint(256)], &[]),
        Err(Error::Overflow { index: 0, .. })
    ));
    assert!(matches!(
        pack("b", &[int(-200)], &[]),
        Err(Error::Overflow { .. })
    ));
    assert!(matches!(
        pack("e", &[float(1e6)], &[]),
        Err(Error::Overflow { .. })
    ));
}

#[test]
fn errors_carry_context() {
    match unpack("2B 4s", &[1, 2, 3], &[]) {
        Err(Error::Data {
            format,
            excerpt,
            offset,
            ..
        }) => {
            assert_eq!(format, "2B 4s");
            assert_eq!(excerpt, "4s");
            assert_eq!(offset, 2);
        }
        other => panic!("unexpected {:?}", other),
    }
    match pack("2B", &[uint(1), uint(300)], &[]) {
        Err(Error::Overflow {
            format,
            excerpt,
            index,
        }) => {
            assert_eq!(format, "2B");
            assert_eq!(excerpt, "2B");
            assert_eq!(index, 1);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn pack_into_writes_in_place() {
    let mut buffer = [0xffu8; 8];
    pack_into("<H", &mut buffer, 2, &[uint(0x0102)], &[]).unwrap();
    assert_eq!(buffer, [0xff, 0xff, 0x02, 0x01, 0xff, 0xff, 0xff, 0xff]);
}

#[test]
fn pack_into_never_grows_the_buffer() {
    let mut buffer = [0u8; 4];
    assert!(matches!(
        pack_into("I", &mut buffer, 2, &[uint(1)], &[]),
        Err(Error::Argument { .. })
    ));
    // a failed pack leaves the buffer untouched
    assert_eq!(buffer, [0u8; 4]);
}

#[test]
fn pack_and_unpack_files() {
    let st = Struct::new("<H 2s").unwrap();
    let mut cursor = Cursor::new(Vec::new());
    st.pack_file(&mut cursor, &[uint(7), bytes(b"ab")], None, &[])
        .unwrap();
    st.pack_file(&mut cursor, &[uint(8), bytes(b"cd")], Some(4), &[])
        .unwrap();
    assert_eq!(cursor.get_ref().len(), 8);

    cursor.seek(SeekFrom::Start(0)).unwrap();
    assert_eq!(
        st.unpack_file(&mut cursor, &[]).unwrap(),
        vec![uint(7), bytes(b"ab")]
    );
    // the reader is left at the first unconsumed byte
    assert_eq!(cursor.stream_position().unwrap(), 4);
    assert_eq!(
        st.unpack_file(&mut cursor, &[]).unwrap(),
        vec![uint(8), bytes(b"cd")]
    );
}

#[test]
fn iterative_unpacking() {
    let data = [0x01, 0x00, 0x02, 0x00, 0x03, 0x00];
    let records: Vec<_> = iter_unpack("<H", &data, &[])
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(
        records,
        vec![vec![uint(1)], vec![uint(2)], vec![uint(3)]]
    );

    let st = Struct::new("<H").unwrap();
    let iter = st.iter_unpack(&data, &[]).unwrap();
    assert_eq!(iter.len(), 3);

    assert!(iter_unpack("<H", &data[..5], &[]).is_err());
    assert!(iter_unpack("", &data, &[]).is_err());
    assert!(iter_unpack("n", &data, &[]).is_err());
}

#[test]
fn refdata_length_is_reported() {
    assert_eq!(Struct::new("B").unwrap().refdata_len(), 0);
    assert_eq!(Struct::new("#0B #3s").unwrap().refdata_len(), 4);
    assert_eq!(Struct::new("[#1B]").unwrap().refdata_len(), 2);
}

#[test]
fn sibling_scopes_stay_independent() {
    // replacing a group's interior with different contents of the same
    // encoded length leaves the siblings untouched
    let data = [0x09, 0x01, 0x02, 0x03, 0x04, 0x07];
    let a = unpack("B (4B) B", &data, &[]).unwrap();
    let b = unpack("B (2H) B", &data, &[]).unwrap();
    assert_eq!(a[0], b[0]);
    assert_eq!(a[2], b[2]);
    assert_eq!(a[0], uint(9));
    assert_eq!(a[2], uint(7));
}
