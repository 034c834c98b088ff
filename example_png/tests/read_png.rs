fn fixture() -> Vec<u8> {
    let mut png = example_png::SIGNATURE.to_vec();
    // IHDR: 13 data bytes for a 1x1 grayscale image
    png.extend_from_slice(&13u32.to_be_bytes());
    png.extend_from_slice(b"IHDR");
    png.extend_from_slice(&1u32.to_be_bytes());
    png.extend_from_slice(&1u32.to_be_bytes());
    png.extend_from_slice(&[8, 0, 0, 0, 0]);
    png.extend_from_slice(&0x9245_3b1bu32.to_be_bytes());
    // IEND: no data
    png.extend_from_slice(&0u32.to_be_bytes());
    png.extend_from_slice(b"IEND");
    png.extend_from_slice(&0xae42_6082u32.to_be_bytes());
    png
}

#[test]
fn read_chunks() {
    let png = fixture();
    let chunks = example_png::read(&png).unwrap();
    assert_eq!(chunks.len(), 2);
    assert_eq!(&chunks[0].kind, b"IHDR");
    assert_eq!(chunks[0].data.len(), 13);
    assert_eq!(&chunks[1].kind, b"IEND");
    assert!(chunks[1].data.is_empty());
    assert_eq!(chunks[1].crc, 0xae42_6082);
}

#[test]
fn round_trip() {
    let png = fixture();
    let chunks = example_png::read(&png).unwrap();
    assert_eq!(example_png::write(&chunks).unwrap(), png);
}

#[test]
#[should_panic(expected = "not a png")]
fn rejects_other_streams() {
    // a well-formed chunk stream behind the wrong signature
    let mut data = b"GIF89a\x00\x00".to_vec();
    data.extend_from_slice(&0u32.to_be_bytes());
    data.extend_from_slice(b"AAAA");
    data.extend_from_slice(&0u32.to_be_bytes());
    example_png::read(&data).unwrap();
}
