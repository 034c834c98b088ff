mod common;

use common::*;
use rawpack::Struct;

#[test]
fn concatenation_decodes_left_then_right() {
    let a = Struct::new("<H").unwrap();
    let b = Struct::new("2s").unwrap();
    let c = a.concat(&b).unwrap();
    let values = c.unpack(&[0x01, 0x00, b'h', b'i'], &[]).unwrap();
    assert_eq!(values, vec![uint(1), bytes(b"hi")]);
}

#[test]
fn concatenation_shifts_absolute_references() {
    let a = Struct::new("3B").unwrap();
    let b = Struct::new("B /0s").unwrap();
    let c = a.concat(&b).unwrap();
    assert_eq!(c.format(), "3B B /3s");
    let data = [0x01, 0x02, 0x03, 0x04, b's', b'p', b'a', b'm'];
    let values = c.unpack(&data, &[]).unwrap();
    assert_eq!(
        values,
        vec![uint(1), uint(2), uint(3), uint(4), bytes(b"spam")]
    );
}

#[test]
fn nested_references_are_left_alone() {
    let a = Struct::new("B").unwrap();
    let b = Struct::new("2[B /0s]").unwrap();
    let c = a.concat(&b).unwrap();
    // the /0 inside the iterator still points at the iteration's own scope
    assert_eq!(c.format(), "B 2[B /0s]");
    let data = [0x09, 0x01, b'x', 0x02, b'y', b'z'];
    let values = c.unpack(&data, &[]).unwrap();
    assert_eq!(
        values,
        vec![
            uint(9),
            list(vec![
                list(vec![uint(1), bytes(b"x")]),
                list(vec![uint(2), bytes(b"yz")]),
            ]),
        ]
    );
}

#[test]
fn concatenation_shifts_external_references() {
    let a = Struct::new("#0B").unwrap();
    let b = Struct::new("#0s").unwrap();
    let c = a.concat(&b).unwrap();
    assert_eq!(c.format(), "#0B #1s");
    assert_eq!(c.refdata_len(), 2);
    let values = c.unpack(&[0x01, 0x02, b'a', b'b', b'c'], &[2, 3]).unwrap();
    assert_eq!(values, vec![uint(1), uint(2), bytes(b"abc")]);
}

#[test]
fn repetition_matches_concatenation() {
    let st = Struct::new("3B /0s").unwrap();
    assert_eq!(st.repeat(2).unwrap(), st.concat(&st).unwrap());
    assert_eq!(st.repeat(1).unwrap().format(), st.format());
    assert_eq!(st.repeat(0).unwrap().calcsize(&[]).unwrap(), 0);
}

#[test]
fn repetition_renumbers_into_each_copy() {
    let st = Struct::new("B /0s").unwrap().repeat(2).unwrap();
    assert_eq!(st.format(), "B /0s B /2s");
    let data = [0x01, b'a', 0x03, b'x', b'y', b'z'];
    let values = st.unpack(&data, &[]).unwrap();
    assert_eq!(
        values,
        vec![uint(1), bytes(b"a"), uint(3), bytes(b"xyz")]
    );
}

#[test]
fn repetition_shifts_externals_per_copy() {
    let st = Struct::new("#0B").unwrap().repeat(3).unwrap();
    assert_eq!(st.format(), "#0B #1B #2B");
    assert_eq!(st.refdata_len(), 3);
    let values = st.unpack(&[1, 2, 3], &[1, 0, 2]).unwrap();
    assert_eq!(values, vec![uint(1), uint(2), uint(3)]);
}

#[test]
fn combined_byte_order_is_preserved() {
    let a = Struct::new(">H").unwrap();
    let b = Struct::new("H").unwrap();
    assert_eq!(
        a.concat(&b).unwrap().pack(&[uint(1), uint(2)], &[]).unwrap(),
        [0x00, 0x01, 0x00, 0x02]
    );
    assert_eq!(
        b.concat(&a).unwrap().pack(&[uint(1), uint(2)], &[]).unwrap(),
        [0x00, 0x01, 0x00, 0x02]
    );
    let c = Struct::new("<H").unwrap();
    assert!(a.concat(&c).is_err());
}

#[test]
fn invalid_combinations() {
    let rest = Struct::new("B $").unwrap();
    let tail = Struct::new("B").unwrap();
    assert!(rest.concat(&tail).is_err());
    assert!(rest.repeat(2).is_err());

    let repeater = Struct::new("{B}").unwrap();
    assert!(repeater.concat(&tail).is_err());

    // a dynamically counted scalar leaves no well-defined shift for
    // absolute references appended after it
    let dynamic = Struct::new("B /0B").unwrap();
    assert!(dynamic.concat(&Struct::new("B /0s").unwrap()).is_err());
    assert!(dynamic.repeat(2).is_err());
    // without absolute references on the right there is nothing to shift
    assert!(dynamic.concat(&tail).is_ok());

    // the right-hand side may be anything countable
    assert!(tail.concat(&rest).is_ok());
}

#[test]
fn display_renders_canonically() {
    let st = Struct::new("  4B   3s 3s ").unwrap();
    assert_eq!(st.to_string(), "  4B   3s 3s ");
    let combined = Struct::new("4B").unwrap().concat(&Struct::new("3s").unwrap()).unwrap();
    assert_eq!(combined.to_string(), "4B 3s");
}

#[test]
fn combination_keeps_values_round_tripping(){
    let a = Struct::new("B /0s").unwrap();
    let c = a.repeat(3).unwrap();
    let args = vec![
        uint(1),
        bytes(b"x"),
        uint(2),
        bytes(b"ab"),
        uint(0),
        bytes(b""),
    ];
    let packed = c.pack(&args, &[]).unwrap();
    assert_eq!(c.unpack(&packed, &[]).unwrap(), args);
}
