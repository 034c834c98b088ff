#![allow(dead_code)]

use rawpack::Value;

pub fn uint(v: u64) -> Value {
    Value::Uint(v)
}

pub fn int(v: i64) -> Value {
    Value::Int(v)
}

pub fn float(v: f64) -> Value {
    Value::Float(v)
}

pub fn boolean(v: bool) -> Value {
    Value::Bool(v)
}

pub fn chr(c: char) -> Value {
    Value::Char(c)
}

pub fn bytes(v: &[u8]) -> Value {
    Value::Bytes(v.to_vec())
}

pub fn text(v: &str) -> Value {
    Value::Str(v.to_owned())
}

pub fn list(v: Vec<Value>) -> Value {
    Value::List(v)
}
