//! The unpacker engine: drives a byte cursor across an analyzed token
//! tree, keeping a value vector and an alignment base per scope.

use crate::error::Error;
use crate::parser::{Kind, Repeat, Token};
use crate::scalar;
use crate::value::Value;
use crate::Ctx;
use log::debug;

struct Scope {
    base: usize,
    values: Vec<Value>,
}

pub(crate) fn unpack(
    tokens: &[Token],
    data: &[u8],
    offset: usize,
    ctx: &Ctx,
) -> Result<(Vec<Value>, usize), Error> {
    if offset > data.len() {
        return Err(Error::data(
            ctx.format,
            "",
            offset,
            "offset beyond the end of the data",
        ));
    }
    let mut pos = offset;
    let values = run_scope(tokens, data, &mut pos, ctx)?;
    Ok((values, pos))
}

fn run_scope(
    tokens: &[Token],
    data: &[u8],
    pos: &mut usize,
    ctx: &Ctx,
) -> Result<Vec<Value>, Error> {
    let mut scope = Scope {
        base: *pos,
        values: Vec::new(),
    };
    for tok in tokens {
        run_token(tok, data, pos, &mut scope, ctx)?;
    }
    Ok(scope.values)
}

fn run_token(
    tok: &Token,
    data: &[u8],
    pos: &mut usize,
    scope: &mut Scope,
    ctx: &Ctx,
) -> Result<(), Error> {
    debug!("unpacking \"{}\" at offset {}", tok, pos);
    let count = resolve(tok, scope, ctx, *pos)?;
    match &tok.kind {
        Kind::Value(s) => {
            for _ in 0..count {
                let raw = take(data, pos, s.width(), tok, ctx)?;
                scope.values.push(scalar::decode(*s, raw, ctx.order));
            }
        }
        Kind::Str => {
            let raw = take(data, pos, count, tok, ctx)?;
            scope.values.push(Value::Bytes(raw.to_vec()));
        }
        Kind::Hex => {
            let raw = take(data, pos, count, tok, ctx)?;
            scope.values.push(Value::Str(hex::encode(raw)));
        }
        Kind::CString => {
            for _ in 0..count {
                let rest = &data[*pos..];
                let len = rest
                    .iter()
                    .position(|&b| b == 0)
                    .ok_or_else(|| Error::data(ctx.format, tok, *pos, "unterminated string"))?;
                scope.values.push(Value::Bytes(rest[..len].to_vec()));
                *pos += len + 1;
            }
        }
        Kind::Pad => {
            take(data, pos, count, tok, ctx)?;
        }
        Kind::Align => {
            if count == 0 {
                return Err(Error::data(ctx.format, tok, *pos, "alignment of zero"));
            }
            let rem = (*pos - scope.base) % count;
            if rem != 0 {
                take(data, pos, count - rem, tok, ctx)?;
            }
        }
        Kind::AlignBase => scope.base = *pos,
        Kind::Rest => {
            scope.values.push(Value::Bytes(data[*pos..].to_vec()));
            *pos = data.len();
        }
        Kind::Group(children) => {
            // every iteration appends to the same child scope
            let mut inner = Scope {
                base: *pos,
                values: Vec::new(),
            };
            for _ in 0..count {
                for t in children {
                    run_token(t, data, pos, &mut inner, ctx)?;
                }
            }
            scope.values.push(Value::List(inner.values));
        }
        Kind::Iter(children) => {
            // every iteration is a scope of its own
            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                items.push(Value::List(run_scope(children, data, pos, ctx)?));
            }
            scope.values.push(Value::List(items));
        }
        Kind::Repeater(children) => {
            let mut items = Vec::new();
            while *pos < data.len() {
                let before = *pos;
                items.push(Value::List(run_scope(children, data, pos, ctx)?));
                if *pos == before {
                    return Err(Error::data(
                        ctx.format,
                        tok,
                        *pos,
                        "iteration consumed no data",
                    ));
                }
            }
            scope.values.push(Value::List(items));
        }
    }
    Ok(())
}

fn resolve(tok: &Token, scope: &Scope, ctx: &Ctx, pos: usize) -> Result<usize, Error> {
    match tok.repeat {
        None => Ok(1),
        Some(Repeat::Count(k)) => Ok(k),
        Some(Repeat::External(n)) => ctx.refdata.get(n).copied().ok_or_else(|| {
            Error::data(
                ctx.format,
                tok,
                pos,
                format!("external reference #{} is not satisfied by the refdata", n),
            )
        }),
        Some(Repeat::Absolute(n)) => counted(scope.values.get(n), tok, ctx, pos),
        Some(Repeat::Relative(n)) => counted(
            scope
                .values
                .len()
                .checked_sub(n)
                .and_then(|i| scope.values.get(i)),
            tok,
            ctx,
            pos,
        ),
    }
}

fn counted(value: Option<&Value>, tok: &Token, ctx: &Ctx, pos: usize) -> Result<usize, Error> {
    let value = value.ok_or_else(|| {
        Error::data(
            ctx.format,
            tok,
            pos,
            "reference to a value that has not been decoded",
        )
    })?;
    value.as_count().ok_or_else(|| {
        Error::data(
            ctx.format,
            tok,
            pos,
            format!("reference to a non-integral value {:?}", value),
        )
    })
}

fn take<'d>(
    data: &'d [u8],
    pos: &mut usize,
    n: usize,
    tok: &Token,
    ctx: &Ctx,
) -> Result<&'d [u8], Error> {
    let end = pos
        .checked_add(n)
        .filter(|&e| e <= data.len())
        .ok_or_else(|| {
            Error::data(
                ctx.format,
                tok,
                *pos,
                format!(
                    "{} bytes needed, {} available",
                    n,
                    data.len().saturating_sub(*pos)
                ),
            )
        })?;
    let raw = &data[*pos..end];
    *pos = end;
    Ok(raw)
}
