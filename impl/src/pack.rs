//! The packer engine: walks the token tree on the write side, consuming
//! a flat argument sequence with the same reference semantics as the
//! unpacker.

use crate::error::Error;
use crate::parser::{Kind, Repeat, Token};
use crate::scalar::{self, EncodeError};
use crate::value::Value;
use crate::Ctx;
use log::debug;

struct Args<'a> {
    values: &'a [Value],
    next: usize,
}

impl<'a> Args<'a> {
    fn new(values: &'a [Value]) -> Self {
        Args { values, next: 0 }
    }

    fn pull(&mut self, tok: &Token, ctx: &Ctx) -> Result<(usize, &'a Value), Error> {
        let idx = self.next;
        let v = self
            .values
            .get(idx)
            .ok_or_else(|| Error::argument(ctx.format, tok, idx, "missing argument"))?;
        self.next += 1;
        Ok((idx, v))
    }

    fn leftovers(&self, tok: Option<&Token>, idx: usize, ctx: &Ctx) -> Result<(), Error> {
        if self.next != self.values.len() {
            let excerpt = tok.map(Token::to_string).unwrap_or_default();
            return Err(Error::argument(
                ctx.format,
                excerpt,
                idx,
                format!("{} values left over", self.values.len() - self.next),
            ));
        }
        Ok(())
    }
}

struct Scope {
    base: usize,
    values: Vec<Value>,
}

pub(crate) fn pack(tokens: &[Token], args: &[Value], ctx: &Ctx) -> Result<Vec<u8>, Error> {
    let mut out = Vec::new();
    let mut args = Args::new(args);
    let mut scope = Scope {
        base: 0,
        values: Vec::new(),
    };
    for tok in tokens {
        run_token(tok, &mut out, &mut scope, &mut args, ctx)?;
    }
    args.leftovers(None, args.next, ctx)?;
    Ok(out)
}

fn run_token(
    tok: &Token,
    out: &mut Vec<u8>,
    scope: &mut Scope,
    args: &mut Args,
    ctx: &Ctx,
) -> Result<(), Error> {
    debug!("packing \"{}\" at offset {}", tok, out.len());
    let count = resolve(tok, scope, ctx, out.len())?;
    match &tok.kind {
        Kind::Value(s) => {
            for _ in 0..count {
                let (idx, v) = args.pull(tok, ctx)?;
                scalar::encode(*s, v, ctx.order, out).map_err(|e| match e {
                    EncodeError::Overflow => Error::Overflow {
                        format: ctx.format.to_owned(),
                        excerpt: tok.to_string(),
                        index: idx,
                    },
                    EncodeError::Mismatch(want) => {
                        Error::argument(ctx.format, tok, idx, format!("expected {}", want))
                    }
                })?;
                scope.values.push(v.clone());
            }
        }
        Kind::Str => {
            let (idx, v) = args.pull(tok, ctx)?;
            let bytes = v
                .as_bytes()
                .ok_or_else(|| Error::argument(ctx.format, tok, idx, "expected a byte string"))?;
            if bytes.len() > count {
                return Err(Error::argument(
                    ctx.format,
                    tok,
                    idx,
                    format!("byte string longer than its {}-byte slot", count),
                ));
            }
            out.extend_from_slice(bytes);
            out.extend(std::iter::repeat(0).take(count - bytes.len()));
            scope.values.push(v.clone());
        }
        Kind::Hex => {
            let (idx, v) = args.pull(tok, ctx)?;
            let text = match v {
                Value::Str(t) => t,
                _ => return Err(Error::argument(ctx.format, tok, idx, "expected a hex string")),
            };
            if text.len() != count * 2 {
                return Err(Error::argument(
                    ctx.format,
                    tok,
                    idx,
                    format!("expected {} hex digits (got {})", count * 2, text.len()),
                ));
            }
            let bytes = hex::decode(text)
                .map_err(|_| Error::argument(ctx.format, tok, idx, "invalid hex digit"))?;
            out.extend_from_slice(&bytes);
            scope.values.push(v.clone());
        }
        Kind::CString => {
            for _ in 0..count {
                let (idx, v) = args.pull(tok, ctx)?;
                let bytes = v.as_bytes().ok_or_else(|| {
                    Error::argument(ctx.format, tok, idx, "expected a byte string")
                })?;
                if bytes.contains(&0) {
                    return Err(Error::argument(ctx.format, tok, idx, "embedded null byte"));
                }
                out.extend_from_slice(bytes);
                out.push(0);
                scope.values.push(v.clone());
            }
        }
        Kind::Pad => out.extend(std::iter::repeat(0).take(count)),
        Kind::Align => {
            if count == 0 {
                return Err(Error::data(ctx.format, tok, out.len(), "alignment of zero"));
            }
            let rem = (out.len() - scope.base) % count;
            if rem != 0 {
                out.extend(std::iter::repeat(0).take(count - rem));
            }
        }
        Kind::AlignBase => scope.base = out.len(),
        Kind::Rest => {
            let (idx, v) = args.pull(tok, ctx)?;
            let bytes = v
                .as_bytes()
                .ok_or_else(|| Error::argument(ctx.format, tok, idx, "expected a byte string"))?;
            out.extend_from_slice(bytes);
            scope.values.push(v.clone());
        }
        Kind::Group(children) => {
            // one flat sequence feeds all iterations of the child scope
            let (idx, v) = args.pull(tok, ctx)?;
            let list = v
                .as_list()
                .ok_or_else(|| Error::argument(ctx.format, tok, idx, "expected a sequence"))?;
            let mut inner_args = Args::new(list);
            let mut inner = Scope {
                base: out.len(),
                values: Vec::new(),
            };
            for _ in 0..count {
                for t in children {
                    run_token(t, out, &mut inner, &mut inner_args, ctx)?;
                }
            }
            inner_args.leftovers(Some(tok), idx, ctx)?;
            scope.values.push(v.clone());
        }
        Kind::Iter(children) => {
            let (idx, v) = args.pull(tok, ctx)?;
            let list = v
                .as_list()
                .ok_or_else(|| Error::argument(ctx.format, tok, idx, "expected a sequence"))?;
            if list.len() != count {
                return Err(Error::argument(
                    ctx.format,
                    tok,
                    idx,
                    format!("expected {} sub-sequences (got {})", count, list.len()),
                ));
            }
            for sub in list {
                pack_iteration(children, sub, out, tok, idx, ctx)?;
            }
            scope.values.push(v.clone());
        }
        Kind::Repeater(children) => {
            let (idx, v) = args.pull(tok, ctx)?;
            let list = v
                .as_list()
                .ok_or_else(|| Error::argument(ctx.format, tok, idx, "expected a sequence"))?;
            for sub in list {
                pack_iteration(children, sub, out, tok, idx, ctx)?;
            }
            scope.values.push(v.clone());
        }
    }
    Ok(())
}

fn pack_iteration(
    children: &[Token],
    sub: &Value,
    out: &mut Vec<u8>,
    tok: &Token,
    idx: usize,
    ctx: &Ctx,
) -> Result<(), Error> {
    let items = sub.as_list().ok_or_else(|| {
        Error::argument(ctx.format, tok, idx, "expected a sequence of sequences")
    })?;
    let mut args = Args::new(items);
    let mut scope = Scope {
        base: out.len(),
        values: Vec::new(),
    };
    for t in children {
        run_token(t, out, &mut scope, &mut args, ctx)?;
    }
    args.leftovers(Some(tok), idx, ctx)
}

fn resolve(tok: &Token, scope: &Scope, ctx: &Ctx, offset: usize) -> Result<usize, Error> {
    match tok.repeat {
        None => Ok(1),
        Some(Repeat::Count(k)) => Ok(k),
        Some(Repeat::External(n)) => ctx.refdata.get(n).copied().ok_or_else(|| {
            Error::data(
                ctx.format,
                tok,
                offset,
                format!("external reference #{} is not satisfied by the refdata", n),
            )
        }),
        Some(Repeat::Absolute(n)) => counted(scope.values.get(n), tok, ctx, offset),
        Some(Repeat::Relative(n)) => counted(
            scope
                .values
                .len()
                .checked_sub(n)
                .and_then(|i| scope.values.get(i)),
            tok,
            ctx,
            offset,
        ),
    }
}

fn counted(value: Option<&Value>, tok: &Token, ctx: &Ctx, offset: usize) -> Result<usize, Error> {
    let value = value.ok_or_else(|| {
        Error::data(
            ctx.format,
            tok,
            offset,
            "reference to a value that has not been packed",
        )
    })?;
    value.as_count().ok_or_else(|| {
        Error::data(
            ctx.format,
            tok,
            offset,
            format!("reference to a non-integral value {:?}", value),
        )
    })
}
