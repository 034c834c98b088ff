// MIT License
//
// Copyright (c) the rawpack developers
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

//! `rawpack` reads and writes packed binary data driven by a compact format
//! language. It is a brainchild of
//! [Python's struct-module](https://docs.python.org/3/library/struct.html),
//! extended with variable-length elements and repeat counts that refer back
//! to values decoded earlier in the same structure.
//!
//! A format string is an optional byte-order marker (`=`, `@`, `!`, `>`,
//! `<`; `=` and `@` both mean system order, `!` aliases `>`) followed by
//! elements; whitespace is insignificant. An element is a type character
//! with an optional repeat to its left. The repeat may be a decimal count,
//! an external reference `#N` into caller-supplied refdata, an absolute
//! reference `/N` to the N-th value of the current scope, or a relative
//! reference `/pN` to the value N positions back.
//!
//! | characters | element |
//! |------------|---------|
//! | `b` `B`, `h` `H`, `u` `U`, `i` `I`/`l` `L`, `q` `Q` | signed/unsigned integers of 8, 16, 24, 32 and 64 bits |
//! | `e` `f` `d` `F` | floats of 16, 32, 64 and 128 bits |
//! | `?`, `c` | bool, single character |
//! | `k s`, `k X` | one byte string of k bytes, one hex string of 2k digits |
//! | `n` | null-terminated byte string |
//! | `k x`, `k a`, `\|` | k padding bytes; align to a multiple of k; reset the alignment base |
//! | `(…)`, `k […]`, `{…}` | group, bounded iterator, data-bounded iterator |
//! | `$` | the remainder of the data, only at the very end |
//!
//! A group with repeat k decodes its interior k times into a single flat
//! sub-sequence; a bounded iterator nests each of its k iterations as a
//! sub-sequence of its own; a data-bounded iterator iterates until the
//! data ends exactly. References never cross scope boundaries.
//!
//! ```
//! use rawpack::{Struct, Value};
//!
//! // a count, then that many length-prefixed strings
//! let st = Struct::new("B /0[B /0s]")?;
//! let values = st.unpack(b"\x02\x03foo\x03bar", &[])?;
//! assert_eq!(values[0], Value::Uint(2));
//! assert_eq!(
//!     values[1],
//!     Value::List(vec![
//!         Value::List(vec![Value::Uint(3), Value::Bytes(b"foo".to_vec())]),
//!         Value::List(vec![Value::Uint(3), Value::Bytes(b"bar".to_vec())]),
//!     ])
//! );
//! let packed = st.pack(&values, &[])?;
//! assert_eq!(packed, b"\x02\x03foo\x03bar");
//! # Ok::<(), rawpack::Error>(())
//! ```
//!
//! Formats are compiled into a [`Struct`] once and can be reused, combined
//! with [`Struct::concat`] and repeated with [`Struct::repeat`]; references
//! are renumbered so they keep pointing at their original targets. The
//! one-shot functions [`unpack`], [`pack`], [`calcsize`] and friends
//! compile on the fly.

use std::borrow::Cow;
use std::fmt;
use std::io;

mod analyzer;
mod error;
mod pack;
mod parser;
mod scalar;
mod unpack;
mod value;

pub use crate::error::Error;
pub use crate::parser::ByteOrder;
pub use crate::value::Value;

use crate::parser::{Kind, Repeat, Token};

/// Per-call state shared by both engines.
pub(crate) struct Ctx<'a> {
    pub(crate) format: &'a str,
    pub(crate) order: ByteOrder,
    pub(crate) refdata: &'a [usize],
}

/// Host configuration for compiling a format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Options {
    /// Accept references that cannot be proven to resolve to an already
    /// decoded integer; resolution failures then surface at run time.
    pub unsafe_references: bool,
    /// Byte order used when the format carries no marker of its own.
    pub byte_order: Option<ByteOrder>,
}

/// A format string compiled into an immutable, reusable structure.
#[derive(Debug, Clone, PartialEq)]
pub struct Struct {
    format: String,
    tokens: Vec<Token>,
    order: Option<ByteOrder>,
    options: Options,
    top_count: Option<usize>,
    extern_len: usize,
}

impl Struct {
    pub fn new(format: &str) -> Result<Self, Error> {
        Self::with_options(format, Options::default())
    }

    pub fn with_options(format: &str, options: Options) -> Result<Self, Error> {
        let parsed = parser::parse(format)?;
        let mut tokens = parsed.tokens;
        let summary = analyzer::analyze(&mut tokens, format, options.unsafe_references)?;
        Ok(Struct {
            format: format.to_owned(),
            tokens,
            order: parsed.order,
            options,
            top_count: summary.top_count,
            extern_len: summary.extern_len,
        })
    }

    /// The format this structure was compiled from; combined structures
    /// render canonically.
    pub fn format(&self) -> &str {
        &self.format
    }

    /// The refdata length this structure requires.
    pub fn refdata_len(&self) -> usize {
        self.extern_len
    }

    fn ctx<'a>(&'a self, refdata: &'a [usize]) -> Ctx<'a> {
        Ctx {
            format: &self.format,
            order: self.order.or(self.options.byte_order).unwrap_or_default(),
            refdata,
        }
    }

    /// Total encoded size, if every element is determinate given `refdata`.
    pub fn calcsize(&self, refdata: &[usize]) -> Result<usize, Error> {
        analyzer::size_of(&self.tokens, refdata, &self.format)
    }

    /// Decode the structure from the start of `data`. Trailing bytes are
    /// ignored unless the format itself consumes them.
    pub fn unpack(&self, data: &[u8], refdata: &[usize]) -> Result<Vec<Value>, Error> {
        self.unpack_from(data, 0, refdata).map(|(values, _)| values)
    }

    /// Decode starting at `offset`; returns the values and the position of
    /// the first unconsumed byte.
    pub fn unpack_from(
        &self,
        data: &[u8],
        offset: usize,
        refdata: &[usize],
    ) -> Result<(Vec<Value>, usize), Error> {
        unpack::unpack(&self.tokens, data, offset, &self.ctx(refdata))
    }

    /// Decode and hand the flat top-level values to a record constructor.
    pub fn unpack_with<T, F>(&self, data: &[u8], refdata: &[usize], make: F) -> Result<T, Error>
    where
        F: FnOnce(Vec<Value>) -> T,
    {
        self.unpack(data, refdata).map(make)
    }

    /// Decode from a reader, leaving it positioned at the first unconsumed
    /// byte.
    pub fn unpack_file<R>(&self, inp: &mut R, refdata: &[usize]) -> Result<Vec<Value>, Error>
    where
        R: io::Read + io::Seek,
    {
        let start = inp.stream_position()?;
        let mut data = Vec::new();
        inp.read_to_end(&mut data)?;
        let (values, end) = unpack::unpack(&self.tokens, &data, 0, &self.ctx(refdata))?;
        inp.seek(io::SeekFrom::Start(start + end as u64))?;
        Ok(values)
    }

    /// Lazily decode consecutive records; the data length must be an exact
    /// nonzero multiple of the structure's determinate size.
    pub fn iter_unpack<'a>(
        &'a self,
        data: &'a [u8],
        refdata: &'a [usize],
    ) -> Result<IterUnpack<'a>, Error> {
        IterUnpack::new(Cow::Borrowed(self), data, refdata)
    }

    /// Encode the flat argument sequence into a new buffer.
    pub fn pack(&self, args: &[Value], refdata: &[usize]) -> Result<Vec<u8>, Error> {
        pack::pack(&self.tokens, args, &self.ctx(refdata))
    }

    /// Encode in place at `offset`; the buffer is never grown.
    pub fn pack_into(
        &self,
        buffer: &mut [u8],
        offset: usize,
        args: &[Value],
        refdata: &[usize],
    ) -> Result<(), Error> {
        let bytes = self.pack(args, refdata)?;
        let end = offset
            .checked_add(bytes.len())
            .filter(|&end| end <= buffer.len())
            .ok_or_else(|| {
                Error::argument(
                    &self.format,
                    "",
                    offset,
                    format!("no space to pack {} bytes at offset {}", bytes.len(), offset),
                )
            })?;
        buffer[offset..end].copy_from_slice(&bytes);
        Ok(())
    }

    /// Encode to a writer, optionally seeking to `position` first.
    pub fn pack_file<W>(
        &self,
        out: &mut W,
        args: &[Value],
        position: Option<u64>,
        refdata: &[usize],
    ) -> Result<(), Error>
    where
        W: io::Write + io::Seek,
    {
        let bytes = self.pack(args, refdata)?;
        if let Some(p) = position {
            out.seek(io::SeekFrom::Start(p))?;
        }
        out.write_all(&bytes)?;
        Ok(())
    }

    /// A structure that decodes `self`, then `other` on the remainder.
    ///
    /// `other`'s top-level absolute references are shifted by `self`'s
    /// element count and its external references by `self`'s refdata
    /// length, so both keep pointing at their original targets.
    pub fn concat(&self, other: &Struct) -> Result<Struct, Error> {
        // the shift is only needed once the right-hand side actually
        // carries top-level absolute references
        let shift = if has_absolute(&other.tokens) {
            self.countable()?
        } else {
            0
        };
        if let (Some(a), Some(b)) = (self.order, other.order) {
            if a != b {
                return Err(Error::format(
                    &self.format,
                    other.format(),
                    "byte order markers disagree",
                ));
            }
        }
        let mut tokens = self.tokens.clone();
        for tok in &other.tokens {
            let mut tok = tok.clone();
            if let Some(Repeat::Absolute(n)) = &mut tok.repeat {
                *n += shift;
            }
            shift_externals(&mut tok, self.extern_len);
            tokens.push(tok);
        }
        Struct::assemble(
            tokens,
            self.order.or(other.order),
            Options {
                unsafe_references: self.options.unsafe_references
                    || other.options.unsafe_references,
                byte_order: self.options.byte_order.or(other.options.byte_order),
            },
        )
    }

    /// A structure equivalent to `times` concatenated copies of `self`,
    /// with each copy's references renumbered into its own copy.
    pub fn repeat(&self, times: usize) -> Result<Struct, Error> {
        let per = if has_absolute(&self.tokens) {
            self.countable()?
        } else {
            0
        };
        let mut tokens = Vec::with_capacity(self.tokens.len() * times);
        for copy in 0..times {
            for tok in &self.tokens {
                let mut tok = tok.clone();
                if let Some(Repeat::Absolute(n)) = &mut tok.repeat {
                    *n += copy * per;
                }
                shift_externals(&mut tok, copy * self.extern_len);
                tokens.push(tok);
            }
        }
        Struct::assemble(tokens, self.order, self.options)
    }

    fn countable(&self) -> Result<usize, Error> {
        self.top_count.ok_or_else(|| {
            Error::format(
                &self.format,
                &self.format,
                "cannot combine after a dynamically counted element",
            )
        })
    }

    fn assemble(
        mut tokens: Vec<Token>,
        order: Option<ByteOrder>,
        options: Options,
    ) -> Result<Struct, Error> {
        let format = render(order, &tokens);
        let summary = analyzer::analyze(&mut tokens, &format, options.unsafe_references)?;
        Ok(Struct {
            format,
            tokens,
            order,
            options,
            top_count: summary.top_count,
            extern_len: summary.extern_len,
        })
    }
}

impl fmt::Display for Struct {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.format)
    }
}

fn render(order: Option<ByteOrder>, tokens: &[Token]) -> String {
    struct Rendered<'a>(Option<ByteOrder>, &'a [Token]);
    impl fmt::Display for Rendered<'_> {
        fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
            match self.0 {
                Some(ByteOrder::LittleEndian) => write!(f, "< ")?,
                Some(ByteOrder::BigEndian) => write!(f, "> ")?,
                Some(ByteOrder::System) => write!(f, "= ")?,
                None => {}
            }
            parser::write_tokens(f, self.1)
        }
    }
    Rendered(order, tokens).to_string()
}

fn has_absolute(tokens: &[Token]) -> bool {
    tokens
        .iter()
        .any(|tok| matches!(tok.repeat, Some(Repeat::Absolute(_))))
}

fn shift_externals(tok: &mut Token, by: usize) {
    if by == 0 {
        return;
    }
    if let Some(Repeat::External(n)) = &mut tok.repeat {
        *n += by;
    }
    if let Kind::Group(ch) | Kind::Iter(ch) | Kind::Repeater(ch) = &mut tok.kind {
        for t in ch {
            shift_externals(t, by);
        }
    }
}

/// Lazily yields one record per `Struct`-sized slice of the data.
#[derive(Debug)]
pub struct IterUnpack<'a> {
    st: Cow<'a, Struct>,
    data: &'a [u8],
    refdata: &'a [usize],
    size: usize,
    offset: usize,
}

impl<'a> IterUnpack<'a> {
    fn new(st: Cow<'a, Struct>, data: &'a [u8], refdata: &'a [usize]) -> Result<Self, Error> {
        let size = st.calcsize(refdata)?;
        if size == 0 {
            return Err(Error::format(
                st.format(),
                st.format(),
                "cannot iterate over a structure of size zero",
            ));
        }
        if data.len() % size != 0 {
            return Err(Error::data(
                st.format(),
                st.format(),
                data.len(),
                format!("the data is not a multiple of {} bytes", size),
            ));
        }
        Ok(IterUnpack {
            st,
            data,
            refdata,
            size,
            offset: 0,
        })
    }
}

impl Iterator for IterUnpack<'_> {
    type Item = Result<Vec<Value>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.data.len() {
            return None;
        }
        let window = &self.data[self.offset..self.offset + self.size];
        self.offset += self.size;
        Some(self.st.unpack(window, self.refdata))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = (self.data.len() - self.offset) / self.size;
        (n, Some(n))
    }
}

impl ExactSizeIterator for IterUnpack<'_> {}

/// Compile `format` and decode `data` with it.
pub fn unpack(format: &str, data: &[u8], refdata: &[usize]) -> Result<Vec<Value>, Error> {
    Struct::new(format)?.unpack(data, refdata)
}

/// Compile `format` and decode starting at `offset`; also returns the end
/// position.
pub fn unpack_from(
    format: &str,
    data: &[u8],
    offset: usize,
    refdata: &[usize],
) -> Result<(Vec<Value>, usize), Error> {
    Struct::new(format)?.unpack_from(data, offset, refdata)
}

/// Compile `format` and lazily decode consecutive records.
pub fn iter_unpack<'a>(
    format: &str,
    data: &'a [u8],
    refdata: &'a [usize],
) -> Result<IterUnpack<'a>, Error> {
    IterUnpack::new(Cow::Owned(Struct::new(format)?), data, refdata)
}

/// Compile `format` and encode the argument sequence into a new buffer.
pub fn pack(format: &str, args: &[Value], refdata: &[usize]) -> Result<Vec<u8>, Error> {
    Struct::new(format)?.pack(args, refdata)
}

/// Compile `format` and encode in place at `offset`.
pub fn pack_into(
    format: &str,
    buffer: &mut [u8],
    offset: usize,
    args: &[Value],
    refdata: &[usize],
) -> Result<(), Error> {
    Struct::new(format)?.pack_into(buffer, offset, args, refdata)
}

/// Compile `format` and encode to a writer.
pub fn pack_file<W>(
    format: &str,
    out: &mut W,
    args: &[Value],
    position: Option<u64>,
    refdata: &[usize],
) -> Result<(), Error>
where
    W: io::Write + io::Seek,
{
    Struct::new(format)?.pack_file(out, args, position, refdata)
}

/// Compile `format` and return its total encoded size.
pub fn calcsize(format: &str, refdata: &[usize]) -> Result<usize, Error> {
    Struct::new(format)?.calcsize(refdata)
}
