use crate::error::Error;
use pest::Parser;
use std::fmt;

mod grammar {
    #[derive(pest_derive::Parser)]
    #[grammar = "fmt.pest"]
    pub struct Parser;
}

/// Byte order for all multi-byte scalars of a structure.
///
/// `=` and `@` both select `System`, `<` selects `LittleEndian`, `>` and
/// `!` select `BigEndian`. A format without a marker runs in the order the
/// host was configured with, falling back to `System`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteOrder {
    #[default]
    System,
    LittleEndian,
    BigEndian,
}

impl ByteOrder {
    pub(crate) fn little(self) -> bool {
        match self {
            ByteOrder::LittleEndian => true,
            ByteOrder::BigEndian => false,
            ByteOrder::System => cfg!(target_endian = "little"),
        }
    }
}

/// A repeat specifier, attached left of its element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repeat {
    /// A literal decimal count.
    Count(usize),
    /// `#N`, the N-th element of the caller-supplied refdata.
    External(usize),
    /// `/N`, the N-th value decoded so far in the current scope.
    Absolute(usize),
    /// `/pN`, the value N positions back in the current scope.
    Relative(usize),
}

/// Fixed-width scalar kinds, one per format character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scalar {
    Bool,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int24,
    UInt24,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Half,
    Float,
    Double,
    Quad,
    Char,
}

impl Scalar {
    pub(crate) fn width(self) -> usize {
        match self {
            Scalar::Bool | Scalar::Int8 | Scalar::UInt8 | Scalar::Char => 1,
            Scalar::Int16 | Scalar::UInt16 | Scalar::Half => 2,
            Scalar::Int24 | Scalar::UInt24 => 3,
            Scalar::Int32 | Scalar::UInt32 | Scalar::Float => 4,
            Scalar::Int64 | Scalar::UInt64 | Scalar::Double => 8,
            Scalar::Quad => 16,
        }
    }

    /// Whether values of this kind can serve as a repeat count.
    pub(crate) fn is_integer(self) -> bool {
        !matches!(
            self,
            Scalar::Bool
                | Scalar::Char
                | Scalar::Half
                | Scalar::Float
                | Scalar::Double
                | Scalar::Quad
        )
    }

    fn symbol(self) -> char {
        match self {
            Scalar::Bool => '?',
            Scalar::Int8 => 'b',
            Scalar::UInt8 => 'B',
            Scalar::Int16 => 'h',
            Scalar::UInt16 => 'H',
            Scalar::Int24 => 'u',
            Scalar::UInt24 => 'U',
            Scalar::Int32 => 'i',
            Scalar::UInt32 => 'I',
            Scalar::Int64 => 'q',
            Scalar::UInt64 => 'Q',
            Scalar::Half => 'e',
            Scalar::Float => 'f',
            Scalar::Double => 'd',
            Scalar::Quad => 'F',
            Scalar::Char => 'c',
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Kind {
    /// A fixed-width scalar; a literal repeat decodes that many values.
    Value(Scalar),
    /// `s`, one byte string of repeat length.
    Str,
    /// `X`, one hex text string of twice the repeat length.
    Hex,
    /// `n`, a null-terminated byte string.
    CString,
    /// `x`, skipped on decode, zero-filled on encode.
    Pad,
    /// `a`, advance to the next multiple of the repeat from the scope base.
    Align,
    /// `|`, reset the scope's alignment base to the cursor.
    AlignBase,
    /// `$`, the remainder of the data.
    Rest,
    Group(Vec<Token>),
    Iter(Vec<Token>),
    Repeater(Vec<Token>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: Kind,
    pub repeat: Option<Repeat>,
    /// Element index within the enclosing scope, assigned by the analyzer.
    pub index: usize,
}

impl Token {
    fn plain(kind: Kind) -> Self {
        Token {
            kind,
            repeat: None,
            index: 0,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.repeat {
            Some(Repeat::Count(n)) => write!(f, "{}", n)?,
            Some(Repeat::External(n)) => write!(f, "#{}", n)?,
            Some(Repeat::Absolute(n)) => write!(f, "/{}", n)?,
            Some(Repeat::Relative(n)) => write!(f, "/p{}", n)?,
            None => {}
        }
        match &self.kind {
            Kind::Value(s) => write!(f, "{}", s.symbol()),
            Kind::Str => write!(f, "s"),
            Kind::Hex => write!(f, "X"),
            Kind::CString => write!(f, "n"),
            Kind::Pad => write!(f, "x"),
            Kind::Align => write!(f, "a"),
            Kind::AlignBase => write!(f, "|"),
            Kind::Rest => write!(f, "$"),
            Kind::Group(inner) => {
                write!(f, "(")?;
                write_tokens(f, inner)?;
                write!(f, ")")
            }
            Kind::Iter(inner) => {
                write!(f, "[")?;
                write_tokens(f, inner)?;
                write!(f, "]")
            }
            Kind::Repeater(inner) => {
                write!(f, "{{")?;
                write_tokens(f, inner)?;
                write!(f, "}}")
            }
        }
    }
}

/// Canonical space-separated rendering of a token sequence.
pub(crate) fn write_tokens(f: &mut fmt::Formatter, tokens: &[Token]) -> fmt::Result {
    for (i, tok) in tokens.iter().enumerate() {
        if i > 0 {
            write!(f, " ")?;
        }
        write!(f, "{}", tok)?;
    }
    Ok(())
}

#[derive(Debug)]
pub struct Format {
    pub order: Option<ByteOrder>,
    pub tokens: Vec<Token>,
}

pub fn parse(inp: &str) -> Result<Format, Error> {
    let parsed = grammar::Parser::parse(grammar::Rule::fmt, inp)
        .map_err(|e| syntax_error(inp, &e))?
        .next()
        .ok_or_else(|| Error::format(inp, "", "empty parse"))?;
    let mut order = None;
    let mut tokens = Vec::new();
    for pair in parsed.into_inner() {
        match pair.as_rule() {
            grammar::Rule::modifier => {
                order = Some(match pair.as_str() {
                    "=" | "@" => ByteOrder::System,
                    "<" => ByteOrder::LittleEndian,
                    ">" | "!" => ByteOrder::BigEndian,
                    _ => unreachable!(),
                });
            }
            grammar::Rule::element => tokens.push(element(pair, inp)?),
            grammar::Rule::alignbase => tokens.push(Token::plain(Kind::AlignBase)),
            grammar::Rule::rest => tokens.push(Token::plain(Kind::Rest)),
            grammar::Rule::EOI => {}
            _ => unreachable!(),
        }
    }
    Ok(Format { order, tokens })
}

fn element(pair: pest::iterators::Pair<grammar::Rule>, inp: &str) -> Result<Token, Error> {
    let excerpt = pair.as_str().to_owned();
    let mut repeat = None;
    let mut kind = None;
    for p in pair.into_inner() {
        match p.as_rule() {
            grammar::Rule::number => repeat = Some(Repeat::Count(number(p, inp)?)),
            grammar::Rule::extref => repeat = Some(Repeat::External(ref_number(p, inp)?)),
            grammar::Rule::absref => repeat = Some(Repeat::Absolute(ref_number(p, inp)?)),
            grammar::Rule::relref => repeat = Some(Repeat::Relative(ref_number(p, inp)?)),
            grammar::Rule::body => kind = Some(body(p, inp)?),
            _ => unreachable!(),
        }
    }
    let kind = kind.ok_or_else(|| Error::format(inp, &excerpt, "element without a type"))?;
    if repeat.is_some() && matches!(kind, Kind::Repeater(_)) {
        return Err(Error::format(
            inp,
            excerpt,
            "a repeat count cannot apply to a data-bounded iterator",
        ));
    }
    Ok(Token {
        kind,
        repeat,
        index: 0,
    })
}

fn body(pair: pest::iterators::Pair<grammar::Rule>, inp: &str) -> Result<Kind, Error> {
    let p = pair
        .into_inner()
        .next()
        .ok_or_else(|| Error::format(inp, "", "empty element"))?;
    Ok(match p.as_rule() {
        grammar::Rule::group => Kind::Group(items(p, inp)?),
        grammar::Rule::iterator => Kind::Iter(items(p, inp)?),
        grammar::Rule::repeater => Kind::Repeater(items(p, inp)?),
        grammar::Rule::chr => match p.as_str() {
            "?" => Kind::Value(Scalar::Bool),
            "b" => Kind::Value(Scalar::Int8),
            "B" => Kind::Value(Scalar::UInt8),
            "h" => Kind::Value(Scalar::Int16),
            "H" => Kind::Value(Scalar::UInt16),
            "u" => Kind::Value(Scalar::Int24),
            "U" => Kind::Value(Scalar::UInt24),
            "i" | "l" => Kind::Value(Scalar::Int32),
            "I" | "L" => Kind::Value(Scalar::UInt32),
            "q" => Kind::Value(Scalar::Int64),
            "Q" => Kind::Value(Scalar::UInt64),
            "e" => Kind::Value(Scalar::Half),
            "f" => Kind::Value(Scalar::Float),
            "d" => Kind::Value(Scalar::Double),
            "F" => Kind::Value(Scalar::Quad),
            "c" => Kind::Value(Scalar::Char),
            "s" => Kind::Str,
            "X" => Kind::Hex,
            "n" => Kind::CString,
            "x" => Kind::Pad,
            "a" => Kind::Align,
            _ => unreachable!(),
        },
        _ => unreachable!(),
    })
}

fn items(pair: pest::iterators::Pair<grammar::Rule>, inp: &str) -> Result<Vec<Token>, Error> {
    let mut tokens = Vec::new();
    for p in pair.into_inner() {
        match p.as_rule() {
            grammar::Rule::element => tokens.push(element(p, inp)?),
            grammar::Rule::alignbase => tokens.push(Token::plain(Kind::AlignBase)),
            _ => unreachable!(),
        }
    }
    Ok(tokens)
}

fn number(pair: pest::iterators::Pair<grammar::Rule>, inp: &str) -> Result<usize, Error> {
    let excerpt = pair.as_str();
    excerpt
        .parse()
        .map_err(|_| Error::format(inp, excerpt, "repeat count too large"))
}

fn ref_number(pair: pest::iterators::Pair<grammar::Rule>, inp: &str) -> Result<usize, Error> {
    let excerpt = pair.as_str().to_owned();
    let p = pair
        .into_inner()
        .next()
        .ok_or_else(|| Error::format(inp, &excerpt, "reference without an index"))?;
    number(p, inp)
}

fn syntax_error(inp: &str, err: &pest::error::Error<grammar::Rule>) -> Error {
    let pos = match &err.location {
        pest::error::InputLocation::Pos(p) => *p,
        pest::error::InputLocation::Span((s, _)) => *s,
    };
    let excerpt: String = inp[pos.min(inp.len())..].chars().take(8).collect();
    Error::format(inp, excerpt, "malformed format string")
}
