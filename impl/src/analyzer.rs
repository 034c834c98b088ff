//! Static analysis of a parsed token tree: element indexing, reference
//! validation and size computation.
//!
//! Element indices count one slot per emitted value. A literally repeated
//! numeric, bool or char scalar therefore occupies `repeat` consecutive
//! indices, `s`/`X`/`n`/`$` and sub-structures occupy one, and `x`/`a`/`|`
//! occupy none; a reference resolves against the same positions the
//! unpacker's value vector will have at run time.

use crate::error::Error;
use crate::parser::{Kind, Repeat, Token};
use log::trace;

pub(crate) struct Summary {
    /// Static top-level element count; `None` once a dynamically counted
    /// scalar makes the tail indices inexact.
    pub top_count: Option<usize>,
    /// Refdata length this format requires (highest `#N` plus one).
    pub extern_len: usize,
}

pub(crate) fn analyze(
    tokens: &mut [Token],
    format: &str,
    unsafe_refs: bool,
) -> Result<Summary, Error> {
    let top_count = index_scope(tokens);
    validate_scope(tokens, format, unsafe_refs)?;
    let mut extern_len = 0;
    extern_extent(tokens, &mut extern_len);
    trace!(
        "analyzed \"{}\": top-level elements {:?}, refdata length {}",
        format,
        top_count,
        extern_len
    );
    Ok(Summary {
        top_count,
        extern_len,
    })
}

/// Slots an element occupies, `None` when the count depends on data or
/// refdata.
fn slot_span(tok: &Token) -> Option<usize> {
    match &tok.kind {
        Kind::Value(_) | Kind::CString => match tok.repeat {
            None => Some(1),
            Some(Repeat::Count(k)) => Some(k),
            Some(_) => None,
        },
        Kind::Str | Kind::Hex | Kind::Rest | Kind::Group(_) | Kind::Iter(_) | Kind::Repeater(_) => {
            Some(1)
        }
        Kind::Pad | Kind::Align | Kind::AlignBase => Some(0),
    }
}

fn index_scope(tokens: &mut [Token]) -> Option<usize> {
    let mut counter = 0;
    let mut exact = true;
    for tok in tokens.iter_mut() {
        tok.index = counter;
        match slot_span(tok) {
            Some(span) => counter += span,
            None => exact = false,
        }
        if let Kind::Group(ch) | Kind::Iter(ch) | Kind::Repeater(ch) = &mut tok.kind {
            index_scope(ch);
        }
    }
    exact.then_some(counter)
}

/// Whether decoding this element reads a data-dependent number of bytes
/// or values.
fn data_dependent(tok: &Token) -> bool {
    if matches!(
        tok.repeat,
        Some(Repeat::Absolute(_) | Repeat::Relative(_))
    ) {
        return true;
    }
    match &tok.kind {
        Kind::CString | Kind::Rest | Kind::Repeater(_) => true,
        Kind::Group(ch) | Kind::Iter(ch) => ch.iter().any(data_dependent),
        _ => false,
    }
}

/// Elements that may not stand between a reference target and its
/// referrer: variable-length reads and sub-structures of data-dependent
/// shape.
fn blocks_references(tok: &Token) -> bool {
    match &tok.kind {
        Kind::CString | Kind::Rest | Kind::Repeater(_) => true,
        Kind::Group(ch) | Kind::Iter(ch) => ch.iter().any(data_dependent),
        _ => false,
    }
}

fn validate_scope(tokens: &[Token], format: &str, unsafe_refs: bool) -> Result<(), Error> {
    for (pos, tok) in tokens.iter().enumerate() {
        match &tok.kind {
            Kind::Repeater(_) if pos + 1 != tokens.len() => {
                return Err(Error::format(
                    format,
                    tok,
                    "a data-bounded iterator must be the last element of its scope",
                ));
            }
            Kind::Rest if pos + 1 != tokens.len() => {
                return Err(Error::format(
                    format,
                    tok,
                    "data follows the end-of-stream marker",
                ));
            }
            Kind::Align if tok.repeat == Some(Repeat::Count(0)) => {
                return Err(Error::format(format, tok, "alignment must be at least one"));
            }
            _ => {}
        }
        match tok.repeat {
            Some(Repeat::Relative(0)) => {
                return Err(Error::format(
                    format,
                    tok,
                    "a relative reference must reach backwards",
                ));
            }
            Some(Repeat::Absolute(n)) if !unsafe_refs => {
                check_absolute(tokens, pos, n, format)?;
            }
            Some(Repeat::Relative(n)) if !unsafe_refs => {
                check_relative(tokens, pos, n, format)?;
            }
            _ => {}
        }
        if let Kind::Group(ch) | Kind::Iter(ch) | Kind::Repeater(ch) = &tok.kind {
            validate_scope(ch, format, unsafe_refs)?;
        }
    }
    Ok(())
}

fn check_absolute(tokens: &[Token], rpos: usize, target: usize, format: &str) -> Result<(), Error> {
    let mut owner = None;
    for (pos, tok) in tokens[..rpos].iter().enumerate() {
        match slot_span(tok) {
            Some(span) => {
                if target >= tok.index && target < tok.index + span {
                    owner = Some(pos);
                    break;
                }
            }
            // An externally counted element leaves the later indices to the
            // run time; one counted by a reference makes them data-dependent.
            None if data_dependent(tok) => {
                return Err(Error::format(
                    format,
                    &tokens[rpos],
                    format!("reference across \"{}\", whose shape depends on the data", tok),
                ));
            }
            None => return Ok(()),
        }
    }
    check_target(tokens, rpos, owner, format)
}

fn check_relative(tokens: &[Token], rpos: usize, back: usize, format: &str) -> Result<(), Error> {
    // A relative reference is resolved against the live end of the value
    // vector, so every element up to the referrer must have an exact count.
    for tok in &tokens[..rpos] {
        if slot_span(tok).is_none() {
            if data_dependent(tok) {
                return Err(Error::format(
                    format,
                    &tokens[rpos],
                    format!("reference across \"{}\", whose shape depends on the data", tok),
                ));
            }
            return Ok(());
        }
    }
    let referrer = &tokens[rpos];
    let target = referrer.index.checked_sub(back).ok_or_else(|| {
        Error::format(
            format,
            referrer,
            "relative reference reaches before its scope",
        )
    })?;
    let owner = tokens[..rpos]
        .iter()
        .position(|tok| {
            slot_span(tok)
                .map(|span| target >= tok.index && target < tok.index + span)
                .unwrap_or(false)
        });
    check_target(tokens, rpos, owner, format)
}

fn check_target(
    tokens: &[Token],
    rpos: usize,
    owner: Option<usize>,
    format: &str,
) -> Result<(), Error> {
    let referrer = &tokens[rpos];
    let owner_pos = owner.ok_or_else(|| {
        Error::format(
            format,
            referrer,
            "reference to an element that does not precede it",
        )
    })?;
    let target = &tokens[owner_pos];
    let numeric = matches!(target.kind, Kind::Value(s) if s.is_integer());
    if !numeric {
        return Err(Error::format(
            format,
            referrer,
            format!("reference to \"{}\", which is not an integer element", target),
        ));
    }
    for tok in &tokens[owner_pos..rpos] {
        if blocks_references(tok) {
            return Err(Error::format(
                format,
                referrer,
                format!("reference across \"{}\", whose shape depends on the data", tok),
            ));
        }
    }
    Ok(())
}

fn extern_extent(tokens: &[Token], len: &mut usize) {
    for tok in tokens {
        if let Some(Repeat::External(n)) = tok.repeat {
            *len = (*len).max(n + 1);
        }
        if let Kind::Group(ch) | Kind::Iter(ch) | Kind::Repeater(ch) = &tok.kind {
            extern_extent(ch, len);
        }
    }
}

/// Total encoded size of a token sequence, if every element is determinate
/// given `refdata`.
pub(crate) fn size_of(tokens: &[Token], refdata: &[usize], format: &str) -> Result<usize, Error> {
    let mut pos = 0;
    let mut base = 0;
    for tok in tokens {
        advance(tok, &mut pos, &mut base, refdata, format)?;
    }
    Ok(pos)
}

fn advance(
    tok: &Token,
    pos: &mut usize,
    base: &mut usize,
    refdata: &[usize],
    format: &str,
) -> Result<(), Error> {
    let count = static_count(tok, refdata, format)?;
    match &tok.kind {
        Kind::Value(s) => *pos += count * s.width(),
        Kind::Str | Kind::Hex | Kind::Pad => *pos += count,
        Kind::CString | Kind::Rest | Kind::Repeater(_) => {
            return Err(Error::format(
                format,
                tok,
                "the size depends on the data itself",
            ));
        }
        Kind::Align => {
            if count == 0 {
                return Err(Error::format(format, tok, "alignment must be at least one"));
            }
            let rem = (*pos - *base) % count;
            if rem != 0 {
                *pos += count - rem;
            }
        }
        Kind::AlignBase => *base = *pos,
        Kind::Group(ch) => {
            // One child scope shared by all iterations, aligned from the
            // group's start.
            let mut gpos = 0;
            let mut gbase = 0;
            for _ in 0..count {
                for t in ch {
                    advance(t, &mut gpos, &mut gbase, refdata, format)?;
                }
            }
            *pos += gpos;
        }
        Kind::Iter(ch) => {
            let per = size_of(ch, refdata, format)?;
            *pos += count * per;
        }
    }
    Ok(())
}

fn static_count(tok: &Token, refdata: &[usize], format: &str) -> Result<usize, Error> {
    match tok.repeat {
        None => Ok(1),
        Some(Repeat::Count(k)) => Ok(k),
        Some(Repeat::External(n)) => refdata.get(n).copied().ok_or_else(|| {
            Error::format(
                format,
                tok,
                format!("external reference #{} is not satisfied by the refdata", n),
            )
        }),
        Some(Repeat::Absolute(_) | Repeat::Relative(_)) => Err(Error::format(
            format,
            tok,
            "the size depends on the data itself",
        )),
    }
}
