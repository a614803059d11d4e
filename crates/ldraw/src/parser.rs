//! Single line parser for the LDraw file format.
//!
//! Every line yields exactly one [`Command`]. Geometry lines (types 1 to 5)
//! follow a strict token grammar and fail with [`LDrawError::Format`];
//! unrecognised meta commands degrade to [`CommandKind::MetaUnknown`].

use chrono::NaiveDate;
use glam::DVec3;
use log::{trace, warn};

use crate::color::{ColorRef, ColourDefinition};
use crate::command::{Command, CommandKind, PartReference};
use crate::ids::IdAllocator;
use crate::part::PartKind;
use crate::transform::Transform;
use crate::{LDrawError, Result};

/// Parses one line into a command with a fresh id.
///
/// `invert` is the caller's winding state (set after `BFC INVERTNEXT` or
/// inside an inverted reference); it is stored on references, triangles and
/// quads.
pub fn parse_line(line: &str, line_no: usize, invert: bool, ids: &IdAllocator) -> Result<Command> {
    parse_kind(line, line_no, invert).map(|kind| Command::new(ids, kind))
}

/// Like [`parse_line`] without allocating an id.
pub fn parse_kind(line: &str, line_no: usize, invert: bool) -> Result<CommandKind> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    trace!("line {line_no}: {} tokens", tokens.len());

    let Some(&first) = tokens.first() else {
        return Ok(CommandKind::Empty);
    };

    let geometry = |expected: usize| -> Result<()> {
        if tokens.len() != expected {
            return Err(LDrawError::format(
                line_no,
                line,
                format!(
                    "line type {first} needs {} fields, found {}",
                    expected - 1,
                    tokens.len() - 1
                ),
            ));
        }
        Ok(())
    };

    match first {
        "1" => parse_reference(line, line_no, invert),
        "2" => {
            geometry(8)?;
            let color = color(tokens[1], line_no, line)?;
            let p = points::<2>(&tokens[2..], line_no, line)?;
            Ok(CommandKind::Line {
                color,
                p1: p[0],
                p2: p[1],
            })
        }
        "3" => {
            geometry(11)?;
            Ok(CommandKind::Triangle {
                color: color(tokens[1], line_no, line)?,
                points: points::<3>(&tokens[2..], line_no, line)?,
                invert,
            })
        }
        "4" => {
            geometry(14)?;
            Ok(CommandKind::Quad {
                color: color(tokens[1], line_no, line)?,
                points: points::<4>(&tokens[2..], line_no, line)?,
                invert,
            })
        }
        "5" => {
            geometry(14)?;
            let color = color(tokens[1], line_no, line)?;
            let p = points::<4>(&tokens[2..], line_no, line)?;
            Ok(CommandKind::AuxLine {
                color,
                p1: p[0],
                p2: p[1],
                c1: p[2],
                c2: p[3],
            })
        }
        _ if tokens.len() == 1 => Ok(CommandKind::Comment(first.to_string())),
        "0" => parse_meta(line, line_no, &tokens),
        other => Ok(CommandKind::Unknown(format!("unknown line type '{other}'"))),
    }
}

fn parse_reference(line: &str, line_no: usize, invert: bool) -> Result<CommandKind> {
    let (head, file) = split_leading(line, 14);
    if head.len() < 14 || file.is_empty() {
        return Err(LDrawError::format(
            line_no,
            line,
            "line type 1 needs a colour, 12 numbers and a file name",
        ));
    }
    let color = color(head[1], line_no, line)?;
    let mut v = [0.0; 12];
    for (slot, tok) in v.iter_mut().zip(&head[2..14]) {
        *slot = number(tok, line_no, line)?;
    }
    Ok(CommandKind::Reference(PartReference {
        part_id: file.to_string(),
        color,
        transform: Transform::from_ldraw(v),
        invert,
    }))
}

fn parse_meta(line: &str, line_no: usize, tokens: &[&str]) -> Result<CommandKind> {
    let keyword = tokens[1];
    let is = |k: &str| keyword.eq_ignore_ascii_case(k);
    let after = |n: usize| split_leading(line, n).1.to_string();

    if keyword == "//" {
        return Ok(CommandKind::Comment(after(2)));
    }
    if is("!COLOUR") {
        return ColourDefinition::parse(&tokens[2..])
            .map(CommandKind::Colour)
            .map_err(|reason| LDrawError::format(line_no, line, reason));
    }
    if is("BFC") {
        return Ok(parse_bfc(tokens, line));
    }
    if is("FILE") {
        let name = after(2);
        if name.is_empty() {
            return Err(LDrawError::format(line_no, line, "missing file name"));
        }
        return Ok(CommandKind::File(name));
    }
    if is("NOFILE") {
        return Ok(CommandKind::NoFile);
    }
    if is("!CATEGORY") {
        return Ok(CommandKind::Category(after(2)));
    }
    if is("!KEYWORDS") {
        return Ok(CommandKind::Keywords(after(2)));
    }
    if is("!LICENSE") {
        return Ok(CommandKind::License(after(2)));
    }
    if is("Name:") {
        return Ok(CommandKind::Name(after(2)));
    }
    if is("Author:") {
        return Ok(CommandKind::Author(after(2)));
    }
    if is("STEP") {
        return Ok(CommandKind::Step);
    }
    if is("!HISTORY") {
        let date = tokens
            .get(2)
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
            .ok_or_else(|| LDrawError::format(line_no, line, "invalid !HISTORY date"))?;
        return Ok(CommandKind::History {
            date,
            text: after(3),
        });
    }
    if ["!LDRAW_ORG", "LDRAW_ORG", "Official", "Unofficial", "Un-official"]
        .into_iter()
        .any(|k| is(k))
    {
        return Ok(CommandKind::FileType(parse_part_kind(line)));
    }
    Ok(CommandKind::MetaUnknown(after(1)))
}

fn parse_bfc(tokens: &[&str], line: &str) -> CommandKind {
    let arg = |i: usize| tokens.get(i).map(|t| t.to_ascii_uppercase());
    match (arg(2).as_deref(), arg(3).as_deref(), tokens.len()) {
        (Some("INVERTNEXT"), _, _) => CommandKind::BfcInvertNext,
        (Some("CERTIFY"), Some("CW"), 4) => CommandKind::BfcCw,
        (Some("CERTIFY"), Some("CCW"), 4) => CommandKind::BfcCcw,
        (Some("CERTIFY"), Some("INVERTNEXT"), 4) => {
            warn!("Deprecated command BFC CERTIFY INVERTNEXT: {}", line.trim());
            CommandKind::BfcInvertNext
        }
        (Some("CW"), _, _) => CommandKind::BfcCw,
        (Some("CCW"), _, _) => CommandKind::BfcCcw,
        _ => CommandKind::Comment(split_leading(line, 1).1.to_string()),
    }
}

/// Classifies a `0 !LDRAW_ORG ...` (or legacy `0 Official LCAD ...`) line.
/// Malformed lines fall back to [`PartKind::Model`].
pub fn parse_part_kind(line: &str) -> PartKind {
    let ld: Vec<&str> = line.split_whitespace().collect();
    if ld.len() <= 2 {
        warn!("Malformed part type command: {}", line.trim());
        return PartKind::Model;
    }
    let lcad = ld[1].eq_ignore_ascii_case("Official") && ld[2].eq_ignore_ascii_case("LCAD");
    if lcad && ld.len() < 5 {
        warn!("Malformed part type command: {}", line.trim());
        return PartKind::Model;
    }
    let official =
        !(ld[1].eq_ignore_ascii_case("Unofficial") || ld[1].eq_ignore_ascii_case("Un-official"));
    let kind = if lcad { ld[3] } else { ld[2] }.to_ascii_lowercase();
    let pick = |off: PartKind, unoff: PartKind| if official { off } else { unoff };

    match kind.as_str() {
        "part" => pick(PartKind::Official, PartKind::Unofficial),
        "subpart" => pick(PartKind::Subpart, PartKind::UnofficialSubpart),
        "primitive" => pick(PartKind::Primitive, PartKind::UnofficialPrimitive),
        "48_primitive" | "hi-res" => pick(PartKind::Primitive48, PartKind::Unofficial48),
        "8_primitive" => pick(PartKind::Primitive8, PartKind::Unofficial8),
        "shortcut" => pick(PartKind::Shortcut, PartKind::UnofficialShortcut),
        "file" | "model" | "unofficial_model" => PartKind::Model,
        "submodel" => PartKind::Submodel,
        "element" | "sub-part" | "cross-reference" => {
            warn!("Deprecated/obsolete type: {}", line.trim());
            pick(PartKind::Subpart, PartKind::UnofficialSubpart)
        }
        "alias" => {
            warn!("Deprecated/obsolete type: {}", line.trim());
            pick(PartKind::Official, PartKind::Unofficial)
        }
        "unofficial_part" => PartKind::Unofficial,
        "unofficial_subpart" => PartKind::UnofficialSubpart,
        "unofficial_primitive" => PartKind::UnofficialPrimitive,
        "unofficial_48_primitive" => PartKind::Unofficial48,
        "unofficial_8_primitive" => PartKind::Unofficial8,
        "unofficial_shortcut" => PartKind::UnofficialShortcut,
        _ => PartKind::Model,
    }
}

/// Splits off the first `n` whitespace separated tokens and returns them with
/// the trimmed remainder of the line.
fn split_leading(line: &str, n: usize) -> (Vec<&str>, &str) {
    let mut rest = line.trim_start();
    let mut head = Vec::with_capacity(n);
    while head.len() < n && !rest.is_empty() {
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        head.push(&rest[..end]);
        rest = rest[end..].trim_start();
    }
    (head, rest.trim_end())
}

fn color(token: &str, line_no: usize, line: &str) -> Result<ColorRef> {
    ColorRef::parse(token)
        .ok_or_else(|| LDrawError::format(line_no, line, format!("invalid colour '{token}'")))
}

fn number(token: &str, line_no: usize, line: &str) -> Result<f64> {
    token
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| LDrawError::format(line_no, line, format!("invalid number '{token}'")))
}

fn points<const N: usize>(tokens: &[&str], line_no: usize, line: &str) -> Result<[DVec3; N]> {
    let mut out = [DVec3::ZERO; N];
    for (p, xyz) in out.iter_mut().zip(tokens.chunks_exact(3)) {
        *p = DVec3::new(
            number(xyz[0], line_no, line)?,
            number(xyz[1], line_no, line)?,
            number(xyz[2], line_no, line)?,
        );
    }
    Ok(out)
}
