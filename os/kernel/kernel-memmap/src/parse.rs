//! `memmap=` option and kernel command line parsing.

use crate::MemmapError;

/// What a `memmap=SIZE<op>START` entry declares the range to be.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum MemmapKind {
    /// `@`: usable RAM.
    Usable,
    /// `#`: ACPI data.
    AcpiData,
    /// `$`: reserved; the extents contiguous allocations are carved from.
    Reserved,
    /// `!`: persistent memory.
    Persistent,
}

impl MemmapKind {
    const fn from_operator(op: char) -> Option<Self> {
        match op {
            '@' => Some(Self::Usable),
            '#' => Some(Self::AcpiData),
            '$' => Some(Self::Reserved),
            '!' => Some(Self::Persistent),
            _ => None,
        }
    }
}

/// One comma-separated entry of a `memmap=` value.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum MemmapEntry {
    /// A bare `SIZE`: limit usable memory.
    Limit { size: u64 },
    /// The `exactmap` keyword.
    ExactMap,
    /// `SIZE<op>START`.
    Range {
        kind: MemmapKind,
        start: u64,
        size: u64,
    },
}

/// Parse a number with an optional binary size suffix, the way the kernel's
/// `memparse` does.
///
/// `0x`-prefixed numbers are hexadecimal, numbers with a leading `0` are octal,
/// everything else is decimal. A suffix of `K`, `M`, `G`, `T`, `P` or `E`
/// (either case) scales by the matching power of 1024. Returns the value and
/// the unparsed remainder.
///
/// # Errors
/// [`MemmapError::MissingNumber`] if `text` does not start with a digit,
/// [`MemmapError::Overflow`] if the value does not fit 64 bits.
///
/// ```
/// # use kernel_memmap::memparse;
/// assert_eq!(memparse("64M$0x100000"), Ok((64 << 20, "$0x100000")));
/// assert_eq!(memparse("0x1000"), Ok((0x1000, "")));
/// assert_eq!(memparse("010"), Ok((8, "")));
/// ```
pub fn memparse(text: &str) -> Result<(u64, &str), MemmapError> {
    let (radix, digits) = split_radix(text);
    let end = digits
        .find(|c: char| !c.is_digit(radix))
        .unwrap_or(digits.len());
    if end == 0 {
        return Err(MemmapError::MissingNumber);
    }

    let value = u64::from_str_radix(&digits[..end], radix).map_err(|_| MemmapError::Overflow)?;
    let rest = &digits[end..];

    let shift = match rest.chars().next() {
        Some('K' | 'k') => 10,
        Some('M' | 'm') => 20,
        Some('G' | 'g') => 30,
        Some('T' | 't') => 40,
        Some('P' | 'p') => 50,
        Some('E' | 'e') => 60,
        _ => return Ok((value, rest)),
    };

    let scaled = value
        .checked_mul(1 << shift)
        .ok_or(MemmapError::Overflow)?;
    Ok((scaled, &rest[1..]))
}

fn split_radix(text: &str) -> (u32, &str) {
    if let Some(rest) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X"))
        && rest.starts_with(|c: char| c.is_ascii_hexdigit())
    {
        return (16, rest);
    }
    if text.starts_with('0') {
        // the leading zero doubles as the first octal digit
        return (8, text);
    }
    (10, text)
}

/// Parse a single `memmap=` entry.
///
/// # Errors
/// Any [`MemmapError`] describing why the entry is malformed.
pub fn parse_memmap_entry(entry: &str) -> Result<MemmapEntry, MemmapError> {
    let entry = entry.trim();
    if entry == "exactmap" {
        return Ok(MemmapEntry::ExactMap);
    }

    let (size, rest) = memparse(entry)?;
    let mut chars = rest.chars();
    let Some(op) = chars.next() else {
        return Ok(MemmapEntry::Limit { size });
    };
    let kind = MemmapKind::from_operator(op).ok_or(MemmapError::UnknownOperator(op))?;

    let (start, tail) = memparse(chars.as_str())?;
    if let Some(c) = tail.chars().next() {
        return Err(MemmapError::TrailingCharacters(c));
    }
    Ok(MemmapEntry::Range { kind, start, size })
}

/// Parse the value of a `memmap=` option: comma-separated entries, each
/// reported on its own. Empty entries are skipped.
pub fn parse_memmap_option(
    value: &str,
) -> impl Iterator<Item = Result<MemmapEntry, MemmapError>> + '_ {
    value
        .split(',')
        .filter(|entry| !entry.trim().is_empty())
        .map(parse_memmap_entry)
}

/// A `name[=value]` kernel parameter.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Parameter<'a> {
    pub name: &'a str,
    pub value: Option<&'a str>,
}

/// Iterator over the parameters of a kernel command line.
///
/// Parameters are separated by whitespace; double quotes group a value that
/// contains spaces and are removed. A lone `--` ends the kernel parameters.
#[derive(Debug, Clone)]
pub struct Parameters<'a> {
    rest: &'a str,
}

/// Split `cmdline` into its parameters.
#[must_use]
pub const fn parameters(cmdline: &str) -> Parameters<'_> {
    Parameters { rest: cmdline }
}

impl<'a> Iterator for Parameters<'a> {
    type Item = Parameter<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let rest = self.rest.trim_start();
        if rest.is_empty() {
            self.rest = rest;
            return None;
        }

        let mut in_quote = false;
        let end = rest
            .char_indices()
            .find(|&(_, c)| {
                if c == '"' {
                    in_quote = !in_quote;
                }
                c.is_whitespace() && !in_quote
            })
            .map_or(rest.len(), |(i, _)| i);

        let token = &rest[..end];
        if token == "--" {
            self.rest = "";
            return None;
        }
        self.rest = &rest[end..];

        let (name, value) = match token.split_once('=') {
            Some((name, value)) => (name, Some(value)),
            None => (token, None),
        };
        Some(Parameter {
            name: unquote(name),
            value: value.map(unquote),
        })
    }
}

fn unquote(s: &str) -> &str {
    s.trim_matches('"')
}

/// Every `memmap=` entry on `cmdline`, in order.
pub fn parse_command_line(
    cmdline: &str,
) -> impl Iterator<Item = Result<MemmapEntry, MemmapError>> + '_ {
    parameters(cmdline)
        .filter(|p| p.name == "memmap")
        .filter_map(|p| p.value)
        .flat_map(parse_memmap_option)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memparse_radixes_and_suffixes() {
        assert_eq!(memparse("4096"), Ok((4096, "")));
        assert_eq!(memparse("0x1F"), Ok((0x1F, "")));
        assert_eq!(memparse("0"), Ok((0, "")));
        assert_eq!(memparse("0755"), Ok((0o755, "")));
        assert_eq!(memparse("4k"), Ok((4096, "")));
        assert_eq!(memparse("2G@"), Ok((2 << 30, "@")));
        assert_eq!(memparse("1T"), Ok((1 << 40, "")));
        assert_eq!(memparse("1E"), Ok((1 << 60, "")));
        // hex digits win over the suffix
        assert_eq!(memparse("0x1E"), Ok((0x1E, "")));
    }

    #[test]
    fn memparse_errors() {
        assert_eq!(memparse(""), Err(MemmapError::MissingNumber));
        assert_eq!(memparse("$4G"), Err(MemmapError::MissingNumber));
        assert_eq!(memparse("16E"), Err(MemmapError::Overflow));
        assert_eq!(memparse("99999999999999999999"), Err(MemmapError::Overflow));
    }

    #[test]
    fn entries() {
        assert_eq!(
            parse_memmap_entry("64M$0x100000000"),
            Ok(MemmapEntry::Range {
                kind: MemmapKind::Reserved,
                start: 0x1_0000_0000,
                size: 64 << 20,
            })
        );
        assert_eq!(
            parse_memmap_entry("1G@2G"),
            Ok(MemmapEntry::Range {
                kind: MemmapKind::Usable,
                start: 2 << 30,
                size: 1 << 30,
            })
        );
        assert_eq!(
            parse_memmap_entry("16K#0x9F000").map(|e| matches!(
                e,
                MemmapEntry::Range {
                    kind: MemmapKind::AcpiData,
                    ..
                }
            )),
            Ok(true)
        );
        assert!(matches!(
            parse_memmap_entry("4G!12G"),
            Ok(MemmapEntry::Range {
                kind: MemmapKind::Persistent,
                ..
            })
        ));
        assert_eq!(parse_memmap_entry("512M"), Ok(MemmapEntry::Limit { size: 512 << 20 }));
        assert_eq!(parse_memmap_entry("exactmap"), Ok(MemmapEntry::ExactMap));
    }

    #[test]
    fn malformed_entries() {
        assert_eq!(
            parse_memmap_entry("4G%8G-1+2"),
            Err(MemmapError::UnknownOperator('%'))
        );
        assert_eq!(
            parse_memmap_entry("4G$"),
            Err(MemmapError::MissingNumber)
        );
        assert_eq!(
            parse_memmap_entry("4G$8Gx"),
            Err(MemmapError::TrailingCharacters('x'))
        );
    }

    #[test]
    fn option_reports_each_entry() {
        let entries: Vec<_> = parse_memmap_option("1M$2M,,bogus,4K@0x1000,").collect();
        assert_eq!(entries.len(), 3);
        assert!(entries[0].is_ok());
        assert_eq!(entries[1], Err(MemmapError::MissingNumber));
        assert!(entries[2].is_ok());
    }

    #[test]
    fn command_line_tokenizing() {
        let params: Vec<_> =
            parameters(r#"  root=/dev/sda1 quiet   "memmap=1G$4G" msg="a b c" -- init=/x"#)
                .collect();
        assert_eq!(
            params,
            [
                Parameter {
                    name: "root",
                    value: Some("/dev/sda1")
                },
                Parameter {
                    name: "quiet",
                    value: None
                },
                Parameter {
                    name: "memmap",
                    value: Some("1G$4G")
                },
                Parameter {
                    name: "msg",
                    value: Some("a b c")
                },
            ]
        );
    }

    #[test]
    fn command_line_collects_every_memmap_parameter() {
        let entries: Vec<_> = parse_command_line("memmap=1M$2M quiet memmap=exactmap,4M$8M")
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(
            entries,
            [
                MemmapEntry::Range {
                    kind: MemmapKind::Reserved,
                    start: 2 << 20,
                    size: 1 << 20,
                },
                MemmapEntry::ExactMap,
                MemmapEntry::Range {
                    kind: MemmapKind::Reserved,
                    start: 8 << 20,
                    size: 4 << 20,
                },
            ]
        );
    }
}
