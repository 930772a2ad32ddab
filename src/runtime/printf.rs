//! `printf`-style formatting over VM words.
//!
//! Supported conversions: `d i u x X o c s p %`, with the flags `- 0 + space #`,
//! a width and a precision (either may be `*`). Length modifiers (`h l ll z
//! j t`) are accepted and ignored since every argument is a word. A missing
//! argument reads as 0.

/// Formats `fmt` with `args`. `%s` arguments are resolved through
/// `string_at`, which returns the NUL-terminated bytes at an address.
pub fn format<E>(
    fmt: &[u8],
    args: &[i64],
    mut string_at: impl FnMut(i64) -> Result<Vec<u8>, E>,
) -> Result<Vec<u8>, E> {
    let mut out = Vec::new();
    let mut args = args.iter().copied();
    let mut next_arg = move || args.next().unwrap_or(0);
    let mut i = 0;

    while i < fmt.len() {
        let b = fmt[i];
        i += 1;
        if b != b'%' {
            out.push(b);
            continue;
        }

        let start = i - 1;
        let mut spec = Spec::default();

        // flags
        while let Some(&f) = fmt.get(i) {
            match f {
                b'-' => spec.left = true,
                b'0' => spec.zero = true,
                b'+' => spec.plus = true,
                b' ' => spec.space = true,
                b'#' => spec.alt = true,
                _ => break,
            }
            i += 1;
        }

        // width
        if fmt.get(i) == Some(&b'*') {
            i += 1;
            let w = next_arg();
            if w < 0 {
                spec.left = true;
            }
            spec.width = w.unsigned_abs() as usize;
        } else {
            spec.width = read_decimal(fmt, &mut i);
        }

        // precision
        if fmt.get(i) == Some(&b'.') {
            i += 1;
            if fmt.get(i) == Some(&b'*') {
                i += 1;
                let p = next_arg();
                spec.precision = (p >= 0).then_some(p as usize);
            } else {
                spec.precision = Some(read_decimal(fmt, &mut i));
            }
        }

        // length modifiers
        while matches!(fmt.get(i), Some(b'h' | b'l' | b'z' | b'j' | b't')) {
            i += 1;
        }

        let Some(&conv) = fmt.get(i) else {
            // dangling '%...' at the end is copied as is
            out.extend_from_slice(&fmt[start..]);
            break;
        };
        i += 1;

        match conv {
            b'd' | b'i' => {
                let v = next_arg();
                let sign = if v < 0 {
                    "-"
                } else if spec.plus {
                    "+"
                } else if spec.space {
                    " "
                } else {
                    ""
                };
                spec.integer(&mut out, sign, "", v.unsigned_abs().to_string());
            }
            b'u' => {
                let v = next_arg() as u64;
                spec.integer(&mut out, "", "", v.to_string());
            }
            b'x' | b'X' | b'p' => {
                let v = next_arg() as u64;
                let upper = conv == b'X';
                let mut digits = format!("{:x}", v);
                if upper {
                    digits.make_ascii_uppercase();
                }
                let prefix = match conv {
                    b'p' => "0x",
                    b'x' if spec.alt && v != 0 => "0x",
                    b'X' if spec.alt && v != 0 => "0X",
                    _ => "",
                };
                spec.integer(&mut out, "", prefix, digits);
            }
            b'o' => {
                let v = next_arg() as u64;
                let mut digits = format!("{:o}", v);
                if spec.alt && !digits.starts_with('0') {
                    digits.insert(0, '0');
                }
                spec.integer(&mut out, "", "", digits);
            }
            b'c' => {
                let v = next_arg();
                spec.pad(&mut out, &[v as u8]);
            }
            b's' => {
                let addr = next_arg();
                let mut s = if addr == 0 {
                    b"(null)".to_vec()
                } else {
                    string_at(addr)?
                };
                if let Some(p) = spec.precision {
                    s.truncate(p);
                }
                spec.pad(&mut out, &s);
            }
            b'%' => out.push(b'%'),
            _ => {
                // unknown conversion: emit the directive unchanged
                out.extend_from_slice(&fmt[start..i]);
            }
        }
    }

    Ok(out)
}

fn read_decimal(fmt: &[u8], i: &mut usize) -> usize {
    let mut n: usize = 0;
    while let Some(d @ b'0'..=b'9') = fmt.get(*i).copied() {
        n = n.saturating_mul(10).saturating_add((d - b'0') as usize);
        *i += 1;
    }
    n
}

#[derive(Debug, Default)]
struct Spec {
    left: bool,
    zero: bool,
    plus: bool,
    space: bool,
    alt: bool,
    width: usize,
    precision: Option<usize>,
}

impl Spec {
    /// Pads `body` with spaces to the field width.
    fn pad(&self, out: &mut Vec<u8>, body: &[u8]) {
        let fill = self.width.saturating_sub(body.len());
        if !self.left {
            out.extend(std::iter::repeat_n(b' ', fill));
        }
        out.extend_from_slice(body);
        if self.left {
            out.extend(std::iter::repeat_n(b' ', fill));
        }
    }

    /// Lays out `sign prefix digits` honoring precision and zero padding.
    fn integer(&self, out: &mut Vec<u8>, sign: &str, prefix: &str, mut digits: String) {
        if let Some(p) = self.precision {
            if p == 0 && digits == "0" {
                digits.clear();
            }
            while digits.len() < p {
                digits.insert(0, '0');
            }
        }

        let len = sign.len() + prefix.len() + digits.len();
        let fill = self.width.saturating_sub(len);

        if self.left {
            out.extend_from_slice(sign.as_bytes());
            out.extend_from_slice(prefix.as_bytes());
            out.extend_from_slice(digits.as_bytes());
            out.extend(std::iter::repeat_n(b' ', fill));
        } else if self.zero && self.precision.is_none() {
            out.extend_from_slice(sign.as_bytes());
            out.extend_from_slice(prefix.as_bytes());
            out.extend(std::iter::repeat_n(b'0', fill));
            out.extend_from_slice(digits.as_bytes());
        } else {
            out.extend(std::iter::repeat_n(b' ', fill));
            out.extend_from_slice(sign.as_bytes());
            out.extend_from_slice(prefix.as_bytes());
            out.extend_from_slice(digits.as_bytes());
        }
    }
}
