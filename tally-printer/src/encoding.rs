//! Text measurement and encoding for thermal printers
//!
//! Layout is computed in printer columns. With UTF-8 output one
//! character is one column; with GBK output a character takes as many
//! columns as it has GBK bytes (CJK glyphs are double width).

use std::fmt;
use std::str::FromStr;

use tracing::instrument;

use crate::error::PrintError;

/// Marker appended to shortened item names
pub const ELLIPSIS: &str = "..";

/// Character set the printer expects for text
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TextEncoding {
    #[default]
    Utf8,
    Gbk,
}

impl TextEncoding {
    /// Column width of a string
    pub fn width(&self, s: &str) -> usize {
        match self {
            TextEncoding::Utf8 => s.chars().count(),
            TextEncoding::Gbk => gbk_width(s),
        }
    }

    /// Column width of a single character
    fn char_width(&self, c: char) -> usize {
        match self {
            TextEncoding::Utf8 => 1,
            TextEncoding::Gbk => {
                let mut tmp = [0u8; 4];
                gbk_width(c.encode_utf8(&mut tmp))
            }
        }
    }

    /// Longest prefix of `s` that fits in `max_width` columns
    pub fn truncate(&self, s: &str, max_width: usize) -> String {
        let mut width = 0;
        let mut result = String::new();
        for c in s.chars() {
            let w = self.char_width(c);
            if width + w > max_width {
                break;
            }
            result.push(c);
            width += w;
        }
        result
    }

    /// Shorten `s` to `max_width` columns, ending in [`ELLIPSIS`] when cut
    pub fn ellipsize(&self, s: &str, max_width: usize) -> String {
        if self.width(s) <= max_width {
            return s.to_string();
        }
        let marker = ELLIPSIS.len();
        if max_width <= marker {
            return ELLIPSIS[..max_width].to_string();
        }
        let mut out = self.truncate(s, max_width - marker);
        out.push_str(ELLIPSIS);
        out
    }

    /// Pad `s` with spaces to exactly `width` columns, truncating if longer
    pub fn pad(&self, s: &str, width: usize, align_right: bool) -> String {
        let current = self.width(s);
        if current >= width {
            let cut = self.truncate(s, width);
            let short = width - self.width(&cut);
            return format!("{}{}", cut, " ".repeat(short));
        }
        let spaces = " ".repeat(width - current);
        if align_right {
            format!("{}{}", spaces, s)
        } else {
            format!("{}{}", s, spaces)
        }
    }

    /// Convert a built command buffer (UTF-8 text + control codes) to output bytes
    pub fn encode(&self, bytes: &[u8]) -> Vec<u8> {
        match self {
            TextEncoding::Utf8 => bytes.to_vec(),
            TextEncoding::Gbk => convert_to_gbk(bytes),
        }
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextEncoding::Utf8 => f.write_str("utf8"),
            TextEncoding::Gbk => f.write_str("gbk"),
        }
    }
}

impl FromStr for TextEncoding {
    type Err = PrintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "utf8" | "utf-8" => Ok(TextEncoding::Utf8),
            "gbk" => Ok(TextEncoding::Gbk),
            other => Err(PrintError::InvalidConfig(format!(
                "unknown text encoding: {}",
                other
            ))),
        }
    }
}

/// Get the GBK byte width of a string
///
/// Characters GBK cannot map count as one column, matching the `?`
/// they are printed as.
pub fn gbk_width(s: &str) -> usize {
    let mut tmp = [0u8; 4];
    s.chars()
        .map(|c| {
            let (cow, _, unmappable) = encoding_rs::GBK.encode(c.encode_utf8(&mut tmp));
            if unmappable { 1 } else { cow.len() }
        })
        .sum()
}

/// Convert mixed UTF-8 content (with ESC/POS commands) to GBK
///
/// ASCII bytes (0x00-0x7F) pass through untouched so control codes
/// survive. Every INIT (ESC @) is followed by FS & because INIT drops
/// the printer out of double-byte mode. Characters GBK cannot map are
/// printed as `?`.
#[instrument(skip(bytes), fields(len = bytes.len()))]
pub fn convert_to_gbk(bytes: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(bytes.len() * 2);
    let mut buffer = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];

        if b == 0x1B && i + 1 < bytes.len() && bytes[i + 1] == 0x40 {
            flush_buffer(&mut buffer, &mut result);
            result.extend_from_slice(&[0x1B, 0x40, 0x1C, 0x26]);
            i += 2;
            continue;
        }

        if b < 128 {
            flush_buffer(&mut buffer, &mut result);
            result.push(b);
        } else {
            buffer.push(b);
        }
        i += 1;
    }

    flush_buffer(&mut buffer, &mut result);
    result
}

/// Flush the non-ASCII buffer, converting UTF-8 to GBK
fn flush_buffer(buffer: &mut Vec<u8>, result: &mut Vec<u8>) {
    if buffer.is_empty() {
        return;
    }

    let s = String::from_utf8_lossy(buffer);
    let mut tmp = [0u8; 4];
    for c in s.chars() {
        let (gbk, _, unmappable) = encoding_rs::GBK.encode(c.encode_utf8(&mut tmp));
        if unmappable {
            result.push(b'?');
        } else {
            result.extend_from_slice(&gbk);
        }
    }
    buffer.clear();
}
