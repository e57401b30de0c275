//! ESC/POS command builder
//!
//! Provides a fluent API for building ESC/POS print data, plus the
//! fixed-width row layout used by receipts and kitchen tickets.

use crate::encoding::TextEncoding;

/// Line width of 80mm paper in normal-size columns
pub const DEFAULT_WIDTH: usize = 48;

/// Columns reserved on the right of an item row for the line total
pub const ITEM_TOTAL_COLUMN: usize = 10;

/// Raw command sequences
pub mod cmd {
    /// ESC @ - initialize
    pub const INIT: &[u8] = &[0x1B, 0x40];
    /// ESC a n - alignment
    pub const ALIGN_LEFT: &[u8] = &[0x1B, 0x61, 0x00];
    pub const ALIGN_CENTER: &[u8] = &[0x1B, 0x61, 0x01];
    pub const ALIGN_RIGHT: &[u8] = &[0x1B, 0x61, 0x02];
    /// ESC E n - emphasis
    pub const BOLD_ON: &[u8] = &[0x1B, 0x45, 0x01];
    pub const BOLD_OFF: &[u8] = &[0x1B, 0x45, 0x00];
    /// ESC - n - underline
    pub const UNDERLINE_ON: &[u8] = &[0x1B, 0x2D, 0x01];
    pub const UNDERLINE_OFF: &[u8] = &[0x1B, 0x2D, 0x00];
    /// GS ! n - character size
    pub const SIZE_NORMAL: &[u8] = &[0x1D, 0x21, 0x00];
    pub const SIZE_DOUBLE_HEIGHT: &[u8] = &[0x1D, 0x21, 0x01];
    pub const SIZE_DOUBLE_WIDTH: &[u8] = &[0x1D, 0x21, 0x10];
    pub const SIZE_DOUBLE: &[u8] = &[0x1D, 0x21, 0x11];
    /// GS V n - paper cut
    pub const CUT_FULL: &[u8] = &[0x1D, 0x56, 0x00];
    pub const CUT_PARTIAL: &[u8] = &[0x1D, 0x56, 0x01];
    /// ESC p m t1 t2 - drawer kick on pin 2
    pub const DRAWER_KICK: &[u8] = &[0x1B, 0x70, 0x00, 25, 250];
}

/// Lay out a two-column row in exactly `width` columns
///
/// The right field lands flush at the last column. When both fields do
/// not fit with a separating space, the left field is cut so exactly one
/// space remains before the right field. A right field wider than the
/// line is itself cut to the line width.
pub fn layout_row(left: &str, right: &str, width: usize, enc: TextEncoding) -> String {
    let rw = enc.width(right);
    if rw >= width {
        return enc.pad(right, width, false);
    }

    let max_left = width - rw - 1;
    let left = if enc.width(left) > max_left {
        enc.truncate(left, max_left)
    } else {
        left.to_string()
    };

    format!("{}{}", enc.pad(&left, width - rw, false), right)
}

/// Lay out an item row: `"{qty}x {name}"` on the left, total on the right
///
/// The name is shortened with an ellipsis when it would run into the
/// total column.
pub fn layout_item_row(
    quantity: u32,
    name: &str,
    total: &str,
    width: usize,
    enc: TextEncoding,
) -> String {
    let prefix = format!("{}x ", quantity);
    let total_col = ITEM_TOTAL_COLUMN.max(enc.width(total));
    let available = width.saturating_sub(enc.width(&prefix) + total_col + 1);
    let name = enc.ellipsize(name, available);
    layout_row(&format!("{}{}", prefix, name), total, width, enc)
}

/// ESC/POS command builder
///
/// Text is accumulated as UTF-8 and converted to the configured
/// [`TextEncoding`] by [`build`](Self::build).
pub struct EscPosBuilder {
    buf: Vec<u8>,
    width: usize,
    encoding: TextEncoding,
}

impl EscPosBuilder {
    /// Create a new builder with the specified paper width in columns
    ///
    /// Common widths:
    /// - 58mm paper: 32 characters
    /// - 80mm paper: 48 characters
    ///
    /// The buffer starts with the initialize command.
    pub fn new(width: usize) -> Self {
        let mut buf = Vec::with_capacity(4096);
        buf.extend_from_slice(cmd::INIT);
        Self {
            buf,
            width,
            encoding: TextEncoding::Utf8,
        }
    }

    /// Select the output character set
    pub fn with_encoding(mut self, encoding: TextEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Get the configured paper width
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn encoding(&self) -> TextEncoding {
        self.encoding
    }

    // === Text Output ===

    /// Write raw text
    pub fn text(&mut self, s: &str) -> &mut Self {
        self.buf.extend_from_slice(s.as_bytes());
        self
    }

    /// Write text followed by newline
    pub fn line(&mut self, s: &str) -> &mut Self {
        self.text(s);
        self.buf.push(b'\n');
        self
    }

    /// Write empty line
    pub fn newline(&mut self) -> &mut Self {
        self.buf.push(b'\n');
        self
    }

    /// Print and feed n lines (ESC d n)
    pub fn feed(&mut self, lines: u8) -> &mut Self {
        self.buf.extend_from_slice(&[0x1B, 0x64, lines]);
        self
    }

    // === Alignment ===

    pub fn center(&mut self) -> &mut Self {
        self.raw(cmd::ALIGN_CENTER)
    }

    pub fn left(&mut self) -> &mut Self {
        self.raw(cmd::ALIGN_LEFT)
    }

    pub fn right(&mut self) -> &mut Self {
        self.raw(cmd::ALIGN_RIGHT)
    }

    // === Text Style ===

    pub fn bold(&mut self) -> &mut Self {
        self.raw(cmd::BOLD_ON)
    }

    pub fn bold_off(&mut self) -> &mut Self {
        self.raw(cmd::BOLD_OFF)
    }

    pub fn underline(&mut self) -> &mut Self {
        self.raw(cmd::UNDERLINE_ON)
    }

    pub fn underline_off(&mut self) -> &mut Self {
        self.raw(cmd::UNDERLINE_OFF)
    }

    /// Double width and height
    pub fn double_size(&mut self) -> &mut Self {
        self.raw(cmd::SIZE_DOUBLE)
    }

    pub fn double_height(&mut self) -> &mut Self {
        self.raw(cmd::SIZE_DOUBLE_HEIGHT)
    }

    pub fn double_width(&mut self) -> &mut Self {
        self.raw(cmd::SIZE_DOUBLE_WIDTH)
    }

    /// Reset to normal size
    pub fn reset_size(&mut self) -> &mut Self {
        self.raw(cmd::SIZE_NORMAL)
    }

    // === Separators ===

    /// Print `ch` repeated across the full line width
    pub fn rule(&mut self, ch: char) -> &mut Self {
        let line: String = std::iter::repeat_n(ch, self.width).collect();
        self.line(&line)
    }

    /// Print a line of '-' characters
    pub fn sep_single(&mut self) -> &mut Self {
        self.rule('-')
    }

    /// Print a line of '=' characters
    pub fn sep_double(&mut self) -> &mut Self {
        self.rule('=')
    }

    // === Layout Helpers ===

    /// Two-column row across the full width, see [`layout_row`]
    pub fn row(&mut self, left: &str, right: &str) -> &mut Self {
        self.row_in(left, right, self.width)
    }

    /// Two-column row laid out in `columns` columns
    ///
    /// Used under double-width text where only half the columns exist.
    pub fn row_in(&mut self, left: &str, right: &str, columns: usize) -> &mut Self {
        let line = layout_row(left, right, columns, self.encoding);
        self.line(&line)
    }

    /// Item row with quantity prefix and total column, see [`layout_item_row`]
    pub fn item_row(&mut self, quantity: u32, name: &str, total: &str) -> &mut Self {
        let line = layout_item_row(quantity, name, total, self.width, self.encoding);
        self.line(&line)
    }

    // === Paper Control ===

    /// Cut paper (full cut)
    pub fn cut(&mut self) -> &mut Self {
        self.raw(cmd::CUT_FULL)
    }

    /// Partial cut (leave a small connection)
    pub fn cut_partial(&mut self) -> &mut Self {
        self.raw(cmd::CUT_PARTIAL)
    }

    // === Cash Drawer ===

    /// Open cash drawer (pin 2)
    pub fn open_drawer(&mut self) -> &mut Self {
        self.raw(cmd::DRAWER_KICK)
    }

    // === Raw Commands ===

    /// Write raw bytes directly
    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    // === Build ===

    /// Build the final byte stream in the configured encoding
    pub fn build(self) -> Vec<u8> {
        self.encoding.encode(&self.buf)
    }
}

impl Default for EscPosBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_WIDTH)
    }
}
