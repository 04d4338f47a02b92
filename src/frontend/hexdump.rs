use std::io::{self, Write};

/// Write `bytes` as two-digit hex pairs, each followed by a space.
pub fn write_hex_spaced(bytes: &[u8], out: &mut impl Write) -> io::Result<()> {
    for b in bytes {
        write!(out, "{:02x} ", b)?;
    }
    Ok(())
}

/// Classic offset / hex / ASCII dump.
pub fn hexdump(bytes: &[u8], bytes_per_row: usize, out: &mut impl Write) -> io::Result<()> {
    HexDumper::new()
        .no_color()
        .bytes_per_row(bytes_per_row)
        .dump(bytes, out)
}

pub struct HexDumper {
    pub color: bool,
    pub bytes_per_row: usize,
}

impl Default for HexDumper {
    fn default() -> Self {
        Self {
            color: true,
            bytes_per_row: 16,
        }
    }
}

impl HexDumper {
    // ANSI colors
    const RESET: &'static str = "\x1b[0m";
    const DIM: &'static str = "\x1b[2m";
    const CYN: &'static str = "\x1b[36m";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn no_color(mut self) -> Self {
        self.color = false;
        self
    }

    pub fn bytes_per_row(mut self, n: usize) -> Self {
        self.bytes_per_row = n.max(1);
        self
    }

    pub fn dump(&self, bytes: &[u8], out: &mut impl Write) -> io::Result<()> {
        for (row, chunk) in bytes.chunks(self.bytes_per_row).enumerate() {
            self.print_row(row * self.bytes_per_row, chunk, out)?;
        }
        Ok(())
    }

    fn print_row(&self, offset: usize, chunk: &[u8], out: &mut impl Write) -> io::Result<()> {
        let (dim, cyn, reset) = if self.color {
            (Self::DIM, Self::CYN, Self::RESET)
        } else {
            ("", "", "")
        };

        write!(out, "{}{:04x}:{} ", dim, offset, reset)?;

        write!(out, "{}", cyn)?;
        write_hex_spaced(chunk, out)?;
        write!(out, "{}", reset)?;
        // pad a short last row so the ASCII column lines up
        for _ in chunk.len()..self.bytes_per_row {
            write!(out, "   ")?;
        }

        write!(out, " ")?;
        for &b in chunk {
            if b.is_ascii_graphic() || b == b' ' {
                write!(out, "{}", b as char)?;
            } else {
                write!(out, "{}.{}", dim, reset)?;
            }
        }
        writeln!(out)
    }
}
