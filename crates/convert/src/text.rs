use std::fs;
use std::path::Path;

const TAB: &str = "    ";

/// Reads a text file, replacing invalid UTF-8 sequences.
pub(crate) fn read_text(path: &Path) -> std::io::Result<String> {
    let bytes = fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Breaks text into lines of at most `width` characters, wrapping at spaces
/// and splitting words that do not fit on a line of their own.
pub(crate) fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();

    for raw in text.lines() {
        let raw = raw.replace('\t', TAB);
        let mut line = String::new();
        let mut line_len = 0;
        let mut fresh = true;

        for word in raw.split(' ') {
            let mut word: Vec<char> = word.chars().collect();

            let needed = if fresh { word.len() } else { line_len + 1 + word.len() };
            if needed <= width {
                if !fresh {
                    line.push(' ');
                    line_len += 1;
                }
                line.extend(word.iter());
                line_len += word.len();
                fresh = false;
                continue;
            }

            if !fresh {
                lines.push(std::mem::take(&mut line));
            }

            while word.len() > width {
                let rest = word.split_off(width);
                lines.push(word.into_iter().collect());
                word = rest;
            }
            line.extend(word.iter());
            line_len = word.len();
            fresh = false;
        }

        lines.push(line);
    }

    lines
}

/// Encodes a line for a standard Type 1 font. Characters outside Latin-1 and
/// control characters become `?`.
pub(crate) fn latin1(line: &str) -> Vec<u8> {
    line.chars()
        .map(|ch| match u8::try_from(u32::from(ch)) {
            Ok(byte) if byte >= 0x20 && byte != 0x7f => byte,
            _ => b'?',
        })
        .collect()
}
