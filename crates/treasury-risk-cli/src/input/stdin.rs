use std::io::{self, Read};

/// Read piped stdin as raw bytes.
/// Returns None if stdin is a TTY (interactive) or nothing was piped.
pub fn read_stdin() -> Result<Option<Vec<u8>>, Box<dyn std::error::Error>> {
    if atty::is(atty::Stream::Stdin) {
        return Ok(None);
    }

    let mut buffer = Vec::new();
    io::stdin().read_to_end(&mut buffer)?;

    if buffer.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    Ok(Some(buffer))
}
