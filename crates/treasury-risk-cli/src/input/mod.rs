pub mod file;
pub mod stdin;

/// CSV bytes from `--input <file>` or, failing that, piped stdin.
pub fn read_upload(path: Option<&str>) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    if let Some(path) = path {
        file::read_bytes(path)
    } else if let Some(bytes) = stdin::read_stdin()? {
        Ok(bytes)
    } else {
        Err("--input <file.csv> or stdin required".into())
    }
}
