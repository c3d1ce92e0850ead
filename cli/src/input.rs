use std::fs;
use std::io::Read;

use anyhow::{Context, Result};
use base64::Engine;

/// Reads from `path`, or from stdin when `path` is `None` or `"-"`.
pub fn read_input(path: Option<&str>) -> Result<String> {
    match path {
        None | Some("-") => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read stdin")?;
            Ok(buf)
        }
        Some(path) => fs::read_to_string(path).with_context(|| format!("failed to read {path}")),
    }
}

/// Hex- or base64-decodes `input`, trying hex first since it's the more
/// common wire format for raw transactions and scripts.
pub fn decode_input(input: &str) -> Result<Vec<u8>> {
    let trimmed = input.trim();
    if let Ok(bytes) = hex::decode(trimmed) {
        return Ok(bytes);
    }
    base64::engine::general_purpose::STANDARD
        .decode(trimmed)
        .context("input is neither valid hex nor valid base64")
}
