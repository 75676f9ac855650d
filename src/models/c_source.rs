//! C byte-array export of a model for microcontroller builds
//!
//! Produces the same text `xxd -i` does, with the array renamed to a fixed symbol.

use super::artifact::{read_artifact, write_atomic};
use crate::error::Result;
use std::fmt::Write;
use std::path::Path;

const BYTES_PER_LINE: usize = 12;

/// Render `bytes` as `unsigned char <name>[]` plus `unsigned int <name>_len`
pub fn render_c_array(name: &str, bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 6 + 128);
    let _ = writeln!(out, "unsigned char {}[] = {{", name);

    let lines: Vec<String> = bytes
        .chunks(BYTES_PER_LINE)
        .map(|chunk| {
            let hex: Vec<String> = chunk.iter().map(|b| format!("0x{:02x}", b)).collect();
            format!("  {}", hex.join(", "))
        })
        .collect();
    if !lines.is_empty() {
        out.push_str(&lines.join(",\n"));
        out.push('\n');
    }

    out.push_str("};\n");
    let _ = writeln!(out, "unsigned int {}_len = {};", name, bytes.len());
    out
}

/// Export the artifact at `model` as C source at `output`; returns the source size
pub fn export_c_source(model: &Path, output: &Path, name: &str) -> Result<u64> {
    let bytes = read_artifact(model)?;
    let source = render_c_array(name, &bytes);
    let size = write_atomic(output, source.as_bytes())?;
    log::info!(
        "Exported {} ({} bytes) as {}[] in {}",
        model.display(),
        bytes.len(),
        name,
        output.display()
    );
    Ok(size)
}
