//! Line-level source map, appended to development output as a trailing
//! comment so runtime errors in generated code can be traced back to the
//! template line that produced them.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::error::CompileError;

const MAP_PREFIX: &str = "//# quillMap=";

/// One generated-line to template-position association.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapEntry {
    /// 1-based line in the generated code.
    pub generated_line: u32,
    /// 1-based template position.
    pub line: u32,
    pub column: u32,
}

/// Serialize entries into the trailing map comment.
pub fn encode_map(entries: &[MapEntry]) -> String {
    // Serialization of these plain structs cannot fail.
    let json = serde_json::to_string(entries).unwrap_or_default();
    format!("{}{}", MAP_PREFIX, STANDARD.encode(json))
}

/// Recover map entries from generated code carrying the trailing comment.
/// Tooling-side inverse of [`encode_map`]; returns an empty list when no map
/// comment is present.
pub fn decode_source_map(generated: &str) -> Result<Vec<MapEntry>, CompileError> {
    let Some(line) = generated
        .lines()
        .rev()
        .find(|l| l.trim_start().starts_with(MAP_PREFIX))
    else {
        return Ok(Vec::new());
    };
    let payload = line.trim_start().trim_start_matches(MAP_PREFIX);
    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| CompileError::at("Q-ERR-MAP", &format!("bad map encoding: {}", e), 1, 1))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| CompileError::at("Q-ERR-MAP", &format!("bad map payload: {}", e), 1, 1))
}
