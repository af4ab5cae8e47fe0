//! `recast inspect`: offline identifier diagnostics.

use crate::cli::InspectCliArgs;
use crate::file_id::{analyze, synthesize};
use anyhow::{Context, Result};
use serde_json::json;

pub fn handle_inspect_command(args: InspectCliArgs) -> Result<()> {
    println!("{}", render(&args.identifier, args.json)?);
    Ok(())
}

fn render(identifier: &str, as_json: bool) -> Result<String> {
    let report = analyze(identifier);
    let locator = synthesize(identifier);

    if as_json {
        let locator = match &locator {
            Ok(locator) => json!({
                "variant": locator.variant_name(),
                "id": locator.location().id,
                "access_hash": locator.location().access_hash,
            }),
            Err(e) => json!({ "error": e.to_string() }),
        };
        let value = json!({ "analysis": report, "locator": locator });
        return serde_json::to_string_pretty(&value).context("Failed to serialize analysis");
    }

    let mut text = report.to_string();
    if report.is_valid() {
        match locator {
            Ok(locator) => text.push_str(&format!("\nLocator: {}", locator)),
            Err(e) => text.push_str(&format!("\nLocator: unavailable ({})", e)),
        }
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;

    fn photo_identifier(access_hash: u64) -> String {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&4u32.to_le_bytes());
        bytes.extend_from_slice(&12u64.to_le_bytes());
        bytes.extend_from_slice(&0u64.to_le_bytes());
        bytes.extend_from_slice(&access_hash.to_le_bytes());
        URL_SAFE_NO_PAD.encode(bytes)
    }

    #[test]
    fn test_text_output_includes_locator() {
        let text = render(&photo_identifier(99), false).unwrap();
        assert!(text.contains("File type: photo (1)"));
        assert!(text.ends_with("Locator: photo locator (id=12, access_hash=99)"));
    }

    #[test]
    fn test_invalid_identifier_has_no_locator_line() {
        let text = render("!!", false).unwrap();
        assert!(text.contains("invalid"));
        assert!(!text.contains("Locator"));
    }

    #[test]
    fn test_json_output() {
        let value: serde_json::Value =
            serde_json::from_str(&render(&photo_identifier(0), true).unwrap()).unwrap();
        assert_eq!(value["analysis"]["status"], "valid");
        assert_eq!(value["analysis"]["dc_id"], 4);
        assert!(value["locator"]["error"]
            .as_str()
            .unwrap()
            .contains("access hash"));
    }
}
