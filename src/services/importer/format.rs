use zip::ZipArchive;

use crate::error::{AppError, Result};
use crate::models::ArchiveFormat;

/// Scans entry names and decides which schema the archive uses. Extended
/// export entries win over account-data entries when both are present.
pub fn detect_format<R: std::io::Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
) -> Result<(ArchiveFormat, Vec<String>)> {
    let mut extended_entries = Vec::new();
    let mut account_data_entries = Vec::new();

    for i in 0..archive.len() {
        let entry = archive
            .by_index(i)
            .map_err(|e| AppError::UnrecognizedFormat(format!("corrupt archive entry: {e}")))?;
        let name = entry.name().to_string();
        let basename = name.rsplit('/').next().unwrap_or(&name);

        if matches_extended(basename) {
            extended_entries.push(name);
        } else if matches_account_data(basename) {
            account_data_entries.push(name);
        }
    }

    if !extended_entries.is_empty() {
        return Ok((ArchiveFormat::Extended, extended_entries));
    }
    if !account_data_entries.is_empty() {
        return Ok((ArchiveFormat::AccountData, account_data_entries));
    }

    Err(AppError::UnrecognizedFormat(
        "archive contains neither endsong_*.json / Streaming_History_Audio_*.json nor StreamingHistory*.json entries"
            .to_string(),
    ))
}

fn matches_extended(name: &str) -> bool {
    (name.starts_with("endsong_") || name.starts_with("Streaming_History_Audio_")) && name.ends_with(".json")
}

fn matches_account_data(name: &str) -> bool {
    name.starts_with("StreamingHistory") && name.ends_with(".json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_extended_names() {
        assert!(matches_extended("endsong_0.json"));
        assert!(matches_extended("Streaming_History_Audio_2023_1.json"));
        assert!(!matches_extended("StreamingHistory0.json"));
    }

    #[test]
    fn recognizes_account_data_names() {
        assert!(matches_account_data("StreamingHistory0.json"));
        assert!(!matches_account_data("endsong_0.json"));
    }
}
