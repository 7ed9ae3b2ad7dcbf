use anyhow::{Context, Result, anyhow};
use encoding::DecoderTrap;
use encoding::label::encoding_from_whatwg_label;
use std::path::Path;

/// Read a whole file and decode it to UTF-8.
pub fn read_to_utf8(path: &Path) -> Result<String> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Could not read file: {}", path.display()))?;
    decode_to_utf8(&bytes)
}

/// Decode bytes to UTF-8, detecting the charset when they are not UTF-8 already
/// (unknown characters are ignored)
/// ref. https://github.com/thuleqaid/rust-chardet
pub fn decode_to_utf8(input: &[u8]) -> Result<String> {
    if let Ok(text) = std::str::from_utf8(input) {
        return Ok(text.strip_prefix('\u{feff}').unwrap_or(text).to_string());
    }

    // (charset, confidence, language)
    let detected = chardet::detect(input);
    let coder = encoding_from_whatwg_label(chardet::charset2encoding(&detected.0));
    match coder {
        Some(c) => c
            .decode(input, DecoderTrap::Ignore)
            .map_err(|e| anyhow!("cannot decode as {}: {:?}", detected.0, e)),
        None => Err(anyhow!("cannot find character encodings: {:?}", &detected)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use encoding::EncoderTrap;
    use encoding::all::WINDOWS_1251;
    use encoding::types::Encoding;

    #[test]
    fn test_utf8_passthrough() -> Result<()> {
        assert_eq!(decode_to_utf8("Страница 1".as_bytes())?, "Страница 1");
        assert_eq!(decode_to_utf8("\u{feff}Page: 1".as_bytes())?, "Page: 1");
        assert_eq!(decode_to_utf8(b"")?, "");
        Ok(())
    }

    #[test]
    fn test_detect_legacy_cyrillic() -> Result<()> {
        let text = "Пояснительная записка к годовому отчёту о деятельности \
                    предприятия за прошедший период. Основные показатели \
                    работы приведены в таблицах ниже.";
        let bytes = WINDOWS_1251
            .encode(text, EncoderTrap::Strict)
            .map_err(|e| anyhow!("{e}"))?;
        assert!(std::str::from_utf8(&bytes).is_err());
        let decoded = decode_to_utf8(&bytes)?;
        assert!(!decoded.is_empty());
        Ok(())
    }

    #[test]
    fn test_read_missing_file() {
        let err = read_to_utf8(Path::new("/nonexistent/paged-rag.txt")).unwrap_err();
        assert!(err.to_string().contains("Could not read file"));
    }
}
