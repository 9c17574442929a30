//! Text decoding by trial.
//!
//! Candidate encodings are tried in a fixed order and the first one that
//! decodes without error wins. There is no BOM sniffing beyond dropping a
//! leading UTF-8 BOM, and no statistical detection.

use encoding_rs::WINDOWS_1252;

/// A candidate text encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    Latin1,
    Windows1252,
    Ascii,
}

impl TextEncoding {
    pub fn label(self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "utf-8",
            TextEncoding::Latin1 => "latin-1",
            TextEncoding::Windows1252 => "cp1252",
            TextEncoding::Ascii => "ascii",
        }
    }

    /// Strict decode; `None` when any byte is invalid for this encoding.
    pub fn decode(self, bytes: &[u8]) -> Option<String> {
        match self {
            TextEncoding::Utf8 => std::str::from_utf8(bytes).ok().map(str::to_owned),
            // Every byte maps to the code point of the same value.
            TextEncoding::Latin1 => Some(bytes.iter().map(|&b| b as char).collect()),
            TextEncoding::Windows1252 => WINDOWS_1252
                .decode_without_bom_handling_and_without_replacement(bytes)
                .map(|cow| cow.into_owned()),
            TextEncoding::Ascii => {
                if bytes.is_ascii() {
                    std::str::from_utf8(bytes).ok().map(str::to_owned)
                } else {
                    None
                }
            }
        }
    }
}

/// Order used by the tabular converter.
pub const TABULAR_ENCODINGS: &[TextEncoding] = &[
    TextEncoding::Utf8,
    TextEncoding::Latin1,
    TextEncoding::Windows1252,
];

/// Order used by the plain-text converter.
pub const TEXT_ENCODINGS: &[TextEncoding] = &[
    TextEncoding::Utf8,
    TextEncoding::Latin1,
    TextEncoding::Windows1252,
    TextEncoding::Ascii,
];

/// Try each encoding in order and return the first successful decode.
pub fn decode_first(bytes: &[u8], order: &[TextEncoding]) -> Option<(TextEncoding, String)> {
    let bytes = strip_utf8_bom(bytes);
    order
        .iter()
        .find_map(|&enc| enc.decode(bytes).map(|text| (enc, text)))
}

/// Comma-separated labels, for error messages.
pub fn labels(order: &[TextEncoding]) -> String {
    order.iter().map(|e| e.label()).collect::<Vec<_>>().join(", ")
}

/// UTF-8 with replacement characters; never fails.
pub fn decode_lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(strip_utf8_bom(bytes)).into_owned()
}

fn strip_utf8_bom(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes)
}
