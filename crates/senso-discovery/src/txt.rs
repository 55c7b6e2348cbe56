//! Parsing for mDNS TXT records advertised by Senso instances.

/// Fields of interest pulled out of a TXT record. `mode` defaults to the
/// empty string when the record carries no `mode=` entry.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ParsedText {
    pub serial: Option<String>,
    pub mode: String,
}

/// Parse raw `key=value` TXT fields as advertised over mDNS.
pub fn parse_txt<S: AsRef<str>>(fields: &[S]) -> ParsedText {
    let mut text = ParsedText::default();
    for field in fields {
        let field = field.as_ref();
        if let Some(rest) = field.strip_prefix("ser_no=") {
            text.serial = Some(clean_serial(rest));
        } else if let Some(rest) = field.strip_prefix("mode=") {
            text.mode = rest.to_owned();
        }
    }
    text
}

/// Senso firmware up to 3.8.0 pads the serial TXT field with a `\000`-escaped
/// tail due to fixed-width string encoding on the device side; keep only the
/// text before the first such escape.
fn clean_serial(raw: &str) -> String {
    raw.split("\\000").next().unwrap_or(raw).to_owned()
}
