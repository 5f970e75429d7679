//! Decoding of broker payloads into domain records.
//!
//! JSON families are published as a JSON document wrapped in a quoted string literal, so the
//! payload is unquoted once before it is parsed. External-sample families are protobuf batches.

use prost::Message;
use serde::de::DeserializeOwned;

use crate::error::{ErrorKind, GatewayResult};
use crate::types::{ExternalSample, ExternalSampleBatch, MessageFamily, Request, Sample};
use crate::{bail, gateway_error};

/// Records decoded from one payload, by family shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Requests(Vec<Request>),
    Samples(Vec<Sample>),
    ExternalSamples(Vec<ExternalSample>),
}

impl Decoded {
    pub fn len(&self) -> usize {
        match self {
            Decoded::Requests(records) => records.len(),
            Decoded::Samples(records) => records.len(),
            Decoded::ExternalSamples(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Decodes `payload` according to the shape of `family`.
///
/// A new request carries a single request object. Updates carry arrays whose last element is the
/// most recent. A payload yielding no record is rejected with [`ErrorKind::EmptyBatch`].
pub fn decode(family: MessageFamily, payload: &[u8]) -> GatewayResult<Decoded> {
    let decoded = match family {
        MessageFamily::NewRequest => Decoded::Requests(vec![decode_json::<Request>(payload)?]),
        MessageFamily::UpdatedRequest => Decoded::Requests(decode_json::<Vec<Request>>(payload)?),
        MessageFamily::UpdatedSample => Decoded::Samples(decode_json::<Vec<Sample>>(payload)?),
        MessageFamily::ReleasedExternalSamples | MessageFamily::UpdatedExternalSamples => {
            Decoded::ExternalSamples(decode_external_samples(payload)?)
        }
    };

    if decoded.is_empty() {
        bail!(
            ErrorKind::EmptyBatch,
            "Decoded batch is empty",
            format!("family `{family}`")
        );
    }

    Ok(decoded)
}

/// Unquotes the payload and parses the resulting JSON document as `T`.
pub fn decode_json<T>(payload: &[u8]) -> GatewayResult<T>
where
    T: DeserializeOwned,
{
    let text = std::str::from_utf8(payload)?;
    let document = unquote(text)?;

    serde_json::from_str(&document).map_err(|err| {
        gateway_error!(
            ErrorKind::DecodeFailed,
            "Payload is not a valid JSON document",
            err.to_string(),
            source: err
        )
    })
}

/// Parses a protobuf batch of external samples.
pub fn decode_external_samples(payload: &[u8]) -> GatewayResult<Vec<ExternalSample>> {
    let batch = ExternalSampleBatch::decode(payload)?;
    Ok(batch.samples)
}

/// Interprets `literal` as a quoted string literal and returns its value.
///
/// Double quoted literals support the escapes `\a \b \f \n \r \t \v \\ \"`, hexadecimal `\xHH`,
/// octal `\OOO` and unicode `\uHHHH`, `\UHHHHHHHH`. Backtick literals are raw and drop carriage
/// returns. Numeric byte escapes are assembled first and must form valid UTF-8.
pub fn unquote(literal: &str) -> GatewayResult<String> {
    let bytes = literal.as_bytes();
    if bytes.len() < 2 || bytes[0] != bytes[bytes.len() - 1] {
        bail!(ErrorKind::UnquoteFailed, "Payload is not a quoted string");
    }

    let inner = &literal[1..literal.len() - 1];
    match bytes[0] {
        b'`' => {
            if inner.contains('`') {
                bail!(
                    ErrorKind::UnquoteFailed,
                    "Raw string contains a backtick"
                );
            }
            Ok(inner.replace('\r', ""))
        }
        b'"' => unquote_interpreted(inner),
        _ => bail!(
            ErrorKind::UnquoteFailed,
            "Payload is not a quoted string",
            format!("unsupported quote `{}`", bytes[0] as char)
        ),
    }
}

fn unquote_interpreted(inner: &str) -> GatewayResult<String> {
    if !inner.contains(['\\', '"', '\n']) {
        return Ok(inner.to_string());
    }

    let mut out: Vec<u8> = Vec::with_capacity(inner.len());
    let mut chars = inner.char_indices();

    while let Some((position, c)) = chars.next() {
        match c {
            '"' | '\n' => bail!(
                ErrorKind::UnquoteFailed,
                "Unescaped character in quoted string",
                format!("{c:?} at byte {position}")
            ),
            '\\' => {
                let Some((_, escape)) = chars.next() else {
                    bail!(ErrorKind::UnquoteFailed, "Quoted string ends with a backslash");
                };
                match escape {
                    'a' => out.push(0x07),
                    'b' => out.push(0x08),
                    'f' => out.push(0x0c),
                    'n' => out.push(b'\n'),
                    'r' => out.push(b'\r'),
                    't' => out.push(b'\t'),
                    'v' => out.push(0x0b),
                    '\\' => out.push(b'\\'),
                    '"' => out.push(b'"'),
                    'x' => {
                        let value = take_digits(&mut chars, 2, 16)?;
                        out.push(value as u8);
                    }
                    'u' | 'U' => {
                        let width = if escape == 'u' { 4 } else { 8 };
                        let value = take_digits(&mut chars, width, 16)?;
                        let Some(decoded) = char::from_u32(value) else {
                            bail!(
                                ErrorKind::UnquoteFailed,
                                "Invalid unicode escape",
                                format!("\\{escape}{value:x}")
                            );
                        };
                        let mut buffer = [0; 4];
                        out.extend_from_slice(decoded.encode_utf8(&mut buffer).as_bytes());
                    }
                    '0'..='7' => {
                        let rest = take_digits(&mut chars, 2, 8)?;
                        let value = (escape as u32 - '0' as u32) * 64 + rest;
                        if value > 0xff {
                            bail!(
                                ErrorKind::UnquoteFailed,
                                "Octal escape out of range",
                                format!("value {value}")
                            );
                        }
                        out.push(value as u8);
                    }
                    other => bail!(
                        ErrorKind::UnquoteFailed,
                        "Unknown escape sequence",
                        format!("\\{other}")
                    ),
                }
            }
            c => {
                let mut buffer = [0; 4];
                out.extend_from_slice(c.encode_utf8(&mut buffer).as_bytes());
            }
        }
    }

    String::from_utf8(out).map_err(|err| {
        gateway_error!(
            ErrorKind::UnquoteFailed,
            "Unquoted payload is not valid UTF-8",
            err.to_string()
        )
    })
}

fn take_digits(
    chars: &mut std::str::CharIndices<'_>,
    count: usize,
    radix: u32,
) -> GatewayResult<u32> {
    let mut value = 0u32;
    for _ in 0..count {
        let digit = chars.next().and_then(|(_, c)| c.to_digit(radix));
        let Some(digit) = digit else {
            bail!(
                ErrorKind::UnquoteFailed,
                "Truncated numeric escape",
                format!("expected {count} digits in base {radix}")
            );
        };
        value = value * radix + digit;
    }

    Ok(value)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn quoted(document: &str) -> Vec<u8> {
        serde_json::to_string(document).unwrap().into_bytes()
    }

    #[test]
    fn unquote_handles_escapes() {
        assert_eq!(unquote(r#""a\tb\n\\\"""#).unwrap(), "a\tb\n\\\"");
        assert_eq!(unquote(r#""\x41\102\u00e9\U0001F600""#).unwrap(), "AB\u{e9}\u{1F600}");
        assert_eq!(unquote("`raw\\n\r`").unwrap(), "raw\\n");
        assert_eq!(unquote(r#""plain""#).unwrap(), "plain");
    }

    #[test]
    fn unquote_rejects_malformed_literals() {
        for literal in [
            "",
            "\"",
            "{\"a\":1}",
            "\"unterminated",
            "\"inner\"quote\"",
            "\"bad \\q escape\"",
            "\"\\x4\"",
            "\"\\777\"",
            "\"\\xff\"",
            "'c'",
        ] {
            let err = unquote(literal).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::UnquoteFailed, "{literal}");
        }
    }

    #[test]
    fn new_request_is_a_single_object() {
        let payload = quoted(r#"{"igoRequestId":"1","samples":[{"primaryId":"1_1","sampleName":"A"}]}"#);

        let Decoded::Requests(requests) = decode(MessageFamily::NewRequest, &payload).unwrap() else {
            panic!("expected requests");
        };

        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].samples[0].primary_id, "1_1");
    }

    #[test]
    fn nested_sample_without_name_fails_to_decode() {
        let payload = quoted(r#"{"igoRequestId":"1","samples":[{"primaryId":"1_1"}]}"#);

        let err = decode(MessageFamily::NewRequest, &payload).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::DecodeFailed);
    }

    #[test]
    fn unquoted_json_is_rejected() {
        let err = decode(MessageFamily::NewRequest, br#"{"igoRequestId":"1"}"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnquoteFailed);
    }

    #[test]
    fn updates_are_arrays_and_must_not_be_empty() {
        let payload = quoted(r#"[{"primaryId":"1_1","sampleName":"A"},{"primaryId":"1_2","sampleName":"B"}]"#);
        let decoded = decode(MessageFamily::UpdatedSample, &payload).unwrap();
        assert_eq!(decoded.len(), 2);

        let err = decode(MessageFamily::UpdatedRequest, &quoted("[]")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmptyBatch);

        let err = decode(MessageFamily::UpdatedRequest, &quoted(r#"{"igoRequestId":"1"}"#))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DecodeFailed);
    }

    #[test]
    fn external_samples_are_protobuf() {
        let batch = ExternalSampleBatch {
            samples: vec![ExternalSample {
                primary_id: "P-1".to_string(),
                cmo_sample_name: "C-1".to_string(),
                attributes: BTreeMap::from([("oncotreeCode".to_string(), "LUAD".to_string())]),
            }],
        };

        let decoded = decode(
            MessageFamily::ReleasedExternalSamples,
            &batch.encode_to_vec(),
        )
        .unwrap();
        assert_eq!(decoded, Decoded::ExternalSamples(batch.samples));

        let err = decode(MessageFamily::UpdatedExternalSamples, &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmptyBatch);

        let err = decode(MessageFamily::UpdatedExternalSamples, &[0x0a, 0xff]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DecodeFailed);
    }
}
