//! # Canonical JSON
//!
//! RFC 8785 (JCS) serialization of documents. These bytes are what gets
//! stored, hashed and exchanged with peers, so two implementations given
//! the same logical document must agree byte for byte:
//!
//! - object members sorted by UTF-16 code units,
//! - no insignificant whitespace,
//! - numbers in ECMAScript `Number.prototype.toString` form,
//! - minimal string escaping, non-ASCII emitted as UTF-8.

use serde::Serialize;
use serde_json::Value;

use super::document::Document;
use super::DidError;

/// Canonical bytes of a document snapshot.
pub fn canonicalize(document: &Document) -> Result<Vec<u8>, DidError> {
    canonicalize_value(document)
}

/// Canonical bytes of any serializable value.
///
/// `serde_jcs` formats scalars. Object members are ordered here, since
/// `serde_json` maps iterate in UTF-8 byte order, which differs from UTF-16
/// order for keys beyond the Basic Multilingual Plane.
pub fn canonicalize_value<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, DidError> {
    let value = serde_json::to_value(value).map_err(serialization)?;
    let mut out = Vec::new();
    write_value(&value, &mut out)?;
    Ok(out)
}

fn write_value(value: &Value, out: &mut Vec<u8>) -> Result<(), DidError> {
    match value {
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_value(item, out)?;
            }
            out.push(b']');
        }
        Value::Object(members) => {
            let mut entries: Vec<(&String, &Value)> = members.iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.encode_utf16().cmp(b.encode_utf16()));
            out.push(b'{');
            for (i, (key, member)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                out.extend(serde_jcs::to_vec(key).map_err(serialization)?);
                out.push(b':');
                write_value(member, out)?;
            }
            out.push(b'}');
        }
        scalar => out.extend(serde_jcs::to_vec(scalar).map_err(serialization)?),
    }
    Ok(())
}

fn serialization(e: impl std::fmt::Display) -> DidError {
    DidError::Serialization(e.to_string())
}
