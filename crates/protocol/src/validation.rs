use crate::ProtocolError;

/// Validates that a file hash is safe to use as a single path component.
///
/// Rejects:
/// - Empty strings
/// - Anything other than ASCII letters and digits (separators, dots, dashes)
pub fn validate_file_hash(hash: &str) -> Result<(), ProtocolError> {
    if hash.is_empty() {
        return Err(ProtocolError::InvalidFileHash("empty hash".into()));
    }

    if !hash.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err(ProtocolError::InvalidFileHash(format!(
            "only ASCII alphanumerics allowed: {hash}"
        )));
    }

    Ok(())
}

/// Returns the extension of `filename` including the leading dot.
///
/// Directory components (either separator style) are ignored, a leading dot
/// does not start an extension, and a name without one yields `""`.
/// The extension becomes part of a stored filename, so it may only contain
/// ASCII alphanumerics, `_` and `-`.
pub fn extension_of(filename: &str) -> Result<String, ProtocolError> {
    if filename.is_empty() {
        return Err(ProtocolError::InvalidFilename("empty filename".into()));
    }

    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let ext = match base.rfind('.') {
        Some(pos) if pos > 0 => &base[pos + 1..],
        _ => return Ok(String::new()),
    };

    if ext.is_empty() {
        return Ok(String::new());
    }

    if !ext
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    {
        return Err(ProtocolError::InvalidFilename(format!(
            "unsupported extension in {filename}"
        )));
    }

    Ok(format!(".{ext}"))
}
