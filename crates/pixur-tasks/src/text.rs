use pixur_types::Status;

/// Checks user supplied text against length bounds and rejects control
/// characters. Newlines are only accepted where `multiline` is set.
///
/// Lengths are counted in characters. Returns the text with surrounding
/// whitespace removed.
pub fn validate_and_normalize(
    text: &str,
    field: &str,
    min: i64,
    max: i64,
    multiline: bool,
) -> Result<String, Status> {
    let normalized = text.trim();
    for c in normalized.chars() {
        if c == '\n' || c == '\r' {
            if !multiline {
                return Err(Status::invalid_argument("unsupported newline"));
            }
        } else if c.is_control() {
            return Err(Status::invalid_argument(format!(
                "unsupported {} character {:?}",
                field, c
            )));
        }
    }

    let len = i64::try_from(normalized.chars().count()).unwrap_or(i64::MAX);
    if len < min {
        return Err(Status::invalid_argument(format!("{} too short", field)));
    }
    if len > max {
        return Err(Status::invalid_argument(format!("{} too long", field)));
    }
    Ok(normalized.to_string())
}
