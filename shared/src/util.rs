/// Current UTC timestamp in milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Generate a session id.
///
/// Format: `ses-<uuid>`. Opaque to callers; the prefix exists only to make
/// log lines and index dumps readable.
pub fn session_id() -> String {
    format!("ses-{}", uuid::Uuid::new_v4())
}

/// Generate a takeover request id.
pub fn takeover_id() -> String {
    format!("tkr-{}", uuid::Uuid::new_v4())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(session_id(), session_id());
        assert_ne!(takeover_id(), takeover_id());
        assert!(session_id().starts_with("ses-"));
        assert!(takeover_id().starts_with("tkr-"));
    }

    #[test]
    fn test_now_millis_monotonic_enough() {
        let a = now_millis();
        let b = now_millis();
        assert!(b >= a);
    }
}
