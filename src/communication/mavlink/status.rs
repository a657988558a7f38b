//! STATUSTEXT construction
//!
//! Operator-visible protocol outcomes go out as STATUSTEXT alongside the
//! protocol ACKs. Messages are single-chunk; text beyond the 50-byte wire
//! field is truncated.

use mavlink::common::{MavMessage, MavSeverity, STATUSTEXT_DATA};

/// STATUSTEXT text field size
const TEXT_LEN: usize = 50;

/// Build a STATUSTEXT with the given severity.
pub fn statustext(severity: MavSeverity, text: &str) -> MavMessage {
    let bytes = text.as_bytes();
    let len = bytes.len().min(TEXT_LEN);

    let mut text_bytes = [0u8; TEXT_LEN];
    text_bytes[..len].copy_from_slice(&bytes[..len]);

    MavMessage::STATUSTEXT(STATUSTEXT_DATA {
        severity,
        text: text_bytes.into(),
        ..Default::default()
    })
}

/// Build a critical-severity STATUSTEXT.
pub fn critical(text: &str) -> MavMessage {
    statustext(MavSeverity::MAV_SEVERITY_CRITICAL, text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_is_copied_and_padded() {
        let msg = critical("Operation timeout");
        match msg {
            MavMessage::STATUSTEXT(data) => {
                assert_eq!(data.severity, MavSeverity::MAV_SEVERITY_CRITICAL);
                let text: [u8; TEXT_LEN] = data.text.into();
                assert_eq!(&text[..17], b"Operation timeout");
                assert!(text[17..].iter().all(|&b| b == 0));
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn test_long_text_truncated() {
        let long = "X".repeat(80);
        let msg = statustext(MavSeverity::MAV_SEVERITY_INFO, &long);
        match msg {
            MavMessage::STATUSTEXT(data) => {
                let text: [u8; TEXT_LEN] = data.text.into();
                assert!(text.iter().all(|&b| b == b'X'));
            }
            other => panic!("unexpected message {:?}", other),
        }
    }
}
