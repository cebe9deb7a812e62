//! Extraction of the speakable English segment from a tutor reply.
//!
//! A reply is loosely sectioned by marker tokens.  Only the leading English
//! part is synthesized; everything from the first marker on (correction,
//! translation) is dropped.  Missing markers mean the whole text is spoken.

/// Starts the optional correction block.
pub const CORRECTION_MARKER: &str = "💡";
/// Starts the Korean translation block.
pub const TRANSLATION_MARKER: &str = "🇰🇷";
/// Translation label, matched on its own in case the flag is omitted.
pub const TRANSLATION_LABEL: &str = "번역:";

/// Text preceding the earliest marker, trimmed.
///
/// ```rust
/// use ai_teacher::tutor::speakable_text;
///
/// assert_eq!(speakable_text("Hi there! 💡 Correction: x"), "Hi there!");
/// assert_eq!(speakable_text("💡 Correction: x"), "");
/// ```
pub fn speakable_text(reply: &str) -> &str {
    let end = [CORRECTION_MARKER, TRANSLATION_MARKER, TRANSLATION_LABEL]
        .iter()
        .filter_map(|marker| reply.find(marker))
        .min()
        .unwrap_or(reply.len());
    reply[..end].trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_markers_speaks_everything() {
        assert_eq!(
            speakable_text("  Great job! How was your day?  "),
            "Great job! How was your day?"
        );
    }

    #[test]
    fn stops_at_correction_marker() {
        let reply = "Nice to meet you! Where are you from?\n💡 Correction: \"I am\" not \"I is\"\n🇰🇷 번역: 만나서 반가워요!";
        assert_eq!(speakable_text(reply), "Nice to meet you! Where are you from?");
    }

    #[test]
    fn stops_at_translation_marker_without_correction() {
        let reply = "Sure, a table for two?\n🇰🇷 번역: 네, 두 분 자리요?";
        assert_eq!(speakable_text(reply), "Sure, a table for two?");
    }

    #[test]
    fn stops_at_bare_translation_label() {
        let reply = "Let's go!\n3. 번역: 가자!";
        assert_eq!(speakable_text(reply), "Let's go!\n3.");
    }

    #[test]
    fn earliest_marker_wins_regardless_of_order() {
        let reply = "Hello 🇰🇷 번역: 안녕 💡 Correction: none";
        assert_eq!(speakable_text(reply), "Hello");
    }

    #[test]
    fn marker_first_yields_empty() {
        assert_eq!(speakable_text("💡 Correction: x"), "");
        assert_eq!(speakable_text("🇰🇷 번역: 안녕하세요"), "");
        assert_eq!(speakable_text("   \n💡"), "");
    }

    #[test]
    fn empty_reply_yields_empty() {
        assert_eq!(speakable_text(""), "");
    }
}
