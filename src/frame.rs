//! Classification of inbound channel frames.
//!
//! The channel carries plain text.  Two literal values are reserved as control
//! markers that bracket a streamed bot reply; everything else is content.
//! There is no escaping: a producer that needs to send text equal to a
//! sentinel cannot, and such text is always read as a marker.  Producers can
//! check with [`is_reserved`].

/// Marks the start of a streamed bot reply.
pub const START_SENTINEL: &str = "######START######";

/// Marks the end of a streamed bot reply.
pub const END_SENTINEL: &str = "######END######";

/// One inbound frame, classified.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Frame<'a> {
    /// The start marker.
    Start,

    /// The end marker.
    End,

    /// Any other text.
    Content(&'a str),
}

impl<'a> Frame<'a> {
    /// Classifies raw frame text by exact comparison with the sentinels.
    pub fn classify(text: &'a str) -> Self {
        match text {
            START_SENTINEL => Frame::Start,
            END_SENTINEL => Frame::End,
            content => Frame::Content(content),
        }
    }

    /// Returns true for either sentinel.
    pub fn is_control(&self) -> bool {
        matches!(self, Frame::Start | Frame::End)
    }
}

/// Returns true if `text` would be read as a control marker.
pub fn is_reserved(text: &str) -> bool {
    Frame::classify(text).is_control()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels_match_exactly() {
        assert_eq!(Frame::classify("######START######"), Frame::Start);
        assert_eq!(Frame::classify("######END######"), Frame::End);
    }

    #[test]
    fn near_misses_are_content() {
        assert_eq!(
            Frame::classify(" ######START######"),
            Frame::Content(" ######START######")
        );
        assert_eq!(
            Frame::classify("######END######\n"),
            Frame::Content("######END######\n")
        );
        assert_eq!(Frame::classify("START"), Frame::Content("START"));
        assert_eq!(Frame::classify(""), Frame::Content(""));
    }

    #[test]
    fn reserved_check() {
        assert!(is_reserved(START_SENTINEL));
        assert!(is_reserved(END_SENTINEL));
        assert!(!is_reserved("hello"));
    }
}
