//! Recovery decisions for a closed gateway connection.

use crate::protocol::{FATAL_CLOSE_CODES, RESUMABLE_CLOSE_CODES};

/// What to do after the transport closed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Recovery {
    /// Reconnect and resume the existing session.
    Resume,
    /// Reconnect and identify a new session.
    Fresh,
    /// Stop; the session cannot be recovered.
    Fatal,
}

/// How close codes map to a [`Recovery`].
///
/// Both policies evaluate, first match wins: no code, resumable code, code
/// `>= 4000`, fatal code, anything else.
///
/// [`Literal`](Self::Literal) reproduces the long-standing client behaviour:
/// its resumable-code test never matches and the range test shadows the
/// fatal codes, so every code `>= 4000` (including 4004, 4011 and 4014)
/// starts a fresh session and nothing is ever fatal.
/// [`Corrected`](Self::Corrected) tests set membership and checks the fatal
/// codes before the range. The two differ for every code in
/// [`RESUMABLE_CLOSE_CODES`] and [`FATAL_CLOSE_CODES`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CloseCodePolicy {
    #[default]
    Literal,
    Corrected,
}

impl CloseCodePolicy {
    /// Decide how to recover from a close carrying `code`.
    ///
    /// # Examples
    ///
    /// ```
    /// use shardwire::shard::{CloseCodePolicy, Recovery};
    ///
    /// assert_eq!(CloseCodePolicy::Literal.decide(Some(4004)), Recovery::Fresh);
    /// assert_eq!(CloseCodePolicy::Corrected.decide(Some(4004)), Recovery::Fatal);
    /// assert_eq!(CloseCodePolicy::Corrected.decide(None), Recovery::Resume);
    /// ```
    #[must_use]
    pub fn decide(self, code: Option<u16>) -> Recovery {
        let Some(code) = code else {
            return Recovery::Resume;
        };
        match self {
            Self::Literal => {
                if code >= 4000 {
                    Recovery::Fresh
                } else {
                    Recovery::Resume
                }
            }
            Self::Corrected => {
                if RESUMABLE_CLOSE_CODES.contains(&code) {
                    Recovery::Resume
                } else if FATAL_CLOSE_CODES.contains(&code) {
                    Recovery::Fatal
                } else if code >= 4000 {
                    Recovery::Fresh
                } else {
                    Recovery::Resume
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(None, Recovery::Resume)]
    #[case(Some(1000), Recovery::Resume)]
    #[case(Some(1006), Recovery::Resume)]
    #[case(Some(9), Recovery::Resume)]
    #[case(Some(4000), Recovery::Fresh)]
    #[case(Some(4009), Recovery::Fresh)]
    #[case(Some(4004), Recovery::Fresh)]
    #[case(Some(4014), Recovery::Fresh)]
    #[case(Some(4999), Recovery::Fresh)]
    fn literal_policy(#[case] code: Option<u16>, #[case] expected: Recovery) {
        assert_eq!(CloseCodePolicy::Literal.decide(code), expected);
    }

    #[rstest]
    #[case(None, Recovery::Resume)]
    #[case(Some(1000), Recovery::Resume)]
    #[case(Some(4000), Recovery::Resume)]
    #[case(Some(4009), Recovery::Resume)]
    #[case(Some(4004), Recovery::Fatal)]
    #[case(Some(4011), Recovery::Fatal)]
    #[case(Some(4014), Recovery::Fatal)]
    #[case(Some(4010), Recovery::Fresh)]
    #[case(Some(4012), Recovery::Fresh)]
    fn corrected_policy(#[case] code: Option<u16>, #[case] expected: Recovery) {
        assert_eq!(CloseCodePolicy::Corrected.decide(code), expected);
    }

    /// Known divergence: the policies disagree on every listed code.
    #[test]
    fn policies_diverge_on_listed_codes() {
        for code in RESUMABLE_CLOSE_CODES.iter().chain(&FATAL_CLOSE_CODES) {
            assert_ne!(
                CloseCodePolicy::Literal.decide(Some(*code)),
                CloseCodePolicy::Corrected.decide(Some(*code)),
                "code {code}"
            );
        }
    }
}
