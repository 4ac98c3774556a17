//! Staged output — deliver one reply as several timed messages.
//!
//! The reply is split on the configured delimiter and empty pieces are
//! dropped. The first piece goes out at once; each later piece waits
//! `chars × per_char` to mimic typing. A newer turn on the same session
//! cancels the turn token and the remaining pieces are never sent.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::{ChatError, Outbox};

/// Split `text` on `delimiter`, dropping empty segments.
///
/// An empty delimiter disables splitting.
pub fn split_segments<'a>(text: &'a str, delimiter: &str) -> Vec<&'a str> {
    if delimiter.is_empty() {
        return if text.is_empty() { Vec::new() } else { vec![text] };
    }
    text.split(delimiter).filter(|s| !s.is_empty()).collect()
}

/// Simulated typing time for `segment`.
pub fn typing_delay(segment: &str, per_char: Duration) -> Duration {
    let chars = u32::try_from(segment.chars().count()).unwrap_or(u32::MAX);
    per_char.saturating_mul(chars)
}

/// Send the segments of `text` to `outbox` in order.
///
/// Returns how many segments were sent. Stops silently once `turn` is
/// cancelled; a closed outbox is [`ChatError::Outbound`].
pub async fn dispatch(
    outbox: &Outbox,
    text: &str,
    delimiter: &str,
    per_char: Duration,
    turn: &CancellationToken,
) -> Result<usize, ChatError> {
    let segments = split_segments(text, delimiter);
    let total = segments.len();
    let mut sent = 0;

    for segment in segments {
        if turn.is_cancelled() {
            break;
        }

        if sent > 0 {
            let delay = typing_delay(segment, per_char);
            trace!(delay_ms = delay.as_millis() as u64, "waiting before next segment");
            tokio::select! {
                biased;
                _ = turn.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
            if turn.is_cancelled() {
                break;
            }
        }

        outbox
            .send(segment.to_string())
            .await
            .map_err(|_| ChatError::Outbound)?;
        sent += 1;
    }

    if sent < total {
        debug!(sent, total, "staged output superseded by a newer turn");
    }
    Ok(sent)
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;
    use tokio::time::Instant;

    use super::*;

    const TICK: Duration = Duration::from_millis(200);

    #[test]
    fn split_drops_empty_segments() {
        assert_eq!(split_segments("a\n\nb\n", "\n"), ["a", "b"]);
        assert_eq!(split_segments("\n\n", "\n"), Vec::<&str>::new());
        assert_eq!(split_segments("", "\n"), Vec::<&str>::new());
    }

    #[test]
    fn split_multi_char_delimiter() {
        assert_eq!(split_segments("one||two||||three", "||"), ["one", "two", "three"]);
    }

    #[test]
    fn split_keeps_whitespace_only_segments() {
        assert_eq!(split_segments("a\n \nb", "\n"), ["a", " ", "b"]);
    }

    #[test]
    fn empty_delimiter_means_single_segment() {
        assert_eq!(split_segments("a\nb", ""), ["a\nb"]);
    }

    #[test]
    fn split_matches_filtered_std_split() {
        let samples = [("x,,y,z,", ","), ("no delimiter here", ";"), ("ab--cd----", "--")];
        for (text, d) in samples {
            let expected: Vec<&str> = text.split(d).filter(|s| !s.is_empty()).collect();
            assert_eq!(split_segments(text, d), expected);
        }
    }

    #[test]
    fn delay_counts_chars_not_bytes() {
        assert_eq!(typing_delay("héllo", TICK), Duration::from_millis(1000));
        assert_eq!(typing_delay("你好", TICK), Duration::from_millis(400));
        assert_eq!(typing_delay("", TICK), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn first_segment_immediate_then_delayed_by_length() {
        let (tx, mut rx) = mpsc::channel(8);
        let token = CancellationToken::new();
        let start = Instant::now();

        let task = tokio::spawn(async move {
            dispatch(&tx, "hi\n\nabc\nxy", "\n", TICK, &token).await
        });

        let mut received = Vec::new();
        while let Some(msg) = rx.recv().await {
            received.push((msg, start.elapsed()));
        }

        assert_eq!(
            received,
            vec![
                ("hi".to_string(), Duration::ZERO),
                ("abc".to_string(), Duration::from_millis(600)),
                ("xy".to_string(), Duration::from_millis(1000)),
            ]
        );
        assert_eq!(task.await.unwrap().unwrap(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_remaining_segments() {
        let (tx, mut rx) = mpsc::channel(8);
        let token = CancellationToken::new();
        let turn = token.clone();

        let task = tokio::spawn(async move {
            dispatch(&tx, "first\nsecond\nthird", "\n", TICK, &turn).await
        });

        assert_eq!(rx.recv().await.as_deref(), Some("first"));
        tokio::time::sleep(Duration::from_millis(300)).await;
        token.cancel();

        assert_eq!(task.await.unwrap().unwrap(), 1);
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_before_start_sends_nothing() {
        let (tx, mut rx) = mpsc::channel(8);
        let token = CancellationToken::new();
        token.cancel();

        let sent = dispatch(&tx, "a\nb", "\n", TICK, &token).await.unwrap();
        assert_eq!(sent, 0);
        drop(tx);
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn closed_outbox_is_outbound_error() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let err = dispatch(&tx, "a", "\n", TICK, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Outbound));
    }
}
