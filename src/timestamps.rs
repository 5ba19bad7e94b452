//! Per-sample timestamp reconstruction.
//!
//! A PMD frame carries a single device timestamp (nanoseconds) belonging to
//! its *last* sample. Earlier samples are back-dated with one of two
//! strategies:
//!
//! * **rate-anchored**: fixed spacing of `1e9 / sample_rate` ns counted
//!   backwards from the frame timestamp. Used when the sample rate is known
//!   and there is no previous frame to interpolate from.
//! * **span-interpolated**: the interval between the previous frame and this
//!   one is divided evenly across the samples.
//!
//! In both cases the last sample is stamped with exactly the frame timestamp.

use crate::error::PmdError;

const NANOS_PER_SECOND: f64 = 1_000_000_000.0;

/// Reconstruct `count` timestamps, picking the strategy from `sample_rate`.
///
/// `Some(rate)` selects rate-anchored spacing, `None` selects interpolation
/// between `previous` and `frame`.
pub fn reconstruct(
    previous: u64,
    frame: u64,
    count: usize,
    sample_rate: Option<u32>,
) -> Result<Vec<u64>, PmdError> {
    match sample_rate {
        Some(rate) => rate_anchored(previous, frame, count, rate),
        None => span_interpolated(previous, frame, count),
    }
}

/// `timestamp[i] = frame − step × (count − 1 − i)` with `step = 1e9 / rate`.
///
/// The first sample may not fall before `previous`; `previous == 0` means
/// there is no earlier frame and only time zero bounds it.
pub fn rate_anchored(
    previous: u64,
    frame: u64,
    count: usize,
    sample_rate: u32,
) -> Result<Vec<u64>, PmdError> {
    if sample_rate == 0 {
        return Err(PmdError::format("sample rate 0 cannot anchor timestamps"));
    }
    let step = NANOS_PER_SECOND / f64::from(sample_rate);
    let span = (step * count.saturating_sub(1) as f64).round();
    if span > frame as f64 {
        return Err(PmdError::format(format!(
            "first sample would precede time zero: frame {frame} ns, span {span} ns"
        )));
    }
    if count > 0 && frame - (span as u64) < previous {
        return Err(PmdError::format(format!(
            "first sample {} ns would precede previous frame {previous} ns",
            frame - span as u64
        )));
    }
    if count <= 1 {
        return Ok(vec![frame; count]);
    }
    Ok((0..count)
        .map(|i| {
            let back = (step * (count - 1 - i) as f64).round() as u64;
            frame - back
        })
        .collect())
}

/// `timestamp[i] = round(previous + spacing × (i + 1))` with
/// `spacing = (frame − previous) / count`.
pub fn span_interpolated(previous: u64, frame: u64, count: usize) -> Result<Vec<u64>, PmdError> {
    if count <= 1 {
        return Ok(vec![frame; count]);
    }
    if frame < previous {
        return Err(PmdError::format(format!(
            "frame timestamp {frame} precedes previous frame {previous}"
        )));
    }
    let spacing = (frame - previous) as f64 / count as f64;
    let mut out: Vec<u64> = (0..count)
        .map(|i| (previous as f64 + spacing * (i + 1) as f64).round() as u64)
        .collect();
    // keep the anchor exact regardless of float rounding
    if let Some(last) = out.last_mut() {
        *last = frame;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_anchored_spacing() {
        let ts = rate_anchored(0, 2_000_000_000, 3, 50).unwrap();
        assert_eq!(ts, vec![1_960_000_000, 1_980_000_000, 2_000_000_000]);
    }

    #[test]
    fn rate_anchored_rejects_zero_rate_and_underflow() {
        assert!(rate_anchored(0, 1_000, 2, 0).is_err());
        assert!(rate_anchored(0, 1_000, 3, 1).is_err());
    }

    #[test]
    fn rate_anchored_stays_after_previous_frame() {
        // 52 Hz: three samples span ~38.5 ms, more than the 10 ms gap
        let err = reconstruct(1_990_000_000, 2_000_000_000, 3, Some(52));
        assert!(matches!(err, Err(PmdError::DataFormat(_))));
        assert!(reconstruct(2_500, 2_000, 1, Some(52)).is_err());

        let ts = reconstruct(1_960_000_000, 2_000_000_000, 3, Some(50)).unwrap();
        assert_eq!(ts, vec![1_960_000_000, 1_980_000_000, 2_000_000_000]);
    }

    #[test]
    fn span_interpolated_ends_on_frame() {
        let ts = span_interpolated(1_000, 2_000, 3).unwrap();
        assert_eq!(ts, vec![1_333, 1_667, 2_000]);
        let ts = span_interpolated(0, 1_000_000_007, 7).unwrap();
        assert_eq!(*ts.last().unwrap(), 1_000_000_007);
        assert!(ts.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn single_sample_gets_frame_timestamp() {
        assert_eq!(reconstruct(10, 500, 1, None).unwrap(), vec![500]);
        assert_eq!(reconstruct(0, 500, 1, Some(130)).unwrap(), vec![500]);
        assert!(reconstruct(0, 500, 0, None).unwrap().is_empty());
    }

    #[test]
    fn backwards_frame_is_rejected() {
        assert!(span_interpolated(2_000, 1_000, 4).is_err());
    }

    #[test]
    fn last_sample_always_anchored() {
        for count in 1..40 {
            let a = reconstruct(0, 9_876_543_210, count, Some(52)).unwrap();
            let b = reconstruct(9_000_000_000, 9_876_543_210, count, None).unwrap();
            assert_eq!(a.last(), Some(&9_876_543_210));
            assert_eq!(b.last(), Some(&9_876_543_210));
        }
    }
}
