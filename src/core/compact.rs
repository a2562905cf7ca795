//! Range notation for frame lists
//!
//! Collapses sorted frame numbers into `1-3,7,9-10` and formats the short
//! human-readable reports built on top of it.

use super::frame_spec::FrameSet;

/// Collapse sorted integers into comma separated runs
///
/// Consecutive runs print as `start-end`, single frames as `N`.
/// Output parses back to the same list.
pub fn compact(frames: &[i64]) -> String {
    let mut runs: Vec<String> = Vec::new();
    let mut iter = frames.iter().copied().peekable();

    while let Some(start) = iter.next() {
        let mut end = start;
        while let Some(&next) = iter.peek() {
            if next != end + 1 {
                break;
            }
            end = next;
            iter.next();
        }
        if start == end {
            runs.push(start.to_string());
        } else {
            runs.push(format!("{}-{}", start, end));
        }
    }

    runs.join(",")
}

/// `"N Frames will be rendered: [...]"`
///
/// `individual` lists every frame instead of range notation.
pub fn verify_report(frames: &FrameSet, individual: bool) -> String {
    let count = frames.len();
    if count == 0 {
        return "No frames specified".to_string();
    }

    let mut msg = format!("{} {} will be rendered", count, plural(count, "Frame"));
    if count > 1 {
        let listing = if individual {
            frames
                .values()
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        } else {
            frames.to_string()
        };
        msg.push_str(&format!(": [{}]", listing));
    }
    msg
}

/// `Frame` / `Frames`
pub fn plural(count: usize, word: &str) -> String {
    if count == 1 {
        word.to_string()
    } else {
        format!("{}s", word)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::frame_spec::parse;

    #[test]
    fn test_compact_runs() {
        assert_eq!(compact(&[1, 2, 3, 7, 9, 10]), "1-3,7,9-10");
        assert_eq!(compact(&[5]), "5");
        assert_eq!(compact(&[]), "");
        assert_eq!(compact(&[-3, -2, -1, 4]), "-3--1,4");
    }

    #[test]
    fn test_compact_parse_round_trip() {
        let cases: Vec<Vec<i64>> = vec![
            vec![1, 2, 3, 7, 9, 10],
            vec![0],
            vec![-5, -3, -2, -1, 0, 1, 8],
            vec![-10, -9],
            vec![1, 3, 5, 7],
            (100..=250).collect(),
            vec![-1, 0],
        ];
        for frames in cases {
            let text = compact(&frames);
            let parsed = parse(&text, 1.0, false).unwrap();
            assert_eq!(parsed, FrameSet::Whole(frames.clone()), "round trip of {:?} via {:?}", frames, text);
        }
    }

    #[test]
    fn test_round_trip_long_run() {
        let frames: Vec<i64> = (0..=1_000_001).collect();
        let text = compact(&frames);
        assert_eq!(text, "0-1000001");
        assert_eq!(parse(&text, 1.0, false).unwrap(), FrameSet::Whole(frames));
    }

    #[test]
    fn test_round_trip_large_frame_numbers() {
        let frames = vec![-9_007_199_254_740_991, 1, 9_007_199_254_740_990, 9_007_199_254_740_991];
        let text = compact(&frames);
        assert_eq!(parse(&text, 1.0, false).unwrap(), FrameSet::Whole(frames));
    }

    #[test]
    fn test_verify_report() {
        let frames = FrameSet::Whole(vec![1, 2, 3, 5]);
        assert_eq!(verify_report(&frames, false), "4 Frames will be rendered: [1-3,5]");
        assert_eq!(verify_report(&frames, true), "4 Frames will be rendered: [1, 2, 3, 5]");
        assert_eq!(verify_report(&FrameSet::Whole(vec![8]), false), "1 Frame will be rendered");
        assert_eq!(verify_report(&FrameSet::default(), false), "No frames specified");
    }
}
