//! Parser for ffmpeg `-progress` output
//!
//! ffmpeg writes `key=value` lines and closes each block with
//! `progress=continue` (or `progress=end` for the last one).

/// One completed progress block.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressBlock {
    /// `None` when ffmpeg reported `N/A`
    pub bitrate_kbps: Option<f64>,
    pub dropped_frames: Option<u64>,
    /// This was the final block (`progress=end`)
    pub finished: bool,
}

#[derive(Debug, Default)]
pub struct ProgressParser {
    bitrate_kbps: Option<f64>,
    dropped_frames: Option<u64>,
}

impl ProgressParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line; returns a block when the line closes one.
    pub fn push_line(&mut self, line: &str) -> Option<ProgressBlock> {
        let (key, value) = line.trim().split_once('=')?;
        let value = value.trim();

        match key.trim() {
            "bitrate" => self.bitrate_kbps = parse_bitrate(value),
            "drop_frames" => self.dropped_frames = value.parse().ok(),
            "progress" => {
                let block = ProgressBlock {
                    bitrate_kbps: self.bitrate_kbps.take(),
                    dropped_frames: self.dropped_frames.take(),
                    finished: value == "end",
                };
                return Some(block);
            }
            _ => {}
        }
        None
    }
}

/// `3200.5kbits/s` -> 3200.5; `N/A` -> None
fn parse_bitrate(value: &str) -> Option<f64> {
    value
        .strip_suffix("kbits/s")
        .unwrap_or(value)
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|b| b.is_finite() && *b >= 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLOCK: &str = "frame=120
fps=30.00
stream_0_0_q=23.0
bitrate=3187.4kbits/s
total_size=1593700
out_time_us=4000000
out_time=00:00:04.000000
dup_frames=0
drop_frames=3
speed=1.0x
progress=continue";

    fn feed(parser: &mut ProgressParser, text: &str) -> Vec<ProgressBlock> {
        text.lines().filter_map(|l| parser.push_line(l)).collect()
    }

    #[test]
    fn test_parses_block() {
        let mut parser = ProgressParser::new();
        let blocks = feed(&mut parser, BLOCK);

        assert_eq!(
            blocks,
            vec![ProgressBlock {
                bitrate_kbps: Some(3187.4),
                dropped_frames: Some(3),
                finished: false,
            }]
        );
    }

    #[test]
    fn test_na_bitrate() {
        let mut parser = ProgressParser::new();
        let blocks = feed(&mut parser, "bitrate=N/A\ndrop_frames=0\nprogress=continue");
        assert_eq!(blocks[0].bitrate_kbps, None);
        assert_eq!(blocks[0].dropped_frames, Some(0));
    }

    #[test]
    fn test_fields_do_not_leak_between_blocks() {
        let mut parser = ProgressParser::new();
        let blocks = feed(
            &mut parser,
            &format!("{}\nframe=150\nprogress=end", BLOCK),
        );

        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1].bitrate_kbps, None);
        assert_eq!(blocks[1].dropped_frames, None);
        assert!(blocks[1].finished);
    }

    #[test]
    fn test_ignores_noise() {
        let mut parser = ProgressParser::new();
        assert!(parser.push_line("").is_none());
        assert!(parser.push_line("garbage without separator").is_none());
        assert!(parser.push_line("bitrate=fast").is_none());
    }
}
