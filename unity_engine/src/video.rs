//! Movie playback: paces container frames against a clock and feeds decoded
//! pictures and audio to a sink.

use std::io::{Read, Seek};
use std::ops::ControlFlow;

use anyhow::{Context, Result};
use log::{debug, info};
use serde::Serialize;
use unity_formats::{FvfFrame, FvfHeader, FvfReader, FvfVideoDecoder};

/// Output side of playback. `present_frame` returning `Break` stops the
/// movie.
pub trait MovieSink {
    fn present_frame(&mut self, index: u32, rgb565: &[u8]) -> Result<ControlFlow<()>>;

    fn queue_audio(&mut self, samples: &[u8]) -> Result<()>;

    /// Milliseconds on the sink's clock.
    fn now_ms(&mut self) -> u64;

    /// Block until roughly `ms` milliseconds have passed.
    fn wait_ms(&mut self, ms: u64);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerPoll {
    /// A frame was consumed; `picture` is set when the frame buffer changed.
    Frame {
        index: u32,
        picture: bool,
        audio: Option<Vec<u8>>,
    },
    /// Nothing due yet; the next frame is this many milliseconds away.
    Wait(u64),
    Finished,
}

pub struct MoviePlayer<R> {
    reader: FvfReader<R>,
    decoder: FvfVideoDecoder,
    start_ms: Option<u64>,
    pending: Option<FvfFrame>,
    finished: bool,
}

impl<R: Read + Seek> MoviePlayer<R> {
    pub fn new(reader: R) -> Result<Self> {
        Ok(Self {
            reader: FvfReader::new(reader)?,
            decoder: FvfVideoDecoder::new(),
            start_ms: None,
            pending: None,
            finished: false,
        })
    }

    pub fn header(&self) -> &FvfHeader {
        self.reader.header()
    }

    pub fn frame_buffer(&self) -> &[u8] {
        self.decoder.frame_buffer()
    }

    /// Offset of frame `index` from the start of playback.
    pub fn due_ms(&self, index: u32) -> u64 {
        let fps = u64::from(self.header().video.fps.max(1));
        u64::from(index) * 1000 / fps
    }

    /// Consume the next frame if it is due at `now_ms`. The first poll starts
    /// the clock.
    pub fn poll(&mut self, now_ms: u64) -> Result<PlayerPoll> {
        if self.finished {
            return Ok(PlayerPoll::Finished);
        }
        let start = *self.start_ms.get_or_insert(now_ms);
        if self.pending.is_none() {
            self.pending = self.reader.next_frame()?;
        }
        let Some(frame) = self.pending.as_ref() else {
            self.finished = true;
            return Ok(PlayerPoll::Finished);
        };
        let due = start + self.due_ms(frame.index);
        if now_ms < due {
            return Ok(PlayerPoll::Wait(due - now_ms));
        }
        let Some(frame) = self.pending.take() else {
            return Ok(PlayerPoll::Finished);
        };
        let picture = self
            .decoder
            .decode_frame(&frame)
            .with_context(|| format!("decoding frame {}", frame.index))?;
        Ok(PlayerPoll::Frame {
            index: frame.index,
            picture,
            audio: frame.audio,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PlaybackSummary {
    pub frames: u32,
    pub pictures: u32,
    pub audio_bytes: usize,
    pub cancelled: bool,
}

/// Play a whole movie into `sink`, returning what was shown.
pub fn play_movie<R: Read + Seek, S: MovieSink>(
    reader: R,
    sink: &mut S,
) -> Result<PlaybackSummary> {
    let mut player = MoviePlayer::new(reader).context("opening movie")?;
    info!(
        "playing movie: {} frames at {} fps",
        player.header().video.frame_count,
        player.header().video.fps
    );
    let mut summary = PlaybackSummary::default();
    loop {
        let now = sink.now_ms();
        match player.poll(now)? {
            PlayerPoll::Frame {
                index,
                picture,
                audio,
            } => {
                summary.frames += 1;
                if let Some(audio) = audio {
                    summary.audio_bytes += audio.len();
                    sink.queue_audio(&audio)?;
                }
                if picture {
                    summary.pictures += 1;
                    if sink.present_frame(index, player.frame_buffer())?.is_break() {
                        debug!("playback stopped by sink at frame {index}");
                        summary.cancelled = true;
                        break;
                    }
                }
            }
            PlayerPoll::Wait(ms) => sink.wait_ms(ms),
            PlayerPoll::Finished => break,
        }
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use unity_formats::fvf::{FRAME_AUDIO, FRAME_PALETTE};
    use unity_formats::write_fvf;

    fn palette_frame(index: u32, tint: i16) -> FvfFrame {
        FvfFrame {
            index,
            flags: FRAME_PALETTE | FRAME_AUDIO,
            video: None,
            palette: Some([tint; 256]),
            audio: Some(vec![0x80; 16]),
        }
    }

    fn movie(count: u32) -> Vec<u8> {
        let frames: Vec<FvfFrame> = (0..count).map(|i| palette_frame(i, i as i16)).collect();
        write_fvf(&frames, 2).unwrap()
    }

    #[derive(Default)]
    struct FakeSink {
        clock: u64,
        presented: Vec<(u32, u64)>,
        audio: usize,
        stop_after: Option<usize>,
    }

    impl MovieSink for FakeSink {
        fn present_frame(&mut self, index: u32, rgb565: &[u8]) -> Result<ControlFlow<()>> {
            assert!(!rgb565.is_empty());
            self.presented.push((index, self.clock));
            if self.stop_after == Some(self.presented.len()) {
                return Ok(ControlFlow::Break(()));
            }
            Ok(ControlFlow::Continue(()))
        }

        fn queue_audio(&mut self, samples: &[u8]) -> Result<()> {
            self.audio += samples.len();
            Ok(())
        }

        fn now_ms(&mut self) -> u64 {
            self.clock
        }

        fn wait_ms(&mut self, ms: u64) {
            self.clock += ms;
        }
    }

    #[test]
    fn frames_are_paced_by_frame_rate() {
        let mut sink = FakeSink::default();
        let summary = play_movie(Cursor::new(movie(4)), &mut sink).unwrap();
        assert_eq!(summary.frames, 4);
        assert_eq!(summary.pictures, 4);
        assert_eq!(summary.audio_bytes, 64);
        assert!(!summary.cancelled);
        assert_eq!(sink.audio, 64);
        // 15 fps: frame n is due at n * 1000 / 15 ms.
        assert_eq!(sink.presented, vec![(0, 0), (1, 66), (2, 133), (3, 200)]);
    }

    #[test]
    fn sink_can_stop_playback() {
        let mut sink = FakeSink {
            stop_after: Some(2),
            ..FakeSink::default()
        };
        let summary = play_movie(Cursor::new(movie(5)), &mut sink).unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.pictures, 2);
        assert_eq!(sink.presented.len(), 2);
    }

    #[test]
    fn poll_waits_until_due() {
        let mut player = MoviePlayer::new(Cursor::new(movie(2))).unwrap();
        assert!(matches!(player.poll(1000).unwrap(), PlayerPoll::Frame { index: 0, .. }));
        assert_eq!(player.poll(1010).unwrap(), PlayerPoll::Wait(56));
        assert!(matches!(
            player.poll(1066).unwrap(),
            PlayerPoll::Frame {
                index: 1,
                picture: true,
                ..
            }
        ));
        assert_eq!(player.poll(2000).unwrap(), PlayerPoll::Finished);
    }
}
