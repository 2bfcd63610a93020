use std::fs::{self, File};
use std::io::BufReader;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use unity_formats::fvf::{FRAME_AUDIO, FRAME_PALETTE, FRAME_VIDEO_DELTA, FRAME_VIDEO_KEY};
use unity_formats::{FvfReader, FvfVideoDecoder};

/// Summarise an FVF movie and optionally decode frames to raw RGB565.
#[derive(Parser)]
struct Args {
    /// Path to the `.fvf` movie
    input: PathBuf,

    /// Decode every frame and write `frame_NNNN.rgb565` files here
    #[arg(long)]
    dump_frames: Option<PathBuf>,

    /// Print one line per frame
    #[arg(long)]
    verbose: bool,
}

fn describe_flags(flags: u16) -> String {
    let names = [
        (FRAME_VIDEO_KEY, "key"),
        (FRAME_VIDEO_DELTA, "delta"),
        (FRAME_PALETTE, "palette"),
        (FRAME_AUDIO, "audio"),
    ];
    let parts: Vec<&str> = names
        .iter()
        .filter(|(bit, _)| flags & bit != 0)
        .map(|(_, name)| *name)
        .collect();
    if parts.is_empty() {
        "-".to_string()
    } else {
        parts.join("+")
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let file = File::open(&args.input)
        .with_context(|| format!("opening {}", args.input.display()))?;
    let mut reader = FvfReader::new(BufReader::new(file))?;
    let header = *reader.header();
    println!(
        "FVF {}: {} frames, {}x{} {}bpp at {} fps",
        args.input.display(),
        header.video.frame_count,
        header.video.width,
        header.video.height,
        header.video.bpp,
        header.video.fps
    );
    println!(
        "Audio: {} Hz, {}-bit, {} channel(s)",
        header.audio.sample_rate, header.audio.bits, header.audio.channels
    );

    if let Some(dir) = &args.dump_frames {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }

    let mut decoder = FvfVideoDecoder::new();
    let mut audio_bytes = 0usize;
    let mut pictures = 0usize;
    while let Some(frame) = reader.next_frame()? {
        audio_bytes += frame.audio.as_ref().map_or(0, Vec::len);
        if args.verbose {
            println!(
                "{:>5} {:<20} video {:>6} audio {:>6}",
                frame.index,
                describe_flags(frame.flags),
                frame.video.as_ref().map_or(0, Vec::len),
                frame.audio.as_ref().map_or(0, Vec::len)
            );
        }
        if let Some(dir) = &args.dump_frames {
            if decoder
                .decode_frame(&frame)
                .with_context(|| format!("decoding frame {}", frame.index))?
            {
                let path = dir.join(format!("frame_{:04}.rgb565", frame.index));
                fs::write(&path, decoder.frame_buffer())
                    .with_context(|| format!("writing {}", path.display()))?;
                pictures += 1;
            }
        }
    }
    println!(
        "Frames read: {}, audio bytes: {}",
        reader.frames_read(),
        audio_bytes
    );
    if args.dump_frames.is_some() {
        println!("Pictures written: {pictures}");
    }
    Ok(())
}
