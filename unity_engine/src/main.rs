use std::fs;
use std::io::Write;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::Serialize;
use unity_engine::cli::{self, ActArgs, Command, MovieArgs, TalkArgs};
use unity_engine::{
    play_movie, Action, ConversationStart, DialogEvent, MovieSink, RecordingDialogHost, World,
};
use unity_formats::{DataDir, ResourceProvider};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let invocation = cli::parse()?;

    let resources = DataDir::open(&invocation.data_root)
        .with_context(|| format!("opening data root {}", invocation.data_root.display()))?;
    let dialog = RecordingDialogHost::new();
    let mut world = World::new(Box::new(resources), Rc::new(dialog.clone()))?;
    world.set_away_team(invocation.away_team.clone());

    match invocation.command {
        Command::Act(args) => run_action(&mut world, args)?,
        Command::Screen { world: id, screen } => describe_screen(&mut world, id, screen)?,
        Command::Talk(args) => run_talk(&mut world, args)?,
        Command::Tick { until, step } => run_ticks(&mut world, until, step)?,
        Command::Movie(args) => run_movie(&world, args)?,
    }

    print_dialog(&dialog.events());
    let requests: Vec<_> = world.requests().pending().cloned().collect();
    if !requests.is_empty() {
        println!("\nRequests for the game loop:");
        for request in &requests {
            println!("  - {request:?}");
        }
    }

    if let Some(path) = invocation.dialog_json.as_ref() {
        write_json(path, &dialog.events(), "dialog log")?;
    }
    if let Some(path) = invocation.requests_json.as_ref() {
        write_json(path, &requests, "request log")?;
    }
    Ok(())
}

fn run_action(world: &mut World, args: ActArgs) -> Result<()> {
    if let Some((id, screen)) = args.screen {
        world.enter_screen(id, screen)?;
    }
    let action = Action {
        verb: args.verb,
        target: args.target,
        who: args.who,
        other: args.other,
        x: None,
        y: None,
    };
    let result = world.perform_action(action)?;
    println!("{action} -> {result:?}");
    if let Some(object) = world.loaded_object(args.target) {
        println!(
            "  {} state {} flags {:#06x} at ({}, {})",
            object.record.name,
            object.record.state,
            object.record.flags,
            object.record.x,
            object.record.y
        );
    }
    Ok(())
}

fn describe_screen(world: &mut World, id: u8, screen: u8) -> Result<()> {
    world.enter_screen(id, screen)?;
    let Some(current) = world.current_screen().cloned() else {
        return Ok(());
    };
    println!("Screen {:02x}:{:02x}", current.world, current.screen);
    for object_id in &current.objects {
        if let Some(object) = world.loaded_object(*object_id) {
            println!(
                "  {object_id} {:<20} state {:>3} {}",
                object.record.name,
                object.record.state,
                if object.is_active() { "active" } else { "inactive" }
            );
        }
    }
    for polygon in &current.polygons {
        println!(
            "  polygon {:>3} {:?} ({} points)",
            polygon.id,
            polygon.polygon_type,
            polygon.points.len()
        );
    }
    Ok(())
}

fn run_talk(world: &mut World, args: TalkArgs) -> Result<()> {
    let result = world.start_conversation(
        args.world,
        args.conversation,
        ConversationStart::Situation(args.situation),
        args.speaker,
    )?;
    println!(
        "conversation {} of world {} finished: {result:?}",
        args.conversation, args.world
    );
    Ok(())
}

fn run_ticks(world: &mut World, until: u32, step: u32) -> Result<()> {
    let mut fired = 0usize;
    for now in (step..=until).step_by(step as usize) {
        let result = world.tick(now)?;
        if !result.is_empty() {
            println!("{now:>8} ms: {result:?}");
            fired += 1;
        }
    }
    println!("{fired} tick(s) did something");
    Ok(())
}

struct CliSink {
    dump_dir: Option<PathBuf>,
    realtime: bool,
    started: Instant,
    clock: u64,
}

impl MovieSink for CliSink {
    fn present_frame(&mut self, index: u32, rgb565: &[u8]) -> Result<ControlFlow<()>> {
        if let Some(dir) = &self.dump_dir {
            let path = dir.join(format!("frame_{index:04}.rgb565"));
            fs::write(&path, rgb565).with_context(|| format!("writing {}", path.display()))?;
        }
        Ok(ControlFlow::Continue(()))
    }

    fn queue_audio(&mut self, _samples: &[u8]) -> Result<()> {
        Ok(())
    }

    fn now_ms(&mut self) -> u64 {
        if self.realtime {
            self.started.elapsed().as_millis() as u64
        } else {
            self.clock
        }
    }

    fn wait_ms(&mut self, ms: u64) {
        if self.realtime {
            std::thread::sleep(Duration::from_millis(ms));
        } else {
            self.clock += ms;
        }
    }
}

fn run_movie(world: &World, args: MovieArgs) -> Result<()> {
    if let Some(dir) = &args.dump_frames {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    let stream = world.resources().open(&args.name)?;
    let mut sink = CliSink {
        dump_dir: args.dump_frames,
        realtime: args.realtime,
        started: Instant::now(),
        clock: 0,
    };
    let summary = play_movie(stream, &mut sink).with_context(|| format!("playing {}", args.name))?;
    println!(
        "{}: {} frames, {} pictures, {} audio bytes",
        args.name, summary.frames, summary.pictures, summary.audio_bytes
    );
    Ok(())
}

fn print_dialog(events: &[DialogEvent]) {
    if events.is_empty() {
        return;
    }
    println!("\nDialog:");
    for event in events {
        match event {
            DialogEvent::Line(line) => match &line.voice_file {
                Some(voice) => println!("  {}: {} [{voice}]", line.speaker, line.text),
                None => println!("  {}: {}", line.speaker, line.text),
            },
            DialogEvent::Choice { offered, chosen } => {
                for choice in offered {
                    let marker = if choice.state == *chosen { '>' } else { ' ' };
                    println!("   {marker} {}", choice.text);
                }
            }
        }
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T, what: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
        }
    }
    let json = serde_json::to_string_pretty(value).with_context(|| format!("serializing {what}"))?;
    let mut file =
        fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    file.write_all(json.as_bytes())
        .with_context(|| format!("writing {what} to {}", path.display()))?;
    println!("Saved {what} to {}", path.display());
    Ok(())
}
