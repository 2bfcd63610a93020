use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use unity_formats::ObjectId;

use crate::action::ActionType;

/// Drive the script interpreter against an extracted game data directory.
#[derive(Parser, Debug)]
#[command(about = "Script interpreter host for the extracted game data", version)]
pub struct Args {
    /// Path to the extracted game data directory
    #[arg(long, default_value = "data")]
    pub data_root: PathBuf,

    /// Away team members (`ww:ss:ii`), used by conditions and who-can-say
    #[arg(long, value_delimiter = ',', value_parser = parse_object_id)]
    pub away_team: Vec<ObjectId>,

    /// Path to write the dialog lines and choices shown as JSON
    #[arg(long)]
    pub dialog_json: Option<PathBuf>,

    /// Path to write the requests raised for the game loop as JSON
    #[arg(long)]
    pub requests_json: Option<PathBuf>,

    #[command(subcommand)]
    pub command: CommandArgs,
}

#[derive(Subcommand, Debug)]
pub enum CommandArgs {
    /// Perform a verb on an object
    Act {
        #[arg(value_enum)]
        verb: Verb,
        #[arg(value_parser = parse_object_id)]
        target: ObjectId,
        /// Acting crew member
        #[arg(long, value_parser = parse_object_id)]
        who: Option<ObjectId>,
        /// Second object (e.g. the item being used)
        #[arg(long, value_parser = parse_object_id)]
        with: Option<ObjectId>,
        /// Screen to enter first, as `world:screen` in hex
        #[arg(long)]
        screen: Option<String>,
    },
    /// Enter a screen and list its objects and polygons
    Screen { world: u8, screen: u8 },
    /// Run a conversation from a situation
    Talk {
        world: u8,
        conversation: u16,
        situation: u16,
        #[arg(long, value_parser = parse_object_id)]
        speaker: Option<ObjectId>,
    },
    /// Advance triggers and object timers
    Tick {
        /// Milliseconds to simulate
        #[arg(long, default_value_t = 10_000)]
        until: u32,
        /// Milliseconds per tick
        #[arg(long, default_value_t = 100)]
        step: u32,
    },
    /// Play a movie without presenting it, optionally dumping frames
    Movie {
        /// Movie file name inside the data root
        name: String,
        /// Write each presented frame as raw RGB565 into this directory
        #[arg(long)]
        dump_frames: Option<PathBuf>,
        /// Pace frames against the wall clock instead of running flat out
        #[arg(long)]
        realtime: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Verb {
    Use,
    Get,
    Look,
    Timer,
}

impl From<Verb> for ActionType {
    fn from(verb: Verb) -> Self {
        match verb {
            Verb::Use => ActionType::Use,
            Verb::Get => ActionType::Get,
            Verb::Look => ActionType::Look,
            Verb::Timer => ActionType::Timer,
        }
    }
}

#[derive(Debug)]
pub enum Command {
    Act(ActArgs),
    Screen { world: u8, screen: u8 },
    Talk(TalkArgs),
    Tick { until: u32, step: u32 },
    Movie(MovieArgs),
}

#[derive(Debug)]
pub struct ActArgs {
    pub verb: ActionType,
    pub target: ObjectId,
    pub who: ObjectId,
    pub other: ObjectId,
    pub screen: Option<(u8, u8)>,
}

#[derive(Debug)]
pub struct TalkArgs {
    pub world: u8,
    pub conversation: u16,
    pub situation: u16,
    pub speaker: ObjectId,
}

#[derive(Debug)]
pub struct MovieArgs {
    pub name: String,
    pub dump_frames: Option<PathBuf>,
    pub realtime: bool,
}

#[derive(Debug)]
pub struct Invocation {
    pub data_root: PathBuf,
    pub away_team: Vec<ObjectId>,
    pub dialog_json: Option<PathBuf>,
    pub requests_json: Option<PathBuf>,
    pub command: Command,
}

pub fn parse() -> Result<Invocation> {
    let args = Args::parse();
    args.into_invocation()
}

/// Parse `ww:ss:ii` (hex components) or a bare six-digit hex key.
pub fn parse_object_id(text: &str) -> Result<ObjectId> {
    let parts: Vec<&str> = if text.contains(':') {
        text.split(':').collect()
    } else if text.len() == 6 {
        vec![&text[0..2], &text[2..4], &text[4..6]]
    } else {
        bail!("object id {text:?} is not ww:ss:ii");
    };
    let [world, screen, id] = parts.as_slice() else {
        bail!("object id {text:?} needs three components");
    };
    let byte = |part: &str| {
        u8::from_str_radix(part, 16)
            .with_context(|| format!("{part:?} in {text:?} is not a hex byte"))
    };
    Ok(ObjectId::new(byte(world)?, byte(screen)?, byte(id)?))
}

fn parse_screen(text: &str) -> Result<(u8, u8)> {
    let (world, screen) = text
        .split_once(':')
        .with_context(|| format!("screen {text:?} is not world:screen"))?;
    let world = u8::from_str_radix(world, 16).with_context(|| format!("bad world in {text:?}"))?;
    let screen = u8::from_str_radix(screen, 16).with_context(|| format!("bad screen in {text:?}"))?;
    Ok((world, screen))
}

impl Args {
    fn into_invocation(self) -> Result<Invocation> {
        let command = match self.command {
            CommandArgs::Act {
                verb,
                target,
                who,
                with,
                screen,
            } => Command::Act(ActArgs {
                verb: verb.into(),
                target,
                who: who.unwrap_or(ObjectId::NONE),
                other: with.unwrap_or(ObjectId::NONE),
                screen: screen.as_deref().map(parse_screen).transpose()?,
            }),
            CommandArgs::Screen { world, screen } => Command::Screen { world, screen },
            CommandArgs::Talk {
                world,
                conversation,
                situation,
                speaker,
            } => Command::Talk(TalkArgs {
                world,
                conversation,
                situation,
                speaker: speaker.unwrap_or(ObjectId::new(0, 0, 0xff)),
            }),
            CommandArgs::Tick { until, step } => {
                if step == 0 {
                    bail!("--step must be at least 1 ms");
                }
                Command::Tick { until, step }
            }
            CommandArgs::Movie {
                name,
                dump_frames,
                realtime,
            } => Command::Movie(MovieArgs {
                name,
                dump_frames,
                realtime,
            }),
        };
        Ok(Invocation {
            data_root: self.data_root,
            away_team: self.away_team,
            dialog_json: self.dialog_json,
            requests_json: self.requests_json,
            command,
        })
    }
}
