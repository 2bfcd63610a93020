use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use serde::Serialize;
use unity_formats::entry::{Entry, EntryList};
use unity_formats::{ConversationFile, ObjectId, ObjectRecord, ResponseBlock, read_triggers};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Kind {
    Object,
    Conversation,
    Triggers,
}

/// Dump an object, conversation or trigger file.
#[derive(Parser)]
struct Args {
    /// File to inspect
    path: PathBuf,

    /// Record type; guessed from the file name when omitted
    #[arg(long, value_enum)]
    kind: Option<Kind>,

    /// Emit JSON instead of the text summary
    #[arg(long)]
    json: bool,
}

fn guess_kind(path: &Path) -> Result<(Kind, Option<ObjectId>)> {
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .context("file name is not valid UTF-8")?
        .to_ascii_lowercase();
    if name == "triggers.dat" {
        return Ok((Kind::Triggers, None));
    }
    if let Some(hex) = name.strip_prefix("o_").and_then(|rest| rest.strip_suffix(".bst")) {
        let value = u32::from_str_radix(hex, 16)
            .with_context(|| format!("object file name {name} is not hex"))?;
        let id = ObjectId::new((value >> 16) as u8, (value >> 8) as u8, value as u8);
        return Ok((Kind::Object, Some(id)));
    }
    if name.starts_with('w') && name.contains('c') && name.ends_with(".bst") {
        return Ok((Kind::Conversation, None));
    }
    bail!("cannot tell what {name} is; pass --kind")
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_list(label: &str, list: &EntryList, indent: usize) {
    let pad = " ".repeat(indent);
    println!("{pad}{label}: {} branch(es)", list.branches.len());
    for (index, branch) in list.branches.iter().enumerate() {
        let kinds: Vec<&str> = branch.iter().map(Entry::kind_name).collect();
        println!("{pad}  [{index}] {}", kinds.join(", "));
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let (kind, id) = match args.kind {
        Some(Kind::Object) => guess_kind(&args.path)?,
        Some(kind) => (kind, None),
        None => guess_kind(&args.path)?,
    };
    let file = File::open(&args.path)
        .with_context(|| format!("opening {}", args.path.display()))?;
    let reader = BufReader::new(file);

    match kind {
        Kind::Object => {
            let id = id.context("object id could not be derived from the file name")?;
            let record = ObjectRecord::read_from(reader, id)?;
            if args.json {
                return print_json(&record);
            }
            println!(
                "object {} {:?} screen {} flags {:#06x} state {} at ({}, {})",
                record.id,
                record.name,
                record.curr_screen,
                record.flags,
                record.state,
                record.x,
                record.y
            );
            for description in &record.descriptions {
                println!("  description {}: {}", description.entry_id, description.text);
            }
            let lists = [
                ("use", &record.use_entries),
                ("get", &record.get_entries),
                ("look", &record.look_entries),
                ("timer", &record.timer_entries),
            ];
            for (label, list) in lists {
                if let Some(list) = list {
                    print_list(label, list, 2);
                }
            }
        }
        Kind::Conversation => {
            let conversation = ConversationFile::read_from(reader)?;
            if args.json {
                return print_json(&conversation);
            }
            for response in &conversation.responses {
                println!(
                    "{:>4}/{:<4} {:?} -> {:>5}  {}",
                    response.id,
                    response.state,
                    response.response_state,
                    response.next_situation,
                    response.text.text
                );
                for block in &response.blocks {
                    match block {
                        ResponseBlock::ChangeAction(change) => println!(
                            "      {} {}/{} in {}",
                            if change.enable { "enable" } else { "disable" },
                            change.response_id,
                            change.state_id,
                            change.conversation_id
                        ),
                        ResponseBlock::Result(list) => print_list("result", list, 6),
                    }
                }
            }
        }
        Kind::Triggers => {
            let triggers = read_triggers(reader)?;
            if args.json {
                return print_json(&triggers);
            }
            for trigger in &triggers {
                println!(
                    "{:>4} {:<9} target {} {}",
                    trigger.id,
                    format!("{:?}", trigger.trigger_type),
                    trigger.target,
                    if trigger.enabled { "enabled" } else { "disabled" }
                );
            }
        }
    }
    Ok(())
}
