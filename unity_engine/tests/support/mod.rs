#![allow(dead_code)]

use std::rc::Rc;

use unity_engine::{RecordingDialogHost, World};
use unity_formats::entry::{AlterBlock, ConditionBlock};
use unity_formats::{
    conversation_file_name, write_triggers, ConversationFile, Entry, EntryList, MemoryResources,
    ObjectId, ObjectRecord, ResponseRecord, ResponseState, TextBlock, TriggerRecord,
    TRIGGERS_FILE_NAME,
};

pub const KIRK: ObjectId = ObjectId::new(0, 0, 0);
pub const SPOCK: ObjectId = ObjectId::new(0, 0, 1);
pub const DOOR: ObjectId = ObjectId::new(1, 2, 3);
pub const PANEL: ObjectId = ObjectId::new(1, 2, 4);
pub const TRICORDER: ObjectId = ObjectId::new(1, 2, 5);

/// Builds an in-memory data set and the world over it.
#[derive(Default)]
pub struct Fixture {
    pub resources: MemoryResources,
    pub dialog: RecordingDialogHost,
}

impl Fixture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_choices<I: IntoIterator<Item = u16>>(choices: I) -> Self {
        Self {
            resources: MemoryResources::new(),
            dialog: RecordingDialogHost::with_choices(choices),
        }
    }

    pub fn quitting_after(mut self, lines: usize) -> Self {
        self.dialog = self.dialog.quitting_after(lines);
        self
    }

    pub fn quitting_at_choice(mut self) -> Self {
        self.dialog = self.dialog.quitting_at_choice();
        self
    }

    pub fn object(mut self, record: ObjectRecord) -> Self {
        let bytes = record.to_bytes().expect("serialising object fixture");
        self.resources.insert(&record.id.object_file_name(), bytes);
        self
    }

    pub fn conversation(mut self, world: u8, id: u16, responses: Vec<ResponseRecord>) -> Self {
        let bytes = ConversationFile { responses }
            .to_bytes()
            .expect("serialising conversation fixture");
        self.resources.insert(&conversation_file_name(world, id), bytes);
        self
    }

    pub fn triggers(mut self, records: &[TriggerRecord]) -> Self {
        self.resources.insert(TRIGGERS_FILE_NAME, write_triggers(records));
        self
    }

    pub fn file(mut self, name: &str, bytes: Vec<u8>) -> Self {
        self.resources.insert(name, bytes);
        self
    }

    pub fn build(&self) -> World {
        World::new(
            Box::new(self.resources.clone()),
            Rc::new(self.dialog.clone()),
        )
        .expect("building world")
    }
}

pub fn list(branches: Vec<Vec<Entry>>) -> Option<EntryList> {
    Some(EntryList::new(branches))
}

pub fn set_state(state: u8) -> AlterBlock {
    AlterBlock {
        alter_state: state,
        ..AlterBlock::default()
    }
}

pub fn alter_on(target: ObjectId, state: u8) -> AlterBlock {
    AlterBlock {
        target,
        ..set_state(state)
    }
}

pub fn other_is(target: ObjectId) -> ConditionBlock {
    ConditionBlock {
        target,
        ..ConditionBlock::default()
    }
}

pub fn object_with_use(id: ObjectId, name: &str, entries: Vec<Vec<Entry>>) -> ObjectRecord {
    ObjectRecord {
        use_entries: list(entries),
        ..ObjectRecord::new(id, name)
    }
}

pub fn response(id: u16, state: u16, next: u16, text: &str) -> ResponseRecord {
    ResponseRecord {
        id,
        state,
        response_state: ResponseState::Enabled,
        next_situation: next,
        target: ObjectId::NONE,
        who_can_say: Vec::new(),
        text: TextBlock {
            text: text.to_string(),
            voice_group: 0xcc,
            voice_subgroup: 0,
            voice_speaker: 0,
            voice_id: 0,
        },
        blocks: Vec::new(),
    }
}
