use std::fs;

use tempfile::tempdir;
use unity_formats::entry::{AlterBlock, ConditionBlock};
use unity_formats::{
    ComputerDatabase, ComputerEntry, ConversationFile, DataDir, Entry, EntryList, ObjectId,
    ObjectRecord, ResourceProvider, ResponseRecord, ResponseState, TextBlock, TriggerRecord,
    TriggerType, COMPUTER_DB_FILE_NAME, TRIGGERS_FILE_NAME, conversation_file_name, is_corrupt,
    read_triggers, write_triggers,
};

fn door() -> ObjectRecord {
    ObjectRecord {
        use_entries: Some(EntryList::new(vec![
            vec![
                Entry::Condition(ConditionBlock {
                    target: ObjectId::new(1, 2, 9),
                    ..ConditionBlock::default()
                }),
                Entry::Alter(vec![AlterBlock {
                    alter_state: 1,
                    ..AlterBlock::default()
                }]),
            ],
            vec![Entry::Alter(vec![AlterBlock {
                alter_state: 2,
                ..AlterBlock::default()
            }])],
        ])),
        ..ObjectRecord::new(ObjectId::new(1, 2, 3), "door")
    }
}

fn conversation() -> ConversationFile {
    ConversationFile {
        responses: vec![ResponseRecord {
            id: 1,
            state: 0,
            response_state: ResponseState::Enabled,
            next_situation: 0xffff,
            target: ObjectId::new(0, 0, 0x21),
            who_can_say: vec![ObjectId::new(0, 0, 0)],
            text: TextBlock {
                text: "Hailing frequencies open.".to_string(),
                voice_group: 1,
                voice_subgroup: 2,
                voice_speaker: 3,
                voice_id: 4,
            },
            blocks: Vec::new(),
        }],
    }
}

#[test]
fn assets_load_through_a_data_dir() {
    let dir = tempdir().unwrap();
    let door = door();
    let conversation = conversation();
    let trigger = TriggerRecord::new(5, TriggerType::Timer, door.id);
    let computer = ComputerDatabase {
        entries: vec![ComputerEntry {
            title: "Enterprise".to_string(),
            paragraphs: vec!["Constitution class.".to_string()],
            links: vec![0],
        }],
    };

    // Data discs store upper-case names.
    let write = |name: &str, bytes: Vec<u8>| {
        fs::write(dir.path().join(name.to_ascii_uppercase()), bytes).unwrap();
    };
    write(&door.id.object_file_name(), door.to_bytes().unwrap());
    write(&conversation_file_name(1, 2), conversation.to_bytes().unwrap());
    write(TRIGGERS_FILE_NAME, write_triggers(&[trigger.clone()]));
    write(COMPUTER_DB_FILE_NAME, computer.to_bytes().unwrap());

    let data = DataDir::open(dir.path()).unwrap();
    assert_eq!(data.len(), 4);
    assert!(data.exists("o_010203.bst"));

    let loaded = ObjectRecord::read_from(data.open("o_010203.bst").unwrap(), door.id).unwrap();
    assert_eq!(loaded, door);

    let stream = data.open(&conversation_file_name(1, 2)).unwrap();
    let loaded = ConversationFile::read_from(stream).unwrap();
    assert_eq!(loaded, conversation);
    assert_eq!(
        loaded.responses[0].text.voice_file().as_deref(),
        Some("01020304.vac")
    );

    let triggers = read_triggers(data.open(TRIGGERS_FILE_NAME).unwrap()).unwrap();
    assert_eq!(triggers, vec![trigger]);

    let loaded = ComputerDatabase::read_from(data.open(COMPUTER_DB_FILE_NAME).unwrap()).unwrap();
    assert_eq!(loaded.find_title("enterprise"), Some(0));
}

#[test]
fn truncated_object_is_reported_as_corrupt() {
    let dir = tempdir().unwrap();
    let door = door();
    let mut bytes = door.to_bytes().unwrap();
    bytes.truncate(bytes.len() - 3);
    fs::write(dir.path().join(door.id.object_file_name()), bytes).unwrap();

    let data = DataDir::open(dir.path()).unwrap();
    let err = ObjectRecord::read_from(data.open(&door.id.object_file_name()).unwrap(), door.id)
        .unwrap_err();
    assert!(is_corrupt(&err), "{err:?}");
}

#[test]
fn object_under_the_wrong_name_is_rejected() {
    let door = door();
    let bytes = door.to_bytes().unwrap();
    let err = ObjectRecord::read_from(bytes.as_slice(), ObjectId::new(1, 2, 4)).unwrap_err();
    assert!(is_corrupt(&err));
}
