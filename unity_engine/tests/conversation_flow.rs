mod support;

use unity_engine::{
    script_error, Action, ActionType, ConversationStart, DialogChoice, DialogEvent, ResultType,
    ScriptError, WorldRequest,
};
use unity_formats::entry::{CommunicateBlock, ConversationBlock, CONVERSATION_ACTION_START};
use unity_formats::{
    ChangeAction, Entry, EntryList, ObjectId, ObjectRecord, ResponseBlock, ResponseState,
};

use support::*;

const ANYONE: ObjectId = ObjectId::new(0, 0, 0xff);

fn branching_conversation() -> Vec<unity_formats::ResponseRecord> {
    vec![
        response(1, 0, 5, "Captain, we are being hailed."),
        response(5, 0, 0xffff, "On screen."),
        response(5, 1, 6, "Hold them off."),
        response(6, 0, 0xffff, "Aye, sir."),
    ]
}

#[test]
fn several_enabled_states_surface_a_choice() {
    let fixture = Fixture::with_choices([1]).conversation(1, 2, branching_conversation());
    let mut world = fixture.build();

    world
        .start_conversation(1, 2, ConversationStart::Situation(1), ANYONE)
        .unwrap();

    let events = fixture.dialog.events();
    assert_eq!(events.len(), 4);
    assert_eq!(
        events[1],
        DialogEvent::Choice {
            offered: vec![
                DialogChoice {
                    state: 0,
                    text: "On screen.".to_string()
                },
                DialogChoice {
                    state: 1,
                    text: "Hold them off.".to_string()
                },
            ],
            chosen: 1,
        }
    );
    // The chosen state is followed exactly, not the first enabled response.
    assert_eq!(
        fixture.dialog.lines(),
        vec![
            "Captain, we are being hailed.".to_string(),
            "Hold them off.".to_string(),
            "Aye, sir.".to_string(),
        ]
    );
}

#[test]
fn single_continuation_is_taken_without_asking() {
    let mut responses = branching_conversation();
    responses[1].response_state = ResponseState::Disabled;
    let fixture = Fixture::new().conversation(1, 2, responses);
    let mut world = fixture.build();

    world
        .start_conversation(1, 2, ConversationStart::Situation(1), ANYONE)
        .unwrap();

    assert!(fixture
        .dialog
        .events()
        .iter()
        .all(|event| matches!(event, DialogEvent::Line(_))));
    assert_eq!(fixture.dialog.lines().len(), 3);
}

#[test]
fn choice_outside_the_offer_is_rejected() {
    let fixture = Fixture::with_choices([9]).conversation(1, 2, branching_conversation());
    let mut world = fixture.build();

    let err = world
        .start_conversation(1, 2, ConversationStart::Situation(1), ANYONE)
        .unwrap_err();

    assert_eq!(
        script_error(&err),
        Some(&ScriptError::InvalidChoice {
            chosen: 9,
            offered: vec![0, 1]
        })
    );
}

#[test]
fn change_action_enables_a_later_response() {
    let mut opener = response(1, 0, 0xffff, "Open a channel.");
    opener.blocks.push(ResponseBlock::ChangeAction(ChangeAction {
        enable: true,
        conversation_id: 0xffff,
        response_id: 7,
        state_id: 0,
    }));
    let mut hidden = response(7, 0, 0xffff, "Channel open.");
    hidden.response_state = ResponseState::Disabled;
    let fixture = Fixture::new().conversation(1, 2, vec![opener, hidden]);
    let mut world = fixture.build();

    let err = world
        .start_conversation(1, 2, ConversationStart::Situation(7), ANYONE)
        .unwrap_err();
    assert!(matches!(
        script_error(&err),
        Some(ScriptError::NoEnabledResponse { response: 7, .. })
    ));

    world
        .start_conversation(1, 2, ConversationStart::Situation(1), ANYONE)
        .unwrap();
    world
        .start_conversation(1, 2, ConversationStart::Situation(7), ANYONE)
        .unwrap();
    assert_eq!(
        fixture.dialog.lines(),
        vec!["Open a channel.".to_string(), "Channel open.".to_string()]
    );
}

#[test]
fn change_action_reaches_another_conversation() {
    let mut opener = response(1, 0, 0xffff, "Contact engineering.");
    opener.blocks.push(ResponseBlock::ChangeAction(ChangeAction {
        enable: true,
        conversation_id: 3,
        response_id: 4,
        state_id: 0,
    }));
    let mut engineering = response(4, 0, 0xffff, "Scott here.");
    engineering.response_state = ResponseState::Disabled;
    let fixture = Fixture::new()
        .conversation(1, 2, vec![opener])
        .conversation(1, 3, vec![engineering]);
    let mut world = fixture.build();

    world
        .start_conversation(1, 2, ConversationStart::Situation(1), ANYONE)
        .unwrap();
    world
        .start_conversation(1, 3, ConversationStart::Situation(4), ANYONE)
        .unwrap();

    assert_eq!(
        fixture.dialog.lines(),
        vec!["Contact engineering.".to_string(), "Scott here.".to_string()]
    );
}

#[test]
fn empty_text_is_not_shown() {
    let fixture = Fixture::new().conversation(
        1,
        2,
        vec![response(1, 0, 2, ""), response(2, 0, 0xffff, "Aye.")],
    );
    let mut world = fixture.build();

    world
        .start_conversation(1, 2, ConversationStart::Situation(1), ANYONE)
        .unwrap();

    assert_eq!(fixture.dialog.lines(), vec!["Aye.".to_string()]);
}

#[test]
fn quitting_on_a_line_ends_the_conversation() {
    let mut responses = branching_conversation();
    responses[0]
        .blocks
        .push(ResponseBlock::Result(EntryList::new(vec![vec![Entry::Alter(
            vec![alter_on(DOOR, 3)],
        )]])));
    let fixture = Fixture::new()
        .quitting_after(1)
        .conversation(1, 2, responses)
        .object(ObjectRecord::new(DOOR, "door"));
    let mut world = fixture.build();

    let result = world
        .start_conversation(1, 2, ConversationStart::Situation(1), ANYONE)
        .unwrap();

    assert_eq!(result, ResultType::EMPTY);
    assert_eq!(
        fixture.dialog.lines(),
        vec!["Captain, we are being hailed.".to_string()]
    );
    assert_eq!(fixture.dialog.events().len(), 1);
    assert_eq!(world.object(DOOR).unwrap().record.state, 0);
}

#[test]
fn quitting_at_a_choice_ends_the_conversation() {
    let fixture = Fixture::new()
        .quitting_at_choice()
        .conversation(1, 2, branching_conversation());
    let mut world = fixture.build();

    world
        .start_conversation(1, 2, ConversationStart::Situation(1), ANYONE)
        .unwrap();

    assert_eq!(
        fixture.dialog.lines(),
        vec!["Captain, we are being hailed.".to_string()]
    );
}

#[test]
fn result_block_runs_with_the_speaker() {
    let mut line = response(1, 0, 0xffff, "Fascinating.");
    line.target = ObjectId::new(0, 0, 0x21);
    line.who_can_say.push(KIRK);
    line.blocks.push(ResponseBlock::Result(EntryList::new(vec![vec![Entry::Alter(
        vec![alter_on(DOOR, 3)],
    )]])));
    let fixture = Fixture::new()
        .conversation(1, 2, vec![line])
        .object(ObjectRecord::new(DOOR, "door"));
    let mut world = fixture.build();

    let result = world
        .start_conversation(1, 2, ConversationStart::Situation(1), KIRK)
        .unwrap();

    assert!(result.contains(ResultType::DIDSOMETHING));
    assert_eq!(world.object(DOOR).unwrap().record.state, 3);
    // Bridge crew ids 0x20.. speak as their crew slot.
    match &fixture.dialog.events()[0] {
        DialogEvent::Line(line) => assert_eq!(line.speaker, SPOCK),
        other => panic!("expected a line, got {other:?}"),
    }
}

#[test]
fn who_can_say_filters_the_speaker() {
    let mut spock_only = response(1, 0, 0xffff, "Logical.");
    spock_only.who_can_say.push(SPOCK);
    let mut team = response(1, 1, 0xffff, "Beam us up.");
    team.who_can_say.push(ObjectId::ANY_AWAY_TEAM);
    let fixture = Fixture::new().conversation(1, 2, vec![spock_only, team]);
    let mut world = fixture.build();

    assert!(world
        .start_conversation(1, 2, ConversationStart::Situation(1), KIRK)
        .is_err());
    world.set_away_team(vec![KIRK]);
    world
        .start_conversation(1, 2, ConversationStart::Situation(1), KIRK)
        .unwrap();
    world
        .start_conversation(1, 2, ConversationStart::Situation(1), SPOCK)
        .unwrap();
    assert_eq!(
        fixture.dialog.lines(),
        vec!["Beam us up.".to_string(), "Logical.".to_string()]
    );
}

#[test]
fn conversation_block_starts_at_the_exact_response() {
    let mut disabled = response(5, 1, 0xffff, "Red alert.");
    disabled.response_state = ResponseState::Disabled;
    let door = object_with_use(
        DOOR,
        "door",
        vec![vec![Entry::Conversation(vec![ConversationBlock {
            stop_here: false,
            world_id: 1,
            conversation_id: 2,
            response_id: 5,
            state_id: 1,
            action_id: CONVERSATION_ACTION_START,
        }])]],
    );
    let fixture = Fixture::new()
        .object(door)
        .conversation(1, 2, vec![response(5, 0, 0xffff, "All clear."), disabled]);
    let mut world = fixture.build();

    let result = world
        .perform_action(Action::new(ActionType::Use, DOOR).by(KIRK))
        .unwrap();

    assert_eq!(result, ResultType::DIDSOMETHING);
    assert_eq!(fixture.dialog.lines(), vec!["Red alert.".to_string()]);
}

#[test]
fn communicate_hails_then_talks() {
    let viewscreen = ObjectId::new(1, 0, 9);
    let door = object_with_use(
        DOOR,
        "door",
        vec![vec![Entry::Communicate(CommunicateBlock {
            stop_here: false,
            target: viewscreen,
            conversation_id: 2,
            situation_id: 1,
            hail_type: 3,
        })]],
    );
    let mut hail = response(1, 0, 0xffff, "This is Captain Koloth.");
    hail.who_can_say.push(KIRK);
    let fixture = Fixture::new().object(door).conversation(1, 2, vec![hail]);
    let mut world = fixture.build();

    world
        .perform_action(Action::new(ActionType::Use, DOOR).by(KIRK))
        .unwrap();

    assert_eq!(
        world.requests().peek(),
        Some(&WorldRequest::Hail {
            target: viewscreen,
            hail_type: 3
        })
    );
    assert_eq!(fixture.dialog.lines(), vec!["This is Captain Koloth.".to_string()]);
}

#[test]
fn missing_conversation_is_a_script_error() {
    let mut world = Fixture::new().build();
    let err = world
        .start_conversation(3, 4, ConversationStart::Situation(1), ANYONE)
        .unwrap_err();
    assert_eq!(
        script_error(&err),
        Some(&ScriptError::MissingConversation {
            world: 3,
            conversation: 4
        })
    );
}
