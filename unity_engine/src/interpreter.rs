//! Entry list execution: condition checks pick a branch, then its blocks run
//! in order against the world.

use anyhow::{Context, Result};
use log::{debug, warn};
use unity_formats::entry::{
    ALTER_ACTIVATE, ALTER_DEACTIVATE, ALTER_DROP, ALTER_GET, ALTER_STUN, ALTER_UNSTUN, AlterBlock,
    BeamBlock, COMMAND_GET, COMMAND_LOOK, COMMAND_USE, COMMAND_WALK, CONVERSATION_ACTION_DISABLE,
    CONVERSATION_ACTION_ENABLE, CONVERSATION_ACTION_START, COUNTER_DO_UNTIL, COUNTER_DO_WHEN,
    CommandBlock, CommunicateBlock, ConditionBlock, ConversationBlock, GeneralBlock, NONE_I16,
    NONE_I32, NONE_U16, NONE_U8, ObjectCheck, ScreenBlock, TriggerBlock,
};
use unity_formats::object::{
    OBJFLAG_ACTIVE, OBJFLAG_GET, OBJFLAG_LOOK, OBJFLAG_STUNNED, OBJFLAG_TALK, OBJFLAG_USE,
    OBJFLAG_WALK,
};
use unity_formats::{Entry, EntryList, ObjectId};

use crate::action::{Action, ActionType};
use crate::conversation::ConversationStart;
use crate::error::ScriptError;
use crate::object::{AnimationChange, Voice};
use crate::requests::WorldRequest;
use crate::result::ResultType;
use crate::world::World;

/// `alter_reset` bit to object flag.
const RESET_FLAGS: [(u8, u16); 5] = [
    (0x01, OBJFLAG_WALK),
    (0x02, OBJFLAG_USE),
    (0x04, OBJFLAG_TALK),
    (0x08, OBJFLAG_GET),
    (0x10, OBJFLAG_LOOK),
];

/// Run the first branch whose conditions all pass. Only one branch executes
/// per call.
pub fn execute_list(
    world: &mut World,
    list: &mut EntryList,
    action: &Action,
) -> Result<ResultType> {
    let mut result = ResultType::EMPTY;
    for (index, branch) in list.branches.iter_mut().enumerate() {
        // WALKING, MATCHOTHER and DIDSOMETHING survive a rejected branch.
        result &= ResultType::CARRIED;

        let mut rejected = false;
        for entry in branch.iter_mut() {
            if let Entry::Condition(condition) = entry {
                result |= check_condition(world, condition, action)?;
                if result.failed() {
                    debug!("branch {index} rejected: {result:?}");
                    rejected = true;
                    break;
                }
            }
        }
        if rejected {
            continue;
        }

        debug!("branch {index} selected for {action}");
        for entry in branch.iter() {
            result = execute_entry(world, entry, action, result)
                .with_context(|| format!("branch {index}, {} entry", entry.kind_name()))?;
            if result.contains(ResultType::STOPPED) {
                break;
            }
        }
        break;
    }
    Ok(result)
}

/// Evaluate one condition. Counters are consumed, so the block is mutable.
pub fn check_condition(
    world: &mut World,
    condition: &mut ConditionBlock,
    action: &Action,
) -> Result<ResultType> {
    let mut result = ResultType::EMPTY;

    if condition.target == ObjectId::OTHER_ABSENT {
        if action.other.is_some() {
            return Ok(result | ResultType::FAILOTHER);
        }
    } else if condition.target.is_some() {
        if condition.target != action.other {
            return Ok(result | ResultType::FAILOTHER);
        }
        result |= ResultType::MATCHOTHER;
    }

    if condition.how_close_dist != NONE_U16 {
        warn!(
            "how-close condition ({} from {},{}) is not implemented",
            condition.how_close_dist, condition.how_close_x, condition.how_close_y
        );
    }

    if condition.who_can.is_some()
        && condition.who_can != ObjectId::ANY_AWAY_TEAM
        && condition.who_can != action.who
    {
        return Ok(result | ResultType::AWAYTEAM);
    }

    match condition.counter_when {
        NONE_U8 => {}
        COUNTER_DO_WHEN => {
            if condition.counter_value > 0 {
                condition.counter_value -= 1;
                return Ok(result | ResultType::COUNTER_DOWHEN);
            }
        }
        COUNTER_DO_UNTIL => {
            if condition.counter_value == NONE_U16 {
                return Ok(result | ResultType::COUNTER_DOUNTIL);
            }
            condition.counter_value = condition.counter_value.wrapping_sub(1);
        }
        other => warn!("counter mode {other} is not recognised; ignored"),
    }

    for check in condition.checks.iter().filter(|check| check.object.is_some()) {
        if !object_check_passes(world, check)? {
            debug!("object check on {} failed", check.object);
            return Ok(result | ResultType::FAILCONDITION);
        }
    }
    Ok(result)
}

fn object_check_passes(world: &mut World, check: &ObjectCheck) -> Result<bool> {
    // Loading the object first seeds the inventory from its flags.
    world.object(check.object)?;
    let in_inventory = world.has_in_inventory(check.object);
    let in_away_team = world.in_away_team(check.object);
    let object = world.object(check.object)?;
    let record = &object.record;

    if check.check_state != NONE_U8 && record.state != check.check_state {
        return Ok(false);
    }
    match check.check_status {
        NONE_U8 => {}
        1 if !object.is_active() => return Ok(false),
        0 if object.is_active() => return Ok(false),
        0 | 1 => {}
        other => warn!("object status check {other} is not recognised; ignored"),
    }
    match check.check_has {
        NONE_U8 => {}
        1 if !(in_inventory || in_away_team) => return Ok(false),
        0 if in_inventory => return Ok(false),
        0 | 1 => {}
        other => warn!("object has-check {other} is not recognised; ignored"),
    }
    if check.check_x != NONE_I16 && record.x != check.check_x {
        return Ok(false);
    }
    if check.check_y != NONE_I16 && record.y != check.check_y {
        return Ok(false);
    }
    if check.check_univ_x != NONE_I32 && record.universe_x != check.check_univ_x {
        return Ok(false);
    }
    if check.check_univ_y != NONE_I32 && record.universe_y != check.check_univ_y {
        return Ok(false);
    }
    if check.check_univ_z != NONE_I32 && record.universe_z != check.check_univ_z {
        return Ok(false);
    }
    if check.check_screen != NONE_U8 && record.curr_screen != check.check_screen {
        return Ok(false);
    }
    Ok(true)
}

fn not_implemented(kind: &str) -> ResultType {
    warn!("{kind} blocks are not implemented");
    ResultType::EMPTY
}

/// Run every block of an entry, folding results into `result`. A block
/// marked stop-here (or a nested STOPPED) ends the run.
fn execute_entry(
    world: &mut World,
    entry: &Entry,
    action: &Action,
    mut result: ResultType,
) -> Result<ResultType> {
    macro_rules! run {
        ($blocks:expr, |$block:ident| $body:expr) => {{
            for $block in $blocks {
                result |= $body;
                if $block.stop_here {
                    result |= ResultType::STOPPED;
                }
                if result.contains(ResultType::STOPPED) {
                    break;
                }
            }
        }};
    }

    match entry {
        Entry::Condition(block) => {
            if block.stop_here {
                result |= ResultType::STOPPED;
            }
        }
        Entry::Alter(blocks) => run!(blocks, |block| execute_alter(world, block, action)?),
        Entry::Reaction(blocks) => run!(blocks, |block| not_implemented("reaction")),
        Entry::Command(blocks) => run!(blocks, |block| execute_command(world, block, action)?),
        Entry::Screen(screen) => run!(Some(screen), |block| execute_screen(world, block)),
        Entry::Path(path) => run!(Some(path), |block| not_implemented("path")),
        Entry::General(general) => run!(Some(general), |block| execute_general(world, block)),
        Entry::Conversation(blocks) => {
            run!(blocks, |block| execute_conversation(world, block, action)?)
        }
        Entry::Beam(beam) => run!(Some(beam), |block| execute_beam(world, block)),
        Entry::Trigger(blocks) => run!(blocks, |block| execute_trigger(world, block)?),
        Entry::Communicate(communicate) => {
            run!(Some(communicate), |block| execute_communicate(world, block, action)?)
        }
        // Both nested lists are kept on the block but never run.
        Entry::Choice(choice) => run!(Some(choice), |block| not_implemented("choice")),
    }
    Ok(result)
}

fn execute_alter(world: &mut World, block: &AlterBlock, action: &Action) -> Result<ResultType> {
    let target = if block.target.is_some() {
        block.target
    } else {
        action.target
    };
    world.object_mut(target)?;
    let mut changed = false;

    if block.alter_flags & ALTER_GET != 0 {
        changed |= world.add_to_inventory(target)?;
    }
    if block.alter_flags & ALTER_DROP != 0 {
        changed |= world.remove_from_inventory(target)?;
    }

    let object = world.object_mut(target)?;
    if block.alter_flags & ALTER_ACTIVATE != 0 {
        changed |= object.set_flags(OBJFLAG_ACTIVE, true);
    }
    if block.alter_flags & ALTER_DEACTIVATE != 0 {
        changed |= object.set_flags(OBJFLAG_ACTIVE, false);
    }
    if block.alter_flags & ALTER_STUN != 0 {
        changed |= object.set_flags(OBJFLAG_STUNNED, true);
    }
    if block.alter_flags & ALTER_UNSTUN != 0 {
        changed |= object.set_flags(OBJFLAG_STUNNED, false);
    }
    for (bit, flag) in RESET_FLAGS {
        if block.alter_reset & bit != 0 {
            changed |= object.set_flags(flag, false);
        }
    }

    let record = &mut object.record;
    if block.x != NONE_I16 && block.y != NONE_I16 {
        record.x = block.x;
        record.y = block.y;
        changed = true;
    }
    if !block.alter_name.is_empty() {
        record.name = block.alter_name.clone();
        changed = true;
    }
    if block.alter_state != NONE_U8 {
        record.state = block.alter_state;
        changed = true;
    }
    if block.alter_timer != NONE_U16 {
        record.timer = block.alter_timer;
        changed = true;
    }
    if block.universe_x != NONE_I32 {
        record.universe_x = block.universe_x;
        changed = true;
    }
    if block.universe_y != NONE_I32 {
        record.universe_y = block.universe_y;
        changed = true;
    }
    if block.universe_z != NONE_I32 {
        record.universe_z = block.universe_z;
        changed = true;
    }
    if !block.alter_hail.is_empty() {
        object.hail = Some(block.alter_hail.clone());
        changed = true;
    }
    if block.voice_group != NONE_U8 {
        object.voice = Some(Voice {
            group: block.voice_group,
            subgroup: block.voice_subgroup,
            id: block.voice_id,
        });
        changed = true;
    }
    if let Some(animation) = AnimationChange::from_alter(block.alter_anim) {
        object.animation = Some(animation);
        changed = true;
    }
    if block.play_description != NONE_U8 {
        world.show_description(target, block.play_description, action.who)?;
        changed = true;
    }

    if changed {
        Ok(ResultType::DIDSOMETHING)
    } else {
        warn!("alter block on {target} changed nothing");
        Ok(ResultType::EMPTY)
    }
}

fn execute_command(world: &mut World, block: &CommandBlock, action: &Action) -> Result<ResultType> {
    let target = if block.target.is_some() {
        block.target
    } else {
        action.target
    };
    let verb = match block.command_id {
        COMMAND_USE => ActionType::Use,
        COMMAND_GET => ActionType::Get,
        COMMAND_LOOK => ActionType::Look,
        COMMAND_WALK => {
            world.request(WorldRequest::Walk {
                who: action.who,
                target,
                x: block.x,
                y: block.y,
            });
            return Ok(ResultType::WALKING | ResultType::DIDSOMETHING);
        }
        other => {
            warn!("command {other} on {target} is not implemented");
            return Ok(ResultType::EMPTY);
        }
    };
    let nested = Action {
        verb,
        target,
        who: action.who,
        other: block.target2,
        x: None,
        y: None,
    };
    world.perform_action(nested)
}

fn execute_screen(world: &mut World, block: &ScreenBlock) -> ResultType {
    if block.new_screen != NONE_U8 {
        let request = WorldRequest::ChangeScreen {
            world: world.current_world(),
            screen: block.new_screen,
            entrance: block.new_entrance,
        };
        world.request(request);
    }
    if block.advice_id != NONE_U16 {
        world.set_advice(block.advice_id, block.advice_timer);
    }
    debug!("screen block reserved fields: {:?}", block.unknown);
    ResultType::DIDSOMETHING
}

fn execute_general(world: &mut World, block: &GeneralBlock) -> ResultType {
    if block.movie_id != NONE_U16 {
        world.request(WorldRequest::PlayMovie {
            movie_id: block.movie_id,
        });
    }
    ResultType::DIDSOMETHING
}

fn execute_conversation(
    world: &mut World,
    block: &ConversationBlock,
    action: &Action,
) -> Result<ResultType> {
    let world_id =
        u8::try_from(block.world_id).map_err(|_| ScriptError::WorldOutOfRange(block.world_id))?;
    match block.action_id {
        CONVERSATION_ACTION_ENABLE | CONVERSATION_ACTION_DISABLE => {
            world
                .conversation_mut(world_id, block.conversation_id)?
                .set_response_state(
                    block.response_id,
                    block.state_id,
                    block.action_id == CONVERSATION_ACTION_ENABLE,
                )?;
            Ok(ResultType::DIDSOMETHING)
        }
        CONVERSATION_ACTION_START => {
            let start = ConversationStart::Response {
                id: block.response_id,
                state: block.state_id,
            };
            world.start_conversation(world_id, block.conversation_id, start, action.who)?;
            Ok(ResultType::DIDSOMETHING)
        }
        other => {
            warn!("conversation action {other} is not recognised");
            Ok(ResultType::EMPTY)
        }
    }
}

fn execute_beam(world: &mut World, block: &BeamBlock) -> ResultType {
    world.request(WorldRequest::BeamDown {
        world: block.world_id,
        screen: block.screen_id,
    });
    ResultType::DIDSOMETHING
}

fn execute_trigger(world: &mut World, block: &TriggerBlock) -> Result<ResultType> {
    world.trigger_mut(block.trigger_id)?.record.enabled = block.enable_trigger;
    Ok(ResultType::DIDSOMETHING)
}

fn execute_communicate(
    world: &mut World,
    block: &CommunicateBlock,
    action: &Action,
) -> Result<ResultType> {
    if block.hail_type != NONE_U8 {
        world.request(WorldRequest::Hail {
            target: block.target,
            hail_type: block.hail_type,
        });
    }
    world.start_conversation(
        block.target.world,
        block.conversation_id,
        ConversationStart::Situation(block.situation_id),
        action.who,
    )?;
    Ok(ResultType::DIDSOMETHING)
}
