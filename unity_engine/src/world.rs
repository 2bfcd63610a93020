//! Mutable game state: the object table, conversation cache, triggers,
//! inventory and away team, plus the request queue read by the game loop.

use std::collections::btree_map::Entry as MapEntry;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::Serialize;
use unity_formats::object::OBJFLAG_INVENTORY;
use unity_formats::screen::{screen_list_file_name, screen_objects_file_name};
use unity_formats::{
    ConversationFile, ObjectId, ObjectRecord, Polygon, ResourceProvider, ScreenList,
    TRIGGERS_FILE_NAME, conversation_file_name, read_polygons, read_screen_objects, read_triggers,
};

use crate::action::{Action, ActionType};
use crate::conversation::{self, Conversation, ConversationStart};
use crate::dialog_bridge::{DialogHost, DialogLine};
use crate::error::ScriptError;
use crate::interpreter;
use crate::object::Object;
use crate::requests::{RequestQueue, WorldRequest};
use crate::result::ResultType;
use crate::trigger::{Placement, Trigger};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Advice {
    pub id: u16,
    pub timer: u16,
}

/// The screen the away team is standing on.
#[derive(Debug, Clone, Serialize)]
pub struct CurrentScreen {
    pub world: u8,
    pub screen: u8,
    pub objects: Vec<ObjectId>,
    pub polygons: Vec<Polygon>,
}

impl CurrentScreen {
    /// First polygon containing the point, in file order.
    pub fn polygon_at(&self, x: i32, y: i32) -> Option<&Polygon> {
        self.polygons.iter().find(|polygon| polygon.contains(x, y))
    }
}

pub struct World {
    resources: Box<dyn ResourceProvider>,
    dialog: Rc<dyn DialogHost>,
    objects: BTreeMap<u32, Object>,
    conversations: BTreeMap<(u8, u16), Conversation>,
    triggers: Vec<Trigger>,
    inventory: BTreeSet<ObjectId>,
    away_team: Vec<ObjectId>,
    current_world: u8,
    current_screen: Option<CurrentScreen>,
    advice: Option<Advice>,
    requests: RequestQueue,
}

impl World {
    /// Build a world over `resources`. The trigger table is loaded up front
    /// when present; everything else loads on first use.
    pub fn new(resources: Box<dyn ResourceProvider>, dialog: Rc<dyn DialogHost>) -> Result<Self> {
        let mut world = Self {
            resources,
            dialog,
            objects: BTreeMap::new(),
            conversations: BTreeMap::new(),
            triggers: Vec::new(),
            inventory: BTreeSet::new(),
            away_team: Vec::new(),
            current_world: 0,
            current_screen: None,
            advice: None,
            requests: RequestQueue::new(),
        };
        if world.resources.exists(TRIGGERS_FILE_NAME) {
            world.load_triggers()?;
        } else {
            debug!("no {TRIGGERS_FILE_NAME}; starting without triggers");
        }
        Ok(world)
    }

    pub fn load_triggers(&mut self) -> Result<()> {
        let stream = self.resources.open(TRIGGERS_FILE_NAME)?;
        let records = read_triggers(stream).context("loading trigger table")?;
        debug!("loaded {} triggers", records.len());
        self.triggers = records.into_iter().map(Trigger::new).collect();
        Ok(())
    }

    pub fn resources(&self) -> &dyn ResourceProvider {
        self.resources.as_ref()
    }

    pub fn dialog(&self) -> Rc<dyn DialogHost> {
        Rc::clone(&self.dialog)
    }

    pub fn object(&mut self, id: ObjectId) -> Result<&Object> {
        self.object_mut(id).map(|object| &*object)
    }

    /// Fetch an object, loading its record on first reference.
    pub fn object_mut(&mut self, id: ObjectId) -> Result<&mut Object> {
        match self.objects.entry(id.key()) {
            MapEntry::Occupied(entry) => Ok(entry.into_mut()),
            MapEntry::Vacant(entry) => {
                let name = id.object_file_name();
                let stream = self
                    .resources
                    .open(&name)
                    .with_context(|| format!("loading object {id}"))?;
                let record = ObjectRecord::read_from(stream, id)
                    .with_context(|| format!("parsing {name}"))?;
                debug!("loaded object {id} {:?}", record.name);
                if record.flags & OBJFLAG_INVENTORY != 0 {
                    self.inventory.insert(id);
                }
                Ok(entry.insert(Object::new(record)))
            }
        }
    }

    /// Objects already loaded; never touches the resources.
    pub fn loaded_object(&self, id: ObjectId) -> Option<&Object> {
        self.objects.get(&id.key())
    }

    pub fn loaded_objects(&self) -> impl Iterator<Item = &Object> {
        self.objects.values()
    }

    /// Install a record directly, replacing anything loaded for that id.
    pub fn insert_object(&mut self, record: ObjectRecord) {
        if record.flags & OBJFLAG_INVENTORY != 0 {
            self.inventory.insert(record.id);
        } else {
            self.inventory.remove(&record.id);
        }
        self.objects.insert(record.id.key(), Object::new(record));
    }

    pub fn conversation_mut(&mut self, world: u8, id: u16) -> Result<&mut Conversation> {
        match self.conversations.entry((world, id)) {
            MapEntry::Occupied(entry) => Ok(entry.into_mut()),
            MapEntry::Vacant(entry) => {
                let name = conversation_file_name(world, id);
                if !self.resources.exists(&name) {
                    return Err(ScriptError::MissingConversation {
                        world,
                        conversation: id,
                    }
                    .into());
                }
                let stream = self.resources.open(&name)?;
                let file = ConversationFile::read_from(stream)
                    .with_context(|| format!("parsing {name}"))?;
                debug!("loaded conversation {name} ({} responses)", file.responses.len());
                Ok(entry.insert(Conversation::new(world, id, file)))
            }
        }
    }

    pub fn start_conversation(
        &mut self,
        world: u8,
        id: u16,
        start: ConversationStart,
        speaker: ObjectId,
    ) -> Result<ResultType> {
        conversation::run_conversation(self, world, id, start, speaker)
            .with_context(|| format!("running conversation {id} of world {world}"))
    }

    pub fn triggers(&self) -> &[Trigger] {
        &self.triggers
    }

    pub fn trigger_mut(&mut self, id: u32) -> Result<&mut Trigger, ScriptError> {
        self.triggers
            .iter_mut()
            .find(|trigger| trigger.id() == id)
            .ok_or(ScriptError::MissingTrigger(id))
    }

    pub fn inventory(&self) -> &BTreeSet<ObjectId> {
        &self.inventory
    }

    pub fn has_in_inventory(&self, id: ObjectId) -> bool {
        self.inventory.contains(&id)
    }

    /// Carry `id`. The object's INVENTORY flag follows the set, so the
    /// object is loaded first.
    pub fn add_to_inventory(&mut self, id: ObjectId) -> Result<bool> {
        let flagged = self.object_mut(id)?.set_flags(OBJFLAG_INVENTORY, true);
        Ok(self.inventory.insert(id) | flagged)
    }

    pub fn remove_from_inventory(&mut self, id: ObjectId) -> Result<bool> {
        let cleared = self.object_mut(id)?.set_flags(OBJFLAG_INVENTORY, false);
        Ok(self.inventory.remove(&id) | cleared)
    }

    pub fn away_team(&self) -> &[ObjectId] {
        &self.away_team
    }

    pub fn set_away_team(&mut self, members: Vec<ObjectId>) {
        self.away_team = members;
    }

    pub fn in_away_team(&self, id: ObjectId) -> bool {
        self.away_team.contains(&id)
    }

    pub fn current_world(&self) -> u8 {
        self.current_world
    }

    pub fn current_screen(&self) -> Option<&CurrentScreen> {
        self.current_screen.as_ref()
    }

    /// Load a screen's object list and walk polygons and make it current.
    /// Every listed object is loaded so that later checks see it.
    pub fn enter_screen(&mut self, world: u8, screen: u8) -> Result<()> {
        let name = screen_objects_file_name(world, screen);
        let stream = self.resources.open(&name)?;
        let objects = read_screen_objects(stream).with_context(|| format!("parsing {name}"))?;
        let polygons = self.load_polygons(world, screen)?;
        for &id in &objects {
            self.object(id)
                .with_context(|| format!("populating screen {world}:{screen}"))?;
        }
        info!(
            "entered screen {world}:{screen} ({} objects, {} polygons)",
            objects.len(),
            polygons.len()
        );
        self.current_world = world;
        self.current_screen = Some(CurrentScreen {
            world,
            screen,
            objects,
            polygons,
        });
        Ok(())
    }

    fn load_polygons(&self, world: u8, screen: u8) -> Result<Vec<Polygon>> {
        let list_name = screen_list_file_name(world);
        if !self.resources.exists(&list_name) {
            debug!("no {list_name}; screen {world}:{screen} has no polygons");
            return Ok(Vec::new());
        }
        let list = ScreenList::read_from(self.resources.open(&list_name)?)
            .with_context(|| format!("parsing {list_name}"))?;
        let Some(entry) = list.find(screen) else {
            warn!("screen {screen} missing from {list_name}");
            return Ok(Vec::new());
        };
        if entry.polygon_file.is_empty() {
            return Ok(Vec::new());
        }
        let mut stream = self.resources.open(&entry.polygon_file)?;
        read_polygons(&mut stream).with_context(|| format!("parsing {}", entry.polygon_file))
    }

    pub fn advice(&self) -> Option<Advice> {
        self.advice
    }

    pub fn set_advice(&mut self, id: u16, timer: u16) {
        self.advice = Some(Advice { id, timer });
    }

    pub fn requests(&self) -> &RequestQueue {
        &self.requests
    }

    pub fn requests_mut(&mut self) -> &mut RequestQueue {
        &mut self.requests
    }

    pub(crate) fn request(&mut self, request: WorldRequest) {
        info!("request: {request:?}");
        self.requests.push(request);
    }

    /// Run the target's entry list for the action's verb. A LOOK that does
    /// nothing falls back to the first description.
    pub fn perform_action(&mut self, action: Action) -> Result<ResultType> {
        if matches!(action.verb, ActionType::Talk | ActionType::Walk) {
            warn!("{} actions are not implemented ({action})", action.verb);
            return Ok(ResultType::EMPTY);
        }
        let list = self
            .object_mut(action.target)?
            .entries_mut(action.verb)
            .and_then(Option::take);

        let mut result = match list {
            Some(mut list) => {
                let outcome = interpreter::execute_list(self, &mut list, &action);
                if let Some(slot) = self
                    .objects
                    .get_mut(&action.target.key())
                    .and_then(|object| object.entries_mut(action.verb))
                {
                    *slot = Some(list);
                }
                outcome.with_context(|| format!("performing {action}"))?
            }
            None => {
                debug!("{} has no {} entries", action.target, action.verb);
                ResultType::EMPTY
            }
        };

        if action.verb == ActionType::Look && !result.contains(ResultType::DIDSOMETHING) {
            let has_description = self
                .loaded_object(action.target)
                .is_some_and(|object| !object.record.descriptions.is_empty());
            if has_description {
                self.show_description(action.target, 0, action.who)?;
                result |= ResultType::DIDSOMETHING;
            }
        }
        Ok(result)
    }

    pub fn show_description(&mut self, target: ObjectId, index: u8, who: ObjectId) -> Result<()> {
        let object = self.object(target)?;
        let description = object
            .description(index)
            .ok_or(ScriptError::MissingDescription {
                object: target,
                index,
            })?;
        let line = DialogLine {
            speaker: who,
            text: description.text.clone(),
            voice_file: object.description_voice(description),
        };
        if self.dialog.run_dialog(&line).is_break() {
            debug!("description {index} of {target} dismissed");
        }
        Ok(())
    }

    fn placement(&mut self, id: ObjectId) -> Result<Placement> {
        let object = self.object(id)?;
        Ok(Placement {
            world: id.world,
            screen: object.record.curr_screen,
            x: object.record.x,
            y: object.record.y,
        })
    }

    /// Advance triggers to `now` (milliseconds) and count object timers down
    /// by one tick. Fired triggers and expired timers perform TIMER on their
    /// object.
    pub fn tick(&mut self, now: u32) -> Result<ResultType> {
        let mut due = Vec::new();
        for index in 0..self.triggers.len() {
            let trigger = &self.triggers[index];
            let placements = if trigger.is_proximity() && trigger.record.enabled {
                let (from, to) = (trigger.record.from, trigger.record.to);
                Some((self.placement(from)?, self.placement(to)?))
            } else {
                None
            };
            let trigger = &mut self.triggers[index];
            if trigger.tick(now, placements) {
                debug!("trigger {} fired at {now}", trigger.id());
                due.push(trigger.target());
            }
        }

        for object in self.objects.values_mut() {
            if object.record.timer == 0 {
                continue;
            }
            object.record.timer -= 1;
            if object.record.timer == 0 {
                debug!("timer of {} expired", object.id());
                due.push(object.id());
            }
        }

        let mut result = ResultType::EMPTY;
        for target in due {
            result |= self.perform_action(Action::new(ActionType::Timer, target))?;
        }
        Ok(result)
    }
}
