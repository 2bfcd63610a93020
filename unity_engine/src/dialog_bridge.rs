use std::{cell::RefCell, collections::VecDeque, ops::ControlFlow, rc::Rc};

use serde::Serialize;
use unity_formats::ObjectId;

/// One spoken line handed to the host.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DialogLine {
    pub speaker: ObjectId,
    pub text: String,
    pub voice_file: Option<String>,
}

/// A selectable reply; `state` is what the host returns when it is picked.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DialogChoice {
    pub state: u16,
    pub text: String,
}

/// Presentation side of conversations. Both calls block until the player is
/// done with the line or has picked a reply. `Break` and `None` mean the
/// player quit, and the conversation ends where it stands.
pub trait DialogHost {
    fn run_dialog(&self, line: &DialogLine) -> ControlFlow<()>;

    fn run_dialog_choice(&self, choices: &[DialogChoice]) -> Option<u16>;
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DialogEvent {
    Line(DialogLine),
    Choice {
        offered: Vec<DialogChoice>,
        chosen: u16,
    },
}

/// Records everything shown and answers choices from a script. When the
/// script runs dry the first offered state is chosen.
#[derive(Clone, Default)]
pub struct RecordingDialogHost {
    events: Rc<RefCell<Vec<DialogEvent>>>,
    choices: Rc<RefCell<VecDeque<u16>>>,
    quit_after_lines: Option<usize>,
    quit_at_choice: bool,
}

impl RecordingDialogHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_choices<I>(choices: I) -> Self
    where
        I: IntoIterator<Item = u16>,
    {
        let host = Self::default();
        host.choices.borrow_mut().extend(choices);
        host
    }

    /// Quit once `lines` lines have been shown.
    pub fn quitting_after(mut self, lines: usize) -> Self {
        self.quit_after_lines = Some(lines);
        self
    }

    /// Quit instead of answering any choice.
    pub fn quitting_at_choice(mut self) -> Self {
        self.quit_at_choice = true;
        self
    }

    pub fn events(&self) -> Vec<DialogEvent> {
        self.events.borrow().clone()
    }

    pub fn lines(&self) -> Vec<String> {
        self.events
            .borrow()
            .iter()
            .filter_map(|event| match event {
                DialogEvent::Line(line) => Some(line.text.clone()),
                DialogEvent::Choice { .. } => None,
            })
            .collect()
    }
}

impl DialogHost for RecordingDialogHost {
    fn run_dialog(&self, line: &DialogLine) -> ControlFlow<()> {
        self.events.borrow_mut().push(DialogEvent::Line(line.clone()));
        match self.quit_after_lines {
            Some(limit) if self.lines().len() >= limit => ControlFlow::Break(()),
            _ => ControlFlow::Continue(()),
        }
    }

    fn run_dialog_choice(&self, choices: &[DialogChoice]) -> Option<u16> {
        if self.quit_at_choice {
            return None;
        }
        let chosen = self
            .choices
            .borrow_mut()
            .pop_front()
            .or_else(|| choices.first().map(|choice| choice.state))
            .unwrap_or(0);
        self.events.borrow_mut().push(DialogEvent::Choice {
            offered: choices.to_vec(),
            chosen,
        });
        Some(chosen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn choice(state: u16, text: &str) -> DialogChoice {
        DialogChoice {
            state,
            text: text.to_string(),
        }
    }

    #[test]
    fn recording_host_tracks_lines_and_choices() {
        let host = RecordingDialogHost::with_choices([2]);
        let line = DialogLine {
            speaker: ObjectId::new(0, 0, 1),
            text: "Hailing frequencies open.".to_string(),
            voice_file: Some("01020304.vac".to_string()),
        };
        assert_eq!(host.run_dialog(&line), ControlFlow::Continue(()));
        let offered = vec![choice(1, "Yes"), choice(2, "No")];
        assert_eq!(host.run_dialog_choice(&offered), Some(2));
        assert_eq!(host.run_dialog_choice(&offered), Some(1));

        let events = host.events();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0], DialogEvent::Line(line));
        assert_eq!(
            events[1],
            DialogEvent::Choice {
                offered: offered.clone(),
                chosen: 2
            }
        );
        assert_eq!(host.lines(), vec!["Hailing frequencies open.".to_string()]);
    }

    #[test]
    fn clones_share_the_log() {
        let host = RecordingDialogHost::new();
        let other = host.clone();
        let _ = other.run_dialog(&DialogLine {
            speaker: ObjectId::NONE,
            text: "hello".to_string(),
            voice_file: None,
        });
        assert_eq!(host.lines(), vec!["hello".to_string()]);
    }

    #[test]
    fn scripted_quit_breaks_on_the_limit() {
        let host = RecordingDialogHost::new().quitting_after(2);
        let line = |text: &str| DialogLine {
            speaker: ObjectId::NONE,
            text: text.to_string(),
            voice_file: None,
        };
        assert_eq!(host.run_dialog(&line("one")), ControlFlow::Continue(()));
        assert_eq!(host.run_dialog(&line("two")), ControlFlow::Break(()));

        let host = RecordingDialogHost::with_choices([1]).quitting_at_choice();
        assert_eq!(host.run_dialog_choice(&[choice(1, "Yes")]), None);
        assert!(host.events().is_empty());
    }
}
