use std::collections::VecDeque;

use serde::Serialize;
use unity_formats::ObjectId;

/// Something the outer game loop has to do on the interpreter's behalf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorldRequest {
    ChangeScreen { world: u8, screen: u8, entrance: u8 },
    PlayMovie { movie_id: u16 },
    BeamDown { world: u16, screen: u16 },
    Hail { target: ObjectId, hail_type: u8 },
    Walk { who: ObjectId, target: ObjectId, x: u16, y: u16 },
}

/// Requests in the order scripts issued them, plus everything already handed
/// out.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RequestQueue {
    pending: VecDeque<WorldRequest>,
    history: Vec<WorldRequest>,
}

impl RequestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, request: WorldRequest) {
        self.pending.push_back(request);
    }

    pub fn next(&mut self) -> Option<WorldRequest> {
        let request = self.pending.pop_front()?;
        self.history.push(request.clone());
        Some(request)
    }

    pub fn peek(&self) -> Option<&WorldRequest> {
        self.pending.front()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn pending(&self) -> impl ExactSizeIterator<Item = &WorldRequest> {
        self.pending.iter()
    }

    pub fn history(&self) -> &[WorldRequest] {
        &self.history
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_preserves_order_and_history() {
        let mut queue = RequestQueue::new();
        queue.push(WorldRequest::PlayMovie { movie_id: 3 });
        queue.push(WorldRequest::ChangeScreen {
            world: 1,
            screen: 2,
            entrance: 0,
        });
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.peek(), Some(&WorldRequest::PlayMovie { movie_id: 3 }));

        let mut drained = Vec::new();
        while let Some(request) = queue.next() {
            drained.push(request);
        }
        assert!(queue.is_empty());
        assert_eq!(drained.len(), 2);
        assert_eq!(queue.history(), drained.as_slice());
    }
}
