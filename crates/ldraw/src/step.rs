use std::collections::HashMap;

use log::warn;

use crate::ids::CommandId;

/// Groups command ids into 1-indexed build steps.
///
/// A fresh sequencer has no steps and current step `0`; commands added while
/// the current step is `0` are not grouped at all.
#[derive(Debug, Clone, Default)]
pub struct StepSequencer {
    steps: Vec<Vec<CommandId>>,
    assigned: HashMap<CommandId, usize>,
    current: usize,
}

impl StepSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn count(&self) -> usize {
        self.steps.len()
    }

    pub fn has_steps(&self) -> bool {
        !self.steps.is_empty()
    }

    /// Commands in step `n`. Step `0` and steps past the end are empty.
    pub fn step(&self, n: usize) -> &[CommandId] {
        match n {
            0 => &[],
            n => self.steps.get(n - 1).map(Vec::as_slice).unwrap_or(&[]),
        }
    }

    /// Step a command belongs to, if any.
    pub fn step_of(&self, id: CommandId) -> Option<usize> {
        self.assigned.get(&id).copied()
    }

    /// Advances the current step. The last step is only left behind once it
    /// holds at least one command, so empty trailing steps never pile up.
    pub fn next(&mut self) -> usize {
        let count = self.steps.len();
        if self.current == 0 {
            self.current = 1;
        } else if self.current == count {
            if !self.steps[count - 1].is_empty() {
                self.current += 1;
            }
        } else if self.current < count {
            self.current += 1;
        }
        self.current
    }

    pub fn prev(&mut self) -> usize {
        if self.current > 1 {
            self.current -= 1;
        }
        self.current
    }

    pub fn first(&mut self) -> usize {
        if self.has_steps() {
            self.current = 1;
        }
        self.current
    }

    pub fn last(&mut self) -> usize {
        if self.has_steps() {
            self.current = self.steps.len();
        }
        self.current
    }

    /// Appends `id` to the current step, creating it if needed.
    pub fn add(&mut self, id: CommandId) {
        if self.current == 0 {
            return;
        }
        self.attach(id, self.current);
    }

    /// Detaches `id` from whatever step holds it.
    pub fn remove(&mut self, id: CommandId) -> bool {
        let Some(n) = self.assigned.remove(&id) else {
            return false;
        };
        match self.steps.get_mut(n - 1) {
            Some(step) => {
                step.retain(|c| *c != id);
                true
            }
            None => {
                warn!("Command {id} assigned to undefined step {n}");
                false
            }
        }
    }

    /// Moves `id` to step `s`. `s` may name one step past the end, which
    /// creates it; anything else out of range is ignored.
    pub fn move_to(&mut self, id: CommandId, s: usize) -> bool {
        if s == 0 || s > self.steps.len() + 1 {
            return false;
        }
        self.remove(id);
        self.attach(id, s);
        true
    }

    /// Same grouping with every id translated through `map`.
    pub(crate) fn remapped(&self, map: &HashMap<CommandId, CommandId>) -> Self {
        let translate = |id: &CommandId| map.get(id).copied().unwrap_or(*id);
        Self {
            steps: self
                .steps
                .iter()
                .map(|s| s.iter().map(translate).collect())
                .collect(),
            assigned: self
                .assigned
                .iter()
                .map(|(id, n)| (translate(id), *n))
                .collect(),
            current: self.current,
        }
    }

    fn attach(&mut self, id: CommandId, s: usize) {
        while self.steps.len() < s {
            self.steps.push(Vec::new());
        }
        self.steps[s - 1].push(id);
        self.assigned.insert(id, s);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::IdAllocator;

    #[test]
    fn fresh_sequencer() {
        let mut s = StepSequencer::new();
        assert_eq!(s.current(), 0);
        assert!(s.step(1).is_empty());
        assert!(s.step(0).is_empty());
        s.add(IdAllocator::new().command_id());
        assert_eq!(s.count(), 0);
        assert_eq!(s.prev(), 0);
    }

    #[test]
    fn next_waits_for_content() {
        let ids = IdAllocator::new();
        let mut s = StepSequencer::new();
        assert_eq!(s.next(), 1);
        // step 1 does not exist yet
        assert_eq!(s.next(), 1);
        s.add(ids.command_id());
        assert_eq!(s.count(), 1);
        assert_eq!(s.next(), 2);
        // step 2 is empty so we stay there
        assert_eq!(s.next(), 2);
        s.add(ids.command_id());
        assert_eq!(s.next(), 3);
        assert_eq!(s.prev(), 2);
        assert_eq!(s.prev(), 1);
        assert_eq!(s.prev(), 1);
        assert_eq!(s.next(), 2);
        assert_eq!(s.last(), 2);
        assert_eq!(s.first(), 1);
    }

    #[test]
    fn move_between_steps() {
        let ids = IdAllocator::new();
        let a = ids.command_id();
        let b = ids.command_id();
        let mut s = StepSequencer::new();
        s.next();
        s.add(a);
        s.add(b);

        assert!(!s.move_to(a, 0));
        assert!(!s.move_to(a, 3));
        assert_eq!(s.step(1), &[a, b]);

        assert!(s.move_to(a, 2));
        assert_eq!(s.step(1), &[b]);
        assert_eq!(s.step(2), &[a]);
        assert_eq!(s.step_of(a), Some(2));
        assert_eq!(s.count(), 2);

        assert!(s.remove(a));
        assert!(!s.remove(a));
        assert!(s.step(2).is_empty());
        assert_eq!(s.step_of(a), None);
    }
}
