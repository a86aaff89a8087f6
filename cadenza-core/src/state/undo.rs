use std::collections::VecDeque;

/// Something a recorded command can be replayed against.
pub trait ApplyCommand<C> {
    type Error;

    fn apply(&mut self, command: &C) -> Result<(), Self::Error>;
}

/// One step of history. Both op lists run front to back; a grouped entry
/// stores its inverses already reversed.
#[derive(Debug, Clone, PartialEq)]
pub struct UndoEntry<C> {
    pub description: String,
    pub redo: Vec<C>,
    pub undo: Vec<C>,
}

impl<C> UndoEntry<C> {
    pub fn new(description: impl Into<String>, redo: Vec<C>, undo: Vec<C>) -> Self {
        Self {
            description: description.into(),
            redo,
            undo,
        }
    }
}

struct OpenGroup<C> {
    description: String,
    depth: u32,
    redo: Vec<C>,
    undo: Vec<C>,
}

pub struct UndoStack<C> {
    undo_stack: VecDeque<UndoEntry<C>>,
    redo_stack: VecDeque<UndoEntry<C>>,
    max_entries: usize,
    group: Option<OpenGroup<C>>,
}

impl<C> UndoStack<C> {
    pub fn new(max_entries: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: VecDeque::new(),
            max_entries: max_entries.max(1),
            group: None,
        }
    }

    /// Record a completed action. Inside a group it is merged into the group.
    pub fn push(&mut self, entry: UndoEntry<C>) {
        if let Some(group) = self.group.as_mut() {
            group.redo.extend(entry.redo);
            let mut undo = entry.undo;
            undo.append(&mut group.undo);
            group.undo = undo;
            return;
        }
        self.commit(entry);
    }

    pub fn record(&mut self, description: impl Into<String>, redo: Vec<C>, undo: Vec<C>) {
        self.push(UndoEntry::new(description, redo, undo));
    }

    /// Open a group. Nested groups fold into the outermost one, whose
    /// description wins.
    pub fn begin_group(&mut self, description: impl Into<String>) {
        match self.group.as_mut() {
            Some(group) => group.depth += 1,
            None => {
                self.group = Some(OpenGroup {
                    description: description.into(),
                    depth: 1,
                    redo: Vec::new(),
                    undo: Vec::new(),
                })
            }
        }
    }

    /// Close the innermost group. Returns true when this closed the outermost one.
    pub fn end_group(&mut self) -> bool {
        let Some(group) = self.group.as_mut() else {
            log::warn!(target: "undo", "end_group without begin_group");
            return false;
        };
        if group.depth > 1 {
            group.depth -= 1;
            return false;
        }
        if let Some(group) = self.group.take() {
            if group.redo.is_empty() && group.undo.is_empty() {
                log::debug!(target: "undo", "group '{}' recorded nothing", group.description);
            } else {
                self.commit(UndoEntry::new(group.description, group.redo, group.undo));
            }
        }
        true
    }

    pub fn is_grouping(&self) -> bool {
        self.group.is_some()
    }

    /// Replay the newest entry's `undo` ops against `target` and move it to the
    /// redo list. Returns its description, or `None` if there was nothing to do.
    ///
    /// If an op fails the entry goes back on the undo list. Ops are expected to
    /// be idempotent, so a later retry finishes the job.
    pub fn undo<T: ApplyCommand<C>>(&mut self, target: &mut T) -> Result<Option<String>, T::Error> {
        if self.group.is_some() {
            log::warn!(target: "undo", "undo requested while a group is open; ignored");
            return Ok(None);
        }
        let Some(entry) = self.undo_stack.pop_back() else {
            return Ok(None);
        };
        if let Err(e) = replay(target, &entry.undo) {
            log::error!(target: "undo", "undo of '{}' failed", entry.description);
            self.undo_stack.push_back(entry);
            return Err(e);
        }
        log::debug!(target: "undo", "undid '{}'", entry.description);
        let description = entry.description.clone();
        self.redo_stack.push_back(entry);
        Ok(Some(description))
    }

    pub fn redo<T: ApplyCommand<C>>(&mut self, target: &mut T) -> Result<Option<String>, T::Error> {
        if self.group.is_some() {
            log::warn!(target: "undo", "redo requested while a group is open; ignored");
            return Ok(None);
        }
        let Some(entry) = self.redo_stack.pop_back() else {
            return Ok(None);
        };
        if let Err(e) = replay(target, &entry.redo) {
            log::error!(target: "undo", "redo of '{}' failed", entry.description);
            self.redo_stack.push_back(entry);
            return Err(e);
        }
        log::debug!(target: "undo", "redid '{}'", entry.description);
        let description = entry.description.clone();
        self.undo_stack.push_back(entry);
        Ok(Some(description))
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_description(&self) -> Option<&str> {
        self.undo_stack.back().map(|e| e.description.as_str())
    }

    pub fn redo_description(&self) -> Option<&str> {
        self.redo_stack.back().map(|e| e.description.as_str())
    }

    /// Number of undoable entries.
    pub fn len(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.undo_stack.is_empty()
    }

    pub fn redo_len(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn set_max_entries(&mut self, max_entries: usize) {
        self.max_entries = max_entries.max(1);
        self.trim();
    }

    /// Drop all history. An open group stays open.
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    fn commit(&mut self, entry: UndoEntry<C>) {
        self.redo_stack.clear();
        self.undo_stack.push_back(entry);
        self.trim();
    }

    fn trim(&mut self) {
        while self.undo_stack.len() > self.max_entries {
            if let Some(dropped) = self.undo_stack.pop_front() {
                log::trace!(target: "undo", "dropped oldest entry '{}'", dropped.description);
            }
        }
    }
}

fn replay<C, T: ApplyCommand<C>>(target: &mut T, ops: &[C]) -> Result<(), T::Error> {
    for op in ops {
        target.apply(op)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    enum Op {
        Push(i32),
        Pop,
        Fail,
    }

    #[derive(Default)]
    struct Tape(Vec<i32>);

    impl ApplyCommand<Op> for Tape {
        type Error = String;

        fn apply(&mut self, command: &Op) -> Result<(), String> {
            match command {
                Op::Push(v) => self.0.push(*v),
                Op::Pop => {
                    self.0.pop();
                }
                Op::Fail => return Err("boom".into()),
            }
            Ok(())
        }
    }

    fn push(stack: &mut UndoStack<Op>, tape: &mut Tape, v: i32) {
        tape.0.push(v);
        stack.record(format!("push {v}"), vec![Op::Push(v)], vec![Op::Pop]);
    }

    #[test]
    fn undo_then_redo_restores_state() {
        let mut stack = UndoStack::new(10);
        let mut tape = Tape::default();
        push(&mut stack, &mut tape, 1);
        push(&mut stack, &mut tape, 2);

        assert_eq!(stack.undo(&mut tape).unwrap().as_deref(), Some("push 2"));
        assert_eq!(tape.0, vec![1]);
        assert!(stack.can_redo());
        stack.redo(&mut tape).unwrap();
        assert_eq!(tape.0, vec![1, 2]);
        assert!(!stack.can_redo());
    }

    #[test]
    fn new_push_discards_redo() {
        let mut stack = UndoStack::new(10);
        let mut tape = Tape::default();
        push(&mut stack, &mut tape, 1);
        stack.undo(&mut tape).unwrap();
        push(&mut stack, &mut tape, 7);
        assert!(!stack.can_redo());
        assert_eq!(stack.redo(&mut tape).unwrap(), None);
    }

    #[test]
    fn oldest_entries_are_trimmed() {
        let mut stack = UndoStack::new(2);
        let mut tape = Tape::default();
        for v in 1..=3 {
            push(&mut stack, &mut tape, v);
        }
        assert_eq!(stack.len(), 2);
        stack.undo(&mut tape).unwrap();
        stack.undo(&mut tape).unwrap();
        assert_eq!(stack.undo(&mut tape).unwrap(), None);
        assert_eq!(tape.0, vec![1]);
    }

    #[test]
    fn group_collapses_and_reverses_inverses() {
        let mut stack = UndoStack::new(10);
        let mut tape = Tape::default();
        stack.begin_group("chord");
        push(&mut stack, &mut tape, 60);
        stack.begin_group("inner");
        push(&mut stack, &mut tape, 64);
        assert!(!stack.end_group());
        push(&mut stack, &mut tape, 67);
        assert!(stack.end_group());

        assert_eq!(stack.len(), 1);
        assert_eq!(stack.undo_description(), Some("chord"));
        stack.undo(&mut tape).unwrap();
        assert!(tape.0.is_empty());
        stack.redo(&mut tape).unwrap();
        assert_eq!(tape.0, vec![60, 64, 67]);
    }

    #[test]
    fn empty_group_records_nothing() {
        let mut stack: UndoStack<Op> = UndoStack::new(10);
        stack.begin_group("nothing");
        stack.end_group();
        assert!(!stack.can_undo());
        // unmatched end is ignored
        assert!(!stack.end_group());
    }

    #[test]
    fn failed_undo_puts_entry_back() {
        let mut stack = UndoStack::new(10);
        let mut tape = Tape::default();
        stack.record("bad", vec![], vec![Op::Fail]);
        assert!(stack.undo(&mut tape).is_err());
        assert!(stack.can_undo());
        assert!(!stack.can_redo());
    }

    #[test]
    fn undo_is_refused_inside_a_group() {
        let mut stack = UndoStack::new(10);
        let mut tape = Tape::default();
        push(&mut stack, &mut tape, 1);
        stack.begin_group("open");
        assert_eq!(stack.undo(&mut tape).unwrap(), None);
        assert_eq!(tape.0, vec![1]);
    }
}
