//! Undo log
//!
//! Entries are plain data: a target identifier plus an action describing the
//! reverse effect. Applying an action is the caller's job (see
//! [`CommandStack::undo`]), so the stack itself never holds references into
//! the store.

/// One reversible action bound to one target
#[derive(Debug, Clone, PartialEq)]
pub struct Command<K, A> {
    target: K,
    action: A,
}

impl<K, A> Command<K, A> {
    /// Bind `action` to `target`
    pub fn new(target: K, action: A) -> Self {
        Command { target, action }
    }

    /// Identifier this command reverses an action on
    pub fn target(&self) -> &K {
        &self.target
    }

    /// Reverse effect to apply
    pub fn action(&self) -> &A {
        &self.action
    }

    /// Split into target and action
    pub fn into_parts(self) -> (K, A) {
        (self.target, self.action)
    }
}

/// Commands produced by one logical bulk operation
#[derive(Debug, Clone, PartialEq)]
pub struct CommandSet<K, A> {
    commands: Vec<Command<K, A>>,
}

impl<K: PartialEq, A> CommandSet<K, A> {
    /// Create an empty set
    pub fn new() -> Self {
        CommandSet {
            commands: Vec::new(),
        }
    }

    /// Add a command to the set
    pub fn add(&mut self, command: Command<K, A>) {
        self.commands.push(command);
    }

    /// Whether a command for `target` is in the set
    pub fn contains_target(&self, target: &K) -> bool {
        self.commands.iter().any(|c| &c.target == target)
    }

    /// Undo only the command for `target`, removing it from the set
    ///
    /// Returns `Ok(false)` if no command targets `target`. On failure the
    /// command is put back.
    pub fn undo_target<F, E>(&mut self, target: &K, apply: &mut F) -> Result<bool, E>
    where
        F: FnMut(&K, &A) -> Result<(), E>,
    {
        let Some(idx) = self.commands.iter().position(|c| &c.target == target) else {
            return Ok(false);
        };
        let command = self.commands.remove(idx);
        if let Err(e) = apply(&command.target, &command.action) {
            self.commands.insert(idx, command);
            return Err(e);
        }
        Ok(true)
    }

    /// Undo every command in the set
    ///
    /// Commands applied before a failure are dropped from the set; the
    /// failing command and the rest stay.
    pub fn undo_all<F, E>(&mut self, apply: &mut F) -> Result<(), E>
    where
        F: FnMut(&K, &A) -> Result<(), E>,
    {
        while let Some(command) = self.commands.first() {
            apply(&command.target, &command.action)?;
            self.commands.remove(0);
        }
        Ok(())
    }

    /// Number of commands
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether every command has been undone
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl<K: PartialEq, A> Default for CommandSet<K, A> {
    fn default() -> Self {
        Self::new()
    }
}

/// Entry of the undo log
#[derive(Debug, Clone, PartialEq)]
pub enum Undoable<K, A> {
    /// Action on one target
    Single(Command<K, A>),
    /// Actions from one bulk operation
    Set(CommandSet<K, A>),
}

impl<K: PartialEq, A> Undoable<K, A> {
    /// Whether this entry reverses anything done to `target`
    pub fn contains_target(&self, target: &K) -> bool {
        match self {
            Undoable::Single(command) => &command.target == target,
            Undoable::Set(set) => set.contains_target(target),
        }
    }
}

/// LIFO stack of undo entries
#[derive(Debug, Clone)]
pub struct CommandStack<K, A> {
    entries: Vec<Undoable<K, A>>,
}

impl<K: PartialEq, A> CommandStack<K, A> {
    /// Create an empty stack
    pub fn new() -> Self {
        CommandStack {
            entries: Vec::new(),
        }
    }

    /// Push an entry on top
    pub fn push(&mut self, entry: Undoable<K, A>) {
        self.entries.push(entry);
    }

    /// Remove the top entry
    pub fn pop(&mut self) -> Option<Undoable<K, A>> {
        self.entries.pop()
    }

    /// Top entry
    pub fn peek(&self) -> Option<&Undoable<K, A>> {
        self.entries.last()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the stack is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pop the top entry and apply it
    ///
    /// Returns `Ok(None)` when the stack is empty. If applying fails, whatever
    /// part of the entry was not applied goes back on top.
    pub fn undo<F, E>(&mut self, mut apply: F) -> Result<Option<()>, E>
    where
        F: FnMut(&K, &A) -> Result<(), E>,
    {
        let Some(entry) = self.entries.pop() else {
            return Ok(None);
        };

        match entry {
            Undoable::Single(command) => {
                if let Err(e) = apply(&command.target, &command.action) {
                    self.entries.push(Undoable::Single(command));
                    return Err(e);
                }
            }
            Undoable::Set(mut set) => {
                if let Err(e) = set.undo_all(&mut apply) {
                    self.entries.push(Undoable::Set(set));
                    return Err(e);
                }
            }
        }
        Ok(Some(()))
    }

    /// Undo the nearest entry affecting `target`
    ///
    /// Entries above it keep their position. A matching set loses only the
    /// command for `target` and stays in place while it still holds others.
    /// Returns `Ok(None)` if nothing on the stack affects `target`.
    pub fn undo_target<F, E>(&mut self, target: &K, mut apply: F) -> Result<Option<()>, E>
    where
        F: FnMut(&K, &A) -> Result<(), E>,
    {
        let Some(idx) = self.entries.iter().rposition(|e| e.contains_target(target)) else {
            return Ok(None);
        };

        match &mut self.entries[idx] {
            Undoable::Single(command) => {
                apply(&command.target, &command.action)?;
                self.entries.remove(idx);
            }
            Undoable::Set(set) => {
                set.undo_target(target, &mut apply)?;
                if set.is_empty() {
                    self.entries.remove(idx);
                }
            }
        }
        Ok(Some(()))
    }
}

impl<K: PartialEq, A> Default for CommandStack<K, A> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Stack = CommandStack<&'static str, i32>;

    fn single(target: &'static str, action: i32) -> Undoable<&'static str, i32> {
        Undoable::Single(Command::new(target, action))
    }

    fn set(commands: &[(&'static str, i32)]) -> Undoable<&'static str, i32> {
        let mut set = CommandSet::new();
        for &(target, action) in commands {
            set.add(Command::new(target, action));
        }
        Undoable::Set(set)
    }

    type Log = Vec<(&'static str, i32)>;

    fn record(log: &mut Log) -> impl FnMut(&&'static str, &i32) -> Result<(), ()> + '_ {
        move |target: &&'static str, action: &i32| {
            log.push((*target, *action));
            Ok(())
        }
    }

    #[test]
    fn test_undo_is_lifo() {
        let mut stack = Stack::new();
        stack.push(single("a", 1));
        stack.push(single("b", 2));

        let mut log = Vec::new();
        assert_eq!(stack.undo(record(&mut log)), Ok(Some(())));
        assert_eq!(stack.undo(record(&mut log)), Ok(Some(())));
        assert_eq!(stack.undo(record(&mut log)), Ok(None));
        assert_eq!(log, vec![("b", 2), ("a", 1)]);
    }

    #[test]
    fn test_undo_set_applies_every_command() {
        let mut stack = Stack::new();
        stack.push(set(&[("a", 1), ("b", 2)]));

        let mut log = Vec::new();
        stack.undo(record(&mut log)).unwrap();
        assert_eq!(log, vec![("a", 1), ("b", 2)]);
        assert!(stack.is_empty());
    }

    #[test]
    fn test_undo_target_preserves_others() {
        let mut stack = Stack::new();
        stack.push(single("a", 1));
        stack.push(single("b", 2));
        stack.push(single("c", 3));

        let mut log = Vec::new();
        stack.undo_target(&"a", record(&mut log)).unwrap();
        assert_eq!(log, vec![("a", 1)]);
        assert_eq!(stack.len(), 2);
        assert_eq!(stack.pop(), Some(single("c", 3)));
        assert_eq!(stack.pop(), Some(single("b", 2)));
    }

    #[test]
    fn test_undo_target_picks_nearest() {
        let mut stack = Stack::new();
        stack.push(single("a", 1));
        stack.push(single("b", 2));
        stack.push(single("a", 3));

        let mut log = Vec::new();
        stack.undo_target(&"a", record(&mut log)).unwrap();
        assert_eq!(log, vec![("a", 3)]);
        assert_eq!(stack.pop(), Some(single("b", 2)));
        assert_eq!(stack.pop(), Some(single("a", 1)));
    }

    #[test]
    fn test_undo_target_inside_set() {
        let mut stack = Stack::new();
        stack.push(set(&[("a", 1), ("b", 2)]));
        stack.push(single("c", 3));

        let mut log = Vec::new();
        stack.undo_target(&"a", record(&mut log)).unwrap();
        assert_eq!(log, vec![("a", 1)]);
        assert_eq!(stack.len(), 2);
        assert!(!stack.entries[0].contains_target(&"a"));
        assert!(stack.entries[0].contains_target(&"b"));

        stack.undo_target(&"b", record(&mut log)).unwrap();
        assert_eq!(stack.len(), 1);
        assert_eq!(stack.peek(), Some(&single("c", 3)));
    }

    #[test]
    fn test_undo_target_missing_leaves_stack() {
        let mut stack = Stack::new();
        stack.push(single("a", 1));
        stack.push(set(&[("b", 2)]));

        let mut log = Vec::new();
        assert_eq!(stack.undo_target(&"z", record(&mut log)), Ok(None));
        assert!(log.is_empty());
        assert_eq!(stack.len(), 2);
        assert_eq!(stack.peek(), Some(&set(&[("b", 2)])));
    }

    #[test]
    fn test_failed_undo_restores_entry() {
        let mut stack = Stack::new();
        stack.push(single("a", 1));

        assert_eq!(stack.undo(|_, _| Err("nope")), Err("nope"));
        assert_eq!(stack.peek(), Some(&single("a", 1)));

        assert_eq!(stack.undo_target(&"a", |_, _| Err("nope")), Err("nope"));
        assert_eq!(stack.len(), 1);
    }

    #[test]
    fn test_failed_set_undo_keeps_remaining_commands() {
        let mut stack = Stack::new();
        stack.push(set(&[("a", 1), ("b", 2), ("c", 3)]));

        let result = stack.undo(|target, _| if *target == "b" { Err(()) } else { Ok(()) });
        assert_eq!(result, Err(()));
        assert_eq!(stack.peek(), Some(&set(&[("b", 2), ("c", 3)])));
    }
}
