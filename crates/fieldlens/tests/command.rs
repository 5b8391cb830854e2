use fieldlens::grammar::*;
use fieldlens::{Command, CommandHistory, Editor, EditorError, EditorSettings, EntryId};

fn abc() -> ConstructRef {
    structure(vec![
        field("a", int8ub()),
        field("b", int8ub()),
        field("c", int8ub()),
    ])
}

fn open(settings: EditorSettings) -> (Editor, Vec<EntryId>) {
    let mut editor = Editor::new(settings);
    editor.set_grammar(&abc()).expect("grammar");
    editor.load_bytes(vec![0, 0, 0]).expect("load");
    let root = editor.children_of(None)[0];
    let rows = editor.children_of(Some(root));
    (editor, rows)
}

#[test]
fn submit_after_undo_truncates_redo_branch() {
    let (mut editor, rows) = open(EditorSettings::default());
    editor.set_value(rows[0], Value::Int(1)).expect("set a");
    editor.set_value(rows[1], Value::Int(2)).expect("set b");
    editor.set_value(rows[2], Value::Int(3)).expect("set c");
    assert_eq!(editor.bytes(), &[1, 2, 3]);
    assert_eq!(editor.history_cursor(), Some(2));

    assert!(editor.undo().expect("undo"));
    assert!(editor.undo().expect("undo"));
    assert_eq!(editor.bytes(), &[1, 0, 0]);
    assert_eq!(editor.history_cursor(), Some(0));
    assert!(editor.can_redo());

    editor.set_value(rows[2], Value::Int(4)).expect("set c");
    assert_eq!(editor.history_names(), vec!["set a", "set c"]);
    assert_eq!(editor.history_cursor(), Some(1));
    assert!(!editor.can_redo());
    assert!(!editor.redo().expect("redo"));
    assert_eq!(editor.bytes(), &[1, 0, 4]);
}

#[test]
fn submit_after_undoing_both_commands() {
    let (mut editor, rows) = open(EditorSettings::default());
    editor.set_value(rows[0], Value::Int(1)).expect("set a");
    editor.set_value(rows[1], Value::Int(2)).expect("set b");
    assert!(editor.undo().expect("undo"));
    assert!(editor.undo().expect("undo"));
    assert_eq!(editor.history_cursor(), None);

    // nothing is applied any more, so nothing is kept before the new edit
    editor.set_value(rows[2], Value::Int(3)).expect("set c");
    assert_eq!(editor.history_names(), vec!["set c"]);
    assert_eq!(editor.history_cursor(), Some(0));
    assert!(!editor.redo().expect("redo"));
    assert_eq!(editor.bytes(), &[0, 0, 3]);
}

#[test]
fn undo_everything_then_redo_everything() {
    let (mut editor, rows) = open(EditorSettings::default());
    editor.set_value(rows[0], Value::Int(7)).expect("set a");
    editor.set_value(rows[0], Value::Int(8)).expect("set a");

    assert!(editor.undo().expect("undo"));
    assert!(editor.undo().expect("undo"));
    assert!(!editor.undo().expect("undo"));
    assert_eq!(editor.history_cursor(), None);
    assert!(!editor.can_undo());
    assert_eq!(editor.bytes(), &[0, 0, 0]);

    assert!(editor.redo().expect("redo"));
    assert!(editor.redo().expect("redo"));
    assert_eq!(editor.bytes(), &[8, 0, 0]);

    // a new edit from an empty cursor replaces the whole list
    editor.undo().expect("undo");
    editor.undo().expect("undo");
    editor.set_value(rows[1], Value::Int(1)).expect("set b");
    assert_eq!(editor.history_names(), vec!["set b"]);
}

#[test]
fn history_bound_drops_oldest() {
    let (mut editor, rows) = open(EditorSettings::default().with_history_size(2));
    for (i, row) in rows.iter().enumerate() {
        editor.set_value(*row, Value::Int(i as i128 + 1)).expect("set");
    }
    assert_eq!(editor.history_names(), vec!["set b", "set c"]);

    assert!(editor.undo().expect("undo"));
    assert!(editor.undo().expect("undo"));
    assert!(!editor.undo().expect("undo"));
    // the dropped edit of `a` stays applied
    assert_eq!(editor.bytes(), &[1, 0, 0]);

    editor.set_history_size(1);
    assert_eq!(editor.history_names(), vec!["set c"]);
}

#[test]
fn loading_bytes_clears_history() {
    let (mut editor, rows) = open(EditorSettings::default());
    editor.set_value(rows[0], Value::Int(1)).expect("set");
    assert!(editor.can_undo());

    editor.load_bytes(vec![9, 9, 9]).expect("load");
    assert!(!editor.can_undo());
    assert!(editor.history_names().is_empty());
}

/// Appends to a log; refuses to push negative numbers.
struct Append(i32);

impl Command<Vec<i32>> for Append {
    fn name(&self) -> &str {
        "append"
    }

    fn execute(&mut self, target: &mut Vec<i32>) -> Result<(), EditorError> {
        if self.0 < 0 {
            return Err(EditorError::CommandFailed {
                name: self.name().into(),
                message: "negative".into(),
            });
        }
        target.push(self.0);
        Ok(())
    }

    fn undo(&mut self, target: &mut Vec<i32>) -> Result<(), EditorError> {
        target.pop();
        Ok(())
    }
}

struct Irreversible;

impl Command<Vec<i32>> for Irreversible {
    fn name(&self) -> &str {
        "irreversible"
    }

    fn can_undo(&self) -> bool {
        false
    }

    fn execute(&mut self, target: &mut Vec<i32>) -> Result<(), EditorError> {
        target.clear();
        Ok(())
    }

    fn undo(&mut self, _target: &mut Vec<i32>) -> Result<(), EditorError> {
        unreachable!()
    }
}

#[test]
fn failed_commands_are_not_recorded() {
    let mut log = Vec::new();
    let mut history = CommandHistory::new(10);
    history.submit(Box::new(Append(1)), &mut log).expect("append");
    assert!(history.submit(Box::new(Append(-1)), &mut log).is_err());
    assert_eq!(history.len(), 1);
    assert_eq!(history.cursor(), Some(0));
    assert_eq!(log, vec![1]);
}

#[test]
fn irreversible_command_blocks_undo() {
    let mut log = Vec::new();
    let mut history = CommandHistory::new(10);
    history.submit(Box::new(Append(1)), &mut log).expect("append");
    history.submit(Box::new(Irreversible), &mut log).expect("clear");
    assert!(!history.can_undo());
    assert!(!history.undo(&mut log).expect("undo"));
    assert_eq!(history.cursor(), Some(1));
    assert!(log.is_empty());
}
