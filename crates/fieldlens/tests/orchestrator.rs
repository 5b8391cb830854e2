use std::time::Duration;

use fieldlens::grammar::*;
use fieldlens::orchestrator::run_parse;
use fieldlens::{
    ConvertEvent, ConvertMode, Editor, EditorError, EditorSettings, GrammarError, Orchestrator,
    Path, Preprocessor, Stage,
};

const TIMEOUT: Duration = Duration::from_secs(10);

fn len_payload() -> ConstructRef {
    let g = structure(vec![
        field("len", int8ub()),
        field("payload", bytes(Expr::this("len"))),
    ]);
    Preprocessor::new().instrument(&g, false).expect("instrument")
}

fn path(s: &str) -> Path {
    s.parse().expect("path")
}

fn payload(orch: &Orchestrator) -> Option<&Value> {
    orch.value()
        .and_then(Value::as_container)
        .and_then(|c| c.get("payload"))
}

#[test]
fn foreground_build_reparses() {
    let mut orch = Orchestrator::new(ConvertMode::Foreground);
    orch.set_grammar(len_payload());
    orch.load(vec![0x01, 0xaa]).expect("load");
    assert_eq!(orch.poll(), vec![ConvertEvent::Parsed]);

    let old = orch
        .replace_value(&path("payload"), Value::Bytes(vec![0xbb]))
        .expect("replace");
    assert_eq!(old, Value::Bytes(vec![0xaa]));
    orch.rebuild().expect("rebuild");
    assert_eq!(orch.poll(), vec![ConvertEvent::Built, ConvertEvent::Parsed]);
    assert_eq!(orch.bytes(), &[0x01, 0xbb]);
    assert_eq!(orch.metadata().len(), orch.document().metadata.len());
    assert!(orch.metadata().get(&path("payload")).is_some());
}

#[test]
fn foreground_build_failure_keeps_bytes() {
    let mut orch = Orchestrator::new(ConvertMode::Foreground);
    orch.set_grammar(len_payload());
    orch.load(vec![0x01, 0xaa]).expect("load");
    orch.poll();

    orch.replace_value(&path("len"), Value::Int(3)).expect("replace");
    let err = orch.rebuild().unwrap_err();
    assert!(matches!(err, EditorError::BuildFailure(GrammarError::Range(_))), "{:?}", err);
    assert_eq!(orch.bytes(), &[0x01, 0xaa]);
    assert_eq!(orch.error().map(|e| e.stage), Some(Stage::Build));
    assert!(orch.poll().is_empty());
}

#[test]
fn operations_need_grammar_and_value() {
    let mut orch = Orchestrator::default();
    assert_eq!(orch.load(vec![1]), Err(EditorError::NoGrammar));
    orch.set_grammar(len_payload());
    assert_eq!(orch.rebuild(), Err(EditorError::NoValue));
    assert_eq!(
        orch.replace_value(&path("len"), Value::Int(1)),
        Err(EditorError::NoValue)
    );
}

#[test]
fn background_parse_is_applied_on_poll() {
    let mut orch = Orchestrator::new(ConvertMode::Background);
    orch.set_grammar(len_payload());
    orch.load(vec![0x02, 0xaa, 0xbb]).expect("spawn");
    assert!(orch.is_converting());
    // nothing is applied until the foreground asks for it
    assert!(orch.value().is_none());

    assert_eq!(orch.wait(TIMEOUT), vec![ConvertEvent::Parsed]);
    assert!(!orch.is_converting());
    assert_eq!(payload(&orch), Some(&Value::Bytes(vec![0xaa, 0xbb])));
}

#[test]
fn background_build_then_reparse() {
    let mut orch = Orchestrator::new(ConvertMode::Background);
    orch.set_grammar(len_payload());
    orch.load(vec![0x01, 0xaa]).expect("spawn");
    orch.wait(TIMEOUT);

    orch.replace_value(&path("payload"), Value::Bytes(vec![0xcc]))
        .expect("replace");
    orch.rebuild().expect("spawn");
    assert_eq!(
        orch.wait(TIMEOUT),
        vec![ConvertEvent::Built, ConvertEvent::Parsed]
    );
    assert_eq!(orch.bytes(), &[0x01, 0xcc]);
}

#[test]
fn background_build_failure_reverts_value() {
    let mut orch = Orchestrator::new(ConvertMode::Background);
    orch.set_grammar(len_payload());
    orch.load(vec![0x01, 0xaa]).expect("spawn");
    orch.wait(TIMEOUT);

    orch.replace_value(&path("len"), Value::Int(4)).expect("replace");
    orch.rebuild().expect("spawn");
    let events = orch.wait(TIMEOUT);
    assert_eq!(events.len(), 1);
    match &events[0] {
        ConvertEvent::BuildFailed(e) => {
            assert_eq!(e.stage, Stage::Build);
            assert_eq!(e.kind(), "RangeError");
        }
        other => panic!("expected BuildFailed, got {:?}", other),
    }
    assert_eq!(orch.bytes(), &[0x01, 0xaa]);
    assert_eq!(
        orch.value().and_then(Value::as_container).and_then(|c| c.get("len")),
        Some(&Value::Int(1))
    );
}

#[test]
fn superseded_worker_result_is_discarded() {
    let mut orch = Orchestrator::new(ConvertMode::Background);
    orch.set_grammar(len_payload());
    orch.load(vec![0x01, 0x11]).expect("spawn");
    orch.load(vec![0x01, 0x22]).expect("spawn");

    assert_eq!(orch.wait(TIMEOUT), vec![ConvertEvent::Parsed]);
    assert_eq!(payload(&orch), Some(&Value::Bytes(vec![0x22])));
}

#[test]
fn cancel_discards_in_flight_work() {
    let mut orch = Orchestrator::new(ConvertMode::Background);
    orch.set_grammar(len_payload());
    orch.load(vec![0x01, 0x11]).expect("spawn");
    orch.cancel();
    assert!(!orch.is_converting());
    assert_eq!(orch.poll(), vec![ConvertEvent::Cancelled]);

    // a late result of the cancelled worker never lands
    std::thread::sleep(Duration::from_millis(50));
    assert!(orch.poll().is_empty());
    assert!(orch.value().is_none());
}

#[test]
fn editor_drops_rejected_background_edit() {
    let settings = EditorSettings::default().with_convert_mode(ConvertMode::Background);
    let mut editor = Editor::new(settings);
    let g = structure(vec![
        field("len", int8ub()),
        field("payload", bytes(Expr::this("len"))),
    ]);
    editor.set_grammar(&g).expect("grammar");
    editor.load_bytes(vec![0x02, 0xaa, 0xbb]).expect("spawn");
    editor.wait(TIMEOUT);
    assert!(editor.value().is_some());

    let root = editor.children_of(None)[0];
    let rows = editor.children_of(Some(root));

    // accepted: recorded once the worker reports back
    editor.set_value_str(rows[1], "01 02").expect("spawn");
    editor.wait(TIMEOUT);
    assert_eq!(editor.bytes(), &[0x02, 0x01, 0x02]);
    assert_eq!(editor.history_names(), vec!["set payload"]);

    // rejected: the build fails on the worker, the command is dropped
    editor.set_value_str(rows[0], "5").expect("spawn");
    editor.wait(TIMEOUT);
    assert!(!editor.is_converting());
    assert_eq!(editor.bytes(), &[0x02, 0x01, 0x02]);
    assert_eq!(editor.history_names(), vec!["set payload"]);
    assert_eq!(editor.obj(rows[0]), Some(&Value::Int(2)));
    assert_eq!(editor.error_state().map(|e| e.stage), Some(Stage::Build));

    editor.set_convert_mode(ConvertMode::Foreground);
    assert!(editor.undo().expect("undo"));
    assert_eq!(editor.bytes(), &[0x02, 0xaa, 0xbb]);
}

#[test]
fn rejected_background_edit_rolls_back_every_pending_edit() {
    let settings = EditorSettings::default().with_convert_mode(ConvertMode::Background);
    let mut editor = Editor::new(settings);
    let g = structure(vec![
        field("len", int8ub()),
        field("payload", bytes(Expr::this("len"))),
    ]);
    editor.set_grammar(&g).expect("grammar");
    editor.load_bytes(vec![0x02, 0xaa, 0xbb]).expect("spawn");
    editor.wait(TIMEOUT);

    let root = editor.children_of(None)[0];
    let rows = editor.children_of(Some(root));

    // the second edit may supersede the first before it lands
    editor.set_value_str(rows[1], "01 02").expect("spawn");
    editor.set_value_str(rows[0], "5").expect("spawn");
    editor.wait(TIMEOUT);
    assert!(!editor.is_converting());
    assert_eq!(editor.error_state().map(|e| e.stage), Some(Stage::Build));

    // history and value agree on which edits took effect
    if editor.history_names().is_empty() {
        assert_eq!(editor.bytes(), &[0x02, 0xaa, 0xbb]);
        assert_eq!(editor.obj(rows[1]), Some(&Value::Bytes(vec![0xaa, 0xbb])));
        assert!(!editor.can_undo());
    } else {
        assert_eq!(editor.history_names(), vec!["set payload"]);
        assert_eq!(editor.bytes(), &[0x02, 0x01, 0x02]);
        assert_eq!(editor.obj(rows[1]), Some(&Value::Bytes(vec![0x01, 0x02])));
    }
    assert_eq!(editor.obj(rows[0]), Some(&Value::Int(2)));

    editor.set_convert_mode(ConvertMode::Foreground);
    while editor.undo().expect("undo") {}
    assert_eq!(editor.bytes(), &[0x02, 0xaa, 0xbb]);
}

#[test]
fn cancelled_token_stops_parse() {
    let token = CancelToken::new();
    token.cancel();
    let result = run_parse(&len_payload(), vec![0x01, 0xaa].into(), token);
    assert!(matches!(result, Err(GrammarError::Cancelled)), "{:?}", result.err());
}
