//! End-to-end conversations driven through the session manager.

use roomservice_core::nlu::{LexicalNlu, ReplyInterpretation, ScriptedNlu};
use roomservice_core::{
    Catalog, DialogState, EngineSettings, Intent, Ledger, LineItem, NluError, NluProvider,
    OrderDraft, OrderEngine, QueryKind, SessionError, SessionManager, TurnInput, TurnOutcome,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

const MENU: &str = r#"{
    "categories": {
        "Main": {
            "Club Sandwich": {
                "price": 18.50,
                "description": "Triple-decker with turkey, bacon, lettuce and tomato",
                "modifications_allowed": true,
                "available_modifications": ["No Bacon", "Extra Bacon", "Gluten-Free Bread"],
                "allergens": ["gluten"],
                "preparation_time": 15
            },
            "Caesar Salad": {
                "price": 14.00,
                "description": "Romaine, parmesan, croutons and Caesar dressing",
                "modifications_allowed": true,
                "available_modifications": ["Add Chicken", "Add Shrimp", "No Croutons", "Dressing On Side"],
                "allergens": ["dairy", "gluten", "egg"],
                "preparation_time": 10
            }
        },
        "Beverage": {
            "Latte": {
                "price": 5.50,
                "description": "Espresso with steamed milk",
                "modifications_allowed": true,
                "available_modifications": ["Oat Milk", "Extra Shot"],
                "allergens": ["dairy"],
                "preparation_time": 5
            }
        }
    }
}"#;

fn catalog() -> Arc<Catalog> {
    Arc::new(Catalog::from_json_str(MENU).unwrap())
}

fn settings() -> EngineSettings {
    EngineSettings {
        nlu_timeout: Duration::from_millis(50),
        ..EngineSettings::default()
    }
}

fn manager_with(nlu: Arc<dyn NluProvider>, ledger: Ledger) -> SessionManager {
    let engine = OrderEngine::new(catalog(), Arc::new(ledger), nlu, settings());
    SessionManager::new(engine, Duration::from_secs(300))
}

fn scripted(nlu: ScriptedNlu, ledger: Ledger) -> (SessionManager, Arc<ScriptedNlu>) {
    let nlu = Arc::new(nlu);
    let manager = manager_with(nlu.clone(), ledger);
    (manager, nlu)
}

fn order(room: u32, lines: Vec<LineItem>) -> OrderDraft {
    lines
        .into_iter()
        .fold(OrderDraft::new().with_room(room), |draft, line| draft.with_item(line))
}

#[tokio::test]
async fn test_exact_match_confirms_without_questions() {
    let text = "one club sandwich";
    let (manager, nlu) = scripted(
        ScriptedNlu::new().with_draft(text, order(412, vec![LineItem::new("club sandwich", 1)])),
        Ledger::from_levels([("Club Sandwich", 10)]),
    );
    let id = manager.open_session();

    let outcome = manager.handle_turn(&id, TurnInput::new(text)).await.unwrap();
    let TurnOutcome::Confirmed { order, summary } = outcome else {
        panic!("expected a confirmed order, got {:?}", outcome);
    };
    assert_eq!(order.items.len(), 1);
    assert_eq!(order.items[0].name, "Club Sandwich");
    assert_eq!(order.items[0].quantity, 1);
    assert_eq!(order.estimated_time_minutes, 20);
    assert!(summary.contains("Total: $18.50"));
    assert!(nlu.calls_for("semantic_search").is_empty());
    assert_eq!(manager.engine().ledger().remaining("Club Sandwich"), Some(9));
    assert_eq!(
        manager.session_state(&id).await.unwrap(),
        DialogState::OrderCompleted
    );
}

#[tokio::test]
async fn test_exact_match_produces_no_suggestions() {
    let (manager, _) = scripted(ScriptedNlu::new(), Ledger::default());
    let engine = manager.engine();
    let hint = Default::default();
    let result = engine
        .validator()
        .validate(
            &order(412, vec![LineItem::new("club sandwich", 1)]),
            engine.handle(&hint),
        )
        .await
        .unwrap();
    assert!(result.is_valid());
    assert!(result.suggestions.is_empty());
    assert_eq!(result.draft.items[0].name, "Club Sandwich");
}

#[tokio::test]
async fn test_fuzzy_item_with_unknown_modification_asks_for_replacement() {
    let text = "2 ceaser salad with avocado";
    let (manager, _) = scripted(
        ScriptedNlu::new()
            .with_draft(
                text,
                order(
                    305,
                    vec![LineItem::new("ceaser salad", 2).with_modifications(["avocado"])],
                ),
            )
            .with_semantic("avocado", &[("Add Chicken", 0.78), ("Add Shrimp", 0.74), ("No Bacon", 0.9)])
            .with_reply("1", ReplyInterpretation::select("Add Chicken", 0.95)),
        Ledger::default(),
    );
    let id = manager.open_session();

    let outcome = manager.handle_turn(&id, TurnInput::new(text)).await.unwrap();
    let TurnOutcome::NeedsInput { query, draft, prompts, .. } = outcome else {
        panic!("expected a question, got {:?}", outcome);
    };
    assert_eq!(query.kind(), QueryKind::ModificationReplacement);
    assert_eq!(query.subject(), "avocado");
    let labels: Vec<_> = query.options().into_iter().map(|o| o.label).collect();
    assert_eq!(labels, vec!["Add Chicken", "Add Shrimp"]);
    assert_eq!(draft.items[0].name, "Caesar Salad");
    assert!(prompts[0].contains("1. Add Chicken"));
    assert_eq!(
        manager.session_state(&id).await.unwrap(),
        DialogState::ModificationSelection
    );
    assert_eq!(manager.active_query(&id).await.unwrap(), Some(query));

    let outcome = manager.handle_turn(&id, TurnInput::new("1")).await.unwrap();
    let TurnOutcome::Confirmed { order, .. } = outcome else {
        panic!("expected a confirmed order, got {:?}", outcome);
    };
    assert_eq!(order.items[0].name, "Caesar Salad");
    assert_eq!(order.items[0].quantity, 2);
    assert_eq!(order.items[0].modifications, vec!["Add Chicken"]);
}

#[tokio::test]
async fn test_short_stock_offers_remaining_quantity() {
    let catalog = catalog();
    let lexical: Arc<dyn NluProvider> = Arc::new(LexicalNlu::new().with_catalog(&catalog));
    let manager = manager_with(lexical, Ledger::from_levels([("Latte", 2)]));
    let id = manager.open_session();

    let outcome = manager
        .handle_turn(&id, TurnInput::new("5 lattes to room 412"))
        .await
        .unwrap();
    let TurnOutcome::NeedsInput { query, issues, .. } = outcome else {
        panic!("expected a question, got {:?}", outcome);
    };
    assert_eq!(query.kind(), QueryKind::QuantityAdjustment);
    let labels: Vec<_> = query.options().into_iter().map(|o| o.label).collect();
    assert_eq!(labels, vec!["2"]);
    assert_eq!(issues, vec!["Insufficient inventory for Latte. Only 2 available."]);

    let outcome = manager.handle_turn(&id, TurnInput::new("2")).await.unwrap();
    let TurnOutcome::Confirmed { order, .. } = outcome else {
        panic!("expected a confirmed order, got {:?}", outcome);
    };
    assert_eq!(order.items[0].quantity, 2);
    assert_eq!(order.room_number, 412);
    assert_eq!(manager.engine().ledger().remaining("Latte"), Some(0));
}

#[tokio::test]
async fn test_quantity_equal_to_remainder_succeeds() {
    let (manager, _) = scripted(
        ScriptedNlu::new().with_draft("three lattes", order(101, vec![LineItem::new("Latte", 3)])),
        Ledger::from_levels([("Latte", 3)]),
    );
    let id = manager.open_session();
    let outcome = manager
        .handle_turn(&id, TurnInput::new("three lattes"))
        .await
        .unwrap();
    assert!(outcome.is_confirmed(), "{:?}", outcome);
    assert_eq!(manager.engine().ledger().remaining("Latte"), Some(0));
}

#[tokio::test]
async fn test_room_out_of_range_rejected_before_resolution() {
    let text = "a pizza";
    let (manager, nlu) = scripted(
        ScriptedNlu::new()
            .with_draft(text, order(1200, vec![LineItem::new("pizza", 1)]))
            .with_semantic("pizza", &[("Club Sandwich", 0.9)]),
        Ledger::default(),
    );
    let id = manager.open_session();

    let outcome = manager.handle_turn(&id, TurnInput::new(text)).await.unwrap();
    let TurnOutcome::Rejected { reason, .. } = outcome else {
        panic!("expected a rejection, got {:?}", outcome);
    };
    assert!(reason.contains("1200"));
    assert!(nlu.calls_for("semantic_search").is_empty());

    let outcome = manager
        .handle_turn(&id, TurnInput::new(text).with_room(99))
        .await
        .unwrap();
    assert!(matches!(outcome, TurnOutcome::Rejected { .. }));
}

#[tokio::test]
async fn test_reset_from_error_is_idempotent() {
    let (manager, _) = scripted(
        ScriptedNlu::new().with_intent("cancel my order", Intent::UnsupportedAction, 0.9),
        Ledger::default(),
    );
    let id = manager.open_session();

    let outcome = manager
        .handle_turn(&id, TurnInput::new("cancel my order"))
        .await
        .unwrap();
    assert!(matches!(outcome, TurnOutcome::Rejected { retryable: false, .. }));
    assert_eq!(manager.session_state(&id).await.unwrap(), DialogState::Error);

    assert!(manager.reset_session(&id).await.unwrap());
    assert!(!manager.reset_session(&id).await.unwrap());
    assert_eq!(manager.session_state(&id).await.unwrap(), DialogState::Initial);
    assert!(manager.active_query(&id).await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_provider_timeout_rolls_back_turn() {
    let (manager, _) = scripted(
        ScriptedNlu::new()
            .with_draft("pizza", order(412, vec![LineItem::new("pizza", 1)]))
            .with_semantic("pizza", &[("Club Sandwich", 0.8)])
            .with_slow("the sandwich", Duration::from_secs(5)),
        Ledger::default(),
    );
    let id = manager.open_session();

    manager.handle_turn(&id, TurnInput::new("pizza")).await.unwrap();
    let query = manager.active_query(&id).await.unwrap();
    assert!(query.is_some());

    let outcome = manager
        .handle_turn(&id, TurnInput::new("the sandwich"))
        .await
        .unwrap();
    assert!(matches!(outcome, TurnOutcome::Rejected { retryable: true, .. }));
    assert_eq!(
        manager.session_state(&id).await.unwrap(),
        DialogState::ItemSelection
    );
    assert_eq!(manager.active_query(&id).await.unwrap(), query);
}

#[tokio::test]
async fn test_retryable_extraction_error_keeps_session_usable() {
    let (manager, _) = scripted(
        ScriptedNlu::new().with_failure("latte please", NluError::Http("503".into())),
        Ledger::default(),
    );
    let id = manager.open_session();
    let outcome = manager
        .handle_turn(&id, TurnInput::new("latte please"))
        .await
        .unwrap();
    assert!(matches!(outcome, TurnOutcome::Rejected { retryable: true, .. }));
    assert_eq!(manager.session_state(&id).await.unwrap(), DialogState::Initial);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_sessions_never_oversell() {
    let text = "club sandwich";
    let (manager, _) = scripted(
        ScriptedNlu::new().with_draft(text, order(220, vec![LineItem::new("Club Sandwich", 1)])),
        Ledger::from_levels([("Club Sandwich", 3)]),
    );
    let manager = Arc::new(manager);

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let manager = manager.clone();
        tasks.push(tokio::spawn(async move {
            let id = manager.open_session();
            manager.handle_turn(&id, TurnInput::new(text)).await
        }));
    }

    let mut confirmed = 0;
    for task in tasks {
        if task.await.unwrap().unwrap().is_confirmed() {
            confirmed += 1;
        }
    }
    assert_eq!(confirmed, 3);
    assert_eq!(manager.engine().ledger().remaining("Club Sandwich"), Some(0));
}

#[tokio::test]
async fn test_idle_session_with_pending_query_is_evicted() {
    let (manager, _) = scripted(
        ScriptedNlu::new().with_draft("pizza", order(412, vec![LineItem::new("pizza", 1)])),
        Ledger::default(),
    );
    let id = manager.open_session();
    let fresh = manager.open_session();
    manager.handle_turn(&id, TurnInput::new("pizza")).await.unwrap();
    assert!(manager.active_query(&id).await.unwrap().is_some());

    let evicted = manager.evict_idle_at(Instant::now() + Duration::from_secs(301));
    assert_eq!(evicted.len(), 2);
    assert!(evicted.contains(&id) && evicted.contains(&fresh));
    assert_eq!(
        manager.handle_turn(&id, TurnInput::new("remove")).await,
        Err(SessionError::UnknownSession(id.clone()))
    );
}

#[tokio::test]
async fn test_menu_question_is_answered_between_orders() {
    let question = "what comes on the caesar salad?";
    let (manager, _) = scripted(
        ScriptedNlu::new()
            .with_intent(question, Intent::GeneralInquiry, 0.92)
            .with_semantic(question, &[("Caesar Salad", 0.93), ("Club Sandwich", 0.4)]),
        Ledger::default(),
    );
    let id = manager.open_session();

    let outcome = manager.handle_turn(&id, TurnInput::new(question)).await.unwrap();
    let TurnOutcome::Answered { answer } = outcome else {
        panic!("expected an answer, got {:?}", outcome);
    };
    assert_eq!(answer.matched, vec!["Caesar Salad"]);
    assert!(answer.text.contains("Romaine, parmesan"));
    assert_eq!(manager.session_state(&id).await.unwrap(), DialogState::Initial);
}
