use std::{sync::Arc, time::Duration};

use tablemate::{
    remote::{MemoryTableService, RemoteError, RemoteTableService, memory::Op},
    table::{
        FetchTask, IdentifierAllocator, Mutation, MutationOrigin, Phase, Row, SortSpec,
        TableController, TableError, TableManager, TableSchema,
    },
};

fn brands(count: i64) -> Arc<MemoryTableService> {
    let countries = ["France", "Italy", "Japan", "Germany"];
    Arc::new(
        MemoryTableService::new("brands", SortSpec::asc("name")).with_rows((1..=count).map(
            |id| {
                Row::new(id)
                    .with("name", format!("Brand {id:02}"))
                    .with("country", countries[(id as usize) % countries.len()])
            },
        )),
    )
}

fn controller(service: &Arc<MemoryTableService>) -> TableController {
    let service: Arc<dyn RemoteTableService> = service.clone();
    TableController::new(service.clone(), IdentifierAllocator::new(service), 10)
}

fn manager(service: &Arc<MemoryTableService>) -> TableManager {
    TableManager::new(
        TableSchema::brands(),
        service.clone(),
        Duration::from_secs(30),
    )
}

async fn drive(controller: &mut TableController, task: FetchTask) -> Vec<usize> {
    let mut fetched = Vec::new();
    let mut next = Some(task);
    while let Some(task) = next {
        fetched.push(task.query().page_index);
        next = controller.apply_fetch(task.run().await);
    }
    fetched
}

fn ids(rows: &[Row]) -> Vec<i64> {
    rows.iter().map(|row| row.id).collect()
}

#[tokio::test]
async fn page_index_stays_in_bounds_as_the_table_shrinks() {
    let service = brands(35);
    let mut controller = controller(&service);
    let task = controller.load();
    drive(&mut controller, task).await;
    let task = controller.go_to_page(3).unwrap();
    drive(&mut controller, task).await;
    assert_eq!(controller.page_state().page_index(), 3);

    for id in (1..=35).rev() {
        let task = controller
            .mutate(Mutation::Delete { id }, MutationOrigin::Inline)
            .unwrap();
        let outcome = task.run().await;
        let refetch = controller.apply_mutation(&outcome).unwrap();
        drive(&mut controller, refetch).await;

        let state = controller.page_state();
        let pages = state.total_count().div_ceil(state.page_size()).max(1);
        assert!(state.page_index() < pages);
        assert_eq!(controller.phase(), &Phase::Loaded);
    }
    assert_eq!(controller.page_state().page_index(), 0);
    assert!(controller.rows().is_empty());
}

#[tokio::test]
async fn deleting_the_only_row_on_the_last_page_clamps_to_previous_page() {
    let service = brands(11);
    let mut controller = controller(&service);
    let task = controller.load();
    drive(&mut controller, task).await;
    let task = controller.go_to_page(1).unwrap();
    drive(&mut controller, task).await;
    assert_eq!(controller.rows().len(), 1);
    let trailing = controller.rows()[0].id;

    let task = controller
        .mutate(Mutation::Delete { id: trailing }, MutationOrigin::Inline)
        .unwrap();
    assert_eq!(
        controller.phase(),
        &Phase::Mutating(tablemate::table::PendingOp::Delete(trailing))
    );
    let outcome = task.run().await;
    let refetch = controller.apply_mutation(&outcome).unwrap();
    assert_eq!(refetch.query().page_index, 1, "re-fetches the same page first");

    let fetched = drive(&mut controller, refetch).await;
    assert_eq!(fetched, vec![1, 0]);
    assert_eq!(controller.page_state().total_count(), 10);
    assert_eq!(controller.page_state().page_index(), 0);
    assert_eq!(controller.rows().len(), 10);
    assert_eq!(controller.snapshot().unwrap().query.page_index, 0);
}

#[tokio::test]
async fn late_response_for_previous_page_is_dropped() {
    let service = brands(25);
    let mut controller = controller(&service);
    let task = controller.load();
    drive(&mut controller, task).await;
    let task = controller.go_to_page(2).unwrap();
    drive(&mut controller, task).await;

    let to_first = controller.go_to_page(0).unwrap();
    let to_second = controller.go_to_page(1).unwrap();

    let second = to_second.run().await;
    assert!(controller.apply_fetch(second).is_none());
    let page_one = controller.rows().to_vec();
    assert_eq!(controller.snapshot().unwrap().query.page_index, 1);

    let first = to_first.run().await;
    assert!(controller.apply_fetch(first).is_none());
    assert_eq!(controller.rows(), page_one.as_slice());
    assert_eq!(controller.page_state().page_index(), 1);
    assert_eq!(controller.phase(), &Phase::Loaded);
}

#[tokio::test]
async fn early_response_for_superseded_page_is_dropped() {
    let service = brands(25);
    let mut controller = controller(&service);
    let task = controller.load();
    drive(&mut controller, task).await;
    let page_zero = controller.rows().to_vec();

    let to_second = controller.go_to_page(1).unwrap();
    let to_third = controller.go_to_page(2).unwrap();

    let stale = to_second.run().await;
    controller.apply_fetch(stale);
    assert_eq!(controller.phase(), &Phase::Loading);
    assert_eq!(controller.rows(), page_zero.as_slice());

    let current = to_third.run().await;
    controller.apply_fetch(current);
    assert_eq!(controller.rows().len(), 5);
    assert_eq!(controller.snapshot().unwrap().query.page_index, 2);
}

#[tokio::test]
async fn insert_collision_is_retried_once_with_a_new_identifier() {
    let service = brands(5);
    let mut controller = controller(&service);
    let task = controller.load();
    drive(&mut controller, task).await;

    let hint = controller.allocator().propose().await.unwrap();
    assert_eq!(hint.value, 6);

    service.race_next_inserts(1);
    let mut fields = tablemate::table::Fields::new();
    fields.insert("name".to_string(), "Delage".into());
    fields.insert("country".to_string(), "France".into());
    let task = controller
        .mutate(
            Mutation::Insert {
                hint: Some(hint),
                fields,
            },
            MutationOrigin::Inline,
        )
        .unwrap();
    let outcome = task.run().await;
    let row = outcome.result.clone().unwrap().unwrap();
    assert_eq!(row.id, 7);
    assert_eq!(service.calls(Op::Insert), 2);
    assert_eq!(service.row(7).unwrap().display("name"), "Delage");
    assert!(controller.apply_mutation(&outcome).is_some());
}

#[tokio::test]
async fn second_insert_collision_is_surfaced_without_third_attempt() {
    let service = brands(5);
    let mut manager = manager(&service);
    manager.start();
    manager.settle().await;

    manager.on_create_requested();
    manager.settle().await;
    assert_eq!(manager.dialog().session().unwrap().target_id(), Some(6));

    service.race_next_inserts(2);
    manager.on_draft_field_change("name", "Delage");
    manager.on_draft_field_change("country", "France");
    manager.on_submit();
    manager.settle().await;

    assert_eq!(service.calls(Op::Insert), 2);
    let session = manager.dialog().session().expect("dialog stays open");
    assert!(!session.is_submitting());
    assert!(matches!(session.error(), Some(TableError::Conflict(_))));
    assert_eq!(manager.controller().phase(), &Phase::Loaded);
}

#[tokio::test]
async fn failed_update_keeps_rows_and_reopens_the_form() {
    let service = brands(3);
    let mut manager = manager(&service);
    manager.start();
    manager.settle().await;
    let before = manager.controller().rows().to_vec();
    assert_eq!(before.len(), 3);

    let row = before[1].clone();
    manager.on_edit_requested(&row);
    manager.on_draft_field_change("country", "Belgium");
    service.fail_next(Op::Update, RemoteError::Transport("gateway timeout".to_string()));
    manager.on_submit();
    manager.settle().await;

    assert_eq!(manager.controller().rows(), before.as_slice());
    assert_eq!(manager.controller().phase(), &Phase::Loaded);
    let session = manager.dialog().session().unwrap();
    assert!(!session.is_submitting());
    assert!(matches!(session.error(), Some(TableError::Transport(_))));
    assert_eq!(session.draft().get("country"), "Belgium");
}

#[tokio::test]
async fn changing_sort_returns_to_first_page() {
    let service = brands(30);
    let mut controller = controller(&service);
    let task = controller.set_sort(Some(SortSpec::asc("name")));
    drive(&mut controller, task).await;
    let task = controller.go_to_page(2).unwrap();
    drive(&mut controller, task).await;

    let task = controller.set_sort(Some(SortSpec::desc("country")));
    assert_eq!(controller.page_state().page_index(), 0);
    assert_eq!(task.query().page_index, 0);
    assert_eq!(task.query().sort, Some(SortSpec::desc("country")));
    drive(&mut controller, task).await;

    let countries: Vec<String> = controller
        .rows()
        .iter()
        .map(|row| row.display("country"))
        .collect();
    let mut sorted = countries.clone();
    sorted.sort_by(|a, b| b.cmp(a));
    assert_eq!(countries, sorted);
}

#[tokio::test]
async fn closing_a_dirty_dialog_and_reopening_shows_persisted_values() {
    let service = brands(3);
    let mut manager = manager(&service);
    manager.start();
    manager.settle().await;

    let row = manager.controller().rows()[0].clone();
    manager.on_edit_requested(&row);
    manager.on_draft_field_change("name", "Scratch");
    assert!(manager.on_dialog_close());
    assert!(!manager.dialog().is_open());

    manager.on_edit_requested(&row);
    let draft = manager.dialog().session().unwrap().draft();
    assert_eq!(draft.get("name"), row.display("name"));
    assert_eq!(service.calls(Op::Update), 0);
}

#[tokio::test]
async fn successful_edit_refreshes_from_backend() {
    let service = brands(3);
    let mut manager = manager(&service);
    manager.start();
    manager.settle().await;

    let row = manager.controller().rows()[0].clone();
    manager.on_edit_requested(&row);
    manager.on_draft_field_change("name", "Zeta");
    manager.on_submit();
    manager.settle().await;

    assert!(!manager.dialog().is_open());
    assert_eq!(service.calls(Op::FetchPage), 2);
    let last = manager.controller().rows().last().unwrap();
    assert_eq!((last.id, last.display("name")), (row.id, "Zeta".to_string()));
    assert_eq!(ids(manager.controller().rows()).len(), 3);
}
