mod common;

use common::{
    envelope, fixture_aliases, fixture_entities, fixture_registry, ids_of, insert_comment,
    insert_post, insert_user, open_fixture_db,
};
use crudgate_core::{
    Dispatcher, EntityRegistry, EntitySchema, EntityStore, FindQuery, HandlerOptions, ListOptions,
    OperationEnvelope, OperationKind, PredicateTree, Record, RecordId, RepoResult,
    RequestContext, SqliteStorage, Storage,
};
use serde_json::json;
use std::cell::RefCell;

/// Storage double that records every query and answers with empty results.
#[derive(Default)]
struct RecordingStorage {
    finds: RefCell<Vec<(String, FindQuery)>>,
    calls: RefCell<usize>,
}

struct RecordingStore<'s> {
    storage: &'s RecordingStorage,
    entity: String,
}

impl Storage for RecordingStorage {
    fn entity<'s>(
        &'s self,
        entity: &'s EntitySchema,
        _registry: &'s EntityRegistry,
    ) -> Box<dyn EntityStore + 's> {
        Box::new(RecordingStore {
            storage: self,
            entity: entity.name.clone(),
        })
    }
}

impl EntityStore for RecordingStore<'_> {
    fn find(&self, query: &FindQuery) -> RepoResult<Vec<Record>> {
        *self.storage.calls.borrow_mut() += 1;
        self.storage
            .finds
            .borrow_mut()
            .push((self.entity.clone(), query.clone()));
        Ok(Vec::new())
    }

    fn find_unique(&self, _id: &RecordId) -> RepoResult<Option<Record>> {
        *self.storage.calls.borrow_mut() += 1;
        Ok(None)
    }

    fn count(&self, _filter: &PredicateTree) -> RepoResult<u64> {
        *self.storage.calls.borrow_mut() += 1;
        Ok(0)
    }

    fn create(&self, data: &Record) -> RepoResult<Record> {
        *self.storage.calls.borrow_mut() += 1;
        Ok(data.clone())
    }

    fn update(&self, _id: &RecordId, data: &Record) -> RepoResult<Record> {
        *self.storage.calls.borrow_mut() += 1;
        Ok(data.clone())
    }

    fn delete(&self, _id: &RecordId) -> RepoResult<Record> {
        *self.storage.calls.borrow_mut() += 1;
        Ok(Record::new())
    }
}

#[test]
fn get_list_translates_page_into_skip_and_take() {
    let conn = open_fixture_db();
    let registry = EntityRegistry::build(&conn, fixture_entities(), fixture_aliases()).unwrap();
    let storage = RecordingStorage::default();
    let dispatcher = Dispatcher::new(&storage, registry);

    dispatcher
        .dispatch(
            &RequestContext::anonymous(),
            envelope(
                OperationKind::GetList,
                "comments",
                json!({
                    "pagination": {"page": 2, "perPage": 10},
                    "sort": {"field": "body", "order": "DESC"},
                    "filter": {"post_id": 7, "page": 3}
                }),
            ),
        )
        .unwrap();

    let finds = storage.finds.borrow();
    assert_eq!(finds.len(), 1);
    let (entity, query) = &finds[0];
    assert_eq!(entity, "Comment");
    assert_eq!(query.skip, 10);
    assert_eq!(query.take, Some(10));
    assert_eq!(query.order_by, Some(("body".to_string(), crudgate_core::SortOrder::Desc)));
    assert_eq!(query.filter.paths().collect::<Vec<_>>(), ["post_id"]);
}

#[test]
fn per_page_is_clamped_by_options() {
    let conn = open_fixture_db();
    let registry = fixture_registry(&conn);
    let storage = RecordingStorage::default();
    let options = HandlerOptions {
        list: ListOptions {
            max_per_page: Some(50),
            ..ListOptions::default()
        },
        ..HandlerOptions::default()
    };
    let dispatcher = Dispatcher::new(&storage, registry).with_options(options);

    dispatcher
        .dispatch(
            &RequestContext::anonymous(),
            envelope(
                OperationKind::GetList,
                "comments",
                json!({"pagination": {"page": 3, "perPage": 1000}}),
            ),
        )
        .unwrap();

    let (_, query) = &storage.finds.borrow()[0];
    assert_eq!(query.take, Some(50));
    assert_eq!(query.skip, 100);
}

#[test]
fn get_list_returns_page_and_unpaginated_total() {
    let conn = open_fixture_db();
    let registry = fixture_registry(&conn);
    for index in 0..12 {
        insert_post(&conn, &format!("post {index:02}"), index, None);
    }
    let storage = SqliteStorage::new(&conn);
    let dispatcher = Dispatcher::new(&storage, registry);

    let response = dispatcher
        .dispatch(
            &RequestContext::anonymous(),
            envelope(
                OperationKind::GetList,
                "posts",
                json!({
                    "pagination": {"page": 2, "perPage": 5},
                    "sort": {"field": "views", "order": "ASC"},
                    "filter": {"title": "post"}
                }),
            ),
        )
        .unwrap();

    assert_eq!(response.total, Some(12));
    assert_eq!(ids_of(&response.data), [json!(6), json!(7), json!(8), json!(9), json!(10)]);
}

#[test]
fn infinite_list_reports_page_info_instead_of_total() {
    let conn = open_fixture_db();
    let registry = fixture_registry(&conn);
    for index in 0..3 {
        insert_post(&conn, &format!("post {index}"), index, None);
    }
    let storage = SqliteStorage::new(&conn);
    let dispatcher = Dispatcher::new(&storage, registry);

    let response = dispatcher
        .dispatch(
            &RequestContext::anonymous(),
            envelope(
                OperationKind::GetList,
                "posts",
                json!({"pagination": {"page": 1, "perPage": 2}, "infinite": true}),
            ),
        )
        .unwrap();

    assert!(response.total.is_none());
    let page_info = response.page_info.unwrap();
    assert!(page_info.has_next_page);
    assert!(!page_info.has_previous_page);
}

#[test]
fn zero_page_is_a_validation_failure() {
    let conn = open_fixture_db();
    let registry = fixture_registry(&conn);
    let storage = RecordingStorage::default();
    let dispatcher = Dispatcher::new(&storage, registry);

    let err = dispatcher
        .dispatch(
            &RequestContext::anonymous(),
            envelope(
                OperationKind::GetList,
                "posts",
                json!({"pagination": {"page": 0, "perPage": 10}}),
            ),
        )
        .unwrap_err();

    assert_eq!(err.status, Some(400));
    assert_eq!(*storage.calls.borrow(), 0);
}

#[test]
fn get_one_expands_declared_relations() {
    let conn = open_fixture_db();
    let registry = fixture_registry(&conn);
    insert_user(&conn, "u-1", "Ann");
    let id = insert_post(&conn, "hello", 1, Some("u-1"));
    let storage = SqliteStorage::new(&conn);
    let dispatcher = Dispatcher::new(&storage, registry);

    let response = dispatcher
        .dispatch(
            &RequestContext::anonymous(),
            envelope(OperationKind::GetOne, "posts", json!({"id": id})),
        )
        .unwrap();

    assert_eq!(response.id, Some(RecordId::Int(id)));
    assert_eq!(response.data["title"], json!("hello"));
    assert_eq!(response.data["author"], json!({"id": "u-1", "name": "Ann"}));
}

#[test]
fn get_one_missing_id_is_not_found() {
    let conn = open_fixture_db();
    let registry = fixture_registry(&conn);
    let storage = SqliteStorage::new(&conn);
    let dispatcher = Dispatcher::new(&storage, registry);

    let err = dispatcher
        .dispatch(
            &RequestContext::anonymous(),
            envelope(OperationKind::GetOne, "posts", json!({"id": 404})),
        )
        .unwrap_err();

    assert_eq!(err.status, Some(404));
}

#[test]
fn get_many_returns_existing_ids_only() {
    let conn = open_fixture_db();
    let registry = fixture_registry(&conn);
    let first = insert_post(&conn, "a", 0, None);
    let second = insert_post(&conn, "b", 0, None);
    let storage = SqliteStorage::new(&conn);
    let dispatcher = Dispatcher::new(&storage, registry);

    let response = dispatcher
        .dispatch(
            &RequestContext::anonymous(),
            envelope(
                OperationKind::GetMany,
                "posts",
                json!({"ids": [second, 999, first]}),
            ),
        )
        .unwrap();

    assert_eq!(ids_of(&response.data), [json!(first), json!(second)]);
    assert_eq!(response.data[0]["author"], json!(null));
}

#[test]
fn get_many_with_no_ids_skips_storage() {
    let conn = open_fixture_db();
    let registry = fixture_registry(&conn);
    let storage = RecordingStorage::default();
    let dispatcher = Dispatcher::new(&storage, registry);

    let response = dispatcher
        .dispatch(
            &RequestContext::anonymous(),
            envelope(OperationKind::GetMany, "posts", json!({"ids": []})),
        )
        .unwrap();

    assert_eq!(response.data, json!([]));
    assert_eq!(*storage.calls.borrow(), 0);
}

#[test]
fn get_many_reference_constrains_target_column() {
    let conn = open_fixture_db();
    let registry = fixture_registry(&conn);
    let post = insert_post(&conn, "parent", 0, None);
    let other = insert_post(&conn, "other", 0, None);
    insert_comment(&conn, post, "first");
    insert_comment(&conn, post, "second");
    insert_comment(&conn, other, "elsewhere");
    let storage = SqliteStorage::new(&conn);
    let dispatcher = Dispatcher::new(&storage, registry);

    let response = dispatcher
        .dispatch(
            &RequestContext::anonymous(),
            envelope(
                OperationKind::GetManyReference,
                "comments",
                json!({
                    "target": "post_id",
                    "id": post,
                    "pagination": {"page": 1, "perPage": 10},
                    "filter": {"post_id": other}
                }),
            ),
        )
        .unwrap();

    assert_eq!(response.total, Some(2));
    let bodies: Vec<_> = response
        .data
        .as_array()
        .unwrap()
        .iter()
        .map(|row| row["body"].clone())
        .collect();
    assert_eq!(bodies, [json!("first"), json!("second")]);
}

#[test]
fn unknown_resource_fails_before_storage() {
    let conn = open_fixture_db();
    let registry = fixture_registry(&conn);
    let storage = RecordingStorage::default();
    let dispatcher = Dispatcher::new(&storage, registry);

    let err = dispatcher
        .dispatch(
            &RequestContext::anonymous(),
            envelope(OperationKind::GetList, "invoices", json!({})),
        )
        .unwrap_err();

    assert_eq!(err.status, Some(404));
    assert_eq!(err.message, "No model found for \"invoices\"");
    assert_eq!(*storage.calls.borrow(), 0);
}

#[test]
fn model_field_takes_precedence_over_resource() {
    let conn = open_fixture_db();
    let registry = fixture_registry(&conn);
    let storage = RecordingStorage::default();
    let dispatcher = Dispatcher::new(&storage, registry);

    let request = OperationEnvelope::new(OperationKind::GetList, "anything", json!(null))
        .with_model("Comment");
    dispatcher
        .dispatch(&RequestContext::anonymous(), request)
        .unwrap();

    assert_eq!(storage.finds.borrow()[0].0, "Comment");
}

#[test]
fn filter_on_unknown_column_is_reported() {
    let conn = open_fixture_db();
    let registry = fixture_registry(&conn);
    let storage = SqliteStorage::new(&conn);
    let dispatcher = Dispatcher::new(&storage, registry);

    let err = dispatcher
        .dispatch(
            &RequestContext::anonymous(),
            envelope(
                OperationKind::GetList,
                "posts",
                json!({"filter": {"no_such_column": 1}}),
            ),
        )
        .unwrap_err();

    assert_eq!(err.status_or_default(), 500);
}

#[test]
fn null_filter_lists_everything() {
    let conn = open_fixture_db();
    let registry = fixture_registry(&conn);
    let post = insert_post(&conn, "first", 0, None);
    insert_post(&conn, "second", 0, None);
    insert_comment(&conn, post, "only");
    let storage = SqliteStorage::new(&conn);
    let dispatcher = Dispatcher::new(&storage, registry);
    let ctx = RequestContext::anonymous();

    let list = dispatcher
        .dispatch(
            &ctx,
            envelope(
                OperationKind::GetList,
                "posts",
                json!({"pagination": {"page": 1, "perPage": 10}, "filter": null}),
            ),
        )
        .unwrap();
    assert_eq!(list.total, Some(2));

    let references = dispatcher
        .dispatch(
            &ctx,
            envelope(
                OperationKind::GetManyReference,
                "comments",
                json!({"target": "post_id", "id": post, "filter": null}),
            ),
        )
        .unwrap();
    assert_eq!(references.total, Some(1));
}

#[test]
fn zero_take_is_a_validation_failure() {
    let conn = open_fixture_db();
    let registry = fixture_registry(&conn);
    let storage = RecordingStorage::default();
    let dispatcher = Dispatcher::new(&storage, registry);

    let err = dispatcher
        .dispatch(
            &RequestContext::anonymous(),
            envelope(
                OperationKind::GetList,
                "posts",
                json!({"take": 0, "infinite": true}),
            ),
        )
        .unwrap_err();

    assert_eq!(err.status, Some(400));
    assert_eq!(*storage.calls.borrow(), 0);
}
