use listboard_core::auth::Identity;
use listboard_core::categories::{create_category, get_category, reparent_category};
use listboard_core::error::Error;
use listboard_core::items::{add_item, migrate_tag_subcategories};
use listboard_core::lists::{
    add_column, create_list, delete_list, delete_list_batch, list_doc, load_board, load_items, move_item,
};
use listboard_core::model::{Column, ListItem};
use listboard_core::reorder::is_dense;
use listboard_core::search::SearchFilter;
use listboard_core::stats::aggregate;
use listboard_core::store::DocumentStore;
use listboard_shared::{CategoryCreate, ColumnCreate, ItemCreate, ListCreate, Slot};
use serde_json::Map;
use tempfile::tempdir;

fn user() -> Identity {
    Identity::new("u1", "u1@example.com")
}

fn category(store: &mut DocumentStore, name: &str, parent: Option<&str>) -> String {
    create_category(
        store,
        &user(),
        &CategoryCreate {
            name: name.to_string(),
            color: None,
            icon: None,
            parent_id: parent.map(str::to_string),
        },
    )
    .expect("create category")
    .id
}

struct Seeded {
    list_id: String,
    c1: Column,
    c2: Column,
    items: Vec<ListItem>,
}

/// One list, two columns, three items in C1 and two in C2.
fn seed(store: &mut DocumentStore) -> Seeded {
    let list = create_list(
        store,
        &user(),
        &ListCreate {
            name: "Board".to_string(),
            description: None,
        },
    )
    .expect("create list");
    let c1 = add_column(store, &user(), &list.id, &ColumnCreate { header: "C1".to_string() }).expect("c1");
    let c2 = add_column(store, &user(), &list.id, &ColumnCreate { header: "C2".to_string() }).expect("c2");

    let mut items = Vec::new();
    for (title, column) in [("x", &c1), ("y", &c1), ("z", &c1), ("p", &c2), ("q", &c2)] {
        let create = ItemCreate {
            title: title.to_string(),
            ..ItemCreate::default()
        };
        items.push(add_item(store, &user(), &list.id, &column.id, &create).expect("add item"));
    }

    Seeded {
        list_id: list.id,
        c1,
        c2,
        items,
    }
}

fn titles_in(store: &DocumentStore, list_id: &str, column_id: &str) -> Vec<String> {
    load_items(store, list_id)
        .expect("items")
        .into_iter()
        .filter(|i| i.column_id == column_id)
        .map(|i| i.title)
        .collect()
}

#[test]
fn list_delete_cascades_in_one_batch() {
    let temp = tempdir().expect("tempdir");
    let mut store = DocumentStore::open(temp.path()).expect("open store");
    let seeded = seed(&mut store);
    let before = store.len();

    let removed = delete_list(&mut store, &user(), &seeded.list_id).expect("delete list");
    assert_eq!(removed, 1 + 2 + 5);
    assert_eq!(store.len(), before - 8);

    let reopened = DocumentStore::open(temp.path()).expect("reopen");
    assert_eq!(reopened.len(), store.len());
    assert!(!reopened.exists(&list_doc(&seeded.list_id)));
}

#[test]
fn failing_cascade_deletes_nothing() {
    let temp = tempdir().expect("tempdir");
    let mut store = DocumentStore::open(temp.path()).expect("open store");
    let seeded = seed(&mut store);
    let before = store.len();

    let mut batch = delete_list_batch(&store, &seeded.list_id).expect("batch");
    batch.update(&list_doc("does-not-exist"), Map::new());
    assert!(store.commit(batch).is_err());

    assert_eq!(store.len(), before);
    let reopened = DocumentStore::open(temp.path()).expect("reopen");
    assert_eq!(reopened.len(), before);
}

#[test]
fn cross_column_move_example() {
    let mut store = DocumentStore::in_memory();
    let seeded = seed(&mut store);
    let x = &seeded.items[0];

    let destination = Slot {
        column_id: seeded.c2.id.clone(),
        index: 1,
    };
    move_item(&mut store, &user(), &seeded.list_id, &x.id, &destination).expect("move");

    assert_eq!(titles_in(&store, &seeded.list_id, &seeded.c1.id), vec!["y", "z"]);
    assert_eq!(titles_in(&store, &seeded.list_id, &seeded.c2.id), vec!["p", "x", "q"]);

    let items = load_items(&store, &seeded.list_id).expect("items");
    for column in [&seeded.c1, &seeded.c2] {
        assert!(is_dense(
            items.iter().filter(|i| i.column_id == column.id).map(|i| i.order)
        ));
    }
}

#[test]
fn orders_stay_dense_across_many_moves() {
    let mut store = DocumentStore::in_memory();
    let seeded = seed(&mut store);
    let columns = [seeded.c1.id.clone(), seeded.c2.id.clone()];

    for step in 0..12 {
        let item = &seeded.items[step % seeded.items.len()];
        let destination = Slot {
            column_id: columns[step % 2].clone(),
            index: (step * 7) % 4,
        };
        move_item(&mut store, &user(), &seeded.list_id, &item.id, &destination).expect("move");

        let items = load_items(&store, &seeded.list_id).expect("items");
        assert_eq!(items.len(), 5);
        for column in &columns {
            assert!(is_dense(items.iter().filter(|i| &i.column_id == column).map(|i| i.order)));
        }
    }
}

#[test]
fn reparent_into_descendant_is_rejected_before_writing() {
    let temp = tempdir().expect("tempdir");
    let mut store = DocumentStore::open(temp.path()).expect("open store");
    let a = category(&mut store, "A", None);
    let sub = category(&mut store, "Sub", Some(a.as_str()));

    let err = reparent_category(&mut store, &user(), &a, Some(sub.as_str())).expect_err("cycle");
    assert!(matches!(err, Error::CategoryCycle { .. }));

    let reopened = DocumentStore::open(temp.path()).expect("reopen");
    assert!(get_category(&reopened, &user(), &a).expect("a").parent_id.is_none());
}

#[test]
fn statistics_breakdown_with_explicit_and_tag_subcategories() {
    let mut store = DocumentStore::in_memory();
    let seeded = seed(&mut store);
    let a = category(&mut store, "A", None);
    let sub1 = category(&mut store, "Sub1", Some(a.as_str()));
    category(&mut store, "Sub2", Some(a.as_str()));
    let b = category(&mut store, "B", None);

    let add = |store: &mut DocumentStore, title: &str, category: Option<&str>, sub: Option<&str>, tags: &[&str]| {
        let create = ItemCreate {
            title: title.to_string(),
            category_id: category.map(str::to_string),
            subcategory_id: sub.map(str::to_string),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            ..ItemCreate::default()
        };
        add_item(store, &user(), &seeded.list_id, &seeded.c1.id, &create).expect("add item");
    };

    add(&mut store, "explicit", Some(a.as_str()), Some(sub1.as_str()), &[]);
    add(&mut store, "tagged", Some(a.as_str()), None, &["sub2"]);
    add(&mut store, "direct", Some(a.as_str()), None, &[]);
    add(&mut store, "other", Some(b.as_str()), None, &[]);

    let board = load_board(&store, &user(), &seeded.list_id).expect("board");
    let categories = listboard_core::categories::categories_for_user(&store, &user()).expect("categories");
    let stats = aggregate(&board.items, &board.columns, &categories);

    assert_eq!(stats.total_items, 9);
    assert_eq!(stats.uncategorized.count, 5);
    let stat_a = stats.by_category.iter().find(|c| c.category_id == a).expect("A");
    assert_eq!(stat_a.total.count, 3);
    assert_eq!(stat_a.direct.count, 1);
    let sub_counts: Vec<(String, usize)> = stat_a
        .subcategories
        .iter()
        .map(|s| (s.name.clone(), s.share.count))
        .collect();
    assert_eq!(sub_counts, vec![("Sub1".to_string(), 1), ("Sub2".to_string(), 1)]);

    assert_eq!(aggregate(&board.items, &board.columns, &categories), stats);

    let filtered = SearchFilter::text("nothing matches this").apply(&board.items);
    let empty = aggregate(&filtered, &board.columns, &categories);
    assert_eq!(empty.total_items, 0);
    assert!(empty.by_column.iter().all(|c| c.share.percentage == 0.0));

    assert_eq!(migrate_tag_subcategories(&mut store, &user(), &seeded.list_id).expect("migrate"), 1);
    let board = load_board(&store, &user(), &seeded.list_id).expect("board");
    assert_eq!(aggregate(&board.items, &board.columns, &categories).by_category, stats.by_category);
}
